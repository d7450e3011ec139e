//! Thread-local trace sink, for deterministic assertions on log output in tests
//! without racing a process-global logger.

use std::cell::RefCell;

thread_local! {
    static TL_SINK: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Guard that disables the thread-local sink on drop.
pub struct TraceSinkGuard;
impl Drop for TraceSinkGuard {
    fn drop(&mut self) {
        TL_SINK.with(|s| *s.borrow_mut() = None);
    }
}

/// Enable the thread-local sink for the current thread. Returns a guard that disables it on drop.
pub fn enable_thread_sink() -> TraceSinkGuard {
    TL_SINK.with(|s| *s.borrow_mut() = Some(Vec::new()));
    TraceSinkGuard
}

pub fn write_str(msg: &str) {
    TL_SINK.with(|s| {
        if let Some(buf) = s.borrow_mut().as_mut() {
            buf.push(msg.to_owned());
        }
    });
}

/// Drain and return the captured messages for the current thread.
pub fn drain() -> Vec<String> {
    TL_SINK.with(|s| match s.borrow_mut().as_mut() {
        Some(buf) => {
            let out = buf.clone();
            buf.clear();
            out
        }
        None => Vec::new(),
    })
}

/// Emit a page-store trace event: routed through `log` at `trace` and, if a
/// thread-local sink is enabled, captured for test assertions.
#[macro_export]
macro_rules! trace_event {
    ($($arg:tt)*) => {{
        let __s = format!($($arg)*);
        $crate::utils::devlog::write_str(&__s);
        log::trace!(target: "mavibot::page_store", "{}", __s);
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_local_sink_captures_messages() {
        let _g = enable_thread_sink();
        crate::trace_event!("alloc offset={}", 512);
        crate::trace_event!("free");
        let snap = drain();
        assert!(snap.iter().any(|s| s.contains("alloc offset=512")));
        assert!(snap.iter().any(|s| s.contains("free")));
        assert!(drain().is_empty());
    }
}
