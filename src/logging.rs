//! Logging setup via `log4rs`, grounded on the teacher's `logger.rs` wiring:
//! a rolling file appender placed next to the data file, configurable
//! programmatically or from environment variables.

use std::path::{Path, PathBuf};

/// Initializes logging from a `log4rs.yaml` file in the working directory, if present.
/// Silently does nothing if the file is missing or already initialized.
pub fn init() {
    let _ = log4rs::init_file("log4rs.yaml", log4rs::config::Deserializers::default());
}

/// Initializes logging to `{base_dir}/{store_name}_logs/{store_name}.log`, rolling
/// at 10 MiB with up to `retention` old files kept.
///
/// # Errors
/// Returns an error if the log directory cannot be created or the appender fails to build.
pub fn init_for_store_in(
    base_dir: &Path,
    store_name: &str,
    level: log::LevelFilter,
    retention: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    use log4rs::append::rolling_file::RollingFileAppender;
    use log4rs::append::rolling_file::policy::compound::{
        CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
    };
    use log4rs::config::{Appender, Config, Root};
    use log4rs::encode::pattern::PatternEncoder;

    let mut dir = PathBuf::from(base_dir);
    dir.push(format!("{store_name}_logs"));
    std::fs::create_dir_all(&dir)?;

    let log_path = dir.join(format!("{store_name}.log"));
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", dir.join(format!("{store_name}.{{}}.log")).display()), retention)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(10 * 1024 * 1024)), Box::new(roller));
    let appender = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}")))
        .build(log_path, Box::new(policy))?;

    let config = Config::builder()
        .appender(Appender::builder().build("file", Box::new(appender)))
        .build(Root::builder().appender("file").build(level))?;
    log4rs::init_config(config)?;
    Ok(())
}

/// Initializes logging from environment variables if present:
/// `MAVIBOT_LOG_DIR`, `MAVIBOT_LOG_LEVEL`, `MAVIBOT_LOG_RETENTION`.
pub fn configure_from_env() {
    let Some(dir) = std::env::var("MAVIBOT_LOG_DIR").ok().map(PathBuf::from) else { return };
    let level = std::env::var("MAVIBOT_LOG_LEVEL")
        .ok()
        .and_then(|s| s.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    let retention =
        std::env::var("MAVIBOT_LOG_RETENTION").ok().and_then(|s| s.parse::<u32>().ok()).unwrap_or(7);
    let _ = init_for_store_in(&dir, "mavibot", level, retention);
}
