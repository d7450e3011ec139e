//! The facade tying `PageStore`, the page cache, the B+tree algorithms, and
//! the transaction layer into one handle an application opens once per
//! store file.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::btree::{PageIo, Tree};
use crate::cache::PageCache;
use crate::catalog;
use crate::codec::{CodecRegistry, ElementCodec, TreeHeader, TreeInfo};
use crate::config::{MavibotConfig, TreeConfig};
use crate::error::{MavibotError, Result};
use crate::global_header::{GlobalHeader, HeaderSlots};
use crate::page_store::PageStore;
use crate::txn::{ReadTxn, SnapshotEntry, WriteTxn};

/// The in-memory record of one open tree: its immutable metadata, its latest
/// committed header, and the on-disk offset of that header record (so the
/// next commit knows which record it is superseding).
#[derive(Debug, Clone)]
pub(crate) struct TreeState {
    pub info: TreeInfo,
    pub header: TreeHeader,
    pub tree_header_offset: i64,
}

struct Shared {
    page_store: Mutex<PageStore>,
    header_file: Mutex<std::fs::File>,
    header_slots: Mutex<HeaderSlots>,
    committed: RwLock<GlobalHeader>,
    cache: PageCache,
    trees: RwLock<HashMap<String, TreeState>>,
    writer_lock: Mutex<()>,
    snapshots: RwLock<HashMap<u64, SnapshotEntry>>,
    next_snapshot_id: AtomicU64,
    codecs: CodecRegistry,
    timekeeper_stop: AtomicBool,
    /// The engine's default read timeout, resolved once at open time.
    /// `None` means reads never expire on their own.
    default_read_timeout: Option<Duration>,
}

/// A single open Mavibot store. Cheap to share via `Arc` if an application
/// wants multiple handles; internally a single `Engine` already serializes
/// writers and lets readers run without blocking them.
pub struct Engine {
    shared: Arc<Shared>,
    timekeeper: Option<JoinHandle<()>>,
}

impl Engine {
    /// Opens the store at `path`, creating it if it does not exist.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, its page size
    /// conflicts with `config`, or it contains a corrupt `GlobalHeader`.
    pub fn open(path: &Path, config: MavibotConfig) -> Result<Self> {
        config.validate()?;
        let mut header_file = OpenOptions::new().read(true).write(true).create(true).open(path)?;
        let (header_slots, committed) = HeaderSlots::open(&mut header_file, config.page_size as u32)?;

        if committed.revision > 0 && committed.page_size as usize != config.page_size {
            return Err(MavibotError::Config(format!(
                "page_size mismatch: store was created with {}, opened with {}",
                committed.page_size, config.page_size
            )));
        }

        let mut page_store = PageStore::create(path, committed.page_size as usize)?;
        let cache = PageCache::new(config.cache_size);
        let trees = rebuild_tree_registry(&mut page_store, &cache, &committed)?;
        let default_read_timeout = match config.read_timeout_ms {
            None | Some(u64::MAX) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
        };

        let shared = Arc::new(Shared {
            page_store: Mutex::new(page_store),
            header_file: Mutex::new(header_file),
            header_slots: Mutex::new(header_slots),
            committed: RwLock::new(committed),
            cache,
            trees: RwLock::new(trees),
            writer_lock: Mutex::new(()),
            snapshots: RwLock::new(HashMap::new()),
            next_snapshot_id: AtomicU64::new(1),
            codecs: CodecRegistry::new(),
            timekeeper_stop: AtomicBool::new(false),
            default_read_timeout,
        });

        let timekeeper = spawn_timekeeper(shared.clone());
        log::info!("opened store at {} (revision {})", path.display(), shared.committed.read().revision);
        Ok(Self { shared, timekeeper: Some(timekeeper) })
    }

    /// Registers a new, empty tree. Runs as its own write transaction.
    ///
    /// # Errors
    /// Returns [`MavibotError::TreeAlreadyManaged`] if `name` is already
    /// open, or propagates I/O errors from the commit.
    pub fn create_tree(&self, name: &str, key_codec_id: &str, value_codec_id: &str, config: &TreeConfig) -> Result<()> {
        let mut txn = self.begin_write();
        txn.create_tree(name, key_codec_id, value_codec_id, config)?;
        txn.commit()?;
        Ok(())
    }

    /// Whether `name` is currently an open, managed tree.
    #[must_use]
    pub fn has_tree(&self, name: &str) -> bool {
        self.shared.trees.read().contains_key(name)
    }

    #[must_use]
    pub fn tree_names(&self) -> Vec<String> {
        self.shared.trees.read().keys().cloned().collect()
    }

    /// Opens a read snapshot pinned to the currently committed revision.
    /// `timeout` overrides the engine's configured default read timeout for
    /// this snapshot only; `None` here means "use the engine default",
    /// `Some(Duration::MAX)` (or an engine default of `u64::MAX` ms) means
    /// no timeout at all.
    #[must_use]
    pub fn begin_read(&self, timeout: Option<Duration>) -> ReadTxn<'_> {
        let header = self.committed_header();
        let trees = self.tree_registry_snapshot();
        let id = self.shared.next_snapshot_id.fetch_add(1, Ordering::Relaxed);
        let timeout = timeout.or(self.shared.default_read_timeout);
        self.shared.snapshots.write().insert(
            id,
            SnapshotEntry { revision: header.revision, opened_at: Instant::now(), timeout },
        );
        ReadTxn::new(self, id, header.revision, trees)
    }

    /// Begins the single write transaction. Blocks until any other writer
    /// has committed or aborted.
    #[must_use]
    pub fn begin_write(&self) -> WriteTxn<'_> {
        let guard = self.shared.writer_lock.lock();
        WriteTxn::new(self, guard)
    }

    /// Runs reclamation once, freeing pages superseded by revisions no live
    /// snapshot can still reach.
    ///
    /// # Errors
    /// Propagates I/O and corruption errors encountered while scanning the
    /// copied-pages catalog or committing the result.
    pub fn reclaim(&self) -> Result<crate::reclaim::ReclaimReport> {
        crate::reclaim::Reclaimer::new(self).run()
    }

    /// Summary statistics useful for the `stats` CLI command and tests.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        let header = self.committed_header();
        EngineStats {
            revision: header.revision,
            tree_count: self.shared.trees.read().len(),
            page_size: header.page_size as usize,
            cache: self.shared.cache.metrics_snapshot(),
            open_snapshots: self.shared.snapshots.read().len(),
        }
    }

    #[must_use]
    pub fn min_live_revision(&self) -> u64 {
        let committed = self.committed_header().revision;
        self.shared.snapshots.read().values().map(|s| s.revision).min().unwrap_or(committed).min(committed)
    }

    pub(crate) fn committed_header(&self) -> GlobalHeader {
        self.shared.committed.read().clone()
    }

    pub(crate) fn tree_registry_snapshot(&self) -> HashMap<String, TreeState> {
        self.shared.trees.read().clone()
    }

    pub(crate) fn lock_page_store(&self) -> parking_lot::MutexGuard<'_, PageStore> {
        self.shared.page_store.lock()
    }

    pub(crate) fn cache(&self) -> &PageCache {
        &self.shared.cache
    }

    pub(crate) fn resolve_codec(&self, id: &str) -> Result<Arc<dyn ElementCodec>> {
        self.shared.codecs.get(id).ok_or_else(|| MavibotError::Config(format!("unknown codec id: {id}")))
    }

    pub(crate) fn tree_facade(&self, info: &TreeInfo) -> Result<Tree> {
        Ok(Tree {
            fan_out: info.fan_out as usize,
            allow_duplicates: info.allow_duplicates,
            value_threshold_up: info.value_threshold_up as usize,
            value_threshold_low: info.value_threshold_low as usize,
            key_codec: self.resolve_codec(&info.key_codec_id)?,
            value_codec: self.resolve_codec(&info.value_codec_id)?,
        })
    }

    pub(crate) fn snapshot_alive(&self, id: u64) -> bool {
        self.shared.snapshots.read().contains_key(&id)
    }

    pub(crate) fn release_snapshot(&self, id: u64) {
        self.shared.snapshots.write().remove(&id);
    }

    pub(crate) fn write_global_header(&self, header: &GlobalHeader) -> Result<()> {
        let mut file = self.shared.header_file.lock();
        let mut slots = self.shared.header_slots.lock();
        slots.write(&mut file, header)
    }

    pub(crate) fn publish(&self, header: GlobalHeader, trees: HashMap<String, TreeState>) {
        *self.shared.committed.write() = header;
        *self.shared.trees.write() = trees;
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shared.timekeeper_stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.timekeeper.take() {
            let _ = handle.join();
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineStats {
    pub revision: u64,
    pub tree_count: usize,
    pub page_size: usize,
    pub cache: crate::cache::CacheMetricsSnapshot,
    pub open_snapshots: usize,
}

fn rebuild_tree_registry(store: &mut PageStore, cache: &PageCache, header: &GlobalHeader) -> Result<HashMap<String, TreeState>> {
    let mut scratch_head = header.free_list_head;
    let mut latest: HashMap<String, (u64, i64)> = HashMap::new();
    {
        let mut io = PageIo::new(store, cache, &mut scratch_head);
        for (key, value) in crate::btree::collect_all_entries(&mut io, header.tree_of_trees_root)? {
            let (name, revision) = catalog::decode_tree_of_trees_key(&key)?;
            let offset = catalog::decode_tree_header_offset(&value)?;
            latest
                .entry(name)
                .and_modify(|e| {
                    if revision > e.0 {
                        *e = (revision, offset);
                    }
                })
                .or_insert((revision, offset));
        }
    }

    let mut trees = HashMap::new();
    for (name, (_, tree_header_offset)) in latest {
        let header_bytes = store.read(tree_header_offset)?;
        let tree_header = TreeHeader::decode(&header_bytes)?;
        let info_bytes = store.read(tree_header.tree_info_offset)?;
        let info = TreeInfo::decode(&info_bytes)?;
        trees.insert(name, TreeState { info, header: tree_header, tree_header_offset });
    }
    Ok(trees)
}

fn spawn_timekeeper(shared: Arc<Shared>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while !shared.timekeeper_stop.load(Ordering::Relaxed) {
            std::thread::sleep(Duration::from_secs(1));
            let now = Instant::now();
            shared.snapshots.write().retain(|_, entry| match entry.timeout {
                Some(t) => now.duration_since(entry.opened_at) < t,
                None => true,
            });
        }
    })
}
