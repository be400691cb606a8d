//! Configuration surface (§4.9). Grounded on the teacher's `OpenOptions`
//! builder in the original `lib.rs`.
use std::path::PathBuf;

/// Default bucket counts, carried over from the original chain database.
/// Large enough that even a fully-synced chain keeps hash table chains
/// short; tests pass much smaller counts explicitly.
pub const DEFAULT_BLOCK_BUCKETS: u32 = 600_000;
pub const DEFAULT_TRANSACTION_BUCKETS: u32 = 100_000_000;
pub const DEFAULT_SPEND_BUCKETS: u32 = 228_110_589;
pub const DEFAULT_HISTORY_BUCKETS: u32 = 97_210_744;

#[derive(Debug, Clone)]
pub struct Settings {
    pub(crate) directory: PathBuf,
    pub(crate) block_buckets: u32,
    pub(crate) transaction_buckets: u32,
    pub(crate) spend_buckets: u32,
    pub(crate) history_buckets: u32,
    pub(crate) sync_on_stop: bool,
}

impl Settings {
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            directory: directory.into(),
            block_buckets: DEFAULT_BLOCK_BUCKETS,
            transaction_buckets: DEFAULT_TRANSACTION_BUCKETS,
            spend_buckets: DEFAULT_SPEND_BUCKETS,
            history_buckets: DEFAULT_HISTORY_BUCKETS,
            sync_on_stop: true,
        }
    }

    pub fn block_buckets(&mut self, count: u32) -> &mut Self {
        self.block_buckets = count;
        self
    }

    pub fn transaction_buckets(&mut self, count: u32) -> &mut Self {
        self.transaction_buckets = count;
        self
    }

    pub fn spend_buckets(&mut self, count: u32) -> &mut Self {
        self.spend_buckets = count;
        self
    }

    pub fn history_buckets(&mut self, count: u32) -> &mut Self {
        self.history_buckets = count;
        self
    }

    /// Whether `DataBase::stop` flushes every file before releasing the
    /// directory lock. Tests that only check in-memory state can disable
    /// this to avoid the I/O.
    pub fn sync_on_stop(&mut self, sync: bool) -> &mut Self {
        self.sync_on_stop = sync;
        self
    }

    pub fn directory(&self) -> &std::path::Path {
        &self.directory
    }

    pub fn block_buckets_count(&self) -> u32 {
        self.block_buckets
    }

    pub fn transaction_buckets_count(&self) -> u32 {
        self.transaction_buckets
    }

    pub fn spend_buckets_count(&self) -> u32 {
        self.spend_buckets
    }

    pub fn history_buckets_count(&self) -> u32 {
        self.history_buckets
    }

    pub fn sync_on_stop_enabled(&self) -> bool {
        self.sync_on_stop
    }

    fn path(&self, file_name: &str) -> PathBuf {
        self.directory.join(file_name)
    }

    /// The eight data files named in §6, plus the advisory lock file, all
    /// resolved under `directory()`.
    pub fn block_lock_path(&self) -> PathBuf {
        self.path("block_lock")
    }
    pub fn blocks_lookup_path(&self) -> PathBuf {
        self.path("blocks_lookup")
    }
    pub fn blocks_rows_path(&self) -> PathBuf {
        self.path("blocks_rows")
    }
    pub fn transactions_path(&self) -> PathBuf {
        self.path("transactions")
    }
    pub fn spends_path(&self) -> PathBuf {
        self.path("spends")
    }
    pub fn history_lookup_path(&self) -> PathBuf {
        self.path("history_lookup")
    }
    pub fn history_rows_path(&self) -> PathBuf {
        self.path("history_rows")
    }
    pub fn stealth_index_path(&self) -> PathBuf {
        self.path("stealth_index")
    }
    pub fn stealth_rows_path(&self) -> PathBuf {
        self.path("stealth_rows")
    }
}
