//! Stealth database: append-only scan-prefix rows, with a per-height index
//! for fast `from_height` resume (§6.5).
//!
//! Row layout: `[prefix: u32][ephemeral_key_x: 32][address_hash: 20][tx_hash: 32]`.
//! There's no hash table here — rows are appended strictly in block order
//! and a wallet scan walks forward from wherever it left off, matching only
//! the leading bits of `prefix` it cares about. A second, height-indexed
//! array records the row count at the start of each height, so `scan` can
//! jump straight past blocks the caller has already processed instead of
//! rescanning from genesis. The two arrays live in separate files for the
//! same reason as [`crate::engines::block_db`]: both grow forward without
//! bound. Grounded on `original_source/src/database/stealth_database.cpp`.
use crate::error::Result;
use crate::mmfile::Mmfile;
use crate::record_allocator::RecordAllocator;
use crate::types::{Hash256, ShortHash, HASH_LEN, SHORT_HASH_LEN};

const EPHEMERAL_KEY_LEN: usize = 32;
pub const ROW_SIZE: usize = 4 + EPHEMERAL_KEY_LEN + SHORT_HASH_LEN + HASH_LEN;
const BLOCK_INDEX_RECORD_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StealthRow {
    pub prefix: u32,
    pub ephemeral_key_x: [u8; EPHEMERAL_KEY_LEN],
    pub address_hash: ShortHash,
    pub transaction_hash: Hash256,
}

fn prefix_matches(row_prefix: u32, filter: u32, filter_bits: u32) -> bool {
    if filter_bits == 0 {
        return true;
    }
    let mask = u32::MAX << (32 - filter_bits.min(32));
    (row_prefix & mask) == (filter & mask)
}

pub struct StealthDatabase {
    rows: RecordAllocator,
    block_index: RecordAllocator,
    /// Row count as of the start of the height currently being written.
    /// Persisted into `block_index` by `sync`.
    block_start: u32,
}

impl StealthDatabase {
    pub fn new() -> Self {
        Self {
            rows: RecordAllocator::new(0, ROW_SIZE),
            block_index: RecordAllocator::new(0, BLOCK_INDEX_RECORD_SIZE),
            block_start: 0,
        }
    }

    pub fn create(&mut self, rows_file: &mut Mmfile, index_file: &mut Mmfile) -> Result<()> {
        self.rows.create(rows_file)?;
        self.block_index.create(index_file)
    }

    pub fn start(&mut self, rows_file: &Mmfile, index_file: &Mmfile) -> Result<()> {
        self.rows.start(rows_file)?;
        self.block_index.start(index_file)?;
        self.block_start = self.rows.count();
        Ok(())
    }

    pub fn store(&mut self, rows_file: &mut Mmfile, row: &StealthRow) -> Result<u32> {
        log::debug!("stealth_db: storing row with prefix {:#010x}", row.prefix);
        let index = self.rows.allocate(rows_file)?;
        let slot = self.rows.get_mut(rows_file, index);
        slot[..4].copy_from_slice(&row.prefix.to_le_bytes());
        slot[4..4 + EPHEMERAL_KEY_LEN].copy_from_slice(&row.ephemeral_key_x);
        let pos = 4 + EPHEMERAL_KEY_LEN;
        slot[pos..pos + SHORT_HASH_LEN].copy_from_slice(&row.address_hash);
        slot[pos + SHORT_HASH_LEN..].copy_from_slice(&row.transaction_hash);
        Ok(index)
    }

    fn decode(row: &[u8]) -> StealthRow {
        let prefix = u32::from_le_bytes(row[..4].try_into().unwrap());
        let mut ephemeral_key_x = [0u8; EPHEMERAL_KEY_LEN];
        ephemeral_key_x.copy_from_slice(&row[4..4 + EPHEMERAL_KEY_LEN]);
        let pos = 4 + EPHEMERAL_KEY_LEN;
        let mut address_hash = [0u8; SHORT_HASH_LEN];
        address_hash.copy_from_slice(&row[pos..pos + SHORT_HASH_LEN]);
        let mut transaction_hash = [0u8; HASH_LEN];
        transaction_hash.copy_from_slice(&row[pos + SHORT_HASH_LEN..]);
        StealthRow {
            prefix,
            ephemeral_key_x,
            address_hash,
            transaction_hash,
        }
    }

    /// Record the height just finished: its starting row index becomes
    /// `block_index[height]`, and the running `block_start` advances to the
    /// current row count for the next height.
    pub fn sync(&mut self, rows_file: &mut Mmfile, index_file: &mut Mmfile, height: u32) -> Result<()> {
        let index = self.block_index.allocate(index_file)?;
        debug_assert_eq!(index, height);
        self.block_index
            .get_mut(index_file, index)
            .copy_from_slice(&self.block_start.to_le_bytes());
        self.block_start = self.rows.count();
        self.rows.sync(rows_file)?;
        self.block_index.sync(index_file)
    }

    /// Rows matching the leading `filter_bits` bits of `filter`, starting
    /// from `from_height` onward. `limit` caps the number of rows returned;
    /// `None` returns every match.
    pub fn scan(
        &self,
        rows_file: &Mmfile,
        index_file: &Mmfile,
        filter: u32,
        filter_bits: u32,
        from_height: u32,
        limit: Option<usize>,
    ) -> Vec<StealthRow> {
        let start_row = if from_height < self.block_index.count() {
            u32::from_le_bytes(self.block_index.get(index_file, from_height).try_into().unwrap())
        } else {
            self.rows.count()
        };

        (start_row..self.rows.count())
            .map(|i| Self::decode(self.rows.get(rows_file, i)))
            .filter(|row| prefix_matches(row.prefix, filter, filter_bits))
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }

    /// Drop every row and block-index entry recorded at or after
    /// `from_height`, for chain-reorg pop. The truncated counts are only
    /// updated in memory; call [`Self::sync_counts`] to publish them.
    pub fn unlink(&mut self, index_file: &Mmfile, from_height: u32) {
        if from_height >= self.block_index.count() {
            return;
        }
        let row_cutoff = u32::from_le_bytes(self.block_index.get(index_file, from_height).try_into().unwrap());
        self.rows.set_count(row_cutoff);
        self.block_index.set_count(from_height);
        self.block_start = row_cutoff;
    }

    /// Publish the in-memory row/block-index counts without allocating a new
    /// block-index entry. Used after `unlink`, where (unlike `sync`) no new
    /// height is being recorded.
    pub fn sync_counts(&self, rows_file: &mut Mmfile, index_file: &mut Mmfile) -> Result<()> {
        self.rows.sync(rows_file)?;
        self.block_index.sync(index_file)
    }
}

impl Default for StealthDatabase {
    fn default() -> Self {
        Self::new()
    }
}
