//! One-to-many index: `KEY_LEN`-byte key -> chain of `ROW_SIZE`-byte rows
//! (§4.6). Used by the history database, one chain per address short hash.
//! The key->head lookup and the row chains live in separate files, same as
//! [`crate::engines::block_db`]: both grow forward without bound and can't
//! safely share one file. Grounded on
//! `original_source/include/bitcoin/blockchain/database/multimap_records.hpp`.
use crate::error::Result;
use crate::htdb_record::HtdbRecord;
use crate::linked_records::{LinkedRecords, EMPTY};
use crate::mmfile::Mmfile;

/// `HtdbRecord<KEY_LEN, 4>` maps a key to the head record index of its row
/// chain in a separate `LinkedRecords`.
pub struct MultimapRecords<const KEY_LEN: usize> {
    heads: HtdbRecord<KEY_LEN, 4>,
    rows: LinkedRecords,
}

impl<const KEY_LEN: usize> MultimapRecords<KEY_LEN> {
    pub fn new(row_size: usize) -> Self {
        Self {
            heads: HtdbRecord::new(0, crate::disk_array::DiskArray::<u32>::header_size(0)),
            rows: LinkedRecords::new(0, row_size),
        }
    }

    pub fn create(&mut self, heads_file: &mut Mmfile, rows_file: &mut Mmfile, bucket_count: u32) -> Result<()> {
        self.heads = HtdbRecord::new(0, crate::disk_array::DiskArray::<u32>::header_size(bucket_count));
        self.heads.create(heads_file, bucket_count)?;
        self.rows.create(rows_file)
    }

    pub fn start(&mut self, heads_file: &Mmfile, rows_file: &Mmfile) -> Result<()> {
        self.heads.start(heads_file)?;
        self.rows.start(rows_file)
    }

    fn head_index(&self, heads_file: &Mmfile, key: &[u8; KEY_LEN]) -> u32 {
        self.heads
            .get(heads_file, key)
            .map(|v| u32::from_le_bytes(v))
            .unwrap_or(EMPTY)
    }

    /// Append `row` to `key`'s chain, creating the chain if `key` is new.
    pub fn add_row(
        &mut self,
        heads_file: &mut Mmfile,
        rows_file: &mut Mmfile,
        key: &[u8; KEY_LEN],
        row: &[u8],
    ) -> Result<()> {
        let previous_head = self.head_index(heads_file, key);
        let new_head = self.rows.insert(rows_file, previous_head, row)?;
        if previous_head == EMPTY {
            self.heads.store(heads_file, key, &new_head.to_le_bytes())?;
        } else {
            self.heads.update(heads_file, key, &new_head.to_le_bytes());
        }
        Ok(())
    }

    /// Rows for `key`, most recently added first.
    pub fn get<'a>(
        &'a self,
        heads_file: &'a Mmfile,
        rows_file: &'a Mmfile,
        key: &[u8; KEY_LEN],
    ) -> impl Iterator<Item = &'a [u8]> {
        let head = self.head_index(heads_file, key);
        self.rows.iter(rows_file, head).map(|(_, payload)| payload)
    }

    /// Drop the most recently added row for `key`. Used by chain-reorg pop
    /// to undo history entries in LIFO order. Once the chain empties, the
    /// key's hash-table entry is unlinked entirely rather than left pointing
    /// at the empty sentinel.
    pub fn delete_last_row(&mut self, heads_file: &mut Mmfile, rows_file: &Mmfile, key: &[u8; KEY_LEN]) -> Result<()> {
        let head = self.head_index(heads_file, key);
        if head == EMPTY {
            return Ok(());
        }
        let next = self.rows.next(rows_file, head);
        if next == EMPTY {
            self.heads.unlink(heads_file, key);
        } else {
            self.heads.store(heads_file, key, &next.to_le_bytes())?;
        }
        Ok(())
    }

    pub fn sync(&self, heads_file: &mut Mmfile, rows_file: &mut Mmfile) -> Result<()> {
        self.heads.sync(heads_file)?;
        self.rows.sync(rows_file)
    }
}
