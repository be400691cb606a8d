//! Block database: height- and hash-keyed block storage (§6.1).
//!
//! Slab row layout: `[header: 80][height: u32][tx_count: u32][tx_hash * tx_count]`.
//! A hash table (`HtdbSlab<32>`) maps block hash -> slab offset; a parallel
//! record allocator maps height -> slab offset directly (heights are dense
//! and sequential, so no hashing is needed there). The two live in separate
//! backing files: both grow forward without bound, so packing them into one
//! file would eventually let one clobber the other. Grounded on
//! `original_source/src/database/database/block_database.cpp`, which keeps
//! the lookup table and the height index as separate files for the same
//! reason.
use crate::error::{Result, StoreError};
use crate::htdb_slab::HtdbSlab;
use crate::mmfile::Mmfile;
use crate::record_allocator::RecordAllocator;
use crate::types::{BlockHeader, Hash256, HASH_LEN};

const HEIGHT_INDEX_RECORD_SIZE: usize = 8; // u64 slab offset

pub struct BlockRecord {
    pub header: BlockHeader,
    pub height: u32,
    pub transactions: Vec<Hash256>,
}

pub struct BlockDatabase {
    hashes: HtdbSlab<HASH_LEN>,
    heights: RecordAllocator,
}

impl BlockDatabase {
    pub fn new() -> Self {
        let header_size = crate::disk_array::DiskArray::<u64>::header_size(0);
        Self {
            hashes: HtdbSlab::new(0, header_size),
            heights: RecordAllocator::new(0, HEIGHT_INDEX_RECORD_SIZE),
        }
    }

    pub fn create(&mut self, table: &mut Mmfile, index: &mut Mmfile, bucket_count: u32) -> Result<()> {
        self.hashes = HtdbSlab::new(0, crate::disk_array::DiskArray::<u64>::header_size(bucket_count));
        self.hashes.create(table, bucket_count)?;
        self.heights.create(index)
    }

    pub fn start(&mut self, table: &Mmfile, index: &Mmfile) -> Result<()> {
        self.hashes.start(table)?;
        self.heights.start(index)
    }

    pub fn sync(&self, table: &mut Mmfile, index: &mut Mmfile) -> Result<()> {
        self.hashes.sync(table)?;
        self.heights.sync(index)
    }

    /// Append a block at `height`, which must equal `top() + 1` (or `0` for
    /// the first block).
    pub fn store(
        &mut self,
        table: &mut Mmfile,
        index: &mut Mmfile,
        height: u32,
        header: &BlockHeader,
        transactions: &[Hash256],
    ) -> Result<()> {
        let expected = self.heights.count();
        if height != expected {
            return Err(StoreError::ValueTooLarge {
                len: height as usize,
                capacity: expected as usize,
            });
        }

        let mut row = Vec::with_capacity(80 + 4 + 4 + transactions.len() * HASH_LEN);
        row.extend_from_slice(&header.to_bytes());
        row.extend_from_slice(&height.to_le_bytes());
        row.extend_from_slice(&(transactions.len() as u32).to_le_bytes());
        for hash in transactions {
            row.extend_from_slice(hash);
        }

        let hash = header.hash();
        let offset = self.hashes.store(table, &hash, &row)?;

        let record_index = self.heights.allocate(index)?;
        debug_assert_eq!(record_index, height);
        self.heights.get_mut(index, record_index).copy_from_slice(&offset.to_le_bytes());
        log::debug!("block_db: stored block at height {height}");
        Ok(())
    }

    fn parse_row(row: &[u8]) -> BlockRecord {
        let header = BlockHeader::from_bytes(row[..BlockHeader::SERIALIZED_LEN].try_into().unwrap());
        let mut pos = BlockHeader::SERIALIZED_LEN;
        let height = u32::from_le_bytes(row[pos..pos + 4].try_into().unwrap());
        pos += 4;
        let tx_count = u32::from_le_bytes(row[pos..pos + 4].try_into().unwrap());
        pos += 4;
        let mut transactions = Vec::with_capacity(tx_count as usize);
        for _ in 0..tx_count {
            let mut hash = [0u8; HASH_LEN];
            hash.copy_from_slice(&row[pos..pos + HASH_LEN]);
            transactions.push(hash);
            pos += HASH_LEN;
        }
        BlockRecord {
            header,
            height,
            transactions,
        }
    }

    pub fn get_by_hash(&self, table: &Mmfile, hash: &Hash256) -> Option<BlockRecord> {
        self.hashes.get(table, hash, |row| Some(Self::parse_row(row)))
    }

    pub fn get_by_height(&self, table: &Mmfile, index: &Mmfile, height: u32) -> Option<BlockRecord> {
        if height >= self.heights.count() {
            return None;
        }
        let offset_bytes = self.heights.get(index, height);
        let offset = u64::from_le_bytes(offset_bytes.try_into().unwrap());
        let row = self.hashes.slabs().get(table, offset);
        Some(Self::parse_row(row))
    }

    /// Highest stored height, or `None` if the database is empty.
    pub fn top(&self) -> Option<u32> {
        self.heights.count().checked_sub(1)
    }

    /// Drop every block from `from_height` onward. The slab rows themselves
    /// are left in place (slabs never reclaim space); only the height index
    /// shrinks, so `get_by_height` stops exposing them. Matches the
    /// original's `unlink`, which is a pure reorg operation and never frees
    /// the hash-keyed lookup.
    pub fn unlink(&mut self, from_height: u32) {
        log::debug!("block_db: unlinking from height {from_height}");
        self.heights.set_count(from_height);
    }
}

impl Default for BlockDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(bucket_count: u32) -> (tempfile::TempDir, Mmfile, Mmfile, BlockDatabase) {
        let dir = tempfile::tempdir().unwrap();
        let mut table = Mmfile::open(dir.path().join("block_table")).unwrap();
        let mut index = Mmfile::open(dir.path().join("block_index")).unwrap();
        let mut db = BlockDatabase::new();
        db.create(&mut table, &mut index, bucket_count).unwrap();
        (dir, table, index, db)
    }

    fn sample_header(nonce: u32) -> BlockHeader {
        BlockHeader {
            version: 1,
            previous_block_hash: [0u8; HASH_LEN],
            merkle_root: [1u8; HASH_LEN],
            timestamp: 1_700_000_000,
            bits: 0x1d00ffff,
            nonce,
        }
    }

    #[test]
    fn store_then_get_by_hash_and_height() {
        let (_dir, mut table, mut index, mut db) = fresh(8);
        let header = sample_header(1);
        let txs = vec![[9u8; HASH_LEN]];
        db.store(&mut table, &mut index, 0, &header, &txs).unwrap();

        let by_hash = db.get_by_hash(&table, &header.hash()).unwrap();
        assert_eq!(by_hash.height, 0);
        assert_eq!(by_hash.transactions, txs);

        let by_height = db.get_by_height(&table, &index, 0).unwrap();
        assert_eq!(by_height.header, header);
    }

    #[test]
    fn top_tracks_highest_height() {
        let (_dir, mut table, mut index, mut db) = fresh(8);
        assert_eq!(db.top(), None);
        for h in 0..5u32 {
            db.store(&mut table, &mut index, h, &sample_header(h), &[]).unwrap();
        }
        assert_eq!(db.top(), Some(4));
    }

    #[test]
    fn unlink_hides_heights_but_keeps_hash_lookup() {
        let (_dir, mut table, mut index, mut db) = fresh(8);
        for h in 0..5u32 {
            db.store(&mut table, &mut index, h, &sample_header(h), &[]).unwrap();
        }
        db.unlink(2);
        assert_eq!(db.top(), Some(1));
        assert!(db.get_by_height(&table, &index, 2).is_none());
        assert!(db.get_by_hash(&table, &sample_header(2).hash()).is_some());
    }
}
