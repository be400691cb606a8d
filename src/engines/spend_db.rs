//! Spend database: which input spends a given output (§6.3).
//!
//! Keyed by `OutputPoint::spend_key()` rather than the raw outpoint, so
//! that outputs of the same transaction — which differ only in their
//! low-entropy `index` — don't clump into the same hash buckets. Record
//! value is the spending `InputPoint`. Grounded on
//! `original_source/src/database/spend_database.cpp`.
use crate::error::Result;
use crate::htdb_record::HtdbRecord;
use crate::mmfile::Mmfile;
use crate::types::{InputPoint, OutputPoint, HASH_LEN};

const VALUE_LEN: usize = HASH_LEN + 4;

pub struct SpendDatabase {
    table: HtdbRecord<{ HASH_LEN }, VALUE_LEN>,
}

impl SpendDatabase {
    pub fn new() -> Self {
        let header_size = crate::disk_array::DiskArray::<u32>::header_size(0);
        Self {
            table: HtdbRecord::new(0, header_size),
        }
    }

    pub fn create(&mut self, file: &mut Mmfile, bucket_count: u32) -> Result<()> {
        self.table = HtdbRecord::new(0, crate::disk_array::DiskArray::<u32>::header_size(bucket_count));
        self.table.create(file, bucket_count)
    }

    pub fn start(&mut self, file: &Mmfile) -> Result<()> {
        self.table.start(file)
    }

    pub fn sync(&self, file: &mut Mmfile) -> Result<()> {
        self.table.sync(file)
    }

    pub fn store(&mut self, file: &mut Mmfile, spent: &OutputPoint, spender: &InputPoint) -> Result<()> {
        let key = spent.spend_key();
        let mut value = [0u8; VALUE_LEN];
        value[..HASH_LEN].copy_from_slice(&spender.hash);
        value[HASH_LEN..].copy_from_slice(&spender.index.to_le_bytes());
        log::debug!("spend_db: marking output as spent");
        self.table.store(file, &key, &value)
    }

    pub fn get(&self, file: &Mmfile, spent: &OutputPoint) -> Option<InputPoint> {
        let key = spent.spend_key();
        self.table.get(file, &key).map(|value| {
            let mut hash = [0u8; HASH_LEN];
            hash.copy_from_slice(&value[..HASH_LEN]);
            let index = u32::from_le_bytes(value[HASH_LEN..].try_into().unwrap());
            InputPoint { hash, index }
        })
    }

    pub fn is_spent(&self, file: &Mmfile, spent: &OutputPoint) -> bool {
        self.get(file, spent).is_some()
    }

    /// Forget that `spent` was spent. Used when popping the block whose
    /// transaction consumed it.
    pub fn remove(&mut self, file: &mut Mmfile, spent: &OutputPoint) -> bool {
        log::debug!("spend_db: unmarking output as spent");
        self.table.unlink(file, &spent.spend_key())
    }
}

impl Default for SpendDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(bucket_count: u32) -> (tempfile::TempDir, Mmfile, SpendDatabase) {
        let dir = tempfile::tempdir().unwrap();
        let mut file = Mmfile::open(dir.path().join("spends")).unwrap();
        let mut db = SpendDatabase::new();
        db.create(&mut file, bucket_count).unwrap();
        (dir, file, db)
    }

    #[test]
    fn unspent_output_has_no_spender() {
        let (_dir, file, db) = fresh(8);
        let output = OutputPoint { hash: [1u8; HASH_LEN], index: 0 };
        assert!(!db.is_spent(&file, &output));
    }

    #[test]
    fn store_then_get_roundtrips() {
        let (_dir, mut file, mut db) = fresh(8);
        let output = OutputPoint { hash: [2u8; HASH_LEN], index: 3 };
        let spender = InputPoint { hash: [3u8; HASH_LEN], index: 1 };
        db.store(&mut file, &output, &spender).unwrap();
        assert_eq!(db.get(&file, &output), Some(spender));
    }

    #[test]
    fn remove_then_get_returns_none() {
        let (_dir, mut file, mut db) = fresh(8);
        let output = OutputPoint { hash: [6u8; HASH_LEN], index: 0 };
        let spender = InputPoint { hash: [7u8; HASH_LEN], index: 0 };
        db.store(&mut file, &output, &spender).unwrap();
        assert!(db.remove(&mut file, &output));
        assert!(!db.is_spent(&file, &output));
    }

    #[test]
    fn same_tx_different_index_lands_in_distinct_entries() {
        let (_dir, mut file, mut db) = fresh(4);
        let tx_hash = [9u8; HASH_LEN];
        let out0 = OutputPoint { hash: tx_hash, index: 0 };
        let out1 = OutputPoint { hash: tx_hash, index: 1 };
        let spender0 = InputPoint { hash: [4u8; HASH_LEN], index: 0 };
        let spender1 = InputPoint { hash: [5u8; HASH_LEN], index: 0 };
        db.store(&mut file, &out0, &spender0).unwrap();
        db.store(&mut file, &out1, &spender1).unwrap();
        assert_eq!(db.get(&file, &out0), Some(spender0));
        assert_eq!(db.get(&file, &out1), Some(spender1));
    }
}
