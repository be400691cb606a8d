//! Transaction database: hash-keyed transaction storage (§6.2).
//!
//! Slab row layout: `[height: u32][index: u32][raw transaction bytes]`.
//! Grounded on `original_source/src/database/transaction_database.cpp`.
use crate::error::Result;
use crate::htdb_slab::HtdbSlab;
use crate::mmfile::Mmfile;
use crate::types::{Hash256, HASH_LEN};

pub struct TransactionRecord {
    pub height: u32,
    pub index: u32,
    pub raw: Vec<u8>,
}

pub struct TransactionDatabase {
    table: HtdbSlab<HASH_LEN>,
}

impl TransactionDatabase {
    pub fn new() -> Self {
        let header_size = crate::disk_array::DiskArray::<u64>::header_size(0);
        Self {
            table: HtdbSlab::new(0, header_size),
        }
    }

    pub fn create(&mut self, file: &mut Mmfile, bucket_count: u32) -> Result<()> {
        self.table = HtdbSlab::new(0, crate::disk_array::DiskArray::<u64>::header_size(bucket_count));
        self.table.create(file, bucket_count)
    }

    pub fn start(&mut self, file: &Mmfile) -> Result<()> {
        self.table.start(file)
    }

    pub fn sync(&self, file: &mut Mmfile) -> Result<()> {
        self.table.sync(file)
    }

    pub fn store(
        &mut self,
        file: &mut Mmfile,
        hash: &Hash256,
        height: u32,
        index: u32,
        raw: &[u8],
    ) -> Result<()> {
        let mut row = Vec::with_capacity(8 + raw.len());
        row.extend_from_slice(&height.to_le_bytes());
        row.extend_from_slice(&index.to_le_bytes());
        row.extend_from_slice(raw);
        self.table.store(file, hash, &row)?;
        log::debug!("transaction_db: stored tx at height {height}, index {index}");
        Ok(())
    }

    pub fn get(&self, file: &Mmfile, hash: &Hash256) -> Option<TransactionRecord> {
        self.table.get(file, hash, |row| {
            let height = u32::from_le_bytes(row[0..4].try_into().unwrap());
            let index = u32::from_le_bytes(row[4..8].try_into().unwrap());
            Some(TransactionRecord {
                height,
                index,
                raw: row[8..].to_vec(),
            })
        })
    }

    pub fn contains(&self, file: &Mmfile, hash: &Hash256) -> bool {
        self.get(file, hash).is_some()
    }

    /// Forget a transaction. Used when popping the block it belongs to.
    pub fn remove(&mut self, file: &mut Mmfile, hash: &Hash256) -> bool {
        log::debug!("transaction_db: removing transaction");
        self.table.unlink(file, hash)
    }
}

impl Default for TransactionDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(bucket_count: u32) -> (tempfile::TempDir, Mmfile, TransactionDatabase) {
        let dir = tempfile::tempdir().unwrap();
        let mut file = Mmfile::open(dir.path().join("txs")).unwrap();
        let mut db = TransactionDatabase::new();
        db.create(&mut file, bucket_count).unwrap();
        (dir, file, db)
    }

    #[test]
    fn store_then_get_roundtrips() {
        let (_dir, mut file, mut db) = fresh(8);
        let hash = [5u8; HASH_LEN];
        db.store(&mut file, &hash, 100, 2, b"raw-tx-bytes").unwrap();

        let record = db.get(&file, &hash).unwrap();
        assert_eq!(record.height, 100);
        assert_eq!(record.index, 2);
        assert_eq!(record.raw, b"raw-tx-bytes");
    }

    #[test]
    fn remove_then_get_returns_none() {
        let (_dir, mut file, mut db) = fresh(8);
        let hash = [6u8; HASH_LEN];
        db.store(&mut file, &hash, 1, 0, b"raw").unwrap();
        assert!(db.remove(&mut file, &hash));
        assert!(db.get(&file, &hash).is_none());
    }

    #[test]
    fn missing_hash_returns_none() {
        let (_dir, file, db) = fresh(8);
        assert!(db.get(&file, &[0u8; HASH_LEN]).is_none());
        assert!(!db.contains(&file, &[0u8; HASH_LEN]));
    }
}
