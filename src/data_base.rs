//! Top-level coordinator: owns every backing file and query engine, and is
//! the only thing that may mutate them (§4.8). Grounded on
//! `original_source/include/bitcoin/blockchain/database/data_base.hpp` and
//! its `data_base.cpp`, which own the same eight files, the same five
//! engines, and the same `push`/`pop` shape.
//!
//! Script interpretation and address/stealth-payload derivation are out of
//! scope here (§1): callers hand in a [`PushBlock`] whose addresses and
//! stealth payloads are already computed, rather than this module parsing
//! output scripts itself.
use std::fs::{File, OpenOptions};

use fs4::fs_std::FileExt;
use log::debug;

use crate::engines::block_db::BlockDatabase;
use crate::engines::history_db::HistoryDatabase;
use crate::engines::spend_db::SpendDatabase;
use crate::engines::stealth_db::{StealthDatabase, StealthRow};
use crate::engines::transaction_db::TransactionDatabase;
use crate::error::{Result, StoreError};
use crate::mmfile::Mmfile;
use crate::seqlock::SequentialLock;
use crate::settings::Settings;
use crate::types::{BlockHeader, Hash256, InputPoint, OutputPoint, ShortHash};

/// A stealth payload attached to one output, ready to store verbatim.
#[derive(Debug, Clone, Copy)]
pub struct StealthPayload {
    pub prefix: u32,
    pub ephemeral_key_x: [u8; 32],
}

/// One output of a [`PushTransaction`], with its indexing address already
/// derived from the output script by the caller.
#[derive(Debug, Clone)]
pub struct PushOutput {
    pub value: u64,
    pub address: ShortHash,
    pub stealth: Option<StealthPayload>,
}

/// One input of a [`PushTransaction`]. Coinbase inputs (which spend nothing)
/// are represented by an empty `transactions` input list, not by a sentinel
/// here.
#[derive(Debug, Clone)]
pub struct PushInput {
    pub previous_output: OutputPoint,
    /// Indexing address of the output being spent, looked up by the caller
    /// (typically from its own previously pushed history) before calling
    /// `push`.
    pub previous_output_address: ShortHash,
}

/// A transaction to be pushed, with its wire bytes and pre-derived indexing
/// metadata for every input and output.
#[derive(Debug, Clone)]
pub struct PushTransaction {
    pub raw: Vec<u8>,
    pub inputs: Vec<PushInput>,
    pub outputs: Vec<PushOutput>,
}

/// A full block to push: a header and its ordered transactions (coinbase
/// first).
#[derive(Debug, Clone)]
pub struct PushBlock {
    pub header: BlockHeader,
    pub transactions: Vec<PushTransaction>,
}

/// What a [`DataBase::pop`] call undid: the header and every transaction's
/// raw bytes, in their original order.
#[derive(Debug, Clone)]
pub struct PoppedBlock {
    pub header: BlockHeader,
    pub transactions: Vec<Vec<u8>>,
}

/// Bookkeeping for one pushed transaction, enough to reverse it in `pop`.
/// Held only in memory: crash recovery is out of scope (§5), so there's
/// nothing to gain from persisting it.
struct PushedTxUndo {
    hash: Hash256,
    output_addresses: Vec<ShortHash>,
    spent: Vec<(OutputPoint, ShortHash)>,
}

struct PushedBlockUndo {
    transactions: Vec<PushedTxUndo>,
}

/// Owns the eight backing files and five query engines that make up a
/// running chain store, plus the directory lock and the reader/writer
/// coordination lock.
pub struct DataBase {
    settings: Settings,
    lock_file: Option<File>,
    sequence: SequentialLock,

    pub blocks_lookup: Mmfile,
    pub blocks_rows: Mmfile,
    pub transactions_file: Mmfile,
    pub spends_file: Mmfile,
    pub history_lookup: Mmfile,
    pub history_rows: Mmfile,
    pub stealth_index: Mmfile,
    pub stealth_rows: Mmfile,

    pub blocks: BlockDatabase,
    pub transactions: TransactionDatabase,
    pub spends: SpendDatabase,
    pub history: HistoryDatabase,
    pub stealth: StealthDatabase,

    undo: Vec<PushedBlockUndo>,
}

impl DataBase {
    /// Open every backing file under `settings.directory()`, creating
    /// whichever don't yet exist. Does not initialize on-disk layout (call
    /// [`Self::create`] for a brand-new directory) or take the directory
    /// lock (call [`Self::start`] before any query or mutation).
    pub fn open(settings: Settings) -> Result<Self> {
        Ok(Self {
            blocks_lookup: Mmfile::open(settings.blocks_lookup_path())?,
            blocks_rows: Mmfile::open(settings.blocks_rows_path())?,
            transactions_file: Mmfile::open(settings.transactions_path())?,
            spends_file: Mmfile::open(settings.spends_path())?,
            history_lookup: Mmfile::open(settings.history_lookup_path())?,
            history_rows: Mmfile::open(settings.history_rows_path())?,
            stealth_index: Mmfile::open(settings.stealth_index_path())?,
            stealth_rows: Mmfile::open(settings.stealth_rows_path())?,

            blocks: BlockDatabase::new(),
            transactions: TransactionDatabase::new(),
            spends: SpendDatabase::new(),
            history: HistoryDatabase::new(),
            stealth: StealthDatabase::new(),

            settings,
            lock_file: None,
            sequence: SequentialLock::new(),
            undo: Vec::new(),
        })
    }

    /// Lay down fresh on-disk structures for every engine. Only valid on a
    /// directory that has never held this database before.
    pub fn create(&mut self) -> Result<()> {
        self.blocks.create(&mut self.blocks_lookup, &mut self.blocks_rows, self.settings.block_buckets_count())?;
        self.transactions.create(&mut self.transactions_file, self.settings.transaction_buckets_count())?;
        self.spends.create(&mut self.spends_file, self.settings.spend_buckets_count())?;
        self.history.create(&mut self.history_lookup, &mut self.history_rows, self.settings.history_buckets_count())?;
        self.stealth.create(&mut self.stealth_rows, &mut self.stealth_index)?;
        Ok(())
    }

    /// Acquire the directory lock and load every engine's on-disk header.
    /// Must complete before any query, `push`, or `pop`.
    pub fn start(&mut self) -> Result<()> {
        let lock_path = self.settings.block_lock_path();
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|source| StoreError::Io { path: lock_path.clone(), source })?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::AlreadyOpen { path: lock_path })?;
        self.lock_file = Some(lock_file);

        self.blocks.start(&self.blocks_lookup, &self.blocks_rows)?;
        self.transactions.start(&self.transactions_file)?;
        self.spends.start(&self.spends_file)?;
        self.history.start(&self.history_lookup, &self.history_rows)?;
        self.stealth.start(&self.stealth_rows, &self.stealth_index)?;
        debug!("data_base started at height {:?}", self.blocks.top());
        Ok(())
    }

    /// Flush every file (unless disabled via [`Settings::sync_on_stop`]) and
    /// release the directory lock.
    pub fn stop(&mut self) -> Result<()> {
        if self.settings.sync_on_stop_enabled() {
            self.blocks_lookup.flush()?;
            self.blocks_rows.flush()?;
            self.transactions_file.flush()?;
            self.spends_file.flush()?;
            self.history_lookup.flush()?;
            self.history_rows.flush()?;
            self.stealth_index.flush()?;
            self.stealth_rows.flush()?;
        }
        self.lock_file = None;
        Ok(())
    }

    pub fn is_write_locked(&self) -> bool {
        self.sequence.is_write_locked()
    }

    pub fn start_read(&self) -> u64 {
        self.sequence.begin_read()
    }

    pub fn is_read_valid(&self, started_at: u64) -> bool {
        self.sequence.is_read_valid(started_at)
    }

    fn start_write(&self) {
        self.sequence.begin_write();
    }

    fn end_write(&self) {
        self.sequence.end_write();
    }

    /// Append `block` at `top height + 1` (or height 0 for the first
    /// block). Returns the height it was stored at.
    pub fn push(&mut self, block: PushBlock) -> Result<u32> {
        self.start_write();
        let result = self.push_inner(block);
        self.end_write();
        result
    }

    fn push_inner(&mut self, block: PushBlock) -> Result<u32> {
        let height = self.blocks.top().map(|top| top + 1).unwrap_or(0);

        let mut block_undo = PushedBlockUndo { transactions: Vec::new() };
        let mut tx_hashes = Vec::with_capacity(block.transactions.len());

        for (tx_index, tx) in block.transactions.iter().enumerate() {
            let hash: Hash256 = crate::types::hash256(&tx.raw);
            self.transactions.store(&mut self.transactions_file, &hash, height, tx_index as u32, &tx.raw)?;

            let mut output_addresses = Vec::with_capacity(tx.outputs.len());
            for (output_index, output) in tx.outputs.iter().enumerate() {
                let point = OutputPoint { hash, index: output_index as u32 };
                self.history.add_output(
                    &mut self.history_lookup,
                    &mut self.history_rows,
                    &output.address,
                    point,
                    height,
                    output.value,
                )?;
                output_addresses.push(output.address);

                if let Some(stealth) = output.stealth {
                    self.stealth.store(
                        &mut self.stealth_rows,
                        &StealthRow {
                            prefix: stealth.prefix,
                            ephemeral_key_x: stealth.ephemeral_key_x,
                            address_hash: output.address,
                            transaction_hash: hash,
                        },
                    )?;
                }
            }

            let mut spent = Vec::with_capacity(tx.inputs.len());
            for (input_index, input) in tx.inputs.iter().enumerate() {
                let spender = InputPoint { hash, index: input_index as u32 };
                self.spends.store(&mut self.spends_file, &input.previous_output, &spender)?;
                self.history.add_spend(
                    &mut self.history_lookup,
                    &mut self.history_rows,
                    &input.previous_output_address,
                    spender,
                    height,
                    input.previous_output.checksum(),
                )?;
                spent.push((input.previous_output, input.previous_output_address));
            }

            block_undo.transactions.push(PushedTxUndo { hash, output_addresses, spent });
            tx_hashes.push(hash);
        }

        self.blocks.store(&mut self.blocks_lookup, &mut self.blocks_rows, height, &block.header, &tx_hashes)?;
        self.stealth.sync(&mut self.stealth_rows, &mut self.stealth_index, height)?;
        self.transactions.sync(&mut self.transactions_file)?;
        self.spends.sync(&mut self.spends_file)?;
        self.history.sync(&mut self.history_lookup, &mut self.history_rows)?;
        self.blocks.sync(&mut self.blocks_lookup, &mut self.blocks_rows)?;

        self.undo.push(block_undo);
        debug!("pushed block {height}");
        Ok(height)
    }

    /// Undo the most recently pushed block, reversing every history, spend,
    /// and transaction entry it added in LIFO order.
    pub fn pop(&mut self) -> Result<PoppedBlock> {
        self.start_write();
        let result = self.pop_inner();
        self.end_write();
        result
    }

    fn pop_inner(&mut self) -> Result<PoppedBlock> {
        let height = self.blocks.top().ok_or(StoreError::EmptyDatabase)?;
        let record = self
            .blocks
            .get_by_height(&self.blocks_lookup, &self.blocks_rows, height)
            .expect("a height at or below top() must resolve");
        let block_undo = self.undo.pop().expect("undo stack desynced from blocks top()");

        let mut raw_transactions = Vec::with_capacity(block_undo.transactions.len());
        for tx_undo in block_undo.transactions.into_iter().rev() {
            for (outpoint, address) in tx_undo.spent.into_iter().rev() {
                self.spends.remove(&mut self.spends_file, &outpoint);
                self.history.delete_last_row(&mut self.history_lookup, &self.history_rows, &address)?;
            }
            for address in tx_undo.output_addresses.into_iter().rev() {
                self.history.delete_last_row(&mut self.history_lookup, &self.history_rows, &address)?;
            }
            let raw = self
                .transactions
                .get(&self.transactions_file, &tx_undo.hash)
                .map(|record| record.raw)
                .unwrap_or_default();
            self.transactions.remove(&mut self.transactions_file, &tx_undo.hash);
            raw_transactions.push(raw);
        }
        raw_transactions.reverse();

        self.blocks.unlink(height);
        self.stealth.unlink(&self.stealth_index, height);

        self.blocks.sync(&mut self.blocks_lookup, &mut self.blocks_rows)?;
        self.transactions.sync(&mut self.transactions_file)?;
        self.spends.sync(&mut self.spends_file)?;
        self.history.sync(&mut self.history_lookup, &mut self.history_rows)?;
        self.stealth.sync_counts(&mut self.stealth_rows, &mut self.stealth_index)?;

        debug!("popped block {height}");
        Ok(PoppedBlock { header: record.header, transactions: raw_transactions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HASH_LEN;

    fn fresh() -> (tempfile::TempDir, DataBase) {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::new(dir.path());
        settings
            .block_buckets(4)
            .transaction_buckets(4)
            .spend_buckets(4)
            .history_buckets(4);
        let mut db = DataBase::open(settings).unwrap();
        db.create().unwrap();
        db.start().unwrap();
        (dir, db)
    }

    fn sample_header(nonce: u32, previous: Hash256) -> BlockHeader {
        BlockHeader {
            version: 1,
            previous_block_hash: previous,
            merkle_root: [1u8; HASH_LEN],
            timestamp: 1_700_000_000,
            bits: 0x1d00ffff,
            nonce,
        }
    }

    fn coinbase_block(nonce: u32, previous: Hash256, address: ShortHash) -> PushBlock {
        PushBlock {
            header: sample_header(nonce, previous),
            transactions: vec![PushTransaction {
                raw: format!("coinbase-{nonce}").into_bytes(),
                inputs: vec![],
                outputs: vec![PushOutput { value: 5_000_000_000, address, stealth: None }],
            }],
        }
    }

    #[test]
    fn push_assigns_sequential_heights() {
        let (_dir, mut db) = fresh();
        let address = [1u8; crate::types::SHORT_HASH_LEN];
        let h0 = db.push(coinbase_block(0, [0u8; HASH_LEN], address)).unwrap();
        let h1 = db.push(coinbase_block(1, [0u8; HASH_LEN], address)).unwrap();
        assert_eq!(h0, 0);
        assert_eq!(h1, 1);
        assert_eq!(db.blocks.top(), Some(1));
    }

    #[test]
    fn push_records_history_for_output_address() {
        let (_dir, mut db) = fresh();
        let address = [2u8; crate::types::SHORT_HASH_LEN];
        db.push(coinbase_block(0, [0u8; HASH_LEN], address)).unwrap();

        let rows = db.history.get(&db.history_lookup, &db.history_rows, &address, None, 0);
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn pop_reverses_a_pushed_block() {
        let (_dir, mut db) = fresh();
        let address = [3u8; crate::types::SHORT_HASH_LEN];
        db.push(coinbase_block(0, [0u8; HASH_LEN], address)).unwrap();

        let popped = db.pop().unwrap();
        assert_eq!(popped.transactions.len(), 1);
        assert_eq!(db.blocks.top(), None);
        assert_eq!(db.history.get(&db.history_lookup, &db.history_rows, &address, None, 0).len(), 0);
        assert!(db.transactions.get(&db.transactions_file, &crate::types::hash256(b"coinbase-0")).is_none());
    }

    #[test]
    fn pop_then_push_reuses_the_height() {
        let (_dir, mut db) = fresh();
        let address = [4u8; crate::types::SHORT_HASH_LEN];
        db.push(coinbase_block(0, [0u8; HASH_LEN], address)).unwrap();
        db.pop().unwrap();
        let height = db.push(coinbase_block(1, [0u8; HASH_LEN], address)).unwrap();
        assert_eq!(height, 0);
    }

    #[test]
    fn push_unlinks_the_spent_output_and_records_a_spend_row() {
        let (_dir, mut db) = fresh();
        let miner = [5u8; crate::types::SHORT_HASH_LEN];
        let spender = [6u8; crate::types::SHORT_HASH_LEN];
        db.push(coinbase_block(0, [0u8; HASH_LEN], miner)).unwrap();
        let coinbase_hash = crate::types::hash256(b"coinbase-0");
        let spent = OutputPoint { hash: coinbase_hash, index: 0 };

        let spend_block = PushBlock {
            header: sample_header(1, [0u8; HASH_LEN]),
            transactions: vec![PushTransaction {
                raw: b"spend-tx".to_vec(),
                inputs: vec![PushInput { previous_output: spent, previous_output_address: miner }],
                outputs: vec![PushOutput { value: 4_000_000_000, address: spender, stealth: None }],
            }],
        };
        db.push(spend_block).unwrap();
        assert!(db.spends.is_spent(&db.spends_file, &spent));

        db.pop().unwrap();
        assert!(!db.spends.is_spent(&db.spends_file, &spent));
    }

    #[test]
    fn pop_on_an_empty_database_returns_an_error_instead_of_panicking() {
        let (_dir, mut db) = fresh();
        assert!(matches!(db.pop(), Err(StoreError::EmptyDatabase)));
    }

    #[test]
    fn second_start_on_the_same_directory_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::new(dir.path());
        settings.block_buckets(4).transaction_buckets(4).spend_buckets(4).history_buckets(4);
        let mut first = DataBase::open(settings.clone()).unwrap();
        first.create().unwrap();
        first.start().unwrap();

        let mut second = DataBase::open(settings).unwrap();
        assert!(matches!(second.start(), Err(StoreError::AlreadyOpen { .. })));
    }
}
