//! Black-box scenarios against the full `DataBase` facade (§8).
use ledger_store::data_base::{PushBlock, PushInput, PushOutput, PushTransaction};
use ledger_store::types::{hash256, BlockHeader, OutputPoint, HASH_LEN, SHORT_HASH_LEN};
use ledger_store::{DataBase, Settings};

fn fresh_db(dir: &tempfile::TempDir) -> DataBase {
    let mut settings = Settings::new(dir.path());
    settings
        .block_buckets(8)
        .transaction_buckets(8)
        .spend_buckets(8)
        .history_buckets(8);
    let mut db = DataBase::open(settings).unwrap();
    db.create().unwrap();
    db.start().unwrap();
    db
}

fn header(nonce: u32, previous: [u8; HASH_LEN]) -> BlockHeader {
    BlockHeader {
        version: 1,
        previous_block_hash: previous,
        merkle_root: [0u8; HASH_LEN],
        timestamp: 1_700_000_000 + nonce,
        bits: 0x1d00ffff,
        nonce,
    }
}

fn coinbase_block(nonce: u32, previous: [u8; HASH_LEN], address: [u8; SHORT_HASH_LEN]) -> PushBlock {
    PushBlock {
        header: header(nonce, previous),
        transactions: vec![PushTransaction {
            raw: format!("coinbase-{nonce}").into_bytes(),
            inputs: vec![],
            outputs: vec![PushOutput { value: 5_000_000_000, address, stealth: None }],
        }],
    }
}

#[test]
fn empty_chain_has_no_top_and_no_genesis() {
    let dir = tempfile::tempdir().unwrap();
    let db = fresh_db(&dir);
    assert_eq!(db.blocks.top(), None);
    assert!(db.blocks.get_by_height(&db.blocks_lookup, &db.blocks_rows, 0).is_none());
}

#[test]
fn genesis_insertion_is_queryable_by_height_and_hash() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = fresh_db(&dir);
    let address = [1u8; SHORT_HASH_LEN];
    let block = coinbase_block(0, [0u8; HASH_LEN], address);
    let block_hash = block.header.hash();
    db.push(block.clone()).unwrap();

    assert_eq!(db.blocks.top(), Some(0));
    let by_height = db.blocks.get_by_height(&db.blocks_lookup, &db.blocks_rows, 0).unwrap();
    assert_eq!(by_height.header, block.header);
    let by_hash = db.blocks.get_by_hash(&db.blocks_lookup, &block_hash).unwrap();
    assert_eq!(by_hash.height, 0);

    let tx_hash = hash256(b"coinbase-0");
    let record = db.transactions.get(&db.transactions_file, &tx_hash).unwrap();
    assert_eq!(record.height, 0);
    assert_eq!(record.index, 0);
}

#[test]
fn linear_growth_tracks_height_for_every_block() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = fresh_db(&dir);
    let address = [2u8; SHORT_HASH_LEN];
    let mut previous = [0u8; HASH_LEN];
    for h in 0..20u32 {
        let block = coinbase_block(h, previous, address);
        previous = block.header.hash();
        let height = db.push(block).unwrap();
        assert_eq!(height, h);
    }
    assert_eq!(db.blocks.top(), Some(19));
    for h in 0..20u32 {
        let record = db.blocks.get_by_height(&db.blocks_lookup, &db.blocks_rows, h).unwrap();
        assert_eq!(record.height, h);
    }
}

#[test]
fn reorg_push_then_pop_unwinds_a_spend() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = fresh_db(&dir);
    let miner = [3u8; SHORT_HASH_LEN];
    let spender = [4u8; SHORT_HASH_LEN];

    db.push(coinbase_block(0, [0u8; HASH_LEN], miner)).unwrap();
    let coinbase_hash = hash256(b"coinbase-0");
    let spent = OutputPoint { hash: coinbase_hash, index: 0 };

    let spend_block = PushBlock {
        header: header(1, [0u8; HASH_LEN]),
        transactions: vec![PushTransaction {
            raw: b"spend-tx".to_vec(),
            inputs: vec![PushInput { previous_output: spent, previous_output_address: miner }],
            outputs: vec![PushOutput { value: 4_000_000_000, address: spender, stealth: None }],
        }],
    };
    db.push(spend_block).unwrap();
    assert_eq!(db.blocks.top(), Some(1));
    assert!(db.spends.is_spent(&db.spends_file, &spent));

    let popped = db.pop().unwrap();
    assert_eq!(popped.transactions, vec![b"spend-tx".to_vec()]);
    assert_eq!(db.blocks.top(), Some(0));
    assert!(!db.spends.is_spent(&db.spends_file, &spent));
}

#[test]
fn address_history_orders_rows_newest_first_and_filters_by_height() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = fresh_db(&dir);
    let address = [5u8; SHORT_HASH_LEN];

    db.push(coinbase_block(0, [0u8; HASH_LEN], address)).unwrap();
    db.push(coinbase_block(1, [0u8; HASH_LEN], address)).unwrap();
    db.push(coinbase_block(2, [0u8; HASH_LEN], address)).unwrap();

    let all = db.history.get(&db.history_lookup, &db.history_rows, &address, None, 0);
    assert_eq!(all.len(), 3);
    assert!(matches!(all[0], ledger_store::engines::history_db::HistoryRow::Output { height: 2, .. }));

    let recent = db.history.get(&db.history_lookup, &db.history_rows, &address, None, 2);
    assert_eq!(recent.len(), 1);
}

#[test]
fn reader_snapshot_survives_a_concurrent_push() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = fresh_db(&dir);
    let address = [6u8; SHORT_HASH_LEN];
    db.push(coinbase_block(0, [0u8; HASH_LEN], address)).unwrap();

    let started_at = db.start_read();
    // No write happened between start_read and here, so the snapshot is
    // still valid and the height observed is consistent.
    let top_before = db.blocks.top();
    assert!(db.is_read_valid(started_at));
    assert_eq!(top_before, Some(0));

    db.push(coinbase_block(1, [0u8; HASH_LEN], address)).unwrap();
    assert!(!db.is_read_valid(started_at));
}
