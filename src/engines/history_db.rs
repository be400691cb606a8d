//! History database: per-address (short-hash-keyed) chain of output/spend
//! rows (§6.4).
//!
//! Row layout: `[kind: u8][point: 36][height: u32][value_or_checksum: u64]`.
//! `kind == 0` is an output row (`value_or_checksum` is the output's value
//! in satoshis); `kind == 1` is a spend row (`value_or_checksum` is
//! `OutputPoint::checksum()` of the output it spends, linking the spend
//! back to its output without storing the full 36-byte outpoint twice).
//! Grounded on `original_source/src/database/history_database.cpp`.
use crate::error::Result;
use crate::mmfile::Mmfile;
use crate::multimap_records::MultimapRecords;
use crate::types::{InputPoint, OutputPoint, ShortHash, SHORT_HASH_LEN};

pub const ROW_SIZE: usize = 1 + OutputPoint::SERIALIZED_LEN + 4 + 8;

const KIND_OUTPUT: u8 = 0;
const KIND_SPEND: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryRow {
    Output {
        point: OutputPoint,
        height: u32,
        value: u64,
    },
    Spend {
        point: InputPoint,
        height: u32,
        spent_checksum: u64,
    },
}

impl HistoryRow {
    fn encode(&self) -> [u8; ROW_SIZE] {
        let mut row = [0u8; ROW_SIZE];
        match self {
            HistoryRow::Output { point, height, value } => {
                row[0] = KIND_OUTPUT;
                row[1..1 + OutputPoint::SERIALIZED_LEN].copy_from_slice(&point.to_bytes());
                let pos = 1 + OutputPoint::SERIALIZED_LEN;
                row[pos..pos + 4].copy_from_slice(&height.to_le_bytes());
                row[pos + 4..].copy_from_slice(&value.to_le_bytes());
            }
            HistoryRow::Spend { point, height, spent_checksum } => {
                row[0] = KIND_SPEND;
                row[1..1 + 32].copy_from_slice(&point.hash);
                row[1 + 32..1 + 36].copy_from_slice(&point.index.to_le_bytes());
                let pos = 1 + OutputPoint::SERIALIZED_LEN;
                row[pos..pos + 4].copy_from_slice(&height.to_le_bytes());
                row[pos + 4..].copy_from_slice(&spent_checksum.to_le_bytes());
            }
        }
        row
    }

    fn decode(row: &[u8]) -> Self {
        let kind = row[0];
        let point_bytes: [u8; OutputPoint::SERIALIZED_LEN] =
            row[1..1 + OutputPoint::SERIALIZED_LEN].try_into().unwrap();
        let pos = 1 + OutputPoint::SERIALIZED_LEN;
        let height = u32::from_le_bytes(row[pos..pos + 4].try_into().unwrap());
        let tail = u64::from_le_bytes(row[pos + 4..pos + 12].try_into().unwrap());
        match kind {
            KIND_OUTPUT => HistoryRow::Output {
                point: OutputPoint::from_bytes(&point_bytes),
                height,
                value: tail,
            },
            KIND_SPEND => {
                let outpoint = OutputPoint::from_bytes(&point_bytes);
                HistoryRow::Spend {
                    point: InputPoint {
                        hash: outpoint.hash,
                        index: outpoint.index,
                    },
                    height,
                    spent_checksum: tail,
                }
            }
            other => unreachable!("history row has unknown kind marker {other}"),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            HistoryRow::Output { height, .. } | HistoryRow::Spend { height, .. } => *height,
        }
    }
}

pub struct HistoryDatabase {
    rows: MultimapRecords<SHORT_HASH_LEN>,
}

impl HistoryDatabase {
    pub fn new() -> Self {
        Self {
            rows: MultimapRecords::new(ROW_SIZE),
        }
    }

    pub fn create(&mut self, lookup: &mut Mmfile, rows_file: &mut Mmfile, bucket_count: u32) -> Result<()> {
        self.rows.create(lookup, rows_file, bucket_count)
    }

    pub fn start(&mut self, lookup: &Mmfile, rows_file: &Mmfile) -> Result<()> {
        self.rows.start(lookup, rows_file)
    }

    pub fn sync(&self, lookup: &mut Mmfile, rows_file: &mut Mmfile) -> Result<()> {
        self.rows.sync(lookup, rows_file)
    }

    pub fn add_output(
        &mut self,
        lookup: &mut Mmfile,
        rows_file: &mut Mmfile,
        address: &ShortHash,
        point: OutputPoint,
        height: u32,
        value: u64,
    ) -> Result<()> {
        let row = HistoryRow::Output { point, height, value };
        log::debug!("history_db: added output row at height {height}");
        self.rows.add_row(lookup, rows_file, address, &row.encode())
    }

    pub fn add_spend(
        &mut self,
        lookup: &mut Mmfile,
        rows_file: &mut Mmfile,
        address: &ShortHash,
        point: InputPoint,
        height: u32,
        spent_checksum: u64,
    ) -> Result<()> {
        let row = HistoryRow::Spend { point, height, spent_checksum };
        log::debug!("history_db: added spend row at height {height}");
        self.rows.add_row(lookup, rows_file, address, &row.encode())
    }

    /// Rows for `address`, most recent first, optionally limited to the
    /// first `limit` entries and/or those at or above `from_height`.
    /// `limit = None` returns every matching row.
    pub fn get(
        &self,
        lookup: &Mmfile,
        rows_file: &Mmfile,
        address: &ShortHash,
        limit: Option<usize>,
        from_height: u32,
    ) -> Vec<HistoryRow> {
        self.rows
            .get(lookup, rows_file, address)
            .map(HistoryRow::decode)
            .filter(|row| row.height() >= from_height)
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }

    /// Undo the most recently added row for `address` (output or spend).
    /// Used when popping a block during a reorg.
    pub fn delete_last_row(&mut self, lookup: &mut Mmfile, rows_file: &Mmfile, address: &ShortHash) -> Result<()> {
        log::debug!("history_db: undoing most recent row");
        self.rows.delete_last_row(lookup, rows_file, address)
    }
}

impl Default for HistoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}
