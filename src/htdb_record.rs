//! Chaining hash table over fixed-size records (§4.5).
//!
//! Each record is `[key: KEY_LEN][next: u32][value: VALUE_LEN]`. Buckets
//! hold a `u32` index into the record allocator, or `u32::MAX` for empty.
//! Grounded on
//! `original_source/include/bitcoin/blockchain/database/htdb_record.hpp`.
use std::marker::PhantomData;

use crate::disk_array::DiskArray;
use crate::error::Result;
use crate::mmfile::Mmfile;
use crate::record_allocator::RecordAllocator;

const NEXT_SIZE: usize = std::mem::size_of::<u32>();
const EMPTY: u32 = u32::MAX;

fn bucket_index(key: &[u8], bucket_count: u32) -> u32 {
    debug_assert!(bucket_count > 0);
    let hash = crate::types::short_hash_u64(key);
    (hash % bucket_count as u64) as u32
}

/// A chaining hash table keyed by `KEY_LEN`-byte keys, with fixed-size
/// `VALUE_LEN`-byte values, backed by a record allocator.
pub struct HtdbRecord<const KEY_LEN: usize, const VALUE_LEN: usize> {
    buckets: DiskArray<u32>,
    records: RecordAllocator,
    _marker: PhantomData<[u8; KEY_LEN]>,
}

impl<const KEY_LEN: usize, const VALUE_LEN: usize> HtdbRecord<KEY_LEN, VALUE_LEN> {
    pub const RECORD_SIZE: usize = KEY_LEN + NEXT_SIZE + VALUE_LEN;

    pub fn new(header_start: usize, records_start: usize) -> Self {
        Self {
            buckets: DiskArray::new(header_start),
            records: RecordAllocator::new(records_start, Self::RECORD_SIZE),
            _marker: PhantomData,
        }
    }

    pub fn create(&mut self, file: &mut Mmfile, bucket_count: u32) -> Result<()> {
        self.buckets.create(file, bucket_count)?;
        self.records.create(file)
    }

    pub fn start(&mut self, file: &Mmfile) -> Result<()> {
        self.buckets.start(file)?;
        self.records.start(file)
    }

    /// Insert `key`/`value`, linking in front of whatever the bucket
    /// currently points at. Does not check for an existing `key` — callers
    /// that need upsert semantics (none of the five engines do) must check
    /// first with `get`.
    pub fn store(&mut self, file: &mut Mmfile, key: &[u8; KEY_LEN], value: &[u8; VALUE_LEN]) -> Result<()> {
        let bucket = bucket_index(key, self.buckets.bucket_count());
        let previous_head = self.buckets.read(file, bucket);

        let index = self.records.allocate(file)?;
        let record = self.records.get_mut(file, index);
        record[..KEY_LEN].copy_from_slice(key);
        record[KEY_LEN..KEY_LEN + NEXT_SIZE].copy_from_slice(&previous_head.to_le_bytes());
        record[KEY_LEN + NEXT_SIZE..].copy_from_slice(value);

        self.buckets.write(file, bucket, index);
        Ok(())
    }

    /// Walk `key`'s chain and return a copy of the matching value, if any.
    pub fn get(&self, file: &Mmfile, key: &[u8; KEY_LEN]) -> Option<[u8; VALUE_LEN]> {
        let bucket = bucket_index(key, self.buckets.bucket_count());
        let mut current = self.buckets.read(file, bucket);

        while current != EMPTY {
            let record = self.records.get(file, current);
            if &record[..KEY_LEN] == key.as_slice() {
                let mut value = [0u8; VALUE_LEN];
                value.copy_from_slice(&record[KEY_LEN + NEXT_SIZE..]);
                return Some(value);
            }
            current = u32::from_le_bytes(record[KEY_LEN..KEY_LEN + NEXT_SIZE].try_into().unwrap());
        }
        None
    }

    pub fn contains(&self, file: &Mmfile, key: &[u8; KEY_LEN]) -> bool {
        self.get(file, key).is_some()
    }

    /// Overwrite the value of the first record matching `key` in place,
    /// leaving its position in the chain (and every other record) untouched.
    /// Returns `false` if `key` isn't found.
    pub fn update(&mut self, file: &mut Mmfile, key: &[u8; KEY_LEN], value: &[u8; VALUE_LEN]) -> bool {
        let bucket = bucket_index(key, self.buckets.bucket_count());
        let mut current = self.buckets.read(file, bucket);

        while current != EMPTY {
            let record = self.records.get(file, current);
            if &record[..KEY_LEN] == key.as_slice() {
                self.records.get_mut(file, current)[KEY_LEN + NEXT_SIZE..].copy_from_slice(value);
                return true;
            }
            current = u32::from_le_bytes(record[KEY_LEN..KEY_LEN + NEXT_SIZE].try_into().unwrap());
        }
        false
    }

    /// Remove the first record matching `key` from its chain, rewriting
    /// either the predecessor's `next` or the bucket head. The record itself
    /// is left in place (no free list); returns `false` if `key` isn't found.
    pub fn unlink(&mut self, file: &mut Mmfile, key: &[u8; KEY_LEN]) -> bool {
        let bucket = bucket_index(key, self.buckets.bucket_count());
        let mut current = self.buckets.read(file, bucket);
        let mut previous: Option<u32> = None;

        while current != EMPTY {
            let record = self.records.get(file, current);
            let next = u32::from_le_bytes(record[KEY_LEN..KEY_LEN + NEXT_SIZE].try_into().unwrap());
            if &record[..KEY_LEN] == key.as_slice() {
                match previous {
                    Some(prev) => {
                        self.records.get_mut(file, prev)[KEY_LEN..KEY_LEN + NEXT_SIZE]
                            .copy_from_slice(&next.to_le_bytes());
                    }
                    None => self.buckets.write(file, bucket, next),
                }
                return true;
            }
            previous = Some(current);
            current = next;
        }
        false
    }

    pub fn sync(&self, file: &mut Mmfile) -> Result<()> {
        self.records.sync(file)
    }
}
