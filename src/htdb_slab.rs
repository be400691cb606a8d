//! Chaining hash table over variable-size slabs (§4.5).
//!
//! Each row is `[key: KEY_LEN][next: u64][value bytes...]`. Buckets hold a
//! `u64` slab offset, or `u64::MAX` for empty. Grounded on
//! `original_source/include/bitcoin/blockchain/database/htdb_slab.hpp`.
use std::marker::PhantomData;

use crate::disk_array::DiskArray;
use crate::error::Result;
use crate::mmfile::Mmfile;
use crate::slab_allocator::SlabAllocator;

const NEXT_SIZE: usize = std::mem::size_of::<u64>();
const EMPTY: u64 = u64::MAX;

fn bucket_index(key: &[u8], bucket_count: u32) -> u32 {
    debug_assert!(bucket_count > 0);
    let hash = crate::types::short_hash_u64(key);
    (hash % bucket_count as u64) as u32
}

/// A chaining hash table keyed by `KEY_LEN`-byte keys, with variable-size
/// values, backed by a slab allocator.
pub struct HtdbSlab<const KEY_LEN: usize> {
    buckets: DiskArray<u64>,
    slabs: SlabAllocator,
    _marker: PhantomData<[u8; KEY_LEN]>,
}

impl<const KEY_LEN: usize> HtdbSlab<KEY_LEN> {
    pub fn new(header_start: usize, slabs_start: usize) -> Self {
        Self {
            buckets: DiskArray::new(header_start),
            slabs: SlabAllocator::new(slabs_start),
            _marker: PhantomData,
        }
    }

    pub fn create(&mut self, file: &mut Mmfile, bucket_count: u32) -> Result<()> {
        self.buckets.create(file, bucket_count)?;
        self.slabs.create(file)
    }

    pub fn start(&mut self, file: &Mmfile) -> Result<()> {
        self.buckets.start(file)?;
        self.slabs.start(file)
    }

    /// Insert `key`/`value`. `value` may vary in length call to call.
    pub fn store(&mut self, file: &mut Mmfile, key: &[u8; KEY_LEN], value: &[u8]) -> Result<u64> {
        let bucket = bucket_index(key, self.buckets.bucket_count());
        let previous_head = self.buckets.read(file, bucket);

        let row_size = KEY_LEN + NEXT_SIZE + value.len();
        let offset = self.slabs.allocate(file, row_size)?;
        let row = self.slabs.get_mut(file, offset, row_size);
        row[..KEY_LEN].copy_from_slice(key);
        row[KEY_LEN..KEY_LEN + NEXT_SIZE].copy_from_slice(&previous_head.to_le_bytes());
        row[KEY_LEN + NEXT_SIZE..].copy_from_slice(value);

        self.buckets.write(file, bucket, offset);
        Ok(offset)
    }

    /// Walk `key`'s chain. `read_value` gets the row's value bytes (which may
    /// extend to end-of-mapping — callers parse only as many bytes as their
    /// format specifies) and the matching offset, and returns whatever it
    /// wants extracted; the first non-`None` result wins.
    pub fn get<T>(
        &self,
        file: &Mmfile,
        key: &[u8; KEY_LEN],
        mut read_value: impl FnMut(&[u8]) -> Option<T>,
    ) -> Option<T> {
        let bucket = bucket_index(key, self.buckets.bucket_count());
        let mut current = self.buckets.read(file, bucket);

        while current != EMPTY {
            let row = self.slabs.get(file, current);
            if &row[..KEY_LEN] == key.as_slice() {
                if let Some(value) = read_value(&row[KEY_LEN + NEXT_SIZE..]) {
                    return Some(value);
                }
            }
            current = u64::from_le_bytes(row[KEY_LEN..KEY_LEN + NEXT_SIZE].try_into().unwrap());
        }
        None
    }

    /// Remove the first row matching `key` from its chain, rewriting either
    /// the predecessor's `next` or the bucket head. The slab bytes are left
    /// in place (slabs never reclaim space); returns `false` if not found.
    pub fn unlink(&mut self, file: &mut Mmfile, key: &[u8; KEY_LEN]) -> bool {
        let bucket = bucket_index(key, self.buckets.bucket_count());
        let mut current = self.buckets.read(file, bucket);
        let mut previous: Option<u64> = None;

        while current != EMPTY {
            let row = self.slabs.get(file, current);
            let next = u64::from_le_bytes(row[KEY_LEN..KEY_LEN + NEXT_SIZE].try_into().unwrap());
            if &row[..KEY_LEN] == key.as_slice() {
                match previous {
                    Some(prev) => {
                        self.slabs.get_mut(file, prev + KEY_LEN as u64, NEXT_SIZE)
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
        self.slabs.sync(file)
    }

    pub fn slabs(&self) -> &SlabAllocator {
        &self.slabs
    }
}
