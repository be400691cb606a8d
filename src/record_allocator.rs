//! Fixed-size record allocator (§4.2).
//!
//! Layout at `start`: `[count: u32][cell 0][cell 1]...`, `cell` being
//! `record_size` bytes. Grounded on `original_source/src/database/record_allocator.cpp`.
//!
//! The `count` prefix is a publication point a reader can observe mid-write
//! (§5), so it's read and written through `AtomicU32` rather than a plain
//! byte-slice copy, same as the bucket headers in [`crate::disk_array`].
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{Result, StoreError};
use crate::mmfile::Mmfile;

const COUNT_SIZE: usize = std::mem::size_of::<u32>();

pub struct RecordAllocator {
    start: usize,
    record_size: usize,
    /// In-memory record count. Not visible on disk until `sync()`.
    count: u32,
}

impl RecordAllocator {
    pub fn new(start: usize, record_size: usize) -> Self {
        Self {
            start,
            record_size,
            count: 0,
        }
    }

    fn record_to_position(&self, record: u32) -> usize {
        COUNT_SIZE + record as usize * self.record_size
    }

    /// Initialize a brand new allocator: zero records, synced immediately.
    pub fn create(&mut self, file: &mut Mmfile) -> Result<()> {
        self.count = 0;
        file.reserve(self.start + COUNT_SIZE)?;
        self.sync(file)
    }

    /// Load the in-memory count from disk. Must be called before any other
    /// operation on a previously-created allocator.
    pub fn start(&mut self, file: &Mmfile) -> Result<()> {
        let data = file.data();
        data.get(self.start..self.start + COUNT_SIZE).ok_or(
            StoreError::CorruptHeader {
                path: file.path().to_path_buf(),
                reason: "record allocator count prefix missing",
            },
        )?;
        let ptr = data[self.start..self.start + COUNT_SIZE].as_ptr();
        // Safety: the slice index above proves `COUNT_SIZE` live bytes at
        // `ptr`, and this field is only ever written through `sync`'s
        // atomic store below.
        self.count = u32::from_le(unsafe { AtomicU32::from_ptr(ptr as *mut u32).load(Ordering::Acquire) });
        Ok(())
    }

    /// Allocate the next record, growing the file as needed. The on-disk
    /// count is not updated until `sync()`.
    pub fn allocate(&mut self, file: &mut Mmfile) -> Result<u32> {
        let index = self.count;
        let required = self.start + self.record_to_position(index + 1);
        file.reserve(required)?;
        self.count += 1;
        log::trace!("record_allocator: allocated index {index} (count now {})", self.count);
        Ok(index)
    }

    /// A read-only view of `record`'s bytes.
    pub fn get<'a>(&self, file: &'a Mmfile, record: u32) -> &'a [u8] {
        debug_assert!(record < self.count, "record index out of bounds");
        let pos = self.start + self.record_to_position(record);
        &file.data()[pos..pos + self.record_size]
    }

    /// A mutable view of `record`'s bytes.
    pub fn get_mut<'a>(&self, file: &'a mut Mmfile, record: u32) -> &'a mut [u8] {
        debug_assert!(record < self.count, "record index out of bounds");
        let pos = self.start + self.record_to_position(record);
        &mut file.data_mut()[pos..pos + self.record_size]
    }

    /// Publish the in-memory count to disk as a single atomic store.
    pub fn sync(&self, file: &mut Mmfile) -> Result<()> {
        let pos = self.start;
        let ptr = file.data_mut()[pos..pos + COUNT_SIZE].as_mut_ptr();
        unsafe { AtomicU32::from_ptr(ptr as *mut u32).store(self.count.to_le(), Ordering::Release) };
        Ok(())
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Logical truncation: never grows the count, never reclaims space.
    pub fn set_count(&mut self, records: u32) {
        debug_assert!(records <= self.count, "set_count must not grow the allocator");
        self.count = records;
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> (tempfile::TempDir, Mmfile) {
        let dir = tempfile::tempdir().unwrap();
        let file = Mmfile::open(dir.path().join("records")).unwrap();
        (dir, file)
    }

    #[test]
    fn allocate_and_write_roundtrip() {
        let (_dir, mut file) = fresh();
        let mut alloc = RecordAllocator::new(0, 8);
        alloc.create(&mut file).unwrap();

        let idx = alloc.allocate(&mut file).unwrap();
        assert_eq!(idx, 0);
        alloc.get_mut(&mut file, idx).copy_from_slice(b"hi there");
        assert_eq!(alloc.get(&file, idx), b"hi there");
        assert_eq!(alloc.count(), 1);
    }

    #[test]
    fn sync_then_start_restores_count() {
        let (dir, mut file) = fresh();
        let mut alloc = RecordAllocator::new(0, 4);
        alloc.create(&mut file).unwrap();
        for _ in 0..5 {
            alloc.allocate(&mut file).unwrap();
        }
        alloc.sync(&mut file).unwrap();
        file.flush().unwrap();
        drop(file);

        let file2 = Mmfile::open(dir.path().join("records")).unwrap();
        let mut alloc2 = RecordAllocator::new(0, 4);
        alloc2.start(&file2).unwrap();
        assert_eq!(alloc2.count(), 5);
    }

    #[test]
    fn set_count_truncates_logically_only() {
        let (_dir, mut file) = fresh();
        let mut alloc = RecordAllocator::new(0, 4);
        alloc.create(&mut file).unwrap();
        for _ in 0..10 {
            alloc.allocate(&mut file).unwrap();
        }
        let size_before = file.size();
        alloc.set_count(3);
        assert_eq!(alloc.count(), 3);
        assert_eq!(file.size(), size_before, "truncation must not shrink the file");
    }
}
