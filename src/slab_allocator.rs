//! Variable-size slab allocator (§4.3).
//!
//! Layout at `start`: `[end_offset: u64][payload bytes...]`.
//! Grounded on `original_source/src/database/slab_allocator.cpp`.
//!
//! The `end_offset` prefix is a publication point a reader can observe
//! mid-write (§5), so it's read and written through `AtomicU64` rather than
//! a plain byte-slice copy, same as the bucket headers in
//! [`crate::disk_array`].
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, StoreError};
use crate::mmfile::Mmfile;

const SIZE_FIELD: usize = std::mem::size_of::<u64>();

pub struct SlabAllocator {
    start: usize,
    /// In-memory byte-offset of the writable tail, relative to `start`.
    /// Always includes the `SIZE_FIELD` prefix, i.e. the first slab begins
    /// at offset `SIZE_FIELD`.
    size: u64,
}

impl SlabAllocator {
    pub fn new(start: usize) -> Self {
        Self { start, size: 0 }
    }

    pub fn create(&mut self, file: &mut Mmfile) -> Result<()> {
        self.size = SIZE_FIELD as u64;
        file.reserve(self.start + SIZE_FIELD)?;
        self.sync(file)
    }

    pub fn start(&mut self, file: &Mmfile) -> Result<()> {
        let data = file.data();
        data.get(self.start..self.start + SIZE_FIELD)
            .ok_or(StoreError::CorruptHeader {
                path: file.path().to_path_buf(),
                reason: "slab allocator size prefix missing",
            })?;
        let ptr = data[self.start..self.start + SIZE_FIELD].as_ptr();
        // Safety: the slice index above proves `SIZE_FIELD` live bytes at
        // `ptr`, and this field is only ever written through `sync`'s
        // atomic store below.
        self.size = u64::from_le(unsafe { AtomicU64::from_ptr(ptr as *mut u64).load(Ordering::Acquire) });
        Ok(())
    }

    /// Reserve `bytes_needed` bytes and return their offset (relative to
    /// `start`, including the size prefix — callers pass this straight back
    /// to `get`).
    pub fn allocate(&mut self, file: &mut Mmfile, bytes_needed: usize) -> Result<u64> {
        debug_assert!(self.size > 0, "slab_allocator::start() wasn't called");
        let offset = self.size;
        let required = self.start + self.size as usize + bytes_needed;
        file.reserve(required)?;
        self.size += bytes_needed as u64;
        log::trace!("slab_allocator: allocated {bytes_needed} bytes at offset {offset}");
        Ok(offset)
    }

    pub fn get<'a>(&self, file: &'a Mmfile, offset: u64) -> &'a [u8] {
        debug_assert!(offset < self.size, "slab offset out of bounds");
        let pos = self.start + offset as usize;
        &file.data()[pos..]
    }

    pub fn get_mut<'a>(&self, file: &'a mut Mmfile, offset: u64, len: usize) -> &'a mut [u8] {
        debug_assert!(offset < self.size, "slab offset out of bounds");
        let pos = self.start + offset as usize;
        &mut file.data_mut()[pos..pos + len]
    }

    /// Remaining bytes between `offset` and the writable tail — an upper
    /// bound for parsers that must not read past what's actually allocated.
    pub fn to_eof(&self, offset: u64) -> u64 {
        self.size.saturating_sub(offset)
    }

    /// Publish the in-memory tail offset to disk as a single atomic store.
    pub fn sync(&self, file: &mut Mmfile) -> Result<()> {
        let pos = self.start;
        let ptr = file.data_mut()[pos..pos + SIZE_FIELD].as_mut_ptr();
        unsafe { AtomicU64::from_ptr(ptr as *mut u64).store(self.size.to_le(), Ordering::Release) };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> (tempfile::TempDir, Mmfile) {
        let dir = tempfile::tempdir().unwrap();
        let file = Mmfile::open(dir.path().join("slabs")).unwrap();
        (dir, file)
    }

    #[test]
    fn allocate_write_read_roundtrip() {
        let (_dir, mut file) = fresh();
        let mut slab = SlabAllocator::new(0);
        slab.create(&mut file).unwrap();

        let off = slab.allocate(&mut file, 5).unwrap();
        slab.get_mut(&mut file, off, 5).copy_from_slice(b"hello");
        assert_eq!(&slab.get(&file, off)[..5], b"hello");
    }

    #[test]
    fn to_eof_bounds_remaining_tail() {
        let (_dir, mut file) = fresh();
        let mut slab = SlabAllocator::new(0);
        slab.create(&mut file).unwrap();
        let off1 = slab.allocate(&mut file, 10).unwrap();
        let _off2 = slab.allocate(&mut file, 20).unwrap();
        assert_eq!(slab.to_eof(off1), 30);
    }

    #[test]
    fn sync_then_start_restores_size() {
        let (dir, mut file) = fresh();
        let mut slab = SlabAllocator::new(0);
        slab.create(&mut file).unwrap();
        slab.allocate(&mut file, 17).unwrap();
        slab.sync(&mut file).unwrap();
        file.flush().unwrap();
        drop(file);

        let file2 = Mmfile::open(dir.path().join("slabs")).unwrap();
        let mut slab2 = SlabAllocator::new(0);
        slab2.start(&file2).unwrap();
        assert_eq!(slab2.to_eof(8), 17);
    }
}
