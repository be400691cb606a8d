//! A growable, memory-mapped file region (§4.1).
//!
//! Modeled on the teacher crate's `storage.rs`: the map is a `memmap2::MmapRaw`
//! rather than a borrow-checked `Mmap`/`MmapMut`, because the concurrency model
//! (§5) needs the same bytes reachable from a writer thread (through `&mut
//! Mmfile`) and from reader threads that never hold a `Mmfile` at all (they
//! validate what they read against the sequence lock instead of relying on
//! Rust's aliasing rules — see `seqlock.rs`). `MmapRaw` is exactly the type
//! `memmap2` provides for this documented-unsafe sharing pattern.
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::{MmapOptions, MmapRaw, RemapOptions};

use crate::error::{Result, StoreError};

/// The initial file size used for a freshly created file: just large enough
/// to hold a count/size prefix, so `start()` always has something to read.
pub const MIN_FILE_SIZE: usize = 8;

pub struct Mmfile {
    path: PathBuf,
    file: File,
    map: MmapRaw,
    /// The logical mapped length. May be <= the file's actual length if the
    /// OS rounded the mapping up to a page boundary; callers never read past
    /// this bound.
    size: usize,
}

impl Mmfile {
    /// Map `path` read/write, creating it if it doesn't exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| {
                log::error!("mmfile: failed to open `{}`: {source}", path.display());
                StoreError::Io { path: path.clone(), source }
            })?;

        let mut len = file.metadata().map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?.len() as usize;

        if len == 0 {
            file.set_len(MIN_FILE_SIZE as u64)
                .map_err(|source| StoreError::Io {
                    path: path.clone(),
                    source,
                })?;
            len = MIN_FILE_SIZE;
        }

        let map = MmapOptions::new()
            .len(len)
            .map_raw(&file)
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            path,
            file,
            map,
            size: len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current mapped length in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Read-only view of the mapped region, valid until the next `resize`.
    pub fn data(&self) -> &[u8] {
        // Safety: `map` covers at least `self.size` bytes (we only ever grow
        // the mapping to cover at least what we just set `self.size` to) and
        // the borrow on `&self` prevents a concurrent `resize` (which needs
        // `&mut self`) within this thread.
        unsafe { std::slice::from_raw_parts(self.map.as_ptr(), self.size) }
    }

    /// Mutable view of the mapped region, valid until the next `resize`.
    pub fn data_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.map.as_mut_ptr(), self.size) }
    }

    /// Grow the file and remap it. `new_size < size()` is accepted but the
    /// engine never calls it that way.
    pub fn resize(&mut self, new_size: usize) -> Result<()> {
        if new_size <= self.size {
            return Ok(());
        }

        self.file.set_len(new_size as u64).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;

        // Try to grow the existing mapping in place first (cheap, and avoids
        // invalidating unrelated pages); fall back to a fresh map if the
        // platform can't do it (matches the teacher's `storage.rs`, which
        // tries `remap` before falling back to a brand-new `MmapOptions`
        // map).
        match self.map.remap(new_size, RemapOptions::new().may_move(true)) {
            Ok(()) => {}
            Err(_) => {
                let map = MmapOptions::new()
                    .len(new_size)
                    .map_raw(&self.file)
                    .map_err(|source| StoreError::Io {
                        path: self.path.clone(),
                        source,
                    })?;
                self.map = map;
            }
        }

        self.size = new_size;
        Ok(())
    }

    /// Grow to at least `required` bytes, using a 1.5x amortized growth
    /// policy so repeated small allocations don't each trigger a remap.
    pub fn reserve(&mut self, required: usize) -> Result<()> {
        if required <= self.size {
            return Ok(());
        }
        let grown = self.size + self.size / 2;
        self.resize(required.max(grown))
    }

    /// Flush dirty pages to the backing file.
    pub fn flush(&self) -> Result<()> {
        self.map.flush().map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}
