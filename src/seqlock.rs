//! Single-writer / many-reader coordination (§5).
//!
//! An odd sequence number means a write is in progress; readers that sample
//! an odd number, or a number that changed between the start and end of
//! their read, must retry. There's no reader-side blocking: a reader that
//! races the writer simply redoes its read. Grounded on
//! `original_source/include/bitcoin/blockchain/database/data_base.hpp`'s
//! `sequential_lock` (there a `std::atomic<size_t>`; `AtomicU64` here since
//! the wrap-around horizon matters more than matching `size_t`'s width).
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct SequentialLock {
    sequence: AtomicU64,
}

impl SequentialLock {
    pub fn new() -> Self {
        Self {
            sequence: AtomicU64::new(0),
        }
    }

    /// Sample the current sequence number. Spin until it's even (no write
    /// in progress) before handing it to the caller.
    pub fn begin_read(&self) -> u64 {
        loop {
            let value = self.sequence.load(Ordering::Acquire);
            if value % 2 == 0 {
                return value;
            }
            std::hint::spin_loop();
        }
    }

    /// `true` if nothing was written between `begin_read()` and now.
    pub fn is_read_valid(&self, started_at: u64) -> bool {
        self.sequence.load(Ordering::Acquire) == started_at
    }

    /// Mark a write as starting; bumps the sequence number to odd.
    pub fn begin_write(&self) {
        let previous = self.sequence.fetch_add(1, Ordering::AcqRel);
        debug_assert_eq!(previous % 2, 0, "begin_write called while a write was already in progress");
    }

    /// Mark a write as finished; bumps the sequence number back to even.
    pub fn end_write(&self) {
        let previous = self.sequence.fetch_add(1, Ordering::AcqRel);
        debug_assert_eq!(previous % 2, 1, "end_write called without a matching begin_write");
    }

    /// `true` between a `begin_write()` and its matching `end_write()`.
    pub fn is_write_locked(&self) -> bool {
        self.sequence.load(Ordering::Acquire) % 2 == 1
    }
}

/// Run `read` and retry it until it completes without an intervening write.
/// `read` must have no observable side effects on a torn read, since it may
/// run more than once.
pub fn read_with_retry<T>(lock: &SequentialLock, mut read: impl FnMut() -> T) -> T {
    loop {
        let start = lock.begin_read();
        let result = read();
        if lock.is_read_valid(start) {
            return result;
        }
        log::warn!("read_with_retry: torn read at sequence {start}, retrying");
    }
}
