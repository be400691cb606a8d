use thiserror::Error;

/// Unified error type for every fallible operation in the crate.
///
/// `NotFound` is deliberately absent: a missing hash or height lookup is an
/// empty `Option`, never an `Err`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Opening, mapping, or resizing a backing file failed.
    #[error("I/O failure on `{path}`")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A bucket header's on-disk `bucket_count` doesn't match the region the
    /// file actually reserves for it, or a count field is otherwise
    /// inconsistent with the file's size. Detected at `start()`.
    #[error("corrupt header in `{path}`: {reason}")]
    CorruptHeader {
        path: std::path::PathBuf,
        reason: &'static str,
    },

    /// The directory lock is already held by another process/session.
    #[error("database at `{path}` is already open in another session")]
    AlreadyOpen { path: std::path::PathBuf },

    /// A value was too large to encode in the space the caller reserved.
    #[error("value of {len} bytes does not fit in {capacity}-byte record")]
    ValueTooLarge { len: usize, capacity: usize },

    /// `DataBase::pop` was called with no blocks stored.
    #[error("cannot pop: database is empty")]
    EmptyDatabase,
}

pub type Result<T> = std::result::Result<T, StoreError>;
