//! A content-addressed, height-indexed blockchain storage engine.
//!
//! Five query engines (`blocks`, `transactions`, `spends`, `history`,
//! `stealth`) are each backed by one or two growable memory-mapped files
//! (§4.1) and coordinated by [`data_base::DataBase`], which is the only
//! entry point that mutates them. Everything else in this crate —
//! allocators, hash tables, the sequence lock — is plumbing `DataBase` and
//! the engines build on.
pub mod data_base;
pub mod disk_array;
pub mod engines;
pub mod error;
pub mod htdb_record;
pub mod htdb_slab;
pub mod linked_records;
pub mod mmfile;
pub mod multimap_records;
pub mod record_allocator;
pub mod seqlock;
pub mod settings;
pub mod slab_allocator;
pub mod types;

pub use data_base::{DataBase, PoppedBlock, PushBlock, PushInput, PushOutput, PushTransaction, StealthPayload};
pub use error::{Result, StoreError};
pub use settings::Settings;
pub use types::{BlockHeader, Hash256, InputPoint, OutputPoint, ShortHash, Transaction, TxInput, TxOutput};
