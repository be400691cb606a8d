//! The five query engines, each owning its own backing file(s) and its own
//! slice of the address space within them (§6).
pub mod block_db;
pub mod history_db;
pub mod spend_db;
pub mod stealth_db;
pub mod transaction_db;
