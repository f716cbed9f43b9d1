// src/store/mod.rs
//
// Saved gateway accounts. The relay itself never reads these; the quota
// client resolves an account into the headers each relay call carries.
mod accounts;
mod backend;

pub use accounts::{AccountStore, ApiAccount, Record, TokenAccount};
pub use backend::{FileStore, KeyValueStore, MemoryStore};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Cannot move item {from} to {to} in a list of {len}")]
    OutOfRange { from: usize, to: usize, len: usize },
}
