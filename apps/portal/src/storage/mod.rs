//! Durable key-value storage for client state that must survive restarts.

pub mod kv;

pub use kv::{FileStore, KeyValueStore, MemoryStore};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt store contents: {0}")]
    Serde(#[from] serde_json::Error),
}
