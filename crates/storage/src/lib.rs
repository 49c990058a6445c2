// storage/src/lib.rs

//! Persistent Storage Layer
//!
//! This crate persists the darknode engine in RocksDB:
//! - The bond store and the registry logic state in separate column families
//! - The payment ledger and token ledgers
//! - A versioned schema with forward migrations

pub mod db;

pub use db::{ColumnFamily, Database, DatabaseConfig, DatabaseStats, EngineSnapshot, SCHEMA_VERSION};

use darknode_core::ErrorKind;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Unsupported schema version {found}, this build supports up to {supported}")]
    UnsupportedSchema { found: u32, supported: u32 },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

impl From<rocksdb::Error> for StorageError {
    fn from(err: rocksdb::Error) -> Self {
        StorageError::DatabaseError(err.to_string())
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}
