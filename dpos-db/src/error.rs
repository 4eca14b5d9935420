//! Database error types

use dpos_consensus::ConsensusError;
use dpos_core::CoreError;
use thiserror::Error;

/// Database error type
#[derive(Error, Debug)]
pub enum DbError {
    /// RocksDB error
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Column family missing from the opened database
    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),

    /// Stored key with an unexpected layout
    #[error("Invalid key of {0} bytes")]
    InvalidKey(usize),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<CoreError> for DbError {
    fn from(err: CoreError) -> Self {
        DbError::Serialization(err.to_string())
    }
}

impl From<DbError> for ConsensusError {
    fn from(err: DbError) -> Self {
        ConsensusError::Storage(err.to_string())
    }
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;
