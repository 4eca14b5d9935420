//! Node error types

use dpos_consensus::ConsensusError;
use dpos_core::CoreError;
use dpos_db::DbError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to write config: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("Consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Failed to initialize tracing: {0}")]
    Telemetry(String),
}

pub type NodeResult<T> = Result<T, NodeError>;
