//! Network error types

use thiserror::Error;

pub type NetworkResult<T> = Result<T, NetworkError>;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Message encoding error: {0}")]
    Encoding(String),

    #[error("Message too large: {size} bytes (limit {limit})")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    #[error("Network channel closed: {0}")]
    ChannelClosed(String),

    #[error("Core error: {0}")]
    Core(#[from] dpos_core::CoreError),
}
