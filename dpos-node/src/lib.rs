//! dPoS masternode node
//!
//! Configuration loading, tracing setup and the wiring that runs the
//! consensus controller with its background tasks.

pub mod config;
pub mod error;
pub mod service;
pub mod telemetry;

pub use config::{DevnetConfig, LoggingConfig, NodeConfig, StorageBackend};
pub use error::{NodeError, NodeResult};
pub use service::{open_store, Devnet, DposService};
pub use telemetry::init_tracing;
