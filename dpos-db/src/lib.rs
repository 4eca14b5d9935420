//! dPoS consensus database layer
//!
//! Persists vice blocks, round votes and transaction votes keyed by the tip
//! they belong to, so a restarted node can replay its consensus state.

pub mod column_families;
pub mod error;
pub mod kv;
pub mod memory;
pub mod store;
pub mod traits;

pub use column_families::ColumnFamily;
pub use error::{DbError, DbResult};
pub use kv::{Database, DatabaseConfig};
pub use memory::MemoryDatabase;
pub use store::DposDb;
pub use traits::KeyValueDB;
