//! Database traits and interfaces

use crate::column_families::ColumnFamily;
use crate::DbResult;

/// Key-value database trait
pub trait KeyValueDB: Send + Sync {
    /// Get value by key from a column family
    fn get(&self, cf: ColumnFamily, key: &[u8]) -> DbResult<Option<Vec<u8>>>;

    /// Put key-value pair into a column family
    fn put(&self, cf: ColumnFamily, key: &[u8], value: &[u8]) -> DbResult<()>;

    /// Delete key from a column family
    fn delete(&self, cf: ColumnFamily, key: &[u8]) -> DbResult<()>;

    /// Check if key exists in a column family
    fn exists(&self, cf: ColumnFamily, key: &[u8]) -> DbResult<bool> {
        Ok(self.get(cf, key)?.is_some())
    }

    /// All entries of a column family in key order
    fn iter(&self, cf: ColumnFamily) -> DbResult<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Flush memtables to disk
    fn flush(&self) -> DbResult<()>;
}
