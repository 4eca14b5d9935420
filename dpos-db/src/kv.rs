//! RocksDB backend

use crate::column_families::ColumnFamily;
use crate::traits::KeyValueDB;
use crate::{DbError, DbResult};
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, DB};
use std::path::{Path, PathBuf};
use tracing::info;

/// RocksDB tuning
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    /// Write buffer size in bytes
    pub write_buffer_size: usize,
    pub max_write_buffer_number: i32,
    pub max_background_jobs: i32,
}

impl DatabaseConfig {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_buffer_size: 16 * 1024 * 1024, // 16MB
            max_write_buffer_number: 3,
            max_background_jobs: 2,
        }
    }
}

/// RocksDB database with one column family per entity kind
pub struct Database {
    db: DB,
}

impl Database {
    /// Open or create the database at `path`
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Self::open_with_config(DatabaseConfig::new(path))
    }

    pub fn open_with_config(config: DatabaseConfig) -> DbResult<Self> {
        if config.write_buffer_size == 0 {
            return Err(DbError::Config("write buffer size must be greater than 0".to_string()));
        }

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_background_jobs(config.max_background_jobs);
        opts.set_max_write_buffer_number(config.max_write_buffer_number);
        opts.set_write_buffer_size(config.write_buffer_size);

        let descriptors: Vec<_> = ColumnFamily::all()
            .iter()
            .map(|cf| ColumnFamilyDescriptor::new(cf.name(), Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, &config.path, descriptors)?;
        info!("Opened dPoS database at {}", config.path.display());
        Ok(Self { db })
    }

    fn handle(&self, cf: ColumnFamily) -> DbResult<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(cf.name())
            .ok_or_else(|| DbError::ColumnFamilyNotFound(cf.name().to_string()))
    }
}

impl KeyValueDB for Database {
    fn get(&self, cf: ColumnFamily, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        Ok(self.db.get_cf(self.handle(cf)?, key)?)
    }

    fn put(&self, cf: ColumnFamily, key: &[u8], value: &[u8]) -> DbResult<()> {
        Ok(self.db.put_cf(self.handle(cf)?, key, value)?)
    }

    fn delete(&self, cf: ColumnFamily, key: &[u8]) -> DbResult<()> {
        Ok(self.db.delete_cf(self.handle(cf)?, key)?)
    }

    fn iter(&self, cf: ColumnFamily) -> DbResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.db
            .iterator_cf(self.handle(cf)?, IteratorMode::Start)
            .map(|item| {
                let (key, value) = item?;
                Ok((key.to_vec(), value.to_vec()))
            })
            .collect()
    }

    fn flush(&self) -> DbResult<()> {
        for cf in ColumnFamily::all() {
            self.db.flush_cf(self.handle(*cf)?)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_get_delete() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path()).unwrap();

        db.put(ColumnFamily::RoundVotes, b"key", b"value").unwrap();
        assert_eq!(
            db.get(ColumnFamily::RoundVotes, b"key").unwrap(),
            Some(b"value".to_vec())
        );
        assert!(!db.exists(ColumnFamily::TxVotes, b"key").unwrap());

        db.delete(ColumnFamily::RoundVotes, b"key").unwrap();
        assert_eq!(db.get(ColumnFamily::RoundVotes, b"key").unwrap(), None);
    }

    #[test]
    fn test_iter_in_key_order() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path()).unwrap();

        db.put(ColumnFamily::ViceBlocks, b"b", b"2").unwrap();
        db.put(ColumnFamily::ViceBlocks, b"a", b"1").unwrap();

        let entries = db.iter(ColumnFamily::ViceBlocks).unwrap();
        assert_eq!(
            entries,
            vec![(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec())]
        );
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = TempDir::new().unwrap();
        {
            let db = Database::open(dir.path()).unwrap();
            db.put(ColumnFamily::TxVotes, b"key", b"value").unwrap();
            db.flush().unwrap();
        }

        let db = Database::open(dir.path()).unwrap();
        assert!(db.exists(ColumnFamily::TxVotes, b"key").unwrap());
    }
}
