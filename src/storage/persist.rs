//! RocksDB-backed persistent storage.
//!
//! Key-level operations are safe to call concurrently. Creating and dropping column
//! families is administrative; callers serialize it against traffic on the family
//! being changed.

use parking_lot::RwLock;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::StorageConfig;
use crate::error::StorageError;

pub const DEFAULT_COLUMN_FAMILY: &str = rocksdb::DEFAULT_COLUMN_FAMILY_NAME;

type Db = DBWithThreadMode<MultiThreaded>;

pub struct PersistStorage {
    db: Db,
    path: PathBuf,
    families: RwLock<BTreeSet<String>>,
    closed: bool,
}

impl PersistStorage {
    pub fn open_with(config: &StorageConfig) -> Result<Self, StorageError> {
        Self::open(&config.persist_data_path, &config.column_families)
    }

    /// Opens (or creates) the store at `path`. Families already on disk are reopened,
    /// `column_families` that do not exist yet are created.
    pub fn open<S: AsRef<str>>(path: impl AsRef<Path>, column_families: &[S]) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path).map_err(|source| StorageError::DataDir {
            path: path.clone(),
            source,
        })?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let mut families: BTreeSet<String> = Db::list_cf(&opts, &path).unwrap_or_default().into_iter().collect();
        families.insert(DEFAULT_COLUMN_FAMILY.to_string());
        families.extend(column_families.iter().map(|name| name.as_ref().to_string()));

        let descriptors = families
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
        let db = Db::open_cf_descriptors(&opts, &path, descriptors)?;

        tracing::info!(
            "Opened persistent storage at {} with column families {:?}",
            path.display(),
            families
        );

        Ok(Self {
            db,
            path,
            families: RwLock::new(families),
            closed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::MissingColumnFamily(name.to_string()))
    }

    // ── Default column family ─────────────────────────────

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.get_cf(DEFAULT_COLUMN_FAMILY, key)
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.put_cf(DEFAULT_COLUMN_FAMILY, key, value)
    }

    pub fn remove(&self, key: &[u8]) -> Result<(), StorageError> {
        self.remove_cf(DEFAULT_COLUMN_FAMILY, key)
    }

    pub fn contains_key(&self, key: &[u8]) -> Result<bool, StorageError> {
        self.contains_key_cf(DEFAULT_COLUMN_FAMILY, key)
    }

    pub fn multi_get<K: AsRef<[u8]>>(&self, keys: &[K]) -> Result<Vec<Option<Vec<u8>>>, StorageError> {
        self.multi_get_cf(DEFAULT_COLUMN_FAMILY, keys)
    }

    pub fn multi_remove<K: AsRef<[u8]>>(&self, keys: &[K]) -> Result<(), StorageError> {
        self.multi_remove_cf(DEFAULT_COLUMN_FAMILY, keys)
    }

    pub fn put_all<K, V>(&self, entries: &[(K, V)]) -> Result<(), StorageError>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        self.put_all_cf(DEFAULT_COLUMN_FAMILY, entries)
    }

    pub fn delete_range(&self, lo: &[u8], hi: &[u8]) -> Result<(), StorageError> {
        self.delete_range_cf(DEFAULT_COLUMN_FAMILY, lo, hi)
    }

    pub fn iterate<F>(&self, visitor: F) -> Result<usize, StorageError>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        self.iterate_cf(DEFAULT_COLUMN_FAMILY, visitor)
    }

    // ── Named column families ─────────────────────────────

    pub fn get_cf(&self, family: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let cf = self.cf(family)?;
        Ok(self.db.get_cf(&cf, key)?)
    }

    pub fn put_cf(&self, family: &str, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let cf = self.cf(family)?;
        self.db.put_cf(&cf, key, value)?;
        Ok(())
    }

    pub fn remove_cf(&self, family: &str, key: &[u8]) -> Result<(), StorageError> {
        let cf = self.cf(family)?;
        self.db.delete_cf(&cf, key)?;
        Ok(())
    }

    pub fn contains_key_cf(&self, family: &str, key: &[u8]) -> Result<bool, StorageError> {
        let cf = self.cf(family)?;
        Ok(self.db.get_pinned_cf(&cf, key)?.is_some())
    }

    /// Values in the same order as `keys`; `None` for absent keys.
    pub fn multi_get_cf<K: AsRef<[u8]>>(
        &self,
        family: &str,
        keys: &[K],
    ) -> Result<Vec<Option<Vec<u8>>>, StorageError> {
        let cf = self.cf(family)?;
        self.db
            .multi_get_cf(keys.iter().map(|key| (&cf, key.as_ref())))
            .into_iter()
            .map(|value| value.map_err(StorageError::from))
            .collect()
    }

    /// Removes every key in one atomic batch.
    pub fn multi_remove_cf<K: AsRef<[u8]>>(&self, family: &str, keys: &[K]) -> Result<(), StorageError> {
        let cf = self.cf(family)?;
        let mut batch = WriteBatch::default();
        for key in keys {
            batch.delete_cf(&cf, key.as_ref());
        }
        self.db.write(batch)?;
        Ok(())
    }

    /// Writes every entry in one atomic batch.
    pub fn put_all_cf<K, V>(&self, family: &str, entries: &[(K, V)]) -> Result<(), StorageError>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let cf = self.cf(family)?;
        let mut batch = WriteBatch::default();
        for (key, value) in entries {
            batch.put_cf(&cf, key.as_ref(), value.as_ref());
        }
        self.db.write(batch)?;
        tracing::debug!("Wrote batch of {} entries to '{}'", entries.len(), family);
        Ok(())
    }

    /// Removes every key in `[lo, hi)`.
    pub fn delete_range_cf(&self, family: &str, lo: &[u8], hi: &[u8]) -> Result<(), StorageError> {
        if lo > hi {
            return Err(StorageError::InvalidRange);
        }
        let cf = self.cf(family)?;
        let mut batch = WriteBatch::default();
        batch.delete_range_cf(&cf, lo, hi);
        self.db.write(batch)?;
        Ok(())
    }

    /// Streams entries in key order to `visitor` until it returns `false`. Returns the
    /// number of entries visited.
    pub fn iterate_cf<F>(&self, family: &str, mut visitor: F) -> Result<usize, StorageError>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let cf = self.cf(family)?;
        let mut visited = 0;
        for entry in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, value) = entry?;
            visited += 1;
            if !visitor(&key, &value) {
                break;
            }
        }
        Ok(visited)
    }

    // ── Administration ────────────────────────────────────

    pub fn create_column_family(&self, name: &str) -> Result<(), StorageError> {
        let mut families = self.families.write();
        if families.contains(name) {
            return Err(StorageError::ColumnFamilyExists(name.to_string()));
        }
        self.db.create_cf(name, &Options::default())?;
        families.insert(name.to_string());
        tracing::info!("Created column family '{}'", name);
        Ok(())
    }

    pub fn delete_column_family(&self, name: &str) -> Result<(), StorageError> {
        if name == DEFAULT_COLUMN_FAMILY {
            return Err(StorageError::DefaultColumnFamily);
        }
        let mut families = self.families.write();
        if !families.remove(name) {
            return Err(StorageError::MissingColumnFamily(name.to_string()));
        }
        if let Err(e) = self.db.drop_cf(name) {
            families.insert(name.to_string());
            return Err(e.into());
        }
        tracing::info!("Dropped column family '{}'", name);
        Ok(())
    }

    pub fn list_column_families(&self) -> Vec<String> {
        self.families.read().iter().cloned().collect()
    }

    fn flush_all(&self) -> Result<(), StorageError> {
        let families = self.families.read();
        flush_each(families.iter().map(String::as_str), |name| {
            let cf = self.cf(name)?;
            self.db.flush_cf(&cf)?;
            Ok(())
        })
    }

    /// Flushes every column family and releases the database.
    pub fn close(mut self) -> Result<(), StorageError> {
        self.closed = true;
        let result = self.flush_all();
        tracing::info!("Closed persistent storage at {}", self.path.display());
        result
    }
}

impl Drop for PersistStorage {
    fn drop(&mut self) {
        if !self.closed
            && let Err(e) = self.flush_all()
        {
            tracing::error!("Failed to flush storage at {}: {}", self.path.display(), e);
        }
    }
}

/// Runs `flush` for every family, even after a failure, and returns the first error.
pub(crate) fn flush_each<'a, I, F>(families: I, mut flush: F) -> Result<(), StorageError>
where
    I: IntoIterator<Item = &'a str>,
    F: FnMut(&str) -> Result<(), StorageError>,
{
    let mut first_error = None;
    for name in families {
        if let Err(e) = flush(name) {
            tracing::error!("Failed to flush column family '{}': {}", name, e);
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}
