//! Typed access to the RocksDB instance behind a fingerprint store.
//!
//! The accessor owns the engine handle and knows about column families, the
//! version file and batched deletes. It has no notion of fingerprints; the
//! façade in [`crate::store`] builds those on top.

use crate::budget::TimeBudget;
use crate::columns::Column;
use crate::{Error, Result};
use rocksdb::checkpoint::Checkpoint;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File holding the store format version, next to the engine files.
pub const VERSION_FILE_NAME: &str = "STORE_VERSION";

/// Engine file whose presence marks an existing store.
const CURRENT_FILE_NAME: &str = "CURRENT";

/// Deletes are flushed to the engine in batches of this many keys.
const GC_BATCH_SIZE: usize = 1000;

/// What happened while opening a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenOutcome {
    /// No store existed, or it was deleted for a version mismatch.
    pub created: bool,
    /// An existing store was deleted because its version did not match.
    pub version_reset: bool,
    /// Columns created in an existing store.
    pub added_columns: Vec<String>,
    /// Whether the store ended up read-only.
    pub read_only: bool,
}

/// One write in an atomic batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOp<'a> {
    /// Insert or overwrite `key`.
    Put {
        /// Target column.
        column: Column,
        /// Key.
        key: &'a str,
        /// Value.
        value: &'a [u8],
    },
    /// Delete `key` if present.
    Remove {
        /// Target column.
        column: Column,
        /// Key.
        key: &'a str,
    },
}

/// Outcome of [`KeyValueAccessor::garbage_collect`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GarbageCollectResult {
    /// Keys evaluated before finishing or being canceled.
    pub total_count: u64,
    /// Keys deleted from the primary column and its siblings.
    pub removed_keys: Vec<String>,
    /// The budget ran out before every key was evaluated.
    pub canceled: bool,
}

/// Handle on an open store directory.
pub struct KeyValueAccessor {
    db: DB,
    path: PathBuf,
    read_only: bool,
}

impl std::fmt::Debug for KeyValueAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyValueAccessor")
            .field("path", &self.path)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

impl KeyValueAccessor {
    /// Open or create the store at `path`.
    ///
    /// - A read-only open of a directory without a store fails with
    ///   [`Error::StoreNotFound`].
    /// - An existing store missing any column is opened read-write so the
    ///   column can be created; existing data is kept.
    /// - A read-write open of a store whose version file does not hold
    ///   `version` deletes the store and starts over. Read-only opens ignore
    ///   the version.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory cannot be prepared or the engine
    /// refuses to open it.
    pub fn open(path: &Path, version: u32, read_only: bool) -> Result<(Self, OpenOutcome)> {
        let mut exists = path.join(CURRENT_FILE_NAME).is_file();
        if !exists && read_only {
            return Err(Error::store_not_found(path));
        }

        let mut read_only = read_only;
        let mut missing_columns = Vec::new();
        if exists {
            let existing = DB::list_cf(&Options::default(), path)
                .map_err(|e| Error::engine("list_cf", e))?;
            missing_columns = Column::ALL
                .iter()
                .map(|column| column.name())
                .filter(|name| !existing.iter().any(|e| e == name))
                .map(str::to_owned)
                .collect();
            if !missing_columns.is_empty() {
                read_only = false;
            }
        }

        let mut version_reset = false;
        if exists && !read_only && read_version(path)? != Some(version) {
            fs::remove_dir_all(path).map_err(|e| Error::io(e, path, "remove_dir_all"))?;
            version_reset = true;
            exists = false;
            missing_columns.clear();
        }

        if !read_only {
            fs::create_dir_all(path).map_err(|e| Error::io(e, path, "create_dir_all"))?;
        }

        let mut options = Options::default();
        let descriptors = Column::ALL
            .iter()
            .map(|column| ColumnFamilyDescriptor::new(column.name(), Options::default()));
        let db = if read_only {
            DB::open_cf_descriptors_read_only(&options, path, descriptors, false)
        } else {
            options.create_if_missing(true);
            options.create_missing_column_families(true);
            DB::open_cf_descriptors(&options, path, descriptors)
        }
        .map_err(|e| Error::engine("open", e))?;

        if !read_only {
            write_version(path, version)?;
        }

        let outcome = OpenOutcome {
            created: !exists,
            version_reset,
            added_columns: missing_columns,
            read_only,
        };

        Ok((
            Self {
                db,
                path: path.to_path_buf(),
                read_only,
            },
            outcome,
        ))
    }

    /// Store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether writes are rejected.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn cf(&self, column: Column) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(column.name())
            .ok_or_else(|| Error::missing_column(column.name()))
    }

    /// Read `key` from `column`.
    ///
    /// # Errors
    ///
    /// Returns an engine error if the read fails.
    pub fn get(&self, column: Column, key: &str) -> Result<Option<Vec<u8>>> {
        self.db
            .get_cf(self.cf(column)?, key)
            .map_err(|e| Error::engine("get", e))
    }

    /// Whether `key` exists in `column`.
    ///
    /// # Errors
    ///
    /// Returns an engine error if the read fails.
    pub fn contains(&self, column: Column, key: &str) -> Result<bool> {
        let cf = self.cf(column)?;
        if !self.db.key_may_exist_cf(cf, key) {
            return Ok(false);
        }
        self.db
            .get_pinned_cf(cf, key)
            .map(|value| value.is_some())
            .map_err(|e| Error::engine("contains", e))
    }

    /// Write `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns an engine error if the write fails.
    pub fn put(&self, column: Column, key: &str, value: &[u8]) -> Result<()> {
        self.db
            .put_cf(self.cf(column)?, key, value)
            .map_err(|e| Error::engine("put", e))
    }

    /// Delete `key` if present.
    ///
    /// # Errors
    ///
    /// Returns an engine error if the delete fails.
    pub fn remove(&self, column: Column, key: &str) -> Result<()> {
        self.db
            .delete_cf(self.cf(column)?, key)
            .map_err(|e| Error::engine("remove", e))
    }

    /// Apply `ops` atomically.
    ///
    /// # Errors
    ///
    /// Returns an engine error if the batch is rejected; nothing is written.
    pub fn write_batch(&self, ops: &[BatchOp<'_>]) -> Result<()> {
        let mut batch = WriteBatch::default();
        for op in ops {
            match *op {
                BatchOp::Put { column, key, value } => batch.put_cf(self.cf(column)?, key, value),
                BatchOp::Remove { column, key } => batch.delete_cf(self.cf(column)?, key),
            }
        }
        self.db
            .write(batch)
            .map_err(|e| Error::engine("write_batch", e))
    }

    /// Every key in `column`, in engine order.
    ///
    /// # Errors
    ///
    /// Returns an engine error if iteration fails.
    pub fn keys(&self, column: Column) -> Result<Vec<String>> {
        self.db
            .iterator_cf(self.cf(column)?, IteratorMode::Start)
            .map(|item| {
                item.map(|(key, _)| String::from_utf8_lossy(&key).into_owned())
                    .map_err(|e| Error::engine("iterate", e))
            })
            .collect()
    }

    /// Engine estimate of the number of keys in `column`.
    ///
    /// # Errors
    ///
    /// Returns an engine error if the property cannot be read.
    pub fn estimate_num_keys(&self, column: Column) -> Result<u64> {
        self.db
            .property_int_value_cf(self.cf(column)?, "rocksdb.estimate-num-keys")
            .map(Option::unwrap_or_default)
            .map_err(|e| Error::engine("property", e))
    }

    /// Evaluate every key of `primary` and delete those `should_remove`
    /// accepts from `primary` and every column in `siblings`.
    ///
    /// The budget is polled before each key. Deletes already issued stay
    /// applied when it runs out.
    ///
    /// # Errors
    ///
    /// Returns an engine error if iteration or a delete batch fails.
    pub fn garbage_collect<F>(
        &self,
        primary: Column,
        siblings: &[Column],
        mut should_remove: F,
        budget: &TimeBudget,
    ) -> Result<GarbageCollectResult>
    where
        F: FnMut(&str, &[u8]) -> bool,
    {
        let primary_cf = self.cf(primary)?;
        let sibling_cfs = siblings
            .iter()
            .map(|&column| self.cf(column))
            .collect::<Result<Vec<_>>>()?;

        let mut result = GarbageCollectResult::default();
        let mut batch = WriteBatch::default();
        let mut pending = 0usize;

        for item in self.db.iterator_cf(primary_cf, IteratorMode::Start) {
            if budget.is_exhausted() {
                result.canceled = true;
                break;
            }
            let (key, value) = item.map_err(|e| Error::engine("iterate", e))?;
            result.total_count += 1;

            let Ok(key) = std::str::from_utf8(&key) else {
                continue;
            };
            if !should_remove(key, &value) {
                continue;
            }

            batch.delete_cf(primary_cf, key);
            for cf in &sibling_cfs {
                batch.delete_cf(*cf, key);
            }
            result.removed_keys.push(key.to_owned());
            pending += 1;

            if pending >= GC_BATCH_SIZE {
                self.db
                    .write(std::mem::take(&mut batch))
                    .map_err(|e| Error::engine("gc_delete", e))?;
                pending = 0;
            }
        }

        if pending > 0 {
            self.db
                .write(batch)
                .map_err(|e| Error::engine("gc_delete", e))?;
        }
        Ok(result)
    }

    /// Flush memtables of every column to disk. No-op when read-only.
    ///
    /// # Errors
    ///
    /// Returns an engine error if a flush fails.
    pub fn flush(&self) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        for column in Column::ALL {
            self.db
                .flush_cf(self.cf(column)?)
                .map_err(|e| Error::engine("flush", e))?;
        }
        Ok(())
    }

    /// Write a consistent point-in-time copy of the store to `dir`.
    ///
    /// `dir` must not exist or must be empty; its parent is created. The
    /// version file is copied so the checkpoint opens as a regular store.
    /// The engine only checkpoints read-write handles.
    ///
    /// # Errors
    ///
    /// Returns an error if the accessor is read-only, `dir` holds files, or
    /// the engine checkpoint fails.
    pub fn checkpoint(&self, dir: &Path) -> Result<()> {
        if self.read_only {
            return Err(Error::configuration("checkpoints require a read-write store"));
        }
        if dir.exists() {
            let mut entries = fs::read_dir(dir).map_err(|e| Error::io(e, dir, "read_dir"))?;
            if entries.next().is_some() {
                return Err(Error::configuration(format!(
                    "checkpoint directory is not empty: {}",
                    dir.display()
                )));
            }
            fs::remove_dir(dir).map_err(|e| Error::io(e, dir, "remove_dir"))?;
        } else if let Some(parent) = dir.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(e, parent, "create_dir_all"))?;
        }

        let checkpoint = Checkpoint::new(&self.db).map_err(|e| Error::engine("checkpoint", e))?;
        checkpoint
            .create_checkpoint(dir)
            .map_err(|e| Error::engine("checkpoint", e))?;

        let version_file = self.path.join(VERSION_FILE_NAME);
        if version_file.is_file() {
            let target = dir.join(VERSION_FILE_NAME);
            fs::copy(&version_file, &target).map_err(|e| Error::io(e, &target, "copy"))?;
        }
        Ok(())
    }
}

/// Read the version file; `None` when absent or unparsable.
fn read_version(path: &Path) -> Result<Option<u32>> {
    let file = path.join(VERSION_FILE_NAME);
    match fs::read_to_string(&file) {
        Ok(text) => Ok(text.trim().parse().ok()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(e, file, "read")),
    }
}

fn write_version(path: &Path, version: u32) -> Result<()> {
    let file = path.join(VERSION_FILE_NAME);
    fs::write(&file, format!("{version}\n")).map_err(|e| Error::io(e, file, "write"))
}
