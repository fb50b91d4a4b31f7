//! Persistent keyed store of message records.
//!
//! Backed by redb with every entry mirrored in an ordered in-memory map, so
//! reads and substring scans never touch the disk. Writes go through the
//! engine first and update the mirror only once the commit succeeds.

use chatdex_core::MessageRecord;
use redb::{Database, ReadableTable, TableDefinition};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;
use tracing::{debug, info};

const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  #[error("database error: {0}")]
  Database(#[from] redb::DatabaseError),
  #[error("transaction error: {0}")]
  Transaction(#[from] redb::TransactionError),
  #[error("table error: {0}")]
  Table(#[from] redb::TableError),
  #[error("storage error: {0}")]
  Storage(#[from] redb::StorageError),
  #[error("commit error: {0}")]
  Commit(#[from] redb::CommitError),
  #[error("failed to decode record at key '{key}': {source}")]
  Decode {
    key: String,
    #[source]
    source: serde_json::Error,
  },
}

/// Writes accumulated inside [`RecordStore::transaction`].
#[derive(Debug, Default)]
pub struct StoreBatch {
  ops: Vec<BatchOp>,
}

#[derive(Debug)]
enum BatchOp {
  Put(String, MessageRecord),
  Remove(String),
}

impl StoreBatch {
  pub fn put(&mut self, key: impl Into<String>, record: MessageRecord) {
    self.ops.push(BatchOp::Put(key.into(), record));
  }

  pub fn remove(&mut self, key: impl Into<String>) {
    self.ops.push(BatchOp::Remove(key.into()));
  }
}

/// Write-through record store with an eager ordered mirror.
pub struct RecordStore {
  db: Database,
  mirror: RwLock<BTreeMap<String, MessageRecord>>,
}

impl RecordStore {
  /// Open (or create) the store at `path` and load every entry into the
  /// mirror. Fails with the offending key if any stored blob no longer
  /// decodes.
  pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
    if let Some(parent) = path.as_ref().parent() {
      std::fs::create_dir_all(parent)?;
    }
    let db = Database::create(path.as_ref())?;

    // A fresh database has no table yet; create it so reads can open it.
    let init = db.begin_write()?;
    init.open_table(RECORDS)?;
    init.commit()?;

    let mut mirror = BTreeMap::new();
    let read = db.begin_read()?;
    let table = read.open_table(RECORDS)?;
    for entry in table.iter()? {
      let (key, value) = entry?;
      let key = key.value().to_string();
      let record = serde_json::from_slice(value.value()).map_err(|source| StoreError::Decode {
        key: key.clone(),
        source,
      })?;
      mirror.insert(key, record);
    }

    info!(entries = mirror.len(), path = %path.as_ref().display(), "record store opened");
    Ok(Self {
      db,
      mirror: RwLock::new(mirror),
    })
  }

  /// Write one record through to disk. The mirror lock is held across the
  /// commit so readers never observe the disk ahead of the mirror.
  pub fn put(&self, key: impl Into<String>, record: MessageRecord) -> Result<(), StoreError> {
    let key = key.into();
    let bytes = encode(&record);

    let mut mirror = self.mirror.write().unwrap_or_else(|e| e.into_inner());
    let txn = self.db.begin_write()?;
    {
      let mut table = txn.open_table(RECORDS)?;
      table.insert(key.as_str(), bytes.as_slice())?;
    }
    txn.commit()?;
    mirror.insert(key, record);
    Ok(())
  }

  pub fn get(&self, key: &str) -> Option<MessageRecord> {
    self.mirror.read().unwrap_or_else(|e| e.into_inner()).get(key).cloned()
  }

  pub fn has(&self, key: &str) -> bool {
    self.mirror.read().unwrap_or_else(|e| e.into_inner()).contains_key(key)
  }

  pub fn remove(&self, key: &str) -> Result<(), StoreError> {
    let mut mirror = self.mirror.write().unwrap_or_else(|e| e.into_inner());
    let txn = self.db.begin_write()?;
    {
      let mut table = txn.open_table(RECORDS)?;
      table.remove(key)?;
    }
    txn.commit()?;
    mirror.remove(key);
    Ok(())
  }

  /// Run `build` against a batch, then commit every accumulated write in a
  /// single transaction. On commit failure the mirror is untouched, so it
  /// stays consistent with the persisted state.
  pub fn transaction<F>(&self, build: F) -> Result<(), StoreError>
  where
    F: FnOnce(&mut StoreBatch),
  {
    let mut batch = StoreBatch::default();
    build(&mut batch);
    if batch.ops.is_empty() {
      return Ok(());
    }

    let mut mirror = self.mirror.write().unwrap_or_else(|e| e.into_inner());
    let txn = self.db.begin_write()?;
    {
      let mut table = txn.open_table(RECORDS)?;
      for op in &batch.ops {
        match op {
          BatchOp::Put(key, record) => {
            let bytes = encode(record);
            table.insert(key.as_str(), bytes.as_slice())?;
          }
          BatchOp::Remove(key) => {
            table.remove(key.as_str())?;
          }
        }
      }
    }
    txn.commit()?;

    debug!(ops = batch.ops.len(), "record store batch committed");
    for op in batch.ops {
      match op {
        BatchOp::Put(key, record) => {
          mirror.insert(key, record);
        }
        BatchOp::Remove(key) => {
          mirror.remove(&key);
        }
      }
    }
    Ok(())
  }

  /// Key-ordered snapshot of every record. Writes made after the call are
  /// not reflected in the returned vector.
  pub fn records(&self) -> Vec<(String, MessageRecord)> {
    self
      .mirror
      .read()
      .unwrap_or_else(|e| e.into_inner())
      .iter()
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect()
  }

  pub fn len(&self) -> usize {
    self.mirror.read().unwrap_or_else(|e| e.into_inner()).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

fn encode(record: &MessageRecord) -> Vec<u8> {
  // MessageRecord serialization cannot fail: string keys, no non-string maps.
  serde_json::to_vec(record).unwrap_or_default()
}
