use std::path::Path;

use ::rocksdb::{DB, Options, WriteBatch};
use log::info;

use crate::error::Result;
use crate::storage::{BatchOp, NodeStore};

const LOG_TARGET: &str = "claimtree::storage::rocksdb";

/// A persistent store on a RocksDB database directory.
pub struct RocksDBStore {
  db: DB,
}

impl RocksDBStore {
  /// Opens the database at `path`, creating it if missing.
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let mut opts = Options::default();
    opts.create_if_missing(true);
    let db = DB::open(&opts, path.as_ref())?;
    info!(target: LOG_TARGET, "opened {}", path.as_ref().to_string_lossy());
    Ok(RocksDBStore { db })
  }
}

impl NodeStore for RocksDBStore {
  fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
    Ok(self.db.get(key)?)
  }

  fn batch(&self, ops: Vec<BatchOp>) -> Result<()> {
    let mut batch = WriteBatch::default();
    for op in ops {
      match op {
        BatchOp::Put { key, value } => batch.put(key, value),
        BatchOp::Delete { key } => batch.delete(key),
      }
    }
    self.db.write(batch)?;
    Ok(())
  }
}
