use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::Result;
use crate::storage::{BatchOp, NodeStore};

/// A volatile store. Clones share the same underlying map, so several trees can be opened over it.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
  kvs: Arc<RwLock<HashMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of records currently stored.
  pub fn len(&self) -> Result<usize> {
    Ok(self.kvs.read()?.len())
  }

  pub fn is_empty(&self) -> Result<bool> {
    Ok(self.len()? == 0)
  }
}

impl NodeStore for MemoryStore {
  fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
    let kvs = self.kvs.read()?;
    Ok(kvs.get(key).cloned())
  }

  fn batch(&self, ops: Vec<BatchOp>) -> Result<()> {
    let mut kvs = self.kvs.write()?;
    for op in ops {
      match op {
        BatchOp::Put { key, value } => {
          kvs.insert(key, value);
        }
        BatchOp::Delete { key } => {
          kvs.remove(&key);
        }
      }
    }
    Ok(())
  }
}
