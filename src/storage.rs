use std::sync::Arc;

use crate::error::Result;

pub mod memory;
pub mod rocksdb;

/// A single write of an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
  Put { key: Vec<u8>, value: Vec<u8> },
  Delete { key: Vec<u8> },
}

/// The key-value store a tree persists its records into.
///
/// Implementations must tell an absent key (`Ok(None)`) apart from a failing backend (`Err`), and must apply
/// a [`NodeStore::batch`] all-or-nothing. No ordering is assumed between separate batches.
pub trait NodeStore {
  fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

  fn batch(&self, ops: Vec<BatchOp>) -> Result<()>;
}

impl<S: NodeStore + ?Sized> NodeStore for Arc<S> {
  fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
    (**self).get(key)
  }

  fn batch(&self, ops: Vec<BatchOp>) -> Result<()> {
    (**self).batch(ops)
  }
}

impl<S: NodeStore + ?Sized> NodeStore for &S {
  fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
    (**self).get(key)
  }

  fn batch(&self, ops: Vec<BatchOp>) -> Result<()> {
    (**self).batch(ops)
  }
}
