use std::collections::{HashMap, HashSet};

use crate::storage::BatchOp;

/// Outcome of looking a key up in the pending writes.
#[derive(Debug, PartialEq, Eq)]
pub enum Lookup<'a> {
  Inserted(&'a [u8]),
  Deleted,
  /// Not touched since the last commit; the store has the answer.
  Unknown,
}

/// Writes staged since the last commit.
#[derive(Debug, Default)]
pub struct Transaction {
  inserts: HashMap<Vec<u8>, Vec<u8>>,
  deletes: HashSet<Vec<u8>>,
}

impl Transaction {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, key: Vec<u8>, value: Vec<u8>) {
    self.inserts.insert(key, value);
  }

  /// Drops a pending insert of `key`, or marks a record that predates this transaction as deleted. A key
  /// stays marked once marked, so a record rewritten and removed again in the same transaction is still
  /// deleted from the store.
  pub fn remove(&mut self, key: &[u8]) {
    if self.inserts.remove(key).is_none() {
      self.deletes.insert(key.to_vec());
    }
  }

  pub fn lookup(&self, key: &[u8]) -> Lookup<'_> {
    if let Some(value) = self.inserts.get(key) {
      Lookup::Inserted(value)
    } else if self.deletes.contains(key) {
      Lookup::Deleted
    } else {
      Lookup::Unknown
    }
  }

  pub fn inserts(&self) -> usize {
    self.inserts.len()
  }

  pub fn deletes(&self) -> usize {
    self.pending_deletes().count()
  }

  pub fn len(&self) -> usize {
    self.inserts() + self.deletes()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn clear(&mut self) {
    self.inserts.clear();
    self.deletes.clear();
  }

  /// Converts the pending writes into batch operations. Deletions of records from earlier commits are only
  /// emitted when `retain_history` is off, since older versions may still reference them.
  pub fn to_ops(&self, retain_history: bool) -> Vec<BatchOp> {
    let mut ops = Vec::with_capacity(self.len());
    for (key, value) in self.inserts.iter() {
      ops.push(BatchOp::Put { key: key.clone(), value: value.clone() });
    }
    if !retain_history {
      for key in self.pending_deletes() {
        ops.push(BatchOp::Delete { key: key.clone() });
      }
    }
    ops
  }

  fn pending_deletes(&self) -> impl Iterator<Item = &Vec<u8>> {
    self.deletes.iter().filter(|key| !self.inserts.contains_key(*key))
  }
}
