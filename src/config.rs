use crate::MAX_DEPTH;
use crate::error::{Error, Result};

pub const DEFAULT_DEPTH: usize = 140;

/// Parameters fixed for the lifetime of a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConfig {
  /// Number of levels below the root. A store must always be reopened with the same depth.
  pub depth: usize,

  /// Keep records superseded by later versions so that every committed version stays readable.
  /// When disabled, a commit deletes the records the new version no longer references.
  pub retain_history: bool,
}

impl TreeConfig {
  pub fn new(depth: usize) -> Self {
    TreeConfig { depth, ..Default::default() }
  }

  pub fn depth(mut self, depth: usize) -> Self {
    self.depth = depth;
    self
  }

  pub fn retain_history(mut self, retain: bool) -> Self {
    self.retain_history = retain;
    self
  }

  pub fn validate(&self) -> Result<()> {
    if self.depth > MAX_DEPTH {
      return Err(Error::InvalidDepth(self.depth));
    }
    Ok(())
  }
}

impl Default for TreeConfig {
  fn default() -> Self {
    TreeConfig { depth: DEFAULT_DEPTH, retain_history: true }
  }
}
