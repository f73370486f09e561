use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
  /// Two distinct claim digests resolved to the same terminal slot. Never expected with a secure digest.
  #[error("hash collision at level {level}")]
  Collision { level: usize },

  /// A record the tree refers to is missing from the store.
  #[error("corrupted store: {0}")]
  CorruptedStore(String),

  #[error("claim {0} is not in the tree")]
  ClaimNotFound(crate::hash::Hash),

  #[error("invalid record: {0}")]
  InvalidRecord(String),

  #[error("invalid version {requested}: current version is {current}")]
  InvalidVersion { requested: u64, current: u64 },

  /// A version number does not fit the 6-byte commit field of the records.
  #[error("version {0} exceeds the largest storable version")]
  VersionOverflow(u64),

  #[error("invalid depth {0}: must be at most {max}", max = crate::MAX_DEPTH)]
  InvalidDepth(usize),

  #[error("invalid proof: {0}")]
  InvalidProof(String),

  #[error("invalid hex: {0}")]
  InvalidHex(String),

  #[error("cannot pad {len} bytes into {max}")]
  PadOverflow { len: usize, max: usize },

  #[error("storage error: {0}")]
  Storage(String),

  #[error(transparent)]
  RocksDB(#[from] rocksdb::Error),

  #[error(transparent)]
  Io(#[from] std::io::Error),
}

impl<T> From<std::sync::PoisonError<T>> for Error {
  fn from(err: std::sync::PoisonError<T>) -> Self {
    Error::Storage(format!("poisoned lock: {err}"))
  }
}
