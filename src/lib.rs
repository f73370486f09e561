//! A versioned set of opaque claims authenticated by a fixed-depth sparse Merkle tree.
//!
//! Claims live in the leaves of a binary tree of depth `D`, addressed by the bits of their digest.
//! Subtrees holding a single claim are compressed into one *final* node, so only occupied branches
//! are ever materialized. Mutations are buffered in memory and flushed to the [`NodeStore`] as one
//! atomic batch per [`ClaimTree::commit`], each commit producing an immutable, readable version.

pub mod bits;
pub mod config;
pub mod error;
pub mod hash;
pub mod storage;
pub mod tree;

pub use config::TreeConfig;
pub use error::{Error, Result};
pub use hash::{Blake3, EmptyTable, HASH_SIZE, Hash, HashFunction, Keccak256, Sha256};
pub use storage::memory::MemoryStore;
pub use storage::rocksdb::RocksDBStore;
pub use storage::{BatchOp, NodeStore};
pub use tree::proof::{MerkleProof, verify};
pub use tree::{ClaimTree, Snapshot};

/// The largest depth a tree may have: one level per bit of a claim digest.
pub const MAX_DEPTH: usize = HASH_SIZE * 8;

/// Parses a text of hex-encoded claims, one per line. Blank lines are skipped.
pub fn parse_claims(text: &str) -> Result<Vec<Vec<u8>>> {
  text.lines().map(str::trim).filter(|line| !line.is_empty()).map(bits::from_hex).collect()
}
