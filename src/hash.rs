use std::fmt::{Debug, Display};
use std::ops::Index;

use crate::bits::{get_bit, to_hex};
use crate::error::{Error, Result};

pub const HASH_SIZE: usize = 32;

/// A 32-byte digest: a claim hash, a node hash or a tree root.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash(pub [u8; HASH_SIZE]);

impl Hash {
  pub const fn new(value: [u8; HASH_SIZE]) -> Self {
    Hash(value)
  }

  /// Builds a hash from at most 32 bytes, zero-extending shorter input on the left.
  pub fn from_slice(bytes: &[u8]) -> Result<Self> {
    if bytes.len() > HASH_SIZE {
      return Err(Error::PadOverflow { len: bytes.len(), max: HASH_SIZE });
    }
    let mut value = [0u8; HASH_SIZE];
    value[HASH_SIZE - bytes.len()..].copy_from_slice(bytes);
    Ok(Hash(value))
  }

  pub fn from_hex(s: &str) -> Result<Self> {
    Self::from_slice(&crate::bits::from_hex(s)?)
  }

  pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
    &self.0
  }

  #[inline]
  pub fn bit(&self, i: usize) -> bool {
    get_bit(&self.0, i)
  }

  pub fn to_hex(&self) -> String {
    to_hex(self.0)
  }
}

impl AsRef<[u8]> for Hash {
  fn as_ref(&self) -> &[u8] {
    &self.0
  }
}

impl From<[u8; HASH_SIZE]> for Hash {
  fn from(value: [u8; HASH_SIZE]) -> Self {
    Hash(value)
  }
}

impl Display for Hash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.to_hex())
  }
}

impl Debug for Hash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "Hash({})", self.to_hex())
  }
}

/// The digest the tree is built with. Roots are only comparable between trees using the same function.
pub trait HashFunction {
  fn digest(data: &[u8]) -> Hash;

  /// Hash of two concatenated child hashes.
  fn combine(left: &Hash, right: &Hash) -> Hash {
    let mut buffer = [0u8; HASH_SIZE * 2];
    buffer[..HASH_SIZE].copy_from_slice(left.as_bytes());
    buffer[HASH_SIZE..].copy_from_slice(right.as_bytes());
    Self::digest(&buffer)
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3;

impl HashFunction for Blake3 {
  fn digest(data: &[u8]) -> Hash {
    Hash(*blake3::hash(data).as_bytes())
  }

  fn combine(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Hash(*hasher.finalize().as_bytes())
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256;

impl HashFunction for Sha256 {
  fn digest(data: &[u8]) -> Hash {
    use sha2::Digest;
    Hash(sha2::Sha256::digest(data).into())
  }
}

/// The original Keccak-256 (not the NIST SHA3-256 padding).
#[derive(Debug, Clone, Copy, Default)]
pub struct Keccak256;

impl HashFunction for Keccak256 {
  fn digest(data: &[u8]) -> Hash {
    use sha3::Digest;
    Hash(sha3::Keccak256::digest(data).into())
  }
}

/// Hash of the all-empty subtree at every level `0..=depth`.
#[derive(Debug, Clone)]
pub struct EmptyTable {
  levels: Vec<Hash>,
}

impl EmptyTable {
  pub fn new<H: HashFunction>(depth: usize) -> Self {
    let mut levels = Vec::with_capacity(depth + 1);
    levels.push(H::digest(&[]));
    for i in 1..=depth {
      let below = &levels[i - 1];
      levels.push(H::combine(below, below));
    }
    EmptyTable { levels }
  }

  pub fn depth(&self) -> usize {
    self.levels.len() - 1
  }

  /// The root of the empty tree.
  pub fn root(&self) -> Hash {
    self.levels[self.depth()]
  }

  /// Subtree hashes a lone claim produces at each level: `chain[0]` is the claim hash itself and
  /// `chain[i]` pairs `chain[i - 1]` with the empty sibling on the side selected by bit `i - 1`.
  pub fn one_element<H: HashFunction>(&self, claim_hash: &Hash) -> Vec<Hash> {
    self.one_element_to::<H>(claim_hash, self.depth())
  }

  /// Same as [`EmptyTable::one_element`] but stops at `level`.
  pub fn one_element_to<H: HashFunction>(&self, claim_hash: &Hash, level: usize) -> Vec<Hash> {
    let mut chain = Vec::with_capacity(level + 1);
    chain.push(*claim_hash);
    for i in 1..=level {
      let below = &chain[i - 1];
      let next = if claim_hash.bit(i - 1) {
        H::combine(&self.levels[i - 1], below)
      } else {
        H::combine(below, &self.levels[i - 1])
      };
      chain.push(next);
    }
    chain
  }
}

impl Index<usize> for EmptyTable {
  type Output = Hash;

  fn index(&self, level: usize) -> &Self::Output {
    &self.levels[level]
  }
}
