//! Membership proofs.
//!
//! A proof is serialized as a 32-byte bitmap followed by the explicit sibling hashes, lowest level first.
//! Bit `l - 1` of the bitmap is set when the sibling at level `l` is carried explicitly; otherwise the
//! sibling is the empty subtree of level `l - 1` and is left out.

use std::fmt::Display;

use crate::bits::{get_bit, to_hex};
use crate::error::{Error, Result};
use crate::hash::{EmptyTable, HASH_SIZE, Hash, HashFunction};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MerkleProof {
  bitmap: [u8; HASH_SIZE],
  siblings: Vec<Hash>,
}

impl MerkleProof {
  pub fn new(bitmap: [u8; HASH_SIZE], siblings: Vec<Hash>) -> Self {
    MerkleProof { bitmap, siblings }
  }

  pub fn bitmap(&self) -> &[u8; HASH_SIZE] {
    &self.bitmap
  }

  /// Explicit siblings, lowest level first.
  pub fn siblings(&self) -> &[Hash] {
    &self.siblings
  }

  pub fn to_bytes(&self) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HASH_SIZE * (1 + self.siblings.len()));
    bytes.extend_from_slice(&self.bitmap);
    for sibling in self.siblings.iter() {
      bytes.extend_from_slice(sibling.as_bytes());
    }
    bytes
  }

  /// Parses a serialized proof; the number of siblings must match the bits set in the bitmap.
  pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
    if bytes.len() < HASH_SIZE || bytes.len() % HASH_SIZE != 0 {
      return Err(Error::InvalidProof(format!("{} bytes is not a whole number of hashes", bytes.len())));
    }
    let mut bitmap = [0u8; HASH_SIZE];
    bitmap.copy_from_slice(&bytes[..HASH_SIZE]);
    let declared = bitmap.iter().map(|b| b.count_ones() as usize).sum::<usize>();
    let siblings = bytes[HASH_SIZE..]
      .chunks_exact(HASH_SIZE)
      .map(|chunk| {
        let mut value = [0u8; HASH_SIZE];
        value.copy_from_slice(chunk);
        Hash::new(value)
      })
      .collect::<Vec<_>>();
    if siblings.len() != declared {
      return Err(Error::InvalidProof(format!("bitmap declares {declared} siblings, found {}", siblings.len())));
    }
    Ok(MerkleProof { bitmap, siblings })
  }

  pub fn from_hex(s: &str) -> Result<Self> {
    Self::from_bytes(&crate::bits::from_hex(s)?)
  }

  /// Recomputes the root from `claim` upward and compares it with `root`.
  pub fn verify<H: HashFunction>(&self, empty: &EmptyTable, root: &Hash, claim: &[u8]) -> bool {
    let depth = empty.depth();
    if (depth..HASH_SIZE * 8).any(|i| get_bit(&self.bitmap, i)) {
      return false;
    }
    let claim_hash = H::digest(claim);
    let mut siblings = self.siblings.iter();
    let mut hash = claim_hash;
    for level in 1..=depth {
      let sibling = if get_bit(&self.bitmap, level - 1) {
        match siblings.next() {
          Some(sibling) => *sibling,
          None => return false,
        }
      } else {
        empty[level - 1]
      };
      hash = if claim_hash.bit(level - 1) { H::combine(&sibling, &hash) } else { H::combine(&hash, &sibling) };
    }
    siblings.next().is_none() && hash == *root
  }
}

impl Display for MerkleProof {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&to_hex(self.to_bytes()))
  }
}

/// Checks a serialized proof of `claim` against `root` for a tree of `depth`. Malformed proofs are invalid.
pub fn verify<H: HashFunction>(depth: usize, root: &Hash, claim: &[u8], proof: &[u8]) -> bool {
  if depth > crate::MAX_DEPTH {
    return false;
  }
  verify_with::<H>(&EmptyTable::new::<H>(depth), root, claim, proof)
}

/// Same as [`verify`] with a precomputed empty-subtree table.
pub fn verify_with<H: HashFunction>(empty: &EmptyTable, root: &Hash, claim: &[u8], proof: &[u8]) -> bool {
  match MerkleProof::from_bytes(proof) {
    Ok(proof) => proof.verify::<H>(empty, root, claim),
    Err(_) => false,
  }
}
