//! Binary records the tree keeps in its store.
//!
//! Every node and claim record starts with an 8-byte header `[type][0][commit as 6-byte big-endian]`.
//! A normal node carries its two child hashes, a final node the hash of the single claim below it, and a
//! claim record the raw claim bytes. Nodes and claims are keyed by content hash under distinct one-byte
//! namespaces; version records use 32-byte keys so they never meet either namespace.

use std::io::{Cursor, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};
use crate::hash::{HASH_SIZE, Hash};

pub const CLAIM: u8 = 0;
pub const NORMAL_NODE: u8 = 1;
pub const FINAL_NODE: u8 = 2;

pub const HEADER_SIZE: usize = 8;
pub const COMMIT_SIZE: usize = 6;

/// Largest version a 6-byte commit field can hold.
pub const MAX_VERSION: u64 = (1 << (COMMIT_SIZE * 8)) - 1;

const NODE_NAMESPACE: u8 = b'n';
const CLAIM_NAMESPACE: u8 = b'c';

/// Key of the record holding the last committed version number.
pub const CURRENT_VERSION_KEY: [u8; HASH_SIZE] = [0u8; HASH_SIZE];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
  /// Two children ordered by the claim-hash bit of the level below.
  Normal { children: [Hash; 2] },
  /// A compressed subtree holding exactly one claim.
  Final { claim_hash: Hash },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
  pub commit: u64,
  pub kind: NodeKind,
}

impl Node {
  pub fn new_normal(commit: u64, left: Hash, right: Hash) -> Self {
    Node { commit, kind: NodeKind::Normal { children: [left, right] } }
  }

  pub fn new_final(commit: u64, claim_hash: Hash) -> Self {
    Node { commit, kind: NodeKind::Final { claim_hash } }
  }

  pub fn is_final(&self) -> bool {
    matches!(self.kind, NodeKind::Final { .. })
  }

  pub fn write<W: Write>(&self, w: &mut W) -> Result<usize> {
    let (tag, payload) = match &self.kind {
      NodeKind::Normal { .. } => (NORMAL_NODE, 2 * HASH_SIZE),
      NodeKind::Final { .. } => (FINAL_NODE, HASH_SIZE),
    };
    write_header(w, tag, self.commit)?;
    match &self.kind {
      NodeKind::Normal { children } => {
        w.write_all(children[0].as_bytes())?;
        w.write_all(children[1].as_bytes())?;
      }
      NodeKind::Final { claim_hash } => w.write_all(claim_hash.as_bytes())?,
    }
    Ok(HEADER_SIZE + payload)
  }

  pub fn read<R: Read>(r: &mut R) -> Result<Self> {
    let (tag, commit) = read_header(r)?;
    let kind = match tag {
      NORMAL_NODE => {
        let left = read_hash(r)?;
        let right = read_hash(r)?;
        NodeKind::Normal { children: [left, right] }
      }
      FINAL_NODE => NodeKind::Final { claim_hash: read_hash(r)? },
      other => return Err(Error::InvalidRecord(format!("unexpected node type {other}"))),
    };
    Ok(Node { commit, kind })
  }

  pub fn to_bytes(&self) -> Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(HEADER_SIZE + 2 * HASH_SIZE);
    self.write(&mut buffer)?;
    Ok(buffer)
  }

  pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
    let expected = match bytes.first() {
      Some(&NORMAL_NODE) => HEADER_SIZE + 2 * HASH_SIZE,
      Some(&FINAL_NODE) => HEADER_SIZE + HASH_SIZE,
      Some(other) => return Err(Error::InvalidRecord(format!("unexpected node type {other}"))),
      None => return Err(Error::InvalidRecord("empty node record".to_string())),
    };
    if bytes.len() != expected {
      return Err(Error::InvalidRecord(format!("node record of {} bytes, expected {expected}", bytes.len())));
    }
    Self::read(&mut Cursor::new(bytes))
  }
}

pub fn encode_claim(commit: u64, claim: &[u8]) -> Result<Vec<u8>> {
  let mut buffer = Vec::with_capacity(HEADER_SIZE + claim.len());
  write_header(&mut buffer, CLAIM, commit)?;
  buffer.extend_from_slice(claim);
  Ok(buffer)
}

/// Returns the claim bytes of a claim record.
pub fn decode_claim(bytes: &[u8]) -> Result<Vec<u8>> {
  if bytes.len() < HEADER_SIZE {
    return Err(Error::InvalidRecord(format!("claim record of {} bytes", bytes.len())));
  }
  let (tag, _) = read_header(&mut Cursor::new(bytes))?;
  if tag != CLAIM {
    return Err(Error::InvalidRecord(format!("unexpected claim record type {tag}")));
  }
  Ok(bytes[HEADER_SIZE..].to_vec())
}

pub fn node_key(hash: &Hash) -> Vec<u8> {
  namespaced(NODE_NAMESPACE, hash)
}

pub fn claim_key(claim_hash: &Hash) -> Vec<u8> {
  namespaced(CLAIM_NAMESPACE, claim_hash)
}

/// Key of the root record of `version`: 32 bytes, zero except for the big-endian version at the end.
pub fn version_key(version: u64) -> Result<Vec<u8>> {
  check_version(version)?;
  let mut key = vec![0u8; HASH_SIZE - COMMIT_SIZE];
  key.write_uint::<BigEndian>(version, COMMIT_SIZE)?;
  Ok(key)
}

pub fn encode_version(version: u64) -> Result<Vec<u8>> {
  check_version(version)?;
  let mut buffer = Vec::with_capacity(COMMIT_SIZE);
  buffer.write_uint::<BigEndian>(version, COMMIT_SIZE)?;
  Ok(buffer)
}

pub fn decode_version(bytes: &[u8]) -> Result<u64> {
  if bytes.len() != COMMIT_SIZE {
    return Err(Error::InvalidRecord(format!("version record of {} bytes", bytes.len())));
  }
  Ok(Cursor::new(bytes).read_uint::<BigEndian>(COMMIT_SIZE)?)
}

pub fn decode_root(bytes: &[u8]) -> Result<Hash> {
  let value: [u8; HASH_SIZE] =
    bytes.try_into().map_err(|_| Error::InvalidRecord(format!("root record of {} bytes", bytes.len())))?;
  Ok(Hash::new(value))
}

fn namespaced(namespace: u8, hash: &Hash) -> Vec<u8> {
  let mut key = Vec::with_capacity(1 + HASH_SIZE);
  key.push(namespace);
  key.extend_from_slice(hash.as_bytes());
  key
}

fn check_version(version: u64) -> Result<()> {
  if version > MAX_VERSION {
    return Err(Error::VersionOverflow(version));
  }
  Ok(())
}

fn write_header<W: Write>(w: &mut W, tag: u8, commit: u64) -> Result<()> {
  check_version(commit)?;
  w.write_u8(tag)?;
  w.write_u8(0)?;
  w.write_uint::<BigEndian>(commit, COMMIT_SIZE)?;
  Ok(())
}

fn read_header<R: Read>(r: &mut R) -> Result<(u8, u64)> {
  let tag = r.read_u8()?;
  let _reserved = r.read_u8()?;
  let commit = r.read_uint::<BigEndian>(COMMIT_SIZE)?;
  Ok((tag, commit))
}

fn read_hash<R: Read>(r: &mut R) -> Result<Hash> {
  let mut value = [0u8; HASH_SIZE];
  r.read_exact(&mut value)?;
  Ok(Hash::new(value))
}
