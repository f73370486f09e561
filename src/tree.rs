use std::marker::PhantomData;

use log::{debug, info, warn};

use crate::bits::set_bit;
use crate::config::TreeConfig;
use crate::error::{Error, Result};
use crate::hash::{EmptyTable, HASH_SIZE, Hash, HashFunction};
use crate::storage::{BatchOp, NodeStore};
use crate::tree::node::{
  CURRENT_VERSION_KEY, Node, NodeKind, claim_key, decode_claim, decode_root, decode_version, encode_claim,
  encode_version, node_key, version_key,
};
use crate::tree::proof::MerkleProof;
use crate::tree::transaction::{Lookup, Transaction};

pub mod node;
pub mod proof;
pub mod transaction;

#[cfg(test)]
mod test;

const LOG_TARGET: &str = "claimtree::tree";

/*
 level D                      *
 level D-1                *       *
 level D-2              *   *   *   *
 ...
 level 0             ********************

 The child of a node at level L is chosen by bit L-1 of the claim hash. A subtree holding a single claim
 is stored as one final node whose hash is the claim's one-element chain value at that level.
*/

/// A sparse Merkle tree of claims over a [`NodeStore`].
///
/// Mutations are buffered in memory and reach the store only through [`ClaimTree::commit`], as one atomic
/// batch. The instance is single-writer: mutating methods take `&mut self`. If any operation fails with a
/// storage error the buffered state can no longer be trusted; call [`ClaimTree::rollback`] or reopen the
/// tree from the store.
pub struct ClaimTree<H: HashFunction, S: NodeStore> {
  store: S,
  config: TreeConfig,
  empty: EmptyTable,
  tx: Transaction,
  root: Hash,
  committed_root: Hash,
  current_version: u64,
  _hash: PhantomData<fn() -> H>,
}

impl<H: HashFunction, S: NodeStore> ClaimTree<H, S> {
  /// Opens the tree persisted in `store`, or an empty tree if the store holds no commit yet.
  pub fn open(store: S, config: TreeConfig) -> Result<Self> {
    config.validate()?;
    let empty = EmptyTable::new::<H>(config.depth);
    let (current_version, root) = match store.get(&CURRENT_VERSION_KEY)? {
      Some(bytes) => {
        let last = decode_version(&bytes)?;
        let root = match store.get(&version_key(last)?)? {
          Some(bytes) => decode_root(&bytes)?,
          None => return Err(Error::CorruptedStore(format!("root of version {last} is missing"))),
        };
        (last + 1, root)
      }
      None => (1, empty.root()),
    };
    info!(target: LOG_TARGET, "opened tree of depth {} at version {current_version}, root {root}", config.depth);
    Ok(ClaimTree {
      store,
      config,
      empty,
      tx: Transaction::new(),
      root,
      committed_root: root,
      current_version,
      _hash: PhantomData,
    })
  }

  /// The live root, including uncommitted changes.
  pub fn root(&self) -> Hash {
    self.root
  }

  pub fn depth(&self) -> usize {
    self.config.depth
  }

  /// The version the next commit will create. Versions below it are committed.
  pub fn current_version(&self) -> u64 {
    self.current_version
  }

  pub fn empty_root(&self) -> Hash {
    self.empty.root()
  }

  /// Number of buffered writes not yet committed.
  pub fn pending(&self) -> usize {
    self.tx.len()
  }

  /// Adds `claim` and returns the new live root. Adding a claim that is already present changes nothing.
  pub fn add_claim(&mut self, claim: &[u8]) -> Result<Hash> {
    if claim.is_empty() {
      warn!(target: LOG_TARGET, "ignoring empty claim");
      return Ok(self.root);
    }
    if self.config.depth == 0 {
      warn!(target: LOG_TARGET, "a tree of depth 0 cannot hold claims");
      return Ok(self.root);
    }
    let claim_hash = H::digest(claim);
    let one_element = self.empty.one_element::<H>(&claim_hash);
    let root = self.add_claim_hash(self.root, &claim_hash, self.config.depth, &one_element)?;
    if root != self.root {
      self.tx.insert(claim_key(&claim_hash), encode_claim(self.current_version, claim)?);
      debug!(target: LOG_TARGET, "added claim {claim_hash}, root {root}");
      self.root = root;
    }
    Ok(root)
  }

  /// Removes `claim` and returns the new live root. Removing an absent claim changes nothing.
  pub fn remove_claim(&mut self, claim: &[u8]) -> Result<Hash> {
    if claim.is_empty() {
      warn!(target: LOG_TARGET, "ignoring empty claim");
      return Ok(self.root);
    }
    let claim_hash = H::digest(claim);
    let root = self.remove_claim_hash(self.root, &claim_hash, self.config.depth)?;
    if root != self.root {
      self.tx.remove(&claim_key(&claim_hash));
      debug!(target: LOG_TARGET, "removed claim {claim_hash}, root {root}");
      self.root = root;
    }
    Ok(root)
  }

  fn add_claim_hash(&mut self, root: Hash, claim_hash: &Hash, level: usize, one_element: &[Hash]) -> Result<Hash> {
    if root == self.empty[level] {
      self.put_final(one_element[level], claim_hash)?;
      return Ok(one_element[level]);
    }
    if root == one_element[level] {
      // already present
      return Ok(root);
    }
    if level == 0 {
      return Err(Error::Collision { level });
    }

    let node = self.read_node(&root, true)?;
    let result = match node.kind {
      NodeKind::Normal { children } => {
        let bit = claim_hash.bit(level - 1) as usize;
        let child = self.add_claim_hash(children[bit], claim_hash, level - 1, one_element)?;
        if child == children[bit] {
          return Ok(root);
        }
        let mut next = children;
        next[bit] = child;
        self.put_normal(&next[0], &next[1])?
      }
      NodeKind::Final { claim_hash: existing } => self.split(&existing, claim_hash, level, one_element)?,
    };

    if result != root {
      self.tx.remove(&node_key(&root));
    }
    Ok(result)
  }

  /// Replaces the final node of `existing` at `level` by the smallest subtree separating it from `claim_hash`.
  fn split(&mut self, existing: &Hash, claim_hash: &Hash, level: usize, one_element: &[Hash]) -> Result<Hash> {
    let mut l = level;
    loop {
      if l == 0 {
        return Err(Error::Collision { level: 0 });
      }
      l -= 1;
      if existing.bit(l) != claim_hash.bit(l) {
        break;
      }
    }
    debug!(target: LOG_TARGET, "splitting {existing} and {claim_hash} at level {l} below {level}");

    let other = self.empty.one_element_to::<H>(existing, l);
    self.put_final(one_element[l], claim_hash)?;
    self.put_final(other[l], existing)?;

    let mut hash =
      if claim_hash.bit(l) { self.put_normal(&other[l], &one_element[l])? } else { self.put_normal(&one_element[l], &other[l])? };
    for i in l + 2..=level {
      let empty = self.empty[i - 1];
      hash = if claim_hash.bit(i - 1) { self.put_normal(&empty, &hash)? } else { self.put_normal(&hash, &empty)? };
    }
    Ok(hash)
  }

  fn remove_claim_hash(&mut self, root: Hash, claim_hash: &Hash, level: usize) -> Result<Hash> {
    if root == self.empty[level] {
      return Ok(root);
    }

    let node = self.read_node(&root, true)?;
    let children = match node.kind {
      NodeKind::Final { claim_hash: existing } => {
        if existing != *claim_hash {
          return Ok(root);
        }
        self.tx.remove(&node_key(&root));
        return Ok(self.empty[level]);
      }
      NodeKind::Normal { children } => children,
    };
    if level == 0 {
      return Err(Error::CorruptedStore(format!("normal node {root} at level 0")));
    }

    let bit = claim_hash.bit(level - 1) as usize;
    let child = self.remove_claim_hash(children[bit], claim_hash, level - 1)?;
    if child == children[bit] {
      return Ok(root);
    }
    self.tx.remove(&node_key(&root));

    let mut next = children;
    next[bit] = child;
    let empty = self.empty[level - 1];
    let survivor = match (next[0] == empty, next[1] == empty) {
      (true, true) => {
        debug!(target: LOG_TARGET, "collapsing {root} at level {level}");
        return Ok(self.empty[level]);
      }
      (false, false) => return self.put_normal(&next[0], &next[1]),
      (true, false) => next[1],
      (false, true) => next[0],
    };

    match self.read_node(&survivor, true)?.kind {
      NodeKind::Normal { .. } => self.put_normal(&next[0], &next[1]),
      NodeKind::Final { claim_hash: kept } => {
        // the lone claim left below moves up one level
        self.tx.remove(&node_key(&survivor));
        let hash = H::combine(&next[0], &next[1]);
        self.put_final(hash, &kept)?;
        debug!(target: LOG_TARGET, "promoting {kept} to level {level}");
        Ok(hash)
      }
    }
  }

  fn put_final(&mut self, hash: Hash, claim_hash: &Hash) -> Result<()> {
    let node = Node::new_final(self.current_version, *claim_hash);
    self.tx.insert(node_key(&hash), node.to_bytes()?);
    Ok(())
  }

  fn put_normal(&mut self, left: &Hash, right: &Hash) -> Result<Hash> {
    let hash = H::combine(left, right);
    let node = Node::new_normal(self.current_version, *left, *right);
    self.tx.insert(node_key(&hash), node.to_bytes()?);
    Ok(hash)
  }

  /// Reads a record, seeing uncommitted writes when `live` is set.
  fn load(&self, key: &[u8], live: bool) -> Result<Option<Vec<u8>>> {
    if live {
      match self.tx.lookup(key) {
        Lookup::Inserted(value) => return Ok(Some(value.to_vec())),
        Lookup::Deleted => return Ok(None),
        Lookup::Unknown => (),
      }
    }
    self.store.get(key)
  }

  fn read_node(&self, hash: &Hash, live: bool) -> Result<Node> {
    match self.load(&node_key(hash), live)? {
      Some(bytes) => Node::from_bytes(&bytes),
      None => Err(Error::CorruptedStore(format!("node {hash} is missing"))),
    }
  }

  fn read_claim(&self, claim_hash: &Hash, live: bool) -> Result<Vec<u8>> {
    match self.load(&claim_key(claim_hash), live)? {
      Some(bytes) => decode_claim(&bytes),
      None => Err(Error::CorruptedStore(format!("claim {claim_hash} is missing"))),
    }
  }

  /// Flushes the buffered writes together with the new version records as one atomic batch and returns the
  /// committed version.
  pub fn commit(&mut self) -> Result<u64> {
    let version = self.current_version;
    let mut ops = self.tx.to_ops(self.config.retain_history);
    ops.push(BatchOp::Put { key: version_key(version)?, value: self.root.as_bytes().to_vec() });
    ops.push(BatchOp::Put { key: CURRENT_VERSION_KEY.to_vec(), value: encode_version(version)? });
    let count = ops.len();
    self.store.batch(ops)?;

    self.tx.clear();
    self.committed_root = self.root;
    self.current_version += 1;
    info!(target: LOG_TARGET, "committed version {version} with {count} writes, root {}", self.root);
    Ok(version)
  }

  /// Discards uncommitted changes and returns to the last committed root.
  pub fn rollback(&mut self) {
    if !self.tx.is_empty() {
      info!(target: LOG_TARGET, "discarding {} uncommitted writes", self.tx.len());
    }
    self.tx.clear();
    self.root = self.committed_root;
  }

  /// Root of `version`; `None` or the current version mean the live root.
  pub fn root_at(&self, version: Option<u64>) -> Result<Hash> {
    match version {
      None => Ok(self.root),
      Some(v) if v == self.current_version => Ok(self.root),
      Some(v) if v == 0 || v > self.current_version => {
        Err(Error::InvalidVersion { requested: v, current: self.current_version })
      }
      Some(v) => match self.store.get(&version_key(v)?)? {
        Some(bytes) => decode_root(&bytes),
        None => Err(Error::CorruptedStore(format!("root of version {v} is missing"))),
      },
    }
  }

  /// Every committed version with its root, followed by the live root if it differs from the last commit.
  pub fn commits(&self) -> Result<Vec<(u64, Hash)>> {
    let mut commits = Vec::with_capacity(self.current_version as usize);
    for version in 1..self.current_version {
      commits.push((version, self.root_at(Some(version))?));
    }
    let last = commits.last().map(|(_, root)| *root).unwrap_or_else(|| self.empty.root());
    if self.root != last {
      commits.push((self.current_version, self.root));
    }
    Ok(commits)
  }

  /// A read-only view of `version`; `None` means the live tree.
  pub fn snapshot(&self, version: Option<u64>) -> Result<Snapshot<'_, H, S>> {
    let root = self.root_at(version)?;
    let version = version.unwrap_or(self.current_version);
    let live = version == self.current_version;
    Ok(Snapshot { tree: self, root, version, live })
  }

  pub fn claims(&self, version: Option<u64>) -> Result<Vec<Vec<u8>>> {
    self.snapshot(version)?.claims()
  }

  pub fn claim_hashes(&self, version: Option<u64>) -> Result<Vec<Hash>> {
    self.snapshot(version)?.claim_hashes()
  }

  pub fn contains(&self, claim: &[u8], version: Option<u64>) -> Result<bool> {
    self.snapshot(version)?.contains(claim)
  }

  pub fn generate_proof(&self, claim: &[u8], version: Option<u64>) -> Result<Option<MerkleProof>> {
    self.snapshot(version)?.generate_proof(claim)
  }

  /// Checks a serialized proof against `root` without touching the store.
  pub fn check_proof(&self, root: &Hash, claim: &[u8], proof: &[u8]) -> bool {
    proof::verify_with::<H>(&self.empty, root, claim, proof)
  }
}

/// A read-only view of the tree at one version.
pub struct Snapshot<'a, H: HashFunction, S: NodeStore> {
  tree: &'a ClaimTree<H, S>,
  root: Hash,
  version: u64,
  live: bool,
}

impl<H: HashFunction, S: NodeStore> Snapshot<'_, H, S> {
  pub fn root(&self) -> Hash {
    self.root
  }

  pub fn version(&self) -> u64 {
    self.version
  }

  /// Hashes of all claims, depth-first with the 0-side child first.
  pub fn claim_hashes(&self) -> Result<Vec<Hash>> {
    let mut hashes = Vec::new();
    self.collect(&mut hashes, self.root, self.tree.depth())?;
    Ok(hashes)
  }

  fn collect(&self, hashes: &mut Vec<Hash>, root: Hash, level: usize) -> Result<()> {
    if root == self.tree.empty[level] {
      return Ok(());
    }
    match self.tree.read_node(&root, self.live)?.kind {
      NodeKind::Normal { children } => {
        if level == 0 {
          return Err(Error::CorruptedStore(format!("normal node {root} at level 0")));
        }
        self.collect(hashes, children[0], level - 1)?;
        self.collect(hashes, children[1], level - 1)?;
      }
      NodeKind::Final { claim_hash } => hashes.push(claim_hash),
    }
    Ok(())
  }

  pub fn claims(&self) -> Result<Vec<Vec<u8>>> {
    self.claim_hashes()?.iter().map(|hash| self.tree.read_claim(hash, self.live)).collect()
  }

  pub fn contains(&self, claim: &[u8]) -> Result<bool> {
    Ok(self.generate_proof(claim)?.is_some())
  }

  /// Builds the membership proof of `claim`, or `None` if the claim is not in this version.
  pub fn generate_proof(&self, claim: &[u8]) -> Result<Option<MerkleProof>> {
    let claim_hash = H::digest(claim);
    let empty = &self.tree.empty;
    let mut bitmap = [0u8; HASH_SIZE];
    let mut siblings = Vec::new();
    let mut hash = self.root;
    let mut level = self.tree.depth();
    while level > 0 {
      if hash == empty[level] {
        return Ok(None);
      }
      match self.tree.read_node(&hash, self.live)?.kind {
        NodeKind::Final { claim_hash: found } if found == claim_hash => break,
        NodeKind::Final { .. } => return Ok(None),
        NodeKind::Normal { children } => {
          let bit = claim_hash.bit(level - 1) as usize;
          let sibling = children[1 - bit];
          if sibling != empty[level - 1] {
            set_bit(&mut bitmap, level - 1, true);
            siblings.push(sibling);
          }
          hash = children[bit];
          level -= 1;
        }
      }
    }
    if level == 0 && hash != claim_hash {
      return Ok(None);
    }
    siblings.reverse();
    Ok(Some(MerkleProof::new(bitmap, siblings)))
  }
}
