use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::*;
use crate::bits::pad_left;
use crate::hash::{Blake3, Keccak256, Sha256};
use crate::storage::memory::MemoryStore;

fn build_claim(fields: [&[u8]; 4]) -> Vec<u8> {
  fields.iter().flat_map(|field| pad_left(field, 32).unwrap()).collect()
}

fn numbered_claim(i: u8) -> Vec<u8> {
  build_claim([&[0x01], &[0x02], &[0x03], &[i]])
}

fn open<H: HashFunction>(depth: usize) -> ClaimTree<H, MemoryStore> {
  ClaimTree::open(MemoryStore::new(), TreeConfig::new(depth)).unwrap()
}

#[test]
fn empty_tree_of_depth_0() {
  let tree = open::<Keccak256>(0);
  assert_eq!("0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470", tree.root().to_hex());
}

#[test]
fn empty_tree_of_depth_140() {
  let tree = open::<Keccak256>(140);
  assert_eq!("0x3bd4272c1c556e016a8f7111b04005319fbd1e546875f354b5dd230f4d8ab1c1", tree.root().to_hex());
  assert_eq!(1, tree.current_version());
  assert!(tree.claims(None).unwrap().is_empty());
}

#[test]
fn depth_0_root_never_changes() {
  let mut tree = open::<Keccak256>(0);
  let empty = tree.root();
  assert_eq!(empty, tree.add_claim(&numbered_claim(4)).unwrap());
  assert_eq!(empty, tree.remove_claim(&numbered_claim(4)).unwrap());
  assert_eq!(Keccak256::digest(b""), tree.root());
}

#[test]
fn add_and_remove_a_claim() {
  let mut tree = open::<Keccak256>(140);
  let empty = tree.root();
  let claim = numbered_claim(4);
  tree.add_claim(&claim).unwrap();
  assert_eq!("0x062e6d2209d26ca9affe0721ee3c38fcb4e22ff6a09bced50f38026d974cfca7", tree.root().to_hex());
  tree.remove_claim(&claim).unwrap();
  assert_eq!(empty, tree.root());
  assert_eq!(0, tree.pending());
}

#[test]
fn adding_twice_is_idempotent() {
  let mut tree = open::<Sha256>(140);
  let claim = numbered_claim(9);
  let once = tree.add_claim(&claim).unwrap();
  let pending = tree.pending();
  assert_eq!(once, tree.add_claim(&claim).unwrap());
  assert_eq!(pending, tree.pending());
  tree.add_claim(&numbered_claim(10)).unwrap();
  let both = tree.root();
  assert_eq!(both, tree.add_claim(&claim).unwrap());
}

#[test]
fn two_claims_in_either_order() {
  let claim1 = numbered_claim(4);
  let claim2 = numbered_claim(5);

  let mut tree1 = open::<Keccak256>(140);
  let empty = tree1.root();
  tree1.add_claim(&claim1).unwrap();
  tree1.add_claim(&claim2).unwrap();

  let mut tree2 = open::<Keccak256>(140);
  tree2.add_claim(&claim2).unwrap();
  tree2.add_claim(&claim1).unwrap();
  assert_eq!(tree1.root(), tree2.root());

  tree1.remove_claim(&claim1).unwrap();
  tree1.remove_claim(&claim2).unwrap();
  assert_eq!(empty, tree1.root());

  tree2.remove_claim(&claim2).unwrap();
  tree2.remove_claim(&claim1).unwrap();
  assert_eq!(empty, tree2.root());
}

#[test]
fn ten_claims_removed_in_another_order() {
  let mut tree = open::<Keccak256>(140);
  let empty = tree.root();
  let claims = (0..10u8).map(numbered_claim).collect::<Vec<_>>();
  for claim in claims.iter() {
    tree.add_claim(claim).unwrap();
  }
  assert_eq!("0x7e9cf308435593267d01f065ca3593666462452f2999ac38e7a0a382db99fb9e", tree.root().to_hex());

  for claim in claims.iter().rev() {
    tree.remove_claim(claim).unwrap();
  }
  assert_eq!(empty, tree.root());
  assert_eq!(0, tree.pending());
}

#[test]
fn repeated_claims_give_the_same_root() {
  let mut tree = open::<Keccak256>(140);
  let empty = tree.root();
  let claims = (0..100u8).map(|i| numbered_claim(i % 10)).collect::<Vec<_>>();
  for claim in claims.iter() {
    tree.add_claim(claim).unwrap();
  }
  assert_eq!("0x7e9cf308435593267d01f065ca3593666462452f2999ac38e7a0a382db99fb9e", tree.root().to_hex());
  assert_eq!(10, tree.claims(None).unwrap().len());

  for claim in claims.iter() {
    tree.remove_claim(claim).unwrap();
  }
  assert_eq!(empty, tree.root());
  assert_eq!(0, tree.pending());
}

fn random_claims(rng: &mut StdRng, n: usize) -> Vec<Vec<u8>> {
  (0..n).map(|_| (0..rng.random_range(1..48)).map(|_| rng.random::<u8>()).collect()).collect()
}

fn verify_order_independence<H: HashFunction>(seed: u64) {
  let mut rng = StdRng::seed_from_u64(seed);
  let mut claims = random_claims(&mut rng, 64);
  claims.sort();
  claims.dedup();

  let mut reference = open::<H>(140);
  for claim in claims.iter() {
    reference.add_claim(claim).unwrap();
  }
  for _ in 0..4 {
    claims.shuffle(&mut rng);
    let mut tree = open::<H>(140);
    for claim in claims.iter() {
      tree.add_claim(claim).unwrap();
    }
    assert_eq!(reference.root(), tree.root());

    claims.shuffle(&mut rng);
    for claim in claims.iter() {
      tree.remove_claim(claim).unwrap();
    }
    assert_eq!(tree.empty_root(), tree.root());
    assert_eq!(0, tree.pending());
  }
}

#[test]
fn root_depends_only_on_the_claim_set() {
  verify_order_independence::<Sha256>(1);
  verify_order_independence::<Keccak256>(2);
  verify_order_independence::<Blake3>(3);
}

#[test]
fn interleaved_mutations_converge() {
  let mut rng = StdRng::seed_from_u64(42);
  let mut claims = random_claims(&mut rng, 40);
  claims.sort();
  claims.dedup();

  let mut tree = open::<Blake3>(64);
  let mut present = vec![false; claims.len()];
  for _ in 0..400 {
    let i = rng.random_range(0..claims.len());
    if rng.random_bool(0.6) {
      tree.add_claim(&claims[i]).unwrap();
      present[i] = true;
    } else {
      tree.remove_claim(&claims[i]).unwrap();
      present[i] = false;
    }
  }

  let mut expected = open::<Blake3>(64);
  for (claim, _) in claims.iter().zip(present.iter()).filter(|(_, p)| **p) {
    expected.add_claim(claim).unwrap();
  }
  assert_eq!(expected.root(), tree.root());

  let mut listed = tree.claims(None).unwrap();
  let members = claims.iter().zip(present.iter()).filter(|(_, p)| **p).map(|(c, _)| c.clone()).collect::<Vec<_>>();
  listed.sort();
  assert_eq!(members, listed);
}

#[test]
fn removing_an_absent_claim_changes_nothing() {
  let mut tree = open::<Sha256>(140);
  tree.add_claim(&numbered_claim(1)).unwrap();
  tree.add_claim(&numbered_claim(2)).unwrap();
  let root = tree.root();
  let pending = tree.pending();
  assert_eq!(root, tree.remove_claim(&numbered_claim(3)).unwrap());
  assert_eq!(root, tree.remove_claim(&[]).unwrap());
  assert_eq!(pending, tree.pending());
}

#[test]
fn enumerates_claims() {
  let mut tree = open::<Sha256>(140);
  let claims = (0..20u8).map(numbered_claim).collect::<Vec<_>>();
  for claim in claims.iter() {
    tree.add_claim(claim).unwrap();
  }
  let mut listed = tree.claims(None).unwrap();
  listed.sort();
  assert_eq!(claims, listed);

  let hashes = tree.claim_hashes(None).unwrap();
  assert_eq!(20, hashes.len());
  for claim in claims.iter() {
    assert!(hashes.contains(&Sha256::digest(claim)));
    assert!(tree.contains(claim, None).unwrap());
  }
  assert!(!tree.contains(&numbered_claim(20), None).unwrap());
}

#[test]
fn merkle_proofs_verify() {
  let mut tree = open::<Keccak256>(140);
  let empty = tree.root();
  let claim1 = numbered_claim(4);
  let claim2 = numbered_claim(5);
  tree.add_claim(&claim1).unwrap();
  tree.add_claim(&claim2).unwrap();
  let root = tree.root();

  let mp = tree.generate_proof(&claim1, None).unwrap().unwrap().to_bytes();
  assert!(tree.check_proof(&root, &claim1, &mp));
  assert!(!tree.check_proof(&empty, &claim1, &mp));
  assert!(!tree.check_proof(&empty, &claim2, &mp));
  assert!(!tree.check_proof(&root, &claim2, &mp));

  let mp2 = tree.generate_proof(&claim2, None).unwrap().unwrap().to_bytes();
  assert!(tree.check_proof(&root, &claim2, &mp2));
  assert!(proof::verify::<Keccak256>(140, &root, &claim2, &mp2));
  assert!(!proof::verify::<Keccak256>(139, &root, &claim2, &mp2));
  assert!(!proof::verify::<Sha256>(140, &root, &claim2, &mp2));

  let mut truncated = mp2.clone();
  truncated.truncate(mp2.len() - 1);
  assert!(!tree.check_proof(&root, &claim2, &truncated));
  let mut extended = mp2.clone();
  extended.extend_from_slice(&[0u8; 32]);
  assert!(!tree.check_proof(&root, &claim2, &extended));
}

#[test]
fn proofs_only_exist_for_members() {
  let mut rng = StdRng::seed_from_u64(7);
  let claims = random_claims(&mut rng, 30);
  let (members, others) = claims.split_at(20);
  let mut tree = open::<Sha256>(140);
  for claim in members.iter() {
    tree.add_claim(claim).unwrap();
  }
  let root = tree.root();

  let proofs = members.iter().map(|c| tree.generate_proof(c, None).unwrap().unwrap()).collect::<Vec<_>>();
  for (claim, proof) in members.iter().zip(proofs.iter()) {
    assert!(tree.check_proof(&root, claim, &proof.to_bytes()));
    assert!(proof.siblings().len() < 20);
  }
  assert!(!tree.check_proof(&root, &members[1], &proofs[0].to_bytes()));
  for claim in others.iter() {
    if !members.contains(claim) {
      assert_eq!(None, tree.generate_proof(claim, None).unwrap());
      assert!(!tree.check_proof(&root, claim, &proofs[0].to_bytes()));
    }
  }
}

#[test]
fn proof_of_a_lone_claim_is_only_the_bitmap() {
  let mut tree = open::<Blake3>(140);
  let claim = numbered_claim(1);
  tree.add_claim(&claim).unwrap();
  let proof = tree.generate_proof(&claim, None).unwrap().unwrap();
  assert_eq!(&[0u8; 32], proof.bitmap());
  assert!(proof.siblings().is_empty());
  assert!(tree.check_proof(&tree.root(), &claim, &proof.to_bytes()));
  assert_eq!(None, tree.generate_proof(&numbered_claim(2), None).unwrap());
}

#[test]
fn commits_create_versions() {
  let mut tree = open::<Sha256>(140);
  assert!(tree.commits().unwrap().is_empty());

  tree.add_claim(&numbered_claim(1)).unwrap();
  assert_eq!(1, tree.commit().unwrap());
  let root1 = tree.root();
  tree.add_claim(&numbered_claim(2)).unwrap();
  assert_eq!(2, tree.commit().unwrap());
  let root2 = tree.root();
  assert_eq!(0, tree.pending());
  assert_eq!(3, tree.current_version());
  assert_eq!(vec![(1, root1), (2, root2)], tree.commits().unwrap());

  tree.add_claim(&numbered_claim(3)).unwrap();
  let live = tree.root();
  assert_eq!(vec![(1, root1), (2, root2), (3, live)], tree.commits().unwrap());

  assert_eq!(root1, tree.root_at(Some(1)).unwrap());
  assert_eq!(live, tree.root_at(Some(3)).unwrap());
  assert_eq!(live, tree.root_at(None).unwrap());
  assert!(matches!(tree.root_at(Some(4)), Err(Error::InvalidVersion { requested: 4, current: 3 })));
  assert!(matches!(tree.root_at(Some(0)), Err(Error::InvalidVersion { .. })));
  assert!(matches!(tree.claims(Some(9)), Err(Error::InvalidVersion { .. })));
}

#[test]
fn earlier_versions_stay_readable() {
  let mut tree = open::<Sha256>(140);
  let (a, b, c) = (numbered_claim(1), numbered_claim(2), numbered_claim(3));
  tree.add_claim(&a).unwrap();
  tree.add_claim(&b).unwrap();
  tree.commit().unwrap();
  tree.remove_claim(&a).unwrap();
  tree.add_claim(&c).unwrap();
  tree.commit().unwrap();
  tree.remove_claim(&b).unwrap();

  let mut v1 = tree.claims(Some(1)).unwrap();
  v1.sort();
  assert_eq!(vec![a.clone(), b.clone()], v1);
  let mut v2 = tree.claims(Some(2)).unwrap();
  v2.sort();
  assert_eq!(vec![b.clone(), c.clone()], v2);
  assert_eq!(vec![c.clone()], tree.claims(None).unwrap());

  let snapshot = tree.snapshot(Some(1)).unwrap();
  assert_eq!(1, snapshot.version());
  let proof = snapshot.generate_proof(&a).unwrap().unwrap();
  assert!(tree.check_proof(&snapshot.root(), &a, &proof.to_bytes()));
  assert!(!tree.check_proof(&tree.root(), &a, &proof.to_bytes()));
  assert!(!tree.contains(&c, Some(1)).unwrap());
  assert!(tree.contains(&a, Some(1)).unwrap());
  assert!(!tree.contains(&a, None).unwrap());
}

#[test]
fn reopen_restores_the_last_commit() {
  let store = MemoryStore::new();
  let (root, claims) = {
    let mut tree = ClaimTree::<Keccak256, _>::open(store.clone(), TreeConfig::new(140)).unwrap();
    for i in 0..10u8 {
      tree.add_claim(&numbered_claim(i)).unwrap();
    }
    tree.commit().unwrap();
    let root = tree.root();
    tree.add_claim(&numbered_claim(99)).unwrap();
    (root, tree.claims(Some(1)).unwrap())
  };

  let tree = ClaimTree::<Keccak256, _>::open(store, TreeConfig::new(140)).unwrap();
  assert_eq!(2, tree.current_version());
  assert_eq!(root, tree.root());
  assert_eq!("0x7e9cf308435593267d01f065ca3593666462452f2999ac38e7a0a382db99fb9e", tree.root().to_hex());
  assert_eq!(claims, tree.claims(None).unwrap());
}

#[test]
fn rollback_discards_uncommitted_changes() {
  let mut tree = open::<Blake3>(140);
  tree.add_claim(&numbered_claim(1)).unwrap();
  tree.commit().unwrap();
  let committed = tree.root();
  tree.remove_claim(&numbered_claim(1)).unwrap();
  tree.add_claim(&numbered_claim(2)).unwrap();
  assert_ne!(committed, tree.root());

  tree.rollback();
  assert_eq!(committed, tree.root());
  assert_eq!(0, tree.pending());
  assert_eq!(vec![numbered_claim(1)], tree.claims(None).unwrap());
}

#[test]
fn nothing_reaches_the_store_before_commit() {
  let store = MemoryStore::new();
  let mut tree = ClaimTree::<Sha256, _>::open(store.clone(), TreeConfig::new(140)).unwrap();
  tree.add_claim(&numbered_claim(1)).unwrap();
  tree.add_claim(&numbered_claim(2)).unwrap();
  assert!(store.is_empty().unwrap());
  tree.commit().unwrap();
  assert!(!store.is_empty().unwrap());
}

#[test]
fn history_retention_controls_deletes() {
  let claim = numbered_claim(1);
  for (retain, records) in [(true, 5), (false, 3)] {
    let store = MemoryStore::new();
    let config = TreeConfig::new(140).retain_history(retain);
    let mut tree = ClaimTree::<Sha256, _>::open(store.clone(), config).unwrap();
    tree.add_claim(&claim).unwrap();
    tree.commit().unwrap();
    // final node, claim record, version 1 root, current version
    assert_eq!(4, store.len().unwrap());
    tree.remove_claim(&claim).unwrap();
    tree.commit().unwrap();
    assert_eq!(records, store.len().unwrap(), "retain_history={retain}");
    assert_eq!(retain, tree.claims(Some(1)).is_ok());
  }
}

#[test]
fn live_reads_see_pending_deletes() {
  let mut tree = open::<Sha256>(140);
  let claims = (0..6u8).map(numbered_claim).collect::<Vec<_>>();
  for claim in claims.iter() {
    tree.add_claim(claim).unwrap();
  }
  tree.commit().unwrap();
  tree.remove_claim(&claims[0]).unwrap();
  tree.remove_claim(&claims[3]).unwrap();
  tree.add_claim(&claims[0]).unwrap();

  let mut listed = tree.claims(None).unwrap();
  listed.sort();
  assert_eq!(vec![claims[0].clone(), claims[1].clone(), claims[2].clone(), claims[4].clone(), claims[5].clone()], listed);
  for claim in listed.iter() {
    let proof = tree.generate_proof(claim, None).unwrap().unwrap();
    assert!(tree.check_proof(&tree.root(), claim, &proof.to_bytes()));
  }
  assert_eq!(6, tree.claims(Some(1)).unwrap().len());
}

#[test]
fn missing_node_is_reported_as_corruption() {
  let store = MemoryStore::new();
  let mut tree = ClaimTree::<Sha256, _>::open(store.clone(), TreeConfig::new(140)).unwrap();
  tree.add_claim(&numbered_claim(1)).unwrap();
  tree.add_claim(&numbered_claim(2)).unwrap();
  tree.commit().unwrap();
  store.batch(vec![BatchOp::Delete { key: node_key(&tree.root()) }]).unwrap();

  assert!(matches!(tree.claims(None), Err(Error::CorruptedStore(_))));
  assert!(matches!(tree.add_claim(&numbered_claim(3)), Err(Error::CorruptedStore(_))));
}

#[test]
fn missing_root_record_is_reported_as_corruption() {
  let store = MemoryStore::new();
  store.batch(vec![BatchOp::Put { key: CURRENT_VERSION_KEY.to_vec(), value: encode_version(3).unwrap() }]).unwrap();
  assert!(matches!(ClaimTree::<Sha256, _>::open(store, TreeConfig::new(140)), Err(Error::CorruptedStore(_))));
}

#[test]
fn depth_beyond_the_digest_is_rejected() {
  assert!(matches!(ClaimTree::<Sha256, _>::open(MemoryStore::new(), TreeConfig::new(257)), Err(Error::InvalidDepth(257))));
}

/// A digest keeping only the first and last byte of SHA-256, so distinct claims easily share low bits.
struct Weak;

impl HashFunction for Weak {
  fn digest(data: &[u8]) -> Hash {
    let full = Sha256::digest(data);
    let mut value = [0u8; HASH_SIZE];
    value[0] = full.0[0];
    value[HASH_SIZE - 1] = full.0[HASH_SIZE - 1];
    Hash::new(value)
  }
}

#[test]
fn terminal_slot_collision_aborts_the_mutation() {
  let mut slots = HashMap::<u8, (u32, Hash)>::new();
  let (first, second) = (0u32..)
    .find_map(|i| {
      let hash = Weak::digest(&i.to_be_bytes());
      let slot = hash.0[HASH_SIZE - 1];
      match slots.get(&slot).copied() {
        Some((other, other_hash)) if other_hash != hash => Some((other, i)),
        Some(_) => None,
        None => {
          slots.insert(slot, (i, hash));
          None
        }
      }
    })
    .unwrap();

  let mut tree = open::<Weak>(8);
  tree.add_claim(&first.to_be_bytes()).unwrap();
  assert!(matches!(tree.add_claim(&second.to_be_bytes()), Err(Error::Collision { level: 0 })));
}

/// Wraps a [`MemoryStore`] and fails every access while `down` is set.
struct FlakyStore {
  inner: MemoryStore,
  down: Arc<AtomicBool>,
}

impl FlakyStore {
  fn check(&self) -> Result<()> {
    if self.down.load(Ordering::SeqCst) {
      return Err(Error::Storage("down".to_string()));
    }
    Ok(())
  }
}

impl NodeStore for FlakyStore {
  fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
    self.check()?;
    self.inner.get(key)
  }

  fn batch(&self, ops: Vec<BatchOp>) -> Result<()> {
    self.check()?;
    self.inner.batch(ops)
  }
}

#[test]
fn failed_commit_leaves_store_and_version_untouched() {
  let inner = MemoryStore::new();
  let down = Arc::new(AtomicBool::new(false));
  let store = FlakyStore { inner: inner.clone(), down: down.clone() };
  let mut tree = ClaimTree::<Sha256, _>::open(store, TreeConfig::new(140)).unwrap();
  tree.add_claim(b"a").unwrap();
  tree.add_claim(b"b").unwrap();
  tree.commit().unwrap();
  let committed = tree.root();
  let records = inner.len().unwrap();

  tree.remove_claim(b"a").unwrap();
  tree.add_claim(b"c").unwrap();
  down.store(true, Ordering::SeqCst);
  assert!(matches!(tree.commit(), Err(Error::Storage(msg)) if msg == "down"));
  assert_eq!(2, tree.current_version());
  assert_eq!(records, inner.len().unwrap());

  tree.rollback();
  assert_eq!(committed, tree.root());
  assert!(matches!(tree.add_claim(b"d"), Err(Error::Storage(_))));
  assert!(matches!(tree.claims(None), Err(Error::Storage(_))));

  down.store(false, Ordering::SeqCst);
  tree.rollback();
  let mut claims = tree.claims(None).unwrap();
  claims.sort();
  assert_eq!(vec![b"a".to_vec(), b"b".to_vec()], claims);
  assert_eq!(2, tree.commit().unwrap());
  assert_eq!(committed, tree.root_at(Some(2)).unwrap());
}
