use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use claimtree::bits::from_hex;
use claimtree::config::DEFAULT_DEPTH;
use claimtree::{
  Blake3, ClaimTree, Error, Hash, HashFunction, Keccak256, Result, RocksDBStore, Sha256, TreeConfig, parse_claims,
  verify,
};
use log::info;

const LOG_TARGET: &str = "claimtree";

#[derive(Parser)]
#[command(name = "claimtree")]
#[command(author, version, about = "Versioned set of claims authenticated by a sparse Merkle tree")]
struct Args {
  /// RocksDB directory holding the tree
  #[arg(short, long, env = "CLAIMTREE_DB", default_value = "claims.db")]
  db: PathBuf,

  /// Depth of the tree; must match the depth the database was created with
  #[arg(long, default_value_t = DEFAULT_DEPTH)]
  depth: usize,

  #[arg(long, value_enum, default_value_t = HashKind::Sha256)]
  hash: HashKind,

  /// Version to read instead of the latest one
  #[arg(short, long)]
  commit: Option<u64>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum HashKind {
  Blake3,
  Sha256,
  Keccak256,
}

#[derive(Subcommand)]
enum Command {
  /// Adds the claims of a file, one hex claim per line, and commits
  Add { claims_file: PathBuf },

  /// Removes the claims of a file, one hex claim per line, and commits
  Remove { claims_file: PathBuf },

  /// Prints every version with its root
  Info,

  /// Prints the Merkle proof of a hex claim
  #[command(alias = "generateProof")]
  GenerateProof { claim: String },

  /// Checks a proof of a hex claim against a root, without a database
  #[command(alias = "checkProof")]
  CheckProof { root: String, claim: String, proof: String },

  /// Prints all claims, one per line
  Export,
}

fn main() -> ExitCode {
  env_logger::init();
  let args = Args::parse();

  let result = match args.hash {
    HashKind::Blake3 => run::<Blake3>(&args),
    HashKind::Sha256 => run::<Sha256>(&args),
    HashKind::Keccak256 => run::<Keccak256>(&args),
  };
  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      println!("ERROR: {err}");
      ExitCode::FAILURE
    }
  }
}

fn run<H: HashFunction>(args: &Args) -> Result<()> {
  match &args.command {
    Command::Add { claims_file } => {
      let mut tree = open_tree::<H>(args)?;
      for claim in read_claims(claims_file)?.iter() {
        tree.add_claim(claim)?;
      }
      let version = tree.commit()?;
      info!(target: LOG_TARGET, "version {version}: {}", tree.root());
    }
    Command::Remove { claims_file } => {
      let mut tree = open_tree::<H>(args)?;
      for claim in read_claims(claims_file)?.iter() {
        tree.remove_claim(claim)?;
      }
      let version = tree.commit()?;
      info!(target: LOG_TARGET, "version {version}: {}", tree.root());
    }
    Command::Info => {
      for (version, root) in open_tree::<H>(args)?.commits()? {
        println!("{version} -> {root}");
      }
    }
    Command::GenerateProof { claim } => {
      let claim = from_hex(claim)?;
      match open_tree::<H>(args)?.generate_proof(&claim, args.commit)? {
        Some(proof) => println!("{proof}"),
        None => return Err(Error::ClaimNotFound(H::digest(&claim))),
      }
    }
    Command::CheckProof { root, claim, proof } => {
      let valid = verify::<H>(args.depth, &Hash::from_hex(root)?, &from_hex(claim)?, &from_hex(proof)?);
      println!("{}", if valid { "VALID" } else { "INVALID" });
    }
    Command::Export => {
      for claim in open_tree::<H>(args)?.claims(args.commit)? {
        println!("{}", hex::encode(claim));
      }
    }
  }
  Ok(())
}

fn open_tree<H: HashFunction>(args: &Args) -> Result<ClaimTree<H, RocksDBStore>> {
  let store = RocksDBStore::open(&args.db)?;
  ClaimTree::open(store, TreeConfig::new(args.depth))
}

fn read_claims(path: &Path) -> Result<Vec<Vec<u8>>> {
  let text = read_to_string(path)?;
  parse_claims(&text)
}
