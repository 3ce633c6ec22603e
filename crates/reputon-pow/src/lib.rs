// crates/reputon-pow/src/lib.rs
//
// reputon-pow: Proof-of-work artifact for the Reputon protocol.
//
// Each round, a node walks a sequential hash chain seeded by the round hash,
// writing every link into a large backing file, then hashes the whole file.
// The resulting file hash is bound to a claimant's identity with a
// memory-hard hash to form the coded proof peers verify.

pub mod backing;
pub mod chain;
pub mod coded;

pub use chain::{ChainArtifact, HashChainEngine};
pub use coded::{coded_proof, coded_proof_blocking};
