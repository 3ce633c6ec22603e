// crates/reputon-reputation/src/lib.rs
//
// reputon-reputation: Opinion ledger, partitioning, and scoring for the
// Reputon protocol.
//
// A node forms two independent opinions about each peer: how often the
// peer's proof of work verified (resource opinion), and how often its probe
// ports answered (port opinion). This crate updates the first from a round's
// buffered broadcasts, decides which peers a node probes each rotation, and
// folds both opinions into one score.

pub mod ledger;
pub mod partition;
pub mod score;

pub use ledger::{score_proofs, ScoringSummary};
pub use partition::{compute_assignment, is_rotation_round, probe_targets};
pub use score::{compute_scores, PeerScore, ScoreBoard};
