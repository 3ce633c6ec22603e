// crates/reputon-round/src/lib.rs
//
// reputon-round: Round orchestration for the Reputon protocol.
//
// The host runtime invokes a node once per round. A writing round computes
// the hash chain, broadcasts the coded proof, buffers peer proofs until the
// window closes, scores them, runs the reachability cycle, and persists the
// ledger. A read-only round only answers client queries.

pub mod inbox;
pub mod phase;
pub mod query;
pub mod runner;

pub use inbox::{round_inbox, InboxHandle, RoundInbox};
pub use phase::{RoundPhase, RoundPhaseMachine};
pub use query::{QueryRequest, QueryService};
pub use runner::{RoundOutcome, RoundRunner};
