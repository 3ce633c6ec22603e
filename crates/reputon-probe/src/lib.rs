// crates/reputon-probe/src/lib.rs
//
// reputon-probe: Reachability evaluation for the Reputon protocol.
//
// Each node probes the advertised TCP and UDP ports of the peers in its
// sub-universe with a challenge derived from the round hash. A peer's echo
// responder proves it is reachable by answering with a digest bound to its
// own public key.

pub mod challenge;
pub mod engine;
pub mod prober;
pub mod responder;

pub use challenge::{expected_response, probe_challenge};
pub use engine::{CycleOutcome, PeerProbeResult, ReachabilityEngine};
pub use prober::{probe_peer, ProbeTransport};
pub use responder::{ProbeResponder, ResponderHandle};
