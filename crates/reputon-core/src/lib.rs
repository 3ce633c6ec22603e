// crates/reputon-core/src/lib.rs
//
// reputon-core: Core types, parameters, traits, and hash primitives for the
// Reputon reputation protocol.
//
// This is the leaf crate that every other crate in the workspace depends on.
// It defines the round context handed in by the host runtime, the persisted
// opinion data model, the tunable parameters, the protocol-wide error type,
// and the store/transport seams the round runner is wired through.

pub mod crypto;
pub mod error;
pub mod identity;
pub mod instance;
pub mod opinion;
pub mod params;
pub mod round;
pub mod traits;

// Re-export key types for ergonomic access from downstream crates.
// Usage: `use reputon_core::PeerKey;`

// Identity types
pub use identity::PeerKey;

// Round types
pub use round::{InboundMessage, ProofBroadcast, ReceivedBroadcast, RoundContext};

// Cluster metadata
pub use instance::{ClusterDirectory, InstanceInfo};

// Opinion ledger types
pub use opinion::{
    ExecutionCounter, LedgerSnapshot, PortOpinion, PortRatio, ResourceOpinion,
    SubUniverseAssignment,
};

// Parameters
pub use params::{ChainParams, MemoryHardParams, ProbeParams, RoundParams, ScoreParams};

// Error type
pub use error::ReputonError;

// Traits
pub use traits::{RoundTransport, StateStore};
