// crates/reputon-core/src/round.rs
//
// Round context supplied by the host consensus runtime, and the proof
// broadcast peers exchange within a round.

use serde::{Deserialize, Serialize};

use crate::error::ReputonError;
use crate::identity::PeerKey;
use crate::instance::InstanceInfo;

/// Everything the host runtime tells us about the current round.
///
/// Read-only to the core. Membership of `peer_set` is fixed for the round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundContext {
    /// Ledger sequence number of the last closed round.
    pub sequence_number: u64,
    /// Hex hash of the last closed round. Seeds the hash chain and probes.
    pub round_hash: String,
    /// This node's public key.
    pub local_identity: PeerKey,
    /// Ordered peer set (UNL) for the round.
    pub peer_set: Vec<PeerKey>,
    /// True when the invocation only serves client queries.
    #[serde(default)]
    pub is_read_only: bool,
}

impl RoundContext {
    /// Check the parts of the context the core cannot proceed without.
    pub fn validate(&self) -> Result<(), ReputonError> {
        if self.round_hash.is_empty() {
            return Err(ReputonError::InvalidRoundContext(
                "round hash is empty".to_string(),
            ));
        }
        self.round_hash_bytes()?;
        Ok(())
    }

    /// Decoded round hash.
    pub fn round_hash_bytes(&self) -> Result<Vec<u8>, ReputonError> {
        hex::decode(&self.round_hash).map_err(|e| {
            ReputonError::InvalidRoundContext(format!("round hash is not hex: {}", e))
        })
    }

    pub fn is_member(&self, peer: &PeerKey) -> bool {
        self.peer_set.contains(peer)
    }
}

/// Payload every node broadcasts once per round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofBroadcast {
    /// Identity-coded proof, hex.
    pub pow: String,
    /// The sender's own instance info, when it has one.
    #[serde(default)]
    pub instance: Option<InstanceInfo>,
}

impl ProofBroadcast {
    pub fn encode(&self) -> Result<Vec<u8>, ReputonError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// A peer's broadcast as received.
///
/// Only the proof has to decode for the message to count. The instance info
/// stays raw until [`ReceivedBroadcast::instance_info`] is asked for it, so a
/// bad port never costs the sender its proof credit.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReceivedBroadcast {
    pub pow: String,
    #[serde(default)]
    pub instance: Option<serde_json::Value>,
}

impl ReceivedBroadcast {
    /// Decode a peer's payload, attributing failures to that peer.
    pub fn decode(peer: &PeerKey, payload: &[u8]) -> Result<Self, ReputonError> {
        serde_json::from_slice(payload).map_err(|e| malformed(peer, e))
    }

    /// The piggybacked instance info, if the sender included any.
    pub fn instance_info(&self, peer: &PeerKey) -> Result<Option<InstanceInfo>, ReputonError> {
        match &self.instance {
            None => Ok(None),
            Some(raw) => InstanceInfo::deserialize(raw)
                .map(Some)
                .map_err(|e| malformed(peer, e)),
        }
    }
}

fn malformed(peer: &PeerKey, e: serde_json::Error) -> ReputonError {
    ReputonError::MalformedPeerMessage {
        peer: peer.to_string(),
        reason: e.to_string(),
    }
}

/// A payload delivered by the broadcast layer, exactly as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub peer: PeerKey,
    pub payload: Vec<u8>,
}
