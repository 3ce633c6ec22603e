// crates/reputon-core/src/error.rs

use thiserror::Error;

/// Protocol-wide error types for Reputon.
#[derive(Debug, Error)]
pub enum ReputonError {
    /// Backing file or opinion file I/O failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A peer broadcast that could not be decoded. Only that peer's message
    /// is discarded.
    #[error("Malformed message from {peer}: {reason}")]
    MalformedPeerMessage { peer: String, reason: String },

    /// A reachability probe did not answer within its timeout.
    #[error("Probe timed out: {0}")]
    ProbeTimeout(String),

    /// A reachability probe failed at the socket level.
    #[error("Probe transport error: {0}")]
    ProbeTransport(String),

    /// Hashing or key decoding error.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The round context is missing or unusable. Fatal for the round.
    #[error("Invalid round context: {0}")]
    InvalidRoundContext(String),

    /// A parameter set failed validation.
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Invalid state transition.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Daemon configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for ReputonError {
    fn from(e: serde_json::Error) -> Self {
        ReputonError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for ReputonError {
    fn from(e: std::io::Error) -> Self {
        ReputonError::Storage(e.to_string())
    }
}

impl From<hex::FromHexError> for ReputonError {
    fn from(e: hex::FromHexError) -> Self {
        ReputonError::Serialization(format!("invalid hex: {}", e))
    }
}

impl From<ed25519_dalek::SignatureError> for ReputonError {
    fn from(e: ed25519_dalek::SignatureError) -> Self {
        ReputonError::Crypto(e.to_string())
    }
}
