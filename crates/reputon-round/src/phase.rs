// crates/reputon-round/src/phase.rs
//
// Round phase state machine.
//
// Valid transitions:
//   Collecting -> ArtifactReady -> Broadcast -> WindowOpen -> Scoring -> Persisted
//   Any state -> Aborted

use std::fmt;

use serde::Serialize;

use reputon_core::error::ReputonError;

/// Where a writing round currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// Buffering peer proofs while the local artifact is computed.
    Collecting,
    /// Local coded proof is available.
    ArtifactReady,
    /// Local proof handed to the broadcast layer.
    Broadcast,
    /// Waiting for the proof window to close.
    WindowOpen,
    /// Verifying buffered proofs.
    Scoring,
    /// Ledger written; the round is complete.
    Persisted,
    /// The round stopped on a fatal error.
    Aborted,
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundPhase::Collecting => write!(f, "Collecting"),
            RoundPhase::ArtifactReady => write!(f, "ArtifactReady"),
            RoundPhase::Broadcast => write!(f, "Broadcast"),
            RoundPhase::WindowOpen => write!(f, "WindowOpen"),
            RoundPhase::Scoring => write!(f, "Scoring"),
            RoundPhase::Persisted => write!(f, "Persisted"),
            RoundPhase::Aborted => write!(f, "Aborted"),
        }
    }
}

/// Tracks the phase of one round.
#[derive(Debug)]
pub struct RoundPhaseMachine {
    pub current: RoundPhase,
    sequence_number: u64,
}

impl RoundPhaseMachine {
    /// Start a round in the Collecting phase.
    pub fn new(sequence_number: u64) -> Self {
        Self {
            current: RoundPhase::Collecting,
            sequence_number,
        }
    }

    /// Attempt to move to `next`.
    ///
    /// Returns an error if the transition is not valid.
    pub fn transition(&mut self, next: RoundPhase) -> Result<(), ReputonError> {
        let valid = match (self.current, next) {
            (RoundPhase::Persisted, RoundPhase::Aborted) => false,
            (RoundPhase::Aborted, _) => false,
            (_, RoundPhase::Aborted) => true,
            (RoundPhase::Collecting, RoundPhase::ArtifactReady) => true,
            (RoundPhase::ArtifactReady, RoundPhase::Broadcast) => true,
            (RoundPhase::Broadcast, RoundPhase::WindowOpen) => true,
            (RoundPhase::WindowOpen, RoundPhase::Scoring) => true,
            (RoundPhase::Scoring, RoundPhase::Persisted) => true,
            _ => false,
        };

        if valid {
            tracing::info!(
                "Round {} phase: {} -> {}",
                self.sequence_number,
                self.current,
                next
            );
            self.current = next;
            Ok(())
        } else {
            Err(ReputonError::InvalidState(format!(
                "Invalid round phase transition: {} -> {}",
                self.current, next
            )))
        }
    }
}
