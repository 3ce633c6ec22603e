// crates/reputon-reputation/src/score.rs
//
// Score readout: fold the resource and port opinions into one 0-100 score
// per peer.
//
//   both signals:   round(100 * (r * W + p * (1 - W)))
//   resource only:  round(100 * r)
//   port only:      round(100 * p * (1 - W))
//
// r = verified rounds / executed rounds, p = probe successes / probes issued.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use reputon_core::identity::PeerKey;
use reputon_core::opinion::{ExecutionCounter, PortOpinion, ResourceOpinion};
use reputon_core::params::ScoreParams;

/// One peer's readout with the rates it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeerScore {
    /// Fraction of executed rounds in which the peer's proof verified.
    pub resource_rate: Option<f64>,
    /// Fraction of probes the peer answered.
    pub port_rate: Option<f64>,
    /// Combined score, 0 to 100.
    pub score: u32,
}

/// Scores for every peer that has at least one usable rate.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ScoreBoard {
    pub entries: BTreeMap<PeerKey, PeerScore>,
}

impl ScoreBoard {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Plain `peer -> score` view.
    pub fn scores(&self) -> BTreeMap<PeerKey, u32> {
        self.entries
            .iter()
            .map(|(peer, s)| (peer.clone(), s.score))
            .collect()
    }
}

/// Compute the score board.
///
/// Returns `None` when neither opinion holds any peer, so callers can answer
/// with an explicit "no scores" instead of an empty map. A peer present in an
/// opinion but without a usable rate (zero executions, zero probes issued) is
/// left out.
pub fn compute_scores(
    resource: &ResourceOpinion,
    port: &PortOpinion,
    executions: ExecutionCounter,
    params: &ScoreParams,
) -> Option<ScoreBoard> {
    if resource.is_empty() && port.is_empty() {
        return None;
    }

    let weight = params.resource_weight.clamp(0.0, 1.0);
    let peers: BTreeSet<&PeerKey> = resource.counts.keys().chain(port.entries.keys()).collect();

    let mut board = ScoreBoard::default();
    for peer in peers {
        let resource_rate = resource
            .get(peer)
            .and_then(|count| resource_rate(count, executions));
        let port_rate = port.get(peer).and_then(|ratio| ratio.ratio());

        let combined = match (resource_rate, port_rate) {
            (Some(r), Some(p)) => r * weight + p * (1.0 - weight),
            (Some(r), None) => r,
            (None, Some(p)) => p * (1.0 - weight),
            (None, None) => {
                tracing::debug!("No usable rate for {}, leaving it out of the readout", peer);
                continue;
            }
        };

        board.entries.insert(
            peer.clone(),
            PeerScore {
                resource_rate,
                port_rate,
                score: to_score(combined),
            },
        );
    }

    Some(board)
}

fn resource_rate(count: u64, executions: ExecutionCounter) -> Option<f64> {
    if executions.get() == 0 {
        return None;
    }
    Some((count as f64 / executions.get() as f64).min(1.0))
}

fn to_score(combined: f64) -> u32 {
    (combined * 100.0).round().clamp(0.0, 100.0) as u32
}
