// crates/reputon-core/src/opinion.rs
//
// Persisted opinion ledger: what this node has observed about its peers.
//
// Every map here is a flat key -> value record that is read fully at round
// start and rewritten wholesale at round end.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::identity::PeerKey;
use crate::instance::ClusterDirectory;

/// Count of rounds in which each peer's coded proof verified.
///
/// Counts never decrease and never exceed the execution counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceOpinion {
    pub counts: BTreeMap<PeerKey, u64>,
}

impl ResourceOpinion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one verified round for `peer`.
    pub fn record_success(&mut self, peer: &PeerKey) {
        *self.counts.entry(peer.clone()).or_insert(0) += 1;
    }

    pub fn get(&self, peer: &PeerKey) -> Option<u64> {
        self.counts.get(peer).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Highest count held for any peer, 0 when empty.
    pub fn max_count(&self) -> u64 {
        self.counts.values().copied().max().unwrap_or(0)
    }
}

/// Accumulated reachability ratio for one peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRatio {
    /// Probes that got the expected echo back.
    pub numerator: u32,
    /// Probes issued.
    pub denominator: u32,
}

impl PortRatio {
    /// `numerator / denominator`, or `None` when nothing was probed yet.
    pub fn ratio(&self) -> Option<f64> {
        if self.denominator == 0 {
            None
        } else {
            Some(f64::from(self.numerator) / f64::from(self.denominator))
        }
    }
}

/// Reachability ratio per peer, accumulated across probe cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortOpinion {
    pub entries: BTreeMap<PeerKey, PortRatio>,
}

impl PortOpinion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one probe cycle into the peer's ratio.
    ///
    /// The denominator grows by the number of probes issued whether or not
    /// any succeeded, so an unreachable peer drifts toward zero. Successes
    /// are capped at `issued` to keep the ratio within [0, 1].
    pub fn record_cycle(&mut self, peer: &PeerKey, successes: u32, issued: u32) {
        let entry = self.entries.entry(peer.clone()).or_default();
        entry.numerator = entry.numerator.saturating_add(successes.min(issued));
        entry.denominator = entry.denominator.saturating_add(issued);
    }

    pub fn get(&self, peer: &PeerKey) -> Option<PortRatio> {
        self.entries.get(peer).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Total number of non-read-only rounds this node has executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionCounter(pub u64);

impl ExecutionCounter {
    pub fn increment(&mut self) {
        self.0 = self.0.saturating_add(1);
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

/// Deterministic shuffle of the peer set for one rotation cycle.
///
/// `order` is split into consecutive groups of `group_size`; the group that
/// contains a node's own key is the sub-universe it probes until the next
/// rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubUniverseAssignment {
    /// Sequence number the shuffle was seeded with.
    pub seed: u64,
    /// Maximum peers per group.
    pub group_size: usize,
    /// Shuffled peer set.
    pub order: Vec<PeerKey>,
}

impl SubUniverseAssignment {
    /// The group containing `peer`, if `peer` was part of the shuffle.
    pub fn group_of(&self, peer: &PeerKey) -> Option<&[PeerKey]> {
        let index = self.order.iter().position(|p| p == peer)?;
        let size = self.group_size.max(1);
        let start = (index / size) * size;
        let end = (start + size).min(self.order.len());
        Some(&self.order[start..end])
    }
}

/// Everything the round runner reads at round start.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerSnapshot {
    pub cluster: ClusterDirectory,
    pub resource: ResourceOpinion,
    pub port: PortOpinion,
    pub assignment: Option<SubUniverseAssignment>,
    pub executions: ExecutionCounter,
}

impl LedgerSnapshot {
    /// Raise the execution counter to the highest resource count.
    ///
    /// A lost or torn counter file would otherwise restart at 0 under intact
    /// resource counts. Returns true when the counter was raised.
    pub fn reconcile_counter(&mut self) -> bool {
        let floor = self.resource.max_count();
        if self.executions.get() < floor {
            self.executions = ExecutionCounter(floor);
            true
        } else {
            false
        }
    }
}
