// crates/reputon-probe/src/engine.rs
//
// ReachabilityEngine: one reachability cycle per round.
//
// Rotation rounds reshuffle the peer set into sub-universes and probe
// nothing. Every other round, once the node has executed more than the
// warm-up number of rounds, the node probes the peers of its own group whose
// instance info it knows. The cycle only reads the ledger; the caller folds
// the outcome into the port opinion so the cycle can run alongside the hash
// chain.

use serde::Serialize;
use tokio::task::JoinSet;

use reputon_core::error::ReputonError;
use reputon_core::identity::PeerKey;
use reputon_core::instance::ClusterDirectory;
use reputon_core::opinion::{ExecutionCounter, PortOpinion, SubUniverseAssignment};
use reputon_core::params::ProbeParams;
use reputon_core::round::RoundContext;
use reputon_reputation::partition::{compute_assignment, is_rotation_round, probe_targets};

use crate::challenge::probe_challenge;
use crate::prober::probe_peer;

/// Probe tally for one peer in one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerProbeResult {
    pub peer: PeerKey,
    pub successes: u32,
    pub issued: u32,
}

/// What a reachability cycle did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// New sub-universe assignment to persist.
    Rotated { assignment: SubUniverseAssignment },
    /// Probe results to fold into the port opinion.
    Probed { results: Vec<PeerProbeResult> },
    /// Nothing to do this round.
    Idle { reason: String },
}

impl CycleOutcome {
    /// Fold probe results into `port`. Other outcomes leave it untouched.
    pub fn apply_to(&self, port: &mut PortOpinion) {
        if let CycleOutcome::Probed { results } = self {
            for result in results {
                port.record_cycle(&result.peer, result.successes, result.issued);
            }
        }
    }

    pub fn assignment(&self) -> Option<&SubUniverseAssignment> {
        match self {
            CycleOutcome::Rotated { assignment } => Some(assignment),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReachabilityEngine {
    params: ProbeParams,
}

impl ReachabilityEngine {
    pub fn new(params: ProbeParams) -> Result<Self, ReputonError> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Run the cycle for `ctx`.
    ///
    /// `executions` is the counter including the current round. Probe
    /// failures never surface as errors; only an unusable round hash does.
    pub async fn run_cycle(
        &self,
        ctx: &RoundContext,
        executions: ExecutionCounter,
        assignment: Option<&SubUniverseAssignment>,
        cluster: &ClusterDirectory,
    ) -> Result<CycleOutcome, ReputonError> {
        // Step 1: Rotation rounds only reshuffle.
        if is_rotation_round(ctx.sequence_number, &self.params) {
            let assignment = compute_assignment(
                &ctx.peer_set,
                ctx.sequence_number,
                self.params.sub_universe_size,
            );
            tracing::info!(
                "Rotated sub-universes at round {}: {} peers in groups of {}",
                ctx.sequence_number,
                assignment.order.len(),
                assignment.group_size
            );
            return Ok(CycleOutcome::Rotated { assignment });
        }

        // Step 2: Wait for warm-up and for a first assignment.
        let warmup = self.params.warmup_rounds();
        if executions.get() <= warmup {
            return Ok(idle(format!(
                "warming up ({} of {} rounds executed)",
                executions.get(),
                warmup
            )));
        }
        let Some(assignment) = assignment else {
            return Ok(idle("no sub-universe assignment yet".to_string()));
        };

        // Step 3: Resolve targets with known, probeable instance info.
        let mut targets = Vec::new();
        for peer in probe_targets(assignment, &ctx.local_identity) {
            if !ctx.is_member(&peer) {
                tracing::debug!("{} left the peer set, not probing", peer);
                continue;
            }
            match cluster.get(&peer) {
                Some(info) if info.is_probeable() => targets.push((peer, info.clone())),
                _ => tracing::debug!("No probeable instance info for {}, skipping", peer),
            }
        }
        if targets.is_empty() {
            return Ok(idle("no probeable peers in sub-universe".to_string()));
        }

        // Step 4: Probe all targets concurrently.
        let challenge = probe_challenge(&ctx.round_hash_bytes()?);
        let mut probes = JoinSet::new();
        for (peer, info) in targets {
            let challenge = challenge.clone();
            let params = self.params.clone();
            probes.spawn(async move {
                let tally = probe_peer(&peer, &info, &challenge, &params).await;
                (peer, tally)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((peer, Ok((successes, issued)))) if issued > 0 => {
                    results.push(PeerProbeResult {
                        peer,
                        successes,
                        issued,
                    });
                }
                Ok((peer, Ok(_))) => tracing::debug!("No probes issued for {}", peer),
                Ok((peer, Err(e))) => tracing::warn!("Probing {} failed: {}", peer, e),
                Err(e) => tracing::warn!("Probe task aborted: {}", e),
            }
        }
        results.sort_by(|a, b| a.peer.cmp(&b.peer));

        tracing::info!(
            "Reachability cycle at round {}: probed {} peers, {} of {} probes answered",
            ctx.sequence_number,
            results.len(),
            results.iter().map(|r| r.successes).sum::<u32>(),
            results.iter().map(|r| r.issued).sum::<u32>()
        );

        Ok(CycleOutcome::Probed { results })
    }
}

fn idle(reason: String) -> CycleOutcome {
    tracing::debug!("Reachability cycle idle: {}", reason);
    CycleOutcome::Idle { reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    use reputon_core::identity::generate_identity;
    use reputon_core::instance::InstanceInfo;

    use crate::responder::{ProbeResponder, ResponderHandle};

    fn params() -> ProbeParams {
        ProbeParams {
            probe_timeout_ms: 1_000,
            ports_per_transport: 1,
            ..ProbeParams::default()
        }
    }

    fn context(seq: u64, local: &PeerKey, peers: &[PeerKey]) -> RoundContext {
        RoundContext {
            sequence_number: seq,
            round_hash: "9e".repeat(32),
            local_identity: local.clone(),
            peer_set: peers.to_vec(),
            is_read_only: false,
        }
    }

    async fn live_peer() -> (PeerKey, InstanceInfo, ResponderHandle) {
        let (_, key) = generate_identity();
        let handle = ProbeResponder::new(key.clone())
            .bind("127.0.0.1", &[0], &[0])
            .await
            .unwrap();
        let info = InstanceInfo::new(
            "127.0.0.1",
            handle.tcp_addrs[0].port(),
            handle.udp_addrs[0].port(),
        );
        (key, info, handle)
    }

    #[tokio::test]
    async fn rotation_round_reshuffles_without_probing() {
        let engine = ReachabilityEngine::new(params()).unwrap();
        let (_, me) = generate_identity();
        let (_, other) = generate_identity();
        let ctx = context(10, &me, &[me.clone(), other.clone()]);

        let outcome = engine
            .run_cycle(&ctx, ExecutionCounter(50), None, &ClusterDirectory::new())
            .await
            .unwrap();

        let assignment = outcome.assignment().unwrap();
        assert_eq!(assignment.seed, 10);
        assert_eq!(assignment.order.len(), 2);

        let mut port = PortOpinion::new();
        outcome.apply_to(&mut port);
        assert!(port.is_empty());
    }

    #[tokio::test]
    async fn no_probing_during_warmup() {
        let engine = ReachabilityEngine::new(params()).unwrap();
        let (_, me) = generate_identity();
        let ctx = context(11, &me, &[me.clone()]);
        let assignment = compute_assignment(&ctx.peer_set, 10, 6);

        let outcome = engine
            .run_cycle(&ctx, ExecutionCounter(5), Some(&assignment), &ClusterDirectory::new())
            .await
            .unwrap();
        assert!(matches!(outcome, CycleOutcome::Idle { .. }));
    }

    #[tokio::test]
    async fn probes_group_members_and_skips_unknown_ones() {
        let engine = ReachabilityEngine::new(params()).unwrap();
        let (_, me) = generate_identity();
        let (live, live_info, handle) = live_peer().await;
        let (_, unknown) = generate_identity();
        let peers = vec![me.clone(), live.clone(), unknown.clone()];
        let ctx = context(12, &me, &peers);
        let assignment = compute_assignment(&peers, 10, 6);

        let mut cluster = ClusterDirectory::new();
        cluster.upsert(live.clone(), live_info);

        let outcome = engine
            .run_cycle(&ctx, ExecutionCounter(6), Some(&assignment), &cluster)
            .await
            .unwrap();

        let mut port = PortOpinion::new();
        outcome.apply_to(&mut port);
        let ratio = port.get(&live).unwrap();
        assert_eq!((ratio.numerator, ratio.denominator), (2, 2));
        assert!(port.get(&unknown).is_none());
        assert!(port.get(&me).is_none());
        handle.shutdown();
    }

    #[tokio::test]
    async fn unreachable_peer_still_grows_denominator() {
        let engine = ReachabilityEngine::new(params()).unwrap();
        let (_, me) = generate_identity();
        let (dead, dead_info, handle) = live_peer().await;
        handle.shutdown();
        // Give the aborted listeners a moment to release their sockets.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let peers = vec![me.clone(), dead.clone()];
        let ctx = context(13, &me, &peers);
        let assignment = compute_assignment(&peers, 10, 6);
        let mut cluster = ClusterDirectory::new();
        cluster.upsert(dead.clone(), dead_info);

        let outcome = engine
            .run_cycle(&ctx, ExecutionCounter(9), Some(&assignment), &cluster)
            .await
            .unwrap();

        let mut port = PortOpinion::new();
        outcome.apply_to(&mut port);
        let ratio = port.get(&dead).unwrap();
        assert_eq!((ratio.numerator, ratio.denominator), (0, 2));
    }
}
