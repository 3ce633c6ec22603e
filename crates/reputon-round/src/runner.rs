// crates/reputon-round/src/runner.rs
//
// RoundRunner: one writing round from context to persisted ledger.
//
// The ledger is read once at round start and written once at round end,
// file by file. A file that fails to save is logged and skipped; the others
// are still written. The execution counter is saved first, and the resource
// opinion is only saved if the counter was, so the on-disk counts never
// exceed the on-disk execution count.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use reputon_core::error::ReputonError;
use reputon_core::opinion::LedgerSnapshot;
use reputon_core::params::RoundParams;
use reputon_core::round::{ProofBroadcast, RoundContext};
use reputon_core::traits::{RoundTransport, StateStore};
use reputon_pow::HashChainEngine;
use reputon_probe::{CycleOutcome, ReachabilityEngine};
use reputon_reputation::{score_proofs, ScoringSummary};

use crate::inbox::RoundInbox;
use crate::phase::{RoundPhase, RoundPhaseMachine};

/// Result of a completed writing round, returned to the host runtime.
#[derive(Debug, Clone, Serialize)]
pub struct RoundOutcome {
    pub sequence_number: u64,
    pub phase: RoundPhase,
    /// Execution counter after this round.
    pub executions: u64,
    /// Local artifact for the round.
    pub file_hash: String,
    pub chain_steps: u64,
    /// Whether the broadcast layer accepted the local proof.
    pub broadcast_sent: bool,
    pub scoring: ScoringSummary,
    pub reachability: CycleOutcome,
    /// Files that could not be written this round.
    pub persist_failures: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Drives writing rounds against an injected store.
pub struct RoundRunner {
    store: Arc<dyn StateStore>,
    chain: HashChainEngine,
    reachability: ReachabilityEngine,
    params: RoundParams,
}

impl RoundRunner {
    pub fn new(
        store: Arc<dyn StateStore>,
        chain: HashChainEngine,
        reachability: ReachabilityEngine,
        params: RoundParams,
    ) -> Self {
        Self {
            store,
            chain,
            reachability,
            params,
        }
    }

    /// Run one writing round.
    ///
    /// Steps:
    /// 1. Validate the context and the local identity (fatal on failure)
    /// 2. Load the ledger and count the execution
    /// 3. Compute the artifact and run the reachability cycle concurrently
    /// 4. Broadcast the local coded proof
    /// 5. Wait for the window to close, then drain the inbox
    /// 6. Score buffered proofs
    /// 7. Persist each ledger file independently
    pub async fn run_round(
        &self,
        ctx: &RoundContext,
        mut inbox: RoundInbox,
        transport: &dyn RoundTransport,
    ) -> Result<RoundOutcome, ReputonError> {
        let deadline = Instant::now() + Duration::from_millis(self.params.window_ms);
        let mut phase = RoundPhaseMachine::new(ctx.sequence_number);

        // Step 1: Nothing can proceed without a usable context.
        if ctx.is_read_only {
            return Err(ReputonError::InvalidState(
                "read-only invocations only serve queries".to_string(),
            ));
        }
        ctx.validate()?;
        ctx.local_identity.verifying_key().map_err(|e| {
            ReputonError::InvalidRoundContext(format!(
                "local identity {} is not an ed25519 key: {}",
                ctx.local_identity, e
            ))
        })?;
        let round_hash = ctx.round_hash_bytes()?;

        // Step 2: Read the ledger, count this round before anything else.
        let mut snapshot = self.store.load_snapshot().await;
        if snapshot.reconcile_counter() {
            tracing::warn!(
                "Execution count behind resource opinion, raised to {}",
                snapshot.executions.get()
            );
        }
        let local_instance = self.store.load_instance_info().await;
        snapshot.executions.increment();
        let mut persist_failures = Vec::new();
        let counter_saved = match self.store.save_execution_count(snapshot.executions).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to save execution count: {}", e);
                persist_failures.push("execution_count".to_string());
                false
            }
        };

        tracing::info!(
            "Round {} started: {} peers, execution {}",
            ctx.sequence_number,
            ctx.peer_set.len(),
            snapshot.executions.get()
        );

        // Step 3: The chain and the reachability cycle are independent.
        let (chain_result, cycle_result) = tokio::join!(
            self.chain.compute_for(&round_hash, &ctx.local_identity),
            self.reachability.run_cycle(
                ctx,
                snapshot.executions,
                snapshot.assignment.as_ref(),
                &snapshot.cluster,
            )
        );

        let reachability = match cycle_result {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Reachability cycle failed: {}", e);
                CycleOutcome::Idle {
                    reason: format!("cycle failed: {}", e),
                }
            }
        };
        reachability.apply_to(&mut snapshot.port);

        let (artifact, proof) = match chain_result {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Round {} hash chain failed: {}", ctx.sequence_number, e);
                // Reachability results do not depend on the artifact.
                self.persist_reachability(&snapshot, &reachability, &mut persist_failures)
                    .await;
                phase.transition(RoundPhase::Aborted)?;
                return Err(e);
            }
        };
        phase.transition(RoundPhase::ArtifactReady)?;

        // Step 4: Broadcast.
        let payload = ProofBroadcast {
            pow: proof,
            instance: local_instance,
        }
        .encode()?;
        let broadcast_sent = match transport.broadcast(payload).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Broadcast of local proof failed: {}", e);
                false
            }
        };
        phase.transition(RoundPhase::Broadcast)?;

        // Step 5: Window.
        phase.transition(RoundPhase::WindowOpen)?;
        if Instant::now() >= deadline {
            tracing::warn!(
                "Round {} local work overran the {} ms window, scoring immediately",
                ctx.sequence_number,
                self.params.window_ms
            );
        }
        tokio::time::sleep_until(deadline).await;
        let messages = inbox.drain();

        // Step 6: Score.
        phase.transition(RoundPhase::Scoring)?;
        let scoring = score_proofs(
            &messages,
            ctx,
            &artifact.file_hash,
            &self.chain.params().memory_hard,
            &mut snapshot.resource,
            &mut snapshot.cluster,
        )
        .await;

        // Step 7: Persist.
        if let Err(e) = self.store.save_cluster(&snapshot.cluster).await {
            tracing::warn!("Failed to save cluster directory: {}", e);
            persist_failures.push("cluster".to_string());
        }
        if counter_saved {
            if let Err(e) = self.store.save_resource_opinion(&snapshot.resource).await {
                tracing::warn!("Failed to save resource opinion: {}", e);
                persist_failures.push("resource_opinion".to_string());
            }
        } else {
            tracing::warn!("Execution count not saved, holding back resource opinion");
            persist_failures.push("resource_opinion".to_string());
        }
        self.persist_reachability(&snapshot, &reachability, &mut persist_failures)
            .await;
        phase.transition(RoundPhase::Persisted)?;

        tracing::info!(
            "Round {} complete: {} proofs verified, {} persist failures",
            ctx.sequence_number,
            scoring.verified.len(),
            persist_failures.len()
        );

        Ok(RoundOutcome {
            sequence_number: ctx.sequence_number,
            phase: phase.current,
            executions: snapshot.executions.get(),
            file_hash: artifact.file_hash,
            chain_steps: artifact.steps_written,
            broadcast_sent,
            scoring,
            reachability,
            persist_failures,
            completed_at: Utc::now(),
        })
    }

    async fn persist_reachability(
        &self,
        snapshot: &LedgerSnapshot,
        reachability: &CycleOutcome,
        failures: &mut Vec<String>,
    ) {
        match reachability {
            CycleOutcome::Rotated { assignment } => {
                if let Err(e) = self.store.save_assignment(assignment).await {
                    tracing::warn!("Failed to save sub-universe assignment: {}", e);
                    failures.push("port_eval_universe".to_string());
                }
            }
            CycleOutcome::Probed { .. } => {
                if let Err(e) = self.store.save_port_opinion(&snapshot.port).await {
                    tracing::warn!("Failed to save port opinion: {}", e);
                    failures.push("port_opinion".to_string());
                }
            }
            CycleOutcome::Idle { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;

    use async_trait::async_trait;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    use reputon_core::identity::{generate_identity, PeerKey};
    use reputon_core::instance::InstanceInfo;
    use reputon_core::opinion::ExecutionCounter;
    use reputon_core::params::{ChainParams, MemoryHardParams, ProbeParams};
    use reputon_core::round::ReceivedBroadcast;
    use reputon_pow::coded_proof;
    use reputon_store::{InMemoryStore, StateFile};

    use crate::inbox::round_inbox;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<Vec<u8>>>,
        fail: bool,
    }

    #[async_trait]
    impl RoundTransport for RecordingTransport {
        async fn broadcast(&self, payload: Vec<u8>) -> Result<(), ReputonError> {
            if self.fail {
                return Err(ReputonError::ProbeTransport("link down".to_string()));
            }
            self.sent.lock().await.push(payload);
            Ok(())
        }
    }

    fn tiny_chain() -> ChainParams {
        ChainParams {
            total_size: 4096,
            write_interval: 256,
            num_hashes: None,
            chunk_size: 1024,
            memory_hard_frequency: 4,
            init_retries: 1,
            init_retry_delay_ms: 1,
            memory_hard: MemoryHardParams {
                memory_kib: 8,
                iterations: 1,
                parallelism: 1,
            },
        }
    }

    fn backing_path(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("reputon_test_{}_{}", label, Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("rep_hash.dat")
    }

    fn runner(store: Arc<dyn StateStore>, label: &str) -> RoundRunner {
        let chain = HashChainEngine::new(backing_path(label), tiny_chain()).unwrap();
        let probe = ReachabilityEngine::new(ProbeParams {
            probe_timeout_ms: 200,
            ports_per_transport: 1,
            ..ProbeParams::default()
        })
        .unwrap();
        RoundRunner::new(store, chain, probe, RoundParams { window_ms: 50 })
    }

    fn context(seq: u64, me: &PeerKey, peers: &[PeerKey]) -> RoundContext {
        RoundContext {
            sequence_number: seq,
            round_hash: "4f".repeat(32),
            local_identity: me.clone(),
            peer_set: peers.to_vec(),
            is_read_only: false,
        }
    }

    #[tokio::test]
    async fn round_scores_honest_peer_and_persists() {
        let (_, me) = generate_identity();
        let (_, peer) = generate_identity();
        let store = Arc::new(
            InMemoryStore::new().with_instance_info(InstanceInfo::new("me.example", 36525, 39064)),
        );
        let runner = runner(store.clone(), "honest");
        let ctx = context(7, &me, &[me.clone(), peer.clone()]);

        // The peer runs the same chain, so it reaches the same file hash.
        let reference = HashChainEngine::new(backing_path("honest_ref"), tiny_chain()).unwrap();
        let artifact = reference.compute(&ctx.round_hash_bytes().unwrap()).await.unwrap();
        let peer_proof = coded_proof(&peer, &artifact.file_hash, &tiny_chain().memory_hard).unwrap();
        let peer_info = InstanceInfo::new("peer.example", 40000, 41000);

        let (handle, inbox) = round_inbox();
        let payload = ProofBroadcast {
            pow: peer_proof,
            instance: Some(peer_info.clone()),
        }
        .encode()
        .unwrap();
        handle.deliver(peer.clone(), payload.clone());
        handle.deliver(peer.clone(), payload);

        let transport = RecordingTransport::default();
        let outcome = runner.run_round(&ctx, inbox, &transport).await.unwrap();

        assert_eq!(outcome.phase, RoundPhase::Persisted);
        assert_eq!(outcome.file_hash, artifact.file_hash);
        assert_eq!(outcome.executions, 1);
        assert!(outcome.persist_failures.is_empty());

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.executions, ExecutionCounter(1));
        assert_eq!(snapshot.resource.get(&peer), Some(1));
        assert_eq!(snapshot.cluster.get(&peer), Some(&peer_info));

        let sent = transport.sent.lock().await;
        assert_eq!(sent.len(), 1);
        let broadcast = ReceivedBroadcast::decode(&me, &sent[0]).unwrap();
        assert_eq!(
            broadcast.pow,
            coded_proof(&me, &artifact.file_hash, &tiny_chain().memory_hard).unwrap()
        );
        let instance = broadcast.instance_info(&me).unwrap().unwrap();
        assert_eq!(instance.domain.as_deref(), Some("me.example"));
    }

    #[tokio::test]
    async fn lost_counter_never_falls_behind_resource_counts() {
        let (_, me) = generate_identity();
        let (_, peer) = generate_identity();
        let mut seeded = LedgerSnapshot::default();
        for _ in 0..5 {
            seeded.resource.record_success(&peer);
        }
        let store = Arc::new(InMemoryStore::with_snapshot(seeded));
        let runner = runner(store.clone(), "lost_counter");
        let ctx = context(8, &me, &[me.clone(), peer.clone()]);

        let reference = HashChainEngine::new(backing_path("lost_counter_ref"), tiny_chain()).unwrap();
        let artifact = reference.compute(&ctx.round_hash_bytes().unwrap()).await.unwrap();
        let (handle, inbox) = round_inbox();
        let payload = ProofBroadcast {
            pow: coded_proof(&peer, &artifact.file_hash, &tiny_chain().memory_hard).unwrap(),
            instance: None,
        }
        .encode()
        .unwrap();
        handle.deliver(peer.clone(), payload);

        let outcome = runner
            .run_round(&ctx, inbox, &RecordingTransport::default())
            .await
            .unwrap();

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.resource.get(&peer), Some(6));
        assert_eq!(snapshot.executions, ExecutionCounter(6));
        assert_eq!(outcome.executions, 6);
    }

    #[tokio::test]
    async fn rotation_round_persists_assignment() {
        let (_, me) = generate_identity();
        let (_, peer) = generate_identity();
        let store = Arc::new(InMemoryStore::new());
        let runner = runner(store.clone(), "rotate");
        let ctx = context(10, &me, &[me.clone(), peer.clone()]);

        let (_handle, inbox) = round_inbox();
        let outcome = runner
            .run_round(&ctx, inbox, &RecordingTransport::default())
            .await
            .unwrap();

        assert!(outcome.reachability.assignment().is_some());
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.assignment.unwrap().seed, 10);
    }

    #[tokio::test]
    async fn failed_file_does_not_block_the_others() {
        let (_, me) = generate_identity();
        let (_, peer) = generate_identity();
        let store = Arc::new(InMemoryStore::new());
        store.fail_writes_to(StateFile::Cluster).await;
        let runner = runner(store.clone(), "isolation");
        let ctx = context(11, &me, &[me.clone(), peer.clone()]);

        let (_handle, inbox) = round_inbox();
        let outcome = runner
            .run_round(&ctx, inbox, &RecordingTransport::default())
            .await
            .unwrap();

        assert_eq!(outcome.persist_failures, vec!["cluster".to_string()]);
        assert_eq!(store.snapshot().await.executions, ExecutionCounter(1));
    }

    #[tokio::test]
    async fn unsaved_counter_holds_back_resource_opinion() {
        let (_, me) = generate_identity();
        let store = Arc::new(InMemoryStore::new());
        store.fail_writes_to(StateFile::ExecutionCount).await;
        let runner = runner(store.clone(), "counter");
        let ctx = context(12, &me, &[me.clone()]);

        let (_handle, inbox) = round_inbox();
        let outcome = runner
            .run_round(&ctx, inbox, &RecordingTransport::default())
            .await
            .unwrap();

        assert!(outcome
            .persist_failures
            .contains(&"resource_opinion".to_string()));
    }

    #[tokio::test]
    async fn broadcast_failure_still_scores() {
        let (_, me) = generate_identity();
        let store = Arc::new(InMemoryStore::new());
        let runner = runner(store.clone(), "nobroadcast");
        let ctx = context(13, &me, &[me.clone()]);

        let transport = RecordingTransport {
            fail: true,
            ..RecordingTransport::default()
        };
        let (_handle, inbox) = round_inbox();
        let outcome = runner.run_round(&ctx, inbox, &transport).await.unwrap();

        assert!(!outcome.broadcast_sent);
        assert_eq!(outcome.phase, RoundPhase::Persisted);
    }

    #[tokio::test]
    async fn non_ed25519_identity_is_fatal() {
        let me = PeerKey::parse("ed01").unwrap();
        let store = Arc::new(InMemoryStore::new());
        let runner = runner(store.clone(), "badkey");
        let ctx = context(14, &me, &[me.clone()]);

        let (_handle, inbox) = round_inbox();
        let result = runner
            .run_round(&ctx, inbox, &RecordingTransport::default())
            .await;

        assert!(matches!(result, Err(ReputonError::InvalidRoundContext(_))));
        assert_eq!(store.snapshot().await.executions, ExecutionCounter(0));
    }

    #[tokio::test]
    async fn read_only_context_is_refused() {
        let (_, me) = generate_identity();
        let store = Arc::new(InMemoryStore::new());
        let runner = runner(store.clone(), "readonly");
        let mut ctx = context(15, &me, &[me.clone()]);
        ctx.is_read_only = true;

        let (_handle, inbox) = round_inbox();
        let result = runner
            .run_round(&ctx, inbox, &RecordingTransport::default())
            .await;
        assert!(matches!(result, Err(ReputonError::InvalidState(_))));
    }
}
