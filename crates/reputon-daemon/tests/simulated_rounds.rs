// crates/reputon-daemon/tests/simulated_rounds.rs
//
// Several nodes on one machine, wired the way the daemon wires them, with an
// in-process mesh standing in for the host runtime's broadcast layer.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use reputon_core::error::ReputonError;
use reputon_core::identity::{generate_identity, PeerKey};
use reputon_core::instance::InstanceInfo;
use reputon_core::params::{ChainParams, MemoryHardParams, ProbeParams, RoundParams};
use reputon_core::round::RoundContext;
use reputon_core::traits::{RoundTransport, StateStore};
use reputon_daemon::config::DaemonConfig;
use reputon_daemon::node::NodeServices;
use reputon_daemon::runtime::{serve_invocation, HostChannel};
use reputon_probe::{ProbeResponder, ResponderHandle};
use reputon_round::{round_inbox, InboxHandle, RoundOutcome};

type Mesh = Arc<Mutex<Vec<(PeerKey, InboxHandle)>>>;

/// Delivers every broadcast to every other node's inbox.
struct MeshTransport {
    from: PeerKey,
    mesh: Mesh,
}

#[async_trait]
impl RoundTransport for MeshTransport {
    async fn broadcast(&self, payload: Vec<u8>) -> Result<(), ReputonError> {
        let mesh = self
            .mesh
            .lock()
            .map_err(|_| ReputonError::InvalidState("mesh poisoned".to_string()))?;
        for (peer, inbox) in mesh.iter() {
            if *peer != self.from {
                inbox.deliver(self.from.clone(), payload.clone());
            }
        }
        Ok(())
    }
}

struct TestNode {
    key: PeerKey,
    services: NodeServices,
    responder: Option<ResponderHandle>,
}

impl TestNode {
    fn stop_responder(&mut self) {
        if let Some(handle) = self.responder.take() {
            handle.shutdown();
        }
    }
}

fn temp_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("reputon_it_{}_{}", label, Uuid::now_v7()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn test_config(data_dir: &Path) -> DaemonConfig {
    DaemonConfig {
        data_dir: data_dir.display().to_string(),
        chain: ChainParams {
            total_size: 4096,
            write_interval: 256,
            num_hashes: None,
            chunk_size: 1024,
            memory_hard_frequency: 4,
            init_retries: 2,
            init_retry_delay_ms: 10,
            memory_hard: MemoryHardParams {
                memory_kib: 8,
                iterations: 1,
                parallelism: 1,
            },
        },
        round: RoundParams { window_ms: 750 },
        reachability: ProbeParams {
            warmup_rounds: Some(1),
            probe_timeout_ms: 1_000,
            ports_per_transport: 1,
            ..ProbeParams::default()
        },
        ..DaemonConfig::default()
    }
}

async fn start_node(label: &str) -> TestNode {
    let (_, key) = generate_identity();
    let dir = temp_dir(label);

    let responder = ProbeResponder::new(key.clone())
        .bind("127.0.0.1", &[0], &[0])
        .await
        .unwrap();
    let mut info = InstanceInfo::new(
        "127.0.0.1",
        responder.tcp_addrs[0].port(),
        responder.udp_addrs[0].port(),
    );
    info.pubkey = Some(key.as_str().to_string());
    std::fs::write(dir.join("instance.json"), serde_json::to_vec(&info).unwrap()).unwrap();

    let services = NodeServices::build(&test_config(&dir)).unwrap();
    TestNode {
        key,
        services,
        responder: Some(responder),
    }
}

fn context(seq: u64, node: &TestNode, peers: &[PeerKey]) -> RoundContext {
    RoundContext {
        sequence_number: seq,
        round_hash: format!("{:064x}", seq * 7919),
        local_identity: node.key.clone(),
        peer_set: peers.to_vec(),
        is_read_only: false,
    }
}

/// Run one round on every node concurrently.
async fn run_mesh_round(seq: u64, nodes: &[TestNode]) -> Vec<RoundOutcome> {
    let peers: Vec<PeerKey> = nodes.iter().map(|n| n.key.clone()).collect();
    let mesh: Mesh = Arc::new(Mutex::new(Vec::new()));

    let mut rounds = Vec::new();
    for node in nodes {
        let (handle, inbox) = round_inbox();
        mesh.lock().unwrap().push((node.key.clone(), handle));
        let transport = MeshTransport {
            from: node.key.clone(),
            mesh: mesh.clone(),
        };
        let ctx = context(seq, node, &peers);
        rounds.push(async move {
            node.services
                .runner
                .run_round(&ctx, inbox, &transport)
                .await
                .unwrap()
        });
    }

    join_all(rounds).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn nodes_verify_each_other_and_probe_after_rotation() {
    let nodes = vec![
        start_node("a").await,
        start_node("b").await,
        start_node("c").await,
    ];

    // Round 5 rotates the sub-universes and exchanges proofs.
    let outcomes = run_mesh_round(5, &nodes).await;
    let file_hash = &outcomes[0].file_hash;
    for outcome in &outcomes {
        assert_eq!(&outcome.file_hash, file_hash);
        assert_eq!(outcome.scoring.verified.len(), 2);
        assert!(outcome.reachability.assignment().is_some());
        assert!(outcome.persist_failures.is_empty());
    }

    for node in &nodes {
        let snapshot = node.services.store.load_snapshot().await;
        assert_eq!(snapshot.executions.get(), 1);
        assert_eq!(snapshot.cluster.len(), 2);
        for other in nodes.iter().filter(|n| n.key != node.key) {
            assert_eq!(snapshot.resource.get(&other.key), Some(1));
        }
        assert!(snapshot.resource.get(&node.key).is_none());
    }

    // Round 6 probes everyone learned from round 5's broadcasts.
    run_mesh_round(6, &nodes).await;

    for node in &nodes {
        let snapshot = node.services.store.load_snapshot().await;
        assert_eq!(snapshot.executions.get(), 2);
        for other in nodes.iter().filter(|n| n.key != node.key) {
            assert_eq!(snapshot.resource.get(&other.key), Some(2));
            let ratio = snapshot.port.get(&other.key).unwrap();
            assert_eq!((ratio.numerator, ratio.denominator), (2, 2));
        }

        let response = node
            .services
            .queries
            .handle(br#"{"command":"read_scores"}"#)
            .await;
        for other in nodes.iter().filter(|n| n.key != node.key) {
            assert_eq!(response["scores"][other.key.as_str()], 100);
        }
    }

    for mut node in nodes {
        node.stop_responder();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn offline_peer_loses_port_score() {
    let mut nodes = vec![start_node("up").await, start_node("down").await];
    run_mesh_round(10, &nodes).await;

    // Second node's responder goes away before the probing round.
    let down_key = nodes[1].key.clone();
    nodes[1].stop_responder();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    run_mesh_round(11, &nodes).await;

    let up = &nodes[0];
    let snapshot = up.services.store.load_snapshot().await;
    let ratio = snapshot.port.get(&down_key).unwrap();
    assert_eq!((ratio.numerator, ratio.denominator), (0, 2));

    // Resource proofs still verified both rounds: 100 * (1.0 * 0.75 + 0.0 * 0.25).
    let response = up
        .services
        .queries
        .handle(br#"{"command":"read_scores"}"#)
        .await;
    assert_eq!(response["scores"][down_key.as_str()], 75);

    nodes[0].stop_responder();
}

#[tokio::test]
async fn read_only_invocation_answers_queries_over_stdio() {
    let mut node = start_node("readonly").await;
    let (host_side, node_side) = tokio::io::duplex(64 * 1024);
    let (node_read, node_write) = tokio::io::split(node_side);
    let (host_read, mut host_write) = tokio::io::split(host_side);

    let ctx = RoundContext {
        is_read_only: true,
        ..context(3, &node, &[node.key.clone()])
    };
    let round_line = serde_json::json!({ "type": "round", "context": ctx });
    host_write
        .write_all(format!("{}\n", round_line).as_bytes())
        .await
        .unwrap();
    host_write
        .write_all(b"{\"type\":\"user_input\",\"user\":\"client1\",\"payload\":{\"command\":\"read_scores\"}}\n")
        .await
        .unwrap();
    host_write
        .write_all(b"{\"type\":\"user_input\",\"user\":\"client2\",\"payload\":{\"command\":\"bogus\"}}\n")
        .await
        .unwrap();
    host_write.write_all(b"{\"type\":\"end\"}\n").await.unwrap();

    let outcome = serve_invocation(
        BufReader::new(node_read),
        HostChannel::new(node_write),
        &node.services.runner,
        &node.services.queries,
    )
    .await
    .unwrap();
    assert!(outcome.is_none());

    let mut replies = BufReader::new(host_read).lines();
    let first: Value = serde_json::from_str(&replies.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(first["type"], "user_reply");
    assert_eq!(first["user"], "client1");
    assert_eq!(first["payload"]["scores"], Value::Null);

    let second: Value = serde_json::from_str(&replies.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(second["user"], "client2");
    assert!(second["payload"]["error"].is_string());

    node.stop_responder();
}
