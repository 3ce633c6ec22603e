// crates/reputon-reputation/src/ledger.rs
//
// Resource-opinion scoring for one round.
//
// After the proof window closes, every buffered broadcast is checked against
// the coded proof this node recomputes for the sender from its own file hash.
// A match credits the sender once for the round. Each message is handled on
// its own: a malformed payload or a failed recomputation drops that message
// only.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use reputon_core::identity::PeerKey;
use reputon_core::instance::ClusterDirectory;
use reputon_core::opinion::ResourceOpinion;
use reputon_core::params::MemoryHardParams;
use reputon_core::round::{InboundMessage, ReceivedBroadcast, RoundContext};
use reputon_pow::coded_proof_blocking;

/// What happened to the buffered messages of one round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoringSummary {
    /// Peers credited this round, in the order their proof first matched.
    pub verified: Vec<PeerKey>,
    /// Peers that sent at least one proof and none matched.
    pub rejected: Vec<PeerKey>,
    /// Payloads that could not be decoded.
    pub malformed: usize,
    /// Messages from the local node or from outside the peer set.
    pub ignored: usize,
    /// ClusterDirectory entries written from piggybacked instance info.
    pub instances_updated: usize,
    /// Piggybacked instance info that could not be decoded. The proof in the
    /// same message is still scored.
    pub bad_instances: usize,
}

/// Score the round's buffered proofs into `resource` and learn instance info
/// into `cluster`.
///
/// `file_hash` is this node's own artifact for the round. Duplicate messages
/// from one peer never credit it twice, and the expected proof per peer is
/// computed at most once.
pub async fn score_proofs(
    messages: &[InboundMessage],
    ctx: &RoundContext,
    file_hash: &str,
    params: &MemoryHardParams,
    resource: &mut ResourceOpinion,
    cluster: &mut ClusterDirectory,
) -> ScoringSummary {
    let mut summary = ScoringSummary::default();
    let mut expected: HashMap<PeerKey, Option<String>> = HashMap::new();
    let mut credited: HashSet<PeerKey> = HashSet::new();
    let mut mismatched: Vec<PeerKey> = Vec::new();

    for message in messages {
        let peer = &message.peer;
        if *peer == ctx.local_identity || !ctx.is_member(peer) {
            tracing::debug!("Ignoring proof broadcast from {}", peer);
            summary.ignored += 1;
            continue;
        }

        let broadcast = match ReceivedBroadcast::decode(peer, &message.payload) {
            Ok(broadcast) => broadcast,
            Err(e) => {
                tracing::warn!("{}", e);
                summary.malformed += 1;
                continue;
            }
        };

        match broadcast.instance_info(peer) {
            Ok(Some(info)) => {
                cluster.upsert(peer.clone(), info);
                summary.instances_updated += 1;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Keeping proof, dropping instance info: {}", e);
                summary.bad_instances += 1;
            }
        }

        if credited.contains(peer) {
            continue;
        }

        if !expected.contains_key(peer) {
            let proof = match coded_proof_blocking(peer, file_hash, params).await {
                Ok(proof) => Some(proof),
                Err(e) => {
                    tracing::warn!("Could not recompute coded proof for {}: {}", peer, e);
                    None
                }
            };
            expected.insert(peer.clone(), proof);
        }

        let matched = expected
            .get(peer)
            .and_then(|p| p.as_deref())
            .is_some_and(|p| p.eq_ignore_ascii_case(broadcast.pow.trim()));

        if matched {
            resource.record_success(peer);
            credited.insert(peer.clone());
            summary.verified.push(peer.clone());
        } else if !mismatched.contains(peer) {
            mismatched.push(peer.clone());
        }
    }

    summary.rejected = mismatched
        .into_iter()
        .filter(|p| !credited.contains(p))
        .collect();

    tracing::info!(
        "Scored round {}: {} verified, {} rejected, {} malformed, {} ignored",
        ctx.sequence_number,
        summary.verified.len(),
        summary.rejected.len(),
        summary.malformed,
        summary.ignored
    );

    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    use reputon_core::instance::InstanceInfo;
    use reputon_core::round::ProofBroadcast;
    use reputon_pow::coded_proof;

    fn tiny() -> MemoryHardParams {
        MemoryHardParams {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }

    fn key(s: &str) -> PeerKey {
        PeerKey::parse(s).unwrap()
    }

    fn context() -> RoundContext {
        RoundContext {
            sequence_number: 7,
            round_hash: "cd".repeat(32),
            local_identity: key("ed01"),
            peer_set: vec![key("ed01"), key("ed02"), key("ed03"), key("ed04")],
            is_read_only: false,
        }
    }

    fn file_hash() -> String {
        "5a".repeat(64)
    }

    fn proof_message(peer: &str, pow: String, instance: Option<InstanceInfo>) -> InboundMessage {
        let payload = ProofBroadcast { pow, instance }.encode().unwrap();
        InboundMessage {
            peer: key(peer),
            payload,
        }
    }

    fn honest(peer: &str) -> InboundMessage {
        let pow = coded_proof(&key(peer), &file_hash(), &tiny()).unwrap();
        proof_message(peer, pow, None)
    }

    #[tokio::test]
    async fn matching_proof_credits_sender() {
        let mut resource = ResourceOpinion::new();
        let mut cluster = ClusterDirectory::new();
        let messages = vec![honest("ed02")];

        let summary = score_proofs(
            &messages,
            &context(),
            &file_hash(),
            &tiny(),
            &mut resource,
            &mut cluster,
        )
        .await;

        assert_eq!(summary.verified, vec![key("ed02")]);
        assert_eq!(resource.get(&key("ed02")), Some(1));
    }

    #[tokio::test]
    async fn duplicate_broadcasts_count_once() {
        let mut resource = ResourceOpinion::new();
        let mut cluster = ClusterDirectory::new();
        let messages = vec![honest("ed02"), honest("ed02"), honest("ed02")];

        score_proofs(
            &messages,
            &context(),
            &file_hash(),
            &tiny(),
            &mut resource,
            &mut cluster,
        )
        .await;

        assert_eq!(resource.get(&key("ed02")), Some(1));
    }

    #[tokio::test]
    async fn forwarded_proof_is_rejected() {
        let mut resource = ResourceOpinion::new();
        let mut cluster = ClusterDirectory::new();
        // ed03 rebroadcasts ed02's proof as its own.
        let stolen = coded_proof(&key("ed02"), &file_hash(), &tiny()).unwrap();
        let messages = vec![proof_message("ed03", stolen, None)];

        let summary = score_proofs(
            &messages,
            &context(),
            &file_hash(),
            &tiny(),
            &mut resource,
            &mut cluster,
        )
        .await;

        assert!(summary.verified.is_empty());
        assert_eq!(summary.rejected, vec![key("ed03")]);
        assert_eq!(resource.get(&key("ed03")), None);
    }

    #[tokio::test]
    async fn wrong_then_right_proof_credits_once() {
        let mut resource = ResourceOpinion::new();
        let mut cluster = ClusterDirectory::new();
        let messages = vec![proof_message("ed02", "00".repeat(64), None), honest("ed02")];

        let summary = score_proofs(
            &messages,
            &context(),
            &file_hash(),
            &tiny(),
            &mut resource,
            &mut cluster,
        )
        .await;

        assert_eq!(resource.get(&key("ed02")), Some(1));
        assert!(summary.rejected.is_empty());
    }

    #[tokio::test]
    async fn malformed_message_does_not_block_others() {
        let mut resource = ResourceOpinion::new();
        let mut cluster = ClusterDirectory::new();
        let messages = vec![
            InboundMessage {
                peer: key("ed03"),
                payload: b"{\"pow\": 12".to_vec(),
            },
            honest("ed02"),
        ];

        let summary = score_proofs(
            &messages,
            &context(),
            &file_hash(),
            &tiny(),
            &mut resource,
            &mut cluster,
        )
        .await;

        assert_eq!(summary.malformed, 1);
        assert_eq!(resource.get(&key("ed02")), Some(1));
    }

    #[tokio::test]
    async fn bad_instance_info_still_credits_proof() {
        let mut resource = ResourceOpinion::new();
        let mut cluster = ClusterDirectory::new();
        let pow = coded_proof(&key("ed02"), &file_hash(), &tiny()).unwrap();
        let out_of_range = serde_json::json!({
            "pow": pow,
            "instance": {"domain": "x", "gp_tcp_port": 70000, "gp_udp_port": 1},
        });
        let not_an_object = serde_json::json!({
            "pow": coded_proof(&key("ed03"), &file_hash(), &tiny()).unwrap(),
            "instance": "x",
        });
        let messages = vec![
            InboundMessage {
                peer: key("ed02"),
                payload: serde_json::to_vec(&out_of_range).unwrap(),
            },
            InboundMessage {
                peer: key("ed03"),
                payload: serde_json::to_vec(&not_an_object).unwrap(),
            },
        ];

        let summary = score_proofs(
            &messages,
            &context(),
            &file_hash(),
            &tiny(),
            &mut resource,
            &mut cluster,
        )
        .await;

        assert_eq!(summary.verified, vec![key("ed02"), key("ed03")]);
        assert_eq!(summary.malformed, 0);
        assert_eq!(summary.bad_instances, 2);
        assert_eq!(resource.get(&key("ed02")), Some(1));
        assert_eq!(resource.get(&key("ed03")), Some(1));
        assert!(cluster.is_empty());
    }

    #[tokio::test]
    async fn self_and_outsider_messages_are_ignored() {
        let mut resource = ResourceOpinion::new();
        let mut cluster = ClusterDirectory::new();
        let messages = vec![honest("ed01"), honest("ed99")];

        let summary = score_proofs(
            &messages,
            &context(),
            &file_hash(),
            &tiny(),
            &mut resource,
            &mut cluster,
        )
        .await;

        assert_eq!(summary.ignored, 2);
        assert!(resource.is_empty());
    }

    #[tokio::test]
    async fn piggybacked_instance_info_is_upserted() {
        let mut resource = ResourceOpinion::new();
        let mut cluster = ClusterDirectory::new();
        cluster.upsert(key("ed04"), InstanceInfo::new("old.example", 1, 2));

        let pow = coded_proof(&key("ed04"), &file_hash(), &tiny()).unwrap();
        let info = InstanceInfo::new("new.example", 36525, 39064);
        let messages = vec![proof_message("ed04", pow, Some(info.clone()))];

        let summary = score_proofs(
            &messages,
            &context(),
            &file_hash(),
            &tiny(),
            &mut resource,
            &mut cluster,
        )
        .await;

        assert_eq!(summary.instances_updated, 1);
        assert_eq!(cluster.get(&key("ed04")), Some(&info));
    }

    #[tokio::test]
    async fn empty_inbox_changes_nothing() {
        let mut resource = ResourceOpinion::new();
        let mut cluster = ClusterDirectory::new();

        let summary = score_proofs(
            &[],
            &context(),
            &file_hash(),
            &tiny(),
            &mut resource,
            &mut cluster,
        )
        .await;

        assert_eq!(summary, ScoringSummary::default());
        assert!(resource.is_empty());
        assert!(cluster.is_empty());
    }
}
