// crates/reputon-reputation/src/partition.rs
//
// Deterministic sub-universe partitioning.
//
// On every rotation round (sequence % R == 0) each node independently
// shuffles the peer set with a PRNG seeded from the sequence number and cuts
// the result into groups of `sub_universe_size`. Every node sees the same
// sequence number and peer set, so every node arrives at the same groups
// without exchanging anything.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use reputon_core::identity::PeerKey;
use reputon_core::opinion::SubUniverseAssignment;
use reputon_core::params::ProbeParams;

/// True when `sequence_number` starts a new rotation cycle.
pub fn is_rotation_round(sequence_number: u64, params: &ProbeParams) -> bool {
    params.rotation_interval > 0 && sequence_number % params.rotation_interval == 0
}

/// Shuffle `peer_set` with a PRNG seeded from `seed`.
///
/// The set is sorted and de-duplicated first so the result depends only on
/// membership, not on the order the host delivered it in.
pub fn compute_assignment(
    peer_set: &[PeerKey],
    seed: u64,
    group_size: usize,
) -> SubUniverseAssignment {
    let mut order: Vec<PeerKey> = peer_set.to_vec();
    order.sort();
    order.dedup();

    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    SubUniverseAssignment {
        seed,
        group_size: group_size.max(1),
        order,
    }
}

/// Peers `local` must probe under `assignment`: its group, minus itself.
///
/// Empty when `local` was not part of the shuffle.
pub fn probe_targets(assignment: &SubUniverseAssignment, local: &PeerKey) -> Vec<PeerKey> {
    assignment
        .group_of(local)
        .map(|group| group.iter().filter(|p| *p != local).cloned().collect())
        .unwrap_or_default()
}
