// crates/reputon-pow/src/coded.rs
//
// Identity-coded proofs.
//
// coded_proof(identity, file_hash) = memory_hard_hash(identity || file_hash).
// A node broadcasts its own coded proof; a verifier recomputes the coded
// proof for the sender's identity from its own file hash and compares. A
// node forwarding someone else's proof fails, because the identity half of
// the input no longer matches the sender.

use reputon_core::crypto::memory_hard_hash;
use reputon_core::error::ReputonError;
use reputon_core::identity::PeerKey;
use reputon_core::params::MemoryHardParams;

/// Compute the coded proof synchronously. Expensive: allocates the full
/// memory-hard ceiling.
pub fn coded_proof(
    identity: &PeerKey,
    file_hash: &str,
    params: &MemoryHardParams,
) -> Result<String, ReputonError> {
    let input = format!("{}{}", identity.as_str(), file_hash);
    let digest = memory_hard_hash(input.as_bytes(), params)?;
    Ok(hex::encode(digest))
}

/// Compute the coded proof on tokio's blocking pool.
pub async fn coded_proof_blocking(
    identity: &PeerKey,
    file_hash: &str,
    params: &MemoryHardParams,
) -> Result<String, ReputonError> {
    let identity = identity.clone();
    let file_hash = file_hash.to_string();
    let params = params.clone();
    tokio::task::spawn_blocking(move || coded_proof(&identity, &file_hash, &params))
        .await
        .map_err(|e| ReputonError::Crypto(format!("coded proof task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn identity_changes_the_proof() {
        let file_hash = "ab".repeat(64);
        let a = coded_proof(&key("ed01"), &file_hash, &tiny()).unwrap();
        let b = coded_proof(&key("ed02"), &file_hash, &tiny()).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 128);
    }

    #[test]
    fn file_hash_changes_the_proof() {
        let a = coded_proof(&key("ed01"), &"ab".repeat(64), &tiny()).unwrap();
        let b = coded_proof(&key("ed01"), &"cd".repeat(64), &tiny()).unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn blocking_pool_matches_inline_computation() {
        let file_hash = "11".repeat(64);
        let honest = key("ed0a");
        let proof = coded_proof_blocking(&honest, &file_hash, &tiny()).await.unwrap();
        assert_eq!(proof, coded_proof(&honest, &file_hash, &tiny()).unwrap());
    }
}
