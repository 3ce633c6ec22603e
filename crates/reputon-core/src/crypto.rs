// crates/reputon-core/src/crypto.rs
//
// Hash primitives shared by the hash chain, coded proofs, and probes.

use argon2::{Algorithm, Argon2, Params, Version};
use sha2::{Digest, Sha512};

use crate::error::ReputonError;
use crate::params::{MemoryHardParams, DIGEST_LEN};

/// Argon2 salt length taken from the input's SHA-512.
const SALT_LEN: usize = 16;

/// Compute the SHA-512 hash of the given bytes.
pub fn sha512(data: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha512::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; DIGEST_LEN];
    output.copy_from_slice(&result);
    output
}

/// SHA-512 of `data`, lowercase hex.
pub fn sha512_hex(data: &[u8]) -> String {
    hex::encode(sha512(data))
}

/// Memory-hard hash of `input` (Argon2id v1.3, 64-byte output).
///
/// The salt is the first 16 bytes of SHA-512(input), so the output depends
/// on the input alone and every node derives the same value.
///
/// This allocates `params.memory_kib` KiB and is meant to be slow; callers on
/// an async runtime should run it on a blocking thread.
pub fn memory_hard_hash(
    input: &[u8],
    params: &MemoryHardParams,
) -> Result<[u8; DIGEST_LEN], ReputonError> {
    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(DIGEST_LEN),
    )
    .map_err(|e| ReputonError::Crypto(format!("invalid memory-hard params: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let digest = sha512(input);
    let salt = &digest[..SALT_LEN];

    let mut output = [0u8; DIGEST_LEN];
    argon2
        .hash_password_into(input, salt, &mut output)
        .map_err(|e| ReputonError::Crypto(format!("memory-hard hash failed: {}", e)))?;
    Ok(output)
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

    #[test]
    fn sha512_known_vector() {
        // SHA-512("abc")
        assert!(sha512_hex(b"abc").starts_with("ddaf35a193617aba"));
    }

    #[test]
    fn memory_hard_is_deterministic() {
        let a = memory_hard_hash(b"round-hash", &tiny()).unwrap();
        let b = memory_hard_hash(b"round-hash", &tiny()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn memory_hard_differs_per_input() {
        let a = memory_hard_hash(b"input-a", &tiny()).unwrap();
        let b = memory_hard_hash(b"input-b", &tiny()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn memory_hard_depends_on_cost() {
        let cheap = memory_hard_hash(b"x", &tiny()).unwrap();
        let costlier = memory_hard_hash(
            b"x",
            &MemoryHardParams {
                memory_kib: 16,
                ..tiny()
            },
        )
        .unwrap();
        assert_ne!(cheap, costlier);
    }

    #[test]
    fn memory_hard_rejects_bad_params() {
        let bad = MemoryHardParams {
            memory_kib: 1,
            iterations: 1,
            parallelism: 1,
        };
        assert!(memory_hard_hash(b"x", &bad).is_err());
    }
}
