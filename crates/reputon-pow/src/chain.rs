// crates/reputon-pow/src/chain.rs
//
// HashChainEngine: the sequential, storage-bound part of the proof.
//
// Step i runs from num_hashes-1 down to 0. The running value starts as the
// decoded round hash; every K-th step (i % K == 0) advances it with the
// memory-hard hash, every other step with SHA-512. Each new value is written
// as hex at offset total_size - (i+1) * write_interval, so the oldest links
// sit at the start of the file. The artifact is the SHA-512 of the entire
// file afterwards, which ties the proof to what is actually on disk.

use std::io::SeekFrom;
use std::path::PathBuf;

use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use reputon_core::crypto::{memory_hard_hash, sha512};
use reputon_core::error::ReputonError;
use reputon_core::identity::PeerKey;
use reputon_core::params::{ChainParams, MemoryHardParams, DIGEST_LEN};

use crate::backing::{ensure_backing_file, hash_file};
use crate::coded::coded_proof_blocking;

/// Result of one chain run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainArtifact {
    /// SHA-512 of the backing file after the chain, hex.
    pub file_hash: String,
    /// Chain records written this run.
    pub steps_written: u64,
}

/// Runs the per-round hash chain against one backing file.
#[derive(Debug, Clone)]
pub struct HashChainEngine {
    path: PathBuf,
    params: ChainParams,
}

impl HashChainEngine {
    /// Create an engine for the backing file at `path`.
    ///
    /// Returns an error if `params` fails validation.
    pub fn new(path: impl Into<PathBuf>, params: ChainParams) -> Result<Self, ReputonError> {
        params.validate()?;
        Ok(Self {
            path: path.into(),
            params,
        })
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    /// Build or reuse the backing file, run the chain from `round_hash`, and
    /// hash the file.
    ///
    /// Either completes or returns an error; a partially written chain is
    /// never hashed.
    pub async fn compute(&self, round_hash: &[u8]) -> Result<ChainArtifact, ReputonError> {
        ensure_backing_file(&self.path, &self.params).await?;
        tracing::info!("Hash chain started on {}", self.path.display());

        let steps_written = self.write_chain(round_hash).await?;
        let file_hash = hash_file(&self.path, self.params.chunk_size).await?;

        tracing::info!(
            "Hash chain complete: {} records, file hash {}…",
            steps_written,
            &file_hash[..16]
        );

        Ok(ChainArtifact {
            file_hash,
            steps_written,
        })
    }

    /// Run the chain and derive the local coded proof in one go.
    pub async fn compute_for(
        &self,
        round_hash: &[u8],
        identity: &PeerKey,
    ) -> Result<(ChainArtifact, String), ReputonError> {
        let artifact = self.compute(round_hash).await?;
        let proof =
            coded_proof_blocking(identity, &artifact.file_hash, &self.params.memory_hard).await?;
        Ok((artifact, proof))
    }

    async fn write_chain(&self, round_hash: &[u8]) -> Result<u64, ReputonError> {
        let mut file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                ReputonError::Storage(format!("failed to open {}: {}", self.path.display(), e))
            })?;

        let total = self.params.total_size;
        let interval = self.params.write_interval;
        let frequency = self.params.memory_hard_frequency;

        let mut value: Vec<u8> = round_hash.to_vec();
        let mut written = 0u64;

        for i in (0..self.params.num_hashes()).rev() {
            let offset = match i
                .checked_add(1)
                .and_then(|n| n.checked_mul(interval))
                .and_then(|end| total.checked_sub(end))
            {
                Some(offset) => offset,
                None => {
                    tracing::warn!(
                        "Chain step {} would write before the start of the file, stopping",
                        i
                    );
                    break;
                }
            };

            let next = if i % frequency == 0 {
                let digest = memory_hard_step(&value, &self.params.memory_hard).await?;
                tracing::info!(
                    "Hash file percentage: {:.2}%",
                    (offset + interval) as f64 / total as f64 * 100.0
                );
                digest
            } else {
                sha512(&value)
            };

            file.seek(SeekFrom::Start(offset)).await?;
            file.write_all(hex::encode(next).as_bytes()).await?;

            value = next.to_vec();
            written += 1;
        }

        file.flush().await?;
        file.sync_data().await?;
        Ok(written)
    }
}

async fn memory_hard_step(
    input: &[u8],
    params: &MemoryHardParams,
) -> Result<[u8; DIGEST_LEN], ReputonError> {
    let input = input.to_vec();
    let params = params.clone();
    tokio::task::spawn_blocking(move || memory_hard_hash(&input, &params))
        .await
        .map_err(|e| ReputonError::Crypto(format!("memory-hard step task failed: {}", e)))?
}
