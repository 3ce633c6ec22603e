// crates/reputon-pow/src/backing.rs
//
// Backing file management: build the fixed-size zero-filled file the chain
// is written into, and stream-hash it once the chain is done.

use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use sha2::{Digest, Sha512};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use reputon_core::error::ReputonError;
use reputon_core::params::ChainParams;

/// Make sure `path` holds exactly `params.total_size` bytes.
///
/// A file of the right size is reused as-is. Anything else is deleted and
/// rebuilt as zeros in `chunk_size` blocks. Failures are retried up to
/// `init_retries` times; a partially written file is caught by the size check
/// on the next attempt.
pub async fn ensure_backing_file(path: &Path, params: &ChainParams) -> Result<(), ReputonError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match initialize_file(path, params.total_size, params.chunk_size).await {
            Ok(true) => {
                tracing::info!(
                    "Backing file {} initialized ({} bytes)",
                    path.display(),
                    params.total_size
                );
                return Ok(());
            }
            Ok(false) => {
                tracing::debug!(
                    "Backing file {} exists with correct size, skipping initialization",
                    path.display()
                );
                return Ok(());
            }
            Err(e) if attempt < params.init_retries => {
                tracing::warn!(
                    "Backing file initialization attempt {}/{} failed: {}",
                    attempt,
                    params.init_retries,
                    e
                );
                tokio::time::sleep(Duration::from_millis(params.init_retry_delay_ms)).await;
            }
            Err(e) => {
                tracing::error!(
                    "Backing file initialization failed after {} attempts: {}",
                    attempt,
                    e
                );
                return Err(e);
            }
        }
    }
}

/// Returns `true` if the file had to be (re)built.
async fn initialize_file(path: &Path, size: u64, chunk_size: usize) -> Result<bool, ReputonError> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() == size => return Ok(false),
        Ok(meta) => {
            tracing::info!(
                "Backing file {} has size {} (expected {}), rebuilding",
                path.display(),
                meta.len(),
                size
            );
            fs::remove_file(path).await.map_err(|e| {
                ReputonError::Storage(format!("failed to remove {}: {}", path.display(), e))
            })?;
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            return Err(ReputonError::Storage(format!(
                "failed to stat {}: {}",
                path.display(),
                e
            )))
        }
    }

    let mut file = File::create(path).await.map_err(|e| {
        ReputonError::Storage(format!("failed to create {}: {}", path.display(), e))
    })?;

    let zeros = vec![0u8; chunk_size];
    let mut written: u64 = 0;
    while written < size {
        let n = (size - written).min(chunk_size as u64) as usize;
        // write_all awaits until the kernel takes the chunk.
        file.write_all(&zeros[..n]).await?;
        written += n as u64;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(true)
}

/// Stream the whole file through SHA-512. Returns lowercase hex.
pub async fn hash_file(path: &Path, chunk_size: usize) -> Result<String, ReputonError> {
    let mut file = File::open(path).await.map_err(|e| {
        ReputonError::Storage(format!("failed to open {}: {}", path.display(), e))
    })?;

    let mut hasher = Sha512::new();
    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
