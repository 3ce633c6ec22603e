// crates/reputon-store/src/json.rs
//
// Directory-of-JSON-files state store.
//
// Layout (inside the data directory):
//   - cluster.json            -> ClusterDirectory
//   - resource_opinion.json   -> ResourceOpinion
//   - port_opinion.json       -> PortOpinion
//   - port_eval_universe.json -> SubUniverseAssignment
//   - execution_count.json    -> ExecutionCounter
//
// The local InstanceInfo lives wherever provisioning put it and is only read.
//
// Writes go to a uniquely named temp file in the same directory, are synced,
// then renamed over the target, so a killed process leaves either the old or
// the new record, never a torn one.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use reputon_core::error::ReputonError;
use reputon_core::instance::{ClusterDirectory, InstanceInfo};
use reputon_core::opinion::{
    ExecutionCounter, LedgerSnapshot, PortOpinion, ResourceOpinion, SubUniverseAssignment,
};
use reputon_core::traits::StateStore;

use crate::files::StateFile;

/// `StateStore` backed by flat JSON files.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
    instance_file: Option<PathBuf>,
}

impl JsonFileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ReputonError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            ReputonError::Storage(format!("failed to create {}: {}", dir.display(), e))
        })?;
        Ok(Self {
            dir,
            instance_file: None,
        })
    }

    /// Read the local InstanceInfo from `path`.
    pub fn with_instance_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.instance_file = Some(path.into());
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of one of the persisted records.
    pub fn path_of(&self, file: StateFile) -> PathBuf {
        self.dir.join(file.file_name())
    }

    async fn read_record<T: DeserializeOwned>(&self, file: StateFile) -> Option<T> {
        read_json(&self.path_of(file)).await
    }

    async fn write_record<T: Serialize>(&self, file: StateFile, value: &T) -> Result<(), ReputonError> {
        let target = self.path_of(file);
        let bytes = serde_json::to_vec_pretty(value)?;
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", file.file_name(), Uuid::new_v4()));

        let result = write_then_rename(&tmp, &target, &bytes).await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        result.map_err(|e| {
            ReputonError::Storage(format!("failed to write {}: {}", target.display(), e))
        })?;

        tracing::debug!("Wrote {} ({} bytes)", target.display(), bytes.len());
        Ok(())
    }
}

async fn write_then_rename(tmp: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(tmp, target).await
}

/// Read and parse a JSON file. Missing or unparseable files yield `None`.
async fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!("{} not found, treating as empty", path.display());
            return None;
        }
        Err(e) => {
            tracing::warn!("Failed to read {}: {}. Treating as empty.", path.display(), e);
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Failed to parse {}: {}. Treating as empty.", path.display(), e);
            None
        }
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load_snapshot(&self) -> LedgerSnapshot {
        let mut snapshot = LedgerSnapshot {
            cluster: self.read_record(StateFile::Cluster).await.unwrap_or_default(),
            resource: self
                .read_record(StateFile::ResourceOpinion)
                .await
                .unwrap_or_default(),
            port: self.read_record(StateFile::PortOpinion).await.unwrap_or_default(),
            assignment: self.read_record(StateFile::Assignment).await,
            executions: self
                .read_record(StateFile::ExecutionCount)
                .await
                .unwrap_or_default(),
        };
        if snapshot.reconcile_counter() {
            tracing::warn!(
                "{} is behind {}, using {}",
                StateFile::ExecutionCount,
                StateFile::ResourceOpinion,
                snapshot.executions.get()
            );
        }

        tracing::debug!(
            "Loaded snapshot: {} cluster entries, {} resource opinions, {} port opinions, {} executions",
            snapshot.cluster.len(),
            snapshot.resource.counts.len(),
            snapshot.port.entries.len(),
            snapshot.executions.get()
        );
        snapshot
    }

    async fn load_instance_info(&self) -> Option<InstanceInfo> {
        match &self.instance_file {
            Some(path) => read_json(path).await,
            None => None,
        }
    }

    async fn save_cluster(&self, cluster: &ClusterDirectory) -> Result<(), ReputonError> {
        self.write_record(StateFile::Cluster, cluster).await
    }

    async fn save_resource_opinion(&self, opinion: &ResourceOpinion) -> Result<(), ReputonError> {
        self.write_record(StateFile::ResourceOpinion, opinion).await
    }

    async fn save_port_opinion(&self, opinion: &PortOpinion) -> Result<(), ReputonError> {
        self.write_record(StateFile::PortOpinion, opinion).await
    }

    async fn save_assignment(
        &self,
        assignment: &SubUniverseAssignment,
    ) -> Result<(), ReputonError> {
        self.write_record(StateFile::Assignment, assignment).await
    }

    async fn save_execution_count(&self, counter: ExecutionCounter) -> Result<(), ReputonError> {
        self.write_record(StateFile::ExecutionCount, &counter).await
    }
}
