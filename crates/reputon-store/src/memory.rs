// crates/reputon-store/src/memory.rs
//
// In-memory StateStore for tests and simulations.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;

use reputon_core::error::ReputonError;
use reputon_core::instance::{ClusterDirectory, InstanceInfo};
use reputon_core::opinion::{
    ExecutionCounter, LedgerSnapshot, PortOpinion, ResourceOpinion, SubUniverseAssignment,
};
use reputon_core::traits::StateStore;

use crate::files::StateFile;

/// Snapshot held in memory. Writes to files marked with `fail_writes_to`
/// return a storage error, which lets callers exercise per-file isolation.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    snapshot: RwLock<LedgerSnapshot>,
    instance: Option<InstanceInfo>,
    failing: RwLock<HashSet<StateFile>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot.
    pub fn with_snapshot(snapshot: LedgerSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
            ..Self::default()
        }
    }

    pub fn with_instance_info(mut self, info: InstanceInfo) -> Self {
        self.instance = Some(info);
        self
    }

    /// Make every later write to `file` fail.
    pub async fn fail_writes_to(&self, file: StateFile) {
        self.failing.write().await.insert(file);
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> LedgerSnapshot {
        self.snapshot.read().await.clone()
    }

    async fn check(&self, file: StateFile) -> Result<(), ReputonError> {
        if self.failing.read().await.contains(&file) {
            return Err(ReputonError::Storage(format!("injected write failure for {}", file)));
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn load_snapshot(&self) -> LedgerSnapshot {
        self.snapshot.read().await.clone()
    }

    async fn load_instance_info(&self) -> Option<InstanceInfo> {
        self.instance.clone()
    }

    async fn save_cluster(&self, cluster: &ClusterDirectory) -> Result<(), ReputonError> {
        self.check(StateFile::Cluster).await?;
        self.snapshot.write().await.cluster = cluster.clone();
        Ok(())
    }

    async fn save_resource_opinion(&self, opinion: &ResourceOpinion) -> Result<(), ReputonError> {
        self.check(StateFile::ResourceOpinion).await?;
        self.snapshot.write().await.resource = opinion.clone();
        Ok(())
    }

    async fn save_port_opinion(&self, opinion: &PortOpinion) -> Result<(), ReputonError> {
        self.check(StateFile::PortOpinion).await?;
        self.snapshot.write().await.port = opinion.clone();
        Ok(())
    }

    async fn save_assignment(
        &self,
        assignment: &SubUniverseAssignment,
    ) -> Result<(), ReputonError> {
        self.check(StateFile::Assignment).await?;
        self.snapshot.write().await.assignment = Some(assignment.clone());
        Ok(())
    }

    async fn save_execution_count(&self, counter: ExecutionCounter) -> Result<(), ReputonError> {
        self.check(StateFile::ExecutionCount).await?;
        self.snapshot.write().await.executions = counter;
        Ok(())
    }
}
