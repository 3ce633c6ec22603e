// crates/reputon-core/src/traits.rs

use async_trait::async_trait;

use crate::error::ReputonError;
use crate::instance::{ClusterDirectory, InstanceInfo};
use crate::opinion::{
    ExecutionCounter, LedgerSnapshot, PortOpinion, ResourceOpinion, SubUniverseAssignment,
};

/// Persisted per-node state, read as a whole at round start and written
/// back one file at a time at round end.
///
/// Implemented by reputon-store (JSON files and in-memory).
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read every persisted record. A record that is missing or cannot be
    /// parsed comes back empty; this never fails.
    async fn load_snapshot(&self) -> LedgerSnapshot;

    /// This node's own instance info, if provisioning wrote one.
    async fn load_instance_info(&self) -> Option<InstanceInfo>;

    async fn save_cluster(&self, cluster: &ClusterDirectory) -> Result<(), ReputonError>;

    async fn save_resource_opinion(&self, opinion: &ResourceOpinion) -> Result<(), ReputonError>;

    async fn save_port_opinion(&self, opinion: &PortOpinion) -> Result<(), ReputonError>;

    async fn save_assignment(&self, assignment: &SubUniverseAssignment)
        -> Result<(), ReputonError>;

    async fn save_execution_count(&self, counter: ExecutionCounter) -> Result<(), ReputonError>;
}

/// Outbound half of the host runtime's broadcast primitive.
///
/// Inbound delivery is push-based: the runtime forwards every peer payload
/// into the round's inbox.
#[async_trait]
pub trait RoundTransport: Send + Sync {
    /// Send `payload` to every member of the peer set.
    async fn broadcast(&self, payload: Vec<u8>) -> Result<(), ReputonError>;
}
