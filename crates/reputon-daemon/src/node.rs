// crates/reputon-daemon/src/node.rs
//
// Wires the library crates into one node from a DaemonConfig.

use std::sync::Arc;

use reputon_core::error::ReputonError;
use reputon_core::traits::StateStore;
use reputon_pow::HashChainEngine;
use reputon_probe::ReachabilityEngine;
use reputon_round::{QueryService, RoundRunner};
use reputon_store::JsonFileStore;

use crate::config::DaemonConfig;

/// Everything one invocation needs.
pub struct NodeServices {
    pub store: Arc<JsonFileStore>,
    pub runner: RoundRunner,
    pub queries: QueryService,
}

impl NodeServices {
    /// Validate `config`, open the data directory, and build the round
    /// runner and query service on top of it.
    pub fn build(config: &DaemonConfig) -> Result<Self, ReputonError> {
        config.validate()?;

        let store = Arc::new(
            JsonFileStore::open(config.data_dir())?.with_instance_file(config.instance_path()),
        );
        let shared: Arc<dyn StateStore> = store.clone();

        let chain = HashChainEngine::new(config.backing_file(), config.chain.clone())?;
        let reachability = ReachabilityEngine::new(config.reachability.clone())?;
        let runner = RoundRunner::new(shared.clone(), chain, reachability, config.round.clone());
        let queries =
            QueryService::new(shared, config.score.clone()).with_log_file(config.log_path());

        Ok(Self {
            store,
            runner,
            queries,
        })
    }
}
