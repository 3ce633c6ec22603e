// crates/reputon-daemon/src/config.rs
//
// Runtime configuration for the Reputon daemon.
// Loaded from a TOML file or populated with production defaults.

use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use reputon_core::error::ReputonError;
use reputon_core::params::{ChainParams, ProbeParams, RoundParams, ScoreParams};

/// Name of the hash-chain backing file inside the data directory.
pub const BACKING_FILE_NAME: &str = "rep_hash.dat";

/// Runtime configuration for the daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Directory holding the ledger files and the backing file.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// This node's InstanceInfo as written by provisioning. Relative paths
    /// resolve against `data_dir`.
    #[serde(default = "default_instance_file")]
    pub instance_file: String,

    /// Operational log file served by `read_logs`. Relative paths resolve
    /// against `data_dir`.
    #[serde(default = "default_log_file")]
    pub log_file: String,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Address the probe responder binds.
    #[serde(default = "default_responder_host")]
    pub responder_host: String,

    #[serde(default)]
    pub chain: ChainParams,

    #[serde(default)]
    pub round: RoundParams,

    #[serde(default)]
    pub reachability: ProbeParams,

    #[serde(default)]
    pub score: ScoreParams,
}

fn default_data_dir() -> String {
    "~/.reputon/data".to_string()
}

fn default_instance_file() -> String {
    "instance.json".to_string()
}

fn default_log_file() -> String {
    "reputon.log".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_responder_host() -> String {
    "0.0.0.0".to_string()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            instance_file: default_instance_file(),
            log_file: default_log_file(),
            log_level: default_log_level(),
            responder_host: default_responder_host(),
            chain: ChainParams::default(),
            round: RoundParams::default(),
            reachability: ProbeParams::default(),
            score: ScoreParams::default(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file at the given path.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &str) -> Result<Self, ReputonError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ReputonError::Config(format!("cannot read {}: {}", path, e)))?;
        let config: DaemonConfig = toml::from_str(&contents)
            .map_err(|e| ReputonError::Config(format!("cannot parse {}: {}", path, e)))?;
        Ok(config)
    }

    /// Check every parameter block.
    pub fn validate(&self) -> Result<(), ReputonError> {
        self.chain.validate()?;
        self.reachability.validate()?;
        self.score.validate()?;
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(expand_tilde(&self.data_dir))
    }

    pub fn backing_file(&self) -> PathBuf {
        self.data_dir().join(BACKING_FILE_NAME)
    }

    pub fn instance_path(&self) -> PathBuf {
        self.resolve(&self.instance_file)
    }

    pub fn log_path(&self) -> PathBuf {
        self.resolve(&self.log_file)
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let expanded = PathBuf::from(expand_tilde(path));
        if expanded.is_absolute() {
            expanded
        } else {
            self.data_dir().join(expanded)
        }
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}/{}", home.display(), rest);
        }
    }
    path.to_string()
}
