// crates/reputon-core/src/params.rs
//
// Tunable protocol parameters.
//
// Each parameter block deserializes from its own TOML section in the daemon
// config and falls back to production defaults field by field.

use serde::{Deserialize, Serialize};

use crate::error::ReputonError;

/// Length in bytes of every chain value (SHA-512 and memory-hard output).
pub const DIGEST_LEN: usize = 64;

/// Bytes written at each chain offset: the lowercase hex of one digest.
pub const CHAIN_RECORD_LEN: u64 = (DIGEST_LEN * 2) as u64;

// ---------------------------------------------------------------------------
// Memory-hard hash
// ---------------------------------------------------------------------------

/// Argon2id cost parameters for the expensive chain step and coded proofs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryHardParams {
    /// Memory ceiling in KiB.
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,
    /// Number of passes over memory.
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    /// Degree of parallelism.
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

fn default_memory_kib() -> u32 {
    512 * 1024
}

fn default_iterations() -> u32 {
    1
}

fn default_parallelism() -> u32 {
    1
}

impl Default for MemoryHardParams {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
        }
    }
}

impl MemoryHardParams {
    pub fn validate(&self) -> Result<(), ReputonError> {
        if self.parallelism == 0 || self.iterations == 0 {
            return Err(ReputonError::InvalidParams(
                "memory-hard iterations and parallelism must be > 0".to_string(),
            ));
        }
        if self.memory_kib < 8 * self.parallelism {
            return Err(ReputonError::InvalidParams(format!(
                "memory-hard memory_kib must be at least {} for parallelism {}",
                8 * self.parallelism,
                self.parallelism
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Hash chain
// ---------------------------------------------------------------------------

/// Shape of the backing file and the chain written into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    /// Exact size of the backing file in bytes.
    #[serde(default = "default_total_size")]
    pub total_size: u64,
    /// Distance in bytes between consecutive chain records.
    #[serde(default = "default_write_interval")]
    pub write_interval: u64,
    /// Number of chain steps. Defaults to `total_size / write_interval`.
    #[serde(default)]
    pub num_hashes: Option<u64>,
    /// Block size for zero-filling and streaming the backing file.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Every K-th step uses the memory-hard hash.
    #[serde(default = "default_memory_hard_frequency")]
    pub memory_hard_frequency: u64,
    /// Attempts at building the backing file before the round fails.
    #[serde(default = "default_init_retries")]
    pub init_retries: u32,
    /// Pause between backing file attempts.
    #[serde(default = "default_init_retry_delay_ms")]
    pub init_retry_delay_ms: u64,
    #[serde(default)]
    pub memory_hard: MemoryHardParams,
}

fn default_total_size() -> u64 {
    // 1.5 GiB
    3 * 512 * 1024 * 1024
}

fn default_write_interval() -> u64 {
    512 * 1024
}

fn default_chunk_size() -> usize {
    1024 * 1024
}

fn default_memory_hard_frequency() -> u64 {
    200
}

fn default_init_retries() -> u32 {
    5
}

fn default_init_retry_delay_ms() -> u64 {
    1000
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            total_size: default_total_size(),
            write_interval: default_write_interval(),
            num_hashes: None,
            chunk_size: default_chunk_size(),
            memory_hard_frequency: default_memory_hard_frequency(),
            init_retries: default_init_retries(),
            init_retry_delay_ms: default_init_retry_delay_ms(),
            memory_hard: MemoryHardParams::default(),
        }
    }
}

impl ChainParams {
    /// Number of chain steps to run.
    pub fn num_hashes(&self) -> u64 {
        self.num_hashes
            .unwrap_or(self.total_size / self.write_interval.max(1))
    }

    pub fn validate(&self) -> Result<(), ReputonError> {
        if self.total_size == 0 {
            return Err(ReputonError::InvalidParams("total_size must be > 0".to_string()));
        }
        if self.write_interval < CHAIN_RECORD_LEN {
            return Err(ReputonError::InvalidParams(format!(
                "write_interval must be at least {} bytes to hold one chain record",
                CHAIN_RECORD_LEN
            )));
        }
        if self.chunk_size == 0 {
            return Err(ReputonError::InvalidParams("chunk_size must be > 0".to_string()));
        }
        if self.memory_hard_frequency == 0 {
            return Err(ReputonError::InvalidParams(
                "memory_hard_frequency must be > 0".to_string(),
            ));
        }
        if self.init_retries == 0 {
            return Err(ReputonError::InvalidParams("init_retries must be > 0".to_string()));
        }
        self.memory_hard.validate()
    }
}

// ---------------------------------------------------------------------------
// Round window
// ---------------------------------------------------------------------------

/// Timing of the proof exchange within one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundParams {
    /// Milliseconds from round start until buffered proofs are scored.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

fn default_window_ms() -> u64 {
    90_000
}

impl Default for RoundParams {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Reachability
// ---------------------------------------------------------------------------

/// Rotation and probing parameters for the reachability engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeParams {
    /// Rounds between sub-universe reshuffles (R).
    #[serde(default = "default_rotation_interval")]
    pub rotation_interval: u64,
    /// Peers per sub-universe.
    #[serde(default = "default_sub_universe_size")]
    pub sub_universe_size: usize,
    /// Executed rounds required before probing starts. Defaults to R.
    #[serde(default)]
    pub warmup_rounds: Option<u64>,
    /// Independent timeout for each probe.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Consecutive ports probed per transport, starting at the advertised one.
    #[serde(default = "default_ports_per_transport")]
    pub ports_per_transport: u16,
}

fn default_rotation_interval() -> u64 {
    5
}

fn default_sub_universe_size() -> usize {
    6
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

fn default_ports_per_transport() -> u16 {
    2
}

impl Default for ProbeParams {
    fn default() -> Self {
        Self {
            rotation_interval: default_rotation_interval(),
            sub_universe_size: default_sub_universe_size(),
            warmup_rounds: None,
            probe_timeout_ms: default_probe_timeout_ms(),
            ports_per_transport: default_ports_per_transport(),
        }
    }
}

impl ProbeParams {
    pub fn warmup_rounds(&self) -> u64 {
        self.warmup_rounds.unwrap_or(self.rotation_interval)
    }

    /// Probes issued against one peer per cycle (TCP and UDP ports).
    pub fn probes_per_peer(&self) -> u32 {
        u32::from(self.ports_per_transport) * 2
    }

    pub fn validate(&self) -> Result<(), ReputonError> {
        if self.rotation_interval == 0 {
            return Err(ReputonError::InvalidParams(
                "rotation_interval must be > 0".to_string(),
            ));
        }
        if self.sub_universe_size == 0 {
            return Err(ReputonError::InvalidParams(
                "sub_universe_size must be > 0".to_string(),
            ));
        }
        if self.ports_per_transport == 0 {
            return Err(ReputonError::InvalidParams(
                "ports_per_transport must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Score readout
// ---------------------------------------------------------------------------

/// Weighting of the two signals in the final score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreParams {
    /// Weight W of the resource-proof rate; reachability gets `1 - W`.
    #[serde(default = "default_resource_weight")]
    pub resource_weight: f64,
}

fn default_resource_weight() -> f64 {
    0.75
}

impl Default for ScoreParams {
    fn default() -> Self {
        Self {
            resource_weight: default_resource_weight(),
        }
    }
}

impl ScoreParams {
    pub fn validate(&self) -> Result<(), ReputonError> {
        if !(0.0..=1.0).contains(&self.resource_weight) {
            return Err(ReputonError::InvalidParams(format!(
                "resource_weight must be within [0, 1], got {}",
                self.resource_weight
            )));
        }
        Ok(())
    }
}
