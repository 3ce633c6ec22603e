// crates/reputon-core/src/instance.rs
//
// Instance metadata: where a node can be reached for reachability probing.
//
// InstanceInfo is produced once by provisioning, persisted locally, and
// piggybacked on round broadcasts so peers learn it. The ClusterDirectory is
// the local view of every peer's last broadcast InstanceInfo.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::identity::PeerKey;

/// Network metadata a node advertises about itself.
///
/// Unknown fields written by provisioning are preserved in `extra` so the
/// record is re-broadcast exactly as it was read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceInfo {
    /// The node's public key, as provisioning recorded it.
    #[serde(default)]
    pub pubkey: Option<String>,
    /// Host name or address the probe ports are served on.
    #[serde(default)]
    pub domain: Option<String>,
    /// First TCP probe port; the next port is probed as well.
    #[serde(default, deserialize_with = "deserialize_port")]
    pub gp_tcp_port: Option<u16>,
    /// First UDP probe port; the next port is probed as well.
    #[serde(default, deserialize_with = "deserialize_port")]
    pub gp_udp_port: Option<u16>,
    /// Any other provisioning fields.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl InstanceInfo {
    pub fn new(domain: &str, gp_tcp_port: u16, gp_udp_port: u16) -> Self {
        Self {
            pubkey: None,
            domain: Some(domain.to_string()),
            gp_tcp_port: Some(gp_tcp_port),
            gp_udp_port: Some(gp_udp_port),
            extra: serde_json::Map::new(),
        }
    }

    /// True when a domain and both base ports are known.
    pub fn is_probeable(&self) -> bool {
        self.domain.as_deref().is_some_and(|d| !d.is_empty())
            && self.gp_tcp_port.is_some()
            && self.gp_udp_port.is_some()
    }

    /// The `count` consecutive TCP ports starting at `gp_tcp_port`.
    pub fn tcp_ports(&self, count: u16) -> Vec<u16> {
        consecutive_ports(self.gp_tcp_port, count)
    }

    /// The `count` consecutive UDP ports starting at `gp_udp_port`.
    pub fn udp_ports(&self, count: u16) -> Vec<u16> {
        consecutive_ports(self.gp_udp_port, count)
    }
}

fn consecutive_ports(base: Option<u16>, count: u16) -> Vec<u16> {
    match base {
        Some(base) => (0..count).filter_map(|i| base.checked_add(i)).collect(),
        None => Vec::new(),
    }
}

/// Provisioning writes ports either as JSON numbers or as numeric strings.
fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawPort {
        Number(u16),
        Text(String),
    }

    match Option::<RawPort>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawPort::Number(port)) => Ok(Some(port)),
        Some(RawPort::Text(text)) => text
            .trim()
            .parse::<u16>()
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid port {:?}: {}", text, e))),
    }
}

/// Last-known InstanceInfo per peer.
///
/// Grows monotonically: entries are upserted whenever a peer broadcasts its
/// info and are never evicted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterDirectory {
    pub entries: BTreeMap<PeerKey, InstanceInfo>,
}

impl ClusterDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `peer`.
    pub fn upsert(&mut self, peer: PeerKey, info: InstanceInfo) {
        self.entries.insert(peer, info);
    }

    pub fn get(&self, peer: &PeerKey) -> Option<&InstanceInfo> {
        self.entries.get(peer)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
