// crates/reputon-core/src/identity.rs

use std::fmt;

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::error::ReputonError;

/// Prefix the host runtime puts in front of ed25519 public keys.
pub const ED25519_PREFIX: &str = "ed";

/// Hex-encoded public key identifying one member of the peer set.
///
/// Keys are compared and ordered as lowercase strings, so two nodes that
/// received the same membership list agree on ordering regardless of how
/// the host formatted the hex.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerKey(String);

impl PeerKey {
    /// Parse a hex public key. Accepts any non-empty, even-length hex string
    /// (the `ed` prefix is itself valid hex).
    pub fn parse(raw: &str) -> Result<Self, ReputonError> {
        let key = raw.trim().to_ascii_lowercase();
        if key.is_empty() {
            return Err(ReputonError::Crypto("empty public key".to_string()));
        }
        if key.len() % 2 != 0 || !key.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ReputonError::Crypto(format!(
                "public key is not even-length hex: {}",
                key
            )));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the key as an ed25519 verifying key.
    ///
    /// Accepts both the 66-character `ed`-prefixed form and a bare
    /// 64-character key.
    pub fn verifying_key(&self) -> Result<VerifyingKey, ReputonError> {
        let bare = match self.0.len() {
            66 if self.0.starts_with(ED25519_PREFIX) => &self.0[2..],
            64 => self.0.as_str(),
            other => {
                return Err(ReputonError::Crypto(format!(
                    "ed25519 key must be 64 hex chars (optionally ed-prefixed), got {}",
                    other
                )))
            }
        };
        let bytes: [u8; 32] = hex::decode(bare)?
            .try_into()
            .map_err(|_| ReputonError::Crypto("ed25519 key must be 32 bytes".to_string()))?;
        Ok(VerifyingKey::from_bytes(&bytes)?)
    }

    /// Build the `ed`-prefixed key for a verifying key.
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        Self(format!("{}{}", ED25519_PREFIX, hex::encode(key.to_bytes())))
    }
}

impl fmt::Display for PeerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PeerKey {
    type Error = ReputonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PeerKey::parse(&value)
    }
}

impl From<PeerKey> for String {
    fn from(key: PeerKey) -> Self {
        key.0
    }
}

/// Generate a fresh ed25519 identity.
pub fn generate_identity() -> (SigningKey, PeerKey) {
    let signing_key = SigningKey::generate(&mut OsRng);
    let key = PeerKey::from_verifying_key(&signing_key.verifying_key());
    (signing_key, key)
}
