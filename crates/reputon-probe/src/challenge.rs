// crates/reputon-probe/src/challenge.rs

use reputon_core::crypto::sha512_hex;
use reputon_core::error::ReputonError;
use reputon_core::identity::PeerKey;

/// Challenge sent to every probed port this round: SHA-512 of the decoded
/// round hash, hex.
pub fn probe_challenge(round_hash: &[u8]) -> String {
    sha512_hex(round_hash)
}

/// The answer a responder holding `target`'s key gives to `challenge`:
/// SHA-512 of the hex-decoded concatenation `challenge || target`.
pub fn expected_response(challenge: &str, target: &PeerKey) -> Result<String, ReputonError> {
    let bytes = hex::decode(format!("{}{}", challenge.trim(), target.as_str()))?;
    Ok(sha512_hex(&bytes))
}
