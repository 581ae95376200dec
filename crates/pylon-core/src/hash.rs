use crate::Hash32;
use sha2::{Digest, Sha256};

/// Compute a deterministic SHA-256 hash of a byte slice.
pub fn sha256(data: &[u8]) -> Hash32 {
    sha256_domain(&[], data)
}

/// Compute a domain-separated SHA-256 hash: `H(domain || data)`.
pub fn sha256_domain(domain: &[u8], data: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(data);
    let result = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&result);
    Hash32(bytes)
}

/// Domain separation tag for event-log record hashes.
pub const EVENT_RECORD_DOMAIN_V1: &[u8] = b"PYLON_EVENT_RECORD_V1";

/// Domain separation tag for execution-state snapshot commitments.
pub const STATE_SNAPSHOT_DOMAIN_V1: &[u8] = b"PYLON_STATE_SNAPSHOT_V1";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_matches_known_vector() {
        assert_eq!(
            sha256(b"abc").to_string(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn domain_separates() {
        assert_ne!(
            sha256_domain(EVENT_RECORD_DOMAIN_V1, b"x"),
            sha256_domain(STATE_SNAPSHOT_DOMAIN_V1, b"x")
        );
        assert_eq!(sha256_domain(b"ab", b"c"), sha256(b"abc"));
    }
}
