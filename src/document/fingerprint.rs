//! Content identity for attachment payloads.

use std::fmt;

use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

/// SHA-256 digest of an attachment's decoded bytes.
///
/// Two payloads with equal fingerprints are treated as the same content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentFingerprint([u8; 32]);

impl ContentFingerprint {
    /// Lowercase hex of the full digest.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

/// Fingerprint a payload. Pure and deterministic; an empty payload has a
/// well-defined fingerprint like any other.
pub fn fingerprint(payload: &[u8]) -> ContentFingerprint {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    ContentFingerprint(hasher.finalize().into())
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentFingerprint({})", self.short())
    }
}

impl Serialize for ContentFingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            fingerprint(b"abc").to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_empty_payload_is_fingerprinted() {
        assert_eq!(
            fingerprint(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_different_content_differs() {
        assert_ne!(fingerprint(b"one"), fingerprint(b"two"));
        assert_eq!(fingerprint(b"same"), fingerprint(b"same"));
    }

    #[test]
    fn test_short_and_serialize() {
        let fp = fingerprint(b"abc");
        assert_eq!(fp.short(), "ba7816bf8f01");
        assert_eq!(
            serde_json::to_string(&fp).expect("json"),
            format!("\"{}\"", fp.to_hex())
        );
    }
}
