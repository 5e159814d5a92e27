//! Content addressing: deterministic keys for dedup and storage.
//!
//! Two key flavors, one per pipeline:
//! - [`ObjectKey`] — derived from a work item's *identity* (the URL
//!   string). Names the object in the local vault.
//! - [`DocId`] — derived from a work item's *payload* (the object bytes).
//!   Names the document in the search index.
//!
//! Both are pure and stable across process restarts; the same key is used
//! for the existence check and the eventual write.

use std::io::Read;

use sha1::Sha1;
use sha2::{Digest, Sha256};

/// File extension given to every stored vault object.
const VAULT_EXT: &str = "jpg";

/// Number of hex characters kept from the identity digest.
const OBJECT_KEY_LEN: usize = 16;

// ---------------------------------------------------------------------------
// ObjectKey
// ---------------------------------------------------------------------------

/// Identity-derived key: first 16 hex characters of the SHA-1 digest of the
/// source URL string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Derive the key for a work item identity (a URL string).
    pub fn from_identity(identity: &str) -> Self {
        let digest = Sha1::digest(identity.as_bytes());
        let hex = format!("{digest:x}");
        Self(hex[..OBJECT_KEY_LEN].to_string())
    }

    /// The filename this key maps to inside the vault.
    pub fn file_name(&self) -> String {
        format!("{}.{VAULT_EXT}", self.0)
    }

    /// The bare hex key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// DocId
// ---------------------------------------------------------------------------

/// Payload-derived key: full hex SHA-256 digest of the object bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocId(String);

impl DocId {
    /// Derive the key for an in-memory payload.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(format!("{:x}", Sha256::digest(bytes)))
    }

    /// Derive the key by streaming the payload through the digest in
    /// 8 KiB chunks, so large objects never need to be held in memory.
    pub fn from_reader(mut reader: impl Read) -> std::io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(format!("{:x}", hasher.finalize())))
    }

    /// The bare hex key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_is_stable() {
        let key = ObjectKey::from_identity("https://example.com/a.jpg");
        assert_eq!(key.as_str(), "c8cad51b5df249ba");
        assert_eq!(key.file_name(), "c8cad51b5df249ba.jpg");

        // Same identity, same key, every time.
        let again = ObjectKey::from_identity("https://example.com/a.jpg");
        assert_eq!(key, again);
    }

    #[test]
    fn distinct_identities_yield_distinct_keys() {
        let a = ObjectKey::from_identity("https://example.com/a.jpg");
        let b = ObjectKey::from_identity("https://example.com/b.jpg");
        assert_ne!(a, b);
        assert_eq!(b.as_str(), "d7c86f00cc6a6a54");
    }

    #[test]
    fn doc_id_matches_known_digest() {
        let id = DocId::from_bytes(b"hello world");
        assert_eq!(
            id.as_str(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn doc_id_streaming_equals_in_memory() {
        // Payload larger than one read buffer to exercise chunking.
        let payload: Vec<u8> = (0..100_000u32).flat_map(|n| n.to_le_bytes()).collect();
        let streamed = DocId::from_reader(&payload[..]).expect("read from slice");
        let direct = DocId::from_bytes(&payload);
        assert_eq!(streamed, direct);
    }

    #[test]
    fn equal_payloads_collide_on_purpose() {
        let a = DocId::from_bytes(b"same bytes");
        let b = DocId::from_bytes(b"same bytes");
        assert_eq!(a, b);
    }
}
