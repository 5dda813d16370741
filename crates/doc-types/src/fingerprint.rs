use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A 256-bit content fingerprint, combining the raw bytes with declared
/// size/mtime metadata when available. Deterministic and stable under
/// whitespace-preserving I/O (the hash is over the bytes actually read, not
/// over a re-encoded form).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(#[serde(with = "hex_bytes")] pub [u8; 32]);

impl Fingerprint {
    pub fn of(content: &[u8], declared_size: Option<u64>, declared_mtime: Option<i64>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);
        if let Some(size) = declared_size {
            hasher.update(b"\0size:");
            hasher.update(size.to_le_bytes());
        }
        if let Some(mtime) = declared_mtime {
            hasher.update(b"\0mtime:");
            hasher.update(mtime.to_le_bytes());
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Fingerprint(bytes)
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let v = hex::decode(&s).map_err(serde::de::Error::custom)?;
        v.try_into().map_err(|_| serde::de::Error::custom("fingerprint must be 32 bytes"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn deterministic() {
        let a = Fingerprint::of(b"hello world", Some(11), None);
        let b = Fingerprint::of(b"hello world", Some(11), None);
        assert_eq!(a, b);
    }

    #[test]
    fn content_change_changes_fingerprint() {
        let a = Fingerprint::of(b"hello world", None, None);
        let b = Fingerprint::of(b"hello worlD", None, None);
        assert_ne!(a, b);
    }

    #[test]
    fn metadata_affects_fingerprint() {
        let a = Fingerprint::of(b"hello world", Some(11), None);
        let b = Fingerprint::of(b"hello world", Some(12), None);
        assert_ne!(a, b);
    }
}
