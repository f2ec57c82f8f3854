//! Hash types for package content and API keys.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;

/// SHA-512 digest of a `.nupkg` archive, as published in registration metadata.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PackageHash([u8; 64]);

impl PackageHash {
    /// Algorithm name reported alongside the hash.
    pub const ALGORITHM: &'static str = "SHA512";

    /// Compute the hash of a package archive.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha512::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Parse from base64 string.
    pub fn from_base64(s: &str) -> crate::Result<Self> {
        use base64::Engine;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(|e| crate::Error::InvalidHash(e.to_string()))?;
        let arr: [u8; 64] = bytes.as_slice().try_into().map_err(|_| {
            crate::Error::InvalidHash(format!("expected 64 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(arr))
    }

    /// Encode as base64 string.
    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }
}

impl fmt::Debug for PackageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PackageHash({})", &self.to_base64()[..16])
    }
}

impl fmt::Display for PackageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

impl Serialize for PackageHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PackageHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_base64(&s).map_err(serde::de::Error::custom)
    }
}

/// Lowercase hex SHA-256 of an API key, the form stored in configuration.
pub fn api_key_hash(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_hash_base64_roundtrip() {
        let hash = PackageHash::compute(b"nupkg bytes");
        let parsed = PackageHash::from_base64(&hash.to_base64()).unwrap();
        assert_eq!(hash, parsed);
    }

    #[test]
    fn test_package_hash_rejects_wrong_length() {
        assert!(PackageHash::from_base64("aGVsbG8=").is_err());
    }

    #[test]
    fn test_api_key_hash_is_sha256_hex() {
        // SHA256 of "test-api-key"
        assert_eq!(
            api_key_hash("test-api-key"),
            "4c806362b613f7496abf284146efd31da90e4b16169fe001841ca17290f427c4"
        );
    }
}
