//! Package identifiers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Maximum length of a package id.
pub const MAX_PACKAGE_ID_LENGTH: usize = 100;

/// A package id such as `Newtonsoft.Json`.
///
/// Comparison, ordering and hashing ignore ASCII case. The casing supplied
/// at creation is kept for display.
#[derive(Clone)]
pub struct PackageId(String);

impl PackageId {
    /// Create from a string, validating format.
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(crate::Error::InvalidPackageId(
                "package id cannot be empty".to_string(),
            ));
        }
        if id.len() > MAX_PACKAGE_ID_LENGTH {
            return Err(crate::Error::InvalidPackageId(format!(
                "package id exceeds {MAX_PACKAGE_ID_LENGTH} characters: {id}"
            )));
        }

        let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
        let is_separator = |c: char| c == '.' || c == '-';

        let mut previous_separator = true;
        for c in id.chars() {
            if is_word(c) {
                previous_separator = false;
            } else if is_separator(c) {
                // Separators may not lead or repeat.
                if previous_separator {
                    return Err(crate::Error::InvalidPackageId(format!(
                        "misplaced separator in package id: {id}"
                    )));
                }
                previous_separator = true;
            } else {
                return Err(crate::Error::InvalidPackageId(format!(
                    "invalid character in package id: {c}"
                )));
            }
        }
        if previous_separator {
            return Err(crate::Error::InvalidPackageId(format!(
                "package id cannot end with a separator: {id}"
            )));
        }

        Ok(Self(id))
    }

    /// Get the id as given.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase form used for storage keys and URLs.
    pub fn lower(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl PartialEq for PackageId {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for PackageId {}

impl Hash for PackageId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.0.bytes() {
            state.write_u8(b.to_ascii_lowercase());
        }
    }
}

impl PartialOrd for PackageId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .bytes()
            .map(|b| b.to_ascii_lowercase())
            .cmp(other.0.bytes().map(|b| b.to_ascii_lowercase()))
    }
}

impl fmt::Debug for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PackageId({})", self.0)
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PackageId {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::new(s)
    }
}

impl Serialize for PackageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PackageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}
