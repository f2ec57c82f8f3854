//! NuGet version parsing, normalization and ordering.
//!
//! NuGet versions are SemVer 2.0 with two extensions: an optional fourth
//! numeric component (`revision`) and a relaxed parser that accepts one to
//! four numeric components. Build metadata never participates in identity.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A parsed NuGet package version.
#[derive(Clone)]
pub struct NuGetVersion {
    major: u64,
    minor: u64,
    patch: u64,
    revision: u64,
    release_labels: Vec<String>,
    metadata: Option<String>,
    original: String,
}

fn is_label_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-'
}

fn parse_labels(input: &str, what: &str, original: &str) -> crate::Result<Vec<String>> {
    let labels: Vec<String> = input.split('.').map(str::to_string).collect();
    for label in &labels {
        if label.is_empty() || !label.chars().all(is_label_char) {
            return Err(crate::Error::InvalidVersion(format!(
                "invalid {what} label in {original:?}"
            )));
        }
    }
    Ok(labels)
}

/// `01` and `1` compare equal, so numeric release labels keep one spelling.
fn trim_numeric_label(label: String) -> String {
    if label.len() > 1 && label.bytes().all(|b| b.is_ascii_digit()) {
        let trimmed = label.trim_start_matches('0');
        if trimmed.is_empty() {
            "0".to_string()
        } else {
            trimmed.to_string()
        }
    } else {
        label
    }
}

impl NuGetVersion {
    /// Parse a version string.
    pub fn parse(input: &str) -> crate::Result<Self> {
        if input.is_empty() {
            return Err(crate::Error::InvalidVersion(
                "version cannot be empty".to_string(),
            ));
        }
        if input.trim() != input {
            return Err(crate::Error::InvalidVersion(format!(
                "version has surrounding whitespace: {input:?}"
            )));
        }

        let (rest, metadata) = match input.split_once('+') {
            Some((rest, metadata)) => {
                parse_labels(metadata, "metadata", input)?;
                (rest, Some(metadata.to_string()))
            }
            None => (input, None),
        };

        let (numbers, release) = match rest.split_once('-') {
            Some((numbers, release)) => (numbers, Some(release)),
            None => (rest, None),
        };

        let parts: Vec<&str> = numbers.split('.').collect();
        if parts.len() > 4 {
            return Err(crate::Error::InvalidVersion(format!(
                "too many numeric components in {input:?}"
            )));
        }

        let mut components = [0u64; 4];
        for (slot, part) in components.iter_mut().zip(&parts) {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(crate::Error::InvalidVersion(format!(
                    "non-numeric component {part:?} in {input:?}"
                )));
            }
            *slot = part.parse().map_err(|_| {
                crate::Error::InvalidVersion(format!("component {part:?} overflows in {input:?}"))
            })?;
        }

        let release_labels = match release {
            Some(release) => parse_labels(release, "release", input)?
                .into_iter()
                .map(trim_numeric_label)
                .collect(),
            None => Vec::new(),
        };

        Ok(Self {
            major: components[0],
            minor: components[1],
            patch: components[2],
            revision: components[3],
            release_labels,
            metadata,
            original: input.to_string(),
        })
    }

    /// Create a release version from numeric components.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            revision: 0,
            release_labels: Vec::new(),
            metadata: None,
            original: format!("{major}.{minor}.{patch}"),
        }
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn patch(&self) -> u64 {
        self.patch
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn release_labels(&self) -> &[String] {
        &self.release_labels
    }

    pub fn metadata(&self) -> Option<&str> {
        self.metadata.as_deref()
    }

    /// The string this version was parsed from.
    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn is_prerelease(&self) -> bool {
        !self.release_labels.is_empty()
    }

    /// SemVer 2.0 versions carry build metadata or a dotted release label.
    pub fn is_semver2(&self) -> bool {
        self.metadata.is_some() || self.release_labels.len() > 1
    }

    /// Normalized form: no leading zeros, no metadata, revision only when non-zero.
    pub fn normalized(&self) -> String {
        let mut out = format!("{}.{}.{}", self.major, self.minor, self.patch);
        if self.revision > 0 {
            out.push_str(&format!(".{}", self.revision));
        }
        if !self.release_labels.is_empty() {
            out.push('-');
            out.push_str(&self.release_labels.join("."));
        }
        out
    }

    /// Normalized form plus build metadata.
    pub fn full(&self) -> String {
        match &self.metadata {
            Some(metadata) => format!("{}+{}", self.normalized(), metadata),
            None => self.normalized(),
        }
    }

    /// Lowercase normalized form used for storage keys and URLs.
    pub fn lower(&self) -> String {
        self.normalized().to_ascii_lowercase()
    }
}

fn compare_label(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a
            .bytes()
            .map(|c| c.to_ascii_lowercase())
            .cmp(b.bytes().map(|c| c.to_ascii_lowercase())),
    }
}

fn compare_release_labels(a: &[String], b: &[String]) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }
    for (x, y) in a.iter().zip(b) {
        let ord = compare_label(x, y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

impl Ord for NuGetVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch, self.revision)
            .cmp(&(other.major, other.minor, other.patch, other.revision))
            .then_with(|| compare_release_labels(&self.release_labels, &other.release_labels))
    }
}

impl PartialOrd for NuGetVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for NuGetVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for NuGetVersion {}

impl Hash for NuGetVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.major, self.minor, self.patch, self.revision).hash(state);
        for label in &self.release_labels {
            // Numeric labels compare by value, so "01" and "1" must hash alike.
            match label.parse::<u64>() {
                Ok(n) => n.hash(state),
                Err(_) => label.to_ascii_lowercase().hash(state),
            }
        }
    }
}

impl fmt::Debug for NuGetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NuGetVersion({})", self.full())
    }
}

impl fmt::Display for NuGetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full())
    }
}

impl FromStr for NuGetVersion {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for NuGetVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.full())
    }
}

impl<'de> Deserialize<'de> for NuGetVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Whether a dependency version range references a SemVer 2.0 version.
///
/// Accepts both bare versions (`1.0.0`) and interval notation (`[1.0, 2.0)`).
/// Unparsable bounds are ignored.
pub fn range_is_semver2(range: &str) -> bool {
    range
        .trim()
        .trim_start_matches(['[', '('])
        .trim_end_matches([']', ')'])
        .split(',')
        .map(str::trim)
        .filter(|bound| !bound.is_empty())
        .filter_map(|bound| NuGetVersion::parse(bound).ok())
        .any(|v| v.is_semver2())
}
