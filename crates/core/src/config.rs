//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:5000").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// SHA256 hex of the API key required for push, delete and relist.
    /// Generate with: `echo -n "your-api-key" | sha256sum`
    /// When unset, write endpoints are open.
    #[serde(default)]
    pub api_key_hash: Option<String>,
    /// Replace an existing package when the same id and version is pushed again.
    #[serde(default)]
    pub allow_package_overwrites: bool,
    /// Reject pushes. Mirroring still indexes packages.
    #[serde(default)]
    pub read_only: bool,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    /// Largest accepted push body in bytes.
    #[serde(default = "default_max_package_size_bytes")]
    pub max_package_size_bytes: usize,
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_max_package_size_bytes() -> usize {
    250 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            api_key_hash: None,
            allow_package_overwrites: false,
            read_only: false,
            metrics_enabled: default_metrics_enabled(),
            max_package_size_bytes: default_max_package_size_bytes(),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(hash) = &self.api_key_hash
            && (hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()))
        {
            return Err("server.api_key_hash must be a 64 character SHA256 hex digest".to_string());
        }
        if self.max_package_size_bytes == 0 {
            return Err("server.max_package_size_bytes cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/packages"),
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/keg.db"),
        }
    }
}

/// Upstream mirroring configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Fetch packages missing locally from the upstream feed.
    #[serde(default)]
    pub enabled: bool,
    /// Upstream feed URL. A V3 service index, or a V2 feed root when `legacy` is set.
    #[serde(default = "default_package_source")]
    pub package_source: String,
    /// Upstream speaks the legacy V2 OData protocol.
    #[serde(default)]
    pub legacy: bool,
    /// Upper bound on any single upstream request.
    #[serde(default = "default_package_download_timeout_seconds")]
    pub package_download_timeout_seconds: u64,
}

fn default_package_source() -> String {
    "https://api.nuget.org/v3/index.json".to_string()
}

fn default_package_download_timeout_seconds() -> u64 {
    600
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            package_source: default_package_source(),
            legacy: false,
            package_download_timeout_seconds: default_package_download_timeout_seconds(),
        }
    }
}

impl MirrorConfig {
    /// Timeout applied to each upstream request.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.package_download_timeout_seconds)
    }

    /// Validate mirror configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }
        let source = url::Url::parse(&self.package_source)
            .map_err(|e| format!("mirror.package_source is not a valid URL: {e}"))?;
        if source.scheme() != "http" && source.scheme() != "https" {
            return Err(format!(
                "mirror.package_source must be http or https, got {}",
                source.scheme()
            ));
        }
        if self.package_download_timeout_seconds == 0 {
            return Err("mirror.package_download_timeout_seconds cannot be 0".to_string());
        }
        Ok(())
    }
}

/// What a delete request does to a package.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeletionBehavior {
    /// Hide the package from listings and search. Content stays downloadable.
    #[default]
    Unlist,
    /// Remove metadata and content.
    HardDelete,
}

/// Deletion policy configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DeletionConfig {
    #[serde(default)]
    pub behavior: DeletionBehavior,
    /// Regex over `"{id} {version}"`. With `hard_delete`, identities that do
    /// not match are unlisted instead.
    #[serde(default)]
    pub hard_delete_allow_pattern: Option<String>,
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Upstream mirroring configuration.
    #[serde(default)]
    pub mirror: MirrorConfig,
    /// Deletion policy configuration.
    #[serde(default)]
    pub deletion: DeletionConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Mirroring is off and write endpoints need no key.
    pub fn for_testing() -> Self {
        Self::default()
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.mirror.validate()?;
        Ok(())
    }
}
