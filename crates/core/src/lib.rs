//! Core domain types for the keg NuGet feed.
//!
//! This crate defines the data model shared by every other crate:
//! - Package identity (`PackageId`, `NuGetVersion`)
//! - Package metadata and dependency records
//! - `.nupkg` archive and `.nuspec` manifest reading
//! - Configuration

pub mod archive;
pub mod config;
pub mod error;
pub mod hash;
pub mod id;
pub mod nuspec;
pub mod package;
pub mod version;

pub use archive::PackageArchive;
pub use error::{Error, Result};
pub use hash::{PackageHash, api_key_hash};
pub use id::PackageId;
pub use nuspec::Nuspec;
pub use package::{Dependency, Package, PackageType, SemVerLevel};
pub use version::{NuGetVersion, range_is_semver2};
