//! Reading `.nupkg` archives.

use crate::error::{Error, Result};
use crate::hash::PackageHash;
use crate::id::PackageId;
use crate::nuspec::Nuspec;
use crate::package::{Package, SemVerLevel};
use crate::version::{NuGetVersion, range_is_semver2};
use bytes::Bytes;
use std::collections::BTreeSet;
use std::io::{Cursor, Read};
use time::OffsetDateTime;
use zip::ZipArchive;

/// Largest nuspec accepted, uncompressed.
pub const MAX_NUSPEC_BYTES: u64 = 4 * 1024 * 1024;
/// Largest embedded readme accepted, uncompressed.
pub const MAX_README_BYTES: u64 = 1024 * 1024;
/// Largest embedded icon accepted, uncompressed.
pub const MAX_ICON_BYTES: u64 = 1024 * 1024;

/// Folders whose immediate children name a target framework.
const FRAMEWORK_FOLDERS: &[&str] = &["lib", "ref", "build", "buildtransitive", "runtimes"];

/// A parsed package archive and the blobs extracted from it.
#[derive(Debug, Clone)]
pub struct PackageArchive {
    pub package: Package,
    pub nuspec: Bytes,
    pub readme: Option<Bytes>,
    pub icon: Option<Bytes>,
}

fn zip_error(e: zip::result::ZipError) -> Error {
    Error::InvalidPackage(format!("corrupt archive: {e}"))
}

/// Read one entry, failing once it inflates past `limit` bytes.
///
/// The size declared in the archive is only used to reject early.
fn read_entry<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    index: usize,
    limit: u64,
) -> Result<Bytes> {
    let mut file = archive.by_index(index).map_err(zip_error)?;
    let name = file.name().to_string();
    let too_large = || Error::InvalidPackage(format!("{name} is larger than {limit} bytes"));
    if file.size() > limit {
        return Err(too_large());
    }

    let mut buf = Vec::new();
    file.by_ref()
        .take(limit + 1)
        .read_to_end(&mut buf)
        .map_err(|e| Error::InvalidPackage(format!("failed to read {name}: {e}")))?;
    if buf.len() as u64 > limit {
        return Err(too_large());
    }
    Ok(Bytes::from(buf))
}

/// Find an entry by a path written in the nuspec, which may use backslashes.
fn find_entry(names: &[String], wanted: &str) -> Option<usize> {
    let wanted = wanted.replace('\\', "/");
    let wanted = wanted.trim_start_matches("./").trim_start_matches('/');
    names.iter().position(|n| n.eq_ignore_ascii_case(wanted))
}

/// Target framework named by an entry path, if any.
fn entry_framework(name: &str) -> Option<String> {
    let segments: Vec<&str> = name.split('/').collect();
    let folder = segments.first()?.to_ascii_lowercase();

    let framework = if folder == "contentfiles" && segments.len() > 3 {
        segments[2]
    } else if FRAMEWORK_FOLDERS.contains(&folder.as_str()) && segments.len() > 2 {
        if folder == "runtimes" {
            // runtimes/{rid}/lib/{tfm}/...
            if segments.len() > 4 && segments[2].eq_ignore_ascii_case("lib") {
                segments[3]
            } else {
                return None;
            }
        } else {
            segments[1]
        }
    } else {
        return None;
    };

    if framework.is_empty() || framework.eq_ignore_ascii_case("any") {
        return None;
    }
    Some(framework.to_ascii_lowercase())
}

impl PackageArchive {
    /// Open a package archive from its raw bytes.
    pub fn open(data: &[u8]) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(data)).map_err(zip_error)?;
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();

        let mut nuspecs = names
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.contains('/') && n.to_ascii_lowercase().ends_with(".nuspec"));
        let nuspec_index = match (nuspecs.next(), nuspecs.next()) {
            (Some((i, _)), None) => i,
            (None, _) => {
                return Err(Error::InvalidPackage(
                    "archive has no .nuspec at its root".to_string(),
                ));
            }
            (Some(_), Some(_)) => {
                return Err(Error::InvalidPackage(
                    "archive has more than one .nuspec at its root".to_string(),
                ));
            }
        };

        let nuspec_bytes = read_entry(&mut archive, nuspec_index, MAX_NUSPEC_BYTES)?;
        let nuspec = Nuspec::parse(&nuspec_bytes)?;

        let id = PackageId::new(nuspec.id.clone())?;
        let version = NuGetVersion::parse(&nuspec.version)?;

        let readme = match nuspec.readme.as_deref() {
            Some(path) => {
                let index = find_entry(&names, path).ok_or_else(|| {
                    Error::InvalidPackage(format!("readme {path} named in nuspec is missing"))
                })?;
                Some(read_entry(&mut archive, index, MAX_README_BYTES)?)
            }
            None => None,
        };
        let icon = match nuspec.icon.as_deref() {
            Some(path) => {
                let index = find_entry(&names, path).ok_or_else(|| {
                    Error::InvalidPackage(format!("icon {path} named in nuspec is missing"))
                })?;
                Some(read_entry(&mut archive, index, MAX_ICON_BYTES)?)
            }
            None => None,
        };

        let mut frameworks: BTreeSet<String> =
            names.iter().filter_map(|n| entry_framework(n)).collect();
        frameworks.extend(
            nuspec
                .dependencies
                .iter()
                .filter_map(|d| d.target_framework.as_deref())
                .map(str::to_ascii_lowercase),
        );

        let semver2 = version.is_semver2()
            || nuspec
                .dependencies
                .iter()
                .filter_map(|d| d.version_range.as_deref())
                .any(range_is_semver2);

        let package = Package {
            id,
            version,
            authors: nuspec.authors,
            description: nuspec.description,
            summary: nuspec.summary,
            title: nuspec.title,
            tags: nuspec.tags,
            icon_url: nuspec.icon_url,
            license_url: nuspec.license_url,
            project_url: nuspec.project_url,
            repository_url: nuspec.repository_url,
            repository_type: nuspec.repository_type,
            language: nuspec.language,
            release_notes: nuspec.release_notes,
            copyright: nuspec.copyright,
            min_client_version: nuspec.min_client_version,
            require_license_acceptance: nuspec.require_license_acceptance,
            has_readme: readme.is_some(),
            has_embedded_icon: icon.is_some(),
            listed: true,
            downloads: 0,
            published: OffsetDateTime::now_utc(),
            semver_level: if semver2 {
                SemVerLevel::SemVer2
            } else {
                SemVerLevel::Unknown
            },
            package_hash: Some(PackageHash::compute(data)),
            dependencies: nuspec.dependencies,
            package_types: nuspec.package_types,
            target_frameworks: frameworks.into_iter().collect(),
        };

        Ok(Self {
            package,
            nuspec: nuspec_bytes,
            readme,
            icon,
        })
    }
}
