//! Upstream client for legacy NuGet V2 (OData) feeds.

use super::{MirrorClient, MirrorError, Upstream, as_base};
use async_trait::async_trait;
use bytes::Bytes;
use keg_core::{Dependency, NuGetVersion, Package, PackageId, SemVerLevel, range_is_semver2};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::collections::{BTreeSet, HashMap};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Upper bound on `next` links followed for a single package id.
const MAX_PAGES: usize = 50;

/// One page of an Atom feed.
#[derive(Debug, Default)]
struct AtomPage {
    entries: Vec<AtomEntry>,
    next: Option<String>,
}

/// Entry title plus its `m:properties` children, keyed by local name.
#[derive(Debug, Default)]
struct AtomEntry {
    title: Option<String>,
    properties: HashMap<String, String>,
}

fn invalid(e: impl std::fmt::Display) -> MirrorError {
    MirrorError::InvalidResponse(format!("malformed atom feed: {e}"))
}

fn parse_page(xml: &[u8]) -> Result<AtomPage, MirrorError> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut page = AtomPage::default();
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut entry: Option<AtomEntry> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(invalid)? {
            Event::Start(e) => {
                let name = e.local_name().as_ref().to_vec();
                if name == b"entry" {
                    entry = Some(AtomEntry::default());
                }
                path.push(name);
            }
            Event::Empty(e) => {
                // Feed-level paging link. Entry links sit one level deeper.
                if path.len() == 1 && e.local_name().as_ref() == b"link" {
                    let mut rel = None;
                    let mut href = None;
                    for a in e.attributes() {
                        let a = a.map_err(invalid)?;
                        let value = a.unescape_value().map_err(invalid)?.into_owned();
                        match a.key.local_name().as_ref() {
                            b"rel" => rel = Some(value),
                            b"href" => href = Some(value),
                            _ => {}
                        }
                    }
                    if rel.as_deref() == Some("next") {
                        page.next = href;
                    }
                }
            }
            Event::End(e) => {
                if e.local_name().as_ref() == b"entry"
                    && let Some(done) = entry.take()
                {
                    page.entries.push(done);
                }
                path.pop();
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(invalid)?.into_owned();
                if let Some(open) = entry.as_mut() {
                    match path.as_slice() {
                        [.., parent, field] if parent == b"entry" && field == b"title" => {
                            open.title = Some(text);
                        }
                        [.., parent, field] if parent == b"properties" => {
                            open.properties
                                .insert(String::from_utf8_lossy(field).into_owned(), text);
                        }
                        _ => {}
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(page)
}

/// Parse the flattened `id:range:framework|...` dependency form.
fn parse_dependencies(raw: &str) -> Vec<Dependency> {
    let non_empty = |s: Option<&str>| {
        s.map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    raw.split('|')
        .filter(|item| !item.trim().is_empty())
        .map(|item| {
            let mut parts = item.splitn(3, ':');
            let id = non_empty(parts.next());
            let version_range = non_empty(parts.next());
            let target_framework = non_empty(parts.next());
            match id {
                Some(id) => Dependency {
                    id: Some(id),
                    version_range,
                    target_framework,
                },
                None => Dependency::empty_group(target_framework),
            }
        })
        .collect()
}

/// OData timestamps are usually bare `Edm.DateTime` values in UTC.
fn parse_published(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(value);
    }
    let raw = raw.trim_end_matches('Z');
    let seconds = raw.split('.').next().unwrap_or(raw);
    PrimitiveDateTime::parse(
        seconds,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    )
    .ok()
    .map(PrimitiveDateTime::assume_utc)
}

fn parse_bool(raw: Option<&String>) -> Option<bool> {
    raw.and_then(|v| v.trim().parse::<bool>().ok())
}

impl AtomEntry {
    fn into_package(mut self) -> keg_core::Result<Package> {
        let mut take = |key: &str| {
            self.properties
                .remove(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let id = take("Id").or(self.title.take()).unwrap_or_default();
        let id = PackageId::new(id)?;
        let version = take("NormalizedVersion")
            .or_else(|| take("Version"))
            .unwrap_or_default();
        let version = NuGetVersion::parse(&version)?;

        let mut package = Package::new(id, version, take("Description").unwrap_or_default());
        package.authors = take("Authors")
            .map(|a| a.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        package.tags = take("Tags")
            .map(|t| t.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        package.summary = take("Summary");
        package.title = take("Title");
        package.icon_url = take("IconUrl");
        package.license_url = take("LicenseUrl");
        package.project_url = take("ProjectUrl");
        package.language = take("Language");
        package.release_notes = take("ReleaseNotes");
        package.copyright = take("Copyright");
        package.min_client_version = take("MinClientVersion");
        package.require_license_acceptance =
            parse_bool(take("RequireLicenseAcceptance").as_ref()).unwrap_or(false);

        let published = take("Published").and_then(|p| parse_published(&p));
        let listed = parse_bool(take("Listed").as_ref())
            .or_else(|| parse_bool(take("IsListed").as_ref()));
        if let Some(published) = published {
            package.published = published;
        }
        // V2 feeds mark unlisted packages with a 1900 publish date.
        package.listed = listed.unwrap_or(package.published.year() > 1900);

        let dependencies = take("Dependencies")
            .map(|d| parse_dependencies(&d))
            .unwrap_or_default();
        if dependencies
            .iter()
            .filter_map(|d| d.version_range.as_deref())
            .any(range_is_semver2)
        {
            package.semver_level = SemVerLevel::SemVer2;
        }
        package.target_frameworks = dependencies
            .iter()
            .filter_map(|d| d.target_framework.as_deref())
            .map(str::to_ascii_lowercase)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        package.dependencies = dependencies;

        Ok(package)
    }
}

/// Mirrors a V2 feed through `FindPackagesById()` and the package download route.
pub struct V2MirrorClient {
    upstream: Upstream,
    root: Url,
}

impl V2MirrorClient {
    pub fn new(upstream: Upstream, root: Url) -> Self {
        Self {
            upstream,
            root: as_base(root),
        }
    }

    fn find_by_id_url(&self, id: &PackageId) -> Result<Url, MirrorError> {
        let mut url = self.root.join("FindPackagesById()")?;
        url.query_pairs_mut()
            .append_pair("id", &format!("'{id}'"))
            .append_pair("semVerLevel", "2.0.0");
        Ok(url)
    }
}

#[async_trait]
impl MirrorClient for V2MirrorClient {
    async fn list_versions(
        &self,
        id: &PackageId,
        cancel: &CancellationToken,
    ) -> Result<Vec<NuGetVersion>, MirrorError> {
        let mut versions: Vec<NuGetVersion> = self
            .list_metadata(id, cancel)
            .await?
            .into_iter()
            .map(|p| p.version)
            .collect();
        versions.dedup();
        Ok(versions)
    }

    async fn list_metadata(
        &self,
        id: &PackageId,
        cancel: &CancellationToken,
    ) -> Result<Vec<Package>, MirrorError> {
        let mut packages = Vec::new();
        let mut next = Some(self.find_by_id_url(id)?);
        let mut pages = 0;

        while let Some(url) = next.take() {
            pages += 1;
            if pages > MAX_PAGES {
                tracing::warn!(package_id = %id, "Stopped following upstream feed pages");
                break;
            }
            let Some(body) = self.upstream.get_bytes(url, cancel).await? else {
                break;
            };
            let page = parse_page(&body)?;
            next = page.next.as_deref().map(Url::parse).transpose()?;

            for entry in page.entries {
                match entry.into_package() {
                    // FindPackagesById matches case-insensitively; guard against loose servers.
                    Ok(package) if package.id == *id => packages.push(package),
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(
                            package_id = %id,
                            error = %e,
                            "Skipping unreadable feed entry"
                        );
                    }
                }
            }
        }

        packages.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(packages)
    }

    async fn download_package(
        &self,
        id: &PackageId,
        version: &NuGetVersion,
        cancel: &CancellationToken,
    ) -> Result<Option<Bytes>, MirrorError> {
        let url = self
            .root
            .join(&format!("package/{id}/{}", version.normalized()))?;
        self.upstream.get_bytes(url, cancel).await
    }
}
