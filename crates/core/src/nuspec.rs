//! `.nuspec` manifest parsing.
//!
//! Only the `package/metadata` subtree is read. Namespaces are ignored since
//! nuspec files in the wild use several schema revisions.

use crate::error::{Error, Result};
use crate::package::{Dependency, PackageType};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

/// Fields read from a nuspec manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Nuspec {
    pub id: String,
    pub version: String,
    pub authors: Vec<String>,
    pub description: String,
    pub summary: Option<String>,
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub icon_url: Option<String>,
    /// Path of the embedded icon inside the archive.
    pub icon: Option<String>,
    /// Path of the embedded readme inside the archive.
    pub readme: Option<String>,
    pub license_url: Option<String>,
    pub project_url: Option<String>,
    pub repository_url: Option<String>,
    pub repository_type: Option<String>,
    pub release_notes: Option<String>,
    pub language: Option<String>,
    pub copyright: Option<String>,
    pub min_client_version: Option<String>,
    pub require_license_acceptance: bool,
    pub dependencies: Vec<Dependency>,
    pub package_types: Vec<PackageType>,
}

/// Open dependency group while parsing.
struct Group {
    target_framework: Option<String>,
    has_dependencies: bool,
}

fn attr(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>> {
    for a in e.attributes() {
        let a = a.map_err(|err| Error::InvalidNuspec(err.to_string()))?;
        if a.key.local_name().as_ref() == name {
            let value = a
                .unescape_value()
                .map_err(|err| Error::InvalidNuspec(err.to_string()))?;
            let value = value.trim();
            return Ok((!value.is_empty()).then(|| value.to_string()));
        }
    }
    Ok(None)
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

impl Nuspec {
    /// Parse a nuspec document.
    pub fn parse(xml: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(xml);
        reader.trim_text(true);

        let mut nuspec = Nuspec::default();
        let mut path: Vec<Vec<u8>> = Vec::new();
        let mut group: Option<Group> = None;
        let mut saw_metadata = false;
        let mut buf = Vec::new();

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| Error::InvalidNuspec(format!("malformed xml: {e}")))?;

            match event {
                Event::Start(e) => {
                    let name = e.local_name().as_ref().to_vec();
                    nuspec.on_element(&e, &path, &mut group, false)?;
                    if path.len() == 1 && name == b"metadata" {
                        saw_metadata = true;
                    }
                    path.push(name);
                }
                Event::Empty(e) => {
                    nuspec.on_element(&e, &path, &mut group, true)?;
                }
                Event::End(e) => {
                    if e.local_name().as_ref() == b"group"
                        && let Some(open) = group.take()
                        && !open.has_dependencies
                    {
                        nuspec
                            .dependencies
                            .push(Dependency::empty_group(open.target_framework));
                    }
                    path.pop();
                }
                Event::Text(t) => {
                    let text = t
                        .unescape()
                        .map_err(|e| Error::InvalidNuspec(e.to_string()))?
                        .into_owned();
                    nuspec.on_text(&path, text);
                }
                Event::CData(c) => {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    nuspec.on_text(&path, text);
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !saw_metadata {
            return Err(Error::InvalidNuspec(
                "missing package/metadata element".to_string(),
            ));
        }
        for (field, value) in [
            ("id", &nuspec.id),
            ("version", &nuspec.version),
            ("description", &nuspec.description),
        ] {
            if value.is_empty() {
                return Err(Error::InvalidNuspec(format!("missing required element {field}")));
            }
        }
        if nuspec.authors.is_empty() {
            return Err(Error::InvalidNuspec(
                "missing required element authors".to_string(),
            ));
        }

        Ok(nuspec)
    }

    fn on_element(
        &mut self,
        e: &BytesStart<'_>,
        path: &[Vec<u8>],
        group: &mut Option<Group>,
        empty: bool,
    ) -> Result<()> {
        let name = e.local_name();
        let parent = path.last().map(Vec::as_slice);

        match (parent, name.as_ref()) {
            (Some(b"package"), b"metadata") => {
                self.min_client_version = attr(e, b"minClientVersion")?;
            }
            (Some(b"metadata"), b"repository") => {
                self.repository_url = attr(e, b"url")?;
                self.repository_type = attr(e, b"type")?;
            }
            (Some(b"dependencies"), b"group") => {
                let target_framework = attr(e, b"targetFramework")?;
                if empty {
                    self.dependencies.push(Dependency::empty_group(target_framework));
                } else {
                    *group = Some(Group {
                        target_framework,
                        has_dependencies: false,
                    });
                }
            }
            (Some(b"group" | b"dependencies"), b"dependency") => {
                let target_framework = match group.as_mut() {
                    Some(open) => {
                        open.has_dependencies = true;
                        open.target_framework.clone()
                    }
                    None => None,
                };
                self.dependencies.push(Dependency {
                    id: attr(e, b"id")?,
                    version_range: attr(e, b"version")?,
                    target_framework,
                });
            }
            (Some(b"packageTypes"), b"packageType") => {
                if let Some(type_name) = attr(e, b"name")? {
                    self.package_types.push(PackageType {
                        name: type_name,
                        version: attr(e, b"version")?,
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn on_text(&mut self, path: &[Vec<u8>], text: String) {
        let [package, metadata, field] = path else {
            return;
        };
        if package.as_slice() != b"package" || metadata.as_slice() != b"metadata" {
            return;
        }
        let text = text.trim().to_string();

        match field.as_slice() {
            b"id" => self.id = text,
            b"version" => self.version = text,
            b"authors" => {
                self.authors = text
                    .split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            b"description" => self.description = text,
            b"summary" => self.summary = non_empty(text),
            b"title" => self.title = non_empty(text),
            b"tags" => {
                self.tags = text
                    .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            b"iconUrl" => self.icon_url = non_empty(text),
            b"icon" => self.icon = non_empty(text),
            b"readme" => self.readme = non_empty(text),
            b"licenseUrl" => self.license_url = non_empty(text),
            b"projectUrl" => self.project_url = non_empty(text),
            b"releaseNotes" => self.release_notes = non_empty(text),
            b"language" => self.language = non_empty(text),
            b"copyright" => self.copyright = non_empty(text),
            b"requireLicenseAcceptance" => {
                self.require_license_acceptance = text.eq_ignore_ascii_case("true");
            }
            _ => {}
        }
    }
}
