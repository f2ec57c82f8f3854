//! Test fixtures for building package archives.

use bytes::Bytes;
use keg_core::{NuGetVersion, PackageId};
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;

/// Builder for an in-memory `.nupkg`.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct NupkgBuilder {
    pub id: String,
    pub version: String,
    pub description: String,
    pub authors: String,
    pub tags: Option<String>,
    pub readme: Option<String>,
    pub icon: Option<Vec<u8>>,
    pub dependencies: Vec<(String, String)>,
}

#[allow(dead_code)]
impl NupkgBuilder {
    pub fn new(id: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            version: version.to_string(),
            description: format!("{id} test package"),
            authors: "Test Author".to_string(),
            tags: None,
            readme: None,
            icon: None,
            dependencies: Vec::new(),
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn tags(mut self, tags: &str) -> Self {
        self.tags = Some(tags.to_string());
        self
    }

    pub fn readme(mut self, readme: &str) -> Self {
        self.readme = Some(readme.to_string());
        self
    }

    pub fn icon(mut self, icon: &[u8]) -> Self {
        self.icon = Some(icon.to_vec());
        self
    }

    pub fn dependency(mut self, id: &str, range: &str) -> Self {
        self.dependencies.push((id.to_string(), range.to_string()));
        self
    }

    fn nuspec(&self) -> String {
        let mut metadata = format!(
            "<id>{}</id><version>{}</version><authors>{}</authors><description>{}</description>",
            self.id, self.version, self.authors, self.description
        );
        if let Some(tags) = &self.tags {
            metadata.push_str(&format!("<tags>{tags}</tags>"));
        }
        if self.readme.is_some() {
            metadata.push_str("<readme>README.md</readme>");
        }
        if self.icon.is_some() {
            metadata.push_str("<icon>icon.png</icon>");
        }
        if !self.dependencies.is_empty() {
            metadata.push_str("<dependencies><group targetFramework=\"net8.0\">");
            for (id, range) in &self.dependencies {
                metadata.push_str(&format!("<dependency id=\"{id}\" version=\"{range}\" />"));
            }
            metadata.push_str("</group></dependencies>");
        }
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
             <package xmlns=\"http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd\">\
             <metadata>{metadata}</metadata></package>"
        )
    }

    pub fn build(&self) -> Bytes {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();

        writer
            .start_file(format!("{}.nuspec", self.id), options)
            .unwrap();
        writer.write_all(self.nuspec().as_bytes()).unwrap();

        writer.start_file("lib/net8.0/Library.dll", options).unwrap();
        writer.write_all(b"not really a dll").unwrap();

        if let Some(readme) = &self.readme {
            writer.start_file("README.md", options).unwrap();
            writer.write_all(readme.as_bytes()).unwrap();
        }
        if let Some(icon) = &self.icon {
            writer.start_file("icon.png", options).unwrap();
            writer.write_all(icon).unwrap();
        }

        Bytes::from(writer.finish().unwrap().into_inner())
    }
}

/// A minimal valid package.
#[allow(dead_code)]
pub fn nupkg(id: &str, version: &str) -> Bytes {
    NupkgBuilder::new(id, version).build()
}

#[allow(dead_code)]
pub fn identity(id: &str, version: &str) -> (PackageId, NuGetVersion) {
    (
        PackageId::new(id).unwrap(),
        NuGetVersion::parse(version).unwrap(),
    )
}
