//! Builders for catalog documents and package archives.

use flate2::Compression;
use flate2::write::GzEncoder;
use md5::{Digest, Md5};
use std::io::{Cursor, Write};

/// Escapes text for use inside an XML element.
fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn element(out: &mut String, indent: &str, name: &str, value: &str) {
    out.push_str(&format!("{indent}<{name}>{}</{name}>\n", escape(value)));
}

/// Builder for one `<package>` entry.
///
/// `name` and `dir` default to the id.
#[derive(Debug, Clone)]
pub struct PackageXml {
    id: String,
    name: String,
    description: Option<String>,
    dir: String,
    revision: Option<u32>,
    md5: Option<String>,
    urls: Vec<String>,
    tags: Vec<String>,
    variants: Vec<(String, String)>,
    depends: Vec<(String, u32)>,
    archive_path: Option<String>,
    ratings: Vec<(String, u32)>,
    localized: Vec<(String, String)>,
}

impl PackageXml {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            description: None,
            dir: id.to_string(),
            revision: None,
            md5: None,
            urls: Vec::new(),
            tags: Vec::new(),
            variants: Vec::new(),
            depends: Vec::new(),
            archive_path: None,
            ratings: Vec::new(),
            localized: Vec::new(),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Install directory name; an empty string omits the element.
    pub fn dir(mut self, dir: &str) -> Self {
        self.dir = dir.to_string();
        self
    }

    pub fn revision(mut self, revision: u32) -> Self {
        self.revision = Some(revision);
        self
    }

    pub fn md5(mut self, md5: &str) -> Self {
        self.md5 = Some(md5.to_string());
        self
    }

    /// Adds a mirror.
    pub fn url(mut self, url: &str) -> Self {
        self.urls.push(url.to_string());
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    pub fn variant(mut self, id: &str, name: &str) -> Self {
        self.variants.push((id.to_string(), name.to_string()));
        self
    }

    pub fn depends(mut self, id: &str, revision: u32) -> Self {
        self.depends.push((id.to_string(), revision));
        self
    }

    pub fn archive_path(mut self, path: &str) -> Self {
        self.archive_path = Some(path.to_string());
        self
    }

    pub fn rating(mut self, name: &str, value: u32) -> Self {
        self.ratings.push((name.to_string(), value));
        self
    }

    /// Adds a localized name for `locale`.
    pub fn localized_name(mut self, locale: &str, name: &str) -> Self {
        self.localized.push((locale.to_string(), name.to_string()));
        self
    }

    /// Sets the checksum to the MD5 of `archive`.
    pub fn archive(self, archive: &[u8]) -> Self {
        let md5 = md5_hex(archive);
        self.md5(&md5)
    }

    fn write(&self, out: &mut String) {
        out.push_str("  <package>\n");
        let indent = "    ";
        element(out, indent, "id", &self.id);
        if !self.name.is_empty() {
            element(out, indent, "name", &self.name);
        }
        if let Some(description) = &self.description {
            element(out, indent, "description", description);
        }
        if !self.dir.is_empty() {
            element(out, indent, "dir", &self.dir);
        }
        if let Some(revision) = self.revision {
            out.push_str(&format!("{indent}<revision type=\"int\">{revision}</revision>\n"));
        }
        if let Some(md5) = &self.md5 {
            element(out, indent, "md5", md5);
        }
        for url in &self.urls {
            element(out, indent, "url", url);
        }
        if let Some(path) = &self.archive_path {
            element(out, indent, "archive-path", path);
        }
        if !self.tags.is_empty() {
            out.push_str(&format!("{indent}<tags>\n"));
            for tag in &self.tags {
                element(out, "      ", "tag", tag);
            }
            out.push_str(&format!("{indent}</tags>\n"));
        }
        if !self.ratings.is_empty() {
            out.push_str(&format!("{indent}<rating>\n"));
            for (name, value) in &self.ratings {
                element(out, "      ", name, &value.to_string());
            }
            out.push_str(&format!("{indent}</rating>\n"));
        }
        for (locale, name) in &self.localized {
            out.push_str(&format!("{indent}<{locale}><name>{}</name></{locale}>\n", escape(name)));
        }
        for (id, name) in &self.variants {
            out.push_str(&format!(
                "{indent}<variant><id>{}</id><name>{}</name></variant>\n",
                escape(id),
                escape(name)
            ));
        }
        for (id, revision) in &self.depends {
            out.push_str(&format!(
                "{indent}<depends><id>{}</id><revision>{revision}</revision></depends>\n",
                escape(id)
            ));
        }
        out.push_str("  </package>\n");
    }
}

/// Builder for a catalog document.
#[derive(Debug, Clone)]
pub struct CatalogXml {
    id: String,
    url: Option<String>,
    versions: Vec<String>,
    max_age: Option<u64>,
    alternates: Vec<(String, String, Option<String>)>,
    packages: Vec<PackageXml>,
}

impl CatalogXml {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            url: None,
            versions: Vec::new(),
            max_age: None,
            alternates: Vec::new(),
            packages: Vec::new(),
        }
    }

    pub fn url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    /// Adds a supported application version pattern.
    pub fn version(mut self, pattern: &str) -> Self {
        self.versions.push(pattern.to_string());
        self
    }

    pub fn max_age(mut self, secs: u64) -> Self {
        self.max_age = Some(secs);
        self
    }

    /// Adds an `<alternate-version>` for application versions matching `versions`.
    pub fn alternate(mut self, versions: &str, url: &str, id: Option<&str>) -> Self {
        self.alternates.push((versions.to_string(), url.to_string(), id.map(str::to_string)));
        self
    }

    pub fn package(mut self, package: PackageXml) -> Self {
        self.packages.push(package);
        self
    }

    pub fn build(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\"?>\n<PropertyList>\n");
        element(&mut out, "  ", "id", &self.id);
        if let Some(url) = &self.url {
            element(&mut out, "  ", "url", url);
        }
        if let Some(secs) = self.max_age {
            element(&mut out, "  ", "max-age-sec", &secs.to_string());
        }
        for version in &self.versions {
            element(&mut out, "  ", "version", version);
        }
        for (versions, url, id) in &self.alternates {
            out.push_str("  <alternate-version>\n");
            element(&mut out, "    ", "version", versions);
            element(&mut out, "    ", "url", url);
            if let Some(id) = id {
                element(&mut out, "    ", "id", id);
            }
            out.push_str("  </alternate-version>\n");
        }
        for package in &self.packages {
            package.write(&mut out);
        }
        out.push_str("</PropertyList>\n");
        out
    }
}

/// Lowercase hex MD5 of `bytes`.
pub fn md5_hex(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

/// A ustar/GNU tar archive holding `files`.
pub fn plain_tar(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, path, *data).expect("append tar entry");
    }
    builder.into_inner().expect("finish tar archive")
}

/// A gzip-compressed tar archive holding `files`.
pub fn tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&plain_tar(files)).expect("compress tar archive");
    encoder.finish().expect("finish gzip stream")
}

/// A zip archive holding `files`.
pub fn zip_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (path, data) in files {
        writer.start_file(*path, options).expect("start zip entry");
        writer.write_all(data).expect("write zip entry");
    }
    writer.finish().expect("finish zip archive").into_inner()
}
