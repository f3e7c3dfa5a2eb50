//! A single installable package as declared by its catalog.

use super::filter::{Filter, MatchContext};
use crate::core::{PkgError, Result};
use crate::metadata::{DependencySpec, LocalizedText, PackageDocument, VariantDocument};
use crate::utils::fs::is_plain_relative;
use std::collections::BTreeMap;
use std::path::Path;

/// A package entry owned by a [`Catalog`](super::Catalog).
///
/// The package refers to its catalog by id only. Instances are updated in
/// place when the catalog is refreshed, so anything holding the qualified id
/// keeps pointing at the same package.
#[derive(Debug, Clone)]
pub struct Package {
    catalog_id: String,
    doc: PackageDocument,
}

impl Package {
    /// Wraps a decoded `<package>` entry belonging to `catalog_id`.
    pub fn new(catalog_id: impl Into<String>, doc: PackageDocument) -> Self {
        Self {
            catalog_id: catalog_id.into(),
            doc,
        }
    }

    /// Replaces the metadata with a newer declaration of the same package.
    pub(crate) fn update_from(&mut self, doc: PackageDocument) {
        debug_assert_eq!(self.doc.id, doc.id);
        self.doc = doc;
    }

    /// Checks the mandatory fields.
    ///
    /// `dir` and `archive-path` must be plain relative paths, so an install
    /// never lands outside its catalog directory.
    pub fn validate(&self) -> Result<()> {
        let missing = if self.doc.id.is_empty() {
            Some("missing id")
        } else if self.doc.name.is_empty() {
            Some("missing name")
        } else if self.doc.dir.is_empty() {
            Some("missing dir")
        } else if !is_plain_relative(Path::new(&self.doc.dir)) {
            Some("dir is not a plain relative path")
        } else if self
            .doc
            .archive_path
            .as_deref()
            .is_some_and(|root| !is_plain_relative(Path::new(root)))
        {
            Some("archive-path is not a plain relative path")
        } else if self.doc.depends.iter().any(|d| d.id.is_empty()) {
            Some("dependency without id")
        } else {
            None
        };

        match missing {
            Some(reason) => Err(PkgError::ValidationFailed {
                package: self.doc.id.clone(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Primary id, unique within the catalog.
    pub fn id(&self) -> &str {
        &self.doc.id
    }

    /// `catalogId.id`
    pub fn qualified_id(&self) -> String {
        format!("{}.{}", self.catalog_id, self.doc.id)
    }

    /// Id of the owning catalog.
    pub fn catalog_id(&self) -> &str {
        &self.catalog_id
    }

    /// Non-localized display name.
    pub fn name(&self) -> &str {
        &self.doc.name
    }

    /// Display name for `locale`, falling back to the plain name.
    pub fn localized_name(&self, locale: Option<&str>) -> &str {
        localized(&self.doc.localized, locale, |l| l.name.as_deref()).unwrap_or(&self.doc.name)
    }

    /// Non-localized description.
    pub fn description(&self) -> Option<&str> {
        self.doc.description.as_deref()
    }

    /// Description for `locale`, falling back to the plain description.
    pub fn localized_description(&self, locale: Option<&str>) -> Option<&str> {
        localized(&self.doc.localized, locale, |l| l.description.as_deref())
            .or(self.doc.description.as_deref())
    }

    pub fn revision(&self) -> u32 {
        self.doc.revision
    }

    /// Expected MD5 of the archive, hex encoded.
    pub fn md5(&self) -> &str {
        &self.doc.md5
    }

    /// Mirrors in document order.
    pub fn download_urls(&self) -> &[String] {
        &self.doc.urls
    }

    /// Name of the install directory inside the catalog directory.
    pub fn dir_name(&self) -> &str {
        &self.doc.dir
    }

    /// Path of the content root inside the archive.
    pub fn content_root(&self) -> &str {
        self.doc.archive_path.as_deref().unwrap_or(&self.doc.dir)
    }

    pub fn tags(&self) -> &[String] {
        &self.doc.tags
    }

    /// Case-insensitive tag test.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.doc.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// Named rating, if declared.
    pub fn rating(&self, name: &str) -> Option<u32> {
        self.doc.ratings.get(name).copied()
    }

    pub fn ratings(&self) -> &BTreeMap<String, u32> {
        &self.doc.ratings
    }

    /// All ids this package answers to; index 0 is the package itself.
    pub fn variants(&self) -> Vec<&str> {
        std::iter::once(self.doc.id.as_str())
            .chain(self.doc.variants.iter().map(|v| v.id.as_str()))
            .collect()
    }

    /// Index of `id` in [`variants`](Self::variants).
    pub fn index_of_variant(&self, id: &str) -> Option<usize> {
        self.variants().iter().position(|v| *v == id)
    }

    /// Display name of a variant, localized when possible.
    pub fn name_for_variant(&self, id: &str, locale: Option<&str>) -> Option<&str> {
        if id == self.doc.id {
            return Some(self.localized_name(locale));
        }
        self.variant(id).map(|v| {
            localized(&v.localized, locale, |l| l.name.as_deref()).unwrap_or(&v.name)
        })
    }

    fn variant(&self, id: &str) -> Option<&VariantDocument> {
        self.doc.variants.iter().find(|v| v.id == id)
    }

    /// Declared dependencies, unresolved.
    pub fn depends(&self) -> &[DependencySpec] {
        &self.doc.depends
    }

    pub fn author(&self) -> Option<&str> {
        self.doc.author.as_deref()
    }

    /// Content type (`aircraft`, `addon`, ...).
    pub fn kind(&self) -> Option<&str> {
        self.doc.kind.as_deref()
    }

    pub fn homepage(&self) -> Option<&str> {
        self.doc.homepage.as_deref()
    }

    /// Declared archive size in bytes.
    pub fn file_size_bytes(&self) -> Option<u64> {
        self.doc.file_size_bytes
    }

    /// Value of a key this version does not decode.
    pub fn extra(&self, key: &str) -> Option<&str> {
        self.doc.extra.get(key).map(String::as_str)
    }

    /// Evaluates `filter` against this package.
    pub fn matches(&self, filter: &Filter, ctx: &MatchContext<'_>) -> bool {
        filter.matches(self, ctx)
    }

    /// Names searched by `name` and `text` filters: each identity's localized
    /// name (when one exists) followed by its plain name.
    pub(crate) fn searchable_names(&self, locale: Option<&str>) -> Vec<&str> {
        let mut names = Vec::new();
        push_localized(&mut names, &self.doc.localized, locale, |l| l.name.as_deref());
        names.push(self.doc.name.as_str());
        for variant in &self.doc.variants {
            push_localized(&mut names, &variant.localized, locale, |l| l.name.as_deref());
            names.push(variant.name.as_str());
        }
        names.retain(|n| !n.is_empty());
        names
    }

    /// Descriptions searched by `description` and `text` filters.
    pub(crate) fn searchable_descriptions(&self, locale: Option<&str>) -> Vec<&str> {
        let mut descriptions = Vec::new();
        push_localized(&mut descriptions, &self.doc.localized, locale, |l| l.description.as_deref());
        descriptions.extend(self.doc.description.as_deref());
        for variant in &self.doc.variants {
            push_localized(&mut descriptions, &variant.localized, locale, |l| {
                l.description.as_deref()
            });
            descriptions.extend(variant.description.as_deref());
        }
        descriptions
    }
}

fn localized<'a>(
    table: &'a BTreeMap<String, LocalizedText>,
    locale: Option<&str>,
    field: impl Fn(&'a LocalizedText) -> Option<&'a str>,
) -> Option<&'a str> {
    locale.and_then(|l| table.get(l)).and_then(field)
}

fn push_localized<'a>(
    out: &mut Vec<&'a str>,
    table: &'a BTreeMap<String, LocalizedText>,
    locale: Option<&str>,
    field: impl Fn(&'a LocalizedText) -> Option<&'a str>,
) {
    if let Some(text) = localized(table, locale, field) {
        out.push(text);
    }
}
