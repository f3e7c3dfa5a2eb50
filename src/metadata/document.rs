//! Typed catalog documents.
//!
//! A catalog document is decoded from a [`PropertyNode`] tree exactly once,
//! when it is parsed. Keys pkgcat does not know about are kept in small
//! `extra` maps so newer catalogs can be read by older clients without
//! losing information.

use super::property::PropertyNode;
use crate::core::Result;
use crate::version;
use std::collections::BTreeMap;

/// Keys of a `<package>` entry that are decoded into typed fields.
const PACKAGE_KEYS: &[&str] = &[
    "id",
    "name",
    "description",
    "revision",
    "md5",
    "url",
    "dir",
    "archive-path",
    "tags",
    "variant",
    "depends",
    "rating",
    "author",
    "type",
    "urls",
    "file-size-bytes",
    "preview",
    "thumbnail",
];

/// Keys of the catalog root that are decoded into typed fields.
const CATALOG_KEYS: &[&str] = &[
    "id",
    "url",
    "name",
    "description",
    "max-age-sec",
    "version",
    "alternate-version",
    "package",
];

/// Locale-specific overrides of a name and description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalizedText {
    /// Localized display name
    pub name: Option<String>,
    /// Localized description
    pub description: Option<String>,
}

/// A `<variant>` entry: another identity sharing the package's directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantDocument {
    /// Variant id, unique across the whole catalog
    pub id: String,
    /// Display name
    pub name: String,
    /// Optional description
    pub description: Option<String>,
    /// Per-locale overrides keyed by locale code
    pub localized: BTreeMap<String, LocalizedText>,
}

/// A `<depends>` entry: a package id and the minimum revision required.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySpec {
    /// Bare or qualified id of the required package
    pub id: String,
    /// Minimum acceptable revision (0 accepts any)
    pub revision: u32,
}

/// A `<package>` entry of a catalog document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageDocument {
    /// Primary id, unique within the catalog
    pub id: String,
    /// Display name
    pub name: String,
    /// Optional description
    pub description: Option<String>,
    /// Monotonic content revision
    pub revision: u32,
    /// Expected MD5 of the archive, hex encoded
    pub md5: String,
    /// Download mirrors, in document order
    pub urls: Vec<String>,
    /// Name of the install directory
    pub dir: String,
    /// Path of the content root inside the archive, when it differs from `dir`
    pub archive_path: Option<String>,
    /// Free-form tags
    pub tags: Vec<String>,
    /// Variants in document order (the package itself is not included)
    pub variants: Vec<VariantDocument>,
    /// Declared dependencies
    pub depends: Vec<DependencySpec>,
    /// Named ratings such as `FDM` or `cockpit`
    pub ratings: BTreeMap<String, u32>,
    /// Per-locale overrides keyed by locale code
    pub localized: BTreeMap<String, LocalizedText>,
    /// Author credit
    pub author: Option<String>,
    /// Content type (`aircraft`, `addon`, ...)
    pub kind: Option<String>,
    /// Home page of the package
    pub homepage: Option<String>,
    /// Archive size as declared by the catalog
    pub file_size_bytes: Option<u64>,
    /// Unrecognized scalar keys
    pub extra: BTreeMap<String, String>,
}

/// An `<alternate-version>` entry: where to go when this catalog does not
/// serve the running application version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlternateVersion {
    /// Version constraints the alternate serves
    pub versions: Vec<String>,
    /// URL of the alternate catalog document
    pub url: Option<String>,
    /// Id of the alternate catalog; absent means "same catalog, new URL"
    pub id: Option<String>,
}

/// A complete catalog document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogDocument {
    /// Stable catalog id
    pub id: String,
    /// Canonical URL of the document, as declared by the document itself
    pub url: Option<String>,
    /// Display name
    pub name: Option<String>,
    /// Description
    pub description: Option<String>,
    /// Freshness window overriding the registry default
    pub max_age_secs: Option<u64>,
    /// Compatible application version constraints
    pub versions: Vec<String>,
    /// Alternates for incompatible application versions
    pub alternates: Vec<AlternateVersion>,
    /// Packages in document order
    pub packages: Vec<PackageDocument>,
    /// Unrecognized scalar keys
    pub extra: BTreeMap<String, String>,
}

impl CatalogDocument {
    /// Parses and decodes a catalog document.
    pub fn parse(xml: &str) -> Result<Self> {
        Self::from_node(&PropertyNode::parse(xml)?)
    }

    /// Decodes a catalog document from an already parsed tree.
    pub fn from_node(root: &PropertyNode) -> Result<Self> {
        let packages = root
            .children_named("package")
            .map(PackageDocument::from_node)
            .collect::<Result<Vec<_>>>()?;

        let alternates = root
            .children_named("alternate-version")
            .map(|alt| AlternateVersion {
                versions: alt.string_values("version"),
                url: alt.string_value("url").map(str::to_string),
                id: alt.string_value("id").map(str::to_string),
            })
            .collect();

        Ok(Self {
            id: root.string_value("id").unwrap_or_default().to_string(),
            url: root.string_value("url").map(str::to_string),
            name: root.string_value("name").map(str::to_string),
            description: root.string_value("description").map(str::to_string),
            max_age_secs: root.parsed_value("max-age-sec")?,
            versions: root.string_values("version"),
            alternates,
            packages,
            extra: extra_scalars(root, CATALOG_KEYS),
        })
    }

    /// True if any `<version>` entry accepts `app_version`.
    pub fn is_compatible(&self, app_version: &str) -> bool {
        version::matches_any(app_version, &self.versions)
    }

    /// First alternate whose versions accept `app_version` and that names a URL.
    pub fn find_alternate(&self, app_version: &str) -> Option<&AlternateVersion> {
        self.alternates
            .iter()
            .find(|alt| alt.url.is_some() && version::matches_any(app_version, &alt.versions))
    }
}

impl PackageDocument {
    /// Decodes one `<package>` node.
    pub fn from_node(node: &PropertyNode) -> Result<Self> {
        let depends = node
            .children_named("depends")
            .map(|dep| {
                Ok(DependencySpec {
                    id: dep.string_value("id").unwrap_or_default().to_string(),
                    revision: dep.parsed_value("revision")?.unwrap_or(0),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut ratings = BTreeMap::new();
        if let Some(rating) = node.child("rating") {
            for entry in rating.children() {
                if let Some(value) = rating.parsed_value::<u32>(entry.name())? {
                    ratings.insert(entry.name().to_string(), value);
                }
            }
        }

        let tags = node.child("tags").map(|t| t.string_values("tag")).unwrap_or_default();

        let variants = node
            .children_named("variant")
            .map(|v| VariantDocument {
                id: v.string_value("id").unwrap_or_default().to_string(),
                name: v.string_value("name").unwrap_or_default().to_string(),
                description: v.string_value("description").map(str::to_string),
                localized: localized_children(v, &["id", "name", "description"]),
            })
            .collect();

        Ok(Self {
            id: node.string_value("id").unwrap_or_default().to_string(),
            name: node.string_value("name").unwrap_or_default().to_string(),
            description: node.string_value("description").map(str::to_string),
            revision: node.parsed_value("revision")?.unwrap_or(0),
            md5: node.string_value("md5").unwrap_or_default().to_string(),
            urls: node.string_values("url"),
            dir: node.string_value("dir").unwrap_or_default().to_string(),
            archive_path: node.string_value("archive-path").map(str::to_string),
            tags,
            variants,
            depends,
            ratings,
            localized: localized_children(node, PACKAGE_KEYS),
            author: node.string_value("author").map(str::to_string),
            kind: node.string_value("type").map(str::to_string),
            homepage: node
                .child("urls")
                .and_then(|u| u.string_value("home-page"))
                .map(str::to_string),
            file_size_bytes: node.parsed_value("file-size-bytes")?,
            extra: extra_scalars(node, PACKAGE_KEYS),
        })
    }
}

/// Children that are not known keys but carry a `name` or `description`
/// are treated as locale overrides (`<de><name>…</name></de>`).
fn localized_children(node: &PropertyNode, known: &[&str]) -> BTreeMap<String, LocalizedText> {
    node.children()
        .iter()
        .filter(|c| !known.contains(&c.name()))
        .filter(|c| c.has_child("name") || c.has_child("description"))
        .map(|c| {
            (
                c.name().to_string(),
                LocalizedText {
                    name: c.string_value("name").map(str::to_string),
                    description: c.string_value("description").map(str::to_string),
                },
            )
        })
        .collect()
}

/// Unknown scalar children; the first occurrence of each key wins.
fn extra_scalars(node: &PropertyNode, known: &[&str]) -> BTreeMap<String, String> {
    let mut extra = BTreeMap::new();
    for child in node.children() {
        if known.contains(&child.name()) || !child.children().is_empty() {
            continue;
        }
        extra.entry(child.name().to_string()).or_insert_with(|| child.value().to_string());
    }
    extra
}
