//! Package filter expressions.
//!
//! Filters are written as property documents, so a host application can keep
//! them in the same format as its catalogs:
//!
//! ```xml
//! <filter>
//!   <tag>helicopter</tag>
//!   <any-of>
//!     <rating-FDM>3</rating-FDM>
//!     <text>robinson</text>
//!   </any-of>
//!   <installed>false</installed>
//! </filter>
//! ```
//!
//! The terms of the root node are combined with `all-of`. Unknown keys are
//! logged and never match, so a typo narrows a search instead of silently
//! returning everything.

use super::package::Package;
use crate::core::Result;
use crate::metadata::PropertyNode;
use tracing::warn;

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every term must match (true when empty).
    AllOf(Vec<Filter>),
    /// At least one term must match (false when empty).
    AnyOf(Vec<Filter>),
    /// Exact tag, compared case-insensitively.
    Tag(String),
    /// Named rating at or above a threshold.
    Rating {
        /// Rating name (`FDM`, `cockpit`, ...)
        name: String,
        /// Minimum value
        min: u32,
    },
    /// Current install state.
    Installed(bool),
    /// Substring of any name or description.
    Text(String),
    /// Substring of any name.
    Name(String),
    /// Substring of any description.
    Description(String),
    /// A key this version does not understand.
    Unknown(String),
}

/// State of the package outside the catalog that filters can test.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchContext<'a> {
    /// True if the package has a completed install
    pub installed: bool,
    /// Locale used for localized names and descriptions
    pub locale: Option<&'a str>,
}

impl Filter {
    /// Parses a filter document. The root element's name is irrelevant.
    pub fn parse(xml: &str) -> Result<Self> {
        Ok(Self::from_node(&PropertyNode::parse(xml)?))
    }

    /// Builds a filter from a property tree; the children of `node` are ANDed.
    pub fn from_node(node: &PropertyNode) -> Self {
        Self::AllOf(node.children().iter().map(Self::term).collect())
    }

    fn term(node: &PropertyNode) -> Self {
        let value = node.value().to_string();
        match node.name() {
            "all-of" => Self::AllOf(node.children().iter().map(Self::term).collect()),
            "any-of" => Self::AnyOf(node.children().iter().map(Self::term).collect()),
            "tag" => Self::Tag(value),
            "installed" => Self::Installed(node.bool_value()),
            "text" => Self::Text(value),
            "name" => Self::Name(value),
            "description" => Self::Description(value),
            key => match key.strip_prefix("rating-") {
                Some(rating) if !rating.is_empty() => match value.parse::<u32>() {
                    Ok(min) => Self::Rating {
                        name: rating.to_string(),
                        min,
                    },
                    Err(_) => Self::Unknown(key.to_string()),
                },
                _ => Self::Unknown(key.to_string()),
            },
        }
    }

    /// Evaluates the filter against one package.
    pub fn matches(&self, package: &Package, ctx: &MatchContext<'_>) -> bool {
        match self {
            Self::AllOf(terms) => terms.iter().all(|t| t.matches(package, ctx)),
            Self::AnyOf(terms) => terms.iter().any(|t| t.matches(package, ctx)),
            Self::Tag(tag) => package.has_tag(tag),
            Self::Rating {
                name,
                min,
            } => package.rating(name).is_some_and(|r| r >= *min),
            Self::Installed(wanted) => ctx.installed == *wanted,
            Self::Text(needle) => {
                contains_any(package.searchable_names(ctx.locale), needle)
                    || contains_any(package.searchable_descriptions(ctx.locale), needle)
            }
            Self::Name(needle) => contains_any(package.searchable_names(ctx.locale), needle),
            Self::Description(needle) => {
                contains_any(package.searchable_descriptions(ctx.locale), needle)
            }
            Self::Unknown(key) => {
                warn!("Unknown filter key '{key}' never matches");
                false
            }
        }
    }
}

fn contains_any(haystacks: Vec<&str>, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    haystacks.iter().any(|h| h.to_lowercase().contains(&needle))
}
