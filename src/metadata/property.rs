//! Generic hierarchical property document.
//!
//! Catalog and filter documents are XML property lists: every element is a
//! named node holding either a text value or child nodes, and repeated
//! children (`<package>`, `<url>`, `<version>`) form ordered lists.
//! Attributes such as `type="int"` carry no meaning here and are ignored.
//!
//! ```xml
//! <PropertyList>
//!   <id>main</id>
//!   <version>2024.1.*</version>
//!   <package>
//!     <id>c172</id>
//!     <revision type="int">5</revision>
//!   </package>
//! </PropertyList>
//! ```
//!
//! [`PropertyNode`] is only an intermediate form; typed structures in
//! [`document`](super::document) are decoded from it once at parse time.

use crate::core::{PkgError, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::str::FromStr;

/// One element of a property document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyNode {
    name: String,
    value: String,
    children: Vec<PropertyNode>,
}

impl PropertyNode {
    /// Creates a leaf node.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            children: Vec::new(),
        }
    }

    /// Creates a node with children and no value.
    pub fn with_children(name: impl Into<String>, children: Vec<PropertyNode>) -> Self {
        Self {
            name: name.into(),
            value: String::new(),
            children,
        }
    }

    /// Parses an XML document and returns its root element.
    ///
    /// Fails on malformed XML, mismatched tags, an empty document or more
    /// than one root element.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<PropertyNode> = Vec::new();
        let mut root: Option<PropertyNode> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) => stack.push(Self::from_start(&start)),
                Ok(Event::Empty(start)) => {
                    let node = Self::from_start(&start);
                    Self::attach(&mut stack, &mut root, node)?;
                }
                Ok(Event::Text(text)) => {
                    if let Some(top) = stack.last_mut() {
                        let unescaped = text.unescape().map_err(|e| PkgError::InvalidDocument {
                            reason: format!("bad text in <{}>: {e}", top.name),
                        })?;
                        top.value.push_str(&unescaped);
                    }
                }
                Ok(Event::CData(data)) => {
                    if let Some(top) = stack.last_mut() {
                        top.value.push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Ok(Event::End(_)) => {
                    let node = stack.pop().ok_or_else(|| PkgError::InvalidDocument {
                        reason: "unbalanced closing tag".to_string(),
                    })?;
                    Self::attach(&mut stack, &mut root, node)?;
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(PkgError::InvalidDocument {
                        reason: format!("XML error at byte {}: {e}", reader.buffer_position()),
                    });
                }
            }
        }

        if let Some(open) = stack.last() {
            return Err(PkgError::InvalidDocument {
                reason: format!("unexpected end of document inside <{}>", open.name),
            });
        }
        root.ok_or_else(|| PkgError::InvalidDocument {
            reason: "document has no root element".to_string(),
        })
    }

    fn from_start(start: &BytesStart<'_>) -> Self {
        Self::with_children(String::from_utf8_lossy(start.name().as_ref()).into_owned(), Vec::new())
    }

    fn attach(
        stack: &mut [PropertyNode],
        root: &mut Option<PropertyNode>,
        node: PropertyNode,
    ) -> Result<()> {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(node);
            return Ok(());
        }
        if root.is_some() {
            return Err(PkgError::InvalidDocument {
                reason: format!("second root element <{}>", node.name),
            });
        }
        *root = Some(node);
        Ok(())
    }

    /// Element name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Trimmed text value (empty for container nodes).
    pub fn value(&self) -> &str {
        self.value.trim()
    }

    /// All children in document order.
    pub fn children(&self) -> &[PropertyNode] {
        &self.children
    }

    /// First child called `name`.
    pub fn child(&self, name: &str) -> Option<&PropertyNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Every child called `name`, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a PropertyNode> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// True if a child called `name` exists.
    pub fn has_child(&self, name: &str) -> bool {
        self.child(name).is_some()
    }

    /// Value of the first child called `name`, if present and non-empty.
    pub fn string_value(&self, name: &str) -> Option<&str> {
        self.child(name).map(PropertyNode::value).filter(|v| !v.is_empty())
    }

    /// Values of every non-empty child called `name`.
    pub fn string_values(&self, name: &str) -> Vec<String> {
        self.children_named(name)
            .map(PropertyNode::value)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Numeric value of the first child called `name`.
    ///
    /// Returns `Ok(None)` when the child is missing or empty and an error when
    /// its text is not a number.
    pub fn parsed_value<T: FromStr>(&self, name: &str) -> Result<Option<T>> {
        match self.string_value(name) {
            None => Ok(None),
            Some(raw) => raw.parse::<T>().map(Some).map_err(|_| PkgError::InvalidDocument {
                reason: format!("<{name}> in <{}> is not a valid number: {raw:?}", self.name),
            }),
        }
    }

    /// Interprets this node's value as a boolean (`true`/`1`/`yes`, case-insensitive).
    pub fn bool_value(&self) -> bool {
        matches!(self.value().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
    }
}
