//! Catalog metadata documents.
//!
//! Metadata is exchanged as XML property lists. [`property`] turns the XML
//! into a generic [`PropertyNode`] tree; [`document`] decodes that tree into
//! the typed [`CatalogDocument`] / [`PackageDocument`] structures the rest of
//! the crate works with.

pub mod document;
pub mod property;

pub use document::{
    AlternateVersion, CatalogDocument, DependencySpec, LocalizedText, PackageDocument,
    VariantDocument,
};
pub use property::PropertyNode;
