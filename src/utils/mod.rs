//! Cross-cutting utilities used by the catalog, install and registry modules.

pub mod fs;

pub use fs::{atomic_write, ensure_dir, safe_write};
