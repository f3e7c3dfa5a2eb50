//! File system utilities for the content tree
//!
//! This module provides the filesystem primitives the catalog and install
//! pipeline are built on: directory creation and recursive removal, atomic
//! temp-and-rename writes, integer sidecar files and the entry-name check
//! used by archive extraction.
//!
//! # Examples
//!
//! ```rust,no_run
//! use pkgcat::utils::fs::{ensure_dir, safe_write, read_int_file};
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! ensure_dir(Path::new("content/main"))?;
//! safe_write(Path::new("content/main/.timestamp"), "1700000000")?;
//! let stamp = read_int_file(Path::new("content/main/.timestamp"))?;
//! # Ok(())
//! # }
//! ```

pub mod atomic;
pub mod dirs;
pub mod paths;

pub use atomic::{atomic_write, read_int_file, safe_write, write_int_file};
pub use dirs::{ensure_dir, ensure_parent_dir, is_empty_dir, remove_dir_all, remove_dir_all_best_effort};
pub use paths::is_plain_relative;
