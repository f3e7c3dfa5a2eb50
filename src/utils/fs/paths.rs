//! Path checks for archive entry names.

use std::path::{Component, Path};

/// Returns true if `relative` is a plain relative path: no root, no prefix,
/// and no `..` component anywhere.
///
/// `a/../b` is rejected even though it stays inside the base. Archive entry
/// names are checked with this before anything is written.
#[must_use]
pub fn is_plain_relative(relative: &Path) -> bool {
    relative.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        && relative.components().any(|c| matches!(c, Component::Normal(_)))
}
