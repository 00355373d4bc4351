//! Path sanitizing for user supplied names.
//!
//! Repository and record names end up as path components under the database
//! root. [`sanitize`] strips parent-directory tokens and separators. It is a
//! filter, not a validator: callers check the result with
//! [`is_single_component`] before joining it to a directory.

use std::path::{Component, Path};

/// Parent-directory token removed from names.
const PARENT_DIR: &str = "..";

/// Remove every `..` and every path separator from `raw`.
///
/// Both `/` and the platform separator are stripped so that names behave the
/// same on every platform.
pub fn sanitize(raw: &str) -> String {
    let mut out = raw.replace(PARENT_DIR, "");
    out.retain(|c| c != '/' && c != std::path::MAIN_SEPARATOR);
    out
}

/// Check that a sanitized name is exactly one normal path component.
///
/// Stripping can join leftover dots into a new `..` (`"./."` becomes `".."`),
/// so a filtered name still has to be checked before it is joined to a root.
pub fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Check that a relative folder stays below the directory it is joined to.
///
/// Empty folders are allowed and mean "the directory itself".
pub fn is_contained(folder: &str) -> bool {
    Path::new(folder)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
