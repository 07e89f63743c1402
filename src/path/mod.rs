//! Store path scheme.
//!
//! Pure mapping between domain identifiers (rule item type and name, lock
//! scope, compute node id) and absolute store keys. Every pattern used for
//! extraction is compiled once when the path object is built; lookups never
//! re-derive them.
mod compute_node;
mod lock;
mod rule;
mod version;
pub use compute_node::*;
pub use lock::*;
pub use rule::*;
pub use version::*;

#[cfg(test)]
mod compute_node_test;
#[cfg(test)]
mod version_test;

use regex::Regex;

use crate::constants::PATH_SEPARATOR;
use crate::PathError;
use crate::Result;

/// Appends one segment to an absolute parent key
pub(crate) fn join_path(
    parent: &str,
    child: &str,
) -> String {
    if parent.ends_with(PATH_SEPARATOR) {
        format!("{}{}", parent, child)
    } else {
        format!("{}{}{}", parent, PATH_SEPARATOR, child)
    }
}

/// Compile an anchored pattern, surfacing template mistakes at construction
pub(crate) fn compile(pattern: String) -> Result<Regex> {
    Regex::new(&pattern).map_err(|source| PathError::InvalidPattern { pattern, source }.into())
}

/// A value embedded as one path segment must be non-empty and free of separators
pub(crate) fn check_segment(segment: &str) -> Result<()> {
    if segment.is_empty() || segment.contains(PATH_SEPARATOR) {
        return Err(PathError::InvalidSegment(segment.to_string()).into());
    }
    Ok(())
}
