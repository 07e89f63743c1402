use crate::constants::ACTIVE_VERSION_NODE;
use crate::constants::VERSIONS_NODE;
use crate::path::join_path;

/// Base path of one versioned item.
///
/// ```text
/// <path>/versions/<n>        content of revision n
/// <path>/active_version      n of the current revision
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionNodePath {
    path: String,
}

impl VersionNodePath {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn versions_path(&self) -> String {
        join_path(&self.path, VERSIONS_NODE)
    }

    pub fn version_path(
        &self,
        version: u64,
    ) -> String {
        join_path(&self.versions_path(), &version.to_string())
    }

    pub fn active_version_path(&self) -> String {
        join_path(&self.path, ACTIVE_VERSION_NODE)
    }

    /// Revision number of `key` when it is a direct child of this item's
    /// versions container
    pub fn find_version(
        &self,
        key: &str,
    ) -> Option<u64> {
        let rest = key.strip_prefix(self.path.as_str())?;
        let rest = rest.strip_prefix('/')?;
        let number = rest.strip_prefix(VERSIONS_NODE)?.strip_prefix('/')?;
        if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        number.parse().ok()
    }

    pub fn is_version_path(
        &self,
        key: &str,
    ) -> bool {
        self.find_version(key).is_some()
    }

    pub fn is_active_version_path(
        &self,
        key: &str,
    ) -> bool {
        key == self.active_version_path()
    }
}

impl std::fmt::Display for VersionNodePath {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(&self.path)
    }
}
