use std::sync::Arc;

use autometrics::autometrics;
use tracing::debug;
use tracing::warn;

use crate::ClusterPersistRepository;
use crate::Result;
use crate::SystemError;
use crate::VersionNodePath;
use crate::API_SLO;
use crate::MALFORMED_CONTENT_METRIC;
use crate::PERSISTED_VERSION_METRIC;

/// Append-then-prune revision store for single-valued items.
///
/// Only the newest value is kept, but every write gets a fresh, strictly
/// increasing version number that watchers use to detect stale
/// notifications.
#[derive(Clone)]
pub struct VersionPersistService {
    repository: Arc<dyn ClusterPersistRepository>,
}

impl std::fmt::Debug for VersionPersistService {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("VersionPersistService").finish_non_exhaustive()
    }
}

impl VersionPersistService {
    pub fn new(repository: Arc<dyn ClusterPersistRepository>) -> Self {
        Self { repository }
    }

    /// Write `content` as the next version and make it active.
    ///
    /// Not atomic: a crash after the version write leaves an orphan child, a
    /// crash before pruning leaves old versions. Both are cleaned up by the
    /// next successful persist of the same item.
    #[autometrics(objective = API_SLO)]
    pub async fn persist(
        &self,
        path: &VersionNodePath,
        content: &str,
    ) -> Result<u64> {
        let versions_path = path.versions_path();
        let existing = self.repository.get_children_keys(&versions_path).await?;

        let next_version = match existing.iter().filter_map(|child| child.parse::<u64>().ok()).max() {
            None => 0,
            Some(max) => max.checked_add(1).ok_or_else(|| SystemError::VersionExhausted {
                path: versions_path.clone(),
            })?,
        };

        self.repository
            .persist(&path.version_path(next_version), content)
            .await?;
        self.repository
            .persist(&path.active_version_path(), &next_version.to_string())
            .await?;

        for child in existing {
            self.repository
                .delete(&format!("{}/{}", versions_path, child))
                .await?;
        }

        PERSISTED_VERSION_METRIC.with_label_values(&["item"]).inc();
        debug!(path = %path, version = next_version, "Persisted version");
        Ok(next_version)
    }

    /// Current active version, None when the item has no value.
    /// A malformed pointer is logged and treated as absent.
    pub async fn load_active_version(
        &self,
        path: &VersionNodePath,
    ) -> Result<Option<u64>> {
        let Some(raw) = self
            .repository
            .get_directly(&path.active_version_path())
            .await?
        else {
            return Ok(None);
        };

        match raw.trim().parse::<u64>() {
            Ok(version) => Ok(Some(version)),
            Err(e) => {
                warn!(path = %path, value = %raw, "Malformed active version: {:?}", e);
                MALFORMED_CONTENT_METRIC
                    .with_label_values(&["active_version"])
                    .inc();
                Ok(None)
            }
        }
    }

    /// Content of the active version, None when the item has no value
    #[autometrics(objective = API_SLO)]
    pub async fn load_content(
        &self,
        path: &VersionNodePath,
    ) -> Result<Option<String>> {
        match self.load_active_version(path).await? {
            Some(version) => self.load_content_at(path, version).await,
            None => Ok(None),
        }
    }

    /// Content of a version already resolved by the caller
    pub async fn load_content_at(
        &self,
        path: &VersionNodePath,
        version: u64,
    ) -> Result<Option<String>> {
        self.repository
            .get_directly(&path.version_path(version))
            .await
    }

    /// Optimistic read for watch consumers.
    ///
    /// Loads `version`, then re-reads the active pointer; returns None when the
    /// pointer moved in between, i.e. the notification was stale.
    pub async fn load_validated(
        &self,
        path: &VersionNodePath,
        version: u64,
    ) -> Result<Option<String>> {
        let content = self.load_content_at(path, version).await?;
        let active = self.load_active_version(path).await?;

        if active != Some(version) {
            debug!(path = %path, version, ?active, "Stale version read discarded");
            return Ok(None);
        }
        Ok(content)
    }

    /// Remove the item with all its versions
    pub async fn delete(
        &self,
        path: &VersionNodePath,
    ) -> Result<()> {
        self.repository.delete(path.path()).await?;
        debug!(path = %path, "Deleted versioned item");
        Ok(())
    }
}
