use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::ClusterPersistRepository;
use crate::PathError;
use crate::Result;
use crate::RuleNodePath;
use crate::SerializationError;
use crate::VersionNodePath;
use crate::VersionPersistService;

/// Typed rule items stored as JSON in version nodes
#[derive(Clone)]
pub struct RulePersistService {
    paths: Arc<RuleNodePath>,
    versions: VersionPersistService,
    repository: Arc<dyn ClusterPersistRepository>,
}

impl std::fmt::Debug for RulePersistService {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RulePersistService")
            .field("root", &self.paths.root())
            .finish_non_exhaustive()
    }
}

impl RulePersistService {
    pub fn new(
        paths: Arc<RuleNodePath>,
        repository: Arc<dyn ClusterPersistRepository>,
    ) -> Self {
        Self {
            paths,
            versions: VersionPersistService::new(repository.clone()),
            repository,
        }
    }

    pub fn paths(&self) -> &RuleNodePath {
        &self.paths
    }

    pub async fn persist_named<T: Serialize + Sync>(
        &self,
        item_type: &str,
        name: &str,
        item: &T,
    ) -> Result<u64> {
        check_item_name(name)?;
        let path = self.paths.named(item_type)?.path(name);
        self.persist_json(&path, item).await
    }

    pub async fn persist_unique<T: Serialize + Sync>(
        &self,
        item_type: &str,
        item: &T,
    ) -> Result<u64> {
        let path = self.paths.unique(item_type)?.path().clone();
        self.persist_json(&path, item).await
    }

    pub async fn load_named<T: DeserializeOwned>(
        &self,
        item_type: &str,
        name: &str,
    ) -> Result<Option<T>> {
        let path = self.paths.named(item_type)?.path(name);
        self.load_json(&path).await
    }

    pub async fn load_unique<T: DeserializeOwned>(
        &self,
        item_type: &str,
    ) -> Result<Option<T>> {
        let path = self.paths.unique(item_type)?.path().clone();
        self.load_json(&path).await
    }

    /// Every named item of `item_type` that currently has a value, by name
    pub async fn load_named_items<T: DeserializeOwned>(
        &self,
        item_type: &str,
    ) -> Result<Vec<(String, T)>> {
        let named = self.paths.named(item_type)?;
        let names = self.repository.get_children_keys(named.type_path()).await?;

        let mut items = Vec::with_capacity(names.len());
        for name in names {
            if let Some(item) = self.load_json(&named.path(&name)).await? {
                items.push((name, item));
            }
        }
        Ok(items)
    }

    pub async fn drop_named(
        &self,
        item_type: &str,
        name: &str,
    ) -> Result<()> {
        let path = self.paths.named(item_type)?.path(name);
        debug!(item_type, name, "Dropping rule item");
        self.versions.delete(&path).await
    }

    pub async fn drop_unique(
        &self,
        item_type: &str,
    ) -> Result<()> {
        let path = self.paths.unique(item_type)?.path().clone();
        debug!(item_type, "Dropping unique rule item");
        self.versions.delete(&path).await
    }

    async fn persist_json<T: Serialize + Sync>(
        &self,
        path: &VersionNodePath,
        item: &T,
    ) -> Result<u64> {
        let content = serde_json::to_string(item).map_err(SerializationError::Json)?;
        self.versions.persist(path, &content).await
    }

    async fn load_json<T: DeserializeOwned>(
        &self,
        path: &VersionNodePath,
    ) -> Result<Option<T>> {
        match self.versions.load_content(path).await? {
            Some(content) => Ok(Some(
                serde_json::from_str(&content).map_err(SerializationError::Json)?,
            )),
            None => Ok(None),
        }
    }
}

/// Names must be extractable again by the named item patterns
fn check_item_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(PathError::InvalidSegment(name.to_string()).into());
    }
    Ok(())
}
