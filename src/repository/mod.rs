//! Store collaborator contract.
//!
//! The coordination layer never talks to a concrete store: it consumes a
//! watchable hierarchical key/value store through [`ClusterPersistRepository`].
//! Keys are absolute `/`-separated paths. Ephemeral nodes belong to the session
//! that wrote them and disappear when that session ends; this is the only
//! liveness signal the layer relies on.
//!
//! [`MemoryRepository`] is an in-process implementation used by tests and by
//! single-process embedders.

mod memory;
pub use memory::*;

use std::sync::Arc;

#[cfg(test)]
use mockall::automock;
use async_trait::async_trait;

use crate::Result;

/// Kind of change reported by a watch notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataChangedType {
    /// Node created
    Added,
    /// Existing node overwritten
    Updated,
    /// Node removed, explicitly or by session expiry
    Deleted,
    /// Store specific notification with no data meaning
    Ignored,
}

/// Raw change notification delivered by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataChangedEvent {
    /// Absolute key of the changed node
    pub key: String,
    /// New value (None for deletions)
    pub value: Option<String>,
    pub event_type: DataChangedType,
}

impl DataChangedEvent {
    pub fn new(
        key: impl Into<String>,
        value: Option<String>,
        event_type: DataChangedType,
    ) -> Self {
        Self {
            key: key.into(),
            value,
            event_type,
        }
    }

    /// Value as string slice, empty when absent
    pub fn value_str(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }
}

/// Receives store notifications.
///
/// Runs on the store's notification thread: implementations must enqueue and
/// return, never block or call back into the store synchronously.
pub trait DataChangedEventListener: Send + Sync + 'static {
    fn on_change(
        &self,
        event: DataChangedEvent,
    );
}

impl<F> DataChangedEventListener for F
where
    F: Fn(DataChangedEvent) + Send + Sync + 'static,
{
    fn on_change(
        &self,
        event: DataChangedEvent,
    ) {
        self(event)
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterPersistRepository: Send + Sync + 'static {
    /// Create or overwrite a persistent node
    async fn persist(
        &self,
        key: &str,
        value: &str,
    ) -> Result<()>;

    /// Create or overwrite a node owned by the current session
    async fn persist_ephemeral(
        &self,
        key: &str,
        value: &str,
    ) -> Result<()>;

    /// Create a session owned node only if `key` is absent.
    /// Returns false when the node already exists.
    async fn persist_exclusive_ephemeral(
        &self,
        key: &str,
        value: &str,
    ) -> Result<bool>;

    /// Create a session owned child of `parent` with a store assigned,
    /// strictly increasing, zero padded name. Returns the child name.
    async fn persist_ephemeral_sequential(
        &self,
        parent: &str,
        value: &str,
    ) -> Result<String>;

    /// Point read, None when the node does not exist
    async fn get_directly(
        &self,
        key: &str,
    ) -> Result<Option<String>>;

    /// Direct child names of `key`, sorted
    async fn get_children_keys(
        &self,
        key: &str,
    ) -> Result<Vec<String>>;

    /// Remove `key` and all its descendants
    async fn delete(
        &self,
        key: &str,
    ) -> Result<()>;

    /// Subscribe to every change under `key_prefix`
    async fn watch(
        &self,
        key_prefix: &str,
        listener: Arc<dyn DataChangedEventListener>,
    ) -> Result<()>;
}
