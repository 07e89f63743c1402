//! In-process hierarchical store with session-scoped ephemeral nodes.
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   persist*/delete() -> mutate tree (write lock) -> send(event_queue) [in write order]
//!                                                          ↓
//! Notification Thread:
//!   event_queue.recv() -> prefix match in DashMap -> listener.on_change(event)
//! ```
//!
//! Events are enqueued while the tree lock is held, so the notification
//! thread observes them in exactly the order the writes were applied.
//! Unlike a lossy watch fan-out, the queue is unbounded: coordination
//! correctness depends on every notification being delivered.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;

use async_trait::async_trait;
use crossbeam_channel::unbounded;
use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use dashmap::DashMap;
use parking_lot::Mutex;
use parking_lot::RwLock;
use tracing::debug;
use tracing::trace;

use crate::constants::PATH_SEPARATOR;
use crate::constants::SEQUENTIAL_NODE_WIDTH;
use crate::ClusterPersistRepository;
use crate::DataChangedEvent;
use crate::DataChangedEventListener;
use crate::DataChangedType;
use crate::RepositoryError;
use crate::Result;

#[derive(Debug, Clone)]
struct StoredNode {
    value: String,
    /// Owning session of an ephemeral node
    owner: Option<u64>,
}

#[derive(Debug, Default)]
struct MemoryTree {
    nodes: BTreeMap<String, StoredNode>,
    sequences: HashMap<String, u64>,
    closed_sessions: HashSet<u64>,
}

struct Watcher {
    session_id: u64,
    prefix: String,
    listener: Arc<dyn DataChangedEventListener>,
}

type WatcherTable = DashMap<u64, Watcher>;

struct MemoryRepositoryInner {
    tree: RwLock<MemoryTree>,

    /// Watchers keyed by registration id, shared with the notification thread
    watchers: Arc<WatcherTable>,

    next_watcher_id: AtomicU64,
    next_session_id: AtomicU64,

    event_sender: Sender<DataChangedEvent>,

    /// Notification thread handle (joined on drop)
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for MemoryRepositoryInner {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("MemoryRepositoryInner")
            .field("nodes", &self.tree.read().nodes.len())
            .field("watchers", &self.watchers.len())
            .finish_non_exhaustive()
    }
}

impl Drop for MemoryRepositoryInner {
    fn drop(&mut self) {
        // Disconnect the queue so the notification thread exits
        let (closed_tx, _) = unbounded();
        self.event_sender = closed_tx;
        if let Some(handle) = self.thread_handle.lock().take() {
            // The last reference may be released by a listener on the thread itself
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

/// Shared in-memory store. Cheap to clone; every clone sees the same tree.
#[derive(Debug, Clone)]
pub struct MemoryRepository {
    inner: Arc<MemoryRepositoryInner>,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        let (event_sender, event_receiver) = unbounded();
        let watchers: Arc<WatcherTable> = Arc::new(DashMap::new());

        let handle = Self::spawn_notification_thread(watchers.clone(), event_receiver);

        Self {
            inner: Arc::new(MemoryRepositoryInner {
                tree: RwLock::new(MemoryTree::default()),
                watchers,
                next_watcher_id: AtomicU64::new(1),
                next_session_id: AtomicU64::new(1),
                event_sender,
                thread_handle: Mutex::new(Some(handle)),
            }),
        }
    }

    /// Open a new session. Every compute node process owns exactly one.
    pub fn session(&self) -> MemorySession {
        let id = self.inner.next_session_id.fetch_add(1, Ordering::Relaxed);
        debug!(session_id = id, "Memory repository session opened");
        MemorySession {
            id,
            repository: self.clone(),
        }
    }

    /// Simulate session loss: removes every ephemeral node owned by
    /// `session_id`, fires `Deleted` for each and drops its watchers.
    pub fn expire_session(
        &self,
        session_id: u64,
    ) {
        let mut tree = self.inner.tree.write();
        if !tree.closed_sessions.insert(session_id) {
            return;
        }

        let owned: Vec<String> = tree
            .nodes
            .iter()
            .filter(|(_, node)| node.owner == Some(session_id))
            .map(|(key, _)| key.clone())
            .collect();

        for key in owned {
            tree.nodes.remove(&key);
            self.emit(DataChangedEvent::new(key, None, DataChangedType::Deleted));
        }

        self.inner.watchers.retain(|_, w| w.session_id != session_id);
        debug!(session_id, "Memory repository session expired");
    }

    /// Number of stored nodes, for tests and diagnostics
    pub fn node_count(&self) -> usize {
        self.inner.tree.read().nodes.len()
    }

    fn spawn_notification_thread(
        watchers: Arc<WatcherTable>,
        receiver: Receiver<DataChangedEvent>,
    ) -> JoinHandle<()> {
        std::thread::spawn(move || {
            debug!("Memory repository notification thread started");
            // Exits once every sender is dropped
            while let Ok(event) = receiver.recv() {
                let listeners: Vec<Arc<dyn DataChangedEventListener>> = watchers
                    .iter()
                    .filter(|w| event.key.starts_with(&w.prefix))
                    .map(|w| w.listener.clone())
                    .collect();

                trace!(key = %event.key, event_type = ?event.event_type, listeners = listeners.len(), "Dispatch");

                for listener in listeners {
                    listener.on_change(event.clone());
                }
            }
            debug!("Memory repository notification thread stopped");
        })
    }

    /// Must be called with the tree write lock held
    fn emit(
        &self,
        event: DataChangedEvent,
    ) {
        let _ = self.inner.event_sender.send(event);
    }

    fn check_open(
        tree: &MemoryTree,
        session_id: u64,
    ) -> Result<()> {
        if tree.closed_sessions.contains(&session_id) {
            return Err(RepositoryError::SessionClosed(session_id).into());
        }
        Ok(())
    }

    fn put(
        &self,
        session_id: u64,
        key: &str,
        value: &str,
        owner: Option<u64>,
    ) -> Result<()> {
        validate_key(key)?;
        let mut tree = self.inner.tree.write();
        Self::check_open(&tree, session_id)?;

        let previous = tree.nodes.insert(
            key.to_string(),
            StoredNode {
                value: value.to_string(),
                owner,
            },
        );
        let event_type = if previous.is_some() {
            DataChangedType::Updated
        } else {
            DataChangedType::Added
        };
        self.emit(DataChangedEvent::new(key, Some(value.to_string()), event_type));
        Ok(())
    }
}

/// One client session on a [`MemoryRepository`]
#[derive(Debug, Clone)]
pub struct MemorySession {
    id: u64,
    repository: MemoryRepository,
}

impl MemorySession {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// End this session; its ephemeral nodes are removed
    pub fn close(&self) {
        self.repository.expire_session(self.id);
    }
}

#[async_trait]
impl ClusterPersistRepository for MemorySession {
    async fn persist(
        &self,
        key: &str,
        value: &str,
    ) -> Result<()> {
        self.repository.put(self.id, key, value, None)
    }

    async fn persist_ephemeral(
        &self,
        key: &str,
        value: &str,
    ) -> Result<()> {
        self.repository.put(self.id, key, value, Some(self.id))
    }

    async fn persist_exclusive_ephemeral(
        &self,
        key: &str,
        value: &str,
    ) -> Result<bool> {
        validate_key(key)?;
        let repo = &self.repository;
        let mut tree = repo.inner.tree.write();
        MemoryRepository::check_open(&tree, self.id)?;

        if tree.nodes.contains_key(key) {
            return Ok(false);
        }
        tree.nodes.insert(
            key.to_string(),
            StoredNode {
                value: value.to_string(),
                owner: Some(self.id),
            },
        );
        repo.emit(DataChangedEvent::new(
            key,
            Some(value.to_string()),
            DataChangedType::Added,
        ));
        Ok(true)
    }

    async fn persist_ephemeral_sequential(
        &self,
        parent: &str,
        value: &str,
    ) -> Result<String> {
        validate_key(parent)?;
        let repo = &self.repository;
        let mut tree = repo.inner.tree.write();
        MemoryRepository::check_open(&tree, self.id)?;

        let counter = tree.sequences.entry(parent.to_string()).or_insert(0);
        let name = format!("{:0width$}", *counter, width = SEQUENTIAL_NODE_WIDTH);
        *counter += 1;

        let key = join(parent, &name);
        tree.nodes.insert(
            key.clone(),
            StoredNode {
                value: value.to_string(),
                owner: Some(self.id),
            },
        );
        repo.emit(DataChangedEvent::new(
            key,
            Some(value.to_string()),
            DataChangedType::Added,
        ));
        Ok(name)
    }

    async fn get_directly(
        &self,
        key: &str,
    ) -> Result<Option<String>> {
        validate_key(key)?;
        let tree = self.repository.inner.tree.read();
        MemoryRepository::check_open(&tree, self.id)?;
        Ok(tree.nodes.get(key).map(|n| n.value.clone()))
    }

    async fn get_children_keys(
        &self,
        key: &str,
    ) -> Result<Vec<String>> {
        validate_key(key)?;
        let tree = self.repository.inner.tree.read();
        MemoryRepository::check_open(&tree, self.id)?;

        let prefix = if key == PATH_SEPARATOR {
            key.to_string()
        } else {
            format!("{}{}", key, PATH_SEPARATOR)
        };

        // Intermediate nodes exist implicitly, as in a hierarchical store
        let children: BTreeSet<String> = tree
            .nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, _)| k[prefix.len()..].split(PATH_SEPARATOR).next())
            .filter(|child| !child.is_empty())
            .map(str::to_string)
            .collect();

        Ok(children.into_iter().collect())
    }

    async fn delete(
        &self,
        key: &str,
    ) -> Result<()> {
        validate_key(key)?;
        let repo = &self.repository;
        let mut tree = repo.inner.tree.write();
        MemoryRepository::check_open(&tree, self.id)?;

        let descendant_prefix = format!("{}{}", key, PATH_SEPARATOR);
        let mut doomed: Vec<String> = tree
            .nodes
            .range(descendant_prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&descendant_prefix))
            .map(|(k, _)| k.clone())
            .collect();
        // Deepest first, the node itself last
        doomed.reverse();
        if tree.nodes.contains_key(key) {
            doomed.push(key.to_string());
        }

        for k in doomed {
            tree.nodes.remove(&k);
            repo.emit(DataChangedEvent::new(k, None, DataChangedType::Deleted));
        }
        Ok(())
    }

    async fn watch(
        &self,
        key_prefix: &str,
        listener: Arc<dyn DataChangedEventListener>,
    ) -> Result<()> {
        validate_key(key_prefix)?;
        let repo = &self.repository;
        let tree = repo.inner.tree.read();
        MemoryRepository::check_open(&tree, self.id)?;

        let id = repo.inner.next_watcher_id.fetch_add(1, Ordering::Relaxed);
        repo.inner.watchers.insert(
            id,
            Watcher {
                session_id: self.id,
                prefix: key_prefix.to_string(),
                listener,
            },
        );
        trace!(watcher_id = id, prefix = key_prefix, "Watcher registered");
        Ok(())
    }
}

fn validate_key(key: &str) -> Result<()> {
    let valid = key == PATH_SEPARATOR
        || (key.starts_with(PATH_SEPARATOR) && !key.ends_with(PATH_SEPARATOR) && !key.contains("//"));
    if !valid {
        return Err(RepositoryError::InvalidKey(key.to_string()).into());
    }
    Ok(())
}

fn join(
    parent: &str,
    child: &str,
) -> String {
    if parent == PATH_SEPARATOR {
        format!("{}{}", PATH_SEPARATOR, child)
    } else {
        format!("{}{}{}", parent, PATH_SEPARATOR, child)
    }
}
