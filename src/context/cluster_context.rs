//! Per-process wiring of the coordination components.
//!
//! ## Lifecycle
//! - `start()`: register online, persist labels, assign the worker id, then
//!   start the watch dispatcher and the lock coordinator (watches first, so
//!   the coordinator's seed and its event queue overlap instead of leaving a
//!   gap).
//! - `shutdown()`: stop both loops, then remove this instance's own online,
//!   labels, status, worker id and reservation nodes.
//!
//! Every cache lives in this object; there is no process-wide state besides
//! metrics.
//!
//! ## Example
//! ```ignore
//! let config = CoordinatorConfig::new()?.validate()?;
//! let repository: Arc<dyn ClusterPersistRepository> = Arc::new(MemoryRepository::new().session());
//! let context = ClusterContext::new(config, repository, &["tables"], &["default_strategy"])?;
//! context.start().await?;
//! ...
//! context.shutdown().await?;
//! ```

use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::register_custom_metrics;
use crate::ClusterPersistRepository;
use crate::ComputeNodePath;
use crate::ComputeNodePersistService;
use crate::ComputeNodeStateChangedBuilder;
use crate::CoordinatorConfig;
use crate::DatabaseLockChangedWatcher;
use crate::DatabaseLockNodePath;
use crate::DispatchEvent;
use crate::DispatchEventBuilder;
use crate::GlobalAckChangedWatcher;
use crate::GlobalLockNodePath;
use crate::GlobalLocksChangedWatcher;
use crate::InstanceMetaData;
use crate::LockCoordinator;
use crate::Result;
use crate::RuleItemChangedBuilder;
use crate::RuleNodePath;
use crate::RulePersistService;
use crate::VersionPersistService;
use crate::WatchDispatcher;
use crate::WorkerIdGenerator;
use crate::REGISTRY;

pub struct ClusterContext {
    config: CoordinatorConfig,
    instance: InstanceMetaData,
    repository: Arc<dyn ClusterPersistRepository>,

    registry: ComputeNodePersistService,
    worker_ids: WorkerIdGenerator,
    versions: VersionPersistService,
    rules: RulePersistService,
    coordinator: LockCoordinator,
    dispatcher: WatchDispatcher,

    worker_id: Mutex<Option<u32>>,
    started: AtomicBool,
}

impl std::fmt::Debug for ClusterContext {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ClusterContext")
            .field("instance", &self.instance)
            .field("worker_id", &*self.worker_id.lock())
            .field("started", &self.started.load(Ordering::Acquire))
            .finish()
    }
}

impl ClusterContext {
    /// Validates `config` and builds every component. Nothing is written to
    /// the store until [`Self::start`].
    pub fn new(
        config: CoordinatorConfig,
        repository: Arc<dyn ClusterPersistRepository>,
        named_rule_types: &[&str],
        unique_rule_types: &[&str],
    ) -> Result<Self> {
        let config = config.validate()?;
        register_custom_metrics(&REGISTRY);
        let instance = InstanceMetaData::new(
            config.instance.id.clone(),
            config.instance.instance_type()?,
            config.instance.attributes.clone(),
            config.instance.version.clone(),
        );

        let compute_paths = Arc::new(ComputeNodePath::new(
            config.paths.instance_root.clone(),
            config.paths.worker_id_reservation_root.clone(),
        )?);
        let rule_paths = Arc::new(RuleNodePath::new(
            config.paths.rule_root.clone(),
            named_rule_types,
            unique_rule_types,
        )?);
        let global_paths = GlobalLockNodePath::new(config.paths.global_lock_root.clone())?;
        let database_paths = DatabaseLockNodePath::new(config.paths.database_lock_root.clone())?;

        let registry = ComputeNodePersistService::new(repository.clone(), compute_paths.clone());
        let worker_ids = WorkerIdGenerator::new(
            registry.clone(),
            repository.clone(),
            instance.id.clone(),
            config.worker_id.max_worker_id,
            config.retry.worker_id,
        );
        let coordinator = LockCoordinator::new(
            instance.id.clone(),
            repository.clone(),
            registry.clone(),
            global_paths.clone(),
            database_paths.clone(),
            &config,
        );

        let builders: Vec<Arc<dyn DispatchEventBuilder>> = vec![
            Arc::new(GlobalLocksChangedWatcher::new(global_paths.clone())),
            Arc::new(GlobalAckChangedWatcher::new(global_paths)),
            Arc::new(DatabaseLockChangedWatcher::new(database_paths)),
            Arc::new(ComputeNodeStateChangedBuilder::new(compute_paths)),
            Arc::new(RuleItemChangedBuilder::new(rule_paths.clone())),
        ];
        let dispatcher = WatchDispatcher::new(
            repository.clone(),
            builders,
            Some(coordinator.event_sender()),
            &config.watch,
        );

        Ok(Self {
            versions: VersionPersistService::new(repository.clone()),
            rules: RulePersistService::new(rule_paths, repository.clone()),
            config,
            instance,
            repository,
            registry,
            worker_ids,
            coordinator,
            dispatcher,
            worker_id: Mutex::new(None),
            started: AtomicBool::new(false),
        })
    }

    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            warn!(instance_id = %self.instance.id, "Cluster context already started");
            return Ok(());
        }

        self.registry.register_online(&self.instance).await?;
        let labels: BTreeSet<String> = self.config.instance.labels.iter().cloned().collect();
        self.registry
            .persist_instance_labels(&self.instance.id, &labels)
            .await?;

        let worker_id = self.worker_ids.next_worker_id().await?;
        *self.worker_id.lock() = Some(worker_id);

        self.dispatcher.start().await?;
        self.coordinator.start().await?;

        info!(
            instance_id = %self.instance.id,
            instance_type = %self.instance.instance_type,
            worker_id,
            "Cluster context started"
        );
        Ok(())
    }

    /// Stop background loops and remove this instance's nodes, including
    /// held leases and acks
    pub async fn shutdown(&self) -> Result<()> {
        self.coordinator.stop();
        self.coordinator.join().await?;
        if let Err(e) = self.coordinator.release_all().await {
            error!(instance_id = %self.instance.id, "Failed to release locks on shutdown: {:?}", e);
        }
        self.dispatcher.stop();
        self.dispatcher.join().await?;

        self.registry.offline(&self.instance).await?;
        let worker_id = self.worker_id.lock().take();
        if let Some(worker_id) = worker_id {
            self.repository
                .delete(&self.registry.paths().worker_id_reservation_path(worker_id))
                .await?;
        }

        info!(instance_id = %self.instance.id, "Cluster context shut down");
        Ok(())
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn instance(&self) -> &InstanceMetaData {
        &self.instance
    }

    /// None before [`Self::start`] and after [`Self::shutdown`]
    pub fn worker_id(&self) -> Option<u32> {
        *self.worker_id.lock()
    }

    pub fn registry(&self) -> &ComputeNodePersistService {
        &self.registry
    }

    pub fn versions(&self) -> &VersionPersistService {
        &self.versions
    }

    pub fn rules(&self) -> &RulePersistService {
        &self.rules
    }

    pub fn coordinator(&self) -> &LockCoordinator {
        &self.coordinator
    }

    /// Decoded membership, rule and lock changes
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.dispatcher.subscribe()
    }
}
