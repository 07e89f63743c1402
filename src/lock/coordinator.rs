//! Lock/ack coordinator.
//!
//! # Protocol
//!
//! ```text
//! Acquirer                              Participant (every other online node)
//!  write lease (global: locks/<s>@<me>,
//!               database: leases/<seq>)
//!  wait until effective holder  ------>  Locked(scope, token) to subscribers
//!  snapshot online participants          subscriber quiesces, calls ack()
//!  wait AckLocked(token) from each <---  write ack/<...> = token
//!  Locked
//!  ...
//!  delete lease                 ------>  delete own ack, LockReleased to subscribers
//! ```
//!
//! Every node runs one coordinator. Store notifications are decoded by the
//! lock watchers and queued to the coordinator's processing loop, which is the
//! only writer of the per-scope view. Acquirers wait on a generation counter
//! bumped after each processed event, with a poll interval fallback, and every
//! wait is bounded by the caller's deadline.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use autometrics::autometrics;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::config::is_plain_identifier;
use crate::utils::async_task::jittered_delay;
use crate::utils::async_task::spawn_task;
use crate::BackoffPolicy;
use crate::ClusterPersistRepository;
use crate::ComputeNodePersistService;
use crate::CoordinatorConfig;
use crate::DatabaseLockNodePath;
use crate::GlobalLockNodePath;
use crate::LockConfig;
use crate::LockError;
use crate::LockEvent;
use crate::LockNameDefinition;
use crate::LockScope;
use crate::LockState;
use crate::Result;
use crate::API_SLO;
use crate::LOCK_ACK_METRIC;
use crate::LOCK_ACQUIRE_DURATION_METRIC;
use crate::LOCK_ACQUIRE_METRIC;

#[derive(Debug, Clone)]
struct LockHolder {
    token: String,
    holder: Option<String>,
    /// Global: observation order. Database: lease sequence.
    order: u64,
}

/// Local view of one scope, written only by the processing loop (holders,
/// acks) and by the owning instance's own calls (own, acked_token)
#[derive(Debug, Default)]
struct ScopeState {
    own: LockState,
    own_token: Option<String>,
    holders: Vec<LockHolder>,
    /// instance id -> token of the round it acked
    acks: HashMap<String, String>,
    /// Foreign round announced to subscribers
    active_foreign: Option<String>,
    /// Round this instance wrote its ack for
    acked_token: Option<String>,
}

impl ScopeState {
    fn effective(&self) -> Option<&LockHolder> {
        self.holders.iter().min_by_key(|h| h.order)
    }

    fn pending_acks<'a>(
        &self,
        required: impl Iterator<Item = &'a String>,
        token: &str,
    ) -> usize {
        required
            .filter(|id| self.acks.get(*id).map(String::as_str) != Some(token))
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcquireOutcome {
    Acquired,
    TimedOut,
    Cancelled,
    Contended,
}

impl AcquireOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            AcquireOutcome::Acquired => "acquired",
            AcquireOutcome::TimedOut => "timeout",
            AcquireOutcome::Cancelled => "cancelled",
            AcquireOutcome::Contended => "contended",
        }
    }
}

enum Wait {
    Changed,
    Tick,
    Stop(AcquireOutcome),
}

struct CoordinatorInner {
    instance_id: String,
    repository: Arc<dyn ClusterPersistRepository>,
    registry: ComputeNodePersistService,
    global_paths: GlobalLockNodePath,
    database_paths: DatabaseLockNodePath,
    config: LockConfig,
    contention: BackoffPolicy,

    scopes: DashMap<LockScope, ScopeState>,
    observation: AtomicU64,

    /// Bumped after every processed event
    generation: watch::Sender<u64>,
    subscribers: broadcast::Sender<LockEvent>,

    event_tx: mpsc::UnboundedSender<LockEvent>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<LockEvent>>>,

    running: AtomicBool,
    shutdown: CancellationToken,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

/// Per-process lock coordinator. Cheap to clone.
#[derive(Clone)]
pub struct LockCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl std::fmt::Debug for LockCoordinator {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("LockCoordinator")
            .field("instance_id", &self.inner.instance_id)
            .field("scopes", &self.inner.scopes.len())
            .field("running", &self.inner.running.load(Ordering::Acquire))
            .finish()
    }
}

impl LockCoordinator {
    pub fn new(
        instance_id: impl Into<String>,
        repository: Arc<dyn ClusterPersistRepository>,
        registry: ComputeNodePersistService,
        global_paths: GlobalLockNodePath,
        database_paths: DatabaseLockNodePath,
        config: &CoordinatorConfig,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (generation, _) = watch::channel(0);
        let (subscribers, _) = broadcast::channel(config.watch.subscriber_buffer_size);

        Self {
            inner: Arc::new(CoordinatorInner {
                instance_id: instance_id.into(),
                repository,
                registry,
                global_paths,
                database_paths,
                config: config.lock.clone(),
                contention: config.retry.lock_contention,
                scopes: DashMap::new(),
                observation: AtomicU64::new(0),
                generation,
                subscribers,
                event_tx,
                event_rx: Mutex::new(Some(event_rx)),
                running: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
                loop_handle: Mutex::new(None),
            }),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.inner.instance_id
    }

    /// Queue feeding the processing loop; the watch dispatcher routes
    /// decoded lock events here
    pub fn event_sender(&self) -> mpsc::UnboundedSender<LockEvent> {
        self.inner.event_tx.clone()
    }

    /// Foreign rounds starting (`Locked`) and ending (`LockReleased`).
    /// A subscriber answers `Locked` with [`Self::ack`] once quiescent.
    pub fn subscribe(&self) -> broadcast::Receiver<LockEvent> {
        self.inner.subscribers.subscribe()
    }

    /// Seed the local view from existing lock nodes and start processing
    /// queued events. The watches feeding [`Self::event_sender`] must already
    /// be registered so nothing is missed between seeding and processing.
    pub async fn start(&self) -> Result<()> {
        let rx = self
            .inner
            .event_rx
            .lock()
            .take()
            .ok_or(LockError::AlreadyStarted)?;

        self.inner.seed().await?;
        self.inner.running.store(true, Ordering::Release);

        let inner = self.inner.clone();
        let handle = spawn_task("lock-coordinator", move || inner.run(rx));
        *self.inner.loop_handle.lock() = Some(handle);

        info!(instance_id = %self.inner.instance_id, "Lock coordinator started");
        Ok(())
    }

    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::Release);
        self.inner.shutdown.cancel();
    }

    /// Wait for the processing loop to exit after [`Self::stop`]
    pub async fn join(&self) -> Result<()> {
        let handle = self.inner.loop_handle.lock().take();
        if let Some(handle) = handle {
            handle.await?;
        }
        Ok(())
    }

    pub fn default_timeout(&self) -> Duration {
        self.inner.config.default_timeout()
    }

    pub fn lock_state(
        &self,
        scope: &LockScope,
    ) -> LockState {
        self.inner
            .scopes
            .get(scope)
            .map(|st| st.own)
            .unwrap_or_default()
    }

    /// True while a foreign round holds `scope`
    pub fn is_locked_by_others(
        &self,
        scope: &LockScope,
    ) -> bool {
        self.inner
            .scopes
            .get(scope)
            .map(|st| st.active_foreign.is_some())
            .unwrap_or(false)
    }

    /// Acquire `scope`, waiting at most `timeout` for lease order and acks.
    /// Returns false (lease removed) when the deadline passes.
    pub async fn try_lock(
        &self,
        scope: &LockScope,
        timeout: Duration,
    ) -> Result<bool> {
        self.try_lock_with_cancel(scope, timeout, CancellationToken::new())
            .await
    }

    /// [`Self::try_lock`] that also gives up, removing the lease, when
    /// `cancel` fires
    #[autometrics(objective = API_SLO)]
    pub async fn try_lock_with_cancel(
        &self,
        scope: &LockScope,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<bool> {
        scope.validate()?;
        if !self.inner.running.load(Ordering::Acquire) {
            return Err(LockError::NotRunning.into());
        }

        {
            let mut st = self.inner.scopes.entry(scope.clone()).or_default();
            if st.own != LockState::Unlocked {
                return Err(LockError::AlreadyRequested {
                    scope: scope.to_string(),
                }
                .into());
            }
            st.own = LockState::Requested;
        }

        let started = Instant::now();
        let deadline = started + timeout;
        debug!(scope = %scope, ?timeout, "Lock requested");

        let outcome = match scope {
            LockScope::Global(name) => {
                self.inner
                    .acquire_global(scope, name, deadline, &cancel)
                    .await
            }
            LockScope::Database(database) => {
                self.inner
                    .acquire_database(scope, database, deadline, &cancel)
                    .await
            }
        };

        let kind = scope_kind(scope);
        match outcome {
            Ok(AcquireOutcome::Acquired) => {
                if let Some(mut st) = self.inner.scopes.get_mut(scope) {
                    st.own = LockState::Locked;
                }
                LOCK_ACQUIRE_METRIC
                    .with_label_values(&[kind, AcquireOutcome::Acquired.as_str()])
                    .inc();
                LOCK_ACQUIRE_DURATION_METRIC
                    .with_label_values(&[kind])
                    .observe(started.elapsed().as_millis() as f64);
                info!(scope = %scope, elapsed = ?started.elapsed(), "Lock acquired");
                Ok(true)
            }
            Ok(outcome) => {
                LOCK_ACQUIRE_METRIC
                    .with_label_values(&[kind, outcome.as_str()])
                    .inc();
                warn!(scope = %scope, outcome = outcome.as_str(), "Lock not acquired, releasing lease");
                self.inner.abandon(scope).await?;
                Ok(false)
            }
            Err(e) => {
                error!(scope = %scope, "Lock acquire failed: {:?}", e);
                if let Err(cleanup) = self.inner.abandon(scope).await {
                    warn!(scope = %scope, "Lease cleanup failed: {:?}", cleanup);
                }
                Err(e)
            }
        }
    }

    /// Release a held scope
    #[autometrics(objective = API_SLO)]
    pub async fn unlock(
        &self,
        scope: &LockScope,
    ) -> Result<()> {
        let token = {
            let Some(mut st) = self.inner.scopes.get_mut(scope) else {
                return Err(LockError::NotHeld {
                    scope: scope.to_string(),
                }
                .into());
            };
            if st.own != LockState::Locked {
                return Err(LockError::NotHeld {
                    scope: scope.to_string(),
                }
                .into());
            }
            st.own = LockState::Releasing;
            st.own_token.clone()
        };

        if let Err(e) = self.inner.delete_lease(scope, token.as_deref()).await {
            if let Some(mut st) = self.inner.scopes.get_mut(scope) {
                st.own = LockState::Locked;
            }
            return Err(e);
        }

        self.inner.reset_own(scope);
        info!(scope = %scope, "Lock released");
        Ok(())
    }

    /// Acknowledge the foreign round currently holding `scope`
    pub async fn ack(
        &self,
        scope: &LockScope,
    ) -> Result<()> {
        if !self.inner.running.load(Ordering::Acquire) {
            return Err(LockError::NotRunning.into());
        }
        let (token, already_acked) = self
            .inner
            .scopes
            .get(scope)
            .and_then(|st| {
                st.active_foreign
                    .clone()
                    .map(|token| (token.clone(), st.acked_token.as_deref() == Some(token.as_str())))
            })
            .ok_or_else(|| LockError::NoRoundInProgress {
                scope: scope.to_string(),
            })?;
        if already_acked {
            return Ok(());
        }

        let path = self.inner.ack_path(scope)?;
        // Delete first so the write is always observed as a new node
        self.inner.repository.delete(&path).await?;
        self.inner.repository.persist_ephemeral(&path, &token).await?;

        let still_current = match self.inner.scopes.get_mut(scope) {
            Some(mut st) if st.active_foreign.as_deref() == Some(token.as_str()) => {
                st.acked_token = Some(token.clone());
                true
            }
            _ => false,
        };
        if !still_current {
            debug!(scope = %scope, token = %token, "Round ended while acking, retracting ack");
            self.inner.repository.delete(&path).await?;
            return Ok(());
        }

        LOCK_ACK_METRIC.with_label_values(&[scope_kind(scope)]).inc();
        debug!(scope = %scope, token = %token, "Acked foreign lock round");
        Ok(())
    }

    /// Delete every lease this instance holds or is requesting and retract
    /// its acks. Part of graceful shutdown, after [`Self::stop`]: the store
    /// session may outlive the coordinator and keep these nodes alive.
    ///
    /// Every scope is attempted; the first failure is returned.
    pub async fn release_all(&self) -> Result<()> {
        let owned: Vec<(LockScope, bool, bool)> = self
            .inner
            .scopes
            .iter_mut()
            .map(|mut entry| {
                let held = entry.own != LockState::Unlocked;
                let acked = entry.acked_token.take().is_some();
                // An ack in flight sees its round gone and retracts itself
                entry.active_foreign = None;
                (entry.key().clone(), held, acked)
            })
            .filter(|(_, held, acked)| *held || *acked)
            .collect();

        let mut first_error = None;
        for (scope, held, acked) in owned {
            if held {
                match self.inner.abandon(&scope).await {
                    Ok(()) => info!(scope = %scope, "Lock released on shutdown"),
                    Err(e) => {
                        warn!(scope = %scope, "Failed to release lock on shutdown: {:?}", e);
                        first_error.get_or_insert(e);
                    }
                }
            }
            if acked {
                let retracted = match self.inner.ack_path(&scope) {
                    Ok(path) => self.inner.repository.delete(&path).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = retracted {
                    warn!(scope = %scope, "Failed to retract ack on shutdown: {:?}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl CoordinatorInner {
    async fn run(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<LockEvent>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                }
            }
        }
        info!(instance_id = %self.instance_id, "Lock coordinator stopped");
        Ok(())
    }

    async fn handle_event(
        &self,
        event: LockEvent,
    ) {
        let scope = event.scope().clone();
        debug!(instance_id = %self.instance_id, ?event, "Lock event");
        self.apply(event);
        self.reconcile(&scope).await;
        self.generation.send_modify(|g| *g += 1);
    }

    /// Fold one event into the local view. Idempotent so seeding and queued
    /// events may overlap.
    fn apply(
        &self,
        event: LockEvent,
    ) {
        match event {
            LockEvent::Locked {
                scope,
                token,
                holder,
            } => {
                let order = match &scope {
                    LockScope::Database(_) => token.parse::<u64>().unwrap_or(u64::MAX),
                    LockScope::Global(_) => self.observation.fetch_add(1, Ordering::Relaxed),
                };
                let mut st = self.scopes.entry(scope).or_default();
                if !st.holders.iter().any(|h| h.token == token) {
                    st.holders.push(LockHolder {
                        token,
                        holder,
                        order,
                    });
                }
            }
            LockEvent::LockReleased { scope, token } => {
                if let Some(mut st) = self.scopes.get_mut(&scope) {
                    st.holders.retain(|h| h.token != token);
                }
            }
            LockEvent::AckLocked {
                scope,
                instance_id,
                token,
            } => {
                // May arrive before the Locked it answers; kept until retracted
                self.scopes
                    .entry(scope)
                    .or_default()
                    .acks
                    .insert(instance_id, token);
            }
            LockEvent::AckLockReleased { scope, instance_id } => {
                if let Some(mut st) = self.scopes.get_mut(&scope) {
                    st.acks.remove(&instance_id);
                }
            }
        }
    }

    /// Announce effective holder changes of foreign rounds to subscribers,
    /// retracting this instance's ack when the acked round ends
    async fn reconcile(
        &self,
        scope: &LockScope,
    ) {
        let (ended, started) = {
            let Some(mut st) = self.scopes.get_mut(scope) else {
                return;
            };
            let foreign = st
                .effective()
                .filter(|h| {
                    h.holder.as_deref() != Some(self.instance_id.as_str())
                        && st.own_token.as_deref() != Some(h.token.as_str())
                })
                .map(|h| (h.token.clone(), h.holder.clone()));

            if st.active_foreign.as_deref() == foreign.as_ref().map(|(t, _)| t.as_str()) {
                return;
            }

            let ended = st.active_foreign.take().map(|old| {
                let acked = st.acked_token.as_deref() == Some(old.as_str());
                if acked {
                    st.acked_token = None;
                }
                (old, acked)
            });
            (ended, foreign)
        };

        if let Some((token, acked)) = ended {
            if acked {
                match self.ack_path(scope) {
                    Ok(path) => {
                        if let Err(e) = self.repository.delete(&path).await {
                            error!(scope = %scope, "Failed to retract ack: {:?}", e);
                        }
                    }
                    Err(e) => error!(scope = %scope, "Invalid ack path: {:?}", e),
                }
            }
            debug!(scope = %scope, token = %token, "Foreign lock round ended");
            let _ = self.subscribers.send(LockEvent::LockReleased {
                scope: scope.clone(),
                token,
            });
        }

        if let Some((token, holder)) = started {
            if let Some(mut st) = self.scopes.get_mut(scope) {
                st.active_foreign = Some(token.clone());
            }
            debug!(scope = %scope, token = %token, ?holder, "Foreign lock round started");
            let _ = self.subscribers.send(LockEvent::Locked {
                scope: scope.clone(),
                token,
                holder,
            });
        }
    }

    async fn seed(&self) -> Result<()> {
        let locks_path = self.global_paths.locks_path();
        for child in self.repository.get_children_keys(&locks_path).await? {
            if let Ok(name) = LockNameDefinition::parse(&child) {
                self.apply(LockEvent::Locked {
                    scope: LockScope::Global(name.subject().to_string()),
                    token: name.format(),
                    holder: Some(name.instance_id().to_string()),
                });
            }
        }

        let acks_path = self.global_paths.acks_path();
        for child in self.repository.get_children_keys(&acks_path).await? {
            let Ok(name) = LockNameDefinition::parse(&child) else {
                continue;
            };
            if let Some(token) = self.repository.get_directly(&self.global_paths.ack_path(&name)).await? {
                self.apply(LockEvent::AckLocked {
                    scope: LockScope::Global(name.subject().to_string()),
                    instance_id: name.instance_id().to_string(),
                    token,
                });
            }
        }

        let databases = self
            .repository
            .get_children_keys(self.database_paths.root())
            .await?;
        for database in databases.into_iter().filter(|d| is_plain_identifier(d)) {
            let scope = LockScope::Database(database.clone());

            for sequence in self
                .repository
                .get_children_keys(&self.database_paths.leases_path(&database))
                .await?
            {
                let lease_path = self.database_paths.lease_path(&database, &sequence);
                if let Some(holder) = self.repository.get_directly(&lease_path).await? {
                    self.apply(LockEvent::Locked {
                        scope: scope.clone(),
                        token: sequence,
                        holder: Some(holder).filter(|h| !h.is_empty()),
                    });
                }
            }

            for instance_id in self
                .repository
                .get_children_keys(&self.database_paths.acks_path(&database))
                .await?
            {
                let ack_path = self.database_paths.ack_path(&database, &instance_id);
                if let Some(token) = self.repository.get_directly(&ack_path).await? {
                    self.apply(LockEvent::AckLocked {
                        scope: scope.clone(),
                        instance_id,
                        token,
                    });
                }
            }
        }

        let scopes: Vec<LockScope> = self.scopes.iter().map(|e| e.key().clone()).collect();
        for scope in scopes {
            self.reconcile(&scope).await;
        }
        debug!(instance_id = %self.instance_id, scopes = self.scopes.len(), "Lock view seeded");
        Ok(())
    }

    async fn acquire_global(
        &self,
        scope: &LockScope,
        name: &str,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<AcquireOutcome> {
        let definition = LockNameDefinition::new(name, self.instance_id.as_str())?;
        let lock_path = self.global_paths.lock_path(&definition);
        let token = definition.format();
        let mut generation = self.generation.subscribe();
        let mut attempt = 0;
        let mut online = self.registry.load_online_instance_ids().await?;
        let mut last_check = Instant::now();

        loop {
            // No other holder, and every online instance retracted its ack of
            // the previous round. Acks of offline instances stay until their
            // session ends and are ignored.
            loop {
                let clear = self.with_scope(scope, |st| {
                    st.acks.keys().all(|id| !online.contains(id))
                        && st.holders.iter().all(|h| h.token == token)
                });
                if clear {
                    break;
                }
                if let Wait::Stop(outcome) = self.wait(&mut generation, deadline, cancel).await {
                    return Ok(outcome);
                }
                if last_check.elapsed() >= self.config.poll_interval() {
                    online = self.registry.load_online_instance_ids().await?;
                    last_check = Instant::now();
                }
            }

            self.repository
                .persist_ephemeral(&lock_path, &self.instance_id)
                .await?;
            self.set_own_token(scope, Some(token.clone()));

            let contended = self
                .repository
                .get_children_keys(&self.global_paths.locks_path())
                .await?
                .iter()
                .filter_map(|child| LockNameDefinition::parse(child).ok())
                .any(|d| d.subject() == name && d.instance_id() != self.instance_id);
            if !contended {
                break;
            }

            // Retract and retry, so racing acquirers cannot both win
            self.repository.delete(&lock_path).await?;
            self.set_own_token(scope, None);
            attempt += 1;
            debug!(scope = %scope, attempt, "Global lock contended, backing off");

            if self.contention.max_retries != 0 && attempt >= self.contention.max_retries {
                return Ok(AcquireOutcome::Contended);
            }
            let delay = jittered_delay(&self.contention, attempt);
            if let Some(outcome) = self.pause(delay, deadline, cancel).await {
                return Ok(outcome);
            }
        }

        self.await_acks(scope, &token, deadline, cancel).await
    }

    async fn acquire_database(
        &self,
        scope: &LockScope,
        database: &str,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<AcquireOutcome> {
        let leases_path = self.database_paths.leases_path(database);
        let mut generation = self.generation.subscribe();

        let sequence = self
            .repository
            .persist_ephemeral_sequential(&leases_path, &self.instance_id)
            .await?;
        self.set_own_token(scope, Some(sequence.clone()));
        debug!(scope = %scope, lease = %sequence, "Lease written");

        // Lowest live lease holds the lock
        loop {
            let lowest = self
                .repository
                .get_children_keys(&leases_path)
                .await?
                .into_iter()
                .filter_map(|child| child.parse::<u64>().ok().map(|n| (n, child)))
                .min();
            if lowest.as_ref().map(|(_, child)| child) == Some(&sequence) {
                break;
            }
            if let Wait::Stop(outcome) = self.wait(&mut generation, deadline, cancel).await {
                return Ok(outcome);
            }
        }

        self.await_acks(scope, &sequence, deadline, cancel).await
    }

    /// Wait for an ack carrying `token` from every participant online at
    /// this point. Participants going offline are dropped; nodes joining
    /// later are not required.
    async fn await_acks(
        &self,
        scope: &LockScope,
        token: &str,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<AcquireOutcome> {
        let mut generation = self.generation.subscribe();
        let mut required = self.registry.load_online_instance_ids().await?;
        required.remove(&self.instance_id);
        debug!(scope = %scope, token, participants = required.len(), "Awaiting acks");

        let mut last_check = Instant::now();
        loop {
            let pending = self.with_scope(scope, |st| st.pending_acks(required.iter(), token));
            if pending == 0 {
                return Ok(AcquireOutcome::Acquired);
            }

            if let Wait::Stop(outcome) = self.wait(&mut generation, deadline, cancel).await {
                return Ok(outcome);
            }

            if last_check.elapsed() >= self.config.poll_interval() {
                let online = self.registry.load_online_instance_ids().await?;
                required.retain(|id| {
                    let keep = online.contains(id);
                    if !keep {
                        debug!(scope = %scope, instance_id = %id, "Participant went offline, no ack required");
                    }
                    keep
                });
                last_check = Instant::now();
            }
        }
    }

    async fn wait(
        &self,
        generation: &mut watch::Receiver<u64>,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Wait {
        if Instant::now() >= deadline {
            return Wait::Stop(AcquireOutcome::TimedOut);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Wait::Stop(AcquireOutcome::Cancelled),
            _ = tokio::time::sleep_until(deadline) => Wait::Stop(AcquireOutcome::TimedOut),
            changed = generation.changed() => match changed {
                Ok(()) => Wait::Changed,
                Err(_) => Wait::Tick,
            },
            _ = tokio::time::sleep(self.config.poll_interval()) => Wait::Tick,
        }
    }

    async fn pause(
        &self,
        delay: Duration,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Option<AcquireOutcome> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Some(AcquireOutcome::Cancelled),
            _ = tokio::time::sleep_until(deadline) => Some(AcquireOutcome::TimedOut),
            _ = tokio::time::sleep(delay) => None,
        }
    }

    /// Remove whatever lease an unfinished acquire left behind
    async fn abandon(
        &self,
        scope: &LockScope,
    ) -> Result<()> {
        let token = self.scopes.get(scope).and_then(|st| st.own_token.clone());
        let result = self.delete_lease(scope, token.as_deref()).await;
        self.reset_own(scope);
        result
    }

    async fn delete_lease(
        &self,
        scope: &LockScope,
        token: Option<&str>,
    ) -> Result<()> {
        match (scope, token) {
            // The global lock node name is deterministic
            (LockScope::Global(name), _) => {
                let definition = LockNameDefinition::new(name.as_str(), self.instance_id.as_str())?;
                self.repository
                    .delete(&self.global_paths.lock_path(&definition))
                    .await
            }
            (LockScope::Database(database), Some(sequence)) => {
                self.repository
                    .delete(&self.database_paths.lease_path(database, sequence))
                    .await
            }
            (LockScope::Database(_), None) => Ok(()),
        }
    }

    fn reset_own(
        &self,
        scope: &LockScope,
    ) {
        if let Some(mut st) = self.scopes.get_mut(scope) {
            st.own = LockState::Unlocked;
            st.own_token = None;
        }
        self.generation.send_modify(|g| *g += 1);
    }

    fn set_own_token(
        &self,
        scope: &LockScope,
        token: Option<String>,
    ) {
        self.scopes.entry(scope.clone()).or_default().own_token = token;
    }

    fn with_scope<R>(
        &self,
        scope: &LockScope,
        f: impl FnOnce(&ScopeState) -> R,
    ) -> R {
        match self.scopes.get(scope) {
            Some(st) => f(st.value()),
            None => f(&ScopeState::default()),
        }
    }

    fn ack_path(
        &self,
        scope: &LockScope,
    ) -> Result<String> {
        Ok(match scope {
            LockScope::Global(name) => {
                let definition = LockNameDefinition::new(name.as_str(), self.instance_id.as_str())?;
                self.global_paths.ack_path(&definition)
            }
            LockScope::Database(database) => self.database_paths.ack_path(database, &self.instance_id),
        })
    }
}

fn scope_kind(scope: &LockScope) -> &'static str {
    match scope {
        LockScope::Global(_) => "global",
        LockScope::Database(_) => "database",
    }
}
