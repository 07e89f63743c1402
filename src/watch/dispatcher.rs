//! Routing of decoded store changes.
//!
//! ```text
//! store notification thread:
//!   listener.on_change() -> builder.build() -> send(event_queue)   [never blocks]
//!                                                   |
//! routing task:                                     v
//!   event_queue.recv() -> Lock events -> coordinator queue
//!                      -> every event -> broadcast subscribers
//! ```
//!
//! The queue is unbounded: lock protocol events must never be dropped.
//! Broadcast subscribers that fall behind lag and lose their oldest events.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::utils::async_task::spawn_task;
use crate::ClusterPersistRepository;
use crate::DataChangedEvent;
use crate::DispatchEvent;
use crate::DispatchEventBuilder;
use crate::LockEvent;
use crate::Result;
use crate::WatchConfig;
use crate::DROPPED_WATCH_EVENT_METRIC;

pub struct WatchDispatcher {
    repository: Arc<dyn ClusterPersistRepository>,
    builders: Vec<Arc<dyn DispatchEventBuilder>>,
    lock_sink: Option<mpsc::UnboundedSender<LockEvent>>,
    subscribers: broadcast::Sender<DispatchEvent>,

    started: AtomicBool,
    shutdown: CancellationToken,
    routing_handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for WatchDispatcher {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("WatchDispatcher")
            .field("builders", &self.builders.len())
            .field("started", &self.started.load(Ordering::Acquire))
            .finish()
    }
}

impl WatchDispatcher {
    /// `lock_sink` receives every decoded lock event, usually the lock
    /// coordinator's [`event_sender`](crate::LockCoordinator::event_sender)
    pub fn new(
        repository: Arc<dyn ClusterPersistRepository>,
        builders: Vec<Arc<dyn DispatchEventBuilder>>,
        lock_sink: Option<mpsc::UnboundedSender<LockEvent>>,
        config: &WatchConfig,
    ) -> Self {
        let (subscribers, _) = broadcast::channel(config.subscriber_buffer_size);
        Self {
            repository,
            builders,
            lock_sink,
            subscribers,
            started: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            routing_handle: Mutex::new(None),
        }
    }

    /// Every decoded event, lock events included
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.subscribers.subscribe()
    }

    /// Register one store watch per subscribed key and start routing.
    ///
    /// Watches are registered before this returns, so changes written
    /// afterwards are never missed. A second call is a no-op.
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            warn!("Watch dispatcher already started");
            return Ok(());
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel::<DispatchEvent>();

        for builder in &self.builders {
            for key in builder.subscribed_keys() {
                let builder = builder.clone();
                let event_tx = event_tx.clone();
                let listener = move |event: DataChangedEvent| {
                    let Some(decoded) = builder.build(&event) else {
                        return;
                    };
                    if event_tx.send(decoded).is_err() {
                        trace!(key = %event.key, "Watch dispatcher stopped, event dropped");
                        DROPPED_WATCH_EVENT_METRIC
                            .with_label_values(&["dispatcher_stopped"])
                            .inc();
                    }
                };
                if let Err(e) = self.repository.watch(&key, Arc::new(listener)).await {
                    self.started.store(false, Ordering::Release);
                    return Err(e);
                }
                debug!(key = %key, "Watch registered");
            }
        }

        let lock_sink = self.lock_sink.clone();
        let subscribers = self.subscribers.clone();
        let shutdown = self.shutdown.clone();
        let handle = spawn_task("watch-dispatcher", move || {
            route(event_rx, lock_sink, subscribers, shutdown)
        });
        *self.routing_handle.lock() = Some(handle);

        info!(builders = self.builders.len(), "Watch dispatcher started");
        Ok(())
    }

    /// Stop routing. Store watches stay registered but their events are
    /// discarded.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Wait for the routing task to exit after [`Self::stop`]
    pub async fn join(&self) -> Result<()> {
        let handle = self.routing_handle.lock().take();
        if let Some(handle) = handle {
            handle.await?;
        }
        Ok(())
    }
}

async fn route(
    mut event_rx: mpsc::UnboundedReceiver<DispatchEvent>,
    lock_sink: Option<mpsc::UnboundedSender<LockEvent>>,
    subscribers: broadcast::Sender<DispatchEvent>,
    shutdown: CancellationToken,
) -> Result<()> {
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = event_rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        if let (DispatchEvent::Lock(lock_event), Some(sink)) = (&event, &lock_sink) {
            if sink.send(lock_event.clone()).is_err() {
                warn!(?lock_event, "Lock coordinator queue closed, event dropped");
                DROPPED_WATCH_EVENT_METRIC
                    .with_label_values(&["coordinator_stopped"])
                    .inc();
            }
        }

        // Err only means nobody is subscribed
        let _ = subscribers.send(event);
    }
    info!("Watch dispatcher stopped");
    Ok(())
}
