use std::sync::Arc;
use std::time::Duration;

use d_coord::ClusterContext;
use d_coord::ClusterPersistRepository;
use d_coord::ComputeNodePath;
use d_coord::ComputeNodePersistService;
use d_coord::CoordinatorConfig;
use d_coord::LockCoordinator;
use d_coord::LockEvent;
use d_coord::MemoryRepository;
use d_coord::MemorySession;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub const NAMED_RULE_TYPES: &[&str] = &["tables", "algorithms"];
pub const UNIQUE_RULE_TYPES: &[&str] = &["default_strategy"];

pub fn config(instance_id: &str) -> CoordinatorConfig {
    let mut config = CoordinatorConfig::default();
    config.instance.id = instance_id.to_string();
    config.lock.poll_interval_ms = 20;
    config
}

pub fn registry(session: &MemorySession) -> ComputeNodePersistService {
    let config = CoordinatorConfig::default();
    ComputeNodePersistService::new(
        Arc::new(session.clone()),
        Arc::new(
            ComputeNodePath::new(
                config.paths.instance_root,
                config.paths.worker_id_reservation_root,
            )
            .unwrap(),
        ),
    )
}

/// Started context on its own store session
pub async fn start_context(
    repo: &MemoryRepository,
    instance_id: &str,
) -> (ClusterContext, MemorySession) {
    let session = repo.session();
    let repository: Arc<dyn ClusterPersistRepository> = Arc::new(session.clone());
    let context = ClusterContext::new(
        config(instance_id),
        repository,
        NAMED_RULE_TYPES,
        UNIQUE_RULE_TYPES,
    )
    .unwrap();
    context.start().await.unwrap();
    (context, session)
}

/// Ack every foreign round as soon as it starts, like a participant with
/// nothing to quiesce
pub fn auto_ack(coordinator: &LockCoordinator) -> JoinHandle<()> {
    let coordinator = coordinator.clone();
    let mut rx = coordinator.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(LockEvent::Locked { scope, .. }) => {
                    let _ = coordinator.ack(&scope).await;
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

pub async fn eventually<F, Fut>(
    what: &str,
    check: F,
) where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached: {}", what);
}
