use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::*;
use crate::ClusterPersistRepository;
use crate::ComputeNodeEvent;
use crate::ComputeNodePath;
use crate::ComputeNodeStateChangedBuilder;
use crate::DispatchEvent;
use crate::GlobalLockNodePath;
use crate::GlobalLocksChangedWatcher;
use crate::LockEvent;
use crate::LockScope;
use crate::MemoryRepository;
use crate::WatchConfig;

fn dispatcher(
    repo: &MemoryRepository,
    lock_sink: Option<mpsc::UnboundedSender<LockEvent>>,
) -> WatchDispatcher {
    let compute = ComputeNodeStateChangedBuilder::new(Arc::new(
        ComputeNodePath::new("/nodes/compute_nodes", "/reservation/worker_id").unwrap(),
    ));
    let locks = GlobalLocksChangedWatcher::new(GlobalLockNodePath::new("/lock/global").unwrap());
    WatchDispatcher::new(
        Arc::new(repo.session()),
        vec![Arc::new(compute), Arc::new(locks)],
        lock_sink,
        &WatchConfig::default(),
    )
}

async fn next(rx: &mut broadcast::Receiver<DispatchEvent>) -> DispatchEvent {
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("no dispatch event")
        .unwrap()
}

#[tokio::test]
async fn test_events_reach_subscribers() {
    let repo = MemoryRepository::new();
    let d = dispatcher(&repo, None);
    let mut rx = d.subscribe();
    d.start().await.unwrap();

    let writer = repo.session();
    writer
        .persist("/nodes/compute_nodes/worker-id/p1", "4")
        .await
        .unwrap();

    assert_eq!(
        next(&mut rx).await,
        DispatchEvent::ComputeNode(ComputeNodeEvent::WorkerIdChanged {
            instance_id: "p1".to_string(),
            worker_id: Some(4),
        })
    );
}

/// # Case 1: Lock events go to the coordinator queue and to subscribers
#[tokio::test]
async fn test_lock_events_are_routed_to_sink() {
    let repo = MemoryRepository::new();
    let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
    let d = dispatcher(&repo, Some(sink_tx));
    let mut rx = d.subscribe();
    d.start().await.unwrap();

    let writer = repo.session();
    writer
        .persist_ephemeral("/lock/global/locks/schema@a", "a")
        .await
        .unwrap();
    writer
        .persist("/nodes/compute_nodes/labels/a", r#"["x"]"#)
        .await
        .unwrap();

    let expected = LockEvent::Locked {
        scope: LockScope::global("schema"),
        token: "schema@a".to_string(),
        holder: Some("a".to_string()),
    };
    let routed = timeout(Duration::from_secs(1), sink_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(routed, expected);
    assert_eq!(next(&mut rx).await, DispatchEvent::Lock(expected));
    assert!(matches!(
        next(&mut rx).await,
        DispatchEvent::ComputeNode(ComputeNodeEvent::LabelsChanged { .. })
    ));

    // Only lock events reach the sink
    assert!(sink_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_stopped_dispatcher_routes_nothing() {
    let repo = MemoryRepository::new();
    let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
    let d = dispatcher(&repo, Some(sink_tx));
    d.start().await.unwrap();

    d.stop();
    d.join().await.unwrap();

    repo.session()
        .persist_ephemeral("/lock/global/locks/schema@a", "a")
        .await
        .unwrap();

    assert!(timeout(Duration::from_millis(200), sink_rx.recv()).await.is_err());
}

#[tokio::test]
async fn test_second_start_is_noop() {
    let repo = MemoryRepository::new();
    let d = dispatcher(&repo, None);
    let mut rx = d.subscribe();
    d.start().await.unwrap();
    d.start().await.unwrap();

    repo.session()
        .persist("/nodes/compute_nodes/worker-id/p1", "1")
        .await
        .unwrap();
    next(&mut rx).await;

    // A doubled watch would deliver the change twice
    assert!(timeout(Duration::from_millis(200), rx.recv()).await.is_err());
}
