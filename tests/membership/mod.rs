use std::collections::BTreeSet;
use std::time::Duration;

use d_coord::ComputeNodeEvent;
use d_coord::DispatchEvent;
use d_coord::InstanceMetaData;
use d_coord::InstanceType;
use d_coord::MemoryRepository;
use tokio::time::timeout;

use crate::common::registry;
use crate::common::start_context;

/// # Case 1: A worker id is released when its owner's session ends
///
/// ## Validation criteria
/// - a peer sees exactly the assigned id while the owner is alive
/// - the id disappears with the owner's session, without any explicit delete
#[tokio::test]
async fn test_worker_id_released_with_session() {
    let repo = MemoryRepository::new();
    let a = repo.session();
    let b = repo.session();
    let registry_a = registry(&a);
    let registry_b = registry(&b);

    registry_a
        .register_online(&InstanceMetaData::new("a", InstanceType::Proxy, "10.0.0.1:3307", "5.4.1"))
        .await
        .unwrap();
    registry_a.persist_instance_worker_id("a", 7).await.unwrap();

    assert_eq!(
        registry_b.get_assigned_worker_ids().await.unwrap(),
        BTreeSet::from([7])
    );

    a.close();

    assert!(registry_b.get_assigned_worker_ids().await.unwrap().is_empty());
    assert!(registry_b.load_online_instance_ids().await.unwrap().is_empty());
}

/// # Case 2: A crashed instance's worker id goes to the next instance
#[tokio::test]
async fn test_crashed_instance_worker_id_is_reassigned() {
    let repo = MemoryRepository::new();
    let (a, a_session) = start_context(&repo, "a").await;
    let (b, _b_session) = start_context(&repo, "b").await;
    let crashed_worker_id = a.worker_id();
    assert_ne!(crashed_worker_id, b.worker_id());

    let mut events = b.subscribe();
    a_session.close();

    let offline = timeout(Duration::from_secs(2), async {
        loop {
            if let DispatchEvent::ComputeNode(event @ ComputeNodeEvent::Offline { .. }) =
                events.recv().await.unwrap()
            {
                return event;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(
        offline,
        ComputeNodeEvent::Offline {
            instance_type: InstanceType::Proxy,
            instance_id: "a".to_string(),
        }
    );

    let (c, _c_session) = start_context(&repo, "c").await;
    assert_eq!(c.worker_id(), crashed_worker_id);

    let online: Vec<String> = b
        .registry()
        .load_all_compute_node_instances()
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.metadata.id)
        .collect();
    assert_eq!(online, vec!["b".to_string(), "c".to_string()]);
}

#[tokio::test]
async fn test_graceful_shutdown_frees_worker_id() {
    let repo = MemoryRepository::new();
    let (a, _a_session) = start_context(&repo, "a").await;
    let freed = a.worker_id();

    a.shutdown().await.unwrap();

    let (b, _b_session) = start_context(&repo, "b").await;
    assert_eq!(b.worker_id(), freed);
}
