use std::sync::Arc;
use std::time::Duration;

use d_coord::ClusterPersistRepository;
use d_coord::DispatchEvent;
use d_coord::MemoryRepository;
use d_coord::RuleItemEvent;
use d_coord::VersionNodePath;
use d_coord::VersionPersistService;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::common::start_context;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TableRule {
    actual_data_nodes: String,
    key_generate_column: Option<String>,
}

async fn next_rule_event(rx: &mut broadcast::Receiver<DispatchEvent>) -> RuleItemEvent {
    timeout(Duration::from_secs(2), async {
        loop {
            if let DispatchEvent::RuleItem(event) = rx.recv().await.unwrap() {
                return event;
            }
        }
    })
    .await
    .unwrap()
}

/// # Case 1: Only the newest version is kept
#[tokio::test]
async fn test_persist_keeps_only_active_version() {
    let repo = MemoryRepository::new();
    let session = repo.session();
    let service = VersionPersistService::new(Arc::new(session.clone()));
    let path = VersionNodePath::new("/metadata/sharding_db/schemas/public/tables/t_order");

    assert_eq!(service.load_content(&path).await.unwrap(), None);

    service.persist(&path, "v1").await.unwrap();
    let version = service.persist(&path, "v2").await.unwrap();

    assert_eq!(version, 1);
    assert_eq!(service.load_content(&path).await.unwrap(), Some("v2".to_string()));
    assert_eq!(
        session.get_children_keys(&path.versions_path()).await.unwrap(),
        vec!["1".to_string()]
    );
}

#[tokio::test]
async fn test_persist_after_stragglers() {
    let repo = MemoryRepository::new();
    let session = repo.session();
    let service = VersionPersistService::new(Arc::new(session.clone()));
    let path = VersionNodePath::new("/props");
    for n in 0..3 {
        session.persist(&path.version_path(n), "old").await.unwrap();
    }
    session.persist(&path.active_version_path(), "2").await.unwrap();

    assert_eq!(service.persist(&path, "v").await.unwrap(), 3);
    assert_eq!(
        session.get_children_keys(&path.versions_path()).await.unwrap(),
        vec!["3".to_string()]
    );
    assert_eq!(service.load_content_at(&path, 3).await.unwrap(), Some("v".to_string()));
}

/// # Case 2: Peers follow typed rule changes through the active version
///
/// ## Validation criteria
/// - an altered event carries the version that is now active
/// - the optimistic read rejects a version that is no longer active
/// - dropping the item is observed by the peer
#[tokio::test]
async fn test_rule_changes_reach_peers() {
    let repo = MemoryRepository::new();
    let (writer, _w) = start_context(&repo, "writer").await;
    let (reader, _r) = start_context(&repo, "reader").await;
    let mut events = reader.subscribe();

    let rule = TableRule {
        actual_data_nodes: "ds_${0..1}.t_order_${0..1}".to_string(),
        key_generate_column: Some("order_id".to_string()),
    };
    writer.rules().persist_named("tables", "t_order", &rule).await.unwrap();
    assert_eq!(
        next_rule_event(&mut events).await,
        RuleItemEvent::RuleItemAltered {
            item_type: "tables".to_string(),
            name: Some("t_order".to_string()),
            version: 0,
        }
    );
    assert_eq!(
        reader.rules().load_named::<TableRule>("tables", "t_order").await.unwrap(),
        Some(rule.clone())
    );

    let changed = TableRule {
        key_generate_column: None,
        ..rule
    };
    writer.rules().persist_named("tables", "t_order", &changed).await.unwrap();
    let item = reader.rules().paths().named("tables").unwrap().path("t_order");
    assert_eq!(reader.versions().load_validated(&item, 0).await.unwrap(), None);
    assert_eq!(
        next_rule_event(&mut events).await,
        RuleItemEvent::RuleItemAltered {
            item_type: "tables".to_string(),
            name: Some("t_order".to_string()),
            version: 1,
        }
    );

    let items = reader
        .rules()
        .load_named_items::<TableRule>("tables")
        .await
        .unwrap();
    assert_eq!(items, vec![("t_order".to_string(), changed)]);

    writer.rules().drop_named("tables", "t_order").await.unwrap();
    assert_eq!(
        next_rule_event(&mut events).await,
        RuleItemEvent::RuleItemDropped {
            item_type: "tables".to_string(),
            name: Some("t_order".to_string()),
        }
    );
}
