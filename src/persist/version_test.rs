use std::sync::Arc;

use super::*;
use crate::ClusterPersistRepository;
use crate::Error;
use crate::MemoryRepository;
use crate::MockClusterPersistRepository;
use crate::RepositoryError;
use crate::SystemError;
use crate::VersionNodePath;

fn setup() -> (MemoryRepository, Arc<dyn ClusterPersistRepository>, VersionPersistService) {
    let repo = MemoryRepository::new();
    let session: Arc<dyn ClusterPersistRepository> = Arc::new(repo.session());
    let service = VersionPersistService::new(session.clone());
    (repo, session, service)
}

#[tokio::test]
async fn test_first_persist_starts_at_version_zero() {
    let (_repo, store, service) = setup();
    let path = VersionNodePath::new("/rules/authority");

    let version = service.persist(&path, "v1").await.unwrap();

    assert_eq!(version, 0);
    assert_eq!(
        store.get_directly("/rules/authority/active_version").await.unwrap(),
        Some("0".to_string())
    );
    assert_eq!(
        store.get_directly("/rules/authority/versions/0").await.unwrap(),
        Some("v1".to_string())
    );
}

/// # Case 1: Two persists leave only the newest value
///
/// ## Validation criteria
/// - load_content returns the second value
/// - exactly one child remains under versions, the active one
#[tokio::test]
async fn test_second_persist_replaces_value_and_prunes() {
    let (_repo, store, service) = setup();
    let path = VersionNodePath::new("/rules/authority");

    service.persist(&path, "v1").await.unwrap();
    let version = service.persist(&path, "v2").await.unwrap();

    assert_eq!(service.load_content(&path).await.unwrap(), Some("v2".to_string()));
    let children = store.get_children_keys(&path.versions_path()).await.unwrap();
    assert_eq!(children, vec![version.to_string()]);
    assert_eq!(service.load_active_version(&path).await.unwrap(), Some(version));
}

/// # Case 2: Stragglers are pruned
///
/// ## Setup
/// - versions {0,1,2} exist (e.g. left behind by crashed writers)
///
/// ## Validation criteria
/// - active_version = 3, versions/3 = v, versions 0,1,2 deleted
#[tokio::test]
async fn test_persist_after_existing_versions() {
    let (_repo, store, service) = setup();
    let path = VersionNodePath::new("/rules/sharding/t_order");
    for v in 0..3 {
        store
            .persist(&path.version_path(v), &format!("old-{}", v))
            .await
            .unwrap();
    }
    store.persist(&path.active_version_path(), "1").await.unwrap();

    let version = service.persist(&path, "v").await.unwrap();

    assert_eq!(version, 3);
    assert_eq!(
        store.get_directly(&path.active_version_path()).await.unwrap(),
        Some("3".to_string())
    );
    assert_eq!(
        store.get_directly(&path.version_path(3)).await.unwrap(),
        Some("v".to_string())
    );
    assert_eq!(
        store.get_children_keys(&path.versions_path()).await.unwrap(),
        vec!["3"]
    );
}

#[tokio::test]
async fn test_version_numbers_compare_numerically() {
    let (_repo, store, service) = setup();
    let path = VersionNodePath::new("/item");
    store.persist(&path.version_path(9), "a").await.unwrap();
    store.persist(&path.version_path(10), "b").await.unwrap();

    // "10" < "9" lexically; the next version must still be 11
    assert_eq!(service.persist(&path, "c").await.unwrap(), 11);
}

#[tokio::test]
async fn test_load_content_without_active_version_is_absent() {
    let (_repo, _store, service) = setup();
    let path = VersionNodePath::new("/rules/missing");

    assert_eq!(service.load_content(&path).await.unwrap(), None);
    assert_eq!(service.load_active_version(&path).await.unwrap(), None);
}

#[tokio::test]
async fn test_malformed_active_version_is_absent() {
    let (_repo, store, service) = setup();
    let path = VersionNodePath::new("/item");
    store.persist(&path.active_version_path(), "not-a-number").await.unwrap();

    assert_eq!(service.load_content(&path).await.unwrap(), None);
}

#[tokio::test]
async fn test_load_content_at_reads_specific_version() {
    let (_repo, store, service) = setup();
    let path = VersionNodePath::new("/item");
    store.persist(&path.version_path(4), "four").await.unwrap();

    assert_eq!(
        service.load_content_at(&path, 4).await.unwrap(),
        Some("four".to_string())
    );
    assert_eq!(service.load_content_at(&path, 5).await.unwrap(), None);
}

/// # Case 3: Optimistic read discards a version that is no longer active
#[tokio::test]
async fn test_load_validated_discards_stale_version() {
    let (_repo, store, service) = setup();
    let path = VersionNodePath::new("/item");

    let first = service.persist(&path, "one").await.unwrap();
    assert_eq!(
        service.load_validated(&path, first).await.unwrap(),
        Some("one".to_string())
    );

    // Simulate a concurrent writer that moved the pointer but has not pruned yet
    store.persist(&path.version_path(first + 1), "two").await.unwrap();
    store
        .persist(&path.active_version_path(), &(first + 1).to_string())
        .await
        .unwrap();

    assert_eq!(service.load_validated(&path, first).await.unwrap(), None);
    assert_eq!(
        service.load_validated(&path, first + 1).await.unwrap(),
        Some("two".to_string())
    );
}

#[tokio::test]
async fn test_delete_removes_item() {
    let (_repo, store, service) = setup();
    let path = VersionNodePath::new("/item");
    service.persist(&path, "x").await.unwrap();

    service.delete(&path).await.unwrap();

    assert_eq!(service.load_content(&path).await.unwrap(), None);
    assert!(store
        .get_children_keys(&path.versions_path())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_store_failure_is_surfaced() {
    let mut mock = MockClusterPersistRepository::new();
    mock.expect_get_children_keys()
        .returning(|_| Err(RepositoryError::Unavailable("down".into()).into()));
    mock.expect_persist().never();

    let service = VersionPersistService::new(Arc::new(mock));
    let result = service.persist(&VersionNodePath::new("/item"), "x").await;

    assert!(matches!(
        result,
        Err(Error::System(SystemError::Repository(RepositoryError::Unavailable(_))))
    ));
}

#[tokio::test]
async fn test_failed_pointer_write_leaves_old_version_active() {
    let mut mock = MockClusterPersistRepository::new();
    mock.expect_get_children_keys()
        .returning(|_| Ok(vec!["0".to_string()]));
    mock.expect_persist()
        .withf(|key, _| key == "/item/versions/1")
        .times(1)
        .returning(|_, _| Ok(()));
    mock.expect_persist()
        .withf(|key, _| key == "/item/active_version")
        .times(1)
        .returning(|_, _| Err(RepositoryError::Unavailable("down".into()).into()));
    // No pruning after a failed pointer update
    mock.expect_delete().never();

    let service = VersionPersistService::new(Arc::new(mock));
    assert!(service.persist(&VersionNodePath::new("/item"), "x").await.is_err());
}

#[tokio::test]
async fn test_exhausted_version_counter_is_an_error() {
    let (_repo, store, service) = setup();
    let path = VersionNodePath::new("/item");
    store.persist(&path.version_path(u64::MAX), "last").await.unwrap();

    let result = service.persist(&path, "next").await;

    assert!(matches!(
        result,
        Err(Error::System(SystemError::VersionExhausted { .. }))
    ));
    assert_eq!(
        store.get_children_keys(&path.versions_path()).await.unwrap(),
        vec![u64::MAX.to_string()]
    );
}
