use std::time::Duration;

use d_coord::ClusterPersistRepository;
use d_coord::LockScope;
use d_coord::LockState;
use d_coord::MemoryRepository;

use crate::common::auto_ack;
use crate::common::eventually;
use crate::common::start_context;

/// # Case 1: Global lock rounds across three instances
///
/// ## Validation criteria
/// - every other instance observes and acks the round
/// - acks are retracted when the round ends
/// - the next holder's round is not satisfied by the previous round's acks
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_global_lock_rounds() {
    let repo = MemoryRepository::new();
    let (a, a_session) = start_context(&repo, "a").await;
    let (b, _b) = start_context(&repo, "b").await;
    let (c, _c) = start_context(&repo, "c").await;
    let _ackers = [
        auto_ack(a.coordinator()),
        auto_ack(b.coordinator()),
        auto_ack(c.coordinator()),
    ];
    let schema = LockScope::global("sharding_db");

    assert!(a.coordinator().try_lock(&schema, Duration::from_secs(3)).await.unwrap());
    assert!(b.coordinator().is_locked_by_others(&schema));
    assert!(c.coordinator().is_locked_by_others(&schema));
    assert_eq!(
        a_session.get_children_keys("/lock/global/ack").await.unwrap(),
        vec!["sharding_db@b".to_string(), "sharding_db@c".to_string()]
    );

    a.coordinator().unlock(&schema).await.unwrap();
    let session = &a_session;
    eventually("acks retracted", || async move {
        session
            .get_children_keys("/lock/global/ack")
            .await
            .unwrap()
            .is_empty()
    })
    .await;

    assert!(c.coordinator().try_lock(&schema, Duration::from_secs(3)).await.unwrap());
    assert_eq!(c.coordinator().lock_state(&schema), LockState::Locked);
    assert!(a.coordinator().is_locked_by_others(&schema));
    c.coordinator().unlock(&schema).await.unwrap();
}

/// # Case 2: A participant crashing mid-round does not wedge the acquirer
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_crashed_participant_is_not_awaited() {
    let repo = MemoryRepository::new();
    let (a, _a) = start_context(&repo, "a").await;
    let (b, _b) = start_context(&repo, "b").await;
    let (c, c_session) = start_context(&repo, "c").await;
    let _acker = auto_ack(b.coordinator());
    let scope = LockScope::database("sharding_db");

    let acquirer = a.coordinator().clone();
    let round = {
        let scope = scope.clone();
        tokio::spawn(async move { acquirer.try_lock(&scope, Duration::from_secs(5)).await })
    };

    // c sees the round but never acks, then its session is lost
    let (observer, watched) = (c.coordinator(), &scope);
    eventually("c observes the round", || async move { observer.is_locked_by_others(watched) }).await;
    c_session.close();

    assert!(round.await.unwrap().unwrap());
    a.coordinator().unlock(&scope).await.unwrap();
}

/// # Case 3: Acks left from an ended round are harmless
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stale_ack_is_tolerated() {
    let repo = MemoryRepository::new();
    let (a, _a) = start_context(&repo, "a").await;
    let (b, _b) = start_context(&repo, "b").await;
    let _ackers = [auto_ack(a.coordinator()), auto_ack(b.coordinator())];
    let scope = LockScope::database("sharding_db");

    assert!(a.coordinator().try_lock(&scope, Duration::from_secs(3)).await.unwrap());
    a.coordinator().unlock(&scope).await.unwrap();

    // Late ack for the ended round from an instance that is not online
    let ghost = repo.session();
    ghost
        .persist_ephemeral("/lock/database/sharding_db/ack/ghost", "0000000000")
        .await
        .unwrap();

    assert!(b.coordinator().try_lock(&scope, Duration::from_secs(3)).await.unwrap());
    b.coordinator().unlock(&scope).await.unwrap();
}

/// # Case 4: Timing out while a peer holds the lock leaves no lease behind
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_timeout_while_held_leaves_no_lease() {
    let repo = MemoryRepository::new();
    let (a, a_session) = start_context(&repo, "a").await;
    let (b, _b) = start_context(&repo, "b").await;
    let _ackers = [auto_ack(a.coordinator()), auto_ack(b.coordinator())];
    let scope = LockScope::database("sharding_db");

    assert!(a.coordinator().try_lock(&scope, Duration::from_secs(3)).await.unwrap());
    assert!(!b.coordinator().try_lock(&scope, Duration::from_millis(300)).await.unwrap());

    assert_eq!(
        a_session
            .get_children_keys("/lock/database/sharding_db/leases")
            .await
            .unwrap()
            .len(),
        1
    );
    assert_eq!(b.coordinator().lock_state(&scope), LockState::Unlocked);
}

/// # Case 5: Graceful shutdown during a round leaves the scope usable
///
/// ## Setup
/// - b acked a's global round, then shuts down with its store session open
///
/// ## Validation criteria
/// - b's ack is retracted by the shutdown itself
/// - a can run the next round on the same subject
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_of_participant_during_round() {
    let repo = MemoryRepository::new();
    let (a, a_session) = start_context(&repo, "a").await;
    let (b, _b_session) = start_context(&repo, "b").await;
    let _ackers = [auto_ack(a.coordinator()), auto_ack(b.coordinator())];
    let schema = LockScope::global("sharding_db");

    assert!(a.coordinator().try_lock(&schema, Duration::from_secs(3)).await.unwrap());
    b.shutdown().await.unwrap();
    a.coordinator().unlock(&schema).await.unwrap();

    let session = &a_session;
    eventually("b's ack retracted", || async move {
        session
            .get_children_keys("/lock/global/ack")
            .await
            .unwrap()
            .is_empty()
    })
    .await;
    assert!(a.coordinator().try_lock(&schema, Duration::from_secs(1)).await.unwrap());
}

/// # Case 6: Graceful shutdown of the holder releases its lock
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_of_holder_releases_lock() {
    let repo = MemoryRepository::new();
    let (a, a_session) = start_context(&repo, "a").await;
    let (b, _b_session) = start_context(&repo, "b").await;
    let _ackers = [auto_ack(a.coordinator()), auto_ack(b.coordinator())];
    let schema = LockScope::global("sharding_db");
    let database = LockScope::database("sharding_db");

    assert!(b.coordinator().try_lock(&schema, Duration::from_secs(3)).await.unwrap());
    assert!(b.coordinator().try_lock(&database, Duration::from_secs(3)).await.unwrap());
    b.shutdown().await.unwrap();

    assert!(a_session.get_children_keys("/lock/global/locks").await.unwrap().is_empty());
    assert!(a_session
        .get_children_keys("/lock/database/sharding_db/leases")
        .await
        .unwrap()
        .is_empty());
    assert!(a.coordinator().try_lock(&schema, Duration::from_secs(1)).await.unwrap());
    assert!(a.coordinator().try_lock(&database, Duration::from_secs(1)).await.unwrap());
}
