//! Integration tests for degraded stores and caches.
//!
//! The add protocol earns its keep when the backend misbehaves. These
//! tests rig the in-memory store to refuse or fail, break the cache, and
//! poison the subscription, then check the service reverts, propagates,
//! or shrugs exactly where it should.

#![allow(clippy::unwrap_used)]

use shopez_cart::{CartError, MergeBehavior, RemoteCartStore};
use shopez_core::{ProductId, UserId};
use shopez_integration_tests::{WAIT, identity, item, memory_service, signed_in, wait_until};

// =============================================================================
// Add Reverts
// =============================================================================

#[tokio::test]
async fn test_failed_merge_and_fallback_revert_to_the_prior_snapshot() {
    let (service, store, cache) = signed_in("u1").await;
    let mut state = service.state();
    service.add_to_cart(item(1, 2)).await.unwrap();
    let before = wait_until(&mut state, |s| !s.loading && s.cart.total_quantity() == 2).await;

    store.set_merge_behavior(MergeBehavior::Fail);
    store.fail_reads(true);

    let err = service.add_to_cart(item(1, 3)).await.unwrap_err();
    assert!(matches!(err, CartError::Remote(_)));

    // Exact revert, in memory and in the cache, and the remote never saw
    // the failed add.
    assert_eq!(service.current().cart, before.cart);
    assert_eq!(cache.cached(&UserId::new("u1")).unwrap(), before.cart);
    let remote = store.cart(&UserId::new("u1")).unwrap();
    assert_eq!(remote.get(ProductId::new(1)).unwrap().quantity, 2);
}

#[tokio::test]
async fn test_refused_merge_with_failing_write_reverts() {
    let (service, store, _) = signed_in("u1").await;
    let mut state = service.state();
    service.add_to_cart(item(1, 2)).await.unwrap();
    let before = wait_until(&mut state, |s| !s.loading && s.cart.total_quantity() == 2).await;

    // The merge is refused, the fallback read works, and then the write
    // dies. Still a full revert.
    store.set_merge_behavior(MergeBehavior::Refuse);
    store.fail_writes(true);

    let err = service.add_to_cart(item(1, 3)).await.unwrap_err();
    assert!(matches!(err, CartError::Remote(_)));
    assert_eq!(service.current().cart, before.cart);
    let remote = store.cart(&UserId::new("u1")).unwrap();
    assert_eq!(remote.get(ProductId::new(1)).unwrap().quantity, 2);
}

#[tokio::test]
async fn test_first_add_revert_leaves_an_empty_cart() {
    let (service, store, cache) = signed_in("u1").await;
    store.set_merge_behavior(MergeBehavior::Fail);
    store.fail_reads(true);

    let err = service.add_to_cart(item(1, 2)).await.unwrap_err();
    assert!(matches!(err, CartError::Remote(_)));

    assert!(service.current().cart.is_empty());
    assert!(cache.cached(&UserId::new("u1")).unwrap().is_empty());
    assert!(store.cart(&UserId::new("u1")).is_none());
}

// =============================================================================
// Remove / Update Propagation
// =============================================================================

#[tokio::test]
async fn test_remove_and_update_failures_propagate() {
    let (service, store, _) = signed_in("u1").await;
    let mut state = service.state();
    service.add_to_cart(item(1, 2)).await.unwrap();
    wait_until(&mut state, |s| !s.loading && s.cart.total_quantity() == 2).await;

    store.fail_writes(true);

    let err = service.remove_item(ProductId::new(1)).await.unwrap_err();
    assert!(matches!(err, CartError::Remote(_)));
    let err = service.update_quantity(ProductId::new(1), 7).await.unwrap_err();
    assert!(matches!(err, CartError::Remote(_)));

    // No optimistic step, so nothing to undo: local and remote both stand.
    assert_eq!(service.current().cart.total_quantity(), 2);
    let remote = store.cart(&UserId::new("u1")).unwrap();
    assert_eq!(remote.get(ProductId::new(1)).unwrap().quantity, 2);
}

// =============================================================================
// Cache Degradation
// =============================================================================

#[tokio::test]
async fn test_broken_cache_never_blocks_the_remote_path() {
    let (service, store, cache) = memory_service();
    cache.fail_loads(true);
    cache.fail_stores(true);
    let mut state = service.state();

    service.set_identity(Some(identity("u1"))).await;
    service.add_to_cart(item(1, 2)).await.unwrap();

    let remote = store.cart(&UserId::new("u1")).unwrap();
    assert_eq!(remote.get(ProductId::new(1)).unwrap().quantity, 2);
    wait_until(&mut state, |s| !s.loading && s.cart.total_quantity() == 2).await;
}

#[tokio::test]
async fn test_hydration_failure_still_reaches_the_remote_cart() {
    let (service, store, cache) = memory_service();
    let uid = UserId::new("u1");
    store.write_item(&uid, &item(1, 4)).await.unwrap();
    cache.fail_loads(true);

    service.set_identity(Some(identity("u1"))).await;

    let state = wait_until(&mut service.state(), |s| !s.loading).await;
    assert_eq!(state.cart.get(ProductId::new(1)).unwrap().quantity, 4);
}

// =============================================================================
// Subscription Errors
// =============================================================================

#[tokio::test]
async fn test_subscription_error_keeps_the_last_known_cart() {
    let (service, store, _) = signed_in("u1").await;
    let uid = UserId::new("u1");
    let mut state = service.state();
    service.add_to_cart(item(1, 2)).await.unwrap();
    wait_until(&mut state, |s| !s.loading && s.cart.total_quantity() == 2).await;

    store.inject_subscription_error(&uid, "socket dropped");

    tokio::time::timeout(WAIT, state.changed())
        .await
        .unwrap()
        .unwrap();
    let seen = state.borrow_and_update().clone();
    assert_eq!(seen.cart.total_quantity(), 2);
    assert!(!seen.loading);

    // The feed itself survives the error: a write from another device
    // still comes through.
    store.write_item(&uid, &item(2, 1)).await.unwrap();
    wait_until(&mut state, |s| s.cart.total_quantity() == 3).await;
}
