//! Integration tests for the optimistic add protocol.
//!
//! Adding is the only mutation with a multi-stage protocol: optimistic
//! local apply, atomic remote merge, read/write fallback, revert. These
//! tests pin down the quantity accounting across those stages under
//! sequential, concurrent, and cross-device schedules.

#![allow(clippy::unwrap_used)]

use shopez_cart::{CartSyncService, MemoryCartCache, MemoryCartStore, MergeBehavior};
use shopez_core::{ProductId, UserId};
use shopez_integration_tests::{identity, item, signed_in, wait_until};

// =============================================================================
// Committed Merge Path
// =============================================================================

#[tokio::test]
async fn test_sequential_adds_accumulate_to_the_sum() {
    let (service, store, _) = signed_in("u1").await;
    let mut state = service.state();

    service.add_to_cart(item(1, 2)).await.unwrap();
    service.add_to_cart(item(1, 3)).await.unwrap();

    let state = wait_until(&mut state, |s| !s.loading && s.cart.total_quantity() == 5).await;
    assert_eq!(state.cart.get(ProductId::new(1)).unwrap().quantity, 5);

    let remote = store.cart(&UserId::new("u1")).unwrap();
    assert_eq!(remote.get(ProductId::new(1)).unwrap().quantity, 5);
}

#[tokio::test]
async fn test_concurrent_adds_on_one_device_sum() {
    let (service, store, _) = signed_in("u1").await;

    let (a, b) = tokio::join!(
        service.add_to_cart(item(1, 2)),
        service.add_to_cart(item(1, 3)),
    );
    a.unwrap();
    b.unwrap();

    let remote = store.cart(&UserId::new("u1")).unwrap();
    assert_eq!(remote.get(ProductId::new(1)).unwrap().quantity, 5);
}

#[tokio::test]
async fn test_concurrent_adds_of_different_products_both_land() {
    let (service, store, _) = signed_in("u1").await;

    let (a, b) = tokio::join!(
        service.add_to_cart(item(1, 2)),
        service.add_to_cart(item(2, 3)),
    );
    a.unwrap();
    b.unwrap();

    let remote = store.cart(&UserId::new("u1")).unwrap();
    assert_eq!(remote.len(), 2);
    assert_eq!(remote.total_quantity(), 5);
}

/// The end-to-end shape of a first and a second add for one product.
#[tokio::test]
async fn test_add_then_add_again_scenario() {
    let (service, store, _) = signed_in("u1").await;
    let uid = UserId::new("u1");
    // Let the subscription's first delivery land so it cannot overwrite
    // the optimistic value we are about to check.
    let mut state = service.state();
    wait_until(&mut state, |s| !s.loading).await;

    service.add_to_cart(item(1, 2)).await.unwrap();
    let local = service.current();
    assert_eq!(local.cart.get(ProductId::new(1)).unwrap().quantity, 2);
    let slot = store.cart(&uid).unwrap().get(ProductId::new(1)).cloned().unwrap();
    assert_eq!(slot.quantity, 2);
    assert_eq!(slot.title, "Product 1");

    service.add_to_cart(item(1, 3)).await.unwrap();
    let remote = store.cart(&uid).unwrap();
    assert_eq!(remote.get(ProductId::new(1)).unwrap().quantity, 5);
}

#[tokio::test]
async fn test_add_applies_locally_before_any_remote_write() {
    let (service, store, _) = signed_in("u1").await;
    let mut state = service.state();

    let worker = service.clone();
    let add = tokio::spawn(async move { worker.add_to_cart(item(1, 2)).await });

    // The line shows up locally while the add is still parked in front of
    // its first store call.
    let seen = wait_until(&mut state, |s| !s.cart.is_empty()).await;
    assert_eq!(seen.cart.get(ProductId::new(1)).unwrap().quantity, 2);
    assert!(store.cart(&UserId::new("u1")).is_none());

    add.await.unwrap().unwrap();
    let remote = store.cart(&UserId::new("u1")).unwrap();
    assert_eq!(remote.get(ProductId::new(1)).unwrap().quantity, 2);
}

// =============================================================================
// Fallback Path
// =============================================================================

#[tokio::test]
async fn test_refused_merge_creates_the_slot_through_fallback() {
    let (service, store, _) = signed_in("u1").await;
    store.set_merge_behavior(MergeBehavior::Refuse);

    service.add_to_cart(item(1, 1)).await.unwrap();

    let remote = store.cart(&UserId::new("u1")).unwrap();
    assert_eq!(remote.get(ProductId::new(1)).unwrap().quantity, 1);
}

#[tokio::test]
async fn test_refused_merges_still_sum_sequentially() {
    let (service, store, _) = signed_in("u1").await;
    store.set_merge_behavior(MergeBehavior::Refuse);

    service.add_to_cart(item(1, 2)).await.unwrap();
    service.add_to_cart(item(1, 3)).await.unwrap();

    // The first add created the slot with 2; the second read that 2 back
    // and wrote 2 + 3.
    let remote = store.cart(&UserId::new("u1")).unwrap();
    assert_eq!(remote.get(ProductId::new(1)).unwrap().quantity, 5);
}

/// Two refused adds racing on one device. Both fallbacks read an absent
/// slot, but the later one carries the locally accumulated quantity, so
/// the earlier add is not dropped by the unconditional write.
#[tokio::test]
async fn test_interleaved_refused_adds_do_not_lose_quantity() {
    let (service, store, _) = signed_in("u1").await;
    store.set_merge_behavior(MergeBehavior::Refuse);

    let (a, b) = tokio::join!(
        service.add_to_cart(item(1, 2)),
        service.add_to_cart(item(1, 3)),
    );
    a.unwrap();
    b.unwrap();

    let remote = store.cart(&UserId::new("u1")).unwrap();
    assert_eq!(remote.get(ProductId::new(1)).unwrap().quantity, 5);
}

// =============================================================================
// Cross-Device
// =============================================================================

#[tokio::test]
async fn test_concurrent_adds_across_devices_sum() {
    let store = MemoryCartStore::new();
    let device_a = CartSyncService::new(store.clone(), MemoryCartCache::new());
    let device_b = CartSyncService::new(store.clone(), MemoryCartCache::new());
    device_a.set_identity(Some(identity("u1"))).await;
    device_b.set_identity(Some(identity("u1"))).await;

    let (a, b) = tokio::join!(
        device_a.add_to_cart(item(1, 2)),
        device_b.add_to_cart(item(1, 3)),
    );
    a.unwrap();
    b.unwrap();

    // The merge is atomic, so neither device clobbered the other.
    let remote = store.cart(&UserId::new("u1")).unwrap();
    assert_eq!(remote.get(ProductId::new(1)).unwrap().quantity, 5);

    // Both devices converge on the merged cart through their subscriptions.
    let state = wait_until(&mut device_a.state(), |s| s.cart.total_quantity() == 5).await;
    assert_eq!(state.cart.len(), 1);
    wait_until(&mut device_b.state(), |s| s.cart.total_quantity() == 5).await;
}

#[tokio::test]
async fn test_second_device_sees_the_first_devices_changes() {
    let store = MemoryCartStore::new();
    let device_a = CartSyncService::new(store.clone(), MemoryCartCache::new());
    let device_b = CartSyncService::new(store.clone(), MemoryCartCache::new());
    device_a.set_identity(Some(identity("u1"))).await;
    device_b.set_identity(Some(identity("u1"))).await;

    device_a.add_to_cart(item(1, 2)).await.unwrap();
    let state = wait_until(&mut device_b.state(), |s| !s.cart.is_empty()).await;
    assert_eq!(state.cart.get(ProductId::new(1)).unwrap().quantity, 2);

    device_b.remove_item(ProductId::new(1)).await.unwrap();
    wait_until(&mut device_a.state(), |s| s.cart.is_empty() && !s.loading).await;
}
