//! Integration tests for the disk cache behind the sync service.
//!
//! The disk cache is what makes a relaunch with no network show the last
//! known cart. Disk writes ride worker threads, so these tests poll the
//! cache for a settled value instead of counting scheduler turns.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use serde_json::Value;
use tokio::time::{Instant, sleep};

use shopez_cart::{CartCache, CartSyncService, DiskCartCache, MemoryCartStore, RemoteCartStore};
use shopez_core::{Cart, ProductId, UserId};
use shopez_integration_tests::{ScratchDir, WAIT, identity, item, wait_until};

async fn wait_for_cached(
    cache: &DiskCartCache,
    uid: &UserId,
    pred: impl Fn(&Cart) -> bool,
) -> Cart {
    let deadline = Instant::now() + WAIT;
    loop {
        if let Some(cart) = cache.load(uid).await.unwrap()
            && pred(&cart)
        {
            return cart;
        }
        assert!(Instant::now() < deadline, "cart never reached the disk cache");
        sleep(Duration::from_millis(10)).await;
    }
}

// =============================================================================
// Write-Through
// =============================================================================

#[tokio::test]
async fn test_adds_are_mirrored_to_disk() {
    let scratch = ScratchDir::new("mirror");
    let cache = DiskCartCache::new(&scratch.path);
    let service = CartSyncService::new(MemoryCartStore::new(), cache.clone());
    service.set_identity(Some(identity("u1"))).await;

    service.add_to_cart(item(1, 2)).await.unwrap();

    let cached = wait_for_cached(&cache, &UserId::new("u1"), |c| c.total_quantity() == 2).await;
    assert_eq!(cached.get(ProductId::new(1)).unwrap().quantity, 2);
}

// =============================================================================
// Restart Hydration
// =============================================================================

/// A relaunch against an empty remote: the previous session's synced cart
/// comes back from disk, then the remote has the last word.
#[tokio::test]
async fn test_restart_hydrates_the_last_synced_cart() {
    let scratch = ScratchDir::new("restart");
    let uid = UserId::new("u1");

    let store = MemoryCartStore::new();
    store.write_item(&uid, &item(1, 2)).await.unwrap();
    store.write_item(&uid, &item(2, 1)).await.unwrap();
    let cache = DiskCartCache::new(&scratch.path);
    let service = CartSyncService::new(store, cache.clone());
    service.set_identity(Some(identity("u1"))).await;
    wait_until(&mut service.state(), |s| !s.loading && s.cart.total_quantity() == 3).await;
    wait_for_cached(&cache, &uid, |c| c.total_quantity() == 3).await;

    // The file on disk is the remote document shape.
    let bytes = tokio::fs::read(scratch.path.join("cart-u1.json")).await.unwrap();
    let parsed: Value = serde_json::from_slice(&bytes).unwrap();
    let quantity = |id: &str| {
        parsed
            .get("items")
            .and_then(|items| items.get(id))
            .and_then(|line| line.get("quantity"))
            .and_then(Value::as_u64)
    };
    assert_eq!(quantity("1"), Some(2));
    assert_eq!(quantity("2"), Some(1));
    drop(service);

    // Relaunch with a fresh, empty remote.
    let service = CartSyncService::new(MemoryCartStore::new(), DiskCartCache::new(&scratch.path));
    service.set_identity(Some(identity("u1"))).await;

    let state = service.current();
    assert!(state.loading);
    assert_eq!(state.cart.total_quantity(), 3);
    assert_eq!(state.cart.get(ProductId::new(2)).unwrap().quantity, 1);

    // Authoritative and empty beats cached and stale.
    let state = wait_until(&mut service.state(), |s| !s.loading).await;
    assert!(state.cart.is_empty());
}

// =============================================================================
// Corruption
// =============================================================================

#[tokio::test]
async fn test_corrupt_cache_file_is_ignored_at_sign_in() {
    let scratch = ScratchDir::new("corrupt");
    std::fs::create_dir_all(&scratch.path).unwrap();
    std::fs::write(scratch.path.join("cart-u1.json"), b"{not json").unwrap();

    let cache = DiskCartCache::new(&scratch.path);
    let service = CartSyncService::new(MemoryCartStore::new(), cache.clone());
    service.set_identity(Some(identity("u1"))).await;

    let state = wait_until(&mut service.state(), |s| !s.loading).await;
    assert!(state.cart.is_empty());

    // The service keeps working and the next add replaces the bad file.
    service.add_to_cart(item(1, 2)).await.unwrap();
    wait_for_cached(&cache, &UserId::new("u1"), |c| c.total_quantity() == 2).await;
}
