//! Cross-crate integration tests for ShopEZ.
//!
//! The unit tests in each crate cover components in isolation. The tests
//! here drive [`CartSyncService`] end to end through the in-memory store
//! and cache fixtures, the way the terminal shell drives the real ones.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p shopez-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cart_add_protocol` - the optimistic add path, its atomic merge, and
//!   the read/write fallback
//! - `cart_mutations` - remove, set-quantity, and clear semantics
//! - `cart_failure_paths` - reverts, error propagation, and degraded caches
//! - `cart_identity` - sign-in hydration, identity switches, and teardown
//! - `cart_persistence` - the disk cache wired into the service
//!
//! All tests run on the single-threaded runtime. The memory store yields
//! once per operation, so concurrent calls interleave at operation
//! granularity and the schedules these tests rely on repeat on every run.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::watch;

use shopez_cart::{CartState, CartSyncService, MemoryCartCache, MemoryCartStore};
use shopez_core::{CartItem, Identity, Price, ProductId, UserId};

/// How long [`wait_until`] waits before declaring the state stuck.
pub const WAIT: Duration = Duration::from_secs(2);

static SCRATCH_SEQ: AtomicU64 = AtomicU64::new(0);

/// A cart item fixture. The unit price is a flat $10.00; the sync protocol
/// never looks at it.
#[must_use]
pub fn item(id: u32, quantity: u32) -> CartItem {
    CartItem {
        id: ProductId::new(id),
        title: format!("Product {id}"),
        price: Price::new(Decimal::from(10)),
        image: String::new(),
        quantity,
    }
}

/// An anonymous identity fixture.
#[must_use]
pub fn identity(uid: &str) -> Identity {
    Identity::anonymous(UserId::new(uid))
}

/// A service wired to fresh in-memory fixtures, plus handles to both.
///
/// The handles share state with what the service holds, so tests can rig
/// failures and inspect the authoritative documents directly.
#[must_use]
pub fn memory_service() -> (
    CartSyncService<MemoryCartStore, MemoryCartCache>,
    MemoryCartStore,
    MemoryCartCache,
) {
    let store = MemoryCartStore::new();
    let cache = MemoryCartCache::new();
    let service = CartSyncService::new(store.clone(), cache.clone());
    (service, store, cache)
}

/// [`memory_service`] with `uid` already signed in anonymously.
pub async fn signed_in(
    uid: &str,
) -> (
    CartSyncService<MemoryCartStore, MemoryCartCache>,
    MemoryCartStore,
    MemoryCartCache,
) {
    let (service, store, cache) = memory_service();
    service.set_identity(Some(identity(uid))).await;
    (service, store, cache)
}

/// Wait until the watched state satisfies `pred`, with a timeout.
///
/// # Panics
///
/// Panics when the timeout elapses or the service is gone; both mean the
/// test has already failed.
pub async fn wait_until(
    rx: &mut watch::Receiver<CartState>,
    pred: impl FnMut(&CartState) -> bool,
) -> CartState {
    match tokio::time::timeout(WAIT, rx.wait_for(pred)).await {
        Ok(Ok(state)) => state.clone(),
        Ok(Err(_)) => panic!("cart state channel closed while waiting"),
        Err(_) => panic!("timed out waiting for cart state"),
    }
}

/// A temp directory that removes itself on drop.
///
/// Nothing is created up front; the disk cache makes the directory on its
/// first write.
pub struct ScratchDir {
    /// Path to hand to [`shopez_cart::DiskCartCache`].
    pub path: PathBuf,
}

impl ScratchDir {
    #[must_use]
    pub fn new(tag: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "shopez-integration-{tag}-{}-{}",
            std::process::id(),
            SCRATCH_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        Self { path }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}
