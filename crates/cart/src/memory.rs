//! In-memory remote store and cache.
//!
//! These back `--offline` mode and the test suite. The store mirrors the
//! real document store's observable behavior: a new subscription receives
//! the current snapshot first, an emptied document collapses to absent, and
//! a quantity patch against a missing item leaves nothing a snapshot would
//! show.
//!
//! Failure injection is part of the public surface because the sync
//! protocol's interesting paths only run when something goes wrong.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::task::yield_now;

use shopez_core::{Cart, CartItem, ProductId, UserId};

use crate::cache::CartCache;
use crate::error::{CacheError, StoreError};
use crate::store::{CartDelivery, CartSubscription, MergeOutcome, RemoteCartStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How [`MemoryCartStore::merge_item`] responds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeBehavior {
    /// Merge normally and report a commit.
    #[default]
    Commit,
    /// Report [`MergeOutcome::NotCommitted`] without touching the cart.
    Refuse,
    /// Fail with a store error without touching the cart.
    Fail,
}

/// An in-memory [`RemoteCartStore`].
///
/// Cheap to clone; clones share the same documents and watchers, so two
/// service instances holding clones behave like two devices on one account.
#[derive(Clone, Default)]
pub struct MemoryCartStore {
    inner: Arc<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    carts: Mutex<HashMap<UserId, Cart>>,
    watchers: Mutex<HashMap<UserId, Vec<mpsc::UnboundedSender<CartDelivery>>>>,
    merge_behavior: Mutex<MergeBehavior>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryCartStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Change how `merge_item` responds from now on.
    pub fn set_merge_behavior(&self, behavior: MergeBehavior) {
        *lock(&self.inner.merge_behavior) = behavior;
    }

    /// Make `read_item` fail from now on.
    pub fn fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every write (item, quantity, remove, replace) fail from now on.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Push an error to every live subscription for this user.
    pub fn inject_subscription_error(&self, uid: &UserId, message: &str) {
        let mut watchers = lock(&self.inner.watchers);
        if let Some(senders) = watchers.get_mut(uid) {
            senders.retain(|tx| {
                tx.send(CartDelivery::Failed(StoreError::Unavailable(
                    message.to_owned(),
                )))
                .is_ok()
            });
        }
    }

    /// The authoritative document for a user, if it exists.
    #[must_use]
    pub fn cart(&self, uid: &UserId) -> Option<Cart> {
        lock(&self.inner.carts).get(uid).cloned()
    }

    /// Store a document, collapsing an empty one to absent.
    fn store_cart(carts: &mut HashMap<UserId, Cart>, uid: &UserId, cart: Cart) {
        if cart.is_empty() {
            carts.remove(uid);
        } else {
            carts.insert(uid.clone(), cart);
        }
    }

    /// Deliver the current snapshot to every watcher of this user.
    fn publish(&self, uid: &UserId) {
        let snapshot = lock(&self.inner.carts).get(uid).cloned();
        let mut watchers = lock(&self.inner.watchers);
        if let Some(senders) = watchers.get_mut(uid) {
            senders.retain(|tx| tx.send(CartDelivery::Snapshot(snapshot.clone())).is_ok());
            if senders.is_empty() {
                watchers.remove(uid);
            }
        }
    }

    fn check_write(&self) -> Result<(), StoreError> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("write rigged to fail".to_owned()));
        }
        Ok(())
    }
}

impl RemoteCartStore for MemoryCartStore {
    fn subscribe(&self, uid: &UserId) -> CartSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let snapshot = lock(&self.inner.carts).get(uid).cloned();
        let _ = tx.send(CartDelivery::Snapshot(snapshot));
        lock(&self.inner.watchers)
            .entry(uid.clone())
            .or_default()
            .push(tx);
        CartSubscription::new(rx)
    }

    // Every operation yields once on entry so that concurrent callers
    // interleave at operation granularity on a single-threaded runtime.

    async fn merge_item(
        &self,
        uid: &UserId,
        item: &CartItem,
    ) -> Result<MergeOutcome, StoreError> {
        yield_now().await;
        match *lock(&self.inner.merge_behavior) {
            MergeBehavior::Commit => {}
            MergeBehavior::Refuse => return Ok(MergeOutcome::NotCommitted),
            MergeBehavior::Fail => {
                return Err(StoreError::Unavailable("merge rigged to fail".to_owned()));
            }
        }
        let merged = {
            let mut carts = lock(&self.inner.carts);
            let mut cart = carts.get(uid).cloned().unwrap_or_default();
            cart.insert_or_increment(item.clone());
            let merged = cart.get(item.id).cloned().unwrap_or_else(|| item.clone());
            Self::store_cart(&mut carts, uid, cart);
            merged
        };
        self.publish(uid);
        Ok(MergeOutcome::Committed(merged))
    }

    async fn read_item(
        &self,
        uid: &UserId,
        product: ProductId,
    ) -> Result<Option<CartItem>, StoreError> {
        yield_now().await;
        if self.inner.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("read rigged to fail".to_owned()));
        }
        Ok(lock(&self.inner.carts)
            .get(uid)
            .and_then(|cart| cart.get(product))
            .cloned())
    }

    async fn write_item(&self, uid: &UserId, item: &CartItem) -> Result<(), StoreError> {
        yield_now().await;
        self.check_write()?;
        {
            let mut carts = lock(&self.inner.carts);
            let mut cart = carts.get(uid).cloned().unwrap_or_default();
            cart.items.insert(item.id, item.clone());
            Self::store_cart(&mut carts, uid, cart);
        }
        self.publish(uid);
        Ok(())
    }

    async fn write_quantity(
        &self,
        uid: &UserId,
        product: ProductId,
        quantity: u32,
    ) -> Result<(), StoreError> {
        yield_now().await;
        self.check_write()?;
        {
            let mut carts = lock(&self.inner.carts);
            let Some(mut cart) = carts.get(uid).cloned() else {
                return Ok(());
            };
            if !cart.set_quantity(product, quantity) {
                return Ok(());
            }
            Self::store_cart(&mut carts, uid, cart);
        }
        self.publish(uid);
        Ok(())
    }

    async fn remove_item(&self, uid: &UserId, product: ProductId) -> Result<(), StoreError> {
        yield_now().await;
        self.check_write()?;
        let removed = {
            let mut carts = lock(&self.inner.carts);
            let Some(mut cart) = carts.get(uid).cloned() else {
                return Ok(());
            };
            let removed = cart.remove(product).is_some();
            Self::store_cart(&mut carts, uid, cart);
            removed
        };
        if removed {
            self.publish(uid);
        }
        Ok(())
    }

    async fn replace_cart(&self, uid: &UserId, cart: &Cart) -> Result<(), StoreError> {
        yield_now().await;
        self.check_write()?;
        {
            let mut carts = lock(&self.inner.carts);
            Self::store_cart(&mut carts, uid, cart.clone());
        }
        self.publish(uid);
        Ok(())
    }
}

/// An in-memory [`CartCache`].
#[derive(Clone, Default)]
pub struct MemoryCartCache {
    inner: Arc<CacheInner>,
}

#[derive(Default)]
struct CacheInner {
    carts: Mutex<HashMap<UserId, Cart>>,
    fail_loads: AtomicBool,
    fail_stores: AtomicBool,
}

impl MemoryCartCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `load` fail from now on.
    pub fn fail_loads(&self, fail: bool) {
        self.inner.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Make `store` fail from now on.
    pub fn fail_stores(&self, fail: bool) {
        self.inner.fail_stores.store(fail, Ordering::SeqCst);
    }

    /// The cached cart for a user, if any.
    #[must_use]
    pub fn cached(&self, uid: &UserId) -> Option<Cart> {
        lock(&self.inner.carts).get(uid).cloned()
    }
}

impl CartCache for MemoryCartCache {
    async fn load(&self, uid: &UserId) -> Result<Option<Cart>, CacheError> {
        yield_now().await;
        if self.inner.fail_loads.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("load rigged to fail".to_owned()));
        }
        Ok(lock(&self.inner.carts).get(uid).cloned())
    }

    async fn store(&self, uid: &UserId, cart: &Cart) -> Result<(), CacheError> {
        yield_now().await;
        if self.inner.fail_stores.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("store rigged to fail".to_owned()));
        }
        lock(&self.inner.carts).insert(uid.clone(), cart.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn item(id: u32, quantity: u32) -> CartItem {
        CartItem {
            id: ProductId::new(id),
            title: format!("Product {id}"),
            price: shopez_core::Price::from_f64(5.0).unwrap(),
            image: String::new(),
            quantity,
        }
    }

    fn uid() -> UserId {
        UserId::new("u1")
    }

    #[tokio::test]
    async fn subscribe_delivers_current_snapshot_first() {
        let store = MemoryCartStore::new();

        let mut sub = store.subscribe(&uid());
        match sub.recv().await.unwrap() {
            CartDelivery::Snapshot(None) => {}
            other => panic!("expected absent snapshot, got {other:?}"),
        }

        store.write_item(&uid(), &item(1, 2)).await.unwrap();
        match sub.recv().await.unwrap() {
            CartDelivery::Snapshot(Some(cart)) => {
                assert_eq!(cart.get(ProductId::new(1)).unwrap().quantity, 2);
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn merge_accumulates_and_reports_the_merged_item() {
        let store = MemoryCartStore::new();

        let first = store.merge_item(&uid(), &item(1, 2)).await.unwrap();
        assert!(matches!(first, MergeOutcome::Committed(ref i) if i.quantity == 2));

        let second = store.merge_item(&uid(), &item(1, 3)).await.unwrap();
        assert!(matches!(second, MergeOutcome::Committed(ref i) if i.quantity == 5));

        let cart = store.cart(&uid()).unwrap();
        assert_eq!(cart.get(ProductId::new(1)).unwrap().quantity, 5);
    }

    #[tokio::test]
    async fn refused_merge_leaves_the_document_alone() {
        let store = MemoryCartStore::new();
        store.set_merge_behavior(MergeBehavior::Refuse);

        let outcome = store.merge_item(&uid(), &item(1, 1)).await.unwrap();
        assert_eq!(outcome, MergeOutcome::NotCommitted);
        assert!(store.cart(&uid()).is_none());
    }

    #[tokio::test]
    async fn emptied_documents_collapse_to_absent() {
        let store = MemoryCartStore::new();
        store.write_item(&uid(), &item(1, 1)).await.unwrap();
        assert!(store.cart(&uid()).is_some());

        store.remove_item(&uid(), ProductId::new(1)).await.unwrap();
        assert!(store.cart(&uid()).is_none());

        store.write_item(&uid(), &item(2, 1)).await.unwrap();
        store.replace_cart(&uid(), &Cart::new()).await.unwrap();
        assert!(store.cart(&uid()).is_none());
    }

    #[tokio::test]
    async fn quantity_patch_on_missing_item_is_invisible() {
        let store = MemoryCartStore::new();
        store
            .write_quantity(&uid(), ProductId::new(7), 3)
            .await
            .unwrap();
        assert!(store.cart(&uid()).is_none());

        store.write_item(&uid(), &item(1, 1)).await.unwrap();
        store
            .write_quantity(&uid(), ProductId::new(7), 3)
            .await
            .unwrap();
        let cart = store.cart(&uid()).unwrap();
        assert!(cart.get(ProductId::new(7)).is_none());
    }

    #[tokio::test]
    async fn removing_a_missing_item_succeeds_silently() {
        let store = MemoryCartStore::new();
        let mut sub = store.subscribe(&uid());
        let _ = sub.recv().await;

        store.remove_item(&uid(), ProductId::new(9)).await.unwrap();

        // No change happened, so no delivery beyond the initial snapshot.
        store.write_item(&uid(), &item(1, 1)).await.unwrap();
        match sub.recv().await.unwrap() {
            CartDelivery::Snapshot(Some(cart)) => assert_eq!(cart.len(), 1),
            other => panic!("expected the write's snapshot, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropped_subscriptions_are_pruned() {
        let store = MemoryCartStore::new();
        let sub = store.subscribe(&uid());
        drop(sub);

        // Publishing to the dropped watcher must not fail the write.
        store.write_item(&uid(), &item(1, 1)).await.unwrap();
        assert!(store.cart(&uid()).is_some());
    }

    #[tokio::test]
    async fn cache_round_trips_and_faults() {
        let cache = MemoryCartCache::new();
        assert!(cache.load(&uid()).await.unwrap().is_none());

        let mut cart = Cart::new();
        cart.insert_or_increment(item(1, 2));
        cache.store(&uid(), &cart).await.unwrap();
        assert_eq!(cache.load(&uid()).await.unwrap().unwrap(), cart);

        cache.fail_loads(true);
        assert!(cache.load(&uid()).await.is_err());
    }
}
