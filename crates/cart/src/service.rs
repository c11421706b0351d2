//! The cart synchronization service.
//!
//! One instance serves the whole app. Consumers watch [`CartState`] through
//! [`CartSyncService::state`] and call the four mutation operations; the
//! identity layer drives [`CartSyncService::set_identity`] on sign-in and
//! sign-out.
//!
//! # Add protocol
//!
//! Adding an item is the latency-sensitive path and runs in stages:
//!
//! 1. apply the insert-or-increment optimistically to local state and
//!    mirror it to the cache
//! 2. attempt an atomic merge against the remote slot; if it commits, done
//! 3. otherwise fall back to a direct read of the slot followed by an
//!    unconditional write
//! 4. if the fallback fails too, revert local state to the pre-add snapshot
//!    and surface the error
//!
//! The fallback's create path writes the locally accumulated quantity, not
//! the raw requested one, so an earlier add whose commit was refused is not
//! silently dropped when both saw an empty slot. Its update path adds the
//! requested quantity onto the remote's current value, same as the merge.
//!
//! Remove, set-quantity, and clear are deliberate actions: they write
//! remotely and let the subscription redeliver, with no optimistic step.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, watch};
use tracing::{debug, instrument, warn};

use shopez_core::{Cart, CartItem, Identity, ProductId, UserId};

use crate::cache::CartCache;
use crate::error::{CartError, StoreError};
use crate::store::{AbortOnDrop, CartDelivery, CartSubscription, MergeOutcome, RemoteCartStore};

/// The observable cart state.
///
/// `loading` is set while a freshly assigned identity is still waiting for
/// its first remote delivery; cached data may already be visible during
/// that window.
#[derive(Debug, Clone, Default)]
pub struct CartState {
    /// The current cart.
    pub cart: Cart,
    /// Whether the first remote delivery for this identity is still pending.
    pub loading: bool,
}

/// Synchronizes the in-memory cart, the local cache, and the remote store.
///
/// Cheap to clone; clones share state.
pub struct CartSyncService<R, C> {
    inner: Arc<Inner<R, C>>,
}

impl<R, C> Clone for CartSyncService<R, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<R, C> {
    store: R,
    cache: C,
    state: watch::Sender<CartState>,
    // Bumped on every identity change. State writes carry the epoch they
    // were computed under and are dropped if it is no longer current.
    epoch: AtomicU64,
    session: Mutex<Option<Session>>,
}

struct Session {
    uid: UserId,
    epoch: u64,
    _pump: AbortOnDrop,
}

/// Snapshot taken around the optimistic phase of an add.
struct OptimisticAdd {
    previous: Cart,
    updated: Cart,
    line_quantity: u32,
}

impl<R: RemoteCartStore, C: CartCache> CartSyncService<R, C> {
    /// Create a service with no identity. State starts empty and idle.
    #[must_use]
    pub fn new(store: R, cache: C) -> Self {
        let (state, _) = watch::channel(CartState::default());
        Self {
            inner: Arc::new(Inner {
                store,
                cache,
                state,
                epoch: AtomicU64::new(0),
                session: Mutex::new(None),
            }),
        }
    }

    /// Subscribe to cart state changes.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<CartState> {
        self.inner.state.subscribe()
    }

    /// The current state, without subscribing.
    #[must_use]
    pub fn current(&self) -> CartState {
        self.inner.state.borrow().clone()
    }

    /// Switch the active identity.
    ///
    /// Tears down any previous subscription first, then resets state so the
    /// outgoing user's items are never visible under the new identity. With
    /// an identity present, state is hydrated from the local cache (stale
    /// but instant) and a live remote subscription takes over from there.
    #[instrument(skip(self, identity), fields(uid = identity.as_ref().map(|i| i.uid.to_string())))]
    pub async fn set_identity(&self, identity: Option<Identity>) {
        let inner = &self.inner;
        let mut session = inner.session.lock().await;
        let epoch = inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        // Dispose the old subscription before touching state.
        *session = None;

        let Some(identity) = identity else {
            inner.state.send_replace(CartState {
                cart: Cart::new(),
                loading: false,
            });
            debug!("identity cleared, cart reset");
            return;
        };
        let uid = identity.uid;

        inner.state.send_replace(CartState {
            cart: Cart::new(),
            loading: true,
        });

        match inner.cache.load(&uid).await {
            Ok(Some(cached)) => {
                debug!(items = cached.len(), "hydrated cart from local cache");
                // Hydration does not clear `loading`: the remote is still
                // the authority on what this cart contains.
                inner.apply_if_current(epoch, |state| state.cart = cached);
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "failed to load cached cart"),
        }

        let subscription = inner.store.subscribe(&uid);
        let pump = tokio::spawn(run_subscription(
            Arc::downgrade(inner),
            epoch,
            uid.clone(),
            subscription,
        ));
        *session = Some(Session {
            uid,
            epoch,
            _pump: AbortOnDrop(pump),
        });
    }

    /// Add an item to the cart, merging quantities if already present.
    ///
    /// `item.quantity` is the amount to add and must be at least 1.
    ///
    /// # Errors
    ///
    /// [`CartError::Unauthenticated`] with no identity,
    /// [`CartError::InvalidQuantity`] for a zero quantity, and
    /// [`CartError::Remote`] when neither the merge nor the fallback could
    /// write remotely (local state is reverted in that case).
    #[instrument(skip(self, item), fields(product = %item.id, quantity = item.quantity))]
    pub async fn add_to_cart(&self, item: CartItem) -> Result<(), CartError> {
        if item.quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity: 0 });
        }
        let (uid, epoch) = self.require_session().await?;
        let inner = &self.inner;
        let requested = item.quantity;

        let mut plan: Option<OptimisticAdd> = None;
        inner.state.send_if_modified(|state| {
            if inner.epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            let previous = state.cart.clone();
            let line_quantity = state.cart.insert_or_increment(item.clone());
            plan = Some(OptimisticAdd {
                previous,
                updated: state.cart.clone(),
                line_quantity,
            });
            true
        });
        if let Some(plan) = &plan {
            inner.persist_best_effort(&uid, &plan.updated).await;
        }
        let line_quantity = plan.as_ref().map_or(requested, |p| p.line_quantity);

        match inner.store.merge_item(&uid, &item).await {
            Ok(MergeOutcome::Committed(merged)) => {
                debug!(quantity = merged.quantity, "cart merge committed");
                return Ok(());
            }
            Ok(MergeOutcome::NotCommitted) => {
                warn!("cart merge not committed, falling back to read/write");
            }
            Err(err) => {
                warn!(error = %err, "cart merge failed, falling back to read/write");
            }
        }

        match self.fallback_add(&uid, &item, requested, line_quantity).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(error = %err, "cart fallback failed, reverting optimistic update");
                if let Some(plan) = plan {
                    let reverted =
                        inner.apply_if_current(epoch, |state| state.cart = plan.previous.clone());
                    if reverted {
                        inner.persist_best_effort(&uid, &plan.previous).await;
                    }
                }
                Err(CartError::Remote(err))
            }
        }
    }

    /// The direct read-then-write path taken when the atomic merge does not
    /// commit.
    async fn fallback_add(
        &self,
        uid: &UserId,
        item: &CartItem,
        requested: u32,
        line_quantity: u32,
    ) -> Result<(), StoreError> {
        let store = &self.inner.store;
        match store.read_item(uid, item.id).await? {
            None => {
                let mut created = item.clone();
                created.quantity = line_quantity;
                store.write_item(uid, &created).await?;
                debug!(quantity = line_quantity, "cart fallback created item");
            }
            Some(current) => {
                let quantity = current.quantity.saturating_add(requested);
                store.write_quantity(uid, item.id, quantity).await?;
                debug!(quantity, "cart fallback updated quantity");
            }
        }
        Ok(())
    }

    /// Remove an item from the cart.
    ///
    /// No optimistic local change: the subscription redelivers the cart
    /// without the item once the delete lands. Removing an id that is not
    /// in the cart succeeds and changes nothing.
    ///
    /// # Errors
    ///
    /// [`CartError::Unauthenticated`] with no identity, [`CartError::Remote`]
    /// if the delete fails (state is left unchanged).
    #[instrument(skip(self), fields(product = %product))]
    pub async fn remove_item(&self, product: ProductId) -> Result<(), CartError> {
        let (uid, _) = self.require_session().await?;
        self.inner
            .store
            .remove_item(&uid, product)
            .await
            .map_err(|err| {
                warn!(error = %err, "remove item failed");
                CartError::from(err)
            })?;
        debug!("removed cart item");
        Ok(())
    }

    /// Set an item to an exact quantity.
    ///
    /// A quantity of zero or below removes the item instead. Like
    /// [`remove_item`](Self::remove_item), this writes remotely with no
    /// optimistic step and propagates failure.
    #[instrument(skip(self), fields(product = %product, quantity = quantity))]
    pub async fn update_quantity(&self, product: ProductId, quantity: i64) -> Result<(), CartError> {
        if quantity <= 0 {
            return self.remove_item(product).await;
        }
        let (uid, _) = self.require_session().await?;
        let quantity =
            u32::try_from(quantity).map_err(|_| CartError::InvalidQuantity { quantity })?;
        self.inner
            .store
            .write_quantity(&uid, product, quantity)
            .await
            .map_err(|err| {
                warn!(error = %err, "update quantity failed");
                CartError::from(err)
            })?;
        debug!("updated cart quantity");
        Ok(())
    }

    /// Empty the cart.
    ///
    /// Best-effort: a remote failure is logged and swallowed, since the
    /// subscription will keep local state honest either way.
    ///
    /// # Errors
    ///
    /// Only [`CartError::Unauthenticated`].
    #[instrument(skip(self))]
    pub async fn clear_cart(&self) -> Result<(), CartError> {
        let (uid, _) = self.require_session().await?;
        if let Err(err) = self.inner.store.replace_cart(&uid, &Cart::new()).await {
            warn!(error = %err, "clear cart failed");
        }
        Ok(())
    }

    async fn require_session(&self) -> Result<(UserId, u64), CartError> {
        let session = self.inner.session.lock().await;
        session
            .as_ref()
            .map(|s| (s.uid.clone(), s.epoch))
            .ok_or(CartError::Unauthenticated)
    }
}

impl<R: RemoteCartStore, C: CartCache> Inner<R, C> {
    /// Apply a state change, unless the identity has moved on since `epoch`
    /// was captured. The check runs inside the watch lock, so it cannot
    /// race a concurrent identity switch.
    fn apply_if_current(&self, epoch: u64, f: impl FnOnce(&mut CartState)) -> bool {
        self.state.send_if_modified(|state| {
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            f(state);
            true
        })
    }

    async fn persist_best_effort(&self, uid: &UserId, cart: &Cart) {
        if let Err(err) = self.cache.store(uid, cart).await {
            warn!(error = %err, "failed to persist cart locally");
        }
    }
}

/// Pumps one identity's subscription into shared state until the feed ends
/// or the identity is superseded.
async fn run_subscription<R: RemoteCartStore, C: CartCache>(
    inner: Weak<Inner<R, C>>,
    epoch: u64,
    uid: UserId,
    mut subscription: CartSubscription,
) {
    while let Some(delivery) = subscription.recv().await {
        let Some(inner) = inner.upgrade() else { return };
        match delivery {
            CartDelivery::Snapshot(snapshot) => {
                // An absent document is an empty cart.
                let cart = snapshot.unwrap_or_default();
                let applied = inner.apply_if_current(epoch, |state| {
                    state.cart = cart.clone();
                    state.loading = false;
                });
                if !applied {
                    return;
                }
                debug!(uid = %uid, items = cart.len(), "remote cart delivered");
                inner.persist_best_effort(&uid, &cart).await;
            }
            CartDelivery::Failed(err) => {
                // Keep the last-known cart; just stop showing a spinner.
                warn!(uid = %uid, error = %err, "cart subscription error");
                inner.apply_if_current(epoch, |state| state.loading = false);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::memory::{MemoryCartCache, MemoryCartStore};

    fn item(id: u32, quantity: u32) -> CartItem {
        CartItem {
            id: ProductId::new(id),
            title: format!("Product {id}"),
            price: shopez_core::Price::from_f64(10.0).unwrap(),
            image: String::new(),
            quantity,
        }
    }

    fn service() -> CartSyncService<MemoryCartStore, MemoryCartCache> {
        CartSyncService::new(MemoryCartStore::new(), MemoryCartCache::new())
    }

    #[tokio::test]
    async fn mutations_require_an_identity() {
        let service = service();

        assert!(matches!(
            service.add_to_cart(item(1, 1)).await,
            Err(CartError::Unauthenticated)
        ));
        assert!(matches!(
            service.remove_item(ProductId::new(1)).await,
            Err(CartError::Unauthenticated)
        ));
        assert!(matches!(
            service.update_quantity(ProductId::new(1), 2).await,
            Err(CartError::Unauthenticated)
        ));
        assert!(matches!(
            service.clear_cart().await,
            Err(CartError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn add_rejects_zero_quantity() {
        let service = service();
        service
            .set_identity(Some(Identity::anonymous(UserId::new("u1"))))
            .await;

        assert!(matches!(
            service.add_to_cart(item(1, 0)).await,
            Err(CartError::InvalidQuantity { quantity: 0 })
        ));
        assert!(service.current().cart.is_empty());
    }

    #[tokio::test]
    async fn update_quantity_rejects_oversized_values() {
        let service = service();
        service
            .set_identity(Some(Identity::anonymous(UserId::new("u1"))))
            .await;

        let too_big = i64::from(u32::MAX) + 1;
        assert!(matches!(
            service.update_quantity(ProductId::new(1), too_big).await,
            Err(CartError::InvalidQuantity { .. })
        ));
    }

    #[tokio::test]
    async fn sign_out_resets_state() {
        let service = service();
        let mut state = service.state();
        service
            .set_identity(Some(Identity::anonymous(UserId::new("u1"))))
            .await;
        service.add_to_cart(item(1, 2)).await.unwrap();
        tokio::time::timeout(
            std::time::Duration::from_secs(2),
            state.wait_for(|s| !s.cart.is_empty()),
        )
        .await
        .unwrap()
        .unwrap();

        service.set_identity(None).await;
        let state = service.current();
        assert!(state.cart.is_empty());
        assert!(!state.loading);
    }
}
