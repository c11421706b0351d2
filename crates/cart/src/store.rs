//! Remote cart store contract.
//!
//! The engine talks to the authoritative cart document through this trait.
//! The production implementation lives in `shopez-firebase`; the in-memory
//! one in [`crate::memory`].

use std::future::Future;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use shopez_core::{Cart, CartItem, ProductId, UserId};

use crate::error::StoreError;

/// Result of an atomic merge against a single item slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The merge was applied as one atomic read-modify-write. Carries the
    /// item as it now exists remotely.
    Committed(CartItem),
    /// The store declined to commit, typically because contention retries
    /// were exhausted. The slot is unchanged by this call.
    NotCommitted,
}

/// One message from a live cart subscription.
#[derive(Debug)]
pub enum CartDelivery {
    /// A whole-document snapshot. `None` means the document does not
    /// currently exist; stores that collapse empty documents report a
    /// cleared cart this way.
    Snapshot(Option<Cart>),
    /// The subscription hit an error. The last delivered snapshot is still
    /// the best-known state; more deliveries may follow if the store
    /// recovers.
    Failed(StoreError),
}

/// A live feed of cart snapshots for one user.
///
/// Dropping the subscription detaches the listener and stops any worker
/// task driving it.
#[derive(Debug)]
pub struct CartSubscription {
    deliveries: mpsc::UnboundedReceiver<CartDelivery>,
    _worker: Option<AbortOnDrop>,
}

impl CartSubscription {
    /// A subscription fed directly by its store, with no worker task.
    #[must_use]
    pub fn new(deliveries: mpsc::UnboundedReceiver<CartDelivery>) -> Self {
        Self {
            deliveries,
            _worker: None,
        }
    }

    /// A subscription fed by a worker task that is aborted on drop.
    #[must_use]
    pub fn with_worker(
        deliveries: mpsc::UnboundedReceiver<CartDelivery>,
        worker: JoinHandle<()>,
    ) -> Self {
        Self {
            deliveries,
            _worker: Some(AbortOnDrop(worker)),
        }
    }

    /// Wait for the next delivery. `None` means the feed has ended and no
    /// further deliveries will arrive.
    pub async fn recv(&mut self) -> Option<CartDelivery> {
        self.deliveries.recv().await
    }
}

/// Aborts the wrapped task when dropped.
#[derive(Debug)]
pub(crate) struct AbortOnDrop(pub(crate) JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// The authoritative per-user cart document store.
///
/// Documents live under a key derived from the user id; items within a
/// document are addressed by product id. Implementations must deliver the
/// current snapshot as the first message on every new subscription.
pub trait RemoteCartStore: Send + Sync + 'static {
    /// Open a live subscription to the user's cart document.
    ///
    /// Never fails synchronously: connection problems are reported through
    /// [`CartDelivery::Failed`] messages on the returned feed.
    fn subscribe(&self, uid: &UserId) -> CartSubscription;

    /// Atomically merge an item into the cart: if the slot is absent,
    /// install `item` as-is; if present, add `item.quantity` onto the
    /// current quantity. The read-modify-write must be indivisible with
    /// respect to other writers of the same slot.
    fn merge_item(
        &self,
        uid: &UserId,
        item: &CartItem,
    ) -> impl Future<Output = Result<MergeOutcome, StoreError>> + Send;

    /// Read the current value of one item slot. `None` if absent.
    fn read_item(
        &self,
        uid: &UserId,
        product: ProductId,
    ) -> impl Future<Output = Result<Option<CartItem>, StoreError>> + Send;

    /// Unconditionally overwrite one item slot with a full item.
    fn write_item(
        &self,
        uid: &UserId,
        item: &CartItem,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Unconditionally overwrite only the quantity field of one item slot.
    ///
    /// Writing a quantity for an absent item is not an error; whether it
    /// leaves a trace is up to the store (snapshot decoding drops items
    /// that are missing their product fields).
    fn write_quantity(
        &self,
        uid: &UserId,
        product: ProductId,
        quantity: u32,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Delete one item slot. Deleting an absent slot succeeds.
    fn remove_item(
        &self,
        uid: &UserId,
        product: ProductId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Overwrite the whole cart document.
    fn replace_cart(
        &self,
        uid: &UserId,
        cart: &Cart,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
