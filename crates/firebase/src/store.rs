//! Cart document store backed by the Realtime Database.
//!
//! Carts live at `carts/{uid}` with items keyed by product id under
//! `carts/{uid}/items/{product}`. [`RtdbCartStore`] adapts the raw REST and
//! streaming client to the [`RemoteCartStore`] contract: merges become
//! ETag-guarded compare-and-set loops, and the listen stream is folded into
//! whole-cart snapshots.
//!
//! Decoding is deliberately lenient. The database can hold item nodes that
//! are missing product fields, for example when a quantity patch landed on
//! a slot that was deleted in between. Snapshots drop such nodes with a
//! warning instead of failing the whole cart.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use shopez_cart::{CartDelivery, CartSubscription, MergeOutcome, RemoteCartStore, StoreError};
use shopez_core::{Cart, CartItem, ProductId, UserId};

use crate::error::{AuthError, RtdbError};
use crate::rtdb::{CasOutcome, RtdbClient, RtdbEvent, apply_patch, apply_put};
use crate::session::AuthSession;

/// Contention retry budget for merges, matching the retry limit the mobile
/// SDK applies to its transactions.
const MAX_MERGE_RETRIES: u32 = 25;

/// Reconnect backoff schedule for the listen stream, in seconds. Attempts
/// past the end stay at the last entry.
const RECONNECT_DELAYS_SECS: &[u64] = &[1, 2, 4, 8, 15, 30];

/// [`RemoteCartStore`] over a Realtime Database instance.
///
/// Requests authenticate with ID tokens minted by the [`AuthSession`], so
/// the database rules can scope every cart to its owner.
#[derive(Clone)]
pub struct RtdbCartStore {
    client: RtdbClient,
    session: AuthSession,
}

impl RtdbCartStore {
    /// Creates a store speaking to `client` as whoever `session` says is
    /// signed in.
    #[must_use]
    pub fn new(client: RtdbClient, session: AuthSession) -> Self {
        Self { client, session }
    }

    async fn token(&self) -> Result<SecretString, StoreError> {
        self.session.id_token().await.map_err(auth_store_error)
    }
}

fn cart_path(uid: &UserId) -> String {
    format!("carts/{}", uid.as_str())
}

fn item_path(uid: &UserId, product: ProductId) -> String {
    format!("carts/{}/items/{}", uid.as_str(), product.as_u32())
}

impl RemoteCartStore for RtdbCartStore {
    fn subscribe(&self, uid: &UserId) -> CartSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.client.clone();
        let session = self.session.clone();
        let path = cart_path(uid);
        let uid = uid.clone();
        let worker = tokio::spawn(async move {
            run_listener(&client, &session, &uid, &path, &tx).await;
        });
        CartSubscription::with_worker(rx, worker)
    }

    #[instrument(skip(self, item), fields(uid = %uid, product = %item.id))]
    async fn merge_item(&self, uid: &UserId, item: &CartItem) -> Result<MergeOutcome, StoreError> {
        let token = self.token().await?;
        let path = item_path(uid, item.id);

        let (mut current, mut etag) = self
            .client
            .get_with_etag(&path, Some(token.expose_secret()))
            .await
            .map_err(store_error)?;

        for attempt in 0..MAX_MERGE_RETRIES {
            let merged = merge_value(&current, item).map_err(StoreError::Decode)?;
            let outcome = self
                .client
                .put_if_match(&path, &merged, &etag, Some(token.expose_secret()))
                .await
                .map_err(store_error)?;
            match outcome {
                CasOutcome::Committed => {
                    return Ok(MergeOutcome::Committed(committed_item(&merged, item)));
                }
                CasOutcome::Conflict {
                    current: now,
                    etag: now_etag,
                } => {
                    debug!(attempt, "Merge contended, retrying against the new value");
                    current = now;
                    etag = now_etag;
                }
            }
        }

        warn!(retries = MAX_MERGE_RETRIES, "Merge retry budget exhausted");
        Ok(MergeOutcome::NotCommitted)
    }

    #[instrument(skip(self), fields(uid = %uid, product = %product))]
    async fn read_item(
        &self,
        uid: &UserId,
        product: ProductId,
    ) -> Result<Option<CartItem>, StoreError> {
        let token = self.token().await?;
        let value = self
            .client
            .get(&item_path(uid, product), Some(token.expose_secret()))
            .await
            .map_err(store_error)?;
        if value.is_null() {
            return Ok(None);
        }
        match serde_json::from_value(value) {
            Ok(item) => Ok(Some(item)),
            Err(error) => {
                warn!(%error, "Treating malformed item node as absent");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, item), fields(uid = %uid, product = %item.id))]
    async fn write_item(&self, uid: &UserId, item: &CartItem) -> Result<(), StoreError> {
        let token = self.token().await?;
        let value = serde_json::to_value(item).map_err(StoreError::Decode)?;
        self.client
            .put(
                &item_path(uid, item.id),
                &value,
                Some(token.expose_secret()),
            )
            .await
            .map_err(store_error)
    }

    #[instrument(skip(self), fields(uid = %uid, product = %product, quantity))]
    async fn write_quantity(
        &self,
        uid: &UserId,
        product: ProductId,
        quantity: u32,
    ) -> Result<(), StoreError> {
        let token = self.token().await?;
        self.client
            .patch(
                &item_path(uid, product),
                &json!({ "quantity": quantity }),
                Some(token.expose_secret()),
            )
            .await
            .map_err(store_error)
    }

    #[instrument(skip(self), fields(uid = %uid, product = %product))]
    async fn remove_item(&self, uid: &UserId, product: ProductId) -> Result<(), StoreError> {
        let token = self.token().await?;
        self.client
            .delete(&item_path(uid, product), Some(token.expose_secret()))
            .await
            .map_err(store_error)
    }

    #[instrument(skip(self, cart), fields(uid = %uid, items = cart.len()))]
    async fn replace_cart(&self, uid: &UserId, cart: &Cart) -> Result<(), StoreError> {
        let token = self.token().await?;
        // An emptied cart serializes as {"items":{}}, which the database
        // collapses to a missing document; the stream then reports it as a
        // null put and snapshots normalize that back to an empty cart.
        let value = serde_json::to_value(cart).map_err(StoreError::Decode)?;
        self.client
            .put(&cart_path(uid), &value, Some(token.expose_secret()))
            .await
            .map_err(store_error)
    }
}

// ============================================================================
// Listen worker
// ============================================================================

enum PumpEnd {
    /// The server cancelled the read; the rules deny it. Stop for good.
    Terminal,
    /// The credential aged out mid-stream. Reconnect with a fresh token.
    Reconnect,
    /// Connection or protocol failure.
    Failed(StoreError),
}

#[instrument(skip_all, fields(uid = %uid))]
async fn run_listener(
    client: &RtdbClient,
    session: &AuthSession,
    uid: &UserId,
    path: &str,
    tx: &mpsc::UnboundedSender<CartDelivery>,
) {
    let mut failures: usize = 0;
    loop {
        match pump_stream(client, session, path, tx).await {
            PumpEnd::Terminal => return,
            PumpEnd::Reconnect => failures = 0,
            PumpEnd::Failed(error) => {
                warn!(error = %error, "Cart stream failed");
                if tx.send(CartDelivery::Failed(error)).is_err() {
                    return;
                }
                failures += 1;
                tokio::time::sleep(reconnect_delay(failures)).await;
            }
        }
        if tx.is_closed() {
            return;
        }
    }
}

/// Runs one listen connection until it ends, folding the event stream into
/// a mirrored document tree and emitting a whole-cart snapshot after every
/// data event.
async fn pump_stream(
    client: &RtdbClient,
    session: &AuthSession,
    path: &str,
    tx: &mpsc::UnboundedSender<CartDelivery>,
) -> PumpEnd {
    use futures::StreamExt;

    let token = match session.id_token().await {
        Ok(token) => token,
        Err(error) => return PumpEnd::Failed(auth_store_error(error)),
    };
    let stream = match client.listen(path, Some(token.expose_secret())).await {
        Ok(stream) => stream,
        Err(error) => return PumpEnd::Failed(store_error(error)),
    };
    let mut stream = std::pin::pin!(stream);

    // Rebuilt per connection; the server's first event is a full put.
    let mut tree = Value::Null;

    while let Some(event) = stream.next().await {
        match event {
            Ok(RtdbEvent::Put { path, data }) => {
                apply_put(&mut tree, &path, data);
                if tx.send(CartDelivery::Snapshot(decode_cart(&tree))).is_err() {
                    return PumpEnd::Terminal;
                }
            }
            Ok(RtdbEvent::Patch { path, data }) => {
                apply_patch(&mut tree, &path, data);
                if tx.send(CartDelivery::Snapshot(decode_cart(&tree))).is_err() {
                    return PumpEnd::Terminal;
                }
            }
            Ok(RtdbEvent::KeepAlive) => {}
            Ok(RtdbEvent::AuthRevoked) => {
                debug!("Credential revoked mid-stream, reconnecting");
                return PumpEnd::Reconnect;
            }
            Ok(RtdbEvent::Cancel) => {
                let _ = tx.send(CartDelivery::Failed(StoreError::PermissionDenied(
                    "the server cancelled the cart stream".to_owned(),
                )));
                return PumpEnd::Terminal;
            }
            Err(error) => return PumpEnd::Failed(store_error(error)),
        }
    }

    PumpEnd::Failed(StoreError::Unavailable("cart stream ended".to_owned()))
}

fn reconnect_delay(failures: usize) -> Duration {
    let index = failures
        .saturating_sub(1)
        .min(RECONNECT_DELAYS_SECS.len().saturating_sub(1));
    Duration::from_secs(RECONNECT_DELAYS_SECS.get(index).copied().unwrap_or(30))
}

// ============================================================================
// Decoding
// ============================================================================

/// Decodes a mirrored document tree into a cart snapshot.
///
/// `None` means the document does not exist. Item nodes that fail to decode
/// and keys that are not product ids are dropped with a warning.
fn decode_cart(tree: &Value) -> Option<Cart> {
    if tree.is_null() {
        return None;
    }
    let mut cart = Cart::new();
    let Some(items) = tree.get("items").and_then(Value::as_object) else {
        return Some(cart);
    };
    for (key, node) in items {
        let Ok(product) = key.parse::<u32>() else {
            warn!(key = %key, "Dropping item under a non-numeric key");
            continue;
        };
        match serde_json::from_value::<CartItem>(node.clone()) {
            Ok(item) => {
                cart.insert_or_increment(item);
            }
            Err(error) => {
                warn!(product, %error, "Dropping malformed item node");
            }
        }
    }
    Some(cart.normalized())
}

/// Computes the merged value for one item slot, mirroring the transaction
/// the mobile app runs: absent slots take the item wholesale, present slots
/// keep their stored fields and gain the quantity.
fn merge_value(current: &Value, item: &CartItem) -> Result<Value, serde_json::Error> {
    let Some(existing) = current.as_object() else {
        return serde_json::to_value(item);
    };
    let stored = existing
        .get("quantity")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let mut merged = existing.clone();
    merged.insert(
        "quantity".to_owned(),
        Value::from(stored.saturating_add(u64::from(item.quantity))),
    );
    Ok(Value::Object(merged))
}

/// The item as committed, for reporting in [`MergeOutcome::Committed`].
/// Falls back to the requested item's fields when the stored node was
/// partial and the merged value does not decode.
fn committed_item(merged: &Value, item: &CartItem) -> CartItem {
    serde_json::from_value(merged.clone()).unwrap_or_else(|_| {
        let quantity = merged
            .get("quantity")
            .and_then(Value::as_u64)
            .map_or(item.quantity, |q| u32::try_from(q).unwrap_or(u32::MAX));
        CartItem {
            quantity,
            ..item.clone()
        }
    })
}

fn store_error(error: RtdbError) -> StoreError {
    match error {
        RtdbError::PermissionDenied => {
            StoreError::PermissionDenied("database rules rejected the request".to_owned())
        }
        RtdbError::Parse(e) => StoreError::Decode(e),
        other => StoreError::Unavailable(other.to_string()),
    }
}

fn auth_store_error(error: AuthError) -> StoreError {
    match error {
        AuthError::NotSignedIn | AuthError::SessionExpired => {
            StoreError::PermissionDenied(error.to_string())
        }
        other => StoreError::Unavailable(other.to_string()),
    }
}
