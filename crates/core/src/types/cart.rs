//! Cart data model.
//!
//! A [`Cart`] is the document stored at `carts/{uid}` in the remote store and
//! mirrored into the local cache. Items are keyed by product id; the remote
//! store renders map keys in decimal, which `ProductId`'s transparent serde
//! representation matches.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::price::Price;

/// A single line in the cart: a catalog product snapshot plus a quantity.
///
/// The product fields are copied from the catalog at add time rather than
/// referenced, so a cart stays renderable even when the catalog is
/// unreachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    /// Catalog product id. Matches the key this item is stored under.
    pub id: ProductId,
    /// Product title at add time.
    pub title: String,
    /// Unit price at add time.
    pub price: Price,
    /// Product image URL.
    pub image: String,
    /// Number of units. Always at least 1 in a stored cart.
    pub quantity: u32,
}

impl CartItem {
    /// Price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.price.times(self.quantity)
    }
}

/// A user's shopping cart.
///
/// The `items` field defaults when absent: the remote store collapses empty
/// maps, so a cart that has been cleared comes back as `{}` or not at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    /// Items keyed by product id.
    #[serde(default)]
    pub items: BTreeMap<ProductId, CartItem>,
}

impl Cart {
    /// An empty cart.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the cart has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of distinct products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Look up an item by product id.
    #[must_use]
    pub fn get(&self, id: ProductId) -> Option<&CartItem> {
        self.items.get(&id)
    }

    /// Total number of units across all items. Drives the cart badge.
    #[must_use]
    pub fn total_quantity(&self) -> u32 {
        self.items.values().map(|item| item.quantity).sum()
    }

    /// Sum of all line totals.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.items
            .values()
            .fold(Price::default(), |acc, item| acc.plus(item.line_total()))
    }

    /// Insert an item, or add its quantity onto an existing line.
    ///
    /// When the product is already present, only the quantity changes: the
    /// stored title, price, and image are kept as-is. Returns the resulting
    /// quantity for the line.
    pub fn insert_or_increment(&mut self, item: CartItem) -> u32 {
        match self.items.entry(item.id) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                existing.quantity = existing.quantity.saturating_add(item.quantity);
                existing.quantity
            }
            Entry::Vacant(entry) => {
                let quantity = item.quantity;
                entry.insert(item);
                quantity
            }
        }
    }

    /// Set an existing line to an exact quantity.
    ///
    /// Returns `false` if the product is not in the cart. Callers are
    /// responsible for translating non-positive quantities into removal
    /// before reaching this point.
    pub fn set_quantity(&mut self, id: ProductId, quantity: u32) -> bool {
        match self.items.get_mut(&id) {
            Some(item) => {
                item.quantity = quantity;
                true
            }
            None => false,
        }
    }

    /// Remove a line, returning it if it was present.
    pub fn remove(&mut self, id: ProductId) -> Option<CartItem> {
        self.items.remove(&id)
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// This cart with quantity-0 lines dropped.
    ///
    /// The wire does not enforce the quantity invariant, so loaders run
    /// stored documents through this before publishing a snapshot.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.items.retain(|_, item| item.quantity > 0);
        self
    }
}
