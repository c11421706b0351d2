//! Catalog domain types.

use serde::{Deserialize, Serialize};

use shopez_core::{CartItem, Price, ProductId};

/// A product in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Numeric catalog id.
    pub id: ProductId,
    /// Display title.
    pub title: String,
    /// Unit price.
    pub price: Price,
    /// Long-form description.
    pub description: String,
    /// Category slug, e.g. `electronics`.
    pub category: String,
    /// Image URL.
    pub image: String,
    /// Aggregate customer rating.
    pub rating: Rating,
}

/// Aggregate rating for a product.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rating {
    /// Average rating out of 5.
    pub rate: f64,
    /// Number of ratings.
    pub count: u32,
}

impl Product {
    /// The cart line this product becomes when added with a quantity.
    ///
    /// Only the fields the cart persists are carried over; description,
    /// category, and rating stay in the catalog.
    #[must_use]
    pub fn to_cart_item(&self, quantity: u32) -> CartItem {
        CartItem {
            id: self.id,
            title: self.title.clone(),
            price: self.price,
            image: self.image.clone(),
            quantity,
        }
    }
}
