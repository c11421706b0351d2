//! Cache types for catalog API responses.

use shopez_core::ProductId;

use crate::types::Product;

/// Cache key for catalog lookups.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Products,
    Category(String),
    Categories,
    Product(ProductId),
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Products(Vec<Product>),
    Categories(Vec<String>),
    Product(Box<Product>),
}
