//! ShopEZ product catalog client.
//!
//! A typed client for the public Fake Store API. Read-only: the catalog is
//! never written, only browsed, so every endpoint is a GET and responses
//! are cached for 5 minutes.

#![cfg_attr(not(test), forbid(unsafe_code))]

mod cache;
mod conversions;

pub mod client;
pub mod error;
pub mod types;

pub use client::CatalogClient;
pub use error::CatalogError;
pub use types::{Product, Rating};
