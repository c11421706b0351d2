//! ShopEZ Core - Shared types library.
//!
//! This crate provides common types used across all ShopEZ components:
//! - `cart` - Cart synchronization engine
//! - `catalog` - Product catalog client
//! - `firebase` - Identity and Realtime Database clients
//! - `cli` - Terminal storefront shell
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no async. This keeps it lightweight and allows it to be used
//! anywhere, including inside store implementations and tests.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids and emails, prices, and the cart model

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
