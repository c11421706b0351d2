//! ShopEZ cart synchronization engine.
//!
//! [`CartSyncService`] keeps three copies of a user's cart consistent:
//!
//! - the in-memory cart the UI renders, published through a watch channel
//! - a local cache that survives restarts and makes sign-in feel instant
//! - the authoritative remote document, observed through a live subscription
//!
//! Mutations are applied optimistically where latency matters (adding an
//! item) and pessimistically everywhere else. The remote subscription
//! redelivers the authoritative cart after every committed write, so
//! optimistic state is always transient.
//!
//! The engine is generic over a [`RemoteCartStore`] and a [`CartCache`].
//! Production wiring uses the Firebase-backed store from `shopez-firebase`
//! and [`DiskCartCache`]; the in-memory pair in [`memory`] backs offline
//! mode and tests.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod disk;
pub mod error;
pub mod memory;
pub mod service;
pub mod store;

pub use cache::CartCache;
pub use disk::DiskCartCache;
pub use error::{CacheError, CartError, StoreError};
pub use memory::{MemoryCartCache, MemoryCartStore, MergeBehavior};
pub use service::{CartState, CartSyncService};
pub use store::{CartDelivery, CartSubscription, MergeOutcome, RemoteCartStore};
