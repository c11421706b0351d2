//! Error types for the cart engine.
//!
//! Three separate enums because the propagation rules differ: remote store
//! errors surface to the caller (except during `clear`), cache errors are
//! logged and swallowed, and `CartError` is what operations actually return.

use thiserror::Error;

/// Errors from the remote cart store.
///
/// Deliberately transport-agnostic: the Firebase implementation maps its
/// HTTP-level failures into these, and the in-memory store produces them
/// directly when rigged to fail.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or the request did not complete.
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the request for this identity.
    #[error("Remote store denied access: {0}")]
    PermissionDenied(String),

    /// The store returned a payload that does not decode.
    #[error("Remote store payload invalid: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors from the local cart cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading or writing the backing storage failed.
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The cached document could not be encoded or decoded.
    #[error("Cache encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The cache is unavailable.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned by [`CartSyncService`](crate::service::CartSyncService)
/// operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// A mutation was attempted with no signed-in identity.
    #[error("Not authenticated")]
    Unauthenticated,

    /// The requested quantity cannot be applied.
    #[error("Invalid quantity: {quantity}")]
    InvalidQuantity {
        /// The rejected quantity.
        quantity: i64,
    },

    /// A remote operation failed and was not recoverable locally.
    #[error("Remote error: {0}")]
    Remote(#[from] StoreError),
}

/// Result type alias for cart operations.
pub type Result<T> = std::result::Result<T, CartError>;
