//! Local cart cache contract.

use std::future::Future;

use shopez_core::{Cart, UserId};

use crate::error::CacheError;

/// Per-user local cart storage.
///
/// The cache exists to make sign-in feel instant and to keep the last-known
/// cart renderable offline. It is always written best-effort: the engine
/// logs cache failures and carries on, so implementations should not try to
/// be clever about partial writes beyond not corrupting existing data.
pub trait CartCache: Send + Sync + 'static {
    /// Load the cached cart for a user. `None` if nothing is cached.
    fn load(&self, uid: &UserId) -> impl Future<Output = Result<Option<Cart>, CacheError>> + Send;

    /// Replace the cached cart for a user.
    fn store(
        &self,
        uid: &UserId,
        cart: &Cart,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;
}
