//! Firebase clients for ShopEZ.
//!
//! This crate talks to two Firebase REST surfaces:
//!
//! - **Auth** ([`AuthClient`], [`AuthSession`]): email/password sign-in and
//!   sign-up plus anonymous accounts via the Identity Toolkit API, with
//!   token refresh against the Secure Token endpoint. [`AuthSession`] keeps
//!   the signed-in state, persists it to disk so a restart resumes the same
//!   account, and hands out a fresh ID token on demand.
//! - **Realtime Database** ([`RtdbClient`], [`RtdbCartStore`]): plain REST
//!   verbs against `*.json` paths, ETag-based conditional writes, and a
//!   streaming listener over Server-Sent Events. [`RtdbCartStore`] adapts
//!   all of that to the `shopez-cart` [`RemoteCartStore`] trait so the sync
//!   service never sees Firebase-specific types.
//!
//! [`RemoteCartStore`]: shopez_cart::RemoteCartStore

#![cfg_attr(not(test), forbid(unsafe_code))]

mod auth;
mod error;
mod rtdb;
mod session;
mod store;

pub use auth::{AuthClient, SessionTokens, SignedInUser};
pub use error::{AuthError, RtdbError};
pub use rtdb::{CasOutcome, RtdbClient, RtdbEvent};
pub use session::AuthSession;
pub use store::RtdbCartStore;
