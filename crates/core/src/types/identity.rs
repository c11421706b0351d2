//! Authenticated user identity.

use serde::{Deserialize, Serialize};

use super::email::Email;
use super::id::UserId;

/// The signed-in user as reported by the identity provider.
///
/// The cart keys all of its storage, remote and local, off `uid`. The email
/// is display-only and absent for anonymous sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque identity-provider UID.
    pub uid: UserId,
    /// Account email, if the session is tied to an account.
    pub email: Option<Email>,
    /// Whether this is a guest session.
    pub is_anonymous: bool,
}

impl Identity {
    /// An identity backed by an email/password account.
    #[must_use]
    pub fn account(uid: UserId, email: Email) -> Self {
        Self {
            uid,
            email: Some(email),
            is_anonymous: false,
        }
    }

    /// A guest identity with no account attached.
    #[must_use]
    pub fn anonymous(uid: UserId) -> Self {
        Self {
            uid,
            email: None,
            is_anonymous: true,
        }
    }
}
