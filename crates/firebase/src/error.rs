//! Error types for the Firebase Auth and Realtime Database clients.

use thiserror::Error;

/// Errors from the Firebase Auth REST API and session management.
///
/// The Identity Toolkit reports failures as an error-code string inside the
/// response body. The codes a storefront actually hits are mapped to
/// dedicated variants so callers can branch on them; everything else lands
/// in [`AuthError::Api`].
#[derive(Error, Debug)]
pub enum AuthError {
    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Wrong email/password combination, or the account does not exist
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Sign-up attempted with an email that already has an account
    #[error("An account with this email already exists")]
    UserAlreadyExists,

    /// Password rejected by the server's strength policy
    #[error("Weak password: {0}")]
    WeakPassword(String),

    /// Email rejected by the server
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// The account has been disabled by an administrator
    #[error("This account has been disabled")]
    UserDisabled,

    /// Sign-in throttled after repeated failures
    #[error("Too many attempts, try again later")]
    TooManyAttempts,

    /// The refresh token is no longer accepted, the user must sign in again
    #[error("Session expired, sign in again")]
    SessionExpired,

    /// An operation that needs credentials was called with no one signed in
    #[error("Not signed in")]
    NotSignedIn,

    /// Unmapped error code from the Auth API
    #[error("Auth API error: {0}")]
    Api(String),

    /// Failed to parse an Auth API response
    #[error("Failed to parse auth response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Failed to read or write the persisted session file
    #[error("Session storage error: {0}")]
    Storage(#[from] std::io::Error),
}

/// Errors from the Realtime Database REST and streaming endpoints.
#[derive(Error, Debug)]
pub enum RtdbError {
    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status without a more specific mapping
    #[error("Database returned status {status}")]
    Status {
        /// HTTP status code
        status: u16,
    },

    /// The security rules rejected the request (401 or 403)
    #[error("Permission denied by database rules")]
    PermissionDenied,

    /// Failed to parse a database response
    #[error("Failed to parse database response: {0}")]
    Parse(#[from] serde_json::Error),

    /// A conditional request came back without the ETag header it needs
    #[error("Response missing ETag header")]
    MissingEtag,

    /// The event stream broke or delivered something unintelligible
    #[error("Stream error: {0}")]
    Stream(String),

    /// Could not obtain an ID token for the request
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),
}
