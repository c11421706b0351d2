//! Client for the Firebase Auth REST API.
//!
//! Covers the three flows the storefront uses: email/password sign-in,
//! email/password sign-up, and anonymous sign-in, plus ID-token refresh
//! against the Secure Token endpoint. All requests are keyed by the
//! project's web API key.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use shopez_core::{Email, Identity, UserId};
use tracing::{error, instrument};

use crate::error::AuthError;

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";

/// Fallback token lifetime when the server response omits or mangles
/// `expiresIn`. Matches the lifetime Firebase actually issues.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

// ============================================================================
// Client
// ============================================================================

/// Client for the Firebase Auth REST API.
///
/// Cheap to clone; all clones share the underlying connection pool.
#[derive(Clone)]
pub struct AuthClient {
    inner: Arc<AuthClientInner>,
}

struct AuthClientInner {
    client: reqwest::Client,
    api_key: SecretString,
}

/// Result of a successful sign-in or sign-up.
#[derive(Debug, Clone)]
pub struct SignedInUser {
    /// Who signed in
    pub identity: Identity,
    /// Tokens for authenticating subsequent requests
    pub tokens: SessionTokens,
}

/// Credential material returned by the Auth API.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    /// Short-lived ID token sent with database requests
    pub id_token: SecretString,
    /// Long-lived token used to mint fresh ID tokens
    pub refresh_token: SecretString,
    /// When the ID token stops being accepted
    pub expires_at: DateTime<Utc>,
}

impl AuthClient {
    /// Creates a client for the given project web API key.
    pub fn new(api_key: &str) -> Self {
        Self {
            inner: Arc::new(AuthClientInner {
                client: reqwest::Client::new(),
                api_key: SecretString::from(api_key.to_owned()),
            }),
        }
    }

    /// Signs in an existing email/password account.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn sign_in(&self, email: &Email, password: &str) -> Result<SignedInUser, AuthError> {
        let url = self.endpoint("accounts:signInWithPassword");
        let request = PasswordRequest {
            email: email.as_str(),
            password,
            return_secure_token: true,
        };
        let response: SignInResponse = self.post(url, &request).await?;
        Ok(account_user(response, email))
    }

    /// Creates a new email/password account and signs it in.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn sign_up(&self, email: &Email, password: &str) -> Result<SignedInUser, AuthError> {
        let url = self.endpoint("accounts:signUp");
        let request = PasswordRequest {
            email: email.as_str(),
            password,
            return_secure_token: true,
        };
        let response: SignInResponse = self.post(url, &request).await?;
        Ok(account_user(response, email))
    }

    /// Creates a throwaway anonymous account and signs it in.
    ///
    /// The account exists server-side with a stable uid, so an anonymous
    /// shopper keeps their cart across reconnects for as long as the
    /// refresh token stays valid.
    #[instrument(skip(self))]
    pub async fn sign_in_anonymously(&self) -> Result<SignedInUser, AuthError> {
        let url = self.endpoint("accounts:signUp");
        let request = AnonymousRequest {
            return_secure_token: true,
        };
        let response: SignInResponse = self.post(url, &request).await?;
        let identity = Identity::anonymous(UserId::from(response.local_id.clone()));
        Ok(SignedInUser {
            identity,
            tokens: tokens_from(response.id_token, response.refresh_token, &response.expires_in),
        })
    }

    /// Exchanges a refresh token for a fresh ID token.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &SecretString) -> Result<SessionTokens, AuthError> {
        let url = format!(
            "{SECURE_TOKEN_URL}?key={}",
            self.inner.api_key.expose_secret()
        );
        let request = RefreshRequest {
            grant_type: "refresh_token",
            refresh_token: refresh_token.expose_secret(),
        };
        let response: RefreshResponse = self.post(url, &request).await?;
        Ok(tokens_from(
            response.id_token,
            response.refresh_token,
            &response.expires_in,
        ))
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{IDENTITY_TOOLKIT_URL}/{method}?key={}",
            self.inner.api_key.expose_secret()
        )
    }

    /// POSTs a JSON body and decodes the JSON response.
    ///
    /// Non-success responses carry an error-code string in the body, which
    /// is mapped to a dedicated [`AuthError`] variant where one exists.
    async fn post<T: DeserializeOwned>(
        &self,
        url: String,
        body: &impl Serialize,
    ) -> Result<T, AuthError> {
        let response = self.inner.client.post(&url).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            if let Ok(api_error) = serde_json::from_str::<ApiErrorBody>(&text) {
                return Err(map_api_error(&api_error.error.message));
            }
            error!(
                status = %status,
                body = %text.chars().take(500).collect::<String>(),
                "Auth API returned an error"
            );
            return Err(AuthError::Api(format!("HTTP {status}")));
        }

        Ok(serde_json::from_str(&text)?)
    }
}

fn account_user(response: SignInResponse, email: &Email) -> SignedInUser {
    let identity = Identity::account(UserId::from(response.local_id.clone()), email.clone());
    SignedInUser {
        identity,
        tokens: tokens_from(response.id_token, response.refresh_token, &response.expires_in),
    }
}

fn tokens_from(id_token: String, refresh_token: String, expires_in: &str) -> SessionTokens {
    let lifetime = expires_in
        .parse::<i64>()
        .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
    SessionTokens {
        id_token: SecretString::from(id_token),
        refresh_token: SecretString::from(refresh_token),
        expires_at: Utc::now() + Duration::seconds(lifetime),
    }
}

/// Maps an Auth API error-code message to an [`AuthError`].
///
/// Messages are the bare code (`"EMAIL_EXISTS"`) or the code followed by a
/// detail (`"WEAK_PASSWORD : Password should be at least 6 characters"`).
fn map_api_error(message: &str) -> AuthError {
    let code = message.split_whitespace().next().unwrap_or("");
    match code {
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => {
            AuthError::InvalidCredentials
        }
        "EMAIL_EXISTS" => AuthError::UserAlreadyExists,
        "INVALID_EMAIL" | "MISSING_EMAIL" => AuthError::InvalidEmail(message.to_owned()),
        "USER_DISABLED" => AuthError::UserDisabled,
        "TOO_MANY_ATTEMPTS_TRY_LATER" => AuthError::TooManyAttempts,
        "WEAK_PASSWORD" | "MISSING_PASSWORD" => AuthError::WeakPassword(weak_password_detail(message)),
        "TOKEN_EXPIRED" | "INVALID_REFRESH_TOKEN" | "USER_NOT_FOUND" => AuthError::SessionExpired,
        _ => AuthError::Api(message.to_owned()),
    }
}

fn weak_password_detail(message: &str) -> String {
    message
        .split_once(" : ")
        .map_or_else(|| message.to_owned(), |(_, detail)| detail.to_owned())
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnonymousRequest {
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'a str,
    refresh_token: &'a str,
}

// The Secure Token endpoint answers in snake_case, unlike the rest of the
// Auth API.
#[derive(Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}
