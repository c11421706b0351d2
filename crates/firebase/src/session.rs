//! Signed-in session state with disk persistence and lazy token refresh.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use shopez_core::{Email, Identity};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::auth::{AuthClient, SessionTokens, SignedInUser};
use crate::error::AuthError;

/// Refresh the ID token once it has less than this long left.
const REFRESH_MARGIN_SECS: i64 = 300;

/// The signed-in user, persisted across restarts.
///
/// Wraps an [`AuthClient`] and keeps the current identity plus its tokens.
/// The session is written to a JSON file after every change, so a restart
/// can resume the same account without asking for credentials again, the
/// same way the mobile app resumes from its on-device auth storage.
///
/// Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct AuthSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    auth: AuthClient,
    path: PathBuf,
    state: Mutex<Option<SessionState>>,
}

struct SessionState {
    identity: Identity,
    tokens: SessionTokens,
}

/// On-disk shape of a session.
///
/// Tokens are stored in the clear, matching what the mobile SDK keeps in
/// its local auth storage. The file lives in the user's own data directory.
#[derive(Serialize, Deserialize)]
struct StoredSession {
    identity: Identity,
    id_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

impl AuthSession {
    /// Creates an empty session persisting to `path`.
    pub fn new(auth: AuthClient, path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                auth,
                path: path.into(),
                state: Mutex::new(None),
            }),
        }
    }

    /// Loads a previously persisted session from disk, if one exists.
    ///
    /// An expired ID token is fine here; it is refreshed on the next
    /// [`id_token`](Self::id_token) call. A corrupt session file is
    /// discarded rather than surfaced, so a bad write never locks the user
    /// out of the app.
    pub async fn restore(&self) -> Result<Option<Identity>, AuthError> {
        let bytes = match fs::read(&self.inner.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let stored: StoredSession = match serde_json::from_slice(&bytes) {
            Ok(stored) => stored,
            Err(error) => {
                warn!(%error, "Discarding unreadable session file");
                self.remove_file().await;
                return Ok(None);
            }
        };

        let identity = stored.identity.clone();
        let mut state = self.inner.state.lock().await;
        *state = Some(SessionState {
            identity: stored.identity,
            tokens: SessionTokens {
                id_token: SecretString::from(stored.id_token),
                refresh_token: SecretString::from(stored.refresh_token),
                expires_at: stored.expires_at,
            },
        });
        debug!(uid = %identity.uid, "Restored session from disk");
        Ok(Some(identity))
    }

    /// Signs in an existing email/password account.
    pub async fn sign_in(&self, email: &Email, password: &str) -> Result<Identity, AuthError> {
        let user = self.inner.auth.sign_in(email, password).await?;
        Ok(self.install(user).await)
    }

    /// Creates a new email/password account and signs it in.
    pub async fn sign_up(&self, email: &Email, password: &str) -> Result<Identity, AuthError> {
        let user = self.inner.auth.sign_up(email, password).await?;
        Ok(self.install(user).await)
    }

    /// Signs in as an anonymous guest.
    pub async fn sign_in_anonymously(&self) -> Result<Identity, AuthError> {
        let user = self.inner.auth.sign_in_anonymously().await?;
        Ok(self.install(user).await)
    }

    /// Signs out and deletes the persisted session.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let mut state = self.inner.state.lock().await;
        *state = None;
        drop(state);
        match fs::remove_file(&self.inner.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// The currently signed-in identity, if any.
    pub async fn identity(&self) -> Option<Identity> {
        self.inner.state.lock().await.as_ref().map(|s| s.identity.clone())
    }

    /// A currently valid ID token for database requests.
    ///
    /// Refreshes through the Secure Token endpoint when the cached token is
    /// inside the refresh margin. The session lock is held across the
    /// refresh, so concurrent callers trigger at most one refresh request.
    pub async fn id_token(&self) -> Result<SecretString, AuthError> {
        let mut state = self.inner.state.lock().await;
        let Some(session) = state.as_mut() else {
            return Err(AuthError::NotSignedIn);
        };

        if needs_refresh(session.tokens.expires_at, Utc::now()) {
            debug!("ID token near expiry, refreshing");
            match self.inner.auth.refresh(&session.tokens.refresh_token).await {
                Ok(tokens) => session.tokens = tokens,
                Err(AuthError::SessionExpired) => {
                    info!("Refresh token no longer accepted, clearing session");
                    *state = None;
                    drop(state);
                    self.remove_file().await;
                    return Err(AuthError::SessionExpired);
                }
                Err(error) => return Err(error),
            }
            let token = session.tokens.id_token.clone();
            let stored = stored_from(session);
            self.write_stored(&stored).await;
            return Ok(token);
        }

        Ok(session.tokens.id_token.clone())
    }

    async fn install(&self, user: SignedInUser) -> Identity {
        let identity = user.identity.clone();
        let mut state = self.inner.state.lock().await;
        *state = Some(SessionState {
            identity: user.identity,
            tokens: user.tokens,
        });
        let stored = state.as_ref().map(stored_from);
        drop(state);
        if let Some(stored) = stored {
            self.write_stored(&stored).await;
        }
        info!(uid = %identity.uid, anonymous = identity.is_anonymous, "Signed in");
        identity
    }

    /// Best-effort write of the session file. A failure here costs the user
    /// a re-login after restart, nothing more, so it is logged and dropped.
    async fn write_stored(&self, stored: &StoredSession) {
        if let Err(error) = write_session_file(&self.inner.path, stored).await {
            warn!(%error, "Failed to persist session file");
        }
    }

    async fn remove_file(&self) {
        if let Err(err) = fs::remove_file(&self.inner.path).await
            && err.kind() != std::io::ErrorKind::NotFound
        {
            warn!(error = %err, "Failed to delete session file");
        }
    }
}

fn needs_refresh(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at - now < Duration::seconds(REFRESH_MARGIN_SECS)
}

fn stored_from(session: &SessionState) -> StoredSession {
    StoredSession {
        identity: session.identity.clone(),
        id_token: session.tokens.id_token.expose_secret().to_owned(),
        refresh_token: session.tokens.refresh_token.expose_secret().to_owned(),
        expires_at: session.tokens.expires_at,
    }
}

async fn write_session_file(path: &Path, stored: &StoredSession) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).await?;
    }
    let bytes = serde_json::to_vec_pretty(stored).map_err(std::io::Error::other)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}
