//! CLI configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required for online shopping
//! - `SHOPEZ_FIREBASE_API_KEY` - Firebase project web API key
//! - `SHOPEZ_FIREBASE_DATABASE_URL` - Realtime Database URL
//!   (e.g., <https://shopez-18a05-default-rtdb.firebaseio.com>)
//!
//! ## Optional
//! - `SHOPEZ_CATALOG_URL` - Product catalog API base URL
//!   (default: <https://fakestoreapi.com>)
//! - `SHOPEZ_DATA_DIR` - Directory for the session file and cart cache
//!   (default: `~/.shopez`)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::path::PathBuf;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const DEFAULT_CATALOG_URL: &str = "https://fakestoreapi.com";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// General CLI configuration, needed by every command.
#[derive(Debug, Clone)]
pub struct ShopEzConfig {
    /// Product catalog API base URL
    pub catalog_url: String,
    /// Directory holding the session file and cached carts
    pub data_dir: PathBuf,
}

/// Firebase configuration, needed only when shopping online.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct FirebaseConfig {
    /// Project web API key
    pub api_key: SecretString,
    /// Realtime Database URL
    pub database_url: String,
}

impl std::fmt::Debug for FirebaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseConfig")
            .field("api_key", &"[REDACTED]")
            .field("database_url", &self.database_url)
            .finish()
    }
}

impl ShopEzConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the catalog URL override is not a valid
    /// http(s) URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let catalog_url = get_env_or_default("SHOPEZ_CATALOG_URL", DEFAULT_CATALOG_URL);
        validate_http_url("SHOPEZ_CATALOG_URL", &catalog_url)?;

        let data_dir = std::env::var_os("SHOPEZ_DATA_DIR")
            .map_or_else(default_data_dir, PathBuf::from);

        Ok(Self {
            catalog_url,
            data_dir,
        })
    }
}

impl FirebaseConfig {
    /// Load Firebase configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is missing, the database URL is
    /// not a valid http(s) URL, or the API key looks like a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let api_key = get_validated_secret("SHOPEZ_FIREBASE_API_KEY")?;
        let database_url = get_required_env("SHOPEZ_FIREBASE_DATABASE_URL")?;
        validate_http_url("SHOPEZ_FIREBASE_DATABASE_URL", &database_url)?;

        Ok(Self {
            api_key,
            database_url,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Per-user data directory: `~/.shopez`, or `./.shopez` with no home.
fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME").map_or_else(
        || PathBuf::from(".shopez"),
        |home| PathBuf::from(home).join(".shopez"),
    )
}

/// Validate that a value parses as an http(s) URL.
fn validate_http_url(var_name: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidEnvVar(var_name.to_string(), e.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            format!("expected an http(s) URL, got scheme '{}'", url.scheme()),
        ));
    }
    Ok(())
}

/// Validate that a secret is not a placeholder.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }
    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_http_url_accepts_https() {
        assert!(validate_http_url("VAR", "https://shopez-18a05-default-rtdb.firebaseio.com").is_ok());
        assert!(validate_http_url("VAR", "http://localhost:9000").is_ok());
    }

    #[test]
    fn test_validate_http_url_rejects_garbage() {
        assert!(validate_http_url("VAR", "not a url").is_err());
        assert!(validate_http_url("VAR", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-api-key-here", "TEST_VAR");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        assert!(validate_secret_strength("AIzaSyC8rKbQx0vLm24jWn", "TEST_VAR").is_ok());
    }

    #[test]
    fn test_firebase_config_debug_redacts_the_key() {
        let config = FirebaseConfig {
            api_key: SecretString::from("AIzaSyC8rKbQx0vLm24jWn"),
            database_url: "https://demo-default-rtdb.firebaseio.com".to_string(),
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(debug_output.contains("demo-default-rtdb"));
        assert!(!debug_output.contains("AIzaSyC8rKbQx0vLm24jWn"));
    }

    #[test]
    fn test_default_data_dir_is_under_home_when_set() {
        // HOME is set in every environment these tests run in
        if std::env::var_os("HOME").is_some() {
            assert!(default_data_dir().ends_with(".shopez"));
        }
    }
}
