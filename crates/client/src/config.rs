//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `EVCHARGE_API_BASE_URL` - Base URL of the charging-station API
//!   (default: `http://localhost:8080/api`)
//! - `EVCHARGE_TOKEN_FILE` - Where the refresh token is persisted
//!   (default: `$HOME/.evcharge/session.json`)
//! - `EVCHARGE_HTTP_TIMEOUT_SECS` - Per-request timeout in seconds (default: 30)

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Default API host used by the original web client.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const TOKEN_FILE_NAME: &str = "session.json";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// EV Charge client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL every API path is appended to (e.g. `http://localhost:8080/api`)
    pub api_base_url: Url,
    /// File holding the persisted refresh token
    pub token_file: PathBuf,
    /// Timeout applied to each HTTP request
    pub http_timeout: Duration,
}

impl ClientConfig {
    /// Create a configuration for the given API base URL with default settings.
    #[must_use]
    pub fn new(api_base_url: Url) -> Self {
        Self {
            api_base_url,
            token_file: default_token_file(None),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_url = lookup("EVCHARGE_API_BASE_URL")
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let api_base_url = parse_base_url(&raw_url).map_err(|e| {
            ConfigError::InvalidEnvVar("EVCHARGE_API_BASE_URL".to_string(), e)
        })?;

        let token_file = lookup("EVCHARGE_TOKEN_FILE")
            .map_or_else(|| default_token_file(lookup("HOME")), PathBuf::from);

        let http_timeout = match lookup("EVCHARGE_HTTP_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| {
                    ConfigError::InvalidEnvVar(
                        "EVCHARGE_HTTP_TIMEOUT_SECS".to_string(),
                        format!("expected a positive number of seconds, got '{raw}'"),
                    )
                })?,
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        };

        Ok(Self {
            api_base_url,
            token_file,
            http_timeout,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse and check the API base URL. Only http(s) URLs without query or
/// fragment are accepted since API paths are appended verbatim.
fn parse_base_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw.trim()).map_err(|e| e.to_string())?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("URL must have a host".to_string());
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err("URL must not carry a query or fragment".to_string());
    }

    Ok(url)
}

/// Token file under the home directory, or the working directory without one.
fn default_token_file(home: Option<String>) -> PathBuf {
    let home = home.or_else(|| std::env::var("HOME").ok());
    home.filter(|h| !h.is_empty()).map_or_else(
        || PathBuf::from(".evcharge-session.json"),
        |h| PathBuf::from(h).join(".evcharge").join(TOKEN_FILE_NAME),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::from_lookup(lookup_from(&[("HOME", "/home/driver")])).unwrap();
        assert_eq!(config.api_base_url.as_str(), DEFAULT_API_BASE_URL);
        assert_eq!(
            config.token_file,
            PathBuf::from("/home/driver/.evcharge/session.json")
        );
        assert_eq!(config.http_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_overrides() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("EVCHARGE_API_BASE_URL", "https://charge.example.com/api"),
            ("EVCHARGE_TOKEN_FILE", "/tmp/evcharge.json"),
            ("EVCHARGE_HTTP_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.api_base_url.host_str(), Some("charge.example.com"));
        assert_eq!(config.token_file, PathBuf::from("/tmp/evcharge.json"));
        assert_eq!(config.http_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_base_url() {
        for bad in ["not a url", "ftp://host/api", "http://host/api?x=1"] {
            let result = ClientConfig::from_lookup(lookup_from(&[("EVCHARGE_API_BASE_URL", bad)]));
            assert!(
                matches!(result, Err(ConfigError::InvalidEnvVar(ref var, _)) if var == "EVCHARGE_API_BASE_URL"),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_invalid_timeout() {
        for bad in ["0", "-3", "soon"] {
            let result =
                ClientConfig::from_lookup(lookup_from(&[("EVCHARGE_HTTP_TIMEOUT_SECS", bad)]));
            assert!(result.is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_default_token_file_without_home() {
        assert_eq!(
            default_token_file(Some(String::new())),
            PathBuf::from(".evcharge-session.json")
        );
    }
}
