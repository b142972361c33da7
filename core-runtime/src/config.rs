//! # Engine Configuration
//!
//! Builder-based configuration for the library sync engine. Validation is
//! fail-fast: `build()` rejects a configuration the engine could not run with
//! rather than letting the first sync discover it.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::EngineConfig;
//!
//! let config = EngineConfig::builder()
//!     .database_path("/var/lib/crates/library.db")
//!     .client_credentials("client-id", "client-secret")
//!     .addition_page_size(50)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default remote API base URL
pub const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1";

/// Default OAuth token endpoint
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Local items checked per membership batch during the removal phase
pub const DEFAULT_REMOVAL_PAGE_SIZE: u32 = 20;

/// Remote items fetched per page during the addition phase
pub const DEFAULT_ADDITION_PAGE_SIZE: u32 = 25;

/// Largest `limit` the saved-albums endpoint accepts
pub const MAX_ADDITION_PAGE_SIZE: u32 = 50;

/// Fully validated engine configuration
#[derive(Clone)]
pub struct EngineConfig {
    /// SQLite database file
    pub database_path: PathBuf,
    /// Remote API base URL, without trailing slash
    pub api_base_url: String,
    /// OAuth token endpoint used for the refresh grant
    pub token_url: String,
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Per-request HTTP timeout
    pub http_timeout: Duration,
    pub removal_page_size: u32,
    pub addition_page_size: u32,
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.client_id.trim().is_empty() || self.client_secret.trim().is_empty() {
            return Err(Error::Config(
                "OAuth client id and secret are required".to_string(),
            ));
        }

        for (name, url) in [("api_base_url", &self.api_base_url), ("token_url", &self.token_url)] {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(Error::Config(format!(
                    "{} must be an http(s) URL, got '{}'",
                    name, url
                )));
            }
        }

        if self.http_timeout.is_zero() {
            return Err(Error::Config("HTTP timeout must be positive".to_string()));
        }

        if self.removal_page_size == 0 {
            return Err(Error::Config(
                "Removal page size must be greater than zero".to_string(),
            ));
        }

        if self.addition_page_size == 0 || self.addition_page_size > MAX_ADDITION_PAGE_SIZE {
            return Err(Error::Config(format!(
                "Addition page size must be between 1 and {}, got {}",
                MAX_ADDITION_PAGE_SIZE, self.addition_page_size
            )));
        }

        Ok(())
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("database_path", &self.database_path)
            .field("api_base_url", &self.api_base_url)
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("http_timeout", &self.http_timeout)
            .field("removal_page_size", &self.removal_page_size)
            .field("addition_page_size", &self.addition_page_size)
            .finish()
    }
}

/// Builder for [`EngineConfig`]
#[derive(Default)]
pub struct EngineConfigBuilder {
    database_path: Option<PathBuf>,
    api_base_url: Option<String>,
    token_url: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    http_timeout: Option<Duration>,
    removal_page_size: Option<u32>,
    addition_page_size: Option<u32>,
}

impl EngineConfigBuilder {
    /// Set the SQLite database path (required)
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Set the OAuth client credentials (required)
    pub fn client_credentials(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.client_id = Some(client_id.into());
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = Some(url.into());
        self
    }

    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    pub fn removal_page_size(mut self, size: u32) -> Self {
        self.removal_page_size = Some(size);
        self
    }

    pub fn addition_page_size(mut self, size: u32) -> Self {
        self.addition_page_size = Some(size);
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required field is missing or invalid.
    pub fn build(self) -> Result<EngineConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;
        let client_id = self.client_id.ok_or_else(|| {
            Error::Config(
                "Client credentials are required. Use .client_credentials() to set them."
                    .to_string(),
            )
        })?;
        let client_secret = self.client_secret.unwrap_or_default();

        let config = EngineConfig {
            database_path,
            api_base_url: self
                .api_base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            token_url: self
                .token_url
                .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            client_id,
            client_secret,
            http_timeout: self.http_timeout.unwrap_or(Duration::from_secs(30)),
            removal_page_size: self.removal_page_size.unwrap_or(DEFAULT_REMOVAL_PAGE_SIZE),
            addition_page_size: self
                .addition_page_size
                .unwrap_or(DEFAULT_ADDITION_PAGE_SIZE),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> EngineConfigBuilder {
        EngineConfig::builder()
            .database_path("/tmp/library.db")
            .client_credentials("client", "secret")
    }

    #[test]
    fn test_defaults() {
        let config = base().build().unwrap();

        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.token_url, DEFAULT_TOKEN_URL);
        assert_eq!(config.removal_page_size, 20);
        assert_eq!(config.addition_page_size, 25);
        assert_eq!(config.http_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_missing_database_path() {
        let result = EngineConfig::builder()
            .client_credentials("client", "secret")
            .build();

        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("Database path")));
    }

    #[test]
    fn test_missing_credentials() {
        let result = EngineConfig::builder()
            .database_path("/tmp/library.db")
            .build();
        assert!(result.is_err());

        let result = EngineConfig::builder()
            .database_path("/tmp/library.db")
            .client_credentials("client", "  ")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_page_size_bounds() {
        assert!(base().removal_page_size(0).build().is_err());
        assert!(base().addition_page_size(0).build().is_err());
        assert!(base().addition_page_size(51).build().is_err());
        assert!(base().addition_page_size(50).build().is_ok());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = base()
            .api_base_url("http://localhost:8080/v1/")
            .build()
            .unwrap();
        assert_eq!(config.api_base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(base().token_url("accounts.example.com").build().is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = base().build().unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("\"secret\""));
        assert!(debug.contains("[REDACTED]"));
    }
}
