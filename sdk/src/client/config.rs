//! Client configuration.
//!
//! Provides configuration options for the HTTP client.

use std::time::Duration;

use reqwest::Url;

use super::error::ClientError;
use crate::auth::Credential;

/// Default base URL for the API.
pub const DEFAULT_BASE_URL: &str = "https://api.hitbtc.com/api/3";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL for the API.
    pub base_url: String,

    /// Request timeout.
    pub timeout: Duration,

    /// Optional API credential used to sign every request.
    pub credential: Option<Credential>,

    /// Accepted clock skew in milliseconds, included in the signature.
    pub window_ms: Option<u64>,

    /// User agent string.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            credential: None,
            window_ms: None,
            user_agent: format!("hitbtc-sdk/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// Creates a new configuration with the given base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Creates the default configuration with the credential taken from
    /// the environment, if set.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            credential: Credential::from_env(),
            window_ms: std::env::var(crate::ws::config::WINDOW_ENV)
                .ok()
                .and_then(|v| v.parse().ok()),
            ..Default::default()
        }
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the API credential.
    #[must_use]
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Sets the signature window in milliseconds.
    #[must_use]
    pub fn with_window(mut self, window_ms: u64) -> Self {
        self.window_ms = Some(window_ms);
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Checks that the base URL is an absolute `http(s)` URL and that the
    /// timeout and window are non-zero.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidConfig` describing the first problem.
    pub fn validate(&self) -> Result<(), ClientError> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            ClientError::InvalidConfig(format!("base_url {:?}: {}", self.base_url, e))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::InvalidConfig(format!(
                "base_url scheme must be http or https, got {}",
                url.scheme()
            )));
        }

        if self.timeout.is_zero() {
            return Err(ClientError::InvalidConfig("timeout must be non-zero".to_string()));
        }

        if self.window_ms == Some(0) {
            return Err(ClientError::InvalidConfig("window must be non-zero".to_string()));
        }

        Ok(())
    }
}
