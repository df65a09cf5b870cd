//! WebSocket configuration.
//!
//! Provides configuration options for the WebSocket client.

use std::fmt;
use std::time::Duration;

use crate::auth::Credential;

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default number of login acknowledgement checks.
pub const DEFAULT_AUTH_RETRY_BUDGET: u32 = 10;

/// Default spacing between login acknowledgement checks in seconds.
pub const DEFAULT_AUTH_RETRY_INTERVAL_SECS: u64 = 1;

/// Environment variable holding the login window in milliseconds.
pub const WINDOW_ENV: &str = "HITBTC_WINDOW_MS";

/// WebSocket endpoint family.
///
/// Selected once at construction; each family speaks one protocol shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Public market data (channel protocol).
    MarketData,
    /// Spot trading (method protocol, authenticated).
    Trading,
    /// Wallet management (method protocol, authenticated).
    Wallet,
    /// Legacy combined market data and account socket (method protocol).
    LegacyAccount,
}

impl Endpoint {
    /// Returns the production URL of this endpoint.
    #[must_use]
    pub const fn url(&self) -> &'static str {
        match self {
            Self::MarketData => "wss://api.hitbtc.com/api/3/ws/public",
            Self::Trading => "wss://api.hitbtc.com/api/3/ws/trading",
            Self::Wallet => "wss://api.hitbtc.com/api/3/ws/wallet",
            Self::LegacyAccount => "wss://api.hitbtc.com/api/2/ws",
        }
    }

    /// Returns true if every call on this endpoint needs a login first.
    #[must_use]
    pub const fn requires_auth(&self) -> bool {
        matches!(self, Self::Trading | Self::Wallet)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MarketData => write!(f, "market-data"),
            Self::Trading => write!(f, "trading"),
            Self::Wallet => write!(f, "wallet"),
            Self::LegacyAccount => write!(f, "legacy-account"),
        }
    }
}

/// WebSocket configuration.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// WebSocket URL.
    pub url: String,

    /// Endpoint family the URL serves.
    pub endpoint: Endpoint,

    /// Transport handshake timeout.
    pub connect_timeout: Duration,

    /// Number of login acknowledgement checks before giving up.
    pub auth_retry_budget: u32,

    /// Spacing between login acknowledgement checks.
    pub auth_retry_interval: Duration,

    /// Optional API credential; without one only public calls are allowed.
    pub credential: Option<Credential>,

    /// Accepted clock skew in milliseconds, sent on login.
    pub window_ms: Option<u64>,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self::new(Endpoint::MarketData)
    }
}

impl WsConfig {
    /// Creates a new configuration for the given endpoint.
    #[must_use]
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            url: endpoint.url().to_string(),
            endpoint,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            auth_retry_budget: DEFAULT_AUTH_RETRY_BUDGET,
            auth_retry_interval: Duration::from_secs(DEFAULT_AUTH_RETRY_INTERVAL_SECS),
            credential: None,
            window_ms: None,
        }
    }

    /// Creates a configuration from the environment.
    ///
    /// Reads the credential from `HITBTC_API_KEY` / `HITBTC_API_SECRET` and
    /// the window from `HITBTC_WINDOW_MS`; unset variables are skipped.
    #[must_use]
    pub fn from_env(endpoint: Endpoint) -> Self {
        Self {
            credential: Credential::from_env(),
            window_ms: std::env::var(WINDOW_ENV)
                .ok()
                .and_then(|v| v.parse().ok()),
            ..Self::new(endpoint)
        }
    }

    /// Overrides the URL (e.g. a sandbox or a local test server).
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the login acknowledgement budget.
    #[must_use]
    pub fn with_auth_retry(mut self, budget: u32, interval: Duration) -> Self {
        self.auth_retry_budget = budget;
        self.auth_retry_interval = interval;
        self
    }

    /// Sets the API credential.
    #[must_use]
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Sets the login window in milliseconds.
    #[must_use]
    pub fn with_window(mut self, window_ms: u64) -> Self {
        self.window_ms = Some(window_ms);
        self
    }

    /// Returns the total time allowed for login to be acknowledged.
    #[must_use]
    pub fn auth_budget(&self) -> Duration {
        self.auth_retry_interval
            .saturating_mul(self.auth_retry_budget)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), super::error::WsError> {
        if self.url.is_empty() {
            return Err(super::error::WsError::InvalidConfig(
                "url cannot be empty".to_string(),
            ));
        }

        if !self.url.starts_with("ws://") && !self.url.starts_with("wss://") {
            return Err(super::error::WsError::InvalidConfig(
                "url must start with ws:// or wss://".to_string(),
            ));
        }

        if self.auth_retry_budget == 0 {
            return Err(super::error::WsError::InvalidConfig(
                "auth retry budget must be at least 1".to_string(),
            ));
        }

        if self.endpoint.requires_auth() && self.credential.is_none() {
            return Err(super::error::WsError::InvalidConfig(format!(
                "{} endpoint requires api credentials",
                self.endpoint
            )));
        }

        Ok(())
    }
}
