//! API credential storage and request signing.
//!
//! Both transports authenticate with HMAC-SHA256 (`HS256`):
//!
//! - WebSocket login signs the timestamp in seconds, followed by the window
//!   in milliseconds when one is configured.
//! - HTTP requests sign `method | timestamp | path | ?query | body`, followed
//!   by the window when configured, and send the result in an
//!   `Authorization: HS256 <base64>` header.

use std::fmt;

use aws_lc_rs::hmac;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Serialize;

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "HITBTC_API_KEY";

/// Environment variable holding the API secret.
pub const API_SECRET_ENV: &str = "HITBTC_API_SECRET";

/// Signature scheme tag sent on login and in the HTTP header.
pub const SIGNATURE_SCHEME: &str = "HS256";

/// API key and secret used to sign requests.
#[derive(Clone)]
pub struct Credential {
    api_key: String,
    api_secret: Box<[u8]>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Parameters of the WebSocket `login` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginParams {
    /// Signature scheme, always `HS256`.
    #[serde(rename = "type")]
    pub scheme: &'static str,

    /// API key.
    pub api_key: String,

    /// Seconds since epoch at signing time, as the decimal string that
    /// was signed.
    pub timestamp: String,

    /// Lowercase hex HMAC-SHA256 of the login message.
    pub signature: String,

    /// Accepted clock skew in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<u64>,
}

impl Credential {
    /// Creates a new credential.
    #[must_use]
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into().into_bytes().into_boxed_slice(),
        }
    }

    /// Loads the credential from `HITBTC_API_KEY` and `HITBTC_API_SECRET`.
    ///
    /// Returns `None` if either variable is unset.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let key = std::env::var(API_KEY_ENV).ok()?;
        let secret = std::env::var(API_SECRET_ENV).ok()?;
        Some(Self::new(key, secret))
    }

    /// Returns the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Returns the lowercase hex HMAC-SHA256 of `message`.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> String {
        let key = hmac::Key::new(hmac::HMAC_SHA256, &self.api_secret);
        let tag = hmac::sign(&key, message);
        hex::encode(tag.as_ref())
    }

    /// Builds the message signed on WebSocket login.
    #[must_use]
    pub fn login_message(timestamp: u64, window_ms: Option<u64>) -> String {
        match window_ms {
            Some(window) => format!("{}{}", timestamp, window),
            None => timestamp.to_string(),
        }
    }

    /// Builds signed login parameters for the given timestamp.
    #[must_use]
    pub fn login_params(&self, timestamp: u64, window_ms: Option<u64>) -> LoginParams {
        let message = Self::login_message(timestamp, window_ms);
        LoginParams {
            scheme: SIGNATURE_SCHEME,
            api_key: self.api_key.clone(),
            timestamp: timestamp.to_string(),
            signature: self.sign(message.as_bytes()),
            window: window_ms,
        }
    }

    /// Builds the `Authorization` header value for an HTTP request.
    ///
    /// `timestamp` is milliseconds since epoch. `query` is the canonical
    /// query string without the leading `?`.
    #[must_use]
    pub fn http_authorization(
        &self,
        method: &str,
        timestamp: i64,
        path: &str,
        query: Option<&str>,
        body: Option<&str>,
        window_ms: Option<u64>,
    ) -> String {
        let mut message = format!("{}{}{}", method, timestamp, path);
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            message.push('?');
            message.push_str(query);
        }
        if let Some(body) = body {
            message.push_str(body);
        }
        if let Some(window) = window_ms {
            message.push_str(&window.to_string());
        }

        let signature = self.sign(message.as_bytes());
        let payload = match window_ms {
            Some(window) => format!("{}:{}:{}:{}", self.api_key, timestamp, window, signature),
            None => format!("{}:{}:{}", self.api_key, timestamp, signature),
        };

        format!("{} {}", SIGNATURE_SCHEME, BASE64.encode(payload))
    }
}
