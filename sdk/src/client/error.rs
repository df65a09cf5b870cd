//! Client error types.
//!
//! Provides error types for HTTP client operations.

use std::fmt;

use crate::error::{ExchangeError, SdkError};

/// Client errors.
#[derive(Debug)]
pub enum ClientError {
    /// HTTP request failed.
    Request(reqwest::Error),

    /// Failed to deserialize response.
    Deserialization(String),

    /// API returned an error object.
    Api {
        /// HTTP status code.
        status: u16,
        /// Exchange error.
        error: ExchangeError,
    },

    /// Resource not found (404) without an error body.
    NotFound(String),

    /// Unauthorized (401) without an error body.
    Unauthorized,

    /// A private endpoint was called without API credentials.
    MissingCredentials,

    /// A parameter was rejected before the request was built.
    InvalidArgument(String),

    /// Invalid configuration.
    InvalidConfig(String),

    /// Request timeout.
    Timeout,
}

impl ClientError {
    /// Returns the exchange error carried by this error, if any.
    #[must_use]
    pub fn exchange_error(&self) -> Option<&ExchangeError> {
        match self {
            Self::Api { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request(e) => write!(f, "HTTP request failed: {}", e),
            Self::Deserialization(msg) => write!(f, "deserialization failed: {}", msg),
            Self::Api { status, error } => write!(f, "HTTP {}: {}", status, error),
            Self::NotFound(resource) => write!(f, "not found: {}", resource),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::MissingCredentials => write!(f, "api credentials required"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            Self::Timeout => write!(f, "request timeout"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Request(e) => Some(e),
            Self::Api { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(err)
        }
    }
}

impl From<SdkError> for ClientError {
    fn from(err: SdkError) -> Self {
        match err {
            SdkError::InvalidArgument(msg) | SdkError::Serialization(msg) => {
                Self::InvalidArgument(msg)
            }
            SdkError::Deserialization(msg) => Self::Deserialization(msg),
        }
    }
}
