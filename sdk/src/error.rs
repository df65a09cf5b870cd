//! SDK error types.
//!
//! Provides the errors shared by the HTTP and WebSocket halves of the SDK.

use std::fmt;

use serde::{Deserialize, Serialize};

/// SDK errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SdkError {
    /// An enumerated parameter was outside its allowed set.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),
}

/// Error object returned by the exchange.
///
/// Both transports report failures with the same shape:
/// `{"code": 2001, "message": "Symbol not found", "description": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeError {
    /// Numeric error code.
    pub code: i64,

    /// Short error message.
    pub message: String,

    /// Optional detail, usually naming the offending parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ExchangeError {
    /// Creates a new exchange error without a description.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            description: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns the message joined with the description, if any.
    #[must_use]
    pub fn full_message(&self) -> String {
        match &self.description {
            Some(description) => format!("{}. {}", self.message, description),
            None => self.message.clone(),
        }
    }
}

impl fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exchange error [{}]: {}", self.code, self.full_message())
    }
}

impl std::error::Error for ExchangeError {}
