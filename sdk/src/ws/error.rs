//! WebSocket error types.
//!
//! Provides error types for WebSocket client operations.

use std::fmt;

use crate::error::{ExchangeError, SdkError};

/// WebSocket errors.
///
/// Cloneable so one failure can be fanned out to every pending handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsError {
    /// Connection failed.
    Connection(String),

    /// The handshake did not complete within the connect timeout.
    ConnectTimeout,

    /// Login was not acknowledged within the retry budget.
    AuthTimeout,

    /// The exchange rejected the login request.
    AuthRejected(ExchangeError),

    /// A privileged call was made without API credentials.
    MissingCredentials,

    /// Send attempted after the connection was closed.
    TransportClosed,

    /// The connection closed while the request was pending.
    ConnectionClosed,

    /// Server replied with an error object.
    Exchange(ExchangeError),

    /// An enumerated parameter was outside its allowed set.
    InvalidArgument(String),

    /// Inbound frame was not valid JSON or had no discriminator.
    Decode(String),

    /// WebSocket protocol error.
    Protocol(String),

    /// Failed to serialize message.
    Serialization(String),

    /// Send failed.
    SendFailed(String),

    /// Invalid configuration.
    InvalidConfig(String),
}

impl WsError {
    /// Returns the exchange error carried by this error, if any.
    #[must_use]
    pub fn exchange_error(&self) -> Option<&ExchangeError> {
        match self {
            Self::Exchange(e) | Self::AuthRejected(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(msg) => write!(f, "connection failed: {}", msg),
            Self::ConnectTimeout => write!(f, "connect timed out"),
            Self::AuthTimeout => write!(f, "login was not acknowledged in time"),
            Self::AuthRejected(e) => write!(f, "login rejected: {}", e),
            Self::MissingCredentials => write!(f, "api credentials required"),
            Self::TransportClosed => write!(f, "transport closed"),
            Self::ConnectionClosed => write!(f, "connection closed"),
            Self::Exchange(e) => write!(f, "{}", e),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Self::Decode(msg) => write!(f, "decode failed: {}", msg),
            Self::Protocol(msg) => write!(f, "protocol error: {}", msg),
            Self::Serialization(msg) => write!(f, "serialization failed: {}", msg),
            Self::SendFailed(msg) => write!(f, "send failed: {}", msg),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for WsError {}

impl From<tokio_tungstenite::tungstenite::Error> for WsError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<SdkError> for WsError {
    fn from(err: SdkError) -> Self {
        match err {
            SdkError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            SdkError::Serialization(msg) => Self::Serialization(msg),
            SdkError::Deserialization(msg) => Self::Decode(msg),
        }
    }
}
