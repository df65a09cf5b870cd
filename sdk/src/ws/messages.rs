//! WebSocket message types.
//!
//! Defines the outbound request frame, the classification of inbound
//! frames, and the typed feed events handed to subscribers.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::WsError;
use crate::error::ExchangeError;

/// Outbound request frame.
///
/// Serializes to `{method, params, id?}` or, for channel subscriptions,
/// `{method, ch, params, id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    /// Method name.
    pub method: String,

    /// Channel name for channel subscriptions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ch: Option<String>,

    /// Method parameters.
    pub params: Value,

    /// Correlation ID, assigned by the dispatcher.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

impl Request {
    /// Creates a method request. `Value::Null` params are sent as `{}`.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            ch: None,
            params: normalize_params(params),
            id: None,
        }
    }

    /// Creates a channel request such as `subscribe` on `trades`.
    #[must_use]
    pub fn channel(method: impl Into<String>, ch: impl Into<String>, params: Value) -> Self {
        Self {
            ch: Some(ch.into()),
            ..Self::new(method, params)
        }
    }

    /// Sets the correlation ID.
    #[must_use]
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }
}

fn normalize_params(params: Value) -> Value {
    match params {
        Value::Null => Value::Object(Map::new()),
        other => other,
    }
}

/// Kind of a feed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    /// The one-time initial state of a stream.
    Snapshot,
    /// An incremental event.
    Update,
    /// A single-shot payload.
    Data,
    /// A subscribe acknowledgement (method protocol).
    Command,
}

impl FeedKind {
    /// Returns the wire name, which is also the channel payload field.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Update => "update",
            Self::Data => "data",
            Self::Command => "command",
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A delivery on a subscription feed.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Initial state of the stream.
    Snapshot(Value),
    /// Incremental event.
    Update(Value),
    /// Single-shot payload.
    Data(Value),
    /// Subscribe acknowledgement.
    Command(Value),
}

impl FeedEvent {
    /// Creates an event of the given kind.
    #[must_use]
    pub fn new(kind: FeedKind, payload: Value) -> Self {
        match kind {
            FeedKind::Snapshot => Self::Snapshot(payload),
            FeedKind::Update => Self::Update(payload),
            FeedKind::Data => Self::Data(payload),
            FeedKind::Command => Self::Command(payload),
        }
    }

    /// Returns the kind of this event.
    #[must_use]
    pub const fn kind(&self) -> FeedKind {
        match self {
            Self::Snapshot(_) => FeedKind::Snapshot,
            Self::Update(_) => FeedKind::Update,
            Self::Data(_) => FeedKind::Data,
            Self::Command(_) => FeedKind::Command,
        }
    }

    /// Returns the payload.
    #[must_use]
    pub fn payload(&self) -> &Value {
        match self {
            Self::Snapshot(v) | Self::Update(v) | Self::Data(v) | Self::Command(v) => v,
        }
    }

    /// Consumes the event, returning the payload.
    #[must_use]
    pub fn into_payload(self) -> Value {
        match self {
            Self::Snapshot(v) | Self::Update(v) | Self::Data(v) | Self::Command(v) => v,
        }
    }

    /// Decodes the payload into a typed record.
    ///
    /// # Errors
    ///
    /// Returns `WsError::Decode` if the payload does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, WsError> {
        T::deserialize(self.payload()).map_err(|e| WsError::Decode(e.to_string()))
    }
}

/// Result of a channel subscribe or unsubscribe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SubscriptionAck {
    /// Channel the acknowledgement refers to.
    #[serde(default)]
    pub ch: Option<String>,

    /// Symbols accepted by the server.
    #[serde(default)]
    pub subscriptions: Vec<String>,
}

/// Classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Reply to a request. `id` is `None` when the server sent `null`.
    Reply {
        /// Correlation ID.
        id: Option<u64>,
        /// Result payload or exchange error.
        outcome: Result<Value, ExchangeError>,
    },

    /// Method-protocol notification.
    Notification {
        /// Notification method.
        method: String,
        /// Notification parameters.
        params: Value,
    },

    /// Channel-protocol event.
    Channel {
        /// Channel name.
        ch: String,
        /// Typed event.
        event: FeedEvent,
    },
}

impl InboundMessage {
    /// Classifies a decoded frame by its discriminator field.
    ///
    /// `id` wins over `method`, which wins over `ch`. A reply always
    /// classifies as a reply, even when its error object is malformed.
    ///
    /// # Errors
    ///
    /// Returns `WsError::Decode` if the frame is not an object or has none
    /// of the discriminators.
    pub fn classify(frame: Value) -> Result<Self, WsError> {
        let Value::Object(mut map) = frame else {
            return Err(WsError::Decode("frame is not a JSON object".to_string()));
        };

        if let Some(id) = map.remove("id") {
            let id = id.as_u64();

            if let Some(error) = map.remove("error") {
                return Ok(Self::Reply {
                    id,
                    outcome: Err(decode_error(error)),
                });
            }

            let result = map.remove("result").map(unwrap_data).unwrap_or(Value::Null);
            return Ok(Self::Reply {
                id,
                outcome: Ok(result),
            });
        }

        if let Some(Value::String(method)) = map.remove("method") {
            return Ok(Self::Notification {
                method,
                params: map.remove("params").unwrap_or(Value::Null),
            });
        }

        if let Some(Value::String(ch)) = map.remove("ch") {
            for kind in [FeedKind::Snapshot, FeedKind::Update, FeedKind::Data] {
                if let Some(payload) = map.remove(kind.as_str()) {
                    return Ok(Self::Channel {
                        ch,
                        event: FeedEvent::new(kind, payload),
                    });
                }
            }
            return Err(WsError::Decode(format!(
                "channel {} frame carries no payload",
                ch
            )));
        }

        Err(WsError::Decode(
            "frame has no id, method or ch field".to_string(),
        ))
    }
}

/// Decodes a server `error` object. Shapes other than
/// `{code, message, description?}` keep whatever fields are usable, with
/// code 0 when none is given.
fn decode_error(raw: Value) -> ExchangeError {
    if let Ok(error) = serde_json::from_value::<ExchangeError>(raw.clone()) {
        return error;
    }

    let code = raw
        .get("code")
        .and_then(|c| c.as_i64().or_else(|| c.as_str()?.parse().ok()))
        .unwrap_or_default();
    let message = raw
        .as_str()
        .or_else(|| raw.get("message").and_then(Value::as_str))
        .map_or_else(|| raw.to_string(), str::to_string);

    let error = ExchangeError::new(code, message);
    match raw.get("description").and_then(Value::as_str) {
        Some(description) => error.with_description(description),
        None => error,
    }
}

fn unwrap_data(result: Value) -> Value {
    match result {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}
