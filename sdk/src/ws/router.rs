//! Inbound message routing.
//!
//! Classifies each decoded frame and hands it to the matching reply or
//! feed handler. Order-book notifications pass through reconstruction
//! first; a sequence gap yields a resubscribe request for the transport
//! to send.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::error::WsError;
use super::messages::{FeedEvent, FeedKind, InboundMessage, Request};
use super::methods::{resolve_notification, MethodDescriptor, SubscribeDescriptor, ORDERBOOK_FAMILY};
use super::orderbook::{BookOutcome, OrderBookReconstructor};
use super::registry::{CallbackRegistry, ReplySink};
use super::transport::FrameHandler;
use crate::error::ExchangeError;

/// Routes inbound frames to registered handlers.
#[derive(Debug)]
pub struct MessageRouter {
    registry: Arc<CallbackRegistry>,
    books: OrderBookReconstructor,
}

impl MessageRouter {
    /// Creates a router over the given registry.
    #[must_use]
    pub fn new(registry: Arc<CallbackRegistry>) -> Self {
        Self {
            registry,
            books: OrderBookReconstructor::new(),
        }
    }

    /// Returns the callback registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.registry
    }

    /// Returns the order book shadow state.
    #[must_use]
    pub fn books(&self) -> &OrderBookReconstructor {
        &self.books
    }

    /// Routes one decoded frame.
    ///
    /// Returns a request to send when the frame revealed a sequence gap.
    ///
    /// # Errors
    ///
    /// Returns `WsError::Decode` if the frame cannot be classified or a
    /// notification payload is malformed, and `WsError::Exchange` if an
    /// error reply reached a request nobody is waiting on.
    pub fn route(&self, frame: Value) -> Result<Option<Request>, WsError> {
        match InboundMessage::classify(frame)? {
            InboundMessage::Reply { id, outcome } => {
                self.route_reply(id, outcome)?;
                Ok(None)
            }
            InboundMessage::Notification { method, params } => {
                self.route_notification(&method, params)
            }
            InboundMessage::Channel { ch, event } => {
                self.deliver(&ch, event);
                Ok(None)
            }
        }
    }

    fn route_reply(
        &self,
        id: Option<u64>,
        outcome: Result<Value, ExchangeError>,
    ) -> Result<(), WsError> {
        let Some(id) = id else {
            match outcome {
                Ok(_) => debug!("Ignoring reply without id"),
                Err(e) => warn!("Exchange error without request id: {}", e),
            }
            return Ok(());
        };

        match outcome {
            Ok(result) => {
                let Some(taken) = self.registry.take_reply(id) else {
                    debug!("No handler for reply {}", id);
                    return Ok(());
                };
                if let Some(key) = taken.command_key.as_deref() {
                    self.deliver(key, FeedEvent::Command(result.clone()));
                }
                taken.sink.deliver(Ok(result));
                Ok(())
            }
            Err(error) => {
                let Some(taken) = self.registry.remove_reply(id) else {
                    warn!("Exchange error for unknown request {}: {}", id, error);
                    return Ok(());
                };
                if let Some(key) = taken.command_key.as_deref() {
                    warn!("Subscription command for {} failed: {}", key, error);
                    self.deliver(key, FeedEvent::Command(error_payload(&error)));
                }
                if taken.sink.deliver(Err(WsError::Exchange(error.clone()))) {
                    Ok(())
                } else {
                    // Internally issued requests (resubscribes) have no caller.
                    Err(WsError::Exchange(error))
                }
            }
        }
    }

    fn route_notification(&self, method: &str, params: Value) -> Result<Option<Request>, WsError> {
        let (key, kind) = resolve_notification(method, &params)?;

        if MethodDescriptor::lookup(method).is_some_and(MethodDescriptor::is_order_book) {
            return self.route_order_book(&key, kind, &params);
        }

        self.deliver(&key, FeedEvent::new(kind, params));
        Ok(None)
    }

    fn route_order_book(
        &self,
        key: &str,
        kind: FeedKind,
        params: &Value,
    ) -> Result<Option<Request>, WsError> {
        if self.registry.get_subscription(key).is_none() {
            debug!("Dropping order book message for {}: not subscribed", key);
            return Ok(None);
        }

        if kind == FeedKind::Snapshot {
            let book = self.books.apply_snapshot(key, params)?;
            self.deliver(key, FeedEvent::Snapshot(book_payload(&book)?));
            return Ok(None);
        }

        match self.books.apply_update(key, params)? {
            BookOutcome::Applied(book) => {
                self.deliver(key, FeedEvent::Update(book_payload(&book)?));
                Ok(None)
            }
            BookOutcome::Discarded => {
                debug!("Discarding order book update for {}: no snapshot", key);
                Ok(None)
            }
            BookOutcome::GapDetected { expected, received } => {
                warn!(
                    "Order book gap on {}: expected sequence {}, got {}; resubscribing",
                    key, expected, received
                );
                Ok(Some(self.resubscribe(key, params)))
            }
        }
    }

    /// Builds the subscribe request that restarts a broken book.
    ///
    /// The acknowledgement reaches the feed as a `command` event.
    fn resubscribe(&self, key: &str, params: &Value) -> Request {
        let method = SubscribeDescriptor::for_family(ORDERBOOK_FAMILY)
            .map_or("subscribeOrderbook", |d| d.subscribe);
        let symbol = params.get("symbol").cloned().unwrap_or(Value::Null);

        let (tx, _rx) = oneshot::channel();
        let id = self
            .registry
            .register_reply(ReplySink::Once(tx), 1, Some(key.to_string()));
        self.books.mark_waiting(key);

        Request::new(method, json!({ "symbol": symbol })).with_id(id)
    }

    fn deliver(&self, key: &str, event: FeedEvent) {
        match self.registry.get_subscription(key) {
            Some(feed) => {
                if let Err(e) = feed.try_send(event) {
                    match e {
                        TrySendError::Full(event) => warn!(
                            "Feed {} is full; dropping {} event",
                            key,
                            event.kind()
                        ),
                        TrySendError::Closed(_) => debug!("Feed {} has no receiver", key),
                    }
                }
            }
            None => debug!("No subscription for {} ({})", key, event.kind()),
        }
    }

    /// Fails every pending reply with `ConnectionClosed` and forgets all
    /// feeds and books.
    pub fn close_all(&self) {
        let pending = self.registry.drain();
        if !pending.is_empty() {
            debug!("Failing {} pending replies", pending.len());
        }
        for sink in pending {
            sink.deliver(Err(WsError::ConnectionClosed));
        }
        self.books.clear();
    }
}

fn error_payload(error: &ExchangeError) -> Value {
    json!({
        "error": {
            "code": error.code,
            "message": error.message,
            "description": error.description,
        }
    })
}

fn book_payload(book: &crate::types::OrderBook) -> Result<Value, WsError> {
    serde_json::to_value(book).map_err(|e| WsError::Serialization(e.to_string()))
}

impl FrameHandler for MessageRouter {
    fn on_frame(&self, frame: Value) -> Result<Option<Request>, WsError> {
        self.route(frame)
    }

    fn on_disconnect(&self) {
        self.close_all();
    }
}
