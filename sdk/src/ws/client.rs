//! WebSocket client implementation.
//!
//! Provides the main WebSocket client: request dispatch with correlation
//! IDs, automatic login on connect, and feed subscriptions for both the
//! channel protocol and the older method protocol.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::config::WsConfig;
use super::error::WsError;
use super::messages::{FeedEvent, Request};
use super::methods::{is_privileged, SubscribeDescriptor};
use super::registry::{CallbackRegistry, ReplyResult, ReplySink, FEED_CAPACITY};
use super::router::MessageRouter;
use super::transport::{ConnectionEvents, FrameHandler, FrameTransport, LogEvents};
use crate::types::{Balance, NewOrder, OrderBook, Period};

const LOGIN_METHOD: &str = "login";

/// Pending single reply.
///
/// Resolves to the reply payload, the exchange error, or
/// `WsError::ConnectionClosed` if the connection closed first.
#[derive(Debug)]
pub struct ReplyHandle {
    id: u64,
    rx: oneshot::Receiver<ReplyResult>,
}

impl ReplyHandle {
    /// Returns the correlation ID of the request.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the reply and decodes it.
    ///
    /// # Errors
    ///
    /// Returns the reply error, or `WsError::Decode` if the payload does
    /// not match `T`.
    pub async fn wait_as<T: DeserializeOwned>(self) -> Result<T, WsError> {
        let value = self.await?;
        serde_json::from_value(value).map_err(|e| WsError::Decode(e.to_string()))
    }
}

impl Future for ReplyHandle {
    type Output = ReplyResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(WsError::ConnectionClosed)))
    }
}

/// Pending multi-frame reply.
#[derive(Debug)]
pub struct ReplyStream {
    id: u64,
    rx: mpsc::UnboundedReceiver<ReplyResult>,
}

impl ReplyStream {
    /// Returns the correlation ID of the request.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the next reply, or `None` once all replies were delivered
    /// or the connection closed.
    pub async fn next(&mut self) -> Option<ReplyResult> {
        self.rx.recv().await
    }
}

/// Live subscription feed.
///
/// Events arrive in server order. Up to [`FEED_CAPACITY`] events are
/// buffered; while the buffer is full, new events are dropped and logged.
/// The stream ends when the subscription is replaced, removed, or the
/// connection closes.
#[derive(Debug)]
pub struct Subscription {
    key: String,
    rx: mpsc::Receiver<FeedEvent>,
}

impl Subscription {
    /// Returns the subscription key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the next event.
    pub async fn next(&mut self) -> Option<FeedEvent> {
        self.rx.recv().await
    }
}

/// Login progress of the current connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthState {
    /// No open connection.
    Closed,
    /// Connected; login not accepted yet.
    Pending,
    /// Login accepted.
    Authed,
}

/// Handler installed on the transport for one connection.
///
/// Routes frames and drops the login state when the socket goes away, so
/// privileged calls waiting on login fail instead of hanging.
struct Session {
    router: Arc<MessageRouter>,
    auth: Arc<watch::Sender<AuthState>>,
}

impl FrameHandler for Session {
    fn on_frame(&self, frame: Value) -> Result<Option<Request>, WsError> {
        self.router.route(frame)
    }

    fn on_disconnect(&self) {
        self.auth.send_replace(AuthState::Closed);
        self.router.on_disconnect();
    }
}

/// WebSocket client for one exchange endpoint.
#[derive(Debug)]
pub struct WsClient {
    config: WsConfig,
    router: Arc<MessageRouter>,
    transport: FrameTransport,
    auth: Arc<watch::Sender<AuthState>>,
}

impl WsClient {
    /// Creates a new WebSocket client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: WsConfig) -> Result<Self, WsError> {
        Self::with_events(config, Arc::new(LogEvents))
    }

    /// Creates a new client reporting connection events to `events`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_events(config: WsConfig, events: Arc<dyn ConnectionEvents>) -> Result<Self, WsError> {
        config.validate()?;

        let (auth, _) = watch::channel(AuthState::Closed);

        Ok(Self {
            config,
            router: Arc::new(MessageRouter::new(Arc::new(CallbackRegistry::new()))),
            transport: FrameTransport::new(events),
            auth: Arc::new(auth),
        })
    }

    /// Returns the client configuration.
    #[must_use]
    pub fn config(&self) -> &WsConfig {
        &self.config
    }

    /// Returns true if connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport.is_open()
    }

    /// Returns true once the login reply was accepted on the current
    /// connection.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        *self.auth.borrow() == AuthState::Authed
    }

    /// Returns the registered subscription keys.
    #[must_use]
    pub fn subscription_keys(&self) -> Vec<String> {
        self.router.registry().subscription_keys()
    }

    /// Returns the number of requests awaiting a reply.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.router.registry().pending_replies()
    }

    /// Returns the last consistent order book for `symbol`.
    #[must_use]
    pub fn order_book(&self, symbol: &str) -> Option<OrderBook> {
        self.router.books().book(&order_book_key(symbol))
    }

    /// Connects to the WebSocket server, logging in when a credential is
    /// configured.
    ///
    /// # Errors
    ///
    /// Returns `WsError::ConnectTimeout` if the handshake times out,
    /// `WsError::AuthTimeout` if login is not acknowledged within the
    /// retry budget, or `WsError::AuthRejected` if the exchange refuses
    /// the credential. The connection is closed on login failure.
    /// Calling it on an open connection fails with `WsError::Connection`
    /// and leaves the session untouched.
    pub async fn connect(&self) -> Result<(), WsError> {
        if self.transport.is_open() {
            return Err(WsError::Connection("already connected".to_string()));
        }

        self.auth.send_replace(AuthState::Pending);
        let handler: Arc<dyn FrameHandler> = Arc::new(Session {
            router: Arc::clone(&self.router),
            auth: Arc::clone(&self.auth),
        });
        if let Err(e) = self
            .transport
            .open(&self.config.url, self.config.connect_timeout, handler)
            .await
        {
            self.auth.send_replace(AuthState::Closed);
            return Err(e);
        }
        info!("Connected to {} endpoint at {}", self.config.endpoint, self.config.url);

        if self.config.credential.is_some() {
            if let Err(e) = self.authenticate().await {
                warn!("Login failed: {}", e);
                self.close().await;
                return Err(e);
            }
        }

        Ok(())
    }

    async fn authenticate(&self) -> Result<(), WsError> {
        let credential = self
            .config
            .credential
            .as_ref()
            .ok_or(WsError::MissingCredentials)?;

        let timestamp = u64::try_from(Utc::now().timestamp()).unwrap_or_default();
        let params = credential.login_params(timestamp, self.config.window_ms);
        let params =
            serde_json::to_value(params).map_err(|e| WsError::Serialization(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        let id = self
            .dispatch(Request::new(LOGIN_METHOD, params), ReplySink::Once(tx), 1, None)
            .await?;
        let mut reply = ReplyHandle { id, rx };

        let budget = self.config.auth_retry_budget;
        for attempt in 1..=budget {
            match tokio::time::timeout(self.config.auth_retry_interval, &mut reply).await {
                Ok(Ok(_)) => {
                    // A disconnect may have raced the ack.
                    let accepted = self.auth.send_if_modified(|state| {
                        let pending = *state == AuthState::Pending;
                        if pending {
                            *state = AuthState::Authed;
                        }
                        pending
                    });
                    if !accepted {
                        return Err(WsError::ConnectionClosed);
                    }
                    info!("Authenticated with api key {}", credential.api_key());
                    return Ok(());
                }
                Ok(Err(WsError::Exchange(e))) => return Err(WsError::AuthRejected(e)),
                Ok(Err(e)) => return Err(e),
                Err(_) => debug!("Login not acknowledged yet ({}/{})", attempt, budget),
            }
        }

        self.router.registry().remove_reply(id);
        Err(WsError::AuthTimeout)
    }

    /// Blocks a privileged call until login is accepted.
    ///
    /// Fails with `ConnectionClosed` if the connection goes away first and
    /// with `AuthTimeout` once the login budget is spent.
    async fn await_auth(&self, method: &str) -> Result<(), WsError> {
        if !is_privileged(self.config.endpoint, method) {
            return Ok(());
        }
        if self.config.credential.is_none() {
            return Err(WsError::MissingCredentials);
        }
        if !self.transport.is_open() {
            return Err(WsError::TransportClosed);
        }

        let mut auth = self.auth.subscribe();
        let settled = auth.wait_for(|state| *state != AuthState::Pending);
        let outcome = tokio::time::timeout(self.config.auth_budget(), settled)
            .await
            .map(|changed| changed.map(|state| *state));

        match outcome {
            Ok(Ok(AuthState::Authed)) => Ok(()),
            Ok(Ok(AuthState::Closed | AuthState::Pending)) | Ok(Err(_)) => {
                Err(WsError::ConnectionClosed)
            }
            Err(_) => Err(WsError::AuthTimeout),
        }
    }

    /// Registers the reply sink, then sends. The entry is dropped again if
    /// the send fails.
    async fn dispatch(
        &self,
        request: Request,
        sink: ReplySink,
        call_count: u32,
        command_key: Option<String>,
    ) -> Result<u64, WsError> {
        let registry = self.router.registry();
        let id = registry.register_reply(sink, call_count, command_key);

        if let Err(e) = self.transport.send(&request.with_id(id)).await {
            registry.remove_reply(id);
            return Err(e);
        }

        Ok(id)
    }

    /// Sends a request whose reply arrives as one frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the call is privileged and login has not been
    /// accepted, or if the send fails.
    pub async fn request(&self, method: &str, params: Value) -> Result<ReplyHandle, WsError> {
        self.await_auth(method).await?;

        let (tx, rx) = oneshot::channel();
        let id = self
            .dispatch(Request::new(method, params), ReplySink::Once(tx), 1, None)
            .await?;
        Ok(ReplyHandle { id, rx })
    }

    /// Sends a request whose reply arrives as up to `call_count` frames.
    ///
    /// # Errors
    ///
    /// Returns an error if the call is privileged and login has not been
    /// accepted, or if the send fails.
    pub async fn request_many(
        &self,
        method: &str,
        params: Value,
        call_count: u32,
    ) -> Result<ReplyStream, WsError> {
        self.await_auth(method).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let id = self
            .dispatch(Request::new(method, params), ReplySink::Many(tx), call_count, None)
            .await?;
        Ok(ReplyStream { id, rx })
    }

    /// Sends a request and decodes its reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the server replies with an
    /// error, or the payload does not match `T`.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, WsError> {
        self.request(method, params).await?.wait_as().await
    }

    /// Subscribes to a channel-protocol feed.
    ///
    /// The feed is registered before the request is sent. The handle
    /// resolves to the subscribe acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns an error if the send fails; the feed is removed again.
    pub async fn subscribe(
        &self,
        ch: &str,
        params: Value,
    ) -> Result<(Subscription, ReplyHandle), WsError> {
        self.await_auth("subscribe").await?;

        let registry = self.router.registry();
        let (feed_tx, feed_rx) = mpsc::channel(FEED_CAPACITY);
        registry.set_subscription(ch, feed_tx);

        let (tx, rx) = oneshot::channel();
        let request = Request::channel("subscribe", ch, params);
        match self.dispatch(request, ReplySink::Once(tx), 1, None).await {
            Ok(id) => {
                debug!("Subscribed to channel: {}", ch);
                Ok((
                    Subscription {
                        key: ch.to_string(),
                        rx: feed_rx,
                    },
                    ReplyHandle { id, rx },
                ))
            }
            Err(e) => {
                registry.delete_subscription(ch);
                Err(e)
            }
        }
    }

    /// Unsubscribes from a channel-protocol feed.
    ///
    /// The feed is removed before the request is sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the send fails.
    pub async fn unsubscribe(&self, ch: &str, params: Value) -> Result<ReplyHandle, WsError> {
        self.router.registry().delete_subscription(ch);
        self.await_auth("unsubscribe").await?;

        let (tx, rx) = oneshot::channel();
        let id = self
            .dispatch(Request::channel("unsubscribe", ch, params), ReplySink::Once(tx), 1, None)
            .await?;
        debug!("Unsubscribed from channel: {}", ch);
        Ok(ReplyHandle { id, rx })
    }

    /// Subscribes through a method-protocol subscribe method such as
    /// `subscribeTicker` or `spot_subscribe`.
    ///
    /// The acknowledgement resolves the handle and is also delivered to the
    /// feed as a `command` event.
    ///
    /// # Errors
    ///
    /// Returns `WsError::InvalidArgument` for an unknown method or missing
    /// key params, before anything is sent.
    pub async fn subscribe_feed(
        &self,
        method: &str,
        params: Value,
    ) -> Result<(Subscription, ReplyHandle), WsError> {
        let descriptor = SubscribeDescriptor::lookup(method).ok_or_else(|| {
            WsError::InvalidArgument(format!("unknown subscribe method: {}", method))
        })?;
        let key = descriptor.key(&params)?;
        self.await_auth(method).await?;

        let registry = self.router.registry();
        let (feed_tx, feed_rx) = mpsc::channel(FEED_CAPACITY);
        registry.set_subscription(key.clone(), feed_tx);

        let (tx, rx) = oneshot::channel();
        let request = Request::new(method, params);
        match self
            .dispatch(request, ReplySink::Once(tx), 1, Some(key.clone()))
            .await
        {
            Ok(id) => {
                debug!("Subscribed to {}", key);
                Ok((Subscription { key, rx: feed_rx }, ReplyHandle { id, rx }))
            }
            Err(e) => {
                registry.delete_subscription(&key);
                Err(e)
            }
        }
    }

    /// Unsubscribes through a method-protocol unsubscribe method.
    ///
    /// # Errors
    ///
    /// Returns `WsError::InvalidArgument` for an unknown method or missing
    /// key params, or an error if the send fails.
    pub async fn unsubscribe_feed(&self, method: &str, params: Value) -> Result<ReplyHandle, WsError> {
        let descriptor = SubscribeDescriptor::lookup_unsubscribe(method).ok_or_else(|| {
            WsError::InvalidArgument(format!("unknown unsubscribe method: {}", method))
        })?;
        let key = descriptor.key(&params)?;

        self.router.registry().delete_subscription(&key);
        self.router.books().remove(&key);
        debug!("Unsubscribed from {}", key);

        self.request(method, params).await
    }

    /// Subscribes to the reconstructed order book of `symbol`.
    ///
    /// The feed yields the full book as `snapshot` and after every applied
    /// diff as `update`; decode with `event.decode::<OrderBook>()`.
    ///
    /// # Errors
    ///
    /// Returns an error if the send fails.
    pub async fn subscribe_order_book(
        &self,
        symbol: &str,
    ) -> Result<(Subscription, ReplyHandle), WsError> {
        self.subscribe_feed("subscribeOrderbook", json!({ "symbol": symbol }))
            .await
    }

    /// Unsubscribes from the order book of `symbol`.
    ///
    /// # Errors
    ///
    /// Returns an error if the send fails.
    pub async fn unsubscribe_order_book(&self, symbol: &str) -> Result<ReplyHandle, WsError> {
        self.unsubscribe_feed("unsubscribeOrderbook", json!({ "symbol": symbol }))
            .await
    }

    /// Subscribes to the public trades channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the send fails.
    pub async fn subscribe_trades(
        &self,
        symbols: &[&str],
    ) -> Result<(Subscription, ReplyHandle), WsError> {
        self.subscribe("trades", json!({ "symbols": symbols })).await
    }

    /// Unsubscribes from the public trades channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the send fails.
    pub async fn unsubscribe_trades(&self, symbols: &[&str]) -> Result<ReplyHandle, WsError> {
        self.unsubscribe("trades", json!({ "symbols": symbols })).await
    }

    /// Subscribes to candles of `symbol` with the given period, e.g. `M30`.
    ///
    /// # Errors
    ///
    /// Returns `WsError::InvalidArgument` for an unknown period, before
    /// anything is sent.
    pub async fn subscribe_candles(
        &self,
        symbol: &str,
        period: &str,
    ) -> Result<(Subscription, ReplyHandle), WsError> {
        let period: Period = period.parse()?;
        self.subscribe_feed(
            "subscribeCandles",
            json!({ "symbol": symbol, "period": period.as_str() }),
        )
        .await
    }

    /// Returns the spot trading balances.
    ///
    /// # Errors
    ///
    /// Returns an error if login has not been accepted or the request fails.
    pub async fn get_spot_balances(&self) -> Result<Vec<Balance>, WsError> {
        self.call("spot_balances", Value::Null).await
    }

    /// Places a spot order. The handle resolves to the order report.
    ///
    /// # Errors
    ///
    /// Returns `WsError::InvalidArgument` if the order is invalid, before
    /// anything is sent.
    pub async fn create_spot_order(&self, order: &NewOrder) -> Result<ReplyHandle, WsError> {
        order.validate()?;
        let params =
            serde_json::to_value(order).map_err(|e| WsError::Serialization(e.to_string()))?;
        self.request("spot_new_order", params).await
    }

    /// Closes the connection.
    ///
    /// Every pending reply resolves with `WsError::ConnectionClosed` and
    /// every subscription feed ends.
    pub async fn close(&self) {
        self.transport.close().await;
        self.auth.send_replace(AuthState::Closed);
        self.router.close_all();
    }
}

fn order_book_key(symbol: &str) -> String {
    format!("{}:{}", super::methods::ORDERBOOK_FAMILY, symbol)
}
