//! WebSocket client for the exchange's streaming and trading sockets.
//!
//! The client multiplexes many in-flight requests and live feeds over one
//! connection:
//!
//! - [`transport`] owns the socket and the background reader.
//! - [`registry`] correlates replies by ID and feeds by subscription key.
//! - [`router`] dispatches each inbound frame to its handler.
//! - [`orderbook`] rebuilds the legacy order-book feed from sequenced diffs.
//! - [`client`] ties them together with login and subscription management.
//!
//! # Example
//!
//! ```rust,ignore
//! use hitbtc_sdk::ws::{Endpoint, WsClient, WsConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = WsClient::new(WsConfig::new(Endpoint::MarketData))?;
//!     client.connect().await?;
//!
//!     let (mut trades, ack) = client.subscribe_trades(&["BTCUSDT"]).await?;
//!     println!("Subscribed: {}", ack.await?);
//!
//!     while let Some(event) = trades.next().await {
//!         println!("{}: {}", event.kind(), event.payload());
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod messages;
pub mod methods;
pub mod orderbook;
pub mod registry;
pub mod router;
pub mod transport;

pub use client::{ReplyHandle, ReplyStream, Subscription, WsClient};
pub use config::{Endpoint, WsConfig};
pub use error::WsError;
pub use messages::{FeedEvent, FeedKind, InboundMessage, Request, SubscriptionAck};
pub use orderbook::{BookOutcome, BookStatus, OrderBookReconstructor};
pub use registry::{CallbackRegistry, FEED_CAPACITY};
pub use router::MessageRouter;
pub use transport::{ConnectionEvents, FrameHandler, FrameTransport, LogEvents};
