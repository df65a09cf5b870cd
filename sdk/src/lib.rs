//! HitBTC SDK - Rust client library for the HitBTC exchange.
//!
//! The core of the crate is the WebSocket client in [`ws`], which
//! multiplexes requests and live feeds over one connection:
//!
//! - request/reply correlation by ID, including replies spread over
//!   several frames
//! - automatic HMAC-SHA256 login on connect, gating privileged calls
//! - subscriptions for both the channel protocol (`ch`) and the older
//!   method protocol (`method`/`params`)
//! - order book reconstruction from a snapshot and sequenced diffs, with
//!   gap detection and automatic resubscription
//!
//! The REST API is covered by the smaller signed client in [`client`].
//!
//! # Core Types
//!
//! - [`OrderBook`], [`BookLevel`] - Order book with exact decimal levels
//! - [`Balance`] - Currency balance
//! - [`NewOrder`], [`Side`], [`OrderType`], [`TimeInForce`] - Order placement
//! - [`Period`] - Candle period
//! - [`Credential`] - API key and secret used for signing
//!
//! # Example
//!
//! ```rust
//! use hitbtc_sdk::{NewOrder, Side};
//! use rust_decimal::Decimal;
//!
//! let order = NewOrder::limit("ETHBTC", Side::Buy, Decimal::ONE, Decimal::new(5, 2));
//! assert!(order.validate().is_ok());
//! ```

pub mod auth;
pub mod client;
pub mod error;
pub mod types;
pub mod ws;

pub use auth::Credential;
pub use error::{ExchangeError, SdkError};
pub use types::{
    Balance, BookLevel, BookSide, NewOrder, OrderBook, OrderBookUpdate, OrderType, Period, Side,
    TimeInForce,
};
