//! Core types for the HitBTC SDK.
//!
//! Boundary records decoded from the exchange's JSON and the order book
//! data model maintained by the streaming client.

pub mod balance;
pub mod book;
pub mod order;

pub use balance::Balance;
pub use book::{merge_side, BookLevel, BookSide, OrderBook, OrderBookUpdate};
pub use order::{NewOrder, OrderType, Period, Side, TimeInForce};
