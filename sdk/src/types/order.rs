//! Order types for the HitBTC SDK.
//!
//! Provides the enumerated request parameters (side, order type, time in
//! force, candle period) and the new-order parameters. Every enumeration
//! parses from its wire string and rejects anything outside its set with
//! [`SdkError::InvalidArgument`], so a bad value never reaches the wire.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::SdkError;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy order.
    Buy,
    /// Sell order.
    Sell,
}

impl Side {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(Self::Buy),
            "sell" => Ok(Self::Sell),
            _ => Err(SdkError::InvalidArgument(format!("side: {:?}", s))),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderType {
    /// Limit order.
    Limit,
    /// Market order.
    Market,
    /// Limit order placed once the stop price is reached.
    StopLimit,
    /// Market order placed once the stop price is reached.
    StopMarket,
    /// Limit order placed once the take-profit price is reached.
    TakeProfitLimit,
    /// Market order placed once the take-profit price is reached.
    TakeProfitMarket,
}

impl OrderType {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Limit => "limit",
            Self::Market => "market",
            Self::StopLimit => "stopLimit",
            Self::StopMarket => "stopMarket",
            Self::TakeProfitLimit => "takeProfitLimit",
            Self::TakeProfitMarket => "takeProfitMarket",
        }
    }

    /// Returns true if the order carries a limit price.
    #[must_use]
    pub const fn requires_price(&self) -> bool {
        matches!(self, Self::Limit | Self::StopLimit | Self::TakeProfitLimit)
    }

    /// Returns true if the order is triggered by a stop price.
    #[must_use]
    pub const fn requires_stop_price(&self) -> bool {
        matches!(
            self,
            Self::StopLimit | Self::StopMarket | Self::TakeProfitLimit | Self::TakeProfitMarket
        )
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderType {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "limit" => Ok(Self::Limit),
            "market" => Ok(Self::Market),
            "stopLimit" => Ok(Self::StopLimit),
            "stopMarket" => Ok(Self::StopMarket),
            "takeProfitLimit" => Ok(Self::TakeProfitLimit),
            "takeProfitMarket" => Ok(Self::TakeProfitMarket),
            _ => Err(SdkError::InvalidArgument(format!("order type: {:?}", s))),
        }
    }
}

/// Time in force for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    /// Good till cancelled.
    Gtc,
    /// Immediate or cancel.
    Ioc,
    /// Fill or kill.
    Fok,
    /// Cancelled at the end of the trading day.
    #[serde(rename = "Day")]
    Day,
    /// Good till the given expire time.
    Gtd,
}

impl TimeInForce {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Gtc => "GTC",
            Self::Ioc => "IOC",
            Self::Fok => "FOK",
            Self::Day => "Day",
            Self::Gtd => "GTD",
        }
    }
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeInForce {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GTC" => Ok(Self::Gtc),
            "IOC" => Ok(Self::Ioc),
            "FOK" => Ok(Self::Fok),
            "Day" => Ok(Self::Day),
            "GTD" => Ok(Self::Gtd),
            _ => Err(SdkError::InvalidArgument(format!("time in force: {:?}", s))),
        }
    }
}

/// Candle period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    /// One minute.
    M1,
    /// Three minutes.
    M3,
    /// Five minutes.
    M5,
    /// Fifteen minutes.
    M15,
    /// Thirty minutes.
    M30,
    /// One hour.
    H1,
    /// Four hours.
    H4,
    /// One day.
    D1,
    /// Seven days.
    D7,
    /// One month.
    Month1,
}

impl Period {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::M1 => "M1",
            Self::M3 => "M3",
            Self::M5 => "M5",
            Self::M15 => "M15",
            Self::M30 => "M30",
            Self::H1 => "H1",
            Self::H4 => "H4",
            Self::D1 => "D1",
            Self::D7 => "D7",
            Self::Month1 => "1M",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "M1" => Ok(Self::M1),
            "M3" => Ok(Self::M3),
            "M5" => Ok(Self::M5),
            "M15" => Ok(Self::M15),
            "M30" => Ok(Self::M30),
            "H1" => Ok(Self::H1),
            "H4" => Ok(Self::H4),
            "D1" => Ok(Self::D1),
            "D7" => Ok(Self::D7),
            "1M" => Ok(Self::Month1),
            _ => Err(SdkError::InvalidArgument(format!("period: {:?}", s))),
        }
    }
}

/// Parameters for placing a new spot order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewOrder {
    /// Client-assigned order ID; the exchange generates one when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,

    /// Trading symbol.
    pub symbol: String,

    /// Order side.
    pub side: Side,

    /// Order type.
    #[serde(rename = "type")]
    pub order_type: OrderType,

    /// Time in force.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_in_force: Option<TimeInForce>,

    /// Order quantity.
    pub quantity: Decimal,

    /// Limit price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,

    /// Trigger price for stop and take-profit orders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Decimal>,

    /// Expiry for GTD orders, RFC 3339.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_time: Option<String>,

    /// Reject the order if it would take liquidity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_only: Option<bool>,
}

impl NewOrder {
    /// Creates a limit order.
    #[must_use]
    pub fn limit(symbol: impl Into<String>, side: Side, quantity: Decimal, price: Decimal) -> Self {
        Self {
            client_order_id: None,
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit,
            time_in_force: None,
            quantity,
            price: Some(price),
            stop_price: None,
            expire_time: None,
            post_only: None,
        }
    }

    /// Creates a market order.
    #[must_use]
    pub fn market(symbol: impl Into<String>, side: Side, quantity: Decimal) -> Self {
        Self {
            order_type: OrderType::Market,
            price: None,
            ..Self::limit(symbol, side, quantity, Decimal::ZERO)
        }
    }

    /// Sets the order type.
    #[must_use]
    pub fn with_order_type(mut self, order_type: OrderType) -> Self {
        self.order_type = order_type;
        self
    }

    /// Sets the client order ID.
    #[must_use]
    pub fn with_client_order_id(mut self, client_order_id: impl Into<String>) -> Self {
        self.client_order_id = Some(client_order_id.into());
        self
    }

    /// Sets the time in force.
    #[must_use]
    pub fn with_time_in_force(mut self, time_in_force: TimeInForce) -> Self {
        self.time_in_force = Some(time_in_force);
        self
    }

    /// Sets the stop price.
    #[must_use]
    pub fn with_stop_price(mut self, stop_price: Decimal) -> Self {
        self.stop_price = Some(stop_price);
        self
    }

    /// Sets the expire time for GTD orders.
    #[must_use]
    pub fn with_expire_time(mut self, expire_time: impl Into<String>) -> Self {
        self.expire_time = Some(expire_time.into());
        self
    }

    /// Validates the parameter combination.
    ///
    /// # Errors
    ///
    /// Returns `SdkError::InvalidArgument` naming the first offending field.
    pub fn validate(&self) -> Result<(), SdkError> {
        if self.symbol.is_empty() {
            return Err(SdkError::InvalidArgument("symbol cannot be empty".to_string()));
        }

        if self.quantity <= Decimal::ZERO {
            return Err(SdkError::InvalidArgument(format!(
                "quantity must be positive: {}",
                self.quantity
            )));
        }

        if self.order_type.requires_price() && self.price.is_none() {
            return Err(SdkError::InvalidArgument(format!(
                "price is required for {} orders",
                self.order_type
            )));
        }

        if self.order_type.requires_stop_price() && self.stop_price.is_none() {
            return Err(SdkError::InvalidArgument(format!(
                "stop_price is required for {} orders",
                self.order_type
            )));
        }

        if self.time_in_force == Some(TimeInForce::Gtd) && self.expire_time.is_none() {
            return Err(SdkError::InvalidArgument(
                "expire_time is required for GTD orders".to_string(),
            ));
        }

        Ok(())
    }
}
