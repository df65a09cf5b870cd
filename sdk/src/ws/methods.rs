//! Method-protocol descriptor tables.
//!
//! The older protocol shape delivers feed data as `{method, params}`
//! notifications. These tables map each method name to the subscription
//! it feeds and the kind of delivery it represents, and pair every
//! subscribe method with its unsubscribe counterpart.

use serde_json::Value;

use super::config::Endpoint;
use super::error::WsError;
use super::messages::FeedKind;

/// Key used for notifications whose method is not in the table.
pub const FALLBACK_KEY: &str = "subscription";

/// How a subscription key is derived from the params of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScope {
    /// One subscription per family.
    Family,
    /// One subscription per symbol.
    Symbol,
    /// One subscription per symbol and candle period.
    SymbolPeriod,
}

/// Row of the notification table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodDescriptor {
    /// Notification method name.
    pub method: &'static str,
    /// Subscription family.
    pub family: &'static str,
    /// Key derivation.
    pub scope: KeyScope,
    /// Delivery kind.
    pub kind: FeedKind,
}

/// Row of the subscribe table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeDescriptor {
    /// Subscribe method name.
    pub subscribe: &'static str,
    /// Matching unsubscribe method, if the server has one.
    pub unsubscribe: Option<&'static str>,
    /// Subscription family.
    pub family: &'static str,
    /// Key derivation.
    pub scope: KeyScope,
}

/// Family of the order-book feed, which is routed through reconstruction.
pub const ORDERBOOK_FAMILY: &str = "orderbook";

const fn row(
    method: &'static str,
    family: &'static str,
    scope: KeyScope,
    kind: FeedKind,
) -> MethodDescriptor {
    MethodDescriptor {
        method,
        family,
        scope,
        kind,
    }
}

const fn sub(
    subscribe: &'static str,
    unsubscribe: Option<&'static str>,
    family: &'static str,
    scope: KeyScope,
) -> SubscribeDescriptor {
    SubscribeDescriptor {
        subscribe,
        unsubscribe,
        family,
        scope,
    }
}

static NOTIFICATIONS: &[MethodDescriptor] = &[
    row("snapshotOrderbook", ORDERBOOK_FAMILY, KeyScope::Symbol, FeedKind::Snapshot),
    row("updateOrderbook", ORDERBOOK_FAMILY, KeyScope::Symbol, FeedKind::Update),
    row("snapshotTrades", "trades", KeyScope::Symbol, FeedKind::Snapshot),
    row("updateTrades", "trades", KeyScope::Symbol, FeedKind::Update),
    row("ticker", "ticker", KeyScope::Symbol, FeedKind::Update),
    row("snapshotCandles", "candles", KeyScope::SymbolPeriod, FeedKind::Snapshot),
    row("updateCandles", "candles", KeyScope::SymbolPeriod, FeedKind::Update),
    row("activeOrders", "reports", KeyScope::Family, FeedKind::Snapshot),
    row("report", "reports", KeyScope::Family, FeedKind::Update),
    row("spot_orders", "spot_orders", KeyScope::Family, FeedKind::Snapshot),
    row("spot_order", "spot_orders", KeyScope::Family, FeedKind::Update),
    row("spot_balance", "spot_balance", KeyScope::Family, FeedKind::Snapshot),
    row("transaction_update", "transactions", KeyScope::Family, FeedKind::Update),
    row("wallet_balances", "wallet_balances", KeyScope::Family, FeedKind::Snapshot),
    row("wallet_balance_update", "wallet_balances", KeyScope::Family, FeedKind::Update),
];

static SUBSCRIBES: &[SubscribeDescriptor] = &[
    sub("subscribeOrderbook", Some("unsubscribeOrderbook"), ORDERBOOK_FAMILY, KeyScope::Symbol),
    sub("subscribeTrades", Some("unsubscribeTrades"), "trades", KeyScope::Symbol),
    sub("subscribeTicker", Some("unsubscribeTicker"), "ticker", KeyScope::Symbol),
    sub("subscribeCandles", Some("unsubscribeCandles"), "candles", KeyScope::SymbolPeriod),
    sub("subscribeReports", None, "reports", KeyScope::Family),
    sub("spot_subscribe", Some("spot_unsubscribe"), "spot_orders", KeyScope::Family),
    sub("spot_balance_subscribe", Some("spot_balance_unsubscribe"), "spot_balance", KeyScope::Family),
    sub("subscribe_transactions", Some("unsubscribe_transactions"), "transactions", KeyScope::Family),
    sub("subscribe_wallet_balances", Some("unsubscribe_wallet_balances"), "wallet_balances", KeyScope::Family),
];

// Privileged calls on the legacy combined socket.
static LEGACY_PRIVILEGED: &[&str] = &[
    "subscribeReports",
    "newOrder",
    "cancelOrder",
    "cancelReplaceOrder",
    "getOrders",
    "getTradingBalance",
];

impl MethodDescriptor {
    /// Looks up a notification method.
    #[must_use]
    pub fn lookup(method: &str) -> Option<&'static Self> {
        NOTIFICATIONS.iter().find(|d| d.method == method)
    }

    /// Returns true if this notification belongs to the order-book feed.
    #[must_use]
    pub fn is_order_book(&self) -> bool {
        self.family == ORDERBOOK_FAMILY
    }

    /// Derives the subscription key from the notification params.
    ///
    /// # Errors
    ///
    /// Returns `WsError::Decode` if a required key field is missing.
    pub fn key(&self, params: &Value) -> Result<String, WsError> {
        subscription_key(self.family, self.scope, params).map_err(WsError::Decode)
    }
}

impl SubscribeDescriptor {
    /// Looks up a subscribe method.
    #[must_use]
    pub fn lookup(method: &str) -> Option<&'static Self> {
        SUBSCRIBES.iter().find(|d| d.subscribe == method)
    }

    /// Looks up by unsubscribe method.
    #[must_use]
    pub fn lookup_unsubscribe(method: &str) -> Option<&'static Self> {
        SUBSCRIBES.iter().find(|d| d.unsubscribe == Some(method))
    }

    /// Looks up the subscribe row of a family.
    #[must_use]
    pub fn for_family(family: &str) -> Option<&'static Self> {
        SUBSCRIBES.iter().find(|d| d.family == family)
    }

    /// Derives the subscription key from the request params.
    ///
    /// # Errors
    ///
    /// Returns `WsError::InvalidArgument` if a required key field is missing.
    pub fn key(&self, params: &Value) -> Result<String, WsError> {
        subscription_key(self.family, self.scope, params).map_err(WsError::InvalidArgument)
    }
}

/// Resolves the subscription key and delivery kind of a notification.
///
/// Unknown methods fall back to [`FALLBACK_KEY`] with kind `update`.
///
/// # Errors
///
/// Returns `WsError::Decode` if a known method lacks a key field.
pub fn resolve_notification(method: &str, params: &Value) -> Result<(String, FeedKind), WsError> {
    match MethodDescriptor::lookup(method) {
        Some(descriptor) => Ok((descriptor.key(params)?, descriptor.kind)),
        None => Ok((FALLBACK_KEY.to_string(), FeedKind::Update)),
    }
}

/// Returns true if `method` may only be sent after login on `endpoint`.
#[must_use]
pub fn is_privileged(endpoint: Endpoint, method: &str) -> bool {
    match endpoint {
        Endpoint::MarketData => false,
        Endpoint::Trading | Endpoint::Wallet => method != "login",
        Endpoint::LegacyAccount => LEGACY_PRIVILEGED.contains(&method),
    }
}

/// Builds the key `family`, `family:symbol` or `family:symbol:period`.
pub fn subscription_key(family: &str, scope: KeyScope, params: &Value) -> Result<String, String> {
    let field = |name: &str| {
        params
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| format!("{} subscription needs a {}", family, name))
    };

    match scope {
        KeyScope::Family => Ok(family.to_string()),
        KeyScope::Symbol => Ok(format!("{}:{}", family, field("symbol")?)),
        KeyScope::SymbolPeriod => Ok(format!(
            "{}:{}:{}",
            family,
            field("symbol")?,
            field("period")?
        )),
    }
}
