//! Order book types for the HitBTC SDK.
//!
//! Provides the order book snapshot, its incremental update, and the side
//! merge used to rebuild a book from a snapshot followed by diffs.

use std::cmp::Ordering;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// Side of the order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    /// Sell orders, best (lowest) price first.
    Ask,
    /// Buy orders, best (highest) price first.
    Bid,
}

impl BookSide {
    /// Compares two prices under this side's ordering.
    ///
    /// `Ordering::Less` means `a` sits closer to the top of the book.
    #[must_use]
    pub fn compare(&self, a: &Decimal, b: &Decimal) -> Ordering {
        match self {
            Self::Ask => a.cmp(b),
            Self::Bid => b.cmp(a),
        }
    }
}

impl fmt::Display for BookSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ask => write!(f, "ask"),
            Self::Bid => write!(f, "bid"),
        }
    }
}

/// A price level in the order book.
///
/// Decodes from either `{"price", "size"}` or a `[price, size]` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawLevel")]
pub struct BookLevel {
    /// Price of the level.
    pub price: Decimal,

    /// Total size resting at this price.
    pub size: Decimal,
}

impl BookLevel {
    /// Creates a new book level.
    #[must_use]
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }

    /// Returns true if this level, used as a delta, removes the price.
    #[must_use]
    pub fn is_removal(&self) -> bool {
        self.size.is_zero()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLevel {
    Object { price: Decimal, size: Decimal },
    Pair(Decimal, Decimal),
}

impl From<RawLevel> for BookLevel {
    fn from(raw: RawLevel) -> Self {
        match raw {
            RawLevel::Object { price, size } | RawLevel::Pair(price, size) => Self { price, size },
        }
    }
}

impl fmt::Display for BookLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.size, self.price)
    }
}

/// Order book for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBook {
    /// Symbol the book belongs to.
    #[serde(default)]
    pub symbol: String,

    /// Sequence number of the last applied message.
    #[serde(default)]
    pub sequence: u64,

    /// Exchange timestamp in milliseconds since epoch.
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: i64,

    /// Ask levels (sorted by price ascending).
    #[serde(rename = "ask", default)]
    pub asks: Vec<BookLevel>,

    /// Bid levels (sorted by price descending).
    #[serde(rename = "bid", default)]
    pub bids: Vec<BookLevel>,
}

impl OrderBook {
    /// Creates a new empty order book.
    #[must_use]
    pub fn new(symbol: impl Into<String>, sequence: u64, timestamp: i64) -> Self {
        Self {
            symbol: symbol.into(),
            sequence,
            timestamp,
            asks: Vec::new(),
            bids: Vec::new(),
        }
    }

    /// Applies an incremental update.
    ///
    /// The caller is responsible for checking the update's sequence; this
    /// only adopts it and merges both sides.
    pub fn apply_update(&mut self, update: &OrderBookUpdate) {
        self.sequence = update.sequence;
        self.timestamp = update.timestamp;
        self.asks = merge_side(BookSide::Ask, &self.asks, &update.asks);
        self.bids = merge_side(BookSide::Bid, &self.bids, &update.bids);
    }

    /// Returns the levels of one side.
    #[must_use]
    pub fn side(&self, side: BookSide) -> &[BookLevel] {
        match side {
            BookSide::Ask => &self.asks,
            BookSide::Bid => &self.bids,
        }
    }

    /// Returns the best bid level.
    #[must_use]
    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.first()
    }

    /// Returns the best ask level.
    #[must_use]
    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.first()
    }

    /// Returns the spread between best ask and best bid.
    #[must_use]
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    /// Returns true if the book is crossed (bid >= ask).
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid.price >= ask.price,
            _ => false,
        }
    }

    /// Returns the level at a specific price on the given side.
    #[must_use]
    pub fn level_at(&self, side: BookSide, price: Decimal) -> Option<&BookLevel> {
        self.side(side).iter().find(|l| l.price == price)
    }

    /// Returns true if both sides are correctly ordered and hold no empty level.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        [BookSide::Ask, BookSide::Bid].iter().all(|side| {
            let levels = self.side(*side);
            levels.iter().all(|l| !l.is_removal())
                && levels
                    .windows(2)
                    .all(|w| matches!(w, [a, b] if side.compare(&a.price, &b.price) == Ordering::Less))
        })
    }

    /// Returns true if the book is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

impl fmt::Display for OrderBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "OrderBook {} (seq: {})", self.symbol, self.sequence)?;
        writeln!(f, "  Asks:")?;
        for level in self.asks.iter().take(5).rev() {
            writeln!(f, "    {}", level)?;
        }
        writeln!(f, "  ---")?;
        writeln!(f, "  Bids:")?;
        for level in self.bids.iter().take(5) {
            writeln!(f, "    {}", level)?;
        }
        Ok(())
    }
}

/// Incremental order book update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookUpdate {
    /// Symbol the update belongs to.
    #[serde(default)]
    pub symbol: String,

    /// Sequence number; must follow the book's sequence by exactly one.
    pub sequence: u64,

    /// Exchange timestamp in milliseconds since epoch.
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: i64,

    /// Changed ask levels. A zero size removes the level.
    #[serde(rename = "ask", default)]
    pub asks: Vec<BookLevel>,

    /// Changed bid levels. A zero size removes the level.
    #[serde(rename = "bid", default)]
    pub bids: Vec<BookLevel>,
}

/// Merges a delta into one side of a book.
///
/// Both inputs are walked in lockstep under the side's ordering. Equal
/// prices are replaced by the delta (or dropped when its size is zero);
/// zero-size deltas for prices not in the book are ignored.
#[must_use]
pub fn merge_side(side: BookSide, current: &[BookLevel], delta: &[BookLevel]) -> Vec<BookLevel> {
    let mut delta: Vec<&BookLevel> = delta.iter().collect();
    delta.sort_by(|a, b| side.compare(&a.price, &b.price));

    let mut merged = Vec::with_capacity(current.len() + delta.len());
    let mut old = current.iter().peekable();
    let mut new = delta.into_iter().peekable();

    loop {
        let step = match (old.peek(), new.peek()) {
            (Some(o), Some(n)) => side.compare(&o.price, &n.price),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => break,
        };

        match step {
            Ordering::Less => {
                if let Some(level) = old.next() {
                    merged.push(level.clone());
                }
            }
            Ordering::Greater => {
                if let Some(level) = new.next().filter(|l| !l.is_removal()) {
                    merged.push(level.clone());
                }
            }
            Ordering::Equal => {
                old.next();
                if let Some(level) = new.next().filter(|l| !l.is_removal()) {
                    merged.push(level.clone());
                }
            }
        }
    }

    merged
}

/// Accepts either milliseconds since epoch or an RFC 3339 string.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Millis(i64),
        Text(String),
    }

    match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Millis(ms) => Ok(ms),
        RawTimestamp::Text(text) => chrono::DateTime::parse_from_rfc3339(&text)
            .map(|t| t.timestamp_millis())
            .map_err(serde::de::Error::custom),
    }
}
