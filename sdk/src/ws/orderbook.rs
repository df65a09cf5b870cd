//! Order book reconstruction.
//!
//! The legacy order-book feed delivers one snapshot per symbol followed
//! by sequence-numbered diffs. Each symbol key moves through
//! `Waiting -> Updating -> Broken -> Waiting`; a diff is applied only while
//! `Updating` and only if its sequence follows the book's by exactly one.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;

use super::error::WsError;
use crate::types::{OrderBook, OrderBookUpdate};

/// Reconstruction state of one book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookStatus {
    /// Waiting for a snapshot.
    Waiting,
    /// Snapshot received; diffs are being applied.
    Updating,
    /// A sequence gap was seen; the book is invalid.
    Broken,
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Updating => write!(f, "updating"),
            Self::Broken => write!(f, "broken"),
        }
    }
}

/// Result of feeding one diff to the reconstructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookOutcome {
    /// The diff was merged; carries the full current book.
    Applied(OrderBook),
    /// The book is not updating; the diff was dropped.
    Discarded,
    /// The diff's sequence did not follow the book's. The book is broken.
    GapDetected {
        /// Sequence the book expected.
        expected: u64,
        /// Sequence the diff carried.
        received: u64,
    },
}

#[derive(Debug)]
struct BookState {
    status: BookStatus,
    book: Option<OrderBook>,
}

/// Per-key order book shadow state.
#[derive(Debug, Default)]
pub struct OrderBookReconstructor {
    books: Mutex<HashMap<String, BookState>>,
}

impl OrderBookReconstructor {
    /// Creates an empty reconstructor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a snapshot verbatim and starts applying diffs.
    ///
    /// Returns a copy of the stored book for delivery.
    ///
    /// # Errors
    ///
    /// Returns `WsError::Decode` if `params` is not an order book.
    pub fn apply_snapshot(&self, key: &str, params: &Value) -> Result<OrderBook, WsError> {
        let book = OrderBook::deserialize(params)
            .map_err(|e| WsError::Decode(format!("order book snapshot: {}", e)))?;

        self.books.lock().insert(
            key.to_string(),
            BookState {
                status: BookStatus::Updating,
                book: Some(book.clone()),
            },
        );
        Ok(book)
    }

    /// Applies a diff.
    ///
    /// # Errors
    ///
    /// Returns `WsError::Decode` if `params` is not an order book update.
    pub fn apply_update(&self, key: &str, params: &Value) -> Result<BookOutcome, WsError> {
        let update = OrderBookUpdate::deserialize(params)
            .map_err(|e| WsError::Decode(format!("order book update: {}", e)))?;

        let mut books = self.books.lock();
        let Some(state) = books.get_mut(key) else {
            return Ok(BookOutcome::Discarded);
        };
        if state.status != BookStatus::Updating {
            return Ok(BookOutcome::Discarded);
        }
        let Some(book) = state.book.as_mut() else {
            return Ok(BookOutcome::Discarded);
        };

        let expected = book.sequence.wrapping_add(1);
        if update.sequence != expected {
            state.status = BookStatus::Broken;
            return Ok(BookOutcome::GapDetected {
                expected,
                received: update.sequence,
            });
        }

        book.apply_update(&update);
        Ok(BookOutcome::Applied(book.clone()))
    }

    /// Marks a book as waiting for a fresh snapshot.
    pub fn mark_waiting(&self, key: &str) {
        self.books
            .lock()
            .entry(key.to_string())
            .and_modify(|state| state.status = BookStatus::Waiting)
            .or_insert(BookState {
                status: BookStatus::Waiting,
                book: None,
            });
    }

    /// Returns the status of a book.
    #[must_use]
    pub fn status(&self, key: &str) -> Option<BookStatus> {
        self.books.lock().get(key).map(|state| state.status)
    }

    /// Returns a copy of the last consistent book, if any.
    #[must_use]
    pub fn book(&self, key: &str) -> Option<OrderBook> {
        self.books
            .lock()
            .get(key)
            .filter(|state| state.status == BookStatus::Updating)
            .and_then(|state| state.book.clone())
    }

    /// Forgets a book.
    pub fn remove(&self, key: &str) {
        self.books.lock().remove(key);
    }

    /// Forgets every book.
    pub fn clear(&self) {
        self.books.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;
    use crate::types::BookLevel;

    const KEY: &str = "orderbook:ETHBTC";

    fn snapshot(sequence: u64) -> Value {
        json!({
            "symbol": "ETHBTC",
            "sequence": sequence,
            "timestamp": "2018-11-19T05:00:28.193Z",
            "ask": [{"price": "0.054588", "size": "0.245"}, {"price": "0.054590", "size": "1.000"}],
            "bid": [{"price": "0.054558", "size": "0.500"}, {"price": "0.054555", "size": "0.200"}]
        })
    }

    fn update(sequence: u64, ask: Value, bid: Value) -> Value {
        json!({
            "symbol": "ETHBTC",
            "sequence": sequence,
            "timestamp": "2018-11-19T05:00:28.700Z",
            "ask": ask,
            "bid": bid
        })
    }

    #[test]
    fn test_snapshot_starts_updating() {
        let books = OrderBookReconstructor::new();
        assert!(books.status(KEY).is_none());

        let book = books.apply_snapshot(KEY, &snapshot(100)).expect("snapshot");
        assert_eq!(book.sequence, 100);
        assert_eq!(books.status(KEY), Some(BookStatus::Updating));
        assert_eq!(books.book(KEY), Some(book));
    }

    #[test]
    fn test_sequential_update_is_merged() {
        let books = OrderBookReconstructor::new();
        books.apply_snapshot(KEY, &snapshot(100)).expect("snapshot");

        let outcome = books
            .apply_update(
                KEY,
                &update(
                    101,
                    json!([{"price": "0.054588", "size": "0"}, {"price": "0.054589", "size": "0.100"}]),
                    json!([]),
                ),
            )
            .expect("update");

        let BookOutcome::Applied(book) = outcome else {
            panic!("expected applied update, got {:?}", outcome);
        };
        assert_eq!(book.sequence, 101);
        assert_eq!(
            book.asks,
            vec![
                BookLevel::new(dec!(0.054589), dec!(0.100)),
                BookLevel::new(dec!(0.054590), dec!(1.000)),
            ]
        );
        assert_eq!(book.bids.len(), 2);
        assert!(book.is_consistent());
    }

    #[test]
    fn test_gap_breaks_book() {
        let books = OrderBookReconstructor::new();
        books.apply_snapshot(KEY, &snapshot(100)).expect("snapshot");
        books
            .apply_update(KEY, &update(101, json!([]), json!([])))
            .expect("101");

        let outcome = books
            .apply_update(KEY, &update(103, json!([]), json!([])))
            .expect("103");
        assert_eq!(
            outcome,
            BookOutcome::GapDetected {
                expected: 102,
                received: 103
            }
        );
        assert_eq!(books.status(KEY), Some(BookStatus::Broken));
        assert!(books.book(KEY).is_none());

        // Nothing is applied until a fresh snapshot arrives.
        books.mark_waiting(KEY);
        let outcome = books
            .apply_update(KEY, &update(102, json!([]), json!([])))
            .expect("102");
        assert_eq!(outcome, BookOutcome::Discarded);
        assert_eq!(books.status(KEY), Some(BookStatus::Waiting));

        books.apply_snapshot(KEY, &snapshot(200)).expect("resnapshot");
        assert_eq!(books.status(KEY), Some(BookStatus::Updating));
    }

    #[test]
    fn test_update_without_snapshot_is_discarded() {
        let books = OrderBookReconstructor::new();
        let outcome = books
            .apply_update(KEY, &update(1, json!([]), json!([])))
            .expect("update");
        assert_eq!(outcome, BookOutcome::Discarded);
    }

    #[test]
    fn test_empty_update_only_moves_sequence() {
        let books = OrderBookReconstructor::new();
        let before = books.apply_snapshot(KEY, &snapshot(7)).expect("snapshot");

        let BookOutcome::Applied(after) = books
            .apply_update(KEY, &update(8, json!([]), json!([])))
            .expect("update")
        else {
            panic!("expected applied update");
        };
        assert_eq!(after.sequence, 8);
        assert_ne!(after.timestamp, before.timestamp);
        assert_eq!(after.asks, before.asks);
        assert_eq!(after.bids, before.bids);
    }

    #[test]
    fn test_malformed_payload() {
        let books = OrderBookReconstructor::new();
        let err = books
            .apply_snapshot(KEY, &json!({"ask": "nope"}))
            .expect_err("malformed");
        assert!(matches!(err, WsError::Decode(_)));
    }

    #[test]
    fn test_remove_and_clear() {
        let books = OrderBookReconstructor::new();
        books.apply_snapshot(KEY, &snapshot(1)).expect("snapshot");
        books.apply_snapshot("orderbook:BTCUSDT", &snapshot(1)).expect("snapshot");

        books.remove(KEY);
        assert!(books.status(KEY).is_none());
        books.clear();
        assert!(books.status("orderbook:BTCUSDT").is_none());
    }
}
