//! Callback registry.
//!
//! Holds the two tables shared by the reader task and caller tasks:
//! pending replies keyed by correlation ID and live feeds keyed by
//! subscription key. A single lock guards both; it is held only for the
//! duration of each operation, never while a handler runs.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use super::error::WsError;
use super::messages::FeedEvent;

/// Outcome delivered to a reply handler.
pub type ReplyResult = Result<Value, WsError>;

/// Events buffered per feed before new ones are dropped.
pub const FEED_CAPACITY: usize = 1000;

/// Sender half of a feed, bounded by [`FEED_CAPACITY`].
pub type FeedSender = mpsc::Sender<FeedEvent>;

/// Where a reply is delivered.
#[derive(Debug)]
pub enum ReplySink {
    /// A single reply.
    Once(oneshot::Sender<ReplyResult>),
    /// Up to `call_count` replies.
    Many(mpsc::UnboundedSender<ReplyResult>),
}

impl ReplySink {
    /// Delivers one outcome. Returns false if the receiver is gone.
    pub fn deliver(self, result: ReplyResult) -> bool {
        match self {
            Self::Once(tx) => tx.send(result).is_ok(),
            Self::Many(tx) => tx.send(result).is_ok(),
        }
    }
}

#[derive(Debug)]
struct ReplyEntry {
    sink: ReplySink,
    remaining: u32,
    command_key: Option<String>,
}

/// A reply handler taken out of the registry.
#[derive(Debug)]
pub struct TakenReply {
    /// Where to deliver the outcome.
    pub sink: ReplySink,
    /// Feed that also receives the result as a `command` event.
    pub command_key: Option<String>,
}

#[derive(Debug)]
struct Inner {
    next_id: u64,
    replies: HashMap<u64, ReplyEntry>,
    subscriptions: HashMap<String, FeedSender>,
}

/// Correlation and subscription tables.
#[derive(Debug)]
pub struct CallbackRegistry {
    inner: Mutex<Inner>,
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackRegistry {
    /// Creates an empty registry. The first allocated ID is 2.
    #[must_use]
    pub fn new() -> Self {
        Self::with_initial_id(1)
    }

    pub(crate) fn with_initial_id(last_id: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: last_id,
                replies: HashMap::new(),
                subscriptions: HashMap::new(),
            }),
        }
    }

    /// Registers a reply handler invoked at most `call_count` times.
    ///
    /// Returns a fresh ID not held by any pending entry. The counter
    /// increments before use and wraps to 1 after `u64::MAX`.
    pub fn register_reply(
        &self,
        sink: ReplySink,
        call_count: u32,
        command_key: Option<String>,
    ) -> u64 {
        let mut inner = self.inner.lock();
        let id = loop {
            inner.next_id = inner.next_id.checked_add(1).unwrap_or(1);
            if !inner.replies.contains_key(&inner.next_id) {
                break inner.next_id;
            }
        };
        inner.replies.insert(
            id,
            ReplyEntry {
                sink,
                remaining: call_count.max(1),
                command_key,
            },
        );
        id
    }

    /// Takes the handler for one successful reply.
    ///
    /// Decrements the remaining count and removes the entry when it
    /// reaches zero.
    pub fn take_reply(&self, id: u64) -> Option<TakenReply> {
        let mut inner = self.inner.lock();
        let entry = inner.replies.get_mut(&id)?;
        entry.remaining -= 1;

        if entry.remaining > 0 {
            if let ReplySink::Many(tx) = &entry.sink {
                return Some(TakenReply {
                    sink: ReplySink::Many(tx.clone()),
                    command_key: entry.command_key.clone(),
                });
            }
        }

        inner.replies.remove(&id).map(|entry| TakenReply {
            sink: entry.sink,
            command_key: entry.command_key,
        })
    }

    /// Removes a handler outright, e.g. to deliver an error.
    pub fn remove_reply(&self, id: u64) -> Option<TakenReply> {
        self.inner
            .lock()
            .replies
            .remove(&id)
            .map(|entry| TakenReply {
                sink: entry.sink,
                command_key: entry.command_key,
            })
    }

    /// Returns the number of pending replies.
    #[must_use]
    pub fn pending_replies(&self) -> usize {
        self.inner.lock().replies.len()
    }

    /// Stores a feed, replacing any previous one under the same key.
    pub fn set_subscription(&self, key: impl Into<String>, sender: FeedSender) {
        self.inner.lock().subscriptions.insert(key.into(), sender);
    }

    /// Removes a feed. No-op if absent.
    pub fn delete_subscription(&self, key: &str) -> bool {
        self.inner.lock().subscriptions.remove(key).is_some()
    }

    /// Returns the feed registered under `key`.
    #[must_use]
    pub fn get_subscription(&self, key: &str) -> Option<FeedSender> {
        self.inner.lock().subscriptions.get(key).cloned()
    }

    /// Returns the registered subscription keys, sorted.
    #[must_use]
    pub fn subscription_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.lock().subscriptions.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Empties both tables, returning the pending reply sinks.
    ///
    /// Callers deliver `ConnectionClosed` to each sink after the lock is
    /// released. Dropping the feed senders ends every subscription stream.
    pub fn drain(&self) -> Vec<ReplySink> {
        let mut inner = self.inner.lock();
        inner.subscriptions.clear();
        inner.replies.drain().map(|(_, entry)| entry.sink).collect()
    }
}
