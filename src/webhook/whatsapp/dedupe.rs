//! Redelivery guard for webhook events.
//!
//! The provider retries deliveries it considers failed and may send the same
//! event more than once. The guard remembers the keys of recently routed
//! events so a redelivered event is routed only once per process.
//!
//! # Key Formats by Event Type
//!
//! - message: `message:<message_id>`
//! - status: `status:<message_id>:<status>` (each transition of a message
//!   is a distinct event)
//!
//! Memory is bounded: once `capacity` keys are held the least recently
//! seen key is evicted. A capacity of `0` disables the guard and every
//! delivery is routed.
//!
//! A key is marked when routing starts and forgotten if recording fails, so
//! only redeliveries that arrive after the failure are routed again. A
//! redelivery that races an attempt still in flight is skipped, and if that
//! attempt then fails the event is not recorded.

use lru::LruCache;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

/// Identifies one logical webhook event across deliveries
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupeKey(String);

impl DedupeKey {
    pub fn message(message_id: &str) -> Self {
        DedupeKey(format!("message:{message_id}"))
    }

    pub fn status(message_id: &str, status: &str) -> Self {
        DedupeKey(format!("status:{message_id}:{status}"))
    }
}

impl fmt::Display for DedupeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bounded memory of already routed event keys
pub struct RedeliveryGuard {
    /// `None` when the guard is disabled
    seen: Option<Mutex<LruCache<DedupeKey, ()>>>,
}

impl RedeliveryGuard {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    /// A guard that lets every delivery through
    pub fn disabled() -> Self {
        Self::new(0)
    }

    pub fn is_enabled(&self) -> bool {
        self.seen.is_some()
    }

    /// Marks `key` as seen, returning `false` when it was already seen.
    pub fn first_delivery(&self, key: &DedupeKey) -> bool {
        let Some(seen) = &self.seen else {
            return true;
        };

        let mut seen = seen.lock().unwrap_or_else(PoisonError::into_inner);
        seen.put(key.clone(), ()).is_none()
    }

    /// Forgets `key` so a later redelivery of the event is routed again.
    pub fn forget(&self, key: &DedupeKey) {
        if let Some(seen) = &self.seen {
            seen.lock().unwrap_or_else(PoisonError::into_inner).pop(key);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.seen.as_ref().map_or(0, |seen| {
            seen.lock().unwrap_or_else(PoisonError::into_inner).len()
        })
    }
}
