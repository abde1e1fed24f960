//! Per-id cancellation manager.
//!
//! Guarantees that, for any single id, at most one in-flight pipeline step is
//! ever allowed to run to completion: installing a new token always cancels
//! whatever token was there before.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
mod tests;

struct CancelPair {
    token: CancellationToken,
    req_seq: i64,
}

/// Mutex-protected `id -> (token, reqSeq)` map. Both operations are O(1).
pub struct CancelManager {
    pairs: Mutex<HashMap<String, CancelPair>>,
}

impl Default for CancelManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelManager {
    pub fn new() -> Self {
        Self {
            pairs: Mutex::new(HashMap::new()),
        }
    }

    /// Cancels and drops any existing pair for `id`, installs a fresh one, and
    /// returns its token.
    pub fn add(&self, id: &str, req_seq: i64) -> CancellationToken {
        let mut pairs = self.pairs.lock();
        if let Some(prior) = pairs.remove(id) {
            prior.token.cancel();
        }
        let token = CancellationToken::new();
        pairs.insert(
            id.to_string(),
            CancelPair {
                token: token.clone(),
                req_seq,
            },
        );
        token
    }

    /// No-op unless the stored pair's `req_seq` matches; otherwise cancels and
    /// removes it. A mismatch means a newer `add` has already superseded this
    /// caller, so its completion must not disturb the newer pair.
    pub fn delete(&self, id: &str, req_seq: i64) {
        let mut pairs = self.pairs.lock();
        if let std::collections::hash_map::Entry::Occupied(entry) = pairs.entry(id.to_string()) {
            if entry.get().req_seq == req_seq {
                let pair = entry.remove();
                pair.token.cancel();
            }
        }
    }

    #[cfg(test)]
    fn contains(&self, id: &str) -> bool {
        self.pairs.lock().contains_key(id)
    }
}

/// Process-wide monotonically increasing request-sequence generator, used by
/// the swarm listener to stamp each cancel/notification with a total order.
#[derive(Default)]
pub struct ReqSeq(AtomicI64);

impl ReqSeq {
    pub fn new() -> Self {
        Self(AtomicI64::new(0))
    }

    pub fn next(&self) -> i64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}
