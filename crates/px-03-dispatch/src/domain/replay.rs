//! # Request Replay Cache
//!
//! Rejects a `(user, request_id)` pair seen again inside the replay window.
//!
//! - Entries are kept in insertion order; expired ones are dropped from the
//!   front on every insert, so no call scans the whole cache.
//! - The cache is bounded; when full, the oldest entry is evicted.
//! - Anonymous callers and packets without a request id bypass the check.
//!
//! [`RecentSet`] is the same bounded, time-windowed structure over any key.
//! The consensus bridge uses it to remember applied correlation ids.

use parking_lot::Mutex;
use shared_types::{DispatchError, UserId};
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Keys seen within a sliding window, bounded in size.
pub struct RecentSet<K> {
    inner: Mutex<Recent<K>>,
    window: Duration,
    max_entries: usize,
}

struct Recent<K> {
    seen: HashMap<K, Instant>,
    order: VecDeque<(K, Instant)>,
}

impl<K: Eq + Hash + Clone> Recent<K> {
    /// Drop the front entry. A key re-inserted later keeps its newer entry.
    fn pop_oldest(&mut self) {
        if let Some((key, at)) = self.order.pop_front() {
            if self.seen.get(&key) == Some(&at) {
                self.seen.remove(&key);
            }
        }
    }
}

impl<K: Eq + Hash + Clone> RecentSet<K> {
    pub fn new(window: Duration, max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Recent {
                seen: HashMap::new(),
                order: VecDeque::new(),
            }),
            window,
            max_entries: max_entries.max(1),
        }
    }

    /// Record `key`. Returns `false` if it was already recorded within the
    /// window.
    pub fn insert(&self, key: K) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        while let Some((_, at)) = inner.order.front() {
            if now.duration_since(*at) < self.window {
                break;
            }
            inner.pop_oldest();
        }

        if inner.seen.contains_key(&key) {
            return false;
        }

        while inner.seen.len() >= self.max_entries {
            inner.pop_oldest();
        }

        inner.seen.insert(key.clone(), now);
        inner.order.push_back((key, now));
        true
    }

    pub fn contains(&self, key: &K) -> bool {
        let inner = self.inner.lock();
        inner
            .seen
            .get(key)
            .is_some_and(|at| at.elapsed() < self.window)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct ReplayCache {
    seen: RecentSet<(UserId, String)>,
}

impl ReplayCache {
    pub const DEFAULT_MAX_ENTRIES: usize = 100_000;

    pub fn new(window: Duration) -> Self {
        Self::with_limits(window, Self::DEFAULT_MAX_ENTRIES)
    }

    pub fn with_limits(window: Duration, max_entries: usize) -> Self {
        Self {
            seen: RecentSet::new(window, max_entries),
        }
    }

    /// Record the pair, failing if it was already recorded within the window.
    pub fn check_and_insert(&self, user: &UserId, request_id: &str) -> Result<(), DispatchError> {
        if user.is_empty() || request_id.is_empty() {
            return Ok(());
        }

        if !self.seen.insert((user.clone(), request_id.to_string())) {
            return Err(DispatchError::Validation(format!(
                "request '{request_id}' already processed"
            )));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
