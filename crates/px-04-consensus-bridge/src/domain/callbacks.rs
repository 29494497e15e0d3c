//! # Callback Table
//!
//! Maps correlation ids to callers waiting on an on-chain commit.
//!
//! Flow:
//! 1. The bridge calls `register()` and gets a oneshot receiver
//! 2. The transaction is submitted with the correlation id inside
//! 3. The commit path calls `resolve()` (or `record_report()`)
//! 4. The caller awaits the receiver or times out
//!
//! Submission and commit processing race, so every operation takes the one
//! table mutex. Resolution always removes the entry before sending, which
//! makes a second resolution of the same id a no-op.

use parking_lot::Mutex;
use px_telemetry::{CALLBACKS_EXPIRED, CALLBACKS_RESOLVED};
use shared_types::{CorrelationId, DispatchError, ReplicaId};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};

/// What a waiting caller receives.
pub type CallbackOutcome = Result<serde_json::Value, DispatchError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionPolicy {
    FirstResult,
    AllExecutors { executors: BTreeSet<ReplicaId> },
}

struct PendingCallback {
    sender: oneshot::Sender<CallbackOutcome>,
    created_at: Instant,
    key: String,
    ttl: Duration,
    reports: BTreeMap<ReplicaId, ([u8; 32], CallbackOutcome)>,
}

#[derive(Debug, Default)]
pub struct CallbackStats {
    pub total_registered: AtomicU64,
    pub total_resolved: AtomicU64,
    pub total_expired: AtomicU64,
    pub total_cancelled: AtomicU64,
    /// Resolutions for ids that were no longer pending.
    pub total_duplicates: AtomicU64,
    /// Committed requests delivered again and skipped.
    pub total_redelivered: AtomicU64,
}

pub struct CallbackTable {
    pending: Mutex<HashMap<CorrelationId, PendingCallback>>,
    policy: ResolutionPolicy,
    default_ttl: Duration,
    stats: Arc<CallbackStats>,
}

impl CallbackTable {
    pub fn new(policy: ResolutionPolicy, default_ttl: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            policy,
            default_ttl,
            stats: Arc::new(CallbackStats::default()),
        }
    }

    pub fn policy(&self) -> &ResolutionPolicy {
        &self.policy
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Register a callback under a fresh correlation id.
    pub fn register(
        &self,
        key: &str,
        ttl: Option<Duration>,
    ) -> (CorrelationId, oneshot::Receiver<CallbackOutcome>) {
        let correlation_id = CorrelationId::new();
        let (tx, rx) = oneshot::channel();

        let callback = PendingCallback {
            sender: tx,
            created_at: Instant::now(),
            key: key.to_string(),
            ttl: ttl.unwrap_or(self.default_ttl),
            reports: BTreeMap::new(),
        };

        self.pending.lock().insert(correlation_id, callback);
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);

        debug!(correlation_id = %correlation_id, key, "Registered chain callback");
        (correlation_id, rx)
    }

    /// Resolve a callback with its result.
    ///
    /// Returns `false` when the id is unknown or already resolved; that is
    /// the expected outcome on every replica but the submitter.
    pub fn resolve(&self, correlation_id: CorrelationId, outcome: CallbackOutcome) -> bool {
        let removed = self.pending.lock().remove(&correlation_id);
        let Some(callback) = removed else {
            self.stats.total_duplicates.fetch_add(1, Ordering::Relaxed);
            debug!(correlation_id = %correlation_id, "No pending callback, ignoring resolution");
            return false;
        };
        self.deliver(correlation_id, callback, outcome)
    }

    /// Record one executor's report under [`ResolutionPolicy::AllExecutors`].
    ///
    /// The callback resolves once every expected executor has reported:
    /// with the shared result when all digests match, otherwise with a
    /// `State` error. Reports from unknown executors, repeated reports and
    /// reports under `FirstResult` are ignored.
    pub fn record_report(
        &self,
        correlation_id: CorrelationId,
        executor: &ReplicaId,
        digest: [u8; 32],
        outcome: CallbackOutcome,
    ) -> bool {
        let ResolutionPolicy::AllExecutors { executors } = &self.policy else {
            return false;
        };
        if !executors.contains(executor) {
            debug!(correlation_id = %correlation_id, executor = %executor, "Report from non-executor ignored");
            return false;
        }

        let complete = {
            let mut pending = self.pending.lock();
            let Some(callback) = pending.get_mut(&correlation_id) else {
                return false;
            };
            callback
                .reports
                .entry(executor.clone())
                .or_insert((digest, outcome));
            if callback.reports.len() < executors.len() {
                return false;
            }
            pending.remove(&correlation_id)
        };

        let Some(mut callback) = complete else {
            return false;
        };
        let reports = std::mem::take(&mut callback.reports);
        let mut digests = reports.values().map(|(digest, _)| *digest);
        let first = digests.next();
        let agreed = digests.all(|d| Some(d) == first);

        let outcome = if agreed {
            reports
                .into_values()
                .next()
                .map(|(_, outcome)| outcome)
                .unwrap_or_else(|| Err(DispatchError::Internal("no executor reports".into())))
        } else {
            warn!(correlation_id = %correlation_id, key = %callback.key, "Executor results diverged");
            Err(DispatchError::State("executor results diverged".into()))
        };
        self.deliver(correlation_id, callback, outcome)
    }

    fn deliver(
        &self,
        correlation_id: CorrelationId,
        callback: PendingCallback,
        outcome: CallbackOutcome,
    ) -> bool {
        let elapsed = callback.created_at.elapsed();
        match callback.sender.send(outcome) {
            Ok(()) => {
                self.stats.total_resolved.fetch_add(1, Ordering::Relaxed);
                CALLBACKS_RESOLVED.inc();
                debug!(
                    correlation_id = %correlation_id,
                    key = %callback.key,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Resolved chain callback"
                );
                true
            }
            Err(_) => {
                self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(correlation_id = %correlation_id, "Callback waiter already gone");
                false
            }
        }
    }

    /// Drop a callback without resolving it.
    pub fn cancel(&self, correlation_id: &CorrelationId) -> bool {
        if self.pending.lock().remove(correlation_id).is_some() {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Remove callbacks older than their TTL. Their waiters observe a closed
    /// channel.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.pending.lock().retain(|id, callback| {
            let elapsed = now.duration_since(callback.created_at);
            if elapsed > callback.ttl {
                warn!(
                    correlation_id = %id,
                    key = %callback.key,
                    elapsed_ms = elapsed.as_millis() as u64,
                    ttl_ms = callback.ttl.as_millis() as u64,
                    "Removing expired chain callback"
                );
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.stats
                .total_expired
                .fetch_add(removed as u64, Ordering::Relaxed);
            CALLBACKS_EXPIRED.inc_by(removed as f64);
        }
        removed
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_pending(&self, correlation_id: &CorrelationId) -> bool {
        self.pending.lock().contains_key(correlation_id)
    }

    pub fn stats(&self) -> &CallbackStats {
        &self.stats
    }
}

/// Background sweep of expired callbacks. Runs until `shutdown` flips to
/// `true` or its sender is dropped.
pub async fn cleanup_task(
    table: Arc<CallbackTable>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = table.remove_expired();
                if removed > 0 {
                    debug!(removed, "Cleaned up expired chain callbacks");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("Callback sweep stopped");
                    return;
                }
            }
        }
    }
}
