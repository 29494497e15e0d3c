//! # Consensus Bridge
//!
//! Submits on-chain requests and demultiplexes committed blocks back into
//! the action registry.
//!
//! Commit processing is strictly sequential: `on_commit` holds the commit
//! lock for the whole block and applies transactions in block order. An
//! apply failure is never retried; it becomes the result of that one
//! callback and the rest of the block proceeds.
//!
//! The guard is not re-run on commit. Every replica applies the request as
//! the submitting replica authorized it.
//!
//! A correlation id is applied at most once per replica. Applied ids are kept
//! in a bounded window; a redelivered request is skipped before it reaches
//! the store or the signaler.

use async_trait::async_trait;
use px_01_state_store::{StateStore, TrxMode};
use px_02_signaler::SignalPort;
use px_03_dispatch::{
    emit_effect, ActionContext, ActionRegistry, ChainRequest, ChainSubmitter, ExecutionMode,
    RecentSet,
};
use shared_types::{CallerIdentity, CorrelationId, DispatchError, ReplicaId};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::domain::{
    outcome_digest, BridgeError, CallbackOutcome, CallbackTable, ChainEnvelope, ChainTransaction,
    ExecutorReport, ResolutionPolicy,
};
use crate::ports::{CommitHandler, ConsensusPort};

pub struct ConsensusBridge {
    replica_id: ReplicaId,
    registry: Arc<ActionRegistry>,
    store: Arc<dyn StateStore>,
    consensus: Arc<dyn ConsensusPort>,
    callbacks: Arc<CallbackTable>,
    signals: Option<Arc<dyn SignalPort>>,
    applied: RecentSet<CorrelationId>,
    commit_lock: tokio::sync::Mutex<()>,
}

const DEFAULT_APPLIED_WINDOW: Duration = Duration::from_secs(600);
const DEFAULT_APPLIED_MAX_ENTRIES: usize = 100_000;

impl ConsensusBridge {
    pub fn new(
        replica_id: ReplicaId,
        registry: Arc<ActionRegistry>,
        store: Arc<dyn StateStore>,
        consensus: Arc<dyn ConsensusPort>,
        callbacks: Arc<CallbackTable>,
    ) -> Self {
        Self {
            replica_id,
            registry,
            store,
            consensus,
            callbacks,
            signals: None,
            applied: RecentSet::new(DEFAULT_APPLIED_WINDOW, DEFAULT_APPLIED_MAX_ENTRIES),
            commit_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Emit action signal effects for committed requests.
    pub fn with_signals(mut self, signals: Arc<dyn SignalPort>) -> Self {
        self.signals = Some(signals);
        self
    }

    /// Bound the record of applied correlation ids.
    pub fn with_applied_window(mut self, window: Duration, max_entries: usize) -> Self {
        self.applied = RecentSet::new(window, max_entries);
        self
    }

    /// Register this bridge as the consensus layer's commit handler.
    pub fn attach(self: &Arc<Self>) {
        self.consensus
            .register_commit_handler(self.clone() as Arc<dyn CommitHandler>);
        info!(replica_id = %self.replica_id, "Consensus bridge attached");
    }

    pub fn replica_id(&self) -> &ReplicaId {
        &self.replica_id
    }

    pub fn callbacks(&self) -> &Arc<CallbackTable> {
        &self.callbacks
    }

    /// Register a callback, encode the request and hand it to consensus.
    ///
    /// Returns as soon as the consensus layer accepted the bytes. The
    /// callback is dropped again if encoding or submission fails.
    pub async fn submit_transaction(
        &self,
        request: ChainRequest,
    ) -> Result<PendingCommit, BridgeError> {
        let (correlation_id, receiver) = self.callbacks.register(&request.key, None);
        let pending = PendingCommit {
            correlation_id,
            receiver: Some(receiver),
            callbacks: self.callbacks.clone(),
            ttl: self.callbacks.default_ttl(),
        };

        let key = request.key.clone();
        let bytes = ChainTransaction::Request(ChainEnvelope {
            correlation_id,
            submitter: self.replica_id.clone(),
            request,
        })
        .encode()?;
        self.consensus.submit(bytes).await?;

        debug!(correlation_id = %correlation_id, key = %key, "Submitted chain transaction");
        Ok(pending)
    }

    /// Apply one committed request on this replica.
    async fn apply(&self, envelope: &ChainEnvelope) -> CallbackOutcome {
        let request = &envelope.request;
        let action = self.registry.resolve(&request.key)?;
        let parsed = action.parse(&request.payload)?;
        let targets = parsed.targets.or_subject(&request.subject);

        let caller = if request.caller.is_empty() {
            CallerIdentity::anonymous()
        } else {
            CallerIdentity::verified(request.caller.clone(), request.caller_type, request.is_privileged)
        };
        let caller = caller.targeting(targets.group_id, targets.subgroup_id);
        let ctx = ActionContext::new(caller, request.request_id.clone(), ExecutionMode::OnChain)
            .on_replica(self.replica_id.clone());

        let mut trx = self.store.begin(TrxMode::ReadWrite)?;
        let executed = match action.execute(&ctx, trx.as_mut(), parsed.input).await {
            Ok(executed) => {
                trx.commit()?;
                executed
            }
            Err(e) => {
                trx.discard();
                return Err(e);
            }
        };

        if let (Some(signals), Some(effect)) = (&self.signals, &executed.effect) {
            emit_effect(
                signals.as_ref(),
                effect,
                &request.caller,
                request.echo,
                &request.exceptions,
            );
        }
        Ok(executed.output)
    }

    async fn handle_request(&self, envelope: ChainEnvelope) {
        let correlation_id = envelope.correlation_id;
        if !self.applied.insert(correlation_id) {
            self.callbacks
                .stats()
                .total_redelivered
                .fetch_add(1, Ordering::Relaxed);
            debug!(
                correlation_id = %correlation_id,
                key = %envelope.request.key,
                "Skipping redelivered transaction"
            );
            return;
        }

        let outcome = self.apply(&envelope).await;
        if let Err(e) = &outcome {
            warn!(
                correlation_id = %correlation_id,
                key = %envelope.request.key,
                error = %e,
                "Committed transaction failed to apply"
            );
        }

        match self.callbacks.policy() {
            ResolutionPolicy::FirstResult => {
                if envelope.submitter == self.replica_id {
                    self.callbacks.resolve(correlation_id, outcome);
                }
            }
            ResolutionPolicy::AllExecutors { executors } => {
                if !executors.contains(&self.replica_id) {
                    return;
                }
                let outcome = match outcome {
                    Ok(output) => serde_json::to_vec(&output)
                        .map_err(|e| DispatchError::Internal(e.to_string())),
                    Err(e) => Err(e),
                };
                let report = ExecutorReport::new(correlation_id, self.replica_id.clone(), outcome);
                let submitted = match ChainTransaction::ExecutorReport(report).encode() {
                    Ok(bytes) => self.consensus.submit(bytes).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = submitted {
                    warn!(correlation_id = %correlation_id, error = %e, "Failed to submit executor report");
                }
            }
        }
    }

    fn handle_report(&self, report: ExecutorReport) {
        let outcome = report.outcome.and_then(|bytes| {
            serde_json::from_slice(&bytes).map_err(|e| DispatchError::Internal(e.to_string()))
        });
        self.callbacks
            .record_report(report.correlation_id, &report.executor, report.digest, outcome);
    }
}

#[async_trait]
impl CommitHandler for ConsensusBridge {
    async fn on_commit(&self, batch: Vec<Vec<u8>>) {
        let _commit = self.commit_lock.lock().await;
        debug!(size = batch.len(), replica_id = %self.replica_id, "Processing committed block");

        for (index, bytes) in batch.into_iter().enumerate() {
            match ChainTransaction::decode(&bytes) {
                Ok(ChainTransaction::Request(envelope)) => self.handle_request(envelope).await,
                Ok(ChainTransaction::ExecutorReport(report)) => self.handle_report(report),
                Err(e) => warn!(index, error = %e, "Skipping undecodable committed transaction"),
            }
        }
    }
}

#[async_trait]
impl ChainSubmitter for ConsensusBridge {
    async fn submit(&self, request: ChainRequest) -> Result<serde_json::Value, DispatchError> {
        self.submit_transaction(request).await?.wait().await
    }
}

/// A submitted transaction whose commit has not been observed yet.
///
/// Dropping it before [`PendingCommit::wait`] completes removes the
/// callback, so an abandoned caller never leaks an entry.
pub struct PendingCommit {
    correlation_id: CorrelationId,
    receiver: Option<oneshot::Receiver<CallbackOutcome>>,
    callbacks: Arc<CallbackTable>,
    ttl: Duration,
}

impl PendingCommit {
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Wait for the commit result, or `ConsensusTimeout` once the TTL is
    /// spent.
    pub async fn wait(mut self) -> CallbackOutcome {
        let Some(receiver) = self.receiver.take() else {
            return Err(DispatchError::Internal("pending commit already awaited".into()));
        };
        let timeout = DispatchError::ConsensusTimeout {
            correlation_id: self.correlation_id.to_string(),
            waited_ms: self.ttl.as_millis() as u64,
        };

        match tokio::time::timeout(self.ttl, receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(timeout),
            Err(_) => {
                warn!(correlation_id = %self.correlation_id, "Chain callback timed out");
                Err(timeout)
            }
        }
    }
}

impl Drop for PendingCommit {
    fn drop(&mut self) {
        if self.callbacks.cancel(&self.correlation_id) {
            debug!(correlation_id = %self.correlation_id, "Abandoned chain callback removed");
        }
    }
}
