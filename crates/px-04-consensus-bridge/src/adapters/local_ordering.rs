//! # Local Ordering Service
//!
//! Single-process stand-in for the BFT layer: submissions are queued and
//! sealed into blocks either on a timer (`run`) or explicitly
//! (`seal_block`, `seal_block_with_order`). Submission never delivers
//! inline, so a commit handler may submit again without deadlocking.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::BridgeError;
use crate::ports::{CommitHandler, ConsensusPort};

pub struct LocalOrderingService {
    queue: Mutex<VecDeque<Vec<u8>>>,
    // Weak: the handler usually owns this service through its ConsensusPort.
    handler: RwLock<Option<Weak<dyn CommitHandler>>>,
    queued: watch::Sender<usize>,
    height: AtomicU64,
    max_block_size: usize,
    // Serializes sealing so blocks never overlap.
    sealing: tokio::sync::Mutex<()>,
}

impl LocalOrderingService {
    pub const DEFAULT_MAX_BLOCK_SIZE: usize = 512;

    pub fn new() -> Self {
        Self::with_max_block_size(Self::DEFAULT_MAX_BLOCK_SIZE)
    }

    pub fn with_max_block_size(max_block_size: usize) -> Self {
        let (queued, _) = watch::channel(0);
        Self {
            queue: Mutex::new(VecDeque::new()),
            handler: RwLock::new(None),
            queued,
            height: AtomicU64::new(0),
            max_block_size: max_block_size.max(1),
            sealing: tokio::sync::Mutex::new(()),
        }
    }

    pub fn pending_len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Number of sealed blocks.
    pub fn height(&self) -> u64 {
        self.height.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` transactions are queued.
    pub async fn wait_for_pending(&self, count: usize) {
        let mut rx = self.queued.subscribe();
        // The sender lives in self, so this only fails if self is gone.
        let _ = rx.wait_for(|len| *len >= count).await;
    }

    /// Seal everything queued (up to the block size) into one block and
    /// deliver it. Returns the number of transactions in the block.
    pub async fn seal_block(&self) -> Result<usize, BridgeError> {
        let _sealing = self.sealing.lock().await;
        let batch = {
            let mut queue = self.queue.lock();
            let take = queue.len().min(self.max_block_size);
            let batch: Vec<Vec<u8>> = queue.drain(..take).collect();
            self.queued.send_replace(queue.len());
            batch
        };
        self.deliver(batch).await
    }

    /// Seal the queued transactions in a caller-chosen order. `order` must be
    /// a permutation of `0..pending_len()`.
    pub async fn seal_block_with_order(&self, order: &[usize]) -> Result<usize, BridgeError> {
        let _sealing = self.sealing.lock().await;
        let batch = {
            let mut queue = self.queue.lock();
            let distinct: BTreeSet<usize> = order.iter().copied().collect();
            if order.len() != queue.len()
                || distinct.len() != order.len()
                || order.iter().any(|i| *i >= queue.len())
            {
                return Err(BridgeError::InvalidOrder(format!(
                    "{order:?} is not a permutation of {} queued transactions",
                    queue.len()
                )));
            }
            let mut slots: Vec<Option<Vec<u8>>> = queue.drain(..).map(Some).collect();
            self.queued.send_replace(0);
            order
                .iter()
                .filter_map(|i| slots[*i].take())
                .collect::<Vec<_>>()
        };
        self.deliver(batch).await
    }

    async fn deliver(&self, batch: Vec<Vec<u8>>) -> Result<usize, BridgeError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let handler = self.handler.read().as_ref().and_then(Weak::upgrade);
        let Some(handler) = handler else {
            warn!(dropped = batch.len(), "No commit handler, block dropped");
            return Err(BridgeError::NoCommitHandler);
        };

        let size = batch.len();
        let height = self.height.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(height, size, "Sealed block");
        handler.on_commit(batch).await;
        Ok(size)
    }

    /// Seal a block every `interval` while anything is queued, until
    /// `shutdown` flips to `true`.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(interval_ms = interval.as_millis() as u64, "Local ordering service started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.pending_len() > 0 {
                        if let Err(e) = self.seal_block().await {
                            warn!(error = %e, "Failed to seal block");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(height = self.height(), "Local ordering service stopped");
                        return;
                    }
                }
            }
        }
    }
}

impl Default for LocalOrderingService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConsensusPort for LocalOrderingService {
    async fn submit(&self, transaction: Vec<u8>) -> Result<(), BridgeError> {
        let mut queue = self.queue.lock();
        queue.push_back(transaction);
        self.queued.send_replace(queue.len());
        Ok(())
    }

    fn register_commit_handler(&self, handler: Arc<dyn CommitHandler>) {
        *self.handler.write() = Some(Arc::downgrade(&handler));
    }
}
