//! # Consensus Flows
//!
//! On-chain actions submitted through the dispatcher, ordered by the local
//! ordering service and demultiplexed back through the callback table.
//!
//! ## Flows Tested
//!
//! 1. **Commit order wins**: two concurrent `putNote` writes resolve in
//!    block order, not submission order
//! 2. **At-most-once apply**: a replayed commit is neither applied nor
//!    resolved a second time
//! 3. **Timeout**: an unsealed transaction fails with `ConsensusTimeout`
//! 4. **Replica convergence**: every replica applies the same block
//! 5. **All-executors policy**: the callback resolves on executor reports

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use node_runtime::actions::{Note, PutNote};
    use node_runtime::PlatformContext;
    use parking_lot::Mutex;
    use px_01_state_store::{InMemoryStateStore, StateStore, TrxExt, TrxMode};
    use px_03_dispatch::{ActionRegistry, ChainRequest, ChainSubmitter};
    use px_04_consensus_bridge::{
        BridgeError, CallbackTable, CommitHandler, ConsensusBridge, ConsensusPort,
        ResolutionKind, ResolutionPolicy,
    };
    use serde_json::{json, Value};
    use shared_types::{CallerType, DispatchError, OriginPacket, ReplicaId, UserId};
    use tokio::sync::watch;
    use tokio::time::timeout;

    use crate::integration::fixtures::*;

    fn put_note(user: &str, note: &str, text: &str) -> OriginPacket {
        signed("putNote", user, &json!({"noteId": note, "text": text}))
    }

    fn chain_request(note: &str, text: &str) -> ChainRequest {
        ChainRequest {
            key: "putNote".into(),
            caller: UserId::new("u1"),
            caller_type: CallerType::User,
            is_privileged: false,
            request_id: String::new(),
            subject: String::new(),
            payload: json!({"noteId": note, "text": text}).to_string().into_bytes(),
            signature: String::new(),
            echo: false,
            exceptions: Vec::new(),
        }
    }

    fn read_note(store: &dyn StateStore, note: &str) -> Option<Note> {
        let trx = store.begin(TrxMode::ReadOnly).unwrap();
        trx.load(Note::KIND, note).unwrap()
    }

    fn notes_registry() -> Arc<ActionRegistry> {
        Arc::new(ActionRegistry::builder().register(PutNote).unwrap().build())
    }

    // =========================================================================
    // COMMIT ORDER
    // =========================================================================

    #[tokio::test]
    async fn test_commit_order_decides_last_writer() {
        // No background sealing: the test seals the block itself.
        let ctx = Arc::new(node());

        let first = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.handle(&put_note("u1", "n1", "A")).await })
        };
        ctx.ordering.wait_for_pending(1).await;
        let second = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.handle(&put_note("u2", "n1", "B")).await })
        };
        ctx.ordering.wait_for_pending(2).await;

        // B was submitted second but is ordered first.
        let sealed = ctx.ordering.seal_block_with_order(&[1, 0]).await.unwrap();
        assert_eq!(sealed, 2);

        let a = response_body(&first.await.unwrap());
        let b = response_body(&second.await.unwrap());
        assert_eq!(b["result"]["revision"], 1);
        assert_eq!(b["result"]["previous"], Value::Null);
        assert_eq!(a["result"]["revision"], 2);
        assert_eq!(a["result"]["previous"], "B");

        let read = ctx
            .handle(&signed("getNote", "u3", &json!({"noteId": "n1"})))
            .await;
        let read = response_body(&read);
        assert_eq!(read["result"]["text"], "A");
        assert_eq!(read["result"]["author"], "u1");
        assert_eq!(ctx.callbacks.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_on_chain_write_through_background_loop() {
        let ctx = node();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tasks = ctx.spawn_background(shutdown_rx);

        let response = timeout(Duration::from_secs(5), ctx.handle(&put_note("u1", "n1", "hello")))
            .await
            .expect("commit within deadline");
        let body = response_body(&response);
        assert_eq!(body["ok"], true);
        assert_eq!(body["result"]["revision"], 1);
        assert!(ctx.ordering.height() >= 1);

        shutdown_tx.send(true).unwrap();
        for task in tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_invalid_order_rejected_and_queue_kept() {
        let ctx = Arc::new(node());
        let pending = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.handle(&put_note("u1", "n1", "A")).await })
        };
        ctx.ordering.wait_for_pending(1).await;

        let err = ctx.ordering.seal_block_with_order(&[1]).await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidOrder(_)));
        assert_eq!(ctx.ordering.pending_len(), 1);

        ctx.ordering.seal_block().await.unwrap();
        let body = response_body(&pending.await.unwrap());
        assert_eq!(body["ok"], true);
    }

    // =========================================================================
    // AT-MOST-ONCE RESOLUTION
    // =========================================================================

    #[test]
    fn test_second_resolution_is_noop() {
        let table = CallbackTable::new(ResolutionPolicy::FirstResult, Duration::from_secs(5));
        let (id, mut rx) = table.register("putNote", None);

        assert!(table.resolve(id, Ok(json!(1))));
        assert!(!table.resolve(id, Ok(json!(2))));

        assert_eq!(rx.try_recv().unwrap(), Ok(json!(1)));
        assert_eq!(table.stats().total_resolved.load(Ordering::Relaxed), 1);
        assert_eq!(table.stats().total_duplicates.load(Ordering::Relaxed), 1);
        assert!(!table.is_pending(&id));
    }

    /// Delivers every submission twice, inline, as a faulty consensus
    /// layer might.
    #[derive(Default)]
    struct ReplayingConsensus {
        handler: Mutex<Option<Arc<dyn CommitHandler>>>,
        submissions: Mutex<usize>,
    }

    #[async_trait]
    impl ConsensusPort for ReplayingConsensus {
        async fn submit(&self, transaction: Vec<u8>) -> Result<(), BridgeError> {
            *self.submissions.lock() += 1;
            let handler = self.handler.lock().clone();
            let handler = handler.ok_or(BridgeError::NoCommitHandler)?;
            handler
                .on_commit(vec![transaction.clone(), transaction])
                .await;
            Ok(())
        }

        fn register_commit_handler(&self, handler: Arc<dyn CommitHandler>) {
            *self.handler.lock() = Some(handler);
        }
    }

    #[tokio::test]
    async fn test_replayed_commit_resolves_once() {
        let store = Arc::new(InMemoryStateStore::new());
        let consensus = Arc::new(ReplayingConsensus::default());
        let callbacks = Arc::new(CallbackTable::new(
            ResolutionPolicy::FirstResult,
            Duration::from_secs(5),
        ));
        let bridge = Arc::new(ConsensusBridge::new(
            ReplicaId::new("replica-0"),
            notes_registry(),
            store.clone(),
            consensus.clone(),
            callbacks.clone(),
        ));
        bridge.attach();

        let output = bridge.submit(chain_request("n1", "once")).await.unwrap();

        assert_eq!(output["revision"], 1);
        assert_eq!(*consensus.submissions.lock(), 1);
        assert_eq!(callbacks.stats().total_resolved.load(Ordering::Relaxed), 1);
        assert_eq!(callbacks.stats().total_redelivered.load(Ordering::Relaxed), 1);
        assert_eq!(callbacks.stats().total_duplicates.load(Ordering::Relaxed), 0);
        assert_eq!(callbacks.pending_count(), 0);

        // The replay was skipped before it reached the store.
        assert_eq!(read_note(store.as_ref(), "n1").unwrap().revision, 1);
    }

    // =========================================================================
    // TIMEOUT
    // =========================================================================

    #[tokio::test]
    async fn test_unsealed_transaction_times_out() {
        let ctx = node_with(|config| config.consensus.callback_ttl_ms = 50);

        let response = ctx.handle(&put_note("u1", "n1", "lost")).await;
        let body = response_body(&response);

        assert_eq!(body["ok"], false);
        assert_eq!(body["error"]["code"], 5040);
        assert_eq!(ctx.callbacks.pending_count(), 0);
        // The transaction is still queued; sealing it later resolves nothing.
        assert_eq!(ctx.ordering.pending_len(), 1);
        ctx.ordering.seal_block().await.unwrap();
        assert_eq!(ctx.callbacks.stats().total_duplicates.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_timeout_error_carries_correlation() {
        let table = Arc::new(CallbackTable::new(
            ResolutionPolicy::FirstResult,
            Duration::from_millis(20),
        ));
        let consensus = Arc::new(BroadcastConsensus::default());
        let bridge = ConsensusBridge::new(
            ReplicaId::new("replica-0"),
            notes_registry(),
            Arc::new(InMemoryStateStore::new()),
            consensus,
            table.clone(),
        );

        let pending = bridge.submit_transaction(chain_request("n1", "x")).await.unwrap();
        let id = pending.correlation_id();
        match pending.wait().await {
            Err(DispatchError::ConsensusTimeout { correlation_id, waited_ms }) => {
                assert_eq!(correlation_id, id.to_string());
                assert_eq!(waited_ms, 20);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(!table.is_pending(&id));
    }

    // =========================================================================
    // REPLICA CONVERGENCE
    // =========================================================================

    /// Queues submissions and delivers each sealed block to every replica.
    #[derive(Default)]
    struct BroadcastConsensus {
        queue: Mutex<Vec<Vec<u8>>>,
        handlers: Mutex<Vec<Arc<dyn CommitHandler>>>,
    }

    impl BroadcastConsensus {
        async fn seal(&self) -> usize {
            let batch = std::mem::take(&mut *self.queue.lock());
            let handlers = self.handlers.lock().clone();
            for handler in &handlers {
                handler.on_commit(batch.clone()).await;
            }
            batch.len()
        }

        async fn wait_for_pending(&self, count: usize) {
            while self.queue.lock().len() < count {
                tokio::task::yield_now().await;
            }
        }
    }

    #[async_trait]
    impl ConsensusPort for BroadcastConsensus {
        async fn submit(&self, transaction: Vec<u8>) -> Result<(), BridgeError> {
            self.queue.lock().push(transaction);
            Ok(())
        }

        fn register_commit_handler(&self, handler: Arc<dyn CommitHandler>) {
            self.handlers.lock().push(handler);
        }
    }

    struct Replica {
        bridge: Arc<ConsensusBridge>,
        store: Arc<InMemoryStateStore>,
        callbacks: Arc<CallbackTable>,
    }

    fn replica(id: &str, consensus: &Arc<BroadcastConsensus>, policy: ResolutionPolicy) -> Replica {
        let store = Arc::new(InMemoryStateStore::new());
        let callbacks = Arc::new(CallbackTable::new(policy, Duration::from_secs(5)));
        let bridge = Arc::new(ConsensusBridge::new(
            ReplicaId::new(id),
            notes_registry(),
            store.clone(),
            consensus.clone(),
            callbacks.clone(),
        ));
        bridge.attach();
        Replica {
            bridge,
            store,
            callbacks,
        }
    }

    #[tokio::test]
    async fn test_every_replica_applies_the_block() {
        let consensus = Arc::new(BroadcastConsensus::default());
        let r0 = replica("replica-0", &consensus, ResolutionPolicy::FirstResult);
        let r1 = replica("replica-1", &consensus, ResolutionPolicy::FirstResult);

        let waiter = {
            let bridge = r0.bridge.clone();
            tokio::spawn(async move { bridge.submit(chain_request("n1", "shared")).await })
        };
        consensus.wait_for_pending(1).await;
        assert_eq!(consensus.seal().await, 1);

        let output = waiter.await.unwrap().unwrap();
        assert_eq!(output["text"], "shared");
        assert_eq!(read_note(r0.store.as_ref(), "n1"), read_note(r1.store.as_ref(), "n1"));
        assert_eq!(r0.store.commit_count(), r1.store.commit_count());
        // Only the submitter held a callback for it.
        assert_eq!(r1.callbacks.stats().total_resolved.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_all_executors_resolve_when_digests_agree() {
        let consensus = Arc::new(BroadcastConsensus::default());
        let executors: std::collections::BTreeSet<ReplicaId> =
            [ReplicaId::new("replica-0"), ReplicaId::new("replica-1")].into();
        let policy = ResolutionPolicy::AllExecutors { executors };
        let r0 = replica("replica-0", &consensus, policy.clone());
        let _r1 = replica("replica-1", &consensus, policy);

        let waiter = {
            let bridge = r0.bridge.clone();
            tokio::spawn(async move { bridge.submit(chain_request("n1", "agreed")).await })
        };
        consensus.wait_for_pending(1).await;
        consensus.seal().await;
        // Both executors queued a report; the next block carries them.
        consensus.wait_for_pending(2).await;
        assert_eq!(consensus.seal().await, 2);

        let output = waiter.await.unwrap().unwrap();
        assert_eq!(output["revision"], 1);
        assert_eq!(r0.callbacks.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_single_executor_node_resolves() {
        let ctx: PlatformContext = node_with(|config| {
            config.consensus.resolution = ResolutionKind::AllExecutors;
            config.consensus.executors = vec![ReplicaId::new("replica-0")];
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tasks = ctx.spawn_background(shutdown_rx);

        let response = timeout(Duration::from_secs(5), ctx.handle(&put_note("u1", "n1", "solo")))
            .await
            .expect("resolved by executor report");
        let body = response_body(&response);
        assert_eq!(body["ok"], true);
        assert_eq!(body["result"]["text"], "solo");

        shutdown_tx.send(true).unwrap();
        for task in tasks {
            task.await.unwrap();
        }
    }
}
