//! Shared builders for the integration scenarios.

use node_runtime::{NodeConfig, PlatformContext};
use px_01_state_store::{InMemoryStateStore, StateError, StateStore, StateUpdate, Trx, TrxMode};
use px_02_signaler::{ChannelSink, SignalMessage};
use serde_json::Value;
use shared_types::{sign_payload, GroupId, OriginPacket, UserId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// Users every test node knows, signing with `<name>-secret`.
pub const USERS: [&str; 4] = ["u1", "u2", "u3", "u4"];

pub fn secret(user: &str) -> Vec<u8> {
    format!("{user}-secret").into_bytes()
}

/// A node with the default config, a fast block interval and the
/// [`USERS`] registered.
pub fn node() -> PlatformContext {
    node_with(|_| {})
}

pub fn node_with(tweak: impl FnOnce(&mut NodeConfig)) -> PlatformContext {
    let mut config = NodeConfig::default();
    config.node.block_interval_ms = 5;
    tweak(&mut config);

    let ctx = PlatformContext::build(config).expect("test config is valid");
    for user in USERS {
        ctx.security.register_user(UserId::new(user), secret(user));
    }
    ctx
}

/// A request packet signed with `user`'s secret.
pub fn signed(key: &str, user: &str, body: &Value) -> OriginPacket {
    let payload = body.to_string().into_bytes();
    let signature = sign_payload(&payload, &secret(user));
    OriginPacket::request(key, UserId::new(user), payload).with_signature(signature)
}

/// Connect `user` with a channel-backed session.
pub fn session(ctx: &PlatformContext, user: &str) -> UnboundedReceiver<SignalMessage> {
    let (sink, rx) = ChannelSink::pair(UserId::new(user));
    ctx.connect(UserId::new(user), sink);
    rx
}

pub fn join_all(ctx: &PlatformContext, group: &str, users: &[&str]) {
    let group = GroupId::new(group);
    for user in users {
        ctx.join(&group, UserId::new(*user));
    }
}

pub fn response_body(packet: &OriginPacket) -> Value {
    serde_json::from_slice(&packet.payload).expect("response payload is JSON")
}

pub fn drain(rx: &mut UnboundedReceiver<SignalMessage>) -> Vec<SignalMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

// =============================================================================
// Call-counting store
// =============================================================================

#[derive(Debug, Default)]
pub struct StoreCalls {
    pub begins: AtomicUsize,
    pub puts: AtomicUsize,
    pub commits: AtomicUsize,
    pub discards: AtomicUsize,
}

impl StoreCalls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// In-memory store that counts transaction calls.
#[derive(Default)]
pub struct CountingStore {
    inner: InMemoryStateStore,
    pub calls: Arc<StoreCalls>,
}

impl StateStore for CountingStore {
    fn begin(&self, mode: TrxMode) -> Result<Box<dyn Trx>, StateError> {
        self.calls.begins.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingTrx {
            inner: self.inner.begin(mode)?,
            calls: self.calls.clone(),
        }))
    }
}

struct CountingTrx {
    inner: Box<dyn Trx>,
    calls: Arc<StoreCalls>,
}

impl Trx for CountingTrx {
    fn mode(&self) -> TrxMode {
        self.inner.mode()
    }

    fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, StateError> {
        self.inner.get_bytes(key)
    }

    fn put_bytes(&mut self, key: &str, value: Vec<u8>) -> Result<(), StateError> {
        self.calls.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put_bytes(key, value)
    }

    fn delete(&mut self, key: &str) -> Result<(), StateError> {
        self.inner.delete(key)
    }

    fn get_by_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StateError> {
        self.inner.get_by_prefix(prefix)
    }

    fn updates(&self) -> Vec<StateUpdate> {
        self.inner.updates()
    }

    fn commit(self: Box<Self>) -> Result<(), StateError> {
        self.calls.commits.fetch_add(1, Ordering::SeqCst);
        self.inner.commit()
    }

    fn discard(self: Box<Self>) {
        self.calls.discards.fetch_add(1, Ordering::SeqCst);
        self.inner.discard()
    }
}
