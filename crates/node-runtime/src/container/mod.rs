//! # Platform Context
//!
//! The one process-scoped object that owns every subsystem of a node. It is
//! built once by the startup routine and handed to transports explicitly;
//! nothing in the node lives in a global.
//!
//! ## Wiring Order
//!
//! ```text
//! store, signaler, security           (no dependencies)
//!   └─► sandbox bridge                (signaler, applet router)
//!         └─► action registry         (security, sandbox)
//!               └─► consensus bridge  (registry, store, ordering, callbacks)
//!                     └─► dispatcher  (registry, store, security, signaler, bridge)
//! ```
//!
//! The applet router is bound to the dispatcher last; it only holds a weak
//! handle, so dropping the context tears everything down.

pub mod config;

pub use config::{ConfigError, NodeConfig};

use px_01_state_store::InMemoryStateStore;
use px_02_signaler::{Listener, SignalSink, Signaler};
use px_03_dispatch::{ActionRegistry, Dispatcher, RegistryError};
use px_04_consensus_bridge::{cleanup_task, CallbackTable, ConsensusBridge, LocalOrderingService};
use px_05_sandbox_ipc::{IpcChannel, Sandbox, SandboxBridge};
use shared_types::{GroupId, OriginPacket, UserId};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use crate::actions::builtin_registry;
use crate::adapters::{AppletRequestRouter, HmacSecurity};

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("action registry: {0}")]
    Registry(#[from] RegistryError),
}

pub struct PlatformContext {
    pub config: NodeConfig,
    pub store: Arc<InMemoryStateStore>,
    pub signaler: Arc<Signaler>,
    pub security: Arc<HmacSecurity>,
    pub registry: Arc<ActionRegistry>,
    pub callbacks: Arc<CallbackTable>,
    pub ordering: Arc<LocalOrderingService>,
    pub bridge: Arc<ConsensusBridge>,
    pub dispatcher: Arc<Dispatcher>,
    pub sandbox: Arc<SandboxBridge>,
}

impl PlatformContext {
    /// Validate `config` and wire every subsystem.
    #[instrument(name = "context_build", skip(config), fields(origin = %config.node.origin))]
    pub fn build(config: NodeConfig) -> Result<Self, ContextError> {
        config.validate()?;

        let store = Arc::new(InMemoryStateStore::new());
        let signaler = Arc::new(Signaler::new(config.node.origin.clone()));
        let security = Arc::new(HmacSecurity::new());

        let applets = Arc::new(AppletRequestRouter::new(config.node.applet_marker.clone()));
        let sandbox = Arc::new(
            SandboxBridge::new(signaler.clone(), config.ipc.clone())
                .with_request_handler(applets.clone()),
        );
        sandbox.on_event(applets.clone());

        let registry = Arc::new(builtin_registry(security.clone(), sandbox.clone())?);
        info!(actions = ?registry.keys(), "Action registry built");

        let callbacks = Arc::new(CallbackTable::new(
            config.consensus.policy(),
            config.consensus.callback_ttl(),
        ));
        let ordering = Arc::new(LocalOrderingService::new());
        let bridge = Arc::new(
            ConsensusBridge::new(
                config.node.replica_id.clone(),
                registry.clone(),
                store.clone(),
                ordering.clone(),
                callbacks.clone(),
            )
            .with_applied_window(
                config.consensus.applied_window(),
                config.consensus.applied_max_entries,
            )
            .with_signals(signaler.clone()),
        );
        bridge.attach();

        let dispatcher = Arc::new(
            Dispatcher::new(
                registry.clone(),
                store.clone(),
                security.clone(),
                signaler.clone(),
                config.dispatch.clone(),
            )
            .with_chain(bridge.clone()),
        );
        applets.bind(&dispatcher);

        info!(replica_id = %config.node.replica_id, "Platform context ready");
        Ok(Self {
            config,
            store,
            signaler,
            security,
            registry,
            callbacks,
            ordering,
            bridge,
            dispatcher,
            sandbox,
        })
    }

    /// Start the callback sweep and the block sealing loop. Both stop when
    /// `shutdown` flips to `true`.
    pub fn spawn_background(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let sweep = tokio::spawn(cleanup_task(
            self.callbacks.clone(),
            self.config.consensus.cleanup_interval(),
            shutdown.clone(),
        ));
        let sealing = tokio::spawn(self.ordering.clone().run(
            Duration::from_millis(self.config.node.block_interval_ms),
            shutdown,
        ));
        vec![sweep, sealing]
    }

    /// Run a request packet and build its response packet.
    pub async fn handle(&self, packet: &OriginPacket) -> OriginPacket {
        self.dispatcher.handle_packet(packet).await
    }

    /// Open a session: signals addressed to `user` go to `sink`.
    pub fn connect(&self, user: UserId, sink: Arc<dyn SignalSink>) {
        self.signaler.listen_single(Listener::new(user, sink));
    }

    /// Close `user`'s session. For an attached machine this also closes its
    /// IPC channel and stops the reader.
    pub fn disconnect(&self, user: &UserId) -> bool {
        if self.sandbox.detach(user) {
            return true;
        }
        self.signaler.remove_listener(user).is_some()
    }

    /// Grant `user` membership of `group` and subscribe it to the group's
    /// signals.
    pub fn join(&self, group: &GroupId, user: UserId) -> bool {
        let granted = self.security.add_member(group.clone(), user.clone());
        let joined = self.signaler.join_group(group, user);
        granted || joined
    }

    pub fn leave(&self, group: &GroupId, user: &UserId) -> bool {
        let revoked = self.security.remove_member(group, user);
        let left = self.signaler.leave_group(group, user);
        revoked || left
    }

    /// Register `machine` as a machine caller and attach its IPC stream.
    pub fn attach_machine<R, W>(&self, machine: UserId, reader: R, writer: W) -> Arc<IpcChannel>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        self.security.register_machine(machine.clone());
        self.sandbox.attach(machine, reader, writer)
    }
}
