//! # Sandbox Bridge
//!
//! Owns one [`IpcChannel`] per attached machine and ties it to the
//! signaler: signals addressed to the machine become event frames, and a
//! channel that closes on its own takes the machine's listener with it.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use px_02_signaler::{CrossProcessCall, Listener, Signaler};
use shared_types::UserId;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use crate::adapters::{FrameSink, IpcChannel};
use crate::domain::{IpcConfig, SandboxError};
use crate::ports::{AppletRequestHandler, EventHandler, Sandbox};

type EventSlot = Arc<RwLock<Option<Arc<dyn EventHandler>>>>;

pub struct SandboxBridge {
    signaler: Arc<Signaler>,
    channels: RwLock<HashMap<UserId, Arc<IpcChannel>>>,
    events: EventSlot,
    requests: Option<Arc<dyn AppletRequestHandler>>,
    config: IpcConfig,
}

impl SandboxBridge {
    pub fn new(signaler: Arc<Signaler>, config: IpcConfig) -> Self {
        Self {
            signaler,
            channels: RwLock::new(HashMap::new()),
            events: Arc::new(RwLock::new(None)),
            requests: None,
            config,
        }
    }

    /// Serve requests that applets send to the node.
    pub fn with_request_handler(mut self, handler: Arc<dyn AppletRequestHandler>) -> Self {
        self.requests = Some(handler);
        self
    }

    /// Attach a connected machine.
    ///
    /// Replaces (and closes) any earlier channel for the same machine; the
    /// new channel starts with an empty decoder.
    pub fn attach<R, W>(self: &Arc<Self>, machine: UserId, reader: R, writer: W) -> Arc<IpcChannel>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let channel = IpcChannel::spawn(
            machine.clone(),
            reader,
            writer,
            self.config.clone(),
            Arc::new(EventRouter {
                slot: self.events.clone(),
            }),
            self.requests.clone(),
        );

        let previous = self
            .channels
            .write()
            .insert(machine.clone(), channel.clone());
        if let Some(previous) = previous {
            debug!(machine = %machine, "Replacing existing sandbox channel");
            previous.close();
        }

        let sink = Arc::new(FrameSink::new(machine.clone(), channel.event_sender()));
        self.signaler.listen_single(Listener::new(machine.clone(), sink));

        let bridge = Arc::downgrade(self);
        let watched = channel.clone();
        tokio::spawn(async move {
            watched.closed().await;
            if let Some(bridge) = Weak::upgrade(&bridge) {
                bridge.forget(&watched);
            }
        });

        info!(machine = %machine, "Sandbox attached");
        channel
    }

    /// Remove the machine's listener and close its channel.
    pub fn detach(&self, machine: &UserId) -> bool {
        let Some(channel) = self.channels.write().remove(machine) else {
            return false;
        };
        self.signaler.remove_listener(machine);
        channel.close();
        info!(machine = %machine, "Sandbox detached");
        true
    }

    pub fn is_attached(&self, machine: &UserId) -> bool {
        self.channels.read().contains_key(machine)
    }

    pub fn attached(&self) -> Vec<UserId> {
        let mut machines: Vec<_> = self.channels.read().keys().cloned().collect();
        machines.sort();
        machines
    }

    /// Invoke an applet with a cross-process call envelope and parse its
    /// JSON reply.
    pub async fn call_applet(
        &self,
        machine: &UserId,
        call: &CrossProcessCall,
    ) -> Result<serde_json::Value, SandboxError> {
        let body = serde_json::to_vec(call).map_err(|e| SandboxError::InvalidResponse(e.to_string()))?;
        let reply = self.invoke(machine, Bytes::from(body)).await?;
        serde_json::from_slice(&reply).map_err(|e| SandboxError::InvalidResponse(e.to_string()))
    }

    fn channel(&self, machine: &UserId) -> Result<Arc<IpcChannel>, SandboxError> {
        self.channels
            .read()
            .get(machine)
            .cloned()
            .ok_or_else(|| SandboxError::NotAttached(machine.clone()))
    }

    /// Drop bookkeeping for a channel that closed, unless it was already
    /// replaced by a newer one.
    fn forget(&self, channel: &Arc<IpcChannel>) {
        let machine = channel.machine();
        let mut channels = self.channels.write();
        let current = channels
            .get(machine)
            .is_some_and(|existing| Arc::ptr_eq(existing, channel));
        if current {
            channels.remove(machine);
            drop(channels);
            self.signaler.remove_listener(machine);
            info!(machine = %machine, "Sandbox channel closed, listener removed");
        }
    }
}

#[async_trait]
impl Sandbox for SandboxBridge {
    async fn invoke(&self, machine: &UserId, request: Bytes) -> Result<Bytes, SandboxError> {
        let channel = self.channel(machine)?;
        channel.request(&request, None).await
    }

    fn on_event(&self, handler: Arc<dyn EventHandler>) {
        *self.events.write() = Some(handler);
    }
}

/// Forwards events to whatever handler is installed when they arrive.
struct EventRouter {
    slot: EventSlot,
}

#[async_trait]
impl EventHandler for EventRouter {
    async fn on_event(&self, machine: &UserId, body: Bytes) {
        let handler = self.slot.read().clone();
        match handler {
            Some(handler) => handler.on_event(machine, body).await,
            None => debug!(machine = %machine, bytes = body.len(), "Sandbox event with no handler"),
        }
    }
}
