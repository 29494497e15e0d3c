use async_trait::async_trait;
use bytes::Bytes;
use shared_types::UserId;
use std::sync::Arc;

use crate::domain::SandboxError;
use crate::ports::outbound::EventHandler;

/// Invocation boundary of sandboxed applet code, whatever actually hosts it.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Send a request to `machine` and wait for its response body.
    async fn invoke(&self, machine: &UserId, request: Bytes) -> Result<Bytes, SandboxError>;

    /// Install the handler for events applets emit on their own.
    fn on_event(&self, handler: Arc<dyn EventHandler>);
}
