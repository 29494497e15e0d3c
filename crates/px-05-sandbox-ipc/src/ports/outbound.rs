use async_trait::async_trait;
use bytes::Bytes;
use shared_types::UserId;

/// Receives event frames (callback id 0) sent by an applet.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_event(&self, machine: &UserId, body: Bytes);
}

/// Serves requests an applet sends to the node. The returned body goes back
/// in a frame carrying the request's callback id.
#[async_trait]
pub trait AppletRequestHandler: Send + Sync {
    async fn handle_request(&self, machine: &UserId, body: Bytes) -> Bytes;
}
