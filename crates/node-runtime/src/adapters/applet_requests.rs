//! # Applet Requests
//!
//! Routes what sandboxed machines send to the node back into the dispatch
//! pipeline through its sandbox entry point. The machine owning the channel
//! is the caller; the applet marker is stamped as the packet's signature so
//! committed transactions record where they came from, but it proves nothing.
//! Only on-chain actions are accepted this way.
//!
//! ```text
//! applet frame (id != 0)  {"key": "...", "input": {...}}
//!        │
//!        ▼
//! AppletRequestRouter ──► Dispatcher::handle_sandbox_packet ──► reply frame (same id)
//!
//! applet frame (id == 0)  same body, dispatched fire-and-forget
//! ```
//!
//! The router is created before the dispatcher exists (the dispatcher's
//! registry holds the sandbox, which holds the router), so it keeps a weak
//! handle that [`AppletRequestRouter::bind`] fills in once wiring is done.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use px_03_dispatch::Dispatcher;
use px_05_sandbox_ipc::{AppletRequestHandler, EventHandler};
use serde::Deserialize;
use shared_types::{DispatchError, OriginPacket, UserId};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppletRequest {
    key: String,
    #[serde(default)]
    input: serde_json::Value,
    #[serde(default)]
    request_id: String,
}

pub struct AppletRequestRouter {
    applet_marker: String,
    dispatcher: RwLock<Weak<Dispatcher>>,
}

impl AppletRequestRouter {
    pub fn new(applet_marker: impl Into<String>) -> Self {
        Self {
            applet_marker: applet_marker.into(),
            dispatcher: RwLock::new(Weak::new()),
        }
    }

    pub fn bind(&self, dispatcher: &Arc<Dispatcher>) {
        *self.dispatcher.write() = Arc::downgrade(dispatcher);
    }

    /// Turn an applet body into a request packet on behalf of `machine`.
    fn packet(&self, machine: &UserId, body: &[u8]) -> Result<OriginPacket, DispatchError> {
        let request: AppletRequest = serde_json::from_slice(body)?;
        let subject = request
            .input
            .get("pointId")
            .and_then(|p| p.as_str())
            .unwrap_or_default()
            .to_string();
        let payload = serde_json::to_vec(&request.input)?;

        Ok(OriginPacket::request(request.key, machine.clone(), payload)
            .with_request_id(request.request_id)
            .with_subject(subject)
            .with_signature(self.applet_marker.clone()))
    }

    fn dispatcher(&self) -> Result<Arc<Dispatcher>, DispatchError> {
        self.dispatcher
            .read()
            .upgrade()
            .ok_or_else(|| DispatchError::Internal("dispatcher is not running".into()))
    }
}

fn error_reply(error: &DispatchError) -> Bytes {
    let body = serde_json::json!({ "ok": false, "error": error.body() });
    Bytes::from(serde_json::to_vec(&body).unwrap_or_default())
}

#[async_trait]
impl AppletRequestHandler for AppletRequestRouter {
    async fn handle_request(&self, machine: &UserId, body: Bytes) -> Bytes {
        let prepared = self
            .packet(machine, &body)
            .and_then(|packet| Ok((self.dispatcher()?, packet)));
        let (dispatcher, packet) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(machine = %machine, error = %e, "Rejected applet request");
                return error_reply(&e);
            }
        };

        debug!(machine = %machine, key = %packet.key, "Applet request");
        Bytes::from(dispatcher.handle_sandbox_packet(&packet).await.payload)
    }
}

#[async_trait]
impl EventHandler for AppletRequestRouter {
    async fn on_event(&self, machine: &UserId, body: Bytes) {
        let prepared = self
            .packet(machine, &body)
            .and_then(|packet| Ok((self.dispatcher()?, packet)));
        match prepared {
            Ok((dispatcher, packet)) => {
                if let Err(e) = dispatcher.dispatch_from_sandbox(&packet).await {
                    debug!(machine = %machine, key = %packet.key, error = %e, "Applet event failed");
                }
            }
            Err(e) => warn!(machine = %machine, error = %e, "Dropped applet event"),
        }
    }
}
