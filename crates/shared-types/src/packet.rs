//! # Origin Packet
//!
//! The envelope every transport adapter hands to the dispatch pipeline, and
//! the envelope used when a request is forwarded to another node.
//!
//! ```text
//! {
//!   "type":       "request" | "response" | "update",
//!   "key":        action key, e.g. "textMessage",
//!   "userId":     caller, possibly "name@origin",
//!   "subjectId":  addressed point/group,
//!   "requestId":  caller-chosen id, echoed in the response,
//!   "payload":    raw action input bytes (usually JSON),
//!   "signature":  hex HMAC over payload,
//!   "exceptions": subjects that must not receive the resulting signal
//! }
//! ```

use crate::ids::UserId;
use serde::{Deserialize, Serialize};

/// Discriminator of an [`OriginPacket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PacketKind {
    Request,
    Response,
    Update,
}

/// Wire envelope for local dispatch and federation forwarding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginPacket {
    #[serde(rename = "type")]
    pub kind: PacketKind,
    pub key: String,
    #[serde(default)]
    pub user_id: UserId,
    #[serde(default)]
    pub subject_id: String,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub payload: Vec<u8>,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub exceptions: Vec<UserId>,
    /// Deliver the resulting signal back to the caller as well.
    #[serde(default)]
    pub echo: bool,
}

impl OriginPacket {
    /// A request packet for `key` carrying `payload`.
    pub fn request(key: impl Into<String>, user_id: UserId, payload: Vec<u8>) -> Self {
        Self {
            kind: PacketKind::Request,
            key: key.into(),
            user_id,
            subject_id: String::new(),
            request_id: String::new(),
            payload,
            signature: String::new(),
            exceptions: Vec::new(),
            echo: false,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_subject(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = subject_id.into();
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Build the response packet for this request.
    pub fn respond(&self, payload: Vec<u8>) -> Self {
        Self {
            kind: PacketKind::Response,
            key: self.key.clone(),
            user_id: self.user_id.clone(),
            subject_id: self.subject_id.clone(),
            request_id: self.request_id.clone(),
            payload,
            signature: String::new(),
            exceptions: Vec::new(),
            echo: false,
        }
    }

    /// True when the packet answers an earlier request.
    pub fn is_response(&self) -> bool {
        self.kind == PacketKind::Response
    }
}
