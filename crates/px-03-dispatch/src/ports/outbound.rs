//! Outbound ports of the dispatch pipeline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared_types::{CallerType, DispatchError, GroupId, UserId};

/// Outcome of a signature check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureCheck {
    pub valid: bool,
    pub caller_type: CallerType,
    pub is_privileged: bool,
}

impl SignatureCheck {
    pub fn invalid() -> Self {
        Self {
            valid: false,
            caller_type: CallerType::Anonymous,
            is_privileged: false,
        }
    }

    pub fn valid(caller_type: CallerType, is_privileged: bool) -> Self {
        Self {
            valid: true,
            caller_type,
            is_privileged,
        }
    }
}

/// Identity and membership facts the guard relies on.
pub trait SecurityPort: Send + Sync {
    fn verify_signature(&self, user: &UserId, payload: &[u8], signature: &str) -> SignatureCheck;

    /// Whether `user` belongs to `group`. Subgroups are plain groups here.
    fn has_membership(&self, user: &UserId, group: &GroupId) -> bool;

    /// Whether `user` is a registered machine. Only machines may act through
    /// a sandbox channel.
    fn is_machine(&self, _user: &UserId) -> bool {
        false
    }
}

/// An on-chain request as handed to the consensus bridge.
///
/// The caller is carried as a user id plus the verified facts; the bridge
/// applies it on every replica without re-running the guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainRequest {
    pub key: String,
    pub caller: UserId,
    pub caller_type: CallerType,
    pub is_privileged: bool,
    pub request_id: String,
    /// Addressed point, used as the group when the payload names none.
    #[serde(default)]
    pub subject: String,
    pub payload: Vec<u8>,
    pub signature: String,
    pub echo: bool,
    pub exceptions: Vec<UserId>,
}

/// Submits on-chain requests and waits for their committed result.
#[async_trait]
pub trait ChainSubmitter: Send + Sync {
    async fn submit(&self, request: ChainRequest) -> Result<serde_json::Value, DispatchError>;
}
