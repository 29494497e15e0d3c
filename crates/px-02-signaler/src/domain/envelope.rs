//! JSON envelopes exchanged with listeners and sandboxed machines.
//!
//! Broadcast signal (`pack = true`):
//!
//! ```text
//! {"type": "broadcast", "point": {"id": "g1"}, "user": {"id": "u1"}, "data": {...}}
//! ```
//!
//! Cross-process call into a machine:
//!
//! ```text
//! {"key": "run", "input": {"type": "run", "pointId": "g1", "userId": "u1", "data": "..."}}
//! ```

use serde::{Deserialize, Serialize};
use shared_types::{GroupId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointRef {
    pub id: GroupId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: UserId,
}

/// Envelope wrapped around a packed group signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub point: PointRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserRef>,
    pub data: serde_json::Value,
}

impl SignalEnvelope {
    pub fn new(kind: impl Into<String>, group: &GroupId, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            point: PointRef { id: group.clone() },
            user: None,
            data,
        }
    }

    pub fn from_user(mut self, user: &UserId) -> Self {
        self.user = Some(UserRef { id: user.clone() });
        self
    }
}

/// Input half of a [`CrossProcessCall`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallInput {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point_id: Option<GroupId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    pub user_id: UserId,
    /// Opaque, usually a JSON document serialized to a string.
    pub data: String,
}

/// A call from the host into a sandboxed machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossProcessCall {
    pub key: String,
    pub input: CallInput,
}

impl CrossProcessCall {
    /// A call addressed at a point (group) on behalf of `user_id`.
    pub fn for_point(
        key: impl Into<String>,
        point_id: GroupId,
        user_id: UserId,
        data: impl Into<String>,
    ) -> Self {
        let key = key.into();
        Self {
            input: CallInput {
                kind: key.clone(),
                point_id: Some(point_id),
                group_id: None,
                user_id,
                data: data.into(),
            },
            key,
        }
    }
}
