//! Caller identity derived from signature verification.

use crate::ids::{GroupId, UserId};
use serde::{Deserialize, Serialize};

/// What kind of principal signed the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerType {
    /// No user id or no valid signature.
    Anonymous,
    /// A human user session.
    User,
    /// A sandboxed machine (applet) acting on its own behalf.
    Machine,
}

/// The authenticated caller of a single request.
///
/// Built once, right after signature verification, and never mutated while
/// the request is in flight. `group_id` and `subgroup_id` are the targets the
/// request addresses; the guard decides whether the caller may reach them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub user_id: UserId,
    pub caller_type: CallerType,
    /// "God" callers skip membership checks, never signature checks.
    pub is_privileged: bool,
    pub group_id: Option<GroupId>,
    pub subgroup_id: Option<GroupId>,
}

impl CallerIdentity {
    /// An unauthenticated caller.
    pub fn anonymous() -> Self {
        Self {
            user_id: UserId::default(),
            caller_type: CallerType::Anonymous,
            is_privileged: false,
            group_id: None,
            subgroup_id: None,
        }
    }

    /// A verified caller with no target attached yet.
    pub fn verified(user_id: UserId, caller_type: CallerType, is_privileged: bool) -> Self {
        Self {
            user_id,
            caller_type,
            is_privileged,
            group_id: None,
            subgroup_id: None,
        }
    }

    /// Attach the group/subgroup targets of the request.
    pub fn targeting(mut self, group_id: Option<GroupId>, subgroup_id: Option<GroupId>) -> Self {
        self.group_id = group_id;
        self.subgroup_id = subgroup_id;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.caller_type != CallerType::Anonymous
    }
}
