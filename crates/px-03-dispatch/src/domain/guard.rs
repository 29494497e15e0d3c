//! # Guard
//!
//! Authorization predicate evaluated before any handler runs.
//!
//! A guard sees the caller identity and the group/subgroup the request
//! targets. It never sees the payload, so two requests from the same caller
//! to the same targets always get the same answer.

use serde::{Deserialize, Serialize};
use shared_types::{CallerIdentity, DispatchError, GroupId, UserId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    #[error("caller is not authenticated")]
    Unauthenticated,

    #[error("request does not name a {0}")]
    MissingTarget(&'static str),

    #[error("{user} is not a member of {group}")]
    NotMember { user: UserId, group: GroupId },
}

impl From<GuardError> for DispatchError {
    fn from(e: GuardError) -> Self {
        DispatchError::Authorization(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guard {
    pub requires_authenticated_user: bool,
    pub requires_group_membership: bool,
    pub requires_subgroup_membership: bool,
}

impl Guard {
    /// Anyone, including anonymous callers.
    pub const fn open() -> Self {
        Self {
            requires_authenticated_user: false,
            requires_group_membership: false,
            requires_subgroup_membership: false,
        }
    }

    /// Any authenticated caller.
    pub const fn user() -> Self {
        Self {
            requires_authenticated_user: true,
            requires_group_membership: false,
            requires_subgroup_membership: false,
        }
    }

    /// Authenticated member of the targeted group.
    pub const fn group_member() -> Self {
        Self {
            requires_authenticated_user: true,
            requires_group_membership: true,
            requires_subgroup_membership: false,
        }
    }

    /// Authenticated member of the targeted group and subgroup.
    pub const fn subgroup_member() -> Self {
        Self {
            requires_authenticated_user: true,
            requires_group_membership: true,
            requires_subgroup_membership: true,
        }
    }

    /// Decide whether `caller` may proceed.
    ///
    /// An open guard admits everyone. Privileged callers skip the membership
    /// checks but still have to be authenticated.
    pub fn evaluate<F>(&self, caller: &CallerIdentity, has_membership: F) -> Result<(), GuardError>
    where
        F: Fn(&UserId, &GroupId) -> bool,
    {
        if !self.requires_authenticated_user {
            return Ok(());
        }
        if !caller.is_authenticated() {
            return Err(GuardError::Unauthenticated);
        }

        if self.requires_group_membership {
            let group = caller
                .group_id
                .as_ref()
                .ok_or(GuardError::MissingTarget("group"))?;
            if !caller.is_privileged && !has_membership(&caller.user_id, group) {
                return Err(GuardError::NotMember {
                    user: caller.user_id.clone(),
                    group: group.clone(),
                });
            }
        }

        if self.requires_subgroup_membership {
            let subgroup = caller
                .subgroup_id
                .as_ref()
                .ok_or(GuardError::MissingTarget("subgroup"))?;
            if !caller.is_privileged && !has_membership(&caller.user_id, subgroup) {
                return Err(GuardError::NotMember {
                    user: caller.user_id.clone(),
                    group: subgroup.clone(),
                });
            }
        }

        Ok(())
    }
}
