//! # HMAC Security Adapter
//!
//! `SecurityPort` backed by per-subject HMAC secrets and an in-process
//! membership table.
//!
//! Every packet is checked against the subject's secret; no signature value
//! is special. Registered machines act without a secret only through their
//! sandbox channel, which the dispatcher trusts by origin rather than by
//! anything written in the packet.

use parking_lot::RwLock;
use px_03_dispatch::{SecurityPort, SignatureCheck};
use shared_types::{verify_payload_signature, CallerType, GroupId, UserId};
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Default)]
pub struct HmacSecurity {
    secrets: RwLock<HashMap<UserId, Vec<u8>>>,
    machines: RwLock<HashSet<UserId>>,
    privileged: RwLock<HashSet<UserId>>,
    memberships: RwLock<HashMap<GroupId, HashSet<UserId>>>,
}

impl HmacSecurity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or rotate) the signing secret of a user.
    pub fn register_user(&self, user: UserId, secret: impl Into<Vec<u8>>) {
        self.secrets.write().insert(user, secret.into());
    }

    /// Register a machine. Machines may also hold a secret.
    pub fn register_machine(&self, machine: UserId) {
        self.machines.write().insert(machine);
    }

    pub fn is_machine(&self, subject: &UserId) -> bool {
        self.machines.read().contains(subject)
    }

    /// Mark `user` as privileged. Privileged callers skip membership checks.
    pub fn grant_privilege(&self, user: UserId) {
        self.privileged.write().insert(user);
    }

    /// Returns `false` when `user` was already a member.
    pub fn add_member(&self, group: GroupId, user: UserId) -> bool {
        self.memberships.write().entry(group).or_default().insert(user)
    }

    pub fn remove_member(&self, group: &GroupId, user: &UserId) -> bool {
        let mut memberships = self.memberships.write();
        let Some(members) = memberships.get_mut(group) else {
            return false;
        };
        let removed = members.remove(user);
        if members.is_empty() {
            memberships.remove(group);
        }
        removed
    }

    fn caller_type(&self, subject: &UserId) -> CallerType {
        if self.is_machine(subject) {
            CallerType::Machine
        } else {
            CallerType::User
        }
    }
}

impl SecurityPort for HmacSecurity {
    fn verify_signature(&self, user: &UserId, payload: &[u8], signature: &str) -> SignatureCheck {
        let verified = self
            .secrets
            .read()
            .get(user)
            .map(|secret| verify_payload_signature(payload, signature, secret))
            .unwrap_or(false);
        if !verified {
            debug!(user = %user, "Signature rejected");
            return SignatureCheck::invalid();
        }

        let is_privileged = self.privileged.read().contains(user);
        SignatureCheck::valid(self.caller_type(user), is_privileged)
    }

    fn has_membership(&self, user: &UserId, group: &GroupId) -> bool {
        self.memberships
            .read()
            .get(group)
            .is_some_and(|members| members.contains(user))
    }

    fn is_machine(&self, user: &UserId) -> bool {
        self.machines.read().contains(user)
    }
}
