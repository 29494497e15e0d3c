//! Signal effects declared by actions.

use px_02_signaler::SignalPort;
use shared_types::{GroupId, UserId};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectTarget {
    Group(GroupId),
    User(UserId),
}

/// A signal an action asks to emit once it has succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalEffect {
    pub key: String,
    pub target: EffectTarget,
    pub payload: serde_json::Value,
    pub pack: bool,
}

impl SignalEffect {
    pub fn to_group(key: impl Into<String>, group: GroupId, payload: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            target: EffectTarget::Group(group),
            payload,
            pack: false,
        }
    }

    pub fn to_user(key: impl Into<String>, user: UserId, payload: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            target: EffectTarget::User(user),
            payload,
            pack: false,
        }
    }

    pub fn packed(mut self) -> Self {
        self.pack = true;
        self
    }
}

/// Hand an effect to the signaler.
///
/// The caller is added to the exceptions unless `echo` is set. Delivery
/// problems are logged; they never fail the request that produced them.
pub fn emit_effect(
    signals: &dyn SignalPort,
    effect: &SignalEffect,
    caller: &UserId,
    echo: bool,
    exceptions: &[UserId],
) {
    match &effect.target {
        EffectTarget::Group(group) => {
            let mut excluded = exceptions.to_vec();
            if !echo && !caller.is_empty() && !excluded.contains(caller) {
                excluded.push(caller.clone());
            }
            match signals.signal_group(&effect.key, group, &effect.payload, effect.pack, &excluded) {
                Ok(report) => debug!(
                    key = %effect.key,
                    group_id = %group,
                    delivered = report.delivered,
                    "Effect signalled"
                ),
                Err(e) => warn!(key = %effect.key, group_id = %group, error = %e, "Effect signal failed"),
            }
        }
        EffectTarget::User(user) => {
            if !echo && user == caller {
                return;
            }
            if let Err(e) = signals.signal_user(&effect.key, user, &effect.payload) {
                warn!(key = %effect.key, user = %user, error = %e, "Effect signal failed");
            }
        }
    }
}
