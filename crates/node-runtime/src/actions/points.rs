//! # Point Signals
//!
//! `signalPoint` lets a member push an arbitrary payload to the rest of a
//! point (`broadcast`) or to one other member (`single`). Unless the signal
//! is marked `temp`, the packet is kept in the point's history and the
//! point's signal counter advances.

use async_trait::async_trait;
use px_01_state_store::{Trx, TrxExt};
use px_03_dispatch::{
    Action, ActionContext, EffectTarget, Guard, SecurityPort, SignalEffect, Targets,
};
use serde::{Deserialize, Serialize};
use shared_types::{DispatchError, GroupId, UserId};
use std::sync::Arc;

/// Per-point counters, stored under kind `PointMeta`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PointMeta {
    pub signal_count: u64,
    pub message_count: u64,
    pub last_packet: Option<String>,
}

impl PointMeta {
    pub const KIND: &'static str = "PointMeta";

    pub fn load(trx: &dyn Trx, point: &GroupId) -> Result<Self, DispatchError> {
        Ok(trx.load(Self::KIND, point.as_str())?.unwrap_or_default())
    }

    pub fn save(&self, trx: &mut dyn Trx, point: &GroupId) -> Result<(), DispatchError> {
        Ok(trx.store(Self::KIND, point.as_str(), self)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SignalKind {
    Broadcast,
    Single,
}

impl SignalKind {
    fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Broadcast => "broadcast",
            SignalKind::Single => "single",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalInput {
    #[serde(rename = "type")]
    pub kind: SignalKind,
    pub point_id: String,
    #[serde(default)]
    pub user_id: String,
    pub data: String,
    #[serde(default)]
    pub temp: bool,
}

/// A stored signal packet, kind `Packet`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Packet {
    pub id: String,
    pub point_id: GroupId,
    pub user_id: UserId,
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalOutput {
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packet: Option<Packet>,
    #[serde(skip)]
    route: Option<(EffectTarget, serde_json::Value)>,
}

pub struct SignalPoint {
    security: Arc<dyn SecurityPort>,
}

impl SignalPoint {
    pub fn new(security: Arc<dyn SecurityPort>) -> Self {
        Self { security }
    }
}

#[async_trait]
impl Action for SignalPoint {
    type Input = SignalInput;
    type Output = SignalOutput;

    fn key(&self) -> &'static str {
        "signalPoint"
    }

    fn guard(&self) -> Guard {
        Guard::group_member()
    }

    fn targets(&self, input: &SignalInput) -> Targets {
        Targets::group(GroupId::new(input.point_id.clone()))
    }

    fn validate(&self, input: &SignalInput) -> Result<(), String> {
        if input.point_id.is_empty() {
            return Err("pointId is required".into());
        }
        if input.kind == SignalKind::Single && input.user_id.is_empty() {
            return Err("userId is required for single signals".into());
        }
        Ok(())
    }

    async fn handle(
        &self,
        ctx: &ActionContext,
        trx: &mut dyn Trx,
        input: SignalInput,
    ) -> Result<SignalOutput, DispatchError> {
        let point = GroupId::new(input.point_id);
        let sender = ctx.caller.user_id.clone();

        let target = match input.kind {
            SignalKind::Broadcast => EffectTarget::Group(point.clone()),
            SignalKind::Single => {
                let receiver = UserId::new(input.user_id);
                if !self.security.has_membership(&receiver, &point) {
                    return Err(DispatchError::NotFound(format!(
                        "{receiver} is not a member of {point}"
                    )));
                }
                EffectTarget::User(receiver)
            }
        };

        let packet = if input.temp {
            None
        } else {
            let mut meta = PointMeta::load(trx, &point)?;
            meta.signal_count += 1;
            let packet = Packet {
                id: format!("{point}:{}", meta.signal_count),
                point_id: point.clone(),
                user_id: sender.clone(),
                data: input.data.clone(),
            };
            meta.last_packet = Some(packet.id.clone());
            trx.store("Packet", &packet.id, &packet)?;
            meta.save(trx, &point)?;
            Some(packet)
        };

        let update = serde_json::json!({
            "action": input.kind.as_str(),
            "pointId": point,
            "userId": sender,
            "data": input.data,
            "packetId": packet.as_ref().map(|p| p.id.clone()),
            "isTemp": input.temp,
        });

        Ok(SignalOutput {
            passed: true,
            packet,
            route: Some((target, update)),
        })
    }

    fn effect(&self, _ctx: &ActionContext, output: &SignalOutput) -> Option<SignalEffect> {
        let (target, update) = output.route.clone()?;
        let effect = match target {
            EffectTarget::Group(point) => SignalEffect::to_group("points/signal", point, update),
            EffectTarget::User(user) => SignalEffect::to_user("points/signal", user, update),
        };
        Some(effect.packed())
    }
}
