//! # Dispatcher
//!
//! The single entry point transports call for every inbound request.
//!
//! Ordering within one request is fixed: resolve, parse, identify, replay
//! check, guard, execute. A failure at any step short-circuits the rest,
//! so a rejected caller never causes a transaction to be opened, and request
//! ids are only recorded for callers whose identity was verified.
//!
//! Transports call [`Dispatcher::dispatch`]. The sandbox bridge calls
//! [`Dispatcher::dispatch_from_sandbox`]: there the caller is the machine
//! owning the channel, and only on-chain actions are accepted.

use px_01_state_store::{StateStore, TrxMode};
use px_02_signaler::SignalPort;
use px_telemetry::record_dispatch;
use serde::Serialize;
use shared_types::{CallerIdentity, CallerType, DispatchError, OriginPacket};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::{
    emit_effect, ActionContext, ActionRegistry, DispatchConfig, ErasedAction, ExecutionMode,
    PacketOrigin, ParsedRequest, ReplayCache,
};
use crate::ports::{ChainRequest, ChainSubmitter, SecurityPort};

/// Successful outcome of [`Dispatcher::dispatch`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResponse {
    pub request_id: String,
    pub key: String,
    #[serde(skip)]
    pub mode: ExecutionMode,
    pub output: serde_json::Value,
}

pub struct Dispatcher {
    registry: Arc<ActionRegistry>,
    store: Arc<dyn StateStore>,
    security: Arc<dyn SecurityPort>,
    signals: Arc<dyn SignalPort>,
    chain: Option<Arc<dyn ChainSubmitter>>,
    replay: Option<ReplayCache>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ActionRegistry>,
        store: Arc<dyn StateStore>,
        security: Arc<dyn SecurityPort>,
        signals: Arc<dyn SignalPort>,
        config: DispatchConfig,
    ) -> Self {
        let replay = config.replay_window().map(ReplayCache::new);
        Self {
            registry,
            store,
            security,
            signals,
            chain: None,
            replay,
            config,
        }
    }

    /// Route on-chain actions through `chain`. Without one they fail with an
    /// internal error.
    pub fn with_chain(mut self, chain: Arc<dyn ChainSubmitter>) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Run one request packet from a client transport through the pipeline.
    pub async fn dispatch(&self, packet: &OriginPacket) -> Result<DispatchResponse, DispatchError> {
        self.dispatch_with(packet, PacketOrigin::Transport).await
    }

    /// Run a packet sent by an attached sandbox. `packet.user_id` must be the
    /// machine that owns the channel; the caller vouches for that.
    pub async fn dispatch_from_sandbox(
        &self,
        packet: &OriginPacket,
    ) -> Result<DispatchResponse, DispatchError> {
        self.dispatch_with(packet, PacketOrigin::Sandbox).await
    }

    async fn dispatch_with(
        &self,
        packet: &OriginPacket,
        origin: PacketOrigin,
    ) -> Result<DispatchResponse, DispatchError> {
        let action = match self.registry.resolve(&packet.key) {
            Ok(action) => action,
            Err(e) => {
                record_dispatch("unknown", e.kind());
                return Err(e);
            }
        };
        let mode = action.mode();

        let result = self.run(action.as_ref(), packet, origin).await;
        match &result {
            Ok(_) => record_dispatch(mode.as_str(), "ok"),
            Err(e) => {
                record_dispatch(mode.as_str(), e.kind());
                warn!(
                    key = %packet.key,
                    request_id = %packet.request_id,
                    user = %packet.user_id,
                    error = %e,
                    "Dispatch failed"
                );
            }
        }

        result.map(|output| DispatchResponse {
            request_id: packet.request_id.clone(),
            key: packet.key.clone(),
            mode,
            output,
        })
    }

    /// Dispatch and wrap the outcome in a response packet.
    ///
    /// The response payload is `{"ok":true,"result":..}` or
    /// `{"ok":false,"error":{"code":..,"message":..}}`.
    pub async fn handle_packet(&self, packet: &OriginPacket) -> OriginPacket {
        self.respond(packet, self.dispatch(packet).await)
    }

    /// [`Dispatcher::handle_packet`] for packets sent by an attached sandbox.
    pub async fn handle_sandbox_packet(&self, packet: &OriginPacket) -> OriginPacket {
        self.respond(packet, self.dispatch_from_sandbox(packet).await)
    }

    fn respond(
        &self,
        packet: &OriginPacket,
        result: Result<DispatchResponse, DispatchError>,
    ) -> OriginPacket {
        let body = match result {
            Ok(response) => serde_json::json!({ "ok": true, "result": response.output }),
            Err(e) => serde_json::json!({ "ok": false, "error": e.body() }),
        };
        let bytes = serde_json::to_vec(&body).unwrap_or_default();
        packet.respond(bytes)
    }

    async fn run(
        &self,
        action: &dyn ErasedAction,
        packet: &OriginPacket,
        origin: PacketOrigin,
    ) -> Result<serde_json::Value, DispatchError> {
        let ParsedRequest { input, targets } = action.parse(&packet.payload)?;

        let caller = self.identify(action, packet, origin)?;
        if let Some(replay) = &self.replay {
            // Unverified callers never reach the cache, so a forged packet
            // cannot burn another user's request ids.
            replay.check_and_insert(&caller.user_id, &packet.request_id)?;
        }

        let targets = targets.or_subject(&packet.subject_id);
        let caller = caller.targeting(targets.group_id, targets.subgroup_id);
        action
            .guard()
            .evaluate(&caller, |user, group| self.security.has_membership(user, group))?;

        let mode = action.mode();
        debug!(key = %packet.key, user = %caller.user_id, mode = mode.as_str(), "Guard passed");

        let echo = packet.echo || self.config.echo_to_caller;

        match mode {
            ExecutionMode::Query => {
                let ctx = ActionContext::new(caller, packet.request_id.clone(), mode);
                let mut trx = self.store.begin(TrxMode::ReadOnly)?;
                let result = action.execute(&ctx, trx.as_mut(), input).await;
                trx.discard();
                let executed = result?;
                if let Some(effect) = &executed.effect {
                    emit_effect(
                        self.signals.as_ref(),
                        effect,
                        &ctx.caller.user_id,
                        echo,
                        &packet.exceptions,
                    );
                }
                Ok(executed.output)
            }
            ExecutionMode::OffChain => {
                let ctx = ActionContext::new(caller, packet.request_id.clone(), mode);
                let mut trx = self.store.begin(TrxMode::ReadWrite)?;
                let executed = match action.execute(&ctx, trx.as_mut(), input).await {
                    Ok(executed) => {
                        trx.commit()?;
                        executed
                    }
                    Err(e) => {
                        trx.discard();
                        return Err(e);
                    }
                };
                if let Some(effect) = &executed.effect {
                    emit_effect(
                        self.signals.as_ref(),
                        effect,
                        &ctx.caller.user_id,
                        echo,
                        &packet.exceptions,
                    );
                }
                Ok(executed.output)
            }
            ExecutionMode::OnChain => {
                let chain = self.chain.as_ref().ok_or_else(|| {
                    DispatchError::Internal(format!(
                        "on-chain action '{}' but no consensus bridge attached",
                        packet.key
                    ))
                })?;
                let request = ChainRequest {
                    key: packet.key.clone(),
                    caller: caller.user_id,
                    caller_type: caller.caller_type,
                    is_privileged: caller.is_privileged,
                    request_id: packet.request_id.clone(),
                    subject: packet.subject_id.clone(),
                    payload: packet.payload.clone(),
                    signature: packet.signature.clone(),
                    echo,
                    exceptions: packet.exceptions.clone(),
                };
                chain.submit(request).await
            }
        }
    }

    /// Resolve the caller from the packet's user id and signature.
    ///
    /// A bad signature only fails the request when the guard needs an
    /// authenticated caller; otherwise the caller is treated as anonymous.
    /// Sandbox packets skip the signature but must come from a registered
    /// machine and target an on-chain action.
    fn identify(
        &self,
        action: &dyn ErasedAction,
        packet: &OriginPacket,
        origin: PacketOrigin,
    ) -> Result<CallerIdentity, DispatchError> {
        if origin == PacketOrigin::Sandbox {
            if action.mode() != ExecutionMode::OnChain {
                return Err(DispatchError::Authorization(format!(
                    "machines may only submit on-chain actions, '{}' is {}",
                    packet.key,
                    action.mode().as_str()
                )));
            }
            if !self.security.is_machine(&packet.user_id) {
                return Err(DispatchError::Authorization(format!(
                    "{} is not a registered machine",
                    packet.user_id
                )));
            }
            return Ok(CallerIdentity::verified(
                packet.user_id.clone(),
                CallerType::Machine,
                false,
            ));
        }

        if packet.user_id.is_empty() {
            return Ok(CallerIdentity::anonymous());
        }

        let check = self
            .security
            .verify_signature(&packet.user_id, &packet.payload, &packet.signature);
        if check.valid {
            return Ok(CallerIdentity::verified(
                packet.user_id.clone(),
                check.caller_type,
                check.is_privileged,
            ));
        }

        if action.guard().requires_authenticated_user {
            return Err(DispatchError::Authorization(format!(
                "invalid signature for {}",
                packet.user_id
            )));
        }
        Ok(CallerIdentity::anonymous())
    }
}
