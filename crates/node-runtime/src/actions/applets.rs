//! `runApplet`: forward a member's request into a sandboxed machine and
//! return the machine's JSON reply.

use async_trait::async_trait;
use px_01_state_store::Trx;
use px_02_signaler::CrossProcessCall;
use px_03_dispatch::{Action, ActionContext, Guard, Targets};
use px_05_sandbox_ipc::SandboxBridge;
use serde::Deserialize;
use shared_types::{DispatchError, GroupId, UserId};
use std::sync::Arc;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAppletInput {
    pub machine_id: String,
    pub point_id: String,
    /// Key the applet dispatches on, e.g. `textMessage`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Free-form payload; objects are passed on as their JSON text.
    #[serde(default)]
    pub data: serde_json::Value,
}

pub struct RunApplet {
    sandbox: Arc<SandboxBridge>,
}

impl RunApplet {
    pub fn new(sandbox: Arc<SandboxBridge>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Action for RunApplet {
    type Input = RunAppletInput;
    type Output = serde_json::Value;

    fn key(&self) -> &'static str {
        "runApplet"
    }

    fn guard(&self) -> Guard {
        Guard::group_member()
    }

    fn targets(&self, input: &RunAppletInput) -> Targets {
        Targets::group(GroupId::new(input.point_id.clone()))
    }

    fn validate(&self, input: &RunAppletInput) -> Result<(), String> {
        if input.machine_id.is_empty() || input.kind.is_empty() {
            return Err("machineId and type are required".into());
        }
        Ok(())
    }

    async fn handle(
        &self,
        ctx: &ActionContext,
        _trx: &mut dyn Trx,
        input: RunAppletInput,
    ) -> Result<serde_json::Value, DispatchError> {
        let data = match input.data {
            serde_json::Value::String(text) => text,
            serde_json::Value::Null => "{}".to_string(),
            other => other.to_string(),
        };
        let call = CrossProcessCall::for_point(
            input.kind,
            GroupId::new(input.point_id),
            ctx.caller.user_id.clone(),
            data,
        );
        let machine = UserId::new(input.machine_id);
        Ok(self.sandbox.call_applet(&machine, &call).await?)
    }
}
