//! `textMessage`: a chat line posted to a point.
//!
//! The message is stored under the point and echoed to the other members as
//! `{"type":"textMessage","text":"echo <text>"}` on the `broadcast` key.

use async_trait::async_trait;
use px_01_state_store::{Trx, TrxExt};
use px_03_dispatch::{Action, ActionContext, Guard, SignalEffect, Targets};
use serde::{Deserialize, Serialize};
use shared_types::{DispatchError, GroupId, UserId};

use crate::actions::points::PointMeta;

const MAX_TEXT_CHARS: usize = 4096;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMessageInput {
    /// Defaults to the packet's subject when absent.
    #[serde(default)]
    pub point_id: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub point_id: GroupId,
    pub user_id: UserId,
    pub text: String,
}

impl Message {
    pub const KIND: &'static str = "Message";
}

pub struct TextMessage;

#[async_trait]
impl Action for TextMessage {
    type Input = TextMessageInput;
    type Output = Message;

    fn key(&self) -> &'static str {
        "textMessage"
    }

    fn guard(&self) -> Guard {
        Guard::group_member()
    }

    fn targets(&self, input: &TextMessageInput) -> Targets {
        input
            .point_id
            .as_ref()
            .map(|point| Targets::group(GroupId::new(point.clone())))
            .unwrap_or_default()
    }

    fn validate(&self, input: &TextMessageInput) -> Result<(), String> {
        if input.text.is_empty() {
            return Err("text must not be empty".into());
        }
        if input.text.chars().count() > MAX_TEXT_CHARS {
            return Err(format!("text exceeds {MAX_TEXT_CHARS} characters"));
        }
        Ok(())
    }

    async fn handle(
        &self,
        ctx: &ActionContext,
        trx: &mut dyn Trx,
        input: TextMessageInput,
    ) -> Result<Message, DispatchError> {
        let point = ctx
            .caller
            .group_id
            .clone()
            .ok_or_else(|| DispatchError::Validation("textMessage needs a point".into()))?;

        let mut meta = PointMeta::load(trx, &point)?;
        meta.message_count += 1;
        let message = Message {
            id: format!("{point}:{}", meta.message_count),
            point_id: point.clone(),
            user_id: ctx.caller.user_id.clone(),
            text: input.text,
        };
        trx.store(Message::KIND, &message.id, &message)?;
        meta.save(trx, &point)?;
        Ok(message)
    }

    fn effect(&self, _ctx: &ActionContext, message: &Message) -> Option<SignalEffect> {
        Some(SignalEffect::to_group(
            "broadcast",
            message.point_id.clone(),
            serde_json::json!({
                "type": "textMessage",
                "text": format!("echo {}", message.text),
            }),
        ))
    }
}
