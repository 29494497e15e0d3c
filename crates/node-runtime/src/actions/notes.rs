//! Notes: a last-writer-wins document whose writes are ordered by consensus.
//!
//! `putNote` runs on-chain, so concurrent writers observe one global order
//! and every replica ends with the same revision. `getNote` is a plain read.

use async_trait::async_trait;
use px_01_state_store::{Trx, TrxExt};
use px_03_dispatch::{Action, ActionContext, ExecutionMode, Guard};
use serde::{Deserialize, Serialize};
use shared_types::{DispatchError, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub text: String,
    pub revision: u64,
    pub author: UserId,
}

impl Note {
    pub const KIND: &'static str = "Note";
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutNoteInput {
    pub note_id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutNoteOutput {
    pub note_id: String,
    pub revision: u64,
    pub text: String,
    /// Text this write replaced.
    pub previous: Option<String>,
}

pub struct PutNote;

#[async_trait]
impl Action for PutNote {
    type Input = PutNoteInput;
    type Output = PutNoteOutput;

    fn key(&self) -> &'static str {
        "putNote"
    }

    fn guard(&self) -> Guard {
        Guard::user()
    }

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::OnChain
    }

    fn validate(&self, input: &PutNoteInput) -> Result<(), String> {
        if input.note_id.is_empty() || input.note_id.contains('/') {
            return Err("noteId must be a non-empty path segment".into());
        }
        Ok(())
    }

    async fn handle(
        &self,
        ctx: &ActionContext,
        trx: &mut dyn Trx,
        input: PutNoteInput,
    ) -> Result<PutNoteOutput, DispatchError> {
        let current: Option<Note> = trx.load(Note::KIND, &input.note_id)?;
        let revision = current.as_ref().map_or(1, |note| note.revision + 1);
        let note = Note {
            text: input.text.clone(),
            revision,
            author: ctx.caller.user_id.clone(),
        };
        trx.store(Note::KIND, &input.note_id, &note)?;

        Ok(PutNoteOutput {
            note_id: input.note_id,
            revision,
            text: input.text,
            previous: current.map(|note| note.text),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetNoteInput {
    pub note_id: String,
}

pub struct GetNote;

#[async_trait]
impl Action for GetNote {
    type Input = GetNoteInput;
    type Output = Option<Note>;

    fn key(&self) -> &'static str {
        "getNote"
    }

    fn guard(&self) -> Guard {
        Guard::open()
    }

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Query
    }

    async fn handle(
        &self,
        _ctx: &ActionContext,
        trx: &mut dyn Trx,
        input: GetNoteInput,
    ) -> Result<Option<Note>, DispatchError> {
        Ok(trx.load(Note::KIND, &input.note_id)?)
    }
}
