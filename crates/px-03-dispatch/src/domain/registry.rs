//! # Action Registry
//!
//! Type-erases [`Action`] implementations so that one map can hold
//! handlers with different input and output types.
//!
//! ```text
//! bytes ──parse──→ ParsedRequest { Box<dyn Any>, Targets }
//!                        │
//!                        └─execute──→ Executed { output: Value, effect }
//! ```

use async_trait::async_trait;
use px_01_state_store::Trx;
use shared_types::DispatchError;
use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::action::{Action, ActionContext, ExecutionMode, Targets};
use crate::domain::effect::SignalEffect;
use crate::domain::guard::Guard;

/// A payload decoded into the action's input type, before any guard runs.
pub struct ParsedRequest {
    pub input: Box<dyn Any + Send>,
    pub targets: Targets,
}

impl std::fmt::Debug for ParsedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedRequest")
            .field("targets", &self.targets)
            .finish_non_exhaustive()
    }
}

/// Result of a successful handler run.
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub output: serde_json::Value,
    pub effect: Option<SignalEffect>,
}

/// Object-safe view of an [`Action`].
#[async_trait]
pub trait ErasedAction: Send + Sync {
    fn key(&self) -> &'static str;
    fn guard(&self) -> Guard;
    fn mode(&self) -> ExecutionMode;

    /// Decode and validate a raw payload. An empty payload decodes as JSON
    /// `null`.
    fn parse(&self, payload: &[u8]) -> Result<ParsedRequest, DispatchError>;

    async fn execute(
        &self,
        ctx: &ActionContext,
        trx: &mut dyn Trx,
        input: Box<dyn Any + Send>,
    ) -> Result<Executed, DispatchError>;
}

struct TypedAction<A: Action> {
    action: A,
    _marker: PhantomData<fn() -> A>,
}

#[async_trait]
impl<A: Action> ErasedAction for TypedAction<A> {
    fn key(&self) -> &'static str {
        self.action.key()
    }

    fn guard(&self) -> Guard {
        self.action.guard()
    }

    fn mode(&self) -> ExecutionMode {
        self.action.mode()
    }

    fn parse(&self, payload: &[u8]) -> Result<ParsedRequest, DispatchError> {
        let raw: &[u8] = if payload.is_empty() { b"null" } else { payload };
        let input: A::Input = serde_json::from_slice(raw).map_err(|e| {
            DispatchError::Validation(format!("invalid payload for '{}': {e}", self.action.key()))
        })?;
        self.action
            .validate(&input)
            .map_err(DispatchError::Validation)?;
        let targets = self.action.targets(&input);
        Ok(ParsedRequest {
            input: Box::new(input),
            targets,
        })
    }

    async fn execute(
        &self,
        ctx: &ActionContext,
        trx: &mut dyn Trx,
        input: Box<dyn Any + Send>,
    ) -> Result<Executed, DispatchError> {
        let input = input.downcast::<A::Input>().map_err(|_| {
            DispatchError::Internal(format!("input type mismatch for '{}'", self.action.key()))
        })?;
        let output = self.action.handle(ctx, trx, *input).await?;
        let effect = self.action.effect(ctx, &output);
        let output = serde_json::to_value(&output)
            .map_err(|e| DispatchError::Internal(format!("output encoding failed: {e}")))?;
        Ok(Executed { output, effect })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Action key '{0}' registered twice")]
    DuplicateKey(&'static str),
}

/// Immutable map from action key to handler.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<&'static str, Arc<dyn ErasedAction>>,
}

impl ActionRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn ErasedAction>> {
        self.actions.get(key).cloned()
    }

    /// Like [`ActionRegistry::get`] but an unknown key is a `NotFound`.
    pub fn resolve(&self, key: &str) -> Result<Arc<dyn ErasedAction>, DispatchError> {
        self.get(key)
            .ok_or_else(|| DispatchError::NotFound(format!("action '{key}'")))
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<&'static str> {
        let mut keys: Vec<_> = self.actions.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    actions: HashMap<&'static str, Arc<dyn ErasedAction>>,
}

impl RegistryBuilder {
    pub fn register<A: Action>(mut self, action: A) -> Result<Self, RegistryError> {
        let key = action.key();
        if self.actions.contains_key(key) {
            return Err(RegistryError::DuplicateKey(key));
        }
        self.actions.insert(
            key,
            Arc::new(TypedAction {
                action,
                _marker: PhantomData,
            }),
        );
        Ok(self)
    }

    pub fn build(self) -> ActionRegistry {
        ActionRegistry {
            actions: self.actions,
        }
    }
}
