//! Typed action contract.

use async_trait::async_trait;
use px_01_state_store::Trx;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_types::{CallerIdentity, DispatchError, GroupId, ReplicaId};

use crate::domain::effect::SignalEffect;
use crate::domain::guard::Guard;

/// How an action touches state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    /// Pure read on a read-only transaction.
    Query,
    /// Local mutation, committed immediately.
    OffChain,
    /// Mutation ordered by consensus and applied on commit.
    OnChain,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Query => "query",
            ExecutionMode::OffChain => "off_chain",
            ExecutionMode::OnChain => "on_chain",
        }
    }
}

/// Where a request packet entered the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketOrigin {
    /// A client transport. The caller proves its identity with a signature.
    Transport,
    /// The IPC channel of an attached sandbox. The caller is the machine that
    /// owns the channel; the packet carries no usable signature.
    Sandbox,
}

/// Group and subgroup a request addresses; the guard checks membership
/// against these.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Targets {
    pub group_id: Option<GroupId>,
    pub subgroup_id: Option<GroupId>,
}

impl Targets {
    pub fn group(group_id: GroupId) -> Self {
        Self {
            group_id: Some(group_id),
            subgroup_id: None,
        }
    }

    pub fn subgroup(group_id: GroupId, subgroup_id: GroupId) -> Self {
        Self {
            group_id: Some(group_id),
            subgroup_id: Some(subgroup_id),
        }
    }

    /// Fall back to the packet's subject when the input names no group.
    pub fn or_subject(mut self, subject: &str) -> Self {
        if self.group_id.is_none() && !subject.is_empty() {
            self.group_id = Some(GroupId::new(subject));
        }
        self
    }
}

/// What a handler knows about the request it serves.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub caller: CallerIdentity,
    pub request_id: String,
    pub mode: ExecutionMode,
    /// Replica applying the action; set on the commit path only.
    pub replica: Option<ReplicaId>,
}

impl ActionContext {
    pub fn new(caller: CallerIdentity, request_id: impl Into<String>, mode: ExecutionMode) -> Self {
        Self {
            caller,
            request_id: request_id.into(),
            mode,
            replica: None,
        }
    }

    pub fn on_replica(mut self, replica: ReplicaId) -> Self {
        self.replica = Some(replica);
        self
    }
}

/// A keyed, guarded, typed handler.
///
/// Implementations are registered through
/// [`RegistryBuilder::register`](crate::RegistryBuilder::register), which
/// erases `Input`/`Output` behind JSON.
#[async_trait]
pub trait Action: Send + Sync + 'static {
    type Input: DeserializeOwned + Send + 'static;
    type Output: Serialize + Send + 'static;

    /// Registry key, unique per registry.
    fn key(&self) -> &'static str;

    fn guard(&self) -> Guard;

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::OffChain
    }

    /// Targets declared by the input. Only identifiers, never content.
    fn targets(&self, _input: &Self::Input) -> Targets {
        Targets::default()
    }

    /// Structural checks beyond what deserialization enforces.
    fn validate(&self, _input: &Self::Input) -> Result<(), String> {
        Ok(())
    }

    async fn handle(
        &self,
        ctx: &ActionContext,
        trx: &mut dyn Trx,
        input: Self::Input,
    ) -> Result<Self::Output, DispatchError>;

    /// Signal to emit after a successful execution.
    fn effect(&self, _ctx: &ActionContext, _output: &Self::Output) -> Option<SignalEffect> {
        None
    }
}
