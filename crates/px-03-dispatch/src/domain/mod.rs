pub mod action;
pub mod config;
pub mod effect;
pub mod guard;
pub mod registry;
pub mod replay;

pub use action::{Action, ActionContext, ExecutionMode, PacketOrigin, Targets};
pub use config::DispatchConfig;
pub use effect::{emit_effect, EffectTarget, SignalEffect};
pub use guard::{Guard, GuardError};
pub use registry::{ActionRegistry, ErasedAction, Executed, ParsedRequest, RegistryBuilder, RegistryError};
pub use replay::{RecentSet, ReplayCache};
