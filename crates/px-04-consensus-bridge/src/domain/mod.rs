pub mod callbacks;
pub mod config;
pub mod errors;
pub mod transaction;

pub use callbacks::{cleanup_task, CallbackOutcome, CallbackStats, CallbackTable, ResolutionPolicy};
pub use config::{BridgeConfig, ResolutionKind};
pub use errors::BridgeError;
pub use transaction::{outcome_digest, ChainEnvelope, ChainTransaction, ExecutorReport};
