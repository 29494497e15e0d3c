//! # Error Types
//!
//! The dispatch error taxonomy. Every subsystem error (`StateError`,
//! `FrameError`, `BridgeError`, ...) converts into one of these variants
//! before it reaches a transport adapter.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable numeric error codes returned to callers.
pub mod codes {
    /// Malformed or missing input fields.
    pub const VALIDATION: i32 = 4000;
    /// Stream framing violated (oversized or malformed frame).
    pub const PROTOCOL_FRAMING: i32 = 4220;
    /// Guard failure or invalid signature.
    pub const AUTHORIZATION: i32 = 4030;
    /// Unknown action key or missing object.
    pub const NOT_FOUND: i32 = 4040;
    /// Storage failure, including a failed commit.
    pub const STATE: i32 = 5000;
    /// Unexpected internal failure.
    pub const INTERNAL: i32 = 5001;
    /// On-chain callback not resolved before its deadline.
    pub const CONSENSUS_TIMEOUT: i32 = 5040;
}

/// Classified failure of a dispatched request.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum DispatchError {
    /// Input failed structural validation. The guard never ran.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Guard rejected the caller or the signature was invalid. No mutating
    /// transaction was opened.
    #[error("Authorization error: {0}")]
    Authorization(String),

    /// Unknown action key or missing object.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage failure during execution or commit.
    #[error("State error: {0}")]
    State(String),

    /// The on-chain callback did not resolve in time.
    #[error("Consensus timeout: correlation {correlation_id} unresolved after {waited_ms}ms")]
    ConsensusTimeout { correlation_id: String, waited_ms: u64 },

    /// IPC stream framing violated.
    #[error("Protocol framing error: {0}")]
    ProtocolFraming(String),

    /// Anything that does not fit the taxonomy above.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Stable numeric code for this error.
    pub fn code(&self) -> i32 {
        match self {
            DispatchError::Validation(_) => codes::VALIDATION,
            DispatchError::Authorization(_) => codes::AUTHORIZATION,
            DispatchError::NotFound(_) => codes::NOT_FOUND,
            DispatchError::State(_) => codes::STATE,
            DispatchError::ConsensusTimeout { .. } => codes::CONSENSUS_TIMEOUT,
            DispatchError::ProtocolFraming(_) => codes::PROTOCOL_FRAMING,
            DispatchError::Internal(_) => codes::INTERNAL,
        }
    }

    /// Terminal errors are returned straight to the caller and never retried.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DispatchError::Validation(_)
                | DispatchError::Authorization(_)
                | DispatchError::NotFound(_)
        )
    }

    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Validation(_) => "validation",
            DispatchError::Authorization(_) => "authorization",
            DispatchError::NotFound(_) => "not_found",
            DispatchError::State(_) => "state",
            DispatchError::ConsensusTimeout { .. } => "consensus_timeout",
            DispatchError::ProtocolFraming(_) => "protocol_framing",
            DispatchError::Internal(_) => "internal",
        }
    }

    /// Transport body: `{"code": i32, "message": string}`.
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(e: serde_json::Error) -> Self {
        DispatchError::Validation(e.to_string())
    }
}

/// Serialized error returned to transports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: i32,
    pub message: String,
}
