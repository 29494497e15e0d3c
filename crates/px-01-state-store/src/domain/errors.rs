use shared_types::DispatchError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("Transaction is read-only: {operation} rejected")]
    ReadOnly { operation: &'static str },

    #[error("Object not found: {kind}/{id}")]
    ObjectNotFound { kind: String, id: String },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Commit failed: {0}")]
    CommitFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for StateError {
    fn from(e: serde_json::Error) -> Self {
        StateError::SerializationError(e.to_string())
    }
}

impl From<StateError> for DispatchError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::ObjectNotFound { .. } => DispatchError::NotFound(e.to_string()),
            other => DispatchError::State(other.to_string()),
        }
    }
}
