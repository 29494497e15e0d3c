use shared_types::DispatchError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Failed to encode chain transaction: {0}")]
    Encode(String),

    #[error("Failed to decode chain transaction: {0}")]
    Decode(String),

    #[error("Consensus layer rejected submission: {0}")]
    Submit(String),

    #[error("No commit handler registered")]
    NoCommitHandler,

    #[error("Invalid block order: {0}")]
    InvalidOrder(String),
}

impl From<BridgeError> for DispatchError {
    fn from(e: BridgeError) -> Self {
        DispatchError::Internal(e.to_string())
    }
}
