use shared_types::{DispatchError, UserId};
use thiserror::Error;

/// Errors from signal delivery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    /// The listener's receiving side is gone.
    #[error("Listener {0} is closed")]
    ListenerClosed(UserId),

    /// The sink rejected the message.
    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    /// The sink panicked while delivering.
    #[error("Listener panicked during delivery")]
    ListenerPanicked,

    /// The payload could not be encoded.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Forwarding to another node failed.
    #[error("Federation relay to {origin} failed: {reason}")]
    Federation { origin: String, reason: String },
}

impl From<serde_json::Error> for SignalError {
    fn from(e: serde_json::Error) -> Self {
        SignalError::Encoding(e.to_string())
    }
}

impl From<SignalError> for DispatchError {
    fn from(e: SignalError) -> Self {
        DispatchError::Internal(e.to_string())
    }
}
