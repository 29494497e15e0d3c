use shared_types::{GroupId, UserId};

use crate::domain::{DeliveryReport, SignalError};

/// What the dispatch pipeline and the consensus bridge need from the
/// signaler.
pub trait SignalPort: Send + Sync {
    /// Deliver to one subject. `Ok(false)` when the subject is offline.
    fn signal_user(
        &self,
        key: &str,
        user: &UserId,
        payload: &serde_json::Value,
    ) -> Result<bool, SignalError>;

    /// Deliver to every current member of `group` not listed in `exceptions`.
    fn signal_group(
        &self,
        key: &str,
        group: &GroupId,
        payload: &serde_json::Value,
        pack: bool,
        exceptions: &[UserId],
    ) -> Result<DeliveryReport, SignalError>;
}
