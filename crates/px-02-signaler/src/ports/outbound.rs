use bytes::Bytes;
use shared_types::{GroupId, UserId};

use crate::domain::{SignalError, SignalMessage};

/// Receiving end of a listener. Must not block: sinks that talk to slow
/// peers queue the message and return.
pub trait SignalSink: Send + Sync {
    fn deliver(&self, message: &SignalMessage) -> Result<(), SignalError>;
}

/// Forwards signals addressed at subjects owned by another node.
pub trait FederationRelay: Send + Sync {
    fn relay_to_user(
        &self,
        origin: &str,
        key: &str,
        user: &UserId,
        payload: Bytes,
    ) -> Result<(), SignalError>;

    /// One call per remote origin; the remote node fans out to its own
    /// members of `group`.
    fn relay_to_group(
        &self,
        origin: &str,
        key: &str,
        group: &GroupId,
        payload: Bytes,
        exceptions: &[UserId],
    ) -> Result<(), SignalError>;
}

/// Notified after membership changes.
pub trait JoinObserver: Send + Sync {
    fn on_join(&self, group: &GroupId, user: &UserId);
    fn on_leave(&self, group: &GroupId, user: &UserId);
}
