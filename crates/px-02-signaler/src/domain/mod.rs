pub mod delivery;
pub mod envelope;
pub mod errors;
pub mod group;
pub mod listener;

pub use delivery::DeliveryReport;
pub use envelope::{CallInput, CrossProcessCall, PointRef, SignalEnvelope, UserRef};
pub use errors::SignalError;
pub use group::{BoundListener, Group};
pub use listener::{Listener, SignalMessage};
