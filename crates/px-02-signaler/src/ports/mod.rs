pub mod inbound;
pub mod outbound;

pub use inbound::SignalPort;
pub use outbound::{FederationRelay, JoinObserver, SignalSink};
