pub mod inbound;
pub mod outbound;

pub use inbound::Sandbox;
pub use outbound::{AppletRequestHandler, EventHandler};
