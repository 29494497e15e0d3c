//! Runtime adapters implementing the ports of the subsystem crates.

pub mod applet_requests;
pub mod security;

pub use applet_requests::AppletRequestRouter;
pub use security::HmacSecurity;
