//! Store domain: errors, keyspace layout and buffered updates.

pub mod errors;
pub mod keys;

pub use errors::StateError;
pub use keys::StateUpdate;
