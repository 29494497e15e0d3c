//! # Shared Types Crate
//!
//! Types that cross subsystem boundaries inside a Plexus node.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: identifiers, the caller identity and the
//!   `OriginPacket` envelope are defined once and reused by the dispatch
//!   pipeline, the signaler, the consensus bridge and the sandbox bridge.
//! - **Identity is derived, never trusted**: a `CallerIdentity` is produced by
//!   signature verification and is immutable for the lifetime of a request.
//! - **Stable error codes**: every subsystem error folds into `DispatchError`,
//!   whose numeric codes are part of the transport contract.

pub mod errors;
pub mod identity;
pub mod ids;
pub mod packet;
pub mod security;

pub use errors::*;
pub use identity::{CallerIdentity, CallerType};
pub use ids::{CorrelationId, GroupId, ReplicaId, UserId};
pub use packet::{OriginPacket, PacketKind};
pub use security::{sign_payload, verify_payload_signature};
