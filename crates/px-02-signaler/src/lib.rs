//! # px-02-signaler
//!
//! Best-effort, at-most-once-per-call delivery of real-time signals to a
//! single subject or to every member of a group.
//!
//! ## Delivery Model
//!
//! ```text
//! signal_group(key, g, payload, pack, exceptions)
//!        │
//!        ├── global bridge set? ──────────────→ bridge gets the whole signal
//!        │
//!        ├── snapshot members of g (read lock)
//!        │
//!        ├── bound listener? ─ override ──────→ bound listener only
//!        │                    └ no override ─→ bound listener + members
//!        │
//!        └── for each member (outside the lock):
//!              in exceptions      → skip
//!              "name@other-node"  → batched per origin → FederationRelay
//!              no listener        → skip (offline)
//!              paused             → skip
//!              otherwise          → sink.deliver(), failures isolated
//! ```
//!
//! ## Concurrency
//!
//! Listener and group maps sit behind read-write locks. A group signal works
//! on a copy of the member set taken at call time: subjects that join after
//! the copy do not receive that call, subjects that leave after it still may.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::ChannelSink;
pub use domain::*;
pub use ports::*;
pub use service::Signaler;
