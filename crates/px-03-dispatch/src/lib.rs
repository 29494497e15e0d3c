//! # px-03-dispatch
//!
//! Maps an action key to a guard and a typed handler, and runs every request
//! through the same pipeline.
//!
//! ## Pipeline
//!
//! ```text
//! OriginPacket
//!     │
//!     ├─ resolve key ──────────── unknown ─→ NotFound
//!     ├─ parse payload ────────── invalid ─→ Validation   (guard never runs)
//!     ├─ verify signature ─────── forged  ─→ Authorization
//!     ├─ replay check ─────────── repeat  ─→ Validation   (verified callers only)
//!     ├─ guard ────────────────── deny    ─→ Authorization (no trx opened)
//!     │
//!     ├─ Query     → read-only trx → handler → close
//!     ├─ OffChain  → write trx → handler → commit | discard
//!     └─ OnChain   → ChainSubmitter::submit → await commit (timeout, cancel)
//!     │
//!     └─ response + signal effect (caller excluded unless echo)
//! ```
//!
//! Sandbox packets enter through [`Dispatcher::dispatch_from_sandbox`]: the
//! caller is the owning machine and only on-chain actions are accepted.
//!
//! Actions are registered once, through [`RegistryBuilder`], before the node
//! starts serving. The registry is immutable afterwards.

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::*;
pub use ports::*;
pub use service::{DispatchResponse, Dispatcher};
