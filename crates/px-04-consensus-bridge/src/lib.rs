//! # px-04-consensus-bridge
//!
//! Decouples the moment a caller asks for an on-chain mutation from the
//! moment the mutation is globally ordered.
//!
//! ## Flow
//!
//! ```text
//! Dispatcher ──ChainRequest──→ ConsensusBridge::submit_transaction
//!                                   │ register callback (correlation id)
//!                                   │ encode ChainTransaction (bincode)
//!                                   └→ ConsensusPort::submit ──┐
//!                                                              │ ordering
//! ConsensusBridge::on_commit(batch) ←── CommitHandler ─────────┘
//!     │ one block at a time, in block order
//!     ├─ Request         → apply on a write trx → resolve / report
//!     └─ ExecutorReport  → record; resolve when every executor agreed
//! ```
//!
//! ## Callback Lifetime
//!
//! A callback is removed exactly once: by resolution, by its waiter timing
//! out or being dropped, or by the background sweep. Resolving an id that is
//! no longer pending is a no-op.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::LocalOrderingService;
pub use domain::*;
pub use ports::*;
pub use service::{ConsensusBridge, PendingCommit};
