//! # px-01-state-store
//!
//! Transactional key/value object store consumed by the dispatch pipeline.
//!
//! ## Role in System
//!
//! - **Off-chain execution**: a transaction is opened per request, committed
//!   when the handler succeeds and discarded when it fails.
//! - **On-chain execution**: the consensus bridge opens one write
//!   transaction per committed chain transaction.
//!
//! ## Keyspace
//!
//! ```text
//! o/{kind}/{id}              -> JSON object
//! i/{kind}/{index}/{value}   -> object id
//! l/{from}/{name}            -> link target
//! {anything else}            -> raw bytes (put_bytes/get_bytes)
//! ```
//!
//! ## Transaction Rules
//!
//! - A read-only transaction rejects every mutation with
//!   [`StateError::ReadOnly`] instead of silently ignoring it.
//! - Writes are buffered in the transaction and applied atomically on
//!   commit. Dropping a transaction without committing discards its writes.

pub mod adapters;
pub mod domain;
pub mod ports;

pub use adapters::InMemoryStateStore;
pub use domain::*;
pub use ports::*;
