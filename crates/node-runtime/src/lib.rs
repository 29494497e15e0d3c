//! # Node Runtime Library
//!
//! Wiring for a Plexus node: configuration, the process-scoped
//! [`PlatformContext`], the runtime adapters and the built-in actions. The
//! binary entry point lives in `main.rs`; integration tests build the same
//! context directly.
//!
//! ## Architectural Patterns
//!
//! - **Hexagonal Architecture**: subsystem crates define ports, this crate
//!   provides the adapters and picks the implementations.
//! - **Explicit context**: every component receives its collaborators at
//!   construction time; there are no process globals besides metrics.
//! - **Explicit registration**: actions are listed in one builder call.

#![allow(clippy::type_complexity)]

pub mod actions;
pub mod adapters;
pub mod container;

pub use container::{ConfigError, ContextError, NodeConfig, PlatformContext};
