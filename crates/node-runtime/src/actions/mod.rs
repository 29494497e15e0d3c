//! # Built-in Actions
//!
//! Every action a stock node serves, registered through one explicit
//! builder call. Adding an action means adding a line to
//! [`builtin_registry`]; a duplicate key fails the build of the registry.
//!
//! | Key            | Guard          | Mode      |
//! |----------------|----------------|-----------|
//! | `textMessage`  | group member   | off-chain |
//! | `signalPoint`  | group member   | off-chain |
//! | `runApplet`    | group member   | off-chain |
//! | `putNote`      | user           | on-chain  |
//! | `getNote`      | open           | query     |

pub mod applets;
pub mod messages;
pub mod notes;
pub mod points;

use px_03_dispatch::{ActionRegistry, RegistryError, SecurityPort};
use px_05_sandbox_ipc::SandboxBridge;
use std::sync::Arc;

pub use applets::RunApplet;
pub use messages::{Message, TextMessage};
pub use notes::{GetNote, Note, PutNote};
pub use points::{PointMeta, SignalPoint};

pub fn builtin_registry(
    security: Arc<dyn SecurityPort>,
    sandbox: Arc<SandboxBridge>,
) -> Result<ActionRegistry, RegistryError> {
    Ok(ActionRegistry::builder()
        .register(TextMessage)?
        .register(SignalPoint::new(security))?
        .register(RunApplet::new(sandbox))?
        .register(PutNote)?
        .register(GetNote)?
        .build())
}
