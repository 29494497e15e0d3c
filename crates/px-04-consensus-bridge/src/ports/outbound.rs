//! Consensus collaborator interface.
//!
//! The ordering algorithm lives outside this crate. All the bridge needs is
//! a way to submit opaque bytes and a callback for each agreed block.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::BridgeError;

#[async_trait]
pub trait ConsensusPort: Send + Sync {
    /// Hand opaque transaction bytes to the ordering layer. Returns once the
    /// bytes are accepted, long before they are committed.
    async fn submit(&self, transaction: Vec<u8>) -> Result<(), BridgeError>;

    /// Install the handler that receives every committed block. Blocks are
    /// delivered in order and never concurrently.
    fn register_commit_handler(&self, handler: Arc<dyn CommitHandler>);
}

#[async_trait]
pub trait CommitHandler: Send + Sync {
    async fn on_commit(&self, batch: Vec<Vec<u8>>);
}
