//! # Chain Transactions
//!
//! The opaque bytes handed to the consensus layer. Encoded with `bincode`;
//! the enum tag is the discriminator decoded on commit.

use px_03_dispatch::ChainRequest;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared_types::{CorrelationId, DispatchError, ReplicaId};

use crate::domain::errors::BridgeError;

/// An on-chain request plus the routing needed to find its callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEnvelope {
    pub correlation_id: CorrelationId,
    /// Replica holding the callback.
    pub submitter: ReplicaId,
    pub request: ChainRequest,
}

/// An executor's apply result for one request.
///
/// The output travels as JSON bytes so the codec never has to handle a
/// self-describing value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorReport {
    pub correlation_id: CorrelationId,
    pub executor: ReplicaId,
    pub digest: [u8; 32],
    pub outcome: Result<Vec<u8>, DispatchError>,
}

impl ExecutorReport {
    pub fn new(
        correlation_id: CorrelationId,
        executor: ReplicaId,
        outcome: Result<Vec<u8>, DispatchError>,
    ) -> Self {
        Self {
            correlation_id,
            executor,
            digest: outcome_digest(&outcome),
            outcome,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainTransaction {
    Request(ChainEnvelope),
    ExecutorReport(ExecutorReport),
}

impl ChainTransaction {
    pub fn encode(&self) -> Result<Vec<u8>, BridgeError> {
        bincode::serialize(self).map_err(|e| BridgeError::Encode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, BridgeError> {
        bincode::deserialize(bytes).map_err(|e| BridgeError::Decode(e.to_string()))
    }

    pub fn correlation_id(&self) -> CorrelationId {
        match self {
            ChainTransaction::Request(envelope) => envelope.correlation_id,
            ChainTransaction::ExecutorReport(report) => report.correlation_id,
        }
    }
}

/// SHA-256 over a tagged rendering of an apply outcome.
pub fn outcome_digest(outcome: &Result<Vec<u8>, DispatchError>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    match outcome {
        Ok(output) => {
            hasher.update([0u8]);
            hasher.update(output);
        }
        Err(e) => {
            hasher.update([1u8]);
            hasher.update(e.code().to_le_bytes());
            hasher.update(e.to_string().as_bytes());
        }
    }
    hasher.finalize().into()
}
