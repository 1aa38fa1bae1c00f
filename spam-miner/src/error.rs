//! Miner error types.

use thiserror::Error;

use crate::gateway::GatewayError;

#[derive(Error, Debug)]
pub enum MinerError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Rotator(#[from] RotatorError),

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error("Stats decode failed: {reason}")]
    StatsDecode { reason: String },

    #[error("Miner is {state}, cannot {operation}")]
    InvalidState { state: String, operation: String },
}

/// Rotation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RotatorError {
    #[error("No active endpoints remain in the pool")]
    NoActiveEndpoints,

    #[error("Endpoint pool is empty")]
    EmptyPool,
}

/// Classifier invariant violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("Counter {id} is at epoch {counter_epoch}, ahead of ledger epoch {ledger_epoch}")]
    EpochAhead {
        id: String,
        counter_epoch: u64,
        ledger_epoch: u64,
    },
}
