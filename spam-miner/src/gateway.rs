//! Ledger gateway boundary.
//!
//! Everything the miner knows about the ledger crosses this trait: queries,
//! read-only simulation, transaction submission, and settlement waits. Wire
//! encoding and signing live behind it, supplied by the surrounding
//! application together with the identity they belong to.
//!
//! Failures cross the boundary as structured [`GatewayError`] values. Nodes
//! that only return free-form error text are handled by one compatibility
//! shim, [`GatewayErrorKind::from_legacy_text`]; nothing else in the crate
//! matches on error strings.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{CallSpec, Counter, ExecutionResult, ObjectRef, TxId, TxRequest};

/// Structured failure classes at the gateway boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    /// Node did not answer in time; submission may or may not have landed.
    Timeout,
    /// Submission accepted but finality not yet observed.
    NotFinalized,
    /// A referenced object is unknown or not yet available on this node.
    ObjectNotFound,
    /// The identity holds no usable gas coins.
    NoGasCoins,
    /// Gas coin exists but cannot cover the transaction.
    BalanceTooLow,
    /// On-ledger call rejected because the epoch rolled over.
    WrongEpoch,
    /// Quorum/finality failure; retrying risks duplicate submission.
    ConsensusFailure,
    /// Transport-level fetch failure.
    Network,
    /// Anything the node reported that fits no known class.
    Other,
}

impl GatewayErrorKind {
    /// Compatibility shim mapping legacy free-text node errors to
    /// structured kinds. Isolated here; callers never pattern-match text.
    pub fn from_legacy_text(text: &str) -> Self {
        let text = text.to_lowercase();

        if text.contains("wrong epoch") || text.contains("epoch mismatch") {
            GatewayErrorKind::WrongEpoch
        } else if text.contains("no valid gas coins") || text.contains("balance too low") {
            GatewayErrorKind::NoGasCoins
        } else if text.contains("could not find the referenced object")
            || text.contains("not available for consumption")
            || text.contains("object not found")
        {
            GatewayErrorKind::ObjectNotFound
        } else if text.contains("timeout") || text.contains("timed out") {
            GatewayErrorKind::Timeout
        } else if text.contains("quorum")
            || text.contains("equivocat")
            || text.contains("finality")
        {
            GatewayErrorKind::ConsensusFailure
        } else if text.contains("failed to fetch")
            || text.contains("connection")
            || text.contains("network")
        {
            GatewayErrorKind::Network
        } else {
            GatewayErrorKind::Other
        }
    }
}

/// Error value produced by every gateway operation.
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {context}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub context: String,
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, context: impl Into<String>) -> Self {
        Self {
            kind,
            context: context.into(),
        }
    }

    /// Build an error from legacy node text via the compatibility shim.
    pub fn from_legacy_text(text: impl Into<String>) -> Self {
        let context = text.into();
        Self {
            kind: GatewayErrorKind::from_legacy_text(&context),
            context,
        }
    }

    /// True for the narrow class the transaction client may retry:
    /// node timeouts and pending-finality responses.
    pub fn is_retryable_submission(&self) -> bool {
        matches!(
            self.kind,
            GatewayErrorKind::Timeout | GatewayErrorKind::NotFinalized
        )
    }
}

/// Interface to one ledger endpoint.
///
/// Queries return the first page of results only; the miner assumes a
/// single coherent resource set per identity.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Counters owned by `owner` (first page).
    async fn query_owned_counters(&self, owner: &str) -> Result<Vec<Counter>, GatewayError>;

    async fn latest_epoch(&self) -> Result<u64, GatewayError>;

    /// Read-only simulated execution. `None` means the call produced no
    /// return value.
    async fn simulate_call(&self, spec: &CallSpec) -> Result<Option<Vec<u8>>, GatewayError>;

    /// Encode, sign, and submit one transaction, returning its settled
    /// execution result. A logical on-chain failure is an `Ok` result with
    /// a failure status, not an `Err`.
    async fn submit_transaction(&self, request: &TxRequest)
        -> Result<ExecutionResult, GatewayError>;

    /// Block until the given transaction's effects are finalized.
    async fn wait_for_settlement(&self, tx_id: &TxId) -> Result<(), GatewayError>;

    async fn reference_gas_price(&self) -> Result<u64, GatewayError>;

    /// Freshest gas coin reference owned by `owner`.
    async fn fetch_gas_coin(&self, owner: &str) -> Result<ObjectRef, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_text_shim() {
        let cases = [
            ("abort: wrong epoch for counter", GatewayErrorKind::WrongEpoch),
            ("No valid gas coins found for the transaction", GatewayErrorKind::NoGasCoins),
            ("Could not find the referenced object 0x1 at version 7", GatewayErrorKind::ObjectNotFound),
            ("request timed out after 30s", GatewayErrorKind::Timeout),
            ("failed to reach quorum of validators", GatewayErrorKind::ConsensusFailure),
            ("Failed to fetch from node", GatewayErrorKind::Network),
            ("some novel node error", GatewayErrorKind::Other),
        ];

        for (text, expected) in cases {
            assert_eq!(GatewayErrorKind::from_legacy_text(text), expected, "{text}");
        }
    }

    #[test]
    fn test_retryable_submission_is_narrow() {
        let retryable = [GatewayErrorKind::Timeout, GatewayErrorKind::NotFinalized];
        let terminal = [
            GatewayErrorKind::ObjectNotFound,
            GatewayErrorKind::NoGasCoins,
            GatewayErrorKind::BalanceTooLow,
            GatewayErrorKind::WrongEpoch,
            GatewayErrorKind::ConsensusFailure,
            GatewayErrorKind::Network,
            GatewayErrorKind::Other,
        ];

        for kind in retryable {
            assert!(GatewayError::new(kind, "x").is_retryable_submission());
        }
        for kind in terminal {
            assert!(!GatewayError::new(kind, "x").is_retryable_submission());
        }
    }
}
