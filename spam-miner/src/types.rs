//! Core data model for the epoch-reward miner.
//!
//! The ledger is the source of truth for every type here; in-memory copies
//! are caches that must be refetched whenever on-chain state may have
//! changed.

use serde::{Deserialize, Serialize};

/// Opaque on-chain object identifier.
pub type ObjectId = String;

/// Transaction digest.
pub type TxId = String;

/// Versioned reference to an owned ledger object.
///
/// The version and digest change on every mutation, so a stale reference is
/// rejected by the ledger rather than silently double-spent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub id: ObjectId,
    pub version: u64,
    pub digest: String,
}

/// On-chain counter resource tracking one identity's transaction count and
/// registration state for a single epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub id: ObjectId,
    pub reference: ObjectRef,
    pub epoch: u64,
    pub tx_count: u64,
    pub registered: bool,
}

/// Prioritized partition of one identity's counters for a ledger epoch.
///
/// `current` and `register` are singleton slots; every input counter lands
/// in exactly one bucket.
#[derive(Debug, Clone, Default)]
pub struct CounterSet {
    pub epoch: u64,
    /// Counter accruing in the current epoch, if any.
    pub current: Option<Counter>,
    /// Prior-epoch counter awaiting (or holding) registration.
    pub register: Option<Counter>,
    /// Registered counters old enough to claim.
    pub claim: Vec<Counter>,
    /// Duplicates and dead counters to clean up.
    pub delete: Vec<Counter>,
}

impl CounterSet {
    pub fn new(epoch: u64) -> Self {
        Self {
            epoch,
            ..Default::default()
        }
    }

    /// True while delete/claim/register work remains.
    pub fn has_maintenance_work(&self) -> bool {
        !self.delete.is_empty()
            || !self.claim.is_empty()
            || self.register.as_ref().is_some_and(|c| !c.registered)
    }

    pub fn len(&self) -> usize {
        self.current.iter().count()
            + self.register.iter().count()
            + self.claim.len()
            + self.delete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cached gas-paying state for one endpoint client.
///
/// The coin is a sequential spending-account reference: it must be replaced
/// after every spend and cleared whenever staleness is possible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GasState {
    pub coin: Option<ObjectRef>,
    pub price: Option<u64>,
}

impl GasState {
    pub fn is_ready(&self) -> bool {
        self.coin.is_some() && self.price.is_some()
    }

    pub fn invalidate(&mut self) {
        self.coin = None;
        self.price = None;
    }
}

/// Abort code raised by the on-ledger counter contract when a call targets
/// a counter from a different epoch than the ledger's current one.
pub const ABORT_WRONG_EPOCH: u64 = 3;

/// Logical outcome of an executed transaction.
///
/// A submission can settle successfully at the transport level while the
/// on-chain call aborts; callers must inspect this, the client never does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Success,
    Failure {
        /// Abort code from the on-ledger contract, when decodable.
        code: Option<u64>,
        message: String,
    },
}

impl ExecutionStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionStatus::Success)
    }
}

/// Settled result of a submitted transaction.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub tx_id: TxId,
    pub status: ExecutionStatus,
    /// References of every object this transaction mutated.
    pub mutated: Vec<ObjectRef>,
    /// Post-execution reference of the gas coin that paid for it.
    pub gas_ref: ObjectRef,
}

/// Aggregate mining statistics decoded from a read-only simulated call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpamStats {
    pub epoch: u64,
    pub counters: u64,
    pub total_tx_count: u64,
    pub claimable: u64,
}

/// One action the miner can submit, carrying the object references it
/// operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxAction {
    CreateCounter,
    IncrementCounter {
        counter: ObjectRef,
    },
    RegisterCounter {
        counter: ObjectRef,
    },
    ClaimCounters {
        counters: Vec<ObjectRef>,
        destination: String,
    },
    DeleteCounters {
        counters: Vec<ObjectRef>,
    },
}

impl std::fmt::Display for TxAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxAction::CreateCounter => write!(f, "create counter"),
            TxAction::IncrementCounter { counter } => {
                write!(f, "increment counter {}", counter.id)
            }
            TxAction::RegisterCounter { counter } => write!(f, "register counter {}", counter.id),
            TxAction::ClaimCounters { counters, .. } => {
                write!(f, "claim {} counter(s)", counters.len())
            }
            TxAction::DeleteCounters { counters } => {
                write!(f, "delete {} counter(s)", counters.len())
            }
        }
    }
}

/// A fully-specified transaction handed to the gateway for encoding,
/// signing, and submission.
#[derive(Debug, Clone)]
pub struct TxRequest {
    pub sender: String,
    pub action: TxAction,
    pub gas_coin: ObjectRef,
    pub gas_price: u64,
}

/// Spec for a read-only simulated call.
#[derive(Debug, Clone)]
pub struct CallSpec {
    pub function: String,
    pub sender: String,
}
