//! Spam Miner - autonomous epoch-reward miner for object-owning ledgers
//!
//! Repeatedly submits low-value transactions to accrue a per-epoch reward
//! counter, registers and claims the reward once eligible, and spreads load
//! across multiple ledger endpoints for resilience.
//!
//! # Architecture
//!
//! - **[`Spammer`]**: the cycle state machine - priority policy, failure
//!   classification, backoff, and lifecycle events
//! - **[`EndpointRotator`]**: deterministic ring over the endpoint pool
//!   with gas-state transfer and a failure/cool-off health policy
//! - **[`SpamClient`]**: one transaction per action kind with gas-coin
//!   chaining and a narrow transient-submission retry
//! - **[`classify`]**: pure pass turning raw on-chain counters into a
//!   prioritized action plan
//! - **[`LedgerGateway`]**: the boundary behind which queries, signing, and
//!   submission live; supplied by the surrounding application
//!
//! # Concurrency
//!
//! One [`Spammer`] runs one strictly sequential cycle loop and owns its
//! endpoint pool outright; no locks guard per-instance state. Run several
//! instances with distinct identities via `core_logic::WorkerRunner` for
//! concurrency.
//!
//! # Quick Start
//!
//! ```bash
//! # Soak-run two miners against the in-memory simulated ledger
//! cargo run -p spam-miner --bin miner-sim -- --workers 2
//! ```

pub mod classifier;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod orchestrator;
pub mod rotator;
pub mod sim;
pub mod types;

pub use classifier::classify;
pub use client::SpamClient;
pub use config::{CyclePolicy, MinerConfig};
pub use error::{ClassifyError, MinerError, RotatorError};
pub use events::{EventLevel, EventSink, SpamEvent, TracingSink};
pub use gateway::{GatewayError, GatewayErrorKind, LedgerGateway};
pub use orchestrator::{MinerStatus, Spammer};
pub use rotator::EndpointRotator;
pub use sim::SimLedger;
pub use types::{
    CallSpec, Counter, CounterSet, ExecutionResult, ExecutionStatus, GasState, ObjectRef,
    SpamStats, TxAction, TxRequest,
};
