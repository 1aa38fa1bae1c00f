//! # Core Logic - Shared Utilities for the Spam Miner
//!
//! This crate provides the ledger-agnostic plumbing used by miner
//! implementations: configuration, typed errors, logging, retry helpers,
//! and the worker runner that drives several miner instances concurrently.
//!
//! ## Modules
//!
//! - [`config`] - Configuration structures for miner setup
//! - [`error`] - Typed error handling with thiserror
//! - [`traits`] - Core trait definitions
//! - `utils` - Utility modules (logger, retry, runner)

// Module declarations - internal modules marked pub(crate)
pub mod config;
pub mod error;
pub mod traits;
pub(crate) mod utils;

// Selective exports - only public API types
pub use config::{EndpointConfig, MinerMode, SpamConfig};
pub use error::ConfigError;
pub use traits::{Spammer as SpammerTrait, SpammerStats};

// Utils are pub(crate) - only export specific public utilities
pub use utils::{setup_logger, WorkerRunner};

// Export retry utilities for testing
pub use utils::retry::{is_transient_error, with_retry, RetryConfig};
