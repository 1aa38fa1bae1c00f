//! Lifecycle events.
//!
//! The orchestrator emits one event for every decision, retry, and state
//! transition. Emission is synchronous within the cycle: a slow sink stalls
//! the loop, so sinks must be cheap.

use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct SpamEvent {
    pub level: EventLevel,
    pub message: String,
}

impl SpamEvent {
    pub fn new(level: EventLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Receiver for miner lifecycle events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &SpamEvent);
}

/// Default sink: forwards events to `tracing` under the `cycle` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &SpamEvent) {
        match event.level {
            EventLevel::Debug => debug!(target: "cycle", "{}", event.message),
            EventLevel::Info => info!(target: "cycle", "{}", event.message),
            EventLevel::Warn => warn!(target: "cycle", "{}", event.message),
            EventLevel::Error => error!(target: "cycle", "{}", event.message),
        }
    }
}
