//! Spam orchestrator.
//!
//! The top-level cycle state machine. Each cycle rotates the endpoint if
//! due, re-derives the counter set when the cache is stale, picks exactly
//! one action by priority, submits it, and interprets the outcome through
//! the failure-classification policy. One action per cycle bounds latency
//! and keeps error handling uniform.
//!
//! The loop is strictly sequential: cycle N+1 never starts before cycle N
//! (including its sleeps) completes, because one identity owns exactly one
//! coherent resource set and one gas-paying reference. Cancellation is
//! cooperative and observed at cycle boundaries only.

use anyhow::Result;
use async_trait::async_trait;
use core_logic::{MinerMode, SpammerStats, SpammerTrait};
use tokio_util::sync::CancellationToken;

use crate::classifier::classify;
use crate::config::CyclePolicy;
use crate::error::MinerError;
use crate::events::{EventLevel, EventSink, SpamEvent, TracingSink};
use crate::gateway::{GatewayError, GatewayErrorKind};
use crate::rotator::EndpointRotator;
use crate::types::{
    CounterSet, ExecutionResult, ExecutionStatus, ObjectId, ObjectRef, TxId, ABORT_WRONG_EPOCH,
};

pub const DEFAULT_ROTATION_THRESHOLD: u32 = 20;

/// Lifecycle state of one miner instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinerStatus {
    Stopped,
    Running,
    Stopping,
}

impl std::fmt::Display for MinerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MinerStatus::Stopped => write!(f, "stopped"),
            MinerStatus::Running => write!(f, "running"),
            MinerStatus::Stopping => write!(f, "stopping"),
        }
    }
}

/// Failure classes driving the per-cycle policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorClass {
    /// Benign epoch rollover; cool down and re-derive state.
    EpochRollover,
    /// Identity cannot pay for transactions; fatal.
    OutOfFunds,
    /// This endpoint has not caught up; penalize it and refetch.
    EndpointLag,
    /// Transport failure; penalize and refetch with a longer pause.
    Network,
    /// Finality/quorum failure; retrying risks duplicate submission. Fatal.
    Consensus,
    /// Everything else; penalized retry, always logged.
    Unexpected,
}

/// The one action selected for a cycle, by priority.
#[derive(Debug, Clone)]
enum CycleAction {
    Delete(Vec<ObjectRef>),
    Claim(Vec<ObjectRef>),
    Register(ObjectRef),
    Create,
    Increment { id: ObjectId, reference: ObjectRef },
}

impl std::fmt::Display for CycleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleAction::Delete(refs) => write!(f, "delete {} counter(s)", refs.len()),
            CycleAction::Claim(refs) => write!(f, "claim {} counter(s)", refs.len()),
            CycleAction::Register(r) => write!(f, "register counter {}", r.id),
            CycleAction::Create => write!(f, "create counter"),
            CycleAction::Increment { id, .. } => write!(f, "increment counter {}", id),
        }
    }
}

pub struct Spammer {
    rotator: EndpointRotator,
    mode: MinerMode,
    policy: CyclePolicy,
    rotation_threshold: u32,
    events: Box<dyn EventSink>,

    status: MinerStatus,
    refetch_required: bool,
    txs_since_rotation: u32,
    last_tx_id: Option<TxId>,
    counters: Option<CounterSet>,
    stats: SpammerStats,

    stop_signal: CancellationToken,
}

impl Spammer {
    pub fn new(rotator: EndpointRotator, mode: MinerMode) -> Self {
        Self {
            rotator,
            mode,
            policy: CyclePolicy::default(),
            rotation_threshold: DEFAULT_ROTATION_THRESHOLD,
            events: Box::new(TracingSink),
            status: MinerStatus::Stopped,
            refetch_required: true,
            txs_since_rotation: 0,
            last_tx_id: None,
            counters: None,
            stats: SpammerStats::default(),
            stop_signal: CancellationToken::new(),
        }
    }

    pub fn with_policy(mut self, policy: CyclePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_rotation_threshold(mut self, threshold: u32) -> Self {
        self.rotation_threshold = threshold.max(1);
        self
    }

    pub fn with_event_sink(mut self, sink: Box<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    pub fn status(&self) -> MinerStatus {
        self.status
    }

    pub fn refetch_required(&self) -> bool {
        self.refetch_required
    }

    pub fn counter_set(&self) -> Option<&CounterSet> {
        self.counters.as_ref()
    }

    pub fn last_tx_id(&self) -> Option<&TxId> {
        self.last_tx_id.as_ref()
    }

    pub fn stats(&self) -> &SpammerStats {
        &self.stats
    }

    /// The cycle loop. An explicit loop with one exit check per iteration;
    /// cycles never reschedule themselves recursively, so call depth stays
    /// flat over arbitrarily long sessions.
    async fn run_loop(&mut self, token: &CancellationToken) -> Result<SpammerStats> {
        if self.status != MinerStatus::Stopped {
            return Err(MinerError::InvalidState {
                state: self.status.to_string(),
                operation: "start".to_string(),
            }
            .into());
        }

        self.status = MinerStatus::Running;
        self.emit(EventLevel::Info, "Miner started".to_string());

        loop {
            // Cancellation is observed here, at the cycle boundary.
            if self.status == MinerStatus::Running
                && (token.is_cancelled() || self.stop_signal.is_cancelled())
            {
                self.status = MinerStatus::Stopping;
                self.emit(EventLevel::Info, "Stop requested".to_string());
            }

            if self.status == MinerStatus::Stopping {
                // A stopping cycle always resolves to stopped and re-arms
                // refetch so a future start re-derives truth.
                self.refetch_required = true;
                self.status = MinerStatus::Stopped;
                self.emit(EventLevel::Info, "Miner stopped".to_string());
                break;
            }

            self.run_cycle().await;

            let keep_going = match self.mode {
                MinerMode::Loop => self.status == MinerStatus::Running,
                MinerMode::OneShot => {
                    self.status == MinerStatus::Running && self.pending_maintenance()
                }
            };
            if keep_going {
                continue;
            }

            if self.status == MinerStatus::Running {
                // Natural completion (one-off work drained): one final
                // refetch so external observers see settled state.
                self.status = MinerStatus::Stopped;
                if let Err(e) = self.refetch().await {
                    self.emit(EventLevel::Warn, format!("Final refetch failed: {e}"));
                }
                // Re-arm so a future start re-derives truth.
                self.refetch_required = true;
                self.emit(EventLevel::Info, "Miner stopped: work drained".to_string());
                break;
            }
            // Status is Stopping; loop back to resolve it to Stopped.
        }

        Ok(self.stats.clone())
    }

    /// One cycle: rotate if due, refetch if stale, run one action.
    async fn run_cycle(&mut self) {
        // 1. Endpoint rotation
        if self.txs_since_rotation >= self.rotation_threshold {
            match self.rotator.next() {
                Ok(client) => {
                    let msg = format!("Rotated to endpoint {}", client.endpoint_url());
                    self.emit(EventLevel::Info, msg);
                    self.txs_since_rotation = 0;
                    self.pause(self.policy.warmup_ms).await;
                }
                Err(e) => {
                    self.emit(
                        EventLevel::Error,
                        format!("Rotation FAILED: {e}; stopping"),
                    );
                    self.status = MinerStatus::Stopping;
                    return;
                }
            }
        }

        // 2. Re-derive the counter set when the cache may be stale
        if self.refetch_required {
            if let Err(e) = self.refetch().await {
                self.stats.failed += 1;
                let class = classify_error(&e);
                self.emit(EventLevel::Warn, format!("Refetch failed: {e}"));
                self.apply_policy(class, &e.to_string()).await;
                return;
            }
        }

        // 3. Exactly one action per cycle, by priority
        let Some(action) = self.choose_action() else {
            self.emit(EventLevel::Debug, "No action available".to_string());
            return;
        };
        self.emit(EventLevel::Debug, format!("Next action: {action}"));

        // Settle the previous transaction before the next mutating call:
        // two in-flight writes to the same owned resource set would risk
        // equivocation.
        if let Some(tx_id) = self.last_tx_id.clone() {
            if let Err(e) = self.rotator.current().wait_for_settlement(&tx_id).await {
                self.stats.failed += 1;
                let class = classify_error(&e);
                self.emit(
                    EventLevel::Warn,
                    format!("Settlement wait failed for {tx_id}: {e}"),
                );
                self.apply_policy(class, &e.to_string()).await;
                return;
            }
        }

        // 4. Execute and interpret
        match self.execute_action(&action).await {
            Ok(result) => match result.status.clone() {
                ExecutionStatus::Success => self.apply_success(&action, &result).await,
                ExecutionStatus::Failure { code, message } => {
                    // The transaction settled but the on-chain call aborted;
                    // gas was spent and the tx id is real.
                    self.stats.failed += 1;
                    self.txs_since_rotation += 1;
                    self.last_tx_id = Some(result.tx_id.clone());
                    let class = classify_execution_failure(code, &message);
                    self.emit(
                        EventLevel::Warn,
                        format!("{action} FAILED on-chain: {message}"),
                    );
                    self.apply_policy(class, &message).await;
                }
            },
            Err(e) => {
                self.stats.failed += 1;
                let class = classify_error(&e);
                self.emit(EventLevel::Warn, format!("{action} FAILED: {e}"));
                self.apply_policy(class, &e.to_string()).await;
            }
        }
    }

    /// Priority: delete pending duplicates > claim eligible rewards >
    /// register the prior-epoch counter > (loop mode) create-or-increment.
    fn choose_action(&self) -> Option<CycleAction> {
        let set = self.counters.as_ref()?;

        if !set.delete.is_empty() {
            let refs = set.delete.iter().map(|c| c.reference.clone()).collect();
            return Some(CycleAction::Delete(refs));
        }
        if !set.claim.is_empty() {
            let refs = set.claim.iter().map(|c| c.reference.clone()).collect();
            return Some(CycleAction::Claim(refs));
        }
        if let Some(register) = &set.register {
            if !register.registered {
                return Some(CycleAction::Register(register.reference.clone()));
            }
        }
        if self.mode == MinerMode::Loop {
            return Some(match &set.current {
                Some(current) => CycleAction::Increment {
                    id: current.id.clone(),
                    reference: current.reference.clone(),
                },
                None => CycleAction::Create,
            });
        }
        None
    }

    async fn execute_action(
        &mut self,
        action: &CycleAction,
    ) -> Result<ExecutionResult, MinerError> {
        let client = self.rotator.current_mut();
        match action {
            CycleAction::Delete(refs) => client.delete_counters(refs).await,
            CycleAction::Claim(refs) => client.claim_counters(refs).await,
            CycleAction::Register(counter) => client.register_counter(counter).await,
            CycleAction::Create => client.create_counter().await,
            CycleAction::Increment { reference, .. } => {
                client.increment_counter(reference).await
            }
        }
    }

    async fn apply_success(&mut self, action: &CycleAction, result: &ExecutionResult) {
        self.stats.success += 1;
        self.txs_since_rotation += 1;
        self.last_tx_id = Some(result.tx_id.clone());
        self.rotator.record_success();

        match action {
            CycleAction::Increment { id, .. } => {
                // Hot path: exactly this counter is known to have mutated,
                // so patch the cache from the result instead of refetching.
                if self.patch_current_counter(id, result) {
                    let total = self
                        .counters
                        .as_ref()
                        .and_then(|s| s.current.as_ref())
                        .map(|c| c.tx_count)
                        .unwrap_or_default();
                    self.emit(
                        EventLevel::Debug,
                        format!("Success: incremented counter {id} (tx count {total})"),
                    );
                } else {
                    // The mutated-object list did not contain the counter.
                    // Modeled as an explicit not-found, not an assumption.
                    let err = GatewayError::new(
                        GatewayErrorKind::ObjectNotFound,
                        format!("counter {id} missing from mutated-object set of {}", result.tx_id),
                    );
                    self.emit(EventLevel::Warn, format!("Increment fast-path FAILED: {err}"));
                    self.apply_policy(classify_error(&err.into()), "mutated set mismatch")
                        .await;
                }
            }
            CycleAction::Claim(refs) => {
                self.stats.claimed += refs.len() as u64;
                self.refetch_required = true;
                self.emit(
                    EventLevel::Info,
                    format!("Success: claimed {} counter(s) (tx {})", refs.len(), result.tx_id),
                );
            }
            other => {
                // The owned resource set changed; the cache is stale.
                self.refetch_required = true;
                self.emit(
                    EventLevel::Info,
                    format!("Success: {other} (tx {})", result.tx_id),
                );
            }
        }
    }

    /// Replace the cached current counter's reference with the one found in
    /// the execution result's mutated list. Returns false when the list has
    /// no entry for the counter.
    fn patch_current_counter(&mut self, id: &ObjectId, result: &ExecutionResult) -> bool {
        let Some(new_ref) = result.mutated.iter().find(|r| &r.id == id) else {
            return false;
        };
        let Some(current) = self.counters.as_mut().and_then(|s| s.current.as_mut()) else {
            return false;
        };
        current.tx_count += 1;
        current.reference = new_ref.clone();
        true
    }

    async fn apply_policy(&mut self, class: ErrorClass, detail: &str) {
        match class {
            ErrorClass::EpochRollover => {
                self.emit(
                    EventLevel::Info,
                    format!("Epoch rollover ({detail}); cooling down"),
                );
                self.refetch_required = true;
                self.pause(self.policy.epoch_cooldown_ms).await;
            }
            ErrorClass::OutOfFunds => {
                self.emit(
                    EventLevel::Error,
                    format!("Out of funds ({detail}); stopping"),
                );
                self.status = MinerStatus::Stopping;
            }
            ErrorClass::Consensus => {
                self.emit(
                    EventLevel::Error,
                    format!("Consensus failure ({detail}); stopping"),
                );
                self.status = MinerStatus::Stopping;
            }
            ErrorClass::EndpointLag => {
                self.emit(
                    EventLevel::Warn,
                    format!("Endpoint lag ({detail}); penalizing endpoint"),
                );
                self.penalize_endpoint();
                self.refetch_required = true;
                self.pause(self.policy.lag_ms).await;
            }
            ErrorClass::Network => {
                self.emit(EventLevel::Warn, format!("Network failure ({detail})"));
                self.penalize_endpoint();
                self.refetch_required = true;
                self.pause(self.policy.network_ms).await;
            }
            ErrorClass::Unexpected => {
                self.emit(EventLevel::Warn, format!("Unexpected failure ({detail})"));
                self.penalize_endpoint();
                self.refetch_required = true;
                self.pause(self.policy.unexpected_ms).await;
            }
        }
    }

    /// Inflate the rotation counter so the next rotation comes sooner, flag
    /// the failure to the rotator's health policy, and drop the gas cache
    /// in case the failure left it stale.
    fn penalize_endpoint(&mut self) {
        self.txs_since_rotation = self
            .txs_since_rotation
            .saturating_add(self.policy.rotation_penalty);
        self.rotator.record_failure();
        self.rotator.current_mut().invalidate_gas();
    }

    /// Re-derive the counter set from the current endpoint.
    async fn refetch(&mut self) -> Result<(), MinerError> {
        let client = self.rotator.current();
        let epoch = client.latest_epoch().await?;
        let counters = client.fetch_owned_counters().await?;
        let set = classify(counters, epoch)?;

        self.emit(
            EventLevel::Debug,
            format!("Refetched: epoch {epoch}, {} counter(s)", set.len()),
        );
        self.counters = Some(set);
        self.refetch_required = false;
        Ok(())
    }

    fn pending_maintenance(&self) -> bool {
        self.refetch_required
            || self
                .counters
                .as_ref()
                .is_none_or(|set| set.has_maintenance_work())
    }

    async fn pause(&self, ms: u64) {
        if ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
        }
    }

    fn emit(&self, level: EventLevel, message: String) {
        // Synchronous by design: a slow sink stalls the cycle loop.
        self.events.emit(&SpamEvent::new(level, message));
    }
}

#[async_trait]
impl SpammerTrait for Spammer {
    async fn start(&mut self, cancellation_token: CancellationToken) -> Result<SpammerStats> {
        self.run_loop(&cancellation_token).await
    }

    fn stop(&self) {
        self.stop_signal.cancel();
    }
}

/// Map a propagated error to its policy class. The single place failures
/// are interpreted; checked in the same order the policy table lists them.
fn classify_error(error: &MinerError) -> ErrorClass {
    match error {
        MinerError::Gateway(gateway) => {
            let kind = match gateway.kind {
                // Unrecognized structured kind: run the legacy text shim
                // once before giving up.
                GatewayErrorKind::Other => GatewayErrorKind::from_legacy_text(&gateway.context),
                kind => kind,
            };
            match kind {
                GatewayErrorKind::WrongEpoch => ErrorClass::EpochRollover,
                GatewayErrorKind::NoGasCoins | GatewayErrorKind::BalanceTooLow => {
                    ErrorClass::OutOfFunds
                }
                GatewayErrorKind::ObjectNotFound => ErrorClass::EndpointLag,
                GatewayErrorKind::Network | GatewayErrorKind::Timeout => ErrorClass::Network,
                GatewayErrorKind::ConsensusFailure | GatewayErrorKind::NotFinalized => {
                    ErrorClass::Consensus
                }
                GatewayErrorKind::Other => ErrorClass::Unexpected,
            }
        }
        _ => ErrorClass::Unexpected,
    }
}

/// Classify a settled transaction whose on-chain call aborted.
fn classify_execution_failure(code: Option<u64>, message: &str) -> ErrorClass {
    if code == Some(ABORT_WRONG_EPOCH) {
        return ErrorClass::EpochRollover;
    }
    match GatewayErrorKind::from_legacy_text(message) {
        GatewayErrorKind::WrongEpoch => ErrorClass::EpochRollover,
        GatewayErrorKind::NoGasCoins | GatewayErrorKind::BalanceTooLow => ErrorClass::OutOfFunds,
        _ => ErrorClass::Unexpected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway_err(kind: GatewayErrorKind) -> MinerError {
        GatewayError::new(kind, "test").into()
    }

    #[test]
    fn test_classification_order() {
        assert_eq!(
            classify_error(&gateway_err(GatewayErrorKind::WrongEpoch)),
            ErrorClass::EpochRollover
        );
        assert_eq!(
            classify_error(&gateway_err(GatewayErrorKind::NoGasCoins)),
            ErrorClass::OutOfFunds
        );
        assert_eq!(
            classify_error(&gateway_err(GatewayErrorKind::ObjectNotFound)),
            ErrorClass::EndpointLag
        );
        assert_eq!(
            classify_error(&gateway_err(GatewayErrorKind::Network)),
            ErrorClass::Network
        );
        assert_eq!(
            classify_error(&gateway_err(GatewayErrorKind::ConsensusFailure)),
            ErrorClass::Consensus
        );
    }

    #[test]
    fn test_legacy_text_reaches_classification() {
        let err: MinerError =
            GatewayError::new(GatewayErrorKind::Other, "No valid gas coins for payment").into();
        assert_eq!(classify_error(&err), ErrorClass::OutOfFunds);
    }

    #[test]
    fn test_unrecognized_code_is_unexpected() {
        assert_eq!(
            classify_execution_failure(Some(999), "abort code 999"),
            ErrorClass::Unexpected
        );
    }

    #[test]
    fn test_wrong_epoch_abort_code() {
        assert_eq!(
            classify_execution_failure(Some(ABORT_WRONG_EPOCH), "abort"),
            ErrorClass::EpochRollover
        );
    }
}
