//! In-memory simulated ledger.
//!
//! Implements [`LedgerGateway`] over process-local state with controllable
//! epoch advancement and fault injection. Backs the `miner-sim` soak binary
//! and the integration tests; no network involved. All endpoints of one
//! miner share a single `SimLedger`, which models the real property that
//! endpoints observe a consistent ledger.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::client::encode_stats;
use crate::gateway::{GatewayError, GatewayErrorKind, LedgerGateway};
use crate::types::{
    CallSpec, Counter, ExecutionResult, ExecutionStatus, ObjectId, ObjectRef, SpamStats, TxAction,
    TxId, TxRequest, ABORT_WRONG_EPOCH,
};

const SIM_GAS_PRICE: u64 = 1_000;

pub struct SimLedger {
    owner: String,
    state: Mutex<SimState>,
}

struct SimState {
    epoch: u64,
    next_object: u64,
    next_tx: u64,
    counters: BTreeMap<ObjectId, Counter>,
    gas: ObjectRef,
    /// Total reward units paid out to claim destinations.
    claimed: u64,
    submit_faults: VecDeque<GatewayError>,
    query_faults: VecDeque<GatewayError>,
    stats_unavailable: bool,
    /// Pending increments whose result omits the counter from the mutated
    /// list, emulating a node that under-reports effects.
    mutation_dropouts: u32,
    gas_fetches: u64,
}

impl SimLedger {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            state: Mutex::new(SimState {
                epoch: 1,
                next_object: 1,
                next_tx: 1,
                counters: BTreeMap::new(),
                gas: ObjectRef {
                    id: "0xgas".to_string(),
                    version: 1,
                    digest: "gas-d1".to_string(),
                },
                claimed: 0,
                submit_faults: VecDeque::new(),
                query_faults: VecDeque::new(),
                stats_unavailable: false,
                mutation_dropouts: 0,
                gas_fetches: 0,
            }),
        }
    }

    pub async fn epoch(&self) -> u64 {
        self.state.lock().await.epoch
    }

    pub async fn advance_epoch(&self) -> u64 {
        let mut state = self.state.lock().await;
        state.epoch += 1;
        state.epoch
    }

    pub async fn claimed_total(&self) -> u64 {
        self.state.lock().await.claimed
    }

    pub async fn counter_count(&self) -> usize {
        self.state.lock().await.counters.len()
    }

    /// Drop a counter directly into ledger state, bypassing submission.
    pub async fn seed_counter(&self, epoch: u64, tx_count: u64, registered: bool) -> Counter {
        let mut state = self.state.lock().await;
        let counter = state.new_counter(epoch, tx_count, registered);
        state
            .counters
            .insert(counter.id.clone(), counter.clone());
        counter
    }

    /// Queue an error returned by the next transaction submission.
    pub async fn inject_submit_fault(&self, error: GatewayError) {
        self.state.lock().await.submit_faults.push_back(error);
    }

    /// Queue an error returned by the next query.
    pub async fn inject_query_fault(&self, error: GatewayError) {
        self.state.lock().await.query_faults.push_back(error);
    }

    pub async fn set_stats_unavailable(&self, unavailable: bool) {
        self.state.lock().await.stats_unavailable = unavailable;
    }

    pub async fn set_epoch(&self, epoch: u64) {
        self.state.lock().await.epoch = epoch;
    }

    /// Make the next increment succeed while omitting the counter from the
    /// result's mutated-object list.
    pub async fn inject_mutation_dropout(&self) {
        self.state.lock().await.mutation_dropouts += 1;
    }

    /// How many times a gas coin was fetched (as opposed to chained from an
    /// execution result).
    pub async fn gas_fetch_count(&self) -> u64 {
        self.state.lock().await.gas_fetches
    }
}

impl SimState {
    fn new_counter(&mut self, epoch: u64, tx_count: u64, registered: bool) -> Counter {
        let id = format!("0xc{:04}", self.next_object);
        self.next_object += 1;
        Counter {
            id: id.clone(),
            reference: ObjectRef {
                id,
                version: 1,
                digest: "d1".to_string(),
            },
            epoch,
            tx_count,
            registered,
        }
    }

    fn next_tx_id(&mut self) -> TxId {
        let tx_id = format!("tx-{:06}", self.next_tx);
        self.next_tx += 1;
        tx_id
    }

    fn spend_gas(&mut self) -> ObjectRef {
        self.gas.version += 1;
        self.gas.digest = format!("gas-d{}", self.gas.version);
        self.gas.clone()
    }

    fn bump(counter: &mut Counter) -> ObjectRef {
        counter.reference.version += 1;
        counter.reference.digest = format!("d{}", counter.reference.version);
        counter.reference.clone()
    }

    fn abort(&mut self, tx_id: TxId, code: u64, message: String) -> ExecutionResult {
        ExecutionResult {
            tx_id,
            status: ExecutionStatus::Failure {
                code: Some(code),
                message,
            },
            mutated: Vec::new(),
            gas_ref: self.gas.clone(),
        }
    }
}

#[async_trait]
impl LedgerGateway for SimLedger {
    async fn query_owned_counters(&self, owner: &str) -> Result<Vec<Counter>, GatewayError> {
        let mut state = self.state.lock().await;
        if let Some(fault) = state.query_faults.pop_front() {
            return Err(fault);
        }
        if owner != self.owner {
            return Ok(Vec::new());
        }
        Ok(state.counters.values().cloned().collect())
    }

    async fn latest_epoch(&self) -> Result<u64, GatewayError> {
        let mut state = self.state.lock().await;
        if let Some(fault) = state.query_faults.pop_front() {
            return Err(fault);
        }
        Ok(state.epoch)
    }

    async fn simulate_call(&self, spec: &CallSpec) -> Result<Option<Vec<u8>>, GatewayError> {
        let state = self.state.lock().await;
        if state.stats_unavailable {
            return Ok(None);
        }
        if spec.sender != self.owner {
            return Ok(None);
        }

        let claimable = state
            .counters
            .values()
            .filter(|c| c.registered && c.epoch + 2 <= state.epoch)
            .count() as u64;
        let stats = SpamStats {
            epoch: state.epoch,
            counters: state.counters.len() as u64,
            total_tx_count: state.counters.values().map(|c| c.tx_count).sum(),
            claimable,
        };
        Ok(Some(encode_stats(&stats)))
    }

    async fn submit_transaction(
        &self,
        request: &TxRequest,
    ) -> Result<ExecutionResult, GatewayError> {
        let mut state = self.state.lock().await;
        if let Some(fault) = state.submit_faults.pop_front() {
            return Err(fault);
        }

        let tx_id = state.next_tx_id();
        let gas_ref = state.spend_gas();

        let result = match &request.action {
            TxAction::CreateCounter => {
                let epoch = state.epoch;
                let counter = state.new_counter(epoch, 1, false);
                let reference = counter.reference.clone();
                state.counters.insert(counter.id.clone(), counter);
                ExecutionResult {
                    tx_id,
                    status: ExecutionStatus::Success,
                    mutated: vec![reference],
                    gas_ref,
                }
            }
            TxAction::IncrementCounter { counter } => {
                let epoch = state.epoch;
                match state.counters.get_mut(&counter.id) {
                    None => {
                        return Err(GatewayError::new(
                            GatewayErrorKind::ObjectNotFound,
                            format!("could not find the referenced object {}", counter.id),
                        ))
                    }
                    Some(found) if found.reference.version != counter.version => {
                        return Err(GatewayError::new(
                            GatewayErrorKind::ObjectNotFound,
                            format!(
                                "object {} at version {} not available for consumption",
                                counter.id, counter.version
                            ),
                        ))
                    }
                    Some(found) if found.epoch != epoch => {
                        let message = format!(
                            "wrong epoch: counter at {} but ledger at {}",
                            found.epoch, epoch
                        );
                        return Ok(state.abort(tx_id, ABORT_WRONG_EPOCH, message));
                    }
                    Some(found) => {
                        found.tx_count += 1;
                        let reference = SimState::bump(found);
                        let mutated = if state.mutation_dropouts > 0 {
                            state.mutation_dropouts -= 1;
                            Vec::new()
                        } else {
                            vec![reference]
                        };
                        ExecutionResult {
                            tx_id,
                            status: ExecutionStatus::Success,
                            mutated,
                            gas_ref,
                        }
                    }
                }
            }
            TxAction::RegisterCounter { counter } => {
                let epoch = state.epoch;
                match state.counters.get_mut(&counter.id) {
                    None => {
                        return Err(GatewayError::new(
                            GatewayErrorKind::ObjectNotFound,
                            format!("could not find the referenced object {}", counter.id),
                        ))
                    }
                    Some(found) if found.epoch + 1 != epoch => {
                        let message = format!(
                            "wrong epoch: registration window is epoch {}, ledger at {}",
                            found.epoch + 1,
                            epoch
                        );
                        return Ok(state.abort(tx_id, ABORT_WRONG_EPOCH, message));
                    }
                    Some(found) => {
                        found.registered = true;
                        let reference = SimState::bump(found);
                        ExecutionResult {
                            tx_id,
                            status: ExecutionStatus::Success,
                            mutated: vec![reference],
                            gas_ref,
                        }
                    }
                }
            }
            TxAction::ClaimCounters { counters, .. } => {
                let mut reward = 0;
                for reference in counters {
                    if let Some(found) = state.counters.remove(&reference.id) {
                        reward += found.tx_count;
                    }
                }
                state.claimed += reward;
                ExecutionResult {
                    tx_id,
                    status: ExecutionStatus::Success,
                    mutated: Vec::new(),
                    gas_ref,
                }
            }
            TxAction::DeleteCounters { counters } => {
                for reference in counters {
                    state.counters.remove(&reference.id);
                }
                ExecutionResult {
                    tx_id,
                    status: ExecutionStatus::Success,
                    mutated: Vec::new(),
                    gas_ref,
                }
            }
        };

        Ok(result)
    }

    async fn wait_for_settlement(&self, _tx_id: &TxId) -> Result<(), GatewayError> {
        // The simulated ledger settles synchronously.
        Ok(())
    }

    async fn reference_gas_price(&self) -> Result<u64, GatewayError> {
        Ok(SIM_GAS_PRICE)
    }

    async fn fetch_gas_coin(&self, owner: &str) -> Result<ObjectRef, GatewayError> {
        let mut state = self.state.lock().await;
        state.gas_fetches += 1;
        if owner != self.owner {
            return Err(GatewayError::new(
                GatewayErrorKind::NoGasCoins,
                format!("no valid gas coins owned by {owner}"),
            ));
        }
        Ok(state.gas.clone())
    }
}
