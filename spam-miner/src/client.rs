//! Transaction client for a single ledger endpoint.
//!
//! Builds one transaction per action kind and hands it to the gateway for
//! signing and submission. The client keeps the gas coin chaining across
//! consecutive transactions and retries only the narrow transient class of
//! submission errors; every other failure propagates unmodified to the
//! orchestrator, which alone interprets it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::MinerError;
use crate::gateway::LedgerGateway;
use crate::types::{
    CallSpec, Counter, ExecutionResult, GasState, ObjectRef, SpamStats, TxAction, TxId, TxRequest,
};

/// Fixed delay between transient submission retries.
pub const DEFAULT_SUBMIT_RETRY_DELAY_MS: u64 = 1_000;

/// Read-only entry point decoded by [`SpamClient::fetch_stats`].
const STATS_FUNCTION: &str = "stats_summary";

pub struct SpamClient {
    gateway: Arc<dyn LedgerGateway>,
    endpoint_url: String,
    owner: String,
    claim_destination: String,
    gas: GasState,
    submit_retry_delay: Duration,
}

impl SpamClient {
    pub fn new(
        endpoint_url: impl Into<String>,
        gateway: Arc<dyn LedgerGateway>,
        owner: impl Into<String>,
        claim_destination: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            endpoint_url: endpoint_url.into(),
            owner: owner.into(),
            claim_destination: claim_destination.into(),
            gas: GasState::default(),
            submit_retry_delay: Duration::from_millis(DEFAULT_SUBMIT_RETRY_DELAY_MS),
        }
    }

    pub fn with_submit_retry_delay(mut self, delay: Duration) -> Self {
        self.submit_retry_delay = delay;
        self
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Snapshot of the cached gas state, for transfer on endpoint rotation.
    pub fn gas_state(&self) -> GasState {
        self.gas.clone()
    }

    /// Install gas state carried over from another endpoint's client.
    /// Endpoints observe a consistent ledger, so the cache survives rotation.
    pub fn set_gas_state(&mut self, gas: GasState) {
        self.gas = gas;
    }

    /// Drop the cached gas state so the next submission refetches it.
    pub fn invalidate_gas(&mut self) {
        self.gas.invalidate();
    }

    // --- queries ---

    pub async fn fetch_owned_counters(&self) -> Result<Vec<Counter>, MinerError> {
        Ok(self.gateway.query_owned_counters(&self.owner).await?)
    }

    pub async fn latest_epoch(&self) -> Result<u64, MinerError> {
        Ok(self.gateway.latest_epoch().await?)
    }

    pub async fn wait_for_settlement(&self, tx_id: &TxId) -> Result<(), MinerError> {
        Ok(self.gateway.wait_for_settlement(tx_id).await?)
    }

    /// Aggregate mining statistics via a read-only simulated execution.
    /// An absent return value is a hard error, never an empty default.
    pub async fn fetch_stats(&self) -> Result<SpamStats, MinerError> {
        let spec = CallSpec {
            function: STATS_FUNCTION.to_string(),
            sender: self.owner.clone(),
        };

        let bytes = self
            .gateway
            .simulate_call(&spec)
            .await?
            .ok_or_else(|| MinerError::StatsDecode {
                reason: "simulated call returned no value".to_string(),
            })?;

        decode_stats(&bytes)
    }

    // --- actions ---

    pub async fn create_counter(&mut self) -> Result<ExecutionResult, MinerError> {
        self.execute(TxAction::CreateCounter).await
    }

    pub async fn increment_counter(
        &mut self,
        counter: &ObjectRef,
    ) -> Result<ExecutionResult, MinerError> {
        self.execute(TxAction::IncrementCounter {
            counter: counter.clone(),
        })
        .await
    }

    pub async fn register_counter(
        &mut self,
        counter: &ObjectRef,
    ) -> Result<ExecutionResult, MinerError> {
        self.execute(TxAction::RegisterCounter {
            counter: counter.clone(),
        })
        .await
    }

    pub async fn claim_counters(
        &mut self,
        counters: &[ObjectRef],
    ) -> Result<ExecutionResult, MinerError> {
        self.execute(TxAction::ClaimCounters {
            counters: counters.to_vec(),
            destination: self.claim_destination.clone(),
        })
        .await
    }

    pub async fn delete_counters(
        &mut self,
        counters: &[ObjectRef],
    ) -> Result<ExecutionResult, MinerError> {
        self.execute(TxAction::DeleteCounters {
            counters: counters.to_vec(),
        })
        .await
    }

    /// Build, submit, and settle one transaction.
    ///
    /// Only node-timeout and pending-finality responses are retried, with a
    /// fixed delay and no attempt cap; every other error propagates
    /// unmodified. The execution result's logical status is NOT inspected
    /// here - that is the caller's job.
    async fn execute(&mut self, action: TxAction) -> Result<ExecutionResult, MinerError> {
        let (gas_coin, gas_price) = self.ensure_gas().await?;

        let request = TxRequest {
            sender: self.owner.clone(),
            action,
            gas_coin,
            gas_price,
        };

        let mut attempt: u32 = 0;
        let result = loop {
            match self.gateway.submit_transaction(&request).await {
                Ok(result) => break result,
                Err(e) if e.is_retryable_submission() => {
                    attempt += 1;
                    warn!(
                        "Submission to {} pending ({}), retry {} in {:?}",
                        self.endpoint_url, e, attempt, self.submit_retry_delay
                    );
                    tokio::time::sleep(self.submit_retry_delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        };

        // Chain the gas coin: the execution result carries the coin's
        // post-spend reference, saving a refetch round trip per submission.
        self.gas.coin = Some(result.gas_ref.clone());
        debug!(
            "Submitted {} via {} -> tx {}",
            request.action, self.endpoint_url, result.tx_id
        );

        Ok(result)
    }

    /// Fill whichever gas slots are absent. No round trip when both are
    /// already cached.
    async fn ensure_gas(&mut self) -> Result<(ObjectRef, u64), MinerError> {
        let coin = match &self.gas.coin {
            Some(coin) => coin.clone(),
            None => {
                let coin = self.gateway.fetch_gas_coin(&self.owner).await?;
                debug!("Fetched gas coin {} v{}", coin.id, coin.version);
                self.gas.coin = Some(coin.clone());
                coin
            }
        };
        let price = match self.gas.price {
            Some(price) => price,
            None => {
                let price = self.gateway.reference_gas_price().await?;
                debug!("Fetched reference gas price {}", price);
                self.gas.price = Some(price);
                price
            }
        };
        Ok((coin, price))
    }
}

impl std::fmt::Debug for SpamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpamClient")
            .field("endpoint_url", &self.endpoint_url)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

/// Decode the binary stats aggregate: four little-endian u64 fields
/// (epoch, counters, total tx count, claimable).
fn decode_stats(bytes: &[u8]) -> Result<SpamStats, MinerError> {
    const FIELD: usize = 8;
    const LEN: usize = FIELD * 4;

    if bytes.len() < LEN {
        return Err(MinerError::StatsDecode {
            reason: format!("expected {} bytes, got {}", LEN, bytes.len()),
        });
    }

    let read = |i: usize| {
        let mut buf = [0u8; FIELD];
        buf.copy_from_slice(&bytes[i * FIELD..(i + 1) * FIELD]);
        u64::from_le_bytes(buf)
    };

    Ok(SpamStats {
        epoch: read(0),
        counters: read(1),
        total_tx_count: read(2),
        claimable: read(3),
    })
}

/// Encode a stats aggregate; the wire-format counterpart of `decode_stats`,
/// shared with the simulated ledger.
pub(crate) fn encode_stats(stats: &SpamStats) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(32);
    for field in [stats.epoch, stats.counters, stats.total_tx_count, stats.claimable] {
        bytes.extend_from_slice(&field.to_le_bytes());
    }
    bytes
}
