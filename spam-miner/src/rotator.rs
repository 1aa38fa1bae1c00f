//! Endpoint rotation.
//!
//! Owns a fixed pool of transaction clients, one per ledger endpoint, and
//! selects among them with a deterministic ring: advancing past the current
//! slot to the next active entry bounds the staleness any one slow or
//! broken endpoint can cause to a single full rotation. Random selection
//! cannot give that bound, which is why the ring is explicit. The cursor is
//! owned exclusively by the rotator; no caller ever reads or writes it.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::client::SpamClient;
use crate::error::RotatorError;

/// Consecutive reported failures before an endpoint is taken out of the
/// ring.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// How long a failed endpoint stays out before it is retried.
pub const DEFAULT_COOLOFF: Duration = Duration::from_secs(60);

struct Endpoint {
    client: SpamClient,
    active: bool,
    consecutive_failures: u32,
    /// Deadline after which an auto-deactivated endpoint is revived.
    /// `None` for endpoints deactivated by configuration, which stay out.
    inactive_until: Option<Instant>,
}

pub struct EndpointRotator {
    endpoints: Vec<Endpoint>,
    cursor: usize,
    failure_threshold: u32,
    cooloff: Duration,
}

impl EndpointRotator {
    pub fn new(clients: Vec<SpamClient>) -> Result<Self, RotatorError> {
        if clients.is_empty() {
            return Err(RotatorError::EmptyPool);
        }

        Ok(Self {
            endpoints: clients
                .into_iter()
                .map(|client| Endpoint {
                    client,
                    active: true,
                    consecutive_failures: 0,
                    inactive_until: None,
                })
                .collect(),
            cursor: 0,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooloff: DEFAULT_COOLOFF,
        })
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    pub fn with_cooloff(mut self, cooloff: Duration) -> Self {
        self.cooloff = cooloff;
        self
    }

    /// Deactivate or reactivate an endpoint by pool index, for endpoints
    /// configured out of service. Out-of-range indices are ignored.
    pub fn set_active(&mut self, index: usize, active: bool) {
        if let Some(endpoint) = self.endpoints.get_mut(index) {
            endpoint.active = active;
            endpoint.inactive_until = None;
            endpoint.consecutive_failures = 0;
        }
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.endpoints.iter().filter(|e| e.active).count()
    }

    pub fn urls(&self) -> Vec<&str> {
        self.endpoints
            .iter()
            .map(|e| e.client.endpoint_url())
            .collect()
    }

    /// The client currently selected by the ring.
    pub fn current(&self) -> &SpamClient {
        &self.endpoints[self.cursor].client
    }

    pub fn current_mut(&mut self) -> &mut SpamClient {
        &mut self.endpoints[self.cursor].client
    }

    /// Advance to the next active endpoint, wrapping.
    ///
    /// With exactly one active entry the ring returns it without advancing;
    /// with none it fails. On an actual switch the outgoing client's gas
    /// state is copied to the incoming one - endpoints observe a consistent
    /// ledger, so the cache survives rotation.
    pub fn next(&mut self) -> Result<&SpamClient, RotatorError> {
        self.revive_expired();

        let n = self.endpoints.len();
        for step in 1..=n {
            let idx = (self.cursor + step) % n;
            if !self.endpoints[idx].active {
                continue;
            }

            if idx != self.cursor {
                let gas = self.endpoints[self.cursor].client.gas_state();
                self.endpoints[idx].client.set_gas_state(gas);
                info!(
                    "Rotating endpoint: {} -> {}",
                    self.endpoints[self.cursor].client.endpoint_url(),
                    self.endpoints[idx].client.endpoint_url()
                );
                self.cursor = idx;
            }

            return Ok(&self.endpoints[self.cursor].client);
        }

        Err(RotatorError::NoActiveEndpoints)
    }

    /// Report a failed interaction with the current endpoint. At the
    /// failure threshold the endpoint leaves the ring until its cool-off
    /// expires.
    pub fn record_failure(&mut self) {
        let threshold = self.failure_threshold;
        let cooloff = self.cooloff;
        let endpoint = &mut self.endpoints[self.cursor];

        endpoint.consecutive_failures += 1;
        if endpoint.active && endpoint.consecutive_failures >= threshold {
            endpoint.active = false;
            endpoint.inactive_until = Some(Instant::now() + cooloff);
            warn!(
                "Endpoint {} inactive after {} consecutive failures (cool-off {:?})",
                endpoint.client.endpoint_url(),
                endpoint.consecutive_failures,
                cooloff
            );
        }
    }

    /// Report a successful interaction with the current endpoint.
    pub fn record_success(&mut self) {
        self.endpoints[self.cursor].consecutive_failures = 0;
    }

    /// Bring auto-deactivated endpoints whose cool-off elapsed back into
    /// the ring, so a fully-degraded pool self-heals.
    fn revive_expired(&mut self) {
        let now = Instant::now();
        for endpoint in &mut self.endpoints {
            if !endpoint.active && endpoint.inactive_until.is_some_and(|t| t <= now) {
                endpoint.active = true;
                endpoint.consecutive_failures = 0;
                endpoint.inactive_until = None;
                info!(
                    "Endpoint {} revived after cool-off",
                    endpoint.client.endpoint_url()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimLedger;
    use crate::types::{GasState, ObjectRef};
    use std::sync::Arc;

    fn pool(urls: &[&str]) -> EndpointRotator {
        let gateway = Arc::new(SimLedger::new("0xowner"));
        let clients = urls
            .iter()
            .map(|url| SpamClient::new(*url, gateway.clone(), "0xowner", "0xdest"))
            .collect();
        EndpointRotator::new(clients).unwrap()
    }

    #[test]
    fn test_empty_pool_is_rejected() {
        assert!(matches!(
            EndpointRotator::new(vec![]),
            Err(RotatorError::EmptyPool)
        ));
    }

    #[test]
    fn test_next_advances_past_current() {
        let mut rotator = pool(&["a", "b", "c"]);

        assert_eq!(rotator.current().endpoint_url(), "a");
        assert_eq!(rotator.next().unwrap().endpoint_url(), "b");
        assert_eq!(rotator.next().unwrap().endpoint_url(), "c");
        assert_eq!(rotator.next().unwrap().endpoint_url(), "a");
    }

    #[test]
    fn test_next_skips_inactive() {
        let mut rotator = pool(&["a", "b", "c"]);
        rotator.set_active(1, false);

        assert_eq!(rotator.next().unwrap().endpoint_url(), "c");
    }

    #[test]
    fn test_sole_active_returns_without_advancing() {
        let mut rotator = pool(&["a", "b", "c"]);
        rotator.set_active(0, false);
        rotator.set_active(2, false);

        for _ in 0..3 {
            assert_eq!(rotator.next().unwrap().endpoint_url(), "b");
        }
        assert_eq!(rotator.current().endpoint_url(), "b");
    }

    #[test]
    fn test_no_active_endpoints_fails() {
        let mut rotator = pool(&["a", "b"]);
        rotator.set_active(0, false);
        rotator.set_active(1, false);

        assert!(matches!(
            rotator.next(),
            Err(RotatorError::NoActiveEndpoints)
        ));
    }

    #[test]
    fn test_gas_state_transfers_on_rotation() {
        let mut rotator = pool(&["a", "b"]);
        let gas = GasState {
            coin: Some(ObjectRef {
                id: "0xcoin".to_string(),
                version: 7,
                digest: "d7".to_string(),
            }),
            price: Some(1000),
        };
        rotator.current_mut().set_gas_state(gas.clone());

        let incoming = rotator.next().unwrap();
        assert_eq!(incoming.endpoint_url(), "b");
        assert_eq!(incoming.gas_state(), gas);
    }

    #[test]
    fn test_failure_threshold_deactivates_endpoint() {
        let mut rotator = pool(&["a", "b"]).with_failure_threshold(3);

        rotator.record_failure();
        rotator.record_failure();
        assert_eq!(rotator.active_count(), 2);

        rotator.record_failure();
        assert_eq!(rotator.active_count(), 1);
        assert_eq!(rotator.next().unwrap().endpoint_url(), "b");
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let mut rotator = pool(&["a", "b"]).with_failure_threshold(2);

        rotator.record_failure();
        rotator.record_success();
        rotator.record_failure();

        assert_eq!(rotator.active_count(), 2);
    }

    #[test]
    fn test_cooloff_revives_endpoint() {
        let mut rotator = pool(&["a", "b"])
            .with_failure_threshold(1)
            .with_cooloff(Duration::ZERO);

        rotator.record_failure();
        assert_eq!(rotator.active_count(), 1);

        // Zero cool-off: the next scan revives it immediately.
        rotator.next().unwrap();
        assert_eq!(rotator.active_count(), 2);
    }
}
