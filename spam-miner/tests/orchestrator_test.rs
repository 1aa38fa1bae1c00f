use core_logic::{MinerMode, SpammerStats, SpammerTrait};
use spam_miner::{
    CyclePolicy, EndpointRotator, EventSink, GatewayError, GatewayErrorKind, LedgerGateway,
    MinerStatus, SimLedger, SpamClient, SpamEvent, Spammer,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const OWNER: &str = "0xminer";
const DEST: &str = "0xdest";

/// Captures every lifecycle event message, in emission order.
#[derive(Clone, Default)]
struct CollectingSink {
    messages: Arc<Mutex<Vec<String>>>,
}

impl CollectingSink {
    fn new() -> Self {
        Self::default()
    }

    fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    fn position(&self, needle: &str) -> Option<usize> {
        self.messages()
            .iter()
            .position(|m| m.contains(needle))
    }

    fn contains(&self, needle: &str) -> bool {
        self.position(needle).is_some()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: &SpamEvent) {
        self.messages.lock().unwrap().push(event.message.clone());
    }
}

fn fast_policy() -> CyclePolicy {
    CyclePolicy {
        warmup_ms: 1,
        epoch_cooldown_ms: 20,
        lag_ms: 10,
        network_ms: 10,
        unexpected_ms: 10,
        submit_retry_delay_ms: 10,
        rotation_penalty: 10,
    }
}

fn build_spammer(
    ledger: &Arc<SimLedger>,
    mode: MinerMode,
    urls: &[&str],
    sink: &CollectingSink,
    rotation_threshold: u32,
) -> Spammer {
    let clients: Vec<SpamClient> = urls
        .iter()
        .map(|url| {
            SpamClient::new(*url, ledger.clone() as Arc<dyn LedgerGateway>, OWNER, DEST)
                .with_submit_retry_delay(Duration::from_millis(10))
        })
        .collect();
    let rotator = EndpointRotator::new(clients).unwrap();
    Spammer::new(rotator, mode)
        .with_policy(fast_policy())
        .with_rotation_threshold(rotation_threshold)
        .with_event_sink(Box::new(sink.clone()))
}

/// Poll until the sink has seen `needle` or panic after five seconds.
async fn wait_for(sink: &CollectingSink, needle: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if sink.contains(needle) {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!(
                "timed out waiting for event containing {needle:?}; saw {:#?}",
                sink.messages()
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn spawn(
    mut spammer: Spammer,
    token: CancellationToken,
) -> tokio::task::JoinHandle<(Spammer, SpammerStats)> {
    tokio::spawn(async move {
        let stats = spammer.start(token).await.expect("miner run failed");
        (spammer, stats)
    })
}

#[tokio::test]
async fn test_one_shot_drains_in_priority_order() {
    let ledger = Arc::new(SimLedger::new(OWNER));
    ledger.set_epoch(5).await;
    // Duplicate current-epoch counters: the smaller one becomes delete work.
    ledger.seed_counter(5, 3, false).await;
    ledger.seed_counter(5, 7, false).await;
    // Registered and aged: claimable.
    ledger.seed_counter(3, 10, true).await;
    // Prior epoch, unregistered: registration work.
    ledger.seed_counter(4, 2, false).await;

    let sink = CollectingSink::new();
    let spammer = build_spammer(&ledger, MinerMode::OneShot, &["sim://a"], &sink, 100);
    let handle = spawn(spammer, CancellationToken::new());

    let (spammer, stats) = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("one-shot run should terminate")
        .unwrap();

    // Priority: delete before claim before register.
    let delete_at = sink.position("Success: delete").expect("delete ran");
    let claim_at = sink.position("Success: claimed").expect("claim ran");
    let register_at = sink.position("Success: register").expect("register ran");
    assert!(delete_at < claim_at, "delete must run before claim");
    assert!(claim_at < register_at, "claim must run before register");

    assert_eq!(stats.success, 3);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.claimed, 1);
    assert_eq!(ledger.claimed_total().await, 10);

    // Settled state is visible and refetch is re-armed for a future start.
    assert_eq!(spammer.status(), MinerStatus::Stopped);
    assert!(spammer.refetch_required());
    let set = spammer.counter_set().expect("final refetch ran");
    assert!(set.delete.is_empty());
    assert!(set.claim.is_empty());
    assert!(set.register.as_ref().unwrap().registered);
    assert_eq!(set.current.as_ref().unwrap().tx_count, 7);
}

#[tokio::test]
async fn test_loop_mode_creates_then_rederives_then_increments() {
    let ledger = Arc::new(SimLedger::new(OWNER));
    let sink = CollectingSink::new();
    let spammer = build_spammer(&ledger, MinerMode::Loop, &["sim://a"], &sink, 100);

    let token = CancellationToken::new();
    let handle = spawn(spammer, token.clone());

    wait_for(&sink, "Success: create counter").await;
    wait_for(&sink, "Success: incremented counter").await;
    token.cancel();
    let (spammer, stats) = handle.await.unwrap();

    let create_at = sink.position("Success: create counter").unwrap();
    let refetch_at = sink.position("Refetched: epoch 1, 1 counter(s)").unwrap();
    let increment_at = sink.position("Success: incremented counter").unwrap();
    assert!(
        create_at < refetch_at && refetch_at < increment_at,
        "create success must trigger a refetch before incrementing"
    );

    assert!(stats.success >= 2);
    assert_eq!(spammer.status(), MinerStatus::Stopped);
}

#[tokio::test]
async fn test_epoch_rollover_keeps_miner_running() {
    let ledger = Arc::new(SimLedger::new(OWNER));
    let sink = CollectingSink::new();
    let spammer = build_spammer(&ledger, MinerMode::Loop, &["sim://a"], &sink, 1000);

    let token = CancellationToken::new();
    let handle = spawn(spammer, token.clone());

    // Let the miner settle into incrementing, then roll the epoch under it.
    wait_for(&sink, "Success: incremented counter").await;
    ledger.advance_epoch().await;

    wait_for(&sink, "Epoch rollover").await;
    // Still running: the stale counter gets re-derived into register work.
    wait_for(&sink, "Success: register counter").await;
    token.cancel();
    let (spammer, _stats) = handle.await.unwrap();

    let rollover_at = sink.position("Epoch rollover").unwrap();
    let register_at = sink.position("Success: register counter").unwrap();
    let stop_requested_at = sink.position("Stop requested").unwrap();
    let stopped_at = sink.position("Miner stopped").unwrap();

    assert!(rollover_at < register_at, "miner kept working after rollover");
    assert!(
        rollover_at < stop_requested_at && stop_requested_at < stopped_at,
        "rollover must never stop the miner on its own"
    );
    assert!(
        sink.contains("Refetched: epoch 2"),
        "rollover must trigger a refetch against the new epoch"
    );
    assert_eq!(spammer.status(), MinerStatus::Stopped);
}

#[tokio::test]
async fn test_out_of_funds_is_fatal() {
    let ledger = Arc::new(SimLedger::new(OWNER));
    ledger
        .inject_submit_fault(GatewayError::new(
            GatewayErrorKind::NoGasCoins,
            "no valid gas coins for the transaction",
        ))
        .await;

    let sink = CollectingSink::new();
    let spammer = build_spammer(&ledger, MinerMode::Loop, &["sim://a"], &sink, 100);

    // No cancellation: the miner must stop itself.
    let handle = spawn(spammer, CancellationToken::new());
    let (spammer, stats) = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("out-of-funds must terminate the session")
        .unwrap();

    assert_eq!(spammer.status(), MinerStatus::Stopped);
    assert_eq!(stats.success, 0, "no action may execute after out-of-funds");
    assert_eq!(stats.failed, 1);
    assert!(sink.contains("Out of funds"));

    let out_at = sink.position("Out of funds").unwrap();
    let stopped_at = sink.position("Miner stopped").unwrap();
    assert!(out_at < stopped_at);
    assert!(!sink.contains("Success:"));
}

#[tokio::test]
async fn test_increment_missing_mutation_is_explicit_not_found() {
    let ledger = Arc::new(SimLedger::new(OWNER));
    ledger.seed_counter(1, 1, false).await;
    ledger.inject_mutation_dropout().await;

    let sink = CollectingSink::new();
    let spammer = build_spammer(&ledger, MinerMode::Loop, &["sim://a"], &sink, 1000);

    let token = CancellationToken::new();
    let handle = spawn(spammer, token.clone());

    wait_for(&sink, "Increment fast-path FAILED").await;
    // The miner recovers by refetching rather than panicking.
    wait_for(&sink, "Success: incremented counter").await;
    token.cancel();
    let (_spammer, _stats) = handle.await.unwrap();

    let failed_at = sink.position("Increment fast-path FAILED").unwrap();
    let recovered_at = sink.position("Success: incremented counter").unwrap();
    assert!(failed_at < recovered_at);
    assert!(sink.contains("Endpoint lag"), "dropout follows the lag policy");
}

#[tokio::test]
async fn test_stop_is_cooperative_at_cycle_boundary() {
    let ledger = Arc::new(SimLedger::new(OWNER));
    let sink = CollectingSink::new();
    let mut spammer = build_spammer(&ledger, MinerMode::Loop, &["sim://a"], &sink, 100);

    // Requested before the loop begins: observed at the first boundary,
    // before any action runs.
    spammer.stop();
    let stats = spammer.start(CancellationToken::new()).await.unwrap();

    assert_eq!(stats.success, 0);
    assert_eq!(stats.failed, 0);
    assert_eq!(spammer.status(), MinerStatus::Stopped);
    assert!(spammer.refetch_required(), "stopping re-arms refetch");
    assert!(sink.contains("Stop requested"));
}

#[tokio::test]
async fn test_rotation_at_threshold() {
    let ledger = Arc::new(SimLedger::new(OWNER));
    let sink = CollectingSink::new();
    let spammer = build_spammer(&ledger, MinerMode::Loop, &["sim://a", "sim://b"], &sink, 2);

    let token = CancellationToken::new();
    let handle = spawn(spammer, token.clone());

    wait_for(&sink, "Rotated to endpoint sim://b").await;
    token.cancel();
    handle.await.unwrap();

    let rotate_at = sink.position("Rotated to endpoint sim://b").unwrap();
    let successes_before = sink.messages()[..rotate_at]
        .iter()
        .filter(|m| m.contains("Success:"))
        .count();
    assert!(
        successes_before >= 2,
        "rotation happens only after the transaction threshold"
    );
}
