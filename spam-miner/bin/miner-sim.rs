//! Soak harness: run one or more miners against the in-memory simulated
//! ledger. Useful for exercising the cycle loop, rotation, and epoch
//! rollover handling without touching a real network.

use anyhow::Result;
use clap::Parser;
use core_logic::{setup_logger, MinerMode, SpammerTrait, WorkerRunner};
use spam_miner::{
    CyclePolicy, EndpointRotator, LedgerGateway, MinerConfig, SimLedger, SpamClient, Spammer,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Soak-run spam miners against a simulated ledger", long_about = None)]
struct Args {
    /// Optional TOML config; overrides the flags below when present
    #[arg(short, long)]
    config: Option<String>,

    /// Number of concurrent miners (distinct identities)
    #[arg(short, long, default_value_t = 1)]
    workers: u64,

    /// Simulated endpoints per miner
    #[arg(short, long, default_value_t = 3)]
    endpoints: usize,

    /// Seconds between simulated epoch advances
    #[arg(long, default_value_t = 30)]
    epoch_secs: u64,

    /// Drain maintenance work and exit instead of looping
    #[arg(long)]
    one_shot: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_guard = setup_logger();
    // Keep guard alive for file logging until process exit
    std::mem::forget(log_guard);

    let (workers, mode, rotation_threshold, policy) = match args.config.as_deref() {
        Some(path) => {
            let config = MinerConfig::from_path(path)?;
            (
                config.workers,
                config.spam.mode,
                config.rotation_threshold,
                config.policy,
            )
        }
        None => {
            let mode = if args.one_shot {
                MinerMode::OneShot
            } else {
                MinerMode::Loop
            };
            // Soak defaults: short rollover cool-down so epoch advances
            // don't stall the run for half a minute.
            let policy = CyclePolicy {
                epoch_cooldown_ms: 2_000,
                ..CyclePolicy::default()
            };
            (args.workers, mode, 20, policy)
        }
    };

    let mut spammers: Vec<Box<dyn SpammerTrait>> = Vec::new();
    let mut ledgers = Vec::new();

    for i in 0..workers {
        let owner = format!("0xminer{:02}", i + 1);
        let destination = format!("0xdest{:02}", i + 1);
        let ledger = Arc::new(SimLedger::new(owner.clone()));
        ledgers.push(ledger.clone());

        let clients: Vec<SpamClient> = (0..args.endpoints.max(1))
            .map(|j| {
                SpamClient::new(
                    format!("sim://{}/node-{}", owner, j + 1),
                    ledger.clone() as Arc<dyn LedgerGateway>,
                    owner.clone(),
                    destination.clone(),
                )
                .with_submit_retry_delay(Duration::from_millis(policy.submit_retry_delay_ms))
            })
            .collect();

        let rotator = EndpointRotator::new(clients)?;
        let spammer = Spammer::new(rotator, mode)
            .with_rotation_threshold(rotation_threshold)
            .with_policy(policy.clone());
        spammers.push(Box::new(spammer));
    }

    // Advance the simulated epochs in the background so counters age into
    // registration and claim windows.
    let epoch_secs = args.epoch_secs.max(1);
    let ticker_ledgers = ledgers.clone();
    let epoch_ticker = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(epoch_secs)).await;
            for ledger in &ticker_ledgers {
                let epoch = ledger.advance_epoch().await;
                info!("Simulated ledger advanced to epoch {}", epoch);
            }
        }
    });

    WorkerRunner::run_spammers(spammers).await?;
    epoch_ticker.abort();

    for (i, ledger) in ledgers.iter().enumerate() {
        info!(
            "Miner {:02}: epoch {} | {} live counter(s) | {} reward unit(s) claimed",
            i + 1,
            ledger.epoch().await,
            ledger.counter_count().await,
            ledger.claimed_total().await
        );
    }

    Ok(())
}
