use crate::traits::Spammer;
use anyhow::Result;
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Instrument};

pub struct WorkerRunner;

impl WorkerRunner {
    /// Spawns a list of miners as concurrent tasks and waits for them.
    ///
    /// Each miner owns a distinct identity and private endpoint pool, so
    /// instances share no state and run fully concurrently.
    pub async fn run_spammers(spammers: Vec<Box<dyn Spammer>>) -> Result<()> {
        let mut set = JoinSet::new();

        // Cancellation token for graceful shutdown
        let token = CancellationToken::new();
        let cloned_token = token.clone();

        // Listen for Ctrl+C
        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C. Initiating graceful shutdown...");
                    cloned_token.cancel();
                }
                Err(err) => {
                    error!("Unable to listen for shutdown signal: {}", err);
                }
            }
        });

        let start_time = std::time::Instant::now();
        info!("Starting {} miner workers...", spammers.len());

        for (i, spammer) in spammers.into_iter().enumerate() {
            let id = i + 1;
            let span = tracing::info_span!("worker", worker_id = format!("{:03}", id));
            let child_token = token.clone();

            set.spawn(
                async move {
                    let mut spammer = spammer;
                    match spammer.start(child_token).await {
                        Ok(stats) => Ok(stats),
                        Err(e) => {
                            error!("Worker {} failed: {:?}", id, e);
                            Err(e)
                        }
                    }
                }
                .instrument(span),
            );
        }

        let mut total_success = 0;
        let mut total_failed = 0;
        let mut total_claimed = 0;

        while let Some(res) = set.join_next().await {
            match res {
                Ok(Ok(stats)) => {
                    total_success += stats.success;
                    total_failed += stats.failed;
                    total_claimed += stats.claimed;
                }
                Ok(Err(_)) => {
                    // Already logged in the worker task
                }
                Err(e) => {
                    error!("A worker task panicked or failed to join: {:?}", e);
                }
            }
        }

        let total_duration = start_time.elapsed();
        let total = total_success + total_failed;
        let rate = if total > 0 {
            (total_success as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        info!("Shutdown Complete.");
        info!(
            "Total Time: {:.1}s | Total Success: {} | Total Fail: {} | Claimed: {} | Success Rate: {:.2}%",
            total_duration.as_secs_f64(),
            total_success,
            total_failed,
            total_claimed,
            rate
        );

        Ok(())
    }
}
