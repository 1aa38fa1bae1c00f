use anyhow::Result;
use async_trait::async_trait;

#[derive(Debug, Default, Clone)]
pub struct SpammerStats {
    /// Transactions that executed successfully.
    pub success: u64,
    /// Transactions or cycles that failed.
    pub failed: u64,
    /// Reward counters claimed.
    pub claimed: u64,
}

#[async_trait]
pub trait Spammer: Send + Sync {
    /// Run the spam cycle loop until done or cancelled.
    ///
    /// Cancellation is cooperative: it is observed at the next cycle
    /// boundary, never mid-action.
    async fn start(
        &mut self,
        cancellation_token: tokio_util::sync::CancellationToken,
    ) -> Result<SpammerStats>;

    /// Request a cooperative stop at the next cycle boundary.
    fn stop(&self);
}
