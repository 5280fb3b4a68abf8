// Alert sink trait: where triggered posts are reported.

use anyhow::Result;
use async_trait::async_trait;

use super::TriggerAlert;

/// Receives each triggered post exactly once.
///
/// Several community loops share one sink, so implementations must keep
/// concurrent reports from interleaving.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn report_trigger(&self, alert: &TriggerAlert) -> Result<()>;
}
