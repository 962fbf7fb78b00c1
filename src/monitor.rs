//! Block-height monitor
//!
//! Background task publishing the source tip, the replicated watermark and
//! their difference to the metrics endpoint. Read failures are logged and
//! tolerated; the monitor never terminates the process.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;

use crate::metrics::ReplicationMetrics;
use crate::progress::ProgressStore;
use crate::source::Source;

/// Spawn the monitor loop, polling both stores at `interval`
pub fn spawn(source: Source, progress: ProgressStore, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let source_height = match source.max_block_height().await {
                Ok(height) => {
                    ReplicationMetrics::set_source_height(&height);
                    Some(height)
                }
                Err(e) => {
                    warn!(error = %e, "failed to read source block height");
                    None
                }
            };

            let target_height = match progress.read_max_replicated_height().await {
                Ok(height) => {
                    ReplicationMetrics::set_target_height(&height);
                    Some(height)
                }
                Err(e) => {
                    warn!(error = %e, "failed to read replicated block height");
                    None
                }
            };

            if let (Some(source_height), Some(target_height)) = (source_height, target_height) {
                ReplicationMetrics::set_replication_lag(
                    source_height.as_f64() - target_height.as_f64(),
                );
            }

            tokio::time::sleep(interval).await;
        }
    })
}
