//! Progress store
//!
//! The highest successfully replicated block height lives in a single-row
//! table on the target. REPLACE keeps the write idempotent; progress is
//! only advanced after a fully committed batch, so a restart resumes at the
//! previous height and re-replicates at most one batch.

use mysql_async::prelude::Queryable;

use crate::error::Result;
use crate::height::BlockHeight;
use crate::target::Target;

const READ_HEIGHT: &str =
    "SELECT CAST(coalesce(MAX(block_height), 0) AS CHAR) FROM replication_meta";
const WRITE_HEIGHT: &str = "REPLACE INTO replication_meta VALUES (?)";

/// Reads and writes the replicated-height watermark on the target
#[derive(Clone)]
pub struct ProgressStore {
    pool: mysql_async::Pool,
}

impl ProgressStore {
    pub fn new(target: &Target) -> Self {
        Self {
            pool: target.pool(),
        }
    }

    /// Highest replicated block height; zero when nothing was ever written
    pub async fn read_max_replicated_height(&self) -> Result<BlockHeight> {
        let mut conn = self.pool.get_conn().await?;
        let height: Option<String> = conn.query_first(READ_HEIGHT).await?;
        height.unwrap_or_else(|| "0".to_string()).parse()
    }

    /// Record a newly replicated height. Last writer wins.
    pub async fn write_replicated_height(&self, height: &BlockHeight) -> Result<()> {
        let mut conn = self.pool.get_conn().await?;
        conn.exec_drop(WRITE_HEIGHT, (height.to_string(),)).await?;
        Ok(())
    }
}
