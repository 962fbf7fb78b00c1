//! PostgreSQL source connectivity
//!
//! The source is read-only. Connections come from a deadpool pool sized for
//! the batch fan-out: every parallel dependent query holds one connection
//! while the blocks pass and the serial passes hold another.

use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use tokio_postgres::NoTls;

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::height::BlockHeight;
use crate::replicate::FANOUT_TABLES;

/// Fan-out concurrency plus the serial passes and a spare; anything smaller
/// lets dependent queries starve each other mid-batch.
pub(crate) const POOL_SIZE: usize = FANOUT_TABLES + 2;

/// Read-only handle to the PostgreSQL source
#[derive(Clone)]
pub struct Source {
    pool: Pool,
}

impl Source {
    /// Build the connection pool and verify connectivity with one round trip
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&config.host)
            .port(config.port)
            .user(&config.user)
            .password(&config.password)
            .dbname(&config.database)
            .application_name("chainsink");

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(POOL_SIZE)
            .build()
            .map_err(|e| Error::source_with("failed to build source pool", e))?;

        let client = pool.get().await?;
        client
            .batch_execute("SELECT 1")
            .await
            .map_err(|e| Error::source_with("source ping failed", e))?;

        Ok(Self { pool })
    }

    /// Check out one pooled connection
    pub async fn client(&self) -> Result<Object> {
        Ok(self.pool.get().await?)
    }

    /// Highest block height present at the source
    pub async fn max_block_height(&self) -> Result<BlockHeight> {
        let client = self.client().await?;
        let row = client
            .query_one(
                "SELECT coalesce(MAX(block_height), 0)::text FROM blocks",
                &[],
            )
            .await?;
        let height: String = row.try_get(0)?;
        height.parse()
    }
}
