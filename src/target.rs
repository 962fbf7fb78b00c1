//! SingleStore target connectivity
//!
//! The target speaks the MySQL protocol. The pool carries the LOCAL INFILE
//! handler that resolves `Reader::<id>` names against the reader-handle
//! registry, and session setup pinning the legacy collation the analytics
//! schema was created with.

use mysql_async::prelude::Queryable;
use mysql_async::{OptsBuilder, Pool, PoolConstraints, PoolOpts};

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::infile::ReaderRegistry;
use crate::replicate::FANOUT_TABLES;

/// One LOAD session per declared table can be in flight, plus the progress
/// store and the monitor.
pub(crate) const POOL_MAX: usize = FANOUT_TABLES + 4;

/// Write handle to the SingleStore target
#[derive(Clone)]
pub struct Target {
    pool: Pool,
}

impl Target {
    /// Build the connection pool and verify connectivity with a ping
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let constraints = PoolConstraints::new(1, POOL_MAX)
            .expect("pool constraints are ordered - this is a bug");

        let opts = OptsBuilder::default()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port)
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()))
            .db_name(Some(config.database.clone()))
            .setup(vec![
                "SET collation_server = 'utf8_general_ci'",
                "SET sql_mode = 'STRICT_ALL_TABLES'",
                "SET sql_select_limit = 18446744073709551615",
            ])
            .local_infile_handler(Some(ReaderRegistry))
            .pool_opts(PoolOpts::default().with_constraints(constraints));

        let pool = Pool::new(opts);

        let mut conn = pool
            .get_conn()
            .await
            .map_err(|e| Error::target_with("target ping failed", e))?;
        conn.ping().await?;

        Ok(Self { pool })
    }

    /// The underlying pool, shared with per-batch loaders
    pub fn pool(&self) -> Pool {
        self.pool.clone()
    }
}
