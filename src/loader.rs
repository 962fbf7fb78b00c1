//! Per-batch load supervisor
//!
//! A [`Loader`] owns one [`Stream`](crate::stream::Stream) per declared
//! table for the lifetime of one batch. It routes rows by exact table name,
//! records which tables the driver intended to populate, collects errors
//! from the background LOAD tasks, and defines the commit protocol in
//! [`Loader::close`].

use std::collections::HashMap;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::models::{Record, Registry};
use crate::stream::{LoadError, Stream};

/// Supervisor of one bulk-load stream per declared table
pub struct Loader {
    streams: HashMap<&'static str, Stream>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    errors: Mutex<mpsc::UnboundedReceiver<LoadError>>,
}

impl Loader {
    /// Build one stream per registry entry and launch its LOAD task.
    pub fn new(pool: mysql_async::Pool, registry: &'static Registry) -> Self {
        let (err_tx, err_rx) = mpsc::unbounded_channel();

        let mut streams = HashMap::with_capacity(registry.len());
        let mut tasks = Vec::with_capacity(registry.len());
        for descriptor in registry.descriptors() {
            let (stream, task) = Stream::open(descriptor, pool.clone(), err_tx.clone());
            streams.insert(descriptor.table, stream);
            tasks.push(task);
        }

        Self {
            streams,
            tasks: Mutex::new(tasks),
            errors: Mutex::new(err_rx),
        }
    }

    fn stream(&self, table: &str) -> Result<&Stream> {
        self.streams.get(table).ok_or_else(|| Error::UnknownTable {
            table: table.into(),
        })
    }

    /// Route one record to its table's stream. Routing is a total function
    /// over declared tables; an unknown table is a programming error.
    pub async fn write_row(&self, table: &str, record: Record) -> Result<()> {
        self.stream(table)?.write_row(record).await
    }

    /// Record that the driver intends to populate `table` in this batch
    pub fn touch(&self, table: &str) -> Result<()> {
        self.stream(table)?.touch();
        Ok(())
    }

    /// Declared tables never touched during this batch, sorted
    pub fn untouched_tables(&self) -> Vec<&'static str> {
        let mut untouched: Vec<&'static str> = self
            .streams
            .values()
            .filter(|s| !s.touched())
            .map(|s| s.table())
            .collect();
        untouched.sort_unstable();
        untouched
    }

    /// Drain the error channel without blocking. Returns the first error;
    /// the rest are logged. Later errors (for example during close) are
    /// still observable on the next drain.
    pub async fn error(&self) -> Option<Error> {
        let mut errors = Vec::new();
        {
            let mut rx = self.errors.lock().await;
            while let Ok(err) = rx.try_recv() {
                errors.push(err);
            }
        }

        if errors.is_empty() {
            return None;
        }

        tracing::error!("{} loads failed", errors.len());
        let mut errors = errors.into_iter();
        let first = errors.next().map(|e| e.error);
        for err in errors {
            tracing::error!(table = err.table, error = %err.error, "load failed");
        }
        first
    }

    /// Commit protocol for the batch:
    /// 1. drain errors; bail before waiting on a batch already known broken,
    /// 2. close every writer end (the LOAD consumers block until EOF),
    /// 3. wait for every background LOAD task,
    /// 4. drain errors once more.
    pub async fn close(&self) -> Result<()> {
        if let Some(err) = self.error().await {
            return Err(err);
        }

        for stream in self.streams.values() {
            stream.shutdown().await;
        }

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "load task panicked");
            }
        }

        match self.error().await {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
