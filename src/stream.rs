//! Bulk-load streams
//!
//! A [`Stream`] is one active bulk-load session against the target: an
//! in-process pipe whose writer end is fed by the row encoder and whose
//! reader end is consumed by a background `LOAD DATA LOCAL INFILE` session
//! resolved through the reader-handle registry. The pipe buffer is bounded,
//! so a producer outrunning the target blocks on `write_row` instead of
//! accumulating rows in memory.
//!
//! If the LOAD fails, the task publishes the error to the loader's channel
//! and drains the reader end; a producer that keeps writing after a failure
//! discards instead of blocking.

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};

use apache_avro::to_avro_datum;
use apache_avro::types::Value as AvroValue;
use mysql_async::prelude::Queryable;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::infile;
use crate::models::{EntityDescriptor, Record, Value};

/// Pipe buffer per stream. Memory per batch is bounded by this times the
/// number of declared tables, independent of batch row count.
pub(crate) const PIPE_CAPACITY: usize = 64 * 1024;

/// Error from one stream's background LOAD task
#[derive(Debug)]
pub struct LoadError {
    pub table: &'static str,
    pub error: Error,
}

/// One bulk-load session for one target table
pub(crate) struct Stream {
    descriptor: &'static EntityDescriptor,
    read_id: String,
    touched: AtomicBool,
    writer: Mutex<Option<DuplexStream>>,
}

impl Stream {
    /// Construct the pipe, bind a fresh reader-handle id, and launch the
    /// background LOAD task.
    pub(crate) fn open(
        descriptor: &'static EntityDescriptor,
        pool: mysql_async::Pool,
        errors: mpsc::UnboundedSender<LoadError>,
    ) -> (Self, JoinHandle<()>) {
        let (writer, reader) = tokio::io::duplex(PIPE_CAPACITY);
        let read_id = Uuid::new_v4().to_string();
        infile::register(&read_id, reader);

        let statement = load_statement(descriptor, &read_id);
        let task = tokio::spawn(run_load(
            descriptor.table,
            pool,
            statement,
            read_id.clone(),
            errors,
        ));

        (
            Self {
                descriptor,
                read_id,
                touched: AtomicBool::new(false),
                writer: Mutex::new(Some(writer)),
            },
            task,
        )
    }

    /// Encode one record into the pipe. Blocks on back-pressure while the
    /// LOAD consumer catches up.
    pub(crate) async fn write_row(&self, record: Record) -> Result<()> {
        let bytes = encode_record(self.descriptor, record)?;
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(w) => w.write_all(&bytes).await.map_err(|e| {
                Error::target_with(
                    format!("load stream for {} rejected a row", self.descriptor.table),
                    e,
                )
            }),
            None => Err(Error::target(format!(
                "load stream for {} is already closed",
                self.descriptor.table
            ))),
        }
    }

    /// Mark the stream as driven in this batch
    pub(crate) fn touch(&self) {
        self.touched.store(true, Ordering::Relaxed);
    }

    pub(crate) fn touched(&self) -> bool {
        self.touched.load(Ordering::Relaxed)
    }

    pub(crate) fn table(&self) -> &'static str {
        self.descriptor.table
    }

    /// Reader-handle id bound to this stream's pipe
    pub(crate) fn read_id(&self) -> &str {
        &self.read_id
    }

    /// Close the writer end; the LOAD consumer completes once it observes
    /// EOF. The caller must still await the background task.
    pub(crate) async fn shutdown(&self) {
        self.writer.lock().await.take();
    }
}

/// Background side of one stream: run the blocking LOAD, report its error,
/// and keep the pipe drained on failure.
async fn run_load(
    table: &'static str,
    pool: mysql_async::Pool,
    statement: String,
    read_id: String,
    errors: mpsc::UnboundedSender<LoadError>,
) {
    let result = async {
        let mut conn = pool.get_conn().await?;
        conn.query_drop(&statement).await?;
        Ok::<_, mysql_async::Error>(())
    }
    .await;

    match result {
        Ok(()) => {
            // The handler claimed the reader when the LOAD requested it;
            // removal here is a no-op kept for the deregister invariant.
            drop(infile::take(&read_id));
        }
        Err(e) => {
            tracing::warn!(table, error = %e, "bulk load failed");
            // Deregister before publishing so an observed error implies the
            // handle is gone.
            let reader = infile::take(&read_id);
            let _ = errors.send(LoadError {
                table,
                error: e.into(),
            });

            // Drain so the producer side of the pipe doesn't block forever
            // against a full buffer.
            if let Some(mut reader) = reader {
                let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
            }
        }
    }
}

/// The LOAD statement for one table's stream
fn load_statement(descriptor: &EntityDescriptor, read_id: &str) -> String {
    format!(
        "LOAD DATA LOCAL INFILE '{infile}' REPLACE INTO TABLE {table} \
         FORMAT AVRO ( {columns} ) SCHEMA '{schema}' ERRORS HANDLE '{table}'",
        infile = infile::infile_name(read_id),
        table = descriptor.table,
        columns = descriptor.column_mapping(),
        schema = descriptor.schema_json(),
    )
}

/// Serialize one record as a bare Avro datum against the table's schema
pub(crate) fn encode_record(descriptor: &EntityDescriptor, record: Record) -> Result<Vec<u8>> {
    if record.0.len() != descriptor.fields.len() {
        return Err(Error::encode(
            descriptor.table,
            format!(
                "record has {} values, schema expects {}",
                record.0.len(),
                descriptor.fields.len()
            ),
        ));
    }

    let mut fields = Vec::with_capacity(record.0.len());
    for (def, value) in descriptor.fields.iter().zip(record.0) {
        let value = if def.sanitize {
            sanitize_value(value)
        } else {
            value
        };
        fields.push((def.column.to_string(), avro_value(value)));
    }

    to_avro_datum(descriptor.schema(), AvroValue::Record(fields))
        .map_err(|e| Error::encode(descriptor.table, e))
}

fn avro_value(value: Value) -> AvroValue {
    match value {
        Value::Str(s) => AvroValue::String(s),
        // union order is ["string", "null"]
        Value::OptStr(Some(s)) => AvroValue::Union(0, Box::new(AvroValue::String(s))),
        Value::OptStr(None) => AvroValue::Union(1, Box::new(AvroValue::Null)),
        Value::Int(i) => AvroValue::Int(i),
        Value::Long(l) => AvroValue::Long(l),
        Value::Bool(b) => AvroValue::Boolean(b),
    }
}

fn sanitize_value(value: Value) -> Value {
    match value {
        Value::Str(s) => Value::Str(sanitize_to_bmp(&s).into_owned()),
        Value::OptStr(Some(s)) => Value::OptStr(Some(sanitize_to_bmp(&s).into_owned())),
        other => other,
    }
}

/// Replace every codepoint outside the Basic Multilingual Plane with U+FFFD.
///
/// The target's legacy UTF-8 handling rejects codepoints above U+FFFF in
/// text columns.
pub fn sanitize_to_bmp(s: &str) -> Cow<'_, str> {
    fn in_bmp(c: char) -> bool {
        (c as u32) <= 0xFFFF
    }

    if s.chars().all(in_bmp) {
        Cow::Borrowed(s)
    } else {
        Cow::Owned(
            s.chars()
                .map(|c| if in_bmp(c) { c } else { '\u{FFFD}' })
                .collect(),
        )
    }
}
