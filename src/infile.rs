//! Reader-handle registry for LOCAL INFILE streaming
//!
//! The bulk-load driver resolves `LOAD DATA LOCAL INFILE` file names through
//! a single handler installed on the connection options. This module is the
//! one adapter around that API: a process-wide table mapping fresh ids to
//! the reader ends of in-process pipes, plus the [`ReaderRegistry`] handler
//! that claims a reader when the server requests its file.
//!
//! Ids are random UUIDs generated per stream. An id is removed either by the
//! handler when the LOAD claims it, or by the stream's background task on
//! shutdown; it never outlives its stream.

use std::collections::HashMap;
use std::io;
use std::sync::{LazyLock, Mutex};

use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use mysql_async::prelude::GlobalHandler;
use mysql_async::{InfileData, LocalInfileError};
use tokio::io::DuplexStream;
use tokio_util::io::ReaderStream;

/// File-name prefix understood by the handler
const READER_PREFIX: &str = "Reader::";

static READERS: LazyLock<Mutex<HashMap<String, DuplexStream>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// The LOAD statement file name for a registered id
pub fn infile_name(id: &str) -> String {
    format!("{READER_PREFIX}{id}")
}

/// Register the reader end of a stream's pipe under a fresh id
pub fn register(id: &str, reader: DuplexStream) {
    let previous = READERS
        .lock()
        .expect("reader registry lock poisoned")
        .insert(id.to_string(), reader);
    debug_assert!(previous.is_none(), "reader id collision: {id}");
}

/// Remove and return a registered reader. Returns `None` once claimed.
pub fn take(id: &str) -> Option<DuplexStream> {
    READERS
        .lock()
        .expect("reader registry lock poisoned")
        .remove(id)
}

/// Number of currently registered readers
pub fn registered() -> usize {
    READERS.lock().expect("reader registry lock poisoned").len()
}

/// Whether an id is currently registered
pub fn contains(id: &str) -> bool {
    READERS
        .lock()
        .expect("reader registry lock poisoned")
        .contains_key(id)
}

/// LOCAL INFILE handler resolving `Reader::<id>` names against the registry
#[derive(Debug, Clone, Copy)]
pub struct ReaderRegistry;

impl GlobalHandler for ReaderRegistry {
    fn handle(
        &self,
        file_name: &[u8],
    ) -> BoxFuture<'static, std::result::Result<InfileData, LocalInfileError>> {
        let name = String::from_utf8_lossy(file_name).into_owned();
        Box::pin(async move {
            let id = name.strip_prefix(READER_PREFIX).unwrap_or(&name);
            match take(id) {
                Some(reader) => Ok(ReaderStream::new(reader).boxed().into()),
                None => Err(LocalInfileError::from(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no reader registered for '{name}'"),
                ))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_infile_name() {
        assert_eq!(infile_name("abc"), "Reader::abc");
    }

    #[tokio::test]
    async fn test_register_take_is_one_shot() {
        let (_writer, reader) = tokio::io::duplex(64);
        register("one-shot-id", reader);
        assert!(take("one-shot-id").is_some());
        assert!(take("one-shot-id").is_none());
    }

    #[tokio::test]
    async fn test_handler_claims_registered_reader() {
        let (mut writer, reader) = tokio::io::duplex(64);
        register("handler-id", reader);

        writer.write_all(b"payload").await.unwrap();
        drop(writer);

        let data = ReaderRegistry.handle(b"Reader::handler-id").await;
        assert!(data.is_ok());
        // claimed exactly once
        assert!(take("handler-id").is_none());
    }

    #[tokio::test]
    async fn test_handler_rejects_unknown_name() {
        let result = ReaderRegistry.handle(b"Reader::unregistered").await;
        assert!(result.is_err());
    }
}
