//! Error types for chainsink
//!
//! One crate-wide error enum with constructor helpers. Batch-level errors
//! are fatal to the batch but carry enough context (table, statement kind)
//! to diagnose which of the concurrent load sessions failed.

use thiserror::Error;

/// Result type for chainsink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for chainsink
#[derive(Error, Debug)]
pub enum Error {
    /// Reading from the PostgreSQL source failed
    #[error("source error: {message}")]
    Source {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Writing to the SingleStore target failed
    #[error("target error: {message}")]
    Target {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A row was routed to a table the registry does not declare.
    /// This is a programming error, not a data error.
    #[error("no table with name {table}")]
    UnknownTable { table: String },

    /// A declared table was never driven during the batch; committing
    /// progress would silently stop replicating it.
    #[error("the following tables are not being replicated to: {tables:?}")]
    IncompleteReplication { tables: Vec<String> },

    /// The progress store holds height zero and no explicit start height
    /// was given.
    #[error("refusing to start from the first block; specify `--start-height 0` to override")]
    ColdStartRefused,

    /// A block height string was not a non-negative decimal integer
    #[error("failed to parse block height: {input}")]
    HeightParse { input: String },

    /// Encoding a record for the bulk-load wire format failed
    #[error("failed to encode record for table {table}: {message}")]
    Encode { table: String, message: String },

    /// Configuration error
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl Error {
    /// Create a source error
    pub fn source(message: impl Into<String>) -> Self {
        Self::Source {
            message: message.into(),
            source: None,
        }
    }

    /// Create a source error with its cause
    pub fn source_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Source {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a target error
    pub fn target(message: impl Into<String>) -> Self {
        Self::Target {
            message: message.into(),
            source: None,
        }
    }

    /// Create a target error with its cause
    pub fn target_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Target {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an encode error
    pub fn encode(table: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Encode {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl From<tokio_postgres::Error> for Error {
    fn from(e: tokio_postgres::Error) -> Self {
        Self::source_with(e.to_string(), e)
    }
}

impl From<deadpool_postgres::PoolError> for Error {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        Self::source_with(format!("source pool: {e}"), e)
    }
}

impl From<mysql_async::Error> for Error {
    fn from(e: mysql_async::Error) -> Self {
        Self::target_with(e.to_string(), e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnknownTable {
            table: "no_such_table".into(),
        };
        assert_eq!(err.to_string(), "no table with name no_such_table");

        let err = Error::IncompleteReplication {
            tables: vec!["accounts".into()],
        };
        assert!(err.to_string().contains("accounts"));

        let err = Error::ColdStartRefused;
        assert!(err.to_string().contains("--start-height 0"));
    }

    #[test]
    fn test_constructor_helpers() {
        let err = Error::source("connection refused");
        assert!(err.to_string().contains("connection refused"));

        let err = Error::encode("blocks", "field count mismatch");
        assert!(err.to_string().contains("blocks"));
        assert!(err.to_string().contains("field count mismatch"));
    }
}
