//! # chainsink
//!
//! Continuous replication of a blockchain analytics dataset from PostgreSQL
//! (row-store, canonical truth) into SingleStore (columnar, append/replace
//! target) at block-height granularity.
//!
//! The engine advances in bounded batches. Each batch streams the next run
//! of blocks, then every table that depends on them, into one concurrent
//! bulk-load session per table; rows flow through in-process pipes so
//! memory stays bounded by pipe buffers rather than batch size. Progress is
//! persisted on the target only after a fully committed batch, and REPLACE
//! semantics on the target's primary keys make redelivery after a crash
//! harmless (at-least-once, idempotent).
//!
//! ```text
//! ┌────────────┐  dependency plan   ┌────────┐  one pipe per table  ┌─────────────┐
//! │ PostgreSQL │───────────────────▶│ driver │─────────────────────▶│ SingleStore │
//! │  (blocks…) │  streamed queries  │        │  LOAD DATA … AVRO    │  (columnar) │
//! └────────────┘                    └────────┘                      └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`models`] - declarative registry of every replicated table
//! - [`stream`] / [`loader`] - per-batch bulk-load sessions and supervision
//! - [`replicate`] - the batch planner/driver
//! - [`runner`] - poll-loop building blocks around the driver
//! - [`progress`] / [`monitor`] - resumption watermark and lag gauges
//! - [`config`], [`source`], [`target`], [`metrics`] - ambient plumbing

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod height;
pub mod infile;
pub mod loader;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod progress;
pub mod replicate;
pub mod runner;
pub mod source;
pub mod stream;
pub mod target;

pub use error::{Error, Result};
pub use height::BlockHeight;
pub use replicate::replicate;
