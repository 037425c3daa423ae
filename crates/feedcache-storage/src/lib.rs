//! SQLite-backed cache core for locally synced social data.
//!
//! Sync adapters persist network entities (posts, photos, calendar events,
//! notifications) into one SQLite file per service; this crate provides the
//! generic machinery those adapters share:
//! - deterministic database placement and schema-version gating
//! - dynamically constructed, batched INSERT / UPDATE / DELETE statements
//! - write serialization via a cross-process advisory lock plus a SQL
//!   transaction
//!
//! Per-network table shapes are injected through [`SchemaDefinition`]; the
//! core defines no tables of its own beyond the version counter SQLite
//! stores in the file header.

mod batch;
mod db;
mod lock;
mod schema;
mod value;

pub use batch::{EntrySet, WriteMode};
pub use db::{Database, Result, StorageError};
pub use lock::CrossProcessLock;
pub use schema::{database_path, SchemaDefinition, StorageConfig};
pub use value::{Row, Value};
