//! lineage-store - SQLite row store
//!
//! This crate persists the five row collections of script projects (documents,
//! transforms, human transforms, transform inputs and outputs) and serves them
//! back through the `RowSource` and `MutationSink` traits.

mod schema;
mod sqlite;

pub use sqlite::{ImportSummary, SqliteStore, StoreStats};

// Re-export schema for testing/migrations
pub use schema::{SCHEMA, SCHEMA_VERSION};
