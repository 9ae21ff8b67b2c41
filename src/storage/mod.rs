//! Persistent Storage Module
//!
//! Column-family scoped key-value storage on top of an embedded RocksDB instance.
//!
//! ## Core Concepts
//! - **Column families**: Every operation targets the `default` family or a named one.
//!   Families on disk are reopened automatically; new ones can be created at runtime.
//! - **Batches**: `put_all`, `multi_remove` and `delete_range` are applied atomically per call.
//! - **Streaming**: `iterate` walks a family in key order and stops when the visitor says so.
//! - **Shutdown**: `close` flushes all families. Dropping an unclosed store flushes too.

pub mod persist;

pub use persist::{DEFAULT_COLUMN_FAMILY, PersistStorage};

#[cfg(test)]
mod tests;
