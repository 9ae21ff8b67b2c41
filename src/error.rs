//! Error types for every subsystem.
//!
//! Each concern gets its own `thiserror` enum so callers can match on the
//! failure they care about. Job handlers and the node binary wrap these in
//! `anyhow::Error`.

use std::path::PathBuf;

use thiserror::Error;

use crate::membership::types::NodeId;

/// Argument and range failures raised by the partition mappings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PartitionError {
    /// Partition counts must be a power of two in `[1, 8192]`.
    #[error("partition count {0} must be a power of two in [1, 8192]")]
    InvalidPartitionCount(u32),
    /// Allocation was requested against an empty node pool.
    #[error("cannot allocate partition {partition}: node pool is empty")]
    EmptyNodePool {
        /// Partition being allocated.
        partition: u32,
    },
    /// A partition number outside `[0, count)` was looked up.
    #[error("partition {partition} is out of range [0, {count})")]
    OutOfRange {
        /// Requested partition.
        partition: u32,
        /// Configured partition count.
        count: u32,
    },
}

/// Failures reported by the group-communication transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("destination {0} is not a member of the group")]
    UnknownDestination(NodeId),
    #[error("transport is closed")]
    Closed,
    #[error("transport i/o failure: {0}")]
    Io(String),
}

/// Failures raised while applying membership views.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// A view whose version does not advance the current one was delivered.
    #[error("stale view version {offered} (current version {current})")]
    StaleView {
        /// Version of the rejected view.
        offered: u64,
        /// Version currently published.
        current: u64,
    },
    #[error(transparent)]
    Partition(#[from] PartitionError),
}

/// Serialization failures from a payload codec.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("bincode codec error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("json codec error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures surfaced by `DistributedEngine` sends.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("node {0} is not part of the current cluster view")]
    UnknownDestination(NodeId),
    #[error("partition {0} has no owner in the current view")]
    NoOwner(u32),
    #[error("byte range {offset}+{length} exceeds buffer of {available} bytes")]
    InvalidRange {
        offset: usize,
        length: usize,
        available: usize,
    },
    #[error("failed to frame message: {0}")]
    Frame(#[from] bincode::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Partition(#[from] PartitionError),
    #[error("send failed: {0}")]
    Transport(#[from] TransportError),
}

/// Failures from `PersistStorage`.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("rocksdb error: {0}")]
    Rocksdb(#[from] rocksdb::Error),
    #[error("column family '{0}' does not exist")]
    MissingColumnFamily(String),
    #[error("column family '{0}' already exists")]
    ColumnFamilyExists(String),
    #[error("the default column family cannot be dropped")]
    DefaultColumnFamily,
    #[error("invalid range: lower bound sorts after upper bound")]
    InvalidRange,
    #[error("failed to create data directory {path}: {source}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Lifecycle and submission failures from `HashedWheelTimer`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimerError {
    #[error("a timer-owned thread cannot start or stop its own timer")]
    SelfLifecycle,
    #[error("timer has been stopped and cannot be restarted")]
    Terminated,
    #[error("timer is not running")]
    NotRunning,
    #[error("submission queue is full ({capacity} pending timeouts)")]
    QueueFull {
        /// Capacity of the submission queue.
        capacity: usize,
    },
    #[error("failed to spawn timer thread: {0}")]
    Spawn(String),
}

/// Routing failures from `DistributedJobScheduler`.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no executor named '{0}'")]
    UnknownExecutor(String),
    #[error("no job handler registered as '{0}'")]
    UnknownHandler(String),
    #[error("executor '{0}' queue is full")]
    Saturated(String),
    #[error("executor '{0}' is shut down")]
    Closed(String),
    #[error("failed to forward job: {0}")]
    Forward(#[from] EngineError),
}

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    Partition(#[from] PartitionError),
}
