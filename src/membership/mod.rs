//! Membership & Ownership Module
//!
//! Tracks cluster membership as versioned, immutable views and keeps the partition
//! ownership table in step with them.
//!
//! ## Core Mechanisms
//! - **Views**: the group-communication layer delivers `(old, new)` view pairs from a
//!   single callback thread. Each view is an `Arc<ClusterView>` that is never mutated.
//! - **Ownership**: on every view change `ClusterMetadata` recomputes primary/backup
//!   owners for all partitions and swaps the new table in atomically.
//! - **Transport boundary**: `GroupTransport` abstracts the external group layer;
//!   `LocalGroup` implements it in-process.

pub mod cluster;
pub mod local;
pub mod metadata;
pub mod transport;
pub mod types;

pub use cluster::{Cluster, ViewChange};
pub use local::{LocalGroup, LocalTransport};
pub use metadata::{ClusterMetadata, NeighborPolicy, PartitionTable};
pub use transport::{GroupTransport, TransportListener};
pub use types::{AttributeKey, ClusterNode, ClusterView, HasNodeId, NodeAttributes, NodeId, NodeRole};
