//! Partitioning Module
//!
//! Maps objects to partitions and partitions to owning nodes.
//!
//! ## Core Concepts
//! - **Object2PartitionMapping**: a key is hashed with a platform-stable hash and masked
//!   into `[0, partitionCount)`. The partition count is a power of two in `[1, 8192]`.
//! - **Partition2NodesMapping**: each partition is ranked against every node with
//!   rendezvous (highest-random-weight) hashing. The top `backupNum + 1` nodes own it,
//!   the first being the primary.
//! - **Neighborhoods**: nodes that share a failure domain are never placed in the same
//!   ownership list unless the pool is too small to avoid it.
//!
//! Both mappings are pure functions over their inputs and are safe to call from any thread.

pub mod allocation;
pub mod hashing;
pub mod neighborhood;
pub mod object;

pub use allocation::allocate_partition;
pub use neighborhood::Neighborhood;
pub use object::{MAX_PARTITIONS, Object2PartitionMapping, validate_partition_count};
