use std::hash::Hash;
use std::sync::atomic::{AtomicU32, Ordering};

use super::hashing::stable_hash;
use crate::error::PartitionError;

pub const MAX_PARTITIONS: u32 = 8192;

/// Checks that `count` is a power of two in `[1, MAX_PARTITIONS]`.
pub fn validate_partition_count(count: u32) -> Result<(), PartitionError> {
    if count == 0 || count > MAX_PARTITIONS || !count.is_power_of_two() {
        return Err(PartitionError::InvalidPartitionCount(count));
    }
    Ok(())
}

/// Maps arbitrary keys onto `[0, partitions)` by hash-and-mask.
#[derive(Debug)]
pub struct Object2PartitionMapping {
    partitions: AtomicU32,
}

impl Object2PartitionMapping {
    pub fn new(partitions: u32) -> Result<Self, PartitionError> {
        validate_partition_count(partitions)?;
        Ok(Self {
            partitions: AtomicU32::new(partitions),
        })
    }

    pub fn partitions(&self) -> u32 {
        self.partitions.load(Ordering::Acquire)
    }

    /// Administrative reconfiguration of the partition count.
    ///
    /// Not meant to race with live `partition()` lookups: callers must serialize it
    /// against in-flight routing, and every ownership table derived from the old
    /// count has to be rebuilt afterwards.
    pub fn reset_partitions(&self, partitions: u32) -> Result<(), PartitionError> {
        validate_partition_count(partitions)?;
        let previous = self.partitions.swap(partitions, Ordering::AcqRel);
        tracing::info!("Partition count reset: {} -> {}", previous, partitions);
        Ok(())
    }

    pub fn partition<K: Hash + ?Sized>(&self, key: &K) -> u32 {
        let mask = u64::from(self.partitions() - 1);
        (stable_hash(key) & mask) as u32
    }
}
