//! Partition ownership derived from membership views.
//!
//! Every view change rebuilds the whole table off to the side and publishes it with a
//! single atomic pointer swap, so readers see either the old table or the new one.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::hash::Hash;
use std::sync::Arc;

use super::types::{ClusterNode, ClusterView, NodeId};
use crate::error::{ClusterError, PartitionError};
use crate::partition::{Neighborhood, Object2PartitionMapping, allocate_partition};

/// How neighbor relations are obtained when allocating partitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NeighborPolicy {
    /// No placement constraints.
    #[default]
    None,
    /// Nodes sharing a rack (or host group) are neighbors.
    FailureDomain,
}

/// Immutable ownership table for one view.
#[derive(Debug)]
pub struct PartitionTable {
    view_version: u64,
    owners: Vec<Vec<Arc<ClusterNode>>>,
}

impl PartitionTable {
    fn unassigned(view_version: u64, partitions: u32) -> Self {
        Self {
            view_version,
            owners: vec![Vec::new(); partitions as usize],
        }
    }

    pub fn view_version(&self) -> u64 {
        self.view_version
    }

    pub fn partitions(&self) -> u32 {
        self.owners.len() as u32
    }

    pub fn owners(&self, partition: u32) -> Result<&[Arc<ClusterNode>], PartitionError> {
        self.owners
            .get(partition as usize)
            .map(Vec::as_slice)
            .ok_or(PartitionError::OutOfRange {
                partition,
                count: self.partitions(),
            })
    }

    pub fn primary(&self, partition: u32) -> Option<&Arc<ClusterNode>> {
        self.owners.get(partition as usize).and_then(|owners| owners.first())
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &[Arc<ClusterNode>])> {
        self.owners
            .iter()
            .enumerate()
            .map(|(partition, owners)| (partition as u32, owners.as_slice()))
    }
}

pub struct ClusterMetadata {
    mapping: Object2PartitionMapping,
    backup_num: usize,
    policy: NeighborPolicy,
    static_neighbors: Neighborhood,
    table: ArcSwap<PartitionTable>,
}

impl ClusterMetadata {
    pub fn new(
        partitions: u32,
        backup_num: usize,
        policy: NeighborPolicy,
    ) -> Result<Self, PartitionError> {
        let mapping = Object2PartitionMapping::new(partitions)?;
        Ok(Self {
            mapping,
            backup_num,
            policy,
            static_neighbors: Neighborhood::new(),
            table: ArcSwap::from_pointee(PartitionTable::unassigned(0, partitions)),
        })
    }

    /// Adds explicitly declared neighbor pairs on top of the policy-derived ones.
    pub fn with_neighbors(mut self, neighbors: Neighborhood) -> Self {
        self.static_neighbors = neighbors;
        self
    }

    pub fn backup_num(&self) -> usize {
        self.backup_num
    }

    pub fn partitions(&self) -> u32 {
        self.mapping.partitions()
    }

    pub fn mapping(&self) -> &Object2PartitionMapping {
        &self.mapping
    }

    pub fn partition_of<K: Hash + ?Sized>(&self, key: &K) -> u32 {
        self.mapping.partition(key)
    }

    /// Recomputes ownership for `new_view` and publishes it atomically.
    pub fn update(&self, old_view: &ClusterView, new_view: &ClusterView) -> Result<(), ClusterError> {
        let workers: Vec<Arc<ClusterNode>> = new_view.workers().cloned().map(Arc::new).collect();
        let partitions = self.mapping.partitions();

        let table = if workers.is_empty() {
            tracing::warn!(
                "View {} has no worker nodes; all {} partitions are unassigned",
                new_view.version(),
                partitions
            );
            PartitionTable::unassigned(new_view.version(), partitions)
        } else {
            let neighborhood = self.neighborhood_for(new_view);
            let mut owners = Vec::with_capacity(partitions as usize);
            for partition in 0..partitions {
                owners.push(allocate_partition(
                    partition,
                    self.backup_num,
                    &workers,
                    neighborhood.as_ref(),
                )?);
            }
            PartitionTable {
                view_version: new_view.version(),
                owners,
            }
        };

        let previous = self.table.swap(Arc::new(table));
        let current = self.table.load();
        let moved = current
            .iter()
            .filter(|(partition, owners)| {
                previous.primary(*partition).map(|node| node.id) != owners.first().map(|node| node.id)
            })
            .count();

        tracing::info!(
            "Partition table rebuilt for view {} -> {}: {} workers, {} of {} primaries moved",
            old_view.version(),
            new_view.version(),
            workers.len(),
            moved,
            partitions
        );
        Ok(())
    }

    fn neighborhood_for(&self, view: &ClusterView) -> Option<Neighborhood> {
        let mut neighborhood = match self.policy {
            NeighborPolicy::None => Neighborhood::new(),
            NeighborPolicy::FailureDomain => Neighborhood::from_failure_domains(view.workers()),
        };
        for node in view.workers() {
            if let Some(declared) = self.static_neighbors.neighbors_of(&node.id) {
                for other in declared {
                    neighborhood.declare(node.id, *other);
                }
            }
        }
        (!neighborhood.is_empty()).then_some(neighborhood)
    }

    pub fn table(&self) -> Arc<PartitionTable> {
        self.table.load_full()
    }

    pub fn primary_and_backup_nodes(&self, partition: u32) -> Result<Vec<Arc<ClusterNode>>, PartitionError> {
        Ok(self.table.load().owners(partition)?.to_vec())
    }

    pub fn primary(&self, partition: u32) -> Option<Arc<ClusterNode>> {
        self.table.load().primary(partition).cloned()
    }

    pub fn owners_of_key<K: Hash + ?Sized>(&self, key: &K) -> Vec<Arc<ClusterNode>> {
        let partition = self.partition_of(key);
        self.primary_and_backup_nodes(partition).unwrap_or_default()
    }

    pub fn primary_partitions(&self, node: &NodeId) -> Vec<u32> {
        self.table
            .load()
            .iter()
            .filter(|(_, owners)| owners.first().is_some_and(|owner| &owner.id == node))
            .map(|(partition, _)| partition)
            .collect()
    }

    pub fn backup_partitions(&self, node: &NodeId) -> Vec<u32> {
        self.table
            .load()
            .iter()
            .filter(|(_, owners)| owners.iter().skip(1).any(|owner| &owner.id == node))
            .map(|(partition, _)| partition)
            .collect()
    }
}
