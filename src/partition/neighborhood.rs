use std::collections::{BTreeMap, HashMap, HashSet};

use crate::membership::types::{ClusterNode, NodeId};

/// Declared failure-domain adjacency between nodes.
///
/// The relation is treated as symmetric: if either node lists the other, the pair are
/// neighbors and should not hold replicas of the same partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Neighborhood {
    neighbors: HashMap<NodeId, HashSet<NodeId>>,
}

impl Neighborhood {
    pub fn new() -> Self {
        Self::default()
    }

    /// Groups nodes by `NodeAttributes::failure_domain`; nodes in the same domain are
    /// mutual neighbors. Nodes without a domain have no neighbors.
    pub fn from_failure_domains<'a, I>(nodes: I) -> Self
    where
        I: IntoIterator<Item = &'a ClusterNode>,
    {
        let mut domains: BTreeMap<&str, Vec<NodeId>> = BTreeMap::new();
        for node in nodes {
            if let Some(domain) = node.attributes.failure_domain() {
                domains.entry(domain).or_default().push(node.id);
            }
        }

        let mut neighborhood = Self::new();
        for members in domains.values() {
            for (i, a) in members.iter().enumerate() {
                for b in &members[i + 1..] {
                    neighborhood.declare(*a, *b);
                }
            }
        }
        neighborhood
    }

    pub fn declare(&mut self, a: NodeId, b: NodeId) {
        if a == b {
            return;
        }
        self.neighbors.entry(a).or_default().insert(b);
        self.neighbors.entry(b).or_default().insert(a);
    }

    pub fn are_neighbors(&self, a: &NodeId, b: &NodeId) -> bool {
        self.neighbors.get(a).is_some_and(|set| set.contains(b))
    }

    pub fn neighbors_of(&self, node: &NodeId) -> Option<&HashSet<NodeId>> {
        self.neighbors.get(node)
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}

impl FromIterator<(NodeId, NodeId)> for Neighborhood {
    fn from_iter<T: IntoIterator<Item = (NodeId, NodeId)>>(iter: T) -> Self {
        let mut neighborhood = Self::new();
        for (a, b) in iter {
            neighborhood.declare(a, b);
        }
        neighborhood
    }
}
