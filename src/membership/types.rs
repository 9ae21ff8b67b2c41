use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Globally unique, totally ordered node identity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Anything that can be placed on the partition ring.
pub trait HasNodeId {
    fn node_id(&self) -> &NodeId;
}

impl HasNodeId for NodeId {
    fn node_id(&self) -> &NodeId {
        self
    }
}

impl<T: HasNodeId> HasNodeId for Arc<T> {
    fn node_id(&self) -> &NodeId {
        self.as_ref().node_id()
    }
}

/// Whether a member holds partitions (`Worker`) or only talks to the cluster (`Client`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    #[default]
    Worker,
    Client,
}

/// Attribute keys understood by the placement layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKey {
    Zone,
    Rack,
    HostGroup,
    Weight,
}

impl AttributeKey {
    pub const ALL: [AttributeKey; 4] = [Self::Zone, Self::Rack, Self::HostGroup, Self::Weight];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zone => "zone",
            Self::Rack => "rack",
            Self::HostGroup => "host_group",
            Self::Weight => "weight",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }
}

/// Typed node attributes with an opaque bag for keys this version does not know.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NodeAttributes {
    pub zone: Option<String>,
    pub rack: Option<String>,
    pub host_group: Option<String>,
    pub weight: Option<u32>,
    pub extra: BTreeMap<String, String>,
}

impl NodeAttributes {
    /// Builds attributes from a flat string map. Known keys are typed; everything else,
    /// including a `weight` that is not a number, lands in `extra`.
    pub fn from_map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut attrs = Self::default();
        for (key, value) in entries {
            let key = key.into();
            let value = value.into();
            match AttributeKey::parse(&key) {
                Some(AttributeKey::Zone) => attrs.zone = Some(value),
                Some(AttributeKey::Rack) => attrs.rack = Some(value),
                Some(AttributeKey::HostGroup) => attrs.host_group = Some(value),
                Some(AttributeKey::Weight) => match value.parse() {
                    Ok(weight) => attrs.weight = Some(weight),
                    Err(_) => {
                        tracing::warn!("Ignoring non-numeric node weight '{}'", value);
                        attrs.extra.insert(key, value);
                    }
                },
                None => {
                    attrs.extra.insert(key, value);
                }
            }
        }
        attrs
    }

    pub fn get(&self, key: AttributeKey) -> Option<String> {
        match key {
            AttributeKey::Zone => self.zone.clone(),
            AttributeKey::Rack => self.rack.clone(),
            AttributeKey::HostGroup => self.host_group.clone(),
            AttributeKey::Weight => self.weight.map(|w| w.to_string()),
        }
    }

    /// Correlated-failure grouping: the rack, or the host group when no rack is set.
    pub fn failure_domain(&self) -> Option<&str> {
        self.rack.as_deref().or(self.host_group.as_deref())
    }
}

/// A cluster member as seen in one view. Never mutated after publication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterNode {
    pub id: NodeId,
    pub role: NodeRole,
    pub host_name: String,
    pub instance_name: String,
    pub attributes: NodeAttributes,
}

impl ClusterNode {
    pub fn new(instance_name: impl Into<String>, host_name: impl Into<String>, role: NodeRole) -> Self {
        Self {
            id: NodeId::new(),
            role,
            host_name: host_name.into(),
            instance_name: instance_name.into(),
            attributes: NodeAttributes::default(),
        }
    }

    pub fn worker(instance_name: impl Into<String>, host_name: impl Into<String>) -> Self {
        Self::new(instance_name, host_name, NodeRole::Worker)
    }

    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = id;
        self
    }

    pub fn with_attributes(mut self, attributes: NodeAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn is_worker(&self) -> bool {
        self.role == NodeRole::Worker
    }
}

impl HasNodeId for ClusterNode {
    fn node_id(&self) -> &NodeId {
        &self.id
    }
}

/// Versioned, ordered membership snapshot.
///
/// Views are shared as `Arc<ClusterView>` and never modified in place; a membership
/// change produces a new view with a strictly greater version.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterView {
    version: u64,
    nodes: Vec<ClusterNode>,
}

impl ClusterView {
    pub fn new(version: u64, nodes: Vec<ClusterNode>) -> Self {
        Self { version, nodes }
    }

    /// The view before any member has joined.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn nodes(&self) -> &[ClusterNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &NodeId) -> Option<&ClusterNode> {
        self.nodes.iter().find(|node| &node.id == id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn workers(&self) -> impl Iterator<Item = &ClusterNode> {
        self.nodes.iter().filter(|node| node.is_worker())
    }

    /// Successor view with `node` appended.
    pub fn with_member(&self, node: ClusterNode) -> Self {
        let mut nodes = self.nodes.clone();
        nodes.retain(|existing| existing.id != node.id);
        nodes.push(node);
        Self::new(self.version + 1, nodes)
    }

    /// Successor view without `id`.
    pub fn without_member(&self, id: &NodeId) -> Self {
        let nodes = self
            .nodes
            .iter()
            .filter(|node| &node.id != id)
            .cloned()
            .collect();
        Self::new(self.version + 1, nodes)
    }
}
