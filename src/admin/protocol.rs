//! Admin HTTP Protocol
//!
//! Endpoints and response bodies of the read-only inspection API. Everything is
//! served as JSON.

use serde::{Deserialize, Serialize};

use crate::engine::PoolStats;
use crate::membership::types::{ClusterNode, NodeId};

// --- API Endpoints ---

/// Current membership view.
pub const ENDPOINT_VIEW: &str = "/cluster/view";
/// Owners of one partition.
pub const ENDPOINT_PARTITION: &str = "/cluster/partitions/:partition";
/// Partition and owners a key routes to.
pub const ENDPOINT_ROUTE: &str = "/cluster/route/:key";
/// Engine pool counters.
pub const ENDPOINT_POOL: &str = "/engine/pool";

// --- Data Transfer Objects ---

#[derive(Debug, Serialize, Deserialize)]
pub struct ViewResponse {
    pub cluster_name: String,
    pub local_node: NodeId,
    pub version: u64,
    pub members: Vec<ClusterNode>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PartitionResponse {
    pub partition: u32,
    /// View the ownership table was computed for.
    pub view_version: u64,
    /// Primary first, then backups. Empty when no worker is available.
    pub owners: Vec<NodeId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RouteResponse {
    pub key: String,
    pub partition: u32,
    pub primary: Option<NodeId>,
    pub backups: Vec<NodeId>,
}

#[derive(Debug, Serialize)]
pub struct PoolResponse {
    pub messages: PoolStats,
    pub buffers: PoolStats,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
