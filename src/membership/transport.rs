//! Boundary to the group-communication layer.
//!
//! The layer itself (discovery, failure detection, reliable delivery) lives outside
//! this crate. It delivers membership views and raw messages to registered listeners
//! and offers a broadcast/unicast send primitive.

use std::sync::Arc;

use super::types::{ClusterNode, ClusterView, NodeId};
use crate::error::TransportError;

/// Receives callbacks from a `GroupTransport`.
///
/// View changes are delivered one at a time from a single callback thread, in version
/// order. Implementations must not call back into membership operations of the same
/// transport from `view_changed`.
pub trait TransportListener: Send + Sync {
    fn view_changed(&self, _old: Arc<ClusterView>, _new: Arc<ClusterView>) {}

    fn on_message(&self, _from: NodeId, _payload: &[u8]) {}
}

pub trait GroupTransport: Send + Sync {
    fn local_node(&self) -> &ClusterNode;

    /// The most recently installed view.
    fn current_view(&self) -> Arc<ClusterView>;

    fn add_listener(&self, listener: Arc<dyn TransportListener>);

    /// Sends `payload` to `dest`, or to every member when `dest` is `None`.
    ///
    /// No retries are attempted; any failure is returned to the caller.
    fn send(&self, dest: Option<&NodeId>, payload: &[u8]) -> Result<(), TransportError>;
}
