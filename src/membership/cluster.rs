use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::metadata::ClusterMetadata;
use super::transport::{GroupTransport, TransportListener};
use super::types::{ClusterNode, ClusterView, NodeId};
use crate::error::{ClusterError, PartitionError};

/// A published membership transition.
#[derive(Debug, Clone)]
pub struct ViewChange {
    pub old: Arc<ClusterView>,
    pub new: Arc<ClusterView>,
}

/// Local handle on cluster membership.
///
/// Holds the latest view behind an atomic pointer and keeps `ClusterMetadata` in step
/// with it. Registered as a listener on the group transport, which drives
/// `apply_view` from its single callback thread.
pub struct Cluster {
    name: String,
    local: ClusterNode,
    view: ArcSwap<ClusterView>,
    metadata: Arc<ClusterMetadata>,
    events: broadcast::Sender<ViewChange>,
    /// Serializes version check and publication in `apply_view`.
    install: Mutex<()>,
}

impl Cluster {
    /// Binds to `transport`, computes ownership for the transport's current view and
    /// subscribes to further view changes.
    ///
    /// The listener is registered before the current view is read, so a membership
    /// change racing with the bind is either delivered or already visible in that read.
    pub fn new(
        name: impl Into<String>,
        transport: &Arc<dyn GroupTransport>,
        metadata: Arc<ClusterMetadata>,
        view_queue_size: usize,
    ) -> Result<Arc<Self>, ClusterError> {
        let (events, _) = broadcast::channel(view_queue_size.max(1));
        let empty = Arc::new(ClusterView::empty());

        let cluster = Arc::new(Self {
            name: name.into(),
            local: transport.local_node().clone(),
            view: ArcSwap::new(empty.clone()),
            metadata,
            events,
            install: Mutex::new(()),
        });
        transport.add_listener(cluster.clone());

        match cluster.apply_view(empty, transport.current_view()) {
            Ok(()) | Err(ClusterError::StaleView { .. }) => {}
            Err(e) => return Err(e),
        }

        tracing::info!(
            "Cluster '{}' bound on node {} at view version {}",
            cluster.name,
            cluster.local.id,
            cluster.view().version()
        );
        Ok(cluster)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_node(&self) -> &ClusterNode {
        &self.local
    }

    pub fn view(&self) -> Arc<ClusterView> {
        self.view.load_full()
    }

    pub fn cluster_nodes(&self) -> Vec<ClusterNode> {
        self.view.load().nodes().to_vec()
    }

    pub fn member(&self, id: &NodeId) -> Option<ClusterNode> {
        self.view.load().get(id).cloned()
    }

    pub fn is_local(&self, id: &NodeId) -> bool {
        self.local.id == *id
    }

    pub fn metadata(&self) -> &Arc<ClusterMetadata> {
        &self.metadata
    }

    /// Receiver of future view changes. Slow receivers observe `Lagged` rather than
    /// holding back the transport.
    pub fn subscribe(&self) -> broadcast::Receiver<ViewChange> {
        self.events.subscribe()
    }

    /// Installs `new` if it advances the current version.
    pub fn apply_view(&self, old: Arc<ClusterView>, new: Arc<ClusterView>) -> Result<(), ClusterError> {
        let _guard = self.install.lock();
        let current = self.view.load();
        if new.version() <= current.version() {
            return Err(ClusterError::StaleView {
                offered: new.version(),
                current: current.version(),
            });
        }

        self.metadata.update(&old, &new)?;
        self.view.store(new.clone());

        tracing::info!(
            "Cluster '{}' view {} -> {} ({} members)",
            self.name,
            old.version(),
            new.version(),
            new.len()
        );

        // No subscribers is fine.
        let _ = self.events.send(ViewChange { old, new });
        Ok(())
    }

    /// Changes the partition count and rebuilds ownership for the current view.
    ///
    /// Administrative: must not run concurrently with routing that relies on the old
    /// partition numbers.
    pub fn reset_partitions(&self, partitions: u32) -> Result<(), ClusterError> {
        let _guard = self.install.lock();
        self.metadata.mapping().reset_partitions(partitions)?;
        let view = self.view();
        self.metadata.update(&view, &view)?;
        Ok(())
    }

    pub fn local_primary_partitions(&self) -> Vec<u32> {
        self.metadata.primary_partitions(&self.local.id)
    }

    pub fn local_backup_partitions(&self) -> Vec<u32> {
        self.metadata.backup_partitions(&self.local.id)
    }

    pub fn primary_and_backup_nodes(&self, partition: u32) -> Result<Vec<Arc<ClusterNode>>, PartitionError> {
        self.metadata.primary_and_backup_nodes(partition)
    }
}

impl TransportListener for Cluster {
    fn view_changed(&self, old: Arc<ClusterView>, new: Arc<ClusterView>) {
        if let Err(e) = self.apply_view(old, new) {
            tracing::warn!("Cluster '{}' ignored view change: {}", self.name, e);
        }
    }
}
