//! In-process group transport.
//!
//! `LocalGroup` stands in for the external group-communication layer when every member
//! lives in the same process: single-node deployments, embedded use and tests. Joins and
//! leaves install a new view with a strictly greater version and notify all members'
//! listeners while holding the group's membership lock, so view callbacks are
//! serialized exactly as a real group layer would deliver them.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use super::transport::{GroupTransport, TransportListener};
use super::types::{ClusterNode, ClusterView, NodeId};
use crate::error::TransportError;

struct GroupInner {
    name: String,
    view: RwLock<Arc<ClusterView>>,
    members: DashMap<NodeId, Arc<LocalTransport>>,
    membership_lock: Mutex<()>,
}

/// A named in-process group of members.
#[derive(Clone)]
pub struct LocalGroup {
    inner: Arc<GroupInner>,
}

impl LocalGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(GroupInner {
                name: name.into(),
                view: RwLock::new(Arc::new(ClusterView::empty())),
                members: DashMap::new(),
                membership_lock: Mutex::new(()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn view(&self) -> Arc<ClusterView> {
        self.inner.view.read().clone()
    }

    /// Adds `node` to the group and returns its transport endpoint.
    pub fn join(&self, node: ClusterNode) -> Arc<LocalTransport> {
        let _guard = self.inner.membership_lock.lock();

        let transport = Arc::new(LocalTransport {
            local: node.clone(),
            group: Arc::downgrade(&self.inner),
            listeners: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        self.inner.members.insert(node.id, transport.clone());

        let old = self.view();
        let new = Arc::new(old.with_member(node.clone()));
        *self.inner.view.write() = new.clone();

        tracing::info!(
            "Node {} ({}) joined group '{}', view version {} with {} members",
            node.id,
            node.instance_name,
            self.inner.name,
            new.version(),
            new.len()
        );

        self.notify_view(&old, &new);
        transport
    }

    /// Removes `id` from the group. Returns `false` if it was not a member.
    pub fn leave(&self, id: &NodeId) -> bool {
        let _guard = self.inner.membership_lock.lock();

        let Some((_, transport)) = self.inner.members.remove(id) else {
            return false;
        };
        transport.closed.store(true, Ordering::Release);

        let old = self.view();
        let new = Arc::new(old.without_member(id));
        *self.inner.view.write() = new.clone();

        tracing::info!(
            "Node {} left group '{}', view version {} with {} members",
            id,
            self.inner.name,
            new.version(),
            new.len()
        );

        self.notify_view(&old, &new);
        true
    }

    fn notify_view(&self, old: &Arc<ClusterView>, new: &Arc<ClusterView>) {
        let members: Vec<Arc<LocalTransport>> = self
            .inner
            .members
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        for member in members {
            for listener in member.listeners() {
                listener.view_changed(old.clone(), new.clone());
            }
        }
    }
}

/// One member's endpoint in a `LocalGroup`.
pub struct LocalTransport {
    local: ClusterNode,
    group: Weak<GroupInner>,
    listeners: RwLock<Vec<Arc<dyn TransportListener>>>,
    closed: AtomicBool,
}

impl LocalTransport {
    fn listeners(&self) -> Vec<Arc<dyn TransportListener>> {
        self.listeners.read().clone()
    }

    fn deliver(&self, from: NodeId, payload: &[u8]) {
        for listener in self.listeners() {
            listener.on_message(from, payload);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl GroupTransport for LocalTransport {
    fn local_node(&self) -> &ClusterNode {
        &self.local
    }

    fn current_view(&self) -> Arc<ClusterView> {
        match self.group.upgrade() {
            Some(group) => group.view.read().clone(),
            None => Arc::new(ClusterView::empty()),
        }
    }

    fn add_listener(&self, listener: Arc<dyn TransportListener>) {
        self.listeners.write().push(listener);
    }

    /// Delivers synchronously on the caller's thread. Broadcasts include the sender.
    fn send(&self, dest: Option<&NodeId>, payload: &[u8]) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let group = self.group.upgrade().ok_or(TransportError::Closed)?;

        match dest {
            Some(id) => {
                let target = group
                    .members
                    .get(id)
                    .map(|entry| entry.value().clone())
                    .ok_or(TransportError::UnknownDestination(*id))?;
                target.deliver(self.local.id, payload);
            }
            None => {
                let targets: Vec<Arc<LocalTransport>> = group
                    .members
                    .iter()
                    .map(|entry| entry.value().clone())
                    .collect();
                for target in targets {
                    target.deliver(self.local.id, payload);
                }
            }
        }

        tracing::trace!(
            "Sent {} bytes from {} to {}",
            payload.len(),
            self.local.id,
            dest.map_or_else(|| "all".to_string(), |id| id.to_string())
        );
        Ok(())
    }
}
