//! Cluster-aware message routing.
//!
//! `DistributedEngine` resolves destinations against the cluster view current at send
//! time, frames messages into pooled buffers and hands them to the group transport.
//! Inbound frames are decoded into pooled messages and dispatched by topic.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;

use super::codec::Codec;
use super::pool::{ObjectPool, PoolStats};
use super::protocol::{InboundFrame, Message, PooledMessage, SharedMessage, WireBuffer};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::membership::cluster::Cluster;
use crate::membership::transport::{GroupTransport, TransportListener};
use crate::membership::types::{ClusterView, NodeId};

/// Callback for inbound messages on one topic. Runs on the transport's delivery
/// thread; clone the `SharedMessage` to keep it beyond the call.
pub type MessageHandler = Arc<dyn Fn(SharedMessage) + Send + Sync>;

pub struct DistributedEngine {
    cluster: Arc<Cluster>,
    transport: Arc<dyn GroupTransport>,
    messages: ObjectPool<Message>,
    buffers: ObjectPool<WireBuffer>,
    handlers: DashMap<String, MessageHandler>,
}

impl DistributedEngine {
    pub fn new(
        cluster: Arc<Cluster>,
        transport: Arc<dyn GroupTransport>,
        config: &EngineConfig,
    ) -> Arc<Self> {
        let engine = Arc::new(Self {
            cluster,
            transport: transport.clone(),
            messages: ObjectPool::new(config.message_pool_size),
            buffers: ObjectPool::new(config.buffer_pool_size),
            handlers: DashMap::new(),
        });
        transport.add_listener(engine.clone());
        engine
    }

    pub fn cluster(&self) -> &Arc<Cluster> {
        &self.cluster
    }

    /// Checks a message out of the pool.
    pub fn acquire(&self) -> PooledMessage {
        self.messages.acquire()
    }

    /// Sends `bytes` to `dest`, or to the whole cluster when `dest` is `None`.
    pub fn send(&self, bytes: &[u8], dest: Option<&NodeId>) -> Result<(), EngineError> {
        self.send_range(bytes, 0, bytes.len(), dest)
    }

    /// Sends `bytes[offset..offset + length]`.
    pub fn send_range(
        &self,
        bytes: &[u8],
        offset: usize,
        length: usize,
        dest: Option<&NodeId>,
    ) -> Result<(), EngineError> {
        let slice = offset
            .checked_add(length)
            .and_then(|end| bytes.get(offset..end))
            .ok_or(EngineError::InvalidRange {
                offset,
                length,
                available: bytes.len(),
            })?;

        let mut message = self.acquire();
        message.set_destination(dest.copied());
        message.payload_mut().extend_from_slice(slice);
        self.send_message(&message)
    }

    /// Encodes `value` with `codec` straight into a pooled message and sends it.
    pub fn send_object<T, C>(
        &self,
        codec: &C,
        topic: &str,
        value: &T,
        dest: Option<&NodeId>,
    ) -> Result<(), EngineError>
    where
        T: Serialize + ?Sized,
        C: Codec,
    {
        let mut message = self.acquire();
        message.set_destination(dest.copied()).set_topic(topic);
        codec.encode(value, message.payload_mut())?;
        self.send_message(&message)
    }

    /// Sends to the current primary owner of `partition`.
    pub fn send_to_partition(&self, partition: u32, bytes: &[u8]) -> Result<NodeId, EngineError> {
        let primary = self
            .cluster
            .metadata()
            .primary_and_backup_nodes(partition)?
            .first()
            .map(|node| node.id)
            .ok_or(EngineError::NoOwner(partition))?;
        self.send(bytes, Some(&primary))?;
        Ok(primary)
    }

    /// Frames and transmits a prepared message. The destination is checked against the
    /// current view; delivery failures are returned unchanged.
    pub fn send_message(&self, message: &Message) -> Result<(), EngineError> {
        if let Some(dest) = message.destination()
            && !self.cluster.view().contains(dest)
        {
            return Err(EngineError::UnknownDestination(*dest));
        }

        let mut wire = self.buffers.acquire();
        bincode::serialize_into(&mut wire.0, &message.frame())?;

        if let Err(e) = self.transport.send(message.destination(), &wire.0) {
            tracing::warn!(
                "Failed to send {} bytes on '{}' to {:?}: {}",
                wire.0.len(),
                message.topic(),
                message.destination(),
                e
            );
            return Err(e.into());
        }

        tracing::trace!(
            "Sent {} byte frame on '{}' to {:?}",
            wire.0.len(),
            message.topic(),
            message.destination()
        );
        Ok(())
    }

    pub fn register_handler<F>(&self, topic: &str, handler: F)
    where
        F: Fn(SharedMessage) + Send + Sync + 'static,
    {
        self.handlers.insert(topic.to_string(), Arc::new(handler));
        tracing::info!("Registered message handler for topic '{}'", topic);
    }

    pub fn unregister_handler(&self, topic: &str) -> bool {
        self.handlers.remove(topic).is_some()
    }

    pub fn message_pool_stats(&self) -> PoolStats {
        self.messages.stats()
    }

    pub fn buffer_pool_stats(&self) -> PoolStats {
        self.buffers.stats()
    }

    fn dispatch(&self, from: NodeId, bytes: &[u8]) {
        let frame: InboundFrame<'_> = match bincode::deserialize(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Dropping undecodable frame from {}: {}", from, e);
                return;
            }
        };

        let handler = match self.handlers.get(frame.topic) {
            Some(entry) => entry.value().clone(),
            None => {
                tracing::debug!("No handler for topic '{}' (from {})", frame.topic, from);
                return;
            }
        };

        let mut message = self.acquire();
        message.fill_inbound(from, &frame);
        handler(message.share());
    }
}

impl TransportListener for DistributedEngine {
    fn view_changed(&self, _old: Arc<ClusterView>, new: Arc<ClusterView>) {
        // Destinations are resolved per send; nothing is cached here.
        tracing::debug!("Engine observed view {}", new.version());
    }

    fn on_message(&self, from: NodeId, payload: &[u8]) {
        self.dispatch(from, payload);
    }
}
