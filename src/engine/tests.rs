//! Engine Module Tests
//!
//! ## Test Scopes
//! - **Pools**: recycling, reset on release, reference-counted sharing, capacity bound.
//! - **Routing**: unicast, broadcast, byte ranges, partition-addressed sends.
//! - **Failures**: unknown destinations, closed transports and garbage frames.

#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::engine::{BincodeCodec, Codec, DistributedEngine, Message, ObjectPool, SharedMessage};
    use crate::error::{EngineError, TransportError};
    use crate::membership::{
        Cluster, ClusterMetadata, ClusterNode, GroupTransport, LocalGroup, LocalTransport,
        NeighborPolicy, NodeId,
    };
    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;

    struct TestNode {
        id: NodeId,
        transport: Arc<LocalTransport>,
        engine: Arc<DistributedEngine>,
        inbox: Arc<Mutex<Vec<SharedMessage>>>,
    }

    fn join_node(group: &LocalGroup, name: &str) -> TestNode {
        let node = ClusterNode::worker(name, "localhost");
        let id = node.id;
        let transport = group.join(node);
        let dyn_transport: Arc<dyn GroupTransport> = transport.clone();
        let metadata = Arc::new(ClusterMetadata::new(16, 1, NeighborPolicy::None).unwrap());
        let cluster = Cluster::new(group.name(), &dyn_transport, metadata, 8).unwrap();
        let config = EngineConfig {
            message_pool_size: 8,
            buffer_pool_size: 4,
        };
        let engine = DistributedEngine::new(cluster, dyn_transport, &config);

        // Keeping the shared handle holds the message out of the pool until the inbox is cleared.
        let inbox = Arc::new(Mutex::new(Vec::new()));
        let sink = inbox.clone();
        engine.register_handler("test.inbox", move |message: SharedMessage| {
            sink.lock().push(message);
        });

        TestNode { id, transport, engine, inbox }
    }

    fn send_on_topic(from: &TestNode, topic: &str, payload: &[u8], dest: Option<&NodeId>) -> Result<(), EngineError> {
        let mut message = from.engine.acquire();
        message.set_destination(dest.copied()).set_topic(topic);
        message.payload_mut().extend_from_slice(payload);
        from.engine.send_message(&message)
    }

    // ============================================================
    // TEST 1: Object pools
    // ============================================================

    #[test]
    fn test_released_message_is_reset_and_recycled() {
        // ARRANGE
        let pool: ObjectPool<Message> = ObjectPool::new(4);

        // ACT
        {
            let mut message = pool.acquire();
            message.set_topic("orders").insert_header("trace", "abc");
            message.payload_mut().extend_from_slice(b"payload");
        }
        let reused = pool.acquire();

        // ASSERT
        assert!(reused.payload().is_empty());
        assert!(reused.headers().is_empty());
        assert_eq!(reused.topic(), crate::engine::DEFAULT_TOPIC);
        assert!(reused.destination().is_none());

        let stats = pool.stats();
        assert_eq!(stats.allocated, 1);
        assert_eq!(stats.recycled, 1);
        assert_eq!(stats.outstanding, 1);
    }

    #[test]
    fn test_shared_message_returns_only_after_last_reference() {
        // ARRANGE
        let pool: ObjectPool<Message> = ObjectPool::new(4);
        let mut message = pool.acquire();
        message.payload_mut().extend_from_slice(b"fan-out");

        // ACT
        let first = message.share();
        let second = first.clone();
        let third = second.clone();

        // ASSERT
        assert_eq!(first.ref_count(), 3);
        drop(first);
        drop(second);
        assert_eq!(pool.stats().outstanding, 1);
        assert_eq!(third.payload(), b"fan-out");

        drop(third);
        let stats = pool.stats();
        assert_eq!(stats.outstanding, 0);
        assert_eq!(stats.idle, 1);
    }

    #[test]
    fn test_pool_discards_beyond_capacity() {
        let pool: ObjectPool<Message> = ObjectPool::new(2);

        let held: Vec<_> = (0..5).map(|_| pool.acquire()).collect();
        // Checkouts are not capped by capacity.
        assert_eq!(pool.stats().outstanding, 5);
        drop(held);

        let stats = pool.stats();
        assert_eq!(stats.allocated, 5);
        assert_eq!(stats.idle, 2);
        assert_eq!(stats.recycled, 2);
        assert_eq!(stats.discarded, 3);
    }

    // ============================================================
    // TEST 2: Routing
    // ============================================================

    #[test]
    fn test_unicast_reaches_only_destination() {
        // ARRANGE
        let group = LocalGroup::new("engine");
        let a = join_node(&group, "node-a");
        let b = join_node(&group, "node-b");
        let c = join_node(&group, "node-c");

        // ACT
        send_on_topic(&a, "test.inbox", b"hello", Some(&b.id)).unwrap();

        // ASSERT
        let inbox = b.inbox.lock();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].payload(), b"hello");
        assert_eq!(inbox[0].source(), Some(&a.id));
        assert_eq!(inbox[0].topic(), "test.inbox");
        assert!(c.inbox.lock().is_empty());
        assert!(a.inbox.lock().is_empty());
    }

    #[test]
    fn test_broadcast_reaches_every_member() {
        let group = LocalGroup::new("engine");
        let a = join_node(&group, "node-a");
        let b = join_node(&group, "node-b");
        let c = join_node(&group, "node-c");

        send_on_topic(&a, "test.inbox", b"all", None).unwrap();

        for node in [&a, &b, &c] {
            let inbox = node.inbox.lock();
            assert_eq!(inbox.len(), 1);
            assert_eq!(inbox[0].payload(), b"all");
        }
    }

    #[test]
    fn test_headers_travel_with_the_frame() {
        let group = LocalGroup::new("engine");
        let a = join_node(&group, "node-a");
        let b = join_node(&group, "node-b");

        let mut message = a.engine.acquire();
        message
            .set_destination(Some(b.id))
            .set_topic("test.inbox")
            .insert_header("content-type", "application/octet-stream");
        a.engine.send_message(&message).unwrap();

        let inbox = b.inbox.lock();
        assert_eq!(inbox[0].header("content-type"), Some("application/octet-stream"));
    }

    #[test]
    fn test_send_uses_default_topic() {
        // ARRANGE
        let group = LocalGroup::new("engine");
        let a = join_node(&group, "node-a");
        let b = join_node(&group, "node-b");
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        b.engine
            .register_handler(crate::engine::DEFAULT_TOPIC, move |message: SharedMessage| {
                sink.lock().push(message.payload().to_vec());
            });

        // ACT
        a.engine.send(b"raw bytes", Some(&b.id)).unwrap();

        // ASSERT
        assert_eq!(*received.lock(), vec![b"raw bytes".to_vec()]);
    }

    #[test]
    fn test_send_range_sends_slice_and_rejects_bad_range() {
        // ARRANGE
        let group = LocalGroup::new("engine");
        let a = join_node(&group, "node-a");
        let b = join_node(&group, "node-b");
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        b.engine
            .register_handler(crate::engine::DEFAULT_TOPIC, move |message: SharedMessage| {
                sink.lock().push(message.payload().to_vec());
            });

        // ACT
        a.engine.send_range(b"0123456789", 2, 3, Some(&b.id)).unwrap();
        let bad = a.engine.send_range(b"0123", 3, 5, Some(&b.id));

        // ASSERT
        assert_eq!(*received.lock(), vec![b"234".to_vec()]);
        assert!(matches!(
            bad,
            Err(EngineError::InvalidRange { offset: 3, length: 5, available: 4 })
        ));
    }

    #[test]
    fn test_send_object_round_trips_through_codec() {
        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct Heartbeat {
            node: String,
            seq: u64,
        }

        let group = LocalGroup::new("engine");
        let a = join_node(&group, "node-a");
        let b = join_node(&group, "node-b");
        let beat = Heartbeat { node: "node-a".to_string(), seq: 42 };

        a.engine
            .send_object(&BincodeCodec, "test.inbox", &beat, Some(&b.id))
            .unwrap();

        let inbox = b.inbox.lock();
        let decoded: Heartbeat = BincodeCodec.decode(inbox[0].payload()).unwrap();
        assert_eq!(decoded, beat);
    }

    #[test]
    fn test_send_to_partition_targets_current_primary() {
        // ARRANGE
        let group = LocalGroup::new("engine");
        let a = join_node(&group, "node-a");
        let b = join_node(&group, "node-b");
        let received: Arc<Mutex<Vec<NodeId>>> = Arc::new(Mutex::new(Vec::new()));
        for node in [&a, &b] {
            let sink = received.clone();
            let id = node.id;
            node.engine
                .register_handler(crate::engine::DEFAULT_TOPIC, move |_message: SharedMessage| {
                    sink.lock().push(id);
                });
        }

        // ACT
        let primary = a.engine.send_to_partition(5, b"for partition five").unwrap();

        // ASSERT
        let expected = a.engine.cluster().metadata().primary(5).unwrap().id;
        assert_eq!(primary, expected);
        assert_eq!(*received.lock(), vec![expected]);
    }

    #[test]
    fn test_inbound_messages_return_to_pool_after_handlers() {
        // ARRANGE
        let group = LocalGroup::new("engine");
        let a = join_node(&group, "node-a");
        let b = join_node(&group, "node-b");

        // ACT
        for _ in 0..3 {
            send_on_topic(&a, "test.inbox", b"x", Some(&b.id)).unwrap();
        }
        assert_eq!(b.engine.message_pool_stats().outstanding, 3);
        b.inbox.lock().clear();

        // ASSERT
        let stats = b.engine.message_pool_stats();
        assert_eq!(stats.outstanding, 0);
        assert_eq!(stats.idle, 3);
        assert_eq!(a.engine.message_pool_stats().outstanding, 0);
        assert_eq!(a.engine.buffer_pool_stats().outstanding, 0);
    }

    // ============================================================
    // TEST 3: Failures
    // ============================================================

    #[test]
    fn test_unknown_destination_is_rejected() {
        let group = LocalGroup::new("engine");
        let a = join_node(&group, "node-a");
        let stranger = NodeId::new();

        let result = a.engine.send(b"lost", Some(&stranger));

        assert!(matches!(result, Err(EngineError::UnknownDestination(id)) if id == stranger));
    }

    #[test]
    fn test_partition_out_of_range_is_rejected() {
        let group = LocalGroup::new("engine");
        let a = join_node(&group, "node-a");

        let result = a.engine.send_to_partition(16, b"x");

        assert!(matches!(result, Err(EngineError::Partition(_))));
    }

    #[test]
    fn test_send_after_leave_surfaces_transport_error() {
        // ARRANGE
        let group = LocalGroup::new("engine");
        let a = join_node(&group, "node-a");
        let b = join_node(&group, "node-b");

        // ACT: A leaves; its cached view still lists B
        assert!(group.leave(&a.id));
        let result = a.engine.send(b"too late", Some(&b.id));

        // ASSERT
        assert!(a.transport.is_closed());
        assert!(matches!(result, Err(EngineError::Transport(TransportError::Closed))));
    }

    #[test]
    fn test_garbage_frames_are_dropped() {
        let group = LocalGroup::new("engine");
        let a = join_node(&group, "node-a");
        let b = join_node(&group, "node-b");

        a.transport.send(Some(&b.id), &[0xff, 0x00, 0x13]).unwrap();

        assert!(b.inbox.lock().is_empty());
        assert_eq!(b.engine.message_pool_stats().outstanding, 0);
    }

    #[test]
    fn test_unregistered_topic_is_ignored() {
        let group = LocalGroup::new("engine");
        let a = join_node(&group, "node-a");
        let b = join_node(&group, "node-b");

        assert!(b.engine.unregister_handler("test.inbox"));
        send_on_topic(&a, "test.inbox", b"nobody home", Some(&b.id)).unwrap();

        assert!(b.inbox.lock().is_empty());
    }
}
