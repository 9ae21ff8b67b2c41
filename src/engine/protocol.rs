//! Message and wire-frame definitions.
//!
//! A frame is a bincode-encoded `(topic, headers, payload)` triple. Outbound frames
//! borrow from the pooled `Message`; inbound frames borrow topic and payload straight
//! from the received bytes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::pool::{Pooled, Recyclable, Shared};
use crate::membership::types::NodeId;

pub const DEFAULT_TOPIC: &str = "devastator.default";

/// Buffers larger than this are dropped on reset instead of being kept in the pool.
const MAX_RETAINED_CAPACITY: usize = 64 * 1024;

/// A routable message: destination, topic, headers and payload.
#[derive(Debug, Default)]
pub struct Message {
    destination: Option<NodeId>,
    source: Option<NodeId>,
    topic: String,
    headers: BTreeMap<String, String>,
    payload: Vec<u8>,
}

impl Message {
    pub fn destination(&self) -> Option<&NodeId> {
        self.destination.as_ref()
    }

    pub fn set_destination(&mut self, destination: Option<NodeId>) -> &mut Self {
        self.destination = destination;
        self
    }

    /// Sender of an inbound message. `None` for locally built messages.
    pub fn source(&self) -> Option<&NodeId> {
        self.source.as_ref()
    }

    pub fn topic(&self) -> &str {
        if self.topic.is_empty() {
            DEFAULT_TOPIC
        } else {
            &self.topic
        }
    }

    pub fn set_topic(&mut self, topic: &str) -> &mut Self {
        self.topic.clear();
        self.topic.push_str(topic);
        self
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn insert_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut Vec<u8> {
        &mut self.payload
    }

    pub(crate) fn fill_inbound(&mut self, from: NodeId, frame: &InboundFrame<'_>) {
        self.source = Some(from);
        self.set_topic(frame.topic);
        self.headers.extend(frame.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.payload.extend_from_slice(frame.payload);
    }

    pub(crate) fn frame(&self) -> OutboundFrame<'_> {
        OutboundFrame {
            topic: self.topic(),
            headers: &self.headers,
            payload: &self.payload,
        }
    }
}

impl Recyclable for Message {
    fn reset(&mut self) {
        self.destination = None;
        self.source = None;
        self.topic.clear();
        self.headers.clear();
        self.payload.clear();
        if self.payload.capacity() > MAX_RETAINED_CAPACITY {
            self.payload = Vec::new();
        }
    }
}

pub type PooledMessage = Pooled<Message>;
pub type SharedMessage = Shared<Message>;

/// Scratch buffer the engine encodes frames into.
#[derive(Debug, Default)]
pub struct WireBuffer(pub Vec<u8>);

impl Recyclable for WireBuffer {
    fn reset(&mut self) {
        self.0.clear();
        if self.0.capacity() > MAX_RETAINED_CAPACITY {
            self.0 = Vec::new();
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct OutboundFrame<'a> {
    pub topic: &'a str,
    pub headers: &'a BTreeMap<String, String>,
    pub payload: &'a [u8],
}

#[derive(Debug, Deserialize)]
pub(crate) struct InboundFrame<'a> {
    #[serde(borrow)]
    pub topic: &'a str,
    pub headers: BTreeMap<String, String>,
    #[serde(borrow)]
    pub payload: &'a [u8],
}
