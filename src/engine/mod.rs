//! Distributed Engine Module
//!
//! Moves bytes between cluster members over the group transport.
//!
//! ## Submodules
//! - **`pool`**: bounded object pools. Checked-out objects are RAII guards; sharing a
//!   message with several consumers goes through a reference-counted handle, and the
//!   object is reset and recycled when the last handle drops.
//! - **`protocol`**: the pooled `Message` type and the bincode wire frame.
//! - **`codec`**: pluggable payload codecs (`BincodeCodec`, `JsonCodec`).
//! - **`engine`**: `DistributedEngine`, which resolves destinations against the current
//!   view, sends without retrying, and dispatches inbound frames by topic.

pub mod codec;
pub mod engine;
pub mod pool;
pub mod protocol;

pub use codec::{BincodeCodec, Codec, JsonCodec};
pub use engine::{DistributedEngine, MessageHandler};
pub use pool::{ObjectPool, PoolStats, Pooled, Recyclable, Shared};
pub use protocol::{DEFAULT_TOPIC, Message, PooledMessage, SharedMessage, WireBuffer};

#[cfg(test)]
mod tests;
