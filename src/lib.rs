//! Devastator Node Library
//!
//! This library crate defines the modules a Devastator node is assembled from.
//! It serves as the foundation for the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! - **`partition`**: Stable key hashing, the key-to-partition mapping and the
//!   rendezvous-based allocation of partitions to owner lists, with neighbor avoidance.
//! - **`membership`**: Node identity and views, the group transport seam with its
//!   in-process implementation, the partition table and the per-node `Cluster` handle.
//! - **`engine`**: Pooled messages, wire framing and topic routing on top of the
//!   group transport (unicast, broadcast and partition-addressed sends).
//! - **`executor`**: Named worker pools and the key-affinity job scheduler.
//! - **`storage`**: RocksDB persistence with column families.
//! - **`timer`**: A hashed wheel timer for delayed one-shot tasks.
//! - **`admin`**: Read-only HTTP endpoints exposing the view, ownership and pool usage.
//! - **`config`** / **`error`**: TOML configuration and the typed error enums.

pub mod admin;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod membership;
pub mod partition;
pub mod storage;
pub mod timer;
