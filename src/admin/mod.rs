//! Admin HTTP Module
//!
//! Read-only JSON endpoints for inspecting a running node: the membership view, the
//! owners of a partition, where a key routes, and engine pool usage.
//!
//! ## Submodules
//! - **`protocol`**: Endpoint paths and response DTOs.
//! - **`handlers`**: axum handlers reading from the shared `Cluster` and `DistributedEngine`.

pub mod handlers;
pub mod protocol;

use axum::{Router, extract::Extension, routing::get};
use std::sync::Arc;

use crate::engine::DistributedEngine;
use crate::membership::Cluster;
use handlers::{handle_partition, handle_pool, handle_route, handle_view};
use protocol::{ENDPOINT_PARTITION, ENDPOINT_POOL, ENDPOINT_ROUTE, ENDPOINT_VIEW};

pub fn router(cluster: Arc<Cluster>, engine: Arc<DistributedEngine>) -> Router {
    Router::new()
        .route(ENDPOINT_VIEW, get(handle_view))
        .route(ENDPOINT_PARTITION, get(handle_partition))
        .route(ENDPOINT_ROUTE, get(handle_route))
        .route(ENDPOINT_POOL, get(handle_pool))
        .layer(Extension(cluster))
        .layer(Extension(engine))
}
