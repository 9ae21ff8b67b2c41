use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::protocol::{ErrorResponse, PartitionResponse, PoolResponse, RouteResponse, ViewResponse};
use crate::engine::DistributedEngine;
use crate::membership::Cluster;

pub async fn handle_view(Extension(cluster): Extension<Arc<Cluster>>) -> (StatusCode, Json<ViewResponse>) {
    let view = cluster.view();
    (
        StatusCode::OK,
        Json(ViewResponse {
            cluster_name: cluster.name().to_string(),
            local_node: cluster.local_node().id,
            version: view.version(),
            members: view.nodes().to_vec(),
        }),
    )
}

pub async fn handle_partition(
    Extension(cluster): Extension<Arc<Cluster>>,
    Path(partition): Path<u32>,
) -> Response {
    let table = cluster.metadata().table();
    match table.owners(partition) {
        Ok(owners) => (
            StatusCode::OK,
            Json(PartitionResponse {
                partition,
                view_version: table.view_version(),
                owners: owners.iter().map(|node| node.id).collect(),
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::debug!("Rejected partition lookup: {}", e);
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse { error: e.to_string() }),
            )
                .into_response()
        }
    }
}

pub async fn handle_route(
    Extension(cluster): Extension<Arc<Cluster>>,
    Path(key): Path<String>,
) -> (StatusCode, Json<RouteResponse>) {
    let metadata = cluster.metadata();
    let partition = metadata.partition_of(key.as_str());
    let owners = metadata.primary_and_backup_nodes(partition).unwrap_or_default();

    (
        StatusCode::OK,
        Json(RouteResponse {
            key,
            partition,
            primary: owners.first().map(|node| node.id),
            backups: owners.iter().skip(1).map(|node| node.id).collect(),
        }),
    )
}

pub async fn handle_pool(
    Extension(engine): Extension<Arc<DistributedEngine>>,
) -> (StatusCode, Json<PoolResponse>) {
    (
        StatusCode::OK,
        Json(PoolResponse {
            messages: engine.message_pool_stats(),
            buffers: engine.buffer_pool_stats(),
        }),
    )
}
