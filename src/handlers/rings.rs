use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::AppState;

use super::{created, ApiError};

pub async fn list_rings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Ring>>, ApiError> {
    let rings = state.store.list_rings().await?;
    Ok(Json(rings))
}

pub async fn create_ring(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRingRequest>,
) -> Result<(StatusCode, Json<Ring>), ApiError> {
    let ring = state.store.create_ring(&req).await?;
    Ok(created(ring))
}

/// Ring members in ring order
pub async fn list_ring_nodes(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<RingNode>>, ApiError> {
    let nodes = state.store.list_ring_nodes(id).await?;
    Ok(Json(nodes))
}

pub async fn add_ring_node(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<AddRingNodeRequest>,
) -> Result<(StatusCode, Json<Vec<RingNode>>), ApiError> {
    let nodes = state.store.add_ring_node(id, &req).await?;
    Ok(created(nodes))
}

/// Create planned paths between adjacent ring nodes and drop stale ones
pub async fn generate_paths(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<GenerateRingPathsResult>, ApiError> {
    let result = state.store.generate_ring_connection_paths(id).await?;
    Ok(Json(result))
}
