use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::AppState;

use super::{created, ApiError};

/// List all nodes
pub async fn list_nodes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Node>>, ApiError> {
    let nodes = state.store.list_nodes().await?;
    Ok(Json(nodes))
}

/// Get a single node by ID
pub async fn get_node(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Node>, ApiError> {
    let node = state.store.get_node(id).await?;
    Ok(Json(node))
}

/// Create a new node
pub async fn create_node(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateNodeRequest>,
) -> Result<(StatusCode, Json<Node>), ApiError> {
    let node = state.store.create_node(&req).await?;
    Ok(created(node))
}

/// List all systems
pub async fn list_systems(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<System>>, ApiError> {
    let systems = state.store.list_systems().await?;
    Ok(Json(systems))
}

pub async fn get_system(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<System>, ApiError> {
    let system = state.store.get_system(id).await?;
    Ok(Json(system))
}

/// Create a new system
pub async fn create_system(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSystemRequest>,
) -> Result<(StatusCode, Json<System>), ApiError> {
    let system = state.store.create_system(&req).await?;
    Ok(created(system))
}
