use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::AppState;

use super::{created, ApiError};

/// List logical paths, optionally for one ring
pub async fn list_logical_paths(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogicalPathQuery>,
) -> Result<Json<Vec<LogicalPath>>, ApiError> {
    let paths = state.store.list_logical_paths(&query).await?;
    Ok(Json(paths))
}

pub async fn get_logical_path(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<LogicalPath>, ApiError> {
    let path = state.store.get_logical_path(id).await?;
    Ok(Json(path))
}

pub async fn create_logical_path(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateLogicalPathRequest>,
) -> Result<(StatusCode, Json<LogicalPath>), ApiError> {
    let path = state.store.create_logical_path(&req).await?;
    Ok(created(path))
}

/// Trace steps stored by the last sync
pub async fn list_path_elements(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<LogicalPathElement>>, ApiError> {
    let elements = state.store.list_path_elements(id).await?;
    Ok(Json(elements))
}

pub async fn list_path_assignments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<FiberAssignment>>, ApiError> {
    let assignments = state.store.list_path_assignments(id).await?;
    Ok(Json(assignments))
}

pub async fn list_path_available_fibers(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<PathFiberAvailability>, ApiError> {
    let availability = state.store.list_path_available_fibers(id).await?;
    Ok(Json(availability))
}

/// Live trace of the path's start fiber
pub async fn trace_logical_path(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<FiberTrace>, ApiError> {
    let trace = state.store.trace_logical_path(id).await?;
    Ok(Json(trace))
}

/// Trace the path and store the result as its physical backing
pub async fn sync_logical_path(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    body: Option<Json<SyncPathRequest>>,
) -> Result<Json<LogicalPath>, ApiError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let path = state.store.sync_logical_path(id, &req).await?;
    Ok(Json(path))
}

pub async fn reverse_logical_path(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<LogicalPath>, ApiError> {
    let path = state.store.reverse_logical_path(id).await?;
    Ok(Json(path))
}

/// Commit a Tx/Rx fiber pair to a system on this path
pub async fn assign_system_to_fibers(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<AssignFibersRequest>,
) -> Result<Json<LogicalPath>, ApiError> {
    let path = state.store.assign_system_to_fibers(id, &req).await?;
    Ok(Json(path))
}

pub async fn deprovision_logical_path(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<LogicalPath>, ApiError> {
    let path = state.store.deprovision_logical_path(id).await?;
    Ok(Json(path))
}
