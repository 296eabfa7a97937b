use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::AppState;

use super::{created, ApiError};

/// List all cable routes
pub async fn list_cables(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<OfcCable>>, ApiError> {
    let cables = state.store.list_cables().await?;
    Ok(Json(cables))
}

/// Commission a cable route with its initial segment
pub async fn create_cable(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCableRequest>,
) -> Result<(StatusCode, Json<OfcCable>), ApiError> {
    let cable = state.store.create_cable(&req).await?;
    Ok(created(cable))
}

/// Route with its closures, segments and evolution status
pub async fn get_route_details(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<RouteDetails>, ApiError> {
    let details = state.store.get_route_details(id).await?;
    Ok(Json(details))
}

pub async fn deactivate_cable(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<OfcCable>, ApiError> {
    let cable = state.store.deactivate_cable(id).await?;
    Ok(Json(cable))
}

pub async fn get_segments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<CableSegment>>, ApiError> {
    let segments = state.store.get_segments_for_route(id).await?;
    Ok(Json(segments))
}

pub async fn get_waypoints(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Waypoint>>, ApiError> {
    let waypoints = state.store.get_waypoint_sequence(id).await?;
    Ok(Json(waypoints))
}

/// Fibers of the cable not committed to a logical path
pub async fn list_available_fibers(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<CableFiberAvailability>, ApiError> {
    let fibers = state.store.list_available_fibers(id).await?;
    Ok(Json(fibers))
}

/// Export the route's closures, segments and splices as three sheets
pub async fn export_topology(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<TopologySheets>, ApiError> {
    let sheets = state.store.export_route_topology(id).await?;
    Ok(Json(sheets))
}

/// Replace the route's topology with an edited export
pub async fn import_topology(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(sheets): Json<TopologySheets>,
) -> Result<Json<ImportTopologyResult>, ApiError> {
    let result = state.store.import_route_topology(id, &sheets).await?;
    Ok(Json(result))
}
