use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::AppState;

use super::{created, ApiError};

/// Insert a closure into a route, splitting the segment under it
pub async fn add_junction_closure(
    State(state): State<Arc<AppState>>,
    Path(route_id): Path<i64>,
    Json(req): Json<AddJunctionClosureRequest>,
) -> Result<(StatusCode, Json<JunctionClosure>), ApiError> {
    let jc = state.store.add_junction_closure(route_id, &req).await?;
    Ok(created(jc))
}

/// Remove a closure; its two segments merge back into one
pub async fn remove_junction_closure(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<CableSegment>, ApiError> {
    let merged = state.store.remove_junction_closure(id).await?;
    Ok(Json(merged))
}

pub async fn get_splicing_details(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<SplicingDetails>, ApiError> {
    let details = state.store.get_splicing_details(id).await?;
    Ok(Json(details))
}
