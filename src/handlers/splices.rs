use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::AppState;

use super::{created, ApiError};

/// Record a splice at a closure
pub async fn create_splice(
    State(state): State<Arc<AppState>>,
    Path(jc_id): Path<i64>,
    Json(req): Json<CreateSpliceRequest>,
) -> Result<(StatusCode, Json<FiberSplice>), ApiError> {
    let splice = state
        .store
        .create_splice(jc_id, &req, state.config.default_splice_loss_db)
        .await?;
    Ok(created(splice))
}

/// Splice every free fiber straight through between two segments
pub async fn auto_splice(
    State(state): State<Arc<AppState>>,
    Path(jc_id): Path<i64>,
    Json(req): Json<AutoSpliceRequest>,
) -> Result<Json<AutoSpliceResult>, ApiError> {
    let result = state
        .store
        .auto_splice_straight_segments(jc_id, &req, state.config.default_splice_loss_db)
        .await?;
    Ok(Json(result))
}

pub async fn update_splice_loss(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateSpliceLossRequest>,
) -> Result<Json<FiberSplice>, ApiError> {
    let splice = state.store.update_splice_loss(id, req.loss_db).await?;
    Ok(Json(splice))
}

pub async fn delete_splice(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_splice(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
