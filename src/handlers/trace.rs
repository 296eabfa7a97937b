use axum::{extract::State, Json};
use std::sync::Arc;

use crate::models::*;
use crate::AppState;

use super::ApiError;

/// Trace a fiber between two nodes.
///
/// A walk that stops at an unspliced closure still answers 200; the body's
/// `status` is `dead_end_fiber` and carries the partial trace.
pub async fn trace_fiber_path(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TraceRequest>,
) -> Result<Json<FiberTrace>, ApiError> {
    let trace = state
        .store
        .trace_fiber_path(req.start_node_id, req.end_node_id, req.fiber_no)
        .await?;
    Ok(Json(trace))
}
