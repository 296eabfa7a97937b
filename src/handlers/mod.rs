pub mod cables;
pub mod junction_closures;
pub mod logical_paths;
pub mod nodes;
pub mod rings;
pub mod splices;
pub mod trace;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::topology::{ErrorClass, TopologyError};
use crate::AppState;

/// Error response body: `{"error": "message", "kind": "error_kind"}`
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
}

/// API error type
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            kind: "not_found",
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "internal",
            message: msg.into(),
        }
    }

    fn topology(err: &TopologyError) -> Self {
        let status = match err.class() {
            ErrorClass::Validation => StatusCode::BAD_REQUEST,
            ErrorClass::Invariant | ErrorClass::Conflict => StatusCode::CONFLICT,
            ErrorClass::Unreachable => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorClass::Integrity => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
                kind: self.kind,
            }),
        )
            .into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        // Typed errors first (no fragile string matching)
        if let Some(nf) = err.downcast_ref::<crate::db::NotFoundError>() {
            return Self::not_found(nf.to_string());
        }
        if let Some(te) = err.downcast_ref::<TopologyError>() {
            if te.class() == ErrorClass::Integrity {
                tracing::error!("Topology integrity error: {:#}", err);
            }
            return Self::topology(te);
        }
        tracing::error!("Request failed: {:#}", err);
        Self::internal(err.to_string())
    }
}

/// Response helper: return 201 Created with JSON body
pub fn created<T: Serialize>(item: T) -> (StatusCode, Json<T>) {
    (StatusCode::CREATED, Json(item))
}

/// Healthcheck endpoint: 200 with status while the database answers
pub async fn healthcheck(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.store.ping().await?;
    Ok(Json(serde_json::json!({
        "status": "ok",
        "service": "ofc-topology",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_error_status() {
        let cases = [
            (TopologyError::validation("bad"), StatusCode::BAD_REQUEST),
            (
                TopologyError::FiberInUse { cable_id: 1, fiber_no: 2, logical_path_id: 3 },
                StatusCode::CONFLICT,
            ),
            (TopologyError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                TopologyError::DeadEndFiber { jc_id: 1, segment_id: 2, fiber_no: 3 },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (TopologyError::inconsistency(1, "gap"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            let api: ApiError = anyhow::Error::from(err.clone()).into();
            assert_eq!(api.status, status, "{}", err);
            assert_eq!(api.kind, err.kind());
        }
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let err: anyhow::Error = crate::db::NotFoundError::new("Node", "7").into();
        let api = ApiError::from(err);
        assert_eq!(api.status, StatusCode::NOT_FOUND);
        assert_eq!(api.kind, "not_found");
    }
}
