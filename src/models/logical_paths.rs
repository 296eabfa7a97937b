use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TraceElementType;

/// Lifecycle of a logical path: planned → configured → provisioned → deprovisioned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PathStatus {
    #[default]
    Planned,
    Configured,
    Provisioned,
    Deprovisioned,
}

impl PathStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathStatus::Planned => "planned",
            PathStatus::Configured => "configured",
            PathStatus::Provisioned => "provisioned",
            PathStatus::Deprovisioned => "deprovisioned",
        }
    }
}

/// LogicalPath is an end-to-end circuit between two nodes, optionally ring-derived
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicalPath {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ring_id: Option<i64>,
    pub start_node_id: i64,
    pub end_node_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_fiber_no: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_fiber_no: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_system_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_system_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_port: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_port: Option<String>,
    pub status: PathStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_distance_km: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_loss_db: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// CreateLogicalPathRequest for a manually defined path
#[derive(Debug, Clone, Deserialize)]
pub struct CreateLogicalPathRequest {
    pub name: String,
    pub start_node_id: i64,
    pub end_node_id: i64,
    #[serde(default)]
    pub start_fiber_no: Option<i32>,
    #[serde(default)]
    pub ring_id: Option<i64>,
}

/// Query parameters for listing logical paths
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogicalPathQuery {
    #[serde(default)]
    pub ring_id: Option<i64>,
}

/// LogicalPathElement is one persisted step of a synced trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicalPathElement {
    pub logical_path_id: i64,
    pub step_order: i32,
    pub element_type: TraceElementType,
    pub element_id: i64,
    pub fiber_in: i32,
    pub fiber_out: i32,
    pub distance_km: f64,
    pub loss_db: f64,
}

/// SyncPathRequest re-traces a path; the fiber defaults to the path's start fiber
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncPathRequest {
    #[serde(default)]
    pub fiber_no: Option<i32>,
}

/// Direction a committed fiber carries for its system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum FiberDirection {
    Tx,
    Rx,
}

/// AssignFibersRequest commits a Tx/Rx fiber pair of a cable to a system on a path
#[derive(Debug, Clone, Deserialize)]
pub struct AssignFibersRequest {
    pub system_id: i64,
    pub cable_id: i64,
    pub fiber_tx: i32,
    pub fiber_rx: i32,
    #[serde(default)]
    pub destination_system_id: Option<i64>,
    #[serde(default)]
    pub source_port: Option<String>,
    #[serde(default)]
    pub destination_port: Option<String>,
}

/// FiberAssignment records which path and system a cable fiber is committed to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiberAssignment {
    pub cable_id: i64,
    pub fiber_no: i32,
    pub logical_path_id: i64,
    pub system_id: i64,
    pub direction: FiberDirection,
    pub created_at: DateTime<Utc>,
}

/// PathFiberAvailability lists the fiber numbers free on every segment a
/// synced path crosses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathFiberAvailability {
    pub logical_path_id: i64,
    pub cable_ids: Vec<i64>,
    pub available_fibers: Vec<i32>,
}
