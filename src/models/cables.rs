use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CableSegment, JunctionClosure, WaypointKind, WaypointRef};

/// OfcCable is an optical fiber cable route between two terminals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfcCable {
    pub id: i64,
    pub route_name: String,
    pub capacity: i32,
    pub current_rkm: f64,
    pub sn_id: i64,
    pub sn_type: WaypointKind,
    pub en_id: i64,
    pub en_type: WaypointKind,
    pub status: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OfcCable {
    pub fn start(&self) -> WaypointRef {
        WaypointRef { kind: self.sn_type, id: self.sn_id }
    }

    pub fn end(&self) -> WaypointRef {
        WaypointRef { kind: self.en_type, id: self.en_id }
    }
}

fn default_node_kind() -> WaypointKind {
    WaypointKind::Node
}

/// CreateCableRequest for commissioning a new cable route.
/// Terminals default to nodes; a branch cable may start or end at a junction closure.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCableRequest {
    pub route_name: String,
    pub capacity: i32,
    pub current_rkm: f64,
    pub sn_id: i64,
    #[serde(default = "default_node_kind")]
    pub sn_type: WaypointKind,
    pub en_id: i64,
    #[serde(default = "default_node_kind")]
    pub en_type: WaypointKind,
}

/// How far a route has been broken up by junction closures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionStatus {
    Simple,
    WithJcs,
    FullySegmented,
}

impl EvolutionStatus {
    pub fn classify(jc_count: usize, segment_count: usize) -> Self {
        if segment_count > 1 {
            EvolutionStatus::FullySegmented
        } else if jc_count > 0 {
            EvolutionStatus::WithJcs
        } else {
            EvolutionStatus::Simple
        }
    }
}

/// RouteDetails bundles a cable with its closures and ordered segments
#[derive(Debug, Clone, Serialize)]
pub struct RouteDetails {
    pub route: OfcCable,
    pub junction_closures: Vec<JunctionClosure>,
    pub segments: Vec<CableSegment>,
    pub evolution_status: EvolutionStatus,
}

/// CableFiberAvailability lists the fibers of a cable free for system assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CableFiberAvailability {
    pub cable_id: i64,
    pub capacity: i32,
    pub available_fibers: Vec<i32>,
}
