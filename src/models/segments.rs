use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of point a cable segment can start or end at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum WaypointKind {
    Node,
    Jc,
}

impl WaypointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaypointKind::Node => "node",
            WaypointKind::Jc => "jc",
        }
    }
}

/// Typed reference to a waypoint: a network node or a junction closure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WaypointRef {
    pub kind: WaypointKind,
    pub id: i64,
}

impl WaypointRef {
    pub fn node(id: i64) -> Self {
        Self { kind: WaypointKind::Node, id }
    }

    pub fn jc(id: i64) -> Self {
        Self { kind: WaypointKind::Jc, id }
    }

    pub fn is_jc(&self) -> bool {
        self.kind == WaypointKind::Jc
    }
}

impl fmt::Display for WaypointRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

/// Waypoint resolved with its display name and coordinates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Waypoint {
    #[serde(rename = "type")]
    pub kind: WaypointKind,
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

/// CableSegment is the physical fiber run between two adjacent waypoints of a route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CableSegment {
    pub id: i64,
    pub original_cable_id: i64,
    pub segment_order: i32,
    pub start_node_id: i64,
    pub start_node_type: WaypointKind,
    pub end_node_id: i64,
    pub end_node_type: WaypointKind,
    pub distance_km: f64,
    pub fiber_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CableSegment {
    pub fn start(&self) -> WaypointRef {
        WaypointRef { kind: self.start_node_type, id: self.start_node_id }
    }

    pub fn end(&self) -> WaypointRef {
        WaypointRef { kind: self.end_node_type, id: self.end_node_id }
    }

    pub fn touches(&self, waypoint: WaypointRef) -> bool {
        self.start() == waypoint || self.end() == waypoint
    }

    /// The endpoint opposite `from`, or None if the segment does not touch `from`
    pub fn other_end(&self, from: WaypointRef) -> Option<WaypointRef> {
        if self.start() == from {
            Some(self.end())
        } else if self.end() == from {
            Some(self.start())
        } else {
            None
        }
    }

    pub fn carries(&self, fiber_no: i32) -> bool {
        fiber_no >= 1 && fiber_no <= self.fiber_count
    }
}
