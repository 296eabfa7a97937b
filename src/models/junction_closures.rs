use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::WaypointRef;

/// JunctionClosure is a splice enclosure placed along a cable route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JunctionClosure {
    pub id: i64,
    pub ofc_cable_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<i64>,
    pub name: String,
    pub position_km: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JunctionClosure {
    pub fn waypoint(&self) -> WaypointRef {
        WaypointRef::jc(self.id)
    }
}

/// AddJunctionClosureRequest for inserting a closure into a route
#[derive(Debug, Clone, Deserialize)]
pub struct AddJunctionClosureRequest {
    pub name: String,
    pub position_km: f64,
    #[serde(default)]
    pub node_id: Option<i64>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}
