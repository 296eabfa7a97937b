use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ring is a closed loop of nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ring {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_count: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// CreateRingRequest for creating new rings
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRingRequest {
    pub name: String,
}

/// RingNode places a node at a position around a ring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingNode {
    pub ring_id: i64,
    pub node_id: i64,
    pub node_name: String,
    pub order_in_ring: f64,
}

/// AddRingNodeRequest; fractional orders (e.g. 2.1) insert between existing nodes
#[derive(Debug, Clone, Deserialize)]
pub struct AddRingNodeRequest {
    pub node_id: i64,
    pub order_in_ring: f64,
}

/// GenerateRingPathsResult summarises a path generation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRingPathsResult {
    pub created: u32,
    pub kept: u32,
    pub removed: u32,
}
