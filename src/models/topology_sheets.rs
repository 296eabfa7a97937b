use serde::{Deserialize, Serialize};

use super::{SpliceType, WaypointKind};

/// Row of the "Junction Closures" sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JunctionClosureSheetRow {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub node_id: Option<i64>,
    pub position_km: f64,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// Row of the "Cable Segments" sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CableSegmentSheetRow {
    pub id: i64,
    pub segment_order: i32,
    pub start_node_id: i64,
    pub start_node_type: WaypointKind,
    pub end_node_id: i64,
    pub end_node_type: WaypointKind,
    pub distance_km: f64,
    pub fiber_count: i32,
}

/// Row of the "Fiber Splices" sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiberSpliceSheetRow {
    pub id: i64,
    pub jc_id: i64,
    pub incoming_segment_id: i64,
    pub incoming_fiber_no: i32,
    pub outgoing_segment_id: i64,
    pub outgoing_fiber_no: i32,
    #[serde(default)]
    pub splice_type: SpliceType,
    #[serde(default)]
    pub loss_db: f64,
}

/// TopologySheets is the three-sheet backup of one route's topology
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologySheets {
    #[serde(rename = "Junction Closures", alias = "junction_closures")]
    pub junction_closures: Vec<JunctionClosureSheetRow>,
    #[serde(rename = "Cable Segments", alias = "cable_segments")]
    pub cable_segments: Vec<CableSegmentSheetRow>,
    #[serde(rename = "Fiber Splices", alias = "fiber_splices")]
    pub fiber_splices: Vec<FiberSpliceSheetRow>,
}

/// ImportTopologyResult counts rows written by an import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportTopologyResult {
    pub junction_closures: u32,
    pub cable_segments: u32,
    pub fiber_splices: u32,
}
