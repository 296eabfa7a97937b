use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::JunctionClosure;

/// How two fibers are joined at a closure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SpliceType {
    #[default]
    Straight,
    Cross,
    Branch,
    Termination,
}

impl SpliceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpliceType::Straight => "straight",
            SpliceType::Cross => "cross",
            SpliceType::Branch => "branch",
            SpliceType::Termination => "termination",
        }
    }
}

/// FiberSplice joins one fiber of an incoming segment to one fiber of an
/// outgoing segment at a junction closure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiberSplice {
    pub id: i64,
    pub jc_id: i64,
    pub incoming_segment_id: i64,
    pub incoming_fiber_no: i32,
    pub outgoing_segment_id: i64,
    pub outgoing_fiber_no: i32,
    pub splice_type: SpliceType,
    pub loss_db: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logical_path_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FiberSplice {
    /// True if the given segment fiber is either end of this splice
    pub fn uses(&self, segment_id: i64, fiber_no: i32) -> bool {
        (self.incoming_segment_id == segment_id && self.incoming_fiber_no == fiber_no)
            || (self.outgoing_segment_id == segment_id && self.outgoing_fiber_no == fiber_no)
    }
}

/// CreateSpliceRequest for recording a single splice at a closure
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSpliceRequest {
    pub incoming_segment_id: i64,
    pub incoming_fiber_no: i32,
    pub outgoing_segment_id: i64,
    pub outgoing_fiber_no: i32,
    #[serde(default)]
    pub splice_type: SpliceType,
    #[serde(default)]
    pub loss_db: Option<f64>,
}

/// UpdateSpliceLossRequest for re-measuring an existing splice
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateSpliceLossRequest {
    pub loss_db: f64,
}

/// AutoSpliceRequest for fiber-for-fiber splicing of two straight-through segments
#[derive(Debug, Clone, Deserialize)]
pub struct AutoSpliceRequest {
    pub segment1_id: i64,
    pub segment2_id: i64,
    #[serde(default)]
    pub loss_db: Option<f64>,
}

/// AutoSpliceResult reports how many splices were created and how many fibers were already spliced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoSpliceResult {
    pub splices_created: u32,
    pub skipped: u32,
}

/// Usage of a single fiber at a closure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FiberStatus {
    Available,
    UsedAsIncoming,
    UsedAsOutgoing,
}

/// FiberAtJc describes one fiber of a segment as seen from a closure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiberAtJc {
    pub fiber_no: i32,
    pub status: FiberStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub splice_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_to_segment: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_to_fiber: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loss_db: Option<f64>,
}

/// SegmentAtJc is a segment terminating at a closure, with per-fiber usage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentAtJc {
    pub segment_id: i64,
    pub segment_name: String,
    pub original_cable_id: i64,
    pub segment_order: i32,
    pub fiber_count: i32,
    pub distance_km: f64,
    pub fibers: Vec<FiberAtJc>,
}

/// AvailableFibers lists the unspliced fibers of one segment at a closure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableFibers {
    pub segment_id: i64,
    pub fibers: Vec<i32>,
}

/// SplicingDetails is the splice matrix of a closure
#[derive(Debug, Clone, Serialize)]
pub struct SplicingDetails {
    pub junction_closure: JunctionClosure,
    /// Segments whose end waypoint is this closure
    pub incoming_segments: Vec<SegmentAtJc>,
    /// Segments whose start waypoint is this closure
    pub outgoing_segments: Vec<SegmentAtJc>,
    pub existing_splices: Vec<FiberSplice>,
    pub available_fibers: Vec<AvailableFibers>,
}
