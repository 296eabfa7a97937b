use serde::{Deserialize, Serialize};

use super::{SpliceType, WaypointRef};

/// Kind of element in a fiber trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum TraceElementType {
    Segment,
    Splice,
}

/// One step of a fiber trace. Segments are oriented in walking direction;
/// a splice starts and ends at its closure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceElement {
    pub step_order: i32,
    pub element_type: TraceElementType,
    pub element_id: i64,
    pub element_name: String,
    pub details: String,
    pub from: WaypointRef,
    pub to: WaypointRef,
    pub fiber_in: i32,
    pub fiber_out: i32,
    pub distance_km: f64,
    pub loss_db: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub splice_type: Option<SpliceType>,
    pub cumulative_distance_km: f64,
    pub cumulative_loss_db: f64,
}

/// How a trace ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TraceOutcome {
    /// The walk reached the requested end node
    Complete,
    /// The walk reached a closure with no splice for the carried fiber
    DeadEndFiber {
        jc_id: i64,
        segment_id: i64,
        fiber_no: i32,
    },
}

/// FiberTrace is the ordered physical path a fiber occupies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiberTrace {
    pub start_node_id: i64,
    pub end_node_id: i64,
    pub fiber_no: i32,
    #[serde(flatten)]
    pub outcome: TraceOutcome,
    pub elements: Vec<TraceElement>,
    pub total_distance_km: f64,
    pub total_loss_db: f64,
}

impl FiberTrace {
    pub fn is_complete(&self) -> bool {
        self.outcome == TraceOutcome::Complete
    }

    /// Fiber number carried on the last segment of the trace
    pub fn end_fiber_no(&self) -> Option<i32> {
        self.elements.last().map(|e| e.fiber_out)
    }

    pub fn segment_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.elements
            .iter()
            .filter(|e| e.element_type == TraceElementType::Segment)
            .map(|e| e.element_id)
    }

    pub fn splice_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.elements
            .iter()
            .filter(|e| e.element_type == TraceElementType::Splice)
            .map(|e| e.element_id)
    }
}

/// TraceRequest for tracing a fiber between two nodes
#[derive(Debug, Clone, Deserialize)]
pub struct TraceRequest {
    pub start_node_id: i64,
    pub end_node_id: i64,
    pub fiber_no: i32,
}
