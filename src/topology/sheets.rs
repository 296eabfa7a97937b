//! Validation of a route topology document before it is written back.

use std::collections::{HashMap, HashSet};

use chrono::Utc;

use crate::models::{
    CableSegment, CableSegmentSheetRow, FiberSplice, FiberSpliceSheetRow, OfcCable, TopologySheets,
    WaypointRef,
};

use super::segmentation::{check_chain, check_distance, SegmentSpan};
use super::{approx_eq, splice_matrix, TopologyError};

pub fn segment_from_row(route_id: i64, row: &CableSegmentSheetRow) -> CableSegment {
    let now = Utc::now();
    CableSegment {
        id: row.id,
        original_cable_id: route_id,
        segment_order: row.segment_order,
        start_node_id: row.start_node_id,
        start_node_type: row.start_node_type,
        end_node_id: row.end_node_id,
        end_node_type: row.end_node_type,
        distance_km: row.distance_km,
        fiber_count: row.fiber_count,
        created_at: now,
        updated_at: now,
    }
}

pub fn splice_from_row(row: &FiberSpliceSheetRow) -> FiberSplice {
    let now = Utc::now();
    FiberSplice {
        id: row.id,
        jc_id: row.jc_id,
        incoming_segment_id: row.incoming_segment_id,
        incoming_fiber_no: row.incoming_fiber_no,
        outgoing_segment_id: row.outgoing_segment_id,
        outgoing_fiber_no: row.outgoing_fiber_no,
        splice_type: row.splice_type,
        loss_db: row.loss_db,
        logical_path_id: None,
        created_at: now,
        updated_at: now,
    }
}

/// Chain errors in a submitted document are the caller's fault, not storage corruption
fn as_validation(sheet: &str, err: TopologyError) -> TopologyError {
    match err {
        TopologyError::TopologyInconsistency { detail, .. } => {
            TopologyError::validation(format!("{}: {}", sheet, detail))
        }
        other => other,
    }
}

fn unique_ids(sheet: &str, ids: impl Iterator<Item = i64>) -> Result<(), TopologyError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(TopologyError::validation(format!("{}: duplicate id {}", sheet, id)));
        }
    }
    Ok(())
}

/// Check that `sheets` describes a valid topology for `route`.
///
/// `foreign_segments` are stored segments of other routes touching one of the
/// sheet's closures; splices may use them (branch cables).
pub fn validate_sheets(
    route: &OfcCable,
    sheets: &TopologySheets,
    foreign_segments: &[CableSegment],
) -> Result<(), TopologyError> {
    // Junction closures
    unique_ids("Junction Closures", sheets.junction_closures.iter().map(|j| j.id))?;
    let mut positions: Vec<f64> = Vec::new();
    for jc in &sheets.junction_closures {
        if jc.name.trim().is_empty() {
            return Err(TopologyError::validation(format!("Junction Closures: row {} has no name", jc.id)));
        }
        if !jc.position_km.is_finite() || jc.position_km <= 0.0 || jc.position_km >= route.current_rkm {
            return Err(TopologyError::validation(format!(
                "Junction Closures: {} position {} km is outside (0, {})",
                jc.name, jc.position_km, route.current_rkm
            )));
        }
        if positions.iter().any(|p| approx_eq(*p, jc.position_km)) {
            return Err(TopologyError::validation(format!(
                "Junction Closures: two closures at {} km",
                jc.position_km
            )));
        }
        positions.push(jc.position_km);
    }
    let jc_positions: HashMap<i64, f64> = sheets
        .junction_closures
        .iter()
        .map(|j| (j.id, j.position_km))
        .collect();

    // Cable segments
    unique_ids("Cable Segments", sheets.cable_segments.iter().map(|s| s.id))?;
    let mut rows: Vec<&CableSegmentSheetRow> = sheets.cable_segments.iter().collect();
    rows.sort_by_key(|r| r.segment_order);
    let Some(first) = rows.first() else {
        return Err(TopologyError::validation("Cable Segments: a route needs at least one segment"));
    };
    let fiber_count = first.fiber_count;
    for (i, row) in rows.iter().enumerate() {
        if row.segment_order != i as i32 + 1 {
            return Err(TopologyError::validation(format!(
                "Cable Segments: orders must run 1..{} without gaps (found {})",
                rows.len(),
                row.segment_order
            )));
        }
        if row.fiber_count <= 0 || row.fiber_count != fiber_count {
            return Err(TopologyError::validation(format!(
                "Cable Segments: segment {} has {} fibers, expected {}",
                row.id, row.fiber_count, fiber_count
            )));
        }
        if !row.distance_km.is_finite() || row.distance_km < 0.0 {
            return Err(TopologyError::validation(format!(
                "Cable Segments: segment {} has invalid distance {}",
                row.id, row.distance_km
            )));
        }
    }

    let segments: Vec<CableSegment> = rows.iter().map(|r| segment_from_row(route.id, r)).collect();
    let spans: Vec<SegmentSpan> = segments.iter().map(SegmentSpan::from).collect();
    check_chain(route.id, route.start(), route.end(), &spans)
        .map_err(|e| as_validation("Cable Segments", e))?;
    check_distance(route.id, &spans, route.current_rkm)
        .map_err(|e| as_validation("Cable Segments", e))?;

    // Every interior waypoint is a closure of the sheet, placed where the segments put it
    let mut cumulative = 0.0;
    let mut on_chain = HashSet::new();
    for span in &spans[..spans.len() - 1] {
        cumulative += span.distance_km;
        let waypoint = span.end;
        let position = if waypoint.is_jc() { jc_positions.get(&waypoint.id) } else { None };
        let Some(position) = position else {
            return Err(TopologyError::validation(format!(
                "Cable Segments: interior waypoint {} is not a closure of this route",
                waypoint
            )));
        };
        if !approx_eq(*position, cumulative) {
            return Err(TopologyError::validation(format!(
                "Junction Closures: closure {} sits at {} km but the segments reach it at {:.6} km",
                waypoint.id, position, cumulative
            )));
        }
        if !on_chain.insert(waypoint.id) {
            return Err(TopologyError::validation(format!(
                "Cable Segments: closure {} appears twice on the route",
                waypoint.id
            )));
        }
    }
    if let Some(orphan) = jc_positions.keys().find(|id| !on_chain.contains(*id)) {
        return Err(TopologyError::validation(format!(
            "Junction Closures: closure {} is not on the segment chain",
            orphan
        )));
    }

    // Fiber splices
    unique_ids("Fiber Splices", sheets.fiber_splices.iter().map(|s| s.id))?;
    let by_id: HashMap<i64, &CableSegment> = segments
        .iter()
        .chain(foreign_segments.iter())
        .map(|s| (s.id, s))
        .collect();
    let mut accepted: HashMap<i64, Vec<FiberSplice>> = HashMap::new();
    for row in &sheets.fiber_splices {
        if !jc_positions.contains_key(&row.jc_id) {
            return Err(TopologyError::validation(format!(
                "Fiber Splices: splice {} is at closure {} which is not in this document",
                row.id, row.jc_id
            )));
        }
        let lookup = |segment_id: i64| {
            by_id.get(&segment_id).copied().ok_or_else(|| {
                TopologyError::validation(format!(
                    "Fiber Splices: splice {} uses unknown segment {}",
                    row.id, segment_id
                ))
            })
        };
        let incoming = lookup(row.incoming_segment_id)?;
        let outgoing = lookup(row.outgoing_segment_id)?;
        splice_matrix::validate_loss(row.loss_db)?;

        let at_jc = accepted.entry(row.jc_id).or_default();
        splice_matrix::check_new_splice(
            row.jc_id,
            incoming,
            row.incoming_fiber_no,
            outgoing,
            row.outgoing_fiber_no,
            at_jc,
        )?;
        at_jc.push(splice_from_row(row));
    }

    Ok(())
}

/// Closure waypoints referenced by the document
pub fn sheet_closures(sheets: &TopologySheets) -> Vec<WaypointRef> {
    sheets
        .junction_closures
        .iter()
        .map(|j| WaypointRef::jc(j.id))
        .collect()
}
