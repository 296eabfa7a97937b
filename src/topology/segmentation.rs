//! Ordered decomposition of a cable route into segments.
//!
//! A route is a chain of spans `start → jc → … → end`. Inserting a closure
//! splits exactly one span in two; removing a closure merges the two spans
//! around it. Both keep the total distance and leave the chain gapless.

use crate::models::{CableSegment, WaypointRef};

use super::{approx_eq, TopologyError, DISTANCE_TOLERANCE_KM};

/// Waypoint pair and length of one segment, detached from storage ids
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentSpan {
    pub start: WaypointRef,
    pub end: WaypointRef,
    pub distance_km: f64,
}

impl From<&CableSegment> for SegmentSpan {
    fn from(seg: &CableSegment) -> Self {
        Self {
            start: seg.start(),
            end: seg.end(),
            distance_km: seg.distance_km,
        }
    }
}

/// Where a closure lands inside the route
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitPoint {
    /// Index (0-based, i.e. segment_order - 1) of the span being split
    pub index: usize,
    pub first_km: f64,
    pub second_km: f64,
}

pub fn total_distance(spans: &[SegmentSpan]) -> f64 {
    spans.iter().map(|s| s.distance_km).sum()
}

/// Verify spans form a chain from `route_start` to `route_end`
pub fn check_chain(
    route_id: i64,
    route_start: WaypointRef,
    route_end: WaypointRef,
    spans: &[SegmentSpan],
) -> Result<(), TopologyError> {
    let (first, last) = match (spans.first(), spans.last()) {
        (Some(f), Some(l)) => (f, l),
        _ => return Err(TopologyError::inconsistency(route_id, "route has no segments")),
    };

    if first.start != route_start {
        return Err(TopologyError::inconsistency(
            route_id,
            format!("first segment starts at {} instead of {}", first.start, route_start),
        ));
    }
    if last.end != route_end {
        return Err(TopologyError::inconsistency(
            route_id,
            format!("last segment ends at {} instead of {}", last.end, route_end),
        ));
    }

    for (i, span) in spans.iter().enumerate() {
        if span.start == span.end {
            return Err(TopologyError::inconsistency(
                route_id,
                format!("segment {} starts and ends at {}", i + 1, span.start),
            ));
        }
        if let Some(next) = spans.get(i + 1) {
            if span.end != next.start {
                return Err(TopologyError::inconsistency(
                    route_id,
                    format!(
                        "segment {} ends at {} but segment {} starts at {}",
                        i + 1,
                        span.end,
                        i + 2,
                        next.start
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Verify stored segments of a route: gapless 1-based ordering, uniform fiber
/// count and a contiguous waypoint chain. Input must be sorted by segment_order.
pub fn check_contiguity(
    route_id: i64,
    route_start: WaypointRef,
    route_end: WaypointRef,
    segments: &[CableSegment],
) -> Result<(), TopologyError> {
    for (i, seg) in segments.iter().enumerate() {
        let expected = i as i32 + 1;
        if seg.segment_order != expected {
            return Err(TopologyError::inconsistency(
                route_id,
                format!("segment {} has order {}, expected {}", seg.id, seg.segment_order, expected),
            ));
        }
        if seg.original_cable_id != route_id {
            return Err(TopologyError::inconsistency(
                route_id,
                format!("segment {} belongs to route {}", seg.id, seg.original_cable_id),
            ));
        }
    }

    if let Some(first) = segments.first() {
        if let Some(odd) = segments.iter().find(|s| s.fiber_count != first.fiber_count) {
            return Err(TopologyError::inconsistency(
                route_id,
                format!(
                    "segment {} has {} fibers while segment {} has {}",
                    odd.id, odd.fiber_count, first.id, first.fiber_count
                ),
            ));
        }
    }

    let spans: Vec<SegmentSpan> = segments.iter().map(SegmentSpan::from).collect();
    check_chain(route_id, route_start, route_end, &spans)
}

/// Verify the sum of span distances equals the route length
pub fn check_distance(route_id: i64, spans: &[SegmentSpan], current_rkm: f64) -> Result<(), TopologyError> {
    let total = total_distance(spans);
    if !approx_eq(total, current_rkm) {
        return Err(TopologyError::inconsistency(
            route_id,
            format!("segments sum to {:.6} km but the route is {:.6} km", total, current_rkm),
        ));
    }
    Ok(())
}

/// Node/closure sequence implied by chaining the spans
pub fn waypoint_sequence(spans: &[SegmentSpan]) -> Vec<WaypointRef> {
    let mut seq = Vec::with_capacity(spans.len() + 1);
    if let Some(first) = spans.first() {
        seq.push(first.start);
    }
    seq.extend(spans.iter().map(|s| s.end));
    seq
}

/// Find the span containing `position_km` (measured from the route start)
pub fn locate_split(
    route_id: i64,
    spans: &[SegmentSpan],
    current_rkm: f64,
    position_km: f64,
) -> Result<SplitPoint, TopologyError> {
    if !position_km.is_finite() || position_km <= 0.0 || position_km >= current_rkm {
        return Err(TopologyError::validation(format!(
            "position_km must be strictly between 0 and {} (got {})",
            current_rkm, position_km
        )));
    }

    let mut from_km = 0.0;
    for (index, span) in spans.iter().enumerate() {
        let to_km = from_km + span.distance_km;
        if (position_km - from_km).abs() <= DISTANCE_TOLERANCE_KM
            || (position_km - to_km).abs() <= DISTANCE_TOLERANCE_KM
        {
            return Err(TopologyError::validation(format!(
                "a waypoint already exists at {} km on this route",
                position_km
            )));
        }
        if position_km > from_km && position_km < to_km {
            return Ok(SplitPoint {
                index,
                first_km: position_km - from_km,
                second_km: to_km - position_km,
            });
        }
        from_km = to_km;
    }

    Err(TopologyError::inconsistency(
        route_id,
        format!("no segment covers {} km (segments end at {:.6} km)", position_km, from_km),
    ))
}

/// Replace the span at `point.index` with two spans meeting at `jc`
pub fn split_spans(spans: &[SegmentSpan], point: SplitPoint, jc: WaypointRef) -> Vec<SegmentSpan> {
    let mut out = Vec::with_capacity(spans.len() + 1);
    for (i, span) in spans.iter().enumerate() {
        if i == point.index {
            out.push(SegmentSpan { start: span.start, end: jc, distance_km: point.first_km });
            out.push(SegmentSpan { start: jc, end: span.end, distance_km: point.second_km });
        } else {
            out.push(*span);
        }
    }
    out
}

/// Find the adjacent pair of spans around `jc`. `incident_segments` counts every
/// segment touching the closure across all routes; anything but two is a branch.
pub fn locate_merge(
    spans: &[SegmentSpan],
    jc: WaypointRef,
    incident_segments: usize,
) -> Result<usize, TopologyError> {
    let not_simple = TopologyError::NotSimpleJunction {
        jc_id: jc.id,
        segment_count: incident_segments,
    };
    if incident_segments != 2 {
        return Err(not_simple);
    }
    spans
        .windows(2)
        .position(|pair| pair[0].end == jc && pair[1].start == jc)
        .ok_or(not_simple)
}

/// Merge spans `index` and `index + 1` into one
pub fn merge_spans(spans: &[SegmentSpan], index: usize) -> Vec<SegmentSpan> {
    let mut out = Vec::with_capacity(spans.len().saturating_sub(1));
    let mut i = 0;
    while i < spans.len() {
        if i == index && i + 1 < spans.len() {
            out.push(SegmentSpan {
                start: spans[i].start,
                end: spans[i + 1].end,
                distance_km: spans[i].distance_km + spans[i + 1].distance_km,
            });
            i += 2;
        } else {
            out.push(spans[i]);
            i += 1;
        }
    }
    out
}
