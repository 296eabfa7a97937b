//! Fiber path tracing over the splice graph.
//!
//! A walk follows one fiber from a node: segment, splice at the closure,
//! next segment on the spliced fiber, and so on until it reaches a plain
//! node or a closure with no splice for the carried fiber.

use std::collections::HashSet;

use crate::models::{
    FiberTrace, SpliceType, TraceElement, TraceElementType, TraceOutcome, WaypointRef,
};

use super::{TopologyError, TopologyGraph};

enum WalkEnd {
    Node(WaypointRef),
    DeadEnd { jc_id: i64, segment_id: i64, fiber_no: i32 },
}

struct Walk {
    elements: Vec<TraceElement>,
    end: WalkEnd,
}

/// Trace `fiber_no` from `start_node_id` to `end_node_id`.
///
/// Every segment touching the start node that carries the fiber is tried in
/// id order. The first walk ending at the end node is returned as complete.
/// Failing that, the longest walk stopping at an unspliced closure is
/// returned with a `DeadEndFiber` outcome so the caller can show the partial
/// path. A revisited segment aborts the whole trace.
pub fn trace_fiber_path(
    graph: &TopologyGraph,
    start_node_id: i64,
    end_node_id: i64,
    fiber_no: i32,
) -> Result<FiberTrace, TopologyError> {
    if fiber_no < 1 {
        return Err(TopologyError::validation(format!(
            "fiber_no must be at least 1 (got {})",
            fiber_no
        )));
    }
    if start_node_id == end_node_id {
        return Err(TopologyError::validation(
            "start and end node must differ",
        ));
    }

    let start = WaypointRef::node(start_node_id);
    let end = WaypointRef::node(end_node_id);
    let mut best_partial: Option<Walk> = None;

    for &segment_id in graph.segments_at(start) {
        let carries = graph
            .segment(segment_id)
            .map(|seg| seg.carries(fiber_no))
            .unwrap_or(false);
        if !carries {
            continue;
        }

        let walk = walk_fiber(graph, start, end, segment_id, fiber_no).map_err(|e| {
            tracing::error!(
                "Fiber trace {} -> {} on fiber {} aborted at segment {}: {}",
                start_node_id, end_node_id, fiber_no, segment_id, e
            );
            e
        })?;

        match walk.end {
            WalkEnd::Node(reached) if reached == end => {
                return Ok(finish(start_node_id, end_node_id, fiber_no, TraceOutcome::Complete, walk.elements));
            }
            WalkEnd::Node(_) => {}
            WalkEnd::DeadEnd { .. } => {
                let longer = best_partial
                    .as_ref()
                    .map(|b| walk.elements.len() > b.elements.len())
                    .unwrap_or(true);
                if longer {
                    best_partial = Some(walk);
                }
            }
        }
    }

    match best_partial {
        Some(Walk {
            elements,
            end: WalkEnd::DeadEnd { jc_id, segment_id, fiber_no: dead_fiber },
        }) => {
            tracing::warn!(
                "Fiber trace {} -> {} on fiber {} dead-ends at JC {} (segment {}, fiber {})",
                start_node_id, end_node_id, fiber_no, jc_id, segment_id, dead_fiber
            );
            let outcome = TraceOutcome::DeadEndFiber {
                jc_id,
                segment_id,
                fiber_no: dead_fiber,
            };
            Ok(finish(start_node_id, end_node_id, fiber_no, outcome, elements))
        }
        _ => Err(TopologyError::NoPathFound {
            start_node_id,
            end_node_id,
            fiber_no,
        }),
    }
}

/// Turn a partial trace into the `DeadEndFiber` error it stands for
pub fn require_complete(trace: FiberTrace) -> Result<FiberTrace, TopologyError> {
    match trace.outcome {
        TraceOutcome::Complete => Ok(trace),
        TraceOutcome::DeadEndFiber { jc_id, segment_id, fiber_no } => Err(TopologyError::DeadEndFiber {
            jc_id,
            segment_id,
            fiber_no,
        }),
    }
}

fn walk_fiber(
    graph: &TopologyGraph,
    start: WaypointRef,
    target: WaypointRef,
    first_segment: i64,
    first_fiber: i32,
) -> Result<Walk, TopologyError> {
    let mut visited = HashSet::new();
    let mut elements = Vec::new();
    let mut at = start;
    let mut segment_id = first_segment;
    let mut fiber = first_fiber;

    loop {
        if !visited.insert(segment_id) {
            return Err(TopologyError::PathTraceCycle { segment_id });
        }
        let seg = graph.segment(segment_id).ok_or_else(|| {
            TopologyError::inconsistency(0, format!("segment {} vanished during trace", segment_id))
        })?;
        let next = seg.other_end(at).ok_or_else(|| {
            TopologyError::inconsistency(
                seg.original_cable_id,
                format!("segment {} does not touch {}", segment_id, at),
            )
        })?;

        elements.push(TraceElement {
            step_order: 0,
            element_type: TraceElementType::Segment,
            element_id: seg.id,
            element_name: graph.segment_name(seg),
            details: format!(
                "{} → {}, fiber {}",
                graph.waypoint_name(at),
                graph.waypoint_name(next),
                fiber
            ),
            from: at,
            to: next,
            fiber_in: fiber,
            fiber_out: fiber,
            distance_km: seg.distance_km,
            loss_db: 0.0,
            splice_type: None,
            cumulative_distance_km: 0.0,
            cumulative_loss_db: 0.0,
        });
        at = next;

        if at == target || !at.is_jc() {
            return Ok(Walk { elements, end: WalkEnd::Node(at) });
        }

        let Some(splice) = graph.splice_at(at.id, segment_id, fiber).copied() else {
            return Ok(Walk {
                elements,
                end: WalkEnd::DeadEnd { jc_id: at.id, segment_id, fiber_no: fiber },
            });
        };

        elements.push(TraceElement {
            step_order: 0,
            element_type: TraceElementType::Splice,
            element_id: splice.splice_id,
            element_name: graph.waypoint_name(at),
            details: splice_details(fiber, splice.other_fiber_no, splice.splice_type),
            from: at,
            to: at,
            fiber_in: fiber,
            fiber_out: splice.other_fiber_no,
            distance_km: 0.0,
            loss_db: splice.loss_db,
            splice_type: Some(splice.splice_type),
            cumulative_distance_km: 0.0,
            cumulative_loss_db: 0.0,
        });
        segment_id = splice.other_segment_id;
        fiber = splice.other_fiber_no;
    }
}

/// Fiber numbers on each segment of an already traced chain, following
/// `fiber_no` from `segments[anchor]` through the splices in both directions.
/// Every splice crossed must lead to the next segment of the chain.
pub fn follow_fiber(
    graph: &TopologyGraph,
    segments: &[i64],
    anchor: usize,
    fiber_no: i32,
) -> Result<Vec<i32>, TopologyError> {
    let Some(&anchor_id) = segments.get(anchor) else {
        return Err(TopologyError::validation(format!(
            "segment index {} is outside a chain of {} segments",
            anchor,
            segments.len()
        )));
    };
    let carries = graph
        .segment(anchor_id)
        .map(|seg| seg.carries(fiber_no))
        .unwrap_or(false);
    if !carries {
        return Err(TopologyError::validation(format!(
            "segment {} has no fiber {}",
            anchor_id, fiber_no
        )));
    }

    let mut fibers = vec![0; segments.len()];
    fibers[anchor] = fiber_no;
    for i in anchor..segments.len() - 1 {
        fibers[i + 1] = cross_splice(graph, segments[i], segments[i + 1], fibers[i])?;
    }
    for i in (1..=anchor).rev() {
        fibers[i - 1] = cross_splice(graph, segments[i], segments[i - 1], fibers[i])?;
    }
    Ok(fibers)
}

fn cross_splice(graph: &TopologyGraph, from: i64, to: i64, fiber_no: i32) -> Result<i32, TopologyError> {
    let (Some(a), Some(b)) = (graph.segment(from), graph.segment(to)) else {
        return Err(TopologyError::inconsistency(
            0,
            format!("segment {} or {} is missing from the splice graph", from, to),
        ));
    };
    let jc = [a.start(), a.end()]
        .into_iter()
        .find(|w| w.is_jc() && b.touches(*w))
        .ok_or_else(|| {
            TopologyError::inconsistency(
                a.original_cable_id,
                format!("segments {} and {} do not meet at a junction closure", from, to),
            )
        })?;

    match graph.splice_at(jc.id, from, fiber_no) {
        Some(end) if end.other_segment_id == to => Ok(end.other_fiber_no),
        Some(end) => Err(TopologyError::validation(format!(
            "fiber {} of segment {} is spliced into segment {} at {}, off the path",
            fiber_no, from, end.other_segment_id, jc
        ))),
        None => Err(TopologyError::DeadEndFiber {
            jc_id: jc.id,
            segment_id: from,
            fiber_no,
        }),
    }
}

fn splice_details(fiber_in: i32, fiber_out: i32, splice_type: SpliceType) -> String {
    format!("Fiber {} → Fiber {} ({})", fiber_in, fiber_out, splice_type.as_str())
}

fn finish(
    start_node_id: i64,
    end_node_id: i64,
    fiber_no: i32,
    outcome: TraceOutcome,
    mut elements: Vec<TraceElement>,
) -> FiberTrace {
    let mut distance = 0.0;
    let mut loss = 0.0;
    for (i, el) in elements.iter_mut().enumerate() {
        distance += el.distance_km;
        loss += el.loss_db;
        el.step_order = i as i32 + 1;
        el.cumulative_distance_km = distance;
        el.cumulative_loss_db = loss;
    }
    FiberTrace {
        start_node_id,
        end_node_id,
        fiber_no,
        outcome,
        elements,
        total_distance_km: distance,
        total_loss_db: loss,
    }
}
