//! Explicit splice graph: waypoints are vertices, segments are edges, and
//! splices connect (segment, fiber) edge-ends at a closure.

use std::collections::HashMap;

use crate::models::{
    CableSegment, FiberSplice, JunctionClosure, Node, OfcCable, SpliceType, WaypointRef,
};

use super::TopologyError;

/// Consistent read of every row the graph needs
#[derive(Debug, Clone, Default)]
pub struct TopologySnapshot {
    pub cables: Vec<OfcCable>,
    pub segments: Vec<CableSegment>,
    pub splices: Vec<FiberSplice>,
    pub nodes: Vec<Node>,
    pub junction_closures: Vec<JunctionClosure>,
}

/// The far side of a splice as seen from one (segment, fiber) end
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpliceEnd {
    pub splice_id: i64,
    pub other_segment_id: i64,
    pub other_fiber_no: i32,
    pub loss_db: f64,
    pub splice_type: SpliceType,
}

/// Display name of a segment, e.g. "R1 (Seg 2)"
pub fn segment_label(route_name: &str, segment_order: i32) -> String {
    format!("{} (Seg {})", route_name, segment_order)
}

#[derive(Debug, Default)]
pub struct TopologyGraph {
    segments: HashMap<i64, CableSegment>,
    incident: HashMap<WaypointRef, Vec<i64>>,
    splice_ends: HashMap<(i64, i64, i32), SpliceEnd>,
    route_names: HashMap<i64, String>,
    waypoint_names: HashMap<WaypointRef, String>,
}

impl TopologyGraph {
    /// Index a snapshot. Splices must reference segments that exist, touch
    /// their closure and carry the spliced fibers; anything else means the
    /// snapshot is stale or corrupt.
    pub fn build(snapshot: TopologySnapshot) -> Result<Self, TopologyError> {
        let mut graph = TopologyGraph::default();

        for cable in snapshot.cables {
            graph.route_names.insert(cable.id, cable.route_name);
        }
        for node in snapshot.nodes {
            graph.waypoint_names.insert(WaypointRef::node(node.id), node.name);
        }
        let mut jc_routes = HashMap::new();
        for jc in snapshot.junction_closures {
            jc_routes.insert(jc.id, jc.ofc_cable_id);
            graph.waypoint_names.insert(jc.waypoint(), jc.name);
        }

        for seg in snapshot.segments {
            graph.incident.entry(seg.start()).or_default().push(seg.id);
            graph.incident.entry(seg.end()).or_default().push(seg.id);
            graph.segments.insert(seg.id, seg);
        }
        for ids in graph.incident.values_mut() {
            ids.sort_unstable();
        }

        for splice in snapshot.splices {
            let route_id = jc_routes.get(&splice.jc_id).copied().unwrap_or_default();
            let jc = WaypointRef::jc(splice.jc_id);
            let ends = [
                (splice.incoming_segment_id, splice.incoming_fiber_no),
                (splice.outgoing_segment_id, splice.outgoing_fiber_no),
            ];
            for (segment_id, fiber_no) in ends {
                let seg = graph.segments.get(&segment_id).ok_or_else(|| {
                    TopologyError::inconsistency(
                        route_id,
                        format!("splice {} references missing segment {}", splice.id, segment_id),
                    )
                })?;
                if !seg.touches(jc) {
                    return Err(TopologyError::inconsistency(
                        route_id,
                        format!("splice {} uses segment {} which does not reach {}", splice.id, segment_id, jc),
                    ));
                }
                if !seg.carries(fiber_no) {
                    return Err(TopologyError::inconsistency(
                        route_id,
                        format!("splice {} uses fiber {} of {}-fiber segment {}", splice.id, fiber_no, seg.fiber_count, segment_id),
                    ));
                }
            }

            let forward = SpliceEnd {
                splice_id: splice.id,
                other_segment_id: splice.outgoing_segment_id,
                other_fiber_no: splice.outgoing_fiber_no,
                loss_db: splice.loss_db,
                splice_type: splice.splice_type,
            };
            let backward = SpliceEnd {
                other_segment_id: splice.incoming_segment_id,
                other_fiber_no: splice.incoming_fiber_no,
                ..forward
            };
            for (key, end) in [
                ((splice.jc_id, splice.incoming_segment_id, splice.incoming_fiber_no), forward),
                ((splice.jc_id, splice.outgoing_segment_id, splice.outgoing_fiber_no), backward),
            ] {
                if let Some(existing) = graph.splice_ends.insert(key, end) {
                    return Err(TopologyError::inconsistency(
                        route_id,
                        format!(
                            "fiber {} of segment {} is used by splices {} and {} at {}",
                            key.2, key.1, existing.splice_id, splice.id, jc
                        ),
                    ));
                }
            }
        }

        Ok(graph)
    }

    pub fn segment(&self, id: i64) -> Option<&CableSegment> {
        self.segments.get(&id)
    }

    /// Segment ids touching a waypoint, in id order
    pub fn segments_at(&self, waypoint: WaypointRef) -> &[i64] {
        self.incident.get(&waypoint).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The splice continuing `fiber_no` of `segment_id` through closure `jc_id`
    pub fn splice_at(&self, jc_id: i64, segment_id: i64, fiber_no: i32) -> Option<&SpliceEnd> {
        self.splice_ends.get(&(jc_id, segment_id, fiber_no))
    }

    pub fn segment_name(&self, seg: &CableSegment) -> String {
        match self.route_names.get(&seg.original_cable_id) {
            Some(route) => segment_label(route, seg.segment_order),
            None => format!("Segment {}", seg.id),
        }
    }

    pub fn waypoint_name(&self, waypoint: WaypointRef) -> String {
        self.waypoint_names
            .get(&waypoint)
            .cloned()
            .unwrap_or_else(|| waypoint.to_string())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_build_indexes_both_splice_directions() {
        let graph = TopologyGraph::build(r1_snapshot(&[])).unwrap();
        let forward = graph.splice_at(10, 101, 5).unwrap();
        assert_eq!(forward.other_segment_id, 102);
        assert_eq!(forward.other_fiber_no, 5);
        let backward = graph.splice_at(10, 102, 5).unwrap();
        assert_eq!(backward.other_segment_id, 101);
        assert_eq!(backward.splice_id, forward.splice_id);
        assert_eq!(graph.segments_at(WaypointRef::jc(10)), &[101, 102]);
        assert_eq!(graph.segments_at(WaypointRef::node(1)), &[101]);
    }

    #[test]
    fn test_names() {
        let graph = TopologyGraph::build(r1_snapshot(&[])).unwrap();
        let seg = graph.segment(102).unwrap();
        assert_eq!(graph.segment_name(seg), "R1 (Seg 2)");
        assert_eq!(graph.waypoint_name(WaypointRef::jc(10)), "J1");
        assert_eq!(graph.waypoint_name(WaypointRef::node(99)), "node:99");
    }

    #[test]
    fn test_build_rejects_splice_on_missing_segment() {
        let mut snapshot = r1_snapshot(&[]);
        snapshot.splices.push(splice(999, 10, (101, 1), (555, 1), 0.0));
        // Fiber 1 of 101 is also duplicated, but the missing segment is found first
        let err = TopologyGraph::build(snapshot).unwrap_err();
        assert!(matches!(err, TopologyError::TopologyInconsistency { .. }));
    }

    #[test]
    fn test_build_rejects_duplicate_fiber_use() {
        let mut snapshot = r1_snapshot(&[7]);
        snapshot.splices.push(splice(999, 10, (101, 8), (102, 7), 0.0));
        let err = TopologyGraph::build(snapshot).unwrap_err();
        assert!(err.to_string().contains("fiber 8 of segment 101"));
    }

    #[test]
    fn test_build_rejects_fiber_out_of_range() {
        let mut snapshot = r1_snapshot(&[24]);
        snapshot.splices.push(splice(999, 10, (101, 24), (102, 25), 0.0));
        assert!(TopologyGraph::build(snapshot).is_err());
    }
}
