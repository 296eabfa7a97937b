//! Splice matrix rules at one junction closure: fiber bounds, one use per
//! (segment, fiber) end, fiber availability and auto-splice planning.

use std::collections::HashMap;

use crate::models::{CableSegment, FiberAtJc, FiberSplice, FiberStatus, WaypointRef};

use super::TopologyError;

/// Fiber numbers 1..=n of a 1:1 auto-splice that are still free on both sides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoSplicePlan {
    pub fibers: Vec<i32>,
    pub skipped: u32,
}

pub fn validate_fiber(seg: &CableSegment, fiber_no: i32) -> Result<(), TopologyError> {
    if !seg.carries(fiber_no) {
        return Err(TopologyError::validation(format!(
            "fiber {} is out of range for segment {} ({} fibers)",
            fiber_no, seg.id, seg.fiber_count
        )));
    }
    Ok(())
}

pub fn validate_loss(loss_db: f64) -> Result<(), TopologyError> {
    if !loss_db.is_finite() || loss_db < 0.0 {
        return Err(TopologyError::validation(format!(
            "loss_db must be a non-negative number (got {})",
            loss_db
        )));
    }
    Ok(())
}

fn require_at_jc(jc_id: i64, seg: &CableSegment) -> Result<(), TopologyError> {
    if !seg.touches(WaypointRef::jc(jc_id)) {
        return Err(TopologyError::validation(format!(
            "segment {} does not terminate at junction closure {}",
            seg.id, jc_id
        )));
    }
    Ok(())
}

/// Map of (segment, fiber) ends in use at a closure to the splice using them
fn used_ends(existing: &[FiberSplice]) -> HashMap<(i64, i32), &FiberSplice> {
    let mut used = HashMap::new();
    for splice in existing {
        used.insert((splice.incoming_segment_id, splice.incoming_fiber_no), splice);
        used.insert((splice.outgoing_segment_id, splice.outgoing_fiber_no), splice);
    }
    used
}

/// Check a new splice against the closure's existing splices.
/// `existing` must hold every splice at `jc_id`.
pub fn check_new_splice(
    jc_id: i64,
    incoming: &CableSegment,
    incoming_fiber_no: i32,
    outgoing: &CableSegment,
    outgoing_fiber_no: i32,
    existing: &[FiberSplice],
) -> Result<(), TopologyError> {
    validate_fiber(incoming, incoming_fiber_no)?;
    validate_fiber(outgoing, outgoing_fiber_no)?;
    if incoming.id == outgoing.id && incoming_fiber_no == outgoing_fiber_no {
        return Err(TopologyError::validation("a fiber cannot be spliced to itself"));
    }
    require_at_jc(jc_id, incoming)?;
    require_at_jc(jc_id, outgoing)?;

    let used = used_ends(existing);
    for (segment_id, fiber_no) in [
        (incoming.id, incoming_fiber_no),
        (outgoing.id, outgoing_fiber_no),
    ] {
        if let Some(splice) = used.get(&(segment_id, fiber_no)) {
            return Err(TopologyError::FiberAlreadySpliced {
                jc_id,
                segment_id,
                fiber_no,
                splice_id: splice.id,
            });
        }
    }
    Ok(())
}

/// Fibers of `seg` not used by any splice at the closure
pub fn available_fibers(seg: &CableSegment, existing: &[FiberSplice]) -> Vec<i32> {
    (1..=seg.fiber_count)
        .filter(|&f| !existing.iter().any(|s| s.uses(seg.id, f)))
        .collect()
}

/// Per-fiber usage of `seg` at the closure
pub fn fiber_statuses(seg: &CableSegment, existing: &[FiberSplice]) -> Vec<FiberAtJc> {
    (1..=seg.fiber_count)
        .map(|fiber_no| {
            let hit = existing.iter().find_map(|s| {
                if s.incoming_segment_id == seg.id && s.incoming_fiber_no == fiber_no {
                    Some((FiberStatus::UsedAsIncoming, s, s.outgoing_segment_id, s.outgoing_fiber_no))
                } else if s.outgoing_segment_id == seg.id && s.outgoing_fiber_no == fiber_no {
                    Some((FiberStatus::UsedAsOutgoing, s, s.incoming_segment_id, s.incoming_fiber_no))
                } else {
                    None
                }
            });
            match hit {
                Some((status, splice, other_segment, other_fiber)) => FiberAtJc {
                    fiber_no,
                    status,
                    splice_id: Some(splice.id),
                    connected_to_segment: Some(other_segment),
                    connected_to_fiber: Some(other_fiber),
                    loss_db: Some(splice.loss_db),
                },
                None => FiberAtJc {
                    fiber_no,
                    status: FiberStatus::Available,
                    splice_id: None,
                    connected_to_segment: None,
                    connected_to_fiber: None,
                    loss_db: None,
                },
            }
        })
        .collect()
}

/// Plan fiber n → fiber n splices between two segments at a closure.
/// A fiber already used on either side is skipped, so replanning after a
/// full run yields nothing new.
pub fn plan_auto_splice(
    jc_id: i64,
    segment1: &CableSegment,
    segment2: &CableSegment,
    existing: &[FiberSplice],
) -> Result<AutoSplicePlan, TopologyError> {
    if segment1.id == segment2.id {
        return Err(TopologyError::validation(
            "auto-splice needs two different segments",
        ));
    }
    require_at_jc(jc_id, segment1)?;
    require_at_jc(jc_id, segment2)?;

    let used = used_ends(existing);
    let mut plan = AutoSplicePlan { fibers: Vec::new(), skipped: 0 };
    for n in 1..=segment1.fiber_count.min(segment2.fiber_count) {
        if used.contains_key(&(segment1.id, n)) || used.contains_key(&(segment2.id, n)) {
            plan.skipped += 1;
        } else {
            plan.fibers.push(n);
        }
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::graph::fixtures::*;

    fn r1_segments() -> (CableSegment, CableSegment) {
        let snapshot = r1_snapshot(&[]);
        let mut segs = snapshot.segments.into_iter();
        (segs.next().unwrap(), segs.next().unwrap())
    }

    fn r1_splices(unspliced: &[i32]) -> Vec<FiberSplice> {
        r1_snapshot(unspliced).splices
    }

    #[test]
    fn test_fiber_out_of_range_is_validation_error() {
        let (s1, s2) = r1_segments();
        let err = check_new_splice(10, &s1, 25, &s2, 1, &[]).unwrap_err();
        assert!(matches!(err, TopologyError::Validation(_)));
        assert!(err.to_string().contains("fiber 25"));
        assert!(check_new_splice(10, &s1, 0, &s2, 1, &[]).is_err());
    }

    #[test]
    fn test_already_spliced_in_either_direction() {
        let (s1, s2) = r1_segments();
        let existing = r1_splices(&[3, 4]);

        // fiber 5 of s1 is used as incoming
        let err = check_new_splice(10, &s1, 5, &s2, 3, &existing).unwrap_err();
        assert_eq!(
            err,
            TopologyError::FiberAlreadySpliced { jc_id: 10, segment_id: 101, fiber_no: 5, splice_id: 105 }
        );

        // fiber 6 of s2 is used as outgoing; reversing direction does not help
        let err = check_new_splice(10, &s2, 6, &s1, 3, &existing).unwrap_err();
        assert!(matches!(err, TopologyError::FiberAlreadySpliced { segment_id: 102, fiber_no: 6, .. }));

        assert!(check_new_splice(10, &s1, 3, &s2, 4, &existing).is_ok());
    }

    #[test]
    fn test_segment_must_reach_closure() {
        let (s1, s2) = r1_segments();
        let err = check_new_splice(99, &s1, 1, &s2, 1, &[]).unwrap_err();
        assert!(matches!(err, TopologyError::Validation(_)));
    }

    #[test]
    fn test_available_fibers_and_statuses() {
        let (s1, s2) = r1_segments();
        let existing = r1_splices(&[2, 7]);
        let free = available_fibers(&s1, &existing);
        assert_eq!(free, vec![2, 7]);

        let statuses = fiber_statuses(&s2, &existing);
        assert_eq!(statuses.len(), 24);
        assert_eq!(statuses[1].status, FiberStatus::Available);
        assert_eq!(statuses[0].status, FiberStatus::UsedAsOutgoing);
        assert_eq!(statuses[0].connected_to_segment, Some(101));
        assert_eq!(statuses[0].connected_to_fiber, Some(1));
        assert_eq!(statuses[0].splice_id, Some(101));
    }

    #[test]
    fn test_auto_splice_plan_skips_used_fibers() {
        let (s1, s2) = r1_segments();
        let plan = plan_auto_splice(10, &s1, &s2, &[]).unwrap();
        assert_eq!(plan.fibers.len(), 24);
        assert_eq!(plan.skipped, 0);

        let plan = plan_auto_splice(10, &s1, &s2, &r1_splices(&[5])).unwrap();
        assert_eq!(plan.fibers, vec![5]);
        assert_eq!(plan.skipped, 23);

        let plan = plan_auto_splice(10, &s1, &s2, &r1_splices(&[])).unwrap();
        assert!(plan.fibers.is_empty());
    }

    #[test]
    fn test_auto_splice_uses_smaller_fiber_count() {
        let (s1, mut s2) = r1_segments();
        s2.fiber_count = 12;
        let plan = plan_auto_splice(10, &s1, &s2, &[]).unwrap();
        assert_eq!(plan.fibers, (1..=12).collect::<Vec<_>>());
    }

    #[test]
    fn test_loss_validation() {
        assert!(validate_loss(0.0).is_ok());
        assert!(validate_loss(0.35).is_ok());
        assert!(validate_loss(-0.1).is_err());
        assert!(validate_loss(f64::NAN).is_err());
    }
}
