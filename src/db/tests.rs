use tokio_test::{assert_err, assert_ok};

use super::Store;
use crate::models::*;
use crate::topology::TopologyError;

const TOL: f64 = 1e-6;

struct Route {
    a: i64,
    b: i64,
    cable: i64,
}

fn topology_error(err: &anyhow::Error) -> &TopologyError {
    match err.downcast_ref::<TopologyError>() {
        Some(e) => e,
        None => panic!("expected a topology error, got: {:#}", err),
    }
}

async fn node(store: &Store, name: &str) -> i64 {
    let req = CreateNodeRequest {
        name: name.to_string(),
        latitude: None,
        longitude: None,
    };
    assert_ok!(store.create_node(&req).await).id
}

/// 24-fiber cable between two nodes
async fn cable_between(store: &Store, name: &str, from: i64, to: i64, rkm: f64) -> i64 {
    let req = CreateCableRequest {
        route_name: name.to_string(),
        capacity: 24,
        current_rkm: rkm,
        sn_id: from,
        sn_type: WaypointKind::Node,
        en_id: to,
        en_type: WaypointKind::Node,
    };
    assert_ok!(store.create_cable(&req).await).id
}

/// A --10 km, 24 fibers-- B
async fn r1(store: &Store) -> Route {
    let a = node(store, "A").await;
    let b = node(store, "B").await;
    let cable = cable_between(store, "R1", a, b, 10.0).await;
    Route { a, b, cable }
}

fn jc_req(name: &str, position_km: f64) -> AddJunctionClosureRequest {
    AddJunctionClosureRequest {
        name: name.to_string(),
        position_km,
        node_id: None,
        latitude: None,
        longitude: None,
    }
}

/// R1 with J1 at 4 km and every fiber spliced straight through
async fn r1_spliced(store: &Store, loss_db: f64) -> (Route, i64, Vec<CableSegment>) {
    let route = r1(store).await;
    let j1 = assert_ok!(store.add_junction_closure(route.cable, &jc_req("J1", 4.0)).await).id;
    let segments = assert_ok!(store.get_segments_for_route(route.cable).await);
    let req = AutoSpliceRequest {
        segment1_id: segments[0].id,
        segment2_id: segments[1].id,
        loss_db: Some(loss_db),
    };
    assert_ok!(store.auto_splice_straight_segments(j1, &req, 0.0).await);
    (route, j1, segments)
}

async fn splice_for_fiber(store: &Store, jc_id: i64, fiber_no: i32) -> FiberSplice {
    let details = assert_ok!(store.get_splicing_details(jc_id).await);
    match details.existing_splices.into_iter().find(|s| s.incoming_fiber_no == fiber_no) {
        Some(s) => s,
        None => panic!("no splice for fiber {} at JC {}", fiber_no, jc_id),
    }
}

async fn path(store: &Store, route: &Route, name: &str, fiber_no: i32) -> LogicalPath {
    let req = CreateLogicalPathRequest {
        name: name.to_string(),
        start_node_id: route.a,
        end_node_id: route.b,
        start_fiber_no: Some(fiber_no),
        ring_id: None,
    };
    assert_ok!(store.create_logical_path(&req).await)
}

fn assert_chain(segments: &[CableSegment], route: &Route) {
    for (i, seg) in segments.iter().enumerate() {
        assert_eq!(seg.segment_order, i as i32 + 1);
    }
    for pair in segments.windows(2) {
        assert_eq!(pair[0].end(), pair[1].start());
    }
    assert_eq!(segments[0].start(), WaypointRef::node(route.a));
    assert_eq!(segments[segments.len() - 1].end(), WaypointRef::node(route.b));
    let total: f64 = segments.iter().map(|s| s.distance_km).sum();
    assert!((total - 10.0).abs() < TOL, "total distance {}", total);
}

#[tokio::test]
async fn test_new_cable_has_single_segment() {
    let store = assert_ok!(Store::in_memory().await);
    let route = r1(&store).await;

    let segments = assert_ok!(store.get_segments_for_route(route.cable).await);
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].fiber_count, 24);
    assert_chain(&segments, &route);

    let details = assert_ok!(store.get_route_details(route.cable).await);
    assert_eq!(details.evolution_status, EvolutionStatus::Simple);
}

#[tokio::test]
async fn test_add_jc_splits_segment() {
    let store = assert_ok!(Store::in_memory().await);
    let route = r1(&store).await;

    let j1 = assert_ok!(store.add_junction_closure(route.cable, &jc_req("J1", 4.0)).await);
    let segments = assert_ok!(store.get_segments_for_route(route.cable).await);

    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].end(), j1.waypoint());
    assert!((segments[0].distance_km - 4.0).abs() < TOL);
    assert!((segments[1].distance_km - 6.0).abs() < TOL);
    assert!(segments.iter().all(|s| s.fiber_count == 24));
    assert_chain(&segments, &route);

    let waypoints = assert_ok!(store.get_waypoint_sequence(route.cable).await);
    let names: Vec<_> = waypoints.iter().map(|w| w.name.clone().unwrap_or_default()).collect();
    assert_eq!(names, vec!["A", "J1", "B"]);

    let details = assert_ok!(store.get_route_details(route.cable).await);
    assert_eq!(details.evolution_status, EvolutionStatus::FullySegmented);
}

#[tokio::test]
async fn test_add_jc_rejects_bad_position() {
    let store = assert_ok!(Store::in_memory().await);
    let route = r1(&store).await;

    for position in [0.0, 10.0, -1.0, 12.0, f64::NAN] {
        let err = assert_err!(store.add_junction_closure(route.cable, &jc_req("J", position)).await);
        assert!(matches!(topology_error(&err), TopologyError::Validation(_)), "{}", position);
    }
    assert_ok!(store.add_junction_closure(route.cable, &jc_req("J1", 4.0)).await);
    let err = assert_err!(store.add_junction_closure(route.cable, &jc_req("J2", 4.0)).await);
    assert!(matches!(topology_error(&err), TopologyError::Validation(_)));
    assert_eq!(assert_ok!(store.get_segments_for_route(route.cable).await).len(), 2);
}

#[tokio::test]
async fn test_auto_splice_full_segment() {
    let store = assert_ok!(Store::in_memory().await);
    let (_, j1, _) = r1_spliced(&store, 0.05).await;

    let details = assert_ok!(store.get_splicing_details(j1).await);
    assert_eq!(details.existing_splices.len(), 24);
    assert!(details.existing_splices.iter().all(|s| s.splice_type == SpliceType::Straight));
    assert!(details
        .existing_splices
        .iter()
        .all(|s| s.incoming_fiber_no == s.outgoing_fiber_no));
    assert_eq!(details.incoming_segments.len(), 1);
    assert_eq!(details.outgoing_segments.len(), 1);
    assert_eq!(details.incoming_segments[0].segment_name, "R1 (Seg 1)");
    assert!(details.available_fibers.iter().all(|a| a.fibers.is_empty()));
}

#[tokio::test]
async fn test_auto_splice_fills_gap_after_delete() {
    let store = assert_ok!(Store::in_memory().await);
    let (_, j1, segments) = r1_spliced(&store, 0.05).await;

    let fiber5 = splice_for_fiber(&store, j1, 5).await;
    assert_ok!(store.delete_splice(fiber5.id).await);

    let details = assert_ok!(store.get_splicing_details(j1).await);
    let incoming = &details.incoming_segments[0];
    assert_eq!(incoming.fibers[4].status, FiberStatus::Available);
    assert_eq!(incoming.fibers[5].status, FiberStatus::UsedAsIncoming);

    let req = AutoSpliceRequest {
        segment1_id: segments[0].id,
        segment2_id: segments[1].id,
        loss_db: None,
    };
    let result = assert_ok!(store.auto_splice_straight_segments(j1, &req, 0.02).await);
    assert_eq!(result, AutoSpliceResult { splices_created: 1, skipped: 23 });

    let again = assert_ok!(store.auto_splice_straight_segments(j1, &req, 0.02).await);
    assert_eq!(again, AutoSpliceResult { splices_created: 0, skipped: 24 });
    let refilled = splice_for_fiber(&store, j1, 5).await;
    assert!((refilled.loss_db - 0.02).abs() < 1e-9);
}

#[tokio::test]
async fn test_trace_through_closure() {
    let store = assert_ok!(Store::in_memory().await);
    let (route, j1, segments) = r1_spliced(&store, 0.05).await;

    let trace = assert_ok!(store.trace_fiber_path(route.a, route.b, 5).await);
    assert!(trace.is_complete());
    let steps: Vec<_> = trace
        .elements
        .iter()
        .map(|e| (e.element_type, e.element_id, e.fiber_in, e.fiber_out))
        .collect();
    let splice = splice_for_fiber(&store, j1, 5).await;
    assert_eq!(
        steps,
        vec![
            (TraceElementType::Segment, segments[0].id, 5, 5),
            (TraceElementType::Splice, splice.id, 5, 5),
            (TraceElementType::Segment, segments[1].id, 5, 5),
        ]
    );
    assert_eq!(trace.elements[0].from, WaypointRef::node(route.a));
    assert_eq!(trace.elements[2].to, WaypointRef::node(route.b));
    assert!((trace.total_distance_km - 10.0).abs() < TOL);
    assert!((trace.total_loss_db - 0.05).abs() < 1e-9);
}

#[tokio::test]
async fn test_trace_dead_end_returns_partial() {
    let store = assert_ok!(Store::in_memory().await);
    let (route, j1, segments) = r1_spliced(&store, 0.05).await;
    let fiber7 = splice_for_fiber(&store, j1, 7).await;
    assert_ok!(store.delete_splice(fiber7.id).await);

    let trace = assert_ok!(store.trace_fiber_path(route.a, route.b, 7).await);
    assert_eq!(
        trace.outcome,
        TraceOutcome::DeadEndFiber { jc_id: j1, segment_id: segments[0].id, fiber_no: 7 }
    );
    assert_eq!(trace.elements.len(), 1);

    let err = assert_err!(store.trace_fiber_path(route.a, route.b, 30).await);
    assert!(matches!(topology_error(&err), TopologyError::NoPathFound { .. }));
}

#[tokio::test]
async fn test_remove_jc_merges_and_drops_splices() {
    let store = assert_ok!(Store::in_memory().await);
    let (route, j1, _) = r1_spliced(&store, 0.05).await;
    let some_splice = splice_for_fiber(&store, j1, 1).await;

    let merged = assert_ok!(store.remove_junction_closure(j1).await);
    assert_eq!(merged.segment_order, 1);
    assert!((merged.distance_km - 10.0).abs() < TOL);

    let segments = assert_ok!(store.get_segments_for_route(route.cable).await);
    assert_eq!(segments.len(), 1);
    assert_chain(&segments, &route);

    let err = assert_err!(store.get_splice(some_splice.id).await);
    assert!(err.downcast_ref::<super::NotFoundError>().is_some());
    let err = assert_err!(store.get_junction_closure(j1).await);
    assert!(err.downcast_ref::<super::NotFoundError>().is_some());
}

#[tokio::test]
async fn test_splice_fiber_out_of_range() {
    let store = assert_ok!(Store::in_memory().await);
    let route = r1(&store).await;
    let j1 = assert_ok!(store.add_junction_closure(route.cable, &jc_req("J1", 4.0)).await).id;
    let segments = assert_ok!(store.get_segments_for_route(route.cable).await);

    let req = CreateSpliceRequest {
        incoming_segment_id: segments[0].id,
        incoming_fiber_no: 25,
        outgoing_segment_id: segments[1].id,
        outgoing_fiber_no: 1,
        splice_type: SpliceType::Straight,
        loss_db: None,
    };
    let err = assert_err!(store.create_splice(j1, &req, 0.0).await);
    assert!(matches!(topology_error(&err), TopologyError::Validation(_)));
    let details = assert_ok!(store.get_splicing_details(j1).await);
    assert!(details.existing_splices.is_empty());
}

#[tokio::test]
async fn test_splice_fiber_used_twice() {
    let store = assert_ok!(Store::in_memory().await);
    let (_, j1, segments) = r1_spliced(&store, 0.05).await;

    let req = CreateSpliceRequest {
        incoming_segment_id: segments[0].id,
        incoming_fiber_no: 3,
        outgoing_segment_id: segments[1].id,
        outgoing_fiber_no: 4,
        splice_type: SpliceType::Cross,
        loss_db: Some(0.1),
    };
    let err = assert_err!(store.create_splice(j1, &req, 0.0).await);
    assert!(matches!(topology_error(&err), TopologyError::FiberAlreadySpliced { .. }));
}

#[tokio::test]
async fn test_insert_then_remove_restores_route() {
    let store = assert_ok!(Store::in_memory().await);
    let route = r1(&store).await;
    let j1 = assert_ok!(store.add_junction_closure(route.cable, &jc_req("J1", 3.3)).await).id;
    let j2 = assert_ok!(store.add_junction_closure(route.cable, &jc_req("J2", 7.1)).await).id;
    let j3 = assert_ok!(store.add_junction_closure(route.cable, &jc_req("J3", 5.0)).await).id;
    let segments = assert_ok!(store.get_segments_for_route(route.cable).await);
    assert_eq!(segments.len(), 4);
    assert_chain(&segments, &route);

    assert_ok!(store.remove_junction_closure(j3).await);
    assert_chain(&assert_ok!(store.get_segments_for_route(route.cable).await), &route);
    assert_ok!(store.remove_junction_closure(j1).await);
    assert_ok!(store.remove_junction_closure(j2).await);

    let segments = assert_ok!(store.get_segments_for_route(route.cable).await);
    assert_eq!(segments.len(), 1);
    assert_chain(&segments, &route);
}

#[tokio::test]
async fn test_concurrent_jc_inserts_keep_chain() {
    let store = assert_ok!(Store::in_memory().await);
    let route = r1(&store).await;

    let (s1, s2, s3) = (store.clone(), store.clone(), store.clone());
    let (j1, j2, j3) = (jc_req("J1", 2.0), jc_req("J2", 6.0), jc_req("J3", 8.5));
    let (first, second, third) = tokio::join!(
        s1.add_junction_closure(route.cable, &j1),
        s2.add_junction_closure(route.cable, &j2),
        s3.add_junction_closure(route.cable, &j3),
    );
    assert_ok!(first);
    assert_ok!(second);
    assert_ok!(third);

    let segments = assert_ok!(store.get_segments_for_route(route.cable).await);
    assert_eq!(segments.len(), 4);
    assert_chain(&segments, &route);
}

/// Store on a database file with a multi-connection pool, removed on drop
struct FileStore {
    store: Store,
    path: std::path::PathBuf,
}

impl FileStore {
    async fn open(name: &str) -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let path = std::env::temp_dir().join(format!("ofc-topology-{}-{}-{}.db", name, std::process::id(), nanos));
        let store = assert_ok!(Store::with_pool_size(&path.to_string_lossy(), 4).await);
        FileStore { store, path }
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm", "-journal"] {
            let _ = std::fs::remove_file(format!("{}{}", self.path.to_string_lossy(), suffix));
        }
    }
}

fn lost_write_race(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<TopologyError>(), Some(TopologyError::Conflict(_)))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mutations_on_shared_database_file() {
    let db = FileStore::open("concurrent").await;
    let store = &db.store;
    let route = r1(store).await;

    // Inserts on one route are serialised by the route lock
    let (j1, j2, j3) = (jc_req("J1", 2.0), jc_req("J2", 6.0), jc_req("J3", 8.5));
    let (first, second, third) = tokio::join!(
        store.add_junction_closure(route.cable, &j1),
        store.add_junction_closure(route.cable, &j2),
        store.add_junction_closure(route.cable, &j3),
    );
    let closures = [assert_ok!(first).id, assert_ok!(second).id, assert_ok!(third).id];
    let segments = assert_ok!(store.get_segments_for_route(route.cable).await);
    assert_eq!(segments.len(), 4);
    assert_chain(&segments, &route);

    // Auto-splices at different closures run in parallel on separate
    // connections; a lost write race comes back as Conflict and is rerun
    let requests: Vec<(i64, AutoSpliceRequest)> = (0..3)
        .map(|i| {
            let jc_id = closures[i];
            let req = AutoSpliceRequest {
                segment1_id: segments[i].id,
                segment2_id: segments[i + 1].id,
                loss_db: Some(0.02),
            };
            (jc_id, req)
        })
        .collect();
    let (r1_result, r2_result, r3_result) = tokio::join!(
        store.auto_splice_straight_segments(requests[0].0, &requests[0].1, 0.0),
        store.auto_splice_straight_segments(requests[1].0, &requests[1].1, 0.0),
        store.auto_splice_straight_segments(requests[2].0, &requests[2].1, 0.0),
    );
    for (result, (jc_id, req)) in [r1_result, r2_result, r3_result].into_iter().zip(&requests) {
        match result {
            Ok(created) => assert_eq!(created.splices_created, 24),
            Err(e) if lost_write_race(&e) => {
                assert_ok!(store.auto_splice_straight_segments(*jc_id, req, 0.0).await);
            }
            Err(e) => panic!("auto-splice at JC {} failed: {:#}", jc_id, e),
        }
    }

    for jc_id in closures {
        let details = assert_ok!(store.get_splicing_details(jc_id).await);
        assert_eq!(details.existing_splices.len(), 24);
    }
    let trace = assert_ok!(store.trace_fiber_path(route.a, route.b, 17).await);
    assert!(trace.is_complete());
    assert_eq!(trace.elements.len(), 7);
}

#[tokio::test]
async fn test_sync_and_demote_on_topology_change() {
    let store = assert_ok!(Store::in_memory().await);
    let (route, _, _) = r1_spliced(&store, 0.1).await;
    let p = path(&store, &route, "A-B ch5", 5).await;
    assert_eq!(p.status, PathStatus::Planned);

    let synced = assert_ok!(store.sync_logical_path(p.id, &SyncPathRequest::default()).await);
    assert_eq!(synced.status, PathStatus::Provisioned);
    assert_eq!(synced.end_fiber_no, Some(5));
    assert!((synced.total_distance_km.unwrap_or_default() - 10.0).abs() < TOL);
    assert_eq!(assert_ok!(store.list_path_elements(p.id).await).len(), 3);

    // Splitting segment 2 breaks the synced trace
    assert_ok!(store.add_junction_closure(route.cable, &jc_req("J2", 7.0)).await);
    let demoted = assert_ok!(store.get_logical_path(p.id).await);
    assert_eq!(demoted.status, PathStatus::Configured);

    let err = assert_err!(store.sync_logical_path(p.id, &SyncPathRequest::default()).await);
    assert!(matches!(topology_error(&err), TopologyError::DeadEndFiber { .. }));
}

#[tokio::test]
async fn test_delete_splice_demotes_path() {
    let store = assert_ok!(Store::in_memory().await);
    let (route, j1, _) = r1_spliced(&store, 0.1).await;
    let p = path(&store, &route, "A-B ch9", 9).await;
    assert_ok!(store.sync_logical_path(p.id, &SyncPathRequest::default()).await);

    let fiber9 = splice_for_fiber(&store, j1, 9).await;
    assert_eq!(fiber9.logical_path_id, Some(p.id));
    assert_ok!(store.delete_splice(fiber9.id).await);
    assert_eq!(assert_ok!(store.get_logical_path(p.id).await).status, PathStatus::Configured);
}

#[tokio::test]
async fn test_splice_loss_update_reaches_path() {
    let store = assert_ok!(Store::in_memory().await);
    let (route, j1, _) = r1_spliced(&store, 0.1).await;
    let p = path(&store, &route, "A-B ch2", 2).await;
    assert_ok!(store.sync_logical_path(p.id, &SyncPathRequest::default()).await);

    let fiber2 = splice_for_fiber(&store, j1, 2).await;
    let updated = assert_ok!(store.update_splice_loss(fiber2.id, 0.35).await);
    assert!((updated.loss_db - 0.35).abs() < 1e-9);
    let p = assert_ok!(store.get_logical_path(p.id).await);
    assert!((p.total_loss_db.unwrap_or_default() - 0.35).abs() < 1e-9);
    assert_eq!(p.status, PathStatus::Provisioned);

    let err = assert_err!(store.update_splice_loss(fiber2.id, -1.0).await);
    assert!(matches!(topology_error(&err), TopologyError::Validation(_)));
}

#[tokio::test]
async fn test_sync_rejects_splice_held_by_other_path() {
    let store = assert_ok!(Store::in_memory().await);
    let (route, _, _) = r1_spliced(&store, 0.1).await;
    let first = path(&store, &route, "first", 5).await;
    let second = path(&store, &route, "second", 5).await;

    assert_ok!(store.sync_logical_path(first.id, &SyncPathRequest::default()).await);
    let err = assert_err!(store.sync_logical_path(second.id, &SyncPathRequest::default()).await);
    assert!(matches!(
        topology_error(&err),
        TopologyError::FiberInUse { fiber_no: 5, logical_path_id, .. } if *logical_path_id == first.id
    ));
}

#[tokio::test]
async fn test_sync_rejects_unspliced_fiber_held_by_other_path() {
    let store = assert_ok!(Store::in_memory().await);
    let route = r1(&store).await;
    let first = path(&store, &route, "first", 5).await;
    let second = path(&store, &route, "second", 5).await;

    // A single segment has no splice to collide on; the segment fiber itself is claimed
    assert_ok!(store.sync_logical_path(first.id, &SyncPathRequest::default()).await);
    let err = assert_err!(store.sync_logical_path(second.id, &SyncPathRequest::default()).await);
    assert!(matches!(
        topology_error(&err),
        TopologyError::FiberInUse { fiber_no: 5, logical_path_id, cable_id } if *logical_path_id == first.id && *cable_id == route.cable
    ));
    assert_eq!(assert_ok!(store.get_logical_path(second.id).await).status, PathStatus::Planned);

    let moved = assert_ok!(store.sync_logical_path(second.id, &SyncPathRequest { fiber_no: Some(6) }).await);
    assert_eq!(moved.status, PathStatus::Provisioned);
    assert_eq!(moved.end_fiber_no, Some(6));
}

#[tokio::test]
async fn test_assign_follows_synced_trace() {
    let store = assert_ok!(Store::in_memory().await);
    let route = r1(&store).await;
    let j1 = assert_ok!(store.add_junction_closure(route.cable, &jc_req("J1", 4.0)).await).id;
    let segments = assert_ok!(store.get_segments_for_route(route.cable).await);
    let splice = |fiber_in: i32, fiber_out: i32, splice_type: SpliceType| CreateSpliceRequest {
        incoming_segment_id: segments[0].id,
        incoming_fiber_no: fiber_in,
        outgoing_segment_id: segments[1].id,
        outgoing_fiber_no: fiber_out,
        splice_type,
        loss_db: None,
    };
    assert_ok!(store.create_splice(j1, &splice(5, 5, SpliceType::Straight), 0.05).await);
    assert_ok!(store.create_splice(j1, &splice(6, 8, SpliceType::Cross), 0.05).await);

    let system = assert_ok!(
        store
            .create_system(&CreateSystemRequest { name: "DWDM-1".to_string(), node_id: Some(route.a) })
            .await
    );
    let p = path(&store, &route, "A-B ch5", 5).await;
    assert_ok!(store.sync_logical_path(p.id, &SyncPathRequest::default()).await);

    let assign = |cable_id: i64, tx: i32, rx: i32| AssignFibersRequest {
        system_id: system.id,
        cable_id,
        fiber_tx: tx,
        fiber_rx: rx,
        destination_system_id: None,
        source_port: None,
        destination_port: None,
    };

    // A cable the path never crosses
    let c = node(&store, "C").await;
    let d = node(&store, "D").await;
    let elsewhere = cable_between(&store, "R2", c, d, 3.0).await;
    let err = assert_err!(store.assign_system_to_fibers(p.id, &assign(elsewhere, 5, 6)).await);
    assert!(matches!(topology_error(&err), TopologyError::Validation(_)));

    // Tx must be the fiber the path was synced on
    let err = assert_err!(store.assign_system_to_fibers(p.id, &assign(route.cable, 6, 5)).await);
    assert!(matches!(topology_error(&err), TopologyError::Validation(_)));

    // Rx 6 is crossed onto fiber 8 past J1, so fiber 8 is committed too
    let assigned = assert_ok!(store.assign_system_to_fibers(p.id, &assign(route.cable, 5, 6)).await);
    assert_eq!(assigned.status, PathStatus::Provisioned);
    let mut committed: Vec<_> = assert_ok!(store.list_path_assignments(p.id).await)
        .into_iter()
        .map(|a| (a.cable_id, a.fiber_no, a.direction))
        .collect();
    committed.sort_by_key(|(_, fiber_no, _)| *fiber_no);
    assert_eq!(
        committed,
        vec![
            (route.cable, 5, FiberDirection::Tx),
            (route.cable, 6, FiberDirection::Rx),
            (route.cable, 8, FiberDirection::Rx),
        ]
    );

    // Rx 7 has no splice at J1
    let err = assert_err!(store.assign_system_to_fibers(p.id, &assign(route.cable, 5, 7)).await);
    assert!(matches!(
        topology_error(&err),
        TopologyError::DeadEndFiber { jc_id, segment_id, fiber_no: 7 } if *jc_id == j1 && *segment_id == segments[0].id
    ));
    assert_eq!(assert_ok!(store.list_path_assignments(p.id).await).len(), 3);

    // The committed rx fiber cannot be taken by another path
    let other = path(&store, &route, "A-B ch6", 6).await;
    let err = assert_err!(store.sync_logical_path(other.id, &SyncPathRequest::default()).await);
    assert!(matches!(
        topology_error(&err),
        TopologyError::FiberInUse { fiber_no: 6, logical_path_id, .. } if *logical_path_id == p.id
    ));
    let available = assert_ok!(store.list_available_fibers(route.cable).await);
    assert!(!available.available_fibers.contains(&8));
}

#[tokio::test]
async fn test_path_available_fibers() {
    let store = assert_ok!(Store::in_memory().await);
    let (route, _, _) = r1_spliced(&store, 0.1).await;
    let system = assert_ok!(
        store
            .create_system(&CreateSystemRequest { name: "S".to_string(), node_id: None })
            .await
    );
    let own = path(&store, &route, "own", 3).await;
    let other = path(&store, &route, "other", 4).await;
    let unsynced = path(&store, &route, "unsynced", 7).await;
    assert_ok!(store.sync_logical_path(own.id, &SyncPathRequest::default()).await);
    assert_ok!(store.sync_logical_path(other.id, &SyncPathRequest::default()).await);
    let req = AssignFibersRequest {
        system_id: system.id,
        cable_id: route.cable,
        fiber_tx: 4,
        fiber_rx: 10,
        destination_system_id: None,
        source_port: None,
        destination_port: None,
    };
    assert_ok!(store.assign_system_to_fibers(other.id, &req).await);

    let availability = assert_ok!(store.list_path_available_fibers(own.id).await);
    assert_eq!(availability.logical_path_id, own.id);
    assert_eq!(availability.cable_ids, vec![route.cable]);
    assert!(availability.available_fibers.contains(&3));
    assert!(!availability.available_fibers.contains(&4));
    assert!(!availability.available_fibers.contains(&10));
    assert_eq!(availability.available_fibers.len(), 22);

    let err = assert_err!(store.list_path_available_fibers(unsynced.id).await);
    assert!(matches!(topology_error(&err), TopologyError::Validation(_)));
}

#[tokio::test]
async fn test_deprovision_requires_committed_path() {
    let store = assert_ok!(Store::in_memory().await);
    let (route, _, _) = r1_spliced(&store, 0.1).await;
    let p = path(&store, &route, "A-B ch11", 11).await;

    let err = assert_err!(store.deprovision_logical_path(p.id).await);
    assert!(matches!(topology_error(&err), TopologyError::Validation(_)));
    assert_eq!(assert_ok!(store.get_logical_path(p.id).await).status, PathStatus::Planned);

    assert_ok!(store.sync_logical_path(p.id, &SyncPathRequest::default()).await);
    let gone = assert_ok!(store.deprovision_logical_path(p.id).await);
    assert_eq!(gone.status, PathStatus::Deprovisioned);
    let err = assert_err!(store.deprovision_logical_path(p.id).await);
    assert!(matches!(topology_error(&err), TopologyError::Validation(_)));

    // A deprovisioned path can be synced back into service
    let revived = assert_ok!(store.sync_logical_path(p.id, &SyncPathRequest::default()).await);
    assert_eq!(revived.status, PathStatus::Provisioned);
}

#[tokio::test]
async fn test_reverse_path() {
    let store = assert_ok!(Store::in_memory().await);
    let (route, _, segments) = r1_spliced(&store, 0.1).await;
    let p = path(&store, &route, "A-B ch4", 4).await;
    assert_ok!(store.sync_logical_path(p.id, &SyncPathRequest::default()).await);

    let reversed = assert_ok!(store.reverse_logical_path(p.id).await);
    assert_eq!(reversed.start_node_id, route.b);
    assert_eq!(reversed.end_node_id, route.a);
    assert_eq!(reversed.status, PathStatus::Provisioned);
    let elements = assert_ok!(store.list_path_elements(p.id).await);
    assert_eq!(elements[0].element_id, segments[1].id);
}

#[tokio::test]
async fn test_assign_and_deprovision() {
    let store = assert_ok!(Store::in_memory().await);
    let (route, j1, _) = r1_spliced(&store, 0.1).await;
    let system = assert_ok!(
        store
            .create_system(&CreateSystemRequest { name: "MAAN-1".to_string(), node_id: Some(route.a) })
            .await
    );
    let first = path(&store, &route, "first", 1).await;
    let second = path(&store, &route, "second", 3).await;

    let assign = |tx: i32, rx: i32| AssignFibersRequest {
        system_id: system.id,
        cable_id: route.cable,
        fiber_tx: tx,
        fiber_rx: rx,
        destination_system_id: None,
        source_port: Some("1/1".to_string()),
        destination_port: None,
    };

    // Not synced yet, so only configured
    let p = assert_ok!(store.assign_system_to_fibers(first.id, &assign(1, 2)).await);
    assert_eq!(p.status, PathStatus::Configured);
    assert_eq!(p.source_system_id, Some(system.id));

    let err = assert_err!(store.assign_system_to_fibers(second.id, &assign(2, 3)).await);
    assert!(matches!(
        topology_error(&err),
        TopologyError::FiberInUse { fiber_no: 2, .. }
    ));
    let err = assert_err!(store.assign_system_to_fibers(second.id, &assign(3, 3)).await);
    assert!(matches!(topology_error(&err), TopologyError::Validation(_)));
    let err = assert_err!(store.assign_system_to_fibers(second.id, &assign(3, 40)).await);
    assert!(matches!(topology_error(&err), TopologyError::Validation(_)));

    // Reassigning releases the earlier pair
    assert_ok!(store.assign_system_to_fibers(first.id, &assign(5, 6)).await);
    let available = assert_ok!(store.list_available_fibers(route.cable).await);
    assert!(available.available_fibers.contains(&1));
    assert!(!available.available_fibers.contains(&5));

    // Once synced, fiber_tx has to be the traced fiber
    assert_ok!(store.sync_logical_path(first.id, &SyncPathRequest::default()).await);
    let err = assert_err!(store.assign_system_to_fibers(first.id, &assign(5, 6)).await);
    assert!(matches!(topology_error(&err), TopologyError::Validation(_)));
    let p = assert_ok!(store.assign_system_to_fibers(first.id, &assign(1, 2)).await);
    assert_eq!(p.status, PathStatus::Provisioned);
    let committed: Vec<_> = assert_ok!(store.list_path_assignments(first.id).await)
        .into_iter()
        .map(|a| (a.fiber_no, a.direction))
        .collect();
    assert_eq!(committed, vec![(1, FiberDirection::Tx), (2, FiberDirection::Rx)]);

    let p = assert_ok!(store.deprovision_logical_path(first.id).await);
    assert_eq!(p.status, PathStatus::Deprovisioned);
    assert_eq!(p.source_system_id, None);
    assert_eq!(p.source_port, None);
    assert!(assert_ok!(store.list_path_assignments(first.id).await).is_empty());
    assert!(assert_ok!(store.list_path_elements(first.id).await).is_empty());
    assert_eq!(assert_ok!(store.list_available_fibers(route.cable).await).available_fibers.len(), 24);
    assert_eq!(splice_for_fiber(&store, j1, 1).await.logical_path_id, None);
}

#[tokio::test]
async fn test_ring_path_generation() {
    let store = assert_ok!(Store::in_memory().await);
    let a = node(&store, "A").await;
    let b = node(&store, "B").await;
    let c = node(&store, "C").await;
    let d = node(&store, "D").await;
    let ring = assert_ok!(store.create_ring(&CreateRingRequest { name: "Ring-1".to_string() }).await);

    for (node_id, order) in [(a, 1.0), (b, 2.0), (c, 3.0)] {
        assert_ok!(store.add_ring_node(ring.id, &AddRingNodeRequest { node_id, order_in_ring: order }).await);
    }
    let result = assert_ok!(store.generate_ring_connection_paths(ring.id).await);
    assert_eq!(result, GenerateRingPathsResult { created: 3, kept: 0, removed: 0 });

    let query = LogicalPathQuery { ring_id: Some(ring.id) };
    let paths = assert_ok!(store.list_logical_paths(&query).await);
    let mut names: Vec<_> = paths.iter().map(|p| p.name.clone()).collect();
    names.sort();
    assert_eq!(names, vec!["A ↔ B", "B ↔ C", "C ↔ A"]);
    assert!(paths.iter().all(|p| p.status == PathStatus::Planned));

    // D between B and C replaces the B-C hop
    assert_ok!(store.add_ring_node(ring.id, &AddRingNodeRequest { node_id: d, order_in_ring: 2.5 }).await);
    let members = assert_ok!(store.list_ring_nodes(ring.id).await);
    let order: Vec<_> = members.iter().map(|m| m.node_id).collect();
    assert_eq!(order, vec![a, b, d, c]);

    let result = assert_ok!(store.generate_ring_connection_paths(ring.id).await);
    assert_eq!(result, GenerateRingPathsResult { created: 2, kept: 2, removed: 1 });
    let again = assert_ok!(store.generate_ring_connection_paths(ring.id).await);
    assert_eq!(again, GenerateRingPathsResult { created: 0, kept: 4, removed: 0 });

    let err = assert_err!(store.add_ring_node(ring.id, &AddRingNodeRequest { node_id: d, order_in_ring: 9.0 }).await);
    assert!(matches!(topology_error(&err), TopologyError::Validation(_)));
}

#[tokio::test]
async fn test_ring_keeps_configured_paths() {
    let store = assert_ok!(Store::in_memory().await);
    let a = node(&store, "A").await;
    let b = node(&store, "B").await;
    let c = node(&store, "C").await;
    let ring = assert_ok!(store.create_ring(&CreateRingRequest { name: "Ring-2".to_string() }).await);
    for (node_id, order) in [(a, 1.0), (b, 2.0)] {
        assert_ok!(store.add_ring_node(ring.id, &AddRingNodeRequest { node_id, order_in_ring: order }).await);
    }
    assert_ok!(store.generate_ring_connection_paths(ring.id).await);

    // A manually configured A-C path on the ring is not adjacent but must survive
    let manual = CreateLogicalPathRequest {
        name: "A-C".to_string(),
        start_node_id: a,
        end_node_id: c,
        start_fiber_no: None,
        ring_id: Some(ring.id),
    };
    let manual = assert_ok!(store.create_logical_path(&manual).await);
    let system = assert_ok!(
        store
            .create_system(&CreateSystemRequest { name: "S".to_string(), node_id: None })
            .await
    );
    let cable = cable_between(&store, "A-C", a, c, 7.5).await;
    let req = AssignFibersRequest {
        system_id: system.id,
        cable_id: cable,
        fiber_tx: 1,
        fiber_rx: 2,
        destination_system_id: None,
        source_port: None,
        destination_port: None,
    };
    assert_ok!(store.assign_system_to_fibers(manual.id, &req).await);

    let result = assert_ok!(store.generate_ring_connection_paths(ring.id).await);
    assert_eq!(result, GenerateRingPathsResult { created: 0, kept: 1, removed: 0 });
    assert_eq!(assert_ok!(store.get_logical_path(manual.id).await).status, PathStatus::Configured);
}

#[tokio::test]
async fn test_topology_export_import() {
    let store = assert_ok!(Store::in_memory().await);
    let (route, j1, segments) = r1_spliced(&store, 0.05).await;

    let doc = assert_ok!(store.export_route_topology(route.cable).await);
    assert_eq!(doc.junction_closures.len(), 1);
    assert_eq!(doc.cable_segments.len(), 2);
    assert_eq!(doc.fiber_splices.len(), 24);

    let result = assert_ok!(store.import_route_topology(route.cable, &doc).await);
    assert_eq!(
        result,
        ImportTopologyResult { junction_closures: 1, cable_segments: 2, fiber_splices: 24 }
    );
    assert_eq!(assert_ok!(store.export_route_topology(route.cable).await), doc);

    // Lengths that no longer add up are rejected and nothing is written
    let mut broken = doc.clone();
    broken.cable_segments[1].distance_km = 5.0;
    let err = assert_err!(store.import_route_topology(route.cable, &broken).await);
    assert!(matches!(topology_error(&err), TopologyError::Validation(_)));
    assert_eq!(assert_ok!(store.export_route_topology(route.cable).await), doc);

    // Dropping the closure collapses the route back to one segment
    let collapsed = TopologySheets {
        junction_closures: vec![],
        cable_segments: vec![CableSegmentSheetRow {
            id: segments[0].id,
            segment_order: 1,
            start_node_id: route.a,
            start_node_type: WaypointKind::Node,
            end_node_id: route.b,
            end_node_type: WaypointKind::Node,
            distance_km: 10.0,
            fiber_count: 24,
        }],
        fiber_splices: vec![],
    };
    assert_ok!(store.import_route_topology(route.cable, &collapsed).await);
    let after = assert_ok!(store.get_segments_for_route(route.cable).await);
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].id, segments[0].id);
    assert_chain(&after, &route);
    assert!(store.get_junction_closure(j1).await.is_err());

    // Restoring the export brings every row back under its old id
    assert_ok!(store.import_route_topology(route.cable, &doc).await);
    assert_eq!(assert_ok!(store.export_route_topology(route.cable).await), doc);
    let trace = assert_ok!(store.trace_fiber_path(route.a, route.b, 12).await);
    assert!(trace.is_complete());
}

#[tokio::test]
async fn test_cable_validation() {
    let store = assert_ok!(Store::in_memory().await);
    let route = r1(&store).await;

    let dup = CreateCableRequest {
        route_name: "R1".to_string(),
        capacity: 24,
        current_rkm: 5.0,
        sn_id: route.a,
        sn_type: WaypointKind::Node,
        en_id: route.b,
        en_type: WaypointKind::Node,
    };
    let err = assert_err!(store.create_cable(&dup).await);
    assert!(matches!(topology_error(&err), TopologyError::Validation(_)));

    let zero = CreateCableRequest { route_name: "R2".to_string(), current_rkm: 0.0, ..dup.clone() };
    assert_err!(store.create_cable(&zero).await);

    let missing = CreateCableRequest { route_name: "R3".to_string(), en_id: 999, ..dup };
    let err = assert_err!(store.create_cable(&missing).await);
    assert!(err.downcast_ref::<super::NotFoundError>().is_some() || err.downcast_ref::<TopologyError>().is_some());

    let cable = assert_ok!(store.deactivate_cable(route.cable).await);
    assert!(!cable.status);
}
