use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite, SqliteConnection};

use super::cables::CableRepo;
use super::nodes::{NodeRepo, SystemRepo};
use super::rings::RingRepo;
use super::row_helpers::{map_assignment_row, map_logical_path_row, map_path_element_row, placeholders};
use super::trace::TraceRepo;
use crate::models::*;
use crate::topology::{tracer, TopologyError, TopologyGraph};

const SELECT_PATH: &str = r#"
    SELECT id, name, ring_id, start_node_id, end_node_id, start_fiber_no, end_fiber_no,
           source_system_id, destination_system_id, source_port, destination_port,
           status, total_distance_km, total_loss_db, created_at, updated_at
    FROM logical_paths
"#;

/// One segment of a synced trace and the fiber the path carries on it
#[derive(Debug, Clone, Copy)]
struct TracedSegment {
    segment_id: i64,
    cable_id: i64,
    fiber_count: i32,
    fiber_no: i32,
}

/// A fiber a path is about to hold, on one segment or on a whole cable
struct FiberClaim {
    segment_id: Option<i64>,
    cable_id: i64,
    fiber_no: i32,
    direction: FiberDirection,
}

/// Logical path database operations
pub struct LogicalPathRepo;

impl LogicalPathRepo {
    pub async fn list(pool: &Pool<Sqlite>, query: &LogicalPathQuery) -> Result<Vec<LogicalPath>> {
        let rows = match query.ring_id {
            Some(ring_id) => {
                sqlx::query(&format!("{} WHERE ring_id = ? ORDER BY id", SELECT_PATH))
                    .bind(ring_id)
                    .fetch_all(pool)
                    .await?
            }
            None => {
                sqlx::query(&format!("{} ORDER BY id", SELECT_PATH))
                    .fetch_all(pool)
                    .await?
            }
        };
        Ok(rows.iter().map(map_logical_path_row).collect())
    }

    pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<Option<LogicalPath>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_PATH))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.as_ref().map(map_logical_path_row))
    }

    pub async fn require(conn: &mut SqliteConnection, id: i64) -> Result<LogicalPath> {
        Self::get(conn, id)
            .await?
            .ok_or_else(|| super::NotFoundError::new("Logical path", &id.to_string()).into())
    }

    pub async fn list_for_ring(conn: &mut SqliteConnection, ring_id: i64) -> Result<Vec<LogicalPath>> {
        let rows = sqlx::query(&format!("{} WHERE ring_id = ? ORDER BY id", SELECT_PATH))
            .bind(ring_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(map_logical_path_row).collect())
    }

    /// Insert a path row and return its id
    pub async fn insert(conn: &mut SqliteConnection, req: &CreateLogicalPathRequest) -> Result<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"INSERT INTO logical_paths (name, ring_id, start_node_id, end_node_id, start_fiber_no, status, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, 'planned', ?, ?)"#,
        )
        .bind(req.name.trim())
        .bind(req.ring_id)
        .bind(req.start_node_id)
        .bind(req.end_node_id)
        .bind(req.start_fiber_no)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateLogicalPathRequest) -> Result<LogicalPath> {
        if req.name.trim().is_empty() {
            return Err(TopologyError::validation("logical path name is required").into());
        }
        if req.start_node_id == req.end_node_id {
            return Err(TopologyError::validation("a logical path needs two different end nodes").into());
        }
        if let Some(fiber) = req.start_fiber_no {
            if fiber < 1 {
                return Err(TopologyError::validation(format!("start_fiber_no must be at least 1 (got {})", fiber)).into());
            }
        }

        let mut tx = pool.begin().await?;
        NodeRepo::require(&mut tx, req.start_node_id).await?;
        NodeRepo::require(&mut tx, req.end_node_id).await?;
        if let Some(ring_id) = req.ring_id {
            RingRepo::require(&mut tx, ring_id).await?;
        }
        let id = Self::insert(&mut tx, req).await?;
        let path = Self::get(&mut tx, id)
            .await?
            .context("Logical path not found after creation")?;
        tx.commit().await?;

        tracing::info!("Created logical path {} (id={})", path.name, id);
        Ok(path)
    }

    pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM logical_paths WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn elements(pool: &Pool<Sqlite>, id: i64) -> Result<Vec<LogicalPathElement>> {
        let rows = sqlx::query(
            r#"SELECT logical_path_id, step_order, element_type, element_id, fiber_in, fiber_out, distance_km, loss_db
               FROM logical_path_elements WHERE logical_path_id = ? ORDER BY step_order"#,
        )
        .bind(id)
        .fetch_all(pool)
        .await?;
        Ok(rows.iter().map(map_path_element_row).collect())
    }

    pub async fn assignments(pool: &Pool<Sqlite>, id: i64) -> Result<Vec<FiberAssignment>> {
        let rows = sqlx::query(
            r#"SELECT cable_id, fiber_no, logical_path_id, system_id, direction, created_at
               FROM fiber_assignments WHERE logical_path_id = ? ORDER BY direction DESC"#,
        )
        .bind(id)
        .fetch_all(pool)
        .await?;
        Ok(rows.iter().map(map_assignment_row).collect())
    }

    // ========== Topology change propagation ==========

    /// Drop provisioned paths whose synced trace runs over any of `segment_ids`
    /// back to `configured`. Returns the number of paths demoted.
    pub async fn demote_using_segments(conn: &mut SqliteConnection, segment_ids: &[i64]) -> Result<u64> {
        if segment_ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            r#"UPDATE logical_paths SET status = 'configured', updated_at = ?
               WHERE status = 'provisioned' AND id IN (
                   SELECT logical_path_id FROM logical_path_elements
                   WHERE element_type = 'SEGMENT' AND element_id IN ({}))"#,
            placeholders(segment_ids.len())
        );
        let mut query = sqlx::query(&sql).bind(Utc::now());
        for id in segment_ids {
            query = query.bind(id);
        }
        Ok(query.execute(&mut *conn).await?.rows_affected())
    }

    /// Same as `demote_using_segments` for splices, also honouring the
    /// splice's own back-reference
    pub async fn demote_using_splices(conn: &mut SqliteConnection, splice_ids: &[i64]) -> Result<u64> {
        if splice_ids.is_empty() {
            return Ok(0);
        }
        let marks = placeholders(splice_ids.len());
        let sql = format!(
            r#"UPDATE logical_paths SET status = 'configured', updated_at = ?
               WHERE status = 'provisioned' AND (
                   id IN (SELECT logical_path_id FROM logical_path_elements
                          WHERE element_type = 'SPLICE' AND element_id IN ({marks}))
                   OR id IN (SELECT logical_path_id FROM fiber_splices
                             WHERE logical_path_id IS NOT NULL AND id IN ({marks})))"#,
        );
        let mut query = sqlx::query(&sql).bind(Utc::now());
        for id in splice_ids.iter().chain(splice_ids.iter()) {
            query = query.bind(id);
        }
        Ok(query.execute(&mut *conn).await?.rows_affected())
    }

    /// Carry a re-measured splice loss into synced path elements and totals
    pub async fn refresh_splice_loss(conn: &mut SqliteConnection, splice_id: i64, loss_db: f64) -> Result<()> {
        sqlx::query("UPDATE logical_path_elements SET loss_db = ? WHERE element_type = 'SPLICE' AND element_id = ?")
            .bind(loss_db)
            .bind(splice_id)
            .execute(&mut *conn)
            .await?;
        sqlx::query(
            r#"UPDATE logical_paths
               SET total_loss_db = (SELECT COALESCE(SUM(e.loss_db), 0) FROM logical_path_elements e
                                    WHERE e.logical_path_id = logical_paths.id),
                   updated_at = ?
               WHERE id IN (SELECT logical_path_id FROM logical_path_elements
                            WHERE element_type = 'SPLICE' AND element_id = ?)"#,
        )
        .bind(Utc::now())
        .bind(splice_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    // ========== Provisioning lifecycle ==========

    async fn release_trace(conn: &mut SqliteConnection, id: i64) -> Result<()> {
        sqlx::query("UPDATE fiber_splices SET logical_path_id = NULL WHERE logical_path_id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        sqlx::query("DELETE FROM logical_path_elements WHERE logical_path_id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Persist a complete trace as the path's physical backing and mark it
    /// provisioned. Replaces whatever an earlier sync stored.
    pub async fn sync_from_trace(conn: &mut SqliteConnection, path: &LogicalPath, trace: &FiberTrace) -> Result<LogicalPath> {
        if !trace.is_complete() {
            return Err(TopologyError::validation("only a complete trace can be synced to a logical path").into());
        }
        if trace.start_node_id != path.start_node_id || trace.end_node_id != path.end_node_id {
            return Err(TopologyError::validation(format!(
                "trace runs {} -> {} but path {} runs {} -> {}",
                trace.start_node_id, trace.end_node_id, path.id, path.start_node_id, path.end_node_id
            ))
            .into());
        }

        let segment_ids: BTreeSet<i64> = trace.segment_ids().collect();
        let splice_ids: Vec<i64> = trace.splice_ids().collect();
        Self::require_rows(conn, "cable_segments", &segment_ids.iter().copied().collect::<Vec<_>>()).await?;
        Self::require_rows(conn, "fiber_splices", &splice_ids).await?;

        // Each traced segment fiber must be free of other paths' traces and
        // fiber assignments
        let cables = Self::segment_cables(conn, &segment_ids).await?;
        for el in trace.elements.iter().filter(|e| e.element_type == TraceElementType::Segment) {
            let cable_id = cables.get(&el.element_id).copied().unwrap_or_default();
            if let Some(other) = Self::fiber_holder(conn, path.id, cable_id, Some(el.element_id), el.fiber_in).await? {
                return Err(TopologyError::FiberInUse {
                    cable_id,
                    fiber_no: el.fiber_in,
                    logical_path_id: other,
                }
                .into());
            }
        }

        // A splice already carrying another path means the fiber is taken
        if !splice_ids.is_empty() {
            let sql = format!(
                r#"SELECT fs.logical_path_id, seg.original_cable_id, fs.incoming_fiber_no
                   FROM fiber_splices fs
                   JOIN cable_segments seg ON seg.id = fs.incoming_segment_id
                   WHERE fs.logical_path_id IS NOT NULL AND fs.logical_path_id != ? AND fs.id IN ({})
                   LIMIT 1"#,
                placeholders(splice_ids.len())
            );
            let mut query = sqlx::query_as::<_, (i64, i64, i32)>(&sql).bind(path.id);
            for id in &splice_ids {
                query = query.bind(id);
            }
            if let Some((other_path, cable_id, fiber_no)) = query.fetch_optional(&mut *conn).await? {
                return Err(TopologyError::FiberInUse {
                    cable_id,
                    fiber_no,
                    logical_path_id: other_path,
                }
                .into());
            }
        }

        Self::release_trace(conn, path.id).await?;
        for el in &trace.elements {
            sqlx::query(
                r#"INSERT INTO logical_path_elements (logical_path_id, step_order, element_type, element_id, fiber_in, fiber_out, distance_km, loss_db)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(path.id)
            .bind(el.step_order)
            .bind(el.element_type)
            .bind(el.element_id)
            .bind(el.fiber_in)
            .bind(el.fiber_out)
            .bind(el.distance_km)
            .bind(el.loss_db)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                // A concurrent sync claimed the same segment fiber first
                let claimed = e.as_database_error().map(|db| db.is_unique_violation()).unwrap_or(false);
                if claimed {
                    TopologyError::Conflict(format!("fiber claims of logical path {}", path.id)).into()
                } else {
                    anyhow::Error::from(e)
                }
            })?;
        }
        if !splice_ids.is_empty() {
            let sql = format!(
                "UPDATE fiber_splices SET logical_path_id = ? WHERE id IN ({})",
                placeholders(splice_ids.len())
            );
            let mut query = sqlx::query(&sql).bind(path.id);
            for id in &splice_ids {
                query = query.bind(id);
            }
            query.execute(&mut *conn).await?;
        }

        sqlx::query(
            r#"UPDATE logical_paths
               SET start_fiber_no = ?, end_fiber_no = ?, total_distance_km = ?, total_loss_db = ?,
                   status = 'provisioned', updated_at = ?
               WHERE id = ?"#,
        )
        .bind(trace.fiber_no)
        .bind(trace.end_fiber_no())
        .bind(trace.total_distance_km)
        .bind(trace.total_loss_db)
        .bind(Utc::now())
        .bind(path.id)
        .execute(&mut *conn)
        .await?;

        tracing::info!(
            "Synced logical path {} from trace: {} elements, {:.3} km, {:.2} dB",
            path.id,
            trace.elements.len(),
            trace.total_distance_km,
            trace.total_loss_db
        );
        Self::require(conn, path.id).await
    }

    async fn require_rows(conn: &mut SqliteConnection, table: &str, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let distinct: BTreeSet<i64> = ids.iter().copied().collect();
        let sql = format!("SELECT COUNT(*) FROM {} WHERE id IN ({})", table, placeholders(distinct.len()));
        let mut query = sqlx::query_as::<_, (i64,)>(&sql);
        for id in &distinct {
            query = query.bind(id);
        }
        let (found,) = query.fetch_one(&mut *conn).await?;
        if found as usize != distinct.len() {
            return Err(TopologyError::inconsistency(
                0,
                format!("trace references {} rows of {} that no longer exist", distinct.len() - found as usize, table),
            )
            .into());
        }
        Ok(())
    }

    async fn segment_cables(conn: &mut SqliteConnection, segment_ids: &BTreeSet<i64>) -> Result<HashMap<i64, i64>> {
        if segment_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let sql = format!(
            "SELECT id, original_cable_id FROM cable_segments WHERE id IN ({})",
            placeholders(segment_ids.len())
        );
        let mut query = sqlx::query_as::<_, (i64, i64)>(&sql);
        for id in segment_ids {
            query = query.bind(id);
        }
        Ok(query.fetch_all(&mut *conn).await?.into_iter().collect())
    }

    /// Another path holding `fiber_no` through its synced trace or a fiber
    /// assignment. With a segment only that segment's trace claims count,
    /// otherwise any segment of the cable.
    async fn fiber_holder(
        conn: &mut SqliteConnection,
        path_id: i64,
        cable_id: i64,
        segment_id: Option<i64>,
        fiber_no: i32,
    ) -> Result<Option<i64>> {
        let holder: Option<(i64,)> = match segment_id {
            Some(segment_id) => {
                sqlx::query_as(
                    r#"SELECT logical_path_id FROM logical_path_elements
                       WHERE element_type = 'SEGMENT' AND element_id = ? AND fiber_in = ? AND logical_path_id != ?
                       UNION ALL
                       SELECT logical_path_id FROM fiber_assignments
                       WHERE cable_id = ? AND fiber_no = ? AND logical_path_id != ?
                       LIMIT 1"#,
                )
                .bind(segment_id)
                .bind(fiber_no)
                .bind(path_id)
                .bind(cable_id)
                .bind(fiber_no)
                .bind(path_id)
                .fetch_optional(&mut *conn)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"SELECT e.logical_path_id FROM logical_path_elements e
                       JOIN cable_segments s ON s.id = e.element_id
                       WHERE e.element_type = 'SEGMENT' AND s.original_cable_id = ? AND e.fiber_in = ?
                             AND e.logical_path_id != ?
                       UNION ALL
                       SELECT logical_path_id FROM fiber_assignments
                       WHERE cable_id = ? AND fiber_no = ? AND logical_path_id != ?
                       LIMIT 1"#,
                )
                .bind(cable_id)
                .bind(fiber_no)
                .bind(path_id)
                .bind(cable_id)
                .bind(fiber_no)
                .bind(path_id)
                .fetch_optional(&mut *conn)
                .await?
            }
        };
        Ok(holder.map(|(id,)| id))
    }

    /// Segments of the path's synced trace in walk order; empty if the path
    /// was never synced. A trace that is no longer current must be re-synced
    /// before anything is derived from it.
    async fn current_trace(conn: &mut SqliteConnection, path: &LogicalPath) -> Result<Vec<TracedSegment>> {
        let rows: Vec<(i64, Option<i64>, Option<i32>, i32)> = sqlx::query_as(
            r#"SELECT e.element_id, s.original_cable_id, s.fiber_count, e.fiber_in
               FROM logical_path_elements e
               LEFT JOIN cable_segments s ON s.id = e.element_id
               WHERE e.logical_path_id = ? AND e.element_type = 'SEGMENT'
               ORDER BY e.step_order"#,
        )
        .bind(path.id)
        .fetch_all(&mut *conn)
        .await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let stale = rows.iter().any(|(_, cable_id, _, _)| cable_id.is_none());
        if stale || path.status != PathStatus::Provisioned {
            return Err(TopologyError::validation(format!(
                "logical path {} has an out-of-date trace; sync it again first",
                path.id
            ))
            .into());
        }
        Ok(rows
            .into_iter()
            .filter_map(|(segment_id, cable_id, fiber_count, fiber_no)| {
                Some(TracedSegment {
                    segment_id,
                    cable_id: cable_id?,
                    fiber_count: fiber_count?,
                    fiber_no,
                })
            })
            .collect())
    }

    /// Fiber numbers free on every segment the path's synced trace crosses.
    /// Fibers the path holds itself count as free.
    pub async fn available_fibers(pool: &Pool<Sqlite>, id: i64) -> Result<PathFiberAvailability> {
        let mut conn = pool.acquire().await?;
        let path = Self::require(&mut conn, id).await?;
        let traced = Self::current_trace(&mut conn, &path).await?;
        if traced.is_empty() {
            return Err(TopologyError::validation(format!(
                "logical path {} has no synced trace; sync it first",
                id
            ))
            .into());
        }

        let segment_ids: BTreeSet<i64> = traced.iter().map(|t| t.segment_id).collect();
        let cable_ids: BTreeSet<i64> = traced.iter().map(|t| t.cable_id).collect();

        let sql = format!(
            r#"SELECT element_id, fiber_in FROM logical_path_elements
               WHERE element_type = 'SEGMENT' AND logical_path_id != ? AND element_id IN ({})"#,
            placeholders(segment_ids.len())
        );
        let mut query = sqlx::query_as::<_, (i64, i32)>(&sql).bind(id);
        for segment_id in &segment_ids {
            query = query.bind(segment_id);
        }
        let traced_by_others: HashSet<(i64, i32)> = query.fetch_all(&mut *conn).await?.into_iter().collect();

        let sql = format!(
            "SELECT cable_id, fiber_no FROM fiber_assignments WHERE logical_path_id != ? AND cable_id IN ({})",
            placeholders(cable_ids.len())
        );
        let mut query = sqlx::query_as::<_, (i64, i32)>(&sql).bind(id);
        for cable_id in &cable_ids {
            query = query.bind(cable_id);
        }
        let assigned_to_others: HashSet<(i64, i32)> = query.fetch_all(&mut *conn).await?.into_iter().collect();

        let max_fiber = traced.iter().map(|t| t.fiber_count).min().unwrap_or(0);
        let available_fibers = (1..=max_fiber)
            .filter(|&fiber| {
                traced.iter().all(|t| {
                    !traced_by_others.contains(&(t.segment_id, fiber))
                        && !assigned_to_others.contains(&(t.cable_id, fiber))
                })
            })
            .collect();

        Ok(PathFiberAvailability {
            logical_path_id: id,
            cable_ids: cable_ids.into_iter().collect(),
            available_fibers,
        })
    }

    /// Commit a Tx/Rx fiber pair of a cable to a system on this path.
    ///
    /// On a synced path the cable must be one the trace crosses and `fiber_tx`
    /// the fiber the trace carries there. The pair is then followed through
    /// the splices and committed on every cable of the path. An unsynced path
    /// commits the pair on a cable leaving one of its end nodes.
    pub async fn assign_fibers(conn: &mut SqliteConnection, path: &LogicalPath, req: &AssignFibersRequest) -> Result<LogicalPath> {
        if req.fiber_tx == req.fiber_rx {
            return Err(TopologyError::validation("fiber_tx and fiber_rx must be different fibers").into());
        }
        SystemRepo::require(conn, req.system_id).await?;
        if let Some(dest) = req.destination_system_id {
            SystemRepo::require(conn, dest).await?;
        }
        let cable = CableRepo::require(conn, req.cable_id).await?;
        if !cable.status {
            return Err(TopologyError::validation(format!("cable {} is deactivated", cable.route_name)).into());
        }
        for fiber in [req.fiber_tx, req.fiber_rx] {
            if fiber < 1 || fiber > cable.capacity {
                return Err(TopologyError::validation(format!(
                    "fiber {} is out of range for cable {} ({} fibers)",
                    fiber, cable.route_name, cable.capacity
                ))
                .into());
            }
        }

        let traced = Self::current_trace(conn, path).await?;
        let claims = if traced.is_empty() {
            let ends = [WaypointRef::node(path.start_node_id), WaypointRef::node(path.end_node_id)];
            if !ends.contains(&cable.start()) && !ends.contains(&cable.end()) {
                return Err(TopologyError::validation(format!(
                    "cable {} does not start or end at either end node of logical path {}",
                    cable.route_name, path.id
                ))
                .into());
            }
            vec![
                FiberClaim { segment_id: None, cable_id: cable.id, fiber_no: req.fiber_tx, direction: FiberDirection::Tx },
                FiberClaim { segment_id: None, cable_id: cable.id, fiber_no: req.fiber_rx, direction: FiberDirection::Rx },
            ]
        } else {
            Self::trace_claims(conn, path, &traced, &cable, req).await?
        };

        for claim in &claims {
            if let Some(other) = Self::fiber_holder(conn, path.id, claim.cable_id, claim.segment_id, claim.fiber_no).await? {
                return Err(TopologyError::FiberInUse {
                    cable_id: claim.cable_id,
                    fiber_no: claim.fiber_no,
                    logical_path_id: other,
                }
                .into());
            }
        }

        sqlx::query("DELETE FROM fiber_assignments WHERE logical_path_id = ?")
            .bind(path.id)
            .execute(&mut *conn)
            .await?;
        // A cross splice can bring Tx and Rx onto the same cable fiber on
        // different segments; the first claim wins
        let mut committed: BTreeMap<(i64, i32), FiberDirection> = BTreeMap::new();
        for claim in &claims {
            committed.entry((claim.cable_id, claim.fiber_no)).or_insert(claim.direction);
        }
        let now = Utc::now();
        for ((cable_id, fiber), direction) in &committed {
            sqlx::query(
                r#"INSERT INTO fiber_assignments (cable_id, fiber_no, logical_path_id, system_id, direction, created_at)
                   VALUES (?, ?, ?, ?, ?, ?)"#,
            )
            .bind(cable_id)
            .bind(fiber)
            .bind(path.id)
            .bind(req.system_id)
            .bind(direction)
            .bind(now)
            .execute(&mut *conn)
            .await?;
        }

        let status = if traced.is_empty() {
            PathStatus::Configured
        } else {
            PathStatus::Provisioned
        };
        sqlx::query(
            r#"UPDATE logical_paths
               SET source_system_id = ?, destination_system_id = ?, source_port = ?, destination_port = ?,
                   start_fiber_no = COALESCE(start_fiber_no, ?), status = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(req.system_id)
        .bind(req.destination_system_id)
        .bind(&req.source_port)
        .bind(&req.destination_port)
        .bind(req.fiber_tx)
        .bind(status)
        .bind(now)
        .bind(path.id)
        .execute(&mut *conn)
        .await?;

        tracing::info!(
            "Assigned system {} to fibers {}/{} of cable {} on path {} ({} fibers committed, {})",
            req.system_id,
            req.fiber_tx,
            req.fiber_rx,
            cable.route_name,
            path.id,
            committed.len(),
            status.as_str()
        );
        Self::require(conn, path.id).await
    }

    /// Tx and Rx claims on every segment of a synced trace, anchored at the
    /// first segment of `cable`
    async fn trace_claims(
        conn: &mut SqliteConnection,
        path: &LogicalPath,
        traced: &[TracedSegment],
        cable: &OfcCable,
        req: &AssignFibersRequest,
    ) -> Result<Vec<FiberClaim>> {
        let Some(anchor) = traced.iter().position(|t| t.cable_id == cable.id) else {
            return Err(TopologyError::validation(format!(
                "cable {} is not on the synced trace of logical path {}",
                cable.route_name, path.id
            ))
            .into());
        };
        if traced[anchor].fiber_no != req.fiber_tx {
            return Err(TopologyError::validation(format!(
                "logical path {} carries fiber {} on cable {}, not fiber_tx {}",
                path.id, traced[anchor].fiber_no, cable.route_name, req.fiber_tx
            ))
            .into());
        }

        let graph = TopologyGraph::build(TraceRepo::snapshot(conn).await?)?;
        let segment_ids: Vec<i64> = traced.iter().map(|t| t.segment_id).collect();
        let rx_fibers = tracer::follow_fiber(&graph, &segment_ids, anchor, req.fiber_rx)?;

        let mut claims = Vec::with_capacity(traced.len() * 2);
        for (t, rx) in traced.iter().zip(rx_fibers) {
            claims.push(FiberClaim { segment_id: Some(t.segment_id), cable_id: t.cable_id, fiber_no: t.fiber_no, direction: FiberDirection::Tx });
            claims.push(FiberClaim { segment_id: Some(t.segment_id), cable_id: t.cable_id, fiber_no: rx, direction: FiberDirection::Rx });
        }
        Ok(claims)
    }

    /// Release everything a path holds: fiber assignments, splice
    /// back-references, synced trace and system/port linkage
    pub async fn deprovision(conn: &mut SqliteConnection, path: &LogicalPath) -> Result<LogicalPath> {
        match path.status {
            PathStatus::Planned => {
                return Err(TopologyError::validation(format!(
                    "logical path {} is only planned; there is nothing to deprovision",
                    path.id
                ))
                .into());
            }
            PathStatus::Deprovisioned => {
                return Err(TopologyError::validation(format!(
                    "logical path {} is already deprovisioned",
                    path.id
                ))
                .into());
            }
            PathStatus::Configured | PathStatus::Provisioned => {}
        }
        let released = sqlx::query("DELETE FROM fiber_assignments WHERE logical_path_id = ?")
            .bind(path.id)
            .execute(&mut *conn)
            .await?
            .rows_affected();
        Self::release_trace(conn, path.id).await?;
        sqlx::query(
            r#"UPDATE logical_paths
               SET source_system_id = NULL, destination_system_id = NULL,
                   source_port = NULL, destination_port = NULL,
                   total_distance_km = NULL, total_loss_db = NULL,
                   status = 'deprovisioned', updated_at = ?
               WHERE id = ?"#,
        )
        .bind(Utc::now())
        .bind(path.id)
        .execute(&mut *conn)
        .await?;

        tracing::info!("Deprovisioned logical path {} ({} fibers released)", path.id, released);
        Self::require(conn, path.id).await
    }

    /// Swap the path's end nodes and end fibers
    pub async fn swap_ends(conn: &mut SqliteConnection, id: i64) -> Result<()> {
        sqlx::query(
            r#"UPDATE logical_paths
               SET start_node_id = end_node_id, end_node_id = start_node_id,
                   start_fiber_no = end_fiber_no, end_fiber_no = start_fiber_no,
                   updated_at = ?
               WHERE id = ?"#,
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}
