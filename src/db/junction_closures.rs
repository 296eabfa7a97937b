use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite, SqliteConnection};

use super::cables::CableRepo;
use super::logical_paths::LogicalPathRepo;
use super::nodes::NodeRepo;
use super::row_helpers::map_jc_row;
use super::segments::SegmentRepo;
use super::splices::SpliceRepo;
use crate::models::*;
use crate::topology::segmentation::{self, SegmentSpan};
use crate::topology::TopologyError;

const SELECT_JC: &str = r#"
    SELECT id, ofc_cable_id, node_id, name, position_km, latitude, longitude, created_at, updated_at
    FROM junction_closures
"#;

/// Junction closure database operations
pub struct JunctionClosureRepo;

impl JunctionClosureRepo {
    pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<Option<JunctionClosure>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_JC))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.as_ref().map(map_jc_row))
    }

    pub async fn require(conn: &mut SqliteConnection, id: i64) -> Result<JunctionClosure> {
        Self::get(conn, id)
            .await?
            .ok_or_else(|| super::NotFoundError::new("Junction closure", &id.to_string()).into())
    }

    pub async fn list_for_route(conn: &mut SqliteConnection, route_id: i64) -> Result<Vec<JunctionClosure>> {
        let rows = sqlx::query(&format!("{} WHERE ofc_cable_id = ? ORDER BY position_km", SELECT_JC))
            .bind(route_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(map_jc_row).collect())
    }

    pub async fn list_all(conn: &mut SqliteConnection) -> Result<Vec<JunctionClosure>> {
        let rows = sqlx::query(&format!("{} ORDER BY id", SELECT_JC))
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(map_jc_row).collect())
    }

    /// Insert a closure at `position_km` on a route, splitting the segment
    /// that covers that point. Caller holds the route lock.
    pub async fn add(pool: &Pool<Sqlite>, route_id: i64, req: &AddJunctionClosureRequest) -> Result<JunctionClosure> {
        if req.name.trim().is_empty() {
            return Err(TopologyError::validation("junction closure name is required").into());
        }

        let mut tx = pool.begin().await?;
        let route = CableRepo::require(&mut tx, route_id).await?;
        if let Some(node_id) = req.node_id {
            NodeRepo::require(&mut tx, node_id).await?;
        }

        let segments = SegmentRepo::list_conserved(&mut tx, &route).await?;
        let spans: Vec<SegmentSpan> = segments.iter().map(SegmentSpan::from).collect();
        let point = segmentation::locate_split(route.id, &spans, route.current_rkm, req.position_km)?;
        let target = segments
            .get(point.index)
            .context("split point outside segment list")?;

        let now = Utc::now();
        let result = sqlx::query(
            r#"INSERT INTO junction_closures (ofc_cable_id, node_id, name, position_km, latitude, longitude, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(route.id)
        .bind(req.node_id)
        .bind(req.name.trim())
        .bind(req.position_km)
        .bind(req.latitude)
        .bind(req.longitude)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let jc_id = result.last_insert_rowid();
        let jc = WaypointRef::jc(jc_id);

        // Park the old segment at order 0, open a gap after it, then fill the gap
        let k = target.segment_order;
        SegmentRepo::set_order(&mut tx, target.id, 0).await?;
        SegmentRepo::shift_orders(&mut tx, route.id, k, 1).await?;

        let planned = segmentation::split_spans(&spans, point, jc);
        segmentation::check_distance(route.id, &planned, route.current_rkm)?;
        let (first, second) = (planned[point.index], planned[point.index + 1]);
        let first_id = SegmentRepo::insert(&mut tx, route.id, k, &first, target.fiber_count).await?;
        let second_id = SegmentRepo::insert(&mut tx, route.id, k + 1, &second, target.fiber_count).await?;

        // Splices at the neighbouring closures now continue into the new halves
        if target.start().is_jc() {
            SpliceRepo::repoint(&mut tx, target.start_node_id, target.id, first_id).await?;
        }
        if target.end().is_jc() {
            SpliceRepo::repoint(&mut tx, target.end_node_id, target.id, second_id).await?;
        }
        let demoted = LogicalPathRepo::demote_using_segments(&mut tx, &[target.id]).await?;
        SegmentRepo::delete(&mut tx, target.id).await?;

        // The result must still be a conserved chain
        SegmentRepo::list_conserved(&mut tx, &route).await?;

        let closure = Self::get(&mut tx, jc_id)
            .await?
            .context("Junction closure not found after creation")?;
        tx.commit().await?;

        tracing::info!(
            "Added JC {} at {} km on route {} (split segment {}, {} paths need re-sync)",
            jc_id, req.position_km, route.id, target.id, demoted
        );
        Ok(closure)
    }

    /// Remove an inline closure, merging its two segments. Splices at the
    /// closure are deleted. Caller holds the route and closure locks.
    pub async fn remove(pool: &Pool<Sqlite>, jc_id: i64) -> Result<CableSegment> {
        let mut tx = pool.begin().await?;
        let closure = Self::require(&mut tx, jc_id).await?;
        let route = CableRepo::require(&mut tx, closure.ofc_cable_id).await?;
        let jc = closure.waypoint();

        let incident = SegmentRepo::touching(&mut tx, jc).await?;
        let segments = SegmentRepo::list_conserved(&mut tx, &route).await?;
        let spans: Vec<SegmentSpan> = segments.iter().map(SegmentSpan::from).collect();
        let index = segmentation::locate_merge(&spans, jc, incident.len())?;
        let (a, b) = match (segments.get(index), segments.get(index + 1)) {
            (Some(a), Some(b)) => (a.clone(), b.clone()),
            _ => return Err(TopologyError::inconsistency(route.id, "merge pair missing").into()),
        };

        let splice_ids = SpliceRepo::ids_at_jc(&mut tx, jc_id).await?;
        let mut demoted = LogicalPathRepo::demote_using_splices(&mut tx, &splice_ids).await?;
        demoted += LogicalPathRepo::demote_using_segments(&mut tx, &[a.id, b.id]).await?;
        let removed_splices = SpliceRepo::delete_at_jc(&mut tx, jc_id).await?;

        let k = a.segment_order;
        SegmentRepo::set_order(&mut tx, a.id, 0).await?;
        SegmentRepo::set_order(&mut tx, b.id, -1).await?;
        let merged = segmentation::merge_spans(&spans, index)[index];
        let merged_id = SegmentRepo::insert(&mut tx, route.id, k, &merged, a.fiber_count).await?;

        if a.start().is_jc() {
            SpliceRepo::repoint(&mut tx, a.start_node_id, a.id, merged_id).await?;
        }
        if b.end().is_jc() {
            SpliceRepo::repoint(&mut tx, b.end_node_id, b.id, merged_id).await?;
        }
        SegmentRepo::delete(&mut tx, a.id).await?;
        SegmentRepo::delete(&mut tx, b.id).await?;
        SegmentRepo::shift_orders(&mut tx, route.id, k + 1, -1).await?;

        sqlx::query("DELETE FROM junction_closures WHERE id = ?")
            .bind(jc_id)
            .execute(&mut *tx)
            .await?;

        SegmentRepo::list_conserved(&mut tx, &route).await?;
        let merged_segment = SegmentRepo::require(&mut tx, merged_id).await?;
        tx.commit().await?;

        tracing::info!(
            "Removed JC {} from route {} (merged segment {}, {} splices dropped, {} paths need re-sync)",
            jc_id, route.id, merged_id, removed_splices, demoted
        );
        Ok(merged_segment)
    }
}
