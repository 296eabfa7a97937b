use std::collections::{HashMap, HashSet};

use anyhow::Result;
use chrono::Utc;
use sqlx::{Pool, Sqlite, SqliteConnection};

use super::cables::CableRepo;
use super::junction_closures::JunctionClosureRepo;
use super::logical_paths::LogicalPathRepo;
use super::nodes::NodeRepo;
use super::row_helpers::placeholders;
use super::segments::SegmentRepo;
use super::splices::SpliceRepo;
use crate::models::*;
use crate::topology::segmentation::SegmentSpan;
use crate::topology::{approx_eq, sheets, TopologyError};

fn same_segment(old: &CableSegment, row: &CableSegmentSheetRow) -> bool {
    old.segment_order == row.segment_order
        && old.start_node_id == row.start_node_id
        && old.start_node_type == row.start_node_type
        && old.end_node_id == row.end_node_id
        && old.end_node_type == row.end_node_type
        && approx_eq(old.distance_km, row.distance_km)
        && old.fiber_count == row.fiber_count
}

fn same_splice(old: &FiberSplice, row: &FiberSpliceSheetRow) -> bool {
    old.jc_id == row.jc_id
        && old.incoming_segment_id == row.incoming_segment_id
        && old.incoming_fiber_no == row.incoming_fiber_no
        && old.outgoing_segment_id == row.outgoing_segment_id
        && old.outgoing_fiber_no == row.outgoing_fiber_no
        && old.splice_type == row.splice_type
}

/// Export and import of a route's closures, segments and splices
pub struct TopologySheetRepo;

impl TopologySheetRepo {
    pub async fn export(pool: &Pool<Sqlite>, route_id: i64) -> Result<TopologySheets> {
        let mut tx = pool.begin().await?;
        let route = CableRepo::require(&mut tx, route_id).await?;
        let closures = JunctionClosureRepo::list_for_route(&mut tx, route.id).await?;
        let segments = SegmentRepo::list_for_route(&mut tx, route.id).await?;

        let mut splices = Vec::new();
        for jc in &closures {
            splices.extend(SpliceRepo::list_at_jc(&mut tx, jc.id).await?);
        }
        splices.sort_by_key(|s| s.id);
        tx.commit().await?;

        Ok(TopologySheets {
            junction_closures: closures
                .into_iter()
                .map(|jc| JunctionClosureSheetRow {
                    id: jc.id,
                    name: jc.name,
                    node_id: jc.node_id,
                    position_km: jc.position_km,
                    latitude: jc.latitude,
                    longitude: jc.longitude,
                })
                .collect(),
            cable_segments: segments
                .into_iter()
                .map(|s| CableSegmentSheetRow {
                    id: s.id,
                    segment_order: s.segment_order,
                    start_node_id: s.start_node_id,
                    start_node_type: s.start_node_type,
                    end_node_id: s.end_node_id,
                    end_node_type: s.end_node_type,
                    distance_km: s.distance_km,
                    fiber_count: s.fiber_count,
                })
                .collect(),
            fiber_splices: splices
                .into_iter()
                .map(|s| FiberSpliceSheetRow {
                    id: s.id,
                    jc_id: s.jc_id,
                    incoming_segment_id: s.incoming_segment_id,
                    incoming_fiber_no: s.incoming_fiber_no,
                    outgoing_segment_id: s.outgoing_segment_id,
                    outgoing_fiber_no: s.outgoing_fiber_no,
                    splice_type: s.splice_type,
                    loss_db: s.loss_db,
                })
                .collect(),
        })
    }

    /// Ids in the document that already belong to another route
    async fn check_ownership(conn: &mut SqliteConnection, route_id: i64, doc: &TopologySheets) -> Result<()> {
        for row in &doc.junction_closures {
            if let Some(existing) = JunctionClosureRepo::get(conn, row.id).await? {
                if existing.ofc_cable_id != route_id {
                    return Err(TopologyError::validation(format!(
                        "Junction Closures: id {} belongs to route {}",
                        row.id, existing.ofc_cable_id
                    ))
                    .into());
                }
            }
            if let Some(node_id) = row.node_id {
                NodeRepo::require(conn, node_id).await?;
            }
        }
        for row in &doc.cable_segments {
            if let Some(existing) = SegmentRepo::get(conn, row.id).await? {
                if existing.original_cable_id != route_id {
                    return Err(TopologyError::validation(format!(
                        "Cable Segments: id {} belongs to route {}",
                        row.id, existing.original_cable_id
                    ))
                    .into());
                }
            }
        }
        let sheet_jcs: HashSet<i64> = doc.junction_closures.iter().map(|j| j.id).collect();
        for row in &doc.fiber_splices {
            if let Some(existing) = SpliceRepo::get(conn, row.id).await? {
                if !sheet_jcs.contains(&existing.jc_id) {
                    return Err(TopologyError::validation(format!(
                        "Fiber Splices: id {} is stored at closure {} outside this route",
                        row.id, existing.jc_id
                    ))
                    .into());
                }
            }
        }
        Ok(())
    }

    /// A closure dropped from the document must not anchor another route
    async fn check_removable_closure(conn: &mut SqliteConnection, route_id: i64, jc_id: i64) -> Result<()> {
        let anchored: Option<(i64,)> = sqlx::query_as(
            r#"SELECT id FROM ofc_cables
               WHERE id != ? AND ((sn_type = 'jc' AND sn_id = ?) OR (en_type = 'jc' AND en_id = ?))
               LIMIT 1"#,
        )
        .bind(route_id)
        .bind(jc_id)
        .bind(jc_id)
        .fetch_optional(&mut *conn)
        .await?;
        if let Some((cable_id,)) = anchored {
            return Err(TopologyError::validation(format!(
                "Junction Closures: closure {} is missing but cable {} terminates at it",
                jc_id, cable_id
            ))
            .into());
        }
        Ok(())
    }

    /// Replace the route's closures, segments and splices with the document.
    /// Rows are matched by id; anything absent from the document is deleted.
    /// Caller holds the route lock.
    pub async fn import(pool: &Pool<Sqlite>, route_id: i64, doc: &TopologySheets) -> Result<ImportTopologyResult> {
        let mut tx = pool.begin().await?;
        let route = CableRepo::require(&mut tx, route_id).await?;
        Self::check_ownership(&mut tx, route.id, doc).await?;

        let mut foreign = Vec::new();
        for jc in sheets::sheet_closures(doc) {
            foreign.extend(
                SegmentRepo::touching(&mut tx, jc)
                    .await?
                    .into_iter()
                    .filter(|s| s.original_cable_id != route.id),
            );
        }
        sheets::validate_sheets(&route, doc, &foreign)?;

        let old_closures = JunctionClosureRepo::list_for_route(&mut tx, route.id).await?;
        let old_segments = SegmentRepo::list_for_route(&mut tx, route.id).await?;
        let mut old_splices = Vec::new();
        for jc in &old_closures {
            old_splices.extend(SpliceRepo::list_at_jc(&mut tx, jc.id).await?);
        }

        let sheet_jcs: HashSet<i64> = doc.junction_closures.iter().map(|j| j.id).collect();
        for jc in old_closures.iter().filter(|jc| !sheet_jcs.contains(&jc.id)) {
            Self::check_removable_closure(&mut tx, route.id, jc.id).await?;
        }

        // Paths over anything that changed need a re-sync
        let segment_rows: HashMap<i64, &CableSegmentSheetRow> = doc.cable_segments.iter().map(|r| (r.id, r)).collect();
        let splice_rows: HashMap<i64, &FiberSpliceSheetRow> = doc.fiber_splices.iter().map(|r| (r.id, r)).collect();
        let changed_segments: Vec<i64> = old_segments
            .iter()
            .filter(|s| segment_rows.get(&s.id).map_or(true, |row| !same_segment(s, row)))
            .map(|s| s.id)
            .collect();
        let changed_splices: Vec<i64> = old_splices
            .iter()
            .filter(|s| splice_rows.get(&s.id).map_or(true, |row| !same_splice(s, row)))
            .map(|s| s.id)
            .collect();
        let mut demoted = LogicalPathRepo::demote_using_segments(&mut tx, &changed_segments).await?;
        demoted += LogicalPathRepo::demote_using_splices(&mut tx, &changed_splices).await?;

        // Splices at the route's closures are rebuilt from the document
        let claims: HashMap<i64, i64> = old_splices
            .iter()
            .filter(|s| !changed_splices.contains(&s.id))
            .filter_map(|s| s.logical_path_id.map(|p| (s.id, p)))
            .collect();
        for jc in &old_closures {
            SpliceRepo::delete_at_jc(&mut tx, jc.id).await?;
        }

        let keep_segments: Vec<i64> = doc.cable_segments.iter().map(|r| r.id).collect();
        let mut sql = String::from("DELETE FROM cable_segments WHERE original_cable_id = ?");
        if !keep_segments.is_empty() {
            sql.push_str(&format!(" AND id NOT IN ({})", placeholders(keep_segments.len())));
        }
        let mut query = sqlx::query(&sql).bind(route.id);
        for id in &keep_segments {
            query = query.bind(id);
        }
        query.execute(&mut *tx).await?;

        for jc in old_closures.iter().filter(|jc| !sheet_jcs.contains(&jc.id)) {
            sqlx::query("DELETE FROM junction_closures WHERE id = ?")
                .bind(jc.id)
                .execute(&mut *tx)
                .await?;
        }

        // Park unique columns out of the way before rewriting them
        sqlx::query("UPDATE cable_segments SET segment_order = -id WHERE original_cable_id = ?")
            .bind(route.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE junction_closures SET position_km = -id WHERE ofc_cable_id = ?")
            .bind(route.id)
            .execute(&mut *tx)
            .await?;

        let now = Utc::now();
        let old_jc_ids: HashSet<i64> = old_closures.iter().map(|jc| jc.id).collect();
        for row in &doc.junction_closures {
            if old_jc_ids.contains(&row.id) {
                sqlx::query(
                    r#"UPDATE junction_closures
                       SET node_id = ?, name = ?, position_km = ?, latitude = ?, longitude = ?, updated_at = ?
                       WHERE id = ?"#,
                )
                .bind(row.node_id)
                .bind(row.name.trim())
                .bind(row.position_km)
                .bind(row.latitude)
                .bind(row.longitude)
                .bind(now)
                .bind(row.id)
                .execute(&mut *tx)
                .await?;
            } else {
                sqlx::query(
                    r#"INSERT INTO junction_closures (id, ofc_cable_id, node_id, name, position_km, latitude, longitude, created_at, updated_at)
                       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
                )
                .bind(row.id)
                .bind(route.id)
                .bind(row.node_id)
                .bind(row.name.trim())
                .bind(row.position_km)
                .bind(row.latitude)
                .bind(row.longitude)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
        }

        let old_segment_ids: HashSet<i64> = old_segments.iter().map(|s| s.id).collect();
        for row in &doc.cable_segments {
            if old_segment_ids.contains(&row.id) {
                sqlx::query(
                    r#"UPDATE cable_segments
                       SET segment_order = ?, start_node_id = ?, start_node_type = ?, end_node_id = ?, end_node_type = ?,
                           distance_km = ?, fiber_count = ?, updated_at = ?
                       WHERE id = ?"#,
                )
                .bind(row.segment_order)
                .bind(row.start_node_id)
                .bind(row.start_node_type)
                .bind(row.end_node_id)
                .bind(row.end_node_type)
                .bind(row.distance_km)
                .bind(row.fiber_count)
                .bind(now)
                .bind(row.id)
                .execute(&mut *tx)
                .await?;
            } else {
                let span = SegmentSpan {
                    start: WaypointRef { kind: row.start_node_type, id: row.start_node_id },
                    end: WaypointRef { kind: row.end_node_type, id: row.end_node_id },
                    distance_km: row.distance_km,
                };
                SegmentRepo::insert_with_id(&mut tx, Some(row.id), route.id, row.segment_order, &span, row.fiber_count)
                    .await?;
            }
        }

        for row in &doc.fiber_splices {
            SpliceRepo::insert(
                &mut tx,
                Some(row.id),
                row.jc_id,
                (row.incoming_segment_id, row.incoming_fiber_no),
                (row.outgoing_segment_id, row.outgoing_fiber_no),
                row.splice_type,
                row.loss_db,
                claims.get(&row.id).copied(),
            )
            .await?;
            if let Some(old) = old_splices.iter().find(|s| s.id == row.id) {
                if !changed_splices.contains(&row.id) && !approx_eq(old.loss_db, row.loss_db) {
                    LogicalPathRepo::refresh_splice_loss(&mut tx, row.id, row.loss_db).await?;
                }
            }
        }

        SegmentRepo::list_conserved(&mut tx, &route).await?;
        tx.commit().await?;

        let result = ImportTopologyResult {
            junction_closures: doc.junction_closures.len() as u32,
            cable_segments: doc.cable_segments.len() as u32,
            fiber_splices: doc.fiber_splices.len() as u32,
        };
        tracing::info!(
            "Imported topology for route {}: {} closures, {} segments, {} splices ({} paths need re-sync)",
            route.id, result.junction_closures, result.cable_segments, result.fiber_splices, demoted
        );
        Ok(result)
    }
}
