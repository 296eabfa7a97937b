use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite, SqliteConnection};

use super::junction_closures::JunctionClosureRepo;
use super::logical_paths::LogicalPathRepo;
use super::row_helpers::{map_segment_row, map_splice_row};
use super::segments::SegmentRepo;
use crate::models::*;
use crate::topology::graph::segment_label;
use crate::topology::splice_matrix;

const SELECT_SPLICE: &str = r#"
    SELECT id, jc_id, incoming_segment_id, incoming_fiber_no, outgoing_segment_id, outgoing_fiber_no,
           splice_type, loss_db, logical_path_id, created_at, updated_at
    FROM fiber_splices
"#;

/// Fiber splice database operations
pub struct SpliceRepo;

impl SpliceRepo {
    pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<Option<FiberSplice>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_SPLICE))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.as_ref().map(map_splice_row))
    }

    pub async fn require(conn: &mut SqliteConnection, id: i64) -> Result<FiberSplice> {
        Self::get(conn, id)
            .await?
            .ok_or_else(|| super::NotFoundError::new("Fiber splice", &id.to_string()).into())
    }

    pub async fn list_at_jc(conn: &mut SqliteConnection, jc_id: i64) -> Result<Vec<FiberSplice>> {
        let rows = sqlx::query(&format!("{} WHERE jc_id = ? ORDER BY id", SELECT_SPLICE))
            .bind(jc_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(map_splice_row).collect())
    }

    pub async fn list_all(conn: &mut SqliteConnection) -> Result<Vec<FiberSplice>> {
        let rows = sqlx::query(&format!("{} ORDER BY id", SELECT_SPLICE))
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(map_splice_row).collect())
    }

    pub async fn ids_at_jc(conn: &mut SqliteConnection, jc_id: i64) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT id FROM fiber_splices WHERE jc_id = ?")
            .bind(jc_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn delete_at_jc(conn: &mut SqliteConnection, jc_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM fiber_splices WHERE jc_id = ?")
            .bind(jc_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Move splices at `jc_id` from segment `from` to segment `to`
    pub async fn repoint(conn: &mut SqliteConnection, jc_id: i64, from: i64, to: i64) -> Result<()> {
        let now = Utc::now();
        sqlx::query("UPDATE fiber_splices SET incoming_segment_id = ?, updated_at = ? WHERE jc_id = ? AND incoming_segment_id = ?")
            .bind(to)
            .bind(now)
            .bind(jc_id)
            .bind(from)
            .execute(&mut *conn)
            .await?;
        sqlx::query("UPDATE fiber_splices SET outgoing_segment_id = ?, updated_at = ? WHERE jc_id = ? AND outgoing_segment_id = ?")
            .bind(to)
            .bind(now)
            .bind(jc_id)
            .bind(from)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Insert a splice row; `id` None lets SQLite assign one
    pub async fn insert(
        conn: &mut SqliteConnection,
        id: Option<i64>,
        jc_id: i64,
        incoming: (i64, i32),
        outgoing: (i64, i32),
        splice_type: SpliceType,
        loss_db: f64,
        logical_path_id: Option<i64>,
    ) -> Result<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"INSERT INTO fiber_splices (id, jc_id, incoming_segment_id, incoming_fiber_no,
                   outgoing_segment_id, outgoing_fiber_no, splice_type, loss_db, logical_path_id, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(id)
        .bind(jc_id)
        .bind(incoming.0)
        .bind(incoming.1)
        .bind(outgoing.0)
        .bind(outgoing.1)
        .bind(splice_type)
        .bind(loss_db)
        .bind(logical_path_id)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Record one splice at a closure. Caller holds the closure lock.
    pub async fn create(
        pool: &Pool<Sqlite>,
        jc_id: i64,
        req: &CreateSpliceRequest,
        default_loss_db: f64,
    ) -> Result<FiberSplice> {
        let loss_db = req.loss_db.unwrap_or(default_loss_db);
        splice_matrix::validate_loss(loss_db)?;

        let mut tx = pool.begin().await?;
        JunctionClosureRepo::require(&mut tx, jc_id).await?;
        let incoming = SegmentRepo::require(&mut tx, req.incoming_segment_id).await?;
        let outgoing = SegmentRepo::require(&mut tx, req.outgoing_segment_id).await?;
        let existing = Self::list_at_jc(&mut tx, jc_id).await?;
        splice_matrix::check_new_splice(
            jc_id,
            &incoming,
            req.incoming_fiber_no,
            &outgoing,
            req.outgoing_fiber_no,
            &existing,
        )?;

        let id = Self::insert(
            &mut tx,
            None,
            jc_id,
            (incoming.id, req.incoming_fiber_no),
            (outgoing.id, req.outgoing_fiber_no),
            req.splice_type,
            loss_db,
            None,
        )
        .await?;
        let splice = Self::get(&mut tx, id)
            .await?
            .context("Splice not found after creation")?;
        tx.commit().await?;

        tracing::info!(
            "Spliced segment {} fiber {} -> segment {} fiber {} at JC {} (id={})",
            incoming.id, req.incoming_fiber_no, outgoing.id, req.outgoing_fiber_no, jc_id, id
        );
        Ok(splice)
    }

    /// Delete a splice. A logical path using it drops out of `provisioned`.
    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        let mut tx = pool.begin().await?;
        let splice = Self::require(&mut tx, id).await?;

        let demoted = LogicalPathRepo::demote_using_splices(&mut tx, &[id]).await?;
        if let Some(path_id) = splice.logical_path_id {
            tracing::warn!(
                "Deleting splice {} claimed by logical path {}; the path needs a re-sync",
                id, path_id
            );
        }

        sqlx::query("DELETE FROM fiber_splices WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!("Deleted splice {} at JC {} ({} paths need re-sync)", id, splice.jc_id, demoted);
        Ok(())
    }

    /// Re-measure a splice and refresh the loss stored on paths through it
    pub async fn update_loss(pool: &Pool<Sqlite>, id: i64, loss_db: f64) -> Result<FiberSplice> {
        splice_matrix::validate_loss(loss_db)?;

        let mut tx = pool.begin().await?;
        Self::require(&mut tx, id).await?;
        let now = Utc::now();
        sqlx::query("UPDATE fiber_splices SET loss_db = ?, updated_at = ? WHERE id = ?")
            .bind(loss_db)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        LogicalPathRepo::refresh_splice_loss(&mut tx, id, loss_db).await?;

        let splice = Self::require(&mut tx, id).await?;
        tx.commit().await?;
        tracing::info!("Updated splice {} loss to {} dB", id, loss_db);
        Ok(splice)
    }

    /// Splice fiber n to fiber n between two segments for every fiber free
    /// on both. Caller holds the closure lock.
    pub async fn auto_splice(
        pool: &Pool<Sqlite>,
        jc_id: i64,
        req: &AutoSpliceRequest,
        default_loss_db: f64,
    ) -> Result<AutoSpliceResult> {
        let loss_db = req.loss_db.unwrap_or(default_loss_db);
        splice_matrix::validate_loss(loss_db)?;

        let mut tx = pool.begin().await?;
        JunctionClosureRepo::require(&mut tx, jc_id).await?;
        let segment1 = SegmentRepo::require(&mut tx, req.segment1_id).await?;
        let segment2 = SegmentRepo::require(&mut tx, req.segment2_id).await?;
        let existing = Self::list_at_jc(&mut tx, jc_id).await?;
        let plan = splice_matrix::plan_auto_splice(jc_id, &segment1, &segment2, &existing)?;

        for &fiber in &plan.fibers {
            Self::insert(
                &mut tx,
                None,
                jc_id,
                (segment1.id, fiber),
                (segment2.id, fiber),
                SpliceType::Straight,
                loss_db,
                None,
            )
            .await?;
        }
        tx.commit().await?;

        let result = AutoSpliceResult {
            splices_created: plan.fibers.len() as u32,
            skipped: plan.skipped,
        };
        tracing::info!(
            "Auto-splice at JC {} ({} <-> {}): {} created, {} already spliced",
            jc_id, segment1.id, segment2.id, result.splices_created, result.skipped
        );
        Ok(result)
    }

    /// Splice matrix of a closure
    pub async fn splicing_details(pool: &Pool<Sqlite>, jc_id: i64) -> Result<SplicingDetails> {
        let mut conn = pool.acquire().await?;
        let junction_closure = JunctionClosureRepo::require(&mut conn, jc_id).await?;
        let jc = junction_closure.waypoint();
        let existing_splices = Self::list_at_jc(&mut conn, jc_id).await?;

        let rows = sqlx::query(
            r#"SELECT s.id, s.original_cable_id, s.segment_order,
                      s.start_node_id, s.start_node_type, s.end_node_id, s.end_node_type,
                      s.distance_km, s.fiber_count, s.created_at, s.updated_at,
                      c.route_name
               FROM cable_segments s
               JOIN ofc_cables c ON c.id = s.original_cable_id
               WHERE (s.start_node_type = ? AND s.start_node_id = ?)
                  OR (s.end_node_type = ? AND s.end_node_id = ?)
               ORDER BY s.original_cable_id, s.segment_order"#,
        )
        .bind(jc.kind)
        .bind(jc.id)
        .bind(jc.kind)
        .bind(jc.id)
        .fetch_all(&mut *conn)
        .await?;

        let mut incoming_segments = Vec::new();
        let mut outgoing_segments = Vec::new();
        let mut available_fibers = Vec::new();
        for row in &rows {
            let seg = map_segment_row(row);
            let route_name: String = row.get("route_name");
            available_fibers.push(AvailableFibers {
                segment_id: seg.id,
                fibers: splice_matrix::available_fibers(&seg, &existing_splices),
            });
            let entry = SegmentAtJc {
                segment_id: seg.id,
                segment_name: segment_label(&route_name, seg.segment_order),
                original_cable_id: seg.original_cable_id,
                segment_order: seg.segment_order,
                fiber_count: seg.fiber_count,
                distance_km: seg.distance_km,
                fibers: splice_matrix::fiber_statuses(&seg, &existing_splices),
            };
            if seg.end() == jc {
                incoming_segments.push(entry);
            } else {
                outgoing_segments.push(entry);
            }
        }

        Ok(SplicingDetails {
            junction_closure,
            incoming_segments,
            outgoing_segments,
            existing_splices,
            available_fibers,
        })
    }
}
