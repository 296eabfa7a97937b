use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite, SqliteConnection};

use super::junction_closures::JunctionClosureRepo;
use super::row_helpers::map_cable_row;
use super::segments::SegmentRepo;
use crate::models::*;
use crate::topology::segmentation::SegmentSpan;
use crate::topology::TopologyError;

const SELECT_CABLE: &str = r#"
    SELECT id, route_name, capacity, current_rkm, sn_id, sn_type, en_id, en_type,
           status, created_at, updated_at
    FROM ofc_cables
"#;

/// Cable route database operations
pub struct CableRepo;

impl CableRepo {
    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<OfcCable>> {
        let rows = sqlx::query(&format!("{} ORDER BY route_name", SELECT_CABLE))
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(map_cable_row).collect())
    }

    pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<Option<OfcCable>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_CABLE))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.as_ref().map(map_cable_row))
    }

    pub async fn require(conn: &mut SqliteConnection, id: i64) -> Result<OfcCable> {
        Self::get(conn, id)
            .await?
            .ok_or_else(|| super::NotFoundError::new("Cable", &id.to_string()).into())
    }

    pub async fn list_all(conn: &mut SqliteConnection) -> Result<Vec<OfcCable>> {
        let rows = sqlx::query(&format!("{} ORDER BY id", SELECT_CABLE))
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(map_cable_row).collect())
    }

    async fn require_terminal(conn: &mut SqliteConnection, waypoint: WaypointRef) -> Result<()> {
        let (table, resource) = match waypoint.kind {
            WaypointKind::Node => ("nodes", "Node"),
            WaypointKind::Jc => ("junction_closures", "Junction closure"),
        };
        let found: Option<(i64,)> = sqlx::query_as(&format!("SELECT id FROM {} WHERE id = ?", table))
            .bind(waypoint.id)
            .fetch_optional(&mut *conn)
            .await?;
        if found.is_none() {
            return Err(super::NotFoundError::new(resource, &waypoint.id.to_string()).into());
        }
        Ok(())
    }

    /// Commission a cable: the route row plus its single initial segment
    pub async fn create(pool: &Pool<Sqlite>, req: &CreateCableRequest) -> Result<OfcCable> {
        if req.route_name.trim().is_empty() {
            return Err(TopologyError::validation("route_name is required").into());
        }
        if req.capacity <= 0 {
            return Err(TopologyError::validation(format!("capacity must be positive (got {})", req.capacity)).into());
        }
        if !req.current_rkm.is_finite() || req.current_rkm <= 0.0 {
            return Err(TopologyError::validation(format!(
                "current_rkm must be a positive distance (got {})",
                req.current_rkm
            ))
            .into());
        }
        let start = WaypointRef { kind: req.sn_type, id: req.sn_id };
        let end = WaypointRef { kind: req.en_type, id: req.en_id };
        if start == end {
            return Err(TopologyError::validation("a cable cannot start and end at the same point").into());
        }

        let mut tx = pool.begin().await?;
        Self::require_terminal(&mut tx, start).await?;
        Self::require_terminal(&mut tx, end).await?;

        let taken: Option<(i64,)> = sqlx::query_as("SELECT id FROM ofc_cables WHERE route_name = ?")
            .bind(req.route_name.trim())
            .fetch_optional(&mut *tx)
            .await?;
        if taken.is_some() {
            return Err(TopologyError::validation(format!("route {} already exists", req.route_name.trim())).into());
        }

        let now = Utc::now();
        let result = sqlx::query(
            r#"INSERT INTO ofc_cables (route_name, capacity, current_rkm, sn_id, sn_type, en_id, en_type, status, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)"#,
        )
        .bind(req.route_name.trim())
        .bind(req.capacity)
        .bind(req.current_rkm)
        .bind(start.id)
        .bind(start.kind)
        .bind(end.id)
        .bind(end.kind)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        let span = SegmentSpan { start, end, distance_km: req.current_rkm };
        SegmentRepo::insert(&mut tx, id, 1, &span, req.capacity).await?;

        let cable = Self::get(&mut tx, id)
            .await?
            .context("Cable not found after creation")?;
        tx.commit().await?;

        tracing::info!("Created cable route {} (id={})", cable.route_name, id);
        Ok(cable)
    }

    /// Soft-deactivate a cable route
    pub async fn deactivate(pool: &Pool<Sqlite>, id: i64) -> Result<OfcCable> {
        let result = sqlx::query("UPDATE ofc_cables SET status = 0, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Cable", &id.to_string()).into());
        }
        let mut conn = pool.acquire().await?;
        Self::require(&mut conn, id).await
    }

    pub async fn details(pool: &Pool<Sqlite>, id: i64) -> Result<RouteDetails> {
        let mut conn = pool.acquire().await?;
        let route = Self::require(&mut conn, id).await?;
        let junction_closures = JunctionClosureRepo::list_for_route(&mut conn, id).await?;
        let segments = SegmentRepo::list_checked(&mut conn, &route).await?;
        let evolution_status = EvolutionStatus::classify(junction_closures.len(), segments.len());
        Ok(RouteDetails {
            route,
            junction_closures,
            segments,
            evolution_status,
        })
    }

    /// Fiber numbers of the cable neither assigned to a system nor carried
    /// by a synced logical path on any of its segments
    pub async fn available_fibers(pool: &Pool<Sqlite>, id: i64) -> Result<CableFiberAvailability> {
        let mut conn = pool.acquire().await?;
        let cable = Self::require(&mut conn, id).await?;
        let used: Vec<(i32,)> = sqlx::query_as(
            r#"SELECT fiber_no FROM fiber_assignments WHERE cable_id = ?
               UNION
               SELECT e.fiber_in FROM logical_path_elements e
               JOIN cable_segments s ON s.id = e.element_id
               WHERE e.element_type = 'SEGMENT' AND s.original_cable_id = ?"#,
        )
        .bind(id)
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;
        let used: std::collections::HashSet<i32> = used.into_iter().map(|(f,)| f).collect();
        Ok(CableFiberAvailability {
            cable_id: id,
            capacity: cable.capacity,
            available_fibers: (1..=cable.capacity).filter(|f| !used.contains(f)).collect(),
        })
    }
}
