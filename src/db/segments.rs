use anyhow::Result;
use chrono::Utc;
use sqlx::SqliteConnection;

use super::row_helpers::map_segment_row;
use crate::models::*;
use crate::topology::segmentation::{self, SegmentSpan};

const SELECT_SEGMENT: &str = r#"
    SELECT id, original_cable_id, segment_order,
           start_node_id, start_node_type, end_node_id, end_node_type,
           distance_km, fiber_count, created_at, updated_at
    FROM cable_segments
"#;

/// Cable segment database operations
pub struct SegmentRepo;

impl SegmentRepo {
    /// Segments of a route ordered by segment_order, without any checks
    pub async fn list_for_route(conn: &mut SqliteConnection, route_id: i64) -> Result<Vec<CableSegment>> {
        let rows = sqlx::query(&format!(
            "{} WHERE original_cable_id = ? ORDER BY segment_order",
            SELECT_SEGMENT
        ))
        .bind(route_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows.iter().map(map_segment_row).collect())
    }

    /// Segments of a route, failing with TopologyInconsistency unless they
    /// form a gapless chain from the route's start to its end
    pub async fn list_checked(conn: &mut SqliteConnection, route: &OfcCable) -> Result<Vec<CableSegment>> {
        let segments = Self::list_for_route(conn, route.id).await?;
        if let Err(e) = segmentation::check_contiguity(route.id, route.start(), route.end(), &segments) {
            tracing::error!("Route {} segments are corrupt: {}", route.id, e);
            return Err(e.into());
        }
        Ok(segments)
    }

    /// Like `list_checked`, also requiring the segments to sum to the route length
    pub async fn list_conserved(conn: &mut SqliteConnection, route: &OfcCable) -> Result<Vec<CableSegment>> {
        let segments = Self::list_checked(conn, route).await?;
        let spans: Vec<SegmentSpan> = segments.iter().map(SegmentSpan::from).collect();
        if let Err(e) = segmentation::check_distance(route.id, &spans, route.current_rkm) {
            tracing::error!("Route {} distance is not conserved: {}", route.id, e);
            return Err(e.into());
        }
        Ok(segments)
    }

    pub async fn list_all(conn: &mut SqliteConnection) -> Result<Vec<CableSegment>> {
        let rows = sqlx::query(&format!("{} ORDER BY id", SELECT_SEGMENT))
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(map_segment_row).collect())
    }

    pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<Option<CableSegment>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_SEGMENT))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.as_ref().map(map_segment_row))
    }

    pub async fn require(conn: &mut SqliteConnection, id: i64) -> Result<CableSegment> {
        Self::get(conn, id)
            .await?
            .ok_or_else(|| super::NotFoundError::new("Cable segment", &id.to_string()).into())
    }

    /// Every segment, on any route, with an endpoint at `waypoint`
    pub async fn touching(conn: &mut SqliteConnection, waypoint: WaypointRef) -> Result<Vec<CableSegment>> {
        let rows = sqlx::query(&format!(
            r#"{} WHERE (start_node_type = ? AND start_node_id = ?)
                  OR (end_node_type = ? AND end_node_id = ?)
               ORDER BY id"#,
            SELECT_SEGMENT
        ))
        .bind(waypoint.kind)
        .bind(waypoint.id)
        .bind(waypoint.kind)
        .bind(waypoint.id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows.iter().map(map_segment_row).collect())
    }

    /// Insert a segment and return its id
    pub async fn insert(
        conn: &mut SqliteConnection,
        route_id: i64,
        segment_order: i32,
        span: &SegmentSpan,
        fiber_count: i32,
    ) -> Result<i64> {
        Self::insert_with_id(conn, None, route_id, segment_order, span, fiber_count).await
    }

    /// Insert a segment, optionally with an explicit id
    pub async fn insert_with_id(
        conn: &mut SqliteConnection,
        id: Option<i64>,
        route_id: i64,
        segment_order: i32,
        span: &SegmentSpan,
        fiber_count: i32,
    ) -> Result<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"INSERT INTO cable_segments (id, original_cable_id, segment_order,
                   start_node_id, start_node_type, end_node_id, end_node_type,
                   distance_km, fiber_count, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(id)
        .bind(route_id)
        .bind(segment_order)
        .bind(span.start.id)
        .bind(span.start.kind)
        .bind(span.end.id)
        .bind(span.end.kind)
        .bind(span.distance_km)
        .bind(fiber_count)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn set_order(conn: &mut SqliteConnection, id: i64, segment_order: i32) -> Result<()> {
        sqlx::query("UPDATE cable_segments SET segment_order = ?, updated_at = ? WHERE id = ?")
            .bind(segment_order)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Add `delta` to the order of every segment of the route ordered after
    /// `after`. Goes through negative values so the unique index never trips.
    pub async fn shift_orders(conn: &mut SqliteConnection, route_id: i64, after: i32, delta: i32) -> Result<()> {
        sqlx::query(
            "UPDATE cable_segments SET segment_order = -(segment_order + ?) WHERE original_cable_id = ? AND segment_order > ?",
        )
        .bind(delta)
        .bind(route_id)
        .bind(after)
        .execute(&mut *conn)
        .await?;
        sqlx::query(
            "UPDATE cable_segments SET segment_order = -segment_order, updated_at = ? WHERE original_cable_id = ? AND segment_order < 0",
        )
        .bind(Utc::now())
        .bind(route_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM cable_segments WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Node/closure sequence of a route resolved with names and coordinates
    pub async fn waypoint_sequence(conn: &mut SqliteConnection, route: &OfcCable) -> Result<Vec<Waypoint>> {
        let segments = Self::list_checked(conn, route).await?;
        let spans: Vec<SegmentSpan> = segments.iter().map(SegmentSpan::from).collect();

        let mut waypoints = Vec::new();
        for waypoint in segmentation::waypoint_sequence(&spans) {
            let table = match waypoint.kind {
                WaypointKind::Node => "nodes",
                WaypointKind::Jc => "junction_closures",
            };
            let row: Option<(String, Option<f64>, Option<f64>)> = sqlx::query_as(&format!(
                "SELECT name, latitude, longitude FROM {} WHERE id = ?",
                table
            ))
            .bind(waypoint.id)
            .fetch_optional(&mut *conn)
            .await?;
            let (name, latitude, longitude) = match row {
                Some((name, lat, lon)) => (Some(name), lat, lon),
                None => (None, None, None),
            };
            waypoints.push(Waypoint {
                kind: waypoint.kind,
                id: waypoint.id,
                name,
                latitude,
                longitude,
            });
        }
        Ok(waypoints)
    }
}
