use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite, SqliteConnection};

use super::row_helpers::{map_node_row, map_system_row};
use crate::models::*;
use crate::topology::TopologyError;

const SELECT_NODE: &str = "SELECT id, name, latitude, longitude, created_at, updated_at FROM nodes";
const SELECT_SYSTEM: &str = "SELECT id, name, node_id, created_at, updated_at FROM systems";

/// Node database operations
pub struct NodeRepo;

impl NodeRepo {
    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<Node>> {
        let rows = sqlx::query(&format!("{} ORDER BY name", SELECT_NODE))
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(map_node_row).collect())
    }

    pub async fn list_all(conn: &mut SqliteConnection) -> Result<Vec<Node>> {
        let rows = sqlx::query(&format!("{} ORDER BY id", SELECT_NODE))
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(map_node_row).collect())
    }

    pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<Option<Node>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_NODE))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.as_ref().map(map_node_row))
    }

    /// Fetch a node or fail with NotFoundError
    pub async fn require(conn: &mut SqliteConnection, id: i64) -> Result<Node> {
        Self::get(conn, id)
            .await?
            .ok_or_else(|| super::NotFoundError::new("Node", &id.to_string()).into())
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateNodeRequest) -> Result<Node> {
        if req.name.trim().is_empty() {
            return Err(TopologyError::validation("node name is required").into());
        }
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO nodes (name, latitude, longitude, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(req.name.trim())
        .bind(req.latitude)
        .bind(req.longitude)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        let mut conn = pool.acquire().await?;
        Self::get(&mut conn, result.last_insert_rowid())
            .await?
            .context("Node not found after creation")
    }
}

/// System database operations
pub struct SystemRepo;

impl SystemRepo {
    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<System>> {
        let rows = sqlx::query(&format!("{} ORDER BY name", SELECT_SYSTEM))
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(map_system_row).collect())
    }

    pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<Option<System>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_SYSTEM))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.as_ref().map(map_system_row))
    }

    pub async fn require(conn: &mut SqliteConnection, id: i64) -> Result<System> {
        Self::get(conn, id)
            .await?
            .ok_or_else(|| super::NotFoundError::new("System", &id.to_string()).into())
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateSystemRequest) -> Result<System> {
        if req.name.trim().is_empty() {
            return Err(TopologyError::validation("system name is required").into());
        }
        let mut conn = pool.acquire().await?;
        if let Some(node_id) = req.node_id {
            NodeRepo::require(&mut conn, node_id).await?;
        }

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO systems (name, node_id, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(req.name.trim())
        .bind(req.node_id)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Self::get(&mut conn, result.last_insert_rowid())
            .await?
            .context("System not found after creation")
    }
}
