use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite, SqliteConnection};

use super::logical_paths::LogicalPathRepo;
use super::nodes::NodeRepo;
use super::row_helpers::{map_ring_node_row, map_ring_row};
use crate::models::*;
use crate::topology::{ring, TopologyError};

const SELECT_RING: &str = r#"
    SELECT r.id, r.name, r.created_at, r.updated_at,
           (SELECT COUNT(*) FROM ring_nodes rn WHERE rn.ring_id = r.id) AS node_count
    FROM rings r
"#;

/// Ring database operations
pub struct RingRepo;

impl RingRepo {
    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<Ring>> {
        let rows = sqlx::query(&format!("{} ORDER BY r.name", SELECT_RING))
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(map_ring_row).collect())
    }

    pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<Option<Ring>> {
        let row = sqlx::query(&format!("{} WHERE r.id = ?", SELECT_RING))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.as_ref().map(map_ring_row))
    }

    pub async fn require(conn: &mut SqliteConnection, id: i64) -> Result<Ring> {
        Self::get(conn, id)
            .await?
            .ok_or_else(|| super::NotFoundError::new("Ring", &id.to_string()).into())
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateRingRequest) -> Result<Ring> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(TopologyError::validation("ring name is required").into());
        }

        let mut tx = pool.begin().await?;
        let taken: Option<(i64,)> = sqlx::query_as("SELECT id FROM rings WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *tx)
            .await?;
        if taken.is_some() {
            return Err(TopologyError::validation(format!("ring name '{}' is already in use", name)).into());
        }

        let now = Utc::now();
        let result = sqlx::query("INSERT INTO rings (name, created_at, updated_at) VALUES (?, ?, ?)")
            .bind(name)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        let id = result.last_insert_rowid();
        let ring = Self::get(&mut tx, id)
            .await?
            .context("Ring not found after creation")?;
        tx.commit().await?;

        tracing::info!("Created ring {} (id={})", ring.name, id);
        Ok(ring)
    }

    /// Ring members ordered around the ring
    pub async fn list_nodes(conn: &mut SqliteConnection, ring_id: i64) -> Result<Vec<RingNode>> {
        let rows = sqlx::query(
            r#"SELECT rn.ring_id, rn.node_id, rn.order_in_ring, n.name AS node_name
               FROM ring_nodes rn
               JOIN nodes n ON n.id = rn.node_id
               WHERE rn.ring_id = ?
               ORDER BY rn.order_in_ring, rn.node_id"#,
        )
        .bind(ring_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows.iter().map(map_ring_node_row).collect())
    }

    pub async fn add_node(pool: &Pool<Sqlite>, ring_id: i64, req: &AddRingNodeRequest) -> Result<Vec<RingNode>> {
        if !req.order_in_ring.is_finite() {
            return Err(TopologyError::validation("order_in_ring must be a finite number").into());
        }

        let mut tx = pool.begin().await?;
        let ring = Self::require(&mut tx, ring_id).await?;
        let node = NodeRepo::require(&mut tx, req.node_id).await?;
        let members = Self::list_nodes(&mut tx, ring_id).await?;
        if members.iter().any(|m| m.node_id == node.id) {
            return Err(TopologyError::validation(format!("node {} is already on ring {}", node.name, ring.name)).into());
        }
        if let Some(m) = members.iter().find(|m| m.order_in_ring == req.order_in_ring) {
            return Err(TopologyError::validation(format!(
                "order {} on ring {} is taken by node {}",
                req.order_in_ring, ring.name, m.node_name
            ))
            .into());
        }

        sqlx::query("INSERT INTO ring_nodes (ring_id, node_id, order_in_ring) VALUES (?, ?, ?)")
            .bind(ring_id)
            .bind(node.id)
            .bind(req.order_in_ring)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE rings SET updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(ring_id)
            .execute(&mut *tx)
            .await?;
        let members = Self::list_nodes(&mut tx, ring_id).await?;
        tx.commit().await?;

        tracing::info!("Added node {} to ring {} at order {}", node.name, ring.name, req.order_in_ring);
        Ok(members)
    }

    /// Bring the ring's planned paths in line with its current adjacency.
    /// Paths already configured or provisioned are never touched.
    pub async fn generate_paths(pool: &Pool<Sqlite>, ring_id: i64) -> Result<GenerateRingPathsResult> {
        let mut tx = pool.begin().await?;
        let ring = Self::require(&mut tx, ring_id).await?;
        let members = Self::list_nodes(&mut tx, ring_id).await?;
        let names: HashMap<i64, &str> = members.iter().map(|m| (m.node_id, m.node_name.as_str())).collect();
        let order: Vec<i64> = members.iter().map(|m| m.node_id).collect();

        let pairs = ring::adjacent_pairs(&order);
        let wanted: HashSet<(i64, i64)> = pairs.iter().map(|&(a, b)| ring::pair_key(a, b)).collect();

        let mut result = GenerateRingPathsResult { created: 0, kept: 0, removed: 0 };
        let mut covered = HashSet::new();
        for path in LogicalPathRepo::list_for_ring(&mut tx, ring_id).await? {
            let key = ring::pair_key(path.start_node_id, path.end_node_id);
            if wanted.contains(&key) {
                covered.insert(key);
                result.kept += 1;
            } else if path.status == PathStatus::Planned {
                LogicalPathRepo::delete(&mut tx, path.id).await?;
                result.removed += 1;
            }
        }

        for (a, b) in pairs {
            if !covered.insert(ring::pair_key(a, b)) {
                continue;
            }
            let req = CreateLogicalPathRequest {
                name: ring::path_name(names.get(&a).copied().unwrap_or_default(), names.get(&b).copied().unwrap_or_default()),
                start_node_id: a,
                end_node_id: b,
                start_fiber_no: None,
                ring_id: Some(ring_id),
            };
            LogicalPathRepo::insert(&mut tx, &req).await?;
            result.created += 1;
        }
        tx.commit().await?;

        tracing::info!(
            "Generated paths for ring {}: {} created, {} kept, {} removed",
            ring.name, result.created, result.kept, result.removed
        );
        Ok(result)
    }
}
