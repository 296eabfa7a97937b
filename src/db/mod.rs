mod cables;
pub mod concurrency;
mod junction_closures;
mod logical_paths;
mod nodes;
mod rings;
pub(crate) mod row_helpers;
mod segments;
mod splices;
mod topology_sheets;
mod trace;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};

use crate::models::*;
use crate::topology::{tracer, TopologyError};
use concurrency::{retry_once, LockKey, LockRegistry};

/// Typed error for "resource not found", downcast by the API error handler
#[derive(Debug)]
pub struct NotFoundError {
    pub resource: String,
    pub id: String,
}

impl NotFoundError {
    pub fn new(resource: &str, id: &str) -> Self {
        Self {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }
}

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} not found: {}", self.resource, self.id)
    }
}

impl std::error::Error for NotFoundError {}

fn is_inconsistency(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<TopologyError>(),
        Some(TopologyError::TopologyInconsistency { .. })
    )
}

/// Store handles all database operations, delegating to per-entity repo modules.
/// Mutations hold the locks of the resources they touch for the length of
/// their transaction.
#[derive(Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
    locks: Arc<LockRegistry>,
}

impl Store {
    /// Create a new database store with the default pool size
    pub async fn new(db_path: &str) -> Result<Self> {
        Self::with_pool_size(db_path, 5).await
    }

    /// Create a new database store with a specific pool size
    pub async fn with_pool_size(db_path: &str, max_connections: u32) -> Result<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&db_url)
            .await
            .context("Failed to connect to database")?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: Pool<Sqlite>) -> Result<Self> {
        let store = Self {
            pool,
            locks: Arc::new(LockRegistry::default()),
        };
        store.migrate().await?;
        Ok(store)
    }

    /// Single-connection in-memory store for tests
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;
        Self::from_pool(pool).await
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    /// Cheap round trip used by the healthcheck
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ========== Node Operations ==========

    pub async fn list_nodes(&self) -> Result<Vec<Node>> {
        nodes::NodeRepo::list(&self.pool).await
    }

    pub async fn get_node(&self, id: i64) -> Result<Node> {
        let mut conn = self.pool.acquire().await?;
        nodes::NodeRepo::require(&mut conn, id).await
    }

    pub async fn create_node(&self, req: &CreateNodeRequest) -> Result<Node> {
        nodes::NodeRepo::create(&self.pool, req).await
    }

    // ========== System Operations ==========

    pub async fn list_systems(&self) -> Result<Vec<System>> {
        nodes::SystemRepo::list(&self.pool).await
    }

    pub async fn get_system(&self, id: i64) -> Result<System> {
        let mut conn = self.pool.acquire().await?;
        nodes::SystemRepo::require(&mut conn, id).await
    }

    pub async fn create_system(&self, req: &CreateSystemRequest) -> Result<System> {
        nodes::SystemRepo::create(&self.pool, req).await
    }

    // ========== Cable Route Operations ==========

    pub async fn list_cables(&self) -> Result<Vec<OfcCable>> {
        cables::CableRepo::list(&self.pool).await
    }

    pub async fn create_cable(&self, req: &CreateCableRequest) -> Result<OfcCable> {
        let pool = &self.pool;
        retry_once("create cable", move || cables::CableRepo::create(pool, req)).await
    }

    pub async fn deactivate_cable(&self, id: i64) -> Result<OfcCable> {
        let _route = self.locks.lock(LockKey::Route(id)).await;
        let pool = &self.pool;
        retry_once("deactivate cable", move || cables::CableRepo::deactivate(pool, id)).await
    }

    pub async fn get_route_details(&self, id: i64) -> Result<RouteDetails> {
        cables::CableRepo::details(&self.pool, id).await
    }

    /// Ordered segments of a route; fails if they do not form a chain
    pub async fn get_segments_for_route(&self, route_id: i64) -> Result<Vec<CableSegment>> {
        let mut conn = self.pool.acquire().await?;
        let route = cables::CableRepo::require(&mut conn, route_id).await?;
        segments::SegmentRepo::list_checked(&mut conn, &route).await
    }

    pub async fn get_waypoint_sequence(&self, route_id: i64) -> Result<Vec<Waypoint>> {
        let mut conn = self.pool.acquire().await?;
        let route = cables::CableRepo::require(&mut conn, route_id).await?;
        segments::SegmentRepo::waypoint_sequence(&mut conn, &route).await
    }

    pub async fn list_available_fibers(&self, cable_id: i64) -> Result<CableFiberAvailability> {
        cables::CableRepo::available_fibers(&self.pool, cable_id).await
    }

    // ========== Junction Closure Operations ==========

    pub async fn get_junction_closure(&self, id: i64) -> Result<JunctionClosure> {
        let mut conn = self.pool.acquire().await?;
        junction_closures::JunctionClosureRepo::require(&mut conn, id).await
    }

    pub async fn add_junction_closure(&self, route_id: i64, req: &AddJunctionClosureRequest) -> Result<JunctionClosure> {
        let _route = self.locks.lock(LockKey::Route(route_id)).await;
        let pool = &self.pool;
        retry_once("add junction closure", move || {
            junction_closures::JunctionClosureRepo::add(pool, route_id, req)
        })
        .await
    }

    /// Remove a closure and merge its two segments; returns the merged segment
    pub async fn remove_junction_closure(&self, jc_id: i64) -> Result<CableSegment> {
        let route_id = self.get_junction_closure(jc_id).await?.ofc_cable_id;
        let _route = self.locks.lock(LockKey::Route(route_id)).await;
        let _jc = self.locks.lock(LockKey::Jc(jc_id)).await;
        let pool = &self.pool;
        retry_once("remove junction closure", move || {
            junction_closures::JunctionClosureRepo::remove(pool, jc_id)
        })
        .await
    }

    // ========== Splice Operations ==========

    pub async fn get_splice(&self, id: i64) -> Result<FiberSplice> {
        let mut conn = self.pool.acquire().await?;
        splices::SpliceRepo::require(&mut conn, id).await
    }

    pub async fn get_splicing_details(&self, jc_id: i64) -> Result<SplicingDetails> {
        splices::SpliceRepo::splicing_details(&self.pool, jc_id).await
    }

    pub async fn create_splice(&self, jc_id: i64, req: &CreateSpliceRequest, default_loss_db: f64) -> Result<FiberSplice> {
        let _jc = self.locks.lock(LockKey::Jc(jc_id)).await;
        let pool = &self.pool;
        retry_once("create splice", move || {
            splices::SpliceRepo::create(pool, jc_id, req, default_loss_db)
        })
        .await
    }

    pub async fn delete_splice(&self, id: i64) -> Result<()> {
        let jc_id = self.get_splice(id).await?.jc_id;
        let _jc = self.locks.lock(LockKey::Jc(jc_id)).await;
        let pool = &self.pool;
        retry_once("delete splice", move || splices::SpliceRepo::delete(pool, id)).await
    }

    pub async fn update_splice_loss(&self, id: i64, loss_db: f64) -> Result<FiberSplice> {
        let jc_id = self.get_splice(id).await?.jc_id;
        let _jc = self.locks.lock(LockKey::Jc(jc_id)).await;
        let pool = &self.pool;
        retry_once("update splice loss", move || {
            splices::SpliceRepo::update_loss(pool, id, loss_db)
        })
        .await
    }

    pub async fn auto_splice_straight_segments(
        &self,
        jc_id: i64,
        req: &AutoSpliceRequest,
        default_loss_db: f64,
    ) -> Result<AutoSpliceResult> {
        let _jc = self.locks.lock(LockKey::Jc(jc_id)).await;
        let pool = &self.pool;
        retry_once("auto-splice", move || {
            splices::SpliceRepo::auto_splice(pool, jc_id, req, default_loss_db)
        })
        .await
    }

    // ========== Trace Operations ==========

    async fn trace_once(&self, start_node_id: i64, end_node_id: i64, fiber_no: i32) -> Result<FiberTrace> {
        let mut tx = self.pool.begin().await?;
        let trace = trace::TraceRepo::trace(&mut tx, start_node_id, end_node_id, fiber_no).await?;
        tx.commit().await?;
        Ok(trace)
    }

    /// Trace a fiber between two nodes. A snapshot caught mid-mutation is
    /// read once more before giving up.
    pub async fn trace_fiber_path(&self, start_node_id: i64, end_node_id: i64, fiber_no: i32) -> Result<FiberTrace> {
        match self.trace_once(start_node_id, end_node_id, fiber_no).await {
            Err(e) if is_inconsistency(&e) => {
                tracing::warn!("Trace {} -> {} hit an inconsistent snapshot, retrying: {}", start_node_id, end_node_id, e);
                self.trace_once(start_node_id, end_node_id, fiber_no).await
            }
            other => other,
        }
    }

    // ========== Logical Path Operations ==========

    pub async fn list_logical_paths(&self, query: &LogicalPathQuery) -> Result<Vec<LogicalPath>> {
        logical_paths::LogicalPathRepo::list(&self.pool, query).await
    }

    pub async fn get_logical_path(&self, id: i64) -> Result<LogicalPath> {
        let mut conn = self.pool.acquire().await?;
        logical_paths::LogicalPathRepo::require(&mut conn, id).await
    }

    pub async fn create_logical_path(&self, req: &CreateLogicalPathRequest) -> Result<LogicalPath> {
        let pool = &self.pool;
        retry_once("create logical path", move || {
            logical_paths::LogicalPathRepo::create(pool, req)
        })
        .await
    }

    pub async fn list_path_elements(&self, id: i64) -> Result<Vec<LogicalPathElement>> {
        self.get_logical_path(id).await?;
        logical_paths::LogicalPathRepo::elements(&self.pool, id).await
    }

    pub async fn list_path_assignments(&self, id: i64) -> Result<Vec<FiberAssignment>> {
        self.get_logical_path(id).await?;
        logical_paths::LogicalPathRepo::assignments(&self.pool, id).await
    }

    /// Fiber numbers free along the whole synced trace of a path
    pub async fn list_path_available_fibers(&self, id: i64) -> Result<PathFiberAvailability> {
        logical_paths::LogicalPathRepo::available_fibers(&self.pool, id).await
    }

    /// Trace a path's start fiber between its end nodes
    pub async fn trace_logical_path(&self, id: i64) -> Result<FiberTrace> {
        let path = self.get_logical_path(id).await?;
        let fiber_no = path.start_fiber_no.ok_or_else(|| {
            TopologyError::validation(format!("logical path {} has no start fiber", id))
        })?;
        self.trace_fiber_path(path.start_node_id, path.end_node_id, fiber_no).await
    }

    async fn sync_once(&self, id: i64, fiber_no: Option<i32>) -> Result<LogicalPath> {
        let mut tx = self.pool.begin().await?;
        let path = logical_paths::LogicalPathRepo::require(&mut tx, id).await?;
        let fiber_no = fiber_no.or(path.start_fiber_no).ok_or_else(|| {
            TopologyError::validation(format!("logical path {} has no start fiber; pass fiber_no", id))
        })?;
        let trace = trace::TraceRepo::trace(&mut tx, path.start_node_id, path.end_node_id, fiber_no).await?;
        let trace = tracer::require_complete(trace)?;
        let path = logical_paths::LogicalPathRepo::sync_from_trace(&mut tx, &path, &trace).await?;
        tx.commit().await?;
        Ok(path)
    }

    /// Trace the path afresh and store the result as its physical backing
    pub async fn sync_logical_path(&self, id: i64, req: &SyncPathRequest) -> Result<LogicalPath> {
        let _path = self.locks.lock(LockKey::Path(id)).await;
        retry_once("sync logical path", move || self.sync_once(id, req.fiber_no)).await
    }

    async fn reverse_once(&self, id: i64) -> Result<LogicalPath> {
        let mut tx = self.pool.begin().await?;
        let path = logical_paths::LogicalPathRepo::require(&mut tx, id).await?;
        let fiber_no = path.end_fiber_no.or(path.start_fiber_no).ok_or_else(|| {
            TopologyError::validation(format!("logical path {} has no fiber to reverse", id))
        })?;
        logical_paths::LogicalPathRepo::swap_ends(&mut tx, id).await?;
        let path = logical_paths::LogicalPathRepo::require(&mut tx, id).await?;
        let trace = trace::TraceRepo::trace(&mut tx, path.start_node_id, path.end_node_id, fiber_no).await?;
        let trace = tracer::require_complete(trace)?;
        let path = logical_paths::LogicalPathRepo::sync_from_trace(&mut tx, &path, &trace).await?;
        tx.commit().await?;
        Ok(path)
    }

    /// Swap a path's direction and re-sync it from a fresh trace
    pub async fn reverse_logical_path(&self, id: i64) -> Result<LogicalPath> {
        let _path = self.locks.lock(LockKey::Path(id)).await;
        let path = retry_once("reverse logical path", move || self.reverse_once(id)).await?;
        tracing::info!("Reversed logical path {} ({} -> {})", id, path.start_node_id, path.end_node_id);
        Ok(path)
    }

    async fn assign_once(&self, id: i64, req: &AssignFibersRequest) -> Result<LogicalPath> {
        let mut tx = self.pool.begin().await?;
        let path = logical_paths::LogicalPathRepo::require(&mut tx, id).await?;
        let path = logical_paths::LogicalPathRepo::assign_fibers(&mut tx, &path, req).await?;
        tx.commit().await?;
        Ok(path)
    }

    pub async fn assign_system_to_fibers(&self, id: i64, req: &AssignFibersRequest) -> Result<LogicalPath> {
        let _path = self.locks.lock(LockKey::Path(id)).await;
        retry_once("assign fibers", move || self.assign_once(id, req)).await
    }

    async fn deprovision_once(&self, id: i64) -> Result<LogicalPath> {
        let mut tx = self.pool.begin().await?;
        let path = logical_paths::LogicalPathRepo::require(&mut tx, id).await?;
        let path = logical_paths::LogicalPathRepo::deprovision(&mut tx, &path).await?;
        tx.commit().await?;
        Ok(path)
    }

    pub async fn deprovision_logical_path(&self, id: i64) -> Result<LogicalPath> {
        let _path = self.locks.lock(LockKey::Path(id)).await;
        retry_once("deprovision logical path", move || self.deprovision_once(id)).await
    }

    // ========== Ring Operations ==========

    pub async fn list_rings(&self) -> Result<Vec<Ring>> {
        rings::RingRepo::list(&self.pool).await
    }

    pub async fn create_ring(&self, req: &CreateRingRequest) -> Result<Ring> {
        let pool = &self.pool;
        retry_once("create ring", move || rings::RingRepo::create(pool, req)).await
    }

    pub async fn list_ring_nodes(&self, ring_id: i64) -> Result<Vec<RingNode>> {
        let mut conn = self.pool.acquire().await?;
        rings::RingRepo::require(&mut conn, ring_id).await?;
        rings::RingRepo::list_nodes(&mut conn, ring_id).await
    }

    pub async fn add_ring_node(&self, ring_id: i64, req: &AddRingNodeRequest) -> Result<Vec<RingNode>> {
        let _ring = self.locks.lock(LockKey::Ring(ring_id)).await;
        let pool = &self.pool;
        retry_once("add ring node", move || rings::RingRepo::add_node(pool, ring_id, req)).await
    }

    pub async fn generate_ring_connection_paths(&self, ring_id: i64) -> Result<GenerateRingPathsResult> {
        let _ring = self.locks.lock(LockKey::Ring(ring_id)).await;
        let pool = &self.pool;
        retry_once("generate ring paths", move || rings::RingRepo::generate_paths(pool, ring_id)).await
    }

    // ========== Topology Sheet Operations ==========

    pub async fn export_route_topology(&self, route_id: i64) -> Result<TopologySheets> {
        topology_sheets::TopologySheetRepo::export(&self.pool, route_id).await
    }

    pub async fn import_route_topology(&self, route_id: i64, doc: &TopologySheets) -> Result<ImportTopologyResult> {
        let _route = self.locks.lock(LockKey::Route(route_id)).await;
        let pool = &self.pool;
        retry_once("import route topology", move || {
            topology_sheets::TopologySheetRepo::import(pool, route_id, doc)
        })
        .await
    }
}
