use anyhow::Result;
use sqlx::SqliteConnection;

use super::cables::CableRepo;
use super::junction_closures::JunctionClosureRepo;
use super::nodes::NodeRepo;
use super::segments::SegmentRepo;
use super::splices::SpliceRepo;
use crate::models::FiberTrace;
use crate::topology::{tracer, TopologyGraph, TopologySnapshot};

/// Reads the splice graph and runs traces over it
pub struct TraceRepo;

impl TraceRepo {
    /// Every row the splice graph needs. Run inside a transaction so the
    /// tables are read at one point in time.
    pub async fn snapshot(conn: &mut SqliteConnection) -> Result<TopologySnapshot> {
        Ok(TopologySnapshot {
            cables: CableRepo::list_all(conn).await?,
            segments: SegmentRepo::list_all(conn).await?,
            splices: SpliceRepo::list_all(conn).await?,
            nodes: NodeRepo::list_all(conn).await?,
            junction_closures: JunctionClosureRepo::list_all(conn).await?,
        })
    }

    pub async fn trace(
        conn: &mut SqliteConnection,
        start_node_id: i64,
        end_node_id: i64,
        fiber_no: i32,
    ) -> Result<FiberTrace> {
        NodeRepo::require(conn, start_node_id).await?;
        NodeRepo::require(conn, end_node_id).await?;
        let graph = TopologyGraph::build(Self::snapshot(conn).await?)?;
        Ok(tracer::trace_fiber_path(&graph, start_node_id, end_node_id, fiber_no)?)
    }
}
