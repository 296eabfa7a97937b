use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::AppState;

/// Build the application router with all routes
pub fn build(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(handlers::healthcheck))
        // Node and system routes
        .route("/api/nodes", get(handlers::nodes::list_nodes))
        .route("/api/nodes", post(handlers::nodes::create_node))
        .route("/api/nodes/:id", get(handlers::nodes::get_node))
        .route("/api/systems", get(handlers::nodes::list_systems))
        .route("/api/systems", post(handlers::nodes::create_system))
        .route("/api/systems/:id", get(handlers::nodes::get_system))
        // Cable route routes
        .route("/api/cables", get(handlers::cables::list_cables))
        .route("/api/cables", post(handlers::cables::create_cable))
        .route("/api/cables/:id", get(handlers::cables::get_route_details))
        .route("/api/cables/:id/deactivate", post(handlers::cables::deactivate_cable))
        .route("/api/cables/:id/segments", get(handlers::cables::get_segments))
        .route("/api/cables/:id/waypoints", get(handlers::cables::get_waypoints))
        .route("/api/cables/:id/available-fibers", get(handlers::cables::list_available_fibers))
        .route("/api/cables/:id/topology", get(handlers::cables::export_topology))
        .route("/api/cables/:id/topology", put(handlers::cables::import_topology))
        .route("/api/cables/:id/junction-closures", post(handlers::junction_closures::add_junction_closure))
        // Junction closure and splice routes
        .route("/api/junction-closures/:id", delete(handlers::junction_closures::remove_junction_closure))
        .route("/api/junction-closures/:id/splicing", get(handlers::junction_closures::get_splicing_details))
        .route("/api/junction-closures/:id/splices", post(handlers::splices::create_splice))
        .route("/api/junction-closures/:id/auto-splice", post(handlers::splices::auto_splice))
        .route("/api/splices/:id/loss", put(handlers::splices::update_splice_loss))
        .route("/api/splices/:id", delete(handlers::splices::delete_splice))
        // Tracing
        .route("/api/trace", post(handlers::trace::trace_fiber_path))
        // Logical path routes
        .route("/api/logical-paths", get(handlers::logical_paths::list_logical_paths))
        .route("/api/logical-paths", post(handlers::logical_paths::create_logical_path))
        .route("/api/logical-paths/:id", get(handlers::logical_paths::get_logical_path))
        .route("/api/logical-paths/:id/elements", get(handlers::logical_paths::list_path_elements))
        .route("/api/logical-paths/:id/assignments", get(handlers::logical_paths::list_path_assignments))
        .route("/api/logical-paths/:id/available-fibers", get(handlers::logical_paths::list_path_available_fibers))
        .route("/api/logical-paths/:id/trace", get(handlers::logical_paths::trace_logical_path))
        .route("/api/logical-paths/:id/sync", post(handlers::logical_paths::sync_logical_path))
        .route("/api/logical-paths/:id/reverse", post(handlers::logical_paths::reverse_logical_path))
        .route("/api/logical-paths/:id/assign", post(handlers::logical_paths::assign_system_to_fibers))
        .route("/api/logical-paths/:id/deprovision", post(handlers::logical_paths::deprovision_logical_path))
        // Ring routes
        .route("/api/rings", get(handlers::rings::list_rings))
        .route("/api/rings", post(handlers::rings::create_ring))
        .route("/api/rings/:id/nodes", get(handlers::rings::list_ring_nodes))
        .route("/api/rings/:id/nodes", post(handlers::rings::add_ring_node))
        .route("/api/rings/:id/generate-paths", post(handlers::rings::generate_paths))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
