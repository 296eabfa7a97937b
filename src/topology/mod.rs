//! Storage-free core of the fiber route engine: route segmentation, the
//! splice graph, path tracing, splice matrix rules and ring pairing.
//!
//! The `db` layer loads rows, runs these functions and writes the result back
//! inside a single transaction.

mod error;
pub mod graph;
pub mod ring;
pub mod segmentation;
pub mod sheets;
pub mod splice_matrix;
pub mod tracer;

pub use error::{ErrorClass, TopologyError};
pub use graph::{TopologyGraph, TopologySnapshot};

/// Tolerance for distance comparisons (km)
pub const DISTANCE_TOLERANCE_KM: f64 = 1e-6;

pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= DISTANCE_TOLERANCE_KM
}
