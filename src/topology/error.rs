use serde::Serialize;
use thiserror::Error;

/// Typed failures of the route topology engine.
///
/// Validation and invariant errors leave no partial mutation behind. Integrity
/// errors mean the stored graph is broken or changed underneath a reader.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TopologyError {
    #[error("{0}")]
    Validation(String),

    #[error("fiber {fiber_no} of segment {segment_id} is already spliced at junction closure {jc_id} (splice {splice_id})")]
    FiberAlreadySpliced {
        jc_id: i64,
        segment_id: i64,
        fiber_no: i32,
        splice_id: i64,
    },

    #[error("junction closure {jc_id} joins {segment_count} segments; only inline closures between two route segments can be removed")]
    NotSimpleJunction { jc_id: i64, segment_count: usize },

    #[error("fiber {fiber_no} of cable {cable_id} is already committed to logical path {logical_path_id}")]
    FiberInUse {
        cable_id: i64,
        fiber_no: i32,
        logical_path_id: i64,
    },

    #[error("topology inconsistency on route {route_id}: {detail}")]
    TopologyInconsistency { route_id: i64, detail: String },

    #[error("segment {segment_id} visited twice while tracing; splice graph contains a cycle")]
    PathTraceCycle { segment_id: i64 },

    #[error("fiber {fiber_no} of segment {segment_id} has no splice at junction closure {jc_id}")]
    DeadEndFiber {
        jc_id: i64,
        segment_id: i64,
        fiber_no: i32,
    },

    #[error("no fiber path from node {start_node_id} to node {end_node_id} on fiber {fiber_no}")]
    NoPathFound {
        start_node_id: i64,
        end_node_id: i64,
        fiber_no: i32,
    },

    #[error("concurrent modification of {0}, retry the request")]
    Conflict(String),
}

/// Coarse classification used by the API layer and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Validation,
    Invariant,
    Integrity,
    Unreachable,
    Conflict,
}

impl TopologyError {
    pub fn validation(msg: impl Into<String>) -> Self {
        TopologyError::Validation(msg.into())
    }

    pub fn inconsistency(route_id: i64, detail: impl Into<String>) -> Self {
        TopologyError::TopologyInconsistency {
            route_id,
            detail: detail.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            TopologyError::Validation(_) => ErrorClass::Validation,
            TopologyError::FiberAlreadySpliced { .. }
            | TopologyError::NotSimpleJunction { .. }
            | TopologyError::FiberInUse { .. } => ErrorClass::Invariant,
            TopologyError::TopologyInconsistency { .. } | TopologyError::PathTraceCycle { .. } => {
                ErrorClass::Integrity
            }
            TopologyError::DeadEndFiber { .. } | TopologyError::NoPathFound { .. } => {
                ErrorClass::Unreachable
            }
            TopologyError::Conflict(_) => ErrorClass::Conflict,
        }
    }

    /// Stable machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            TopologyError::Validation(_) => "validation",
            TopologyError::FiberAlreadySpliced { .. } => "fiber_already_spliced",
            TopologyError::NotSimpleJunction { .. } => "not_simple_junction",
            TopologyError::FiberInUse { .. } => "fiber_in_use",
            TopologyError::TopologyInconsistency { .. } => "topology_inconsistency",
            TopologyError::PathTraceCycle { .. } => "path_trace_cycle",
            TopologyError::DeadEndFiber { .. } => "dead_end_fiber",
            TopologyError::NoPathFound { .. } => "no_path_found",
            TopologyError::Conflict(_) => "conflict",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(TopologyError::validation("bad").class(), ErrorClass::Validation);
        assert_eq!(
            TopologyError::NotSimpleJunction { jc_id: 1, segment_count: 3 }.class(),
            ErrorClass::Invariant
        );
        assert_eq!(
            TopologyError::PathTraceCycle { segment_id: 4 }.class(),
            ErrorClass::Integrity
        );
        assert_eq!(
            TopologyError::DeadEndFiber { jc_id: 1, segment_id: 2, fiber_no: 3 }.kind(),
            "dead_end_fiber"
        );
    }

    #[test]
    fn test_already_spliced_message_names_the_fiber() {
        let err = TopologyError::FiberAlreadySpliced {
            jc_id: 7,
            segment_id: 11,
            fiber_no: 5,
            splice_id: 42,
        };
        let msg = err.to_string();
        assert!(msg.contains("fiber 5"));
        assert!(msg.contains("segment 11"));
        assert!(msg.contains("junction closure 7"));
    }
}
