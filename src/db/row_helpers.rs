use sqlx::{sqlite::SqliteRow, Row};

use crate::models::*;

/// Comma-separated `?` list for an `IN (...)` clause with `n` binds
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Map a SQLite row to a Node struct
pub fn map_node_row(row: &SqliteRow) -> Node {
    Node {
        id: row.get("id"),
        name: row.get("name"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to a System struct
pub fn map_system_row(row: &SqliteRow) -> System {
    System {
        id: row.get("id"),
        name: row.get("name"),
        node_id: row.get("node_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to an OfcCable struct
pub fn map_cable_row(row: &SqliteRow) -> OfcCable {
    OfcCable {
        id: row.get("id"),
        route_name: row.get("route_name"),
        capacity: row.get("capacity"),
        current_rkm: row.get("current_rkm"),
        sn_id: row.get("sn_id"),
        sn_type: row.get("sn_type"),
        en_id: row.get("en_id"),
        en_type: row.get("en_type"),
        status: row.get("status"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to a JunctionClosure struct
pub fn map_jc_row(row: &SqliteRow) -> JunctionClosure {
    JunctionClosure {
        id: row.get("id"),
        ofc_cable_id: row.get("ofc_cable_id"),
        node_id: row.get("node_id"),
        name: row.get("name"),
        position_km: row.get("position_km"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to a CableSegment struct
pub fn map_segment_row(row: &SqliteRow) -> CableSegment {
    CableSegment {
        id: row.get("id"),
        original_cable_id: row.get("original_cable_id"),
        segment_order: row.get("segment_order"),
        start_node_id: row.get("start_node_id"),
        start_node_type: row.get("start_node_type"),
        end_node_id: row.get("end_node_id"),
        end_node_type: row.get("end_node_type"),
        distance_km: row.get("distance_km"),
        fiber_count: row.get("fiber_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to a FiberSplice struct
pub fn map_splice_row(row: &SqliteRow) -> FiberSplice {
    FiberSplice {
        id: row.get("id"),
        jc_id: row.get("jc_id"),
        incoming_segment_id: row.get("incoming_segment_id"),
        incoming_fiber_no: row.get("incoming_fiber_no"),
        outgoing_segment_id: row.get("outgoing_segment_id"),
        outgoing_fiber_no: row.get("outgoing_fiber_no"),
        splice_type: row.get("splice_type"),
        loss_db: row.get("loss_db"),
        logical_path_id: row.get("logical_path_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to a LogicalPath struct
pub fn map_logical_path_row(row: &SqliteRow) -> LogicalPath {
    LogicalPath {
        id: row.get("id"),
        name: row.get("name"),
        ring_id: row.get("ring_id"),
        start_node_id: row.get("start_node_id"),
        end_node_id: row.get("end_node_id"),
        start_fiber_no: row.get("start_fiber_no"),
        end_fiber_no: row.get("end_fiber_no"),
        source_system_id: row.get("source_system_id"),
        destination_system_id: row.get("destination_system_id"),
        source_port: row.get("source_port"),
        destination_port: row.get("destination_port"),
        status: row.get("status"),
        total_distance_km: row.get("total_distance_km"),
        total_loss_db: row.get("total_loss_db"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to a LogicalPathElement struct
pub fn map_path_element_row(row: &SqliteRow) -> LogicalPathElement {
    LogicalPathElement {
        logical_path_id: row.get("logical_path_id"),
        step_order: row.get("step_order"),
        element_type: row.get("element_type"),
        element_id: row.get("element_id"),
        fiber_in: row.get("fiber_in"),
        fiber_out: row.get("fiber_out"),
        distance_km: row.get("distance_km"),
        loss_db: row.get("loss_db"),
    }
}

/// Map a SQLite row to a FiberAssignment struct
pub fn map_assignment_row(row: &SqliteRow) -> FiberAssignment {
    FiberAssignment {
        cable_id: row.get("cable_id"),
        fiber_no: row.get("fiber_no"),
        logical_path_id: row.get("logical_path_id"),
        system_id: row.get("system_id"),
        direction: row.get("direction"),
        created_at: row.get("created_at"),
    }
}

/// Map a SQLite row to a Ring struct
pub fn map_ring_row(row: &SqliteRow) -> Ring {
    Ring {
        id: row.get("id"),
        name: row.get("name"),
        node_count: row.try_get::<Option<i32>, _>("node_count").ok().flatten(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to a RingNode struct
pub fn map_ring_node_row(row: &SqliteRow) -> RingNode {
    RingNode {
        ring_id: row.get("ring_id"),
        node_id: row.get("node_id"),
        node_name: row.get("node_name"),
        order_in_ring: row.get("order_in_ring"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }
}
