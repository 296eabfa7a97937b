//! Node pairing around a ring.

/// Adjacent node pairs of a ring given its nodes sorted by `order_in_ring`.
///
/// Consecutive nodes pair up, and the ring closes from the last node back to
/// the first once it has three or more nodes. Two nodes give a single pair.
pub fn adjacent_pairs(ordered_nodes: &[i64]) -> Vec<(i64, i64)> {
    let mut pairs: Vec<(i64, i64)> = ordered_nodes.windows(2).map(|w| (w[0], w[1])).collect();
    if ordered_nodes.len() >= 3 {
        if let (Some(&last), Some(&first)) = (ordered_nodes.last(), ordered_nodes.first()) {
            pairs.push((last, first));
        }
    }
    pairs
}

/// Direction-free identity of a node pair
pub fn pair_key(a: i64, b: i64) -> (i64, i64) {
    (a.min(b), a.max(b))
}

pub fn path_name(start_name: &str, end_name: &str) -> String {
    format!("{} ↔ {}", start_name, end_name)
}
