/// Leaf pruning of the marker graph
/// A leaf is a vertex with total surviving degree 1: the dangling end of a
/// dead-end side branch. Each iteration flags the single incident edge of
/// every current leaf (and its reverse complement), so a tip of n edges
/// disappears after n iterations.

use crate::marker_graph::{EdgeId, MarkerGraph, VertexId};

pub fn prune_leaves(graph: &mut MarkerGraph, iteration_count: usize) {
    let mut total_flagged = 0usize;
    for iteration in 0..iteration_count {
        let mut to_flag: Vec<EdgeId> = Vec::new();
        for vertex in 0..graph.vertex_count() as VertexId {
            let out_edges = graph.surviving_out_edges(vertex);
            let in_edges = graph.surviving_in_edges(vertex);
            if out_edges.len() + in_edges.len() != 1 {
                continue;
            }
            let edge = out_edges.first().or(in_edges.first()).copied().unwrap();
            to_flag.push(edge);
        }
        to_flag.sort_unstable();
        to_flag.dedup();
        if to_flag.is_empty() {
            break;
        }
        for edge in &to_flag {
            graph.flag_edge_pair(*edge, |flags| flags.was_pruned = true);
        }
        total_flagged += to_flag.len();
        log::debug!(
            "Prune iteration {} flagged {} leaf edges",
            iteration + 1,
            to_flag.len()
        );
    }
    log::info!("Pruning flagged {} leaf edges", total_flagged);
}
