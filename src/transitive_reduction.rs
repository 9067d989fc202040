/// Approximate transitive reduction of the marker graph
/// Removes edges implied by longer paths in the surviving subgraph.
/// 1. every edge with coverage <= lowCoverageThreshold is flagged
/// 2. every edge with coverage 1 and ordinal skip > edgeMarkerSkipThreshold is flagged
/// 3. edges with low < coverage < high are visited in increasing (coverage, edge id)
///    order; an edge A->B is flagged when an alternative unflagged path
///    A->...->B of length <= maxDistance exists
/// 4. edges with coverage >= highCoverageThreshold are never touched
/// The (coverage, edge id) total order makes the outcome reproducible
/// regardless of thread count. Edges are always flagged together with their
/// reverse complement.
/// The reverse variant looks for a path B->...->A instead, flagging edges
/// that close short cycles.

use std::collections::VecDeque;

use crate::marker_graph::{EdgeId, MarkerGraph, VertexId};

pub struct TransitiveReductionParams {
    pub low_coverage_threshold: usize,
    pub high_coverage_threshold: usize,
    pub max_distance: usize,
    pub edge_marker_skip_threshold: u32,
}

/// Largest ordinal skip among the intervals supporting an edge.
fn edge_ordinal_skip(graph: &MarkerGraph, edge: EdgeId) -> u32 {
    graph.edge_marker_intervals[edge as usize]
        .iter()
        .map(|interval| interval.ordinals[1] - interval.ordinals[0])
        .max()
        .unwrap_or(0)
}

/// Is there a path from `from` to `to` of at most `max_distance` surviving
/// edges, not using `excluded_edge`?
fn path_exists(
    graph: &MarkerGraph,
    from: VertexId,
    to: VertexId,
    max_distance: usize,
    excluded_edge: EdgeId,
) -> bool {
    let mut queue: VecDeque<(VertexId, usize)> = VecDeque::new();
    let mut visited: fnv::FnvHashSet<VertexId> = fnv::FnvHashSet::default();
    queue.push_back((from, 0));
    visited.insert(from);
    while let Some((vertex, distance)) = queue.pop_front() {
        if distance >= max_distance {
            continue;
        }
        for &edge_id in &graph.edges_by_source[vertex as usize] {
            if edge_id == excluded_edge {
                continue;
            }
            let edge = &graph.edges[edge_id as usize];
            if edge.flags.is_removed() {
                continue;
            }
            if edge.target == to {
                return true;
            }
            if visited.insert(edge.target) {
                queue.push_back((edge.target, distance + 1));
            }
        }
    }
    false
}

fn reduction_pass(graph: &mut MarkerGraph, params: &TransitiveReductionParams, reverse: bool) {
    let mut flagged = 0usize;

    // steps 1 and 2 apply only on the forward pass, the reverse pass works
    // on what is left
    if !reverse {
        for edge_id in 0..graph.edge_count() as EdgeId {
            if graph.edges[edge_id as usize].flags.is_removed() {
                continue;
            }
            let coverage = graph.edge_coverage(edge_id);
            let skip_flagged = coverage == 1
                && edge_ordinal_skip(graph, edge_id) > params.edge_marker_skip_threshold;
            if coverage <= params.low_coverage_threshold || skip_flagged {
                graph.flag_edge_pair(edge_id, |flags| {
                    flags.was_removed_by_transitive_reduction = true
                });
                flagged += 1;
            }
        }
    }

    // step 3: total order by (coverage, edge id)
    let mut candidates: Vec<EdgeId> = (0..graph.edge_count() as EdgeId)
        .filter(|&edge_id| {
            let coverage = graph.edge_coverage(edge_id);
            coverage > params.low_coverage_threshold && coverage < params.high_coverage_threshold
        })
        .collect();
    candidates.sort_unstable_by_key(|&edge_id| (graph.edge_coverage(edge_id), edge_id));

    for edge_id in candidates {
        if graph.edges[edge_id as usize].flags.is_removed() {
            // already flagged, possibly as the mirror of an earlier edge
            continue;
        }
        let (source, target) = {
            let edge = &graph.edges[edge_id as usize];
            (edge.source, edge.target)
        };
        let found = if reverse {
            path_exists(graph, target, source, params.max_distance, edge_id)
        } else {
            path_exists(graph, source, target, params.max_distance, edge_id)
        };
        if found {
            graph.flag_edge_pair(edge_id, |flags| {
                flags.was_removed_by_transitive_reduction = true
            });
            flagged += 1;
        }
    }

    log::info!(
        "{} flagged {} edge pairs",
        if reverse {
            "Reverse transitive reduction"
        } else {
            "Transitive reduction"
        },
        flagged
    );
}

pub fn transitive_reduction(graph: &mut MarkerGraph, params: &TransitiveReductionParams) {
    reduction_pass(graph, params, false);
}

pub fn reverse_transitive_reduction(graph: &mut MarkerGraph, params: &TransitiveReductionParams) {
    reduction_pass(graph, params, true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::graph_from_edges;

    fn params(low: usize, high: usize, distance: usize) -> TransitiveReductionParams {
        TransitiveReductionParams {
            low_coverage_threshold: low,
            high_coverage_threshold: high,
            max_distance: distance,
            edge_marker_skip_threshold: 100,
        }
    }

    /// A->B (coverage 2) is implied by A->C->B (coverage 5 each).
    #[test]
    fn short_cut_edge_is_flagged() {
        // abstract vertices: A=0, B=1, C=2
        let mut graph = graph_from_edges(3, &[(0, 1, 2), (0, 2, 5), (2, 1, 5)]);
        transitive_reduction(&mut graph, &params(1, 8, 3));

        // edge 0 is A->B, edge 1 its mirror
        assert!(graph.edges[0].flags.was_removed_by_transitive_reduction);
        assert!(graph.edges[1].flags.was_removed_by_transitive_reduction);
        // the long path stays
        assert!(!graph.edges[2].flags.was_removed_by_transitive_reduction);
        assert!(!graph.edges[4].flags.was_removed_by_transitive_reduction);
        graph.check_strand_symmetry().unwrap();
    }

    #[test]
    fn low_coverage_edges_are_flagged_unconditionally() {
        let mut graph = graph_from_edges(2, &[(0, 1, 1)]);
        transitive_reduction(&mut graph, &params(1, 8, 3));
        assert!(graph.edges[0].flags.was_removed_by_transitive_reduction);
    }

    #[test]
    fn high_coverage_edges_are_untouched() {
        let mut graph = graph_from_edges(3, &[(0, 1, 9), (0, 2, 9), (2, 1, 9)]);
        transitive_reduction(&mut graph, &params(1, 8, 3));
        for edge in &graph.edges {
            assert!(!edge.flags.was_removed_by_transitive_reduction);
        }
    }

    #[test]
    fn distance_bound_is_respected() {
        // alternative path of length 3 exceeds maxDistance 2
        let mut graph = graph_from_edges(
            4,
            &[(0, 1, 2), (0, 2, 5), (2, 3, 5), (3, 1, 5)],
        );
        transitive_reduction(&mut graph, &params(1, 8, 2));
        assert!(!graph.edges[0].flags.was_removed_by_transitive_reduction);
        transitive_reduction(&mut graph, &params(1, 8, 3));
        assert!(graph.edges[0].flags.was_removed_by_transitive_reduction);
    }

    #[test]
    fn reverse_reduction_flags_short_cycles() {
        let mut graph = graph_from_edges(2, &[(0, 1, 2), (1, 0, 5)]);
        reverse_transitive_reduction(&mut graph, &params(1, 8, 2));
        // A->B has a return path B->A, the weaker edge goes
        assert!(graph.edges[0].flags.was_removed_by_transitive_reduction);
        assert!(!graph.edges[2].flags.was_removed_by_transitive_reduction);
    }
}
