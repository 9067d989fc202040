/// Marker graph simplification module
/// Runs one iteration per entry of the configured maxLength vector.
/// Each iteration recomputes the assembly graph structure, then:
/// 1. bubbles: for parallel segments of at most maxLength marker graph edges
///    sharing both endpoints, keep the chain with the highest average
///    coverage and flag the marker edges of the others
/// 2. superbubbles: cluster assembly vertices connected by short segments;
///    in a cluster with one entry and one exit, keep only the best path
///    between them and flag the remaining short internal segments
/// Also flags low coverage cross edges of the assembly graph:
/// v0 -> v1 with in(v0)=1, out(v0)>1, in(v1)>1, out(v1)=1 and average
/// marker edge coverage at or below the threshold.
/// All flags are applied to edge pairs, keeping the two strands in lock step.

use std::collections::VecDeque;

use fnv::{FnvHashMap, FnvHashSet};
use itertools::Itertools;

use crate::assembly_graph::{create_assembly_graph, AssemblyGraph, SegmentId};
use crate::marker_graph::{MarkerGraph, VertexId};

/// Flag all marker graph edges of a segment (and their mirrors).
fn flag_segment(graph: &mut MarkerGraph, assembly: &AssemblyGraph, segment: SegmentId) {
    for edge in assembly.segments[segment as usize].edges.clone() {
        graph.flag_edge_pair(edge, |flags| flags.is_super_bubble_edge = true);
    }
}

/// Bubble pass: groups of parallel short segments with common endpoints.
fn simplify_bubbles(graph: &mut MarkerGraph, assembly: &AssemblyGraph, max_length: usize) -> usize {
    let mut removed = 0usize;

    // group parallel segments by (source, target)
    let mut by_endpoints: FnvHashMap<(VertexId, VertexId), Vec<SegmentId>> = FnvHashMap::default();
    for (id, segment) in assembly.segments.iter().enumerate() {
        if segment.source != segment.target {
            by_endpoints
                .entry((segment.source, segment.target))
                .or_default()
                .push(id as SegmentId);
        }
    }

    let keys: Vec<(VertexId, VertexId)> = by_endpoints.keys().copied().sorted().collect();
    for key in keys {
        // only chains of at most maxLength edges take part in the bubble;
        // longer parallel chains are left out of the comparison
        let group: Vec<SegmentId> = by_endpoints[&key]
            .iter()
            .copied()
            .filter(|&s| assembly.segments[s as usize].edges.len() <= max_length)
            .collect();
        if group.len() < 2 {
            continue;
        }
        // winner: highest average coverage, ties toward the lower id
        let &winner = group
            .iter()
            .max_by(|&&a, &&b| {
                assembly
                    .average_edge_coverage(graph, a)
                    .partial_cmp(&assembly.average_edge_coverage(graph, b))
                    .unwrap()
                    .then(b.cmp(&a))
            })
            .unwrap();
        for &loser in &group {
            if loser != winner {
                flag_segment(graph, assembly, loser);
                removed += 1;
            }
        }
    }
    removed
}

/// Superbubble pass: clusters of assembly vertices joined by short segments.
fn simplify_superbubbles(
    graph: &mut MarkerGraph,
    assembly: &AssemblyGraph,
    max_length: usize,
) -> usize {
    let mut removed = 0usize;

    let short = |s: SegmentId| assembly.segments[s as usize].edges.len() <= max_length;

    // cluster boundary vertices connected by short segments
    let mut cluster_of: FnvHashMap<VertexId, usize> = FnvHashMap::default();
    let mut clusters: Vec<Vec<VertexId>> = Vec::new();
    let boundary_vertices: Vec<VertexId> = assembly
        .segments
        .iter()
        .flat_map(|s| [s.source, s.target])
        .sorted()
        .dedup()
        .collect();
    for &start in &boundary_vertices {
        if cluster_of.contains_key(&start) {
            continue;
        }
        let cluster_id = clusters.len();
        let mut members: Vec<VertexId> = Vec::new();
        let mut queue: VecDeque<VertexId> = VecDeque::new();
        cluster_of.insert(start, cluster_id);
        queue.push_back(start);
        while let Some(vertex) = queue.pop_front() {
            members.push(vertex);
            for (id, segment) in assembly.segments.iter().enumerate() {
                if !short(id as SegmentId) {
                    continue;
                }
                let neighbor = if segment.source == vertex {
                    segment.target
                } else if segment.target == vertex {
                    segment.source
                } else {
                    continue;
                };
                if !cluster_of.contains_key(&neighbor) {
                    cluster_of.insert(neighbor, cluster_id);
                    queue.push_back(neighbor);
                }
            }
        }
        clusters.push(members);
    }

    for members in &clusters {
        if members.len() < 2 {
            continue;
        }
        let member_set: FnvHashSet<VertexId> = members.iter().copied().collect();

        // internal segments: short, both endpoints inside the cluster
        let internal: Vec<SegmentId> = (0..assembly.segments.len() as SegmentId)
            .filter(|&s| {
                let segment = &assembly.segments[s as usize];
                short(s) && member_set.contains(&segment.source) && member_set.contains(&segment.target)
            })
            .collect();
        if internal.is_empty() {
            continue;
        }

        // an entry has an incoming segment from outside, an exit an outgoing
        // segment to the outside
        let mut entries: Vec<VertexId> = Vec::new();
        let mut exits: Vec<VertexId> = Vec::new();
        for &vertex in members {
            let has_outside_in = assembly.segments.iter().any(|segment| {
                segment.target == vertex && !member_set.contains(&segment.source)
            });
            let has_outside_out = assembly.segments.iter().any(|segment| {
                segment.source == vertex && !member_set.contains(&segment.target)
            });
            if has_outside_in {
                entries.push(vertex);
            }
            if has_outside_out {
                exits.push(vertex);
            }
        }
        if entries.len() != 1 || exits.len() != 1 || entries[0] == exits[0] {
            continue;
        }

        // best path from entry to exit over internal segments, maximizing
        // total coverage; deterministic best-first search
        let best_path =
            match best_internal_path(graph, assembly, &internal, entries[0], exits[0]) {
                Some(path) => path,
                None => continue,
            };
        let keep: FnvHashSet<SegmentId> = best_path.into_iter().collect();
        for &s in &internal {
            if !keep.contains(&s) {
                flag_segment(graph, assembly, s);
                removed += 1;
            }
        }
    }
    removed
}

/// Highest-total-coverage path from entry to exit restricted to the given
/// segments. Plain Dijkstra-style relaxation with deterministic order.
fn best_internal_path(
    graph: &MarkerGraph,
    assembly: &AssemblyGraph,
    internal: &[SegmentId],
    entry: VertexId,
    exit: VertexId,
) -> Option<Vec<SegmentId>> {
    let mut best_score: FnvHashMap<VertexId, f64> = FnvHashMap::default();
    let mut best_parent: FnvHashMap<VertexId, SegmentId> = FnvHashMap::default();
    best_score.insert(entry, 0.0);

    // relax repeatedly; cluster sizes are small so a Bellman-Ford style
    // sweep in segment id order is plenty and fully deterministic
    for _ in 0..internal.len() + 1 {
        let mut changed = false;
        for &s in internal {
            let segment = &assembly.segments[s as usize];
            if let Some(&score) = best_score.get(&segment.source) {
                let candidate = score + assembly.average_edge_coverage(graph, s);
                let current = best_score.get(&segment.target).copied();
                if current.is_none() || candidate > current.unwrap() {
                    best_score.insert(segment.target, candidate);
                    best_parent.insert(segment.target, s);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    best_score.get(&exit)?;
    // reconstruct
    let mut path: Vec<SegmentId> = Vec::new();
    let mut vertex = exit;
    while vertex != entry {
        let &s = best_parent.get(&vertex)?;
        path.push(s);
        vertex = assembly.segments[s as usize].source;
        if path.len() > internal.len() {
            return None;
        }
    }
    path.reverse();
    Some(path)
}

/// Run the configured simplification iterations. The assembly graph is
/// recomputed from the surviving marker graph between iterations.
pub fn simplify_marker_graph(graph: &mut MarkerGraph, max_lengths: &[usize]) {
    for (iteration, &max_length) in max_lengths.iter().enumerate() {
        let assembly = create_assembly_graph(graph);
        let bubbles = simplify_bubbles(graph, &assembly, max_length);

        let assembly = create_assembly_graph(graph);
        let superbubbles = simplify_superbubbles(graph, &assembly, max_length);

        log::info!(
            "Simplify iteration {} (maxLength {}): removed {} bubble and {} superbubble branches",
            iteration + 1,
            max_length,
            bubbles,
            superbubbles
        );
    }
}

/// Flag low coverage cross edges of the assembly graph and their underlying
/// marker graph edges.
pub fn remove_low_coverage_cross_edges(graph: &mut MarkerGraph, coverage_threshold: f64) {
    let assembly = create_assembly_graph(graph);
    let mut removed = 0usize;
    for s in 0..assembly.segment_count() as SegmentId {
        let segment = &assembly.segments[s as usize];
        // cross edge shape on the assembly graph
        let v0 = segment.source;
        let v1 = segment.target;
        let v0_in = assembly
            .segments
            .iter()
            .filter(|other| other.target == v0)
            .count();
        let v0_out = assembly
            .segments
            .iter()
            .filter(|other| other.source == v0)
            .count();
        let v1_in = assembly
            .segments
            .iter()
            .filter(|other| other.target == v1)
            .count();
        let v1_out = assembly
            .segments
            .iter()
            .filter(|other| other.source == v1)
            .count();
        if !(v0_in == 1 && v0_out > 1 && v1_in > 1 && v1_out == 1) {
            continue;
        }
        if assembly.average_edge_coverage(graph, s) <= coverage_threshold {
            for edge in assembly.segments[s as usize].edges.clone() {
                graph.flag_edge_pair(edge, |flags| flags.is_low_coverage_cross_edge = true);
            }
            removed += 1;
        }
    }
    log::info!("Flagged {} low coverage cross edges", removed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::graph_from_edges;

    #[test]
    fn weaker_bubble_branch_is_removed() {
        // 0 -> {1a: via 1, 1b: via 2} -> 3, branch through 1 better supported
        let edges = [
            (0u64, 1u64, 8usize),
            (1, 3, 8),
            (0, 2, 2),
            (2, 3, 2),
            (4, 0, 8),
            (3, 5, 8),
        ];
        let mut graph = graph_from_edges(6, &edges);
        simplify_marker_graph(&mut graph, &[3]);
        // the weak branch is flagged
        assert!(graph.edges[4].flags.is_super_bubble_edge);
        assert!(graph.edges[6].flags.is_super_bubble_edge);
        // the strong branch and the flanks survive
        assert!(!graph.edges[0].flags.is_super_bubble_edge);
        assert!(!graph.edges[2].flags.is_super_bubble_edge);
        assert!(!graph.edges[8].flags.is_super_bubble_edge);
        assert!(!graph.edges[10].flags.is_super_bubble_edge);
        graph.check_strand_symmetry().unwrap();
    }

    #[test]
    fn long_bubble_branches_are_left_alone() {
        let edges = [
            (0u64, 1u64, 8usize),
            (1, 3, 8),
            (0, 2, 2),
            (2, 3, 2),
            (4, 0, 8),
            (3, 5, 8),
        ];
        let mut graph = graph_from_edges(6, &edges);
        // branches are 2 edges long, larger than maxLength 1
        simplify_marker_graph(&mut graph, &[1]);
        for edge in &graph.edges {
            assert!(!edge.flags.is_super_bubble_edge);
        }
    }

    #[test]
    fn cross_edge_is_flagged() {
        // two parallel strong paths sharing a weak cross connection:
        // a0 -> x -> a1 and b0 -> y -> b1, cross x -> y
        // abstract ids: a0=0, x=1, a1=2, b0=3, y=4, b1=5
        let edges = [
            (0u64, 1u64, 9usize),
            (1, 2, 9),
            (3, 4, 9),
            (4, 5, 9),
            (1, 4, 1),
        ];
        let mut graph = graph_from_edges(6, &edges);
        remove_low_coverage_cross_edges(&mut graph, 2.0);
        assert!(graph.edges[8].flags.is_low_coverage_cross_edge);
        assert!(graph.edges[9].flags.is_low_coverage_cross_edge);
        for edge_id in 0..8 {
            assert!(!graph.edges[edge_id].flags.is_low_coverage_cross_edge);
        }
    }
}
