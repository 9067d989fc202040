/// Read graph module
/// An undirected graph over oriented reads whose edges are kept alignments.
/// Edges are created in reverse-complement pairs (ids 2i and 2i+1), so the
/// graph always contains the mirror image of every edge.
/// Post-processing passes set advisory flags honored downstream:
/// chimeric reads, cross-strand edges, inconsistent alignments, bridges,
/// and small connected components.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::alignments::{AlignmentId, AlignmentStore};
use crate::error::{AssemblyError, Result};
use crate::reads::{OrientedReadId, ReadStore};

pub type ReadGraphEdgeId = u32;

#[derive(Copy, Clone, Default, Serialize, Deserialize)]
pub struct ReadGraphEdgeFlags {
    pub is_cross_strand: bool,
    pub is_inconsistent: bool,
    pub is_bridge: bool,
}

#[derive(Copy, Clone, Serialize, Deserialize)]
pub struct ReadGraphEdge {
    pub alignment_id: AlignmentId,
    pub oriented0: OrientedReadId,
    pub oriented1: OrientedReadId,
    pub flags: ReadGraphEdgeFlags,
}

impl ReadGraphEdge {
    pub fn other(&self, oriented: OrientedReadId) -> OrientedReadId {
        if oriented == self.oriented0 {
            self.oriented1
        } else {
            self.oriented0
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ReadGraphCreationMethod {
    BestAlignments,
    PseudoPathFiltered,
}

impl ReadGraphCreationMethod {
    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            0 => Ok(ReadGraphCreationMethod::BestAlignments),
            2 => Ok(ReadGraphCreationMethod::PseudoPathFiltered),
            other => Err(AssemblyError::config(format!(
                "readGraph.creationMethod {} is not one of 0,2",
                other
            ))),
        }
    }
}

#[derive(Default, Serialize, Deserialize)]
pub struct ReadGraph {
    pub edges: Vec<ReadGraphEdge>,
    /// connectivity[orientedReadId.index()]: incident edge ids.
    pub connectivity: Vec<Vec<ReadGraphEdgeId>>,
}

impl ReadGraph {
    pub fn new(oriented_read_count: usize) -> Self {
        ReadGraph {
            edges: Vec::new(),
            connectivity: vec![Vec::new(); oriented_read_count],
        }
    }

    /// Rebuild a graph from persisted edges.
    pub fn from_edges(edges: Vec<ReadGraphEdge>, oriented_read_count: usize) -> Self {
        let mut graph = ReadGraph::new(oriented_read_count);
        for (edge_id, edge) in edges.iter().enumerate() {
            graph.connectivity[edge.oriented0.index()].push(edge_id as ReadGraphEdgeId);
            graph.connectivity[edge.oriented1.index()].push(edge_id as ReadGraphEdgeId);
        }
        graph.edges = edges;
        graph
    }

    /// The reverse complement of an edge is always its pair neighbor.
    pub fn reverse_complement_edge(edge_id: ReadGraphEdgeId) -> ReadGraphEdgeId {
        edge_id ^ 1
    }

    /// Add the edge for one alignment together with its mirror image.
    fn add_edge_pair(&mut self, alignment_id: AlignmentId, store: &AlignmentStore) {
        let data = &store.data[alignment_id as usize];
        let (oriented0, oriented1) = data.oriented_reads();

        let id0 = self.edges.len() as ReadGraphEdgeId;
        self.edges.push(ReadGraphEdge {
            alignment_id,
            oriented0,
            oriented1,
            flags: ReadGraphEdgeFlags::default(),
        });
        self.connectivity[oriented0.index()].push(id0);
        self.connectivity[oriented1.index()].push(id0);

        let id1 = self.edges.len() as ReadGraphEdgeId;
        self.edges.push(ReadGraphEdge {
            alignment_id,
            oriented0: oriented0.reverse_complement(),
            oriented1: oriented1.reverse_complement(),
            flags: ReadGraphEdgeFlags::default(),
        });
        self.connectivity[oriented0.reverse_complement().index()].push(id1);
        self.connectivity[oriented1.reverse_complement().index()].push(id1);
    }

    pub fn degree(&self, oriented: OrientedReadId) -> usize {
        self.connectivity[oriented.index()].len()
    }

    fn neighbors(&self, oriented: OrientedReadId) -> impl Iterator<Item = (ReadGraphEdgeId, OrientedReadId)> + '_ {
        self.connectivity[oriented.index()]
            .iter()
            .map(move |&edge_id| (edge_id, self.edges[edge_id as usize].other(oriented)))
    }

    /// Limited BFS, returns (oriented read, distance) pairs, start included.
    fn bfs(&self, start: OrientedReadId, max_distance: u32) -> Vec<(OrientedReadId, u32)> {
        let mut distance: fnv::FnvHashMap<OrientedReadId, u32> = fnv::FnvHashMap::default();
        let mut queue: VecDeque<OrientedReadId> = VecDeque::new();
        distance.insert(start, 0);
        queue.push_back(start);
        let mut visited: Vec<(OrientedReadId, u32)> = vec![(start, 0)];
        while let Some(current) = queue.pop_front() {
            let d = distance[&current];
            if d >= max_distance {
                continue;
            }
            for (_, neighbor) in self.neighbors(current) {
                if !distance.contains_key(&neighbor) {
                    distance.insert(neighbor, d + 1);
                    visited.push((neighbor, d + 1));
                    queue.push_back(neighbor);
                }
            }
        }
        visited
    }
}

/// Create the read graph: every read nominates its best maxAlignmentCount
/// alignments by aligned marker count; an alignment kept by either endpoint
/// becomes an edge pair.
pub fn create_read_graph(
    store: &AlignmentStore,
    read_count: usize,
    max_alignment_count: usize,
) -> ReadGraph {
    let mut keep = vec![false; store.alignment_count()];

    for read_id in 0..read_count as u32 {
        let table = &store.table[OrientedReadId::new(read_id, 0).index()];
        let mut ids: Vec<AlignmentId> = table.clone();
        // best first: most aligned markers, ties toward the lower id
        ids.sort_by_key(|&id| {
            (
                std::cmp::Reverse(store.data[id as usize].info.marker_count),
                id,
            )
        });
        for &id in ids.iter().take(max_alignment_count) {
            keep[id as usize] = true;
        }
    }

    let oriented_read_count = read_count * 2;
    let mut graph = ReadGraph::new(oriented_read_count);
    for (alignment_id, &kept) in keep.iter().enumerate() {
        if kept {
            graph.add_edge_pair(alignment_id as AlignmentId, store);
        }
    }

    log::info!(
        "Read graph has {} edges ({} alignments kept)",
        graph.edges.len(),
        graph.edges.len() / 2
    );
    graph
}

/// Recreate the read graph keeping only an explicit alignment subset.
/// Used by creation method 2 after pseudo-path filtering.
pub fn create_read_graph_from_kept(
    store: &AlignmentStore,
    read_count: usize,
    keep: &[bool],
) -> ReadGraph {
    let mut graph = ReadGraph::new(read_count * 2);
    for (alignment_id, &kept) in keep.iter().enumerate() {
        if kept {
            graph.add_edge_pair(alignment_id as AlignmentId, store);
        }
    }
    log::info!(
        "Read graph (pseudo-path filtered) has {} edges",
        graph.edges.len()
    );
    graph
}

/// Flag chimeric reads: a read is chimeric when removing its oriented read
/// disconnects its direct neighbors within a limited BFS ball.
pub fn flag_chimeric_reads(graph: &ReadGraph, reads: &mut ReadStore, max_distance: u32) {
    let chimeric: Vec<bool> = (0..reads.read_count() as u32)
        .into_par_iter()
        .map(|read_id| {
            let center = OrientedReadId::new(read_id, 0);
            let neighbors: Vec<OrientedReadId> =
                graph.neighbors(center).map(|(_, n)| n).collect();
            if neighbors.len() < 2 {
                return false;
            }

            // BFS ball around the first neighbor, never expanding through center
            let mut reached: fnv::FnvHashSet<OrientedReadId> = fnv::FnvHashSet::default();
            let mut queue: VecDeque<(OrientedReadId, u32)> = VecDeque::new();
            reached.insert(neighbors[0]);
            queue.push_back((neighbors[0], 0));
            while let Some((current, d)) = queue.pop_front() {
                if d >= max_distance {
                    continue;
                }
                for (_, next) in graph.neighbors(current) {
                    if next == center {
                        continue;
                    }
                    if reached.insert(next) {
                        queue.push_back((next, d + 1));
                    }
                }
            }

            // chimeric if some neighbor is unreachable without the center
            neighbors.iter().any(|n| !reached.contains(n))
        })
        .collect();

    let mut count = 0usize;
    for (read_id, is_chimeric) in chimeric.into_iter().enumerate() {
        if is_chimeric {
            reads.flags[read_id].is_chimeric = true;
            count += 1;
        }
    }
    log::info!("Flagged {} chimeric reads", count);
}

/// Flag cross-strand edges: both endpoints lie within crossStrandMaxDistance
/// of their own reverse complement.
pub fn flag_cross_strand_edges(graph: &mut ReadGraph, max_distance: u32) {
    let oriented_read_count = graph.connectivity.len();
    let near_rc: Vec<bool> = (0..oriented_read_count as u32)
        .into_par_iter()
        .map(|value| {
            let start = OrientedReadId::from_value(value);
            let target = start.reverse_complement();
            graph
                .bfs(start, max_distance)
                .iter()
                .any(|&(reached, _)| reached == target)
        })
        .collect();

    let mut count = 0usize;
    for edge_id in 0..graph.edges.len() {
        let edge = graph.edges[edge_id];
        if near_rc[edge.oriented0.index()] && near_rc[edge.oriented1.index()] {
            graph.edges[edge_id].flags.is_cross_strand = true;
            count += 1;
        }
    }
    log::info!("Flagged {} cross-strand read graph edges", count);
}

/// Base offset estimate of an edge: how far the start of oriented0 sits
/// ahead of the start of oriented1, from the aligned ordinal midpoints.
fn edge_offset(graph: &ReadGraph, store: &AlignmentStore, index: &crate::markers::MarkerIndex, edge_id: usize) -> f64 {
    let edge = &graph.edges[edge_id];
    let data = &store.data[edge.alignment_id as usize];
    let info = data.info_for(edge.oriented0);
    let mid0_first = index.marker(edge.oriented0, info.first_ordinals[0]).position as f64;
    let mid0_last = index.marker(edge.oriented0, info.last_ordinals[0]).position as f64;
    let mid1_first = index.marker(edge.oriented1, info.first_ordinals[1]).position as f64;
    let mid1_last = index.marker(edge.oriented1, info.last_ordinals[1]).position as f64;
    (mid1_first + mid1_last) / 2.0 - (mid0_first + mid0_last) / 2.0
}

/// Flag inconsistent alignments using triangle residuals plus a
/// per-component least squares fit of read offsets (Gauss-Seidel sweeps).
/// An edge is flagged when both residuals exceed their thresholds.
pub fn flag_inconsistent_alignments(
    graph: &mut ReadGraph,
    store: &AlignmentStore,
    index: &crate::markers::MarkerIndex,
    triangle_error_threshold: f64,
    least_square_error_threshold: f64,
    max_distance: u32,
) {
    let edge_count = graph.edges.len();
    let offsets: Vec<f64> = (0..edge_count)
        .map(|edge_id| edge_offset(graph, store, index, edge_id))
        .collect();

    // triangle residuals: for each edge (a,b), the best residual over
    // common neighbors c of the cycle a -> b -> c -> a
    let triangle_residual: Vec<f64> = (0..edge_count)
        .into_par_iter()
        .map(|edge_id| {
            let edge = &graph.edges[edge_id];
            let a = edge.oriented0;
            let b = edge.oriented1;
            // signed offset of position(b) - position(a)
            let d_ab = offsets[edge_id];
            let mut best = f64::INFINITY;
            for (edge_ac, c) in graph.neighbors(a) {
                if c == b {
                    continue;
                }
                let e_ac = &graph.edges[edge_ac as usize];
                let d_ac = if e_ac.oriented0 == a {
                    offsets[edge_ac as usize]
                } else {
                    -offsets[edge_ac as usize]
                };
                for (edge_bc, c2) in graph.neighbors(b) {
                    if c2 != c {
                        continue;
                    }
                    let e_bc = &graph.edges[edge_bc as usize];
                    let d_bc = if e_bc.oriented0 == b {
                        offsets[edge_bc as usize]
                    } else {
                        -offsets[edge_bc as usize]
                    };
                    // consistent triangle: d_ab + d_bc == d_ac
                    let residual = (d_ab + d_bc - d_ac).abs();
                    best = best.min(residual);
                }
            }
            best
        })
        .collect();

    // least squares positions per connected component, bounded diameter
    let oriented_read_count = graph.connectivity.len();
    let mut position = vec![0.0f64; oriented_read_count];
    let mut component = vec![usize::MAX; oriented_read_count];
    let mut next_component = 0usize;
    for start_value in 0..oriented_read_count as u32 {
        let start = OrientedReadId::from_value(start_value);
        if component[start.index()] != usize::MAX || graph.degree(start) == 0 {
            continue;
        }
        let ball = graph.bfs(start, max_distance);
        let members: Vec<OrientedReadId> = ball
            .iter()
            .filter(|&&(v, _)| component[v.index()] == usize::MAX)
            .map(|&(v, _)| v)
            .collect();
        for &member in &members {
            component[member.index()] = next_component;
            position[member.index()] = 0.0;
        }
        // Gauss-Seidel sweeps in id order, deterministic
        for _ in 0..20 {
            for &v in &members {
                let mut sum = 0.0;
                let mut n = 0usize;
                for (edge_id, u) in graph.neighbors(v) {
                    if component[u.index()] != next_component {
                        continue;
                    }
                    let edge = &graph.edges[edge_id as usize];
                    // d = position(v) - position(u) according to this edge
                    let d = if edge.oriented0 == v {
                        offsets[edge_id as usize]
                    } else {
                        -offsets[edge_id as usize]
                    };
                    sum += position[u.index()] + d;
                    n += 1;
                }
                if n > 0 {
                    position[v.index()] = sum / n as f64;
                }
            }
        }
        next_component += 1;
    }

    let mut count = 0usize;
    for edge_id in 0..edge_count {
        let edge = graph.edges[edge_id];
        let same_component =
            component[edge.oriented0.index()] == component[edge.oriented1.index()];
        let ls_residual = if same_component {
            (position[edge.oriented0.index()] - position[edge.oriented1.index()]
                - offsets[edge_id])
                .abs()
        } else {
            f64::INFINITY
        };
        if triangle_residual[edge_id] > triangle_error_threshold
            && ls_residual > least_square_error_threshold
        {
            graph.edges[edge_id].flags.is_inconsistent = true;
            count += 1;
        }
    }
    log::info!("Flagged {} inconsistent alignments", count);
}

/// Flag bridges: edges whose removal locally disconnects their endpoints.
pub fn flag_bridges(graph: &mut ReadGraph, max_distance: u32) {
    let bridge: Vec<bool> = (0..graph.edges.len())
        .into_par_iter()
        .map(|edge_id| {
            let edge = &graph.edges[edge_id];
            let start = edge.oriented0;
            let target = edge.oriented1;
            let mut reached: fnv::FnvHashSet<OrientedReadId> = fnv::FnvHashSet::default();
            let mut queue: VecDeque<(OrientedReadId, u32)> = VecDeque::new();
            reached.insert(start);
            queue.push_back((start, 0));
            while let Some((current, d)) = queue.pop_front() {
                if d >= max_distance {
                    continue;
                }
                for (e, next) in graph.neighbors(current) {
                    if e as usize == edge_id {
                        continue;
                    }
                    if next == target {
                        return false;
                    }
                    if reached.insert(next) {
                        queue.push_back((next, d + 1));
                    }
                }
            }
            true
        })
        .collect();

    let mut count = 0usize;
    for (edge_id, is_bridge) in bridge.into_iter().enumerate() {
        if is_bridge {
            graph.edges[edge_id].flags.is_bridge = true;
            count += 1;
        }
    }
    log::info!("Flagged {} bridge edges", count);
}

/// Exclude whole components smaller than minComponentSize reads.
pub fn mark_small_components(graph: &ReadGraph, reads: &mut ReadStore, min_component_size: usize) {
    let oriented_read_count = graph.connectivity.len();
    let mut visited = vec![false; oriented_read_count];
    let mut excluded_reads = 0usize;

    for start_value in 0..oriented_read_count as u32 {
        let start = OrientedReadId::from_value(start_value);
        if visited[start.index()] {
            continue;
        }
        // collect the whole weakly connected component with a stack walk
        let mut component: Vec<OrientedReadId> = Vec::new();
        let mut stack = vec![start];
        visited[start.index()] = true;
        while let Some(current) = stack.pop() {
            component.push(current);
            for (_, neighbor) in graph.neighbors(current) {
                if !visited[neighbor.index()] {
                    visited[neighbor.index()] = true;
                    stack.push(neighbor);
                }
            }
        }
        if component.len() < min_component_size {
            for oriented in component {
                if !reads.flags[oriented.read_id() as usize].is_in_small_component {
                    reads.flags[oriented.read_id() as usize].is_in_small_component = true;
                    excluded_reads += 1;
                }
            }
        }
    }
    log::info!("Excluded {} reads in small components", excluded_reads);
}

/// An edge participates in marker graph construction only when no advisory
/// flag disqualifies it or its reads. Bridges are additionally excluded
/// under the strict strand separation method.
pub fn is_edge_usable(edge: &ReadGraphEdge, reads: &ReadStore, exclude_bridges: bool) -> bool {
    if edge.flags.is_cross_strand || edge.flags.is_inconsistent {
        return false;
    }
    if exclude_bridges && edge.flags.is_bridge {
        return false;
    }
    for oriented in [edge.oriented0, edge.oriented1] {
        let flags = &reads.flags[oriented.read_id() as usize];
        if flags.is_chimeric || flags.is_in_small_component {
            return false;
        }
    }
    true
}

/// Local subgraph for interactive inspection, with a wall-clock timeout.
pub struct LocalReadGraph {
    pub vertices: Vec<(OrientedReadId, u32)>,
    pub edges: Vec<(OrientedReadId, OrientedReadId)>,
}

impl ReadGraph {
    pub fn extract_local_subgraph(
        &self,
        start: OrientedReadId,
        max_distance: u32,
        timeout: Duration,
    ) -> Result<LocalReadGraph> {
        let begin = Instant::now();
        let mut local = LocalReadGraph {
            vertices: Vec::new(),
            edges: Vec::new(),
        };
        let mut distance: fnv::FnvHashMap<OrientedReadId, u32> = fnv::FnvHashMap::default();
        let mut queue: VecDeque<OrientedReadId> = VecDeque::new();
        distance.insert(start, 0);
        local.vertices.push((start, 0));
        queue.push_back(start);
        while let Some(current) = queue.pop_front() {
            if begin.elapsed() > timeout {
                // partial output is cleared on expiry
                return Err(AssemblyError::Timeout);
            }
            let d = distance[&current];
            if d >= max_distance {
                continue;
            }
            for (_, neighbor) in self.neighbors(current) {
                if !distance.contains_key(&neighbor) {
                    distance.insert(neighbor, d + 1);
                    local.vertices.push((neighbor, d + 1));
                    queue.push_back(neighbor);
                }
            }
        }
        for (edge_id, edge) in self.edges.iter().enumerate() {
            // emit each undirected edge once, from its even representative
            if edge_id % 2 == 0
                && distance.contains_key(&edge.oriented0)
                && distance.contains_key(&edge.oriented1)
            {
                local.edges.push((edge.oriented0, edge.oriented1));
            }
        }
        Ok(local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::AlignmentInfo;
    use crate::alignments::AlignmentData;

    fn dummy_info() -> AlignmentInfo {
        AlignmentInfo {
            marker_count: 10,
            first_ordinals: [0, 0],
            last_ordinals: [9, 9],
            total_counts: [10, 10],
            max_skip: 0,
            max_drift: 0,
        }
    }

    fn store_with_pairs(pairs: &[(u32, u32)], read_count: usize) -> AlignmentStore {
        let mut store = AlignmentStore {
            data: Vec::new(),
            compressed: Vec::new(),
            table: vec![Vec::new(); read_count * 2],
        };
        for &(r0, r1) in pairs {
            let id = store.data.len() as AlignmentId;
            store.data.push(AlignmentData {
                read_id0: r0.min(r1),
                read_id1: r0.max(r1),
                is_same_strand: true,
                info: dummy_info(),
            });
            store.compressed.push(Vec::new());
            for strand in 0..2 {
                store.table[OrientedReadId::new(r0, strand).index()].push(id);
                store.table[OrientedReadId::new(r1, strand).index()].push(id);
            }
        }
        store
    }

    #[test]
    fn edges_come_in_reverse_complement_pairs() {
        let store = store_with_pairs(&[(0, 1), (1, 2)], 3);
        let graph = create_read_graph(&store, 3, 10);
        assert_eq!(graph.edges.len(), 4);
        for edge_id in (0..graph.edges.len()).step_by(2) {
            let edge = &graph.edges[edge_id];
            let mirror = &graph.edges[ReadGraph::reverse_complement_edge(edge_id as u32) as usize];
            assert_eq!(mirror.oriented0, edge.oriented0.reverse_complement());
            assert_eq!(mirror.oriented1, edge.oriented1.reverse_complement());
            assert_eq!(mirror.alignment_id, edge.alignment_id);
        }
    }

    #[test]
    fn chimeric_read_is_flagged() {
        // two triangles {0,1,2} and {3,4,5} joined only through read 6
        let pairs = [
            (0, 1),
            (1, 2),
            (0, 2),
            (3, 4),
            (4, 5),
            (3, 5),
            (1, 6),
            (4, 6),
        ];
        let store = store_with_pairs(&pairs, 7);
        let graph = create_read_graph(&store, 7, 10);
        let mut reads = ReadStore::new();
        for i in 0..7 {
            // sequences unused by this pass, any valid read works
            reads.add_read(&format!("r{}", i), b"AAGGTTCACCAGTGGA", 1).unwrap();
        }
        flag_chimeric_reads(&graph, &mut reads, 4);
        assert!(reads.flags[6].is_chimeric);
        // reads inside a triangle keep their neighborhood connected
        assert!(!reads.flags[0].is_chimeric);
        assert!(!reads.flags[2].is_chimeric);
    }

    #[test]
    fn bridge_edge_is_flagged() {
        // a bridge between two triangles
        let pairs = [(0, 1), (1, 2), (0, 2), (3, 4), (4, 5), (3, 5), (2, 3)];
        let store = store_with_pairs(&pairs, 6);
        let mut graph = create_read_graph(&store, 6, 10);
        flag_bridges(&mut graph, 5);
        for edge_id in 0..graph.edges.len() {
            let edge = &graph.edges[edge_id];
            let is_2_3 = edge.oriented0.read_id().min(edge.oriented1.read_id()) == 2
                && edge.oriented0.read_id().max(edge.oriented1.read_id()) == 3;
            assert_eq!(edge.flags.is_bridge, is_2_3, "edge {}", edge_id);
        }
    }

    #[test]
    fn small_components_are_marked() {
        let pairs = [(0, 1), (1, 2), (0, 2), (3, 4)];
        let store = store_with_pairs(&pairs, 5);
        let graph = create_read_graph(&store, 5, 10);
        let mut reads = ReadStore::new();
        for i in 0..5 {
            reads.add_read(&format!("r{}", i), b"AAGGTTCACCAGTGGA", 1).unwrap();
        }
        mark_small_components(&graph, &mut reads, 3);
        assert!(!reads.flags[0].is_in_small_component);
        assert!(reads.flags[3].is_in_small_component);
        assert!(reads.flags[4].is_in_small_component);
    }

    #[test]
    fn local_subgraph_respects_distance() {
        let pairs = [(0, 1), (1, 2), (2, 3), (3, 4)];
        let store = store_with_pairs(&pairs, 5);
        let graph = create_read_graph(&store, 5, 10);
        let local = graph
            .extract_local_subgraph(OrientedReadId::new(0, 0), 2, Duration::from_secs(10))
            .unwrap();
        let ids: Vec<u32> = local.vertices.iter().map(|&(v, _)| v.read_id()).collect();
        assert!(ids.contains(&0) && ids.contains(&1) && ids.contains(&2));
        assert!(!ids.contains(&3));
    }
}
