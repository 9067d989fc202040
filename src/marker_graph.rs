/// Marker graph module
/// Vertices are equivalence classes of marker occurrences under the
/// union-find induced by kept alignments; edges connect vertices holding
/// consecutive surviving markers of some oriented read.
/// Vertex construction:
/// 1. union the two MarkerIds of every matched ordinal pair of every usable
///    read graph edge (and of its mirror image, keeping the partition strand symmetric)
/// 2. find the representative of every MarkerId once, group markers by representative
/// 3. drop groups failing the coverage, per-strand coverage, or duplicate-marker filters,
///    eliminate self-complementary groups
/// 4. assign dense VertexIds in canonical order, a vertex and its reverse
///    complement always receive consecutive ids
/// Edge construction walks each oriented read's surviving markers in order and
/// groups the resulting marker intervals by (source, target) with a parallel sort.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::alignments::AlignmentStore;
use crate::disjoint_sets::DisjointSets;
use crate::error::{AssemblyError, Result};
use crate::markers::{MarkerId, MarkerIndex};
use crate::reads::{OrientedReadId, ReadStore};
use crate::read_graph::{is_edge_usable, ReadGraph};
use crate::stats::{find_coverage_peak, Histogram};

pub type VertexId = u64;
pub type EdgeId = u64;
pub const INVALID_VERTEX: VertexId = u64::MAX;

/// One supporting occurrence of an edge: an oriented read whose markers at
/// ordinals[0] and ordinals[1] sit in the source and target vertex, with no
/// surviving marker between them.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct MarkerInterval {
    pub oriented_read_id: OrientedReadId,
    pub ordinals: [u32; 2],
}

#[derive(Copy, Clone, Default, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct MarkerGraphEdgeFlags {
    pub was_removed_by_transitive_reduction: bool,
    pub was_pruned: bool,
    pub is_super_bubble_edge: bool,
    pub is_low_coverage_cross_edge: bool,
    pub was_assembled: bool,
}

impl MarkerGraphEdgeFlags {
    /// An edge is out of the surviving subgraph when any removal flag is set.
    pub fn is_removed(&self) -> bool {
        self.was_removed_by_transitive_reduction
            || self.was_pruned
            || self.is_super_bubble_edge
            || self.is_low_coverage_cross_edge
    }
}

#[derive(Copy, Clone, Serialize, Deserialize)]
pub struct MarkerGraphEdge {
    pub source: VertexId,
    pub target: VertexId,
    pub flags: MarkerGraphEdgeFlags,
}

#[derive(Default, Serialize, Deserialize)]
pub struct MarkerGraph {
    /// vertices[v]: the MarkerIds of the vertex, sorted.
    pub vertices: Vec<Vec<MarkerId>>,
    /// vertexTable[markerId]: the vertex holding this marker, or INVALID_VERTEX.
    pub vertex_table: Vec<VertexId>,
    pub reverse_complement_vertex: Vec<VertexId>,
    pub edges: Vec<MarkerGraphEdge>,
    /// edgeMarkerIntervals[e]: supporting intervals, sorted by (read, ordinal).
    pub edge_marker_intervals: Vec<Vec<MarkerInterval>>,
    pub reverse_complement_edge: Vec<EdgeId>,
    pub edges_by_source: Vec<Vec<EdgeId>>,
    pub edges_by_target: Vec<Vec<EdgeId>>,
    /// Counters reported in the run summary.
    pub bad_vertex_count: u64,
    pub self_complementary_vertex_count: u64,
}

/// Vertex construction parameters. min_coverage = 0 requests automatic
/// selection from the coverage histogram peak.
pub struct VertexFilterParams {
    pub min_coverage: usize,
    pub max_coverage: usize,
    pub min_coverage_per_strand: usize,
    pub allow_duplicate_markers: bool,
    pub split_bad_vertices: bool,
    pub delete_bad_vertices: bool,
    pub exclude_bridge_edges: bool,
    pub peak_finder_min_area_fraction: f64,
    pub peak_finder_start: usize,
}

impl MarkerGraph {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn vertex_coverage(&self, vertex: VertexId) -> usize {
        self.vertices[vertex as usize].len()
    }

    pub fn edge_coverage(&self, edge: EdgeId) -> usize {
        self.edge_marker_intervals[edge as usize].len()
    }

    /// The vertex of a marker occurrence, or INVALID_VERTEX.
    pub fn vertex_of(&self, index: &MarkerIndex, oriented: OrientedReadId, ordinal: u32) -> VertexId {
        self.vertex_table[index.get_marker_id(oriented, ordinal) as usize]
    }

    pub fn out_degree(&self, vertex: VertexId) -> usize {
        self.edges_by_source[vertex as usize]
            .iter()
            .filter(|&&e| !self.edges[e as usize].flags.is_removed())
            .count()
    }

    pub fn in_degree(&self, vertex: VertexId) -> usize {
        self.edges_by_target[vertex as usize]
            .iter()
            .filter(|&&e| !self.edges[e as usize].flags.is_removed())
            .count()
    }

    pub fn surviving_out_edges(&self, vertex: VertexId) -> Vec<EdgeId> {
        self.edges_by_source[vertex as usize]
            .iter()
            .copied()
            .filter(|&e| !self.edges[e as usize].flags.is_removed())
            .collect()
    }

    pub fn surviving_in_edges(&self, vertex: VertexId) -> Vec<EdgeId> {
        self.edges_by_target[vertex as usize]
            .iter()
            .copied()
            .filter(|&e| !self.edges[e as usize].flags.is_removed())
            .collect()
    }

    /// Flag an edge and its reverse complement together. Every structural
    /// operation must go through here to keep the two strands in lock step.
    pub fn flag_edge_pair(&mut self, edge: EdgeId, set: impl Fn(&mut MarkerGraphEdgeFlags)) {
        let rc = self.reverse_complement_edge[edge as usize];
        set(&mut self.edges[edge as usize].flags);
        set(&mut self.edges[rc as usize].flags);
    }

    /// Strand symmetry invariants, checked after construction and after
    /// every cleanup pass in debug-level runs.
    pub fn check_strand_symmetry(&self) -> Result<()> {
        for v in 0..self.vertex_count() as VertexId {
            let rc = self.reverse_complement_vertex[v as usize];
            if rc == v {
                return Err(AssemblyError::invariant(format!(
                    "marker graph vertex {} is its own reverse complement",
                    v
                )));
            }
            if self.reverse_complement_vertex[rc as usize] != v {
                return Err(AssemblyError::invariant(format!(
                    "reverse complement pairing broken at vertex {}",
                    v
                )));
            }
            if self.vertex_coverage(v) != self.vertex_coverage(rc) {
                return Err(AssemblyError::invariant(format!(
                    "vertex {} and its reverse complement differ in coverage",
                    v
                )));
            }
        }
        for e in 0..self.edge_count() as EdgeId {
            let rc = self.reverse_complement_edge[e as usize];
            if self.reverse_complement_edge[rc as usize] != e {
                return Err(AssemblyError::invariant(format!(
                    "reverse complement pairing broken at edge {}",
                    e
                )));
            }
            if self.edge_coverage(e) != self.edge_coverage(rc) {
                return Err(AssemblyError::invariant(format!(
                    "edge {} and its reverse complement differ in coverage",
                    e
                )));
            }
            if self.edges[e as usize].flags != self.edges[rc as usize].flags {
                return Err(AssemblyError::invariant(format!(
                    "edge {} and its reverse complement differ in flags",
                    e
                )));
            }
        }
        Ok(())
    }
}

/// Mirror a sorted marker list to the opposite strand.
fn mirror_markers(index: &MarkerIndex, markers: &[MarkerId]) -> Vec<MarkerId> {
    let mut mirrored: Vec<MarkerId> = markers
        .iter()
        .map(|&m| index.reverse_complement_marker_id(m))
        .collect();
    mirrored.sort_unstable();
    mirrored
}

/// Split a group containing duplicate markers: every oriented read keeps the
/// occurrence closest to the mean position of the unambiguous occurrences,
/// the rest go to a leftover group.
fn split_duplicates(index: &MarkerIndex, markers: &[MarkerId]) -> (Vec<MarkerId>, Vec<MarkerId>) {
    let located: Vec<(OrientedReadId, u32, MarkerId)> = markers
        .iter()
        .map(|&m| {
            let (oriented, ordinal) = index.find_marker_id(m);
            (oriented, ordinal, m)
        })
        .collect();

    let mut by_read: fnv::FnvHashMap<OrientedReadId, Vec<(u32, MarkerId)>> =
        fnv::FnvHashMap::default();
    for &(oriented, ordinal, m) in &located {
        by_read.entry(oriented).or_default().push((ordinal, m));
    }

    let unique_positions: Vec<f64> = by_read
        .values()
        .filter(|occurrences| occurrences.len() == 1)
        .map(|occurrences| {
            let (ordinal, _) = occurrences[0];
            let (oriented, _) = index.find_marker_id(occurrences[0].1);
            index.marker(oriented, ordinal).position as f64
        })
        .collect();
    let mean = if unique_positions.is_empty() {
        located
            .iter()
            .map(|&(oriented, ordinal, _)| index.marker(oriented, ordinal).position as f64)
            .sum::<f64>()
            / located.len() as f64
    } else {
        unique_positions.iter().sum::<f64>() / unique_positions.len() as f64
    };

    let mut primary: Vec<MarkerId> = Vec::new();
    let mut leftover: Vec<MarkerId> = Vec::new();
    let mut reads: Vec<OrientedReadId> = by_read.keys().copied().collect();
    reads.sort_unstable();
    for oriented in reads {
        let occurrences = &by_read[&oriented];
        if occurrences.len() == 1 {
            primary.push(occurrences[0].1);
            continue;
        }
        let chosen = occurrences
            .iter()
            .min_by(|a, b| {
                let da = (index.marker(oriented, a.0).position as f64 - mean).abs();
                let db = (index.marker(oriented, b.0).position as f64 - mean).abs();
                da.partial_cmp(&db).unwrap().then(a.1.cmp(&b.1))
            })
            .unwrap()
            .1;
        for &(_, m) in occurrences.iter() {
            if m == chosen {
                primary.push(m);
            } else {
                leftover.push(m);
            }
        }
    }
    primary.sort_unstable();
    leftover.sort_unstable();
    (primary, leftover)
}

fn has_duplicate_reads(index: &MarkerIndex, markers: &[MarkerId]) -> bool {
    let mut previous: Option<OrientedReadId> = None;
    let mut reads: Vec<OrientedReadId> = markers
        .iter()
        .map(|&m| index.find_marker_id(m).0)
        .collect();
    reads.sort_unstable();
    for read in reads {
        if previous == Some(read) {
            return true;
        }
        previous = Some(read);
    }
    false
}

fn passes_coverage_filters(
    index: &MarkerIndex,
    markers: &[MarkerId],
    min_coverage: usize,
    max_coverage: usize,
    min_coverage_per_strand: usize,
) -> bool {
    if markers.len() < min_coverage || markers.len() > max_coverage {
        return false;
    }
    let strand1 = markers
        .iter()
        .filter(|&&m| index.find_marker_id(m).0.strand() == 1)
        .count();
    let strand0 = markers.len() - strand1;
    strand0 >= min_coverage_per_strand && strand1 >= min_coverage_per_strand
}

/// Build the marker graph vertices. Edges are created separately.
pub fn create_marker_graph_vertices(
    index: &MarkerIndex,
    store: &AlignmentStore,
    read_graph: &ReadGraph,
    reads: &ReadStore,
    params: &VertexFilterParams,
) -> Result<(MarkerGraph, Histogram)> {
    let marker_count = index.total_marker_count();
    let sets = DisjointSets::new(marker_count);

    // union the matched markers of every usable edge, and their mirrors;
    // only the even edge of each pair is processed, the mirror unions cover
    // the odd one
    (0..read_graph.edges.len())
        .into_par_iter()
        .step_by(2)
        .for_each(|edge_id| {
            let edge = &read_graph.edges[edge_id];
            if !is_edge_usable(edge, reads, params.exclude_bridge_edges) {
                return;
            }
            let data = &store.data[edge.alignment_id as usize];
            let (oriented0, oriented1) = data.oriented_reads();
            let count0 = index.marker_count(oriented0);
            let count1 = index.marker_count(oriented1);
            let alignment = store.alignment(edge.alignment_id);
            for [ordinal0, ordinal1] in alignment.ordinals {
                sets.union(
                    index.get_marker_id(oriented0, ordinal0),
                    index.get_marker_id(oriented1, ordinal1),
                );
                sets.union(
                    index.get_marker_id(oriented0.reverse_complement(), count0 - 1 - ordinal0),
                    index.get_marker_id(oriented1.reverse_complement(), count1 - 1 - ordinal1),
                );
            }
        });

    // representative of every marker, found once
    let roots: Vec<u64> = (0..marker_count)
        .into_par_iter()
        .map(|m| sets.find(m))
        .collect();

    // group markers by representative; sorting by (root, marker) makes the
    // first member of each group its lowest MarkerId
    let mut order: Vec<MarkerId> = (0..marker_count).collect();
    order.par_sort_unstable_by_key(|&m| (roots[m as usize], m));

    let mut groups: Vec<Vec<MarkerId>> = Vec::new();
    let mut root_to_group: fnv::FnvHashMap<u64, usize> = fnv::FnvHashMap::default();
    let mut start = 0usize;
    while start < order.len() {
        let root = roots[order[start] as usize];
        let mut end = start;
        while end < order.len() && roots[order[end] as usize] == root {
            end += 1;
        }
        root_to_group.insert(root, groups.len());
        groups.push(order[start..end].to_vec());
        start = end;
    }

    // canonical group order: by lowest MarkerId, independent of the raw
    // representative values the union-find happened to produce
    let mut group_order: Vec<usize> = (0..groups.len()).collect();
    group_order.sort_unstable_by_key(|&g| groups[g][0]);

    // coverage histogram over all groups, used for reporting and for the
    // automatic minCoverage choice
    let mut histogram = Histogram::new();
    for group in &groups {
        histogram.increment(group.len());
    }

    let min_coverage = if params.min_coverage == 0 {
        let chosen = find_coverage_peak(
            &histogram,
            params.peak_finder_start,
            params.peak_finder_min_area_fraction,
        )
        .ok_or_else(|| {
            AssemblyError::Input(
                "could not locate a coverage peak to choose markerGraph.minCoverage".to_string(),
            )
        })?;
        log::info!("Automatically selected markerGraph.minCoverage = {}", chosen);
        chosen
    } else {
        params.min_coverage
    };

    let mut graph = MarkerGraph {
        vertex_table: vec![INVALID_VERTEX; marker_count as usize],
        ..MarkerGraph::default()
    };

    let mut processed = vec![false; groups.len()];
    for &g in &group_order {
        if processed[g] {
            continue;
        }
        let group_root = roots[groups[g][0] as usize];
        let rc_first = index.reverse_complement_marker_id(groups[g][0]);
        let rc_root = roots[rc_first as usize];

        if rc_root == group_root {
            // self-complementary class, eliminated
            processed[g] = true;
            graph.self_complementary_vertex_count += 1;
            continue;
        }
        let rc_group = root_to_group[&rc_root];
        processed[g] = true;
        processed[rc_group] = true;

        // duplicate-marker policy
        let mut lists: Vec<Vec<MarkerId>> = Vec::new();
        if has_duplicate_reads(index, &groups[g]) {
            graph.bad_vertex_count += 1;
            if !params.allow_duplicate_markers || params.delete_bad_vertices {
                continue;
            }
            if params.split_bad_vertices {
                let (primary, leftover) = split_duplicates(index, &groups[g]);
                lists.push(primary);
                lists.push(leftover);
            } else {
                lists.push(groups[g].clone());
            }
        } else {
            lists.push(groups[g].clone());
        }

        for list in lists {
            if !passes_coverage_filters(
                index,
                &list,
                min_coverage,
                params.max_coverage,
                params.min_coverage_per_strand,
            ) {
                continue;
            }
            // the mirror list is constructed, never recomputed, so both
            // strands make exactly the same decision
            let mirrored = mirror_markers(index, &list);

            let v = graph.vertices.len() as VertexId;
            for &m in &list {
                graph.vertex_table[m as usize] = v;
            }
            for &m in &mirrored {
                graph.vertex_table[m as usize] = v + 1;
            }
            graph.vertices.push(list);
            graph.vertices.push(mirrored);
            graph.reverse_complement_vertex.push(v + 1);
            graph.reverse_complement_vertex.push(v);
        }
    }

    log::info!(
        "Marker graph has {} vertices ({} bad, {} self-complementary classes)",
        graph.vertex_count(),
        graph.bad_vertex_count,
        graph.self_complementary_vertex_count
    );
    Ok((graph, histogram))
}

/// Build the marker graph edges from per-read adjacency of surviving markers.
pub fn create_marker_graph_edges(graph: &mut MarkerGraph, index: &MarkerIndex) {
    // emit (source, target, interval) per oriented read, in parallel with
    // ordered collection
    let mut raw: Vec<(VertexId, VertexId, MarkerInterval)> = (0..index.markers.len() as u32)
        .into_par_iter()
        .flat_map_iter(|oriented_value| {
            let oriented = OrientedReadId::from_value(oriented_value);
            let count = index.marker_count(oriented);
            let mut local: Vec<(VertexId, VertexId, MarkerInterval)> = Vec::new();
            let mut previous: Option<(u32, VertexId)> = None;
            for ordinal in 0..count {
                let vertex = graph.vertex_of(index, oriented, ordinal);
                if vertex == INVALID_VERTEX {
                    continue;
                }
                if let Some((previous_ordinal, previous_vertex)) = previous {
                    local.push((
                        previous_vertex,
                        vertex,
                        MarkerInterval {
                            oriented_read_id: oriented,
                            ordinals: [previous_ordinal, ordinal],
                        },
                    ));
                }
                previous = Some((ordinal, vertex));
            }
            local
        })
        .collect();

    raw.par_sort_unstable_by_key(|&(source, target, interval)| {
        (source, target, interval.oriented_read_id, interval.ordinals[0])
    });

    let mut start = 0usize;
    while start < raw.len() {
        let (source, target, _) = raw[start];
        let mut end = start;
        while end < raw.len() && raw[end].0 == source && raw[end].1 == target {
            end += 1;
        }
        graph.edges.push(MarkerGraphEdge {
            source,
            target,
            flags: MarkerGraphEdgeFlags::default(),
        });
        graph
            .edge_marker_intervals
            .push(raw[start..end].iter().map(|&(_, _, interval)| interval).collect());
        start = end;
    }

    // connectivity
    graph.edges_by_source = vec![Vec::new(); graph.vertex_count()];
    graph.edges_by_target = vec![Vec::new(); graph.vertex_count()];
    for (edge_id, edge) in graph.edges.iter().enumerate() {
        graph.edges_by_source[edge.source as usize].push(edge_id as EdgeId);
        graph.edges_by_target[edge.target as usize].push(edge_id as EdgeId);
    }

    // reverse complement edge pairing through the vertex pairing table
    let mut by_endpoints: fnv::FnvHashMap<(VertexId, VertexId), EdgeId> = fnv::FnvHashMap::default();
    for (edge_id, edge) in graph.edges.iter().enumerate() {
        by_endpoints.insert((edge.source, edge.target), edge_id as EdgeId);
    }
    graph.reverse_complement_edge = graph
        .edges
        .iter()
        .map(|edge| {
            let rc_source = graph.reverse_complement_vertex[edge.target as usize];
            let rc_target = graph.reverse_complement_vertex[edge.source as usize];
            by_endpoints[&(rc_source, rc_target)]
        })
        .collect();

    log::info!("Marker graph has {} edges", graph.edge_count());
}

/// Local marker graph around a start vertex, for interactive inspection.
/// Clears partial output and fails when the timeout expires.
pub struct LocalMarkerGraph {
    pub vertices: Vec<(VertexId, u32)>,
    pub edges: Vec<EdgeId>,
}

impl MarkerGraph {
    pub fn extract_local_subgraph(
        &self,
        start: VertexId,
        max_distance: u32,
        timeout: Duration,
    ) -> Result<LocalMarkerGraph> {
        let begin = Instant::now();
        let mut distance: fnv::FnvHashMap<VertexId, u32> = fnv::FnvHashMap::default();
        let mut queue: VecDeque<VertexId> = VecDeque::new();
        let mut local = LocalMarkerGraph {
            vertices: vec![(start, 0)],
            edges: Vec::new(),
        };
        distance.insert(start, 0);
        queue.push_back(start);
        while let Some(current) = queue.pop_front() {
            if begin.elapsed() > timeout {
                return Err(AssemblyError::Timeout);
            }
            let d = distance[&current];
            if d >= max_distance {
                continue;
            }
            for &edge_id in self.edges_by_source[current as usize]
                .iter()
                .chain(self.edges_by_target[current as usize].iter())
            {
                let edge = &self.edges[edge_id as usize];
                if edge.flags.is_removed() {
                    continue;
                }
                let neighbor = if edge.source == current {
                    edge.target
                } else {
                    edge.source
                };
                if !distance.contains_key(&neighbor) {
                    distance.insert(neighbor, d + 1);
                    local.vertices.push((neighbor, d + 1));
                    queue.push_back(neighbor);
                }
            }
        }
        for (edge_id, edge) in self.edges.iter().enumerate() {
            if !edge.flags.is_removed()
                && distance.contains_key(&edge.source)
                && distance.contains_key(&edge.target)
            {
                local.edges.push(edge_id as EdgeId);
            }
        }
        Ok(local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::build_pipeline_to_marker_graph;

    #[test]
    fn vertices_are_strand_symmetric() {
        let (_reads, index, graph) = build_pipeline_to_marker_graph();
        graph.check_strand_symmetry().unwrap();
        // coverage bounds hold for every vertex
        for v in 0..graph.vertex_count() as VertexId {
            let coverage = graph.vertex_coverage(v);
            assert!(coverage >= 2, "vertex {} has coverage {}", v, coverage);
        }
        let _ = index;
    }

    #[test]
    fn no_duplicate_markers_in_vertices() {
        let (_reads, index, graph) = build_pipeline_to_marker_graph();
        for v in 0..graph.vertex_count() as VertexId {
            let mut reads_seen: Vec<OrientedReadId> = graph.vertices[v as usize]
                .iter()
                .map(|&m| index.find_marker_id(m).0)
                .collect();
            reads_seen.sort_unstable();
            let before = reads_seen.len();
            reads_seen.dedup();
            assert_eq!(before, reads_seen.len(), "vertex {} holds duplicates", v);
        }
    }

    #[test]
    fn edge_support_is_consistent() {
        let (_reads, index, graph) = build_pipeline_to_marker_graph();
        for edge_id in 0..graph.edge_count() as EdgeId {
            let edge = &graph.edges[edge_id as usize];
            for interval in &graph.edge_marker_intervals[edge_id as usize] {
                let [i, j] = interval.ordinals;
                assert!(j > i);
                assert_eq!(
                    graph.vertex_of(&index, interval.oriented_read_id, i),
                    edge.source
                );
                assert_eq!(
                    graph.vertex_of(&index, interval.oriented_read_id, j),
                    edge.target
                );
                // no surviving vertex strictly between the two ordinals
                for k in (i + 1)..j {
                    assert_eq!(
                        graph.vertex_of(&index, interval.oriented_read_id, k),
                        INVALID_VERTEX
                    );
                }
            }
        }
    }

    #[test]
    fn vertex_table_round_trips() {
        let (_reads, index, graph) = build_pipeline_to_marker_graph();
        for v in 0..graph.vertex_count() as VertexId {
            for &m in &graph.vertices[v as usize] {
                assert_eq!(graph.vertex_table[m as usize], v);
            }
        }
        let _ = index;
    }
}
