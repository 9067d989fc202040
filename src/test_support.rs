/// Shared helpers for unit tests: seeded synthetic genomes, tiled reads,
/// and a small pipeline run up to the marker graph.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::align::{AlignMethod, AlignParams};
use crate::alignments::compute_alignments;
use crate::kmers::{select_kmers, KmerSelectionConfig, KmerSelectionMethod};
use crate::lowhash::{find_candidate_pairs, LowHashConfig};
use crate::marker_graph::{
    create_marker_graph_edges, create_marker_graph_vertices, EdgeId, MarkerGraph,
    MarkerGraphEdge, MarkerGraphEdgeFlags, MarkerInterval, VertexFilterParams,
};
use crate::markers::MarkerIndex;
use crate::read_graph::create_read_graph;
use crate::reads::{reverse_complement, OrientedReadId, ReadStore};

pub fn synthetic_genome(length: usize, seed: u64) -> Vec<u8> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..length)
        .map(|_| match rng.gen_range(0..4) {
            0 => b'A',
            1 => b'C',
            2 => b'G',
            _ => b'T',
        })
        .collect()
}

/// Error-free reads tiling the genome, alternating orientation so both
/// strands carry coverage.
pub fn tile_reads(genome: &[u8], read_length: usize, stride: usize) -> Vec<Vec<u8>> {
    let mut reads: Vec<Vec<u8>> = Vec::new();
    let mut start = 0usize;
    let mut flip = false;
    while start + read_length <= genome.len() {
        let piece = genome[start..start + read_length].to_vec();
        reads.push(if flip { reverse_complement(&piece) } else { piece });
        flip = !flip;
        start += stride;
    }
    reads
}

pub fn test_align_params() -> AlignParams {
    AlignParams {
        method: AlignMethod::OrdinalChain,
        max_skip: 15,
        max_drift: 10,
        max_marker_frequency: 10,
        min_aligned_marker_count: 8,
        min_aligned_fraction: 0.1,
        max_trim: 40,
        match_score: 3,
        mismatch_score: -1,
        gap_score: -1,
        band: 40,
    }
}

pub fn test_vertex_params() -> VertexFilterParams {
    VertexFilterParams {
        min_coverage: 2,
        max_coverage: 1000,
        min_coverage_per_strand: 0,
        allow_duplicate_markers: false,
        split_bad_vertices: false,
        delete_bad_vertices: false,
        exclude_bridge_edges: false,
        peak_finder_min_area_fraction: 0.08,
        peak_finder_start: 2,
    }
}

/// Run the pipeline on a small synthetic genome up to marker graph edges.
pub fn build_pipeline_to_marker_graph() -> (ReadStore, MarkerIndex, MarkerGraph) {
    let genome = synthetic_genome(3000, 11);
    let mut reads = ReadStore::new();
    for (i, seq) in tile_reads(&genome, 600, 200).iter().enumerate() {
        reads.add_read(&format!("read{}", i), seq, 1).unwrap();
    }

    let kmer_config = KmerSelectionConfig {
        k: 7,
        density: 0.15,
        seed: 23,
        method: KmerSelectionMethod::Random,
        enrichment_threshold: 10.0,
        close_pair_distance: 0,
        file: None,
    };
    let kmer_table = select_kmers(&kmer_config, &reads).unwrap();
    let index = MarkerIndex::build(&reads, &kmer_table);

    let lowhash_config = LowHashConfig {
        m: 3,
        hash_fraction: 0.2,
        iteration_count: 4,
        bucket_bits: 12,
        min_bucket_size: 2,
        max_bucket_size: 30,
        min_frequency: 1,
        seed: 41,
    };
    let (candidates, _stats) = find_candidate_pairs(&index, reads.read_count(), &lowhash_config);

    let store = compute_alignments(
        &index,
        &candidates,
        &test_align_params(),
        reads.oriented_read_count(),
    );

    let read_graph = create_read_graph(&store, reads.read_count(), 8);

    let (mut graph, _histogram) =
        create_marker_graph_vertices(&index, &store, &read_graph, &reads, &test_vertex_params())
            .unwrap();
    create_marker_graph_edges(&mut graph, &index);
    (reads, index, graph)
}

/// Hand-build a strand-symmetric marker graph from (source, target, coverage)
/// triples over abstract vertices. Vertex v maps to ids 2v (given strand) and
/// 2v+1 (reverse complement strand); the mirror edge of (u, w) is (w', u').
pub fn graph_from_edges(vertex_count: u64, edges: &[(u64, u64, usize)]) -> MarkerGraph {
    let mut graph = MarkerGraph::default();
    for v in 0..vertex_count {
        // two single-marker vertices per abstract vertex
        graph.vertices.push(vec![2 * v]);
        graph.vertices.push(vec![2 * v + 1]);
        graph.reverse_complement_vertex.push(2 * v + 1);
        graph.reverse_complement_vertex.push(2 * v);
    }
    graph.edges_by_source = vec![Vec::new(); graph.vertices.len()];
    graph.edges_by_target = vec![Vec::new(); graph.vertices.len()];

    for (i, &(u, w, coverage)) in edges.iter().enumerate() {
        let intervals: Vec<MarkerInterval> = (0..coverage)
            .map(|c| MarkerInterval {
                oriented_read_id: OrientedReadId::from_value((2 * (i * 64 + c)) as u32),
                ordinals: [0, 1],
            })
            .collect();
        let rc_intervals: Vec<MarkerInterval> = intervals
            .iter()
            .map(|interval| MarkerInterval {
                oriented_read_id: interval.oriented_read_id.reverse_complement(),
                ordinals: [0, 1],
            })
            .collect();

        let forward = graph.edges.len() as EdgeId;
        graph.edges.push(MarkerGraphEdge {
            source: 2 * u,
            target: 2 * w,
            flags: MarkerGraphEdgeFlags::default(),
        });
        graph.edge_marker_intervals.push(intervals);
        graph.edges_by_source[(2 * u) as usize].push(forward);
        graph.edges_by_target[(2 * w) as usize].push(forward);

        let mirror = graph.edges.len() as EdgeId;
        graph.edges.push(MarkerGraphEdge {
            source: 2 * w + 1,
            target: 2 * u + 1,
            flags: MarkerGraphEdgeFlags::default(),
        });
        graph.edge_marker_intervals.push(rc_intervals);
        graph.edges_by_source[(2 * w + 1) as usize].push(mirror);
        graph.edges_by_target[(2 * u + 1) as usize].push(mirror);

        graph.reverse_complement_edge.push(mirror);
        graph.reverse_complement_edge.push(forward);
    }
    graph
}
