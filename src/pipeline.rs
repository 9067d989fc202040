/// Pipeline orchestration
/// Runs the full assembly: reads -> markers -> candidate pairs ->
/// alignments -> read graph -> marker graph -> cleanup -> assembly graph ->
/// assembled segments. After each major stage the produced state is saved
/// as named binary objects, and the pipeline can restart at any stage by
/// re-opening the state produced up to that stage.
/// With readGraph.creationMethod 2 the whole graph section runs twice: the
/// second iteration rebuilds the read graph keeping only alignments whose
/// pseudo-paths align well.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::alignments::{compute_alignments, AlignmentStore};
use crate::assemble::assemble_segment_sequences;
use crate::assembly_graph::{
    align_pseudo_paths, create_assembly_graph, AssemblyGraph, SegmentId,
};
use crate::config::AssemblyConfig;
use crate::consensus::consensus_caller_from_string;
use crate::error::{AssemblyError, Result};
use crate::fasta::load_fasta;
use crate::kmers::{select_kmers, KmerTable};
use crate::lowhash::{find_candidate_pairs, CandidatePair};
use crate::marker_graph::{
    create_marker_graph_edges, create_marker_graph_vertices, MarkerGraph, VertexId,
};
use crate::markers::MarkerIndex;
use crate::output::{write_fasta, write_gfa};
use crate::prune::prune_leaves;
use crate::read_graph::{
    create_read_graph, create_read_graph_from_kept, flag_bridges, flag_chimeric_reads,
    flag_cross_strand_edges, flag_inconsistent_alignments, mark_small_components, ReadGraph,
};
use crate::reads::ReadStore;
use crate::simplify::{remove_low_coverage_cross_edges, simplify_marker_graph};
use crate::stats::{
    assembly_stats, write_assembly_summary, write_coverage_histogram,
    write_read_length_histogram, AssemblyStats,
};
use crate::storage::BinaryStore;
use crate::transitive_reduction::{reverse_transitive_reduction, transitive_reduction};

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum StartStage {
    Reads,
    Kmers,
    Markers,
    Candidates,
    Alignments,
    ReadGraph,
    MarkerGraph,
    Cleanup,
    Assembly,
}

impl StartStage {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "reads" => Ok(StartStage::Reads),
            "kmers" => Ok(StartStage::Kmers),
            "markers" => Ok(StartStage::Markers),
            "candidates" => Ok(StartStage::Candidates),
            "alignments" => Ok(StartStage::Alignments),
            "read-graph" => Ok(StartStage::ReadGraph),
            "marker-graph" => Ok(StartStage::MarkerGraph),
            "cleanup" => Ok(StartStage::Cleanup),
            "assembly" => Ok(StartStage::Assembly),
            other => Err(AssemblyError::config(format!(
                "startAt '{}' is not a pipeline stage",
                other
            ))),
        }
    }
}

/// Fixed-size persisted form of an assembly segment.
#[derive(Copy, Clone, Serialize, Deserialize)]
struct SegmentRecord {
    source: VertexId,
    target: VertexId,
    was_split: bool,
}

fn save_marker_graph(store: &BinaryStore, graph: &MarkerGraph) -> Result<()> {
    store.save_ragged("MarkerGraph-vertices", &graph.vertices)?;
    store.save_vector("MarkerGraph-vertexTable", &graph.vertex_table)?;
    store.save_vector(
        "MarkerGraph-reverseComplementVertex",
        &graph.reverse_complement_vertex,
    )?;
    store.save_vector("MarkerGraph-edges", &graph.edges)?;
    store.save_ragged("MarkerGraph-edgeMarkerIntervals", &graph.edge_marker_intervals)?;
    store.save_vector(
        "MarkerGraph-reverseComplementEdge",
        &graph.reverse_complement_edge,
    )?;
    let flags: Vec<_> = graph.edges.iter().map(|e| e.flags).collect();
    store.save_vector("MarkerGraph-edgeFlags", &flags)?;
    Ok(())
}

fn load_marker_graph(store: &BinaryStore) -> Result<MarkerGraph> {
    let mut graph = MarkerGraph {
        vertices: store.load_ragged("MarkerGraph-vertices")?,
        vertex_table: store.load_vector("MarkerGraph-vertexTable")?,
        reverse_complement_vertex: store.load_vector("MarkerGraph-reverseComplementVertex")?,
        edges: store.load_vector("MarkerGraph-edges")?,
        edge_marker_intervals: store.load_ragged("MarkerGraph-edgeMarkerIntervals")?,
        reverse_complement_edge: store.load_vector("MarkerGraph-reverseComplementEdge")?,
        ..MarkerGraph::default()
    };
    graph.edges_by_source = vec![Vec::new(); graph.vertex_count()];
    graph.edges_by_target = vec![Vec::new(); graph.vertex_count()];
    for (edge_id, edge) in graph.edges.iter().enumerate() {
        graph.edges_by_source[edge.source as usize].push(edge_id as u64);
        graph.edges_by_target[edge.target as usize].push(edge_id as u64);
    }
    Ok(graph)
}

fn save_assembly_graph(store: &BinaryStore, assembly: &AssemblyGraph) -> Result<()> {
    let records: Vec<SegmentRecord> = assembly
        .segments
        .iter()
        .map(|segment| SegmentRecord {
            source: segment.source,
            target: segment.target,
            was_split: segment.was_split,
        })
        .collect();
    store.save_vector("AssemblyGraph-edges", &records)?;
    let edge_lists: Vec<Vec<u64>> = assembly
        .segments
        .iter()
        .map(|segment| segment.edges.clone())
        .collect();
    store.save_ragged("AssemblyGraph-edgeLists", &edge_lists)?;
    store.save_vector(
        "AssemblyGraph-reverseComplementEdge",
        &assembly.reverse_complement_segment,
    )?;
    store.save_ragged(
        "AssemblyGraph-orientedReadsByEdge",
        &assembly.oriented_reads_by_segment,
    )?;
    // the boundary marker graph vertices of the assembly graph
    let mut vertices: Vec<VertexId> = assembly
        .segments
        .iter()
        .flat_map(|segment| [segment.source, segment.target])
        .collect();
    vertices.sort_unstable();
    vertices.dedup();
    store.save_vector("AssemblyGraph-vertices", &vertices)?;
    Ok(())
}

fn run_read_graph_passes(
    read_graph: &mut ReadGraph,
    reads: &mut ReadStore,
    alignment_store: &AlignmentStore,
    index: &MarkerIndex,
    config: &AssemblyConfig,
) {
    flag_chimeric_reads(read_graph, reads, config.read_graph.max_chimeric_read_distance);
    if config.read_graph.strand_separation_method > 0 {
        flag_cross_strand_edges(read_graph, config.read_graph.cross_strand_max_distance);
    }
    flag_inconsistent_alignments(
        read_graph,
        alignment_store,
        index,
        config.read_graph.triangle_error_threshold,
        config.read_graph.least_square_error_threshold,
        config.read_graph.max_distance,
    );
    flag_bridges(read_graph, config.read_graph.max_distance);
    mark_small_components(read_graph, reads, config.read_graph.min_component_size);
}

/// Keep an alignment for the next iteration when the two reads'
/// pseudo-paths align above the configured score.
fn keep_by_pseudo_path_alignment(
    alignment_store: &AlignmentStore,
    assembly: &AssemblyGraph,
    config: &AssemblyConfig,
) -> Vec<bool> {
    let params = config.pseudo_path_align_params();
    let keep: Vec<bool> = alignment_store
        .data
        .iter()
        .map(|data| {
            let (oriented0, oriented1) = data.oriented_reads();
            let path0: Vec<SegmentId> = assembly.pseudo_paths[oriented0.index()]
                .iter()
                .map(|entry| entry.segment_id)
                .collect();
            let path1: Vec<SegmentId> = assembly.pseudo_paths[oriented1.index()]
                .iter()
                .map(|entry| entry.segment_id)
                .collect();
            align_pseudo_paths(&path0, &path1, &params) >= params.min_score
        })
        .collect();
    let kept = keep.iter().filter(|&&k| k).count();
    log::info!(
        "Pseudo-path alignment kept {} of {} alignments",
        kept,
        keep.len()
    );
    keep
}

/// Flag short dead-end segments of the assembly graph.
fn prune_short_dead_ends(graph: &mut MarkerGraph, assembly: &AssemblyGraph, prune_length: usize) {
    let mut pruned = 0usize;
    for s in 0..assembly.segment_count() as SegmentId {
        let dead_end = assembly.in_degree(s) == 0 || assembly.out_degree(s) == 0;
        let segment = &assembly.segments[s as usize];
        if dead_end && !segment.was_split && segment.edges.len() <= prune_length {
            for edge in segment.edges.clone() {
                graph.flag_edge_pair(edge, |flags| flags.was_pruned = true);
            }
            pruned += 1;
        }
    }
    log::info!("Pruned {} short dead-end segments", pruned);
}

/// Run the assembly pipeline. Returns the final assembly statistics.
pub fn run_assembly(
    config: &AssemblyConfig,
    input_files: &[PathBuf],
    output_directory: &Path,
    start_stage: StartStage,
) -> Result<AssemblyStats> {
    config.validate()?;
    let store = BinaryStore::create(output_directory)?;
    let compute = |stage: StartStage| start_stage <= stage;

    // === READS ===
    log::info!("=== READS ===");
    let mut reads: ReadStore = if compute(StartStage::Reads) {
        if input_files.is_empty() {
            return Err(AssemblyError::config("no input files given"));
        }
        let mut reads = ReadStore::new();
        for file in input_files {
            let accepted = load_fasta(file, &mut reads, config.min_read_length)?;
            log::info!("{}: accepted {} reads", file.display(), accepted);
        }
        log::info!(
            "Discarded reads: {} invalid base, {} too short, {} bad repeat count, {} palindromic",
            reads.discarded.invalid_base,
            reads.discarded.too_short,
            reads.discarded.bad_repeat_count,
            reads.discarded.palindromic
        );
        if reads.read_count() == 0 {
            return Err(AssemblyError::Input(
                "no usable reads remain after validation".to_string(),
            ));
        }
        store.save_object("Reads", &reads)?;
        reads
    } else {
        store.load_object("Reads")?
    };
    write_read_length_histogram(
        &output_directory.join("ReadLengthHistogram.csv"),
        &reads.length_histogram(1000),
    )?;

    // === MARKERS ===
    log::info!("=== MARKER SELECTION ===");
    let kmer_table: KmerTable = if compute(StartStage::Kmers) {
        let table = select_kmers(&config.kmer_selection(), &reads)?;
        if !table.is_strand_symmetric() {
            return Err(AssemblyError::invariant("k-mer selection is not strand symmetric"));
        }
        store.save_object("KmerTable", &table)?;
        table
    } else {
        store.load_object("KmerTable")?
    };

    log::info!("=== MARKER INDEX ===");
    let index: MarkerIndex = if compute(StartStage::Markers) {
        let index = MarkerIndex::build(&reads, &kmer_table);
        log::info!("Found {} markers", index.total_marker_count());
        store.save_object("Markers", &index)?;
        store.save_ragged("SortedMarkers", &index.sorted_markers)?;
        index
    } else {
        store.load_object("Markers")?
    };

    // === CANDIDATE PAIRS ===
    log::info!("=== CANDIDATE PAIRS ===");
    let candidates: Vec<CandidatePair> = if compute(StartStage::Candidates) {
        let (candidates, statistics) =
            find_candidate_pairs(&index, reads.read_count(), &config.lowhash());
        store.save_vector("CandidatePairs", &candidates)?;
        store.save_vector("ReadLowHashStatistics", &statistics)?;
        candidates
    } else {
        store.load_vector("CandidatePairs")?
    };

    // === ALIGNMENTS ===
    log::info!("=== ALIGNMENTS ===");
    let alignment_store: AlignmentStore = if compute(StartStage::Alignments) {
        let alignment_store = compute_alignments(
            &index,
            &candidates,
            &config.align_params(),
            reads.oriented_read_count(),
        );
        store.save_vector("AlignmentData", &alignment_store.data)?;
        store.save_ragged("CompressedAlignments", &alignment_store.compressed)?;
        store.save_ragged("AlignmentTable", &alignment_store.table)?;
        alignment_store
    } else {
        AlignmentStore {
            data: store.load_vector("AlignmentData")?,
            compressed: store.load_ragged("CompressedAlignments")?,
            table: store.load_ragged("AlignmentTable")?,
        }
    };

    // === GRAPH SECTION, POSSIBLY ITERATED ===
    let iteration_count = if config.read_graph.creation_method == 2 { 2 } else { 1 };
    let mut kept: Option<Vec<bool>> = None;
    let caller = consensus_caller_from_string(&config.assembly.consensus_caller)?;

    for iteration in 0..iteration_count {
        let fresh = iteration > 0;

        let mut graph: MarkerGraph = if compute(StartStage::MarkerGraph) || fresh {
            // === READ GRAPH ===
            log::info!("=== READ GRAPH ===");
            let read_graph = if compute(StartStage::ReadGraph) || fresh {
                let mut read_graph = match &kept {
                    Some(keep) => {
                        create_read_graph_from_kept(&alignment_store, reads.read_count(), keep)
                    }
                    None => create_read_graph(
                        &alignment_store,
                        reads.read_count(),
                        config.read_graph.max_alignment_count,
                    ),
                };
                run_read_graph_passes(&mut read_graph, &mut reads, &alignment_store, &index, config);
                store.save_vector("ReadGraphEdges", &read_graph.edges)?;
                store.save_object("Reads", &reads)?;
                read_graph
            } else {
                ReadGraph::from_edges(
                    store.load_vector("ReadGraphEdges")?,
                    reads.oriented_read_count(),
                )
            };

            // === MARKER GRAPH ===
            log::info!("=== MARKER GRAPH ===");
            let (mut graph, histogram) = create_marker_graph_vertices(
                &index,
                &alignment_store,
                &read_graph,
                &reads,
                &config.vertex_filter(),
            )?;
            write_coverage_histogram(
                &output_directory.join("MarkerGraphVertexCoverageHistogram.csv"),
                &histogram,
            )?;
            create_marker_graph_edges(&mut graph, &index);
            graph.check_strand_symmetry()?;
            save_marker_graph(&store, &graph)?;
            graph
        } else {
            load_marker_graph(&store)?
        };

        // === CLEANUP ===
        if compute(StartStage::Cleanup) || fresh {
            log::info!("=== MARKER GRAPH CLEANUP ===");
            let reduction_params = config.transitive_reduction_params();
            transitive_reduction(&mut graph, &reduction_params);
            reverse_transitive_reduction(&mut graph, &reduction_params);
            prune_leaves(&mut graph, config.marker_graph.prune_iteration_count);
            simplify_marker_graph(&mut graph, &config.marker_graph.simplify_max_length);
            remove_low_coverage_cross_edges(
                &mut graph,
                config.marker_graph.cross_edge_coverage_threshold,
            );
            graph.check_strand_symmetry()?;
            save_marker_graph(&store, &graph)?;
        }

        // === ASSEMBLY GRAPH ===
        log::info!("=== ASSEMBLY GRAPH ===");
        let mut assembly = create_assembly_graph(&graph);
        assembly.compute_pseudo_paths(&graph, &index);

        if iteration + 1 < iteration_count {
            kept = Some(keep_by_pseudo_path_alignment(&alignment_store, &assembly, config));
            continue;
        }

        if config.assembly.prune_length > 0 {
            prune_short_dead_ends(&mut graph, &assembly, config.assembly.prune_length);
            assembly = create_assembly_graph(&graph);
            assembly.compute_pseudo_paths(&graph, &index);
        }

        if config.assembly.detangle_method != 0 {
            assembly.detangle(&config.detangle_params());
        }

        // === SEQUENCE ASSEMBLY ===
        log::info!("=== SEQUENCE ASSEMBLY ===");
        assemble_segment_sequences(&mut assembly, &mut graph, &index, &reads, caller.as_ref());
        save_marker_graph(&store, &graph)?;
        save_assembly_graph(&store, &assembly)?;

        // === OUTPUT ===
        log::info!("=== OUTPUT ===");
        write_gfa(&output_directory.join("Assembly.gfa"), &assembly, index.k)?;
        write_fasta(&output_directory.join("Assembly.fasta"), &assembly)?;

        let lengths: Vec<u64> = (0..assembly.segment_count() as SegmentId)
            .filter(|&s| {
                !assembly.segments[s as usize].was_split
                    && s <= assembly.reverse_complement_segment[s as usize]
            })
            .map(|s| assembly.assembled[s as usize].len() as u64)
            .collect();
        let stats = assembly_stats(&lengths);
        write_assembly_summary(&output_directory.join("AssemblySummary.csv"), &stats)?;
        log::info!(
            "Assembly: {} segments, {} bases, N50 {}",
            stats.segment_count,
            stats.total_length,
            stats.n50
        );
        return Ok(stats);
    }
    Err(AssemblyError::invariant(
        "pipeline ended without producing an assembly",
    ))
}
