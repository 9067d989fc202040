/// Sequence assembly module
/// Builds the base sequence of every assembly segment.
/// The sequence starts with the k-mer of the first vertex; each marker
/// graph edge then contributes the consensus of its supporting reads'
/// sequences between the two flanking markers (including the target
/// marker). Consensus runs in run-length space through the configured
/// ConsensusCaller, one column at a time, over the supporting sequences of
/// the most common run-length length.

use rayon::prelude::*;

use crate::assembly_graph::{AssemblyGraph, SegmentId};
use crate::consensus::{ConsensusCaller, RunLengthObservation};
use crate::kmers::decode_kmer;
use crate::marker_graph::{EdgeId, MarkerGraph};
use crate::markers::MarkerIndex;
use crate::reads::ReadStore;

/// Run-length encode a base sequence. Repeat counts fit in u8 because reads
/// with longer homopolymer runs were discarded on input.
fn run_length_encode(sequence: &[u8]) -> Vec<RunLengthObservation> {
    let mut encoded: Vec<RunLengthObservation> = Vec::new();
    for &base in sequence {
        match encoded.last_mut() {
            Some((b, repeat)) if *b == base && *repeat < u8::MAX => *repeat += 1,
            _ => encoded.push((base, 1)),
        }
    }
    encoded
}

fn run_length_decode(encoded: &[RunLengthObservation]) -> Vec<u8> {
    let mut sequence: Vec<u8> = Vec::new();
    for &(base, repeat) in encoded {
        for _ in 0..repeat {
            sequence.push(base);
        }
    }
    sequence
}

/// Consensus of one marker graph edge: the supporting sequences between the
/// flanking markers, in run-length space.
fn edge_consensus(
    graph: &MarkerGraph,
    index: &MarkerIndex,
    reads: &ReadStore,
    caller: &dyn ConsensusCaller,
    edge: EdgeId,
) -> Vec<u8> {
    let k = index.k;
    let contributions: Vec<Vec<RunLengthObservation>> = graph.edge_marker_intervals[edge as usize]
        .iter()
        .map(|interval| {
            let oriented = interval.oriented_read_id;
            let sequence = reads.oriented_sequence(oriented);
            let p0 = index.marker(oriented, interval.ordinals[0]).position as usize;
            let p1 = index.marker(oriented, interval.ordinals[1]).position as usize;
            // from the end of the source marker through the end of the
            // target marker; overlapping markers shrink this to the
            // non-shared suffix of the target k-mer
            run_length_encode(&sequence[p0 + k..p1 + k])
        })
        .collect();

    // vote among the supporting sequences with the most common run-length
    // length, ties toward the shorter one
    let mut lengths: Vec<usize> = contributions.iter().map(|c| c.len()).collect();
    lengths.sort_unstable();
    let mut modal = (0usize, 0usize);
    let mut i = 0usize;
    while i < lengths.len() {
        let mut j = i;
        while j < lengths.len() && lengths[j] == lengths[i] {
            j += 1;
        }
        if j - i > modal.0 {
            modal = (j - i, lengths[i]);
        }
        i = j;
    }
    let voters: Vec<&Vec<RunLengthObservation>> = contributions
        .iter()
        .filter(|c| c.len() == modal.1)
        .collect();

    let mut consensus: Vec<RunLengthObservation> = Vec::with_capacity(modal.1);
    for column_index in 0..modal.1 {
        let column: Vec<RunLengthObservation> =
            voters.iter().map(|c| c[column_index]).collect();
        consensus.push(caller.call(&column));
    }
    run_length_decode(&consensus)
}

/// Assemble the sequence of every segment and mark the assembled edges.
pub fn assemble_segment_sequences(
    assembly: &mut AssemblyGraph,
    graph: &mut MarkerGraph,
    index: &MarkerIndex,
    reads: &ReadStore,
    caller: &dyn ConsensusCaller,
) {
    let sequences: Vec<Vec<u8>> = (0..assembly.segment_count() as SegmentId)
        .into_par_iter()
        .map(|segment_id| {
            let segment = &assembly.segments[segment_id as usize];
            if segment.was_split || segment.edges.is_empty() {
                return Vec::new();
            }
            // the k-mer of the first vertex; all markers of a vertex share it
            let first_vertex = segment.source;
            let first_marker = graph.vertices[first_vertex as usize][0];
            let (oriented, ordinal) = index.find_marker_id(first_marker);
            let mut sequence = decode_kmer(index.marker(oriented, ordinal).kmer_id, index.k);

            for &edge in &segment.edges {
                sequence.extend(edge_consensus(graph, index, reads, caller, edge));
            }
            sequence
        })
        .collect();

    for (segment_id, sequence) in sequences.into_iter().enumerate() {
        assembly.assembled[segment_id] = sequence;
    }
    for segment in &assembly.segments {
        if segment.was_split {
            continue;
        }
        for &edge in &segment.edges {
            graph.flag_edge_pair(edge, |flags| flags.was_assembled = true);
        }
    }

    let total: u64 = assembly.assembled.iter().map(|s| s.len() as u64).sum();
    log::info!(
        "Assembled {} bases over {} segments",
        total,
        assembly.segment_count()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly_graph::create_assembly_graph;
    use crate::consensus::ModalConsensusCaller;
    use crate::test_support::build_pipeline_to_marker_graph;

    #[test]
    fn run_length_roundtrip() {
        let sequence = b"AACCCGTTTTA".to_vec();
        assert_eq!(run_length_decode(&run_length_encode(&sequence)), sequence);
        assert_eq!(
            run_length_encode(b"AACCCG"),
            vec![(b'A', 2), (b'C', 3), (b'G', 1)]
        );
    }

    #[test]
    fn error_free_reads_reassemble_their_sequence() {
        let (reads, index, mut graph) = build_pipeline_to_marker_graph();
        let mut assembly = create_assembly_graph(&graph);
        assemble_segment_sequences(
            &mut assembly,
            &mut graph,
            &index,
            &reads,
            &ModalConsensusCaller,
        );

        // the longest assembled segment must occur verbatim in some read's
        // neighborhood of the genome; with error-free reads every edge
        // consensus is exact, so the sequence must at least contain only
        // ACGT and be as long as one k-mer plus one base per edge
        let longest = assembly
            .assembled
            .iter()
            .max_by_key(|s| s.len())
            .unwrap();
        assert!(longest.len() >= index.k);
        assert!(longest.iter().all(|b| matches!(b, b'A' | b'C' | b'G' | b'T')));

        // assembled edges are flagged
        for segment in &assembly.segments {
            for &edge in &segment.edges {
                assert!(graph.edges[edge as usize].flags.was_assembled);
            }
        }
    }
}
