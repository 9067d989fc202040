/// End-to-end pipeline scenarios on small seeded synthetic genomes.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use orneta::config::{
    AlignOptions, AssemblyConfig, AssemblyOptions, KmerOptions, MarkerGraphOptions,
    MinHashOptions, ReadGraphOptions,
};
use orneta::pipeline::{run_assembly, StartStage};
use orneta::reads::{reverse_complement, ReadStore};
use orneta::storage::BinaryStore;

fn synthetic_genome(length: usize, seed: u64) -> Vec<u8> {
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

/// Error-free tiling reads with alternating orientation.
fn tile_reads(genome: &[u8], read_length: usize, stride: usize) -> Vec<Vec<u8>> {
    let mut reads = Vec::new();
    let mut start = 0;
    let mut flip = false;
    while start + read_length <= genome.len() {
        let piece = genome[start..start + read_length].to_vec();
        reads.push(if flip { reverse_complement(&piece) } else { piece });
        flip = !flip;
        start += stride;
    }
    reads
}

fn write_fasta(path: &Path, reads: &[Vec<u8>]) {
    let mut file = File::create(path).unwrap();
    for (i, read) in reads.iter().enumerate() {
        writeln!(file, ">read{}", i).unwrap();
        file.write_all(read).unwrap();
        writeln!(file).unwrap();
    }
}

fn test_config() -> AssemblyConfig {
    AssemblyConfig {
        min_read_length: 1000,
        kmers: KmerOptions {
            k: 9,
            marker_density: 0.12,
            selection_method: 0,
            seed: 231,
            enrichment_threshold: 10.0,
            close_pair_distance: 30,
            file: None,
        },
        min_hash: MinHashOptions {
            m: 3,
            hash_fraction: 0.25,
            iteration_count: 4,
            bucket_bits: 13,
            min_bucket_size: 2,
            max_bucket_size: 40,
            min_frequency: 1,
        },
        align: AlignOptions {
            method: 0,
            max_skip: 20,
            max_drift: 15,
            max_marker_frequency: 15,
            min_aligned_marker_count: 15,
            min_aligned_fraction: 0.0,
            max_trim: 70,
            match_score: 6,
            mismatch_score: -1,
            gap_score: -1,
            band: 40,
        },
        read_graph: ReadGraphOptions {
            creation_method: 0,
            max_alignment_count: 12,
            strand_separation_method: 1,
            max_chimeric_read_distance: 3,
            cross_strand_max_distance: 3,
            min_component_size: 4,
            max_distance: 3,
            triangle_error_threshold: 1e6,
            least_square_error_threshold: 1e6,
            pseudo_path_min_score: 0.0,
            mismatch_square_factor: 3.0,
        },
        marker_graph: MarkerGraphOptions {
            min_coverage: 2,
            max_coverage: 50,
            min_coverage_per_strand: 0,
            allow_duplicate_markers: false,
            split_bad_vertices: false,
            delete_bad_vertices: false,
            low_coverage_threshold: 0,
            high_coverage_threshold: 100,
            max_distance: 30,
            edge_marker_skip_threshold: 100,
            prune_iteration_count: 8,
            simplify_max_length: vec![10],
            cross_edge_coverage_threshold: 0.0,
            peak_finder_min_area_fraction: 0.08,
            peak_finder_start: 2,
        },
        assembly: AssemblyOptions {
            mode: 0,
            detangle_method: 0,
            diagonal_read_count_min: 6,
            off_diagonal_read_count_max: 1,
            detangle_off_diagonal_ratio: 0.3,
            prune_length: 0,
            consensus_caller: "Modal".to_string(),
        },
        threads: 2,
    }
}

fn fasta_sequences(path: &Path) -> Vec<Vec<u8>> {
    let text = std::fs::read_to_string(path).unwrap();
    let mut sequences: Vec<Vec<u8>> = Vec::new();
    for line in text.lines() {
        if line.starts_with('>') {
            sequences.push(Vec::new());
        } else if let Some(last) = sequences.last_mut() {
            last.extend_from_slice(line.as_bytes());
        }
    }
    sequences
}

fn assert_substrings_of(sequences: &[Vec<u8>], genome: &[u8]) {
    let genome_string = String::from_utf8(genome.to_vec()).unwrap();
    let rc_string = String::from_utf8(reverse_complement(genome)).unwrap();
    for sequence in sequences {
        let s = String::from_utf8(sequence.clone()).unwrap();
        assert!(
            genome_string.contains(&s) || rc_string.contains(&s),
            "assembled segment of length {} is not a substring of the source",
            s.len()
        );
    }
}

fn run(reads: &[Vec<u8>], config: &AssemblyConfig, dir: &Path) -> orneta::stats::AssemblyStats {
    let fasta = dir.join("reads.fasta");
    write_fasta(&fasta, reads);
    let output = dir.join("run");
    run_assembly(config, &[PathBuf::from(&fasta)], &output, StartStage::Reads).unwrap()
}

/// S1: error-free reads tiling a genome reassemble into segments whose
/// sequences match the source exactly.
#[test]
fn perfect_reads_reassemble_the_genome() {
    let genome = synthetic_genome(8000, 77);
    let reads = tile_reads(&genome, 2000, 400);
    let dir = tempfile::tempdir().unwrap();
    let stats = run(&reads, &test_config(), dir.path());

    assert!(stats.segment_count >= 1);
    assert!(stats.segment_count <= 6, "fragmented: {}", stats.segment_count);
    let sequences = fasta_sequences(&dir.path().join("run/Assembly.fasta"));
    assert!(!sequences.is_empty());
    assert_substrings_of(&sequences, &genome);
    let longest = sequences.iter().map(|s| s.len()).max().unwrap();
    assert!(longest >= 2000, "longest segment only {} bases", longest);

    // the GFA has one S line per reverse complement segment pair
    let gfa = std::fs::read_to_string(dir.path().join("run/Assembly.gfa")).unwrap();
    let s_lines = gfa.lines().filter(|l| l.starts_with("S\t")).count();
    assert_eq!(s_lines, stats.segment_count);
}

/// Restarting at a later stage re-opens persisted state and reproduces the
/// same assembly.
#[test]
fn restart_reproduces_the_assembly() {
    let genome = synthetic_genome(8000, 77);
    let reads = tile_reads(&genome, 2000, 400);
    let dir = tempfile::tempdir().unwrap();
    let config = test_config();
    let first = run(&reads, &config, dir.path());

    let output = dir.path().join("run");
    let fasta = dir.path().join("reads.fasta");
    let second = run_assembly(
        &config,
        &[fasta],
        &output,
        StartStage::Assembly,
    )
    .unwrap();
    assert_eq!(first.segment_count, second.segment_count);
    assert_eq!(first.total_length, second.total_length);
    assert_eq!(first.n50, second.n50);
}

/// S3: a synthetic chimera joining two distant regions is flagged and the
/// assembly stays clean.
#[test]
fn chimeric_read_is_flagged_and_excluded() {
    let genome = synthetic_genome(8000, 77);
    let mut reads = tile_reads(&genome, 2000, 400);
    let normal_count = reads.len() as u32;
    // junction at a read boundary so the halves align with small trim
    let mut chimera = genome[0..2000].to_vec();
    chimera.extend_from_slice(&genome[6000..8000]);
    reads.push(chimera);

    let dir = tempfile::tempdir().unwrap();
    let _stats = run(&reads, &test_config(), dir.path());

    let store = BinaryStore::open(&dir.path().join("run")).unwrap();
    let read_store: ReadStore = store.load_object("Reads").unwrap();
    assert!(read_store.flags[normal_count as usize].is_chimeric);
    // ordinary reads stay unflagged
    let flagged: usize = read_store.flags.iter().filter(|f| f.is_chimeric).count();
    assert_eq!(flagged, 1);

    // topology stays clean: every assembled segment is a source substring
    let sequences = fasta_sequences(&dir.path().join("run/Assembly.fasta"));
    assert_substrings_of(&sequences, &genome);
}

/// S4: a palindromic read is discarded on input with a counter increment.
#[test]
fn palindromic_read_is_discarded() {
    let genome = synthetic_genome(8000, 77);
    let mut reads = tile_reads(&genome, 2000, 400);
    let normal_count = reads.len();
    // s + rc(s) equals its own reverse complement
    let mut palindrome = genome[100..1100].to_vec();
    palindrome.extend_from_slice(&reverse_complement(&genome[100..1100]));
    reads.push(palindrome);

    let dir = tempfile::tempdir().unwrap();
    let _stats = run(&reads, &test_config(), dir.path());

    let store = BinaryStore::open(&dir.path().join("run")).unwrap();
    let read_store: ReadStore = store.load_object("Reads").unwrap();
    assert!(read_store.discarded.palindromic >= 1);
    assert_eq!(read_store.read_count(), normal_count);

    let sequences = fasta_sequences(&dir.path().join("run/Assembly.fasta"));
    assert_substrings_of(&sequences, &genome);
}

/// S5: a short foreign tail shared by two reads forms a pruneable tip; the
/// final assembly contains no trace of it.
#[test]
fn short_tip_is_pruned_away() {
    let genome = synthetic_genome(8000, 77);
    let mut reads = tile_reads(&genome, 2000, 400);
    // two copies so the tip vertices pass the coverage filter
    let junk = synthetic_genome(40, 999);
    let mut extended = genome[5200..7200].to_vec();
    extended.extend_from_slice(&junk);
    reads.push(extended.clone());
    reads.push(extended);

    let dir = tempfile::tempdir().unwrap();
    let _stats = run(&reads, &test_config(), dir.path());

    let sequences = fasta_sequences(&dir.path().join("run/Assembly.fasta"));
    assert!(!sequences.is_empty());
    // nothing of the junk tail survives pruning
    assert_substrings_of(&sequences, &genome);
}

/// S2: two haplotypes differing at one heterozygous locus produce a bubble
/// in the assembly graph when simplification is disabled.
#[test]
fn heterozygous_locus_forms_a_bubble() {
    let hap_a = synthetic_genome(6000, 321);
    let mut hap_b = hap_a.clone();
    // substitute a short run in the middle so markers differ there
    for base in hap_b[3000..3020].iter_mut() {
        *base = match *base {
            b'A' => b'C',
            b'C' => b'G',
            b'G' => b'T',
            _ => b'A',
        };
    }
    let mut reads = tile_reads(&hap_a, 2000, 800);
    reads.extend(tile_reads(&hap_b, 2000, 800));

    let mut config = test_config();
    config.marker_graph.simplify_max_length = vec![];

    let dir = tempfile::tempdir().unwrap();
    let _stats = run(&reads, &config, dir.path());

    // find a bubble: two segments sharing source and target
    let store = BinaryStore::open(&dir.path().join("run")).unwrap();
    let records: Vec<(u64, u64, bool)> = {
        // SegmentRecord is private to the pipeline; read the raw fields
        #[derive(serde::Deserialize)]
        struct Record {
            source: u64,
            target: u64,
            was_split: bool,
        }
        let loaded: Vec<Record> = store.load_vector("AssemblyGraph-edges").unwrap();
        loaded
            .into_iter()
            .map(|r| (r.source, r.target, r.was_split))
            .collect()
    };
    let mut bubble_found = false;
    for i in 0..records.len() {
        for j in (i + 1)..records.len() {
            if records[i].0 == records[j].0
                && records[i].1 == records[j].1
                && records[i].0 != records[i].1
            {
                bubble_found = true;
            }
        }
    }
    assert!(bubble_found, "no bubble in {} segments", records.len());
}
