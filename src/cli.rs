use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{
    AlignOptions, AssemblyConfig, AssemblyOptions, KmerOptions, MarkerGraphOptions,
    MinHashOptions, ReadGraphOptions,
};

#[derive(Parser)]
#[command(
    name = "Orneta",
    version = "0.1",
    about = "De novo genome assembly for noisy long reads using a marker graph approach"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Full genome assembly pipeline
    Assemble(AssembleArgs),

    /// Write a random strand-symmetric marker k-mer set to a file
    SelectKmers(SelectKmersArgs),
}

#[derive(Args)]
pub struct AssembleArgs {
    /// Input reads, FASTA format (repeatable)
    #[arg(short = 'i', long, required = true)]
    pub input: Vec<PathBuf>,

    /// Assembly directory for persisted state and output
    #[arg(short = 'o', long, default_value = "OrnetaRun")]
    pub output_dir: PathBuf,

    /// Pipeline stage to start at, re-opening earlier state
    /// (reads, kmers, markers, candidates, alignments, read-graph,
    /// marker-graph, cleanup, assembly)
    #[arg(long, default_value = "reads")]
    pub start_at: String,

    /// Worker threads (0 = hardware concurrency)
    #[arg(long, default_value_t = 0)]
    pub threads: usize,

    /// Reads shorter than this are discarded
    #[arg(long, default_value_t = 10000)]
    pub min_read_length: usize,

    /// Marker length (must be odd)
    #[arg(short = 'k', long, default_value_t = 11)]
    pub k: usize,

    /// Fraction of k-mers used as markers
    #[arg(long, default_value_t = 0.1)]
    pub marker_density: f64,

    /// Marker selection method (0 random, 1 minus globally overenriched,
    /// 2 minus locally overenriched, 3 minus close repeats, 4 from file)
    #[arg(long, default_value_t = 0)]
    pub kmer_selection_method: u32,

    /// Seed for marker selection and LowHash
    #[arg(long, default_value_t = 231)]
    pub seed: u64,

    /// Overenrichment ratio threshold for selection methods 1 and 2
    #[arg(long, default_value_t = 10.0)]
    pub enrichment_threshold: f64,

    /// Distance bound for selection method 3
    #[arg(long, default_value_t = 30)]
    pub close_pair_distance: usize,

    /// Marker k-mer file for selection method 4
    #[arg(long)]
    pub kmer_file: Option<PathBuf>,

    /// Markers per LowHash feature
    #[arg(long, default_value_t = 4)]
    pub min_hash_m: usize,

    /// Fraction of feature hashes retained per iteration
    #[arg(long, default_value_t = 0.01)]
    pub hash_fraction: f64,

    /// LowHash iterations
    #[arg(long, default_value_t = 10)]
    pub min_hash_iterations: usize,

    /// log2 of the LowHash bucket count
    #[arg(long, default_value_t = 16)]
    pub bucket_bits: usize,

    /// Bucket size bounds for candidate generation
    #[arg(long, default_value_t = 2)]
    pub min_bucket_size: usize,
    #[arg(long, default_value_t = 10)]
    pub max_bucket_size: usize,

    /// Iterations a pair must collide in to become a candidate
    #[arg(long, default_value_t = 2)]
    pub min_frequency: usize,

    /// Alignment method (0 ordinal chaining, 1 banded, 3 banded with
    /// estimated offset, 4 sparse diagonal)
    #[arg(long, default_value_t = 0)]
    pub align_method: u32,

    #[arg(long, default_value_t = 30)]
    pub max_skip: u32,

    #[arg(long, default_value_t = 30)]
    pub max_drift: u32,

    /// Marker k-mers more frequent than this on a read are not used to align
    #[arg(long, default_value_t = 10)]
    pub max_marker_frequency: u32,

    #[arg(long, default_value_t = 100)]
    pub min_aligned_marker_count: u32,

    #[arg(long, default_value_t = 0.0)]
    pub min_aligned_fraction: f64,

    #[arg(long, default_value_t = 30)]
    pub max_trim: u32,

    #[arg(long, default_value_t = 6)]
    pub match_score: i32,

    #[arg(long, default_value_t = -1)]
    pub mismatch_score: i32,

    #[arg(long, default_value_t = -1)]
    pub gap_score: i32,

    /// Band half-width for the banded alignment methods
    #[arg(long, default_value_t = 50)]
    pub align_band: u32,

    /// Read graph creation method (0 best alignments, 2 pseudo-path filtered)
    #[arg(long, default_value_t = 0)]
    pub read_graph_creation_method: u32,

    /// Alignments each read may keep in the read graph
    #[arg(long, default_value_t = 6)]
    pub max_alignment_count: usize,

    /// Strand separation (0 off, 1 flag cross-strand edges, 2 also exclude bridges)
    #[arg(long, default_value_t = 1)]
    pub strand_separation_method: u32,

    #[arg(long, default_value_t = 2)]
    pub max_chimeric_read_distance: u32,

    #[arg(long, default_value_t = 5)]
    pub cross_strand_max_distance: u32,

    /// Read graph components smaller than this are excluded from assembly
    #[arg(long, default_value_t = 100)]
    pub min_component_size: usize,

    /// BFS radius for bridge detection and offset fitting
    #[arg(long, default_value_t = 5)]
    pub read_graph_max_distance: u32,

    #[arg(long, default_value_t = 200.0)]
    pub triangle_error_threshold: f64,

    #[arg(long, default_value_t = 200.0)]
    pub least_square_error_threshold: f64,

    /// Minimum pseudo-path alignment score for creation method 2
    #[arg(long, default_value_t = 0.0)]
    pub pseudo_path_min_score: f64,

    #[arg(long, default_value_t = 3.0)]
    pub mismatch_square_factor: f64,

    /// Marker graph vertex coverage bounds (minCoverage 0 = automatic)
    #[arg(long, default_value_t = 10)]
    pub min_coverage: usize,
    #[arg(long, default_value_t = 100)]
    pub max_coverage: usize,
    #[arg(long, default_value_t = 0)]
    pub min_coverage_per_strand: usize,

    /// Keep vertices holding two markers of the same oriented read
    #[arg(long, default_value_t = false)]
    pub allow_duplicate_markers: bool,

    /// Bad vertex repair: split along minority oriented reads
    #[arg(long, default_value_t = false)]
    pub split_bad_vertices: bool,

    /// Bad vertex repair: delete the whole vertex
    #[arg(long, default_value_t = false)]
    pub delete_bad_vertices: bool,

    /// Transitive reduction thresholds
    #[arg(long, default_value_t = 1)]
    pub low_coverage_threshold: usize,
    #[arg(long, default_value_t = 256)]
    pub high_coverage_threshold: usize,
    #[arg(long, default_value_t = 30)]
    pub marker_graph_max_distance: usize,
    #[arg(long, default_value_t = 100)]
    pub edge_marker_skip_threshold: u32,

    #[arg(long, default_value_t = 6)]
    pub prune_iteration_count: usize,

    /// Superbubble removal maxLength schedule
    #[arg(long, value_delimiter = ',', default_values_t = [10usize, 100, 1000])]
    pub simplify_max_length: Vec<usize>,

    /// Cross edges with average coverage at or below this are removed (0 = off)
    #[arg(long, default_value_t = 0.0)]
    pub cross_edge_coverage_threshold: f64,

    /// Peak finder controls for automatic minCoverage selection
    #[arg(long, default_value_t = 0.08)]
    pub peak_finder_min_area_fraction: f64,
    #[arg(long, default_value_t = 5)]
    pub peak_finder_start: usize,

    /// Assembly mode
    #[arg(long, default_value_t = 0)]
    pub assembly_mode: u32,

    /// Detangle method (0 off)
    #[arg(long, default_value_t = 0)]
    pub detangle_method: u32,

    #[arg(long, default_value_t = 6)]
    pub diagonal_read_count_min: usize,

    #[arg(long, default_value_t = 1)]
    pub off_diagonal_read_count_max: usize,

    #[arg(long, default_value_t = 0.3)]
    pub detangle_off_diagonal_ratio: f64,

    /// Dead-end assembly segments of at most this many marker graph edges
    /// are pruned (0 = off)
    #[arg(long, default_value_t = 0)]
    pub prune_length: usize,

    /// Consensus caller: Modal, Median, or Bayesian[:errorProbability]
    #[arg(long, default_value = "Modal")]
    pub consensus_caller: String,
}

impl From<&AssembleArgs> for AssemblyConfig {
    fn from(args: &AssembleArgs) -> Self {
        AssemblyConfig {
            min_read_length: args.min_read_length,
            kmers: KmerOptions {
                k: args.k,
                marker_density: args.marker_density,
                selection_method: args.kmer_selection_method,
                seed: args.seed,
                enrichment_threshold: args.enrichment_threshold,
                close_pair_distance: args.close_pair_distance,
                file: args.kmer_file.clone(),
            },
            min_hash: MinHashOptions {
                m: args.min_hash_m,
                hash_fraction: args.hash_fraction,
                iteration_count: args.min_hash_iterations,
                bucket_bits: args.bucket_bits,
                min_bucket_size: args.min_bucket_size,
                max_bucket_size: args.max_bucket_size,
                min_frequency: args.min_frequency,
            },
            align: AlignOptions {
                method: args.align_method,
                max_skip: args.max_skip,
                max_drift: args.max_drift,
                max_marker_frequency: args.max_marker_frequency,
                min_aligned_marker_count: args.min_aligned_marker_count,
                min_aligned_fraction: args.min_aligned_fraction,
                max_trim: args.max_trim,
                match_score: args.match_score,
                mismatch_score: args.mismatch_score,
                gap_score: args.gap_score,
                band: args.align_band,
            },
            read_graph: ReadGraphOptions {
                creation_method: args.read_graph_creation_method,
                max_alignment_count: args.max_alignment_count,
                strand_separation_method: args.strand_separation_method,
                max_chimeric_read_distance: args.max_chimeric_read_distance,
                cross_strand_max_distance: args.cross_strand_max_distance,
                min_component_size: args.min_component_size,
                max_distance: args.read_graph_max_distance,
                triangle_error_threshold: args.triangle_error_threshold,
                least_square_error_threshold: args.least_square_error_threshold,
                pseudo_path_min_score: args.pseudo_path_min_score,
                mismatch_square_factor: args.mismatch_square_factor,
            },
            marker_graph: MarkerGraphOptions {
                min_coverage: args.min_coverage,
                max_coverage: args.max_coverage,
                min_coverage_per_strand: args.min_coverage_per_strand,
                allow_duplicate_markers: args.allow_duplicate_markers,
                split_bad_vertices: args.split_bad_vertices,
                delete_bad_vertices: args.delete_bad_vertices,
                low_coverage_threshold: args.low_coverage_threshold,
                high_coverage_threshold: args.high_coverage_threshold,
                max_distance: args.marker_graph_max_distance,
                edge_marker_skip_threshold: args.edge_marker_skip_threshold,
                prune_iteration_count: args.prune_iteration_count,
                simplify_max_length: args.simplify_max_length.clone(),
                cross_edge_coverage_threshold: args.cross_edge_coverage_threshold,
                peak_finder_min_area_fraction: args.peak_finder_min_area_fraction,
                peak_finder_start: args.peak_finder_start,
            },
            assembly: AssemblyOptions {
                mode: args.assembly_mode,
                detangle_method: args.detangle_method,
                diagonal_read_count_min: args.diagonal_read_count_min,
                off_diagonal_read_count_max: args.off_diagonal_read_count_max,
                detangle_off_diagonal_ratio: args.detangle_off_diagonal_ratio,
                prune_length: args.prune_length,
                consensus_caller: args.consensus_caller.clone(),
            },
            threads: if args.threads == 0 {
                num_cpus::get()
            } else {
                args.threads
            },
        }
    }
}

#[derive(Args)]
pub struct SelectKmersArgs {
    /// Marker length (must be odd)
    #[arg(short = 'k', long, default_value_t = 11)]
    pub k: usize,

    /// Fraction of k-mers to select
    #[arg(long, default_value_t = 0.1)]
    pub marker_density: f64,

    #[arg(long, default_value_t = 231)]
    pub seed: u64,

    /// Output file, one k-mer per line
    #[arg(short = 'o', long, default_value = "Kmers.txt")]
    pub output: PathBuf,
}
