/// Configuration module
/// Plain config structs for every pipeline stage plus validation.
/// Validation runs before any heavy work and names the offending option.

use std::path::PathBuf;

use crate::align::{AlignMethod, AlignParams};
use crate::assembly_graph::{DetangleParams, PseudoPathAlignParams};
use crate::consensus::consensus_caller_from_string;
use crate::error::{AssemblyError, Result};
use crate::kmers::{KmerSelectionConfig, KmerSelectionMethod};
use crate::lowhash::LowHashConfig;
use crate::marker_graph::VertexFilterParams;
use crate::read_graph::ReadGraphCreationMethod;
use crate::transitive_reduction::TransitiveReductionParams;

pub struct KmerOptions {
    pub k: usize,
    pub marker_density: f64,
    pub selection_method: u32,
    pub seed: u64,
    pub enrichment_threshold: f64,
    pub close_pair_distance: usize,
    pub file: Option<PathBuf>,
}

pub struct MinHashOptions {
    pub m: usize,
    pub hash_fraction: f64,
    pub iteration_count: usize,
    pub bucket_bits: usize,
    pub min_bucket_size: usize,
    pub max_bucket_size: usize,
    pub min_frequency: usize,
}

pub struct AlignOptions {
    pub method: u32,
    pub max_skip: u32,
    pub max_drift: u32,
    pub max_marker_frequency: u32,
    pub min_aligned_marker_count: u32,
    pub min_aligned_fraction: f64,
    pub max_trim: u32,
    pub match_score: i32,
    pub mismatch_score: i32,
    pub gap_score: i32,
    pub band: u32,
}

pub struct ReadGraphOptions {
    pub creation_method: u32,
    pub max_alignment_count: usize,
    pub strand_separation_method: u32,
    pub max_chimeric_read_distance: u32,
    pub cross_strand_max_distance: u32,
    pub min_component_size: usize,
    pub max_distance: u32,
    pub triangle_error_threshold: f64,
    pub least_square_error_threshold: f64,
    pub pseudo_path_min_score: f64,
    pub mismatch_square_factor: f64,
}

pub struct MarkerGraphOptions {
    pub min_coverage: usize,
    pub max_coverage: usize,
    pub min_coverage_per_strand: usize,
    pub allow_duplicate_markers: bool,
    pub split_bad_vertices: bool,
    pub delete_bad_vertices: bool,
    pub low_coverage_threshold: usize,
    pub high_coverage_threshold: usize,
    pub max_distance: usize,
    pub edge_marker_skip_threshold: u32,
    pub prune_iteration_count: usize,
    pub simplify_max_length: Vec<usize>,
    pub cross_edge_coverage_threshold: f64,
    pub peak_finder_min_area_fraction: f64,
    pub peak_finder_start: usize,
}

pub struct AssemblyOptions {
    pub mode: u32,
    pub detangle_method: u32,
    pub diagonal_read_count_min: usize,
    pub off_diagonal_read_count_max: usize,
    pub detangle_off_diagonal_ratio: f64,
    pub prune_length: usize,
    pub consensus_caller: String,
}

pub struct AssemblyConfig {
    pub min_read_length: usize,
    pub kmers: KmerOptions,
    pub min_hash: MinHashOptions,
    pub align: AlignOptions,
    pub read_graph: ReadGraphOptions,
    pub marker_graph: MarkerGraphOptions,
    pub assembly: AssemblyOptions,
    pub threads: usize,
}

impl AssemblyConfig {
    /// Validate everything up front. Each failure names the option.
    pub fn validate(&self) -> Result<()> {
        if self.kmers.k % 2 == 0 {
            // even k admits self-complementary k-mers, which would break
            // the paired-KmerId invariant everywhere downstream
            return Err(AssemblyError::config(format!(
                "kmers.k must be odd, got {}",
                self.kmers.k
            )));
        }
        if self.kmers.k < 3 || self.kmers.k > 15 {
            return Err(AssemblyError::config(format!(
                "kmers.k must be in [3, 15], got {}",
                self.kmers.k
            )));
        }
        if !(0.0 < self.kmers.marker_density && self.kmers.marker_density <= 1.0) {
            return Err(AssemblyError::config(format!(
                "kmers.markerDensity must be in (0, 1], got {}",
                self.kmers.marker_density
            )));
        }
        KmerSelectionMethod::from_code(self.kmers.selection_method)?;

        if self.min_hash.m == 0 {
            return Err(AssemblyError::config("minHash.m must be positive"));
        }
        if !(0.0 < self.min_hash.hash_fraction && self.min_hash.hash_fraction <= 1.0) {
            return Err(AssemblyError::config(format!(
                "minHash.hashFraction must be in (0, 1], got {}",
                self.min_hash.hash_fraction
            )));
        }
        if self.min_hash.bucket_bits == 0 || self.min_hash.bucket_bits > 31 {
            return Err(AssemblyError::config(format!(
                "minHash.bucketBits must be in [1, 31], got {}",
                self.min_hash.bucket_bits
            )));
        }
        if self.min_hash.min_bucket_size > self.min_hash.max_bucket_size {
            return Err(AssemblyError::config(
                "minHash.minBucketSize exceeds minHash.maxBucketSize",
            ));
        }

        AlignMethod::from_code(self.align.method)?;
        if self.align.min_aligned_fraction < 0.0 || self.align.min_aligned_fraction > 1.0 {
            return Err(AssemblyError::config(format!(
                "align.minAlignedFraction must be in [0, 1], got {}",
                self.align.min_aligned_fraction
            )));
        }

        ReadGraphCreationMethod::from_code(self.read_graph.creation_method)?;
        if self.read_graph.strand_separation_method > 2 {
            return Err(AssemblyError::config(format!(
                "readGraph.strandSeparationMethod {} is not one of 0,1,2",
                self.read_graph.strand_separation_method
            )));
        }
        if self.read_graph.max_alignment_count == 0 {
            return Err(AssemblyError::config(
                "readGraph.maxAlignmentCount must be positive",
            ));
        }

        if self.marker_graph.min_coverage > self.marker_graph.max_coverage {
            return Err(AssemblyError::config(
                "markerGraph.minCoverage exceeds markerGraph.maxCoverage",
            ));
        }
        if self.marker_graph.low_coverage_threshold >= self.marker_graph.high_coverage_threshold {
            return Err(AssemblyError::config(
                "markerGraph.lowCoverageThreshold must be below markerGraph.highCoverageThreshold",
            ));
        }
        if self.marker_graph.split_bad_vertices && self.marker_graph.delete_bad_vertices {
            return Err(AssemblyError::config(
                "markerGraph.splitBadVertices and markerGraph.deleteBadVertices are mutually exclusive",
            ));
        }

        if self.assembly.mode > 2 {
            return Err(AssemblyError::config(format!(
                "assembly.mode {} is not one of 0,1,2",
                self.assembly.mode
            )));
        }
        if self.assembly.detangle_method > 2 {
            return Err(AssemblyError::config(format!(
                "assembly.detangleMethod {} is not one of 0,1,2",
                self.assembly.detangle_method
            )));
        }
        consensus_caller_from_string(&self.assembly.consensus_caller)?;

        if self.threads == 0 {
            return Err(AssemblyError::config("threads must be positive"));
        }
        Ok(())
    }

    pub fn kmer_selection(&self) -> KmerSelectionConfig {
        KmerSelectionConfig {
            k: self.kmers.k,
            density: self.kmers.marker_density,
            seed: self.kmers.seed,
            method: KmerSelectionMethod::from_code(self.kmers.selection_method).unwrap(),
            enrichment_threshold: self.kmers.enrichment_threshold,
            close_pair_distance: self.kmers.close_pair_distance,
            file: self.kmers.file.clone(),
        }
    }

    pub fn lowhash(&self) -> LowHashConfig {
        LowHashConfig {
            m: self.min_hash.m,
            hash_fraction: self.min_hash.hash_fraction,
            iteration_count: self.min_hash.iteration_count,
            bucket_bits: self.min_hash.bucket_bits,
            min_bucket_size: self.min_hash.min_bucket_size,
            max_bucket_size: self.min_hash.max_bucket_size,
            min_frequency: self.min_hash.min_frequency,
            seed: self.kmers.seed,
        }
    }

    pub fn align_params(&self) -> AlignParams {
        AlignParams {
            method: AlignMethod::from_code(self.align.method).unwrap(),
            max_skip: self.align.max_skip,
            max_drift: self.align.max_drift,
            max_marker_frequency: self.align.max_marker_frequency,
            min_aligned_marker_count: self.align.min_aligned_marker_count,
            min_aligned_fraction: self.align.min_aligned_fraction,
            max_trim: self.align.max_trim,
            match_score: self.align.match_score,
            mismatch_score: self.align.mismatch_score,
            gap_score: self.align.gap_score,
            band: self.align.band,
        }
    }

    pub fn vertex_filter(&self) -> VertexFilterParams {
        VertexFilterParams {
            min_coverage: self.marker_graph.min_coverage,
            max_coverage: self.marker_graph.max_coverage,
            min_coverage_per_strand: self.marker_graph.min_coverage_per_strand,
            allow_duplicate_markers: self.marker_graph.allow_duplicate_markers,
            split_bad_vertices: self.marker_graph.split_bad_vertices,
            delete_bad_vertices: self.marker_graph.delete_bad_vertices,
            exclude_bridge_edges: self.read_graph.strand_separation_method == 2,
            peak_finder_min_area_fraction: self.marker_graph.peak_finder_min_area_fraction,
            peak_finder_start: self.marker_graph.peak_finder_start,
        }
    }

    pub fn transitive_reduction_params(&self) -> TransitiveReductionParams {
        TransitiveReductionParams {
            low_coverage_threshold: self.marker_graph.low_coverage_threshold,
            high_coverage_threshold: self.marker_graph.high_coverage_threshold,
            max_distance: self.marker_graph.max_distance,
            edge_marker_skip_threshold: self.marker_graph.edge_marker_skip_threshold,
        }
    }

    pub fn detangle_params(&self) -> DetangleParams {
        DetangleParams {
            diagonal_read_count_min: self.assembly.diagonal_read_count_min,
            off_diagonal_read_count_max: self.assembly.off_diagonal_read_count_max,
            off_diagonal_ratio: self.assembly.detangle_off_diagonal_ratio,
        }
    }

    pub fn pseudo_path_align_params(&self) -> PseudoPathAlignParams {
        PseudoPathAlignParams {
            match_score: self.align.match_score,
            mismatch_score: self.align.mismatch_score,
            gap_score: self.align.gap_score,
            mismatch_square_factor: self.read_graph.mismatch_square_factor,
            min_score: self.read_graph.pseudo_path_min_score,
        }
    }
}
