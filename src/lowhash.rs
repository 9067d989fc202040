/// Candidate pair module (LowHash)
/// A MinHash-style bucketed screen that produces (read, read) pairs likely to align.
/// 1. a feature is a window of m consecutive marker KmerIds on an oriented read
/// 2. each feature is hashed with a per-iteration seeded 64-bit mix,
///    features whose hash is below a fraction of the hash space are retained
/// 3. retained features place the oriented read into one of 2^bucketBits buckets
/// 4. oriented reads colliding in a good bucket (size within bounds) become pair candidates
/// 5. pairs seen in at least minFrequency iterations survive
/// Per-read placement statistics (sparse/good/crowded buckets) are recorded.

use fnv::{FnvHashMap, FnvHashSet};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::markers::MarkerIndex;
use crate::reads::{OrientedReadId, ReadId};

/// An unordered candidate pair, normalized to read_id0 < read_id1.
/// is_same_strand records the relative orientation, so the pair and its
/// reverse complement collapse to one entry.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct CandidatePair {
    pub read_id0: ReadId,
    pub read_id1: ReadId,
    pub is_same_strand: bool,
}

impl CandidatePair {
    pub fn new(a: OrientedReadId, b: OrientedReadId) -> Self {
        let is_same_strand = a.strand() == b.strand();
        let (read_id0, read_id1) = if a.read_id() < b.read_id() {
            (a.read_id(), b.read_id())
        } else {
            (b.read_id(), a.read_id())
        };
        CandidatePair {
            read_id0,
            read_id1,
            is_same_strand,
        }
    }

    /// The two oriented reads of this pair with strand0 = 0.
    pub fn oriented_reads(&self) -> (OrientedReadId, OrientedReadId) {
        (
            OrientedReadId::new(self.read_id0, 0),
            OrientedReadId::new(self.read_id1, if self.is_same_strand { 0 } else { 1 }),
        )
    }
}

/// Per-read bucket placement counters: [sparse, good, crowded].
pub type LowHashStatistics = [u64; 3];

pub struct LowHashConfig {
    pub m: usize,
    pub hash_fraction: f64,
    pub iteration_count: usize,
    pub bucket_bits: usize,
    pub min_bucket_size: usize,
    pub max_bucket_size: usize,
    pub min_frequency: usize,
    pub seed: u64,
}

/// 64-bit finalizer mix (splitmix style). Cheap, collisions are tolerated
/// because candidates are verified by actual alignment downstream.
fn mix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D049BB133111EB);
    x ^ (x >> 31)
}

/// Hash of one feature (a window of m KmerIds) under an iteration seed.
fn feature_hash(window: &[crate::kmers::KmerId], seed: u64) -> u64 {
    let mut h = seed;
    for &kmer_id in window {
        h = mix64(h ^ kmer_id);
    }
    h
}

/// Run the LowHash iterations and return the surviving candidate pairs
/// together with per-read placement statistics.
pub fn find_candidate_pairs(
    index: &MarkerIndex,
    read_count: usize,
    config: &LowHashConfig,
) -> (Vec<CandidatePair>, Vec<LowHashStatistics>) {
    let oriented_read_count = index.markers.len();
    let bucket_mask: u64 = (1u64 << config.bucket_bits) - 1;
    let hash_threshold: u64 = (config.hash_fraction * u64::MAX as f64) as u64;

    let mut statistics: Vec<LowHashStatistics> = vec![[0; 3]; read_count];
    let mut pair_frequency: FnvHashMap<CandidatePair, u32> = FnvHashMap::default();

    for iteration in 0..config.iteration_count {
        let iteration_seed = mix64(config.seed ^ (iteration as u64));

        // compute retained (bucket, oriented read) placements in parallel
        let mut placements: Vec<(u64, u32)> = (0..oriented_read_count as u32)
            .into_par_iter()
            .flat_map_iter(|oriented_index| {
                let markers = &index.markers[oriented_index as usize];
                let mut local: Vec<(u64, u32)> = Vec::new();
                if markers.len() >= config.m {
                    let kmer_ids: Vec<crate::kmers::KmerId> =
                        markers.iter().map(|m| m.kmer_id).collect();
                    let mut seen_buckets: FnvHashSet<u64> = FnvHashSet::default();
                    for window in kmer_ids.windows(config.m) {
                        let h = feature_hash(window, iteration_seed);
                        if h <= hash_threshold {
                            let bucket = h & bucket_mask;
                            // one placement per (read, bucket) per iteration
                            if seen_buckets.insert(bucket) {
                                local.push((bucket, oriented_index));
                            }
                        }
                    }
                }
                local
            })
            .collect();

        // group by bucket
        placements.sort_unstable();

        let mut iteration_pairs: FnvHashSet<CandidatePair> = FnvHashSet::default();
        let mut start = 0usize;
        while start < placements.len() {
            let bucket = placements[start].0;
            let mut end = start;
            while end < placements.len() && placements[end].0 == bucket {
                end += 1;
            }
            let size = end - start;

            // classify the placement for each oriented read in the bucket
            let class: usize = if size < config.min_bucket_size {
                0
            } else if size <= config.max_bucket_size {
                1
            } else {
                2
            };
            for &(_, oriented_index) in &placements[start..end] {
                let read_id = OrientedReadId::from_value(oriented_index).read_id();
                statistics[read_id as usize][class] += 1;
            }

            if class == 1 {
                for i in start..end {
                    for j in (i + 1)..end {
                        let a = OrientedReadId::from_value(placements[i].1);
                        let b = OrientedReadId::from_value(placements[j].1);
                        if a.read_id() == b.read_id() {
                            continue;
                        }
                        iteration_pairs.insert(CandidatePair::new(a, b));
                    }
                }
            }
            start = end;
        }

        for pair in iteration_pairs {
            *pair_frequency.entry(pair).or_insert(0) += 1;
        }
    }

    let mut candidates: Vec<CandidatePair> = pair_frequency
        .into_iter()
        .filter(|&(_, frequency)| frequency as usize >= config.min_frequency)
        .map(|(pair, _)| pair)
        .collect();
    candidates.sort_unstable();

    log::info!("LowHash found {} candidate pairs", candidates.len());
    (candidates, statistics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmers::{select_kmers, KmerSelectionConfig, KmerSelectionMethod};
    use crate::markers::MarkerIndex;
    use crate::reads::{reverse_complement, ReadStore};

    fn test_config() -> LowHashConfig {
        LowHashConfig {
            m: 2,
            hash_fraction: 1.0,
            iteration_count: 2,
            bucket_bits: 16,
            min_bucket_size: 2,
            max_bucket_size: 16,
            min_frequency: 1,
            seed: 99,
        }
    }

    fn build_index(reads: &ReadStore) -> MarkerIndex {
        let config = KmerSelectionConfig {
            k: 3,
            density: 0.5,
            seed: 5,
            method: KmerSelectionMethod::Random,
            enrichment_threshold: 10.0,
            close_pair_distance: 0,
            file: None,
        };
        let table = select_kmers(&config, reads).unwrap();
        MarkerIndex::build(reads, &table)
    }

    #[test]
    fn identical_reads_become_candidates() {
        let mut reads = ReadStore::new();
        let seq = b"ACGGTCAGGTTCAGGACCTGAA";
        reads.add_read("a", seq, 1).unwrap();
        reads.add_read("b", seq, 1).unwrap();
        let index = build_index(&reads);

        let (candidates, stats) = find_candidate_pairs(&index, reads.read_count(), &test_config());
        assert!(candidates.contains(&CandidatePair {
            read_id0: 0,
            read_id1: 1,
            is_same_strand: true
        }));
        // every placement lands in some class
        assert!(stats.iter().any(|s| s.iter().sum::<u64>() > 0));
    }

    #[test]
    fn reverse_complement_reads_become_opposite_strand_candidates() {
        let mut reads = ReadStore::new();
        let seq = b"ACGGTCAGGTTCAGGACCTGAA";
        reads.add_read("a", seq, 1).unwrap();
        reads.add_read("b", &reverse_complement(seq), 1).unwrap();
        let index = build_index(&reads);

        let (candidates, _) = find_candidate_pairs(&index, reads.read_count(), &test_config());
        assert!(candidates.contains(&CandidatePair {
            read_id0: 0,
            read_id1: 1,
            is_same_strand: false
        }));
    }

    #[test]
    fn deterministic_across_runs() {
        let mut reads = ReadStore::new();
        reads.add_read("a", b"ACGGTCAGGTTCAGGACCTGAA", 1).unwrap();
        reads.add_read("b", b"TCAGGTTCAGGACCTGAAGGCA", 1).unwrap();
        let index = build_index(&reads);
        let (c1, s1) = find_candidate_pairs(&index, reads.read_count(), &test_config());
        let (c2, s2) = find_candidate_pairs(&index, reads.read_count(), &test_config());
        assert_eq!(c1, c2);
        assert_eq!(s1, s2);
    }
}
