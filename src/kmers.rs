/// Marker selection module
/// A k-mer is encoded as a KmerId, its canonical numeric value in 0..4^k.
/// A subset of all k-mers is selected as "markers" up front; everything
/// downstream only looks at marker occurrences.
/// Selection variants:
/// 1. random at density p, seeded
/// 2. random minus globally overenriched k-mers
/// 3. random minus k-mers overenriched in any single oriented read
/// 4. random minus k-mers occurring twice at close distance in any oriented read
/// 5. read from file
/// Strand symmetry is an invariant: a k-mer is a marker iff its reverse
/// complement is. Random selection draws one decision per complementary pair,
/// exclusion passes always clear both members of a pair.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{AssemblyError, Result};
use crate::reads::{OrientedReadId, ReadStore};

pub type KmerId = u64;

/// Numeric code of one base: A=0, C=1, G=2, T=3.
pub fn base_to_code(base: u8) -> u64 {
    match base {
        b'A' => 0,
        b'C' => 1,
        b'G' => 2,
        b'T' => 3,
        _ => unreachable!("read store only holds A,C,G,T"),
    }
}

pub fn code_to_base(code: u64) -> u8 {
    match code & 3 {
        0 => b'A',
        1 => b'C',
        2 => b'G',
        _ => b'T',
    }
}

/// Encode the k-mer starting at the front of seq.
pub fn encode_kmer(seq: &[u8]) -> KmerId {
    let mut id: KmerId = 0;
    for &base in seq {
        id = (id << 2) | base_to_code(base);
    }
    id
}

pub fn decode_kmer(mut id: KmerId, k: usize) -> Vec<u8> {
    let mut out = vec![0u8; k];
    for i in (0..k).rev() {
        out[i] = code_to_base(id);
        id >>= 2;
    }
    out
}

/// Reverse complement of a KmerId: complement each 2-bit code (3 - code)
/// and reverse the code order.
pub fn reverse_complement_kmer(id: KmerId, k: usize) -> KmerId {
    let mut rc: KmerId = 0;
    let mut id = id;
    for _ in 0..k {
        rc = (rc << 2) | (3 - (id & 3));
        id >>= 2;
    }
    rc
}

#[derive(Copy, Clone, Default, Serialize, Deserialize)]
pub struct KmerInfo {
    pub is_marker: bool,
    pub is_overenriched: bool,
}

/// Flat table over all 4^k KmerIds.
#[derive(Serialize, Deserialize)]
pub struct KmerTable {
    pub k: usize,
    infos: Vec<KmerInfo>,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum KmerSelectionMethod {
    Random,
    ExcludeGlobalOverenriched,
    ExcludeLocalOverenriched,
    ExcludeClosePairs,
    ReadFromFile,
}

impl KmerSelectionMethod {
    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            0 => Ok(KmerSelectionMethod::Random),
            1 => Ok(KmerSelectionMethod::ExcludeGlobalOverenriched),
            2 => Ok(KmerSelectionMethod::ExcludeLocalOverenriched),
            3 => Ok(KmerSelectionMethod::ExcludeClosePairs),
            4 => Ok(KmerSelectionMethod::ReadFromFile),
            other => Err(AssemblyError::config(format!(
                "kmers.selectionMethod {} is not one of 0,1,2,3,4",
                other
            ))),
        }
    }
}

impl KmerTable {
    fn empty(k: usize) -> Self {
        KmerTable {
            k,
            infos: vec![KmerInfo::default(); 1usize << (2 * k)],
        }
    }

    pub fn kmer_count(&self) -> usize {
        self.infos.len()
    }

    pub fn is_marker(&self, id: KmerId) -> bool {
        self.infos[id as usize].is_marker
    }

    pub fn is_overenriched(&self, id: KmerId) -> bool {
        self.infos[id as usize].is_overenriched
    }

    pub fn marker_count(&self) -> usize {
        self.infos.iter().filter(|i| i.is_marker).count()
    }

    fn set_pair(&mut self, id: KmerId, is_marker: bool) {
        let rc = reverse_complement_kmer(id, self.k);
        self.infos[id as usize].is_marker = is_marker;
        self.infos[rc as usize].is_marker = is_marker;
    }

    fn clear_overenriched_pair(&mut self, id: KmerId) {
        let rc = reverse_complement_kmer(id, self.k);
        for i in [id, rc] {
            self.infos[i as usize].is_marker = false;
            self.infos[i as usize].is_overenriched = true;
        }
    }

    /// Deterministic symmetry enforcement: a pair stays selected only if
    /// both members are selected.
    fn enforce_strand_symmetry(&mut self) {
        for id in 0..self.infos.len() as KmerId {
            let rc = reverse_complement_kmer(id, self.k);
            if id < rc {
                let both = self.infos[id as usize].is_marker && self.infos[rc as usize].is_marker;
                self.infos[id as usize].is_marker = both;
                self.infos[rc as usize].is_marker = both;
            }
        }
    }

    /// Invariant check used by tests and the pipeline after selection.
    pub fn is_strand_symmetric(&self) -> bool {
        (0..self.infos.len() as KmerId).all(|id| {
            let rc = reverse_complement_kmer(id, self.k);
            self.infos[id as usize].is_marker == self.infos[rc as usize].is_marker
        })
    }
}

/// Random selection at the requested density. One random draw decides each
/// complementary pair, so the result is strand symmetric by construction.
fn select_random(k: usize, density: f64, seed: u64) -> KmerTable {
    let mut table = KmerTable::empty(k);
    let mut rng = SmallRng::seed_from_u64(seed);
    for id in 0..table.kmer_count() as KmerId {
        let rc = reverse_complement_kmer(id, k);
        // odd k: id == rc cannot happen, enforced at config validation
        if id < rc {
            let selected = rng.gen_bool(density);
            table.set_pair(id, selected);
        }
    }
    table
}

/// Count occurrences of every k-mer over all oriented reads (both strands).
fn count_kmer_occurrences(k: usize, reads: &ReadStore) -> Vec<u64> {
    let mut counts = vec![0u64; 1usize << (2 * k)];
    let mask: KmerId = (1 << (2 * k)) - 1;
    for read_id in 0..reads.read_count() as u32 {
        for strand in 0..2u32 {
            let seq = reads.oriented_sequence(OrientedReadId::new(read_id, strand));
            if seq.len() < k {
                continue;
            }
            let mut id = encode_kmer(&seq[..k]);
            counts[id as usize] += 1;
            for &base in &seq[k..] {
                id = ((id << 2) | base_to_code(base)) & mask;
                counts[id as usize] += 1;
            }
        }
    }
    counts
}

fn exclude_global_overenriched(table: &mut KmerTable, reads: &ReadStore, enrichment_threshold: f64) {
    let counts = count_kmer_occurrences(table.k, reads);
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return;
    }
    // uniform expectation per k-mer over the whole input
    let expected = total as f64 / table.kmer_count() as f64;
    let mut excluded = 0usize;
    for id in 0..table.kmer_count() as KmerId {
        if table.is_marker(id) && counts[id as usize] as f64 > enrichment_threshold * expected {
            table.clear_overenriched_pair(id);
            excluded += 1;
        }
    }
    log::info!("Excluded {} globally overenriched k-mers", excluded);
}

fn exclude_local_overenriched(table: &mut KmerTable, reads: &ReadStore, enrichment_threshold: f64) {
    let k = table.k;
    let mask: KmerId = (1 << (2 * k)) - 1;
    let kmer_count = table.kmer_count() as f64;
    let mut excluded = 0usize;
    let mut per_read: fnv::FnvHashMap<KmerId, u64> = fnv::FnvHashMap::default();
    for read_id in 0..reads.read_count() as u32 {
        for strand in 0..2u32 {
            let seq = reads.oriented_sequence(OrientedReadId::new(read_id, strand));
            if seq.len() < k {
                continue;
            }
            per_read.clear();
            let window_count = (seq.len() - k + 1) as f64;
            let mut id = encode_kmer(&seq[..k]);
            *per_read.entry(id).or_insert(0) += 1;
            for &base in &seq[k..] {
                id = ((id << 2) | base_to_code(base)) & mask;
                *per_read.entry(id).or_insert(0) += 1;
            }
            // the expectation within one read is far below 1 for realistic k,
            // clamp it so single occurrences never count as enrichment
            let expected = (window_count / kmer_count).max(1.0);
            let mut overenriched: Vec<KmerId> = per_read
                .iter()
                .filter(|&(_, &count)| count as f64 > enrichment_threshold * expected)
                .map(|(&kid, _)| kid)
                .collect();
            overenriched.sort_unstable();
            for kid in overenriched {
                if table.is_marker(kid) {
                    table.clear_overenriched_pair(kid);
                    excluded += 1;
                }
            }
        }
    }
    log::info!("Excluded {} locally overenriched k-mers", excluded);
}

fn exclude_close_pairs(table: &mut KmerTable, reads: &ReadStore, distance: usize) {
    let k = table.k;
    let mask: KmerId = (1 << (2 * k)) - 1;
    let mut excluded = 0usize;
    let mut last_position: fnv::FnvHashMap<KmerId, usize> = fnv::FnvHashMap::default();
    for read_id in 0..reads.read_count() as u32 {
        for strand in 0..2u32 {
            let seq = reads.oriented_sequence(OrientedReadId::new(read_id, strand));
            if seq.len() < k {
                continue;
            }
            last_position.clear();
            let mut id = encode_kmer(&seq[..k]);
            last_position.insert(id, 0);
            for (offset, &base) in seq[k..].iter().enumerate() {
                let position = offset + 1;
                id = ((id << 2) | base_to_code(base)) & mask;
                if let Some(&previous) = last_position.get(&id) {
                    if position - previous < distance && table.is_marker(id) {
                        table.clear_overenriched_pair(id);
                        excluded += 1;
                    }
                }
                last_position.insert(id, position);
            }
        }
    }
    log::info!("Excluded {} k-mers with close repeat occurrences", excluded);
}

fn select_from_file(k: usize, path: &Path) -> Result<KmerTable> {
    let mut table = KmerTable::empty(k);
    let reader = BufReader::new(File::open(path)?);
    for (line_nr, line) in reader.lines().enumerate() {
        let line = line?;
        let token = line.trim();
        if token.is_empty() || token.starts_with('#') {
            continue;
        }
        if token.len() != k {
            return Err(AssemblyError::Input(format!(
                "k-mer of length {} at line {} of {}, expected length {}",
                token.len(),
                line_nr + 1,
                path.display(),
                k
            )));
        }
        let upper: Vec<u8> = token.bytes().map(|b| b.to_ascii_uppercase()).collect();
        if upper.iter().any(|b| !matches!(b, b'A' | b'C' | b'G' | b'T')) {
            return Err(AssemblyError::Input(format!(
                "invalid base in k-mer at line {} of {}",
                line_nr + 1,
                path.display()
            )));
        }
        table.set_pair(encode_kmer(&upper), true);
    }
    Ok(table)
}

pub struct KmerSelectionConfig {
    pub k: usize,
    pub density: f64,
    pub seed: u64,
    pub method: KmerSelectionMethod,
    pub enrichment_threshold: f64,
    pub close_pair_distance: usize,
    pub file: Option<std::path::PathBuf>,
}

/// Run the configured selection variant and enforce strand symmetry.
pub fn select_kmers(config: &KmerSelectionConfig, reads: &ReadStore) -> Result<KmerTable> {
    let mut table = match config.method {
        KmerSelectionMethod::ReadFromFile => {
            let path = config.file.as_ref().ok_or_else(|| {
                AssemblyError::config("kmers.file is required for selection method 4")
            })?;
            select_from_file(config.k, path)?
        }
        _ => select_random(config.k, config.density, config.seed),
    };

    match config.method {
        KmerSelectionMethod::ExcludeGlobalOverenriched => {
            exclude_global_overenriched(&mut table, reads, config.enrichment_threshold);
        }
        KmerSelectionMethod::ExcludeLocalOverenriched => {
            exclude_local_overenriched(&mut table, reads, config.enrichment_threshold);
        }
        KmerSelectionMethod::ExcludeClosePairs => {
            exclude_close_pairs(&mut table, reads, config.close_pair_distance);
        }
        _ => {}
    }

    table.enforce_strand_symmetry();
    log::info!(
        "Selected {} marker k-mers out of {} (density {:.4})",
        table.marker_count(),
        table.kmer_count(),
        table.marker_count() as f64 / table.kmer_count() as f64
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kmer_codec_roundtrip() {
        let seq = b"ACGTACG";
        let id = encode_kmer(seq);
        assert_eq!(decode_kmer(id, 7), seq.to_vec());
    }

    #[test]
    fn kmer_reverse_complement() {
        // rc(ACG) = CGT
        let id = encode_kmer(b"ACG");
        assert_eq!(decode_kmer(reverse_complement_kmer(id, 3), 3), b"CGT".to_vec());
        // involution
        assert_eq!(reverse_complement_kmer(reverse_complement_kmer(id, 3), 3), id);
    }

    #[test]
    fn random_selection_is_strand_symmetric() {
        let table = select_random(5, 0.2, 12345);
        assert!(table.is_strand_symmetric());
        assert!(table.marker_count() > 0);
    }

    #[test]
    fn random_selection_is_deterministic() {
        let a = select_random(5, 0.1, 7);
        let b = select_random(5, 0.1, 7);
        for id in 0..a.kmer_count() as KmerId {
            assert_eq!(a.is_marker(id), b.is_marker(id));
        }
    }

    #[test]
    fn close_pair_exclusion() {
        let mut reads = ReadStore::new();
        // CGA occurs at positions 0 and 3, distance 3
        reads.add_read("r", b"CGACGATTTGCC", 1).unwrap();
        let mut table = KmerTable::empty(3);
        table.set_pair(encode_kmer(b"CGA"), true);
        exclude_close_pairs(&mut table, &reads, 5);
        assert!(!table.is_marker(encode_kmer(b"CGA")));
        assert!(table.is_overenriched(encode_kmer(b"CGA")));
        assert!(table.is_strand_symmetric());
    }
}
