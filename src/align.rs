/// Marker alignment module
/// Aligns two oriented reads in marker-ordinal space.
/// Method 0: chaining DP over common marker occurrences, constrained by maxSkip/maxDrift
/// Method 1: banded Needleman-Wunsch over the full marker KmerId sequences, fixed band
/// Method 3: method 1 with the band centered on the offset estimated from unique common markers
/// Method 4: sparse DP, matches are binned into diagonal bands and chained within the best band
/// All methods produce the matched ordinal list plus an AlignmentInfo summary,
/// and are deterministic given identical inputs and parameters.

use serde::{Deserialize, Serialize};

use crate::error::{AssemblyError, Result};
use crate::markers::MarkerIndex;
use crate::reads::OrientedReadId;

/// Summary of a pairwise marker alignment.
/// Stored normalized with readId0 < readId1 and strand0 = 0; use swapped()
/// and reverse_complement() when retrieving from the other end.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct AlignmentInfo {
    /// Number of aligned markers.
    pub marker_count: u32,
    /// First aligned ordinal on each side.
    pub first_ordinals: [u32; 2],
    /// Last aligned ordinal on each side.
    pub last_ordinals: [u32; 2],
    /// Total marker count of each oriented read, needed for trims and
    /// reverse complementing.
    pub total_counts: [u32; 2],
    /// Largest ordinal skip observed between consecutive aligned markers.
    pub max_skip: u32,
    /// Largest ordinal offset change observed between consecutive aligned markers.
    pub max_drift: u32,
}

impl AlignmentInfo {
    pub fn left_trim(&self) -> u32 {
        self.first_ordinals[0].min(self.first_ordinals[1])
    }

    pub fn right_trim(&self) -> u32 {
        (self.total_counts[0] - 1 - self.last_ordinals[0])
            .min(self.total_counts[1] - 1 - self.last_ordinals[1])
    }

    pub fn aligned_fraction(&self, side: usize) -> f64 {
        if self.total_counts[side] == 0 {
            0.0
        } else {
            self.marker_count as f64 / self.total_counts[side] as f64
        }
    }

    /// The same alignment seen with the two reads exchanged.
    pub fn swapped(&self) -> Self {
        AlignmentInfo {
            marker_count: self.marker_count,
            first_ordinals: [self.first_ordinals[1], self.first_ordinals[0]],
            last_ordinals: [self.last_ordinals[1], self.last_ordinals[0]],
            total_counts: [self.total_counts[1], self.total_counts[0]],
            max_skip: self.max_skip,
            max_drift: self.max_drift,
        }
    }

    /// The same alignment seen from the opposite strands: ordinals mirror,
    /// first and last exchange, trims swap sides.
    pub fn reverse_complement(&self) -> Self {
        AlignmentInfo {
            marker_count: self.marker_count,
            first_ordinals: [
                self.total_counts[0] - 1 - self.last_ordinals[0],
                self.total_counts[1] - 1 - self.last_ordinals[1],
            ],
            last_ordinals: [
                self.total_counts[0] - 1 - self.first_ordinals[0],
                self.total_counts[1] - 1 - self.first_ordinals[1],
            ],
            total_counts: self.total_counts,
            max_skip: self.max_skip,
            max_drift: self.max_drift,
        }
    }
}

/// The matched ordinal pairs, strictly increasing on both sides.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Alignment {
    pub ordinals: Vec<[u32; 2]>,
}

impl Alignment {
    /// Mirror the alignment to the opposite strands of both reads.
    pub fn reverse_complement(&self, total_counts: [u32; 2]) -> Alignment {
        let mut ordinals: Vec<[u32; 2]> = self
            .ordinals
            .iter()
            .map(|&[o0, o1]| [total_counts[0] - 1 - o0, total_counts[1] - 1 - o1])
            .collect();
        ordinals.reverse();
        Alignment { ordinals }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum AlignMethod {
    OrdinalChain,
    Banded,
    BandedEstimatedOffset,
    SparseDiagonal,
}

impl AlignMethod {
    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            0 => Ok(AlignMethod::OrdinalChain),
            1 => Ok(AlignMethod::Banded),
            3 => Ok(AlignMethod::BandedEstimatedOffset),
            4 => Ok(AlignMethod::SparseDiagonal),
            other => Err(AssemblyError::config(format!(
                "align.method {} is not one of 0,1,3,4",
                other
            ))),
        }
    }
}

#[derive(Clone)]
pub struct AlignParams {
    pub method: AlignMethod,
    pub max_skip: u32,
    pub max_drift: u32,
    pub max_marker_frequency: u32,
    pub min_aligned_marker_count: u32,
    pub min_aligned_fraction: f64,
    pub max_trim: u32,
    pub match_score: i32,
    pub mismatch_score: i32,
    pub gap_score: i32,
    /// Band half-width for the banded methods.
    pub band: u32,
}

/// Enumerate common marker occurrences of two oriented reads as
/// (ordinal0, ordinal1) matches, sorted by (ordinal0, ordinal1).
/// KmerIds occurring more than max_marker_frequency times on either side
/// are skipped.
fn common_markers(
    index: &MarkerIndex,
    oriented0: OrientedReadId,
    oriented1: OrientedReadId,
    max_marker_frequency: u32,
) -> Vec<[u32; 2]> {
    let sorted0 = &index.sorted_markers[oriented0.index()];
    let sorted1 = &index.sorted_markers[oriented1.index()];

    let mut matches: Vec<[u32; 2]> = Vec::new();
    let mut i0 = 0usize;
    let mut i1 = 0usize;
    while i0 < sorted0.len() && i1 < sorted1.len() {
        let k0 = sorted0[i0].kmer_id;
        let k1 = sorted1[i1].kmer_id;
        if k0 < k1 {
            i0 += 1;
        } else if k1 < k0 {
            i1 += 1;
        } else {
            let mut j0 = i0;
            while j0 < sorted0.len() && sorted0[j0].kmer_id == k0 {
                j0 += 1;
            }
            let mut j1 = i1;
            while j1 < sorted1.len() && sorted1[j1].kmer_id == k0 {
                j1 += 1;
            }
            let frequency0 = (j0 - i0) as u32;
            let frequency1 = (j1 - i1) as u32;
            if frequency0 <= max_marker_frequency && frequency1 <= max_marker_frequency {
                for a in i0..j0 {
                    for b in i1..j1 {
                        matches.push([sorted0[a].ordinal, sorted1[b].ordinal]);
                    }
                }
            }
            i0 = j0;
            i1 = j1;
        }
    }
    matches.sort_unstable();
    matches
}

/// Method 0: longest chain of matches under the skip and drift constraints.
fn align_ordinal_chain(matches: &[[u32; 2]], params: &AlignParams) -> Alignment {
    if matches.is_empty() {
        return Alignment::default();
    }
    let n = matches.len();
    let max_step = params.max_skip as i64 + 1;

    let mut best_length = vec![1u32; n];
    let mut previous = vec![usize::MAX; n];
    let mut window_start = 0usize;

    for i in 0..n {
        let [o0, o1] = matches[i];
        // matches are sorted by ordinal0, restrict the lookback window
        while (matches[window_start][0] as i64) < o0 as i64 - max_step {
            window_start += 1;
        }
        for j in window_start..i {
            let [p0, p1] = matches[j];
            if p0 >= o0 || p1 >= o1 {
                continue;
            }
            let d0 = (o0 - p0) as i64;
            let d1 = (o1 - p1) as i64;
            if d0 > max_step || d1 > max_step {
                continue;
            }
            if (d0 - d1).abs() > params.max_drift as i64 {
                continue;
            }
            if best_length[j] + 1 > best_length[i] {
                best_length[i] = best_length[j] + 1;
                previous[i] = j;
            }
        }
    }

    // best end, ties broken toward the earliest match for determinism
    let mut best_end = 0usize;
    for i in 1..n {
        if best_length[i] > best_length[best_end] {
            best_end = i;
        }
    }

    let mut chain: Vec<[u32; 2]> = Vec::with_capacity(best_length[best_end] as usize);
    let mut cursor = best_end;
    loop {
        chain.push(matches[cursor]);
        if previous[cursor] == usize::MAX {
            break;
        }
        cursor = previous[cursor];
    }
    chain.reverse();
    Alignment { ordinals: chain }
}

/// Banded overlap alignment over the two marker KmerId sequences.
/// Leading and trailing gaps are free; only equal-symbol diagonal moves
/// produce matched ordinal pairs.
fn align_banded(
    kmer_ids0: &[crate::kmers::KmerId],
    kmer_ids1: &[crate::kmers::KmerId],
    band_center: i64,
    band_half_width: i64,
    params: &AlignParams,
) -> Alignment {
    let n0 = kmer_ids0.len();
    let n1 = kmer_ids1.len();
    if n0 == 0 || n1 == 0 {
        return Alignment::default();
    }
    let width = (2 * band_half_width + 1) as usize;
    let offset_of = |i: i64, j: i64| -> Option<usize> {
        // band coordinate of column j in row i: diagonal is i - j
        let d = (i - j) - band_center;
        if d < -band_half_width || d > band_half_width {
            None
        } else {
            Some((d + band_half_width) as usize)
        }
    };

    const NEG: i64 = i64::MIN / 4;
    // score and move matrices, rows 0..=n0, band-compressed columns
    let rows = n0 + 1;
    let mut score = vec![NEG; rows * width];
    let mut moves = vec![0u8; rows * width]; // 0 none, 1 diag, 2 up (gap in 1), 3 left (gap in 0)

    // free leading gaps: any in-band cell of row 0 or column 0 starts at 0
    for j in 0..=n1 as i64 {
        if let Some(b) = offset_of(0, j) {
            score[b] = 0;
        }
    }
    for i in 0..=n0 as i64 {
        if let Some(b) = offset_of(i, 0) {
            score[i as usize * width + b] = 0;
        }
    }

    for i in 1..=n0 as i64 {
        for b in 0..width {
            let j = i - band_center - (b as i64 - band_half_width);
            if j < 1 || j > n1 as i64 {
                continue;
            }
            let equal = kmer_ids0[(i - 1) as usize] == kmer_ids1[(j - 1) as usize];
            let sub = if equal {
                params.match_score as i64
            } else {
                params.mismatch_score as i64
            };
            let mut best = NEG;
            let mut mv = 0u8;
            if let Some(pb) = offset_of(i - 1, j - 1) {
                let s = score[(i - 1) as usize * width + pb];
                if s > NEG && s + sub > best {
                    best = s + sub;
                    mv = 1;
                }
            }
            if let Some(pb) = offset_of(i - 1, j) {
                let s = score[(i - 1) as usize * width + pb];
                if s > NEG && s + params.gap_score as i64 > best {
                    best = s + params.gap_score as i64;
                    mv = 2;
                }
            }
            if let Some(pb) = offset_of(i, j - 1) {
                let s = score[i as usize * width + pb];
                if s > NEG && s + params.gap_score as i64 > best {
                    best = s + params.gap_score as i64;
                    mv = 3;
                }
            }
            if best > NEG {
                let cell = i as usize * width + b;
                if best > score[cell] {
                    score[cell] = best;
                    moves[cell] = mv;
                }
            }
        }
    }

    // free trailing gaps: best cell on the last row or last column
    let mut best_cell: Option<(i64, i64)> = None;
    let mut best_score = NEG;
    for j in 0..=n1 as i64 {
        if let Some(b) = offset_of(n0 as i64, j) {
            let s = score[n0 * width + b];
            if s > best_score {
                best_score = s;
                best_cell = Some((n0 as i64, j));
            }
        }
    }
    for i in 0..=n0 as i64 {
        if let Some(b) = offset_of(i, n1 as i64) {
            let s = score[i as usize * width + b];
            if s > best_score {
                best_score = s;
                best_cell = Some((i, n1 as i64));
            }
        }
    }
    let (mut i, mut j) = match best_cell {
        Some(cell) if best_score > 0 => cell,
        _ => return Alignment::default(),
    };

    let mut ordinals: Vec<[u32; 2]> = Vec::new();
    while i > 0 && j > 0 {
        let b = match offset_of(i, j) {
            Some(b) => b,
            None => break,
        };
        match moves[i as usize * width + b] {
            1 => {
                if kmer_ids0[(i - 1) as usize] == kmer_ids1[(j - 1) as usize] {
                    ordinals.push([(i - 1) as u32, (j - 1) as u32]);
                }
                i -= 1;
                j -= 1;
            }
            2 => i -= 1,
            3 => j -= 1,
            _ => break,
        }
    }
    ordinals.reverse();
    Alignment { ordinals }
}

/// Method 3 band center: median ordinal offset of markers unique to both sides.
fn estimate_band_center(
    index: &MarkerIndex,
    oriented0: OrientedReadId,
    oriented1: OrientedReadId,
) -> i64 {
    let unique_matches = common_markers(index, oriented0, oriented1, 1);
    if unique_matches.is_empty() {
        return 0;
    }
    let mut offsets: Vec<i64> = unique_matches
        .iter()
        .map(|&[o0, o1]| o0 as i64 - o1 as i64)
        .collect();
    offsets.sort_unstable();
    offsets[offsets.len() / 2]
}

/// Method 4: bin matches into diagonal bands of width 2*maxDrift+1, chain
/// within the band holding the most matches.
fn align_sparse_diagonal(matches: &[[u32; 2]], params: &AlignParams) -> Alignment {
    if matches.is_empty() {
        return Alignment::default();
    }
    let band_width = (2 * params.max_drift + 1) as i64;
    let mut band_counts: fnv::FnvHashMap<i64, u32> = fnv::FnvHashMap::default();
    for &[o0, o1] in matches {
        let diagonal = o0 as i64 - o1 as i64;
        *band_counts.entry(diagonal.div_euclid(band_width)).or_insert(0) += 1;
    }
    // densest band, ties toward the smaller band index for determinism
    let (&best_band, _) = band_counts
        .iter()
        .max_by_key(|&(&band, &count)| (count, std::cmp::Reverse(band)))
        .unwrap();

    // within the band keep a strictly increasing subsequence of matches
    let mut chain: Vec<[u32; 2]> = Vec::new();
    for &[o0, o1] in matches {
        let diagonal = o0 as i64 - o1 as i64;
        if diagonal.div_euclid(band_width) != best_band {
            continue;
        }
        if let Some(&[p0, p1]) = chain.last() {
            if o0 <= p0 || o1 <= p1 {
                continue;
            }
        }
        chain.push([o0, o1]);
    }
    Alignment { ordinals: chain }
}

/// Observed skip and drift of a matched-ordinal chain.
fn observed_skip_drift(ordinals: &[[u32; 2]]) -> (u32, u32) {
    let mut max_skip = 0u32;
    let mut max_drift = 0u32;
    for pair in ordinals.windows(2) {
        let d0 = pair[1][0] - pair[0][0];
        let d1 = pair[1][1] - pair[0][1];
        max_skip = max_skip.max(d0.max(d1).saturating_sub(1));
        max_drift = max_drift.max(d0.abs_diff(d1));
    }
    (max_skip, max_drift)
}

/// Align two oriented reads and apply the acceptance criteria.
/// Returns None when no acceptable alignment exists.
pub fn compute_alignment(
    index: &MarkerIndex,
    oriented0: OrientedReadId,
    oriented1: OrientedReadId,
    params: &AlignParams,
) -> Option<(Alignment, AlignmentInfo)> {
    let total_counts = [
        index.marker_count(oriented0),
        index.marker_count(oriented1),
    ];
    if total_counts[0] == 0 || total_counts[1] == 0 {
        return None;
    }

    let alignment = match params.method {
        AlignMethod::OrdinalChain => {
            let matches = common_markers(index, oriented0, oriented1, params.max_marker_frequency);
            align_ordinal_chain(&matches, params)
        }
        AlignMethod::Banded | AlignMethod::BandedEstimatedOffset => {
            let kmer_ids0: Vec<crate::kmers::KmerId> = index.markers[oriented0.index()]
                .iter()
                .map(|m| m.kmer_id)
                .collect();
            let kmer_ids1: Vec<crate::kmers::KmerId> = index.markers[oriented1.index()]
                .iter()
                .map(|m| m.kmer_id)
                .collect();
            let center = match params.method {
                AlignMethod::Banded => 0,
                _ => estimate_band_center(index, oriented0, oriented1),
            };
            align_banded(&kmer_ids0, &kmer_ids1, center, params.band as i64, params)
        }
        AlignMethod::SparseDiagonal => {
            let matches = common_markers(index, oriented0, oriented1, params.max_marker_frequency);
            align_sparse_diagonal(&matches, params)
        }
    };

    if alignment.ordinals.is_empty() {
        return None;
    }

    let (max_skip, max_drift) = observed_skip_drift(&alignment.ordinals);
    let info = AlignmentInfo {
        marker_count: alignment.ordinals.len() as u32,
        first_ordinals: alignment.ordinals[0],
        last_ordinals: *alignment.ordinals.last().unwrap(),
        total_counts,
        max_skip,
        max_drift,
    };

    // acceptance criteria
    if info.marker_count < params.min_aligned_marker_count {
        return None;
    }
    if info.aligned_fraction(0) < params.min_aligned_fraction
        && info.aligned_fraction(1) < params.min_aligned_fraction
    {
        return None;
    }
    if info.left_trim() > params.max_trim || info.right_trim() > params.max_trim {
        return None;
    }
    if info.max_skip > params.max_skip || info.max_drift > params.max_drift {
        return None;
    }

    Some((alignment, info))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmers::{select_kmers, KmerSelectionConfig, KmerSelectionMethod};
    use crate::reads::ReadStore;

    fn default_params(method: AlignMethod) -> AlignParams {
        AlignParams {
            method,
            max_skip: 10,
            max_drift: 5,
            max_marker_frequency: 10,
            min_aligned_marker_count: 3,
            min_aligned_fraction: 0.1,
            max_trim: 50,
            match_score: 3,
            mismatch_score: -1,
            gap_score: -1,
            band: 20,
        }
    }

    fn overlap_pair() -> (ReadStore, MarkerIndex) {
        // two reads sharing a 40 base overlap
        let prefix = b"TTGACCAGTTGACGAACTGG".to_vec();
        let shared = b"ACGGTCAGGATTCAGGACCTGAACGTTGCCAGTACGGATC".to_vec();
        let suffix = b"CATTGGACCATGTTCAACGG".to_vec();
        let mut read0 = prefix.clone();
        read0.extend_from_slice(&shared);
        let mut read1 = shared.clone();
        read1.extend_from_slice(&suffix);

        let mut reads = ReadStore::new();
        reads.add_read("r0", &read0, 1).unwrap();
        reads.add_read("r1", &read1, 1).unwrap();
        let config = KmerSelectionConfig {
            k: 5,
            density: 0.4,
            seed: 17,
            method: KmerSelectionMethod::Random,
            enrichment_threshold: 10.0,
            close_pair_distance: 0,
            file: None,
        };
        let table = select_kmers(&config, &reads).unwrap();
        let index = MarkerIndex::build(&reads, &table);
        (reads, index)
    }

    #[test]
    fn ordinal_chain_finds_overlap() {
        let (_reads, index) = overlap_pair();
        let or0 = OrientedReadId::new(0, 0);
        let or1 = OrientedReadId::new(1, 0);
        let result = compute_alignment(&index, or0, or1, &default_params(AlignMethod::OrdinalChain));
        let (alignment, info) = result.expect("overlapping reads must align");
        assert!(info.marker_count >= 3);
        // matched ordinals strictly increase on both sides
        for pair in alignment.ordinals.windows(2) {
            assert!(pair[1][0] > pair[0][0]);
            assert!(pair[1][1] > pair[0][1]);
        }
    }

    #[test]
    fn all_methods_are_deterministic() {
        let (_reads, index) = overlap_pair();
        let or0 = OrientedReadId::new(0, 0);
        let or1 = OrientedReadId::new(1, 0);
        for method in [
            AlignMethod::OrdinalChain,
            AlignMethod::Banded,
            AlignMethod::BandedEstimatedOffset,
            AlignMethod::SparseDiagonal,
        ] {
            let params = default_params(method);
            let a = compute_alignment(&index, or0, or1, &params);
            let b = compute_alignment(&index, or0, or1, &params);
            match (a, b) {
                (Some((al_a, info_a)), Some((al_b, info_b))) => {
                    assert_eq!(al_a.ordinals, al_b.ordinals);
                    assert_eq!(info_a, info_b);
                }
                (None, None) => {}
                _ => panic!("method {:?} not deterministic", method),
            }
        }
    }

    #[test]
    fn info_reverse_complement_mirrors_ordinals() {
        let info = AlignmentInfo {
            marker_count: 5,
            first_ordinals: [2, 0],
            last_ordinals: [8, 6],
            total_counts: [10, 9],
            max_skip: 1,
            max_drift: 1,
        };
        let rc = info.reverse_complement();
        assert_eq!(rc.first_ordinals, [1, 2]);
        assert_eq!(rc.last_ordinals, [7, 8]);
        // trims exchange left/right under reverse complement
        assert_eq!(rc.left_trim(), info.right_trim());
        assert_eq!(rc.right_trim(), info.left_trim());
        assert_eq!(rc.reverse_complement(), info);
    }

    #[test]
    fn rejects_when_too_few_markers() {
        let (_reads, index) = overlap_pair();
        let or0 = OrientedReadId::new(0, 0);
        let or1 = OrientedReadId::new(1, 0);
        let mut params = default_params(AlignMethod::OrdinalChain);
        params.min_aligned_marker_count = 10_000;
        assert!(compute_alignment(&index, or0, or1, &params).is_none());
    }
}
