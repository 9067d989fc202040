/// Marker index module
/// For every oriented read, the ordered list of marker occurrences.
/// 1. scan strand 0 of each read left to right, keep positions whose k-mer is a marker
/// 2. derive strand 1 by reverse-complement symmetry, stored explicitly for O(1) access
/// 3. build sortedMarkers (sorted by KmerId) for the common-k-mer enumeration used by aligners
/// 4. assign every (oriented read, ordinal) pair a global dense MarkerId via a prefix sum

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::kmers::{encode_kmer, reverse_complement_kmer, KmerId, KmerTable};
use crate::reads::{OrientedReadId, ReadStore};

pub type MarkerId = u64;

/// One marker occurrence on an oriented read. The ordinal is the index of
/// the occurrence in the per-oriented-read list.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Marker {
    pub kmer_id: KmerId,
    pub position: u32,
}

/// A marker keyed for sorted access: (KmerId, ordinal).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct SortedMarker {
    pub kmer_id: KmerId,
    pub ordinal: u32,
}

#[derive(Serialize, Deserialize)]
pub struct MarkerIndex {
    pub k: usize,
    /// markers[orientedReadId.index()], ordered by position.
    pub markers: Vec<Vec<Marker>>,
    /// sortedMarkers[orientedReadId.index()], ordered by (KmerId, ordinal).
    pub sorted_markers: Vec<Vec<SortedMarker>>,
    /// Prefix sum over per-oriented-read marker counts, length = #oriented reads + 1.
    marker_offsets: Vec<MarkerId>,
}

impl MarkerIndex {
    /// Scan all reads in parallel and build the marker tables.
    pub fn build(reads: &ReadStore, kmer_table: &KmerTable) -> Self {
        let k = kmer_table.k;

        // per read, compute strand 0 markers then mirror to strand 1
        let per_read: Vec<(Vec<Marker>, Vec<Marker>)> = (0..reads.read_count() as u32)
            .into_par_iter()
            .map(|read_id| {
                let seq = reads.sequence(read_id);
                let mut strand0: Vec<Marker> = Vec::new();
                if seq.len() >= k {
                    let mask: KmerId = (1 << (2 * k)) - 1;
                    let mut id = encode_kmer(&seq[..k]);
                    if kmer_table.is_marker(id) {
                        strand0.push(Marker { kmer_id: id, position: 0 });
                    }
                    for (offset, &base) in seq[k..].iter().enumerate() {
                        id = ((id << 2) | crate::kmers::base_to_code(base)) & mask;
                        if kmer_table.is_marker(id) {
                            strand0.push(Marker {
                                kmer_id: id,
                                position: (offset + 1) as u32,
                            });
                        }
                    }
                }

                // strand 1 markers are the reverse complements of strand 0,
                // in reverse position order
                let strand1: Vec<Marker> = strand0
                    .iter()
                    .rev()
                    .map(|m| Marker {
                        kmer_id: reverse_complement_kmer(m.kmer_id, k),
                        position: (seq.len() - k) as u32 - m.position,
                    })
                    .collect();

                (strand0, strand1)
            })
            .collect();

        let mut markers: Vec<Vec<Marker>> = Vec::with_capacity(reads.oriented_read_count());
        for (strand0, strand1) in per_read {
            markers.push(strand0);
            markers.push(strand1);
        }

        let sorted_markers: Vec<Vec<SortedMarker>> = markers
            .par_iter()
            .map(|list| {
                let mut sorted: Vec<SortedMarker> = list
                    .iter()
                    .enumerate()
                    .map(|(ordinal, m)| SortedMarker {
                        kmer_id: m.kmer_id,
                        ordinal: ordinal as u32,
                    })
                    .collect();
                sorted.sort_unstable();
                sorted
            })
            .collect();

        let mut marker_offsets: Vec<MarkerId> = Vec::with_capacity(markers.len() + 1);
        let mut offset: MarkerId = 0;
        marker_offsets.push(0);
        for list in &markers {
            offset += list.len() as MarkerId;
            marker_offsets.push(offset);
        }

        MarkerIndex {
            k,
            markers,
            sorted_markers,
            marker_offsets,
        }
    }

    pub fn total_marker_count(&self) -> u64 {
        *self.marker_offsets.last().unwrap_or(&0)
    }

    pub fn marker_count(&self, oriented_read_id: OrientedReadId) -> u32 {
        self.markers[oriented_read_id.index()].len() as u32
    }

    pub fn marker(&self, oriented_read_id: OrientedReadId, ordinal: u32) -> Marker {
        self.markers[oriented_read_id.index()][ordinal as usize]
    }

    /// Global dense id of a marker occurrence.
    pub fn get_marker_id(&self, oriented_read_id: OrientedReadId, ordinal: u32) -> MarkerId {
        self.marker_offsets[oriented_read_id.index()] + ordinal as MarkerId
    }

    /// Inverse lookup by binary search on the prefix sum.
    pub fn find_marker_id(&self, marker_id: MarkerId) -> (OrientedReadId, u32) {
        // first offset strictly greater than marker_id, minus one,
        // is the oriented read owning this marker
        let index = self.marker_offsets.partition_point(|&offset| offset <= marker_id) - 1;
        let ordinal = (marker_id - self.marker_offsets[index]) as u32;
        (OrientedReadId::from_value(index as u32), ordinal)
    }

    /// The reverse complement of a marker occurrence: same read, opposite
    /// strand, mirrored ordinal.
    pub fn reverse_complement_marker_id(&self, marker_id: MarkerId) -> MarkerId {
        let (oriented_read_id, ordinal) = self.find_marker_id(marker_id);
        let rc_oriented = oriented_read_id.reverse_complement();
        let count = self.marker_count(oriented_read_id);
        self.get_marker_id(rc_oriented, count - 1 - ordinal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmers::{select_kmers, KmerSelectionConfig, KmerSelectionMethod};

    fn small_index() -> (ReadStore, MarkerIndex) {
        let mut reads = ReadStore::new();
        reads.add_read("a", b"ACGGTCAGGTTCAGGA", 1).unwrap();
        reads.add_read("b", b"TTCAGGACGGTCAGGT", 1).unwrap();
        let config = KmerSelectionConfig {
            k: 3,
            density: 0.3,
            seed: 31,
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
    fn marker_id_roundtrip() {
        let (_reads, index) = small_index();
        for marker_id in 0..index.total_marker_count() {
            let (oriented_read_id, ordinal) = index.find_marker_id(marker_id);
            assert_eq!(index.get_marker_id(oriented_read_id, ordinal), marker_id);
        }
    }

    #[test]
    fn strand_symmetry_of_markers() {
        let (reads, index) = small_index();
        for read_id in 0..reads.read_count() as u32 {
            let fwd = OrientedReadId::new(read_id, 0);
            let rev = OrientedReadId::new(read_id, 1);
            assert_eq!(index.marker_count(fwd), index.marker_count(rev));
            let n = index.marker_count(fwd);
            for ordinal in 0..n {
                let m0 = index.marker(fwd, ordinal);
                let m1 = index.marker(rev, n - 1 - ordinal);
                assert_eq!(m1.kmer_id, reverse_complement_kmer(m0.kmer_id, index.k));
                assert_eq!(
                    m1.position as usize,
                    reads.read_length(read_id) - index.k - m0.position as usize
                );
            }
        }
    }

    #[test]
    fn reverse_complement_marker_ids_pair_up() {
        let (_reads, index) = small_index();
        for marker_id in 0..index.total_marker_count() {
            let rc = index.reverse_complement_marker_id(marker_id);
            assert_ne!(rc, marker_id);
            assert_eq!(index.reverse_complement_marker_id(rc), marker_id);
        }
    }

    #[test]
    fn sorted_markers_are_sorted() {
        let (_reads, index) = small_index();
        for list in &index.sorted_markers {
            assert!(list.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}
