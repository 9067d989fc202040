/// Alignment storage module
/// 1. compute alignments for all candidate pairs in parallel
/// 2. keep the accepted ones as AlignmentData records (normalized readId0 < readId1, strand0 = 0)
/// 3. store the matched ordinals delta-compressed in a ragged byte buffer
/// 4. build alignmentTable: for every oriented read, the alignment ids touching it

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::align::{compute_alignment, Alignment, AlignmentInfo, AlignParams};
use crate::lowhash::CandidatePair;
use crate::markers::MarkerIndex;
use crate::reads::{OrientedReadId, ReadId, Strand};

pub type AlignmentId = u32;

/// One kept alignment, stored in its normalized orientation.
#[derive(Copy, Clone, Serialize, Deserialize)]
pub struct AlignmentData {
    pub read_id0: ReadId,
    pub read_id1: ReadId,
    pub is_same_strand: bool,
    pub info: AlignmentInfo,
}

impl AlignmentData {
    pub fn strand1(&self) -> Strand {
        if self.is_same_strand {
            0
        } else {
            1
        }
    }

    /// The normalized oriented pair (strand0 = 0).
    pub fn oriented_reads(&self) -> (OrientedReadId, OrientedReadId) {
        (
            OrientedReadId::new(self.read_id0, 0),
            OrientedReadId::new(self.read_id1, self.strand1()),
        )
    }

    /// The oriented read this alignment pairs with the given one.
    /// Works for both strand representations of the alignment.
    pub fn other_oriented_read(&self, oriented: OrientedReadId) -> OrientedReadId {
        if oriented.read_id() == self.read_id0 {
            OrientedReadId::new(self.read_id1, oriented.strand() ^ self.strand1())
        } else {
            OrientedReadId::new(self.read_id0, oriented.strand() ^ self.strand1())
        }
    }

    /// The AlignmentInfo as seen from the given oriented read as side 0.
    pub fn info_for(&self, oriented: OrientedReadId) -> AlignmentInfo {
        let mut info = self.info;
        let on_side0 = oriented.read_id() == self.read_id0;
        // strand of side 0 in the representation containing this oriented read
        let side0_strand = if on_side0 {
            oriented.strand()
        } else {
            oriented.strand() ^ self.strand1()
        };
        if side0_strand == 1 {
            info = info.reverse_complement();
        }
        if !on_side0 {
            info = info.swapped();
        }
        info
    }
}

/// Delta compression of matched ordinal pairs: first pair as two u32, then
/// per-pair deltas as single bytes with a 0xFF escape to u32.
fn compress_ordinals(alignment: &Alignment) -> Vec<u8> {
    let mut bytes: Vec<u8> = Vec::with_capacity(8 + 2 * alignment.ordinals.len());
    if alignment.ordinals.is_empty() {
        return bytes;
    }
    let [first0, first1] = alignment.ordinals[0];
    bytes.extend_from_slice(&first0.to_le_bytes());
    bytes.extend_from_slice(&first1.to_le_bytes());
    let mut previous = alignment.ordinals[0];
    for &pair in &alignment.ordinals[1..] {
        for side in 0..2 {
            let delta = pair[side] - previous[side];
            if delta < 0xFF {
                bytes.push(delta as u8);
            } else {
                bytes.push(0xFF);
                bytes.extend_from_slice(&delta.to_le_bytes());
            }
        }
        previous = pair;
    }
    bytes
}

fn decompress_ordinals(bytes: &[u8]) -> Alignment {
    let mut ordinals: Vec<[u32; 2]> = Vec::new();
    if bytes.len() < 8 {
        return Alignment { ordinals };
    }
    let mut cursor = 0usize;
    let mut read_u32 = |cursor: &mut usize| -> u32 {
        let value = u32::from_le_bytes(bytes[*cursor..*cursor + 4].try_into().unwrap());
        *cursor += 4;
        value
    };
    let mut current = [read_u32(&mut cursor), read_u32(&mut cursor)];
    ordinals.push(current);
    while cursor < bytes.len() {
        let mut pair = current;
        for side in 0..2 {
            let byte = bytes[cursor];
            cursor += 1;
            let delta = if byte < 0xFF {
                byte as u32
            } else {
                read_u32(&mut cursor)
            };
            pair[side] = current[side] + delta;
        }
        ordinals.push(pair);
        current = pair;
    }
    Alignment { ordinals }
}

/// The alignment store shared read-only after the alignment phase.
#[derive(Default, Serialize, Deserialize)]
pub struct AlignmentStore {
    pub data: Vec<AlignmentData>,
    /// compressedAlignments, ragged, one byte buffer per alignment.
    pub compressed: Vec<Vec<u8>>,
    /// alignmentTable[orientedReadId.index()]: alignment ids touching it.
    pub table: Vec<Vec<AlignmentId>>,
}

impl AlignmentStore {
    pub fn alignment_count(&self) -> usize {
        self.data.len()
    }

    /// Decompress the matched ordinals of one alignment (normalized orientation).
    pub fn alignment(&self, id: AlignmentId) -> Alignment {
        decompress_ordinals(&self.compressed[id as usize])
    }
}

/// Compute all candidate alignments in parallel and build the store.
/// The per-candidate results are collected in candidate order, so the
/// assigned AlignmentIds do not depend on thread scheduling.
pub fn compute_alignments(
    index: &MarkerIndex,
    candidates: &[CandidatePair],
    params: &AlignParams,
    oriented_read_count: usize,
) -> AlignmentStore {
    let results: Vec<Option<(Alignment, AlignmentInfo)>> = candidates
        .par_iter()
        .map(|pair| {
            let (oriented0, oriented1) = pair.oriented_reads();
            compute_alignment(index, oriented0, oriented1, params)
        })
        .collect();

    let mut store = AlignmentStore {
        data: Vec::new(),
        compressed: Vec::new(),
        table: vec![Vec::new(); oriented_read_count],
    };

    for (pair, result) in candidates.iter().zip(results) {
        let (alignment, info) = match result {
            Some(r) => r,
            None => continue,
        };
        let id = store.data.len() as AlignmentId;
        let data = AlignmentData {
            read_id0: pair.read_id0,
            read_id1: pair.read_id1,
            is_same_strand: pair.is_same_strand,
            info,
        };
        store.data.push(data);
        store.compressed.push(compress_ordinals(&alignment));

        // the alignment touches both strands of both reads
        for strand in 0..2 {
            store.table[OrientedReadId::new(pair.read_id0, strand).index()].push(id);
            store.table[OrientedReadId::new(pair.read_id1, strand).index()].push(id);
        }
    }

    log::info!(
        "Computed {} alignments from {} candidates",
        store.data.len(),
        candidates.len()
    );
    store
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinal_compression_roundtrip() {
        let alignment = Alignment {
            ordinals: vec![[3, 7], [4, 8], [10, 13], [300, 600], [301, 601]],
        };
        let bytes = compress_ordinals(&alignment);
        assert_eq!(decompress_ordinals(&bytes).ordinals, alignment.ordinals);
    }

    #[test]
    fn empty_alignment_roundtrip() {
        let alignment = Alignment { ordinals: vec![] };
        let bytes = compress_ordinals(&alignment);
        assert!(decompress_ordinals(&bytes).ordinals.is_empty());
    }

    #[test]
    fn other_oriented_read_covers_both_strands() {
        let data = AlignmentData {
            read_id0: 4,
            read_id1: 9,
            is_same_strand: false,
            info: AlignmentInfo {
                marker_count: 1,
                first_ordinals: [0, 0],
                last_ordinals: [0, 0],
                total_counts: [1, 1],
                max_skip: 0,
                max_drift: 0,
            },
        };
        // (4,0) pairs (9,1); (4,1) pairs (9,0)
        assert_eq!(
            data.other_oriented_read(OrientedReadId::new(4, 0)),
            OrientedReadId::new(9, 1)
        );
        assert_eq!(
            data.other_oriented_read(OrientedReadId::new(4, 1)),
            OrientedReadId::new(9, 0)
        );
        assert_eq!(
            data.other_oriented_read(OrientedReadId::new(9, 1)),
            OrientedReadId::new(4, 0)
        );
        assert_eq!(
            data.other_oriented_read(OrientedReadId::new(9, 0)),
            OrientedReadId::new(4, 1)
        );
    }
}
