/// Read storage module
/// Holds the input reads and their names, indexed by a dense integer ReadId.
/// Each read is usable in two orientations:
/// strand 0 is the orientation found in the input, strand 1 is the reverse complement.
/// Reads are validated on entry and discarded (with a counter increment) when invalid.

use serde::{Deserialize, Serialize};

pub type ReadId = u32;
pub type Strand = u32;

/// An oriented read: (ReadId, Strand) packed into a single u32 with the
/// strand in the low bit. The packed value doubles as the dense index into
/// all per-oriented-read tables.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrientedReadId(u32);

impl OrientedReadId {
    pub fn new(read_id: ReadId, strand: Strand) -> Self {
        OrientedReadId((read_id << 1) | (strand & 1))
    }

    pub fn from_value(value: u32) -> Self {
        OrientedReadId(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn read_id(&self) -> ReadId {
        self.0 >> 1
    }

    pub fn strand(&self) -> Strand {
        self.0 & 1
    }

    /// The same read on the opposite strand.
    pub fn reverse_complement(&self) -> Self {
        OrientedReadId(self.0 ^ 1)
    }

    /// Dense index into per-oriented-read tables.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for OrientedReadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.read_id(), self.strand())
    }
}

impl std::fmt::Debug for OrientedReadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.read_id(), self.strand())
    }
}

/// Complement a single uppercase base.
pub fn complement_base(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' => b'A',
        other => other,
    }
}

/// Reverse complement for ASCII DNA sequences (A,C,G,T)
pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&b| complement_base(b)).collect()
}

/// Per-read advisory flags, set by read graph passes and honored downstream.
#[derive(Copy, Clone, Default, Serialize, Deserialize)]
pub struct ReadFlags {
    pub is_chimeric: bool,
    pub is_in_small_component: bool,
}

/// Counters for reads discarded during input validation
#[derive(Default, Clone, Serialize, Deserialize)]
pub struct DiscardedReadCounters {
    pub invalid_base: u64,
    pub too_short: u64,
    pub bad_repeat_count: u64,
    pub palindromic: u64,
}

impl DiscardedReadCounters {
    pub fn total(&self) -> u64 {
        self.invalid_base + self.too_short + self.bad_repeat_count + self.palindromic
    }
}

/// The read store. Sequences are owned here and shared read-only by all
/// worker threads once input is complete.
#[derive(Default, Serialize, Deserialize)]
pub struct ReadStore {
    sequences: Vec<Vec<u8>>,
    names: Vec<String>,
    pub flags: Vec<ReadFlags>,
    pub discarded: DiscardedReadCounters,
}

impl ReadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and add one read. Returns the assigned ReadId, or None if
    /// the read was discarded (the matching counter is incremented).
    pub fn add_read(&mut self, name: &str, sequence: &[u8], min_read_length: usize) -> Option<ReadId> {
        // uppercase first so validation and storage see one alphabet
        let sequence: Vec<u8> = sequence.iter().map(|b| b.to_ascii_uppercase()).collect();

        // reads containing anything other than A,C,G,T are discarded
        if sequence.iter().any(|b| !matches!(b, b'A' | b'C' | b'G' | b'T')) {
            self.discarded.invalid_base += 1;
            return None;
        }

        if sequence.len() < min_read_length {
            self.discarded.too_short += 1;
            return None;
        }

        // a homopolymer run longer than 255 cannot be represented by the
        // u8 repeat counts used in run-length consensus space
        if longest_homopolymer_run(&sequence) > 255 {
            self.discarded.bad_repeat_count += 1;
            return None;
        }

        // a read equal to its own reverse complement breaks strand symmetry
        if sequence == reverse_complement(&sequence) {
            self.discarded.palindromic += 1;
            return None;
        }

        let read_id = self.sequences.len() as ReadId;
        self.sequences.push(sequence);
        self.names.push(name.to_string());
        self.flags.push(ReadFlags::default());
        Some(read_id)
    }

    pub fn read_count(&self) -> usize {
        self.sequences.len()
    }

    pub fn oriented_read_count(&self) -> usize {
        self.sequences.len() * 2
    }

    pub fn name(&self, read_id: ReadId) -> &str {
        &self.names[read_id as usize]
    }

    pub fn sequence(&self, read_id: ReadId) -> &[u8] {
        &self.sequences[read_id as usize]
    }

    pub fn read_length(&self, read_id: ReadId) -> usize {
        self.sequences[read_id as usize].len()
    }

    /// The sequence of an oriented read. Strand 1 is materialized as the
    /// reverse complement of the stored strand 0 sequence.
    pub fn oriented_sequence(&self, oriented_read_id: OrientedReadId) -> Vec<u8> {
        let seq = self.sequence(oriented_read_id.read_id());
        if oriented_read_id.strand() == 0 {
            seq.to_vec()
        } else {
            reverse_complement(seq)
        }
    }

    pub fn total_base_count(&self) -> u64 {
        self.sequences.iter().map(|s| s.len() as u64).sum()
    }

    /// Histogram of read lengths, binned.
    pub fn length_histogram(&self, bin_width: usize) -> Vec<(usize, usize)> {
        let mut bins: Vec<usize> = Vec::new();
        for seq in &self.sequences {
            let bin = seq.len() / bin_width.max(1);
            if bin >= bins.len() {
                bins.resize(bin + 1, 0);
            }
            bins[bin] += 1;
        }
        bins.into_iter()
            .enumerate()
            .map(|(bin, count)| (bin * bin_width, count))
            .collect()
    }
}

fn longest_homopolymer_run(sequence: &[u8]) -> usize {
    let mut longest = 0usize;
    let mut current = 0usize;
    let mut previous = 0u8;
    for &base in sequence {
        if base == previous {
            current += 1;
        } else {
            current = 1;
            previous = base;
        }
        longest = longest.max(current);
    }
    longest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oriented_read_id_packing() {
        let or = OrientedReadId::new(21, 1);
        assert_eq!(or.read_id(), 21);
        assert_eq!(or.strand(), 1);
        assert_eq!(or.value(), 43);
        assert_eq!(or.reverse_complement().read_id(), 21);
        assert_eq!(or.reverse_complement().strand(), 0);
        assert_eq!(or.index(), 43);
    }

    #[test]
    fn reverse_complement_basic() {
        assert_eq!(reverse_complement(b"ACGT"), b"ACGT".to_vec());
        assert_eq!(reverse_complement(b"AACG"), b"CGTT".to_vec());
    }

    #[test]
    fn discards_invalid_reads() {
        let mut store = ReadStore::new();
        assert!(store.add_read("n", b"ACGTN", 1).is_none());
        assert_eq!(store.discarded.invalid_base, 1);

        assert!(store.add_read("short", b"ACG", 10).is_none());
        assert_eq!(store.discarded.too_short, 1);

        // ACGT reversed and complemented is ACGT: palindromic
        assert!(store.add_read("pal", b"ACGT", 1).is_none());
        assert_eq!(store.discarded.palindromic, 1);

        let long_run: Vec<u8> = std::iter::repeat(b'A')
            .take(300)
            .chain(b"CCGT".iter().copied())
            .collect();
        assert!(store.add_read("run", &long_run, 1).is_none());
        assert_eq!(store.discarded.bad_repeat_count, 1);

        assert!(store.add_read("ok", b"AACGTC", 1).is_some());
        assert_eq!(store.read_count(), 1);
    }

    #[test]
    fn oriented_sequences() {
        let mut store = ReadStore::new();
        let id = store.add_read("r", b"AACG", 1).unwrap();
        assert_eq!(store.oriented_sequence(OrientedReadId::new(id, 0)), b"AACG".to_vec());
        assert_eq!(store.oriented_sequence(OrientedReadId::new(id, 1)), b"CGTT".to_vec());
    }
}
