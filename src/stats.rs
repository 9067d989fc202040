/// Statistics module
/// Histograms, the coverage peak finder used for automatic minCoverage
/// selection, N50 style assembly metrics, and their CSV summaries.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Default, Clone, Serialize, Deserialize)]
pub struct Histogram {
    counts: Vec<u64>,
}

impl Histogram {
    pub fn new() -> Self {
        Histogram { counts: Vec::new() }
    }

    pub fn increment(&mut self, value: usize) {
        if value >= self.counts.len() {
            self.counts.resize(value + 1, 0);
        }
        self.counts[value] += 1;
    }

    pub fn count(&self, value: usize) -> u64 {
        self.counts.get(value).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// Locate the first coverage peak after `start` whose area is at least
/// `min_area_fraction` of the total histogram area, and return its left
/// base. The low-coverage noise peak below `start` is never considered.
pub fn find_coverage_peak(
    histogram: &Histogram,
    start: usize,
    min_area_fraction: f64,
) -> Option<usize> {
    let n = histogram.len();
    if n == 0 {
        return None;
    }
    let total = histogram.total();
    if total == 0 {
        return None;
    }

    for p in start.max(1)..n {
        let here = histogram.count(p);
        let left_neighbor = histogram.count(p.wrapping_sub(1));
        let right_neighbor = if p + 1 < n { histogram.count(p + 1) } else { 0 };
        if here == 0 || here < left_neighbor || here < right_neighbor {
            continue;
        }
        // walk outward to the valley bases on both sides
        let mut left = p;
        while left > 1 && histogram.count(left - 1) < histogram.count(left) {
            left -= 1;
        }
        let mut right = p;
        while right + 1 < n && histogram.count(right + 1) < histogram.count(right) {
            right += 1;
        }
        let area: u64 = (left..=right).map(|i| histogram.count(i)).sum();
        if area as f64 >= min_area_fraction * total as f64 {
            return Some(left);
        }
    }
    None
}

#[derive(Default, Clone, Serialize, Deserialize)]
pub struct AssemblyStats {
    pub segment_count: usize,
    pub total_length: u64,
    pub longest: u64,
    pub n50: u64,
}

/// Compute N50 style statistics from segment lengths in bases.
pub fn assembly_stats(lengths: &[u64]) -> AssemblyStats {
    let mut sorted: Vec<u64> = lengths.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    let total: u64 = sorted.iter().sum();
    let mut n50 = 0u64;
    let mut cumulative = 0u64;
    for &length in &sorted {
        cumulative += length;
        if 2 * cumulative >= total {
            n50 = length;
            break;
        }
    }
    AssemblyStats {
        segment_count: sorted.len(),
        total_length: total,
        longest: sorted.first().copied().unwrap_or(0),
        n50,
    }
}

pub fn write_read_length_histogram(path: &Path, bins: &[(usize, usize)]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "LengthBin,ReadCount")?;
    for &(bin, count) in bins {
        writeln!(writer, "{},{}", bin, count)?;
    }
    Ok(())
}

pub fn write_coverage_histogram(path: &Path, histogram: &Histogram) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "Coverage,VertexCount")?;
    for coverage in 0..histogram.len() {
        let count = histogram.count(coverage);
        if count > 0 {
            writeln!(writer, "{},{}", coverage, count)?;
        }
    }
    Ok(())
}

pub fn write_assembly_summary(path: &Path, stats: &AssemblyStats) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "Metric,Value")?;
    writeln!(writer, "SegmentCount,{}", stats.segment_count)?;
    writeln!(writer, "TotalLength,{}", stats.total_length)?;
    writeln!(writer, "Longest,{}", stats.longest)?;
    writeln!(writer, "N50,{}", stats.n50)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_finder_skips_the_noise_peak() {
        let mut histogram = Histogram::new();
        // noise mass at coverage 1, real peak around coverage 5
        for (value, count) in [(1, 100), (2, 5), (3, 3), (4, 10), (5, 20), (6, 15), (7, 5)] {
            for _ in 0..count {
                histogram.increment(value);
            }
        }
        let left_base = find_coverage_peak(&histogram, 2, 0.1).unwrap();
        assert_eq!(left_base, 3);
    }

    #[test]
    fn peak_finder_rejects_tiny_peaks() {
        let mut histogram = Histogram::new();
        for _ in 0..1000 {
            histogram.increment(1);
        }
        histogram.increment(5);
        assert!(find_coverage_peak(&histogram, 2, 0.1).is_none());
    }

    #[test]
    fn n50_of_known_lengths() {
        let stats = assembly_stats(&[10, 20, 30, 40]);
        assert_eq!(stats.total_length, 100);
        assert_eq!(stats.longest, 40);
        // cumulative 40, 70 >= 50 at length 30
        assert_eq!(stats.n50, 30);
        assert_eq!(stats.segment_count, 4);
    }

    #[test]
    fn n50_empty() {
        let stats = assembly_stats(&[]);
        assert_eq!(stats.n50, 0);
        assert_eq!(stats.longest, 0);
    }
}
