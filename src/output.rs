/// Output module
/// Writes the assembly graph as GFA 1.0 and optionally the assembled
/// segment sequences as FASTA. A segment and its reverse complement are one
/// GFA entity: the lower id of each pair is emitted as an S line and the
/// other strand is referenced with '-' orientation in L lines.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use fnv::FnvHashSet;

use crate::assembly_graph::{AssemblyGraph, SegmentId};
use crate::error::Result;

/// Representative of a reverse complement pair and the orientation the
/// segment takes in GFA space.
fn gfa_name(assembly: &AssemblyGraph, segment: SegmentId) -> (SegmentId, char) {
    let rc = assembly.reverse_complement_segment[segment as usize];
    if segment <= rc {
        (segment, '+')
    } else {
        (rc, '-')
    }
}

pub fn write_gfa(path: &Path, assembly: &AssemblyGraph, k: usize) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "H\tVN:Z:1.0")?;

    // S lines: one per reverse complement pair
    for segment in 0..assembly.segment_count() as SegmentId {
        if assembly.segments[segment as usize].was_split {
            continue;
        }
        let (name, orientation) = gfa_name(assembly, segment);
        if orientation != '+' {
            continue;
        }
        let sequence = &assembly.assembled[segment as usize];
        if sequence.is_empty() {
            writeln!(
                writer,
                "S\t{}\t*\tLN:i:{}",
                name,
                assembly.segments[segment as usize].edges.len()
            )?;
        } else {
            writeln!(
                writer,
                "S\t{}\t{}\tLN:i:{}",
                name,
                std::str::from_utf8(sequence).unwrap_or("*"),
                sequence.len()
            )?;
        }
    }

    // L lines: adjacent segments overlap by the k-mer of the shared vertex
    let mut emitted: FnvHashSet<(SegmentId, char, SegmentId, char)> = FnvHashSet::default();
    for segment in 0..assembly.segment_count() as SegmentId {
        if assembly.segments[segment as usize].was_split {
            continue;
        }
        let (from_name, from_orientation) = gfa_name(assembly, segment);
        for &successor in &assembly.successors[segment as usize] {
            if assembly.segments[successor as usize].was_split {
                continue;
            }
            let (to_name, to_orientation) = gfa_name(assembly, successor);
            let link = (from_name, from_orientation, to_name, to_orientation);
            // the mirror link is the same GFA connection read backwards
            let flip = |orientation: char| if orientation == '+' { '-' } else { '+' };
            let mirror = (to_name, flip(to_orientation), from_name, flip(from_orientation));
            if emitted.contains(&link) || emitted.contains(&mirror) {
                continue;
            }
            emitted.insert(link);
            writeln!(
                writer,
                "L\t{}\t{}\t{}\t{}\t{}M",
                from_name, from_orientation, to_name, to_orientation, k
            )?;
        }
    }
    Ok(())
}

pub fn write_fasta(path: &Path, assembly: &AssemblyGraph) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for segment in 0..assembly.segment_count() as SegmentId {
        if assembly.segments[segment as usize].was_split {
            continue;
        }
        let (name, orientation) = gfa_name(assembly, segment);
        if orientation != '+' {
            continue;
        }
        let sequence = &assembly.assembled[segment as usize];
        if sequence.is_empty() {
            continue;
        }
        writeln!(writer, ">{} length={}", name, sequence.len())?;
        for chunk in sequence.chunks(80) {
            writer.write_all(chunk)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly_graph::Segment;

    fn tiny_assembly() -> AssemblyGraph {
        let mut assembly = AssemblyGraph::default();
        for i in 0..2u64 {
            assembly.segments.push(Segment {
                source: i,
                target: i + 10,
                edges: vec![i],
                was_split: false,
            });
            assembly.successors.push(Vec::new());
            assembly.predecessors.push(Vec::new());
            assembly.oriented_reads_by_segment.push(Vec::new());
        }
        assembly.reverse_complement_segment = vec![1, 0];
        assembly.assembled = vec![b"ACGTACGTAC".to_vec(), b"GTACGTACGT".to_vec()];
        assembly
    }

    #[test]
    fn gfa_emits_one_s_line_per_pair() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assembly.gfa");
        write_gfa(&path, &tiny_assembly(), 5).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("H\tVN:Z:1.0"));
        let s_lines: Vec<&str> = text.lines().filter(|l| l.starts_with("S\t")).collect();
        assert_eq!(s_lines.len(), 1);
        assert!(s_lines[0].contains("ACGTACGTAC"));
    }

    #[test]
    fn fasta_emits_one_record_per_pair() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assembly.fasta");
        write_fasta(&path, &tiny_assembly()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().filter(|l| l.starts_with('>')).count(), 1);
        assert!(text.contains("ACGTACGTAC"));
    }
}
