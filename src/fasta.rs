/// Minimal FASTA input module
/// Input parsing proper is the job of an external parser; this is the thin
/// reader the binary needs to feed the read store. Multi-line records,
/// '>' headers, sequence validation is delegated to ReadStore::add_read.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{AssemblyError, Result};
use crate::reads::ReadStore;

/// Read a FASTA file into the store. Returns the number of reads accepted.
pub fn load_fasta(path: &Path, store: &mut ReadStore, min_read_length: usize) -> Result<usize> {
    let reader = BufReader::new(File::open(path)?);

    let mut accepted = 0usize;
    let mut name: Option<String> = None;
    let mut sequence: Vec<u8> = Vec::new();

    let flush = |name: &Option<String>, sequence: &[u8], accepted: &mut usize, store: &mut ReadStore| {
        if let Some(n) = name {
            if store.add_read(n, sequence, min_read_length).is_some() {
                *accepted += 1;
            }
        }
    };

    for (line_nr, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('>') {
            flush(&name, &sequence, &mut accepted, store);
            sequence.clear();
            // the name is the first whitespace-delimited token of the header
            let token = header.split_whitespace().next().unwrap_or("");
            if token.is_empty() {
                return Err(AssemblyError::Input(format!(
                    "empty FASTA header at line {} of {}",
                    line_nr + 1,
                    path.display()
                )));
            }
            name = Some(token.to_string());
        } else {
            if name.is_none() {
                return Err(AssemblyError::Input(format!(
                    "sequence before first FASTA header at line {} of {}",
                    line_nr + 1,
                    path.display()
                )));
            }
            sequence.extend_from_slice(line.trim_end().as_bytes());
        }
    }
    flush(&name, &sequence, &mut accepted, store);

    Ok(accepted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_multiline_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reads.fasta");
        let mut f = File::create(&path).unwrap();
        writeln!(f, ">read1 some description").unwrap();
        writeln!(f, "AACGTA").unwrap();
        writeln!(f, "CGTAAC").unwrap();
        writeln!(f, ">read2").unwrap();
        writeln!(f, "TTTTGCA").unwrap();
        drop(f);

        let mut store = ReadStore::new();
        let accepted = load_fasta(&path, &mut store, 1).unwrap();
        assert_eq!(accepted, 2);
        assert_eq!(store.name(0), "read1");
        assert_eq!(store.sequence(0), b"AACGTACGTAAC");
        assert_eq!(store.sequence(1), b"TTTTGCA");
    }

    #[test]
    fn rejects_headerless_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.fasta");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "AACGTA").unwrap();
        drop(f);

        let mut store = ReadStore::new();
        assert!(load_fasta(&path, &mut store, 1).is_err());
    }
}
