/// Persistent storage module
/// Named binary objects in the assembly directory, standing in for the
/// memory-mapped persistent vector service. Every file is a raw element
/// buffer behind a small header (magic, element size, element count).
/// Ragged data uses two files: a prefix-sum index and a flat data buffer,
/// so persisted structures never embed owning indirections.
/// A pipeline can restart at any stage by re-opening the objects produced
/// by the stages before it.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{AssemblyError, Result};

const MAGIC: u64 = 0x304154454e524f;

pub struct BinaryStore {
    directory: PathBuf,
}

fn write_header(writer: &mut impl Write, element_size: u64, count: u64) -> Result<()> {
    writer.write_all(&MAGIC.to_le_bytes())?;
    writer.write_all(&element_size.to_le_bytes())?;
    writer.write_all(&count.to_le_bytes())?;
    Ok(())
}

fn read_header(reader: &mut impl Read, name: &str) -> Result<(u64, u64)> {
    let mut buffer = [0u8; 8];
    reader.read_exact(&mut buffer)?;
    if u64::from_le_bytes(buffer) != MAGIC {
        return Err(AssemblyError::Input(format!(
            "persisted object {} has a bad magic number",
            name
        )));
    }
    reader.read_exact(&mut buffer)?;
    let element_size = u64::from_le_bytes(buffer);
    reader.read_exact(&mut buffer)?;
    let count = u64::from_le_bytes(buffer);
    Ok((element_size, count))
}

fn encode<T: Serialize>(item: &T, name: &str) -> Result<Vec<u8>> {
    bincode::serialize(item).map_err(|e| {
        AssemblyError::Resource(format!("cannot serialize element of {}: {}", name, e))
    })
}

fn decode<T: DeserializeOwned>(bytes: &[u8], name: &str) -> Result<T> {
    bincode::deserialize(bytes).map_err(|_| {
        AssemblyError::Input(format!("persisted object {} is corrupt", name))
    })
}

impl BinaryStore {
    /// Create the assembly directory (if needed) and open the store.
    pub fn create(directory: &Path) -> Result<Self> {
        std::fs::create_dir_all(directory).map_err(|e| {
            AssemblyError::Resource(format!(
                "cannot create assembly directory {}: {}",
                directory.display(),
                e
            ))
        })?;
        Ok(BinaryStore {
            directory: directory.to_path_buf(),
        })
    }

    pub fn open(directory: &Path) -> Result<Self> {
        if !directory.is_dir() {
            return Err(AssemblyError::Input(format!(
                "assembly directory {} does not exist",
                directory.display()
            )));
        }
        Ok(BinaryStore {
            directory: directory.to_path_buf(),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{}.bin", name))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    /// Save a vector of fixed-size elements.
    pub fn save_vector<T: Serialize>(&self, name: &str, items: &[T]) -> Result<()> {
        let mut writer = BufWriter::new(File::create(self.path(name))?);
        let element_size = match items.first() {
            Some(first) => encode(first, name)?.len() as u64,
            None => 0,
        };
        write_header(&mut writer, element_size, items.len() as u64)?;
        for item in items {
            let bytes = encode(item, name)?;
            if bytes.len() as u64 != element_size {
                return Err(AssemblyError::invariant(format!(
                    "variable element size while saving {}",
                    name
                )));
            }
            writer.write_all(&bytes)?;
        }
        Ok(())
    }

    pub fn load_vector<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>> {
        let mut reader = BufReader::new(File::open(self.path(name))?);
        let (element_size, count) = read_header(&mut reader, name)?;
        let mut items: Vec<T> = Vec::with_capacity(count as usize);
        let mut buffer = vec![0u8; element_size as usize];
        for _ in 0..count {
            reader.read_exact(&mut buffer)?;
            items.push(decode(&buffer, name)?);
        }
        Ok(items)
    }

    /// Save ragged data: a prefix-sum index file plus a flat data file.
    pub fn save_ragged<T: Serialize>(&self, name: &str, items: &[Vec<T>]) -> Result<()> {
        let mut offsets: Vec<u64> = Vec::with_capacity(items.len() + 1);
        let mut offset = 0u64;
        offsets.push(0);
        for list in items {
            offset += list.len() as u64;
            offsets.push(offset);
        }
        self.save_vector(&format!("{}-index", name), &offsets)?;
        let flat: Vec<&T> = items.iter().flatten().collect();
        // save_vector over references serializes the referents
        let mut writer = BufWriter::new(File::create(self.path(&format!("{}-data", name)))?);
        let element_size = match flat.first() {
            Some(first) => encode(first, name)?.len() as u64,
            None => 0,
        };
        write_header(&mut writer, element_size, flat.len() as u64)?;
        for item in flat {
            let bytes = encode(item, name)?;
            if bytes.len() as u64 != element_size {
                return Err(AssemblyError::invariant(format!(
                    "variable element size while saving {}",
                    name
                )));
            }
            writer.write_all(&bytes)?;
        }
        Ok(())
    }

    pub fn load_ragged<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<Vec<T>>> {
        let offsets: Vec<u64> = self.load_vector(&format!("{}-index", name))?;
        let flat: Vec<T> = self.load_vector(&format!("{}-data", name))?;
        let mut items: Vec<Vec<T>> = Vec::with_capacity(offsets.len().saturating_sub(1));
        let mut flat = flat.into_iter();
        for window in offsets.windows(2) {
            let length = (window[1] - window[0]) as usize;
            items.push(flat.by_ref().take(length).collect());
        }
        Ok(items)
    }

    /// Save one irregular object as a single serialized blob.
    pub fn save_object<T: Serialize>(&self, name: &str, object: &T) -> Result<()> {
        let bytes = encode(object, name)?;
        let mut writer = BufWriter::new(File::create(self.path(name))?);
        write_header(&mut writer, bytes.len() as u64, 1)?;
        writer.write_all(&bytes)?;
        Ok(())
    }

    pub fn load_object<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let mut reader = BufReader::new(File::open(self.path(name))?);
        let (element_size, count) = read_header(&mut reader, name)?;
        if count != 1 {
            return Err(AssemblyError::Input(format!(
                "persisted object {} is not a single object",
                name
            )));
        }
        let mut buffer = vec![0u8; element_size as usize];
        reader.read_exact(&mut buffer)?;
        decode(&buffer, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = BinaryStore::create(dir.path()).unwrap();
        let data: Vec<u64> = vec![5, 7, 11, 13];
        store.save_vector("numbers", &data).unwrap();
        let loaded: Vec<u64> = store.load_vector("numbers").unwrap();
        assert_eq!(loaded, data);
    }

    #[test]
    fn ragged_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = BinaryStore::create(dir.path()).unwrap();
        let data: Vec<Vec<u32>> = vec![vec![1, 2], vec![], vec![3, 4, 5]];
        store.save_ragged("lists", &data).unwrap();
        let loaded: Vec<Vec<u32>> = store.load_ragged("lists").unwrap();
        assert_eq!(loaded, data);
    }

    #[test]
    fn object_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = BinaryStore::create(dir.path()).unwrap();
        let object: (String, Vec<u8>) = ("hello".to_string(), vec![1, 2, 3]);
        store.save_object("pair", &object).unwrap();
        let loaded: (String, Vec<u8>) = store.load_object("pair").unwrap();
        assert_eq!(loaded, object);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = BinaryStore::create(dir.path()).unwrap();
        std::fs::write(dir.path().join("junk.bin"), b"not a real object at all").unwrap();
        let result: Result<Vec<u64>> = store.load_vector("junk");
        assert!(result.is_err());
    }

    #[test]
    fn missing_directory_is_rejected() {
        assert!(BinaryStore::open(Path::new("/definitely/not/there")).is_err());
    }
}
