#![allow(dead_code)]

use std::io::Write;
use std::sync::Arc;

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use hashprobe_core::archive::hashfs::{
    hash_hashfs_path, ENTRY_SIZE, FLAG_COMPRESSED, FLAG_DIRECTORY, HASHFS_MAGIC,
    HASH_METHOD_CITY, HEADER_SIZE,
};
use hashprobe_core::formats::tobj::{TOBJ_HEADER_SIZE, TOBJ_MAGIC};
use hashprobe_core::{DiscoveryConfig, ExecutionMode, HashFsArchive};
use tempfile::NamedTempFile;

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn hash(path: &str) -> u64 {
    hash_hashfs_path(path, 0)
}

/// Text SII document wrapping one unit
pub fn sii_unit(class: &str, name: &str, body: &str) -> Vec<u8> {
    format!("SiiNunit\n{{\n{} : {}\n{{\n{}\n}}\n}}\n", class, name, body).into_bytes()
}

/// TOBJ descriptor listing `paths`
pub fn tobj(paths: &[&str]) -> Vec<u8> {
    let mut data = Vec::new();
    data.write_u32::<LittleEndian>(TOBJ_MAGIC).unwrap();
    data.resize(TOBJ_HEADER_SIZE as usize, 0);
    for path in paths {
        data.write_u32::<LittleEndian>(path.len() as u32).unwrap();
        data.write_u32::<LittleEndian>(0).unwrap();
        data.extend_from_slice(path.as_bytes());
    }
    data
}

enum Placement {
    /// Own payload appended to the data area
    Blob(Vec<u8>),
    /// Shares the offset of the blob stored for another path
    SharedWith(String),
    /// Offset written as given, with no payload behind it
    Fixed(u64),
}

struct PendingEntry {
    hash: u64,
    flags: u32,
    size: u32,
    compressed_size: u32,
    placement: Placement,
}

/// Writes HashFS v1 images: header, entry table, then payloads in insertion order
#[derive(Default)]
pub struct ArchiveBuilder {
    entries: Vec<PendingEntry>,
    /// Path owning each blob, for `SharedWith` lookups
    blob_owners: Vec<(String, u64)>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_blob(&mut self, path: &str, flags: u32, size: u32, stored: Vec<u8>) {
        let hash = hash(path);
        self.blob_owners.push((path.to_string(), hash));
        self.entries.push(PendingEntry {
            hash,
            flags,
            size,
            compressed_size: stored.len() as u32,
            placement: Placement::Blob(stored),
        });
    }

    /// Uncompressed file
    pub fn file(mut self, path: &str, content: &[u8]) -> Self {
        self.push_blob(path, 0, content.len() as u32, content.to_vec());
        self
    }

    /// zlib-compressed file
    pub fn compressed_file(mut self, path: &str, content: &[u8]) -> Self {
        self.push_blob(path, FLAG_COMPRESSED, content.len() as u32, zlib(content));
        self
    }

    /// Entry flagged compressed whose stored bytes are not a zlib stream
    pub fn corrupt_file(mut self, path: &str, stored: &[u8], size: u32) -> Self {
        self.push_blob(path, FLAG_COMPRESSED, size, stored.to_vec());
        self
    }

    /// Directory entry flagged compressed whose stored bytes are not a zlib stream
    pub fn corrupt_dir(mut self, path: &str, stored: &[u8], size: u32) -> Self {
        self.push_blob(path, FLAG_DIRECTORY | FLAG_COMPRESSED, size, stored.to_vec());
        self
    }

    /// Entry whose table record points at `offset` regardless of where the data lies
    pub fn at_offset(mut self, path: &str, offset: u64, size: u32) -> Self {
        self.entries.push(PendingEntry {
            hash: hash(path),
            flags: 0,
            size,
            compressed_size: size,
            placement: Placement::Fixed(offset),
        });
        self
    }

    /// Directory entry for `path` pointing at the payload already stored for `target`
    pub fn shared_dir(mut self, path: &str, target: &str, size: u32, compressed_size: u32) -> Self {
        self.entries.push(PendingEntry {
            hash: hash(path),
            flags: FLAG_DIRECTORY,
            size,
            compressed_size,
            placement: Placement::SharedWith(target.to_string()),
        });
        self
    }

    /// Directory entry; subdirectories are listed with a `*` prefix
    pub fn dir(mut self, path: &str, files: &[&str], subdirs: &[&str]) -> Self {
        let mut listing = String::new();
        for dir in subdirs {
            listing.push_str(&format!("*{}\n", dir));
        }
        for file in files {
            listing.push_str(&format!("{}\n", file));
        }
        let bytes = listing.into_bytes();
        self.push_blob(path, FLAG_DIRECTORY, bytes.len() as u32, bytes);
        self
    }

    /// Extra entry for `path` that points at the payload already stored for `target`
    pub fn shared(
        mut self,
        path: &str,
        target: &str,
        compressed: bool,
        size: u32,
        compressed_size: u32,
    ) -> Self {
        self.entries.push(PendingEntry {
            hash: hash(path),
            flags: if compressed { FLAG_COMPRESSED } else { 0 },
            size,
            compressed_size,
            placement: Placement::SharedWith(target.to_string()),
        });
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let table_len = self.entries.len() * ENTRY_SIZE;
        let data_start = (HEADER_SIZE + table_len) as u64;

        let mut data = Vec::new();
        let mut offsets = Vec::with_capacity(self.entries.len());
        let mut blob_offsets = std::collections::HashMap::new();
        for entry in &self.entries {
            match &entry.placement {
                Placement::Blob(stored) => {
                    let offset = data_start + data.len() as u64;
                    blob_offsets.insert(entry.hash, offset);
                    data.extend_from_slice(stored);
                    offsets.push(Some(offset));
                }
                Placement::SharedWith(_) => offsets.push(None),
                Placement::Fixed(offset) => offsets.push(Some(*offset)),
            }
        }

        let mut out = Vec::new();
        out.write_u32::<LittleEndian>(HASHFS_MAGIC).unwrap();
        out.write_u16::<LittleEndian>(1).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u32::<LittleEndian>(HASH_METHOD_CITY).unwrap();
        out.write_u32::<LittleEndian>(self.entries.len() as u32).unwrap();
        out.write_u32::<LittleEndian>(HEADER_SIZE as u32).unwrap();

        for (entry, offset) in self.entries.iter().zip(offsets) {
            let offset = match (&entry.placement, offset) {
                (_, Some(offset)) => offset,
                (Placement::SharedWith(target), None) => {
                    let (_, owner) = self
                        .blob_owners
                        .iter()
                        .find(|(path, _)| path == target)
                        .unwrap_or_else(|| panic!("no blob stored for {}", target));
                    blob_offsets[owner]
                }
                (Placement::Blob(_) | Placement::Fixed(_), None) => unreachable!(),
            };
            out.write_u64::<LittleEndian>(entry.hash).unwrap();
            out.write_u64::<LittleEndian>(offset).unwrap();
            out.write_u32::<LittleEndian>(entry.flags).unwrap();
            out.write_u32::<LittleEndian>(0).unwrap();
            out.write_u32::<LittleEndian>(entry.size).unwrap();
            out.write_u32::<LittleEndian>(entry.compressed_size).unwrap();
        }

        out.extend_from_slice(&data);
        out
    }

    pub fn write(&self) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&self.to_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    /// Write the image and open it; the temp file must outlive the archive
    pub fn open(&self) -> (NamedTempFile, Arc<HashFsArchive>) {
        let file = self.write();
        let archive = HashFsArchive::open(file.path()).unwrap();
        (file, Arc::new(archive))
    }
}

pub fn sequential_config() -> DiscoveryConfig {
    DiscoveryConfig::default()
        .with_execution(ExecutionMode::Sequential)
        .with_reader_pool_size(None)
}

pub fn parallel_config() -> DiscoveryConfig {
    DiscoveryConfig::default()
        .with_execution(ExecutionMode::Parallel { threads: Some(4) })
        .with_reader_pool_size(Some(3))
}
