/// HashFS v1 container support
use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::ZlibDecoder;
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::{Archive, ArchiveError, ArchiveReader, DirectoryListing, Entry, EntryTable};
use crate::hash::city_hash64;

/// `SCS#` read as a little-endian u32
pub const HASHFS_MAGIC: u32 = 0x2353_4353;
/// `CITY` read as a little-endian u32
pub const HASH_METHOD_CITY: u32 = 0x5954_4943;
pub const HEADER_SIZE: usize = 20;
pub const ENTRY_SIZE: usize = 32;

pub const FLAG_DIRECTORY: u32 = 0x1;
pub const FLAG_COMPRESSED: u32 = 0x2;
/// Output pre-allocated per stored byte, whatever size the entry declares
pub const MAX_INFLATE_RATIO: usize = 16;

/// HashFS header
#[derive(Debug, Clone, Copy)]
pub struct HashFsHeader {
    pub version: u16,
    pub salt: u16,
    pub hash_method: u32,
    pub entry_count: u32,
    pub entry_table_offset: u32,
}

impl HashFsHeader {
    /// Parse the header from raw bytes
    pub fn parse(data: &[u8]) -> Result<Self, ArchiveError> {
        if data.len() < HEADER_SIZE {
            return Err(ArchiveError::InvalidHeader(format!(
                "need {} header bytes, got {}",
                HEADER_SIZE,
                data.len()
            )));
        }

        let mut cursor = Cursor::new(data);
        let magic = cursor.read_u32::<LittleEndian>()?;
        if magic != HASHFS_MAGIC {
            return Err(ArchiveError::InvalidHeader(format!(
                "bad magic {:#010x}",
                magic
            )));
        }

        let version = cursor.read_u16::<LittleEndian>()?;
        if version != 1 {
            return Err(ArchiveError::UnsupportedVersion(version));
        }
        let salt = cursor.read_u16::<LittleEndian>()?;
        let hash_method = cursor.read_u32::<LittleEndian>()?;
        if hash_method != HASH_METHOD_CITY {
            return Err(ArchiveError::InvalidHeader(format!(
                "unknown hash method {:#010x}",
                hash_method
            )));
        }
        let entry_count = cursor.read_u32::<LittleEndian>()?;
        let entry_table_offset = cursor.read_u32::<LittleEndian>()?;

        Ok(HashFsHeader {
            version,
            salt,
            hash_method,
            entry_count,
            entry_table_offset,
        })
    }
}

/// Parse one 32-byte entry record
fn parse_entry(record: &[u8]) -> Result<Entry, ArchiveError> {
    let mut cursor = Cursor::new(record);
    let hash = cursor.read_u64::<LittleEndian>()?;
    let offset = cursor.read_u64::<LittleEndian>()?;
    let flags = cursor.read_u32::<LittleEndian>()?;
    let _crc = cursor.read_u32::<LittleEndian>()?;
    let size = cursor.read_u32::<LittleEndian>()?;
    let compressed_size = cursor.read_u32::<LittleEndian>()?;

    Ok(Entry {
        hash,
        offset,
        size,
        compressed_size,
        is_compressed: flags & FLAG_COMPRESSED != 0,
        is_directory: flags & FLAG_DIRECTORY != 0,
        is_auxiliary: false,
    })
}

/// An opened HashFS v1 archive
#[derive(Debug)]
pub struct HashFsArchive {
    path: PathBuf,
    header: HashFsHeader,
    entries: EntryTable,
    len: u64,
}

impl HashFsArchive {
    /// Open an archive and load its entry table
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ArchiveError> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let len = file.metadata()?.len();

        let mut header_bytes = [0u8; HEADER_SIZE];
        file.read_exact(&mut header_bytes).map_err(|e| {
            ArchiveError::InvalidHeader(format!("archive too short for a header: {}", e))
        })?;
        let header = HashFsHeader::parse(&header_bytes)?;

        let table_len = header.entry_count as u64 * ENTRY_SIZE as u64;
        let table_offset = header.entry_table_offset as u64;
        if table_offset + table_len > len {
            return Err(ArchiveError::OutOfBounds {
                offset: table_offset,
                len: table_len,
            });
        }

        file.seek(SeekFrom::Start(table_offset))?;
        let mut table = vec![0u8; table_len as usize];
        file.read_exact(&mut table)?;

        let mut entries = EntryTable::new();
        for record in table.chunks_exact(ENTRY_SIZE) {
            entries.insert(parse_entry(record)?);
        }

        tracing::info!(
            "Opened HashFS archive {}: {} entries, salt {}",
            path.display(),
            entries.len(),
            header.salt
        );

        Ok(HashFsArchive {
            path,
            header,
            entries,
            len,
        })
    }

    pub fn header(&self) -> &HashFsHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Hash a path the way HashFS does: no leading slash, salt prefixed as decimal
pub fn hash_hashfs_path(path: &str, salt: u16) -> u64 {
    let trimmed = path.trim_start_matches('/');
    if salt == 0 {
        city_hash64(trimmed.as_bytes())
    } else {
        city_hash64(format!("{}{}", salt, trimmed).as_bytes())
    }
}

impl Archive for HashFsArchive {
    type Reader = HashFsReader;

    fn entries(&self) -> &EntryTable {
        &self.entries
    }

    fn hash_path(&self, path: &str) -> u64 {
        hash_hashfs_path(path, self.header.salt)
    }

    fn archive_len(&self) -> u64 {
        self.len
    }

    fn open_reader(&self) -> Result<HashFsReader, ArchiveError> {
        Ok(HashFsReader {
            file: File::open(&self.path)?,
            len: self.len,
        })
    }
}

/// Independent seekable handle onto a HashFS archive
#[derive(Debug)]
pub struct HashFsReader {
    file: File,
    len: u64,
}

impl HashFsReader {
    fn read_exact_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, ArchiveError> {
        offset
            .checked_add(len as u64)
            .filter(|end| *end <= self.len)
            .ok_or(ArchiveError::OutOfBounds {
                offset,
                len: len as u64,
            })?;
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl ArchiveReader for HashFsReader {
    fn extract(&mut self, entry: &Entry) -> Result<Vec<u8>, ArchiveError> {
        let stored = self.read_exact_at(entry.offset, entry.compressed_size as usize)?;
        if !entry.is_compressed {
            return Ok(stored);
        }

        let declared = entry.size as usize;
        let mut inflated =
            Vec::with_capacity(declared.min(stored.len().saturating_mul(MAX_INFLATE_RATIO)));
        ZlibDecoder::new(&stored[..])
            .take(entry.size as u64 + 1)
            .read_to_end(&mut inflated)
            .map_err(|source| ArchiveError::Decompression {
                hash: entry.hash,
                source,
            })?;
        if inflated.len() > declared {
            return Err(ArchiveError::Decompression {
                hash: entry.hash,
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("payload inflates past its declared {} bytes", declared),
                ),
            });
        }
        Ok(inflated)
    }

    fn read_raw(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, ArchiveError> {
        if offset >= self.len {
            return Ok(Vec::new());
        }
        let available = (self.len - offset).min(len as u64) as usize;
        self.read_exact_at(offset, available)
    }

    fn list_directory(&mut self, entry: &Entry) -> Result<DirectoryListing, ArchiveError> {
        if !entry.is_directory {
            return Err(ArchiveError::NotADirectory(entry.hash));
        }
        let content = self.extract(entry)?;
        Ok(parse_directory_listing(&content))
    }
}

/// Decode a v1 directory payload: one name per line, `*` marks a subdirectory
pub fn parse_directory_listing(content: &[u8]) -> DirectoryListing {
    let text = String::from_utf8_lossy(content);
    let mut listing = DirectoryListing::default();
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        match line.strip_prefix('*') {
            Some(dir) if !dir.is_empty() => listing.subdirs.push(dir.to_string()),
            Some(_) => {}
            None => listing.files.push(line.to_string()),
        }
    }
    listing
}
