//! Archive backend abstraction
//!
//! The discovery engine never parses a container itself. It talks to an [`Archive`]
//! (hash-indexed entry table, path hashing) and to [`ArchiveReader`] handles that do the
//! actual seeking and decompression. Readers are cheap to open, so the engine can keep a
//! bounded pool of them for parallel extraction.

use std::collections::{BTreeMap, HashMap, HashSet};

use thiserror::Error;

pub mod hashfs;
pub mod pool;

pub use hashfs::{HashFsArchive, HashFsReader};
pub use pool::{ExtractionGate, PooledReader, ReaderPool};

/// Errors raised by archive backends
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry content could not be inflated. The entry is most likely planted junk.
    #[error("failed to decompress entry {hash:016x}: {source}")]
    Decompression {
        hash: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid archive header: {0}")]
    InvalidHeader(String),

    #[error("unsupported archive version {0}")]
    UnsupportedVersion(u16),

    #[error("read of {len} bytes at offset {offset} is outside the archive")]
    OutOfBounds { offset: u64, len: u64 },

    #[error("entry {0:016x} is not a directory")]
    NotADirectory(u64),
}

impl ArchiveError {
    /// Whether the error is tied to one entry's payload rather than to the reader handle
    pub fn is_entry_specific(&self) -> bool {
        matches!(
            self,
            ArchiveError::Decompression { .. }
                | ArchiveError::OutOfBounds { .. }
                | ArchiveError::NotADirectory(_)
        )
    }
}

/// One record of the archive's entry table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub hash: u64,
    pub offset: u64,
    /// Uncompressed size in bytes
    pub size: u32,
    /// Size of the stored payload in bytes
    pub compressed_size: u32,
    pub is_compressed: bool,
    pub is_directory: bool,
    /// Payload that never carries path references (e.g. a packed companion texture)
    pub is_auxiliary: bool,
}

/// Three-state existence answer for a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    NotFound,
}

/// Names listed by a directory entry, relative to that directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryListing {
    pub files: Vec<String>,
    pub subdirs: Vec<String>,
}

impl DirectoryListing {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.subdirs.is_empty()
    }
}

/// Hash-indexed entry table
#[derive(Debug, Clone, Default)]
pub struct EntryTable {
    entries: HashMap<u64, Entry>,
}

impl EntryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry. A later entry with the same hash replaces the earlier one.
    pub fn insert(&mut self, entry: Entry) {
        self.entries.insert(entry.hash, entry);
    }

    pub fn get(&self, hash: u64) -> Option<&Entry> {
        self.entries.get(&hash)
    }

    pub fn contains(&self, hash: u64) -> bool {
        self.entries.contains_key(&hash)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries grouped by byte offset, ascending
    pub fn by_offset(&self) -> BTreeMap<u64, Vec<Entry>> {
        let mut groups: BTreeMap<u64, Vec<Entry>> = BTreeMap::new();
        for entry in self.entries.values() {
            groups.entry(entry.offset).or_default().push(*entry);
        }
        for group in groups.values_mut() {
            group.sort_by_key(|e| e.hash);
        }
        groups
    }
}

impl FromIterator<Entry> for EntryTable {
    fn from_iter<I: IntoIterator<Item = Entry>>(iter: I) -> Self {
        let mut table = EntryTable::new();
        for entry in iter {
            table.insert(entry);
        }
        table
    }
}

/// Read-only view of an opened archive
pub trait Archive: Send + Sync {
    type Reader: ArchiveReader;

    /// The complete entry table
    fn entries(&self) -> &EntryTable;

    /// Hash a normalized (leading `/`) path the way the container does
    fn hash_path(&self, path: &str) -> u64;

    /// Total length of the backing store in bytes
    fn archive_len(&self) -> u64;

    /// Open an independent handle onto the same archive
    fn open_reader(&self) -> Result<Self::Reader, ArchiveError>;

    fn entry_by_path(&self, path: &str) -> Option<&Entry> {
        self.entries().get(self.hash_path(path))
    }

    fn entry_kind(&self, path: &str) -> EntryKind {
        match self.entry_by_path(path) {
            Some(entry) if entry.is_directory => EntryKind::Directory,
            Some(_) => EntryKind::File,
            None => EntryKind::NotFound,
        }
    }
}

/// A handle that can seek and decompress
pub trait ArchiveReader: Send {
    /// Read and, when flagged, inflate an entry's payload
    fn extract(&mut self, entry: &Entry) -> Result<Vec<u8>, ArchiveError>;

    /// Read raw stored bytes, clamped to the end of the archive
    fn read_raw(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, ArchiveError>;

    /// Decode a directory entry into its child names
    fn list_directory(&mut self, entry: &Entry) -> Result<DirectoryListing, ArchiveError>;
}

/// Result of walking a directory subtree through its listings
#[derive(Debug, Default, Clone)]
pub struct Traversal {
    /// Every directory reached, including the starting one
    pub directories: Vec<String>,
    pub files: Vec<String>,
    /// Listed names that have no entry
    pub missing: Vec<String>,
    /// Directories passed over because the caller excluded their entry
    pub excluded: Vec<String>,
    /// Hashes of directory entries whose listing could not be decoded
    pub unreadable: Vec<u64>,
}

/// Join a directory path and a child name into a normalized path
pub fn join_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    format!("{}/{}", dir, name)
}

/// Walk a directory through the backend's listings.
///
/// Listings may be falsified, so cycles and dangling names are tolerated: each directory is
/// expanded at most once and names without an entry are reported as missing. Directories whose
/// entry matches `exclude` are never read. A listing that fails to decode is recorded in
/// [`Traversal::unreadable`] and the walk carries on with the remaining directories; only
/// errors that leave the reader unusable end it.
pub fn walk_directory<A, F>(
    archive: &A,
    reader: &mut A::Reader,
    root: &str,
    exclude: F,
) -> Result<Traversal, ArchiveError>
where
    A: Archive,
    F: Fn(&Entry) -> bool,
{
    let mut traversal = Traversal::default();
    let mut seen = HashSet::new();
    let mut stack = vec![root.to_string()];

    while let Some(dir) = stack.pop() {
        if !seen.insert(dir.clone()) {
            continue;
        }
        let Some(entry) = archive.entry_by_path(&dir) else {
            traversal.missing.push(dir);
            continue;
        };
        if !entry.is_directory {
            traversal.files.push(dir);
            continue;
        }
        if exclude(entry) {
            tracing::trace!("Not listing excluded directory {}", dir);
            traversal.excluded.push(dir);
            continue;
        }
        let listing = match reader.list_directory(entry) {
            Ok(listing) => listing,
            Err(e) if e.is_entry_specific() => {
                tracing::warn!("Directory {} is unreadable: {}", dir, e);
                traversal.unreadable.push(entry.hash);
                continue;
            }
            Err(e) => return Err(e),
        };
        tracing::trace!(
            "Listing {}: {} files, {} subdirs",
            dir,
            listing.files.len(),
            listing.subdirs.len()
        );
        for name in &listing.files {
            let path = join_path(&dir, name);
            match archive.entry_kind(&path) {
                EntryKind::NotFound => traversal.missing.push(path),
                _ => traversal.files.push(path),
            }
        }
        for name in &listing.subdirs {
            stack.push(join_path(&dir, name));
        }
        traversal.directories.push(dir);
    }

    Ok(traversal)
}
