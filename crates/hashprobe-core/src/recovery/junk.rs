/// Duplicate-offset junk resolution
///
/// Obfuscated archives plant extra entries that point at the same bytes as a genuine one. A
/// group of entries sharing an offset is classified once, before discovery, by comparing each
/// entry's declared layout with what is actually stored between its offset and the next one.
use flate2::read::ZlibDecoder;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Read;

use crate::archive::{Archive, ArchiveError, ArchiveReader, Entry};

/// Largest gap allowed between the end of a payload and the next entry's offset
pub const SLACK_TOLERANCE: u64 = 32;

/// First byte of a zlib stream at the default window size
pub const ZLIB_MAGIC: u8 = 0x78;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum JunkKind {
    /// Never extracted or explored
    ConfirmedJunk,
    /// Extracted only when a resolved path hashes onto it
    MaybeJunk,
}

/// Entry hash to classification
pub type JunkMap = HashMap<u64, JunkKind>;

/// What the stored bytes at a shared offset look like
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredProbe {
    /// Start of the next distinct offset, or the archive length
    pub next_offset: u64,
    /// First stored byte is the zlib magic
    pub sniffed_compressed: bool,
    /// Inflated length of a trial decompression over the whole gap
    pub trial_len: Option<u64>,
}

/// Classify one entry of a duplicate-offset group
pub fn classify_entry(entry: &Entry, probe: &StoredProbe) -> JunkKind {
    if entry.is_compressed != probe.sniffed_compressed {
        return JunkKind::ConfirmedJunk;
    }
    let gap = probe.next_offset.saturating_sub(entry.offset);
    if gap < entry.compressed_size as u64 {
        return JunkKind::ConfirmedJunk;
    }
    if gap - entry.compressed_size as u64 > SLACK_TOLERANCE {
        return JunkKind::ConfirmedJunk;
    }
    if entry.is_compressed && probe.trial_len != Some(entry.size as u64) {
        return JunkKind::ConfirmedJunk;
    }
    JunkKind::MaybeJunk
}

fn trial_inflate(stored: &[u8]) -> Option<u64> {
    let mut inflated = Vec::new();
    match ZlibDecoder::new(stored).read_to_end(&mut inflated) {
        Ok(n) => Some(n as u64),
        Err(e) => {
            tracing::trace!("Trial decompression failed: {}", e);
            None
        }
    }
}

/// Classify every entry that shares its offset with another entry.
///
/// Entries with a unique offset are authoritative and do not appear in the map.
pub fn resolve_junk<A: Archive>(
    archive: &A,
    reader: &mut A::Reader,
) -> Result<JunkMap, ArchiveError> {
    let groups = archive.entries().by_offset();
    let offsets: Vec<u64> = groups.keys().copied().collect();
    let mut junk = JunkMap::new();

    for (i, (&offset, group)) in groups.iter().enumerate() {
        if group.len() < 2 {
            continue;
        }
        let next_offset = offsets
            .get(i + 1)
            .copied()
            .unwrap_or_else(|| archive.archive_len());

        let first = reader.read_raw(offset, 1)?;
        let sniffed_compressed = first.first() == Some(&ZLIB_MAGIC);
        let trial_len = if sniffed_compressed {
            let span = next_offset.saturating_sub(offset) as usize;
            trial_inflate(&reader.read_raw(offset, span)?)
        } else {
            None
        };

        let probe = StoredProbe {
            next_offset,
            sniffed_compressed,
            trial_len,
        };
        for entry in group {
            let kind = classify_entry(entry, &probe);
            tracing::debug!(
                "Entry {:016x} at offset {} shares storage with {} others: {:?}",
                entry.hash,
                offset,
                group.len() - 1,
                kind
            );
            junk.insert(entry.hash, kind);
        }
    }

    if !junk.is_empty() {
        let confirmed = junk
            .values()
            .filter(|k| **k == JunkKind::ConfirmedJunk)
            .count();
        tracing::info!(
            "🧹 Junk resolution: {} confirmed, {} ambiguous",
            confirmed,
            junk.len() - confirmed
        );
    }
    Ok(junk)
}
