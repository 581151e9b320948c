/// Decoy detection
///
/// A decoy is a deliberately mangled duplicate of a real path. Stripping characters the engine
/// would never accept in a path from a found name yields the decoy's name; if that name hits
/// an entry, it is reported separately instead of as a found file.
use std::collections::BTreeSet;

use crate::archive::{Archive, EntryKind};

use super::junk::JunkMap;

/// Characters removed in addition to control and non-ASCII characters
pub const STRIPPED_CHARS: &[char] = &['"', '<', '>', '|', ':', '*', '?'];

/// Remove control characters, every non-ASCII character and `"<>|:*?`.
///
/// Accented characters in legitimate paths are stripped too; archives are built against
/// this exact rule.
pub fn sanitize_path(path: &str) -> String {
    path.chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control() && !STRIPPED_CHARS.contains(c))
        .collect()
}

/// Sanitized forms of `found` paths that name a junk-classified entry or an existing file
pub fn detect_decoys<A: Archive>(
    archive: &A,
    found: &BTreeSet<String>,
    junk: &JunkMap,
) -> BTreeSet<String> {
    let mut decoys = BTreeSet::new();
    for path in found {
        let sanitized = sanitize_path(path);
        if sanitized == *path || sanitized.is_empty() {
            continue;
        }
        let hits_junk = junk.contains_key(&archive.hash_path(&sanitized));
        if hits_junk || archive.entry_kind(&sanitized) == EntryKind::File {
            tracing::debug!("Decoy {:?} shadows {:?}", sanitized, path);
            decoys.insert(sanitized);
        }
    }
    decoys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_reserved_characters() {
        assert_eq!(sanitize_path("/def/ci<t>y.sii"), "/def/city.sii");
        assert_eq!(sanitize_path("/def/a\u{1}b|c?.sii"), "/def/abc.sii");
        assert_eq!(sanitize_path("/def/plain.sii"), "/def/plain.sii");
    }

    #[test]
    fn test_sanitize_strips_accented_characters() {
        assert_eq!(sanitize_path("/def/city/zürich.sii"), "/def/city/zrich.sii");
    }
}
