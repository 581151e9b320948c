use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

pub mod archive;
pub mod extractor;
pub mod formats;
pub mod hash;
pub mod recovery;
pub mod tree;

pub use archive::{Archive, ArchiveError, ArchiveReader, Entry, HashFsArchive};
pub use extractor::{path_source, DeepExtractor, ListingExtractor, PathSource};
pub use formats::{BuiltinParsers, ContentParsers, ParseError};
pub use recovery::{
    DiscoveryConfig, DiscoveryProgress, DiscoveryStage, ExecutionMode, FileType, JunkKind,
    MetricsReport, PathFinder, RecoveryError,
};
pub use tree::DirectoryTree;

/// How paths are enumerated
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ScanMode {
    /// Trust the archive's directory listings
    Listing,
    /// Follow references between files and sweep unreached entries
    Deep,
}

impl std::fmt::Display for ScanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanMode::Listing => write!(f, "listing"),
            ScanMode::Deep => write!(f, "deep"),
        }
    }
}

/// Everything a discovery run established about an archive
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryOutcome {
    pub found_files: BTreeSet<String>,
    pub decoy_files: BTreeSet<String>,
    /// Every path mentioned in parsed content, whether or not it exists
    pub referenced_files: BTreeSet<String>,
    /// Entry hash to classification, promoted entries excluded
    pub junk: BTreeMap<u64, JunkKind>,
    pub visited_count: usize,
    pub metrics: MetricsReport,
    pub root_listing_empty: bool,
    pub started_at: DateTime<Utc>,
}

impl DiscoveryOutcome {
    /// Found files under any of `prefixes`; all of them when `prefixes` is empty
    pub fn filter_by_prefixes<S: AsRef<str>>(&self, prefixes: &[S]) -> Vec<String> {
        self.found_files
            .iter()
            .filter(|path| {
                prefixes.is_empty() || prefixes.iter().any(|p| path.starts_with(p.as_ref()))
            })
            .cloned()
            .collect()
    }

    pub fn directory_tree(&self) -> DirectoryTree {
        DirectoryTree::from_paths(&self.found_files)
    }

    pub fn junk_count(&self, kind: JunkKind) -> usize {
        self.junk.values().filter(|k| **k == kind).count()
    }

    /// Referenced paths that were never confirmed
    pub fn unresolved_references(&self) -> Vec<&String> {
        self.referenced_files
            .iter()
            .filter(|p| !self.found_files.contains(*p) && !self.decoy_files.contains(*p))
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Open a HashFS archive and run deep discovery over it
pub fn scan_archive(archive_path: &Path, config: DiscoveryConfig) -> Result<DiscoveryOutcome> {
    let archive = HashFsArchive::open(archive_path)
        .with_context(|| format!("Failed to open archive {}", archive_path.display()))?;

    let mut finder = PathFinder::new(Arc::new(archive), config);
    finder.set_progress_callback(|progress| {
        tracing::debug!(
            "{:?}: {} ({} found)",
            progress.stage,
            progress.current_operation,
            progress.files_found
        );
    });

    let outcome = finder.discover()?;
    tracing::info!(
        "✅ Scan of {} finished: {} files",
        archive_path.display(),
        outcome.found_files.len()
    );
    Ok(outcome)
}
