//! Path sources
//!
//! A [`PathSource`] answers "which paths does this archive contain". The listing source
//! trusts directory listings; the deep source runs the discovery engine.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::archive::{walk_directory, Archive, ArchiveReader, EntryKind};
use crate::recovery::{DiscoveryConfig, DiscoveryProgress, PathFinder, RecoveryError};
use crate::tree::DirectoryTree;
use crate::{DiscoveryOutcome, ScanMode};

pub trait PathSource {
    /// Enumerate paths. Later calls reuse the first result.
    fn discover(&mut self) -> Result<(), RecoveryError>;

    /// Paths found by the last `discover`, sorted
    fn found_paths(&self) -> Vec<String>;

    /// The full discovery outcome, when the source produces one
    fn outcome(&self) -> Option<&DiscoveryOutcome> {
        None
    }

    /// Found paths under any of `prefixes`; all of them when `prefixes` is empty
    fn filtered_paths(&self, prefixes: &[String]) -> Vec<String> {
        self.found_paths()
            .into_iter()
            .filter(|path| prefixes.is_empty() || prefixes.iter().any(|p| path.starts_with(p)))
            .collect()
    }

    fn directory_tree(&self) -> DirectoryTree {
        DirectoryTree::from_paths(self.found_paths())
    }
}

/// Enumerates files through the archive's own directory listings
pub struct ListingExtractor<A: Archive> {
    archive: Arc<A>,
    found: Option<BTreeSet<String>>,
}

impl<A: Archive> ListingExtractor<A> {
    pub fn new(archive: Arc<A>) -> Self {
        Self {
            archive,
            found: None,
        }
    }
}

impl<A: Archive> PathSource for ListingExtractor<A> {
    fn discover(&mut self) -> Result<(), RecoveryError> {
        if self.found.is_some() {
            return Ok(());
        }
        let archive = self.archive.as_ref();
        let mut reader = archive.open_reader()?;

        let root_is_listed = match archive.entry_by_path("/") {
            Some(entry) if entry.is_directory => match reader.list_directory(entry) {
                Ok(listing) => !listing.is_empty(),
                Err(e) if e.is_entry_specific() => {
                    tracing::warn!("Root directory listing is unreadable: {}", e);
                    false
                }
                Err(e) => return Err(e.into()),
            },
            _ => false,
        };
        if !root_is_listed {
            return Err(RecoveryError::EmptyRootListing);
        }

        let traversal = walk_directory(archive, &mut reader, "/", |_| false)?;
        if !traversal.missing.is_empty() {
            tracing::warn!(
                "{} listed names have no entry in the archive",
                traversal.missing.len()
            );
        }
        if !traversal.unreadable.is_empty() {
            tracing::warn!(
                "{} directory listings could not be decoded",
                traversal.unreadable.len()
            );
        }
        let found: BTreeSet<String> = traversal
            .files
            .into_iter()
            .filter(|path| archive.entry_kind(path) == EntryKind::File)
            .collect();
        tracing::info!(
            "📂 Listing scan: {} files in {} directories",
            found.len(),
            traversal.directories.len()
        );
        self.found = Some(found);
        Ok(())
    }

    fn found_paths(&self) -> Vec<String> {
        self.found
            .as_ref()
            .map(|found| found.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Runs the reference-following discovery engine
pub struct DeepExtractor<A: Archive> {
    finder: PathFinder<A>,
    outcome: Option<DiscoveryOutcome>,
}

impl<A: Archive + 'static> DeepExtractor<A> {
    pub fn new(archive: Arc<A>, config: DiscoveryConfig) -> Self {
        Self {
            finder: PathFinder::new(archive, config),
            outcome: None,
        }
    }

    pub fn set_progress_callback<F>(&mut self, callback: F)
    where
        F: Fn(DiscoveryProgress) + Send + Sync + 'static,
    {
        self.finder.set_progress_callback(callback);
    }

    pub fn finder(&self) -> &PathFinder<A> {
        &self.finder
    }

    pub fn into_outcome(self) -> Option<DiscoveryOutcome> {
        self.outcome
    }
}

impl<A: Archive + 'static> PathSource for DeepExtractor<A> {
    fn discover(&mut self) -> Result<(), RecoveryError> {
        if self.outcome.is_none() {
            self.outcome = Some(self.finder.discover()?);
        }
        Ok(())
    }

    fn found_paths(&self) -> Vec<String> {
        self.outcome
            .as_ref()
            .map(|o| o.found_files.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn outcome(&self) -> Option<&DiscoveryOutcome> {
        self.outcome.as_ref()
    }
}

/// Path source for a scan mode
pub fn path_source<A: Archive + 'static>(
    mode: ScanMode,
    archive: Arc<A>,
    config: DiscoveryConfig,
) -> Box<dyn PathSource> {
    match mode {
        ScanMode::Listing => Box::new(ListingExtractor::new(archive)),
        ScanMode::Deep => Box::new(DeepExtractor::new(archive, config)),
    }
}
