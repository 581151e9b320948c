//! Path discovery engine
use chrono::Utc;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::archive::{
    walk_directory, Archive, ArchiveError, ArchiveReader, Entry, EntryKind, ExtractionGate,
    ReaderPool, Traversal,
};
use crate::formats::{BuiltinParsers, ContentParsers};
use crate::hash::{city_hash64, hex_digest};
use crate::DiscoveryOutcome;

use super::candidates::{extension_of, is_path_like, normalize_path, parent_dir, PathCandidates};
use super::decoy::detect_decoys;
use super::executor::{ExecutionMode, Executor};
use super::junk::{resolve_junk, JunkKind, JunkMap};
use super::metrics::Metrics;
use super::references::{extract_references, ExtractContext};
use super::seeds::builtin_seeds;
use super::signatures::{infer_file_type, FileType};

/// Top-level directories whose materials reference textures by relative path
pub const RELATIVE_TEXTURE_ROOTS: &[&str] = &[
    "/material/",
    "/model/",
    "/model2/",
    "/vehicle/",
    "/prefab/",
    "/prefab2/",
    "/unit/",
];

/// Discovery configuration
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub execution: ExecutionMode,
    /// Concurrent reader handles; `None` serializes every extraction behind one reader
    pub reader_pool_size: Option<usize>,
    /// Extra candidate paths added to the built-in seeds
    pub extra_seeds: Vec<String>,
    /// Extract entries never reached by path and follow what they reference
    pub unvisited_sweep: bool,
    pub decoy_detection: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            execution: ExecutionMode::default(),
            reader_pool_size: Some(num_cpus::get()),
            extra_seeds: Vec::new(),
            unvisited_sweep: true,
            decoy_detection: true,
        }
    }
}

impl DiscoveryConfig {
    pub fn with_execution(mut self, execution: ExecutionMode) -> Self {
        self.execution = execution;
        self
    }

    pub fn with_reader_pool_size(mut self, size: Option<usize>) -> Self {
        self.reader_pool_size = size;
        self
    }

    pub fn with_extra_seeds<I, S>(mut self, seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_seeds.extend(seeds.into_iter().map(Into::into));
        self
    }

    pub fn with_unvisited_sweep(mut self, enabled: bool) -> Self {
        self.unvisited_sweep = enabled;
        self
    }

    pub fn with_decoy_detection(mut self, enabled: bool) -> Self {
        self.decoy_detection = enabled;
        self
    }
}

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("failed to decode built-in seed list: {0}")]
    Seeds(#[source] std::io::Error),

    #[error("root directory listing is missing or empty; run a deep scan instead")]
    EmptyRootListing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryStage {
    Initialization,
    JunkResolution,
    SeededClosure,
    UnvisitedSweep,
    SweepClosure,
    DecoyDetection,
    Complete,
}

#[derive(Debug, Clone)]
pub struct DiscoveryProgress {
    pub stage: DiscoveryStage,
    /// Round within the current closure; 0 outside closures
    pub round: usize,
    pub pending: usize,
    pub files_found: usize,
    pub current_operation: String,
}

/// Canonical sets, written only by the engine thread
#[derive(Debug, Default)]
struct DiscoveryState {
    visited: HashSet<String>,
    found: BTreeSet<String>,
    decoys: BTreeSet<String>,
    referenced: BTreeSet<String>,
    junk: JunkMap,
    promoted: HashSet<u64>,
    relative_dirs: BTreeSet<String>,
}

impl DiscoveryState {
    fn record_references(&mut self, references: Vec<String>, next: &mut PathCandidates) {
        for reference in references {
            if is_path_like(&reference) {
                self.referenced.insert(normalize_path(&reference));
            }
            next.add(&reference, &self.visited);
        }
    }

    /// Junk classifications with promoted hashes removed
    fn effective_junk(&self) -> JunkMap {
        self.junk
            .iter()
            .filter(|(hash, _)| !self.promoted.contains(hash))
            .map(|(hash, kind)| (*hash, *kind))
            .collect()
    }
}

/// Result of resolving one candidate path
#[derive(Debug)]
enum PathOutcome {
    Missing,
    Directory(Traversal),
    File {
        path: String,
        hash: u64,
        promoted: bool,
        references: Vec<String>,
    },
    /// Classified as confirmed junk before this round
    Junk,
    /// Payload could not be read back; the entry is junk from now on
    Corrupt { hash: u64 },
    Skipped,
}

/// Result of extracting one never-touched entry
#[derive(Debug)]
enum SweepOutcome {
    Parsed {
        references: Vec<String>,
        synthesized: Option<String>,
    },
    Corrupt { hash: u64 },
    Skipped,
}

/// Canonical content-addressed path the build pipeline gives a generated material
pub fn automat_path(content: &[u8]) -> String {
    let hex = hex_digest(city_hash64(content));
    format!("/automat/{}/{}.mat", &hex[..2], hex)
}

/// Borrowed collaborators shared by every worker of a run
struct Workbench<'a, A: Archive> {
    archive: &'a A,
    gate: &'a ExtractionGate<A::Reader>,
    executor: &'a Executor,
    metrics: &'a Metrics,
    parsers: &'a dyn ContentParsers,
    file_exists: &'a (dyn Fn(&str) -> bool + Sync),
}

impl<'a, A: Archive> Workbench<'a, A> {
    fn extract_context<'s>(&'s self, state: &'s DiscoveryState) -> ExtractContext<'s> {
        ExtractContext {
            parsers: self.parsers,
            relative_dirs: &state.relative_dirs,
            file_exists: self.file_exists,
            metrics: Some(self.metrics),
        }
    }

    fn extract(&self, entry: &Entry) -> Result<Vec<u8>, ArchiveError> {
        let (data, started, ended) = self
            .gate
            .with_reader(|reader| {
                let started = Instant::now();
                let data = reader.extract(entry)?;
                Ok((data, started, Instant::now()))
            })
            .inspect_err(|e| {
                if e.is_entry_specific() {
                    self.metrics.record_decompress_failure();
                }
            })?;
        self.metrics
            .record_decompression(entry.hash, started, ended, data.len());
        Ok(data)
    }

    fn parse(
        &self,
        state: &DiscoveryState,
        file_type: FileType,
        data: &[u8],
        origin: Option<&str>,
    ) -> Vec<String> {
        let started = Instant::now();
        let references =
            extract_references(&self.extract_context(state), file_type, data, origin);
        self.metrics.record_parse(started.elapsed());
        references
    }

    fn resolve_path(&self, state: &DiscoveryState, path: &str) -> PathOutcome {
        let hash = self.archive.hash_path(path);
        let Some(entry) = self.archive.entries().get(hash) else {
            tracing::trace!("Candidate {} has no entry", path);
            return PathOutcome::Missing;
        };

        let promoted = match state.junk.get(&hash) {
            Some(JunkKind::ConfirmedJunk) => return PathOutcome::Junk,
            Some(JunkKind::MaybeJunk) => true,
            None => false,
        };

        if entry.is_directory {
            let is_junk = |e: &Entry| state.junk.get(&e.hash) == Some(&JunkKind::ConfirmedJunk);
            return match self
                .gate
                .with_reader(|reader| walk_directory(self.archive, reader, path, is_junk))
            {
                Ok(traversal) => PathOutcome::Directory(traversal),
                Err(e) => {
                    tracing::warn!("Skipping directory {}: {}", path, e);
                    PathOutcome::Skipped
                }
            };
        }

        let extension = extension_of(path);
        let hinted = extension.as_deref().and_then(FileType::from_extension);
        let found = |references: Vec<String>| PathOutcome::File {
            path: path.to_string(),
            hash,
            promoted,
            references,
        };
        if entry.is_auxiliary || hinted.is_some_and(FileType::is_ignorable) {
            return found(Vec::new());
        }

        let data = match self.extract(entry) {
            Ok(data) => data,
            Err(e @ (ArchiveError::Decompression { .. } | ArchiveError::OutOfBounds { .. })) => {
                tracing::warn!("Entry for {} is unreadable, marking as junk: {}", path, e);
                return PathOutcome::Corrupt { hash };
            }
            Err(e) => {
                tracing::warn!("Failed to extract {}: {}", path, e);
                return found(Vec::new());
            }
        };

        let file_type = infer_file_type(&data, extension.as_deref());
        if file_type.is_ignorable() {
            return found(Vec::new());
        }
        found(self.parse(state, file_type, &data, Some(path)))
    }

    fn sweep_entry(&self, state: &DiscoveryState, entry: &Entry) -> SweepOutcome {
        let data = match self.extract(entry) {
            Ok(data) => data,
            Err(e @ (ArchiveError::Decompression { .. } | ArchiveError::OutOfBounds { .. })) => {
                tracing::debug!("Unvisited entry {:016x} is unreadable: {}", entry.hash, e);
                return SweepOutcome::Corrupt { hash: entry.hash };
            }
            Err(e) => {
                tracing::warn!("Failed to extract entry {:016x}: {}", entry.hash, e);
                return SweepOutcome::Skipped;
            }
        };

        let file_type = infer_file_type(&data, None);
        if file_type.is_ignorable() {
            return SweepOutcome::Skipped;
        }
        let references = self.parse(state, file_type, &data, None);
        let synthesized = (file_type == FileType::Mat).then(|| automat_path(&data));
        SweepOutcome::Parsed {
            references,
            synthesized,
        }
    }
}

/// Reconstructs an archive's namespace by following references between files
pub struct PathFinder<A: Archive> {
    archive: Arc<A>,
    parsers: Arc<dyn ContentParsers>,
    config: DiscoveryConfig,
    progress_callback: Option<Box<dyn Fn(DiscoveryProgress) + Send + Sync>>,
}

impl<A: Archive + 'static> PathFinder<A> {
    pub fn new(archive: Arc<A>, config: DiscoveryConfig) -> Self {
        Self {
            archive,
            parsers: Arc::new(BuiltinParsers),
            config,
            progress_callback: None,
        }
    }

    /// Replace the built-in content parsers
    pub fn with_parsers(mut self, parsers: Arc<dyn ContentParsers>) -> Self {
        self.parsers = parsers;
        self
    }

    pub fn set_progress_callback<F>(&mut self, callback: F)
    where
        F: Fn(DiscoveryProgress) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
    }

    pub fn archive(&self) -> &A {
        &self.archive
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    fn emit_progress(&self, progress: DiscoveryProgress) {
        if let Some(ref callback) = self.progress_callback {
            callback(progress);
        }
    }

    fn emit_stage(&self, stage: DiscoveryStage, files_found: usize, operation: &str) {
        self.emit_progress(DiscoveryProgress {
            stage,
            round: 0,
            pending: 0,
            files_found,
            current_operation: operation.to_string(),
        });
    }

    fn build_gate(&self) -> Result<ExtractionGate<A::Reader>, ArchiveError> {
        match self.config.reader_pool_size {
            Some(size) if size > 0 => {
                let archive = Arc::clone(&self.archive);
                Ok(ExtractionGate::Pooled(ReaderPool::new(size, move || {
                    archive.open_reader()
                })))
            }
            _ => Ok(ExtractionGate::Serialized(std::sync::Mutex::new(
                self.archive.open_reader()?,
            ))),
        }
    }

    /// Whether the root directory entry is absent or lists nothing
    pub fn root_listing_empty(&self) -> Result<bool, ArchiveError> {
        let gate = self.build_gate()?;
        Ok(self.probe_root_listing(&gate))
    }

    fn probe_root_listing(&self, gate: &ExtractionGate<A::Reader>) -> bool {
        match self.archive.entry_by_path("/") {
            Some(entry) if entry.is_directory => {
                match gate.with_reader(|reader| reader.list_directory(entry)) {
                    Ok(listing) => listing.is_empty(),
                    Err(e) => {
                        tracing::warn!("Root directory listing is unreadable: {}", e);
                        true
                    }
                }
            }
            _ => true,
        }
    }

    /// Run the full discovery pipeline
    pub fn discover(&self) -> Result<DiscoveryOutcome, RecoveryError> {
        let started_at = Utc::now();
        self.emit_stage(DiscoveryStage::Initialization, 0, "Preparing discovery...");

        let executor = Executor::new(self.config.execution)?;
        let gate = self.build_gate()?;
        let metrics = Metrics::new();
        let archive: &A = &self.archive;
        let file_exists = |path: &str| archive.entry_kind(path) == EntryKind::File;
        let bench = Workbench {
            archive,
            gate: &gate,
            executor: &executor,
            metrics: &metrics,
            parsers: self.parsers.as_ref(),
            file_exists: &file_exists,
        };

        tracing::info!(
            "🔍 Starting discovery over {} entries ({} workers, {:?})",
            archive.entries().len(),
            executor.threads(),
            gate
        );

        let root_listing_empty = self.probe_root_listing(&gate);
        if root_listing_empty {
            tracing::warn!("Root directory listing is missing or empty");
        }

        self.emit_stage(DiscoveryStage::JunkResolution, 0, "Resolving shared offsets...");
        let junk = gate.with_reader(|reader| resolve_junk(archive, reader))?;
        let mut state = DiscoveryState {
            junk,
            ..DiscoveryState::default()
        };

        // Phase A
        let mut seeds = builtin_seeds().map_err(RecoveryError::Seeds)?;
        seeds.extend(self.config.extra_seeds.iter().cloned());
        let mut candidates = PathCandidates::new();
        for seed in &seeds {
            candidates.add(seed, &state.visited);
        }
        tracing::info!("🌱 Seeded closure from {} paths", seeds.len());
        self.run_closure(&bench, &mut state, candidates, DiscoveryStage::SeededClosure);

        // Phase B
        if self.config.unvisited_sweep {
            let candidates = self.sweep_unvisited(&bench, &mut state);
            self.run_closure(&bench, &mut state, candidates, DiscoveryStage::SweepClosure);
        }

        let junk = state.effective_junk();

        // Phase C
        if self.config.decoy_detection {
            self.emit_stage(
                DiscoveryStage::DecoyDetection,
                state.found.len(),
                "Checking for decoy files...",
            );
            for decoy in detect_decoys(archive, &state.found, &junk) {
                state.found.remove(&decoy);
                state.visited.insert(decoy.clone());
                state.decoys.insert(decoy);
            }
        }

        let metrics = metrics.report();
        tracing::info!(
            "🎯 Discovery complete: {} files found, {} decoys, {} junk entries, {} referenced",
            state.found.len(),
            state.decoys.len(),
            junk.len(),
            state.referenced.len()
        );
        tracing::debug!("Metrics: {:?}", metrics);
        self.emit_stage(DiscoveryStage::Complete, state.found.len(), "Discovery complete");

        Ok(DiscoveryOutcome {
            found_files: state.found,
            decoy_files: state.decoys,
            referenced_files: state.referenced,
            junk: junk.into_iter().collect(),
            visited_count: state.visited.len(),
            metrics,
            root_listing_empty,
            started_at,
        })
    }

    /// Resolve candidates round by round until no unvisited candidate remains
    fn run_closure(
        &self,
        bench: &Workbench<'_, A>,
        state: &mut DiscoveryState,
        mut candidates: PathCandidates,
        stage: DiscoveryStage,
    ) {
        let mut round = 0;
        loop {
            let batch = candidates.drain_unvisited(&state.visited);
            if batch.is_empty() {
                break;
            }
            round += 1;
            for path in &batch {
                state.visited.insert(path.clone());
            }
            tracing::debug!("{:?} round {}: {} candidates", stage, round, batch.len());
            self.emit_progress(DiscoveryProgress {
                stage,
                round,
                pending: batch.len(),
                files_found: state.found.len(),
                current_operation: format!("Resolving {} candidates", batch.len()),
            });

            let outcomes = {
                let snapshot: &DiscoveryState = state;
                bench
                    .executor
                    .map(&batch, |path| bench.resolve_path(snapshot, path))
            };

            let mut next = PathCandidates::new();
            for outcome in outcomes {
                match outcome {
                    PathOutcome::Directory(traversal) => {
                        state.visited.extend(traversal.directories);
                        state.visited.extend(traversal.excluded);
                        for hash in traversal.unreadable {
                            state.junk.insert(hash, JunkKind::ConfirmedJunk);
                        }
                        for file in &traversal.files {
                            next.add(file, &state.visited);
                        }
                        for missing in &traversal.missing {
                            tracing::trace!("Listed name without entry: {}", missing);
                        }
                    }
                    PathOutcome::File {
                        path,
                        hash,
                        promoted,
                        references,
                    } => {
                        if promoted {
                            state.promoted.insert(hash);
                        }
                        if RELATIVE_TEXTURE_ROOTS.iter().any(|root| path.starts_with(root)) {
                            state.relative_dirs.insert(parent_dir(&path).to_string());
                        }
                        state.found.insert(path);
                        state.record_references(references, &mut next);
                    }
                    PathOutcome::Corrupt { hash } => {
                        state.junk.insert(hash, JunkKind::ConfirmedJunk);
                    }
                    PathOutcome::Missing | PathOutcome::Junk | PathOutcome::Skipped => {}
                }
            }
            candidates.extend_from(next, &state.visited);
        }
        tracing::info!(
            "{:?} reached fixpoint after {} rounds: {} files found",
            stage,
            round,
            state.found.len()
        );
    }

    /// Extract every entry never touched by path and collect what it references
    fn sweep_unvisited(
        &self,
        bench: &Workbench<'_, A>,
        state: &mut DiscoveryState,
    ) -> PathCandidates {
        let touched: HashSet<u64> = state
            .visited
            .iter()
            .map(|path| bench.archive.hash_path(path))
            .collect();
        let mut pending: Vec<Entry> = bench
            .archive
            .entries()
            .iter()
            .filter(|e| {
                !e.is_directory
                    && !e.is_auxiliary
                    && !state.junk.contains_key(&e.hash)
                    && !touched.contains(&e.hash)
            })
            .copied()
            .collect();
        pending.sort_by_key(|e| e.hash);

        tracing::info!("🧭 Sweeping {} unvisited entries", pending.len());
        self.emit_progress(DiscoveryProgress {
            stage: DiscoveryStage::UnvisitedSweep,
            round: 0,
            pending: pending.len(),
            files_found: state.found.len(),
            current_operation: format!("Extracting {} unvisited entries", pending.len()),
        });

        let outcomes = {
            let snapshot: &DiscoveryState = state;
            bench
                .executor
                .map(&pending, |entry| bench.sweep_entry(snapshot, entry))
        };

        let mut candidates = PathCandidates::new();
        for outcome in outcomes {
            match outcome {
                SweepOutcome::Parsed {
                    references,
                    synthesized,
                } => {
                    state.record_references(references, &mut candidates);
                    if let Some(path) = synthesized {
                        candidates.add(&path, &state.visited);
                    }
                }
                SweepOutcome::Corrupt { hash } => {
                    state.junk.insert(hash, JunkKind::ConfirmedJunk);
                }
                SweepOutcome::Skipped => {}
            }
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_automat_path_shape() {
        let path = automat_path(b"material : \"eut2.dif\" {}");
        let hex = hex_digest(city_hash64(b"material : \"eut2.dif\" {}"));
        assert_eq!(path, format!("/automat/{}/{}.mat", &hex[..2], hex));
        assert_eq!(path.len(), "/automat/".len() + 2 + 1 + 16 + 4);
    }

    #[test]
    fn test_config_builders() {
        let config = DiscoveryConfig::default()
            .with_execution(ExecutionMode::Sequential)
            .with_reader_pool_size(None)
            .with_extra_seeds(["/custom/a.sii"])
            .with_unvisited_sweep(false)
            .with_decoy_detection(false);
        assert_eq!(config.execution, ExecutionMode::Sequential);
        assert_eq!(config.reader_pool_size, None);
        assert_eq!(config.extra_seeds, vec!["/custom/a.sii"]);
        assert!(!config.unvisited_sweep);
        assert!(!config.decoy_detection);

        let defaults = DiscoveryConfig::default();
        assert_eq!(defaults.reader_pool_size, Some(num_cpus::get()));
        assert!(defaults.unvisited_sweep && defaults.decoy_detection);
    }

    #[test]
    fn test_effective_junk_drops_promoted() {
        let mut state = DiscoveryState::default();
        state.junk.insert(1, JunkKind::MaybeJunk);
        state.junk.insert(2, JunkKind::ConfirmedJunk);
        state.promoted.insert(1);
        let junk = state.effective_junk();
        assert_eq!(junk.len(), 1);
        assert_eq!(junk.get(&2), Some(&JunkKind::ConfirmedJunk));
    }
}
