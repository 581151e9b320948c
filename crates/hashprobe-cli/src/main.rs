use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hashprobe_core::archive::join_path;
use hashprobe_core::recovery::{extension_of, infer_file_type, resolve_junk};
use hashprobe_core::{
	path_source, Archive, DeepExtractor, DirectoryTree, DiscoveryConfig, DiscoveryOutcome,
	DiscoveryProgress, ExecutionMode, HashFsArchive, JunkKind, PathSource, ScanMode,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hashprobe", version, about = "Recover the file namespace of hash-indexed game archives")]
struct Cli {
	/// Log at debug level unless RUST_LOG says otherwise
	#[arg(long, short, global = true)]
	verbose: bool,
	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Discover the paths stored in an archive
	Scan {
		/// Path to a HashFS archive
		archive: PathBuf,
		/// Only trust the archive's directory listings
		#[arg(long)]
		listing: bool,
		/// Keep only paths starting with one of these prefixes
		#[arg(long, num_args = 1..)]
		filter: Vec<String>,
		/// File with extra seed paths, one per line
		#[arg(long)]
		seeds: Option<PathBuf>,
		/// Run discovery on the calling thread
		#[arg(long, conflicts_with = "threads")]
		single_thread: bool,
		/// Worker threads (default: one per CPU)
		#[arg(long)]
		threads: Option<usize>,
		/// Concurrent reader handles; 0 serializes extraction
		#[arg(long)]
		pool: Option<usize>,
		/// Print a JSON summary instead of the path list
		#[arg(long)]
		json: bool,
	},
	/// Print the recovered directory tree
	Tree {
		archive: PathBuf,
		#[arg(long)]
		listing: bool,
	},
	/// Classify entries that share a storage offset
	Junk {
		archive: PathBuf,
	},
	/// Detect the content type of a file on disk
	Detect {
		file: PathBuf,
	},
}

#[derive(Serialize)]
struct ScanSummary<'a> {
	archive: String,
	mode: ScanMode,
	found: Vec<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	outcome: Option<&'a DiscoveryOutcome>,
}

fn init_tracing(verbose: bool) {
	let default = if verbose { "debug" } else { "info" };
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.init();
}

fn open_archive(path: &Path) -> Result<Arc<HashFsArchive>> {
	let archive = HashFsArchive::open(path)
		.with_context(|| format!("Failed to open archive {}", path.display()))?;
	Ok(Arc::new(archive))
}

fn read_seed_file(path: &Path) -> Result<Vec<String>> {
	let text = std::fs::read_to_string(path)
		.with_context(|| format!("Failed to read seed file {}", path.display()))?;
	let seeds: Vec<String> = text
		.lines()
		.map(str::trim)
		.filter(|line| !line.is_empty() && !line.starts_with('#'))
		.map(String::from)
		.collect();
	tracing::info!("🌱 Loaded {} extra seeds from {}", seeds.len(), path.display());
	Ok(seeds)
}

fn progress_spinner() -> ProgressBar {
	let spinner = ProgressBar::new_spinner();
	spinner.set_style(
		ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
			.unwrap_or_else(|_| ProgressStyle::default_spinner()),
	);
	spinner.enable_steady_tick(Duration::from_millis(120));
	spinner
}

fn report_progress(spinner: &ProgressBar, progress: DiscoveryProgress) {
	let round = if progress.round > 0 {
		format!(" round {}", progress.round)
	} else {
		String::new()
	};
	spinner.set_message(format!(
		"{:?}{}: {} ({} found)",
		progress.stage, round, progress.current_operation, progress.files_found
	));
}

fn print_tree(tree: &DirectoryTree, dir: &str, depth: usize) {
	let Some(node) = tree.node(dir) else {
		return;
	};
	let indent = "  ".repeat(depth);
	for name in &node.subdirs {
		println!("{}📁 {}/", indent, name);
		print_tree(tree, &join_path(dir, name), depth + 1);
	}
	for file in &node.files {
		println!("{}📄 {}", indent, file);
	}
}

fn scan_config(
	seeds: Option<&Path>,
	single_thread: bool,
	threads: Option<usize>,
	pool: Option<usize>,
) -> Result<DiscoveryConfig> {
	let execution = if single_thread {
		ExecutionMode::Sequential
	} else {
		ExecutionMode::Parallel { threads }
	};
	let mut config = DiscoveryConfig::default().with_execution(execution);
	if let Some(size) = pool {
		config = config.with_reader_pool_size((size > 0).then_some(size));
	}
	if let Some(path) = seeds {
		config = config.with_extra_seeds(read_seed_file(path)?);
	}
	Ok(config)
}

fn print_outcome_summary(outcome: &DiscoveryOutcome) {
	println!("📈 Files Found: {}", outcome.found_files.len());
	println!("🎭 Decoys: {}", outcome.decoy_files.len());
	println!(
		"🧹 Junk Entries: {} confirmed, {} ambiguous",
		outcome.junk_count(JunkKind::ConfirmedJunk),
		outcome.junk_count(JunkKind::MaybeJunk)
	);
	println!("🔗 Unresolved References: {}", outcome.unresolved_references().len());
	println!(
		"⏱️  Decompression {} ms, parsing {} ms over {} files",
		outcome.metrics.decompress_ms, outcome.metrics.parse_ms, outcome.metrics.files_parsed
	);
	if outcome.root_listing_empty {
		println!("⚠️  Root directory listing is missing or empty");
	}
}

fn main() -> Result<()> {
	let cli = Cli::parse();
	init_tracing(cli.verbose);

	match cli.command {
		Commands::Scan { archive: path, listing, filter, seeds, single_thread, threads, pool, json } => {
			let archive = open_archive(&path)?;
			let mode = if listing { ScanMode::Listing } else { ScanMode::Deep };
			let config = scan_config(seeds.as_deref(), single_thread, threads, pool)?;

			let source: Box<dyn PathSource> = match mode {
				ScanMode::Listing => {
					let mut source = path_source(mode, archive, config);
					source
						.discover()
						.with_context(|| format!("Listing scan of {} failed", path.display()))?;
					source
				}
				ScanMode::Deep => {
					let spinner = progress_spinner();
					let mut extractor = DeepExtractor::new(archive, config);
					let sink = spinner.clone();
					extractor.set_progress_callback(move |progress| report_progress(&sink, progress));
					let result = extractor.discover();
					spinner.finish_and_clear();
					result.with_context(|| format!("Deep scan of {} failed", path.display()))?;
					Box::new(extractor)
				}
			};

			let found = source.filtered_paths(&filter);
			if json {
				let summary = ScanSummary {
					archive: path.display().to_string(),
					mode,
					found,
					outcome: source.outcome(),
				};
				println!("{}", serde_json::to_string_pretty(&summary)?);
				return Ok(());
			}

			for file in &found {
				println!("{}", file);
			}
			println!();
			println!("✅ {} scan completed: {} paths", mode, found.len());
			if let Some(outcome) = source.outcome() {
				print_outcome_summary(outcome);
			}
		}
		Commands::Tree { archive: path, listing } => {
			let archive = open_archive(&path)?;
			let mode = if listing { ScanMode::Listing } else { ScanMode::Deep };
			let mut source = path_source(mode, archive, DiscoveryConfig::default());
			source
				.discover()
				.with_context(|| format!("{} scan of {} failed", mode, path.display()))?;

			let tree = source.directory_tree();
			println!("📁 /");
			print_tree(&tree, "/", 1);
			println!();
			println!("{} directories, {} files", tree.directory_count(), tree.file_count());
		}
		Commands::Junk { archive: path } => {
			let archive = open_archive(&path)?;
			let mut reader = archive.open_reader().context("Failed to open archive reader")?;
			let junk = resolve_junk(&*archive, &mut reader).context("Junk resolution failed")?;

			let mut entries: Vec<_> = junk.into_iter().collect();
			entries.sort_by_key(|(hash, _)| *hash);
			for (hash, kind) in &entries {
				println!("{:016x}  {:?}", hash, kind);
			}
			let confirmed = entries.iter().filter(|(_, k)| *k == JunkKind::ConfirmedJunk).count();
			println!();
			println!("🧹 {} shared-offset entries: {} confirmed junk, {} ambiguous", entries.len(), confirmed, entries.len() - confirmed);
		}
		Commands::Detect { file } => {
			println!("🔍 Detecting content type for: {}", file.display());
			let data = std::fs::read(&file)
				.with_context(|| format!("Failed to read {}", file.display()))?;
			let extension = extension_of(&file.to_string_lossy());
			let file_type = infer_file_type(&data, extension.as_deref());
			println!("✅ Detected: {}", file_type);
		}
	}
	Ok(())
}
