//! Path discovery and archive integrity resolution
pub mod candidates;
pub mod decoy;
pub mod engine;
pub mod executor;
pub mod junk;
pub mod metrics;
pub mod references;
pub mod seeds;
pub mod signatures;

pub use candidates::{extension_of, is_path_like, normalize_path, parent_dir, PathCandidates};

pub use decoy::{detect_decoys, sanitize_path};

pub use engine::{
    automat_path, DiscoveryConfig, DiscoveryProgress, DiscoveryStage, PathFinder, RecoveryError,
};

pub use executor::{ExecutionMode, Executor};

pub use junk::{resolve_junk, JunkKind, JunkMap};

pub use metrics::{Metrics, MetricsReport};

pub use references::{blob_scan, extract_references, ExtractContext};

pub use signatures::{infer_file_type, sniff_file_type, FileSignature, FileType};
