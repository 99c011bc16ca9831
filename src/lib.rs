//! mediatidy - a naming-convention engine for media library trees
//!
//! This library scans a directory subtree into an in-memory node arena,
//! classifies every directory and file name against an ordered set of naming
//! grammars, enriches unparsed directories from `.nfo` sidecar metadata, and
//! applies bottom-up renames toward the canonical form. Two further appliers
//! propagate names onto a structurally parallel mirror tree and rewrite path
//! references inside M3U playlists.

pub mod classifier;
pub mod cli;
pub mod config;
pub mod groups;
pub mod metadata;
pub mod mirror;
pub mod output;
pub mod playlist;
pub mod progress;
pub mod renamer;
pub mod report;
pub mod scanner;
pub mod tree;
pub mod validator;

pub use classifier::{Classification, Classifier, MatchInfo};
pub use config::{ConfigError, ScanConfig, ScanFilter};
pub use metadata::{MetadataCache, MetadataEntry};
pub use progress::{CancelToken, Progress};
pub use renamer::{PlannedRename, RenamePlan, Renamer};
pub use report::{Outcome, ReportEntry, RunReport};
pub use scanner::{ScanError, ScanOutcome, Scanner};
pub use tree::{ComplianceState, NodeId, NodeKind, Tree, TreeNode};
pub use validator::{ValidationSummary, Validator};

pub use cli::{run_cli, run_cli_cancellable, Command};
