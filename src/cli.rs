//! Command-line orchestration.
//!
//! Each command runs the same pipeline skeleton — load config, scan,
//! validate — and then its own apply phase. All user-facing printing goes
//! through [`OutputFormatter`]; node-level failures are carried in the run
//! report, so a command only returns `Err` when the pipeline cannot start at
//! all (bad root, bad config).

use crate::config::ScanConfig;
use crate::groups::GroupSet;
use crate::metadata::MetadataCache;
use crate::mirror::{self, MirrorIndex};
use crate::output::OutputFormatter;
use crate::playlist;
use crate::progress::{CancelToken, Progress};
use crate::renamer::{RenamePlan, Renamer};
use crate::report::RunReport;
use crate::scanner::Scanner;
use crate::tree::{ComplianceState, Tree};
use crate::validator::{ValidationSummary, Validator};
use std::path::{Path, PathBuf};

/// A CLI command to execute against a library root.
#[derive(Debug, Clone)]
pub enum Command {
    /// Scan and validate; report, mutate nothing.
    Check,
    /// Rename flagged files and directories to their canonical forms.
    Rename { dry_run: bool },
    /// Tag unparsed directories from their `.nfo` sidecar metadata.
    Tag { dry_run: bool },
    /// Show directories grouped by shared external id.
    Groups,
    /// Propagate reference-tree directory names onto a mirror tree.
    Mirror { mirror_root: PathBuf },
    /// Rewrite playlist references against the current file layout.
    Playlists,
}

/// Runs a command with default configuration lookup and no report export.
pub fn run_cli(command: Command, root: &Path) -> Result<(), String> {
    run_cli_with_config(command, root, None, None)
}

/// Runs a command with a fresh, never-cancelled token.
pub fn run_cli_with_config(
    command: Command,
    root: &Path,
    config_path: Option<&Path>,
    report_path: Option<&Path>,
) -> Result<(), String> {
    run_cli_cancellable(command, root, config_path, report_path, &CancelToken::new())
}

/// Runs a command.
///
/// # Arguments
///
/// * `command` - The command to execute
/// * `root` - The library root to operate on
/// * `config_path` - Optional path to a configuration file
/// * `report_path` - Optional path to write the JSON run report to
/// * `cancel` - Shared cancellation flag, checked by every long pass
pub fn run_cli_cancellable(
    command: Command,
    root: &Path,
    config_path: Option<&Path>,
    report_path: Option<&Path>,
    cancel: &CancelToken,
) -> Result<(), String> {
    let config =
        ScanConfig::load(config_path).map_err(|e| format!("Error loading configuration: {}", e))?;
    let filter = config
        .compile()
        .map_err(|e| format!("Error compiling filters: {}", e))?;
    let scanner = Scanner::new(&filter);

    let mut report = RunReport::new();
    match command {
        Command::Check => {
            let (mut tree, _) = scan(&scanner, root, cancel)?;
            let summary = validate(&mut tree);
            OutputFormatter::validation_summary(&summary);
            list_flagged(&tree);
        }
        Command::Rename { dry_run } => {
            let (mut tree, _) = scan(&scanner, root, cancel)?;
            let summary = validate(&mut tree);
            OutputFormatter::validation_summary(&summary);
            let plan = Renamer::plan_bad_names(&tree);
            if dry_run {
                print_plan(&tree, &plan);
            } else {
                Renamer::apply(&mut tree, &plan, cancel, &mut report);
                OutputFormatter::report_summary(&report);
            }
        }
        Command::Tag { dry_run } => {
            let (mut tree, _) = scan(&scanner, root, cancel)?;
            validate(&mut tree);
            let plan = Renamer::plan_metadata_tags(&tree);
            if dry_run {
                print_plan(&tree, &plan);
            } else {
                Renamer::apply(&mut tree, &plan, cancel, &mut report);
                OutputFormatter::report_summary(&report);
            }
        }
        Command::Groups => {
            let (mut tree, _) = scan(&scanner, root, cancel)?;
            let cache = MetadataCache::new();
            let validator = Validator::new(&cache);
            validator.validate(&mut tree);
            let groups = GroupSet::build(&tree);
            groups.validate_members(&mut tree, &validator);
            print_groups(&tree, &groups);
        }
        Command::Mirror { mirror_root } => {
            let (mut reference, _) = scan(&scanner, root, cancel)?;
            validate(&mut reference);
            let (mirror_tree, _) = scan(&scanner, &mirror_root, cancel)?;
            let mut index = MirrorIndex::build(&mirror_tree);
            let summary = mirror::sync(&mut reference, &mut index, cancel, &mut report);
            OutputFormatter::plain(&format!(
                "In sync: {}  Renamed: {}  Missing: {}",
                summary.in_sync, summary.renamed, summary.missing
            ));
            OutputFormatter::report_summary(&report);
        }
        Command::Playlists => {
            let (tree, _) = scan(&scanner, root, cancel)?;
            let summary = playlist::rewrite_all(&tree, cancel, &mut report);
            OutputFormatter::plain(&format!(
                "Rewritten: {}  Unchanged: {}  Failed: {}",
                summary.rewritten, summary.unchanged, summary.failed
            ));
            OutputFormatter::report_summary(&report);
        }
    }

    if let Some(path) = report_path {
        report
            .save(path)
            .map_err(|e| format!("Error writing report: {}", e))?;
        OutputFormatter::info(&format!("Report written to {}", path.display()));
    }
    Ok(())
}

/// Scans a root with a live progress bar. Returns the tree and the number of
/// accepted files.
fn scan(scanner: &Scanner<'_>, root: &Path, cancel: &CancelToken) -> Result<(Tree, u64), String> {
    OutputFormatter::info(&format!("Scanning {}", root.display()));
    let total = scanner.count_entries(root);
    let bar = OutputFormatter::create_progress_bar(Some(total));
    let progress: Progress<'_> = &|current, _| bar.set_position(current);

    let outcome = scanner
        .scan(root, cancel, Some(progress), Some(total))
        .map_err(|e| format!("Error: {}", e))?;
    bar.finish_and_clear();

    if outcome.cancelled {
        OutputFormatter::warning("Scan was cancelled; results are partial.");
    }
    Ok((outcome.tree, outcome.files))
}

fn validate(tree: &mut Tree) -> ValidationSummary {
    let cache = MetadataCache::new();
    Validator::new(&cache).validate(tree)
}

fn list_flagged(tree: &Tree) {
    for id in tree.preorder() {
        let node = tree.node(id);
        match node.state {
            ComplianceState::BadName => {
                OutputFormatter::warning(&format!("needs rename: {}", node.rel_path));
            }
            ComplianceState::Ok if node.out_of_order => {
                OutputFormatter::plain(&format!("  out-of-order: {}", node.rel_path));
            }
            _ => {}
        }
    }
}

fn print_plan(tree: &Tree, plan: &RenamePlan) {
    if plan.renames.is_empty() {
        OutputFormatter::dry_run_notice("Nothing to rename.");
        return;
    }
    for rename in &plan.renames {
        OutputFormatter::dry_run_notice(&format!(
            "{} → {}",
            rename.from.display(),
            rename
                .to
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        ));
    }
    for id in plan.skipped.iter().copied() {
        OutputFormatter::plain(&format!(
            "  skipped (no canonical target): {}",
            tree.node(id).rel_path
        ));
    }
    OutputFormatter::dry_run_notice("No files were modified.");
}

fn print_groups(tree: &Tree, groups: &GroupSet) {
    let forest = groups.forest(tree);
    let mut shown = false;
    for key in forest.node(forest.root()).children.iter().copied() {
        let group = forest.node(key);
        // Singleton groups exist in the forest but are not worth showing.
        if group.children.len() < 2 {
            continue;
        }
        shown = true;
        OutputFormatter::header(&group.leaf_name());
        for member in group.children.iter().copied() {
            let node = forest.node(member);
            let marker = match node.state {
                ComplianceState::Ok => "✓",
                ComplianceState::BadName => "✗",
                _ => "·",
            };
            OutputFormatter::plain(&format!("  {} {}", marker, node.leaf_name()));
        }
    }
    if !shown {
        OutputFormatter::plain("No multi-edition groups found.");
    }
}
