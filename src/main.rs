use clap::{Parser, Subcommand};
use mediatidy::cli::{run_cli_cancellable, Command};
use mediatidy::output::OutputFormatter;
use mediatidy::progress::CancelToken;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Scan media library trees, validate names against canonical grammars, and
/// apply renames.
#[derive(Parser)]
#[command(name = "mediatidy", version, about)]
struct Args {
    /// Path to a configuration file (defaults to .mediatidyrc.toml lookup)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write the JSON run report to this file
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan and validate without changing anything
    Check { root: PathBuf },
    /// Rename flagged files and directories to canonical form
    Rename {
        root: PathBuf,
        /// Show the plan without renaming
        #[arg(long)]
        dry_run: bool,
    },
    /// Tag unparsed directories from their .nfo sidecar metadata
    Tag {
        root: PathBuf,
        /// Show the plan without renaming
        #[arg(long)]
        dry_run: bool,
    },
    /// Show directories grouped by shared external id
    Groups { root: PathBuf },
    /// Propagate reference-tree names onto a mirror tree
    Mirror { root: PathBuf, mirror: PathBuf },
    /// Rewrite playlist references against the current layout
    Playlists { root: PathBuf },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    let args = Args::parse();

    let (command, root) = match args.command {
        Commands::Check { root } => (Command::Check, root),
        Commands::Rename { root, dry_run } => (Command::Rename { dry_run }, root),
        Commands::Tag { root, dry_run } => (Command::Tag { dry_run }, root),
        Commands::Groups { root } => (Command::Groups, root),
        Commands::Mirror { root, mirror } => (Command::Mirror { mirror_root: mirror }, root),
        Commands::Playlists { root } => (Command::Playlists, root),
    };

    // One token is shared between the signal handler and every pass; a second
    // Ctrl-C while a pass is still winding down is a no-op.
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        OutputFormatter::warning(&format!("Could not install Ctrl-C handler: {}", e));
    }

    match run_cli_cancellable(
        command,
        &root,
        args.config.as_deref(),
        args.report.as_deref(),
        &cancel,
    ) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            OutputFormatter::error(&e);
            ExitCode::FAILURE
        }
    }
}
