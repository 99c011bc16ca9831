//! Output formatting and styling module.
//!
//! Provides a centralized interface for all CLI output, including colored
//! output, progress tracking, and the run summary table. Diagnostics for
//! operators go through `tracing`; everything here is for the person at the
//! terminal.

use crate::report::RunReport;
use crate::validator::ValidationSummary;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

/// Manages all CLI output with consistent styling and formatting.
///
/// This struct provides methods for:
/// - Success messages (green with ✓)
/// - Error messages (red with ✗)
/// - Warning messages (yellow with ⚠)
/// - Info messages (cyan)
/// - Progress bars for scan and apply passes
/// - Summary tables over validation and run reports
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    /// Prints a regular message without styling.
    pub fn plain(message: &str) {
        println!("{}", message);
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Creates a progress bar for a pass. With an unknown total the bar is a
    /// spinner that still counts entries.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use mediatidy::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar(Some(100));
    /// pb.inc(1);
    /// pb.finish_with_message("Completed!");
    /// ```
    pub fn create_progress_bar(total: Option<u64>) -> ProgressBar {
        match total {
            Some(total) => {
                let pb = ProgressBar::new(total);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                        .expect("Invalid progress bar template")
                        .progress_chars("█▓░"),
                );
                pb
            }
            None => {
                let pb = ProgressBar::new_spinner();
                pb.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.cyan} {pos} entries {msg}")
                        .expect("Invalid progress bar template"),
                );
                pb
            }
        }
    }

    /// Prints the validation tallies.
    pub fn validation_summary(summary: &ValidationSummary) {
        Self::header("VALIDATION");
        println!("  Conforming:      {}", summary.ok.to_string().green());
        println!("  Needing rename:  {}", summary.bad_name.to_string().yellow());
        println!("  Unclassified:    {}", summary.unclassified);
        if summary.inconsistencies > 0 {
            println!(
                "  Inconsistencies: {}",
                summary.inconsistencies.to_string().red()
            );
        }
    }

    /// Prints the run summary table from a report.
    pub fn report_summary(report: &RunReport) {
        let counts = report.counts();
        Self::header("SUMMARY");
        println!("  Renamed: {}", counts.renamed.to_string().green());
        if counts.failed > 0 {
            println!("  Failed:  {}", counts.failed.to_string().red());
        }
        if counts.missing > 0 {
            println!("  Missing: {}", counts.missing.to_string().yellow());
        }
        if counts.skipped > 0 {
            println!("  Skipped: {}", counts.skipped);
        }
        println!(
            "  Total:   {}",
            report.entries.len().to_string().bold()
        );
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }
}
