//! Console output for the command-line front end.
//!
//! Log lines go to stderr through `tracing`; this module prints the
//! human-facing parts on stdout: run headers, the summary table and the
//! dedupe-index spinner.

use crate::summary::{RunReport, RunSummary};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Consistently styled CLI output.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use tidyplan::output::OutputFormatter;
    /// OutputFormatter::success("Run complete");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red on stderr.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    /// Creates a spinner ticked while the dedupe index is built.
    ///
    /// Attach it to a run with
    /// [`RunLogger::with_progress`](crate::logging::RunLogger::with_progress).
    pub fn create_index_spinner() -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} indexing destination: {pos} files")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    }

    /// Prints the counters of a finished run.
    ///
    /// Zero-valued rows are left out, except `Scanned` and `Failed`.
    pub fn summary_table(summary: &RunSummary) {
        Self::header("SUMMARY");

        let rows = [
            ("Moved", summary.moved),
            ("Copied", summary.copied),
            ("Undone", summary.undone),
            ("Skipped", summary.skipped),
        ];
        let width = 8;

        println!("{:<width$} | {}", "Outcome".bold(), "Files".bold());
        println!("{}", "-".repeat(width + 10));
        for (label, count) in rows.iter().filter(|(_, count)| *count > 0) {
            println!("{:<width$} | {}", label, count.to_string().green());
        }
        let failed = if summary.failed > 0 {
            summary.failed.to_string().red().bold()
        } else {
            summary.failed.to_string().normal()
        };
        println!("{:<width$} | {}", "Failed", failed);
        println!("{}", "-".repeat(width + 10));
        println!(
            "{:<width$} | {}",
            "Scanned".bold(),
            summary.scanned.to_string().bold()
        );
    }

    /// Prints the summary table and a closing line for `report`.
    pub fn run_report(report: &RunReport, dry_run: bool) {
        Self::summary_table(&report.summary);
        println!();

        if let Some(journal) = &report.journal {
            Self::info(&format!("Journal: {}", journal.display()));
        }
        if dry_run {
            Self::dry_run_notice("No files were modified.");
        }

        if report.is_success() {
            Self::success(&format!("Run {} complete.", report.run_id));
        } else {
            Self::warning(&format!(
                "Run {} finished with {} failed item(s); see the journal for details.",
                report.run_id, report.summary.failed
            ));
        }
    }
}
