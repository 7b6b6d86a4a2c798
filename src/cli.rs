//! Command-line interface module for tidyplan.
//!
//! This module handles:
//! - Argument parsing for the `sort`, `replay` and `undo` commands
//! - Merging CLI flags over the TOML defaults file
//! - Default journal locations
//! - Dispatch to the orchestrators and the final summary output

use crate::config::{Action, BucketMode, ConfigFile, SortOptions, parse_ext_list};
use crate::conflict::ConflictPolicy;
use crate::error::{ConfigError, RunResult};
use crate::logging::RunLogger;
use crate::output::OutputFormatter;
use crate::replay::{ReplayConfig, run_replay};
use crate::sort::run_sort;
use crate::summary::RunReport;
use crate::undo::{UndoConfig, run_undo};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Sort files into buckets, journal every decision, replay or undo later.
#[derive(Debug, Parser)]
#[command(name = "tidyplan", version, about)]
pub struct Cli {
    /// Log level filter; `RUST_LOG` takes precedence when set.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Also write log lines to this file.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sort the files of a source directory into destination buckets.
    Sort(SortArgs),
    /// Execute the DRY transfers of a previously written plan.
    Replay(ReplayArgs),
    /// Reverse the executed transfers of a journal.
    Undo(UndoArgs),
}

#[derive(Debug, Args)]
pub struct SortArgs {
    #[arg(long)]
    pub src: PathBuf,

    #[arg(long)]
    pub dst: PathBuf,

    /// Descend into subdirectories of the source.
    #[arg(long, overrides_with = "no_recursive")]
    pub recursive: bool,

    /// Stay at the top level even when the defaults file says `recursive`.
    #[arg(long, overrides_with = "recursive")]
    pub no_recursive: bool,

    #[arg(long, value_enum)]
    pub mode: Option<BucketMode>,

    #[arg(long, value_enum)]
    pub action: Option<Action>,

    /// Journal the plan without touching any file.
    #[arg(long)]
    pub dry_run: bool,

    /// Comma separated extensions to include, e.g. `jpg,png`.
    #[arg(long, value_name = "EXTS")]
    pub only_ext: Option<String>,

    /// Comma separated extensions to leave alone.
    #[arg(long, value_name = "EXTS")]
    pub exclude_ext: Option<String>,

    /// Skip files smaller than this many KiB.
    #[arg(long, value_name = "KB")]
    pub min_size_kb: Option<u64>,

    #[arg(long, value_enum)]
    pub on_conflict: Option<ConflictPolicy>,

    /// Skip files whose content already exists in the destination.
    #[arg(long, overrides_with = "no_dedupe")]
    pub dedupe: bool,

    #[arg(long, overrides_with = "dedupe")]
    pub no_dedupe: bool,

    /// Journal path; defaults to `<dst>/logs/plan.jsonl`.
    #[arg(long)]
    pub plan_out: Option<PathBuf>,

    /// Force every journal line to disk.
    #[arg(long, overrides_with = "no_plan_fsync")]
    pub plan_fsync: bool,

    #[arg(long, overrides_with = "plan_fsync")]
    pub no_plan_fsync: bool,

    /// TOML defaults file; otherwise `./.tidyplan.toml` or
    /// `~/.config/tidyplan/config.toml` when present.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// The dry-run journal to execute.
    #[arg(long)]
    pub plan: PathBuf,

    #[arg(long, value_enum, default_value_t = ConflictPolicy::Rename)]
    pub on_conflict: ConflictPolicy,

    #[arg(long)]
    pub dedupe: bool,

    /// Tree indexed for dedupe before replaying.
    #[arg(long, requires = "dedupe")]
    pub dedupe_root: Option<PathBuf>,

    #[arg(long)]
    pub dry_run: bool,

    /// Only replay events of this run.
    #[arg(long)]
    pub run_id: Option<String>,

    /// Journal path; defaults to `replay.jsonl` beside the plan.
    #[arg(long)]
    pub plan_out: Option<PathBuf>,

    #[arg(long)]
    pub plan_fsync: bool,
}

#[derive(Debug, Args)]
pub struct UndoArgs {
    /// The journal whose executed transfers are reversed.
    #[arg(long)]
    pub plan: PathBuf,

    #[arg(long, value_enum, default_value_t = ConflictPolicy::Rename)]
    pub on_conflict: ConflictPolicy,

    #[arg(long)]
    pub dry_run: bool,

    /// Where copy outputs are moved; defaults to `.undo_trash` beside the plan.
    #[arg(long)]
    pub trash_dir: Option<PathBuf>,

    /// Only undo events of this run.
    #[arg(long)]
    pub run_id: Option<String>,

    /// Journal path; defaults to `undo.jsonl` beside the plan.
    #[arg(long)]
    pub plan_out: Option<PathBuf>,

    #[arg(long)]
    pub plan_fsync: bool,
}

impl SortArgs {
    /// Builds sort options from the defaults file with these flags on top.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the defaults file cannot be read or parsed.
    pub fn into_options(self) -> Result<SortOptions, ConfigError> {
        let file = ConfigFile::load(self.config.as_deref())?;
        let mut options = SortOptions::new(&self.src, &self.dst);
        file.sort.apply(&mut options);

        if let Some(recursive) = flag_pair(self.recursive, self.no_recursive) {
            options.recursive = recursive;
        }
        options.dry_run = self.dry_run;
        if let Some(dedupe) = flag_pair(self.dedupe, self.no_dedupe) {
            options.dedupe = dedupe;
        }
        if let Some(fsync) = flag_pair(self.plan_fsync, self.no_plan_fsync) {
            options.plan_fsync = fsync;
        }
        if let Some(mode) = self.mode {
            options.mode = mode;
        }
        if let Some(action) = self.action {
            options.action = action;
        }
        if let Some(only) = &self.only_ext {
            options.only_ext = parse_ext_list(only);
        }
        if let Some(exclude) = &self.exclude_ext {
            options.exclude_ext = parse_ext_list(exclude);
        }
        if let Some(min_size_kb) = self.min_size_kb {
            options.min_size_kb = min_size_kb;
        }
        if let Some(policy) = self.on_conflict {
            options.on_conflict = policy;
        }
        options.plan_out = Some(
            self.plan_out
                .unwrap_or_else(|| self.dst.join("logs").join("plan.jsonl")),
        );

        Ok(options)
    }
}

impl ReplayArgs {
    pub fn into_config(self) -> ReplayConfig {
        let plan_out = self
            .plan_out
            .unwrap_or_else(|| sibling(&self.plan, "replay.jsonl"));
        let mut config = ReplayConfig::new(self.plan);
        config.on_conflict = self.on_conflict;
        config.dedupe = self.dedupe;
        config.dedupe_root = self.dedupe_root;
        config.dry_run = self.dry_run;
        config.run_filter = self.run_id;
        config.plan_out = Some(plan_out);
        config.plan_fsync = self.plan_fsync;
        config
    }
}

impl UndoArgs {
    pub fn into_config(self) -> UndoConfig {
        let plan_out = self
            .plan_out
            .unwrap_or_else(|| sibling(&self.plan, "undo.jsonl"));
        let mut config = UndoConfig::new(self.plan);
        config.on_conflict = self.on_conflict;
        config.dry_run = self.dry_run;
        config.trash_dir = self.trash_dir;
        config.run_filter = self.run_id;
        config.plan_out = Some(plan_out);
        config.plan_fsync = self.plan_fsync;
        config
    }
}

/// Reads a `--flag` / `--no-flag` pair. `None` keeps the defaults file value.
fn flag_pair(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn sibling(plan: &Path, name: &str) -> PathBuf {
    plan.parent()
        .unwrap_or_else(|| Path::new("."))
        .join(name)
}

/// Runs one command and prints its summary.
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use tidyplan::cli::{Cli, run_cli};
///
/// let cli = Cli::parse_from(["tidyplan", "sort", "--src", "/in", "--dst", "/out", "--dry-run"]);
/// match run_cli(cli.command) {
///     Ok(report) => std::process::exit(report.exit_code()),
///     Err(e) => eprintln!("Error: {}", e),
/// }
/// ```
pub fn run_cli(command: Command) -> RunResult<RunReport> {
    match command {
        Command::Sort(args) => {
            let config = args.into_options()?.validate()?;
            OutputFormatter::info(&format!(
                "Sorting {} into {}",
                config.src().display(),
                config.dst().display()
            ));
            let logger = run_logger("sort", config.dedupe());
            let report = run_sort(&config, &logger)?;
            OutputFormatter::run_report(&report, config.dry_run());
            Ok(report)
        }
        Command::Replay(args) => {
            let config = args.into_config();
            OutputFormatter::info(&format!("Replaying plan {}", config.plan_in.display()));
            let logger = run_logger("replay", config.dedupe && config.dedupe_root.is_some());
            let report = run_replay(&config, &logger)?;
            OutputFormatter::run_report(&report, config.dry_run);
            Ok(report)
        }
        Command::Undo(args) => {
            let config = args.into_config();
            OutputFormatter::info(&format!("Undoing plan {}", config.plan_in.display()));
            let report = run_undo(&config, &RunLogger::new("undo"))?;
            OutputFormatter::run_report(&report, config.dry_run);
            Ok(report)
        }
    }
}

fn run_logger(kind: &'static str, indexing: bool) -> RunLogger {
    let logger = RunLogger::new(kind);
    if indexing {
        logger.with_progress(OutputFormatter::create_index_spinner())
    } else {
        logger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Command {
        Cli::try_parse_from(std::iter::once("tidyplan").chain(args.iter().copied()))
            .expect("Failed to parse arguments")
            .command
    }

    #[test]
    fn test_sort_defaults_plan_into_destination_logs() {
        let Command::Sort(args) = parse(&["sort", "--src", "/in", "--dst", "/out"]) else {
            panic!("Expected the sort command");
        };
        let config_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = config_dir.path().join("empty.toml");
        fs::write(&config_path, "").expect("Failed to write config");

        let options = SortArgs {
            config: Some(config_path),
            ..args
        }
        .into_options()
        .expect("Failed to build options");

        assert_eq!(
            options.plan_out,
            Some(PathBuf::from("/out/logs/plan.jsonl"))
        );
        assert_eq!(options.action, Action::Move);
        assert_eq!(options.on_conflict, ConflictPolicy::Rename);
    }

    #[test]
    fn test_flags_override_config_file() {
        let config_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = config_dir.path().join("tidyplan.toml");
        fs::write(
            &config_path,
            "[sort]\naction = \"copy\"\nmin_size_kb = 4\nonly_ext = [\"jpg\"]\n",
        )
        .expect("Failed to write config");
        let config_arg = config_path.to_string_lossy().into_owned();

        let Command::Sort(args) = parse(&[
            "sort",
            "--src",
            "/in",
            "--dst",
            "/out",
            "--min-size-kb",
            "8",
            "--config",
            &config_arg,
        ]) else {
            panic!("Expected the sort command");
        };
        let options = args.into_options().expect("Failed to build options");

        assert_eq!(options.action, Action::Copy);
        assert_eq!(options.min_size_kb, 8);
        assert!(options.only_ext.contains("jpg"));
    }

    #[test]
    fn test_no_flags_override_config_file() {
        let config_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = config_dir.path().join("tidyplan.toml");
        fs::write(
            &config_path,
            "[sort]\nrecursive = true\ndedupe = true\nplan_fsync = true\n",
        )
        .expect("Failed to write config");
        let config_arg = config_path.to_string_lossy().into_owned();
        let base = [
            "sort",
            "--src",
            "/in",
            "--dst",
            "/out",
            "--config",
            config_arg.as_str(),
        ];

        let Command::Sort(args) = parse(&base) else {
            panic!("Expected the sort command");
        };
        let options = args.into_options().expect("Failed to build options");
        assert!(options.recursive && options.dedupe && options.plan_fsync);

        let mut with_off = base.to_vec();
        with_off.extend(["--no-recursive", "--no-dedupe", "--no-plan-fsync"]);
        let Command::Sort(args) = parse(&with_off) else {
            panic!("Expected the sort command");
        };
        let options = args.into_options().expect("Failed to build options");
        assert!(!options.recursive);
        assert!(!options.dedupe);
        assert!(!options.plan_fsync);

        // The last flag of a pair wins
        let mut toggled = base.to_vec();
        toggled.extend(["--no-dedupe", "--dedupe"]);
        let Command::Sort(args) = parse(&toggled) else {
            panic!("Expected the sort command");
        };
        assert!(args.into_options().expect("Failed to build options").dedupe);
    }

    #[test]
    fn test_ext_lists_are_normalized() {
        let Command::Sort(args) = parse(&[
            "sort",
            "--src",
            "/in",
            "--dst",
            "/out",
            "--only-ext",
            ".JPG, png",
        ]) else {
            panic!("Expected the sort command");
        };
        assert_eq!(
            parse_ext_list(args.only_ext.as_deref().unwrap_or_default()),
            BTreeSet::from(["jpg".to_string(), "png".to_string()])
        );
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        let result = Cli::try_parse_from([
            "tidyplan",
            "sort",
            "--src",
            "/in",
            "--dst",
            "/out",
            "--on-conflict",
            "merge",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_replay_and_undo_journals_default_beside_plan() {
        let Command::Replay(replay) = parse(&["replay", "--plan", "/logs/plan.jsonl"]) else {
            panic!("Expected the replay command");
        };
        assert_eq!(
            replay.into_config().plan_out,
            Some(PathBuf::from("/logs/replay.jsonl"))
        );

        let Command::Undo(undo) = parse(&["undo", "--plan", "/logs/plan.jsonl", "--run-id", "abc"])
        else {
            panic!("Expected the undo command");
        };
        let config = undo.into_config();
        assert_eq!(config.plan_out, Some(PathBuf::from("/logs/undo.jsonl")));
        assert_eq!(config.run_filter.as_deref(), Some("abc"));
        assert_eq!(config.trash_dir(), PathBuf::from("/logs/.undo_trash"));
    }

    #[test]
    fn test_dedupe_root_requires_dedupe() {
        let result = Cli::try_parse_from([
            "tidyplan",
            "replay",
            "--plan",
            "/logs/plan.jsonl",
            "--dedupe-root",
            "/out",
        ]);
        assert!(result.is_err());
    }
}
