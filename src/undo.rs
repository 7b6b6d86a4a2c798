//! Undo functionality for reverting completed sort or replay runs.
//!
//! The journal is the only source of truth: every executed (`status=OK`) COPY
//! or MOVE event is reversed, most recent first. Moved files go back to their
//! source path. Copies never delete data; the copy output is relocated into a
//! trash directory instead.

use crate::conflict::{ConflictDecision, ConflictPolicy, PlannedPaths};
use crate::error::{ItemError, RunResult};
use crate::file_ops::{ensure_parent, move_file, remove_existing};
use crate::journal::{
    EventBody, JournalWriter, SkipReason, Status, Transfer, TransferOp, UndoCopy, UndoFailure,
    UndoMove, check_plan_paths, new_run_id, read_journal,
};
use crate::logging::RunLogger;
use crate::summary::{ItemOutcome, RunReport, RunSummary};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Name of the default trash directory, created beside the plan.
pub const TRASH_DIR_NAME: &str = ".undo_trash";

/// Options for one undo run.
#[derive(Debug, Clone)]
pub struct UndoConfig {
    pub plan_in: PathBuf,
    /// Applied when the original source path is occupied again.
    pub on_conflict: ConflictPolicy,
    pub dry_run: bool,
    /// Defaults to [`TRASH_DIR_NAME`] beside the plan.
    pub trash_dir: Option<PathBuf>,
    /// Restricts the undo to events of one run.
    pub run_filter: Option<String>,
    pub plan_out: Option<PathBuf>,
    pub plan_fsync: bool,
}

impl UndoConfig {
    pub fn new(plan_in: impl Into<PathBuf>) -> Self {
        Self {
            plan_in: plan_in.into(),
            on_conflict: ConflictPolicy::default(),
            dry_run: false,
            trash_dir: None,
            run_filter: None,
            plan_out: None,
            plan_fsync: false,
        }
    }

    /// The directory copy outputs are relocated into.
    pub fn trash_dir(&self) -> PathBuf {
        self.trash_dir.clone().unwrap_or_else(|| {
            self.plan_in
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(TRASH_DIR_NAME)
        })
    }
}

/// Reverses the executed transfers recorded in `config.plan_in`.
///
/// # Edge Cases Handled
///
/// * **Destination gone**: recorded as SKIPPED (`dst_missing`), the item is
///   treated as already undone
/// * **Source path occupied**: resolved with the configured conflict policy
/// * **Copy outputs**: moved into the trash directory under their original
///   name, probing `name_N.ext` so earlier trash entries are kept
/// * **Dry run**: decisions are journaled but neither the tree nor the trash
///   directory is touched; restore and trash paths planned earlier in the run
///   count as occupied
///
/// # Errors
///
/// Fails before any processing when the plan does not exist or the output
/// journal would overwrite it. A `fail`-policy conflict aborts the run after
/// the conflicting item is journaled.
///
/// # Examples
///
/// ```no_run
/// use tidyplan::logging::RunLogger;
/// use tidyplan::undo::{UndoConfig, run_undo};
///
/// let mut config = UndoConfig::new("/home/user/Sorted/logs/plan.jsonl");
/// config.plan_out = Some("/home/user/Sorted/logs/undo.jsonl".into());
///
/// match run_undo(&config, &RunLogger::new("undo")) {
///     Ok(report) => println!("Undid {} operations", report.summary.undone),
///     Err(e) => eprintln!("Undo failed: {}", e),
/// }
/// ```
pub fn run_undo(config: &UndoConfig, logger: &RunLogger) -> RunResult<RunReport> {
    let _entered = logger.span().enter();
    check_plan_paths(&config.plan_in, config.plan_out.as_deref())?;

    let run_id = new_run_id();
    logger.bind_run(&run_id);
    let trash_dir = config.trash_dir();

    let mut journal =
        JournalWriter::open_optional(config.plan_out.as_deref(), &run_id, config.plan_fsync)?;
    journal.run_start(&json!({
        "mode": "undo",
        "plan_in": config.plan_in,
        "on_conflict": config.on_conflict,
        "dry_run": config.dry_run,
        "trash_dir": trash_dir,
        "run_filter": config.run_filter,
    }))?;
    info!(
        "undo: plan={} dry_run={}",
        config.plan_in.display(),
        config.dry_run
    );

    let mut undoer = Undoer {
        config,
        trash_dir,
        planned: PlannedPaths::default(),
        summary: RunSummary::default(),
    };
    let outcome = undoer.run(&mut journal);

    let summary = undoer.summary;
    info!(
        scanned = summary.scanned,
        undone = summary.undone,
        skipped = summary.skipped,
        failed = summary.failed,
        "undo finished"
    );
    let ended = journal.run_end(&summary);
    outcome?;
    ended?;

    Ok(RunReport {
        run_id,
        summary,
        journal: journal.path().map(Path::to_path_buf),
    })
}

struct Undoer<'a> {
    config: &'a UndoConfig,
    trash_dir: PathBuf,
    planned: PlannedPaths,
    summary: RunSummary,
}

impl Undoer<'_> {
    fn run(&mut self, journal: &mut JournalWriter) -> RunResult<()> {
        let executed = self.executed_transfers()?;
        info!(operations = executed.len(), "undoing executed transfers");

        // Undo is LIFO.
        for (op, transfer) in executed.iter().rev() {
            let result = match op {
                TransferOp::Move => self.undo_move(transfer),
                TransferOp::Copy => self.undo_copy(transfer),
            };

            match result {
                Ok(outcome) => journal.record(&mut self.summary, outcome)?,
                Err(e) => {
                    error!("[UNDO FAIL] {}: {}", transfer.dst.display(), e);
                    let outcome = self.failed(*op, transfer, &e);
                    journal.record(&mut self.summary, outcome)?;
                    if let Some(fatal) = e.into_fatal() {
                        warn!("aborting run");
                        return Err(fatal);
                    }
                }
            }
        }
        Ok(())
    }

    /// Loads the OK transfers of the plan in journal order.
    fn executed_transfers(&self) -> RunResult<Vec<(TransferOp, Transfer)>> {
        let mut executed = Vec::new();
        for item in read_journal(&self.config.plan_in)? {
            let event = match item {
                Ok(event) => event,
                Err(e) => {
                    warn!("{}", e);
                    continue;
                }
            };
            if let Some(run_id) = &self.config.run_filter
                && &event.run_id != run_id
            {
                continue;
            }
            if event.status() != Status::Ok {
                continue;
            }
            if let Some((op, transfer)) = event.as_transfer() {
                executed.push((op, transfer.clone()));
            }
        }
        Ok(executed)
    }

    fn undo_move(&mut self, transfer: &Transfer) -> Result<ItemOutcome, ItemError> {
        let dry_run = self.config.dry_run;
        let policy = self.config.on_conflict;
        let record = |src_final, conflict, reason| UndoMove {
            src: transfer.src.clone(),
            src_final,
            dst: transfer.dst.clone(),
            conflict,
            on_conflict: policy,
            reason,
            dry_run,
            from_plan: self.config.plan_in.clone(),
        };

        if !transfer.dst.exists() {
            debug!("[UNDO SKIP] {} is gone", transfer.dst.display());
            return Ok(ItemOutcome::Skipped {
                reason: SkipReason::DstMissing,
                event: EventBody::UndoMove(record(None, None, Some(SkipReason::DstMissing))),
            });
        }

        let (src_final, conflict) = self.planned.resolve(&transfer.src, policy)?;
        if conflict == ConflictDecision::Skip {
            return Ok(ItemOutcome::Skipped {
                reason: SkipReason::ConflictSkip,
                event: EventBody::UndoMove(record(
                    None,
                    Some(conflict),
                    Some(SkipReason::ConflictSkip),
                )),
            });
        }

        if !dry_run {
            ensure_parent(&src_final)?;
            if conflict == ConflictDecision::Overwrite {
                remove_existing(&src_final)?;
            }
            move_file(&transfer.dst, &src_final)?;
        } else {
            self.planned.claim(src_final.clone());
        }
        debug!(
            "[UNDO MOVE] {} -> {}",
            transfer.dst.display(),
            src_final.display()
        );

        Ok(ItemOutcome::Undone {
            event: EventBody::UndoMove(record(Some(src_final), Some(conflict), None)),
        })
    }

    fn undo_copy(&mut self, transfer: &Transfer) -> Result<ItemOutcome, ItemError> {
        let dry_run = self.config.dry_run;
        let record = |trash, reason| UndoCopy {
            src: transfer.src.clone(),
            dst: transfer.dst.clone(),
            trash,
            reason,
            dry_run,
            from_plan: self.config.plan_in.clone(),
        };

        if !transfer.dst.exists() {
            debug!("[UNDO SKIP] {} is gone", transfer.dst.display());
            return Ok(ItemOutcome::Skipped {
                reason: SkipReason::DstMissing,
                event: EventBody::UndoCopy(record(None, Some(SkipReason::DstMissing))),
            });
        }

        let file_name = transfer.dst.file_name().unwrap_or_default();
        let trash = self.planned.next_available(&self.trash_dir.join(file_name));

        if !dry_run {
            fs::create_dir_all(&self.trash_dir).map_err(|e| ItemError::CreateDir {
                path: self.trash_dir.clone(),
                source: e,
            })?;
            move_file(&transfer.dst, &trash)?;
        } else {
            self.planned.claim(trash.clone());
        }
        debug!(
            "[UNDO COPY] {} -> {}",
            transfer.dst.display(),
            trash.display()
        );

        Ok(ItemOutcome::Undone {
            event: EventBody::UndoCopy(record(Some(trash), None)),
        })
    }

    fn failed(&self, undo_for: TransferOp, transfer: &Transfer, error: &ItemError) -> ItemOutcome {
        let cause = error.to_string();
        ItemOutcome::Failed {
            event: EventBody::UndoFail(UndoFailure {
                undo_for,
                src: transfer.src.clone(),
                dst: transfer.dst.clone(),
                conflict: error.conflict_path().map(|_| ConflictDecision::Fail),
                error: cause.clone(),
                from_plan: self.config.plan_in.clone(),
            }),
            cause,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Action, SortOptions};
    use crate::sort::run_sort;
    use tempfile::TempDir;

    struct Sorted {
        temp: TempDir,
        src: PathBuf,
        dst: PathBuf,
        plan: PathBuf,
    }

    fn sorted(action: Action, files: &[(&str, &str)]) -> Sorted {
        let temp = TempDir::new().expect("Failed to create temp directory");
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        let plan = dst.join("logs").join("plan.jsonl");
        fs::create_dir_all(&src).expect("Failed to create src");
        for (name, content) in files {
            fs::write(src.join(name), content).expect("Failed to write file");
        }

        let mut options = SortOptions::new(&src, &dst);
        options.action = action;
        options.plan_out = Some(plan.clone());
        let config = options.validate().expect("Invalid config");
        run_sort(&config, &RunLogger::new("sort")).expect("Sort failed");

        Sorted {
            temp,
            src,
            dst,
            plan,
        }
    }

    #[test]
    fn test_undo_move_restores_source() {
        let s = sorted(Action::Move, &[("a.jpg", "a")]);
        assert!(!s.src.join("a.jpg").exists());

        let report = run_undo(&UndoConfig::new(&s.plan), &RunLogger::new("undo"))
            .expect("Undo failed");

        assert_eq!(report.summary.undone, 1);
        assert!(s.src.join("a.jpg").exists());
        assert!(!s.dst.join("jpg").join("a.jpg").exists());
    }

    #[test]
    fn test_undo_copy_trashes_output() {
        let s = sorted(Action::Copy, &[("a.jpg", "a")]);

        let report = run_undo(&UndoConfig::new(&s.plan), &RunLogger::new("undo"))
            .expect("Undo failed");

        assert_eq!(report.summary.undone, 1);
        assert!(s.src.join("a.jpg").exists());
        assert!(!s.dst.join("jpg").join("a.jpg").exists());
        assert!(s.dst.join("logs").join(TRASH_DIR_NAME).join("a.jpg").exists());
    }

    #[test]
    fn test_trash_never_clobbers() {
        let s = sorted(Action::Copy, &[("a.jpg", "a")]);
        let trash = s.temp.path().join("trash");
        fs::create_dir_all(&trash).expect("Failed to create trash");
        fs::write(trash.join("a.jpg"), "older").expect("Failed to write file");

        let mut config = UndoConfig::new(&s.plan);
        config.trash_dir = Some(trash.clone());
        run_undo(&config, &RunLogger::new("undo")).expect("Undo failed");

        assert_eq!(
            fs::read_to_string(trash.join("a.jpg")).expect("Read failed"),
            "older"
        );
        assert!(trash.join("a_1.jpg").exists());
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let s = sorted(Action::Copy, &[("a.jpg", "a")]);

        let mut config = UndoConfig::new(&s.plan);
        config.dry_run = true;
        let report = run_undo(&config, &RunLogger::new("undo")).expect("Undo failed");

        assert_eq!(report.summary.undone, 1);
        assert!(s.dst.join("jpg").join("a.jpg").exists());
        assert!(!s.dst.join("logs").join(TRASH_DIR_NAME).exists());
    }

    #[test]
    fn test_missing_destination_is_skipped() {
        let s = sorted(Action::Move, &[("a.jpg", "a")]);
        fs::remove_file(s.dst.join("jpg").join("a.jpg")).expect("Failed to remove file");

        let report = run_undo(&UndoConfig::new(&s.plan), &RunLogger::new("undo"))
            .expect("Undo failed");

        assert_eq!(report.summary.skipped, 1);
        assert!(report.is_success());
    }

    #[test]
    fn test_occupied_source_is_renamed() {
        let s = sorted(Action::Move, &[("a.jpg", "moved")]);
        fs::write(s.src.join("a.jpg"), "new arrival").expect("Failed to write file");

        run_undo(&UndoConfig::new(&s.plan), &RunLogger::new("undo")).expect("Undo failed");

        assert_eq!(
            fs::read_to_string(s.src.join("a.jpg")).expect("Read failed"),
            "new arrival"
        );
        assert_eq!(
            fs::read_to_string(s.src.join("a_1.jpg")).expect("Read failed"),
            "moved"
        );
    }

    #[test]
    fn test_missing_plan_is_fatal() {
        let config = UndoConfig::new("/non/existent/plan.jsonl");
        assert!(run_undo(&config, &RunLogger::new("undo")).is_err());
    }
}
