//! Per-item outcomes and run-level counters.

use crate::conflict::ConflictDecision;
use crate::error::ItemError;
use crate::journal::{EventBody, Failure, Skip, SkipReason, Transfer, TransferOp};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Exit code for a run in which some items failed.
pub const EXIT_ITEM_FAILURES: i32 = 2;

/// The result of processing one item, together with the journal event that
/// records it.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    /// A copy or move was performed, or planned under dry run.
    Transferred { op: TransferOp, event: EventBody },
    /// An undo step was performed, or previewed under dry run.
    Undone { event: EventBody },
    Skipped { reason: SkipReason, event: EventBody },
    Failed { cause: String, event: EventBody },
}

impl ItemOutcome {
    pub fn transferred(op: TransferOp, transfer: Transfer) -> Self {
        ItemOutcome::Transferred {
            op,
            event: EventBody::transfer(op, transfer),
        }
    }

    pub fn skipped(skip: Skip) -> Self {
        ItemOutcome::Skipped {
            reason: skip.reason,
            event: EventBody::Skip(skip),
        }
    }

    /// A FAIL event for a copy or move that did not happen.
    ///
    /// A `fail`-policy conflict is recorded with conflict `fail` and the
    /// occupied path as `dst`.
    pub fn failed(
        wanted_op: TransferOp,
        src: Option<PathBuf>,
        error: &ItemError,
        from_plan: Option<&Path>,
    ) -> Self {
        let cause = error.to_string();
        ItemOutcome::Failed {
            event: EventBody::Fail(Failure {
                wanted_op,
                src,
                dst: error.destination().map(Path::to_path_buf),
                conflict: error.conflict_path().map(|_| ConflictDecision::Fail),
                error: cause.clone(),
                from_plan: from_plan.map(Path::to_path_buf),
            }),
            cause,
        }
    }

    pub fn event(&self) -> &EventBody {
        match self {
            ItemOutcome::Transferred { event, .. }
            | ItemOutcome::Undone { event }
            | ItemOutcome::Skipped { event, .. }
            | ItemOutcome::Failed { event, .. } => event,
        }
    }

    pub fn into_event(self) -> EventBody {
        match self {
            ItemOutcome::Transferred { event, .. }
            | ItemOutcome::Undone { event }
            | ItemOutcome::Skipped { event, .. }
            | ItemOutcome::Failed { event, .. } => event,
        }
    }
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// Counters recorded in the RUN_END event.
///
/// Every processed item lands in exactly one bucket, so
/// `scanned == moved + copied + undone + skipped + failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub scanned: usize,
    pub moved: usize,
    pub copied: usize,
    /// Only used by undo runs.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub undone: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    /// Counts one processed item.
    pub fn record(&mut self, outcome: &ItemOutcome) {
        self.scanned += 1;
        match outcome {
            ItemOutcome::Transferred {
                op: TransferOp::Copy,
                ..
            } => self.copied += 1,
            ItemOutcome::Transferred {
                op: TransferOp::Move,
                ..
            } => self.moved += 1,
            ItemOutcome::Undone { .. } => self.undone += 1,
            ItemOutcome::Skipped { .. } => self.skipped += 1,
            ItemOutcome::Failed { .. } => self.failed += 1,
        }
    }

    /// True when every scanned item is accounted for exactly once.
    pub fn is_balanced(&self) -> bool {
        self.scanned == self.moved + self.copied + self.undone + self.skipped + self.failed
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// What an orchestrator hands back after a run that was not aborted.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub summary: RunSummary,
    /// Journal written by this run, if any.
    pub journal: Option<PathBuf>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.summary.is_success()
    }

    /// 0 when no item failed, [`EXIT_ITEM_FAILURES`] otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            EXIT_ITEM_FAILURES
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConflictError;

    fn failed() -> ItemOutcome {
        ItemOutcome::failed(
            TransferOp::Copy,
            None,
            &ItemError::SourceMissing(PathBuf::from("/in/a.jpg")),
            None,
        )
    }

    #[test]
    fn test_fail_policy_conflict_event() {
        let error = ItemError::from(ConflictError(PathBuf::from("/out/jpg/a.jpg")));
        let outcome = ItemOutcome::failed(
            TransferOp::Move,
            Some(PathBuf::from("/in/a.jpg")),
            &error,
            None,
        );

        match outcome.event() {
            EventBody::Fail(failure) => {
                assert_eq!(failure.conflict, Some(ConflictDecision::Fail));
                assert_eq!(failure.dst.as_deref(), Some(Path::new("/out/jpg/a.jpg")));
                assert_eq!(failure.wanted_op, TransferOp::Move);
            }
            other => panic!("Expected FAIL, got {:?}", other),
        }
    }

    #[test]
    fn test_record_keeps_summary_balanced() {
        let mut summary = RunSummary::default();
        summary.record(&failed());
        summary.record(&failed());

        assert_eq!(summary.scanned, 2);
        assert_eq!(summary.failed, 2);
        assert!(summary.is_balanced());
        assert!(!summary.is_success());
    }

    #[test]
    fn test_exit_code() {
        let mut report = RunReport {
            run_id: "r".to_string(),
            summary: RunSummary::default(),
            journal: None,
        };
        assert_eq!(report.exit_code(), 0);

        report.summary.record(&failed());
        assert_eq!(report.exit_code(), EXIT_ITEM_FAILURES);
    }

    #[test]
    fn test_undone_omitted_from_sort_summaries() {
        let json = serde_json::to_value(RunSummary {
            scanned: 2,
            copied: 1,
            skipped: 1,
            ..Default::default()
        })
        .expect("Failed to serialize");

        assert!(json.get("undone").is_none());
        assert_eq!(json["copied"], 1);
    }
}
