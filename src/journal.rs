//! The plan journal: an append-only JSON Lines record of every decision a run
//! makes.
//!
//! Each line is one [`PlanEvent`]: a timestamp, the run id, a status and an
//! `op`-tagged body carrying only the fields that kind of event needs.
//! Journals are opened in append mode and never rewritten.
//!
//! ```text
//! {"ts":"2024-05-01T10:00:00","run_id":"3f9a0c1b2d4e","status":"OK","op":"COPY","src":"/in/a.jpg","dst":"/out/jpg/a.jpg",...}
//! ```

use crate::config::{Action, resolve_lenient};
use crate::conflict::{ConflictDecision, ConflictPolicy};
use crate::error::{ConfigError, JournalError, RunResult};
use crate::summary::{ItemOutcome, RunSummary};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Outcome class of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Ok,
    Skipped,
    Error,
    Dry,
}

/// The two filesystem operations a run can plan or perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransferOp {
    Copy,
    Move,
}

impl From<Action> for TransferOp {
    fn from(action: Action) -> Self {
        match action {
            Action::Copy => TransferOp::Copy,
            Action::Move => TransferOp::Move,
        }
    }
}

/// Why an item was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    SizeTooSmall,
    NotInOnlyExt,
    InExcludeExt,
    DedupeDuplicateOf,
    ConflictSkip,
    DstMissing,
}

/// A planned (DRY) or performed (OK) copy or move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub src: PathBuf,
    /// Final destination after conflict resolution.
    pub dst: PathBuf,
    /// Destination before conflict resolution.
    pub dst_base: PathBuf,
    pub conflict: ConflictDecision,
    pub on_conflict: ConflictPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_plan: Option<PathBuf>,
}

/// An item filtered out of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skip {
    pub src: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<String>,
    pub reason: SkipReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_conflict: Option<ConflictPolicy>,
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_plan: Option<PathBuf>,
}

/// A copy or move that failed, or a conflict that aborted the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub wanted_op: TransferOp,
    /// Absent when the walker failed before a path was known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict: Option<ConflictDecision>,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_plan: Option<PathBuf>,
}

/// Moving a file back from the destination to its original source path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoMove {
    pub src: PathBuf,
    /// Restore path after conflict resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_final: Option<PathBuf>,
    pub dst: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict: Option<ConflictDecision>,
    pub on_conflict: ConflictPolicy,
    /// Set when the item was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<SkipReason>,
    pub dry_run: bool,
    pub from_plan: PathBuf,
}

/// Relocating a copy output into the trash directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoCopy {
    pub src: PathBuf,
    pub dst: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trash: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<SkipReason>,
    pub dry_run: bool,
    pub from_plan: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoFailure {
    pub undo_for: TransferOp,
    pub src: PathBuf,
    pub dst: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict: Option<ConflictDecision>,
    pub error: String,
    pub from_plan: PathBuf,
}

/// Event payload, discriminated by `op`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventBody {
    RunStart { config: serde_json::Value },
    RunEnd { summary: RunSummary },
    Skip(Skip),
    Copy(Transfer),
    Move(Transfer),
    Fail(Failure),
    UndoMove(UndoMove),
    UndoCopy(UndoCopy),
    UndoFail(UndoFailure),
}

impl EventBody {
    /// Wraps a transfer in the variant matching `op`.
    pub fn transfer(op: TransferOp, transfer: Transfer) -> Self {
        match op {
            TransferOp::Copy => EventBody::Copy(transfer),
            TransferOp::Move => EventBody::Move(transfer),
        }
    }

    /// The status implied by this body.
    pub fn status(&self) -> Status {
        match self {
            EventBody::RunStart { .. } | EventBody::RunEnd { .. } => Status::Ok,
            EventBody::Skip(_) => Status::Skipped,
            EventBody::Copy(t) | EventBody::Move(t) => {
                if t.dry_run {
                    Status::Dry
                } else {
                    Status::Ok
                }
            }
            EventBody::Fail(_) | EventBody::UndoFail(_) => Status::Error,
            EventBody::UndoMove(u) => undo_status(u.reason, u.dry_run),
            EventBody::UndoCopy(u) => undo_status(u.reason, u.dry_run),
        }
    }
}

fn undo_status(reason: Option<SkipReason>, dry_run: bool) -> Status {
    match (reason, dry_run) {
        (Some(_), _) => Status::Skipped,
        (None, true) => Status::Dry,
        (None, false) => Status::Ok,
    }
}

fn default_run_id() -> String {
    "unknown".to_string()
}

/// One journal line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEvent {
    /// Local time, seconds precision.
    #[serde(default)]
    pub ts: String,
    #[serde(default = "default_run_id")]
    pub run_id: String,
    status: Status,
    #[serde(flatten)]
    pub body: EventBody,
}

impl PlanEvent {
    /// Stamps `body` with the current time and `run_id`; the status is
    /// derived from the body.
    pub fn new(run_id: impl Into<String>, body: EventBody) -> Self {
        Self {
            ts: now_ts(),
            run_id: run_id.into(),
            status: body.status(),
            body,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Returns the op and payload of a COPY or MOVE event.
    pub fn as_transfer(&self) -> Option<(TransferOp, &Transfer)> {
        match &self.body {
            EventBody::Copy(t) => Some((TransferOp::Copy, t)),
            EventBody::Move(t) => Some((TransferOp::Move, t)),
            _ => None,
        }
    }
}

/// Current local time as `YYYY-MM-DDTHH:MM:SS`.
pub fn now_ts() -> String {
    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// A fresh 12-character run identifier.
pub fn new_run_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

/// Appends events for one run to a journal file.
///
/// A writer without a path accepts events and discards them, so orchestrators
/// can journal unconditionally.
#[derive(Debug)]
pub struct JournalWriter {
    path: Option<PathBuf>,
    file: Option<File>,
    run_id: String,
    fsync: bool,
}

impl JournalWriter {
    /// Opens `path` for appending, creating it and its parent directories.
    ///
    /// With `fsync`, every line is forced to disk before `append` returns.
    pub fn open(path: &Path, run_id: &str, fsync: bool) -> Result<Self, JournalError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| JournalError::Open {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| JournalError::Open {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(Self {
            path: Some(path.to_path_buf()),
            file: Some(file),
            run_id: run_id.to_string(),
            fsync,
        })
    }

    /// A writer that records nothing.
    pub fn disabled(run_id: &str) -> Self {
        Self {
            path: None,
            file: None,
            run_id: run_id.to_string(),
            fsync: false,
        }
    }

    /// Opens `path` when given, otherwise returns a disabled writer.
    pub fn open_optional(
        path: Option<&Path>,
        run_id: &str,
        fsync: bool,
    ) -> Result<Self, JournalError> {
        match path {
            Some(path) => Self::open(path, run_id, fsync),
            None => Ok(Self::disabled(run_id)),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Writes one event line.
    pub fn append(&mut self, body: EventBody) -> Result<(), JournalError> {
        let (Some(file), Some(path)) = (self.file.as_mut(), self.path.as_ref()) else {
            return Ok(());
        };

        let event = PlanEvent::new(self.run_id.as_str(), body);
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');

        let write_err = |e| JournalError::Write {
            path: path.clone(),
            source: e,
        };
        file.write_all(line.as_bytes()).map_err(write_err)?;
        file.flush().map_err(write_err)?;
        if self.fsync {
            file.sync_data().map_err(write_err)?;
        }
        Ok(())
    }

    /// Records the effective configuration of the run.
    pub fn run_start<T: Serialize>(&mut self, config: &T) -> Result<(), JournalError> {
        let config = serde_json::to_value(config)?;
        self.append(EventBody::RunStart { config })
    }

    pub fn run_end(&mut self, summary: &RunSummary) -> Result<(), JournalError> {
        self.append(EventBody::RunEnd {
            summary: summary.clone(),
        })
    }

    /// Counts `outcome` in `summary` and journals its event.
    pub fn record(
        &mut self,
        summary: &mut RunSummary,
        outcome: ItemOutcome,
    ) -> Result<(), JournalError> {
        summary.record(&outcome);
        self.append(outcome.into_event())
    }
}

/// Checks the input plan of a replay or undo run before anything is opened.
///
/// The plan must exist, and the run's own journal must be a different file.
pub fn check_plan_paths(plan_in: &Path, plan_out: Option<&Path>) -> RunResult<()> {
    if !plan_in.is_file() {
        return Err(JournalError::PlanNotFound(plan_in.to_path_buf()).into());
    }
    if let Some(out) = plan_out
        && resolve_lenient(out) == resolve_lenient(plan_in)
    {
        return Err(ConfigError::JournalOverwritesPlan(out.to_path_buf()).into());
    }
    Ok(())
}

/// Reads a journal lazily, one event per non-blank line.
///
/// A malformed line yields an `Err` item and reading continues with the next
/// line.
///
/// # Errors
///
/// Fails up front with [`JournalError::PlanNotFound`] when `path` does not exist.
pub fn read_journal(
    path: &Path,
) -> Result<impl Iterator<Item = Result<PlanEvent, JournalError>> + use<>, JournalError> {
    if !path.exists() {
        return Err(JournalError::PlanNotFound(path.to_path_buf()));
    }

    let file = File::open(path).map_err(|e| JournalError::Open {
        path: path.to_path_buf(),
        source: e,
    })?;
    let path = path.to_path_buf();

    Ok(BufReader::new(file)
        .lines()
        .enumerate()
        .filter_map(move |(index, line)| {
            let line_no = index + 1;
            match line {
                Ok(line) if line.trim().is_empty() => None,
                Ok(line) => Some(serde_json::from_str::<PlanEvent>(line.trim()).map_err(|e| {
                    JournalError::Malformed {
                        path: path.clone(),
                        line: line_no,
                        source: e,
                    }
                })),
                Err(e) => Some(Err(JournalError::Read {
                    path: path.clone(),
                    line: line_no,
                    source: e,
                })),
            }
        }))
}
