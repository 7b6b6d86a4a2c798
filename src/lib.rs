//! tidyplan - sort files into buckets with a replayable, undoable journal
//!
//! A sort run walks a source directory and copies or moves each file into
//! `<dst>/<bucket>/`, where the bucket is the file's extension or the
//! year-month of its modification time. Every decision is appended to a JSON
//! Lines journal, which can later be replayed (to execute a dry-run plan) or
//! undone (to reverse executed transfers).

pub mod bucket;
pub mod cli;
pub mod config;
pub mod conflict;
pub mod error;
pub mod file_ops;
pub mod journal;
pub mod logging;
pub mod output;
pub mod replay;
pub mod scanner;
pub mod signature;
pub mod sort;
pub mod summary;
pub mod undo;

pub use config::{Action, BucketMode, RunConfig, SortOptions};
pub use conflict::{ConflictDecision, ConflictPolicy};
pub use error::{ConfigError, ConflictError, ItemError, JournalError, RunError, RunResult};
pub use journal::{EventBody, PlanEvent, Status, read_journal};
pub use logging::RunLogger;
pub use replay::{ReplayConfig, run_replay, run_replay_with_index};
pub use sort::run_sort;
pub use summary::{RunReport, RunSummary};
pub use undo::{UndoConfig, run_undo};

pub use cli::{Cli, Command, run_cli};
