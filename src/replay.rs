//! The replay orchestrator: materializes a dry-run plan.
//!
//! Only COPY and MOVE events with status DRY are replayed. Nothing recorded
//! in the plan beyond the source path, the pre-resolution destination and
//! the operation is trusted: the source is re-checked, dedupe and conflict
//! resolution run again against the destination as it is now.

use crate::conflict::{ConflictDecision, ConflictPolicy, PlannedPaths};
use crate::error::{ItemError, RunResult};
use crate::file_ops::{self, ensure_parent, remove_existing};
use crate::journal::{
    JournalWriter, Skip, SkipReason, Status, Transfer, TransferOp, check_plan_paths, new_run_id,
    read_journal,
};
use crate::logging::RunLogger;
use crate::signature::{DedupeIndex, compute_signature};
use crate::summary::{ItemOutcome, RunReport, RunSummary};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Options for one replay run.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayConfig {
    /// Always `"replay"`; recorded in RUN_START.
    mode: &'static str,
    pub plan_in: PathBuf,
    pub on_conflict: ConflictPolicy,
    pub dedupe: bool,
    /// Tree indexed before the first event when `dedupe` is set. Without it
    /// the index only learns from the replay's own outputs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedupe_root: Option<PathBuf>,
    pub dry_run: bool,
    /// Restricts the replay to events of one run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_filter: Option<String>,
    #[serde(skip)]
    pub plan_out: Option<PathBuf>,
    #[serde(skip)]
    pub plan_fsync: bool,
}

impl ReplayConfig {
    pub fn new(plan_in: impl Into<PathBuf>) -> Self {
        Self {
            mode: "replay",
            plan_in: plan_in.into(),
            on_conflict: ConflictPolicy::default(),
            dedupe: false,
            dedupe_root: None,
            dry_run: false,
            run_filter: None,
            plan_out: None,
            plan_fsync: false,
        }
    }
}

/// Replays the DRY transfers of `config.plan_in`.
///
/// # Errors
///
/// Fails before any processing when the plan does not exist or the output
/// journal would overwrite it. During the run only journal I/O and a
/// `fail`-policy conflict are fatal; other per-event problems are journaled
/// as FAIL and the batch continues.
pub fn run_replay(config: &ReplayConfig, logger: &RunLogger) -> RunResult<RunReport> {
    run_replay_with_index(config, None, logger)
}

/// Like [`run_replay`], but dedupes against `index` when one is supplied
/// instead of building one from `config.dedupe_root`.
pub fn run_replay_with_index(
    config: &ReplayConfig,
    index: Option<DedupeIndex>,
    logger: &RunLogger,
) -> RunResult<RunReport> {
    let _entered = logger.span().enter();
    check_plan_paths(&config.plan_in, config.plan_out.as_deref())?;

    let run_id = new_run_id();
    logger.bind_run(&run_id);

    let mut journal =
        JournalWriter::open_optional(config.plan_out.as_deref(), &run_id, config.plan_fsync)?;
    journal.run_start(config)?;
    info!(
        "replay: plan={} dry_run={}",
        config.plan_in.display(),
        config.dry_run
    );

    let index = match (index, &config.dedupe_root) {
        (Some(index), _) => index,
        (None, Some(root)) if config.dedupe => {
            info!("building dedupe index under {}", root.display());
            DedupeIndex::build(root, logger)
        }
        (None, _) => DedupeIndex::new(),
    };

    let mut replayer = Replayer {
        config,
        index,
        planned: PlannedPaths::default(),
        summary: RunSummary::default(),
    };
    let outcome = replayer.run(&mut journal);

    let summary = replayer.summary;
    info!(
        scanned = summary.scanned,
        moved = summary.moved,
        copied = summary.copied,
        skipped = summary.skipped,
        failed = summary.failed,
        "replay finished"
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

struct Replayer<'a> {
    config: &'a ReplayConfig,
    index: DedupeIndex,
    planned: PlannedPaths,
    summary: RunSummary,
}

impl Replayer<'_> {
    fn run(&mut self, journal: &mut JournalWriter) -> RunResult<()> {
        let plan = self.config.plan_in.as_path();
        let mut executed = 0usize;

        for item in read_journal(plan)? {
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
            let Some((op, planned)) = event.as_transfer() else {
                continue;
            };
            match event.status() {
                Status::Dry => {}
                Status::Ok => {
                    executed += 1;
                    continue;
                }
                _ => continue,
            }

            match self.process(op, planned) {
                Ok(outcome) => journal.record(&mut self.summary, outcome)?,
                Err(e) => {
                    error!("[FAIL] {}: {}", planned.src.display(), e);
                    let outcome =
                        ItemOutcome::failed(op, Some(planned.src.clone()), &e, Some(plan));
                    journal.record(&mut self.summary, outcome)?;
                    if let Some(fatal) = e.into_fatal() {
                        warn!("aborting run");
                        return Err(fatal);
                    }
                }
            }
        }

        if executed > 0 {
            warn!(
                executed,
                "plan also contains executed transfers; only DRY events were replayed"
            );
        }
        Ok(())
    }

    fn process(&mut self, op: TransferOp, planned: &Transfer) -> Result<ItemOutcome, ItemError> {
        let src = planned.src.as_path();
        let plan = self.config.plan_in.as_path();
        let dry_run = self.config.dry_run;

        let metadata = match fs::metadata(src) {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => return Err(ItemError::SourceMissing(src.to_path_buf())),
        };

        let signature = if self.config.dedupe {
            let signature = compute_signature(src).map_err(|e| ItemError::Hash {
                path: src.to_path_buf(),
                source: e,
            })?;
            if let Some(existing) = self.index.lookup(&signature) {
                debug!("[DUP] {} == {}", src.display(), existing.display());
                return Ok(ItemOutcome::skipped(Skip {
                    src: src.to_path_buf(),
                    dst: None,
                    size_bytes: Some(signature.size),
                    ext: planned.ext.clone(),
                    reason: SkipReason::DedupeDuplicateOf,
                    sha256: Some(signature.sha256.clone()),
                    duplicate_of: Some(existing.to_path_buf()),
                    on_conflict: None,
                    dry_run,
                    from_plan: Some(plan.to_path_buf()),
                }));
            }
            Some(signature)
        } else {
            None
        };

        let policy = self.config.on_conflict;
        let dst_base = planned.dst_base.clone();
        let (dst, conflict) = self.planned.resolve(&dst_base, policy)?;
        if conflict == ConflictDecision::Skip {
            return Ok(ItemOutcome::skipped(Skip {
                src: src.to_path_buf(),
                dst: Some(dst_base),
                size_bytes: Some(metadata.len()),
                ext: planned.ext.clone(),
                reason: SkipReason::ConflictSkip,
                sha256: signature.map(|s| s.sha256),
                duplicate_of: None,
                on_conflict: Some(policy),
                dry_run,
                from_plan: Some(plan.to_path_buf()),
            }));
        }
        if conflict == ConflictDecision::Overwrite {
            self.index.forget_path(&dst);
        }

        if !dry_run {
            ensure_parent(&dst)?;
            if conflict == ConflictDecision::Overwrite {
                remove_existing(&dst)?;
            }
            file_ops::transfer(op, src, &dst)?;
            debug!("[{:?}] {} -> {}", op, src.display(), dst.display());
        } else {
            debug!("[DRY {:?}] {} -> {}", op, src.display(), dst.display());
            self.planned.claim(dst.clone());
        }

        let sha256 = signature.as_ref().map(|s| s.sha256.clone());
        if let Some(signature) = signature {
            self.index.insert(signature, dst.clone());
        }

        Ok(ItemOutcome::transferred(
            op,
            Transfer {
                src: src.to_path_buf(),
                dst,
                dst_base,
                conflict,
                on_conflict: policy,
                bucket: planned.bucket.clone(),
                size_bytes: Some(metadata.len()),
                ext: planned.ext.clone(),
                sha256,
                dry_run,
                from_plan: Some(plan.to_path_buf()),
            },
        ))
    }
}
