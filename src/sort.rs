//! The sort orchestrator.
//!
//! Walks the source tree and routes each regular file through a fixed
//! pipeline, stopping at the first stage that rejects it:
//!
//! 1. size filter (`size_too_small`)
//! 2. inclusion filter (`not_in_only_ext`)
//! 3. exclusion filter (`in_exclude_ext`)
//! 4. dedupe lookup (`dedupe_duplicate_of`)
//! 5. bucket classification
//! 6. conflict resolution (`conflict_skip`, or abort under `fail`)
//! 7. dry run: journal a DRY event only
//! 8. apply the copy or move and journal an OK event
//!
//! Every scanned file yields exactly one journal event.

use crate::bucket::{bucket_for, extension_key};
use crate::config::{RunConfig, check_disjoint};
use crate::conflict::{ConflictDecision, PlannedPaths};
use crate::error::{ItemError, RunResult};
use crate::file_ops::{self, ensure_parent, remove_existing};
use crate::journal::{JournalWriter, Skip, SkipReason, Transfer, TransferOp, new_run_id};
use crate::logging::RunLogger;
use crate::scanner::walk_files;
use crate::signature::{DedupeIndex, compute_signature};
use crate::summary::{ItemOutcome, RunReport, RunSummary};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Runs a sort described by `config`.
///
/// The RUN_START event records the full configuration and RUN_END the
/// summary. RUN_END is written even when the run is aborted.
///
/// # Errors
///
/// Returns a [`RunError`](crate::error::RunError) for fatal conditions only:
/// journal I/O, a `fail`-policy conflict, or the destination ending up inside
/// the source mid-run. Per-file failures are counted in the report instead.
///
/// # Examples
///
/// ```no_run
/// use tidyplan::config::SortOptions;
/// use tidyplan::logging::RunLogger;
/// use tidyplan::sort::run_sort;
///
/// let mut options = SortOptions::new("/home/user/Downloads", "/home/user/Sorted");
/// options.dry_run = true;
/// options.plan_out = Some("/home/user/Sorted/logs/plan.jsonl".into());
///
/// let config = options.validate().expect("invalid configuration");
/// let report = run_sort(&config, &RunLogger::new("sort")).expect("sort aborted");
/// println!("scanned {} files", report.summary.scanned);
/// ```
pub fn run_sort(config: &RunConfig, logger: &RunLogger) -> RunResult<RunReport> {
    let _entered = logger.span().enter();
    let run_id = new_run_id();
    logger.bind_run(&run_id);

    let mut journal =
        JournalWriter::open_optional(config.plan_out(), &run_id, config.plan_fsync())?;
    journal.run_start(config)?;

    info!(
        "sort: src={} dst={} mode={:?} action={:?} dry_run={}",
        config.src().display(),
        config.dst().display(),
        config.mode(),
        config.action(),
        config.dry_run()
    );
    if let Some(path) = journal.path() {
        info!("plan -> {}", path.display());
    }

    let index = if config.dedupe() {
        info!("building dedupe index under {}", config.dst().display());
        DedupeIndex::build(config.dst(), logger)
    } else {
        DedupeIndex::new()
    };

    let mut sorter = Sorter {
        config,
        index,
        planned: PlannedPaths::default(),
        summary: RunSummary::default(),
    };
    let outcome = sorter.run(
        &mut journal,
        walk_files(config.src(), config.recursive()),
    );

    let summary = sorter.summary;
    info!(
        scanned = summary.scanned,
        moved = summary.moved,
        copied = summary.copied,
        skipped = summary.skipped,
        failed = summary.failed,
        "sort finished"
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

struct Sorter<'a> {
    config: &'a RunConfig,
    index: DedupeIndex,
    planned: PlannedPaths,
    summary: RunSummary,
}

impl Sorter<'_> {
    fn run<I>(&mut self, journal: &mut JournalWriter, entries: I) -> RunResult<()>
    where
        I: IntoIterator<Item = Result<PathBuf, walkdir::Error>>,
    {
        let op = TransferOp::from(self.config.action());

        for entry in entries {
            let (src, result) = match entry {
                Ok(path) => {
                    let result = self.process(&path, op);
                    (Some(path), result)
                }
                Err(e) => (e.path().map(Path::to_path_buf), Err(ItemError::from(e))),
            };

            match result {
                Ok(outcome) => journal.record(&mut self.summary, outcome)?,
                Err(e) => {
                    error!("[FAIL] {}: {}", display_opt(src.as_deref()), e);
                    journal.record(
                        &mut self.summary,
                        ItemOutcome::failed(op, src, &e, None),
                    )?;
                    if let Some(fatal) = e.into_fatal() {
                        warn!("aborting run");
                        return Err(fatal);
                    }
                }
            }
        }
        Ok(())
    }

    fn process(&mut self, src: &Path, op: TransferOp) -> Result<ItemOutcome, ItemError> {
        let metadata = fs::metadata(src).map_err(|e| ItemError::Metadata {
            path: src.to_path_buf(),
            source: e,
        })?;
        let size = metadata.len();
        let ext = extension_key(src);
        let dry_run = self.config.dry_run();

        let skip = |reason: SkipReason| Skip {
            src: src.to_path_buf(),
            dst: None,
            size_bytes: Some(size),
            ext: Some(ext.clone()),
            reason,
            sha256: None,
            duplicate_of: None,
            on_conflict: None,
            dry_run,
            from_plan: None,
        };

        let min_size = self.config.min_size_bytes();
        if min_size > 0 && size < min_size {
            return Ok(ItemOutcome::skipped(skip(SkipReason::SizeTooSmall)));
        }
        let only_ext = self.config.only_ext();
        if !only_ext.is_empty() && !only_ext.contains(&ext) {
            return Ok(ItemOutcome::skipped(skip(SkipReason::NotInOnlyExt)));
        }
        if self.config.exclude_ext().contains(&ext) {
            return Ok(ItemOutcome::skipped(skip(SkipReason::InExcludeExt)));
        }

        let signature = if self.config.dedupe() {
            let signature = compute_signature(src).map_err(|e| ItemError::Hash {
                path: src.to_path_buf(),
                source: e,
            })?;
            if let Some(existing) = self.index.lookup(&signature) {
                debug!("[DUP] {} == {}", src.display(), existing.display());
                return Ok(ItemOutcome::skipped(Skip {
                    sha256: Some(signature.sha256.clone()),
                    duplicate_of: Some(existing.to_path_buf()),
                    ..skip(SkipReason::DedupeDuplicateOf)
                }));
            }
            Some(signature)
        } else {
            None
        };

        let bucket = bucket_for(src, &metadata, self.config.mode());
        let file_name = src.file_name().unwrap_or_default();
        let dst_base = self.config.dst().join(&bucket).join(file_name);

        let policy = self.config.on_conflict();
        let (dst, conflict) = self.planned.resolve(&dst_base, policy)?;
        if conflict == ConflictDecision::Skip {
            return Ok(ItemOutcome::skipped(Skip {
                dst: Some(dst_base),
                on_conflict: Some(policy),
                sha256: signature.map(|s| s.sha256),
                ..skip(SkipReason::ConflictSkip)
            }));
        }
        if conflict == ConflictDecision::Overwrite {
            self.index.forget_path(&dst);
        }

        if !dry_run {
            check_disjoint(self.config.src(), self.config.dst())?;
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

        let transfer = Transfer {
            src: src.to_path_buf(),
            dst,
            dst_base,
            conflict,
            on_conflict: policy,
            bucket: Some(bucket),
            size_bytes: Some(size),
            ext: Some(ext),
            sha256,
            dry_run,
            from_plan: None,
        };
        Ok(ItemOutcome::transferred(op, transfer))
    }
}

fn display_opt(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "<unknown>".to_string())
}
