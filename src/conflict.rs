//! Destination conflict resolution.
//!
//! Resolution is a pure decision over the current filesystem state: nothing is
//! created or removed here. Probing is not atomic with respect to other
//! writers; a single invocation is assumed to own the destination tree.
//!
//! A dry run writes nothing, so paths it has already planned are tracked in a
//! [`PlannedPaths`] set and count as occupied for the rest of the run.

use crate::error::ConflictError;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// What to do when the computed destination already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Probe `name_1.ext`, `name_2.ext`, ... until a free path is found.
    #[default]
    Rename,
    /// Leave the existing file alone and record a skip.
    Skip,
    /// Remove the existing file before writing.
    Overwrite,
    /// Abort the whole run.
    Fail,
}

/// The decision recorded alongside a resolved path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictDecision {
    /// The candidate path was free.
    None,
    Rename,
    Skip,
    Overwrite,
    Fail,
}

/// Resolves `candidate` against the filesystem under `policy`.
///
/// Returns the final path and the decision taken. Under [`ConflictPolicy::Fail`]
/// an occupied candidate yields a [`ConflictError`].
///
/// # Examples
///
/// ```no_run
/// use tidyplan::conflict::{resolve, ConflictDecision, ConflictPolicy};
/// use std::path::Path;
///
/// let (path, decision) = resolve(Path::new("/dst/jpg/photo.jpg"), ConflictPolicy::Rename)?;
/// if decision == ConflictDecision::Rename {
///     println!("renamed to {}", path.display());
/// }
/// # Ok::<(), tidyplan::error::ConflictError>(())
/// ```
pub fn resolve(
    candidate: &Path,
    policy: ConflictPolicy,
) -> Result<(PathBuf, ConflictDecision), ConflictError> {
    resolve_with(candidate, policy, Path::exists)
}

/// Like [`resolve`], with `occupied` deciding whether a path is taken.
pub fn resolve_with<F>(
    candidate: &Path,
    policy: ConflictPolicy,
    occupied: F,
) -> Result<(PathBuf, ConflictDecision), ConflictError>
where
    F: Fn(&Path) -> bool,
{
    if !occupied(candidate) {
        return Ok((candidate.to_path_buf(), ConflictDecision::None));
    }

    match policy {
        ConflictPolicy::Rename => Ok((
            next_available_with(candidate, occupied),
            ConflictDecision::Rename,
        )),
        ConflictPolicy::Skip => Ok((candidate.to_path_buf(), ConflictDecision::Skip)),
        ConflictPolicy::Overwrite => Ok((candidate.to_path_buf(), ConflictDecision::Overwrite)),
        ConflictPolicy::Fail => Err(ConflictError(candidate.to_path_buf())),
    }
}

/// Returns `path` if it is free, otherwise the first free `stem_N.ext` sibling.
///
/// Example: `photo.jpg` becomes `photo_1.jpg`, then `photo_2.jpg`.
pub fn next_available(path: &Path) -> PathBuf {
    next_available_with(path, Path::exists)
}

/// Like [`next_available`], with `occupied` deciding whether a path is taken.
pub fn next_available_with<F>(path: &Path, occupied: F) -> PathBuf
where
    F: Fn(&Path) -> bool,
{
    if !occupied(path) {
        return path.to_path_buf();
    }

    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1u64..)
        .map(|i| parent.join(format!("{stem}_{i}{suffix}")))
        .find(|candidate| !occupied(candidate.as_path()))
        .unwrap_or_else(|| path.to_path_buf())
}

/// Paths a dry run has planned to write during the current run.
#[derive(Debug, Default)]
pub struct PlannedPaths {
    paths: HashSet<PathBuf>,
}

impl PlannedPaths {
    /// True if `path` exists on disk or was planned earlier in the run.
    pub fn is_occupied(&self, path: &Path) -> bool {
        self.paths.contains(path) || path.exists()
    }

    pub fn claim(&mut self, path: PathBuf) {
        self.paths.insert(path);
    }

    /// Resolves `candidate` as if every planned path had been written.
    pub fn resolve(
        &self,
        candidate: &Path,
        policy: ConflictPolicy,
    ) -> Result<(PathBuf, ConflictDecision), ConflictError> {
        resolve_with(candidate, policy, |p| self.is_occupied(p))
    }

    /// [`next_available`] over the disk and the planned paths.
    pub fn next_available(&self, path: &Path) -> PathBuf {
        next_available_with(path, |p| self.is_occupied(p))
    }
}
