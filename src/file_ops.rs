//! Filesystem primitives used when applying a planned operation.
//!
//! Every function maps its I/O failure to an [`ItemError`] naming the paths
//! involved, so the orchestrators can journal the failure verbatim.

use crate::error::ItemError;
use crate::journal::TransferOp;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use tracing::debug;

/// Creates the parent directory of `path` if it doesn't exist.
pub fn ensure_parent(path: &Path) -> Result<(), ItemError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| ItemError::CreateDir {
                path: parent.to_path_buf(),
                source: e,
            })
        }
        _ => Ok(()),
    }
}

/// Removes the file at `path`; a file that is already gone is not an error.
pub fn remove_existing(path: &Path) -> Result<(), ItemError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ItemError::Remove {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Copies `from` to `to`, carrying over the modification time.
pub fn copy_file(from: &Path, to: &Path) -> Result<(), ItemError> {
    fs::copy(from, to).map_err(|e| ItemError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source: e,
    })?;

    if let Err(e) = preserve_mtime(from, to) {
        debug!("could not preserve mtime on {}: {}", to.display(), e);
    }
    Ok(())
}

/// Moves `from` to `to`. Falls back to copy-then-delete when the rename would
/// cross filesystems.
pub fn move_file(from: &Path, to: &Path) -> Result<(), ItemError> {
    let move_err = |e| ItemError::Move {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source: e,
    };

    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(from, to).map_err(move_err)?;
            if let Err(e) = preserve_mtime(from, to) {
                debug!("could not preserve mtime on {}: {}", to.display(), e);
            }
            fs::remove_file(from).map_err(move_err)
        }
        Err(e) => Err(move_err(e)),
    }
}

/// Performs `op` from `from` to `to`.
pub fn transfer(op: TransferOp, from: &Path, to: &Path) -> Result<(), ItemError> {
    match op {
        TransferOp::Copy => copy_file(from, to),
        TransferOp::Move => move_file(from, to),
    }
}

fn preserve_mtime(from: &Path, to: &Path) -> io::Result<()> {
    let modified = fs::metadata(from)?.modified()?;
    File::options().write(true).open(to)?.set_modified(modified)
}
