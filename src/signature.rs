//! Content signatures and the dedupe index.
//!
//! Two files are duplicates iff their [`Signature`]s are equal: same byte
//! count and same SHA-256 digest. There is no byte-by-byte confirmation step,
//! so a hash collision would be reported as a duplicate.

use crate::logging::RunLogger;
use crate::scanner::walk_files_pruned;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Files are hashed in chunks of this many bytes.
const CHUNK_SIZE: usize = 1024 * 1024;

/// Directory names never indexed, compared case-insensitively.
const UNINDEXED_DIRS: [&str; 2] = ["logs", ".undo_trash"];

/// Size and content hash of a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub size: u64,
    /// Lowercase hex SHA-256 digest.
    pub sha256: String,
}

/// Streams `path` through SHA-256 and returns its signature.
///
/// Memory use is bounded by the chunk size regardless of file size.
pub fn compute_signature(path: &Path) -> io::Result<Signature> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut size = 0u64;

    loop {
        let read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..read]);
        size += read as u64;
    }

    Ok(Signature {
        size,
        sha256: format!("{:x}", hasher.finalize()),
    })
}

/// Maps each signature to the first path seen with it.
///
/// Lives for one run only and is never persisted.
#[derive(Debug, Default, Clone)]
pub struct DedupeIndex {
    entries: HashMap<Signature, PathBuf>,
}

impl DedupeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes every file under `root`, skipping `logs/` and `.undo_trash/`
    /// subtrees. Files that cannot be read are left out; the build never
    /// aborts. A missing root yields an empty index.
    pub fn build(root: &Path, logger: &RunLogger) -> Self {
        let mut index = Self::new();
        if !root.exists() {
            return index;
        }

        let mut hashed = 0usize;
        let files = walk_files_pruned(root, |entry| {
            let name = entry.file_name().to_string_lossy().to_lowercase();
            UNINDEXED_DIRS.contains(&name.as_str())
        });

        for path in files {
            match compute_signature(&path) {
                Ok(signature) => {
                    index.insert(signature, path);
                    hashed += 1;
                    logger.hashing_progress(hashed);
                }
                Err(e) => debug!("dedupe index: skipping {}: {}", path.display(), e),
            }
        }

        logger.finish_progress();
        info!(files = index.len(), "dedupe index ready");
        index
    }

    /// Returns the path first recorded for `signature`.
    pub fn lookup(&self, signature: &Signature) -> Option<&Path> {
        self.entries.get(signature).map(PathBuf::as_path)
    }

    /// Records `path` for `signature` unless one is already recorded.
    pub fn insert(&mut self, signature: Signature, path: PathBuf) {
        self.entries.entry(signature).or_insert(path);
    }

    /// Drops every entry that points at `path`, e.g. before the file there is
    /// overwritten with different content.
    pub fn forget_path(&mut self, path: &Path) {
        self.entries.retain(|_, existing| existing.as_path() != path);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
