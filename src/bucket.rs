//! Bucket classification for routing files into destination subdirectories.
//!
//! A bucket is the name of the directory directly under the destination root
//! that a file lands in. It is derived either from the file extension or from
//! the modification month.
//!
//! # Examples
//!
//! ```
//! use tidyplan::bucket::extension_key;
//! use std::path::Path;
//!
//! assert_eq!(extension_key(Path::new("photo.JPG")), "jpg");
//! assert_eq!(extension_key(Path::new("Makefile")), "no_ext");
//! ```

use crate::config::BucketMode;
use chrono::{DateTime, Local};
use std::fs::Metadata;
use std::path::Path;

/// Sentinel extension for files without one.
pub const NO_EXT: &str = "no_ext";

/// Bucket used when the mode cannot classify a file.
pub const FALLBACK_BUCKET: &str = "others";

/// Returns the lowercased extension of `path`, or [`NO_EXT`].
///
/// Dotfiles such as `.bashrc` have no extension.
pub fn extension_key(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| NO_EXT.to_string())
}

/// Maps a file and its metadata to a bucket name under `mode`.
///
/// Date mode uses the local-time year and month of the modification time and
/// falls back to [`FALLBACK_BUCKET`] when the platform cannot report one.
pub fn bucket_for(path: &Path, metadata: &Metadata, mode: BucketMode) -> String {
    match mode {
        BucketMode::Ext => extension_key(path),
        BucketMode::Date => metadata
            .modified()
            .map(|mtime| DateTime::<Local>::from(mtime).format("%Y-%m").to_string())
            .unwrap_or_else(|_| FALLBACK_BUCKET.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    #[test]
    fn test_extension_key_lowercases() {
        assert_eq!(extension_key(Path::new("IMG_001.JPEG")), "jpeg");
        assert_eq!(extension_key(Path::new("dir/archive.tar.gz")), "gz");
    }

    #[test]
    fn test_extension_key_sentinel() {
        assert_eq!(extension_key(Path::new("README")), NO_EXT);
        assert_eq!(extension_key(Path::new(".bashrc")), NO_EXT);
        assert_eq!(extension_key(Path::new("trailing.")), NO_EXT);
    }

    #[test]
    fn test_bucket_by_extension() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("Report.PDF");
        fs::write(&path, "pdf").expect("Failed to write file");
        let metadata = fs::metadata(&path).expect("Failed to read metadata");

        assert_eq!(bucket_for(&path, &metadata, BucketMode::Ext), "pdf");
    }

    #[test]
    fn test_bucket_by_date_uses_modification_month() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("scan.png");
        fs::write(&path, "png").expect("Failed to write file");

        // 2021-06-15T12:00:00Z stays in June in every time zone
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_623_758_400);
        fs::File::options()
            .write(true)
            .open(&path)
            .and_then(|f| f.set_modified(mtime))
            .expect("Failed to set mtime");
        let metadata = fs::metadata(&path).expect("Failed to read metadata");

        assert_eq!(bucket_for(&path, &metadata, BucketMode::Date), "2021-06");
    }
}
