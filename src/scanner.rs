//! Lazy source-tree walking.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Yields the regular files under `root`, one level deep unless `recursive`.
///
/// The walk is lazy and sorted by file name, so two walks over an unchanged
/// tree visit files in the same order. A symlink is yielded when it resolves to
/// a regular file; symlinked directories are not descended into. Entries that
/// cannot be read surface as `Err` items instead of ending the walk.
pub fn walk_files(
    root: &Path,
    recursive: bool,
) -> impl Iterator<Item = Result<PathBuf, walkdir::Error>> + use<> {
    let max_depth = if recursive { usize::MAX } else { 1 };

    WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) if is_regular_file(&entry) => Some(Ok(entry.into_path())),
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        })
}

/// Like [`walk_files`] with recursion, but prunes directories for which
/// `skip_dir` returns true. Read errors are dropped.
pub fn walk_files_pruned<F>(
    root: &Path,
    mut skip_dir: F,
) -> impl Iterator<Item = PathBuf> + use<F>
where
    F: FnMut(&DirEntry) -> bool,
{
    WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| !(entry.file_type().is_dir() && skip_dir(entry)))
        .filter_map(Result::ok)
        .filter(is_regular_file)
        .map(DirEntry::into_path)
}

fn is_regular_file(entry: &DirEntry) -> bool {
    entry.file_type().is_file() || (entry.path_is_symlink() && entry.path().is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_walk_top_level_only() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs::write(temp_dir.path().join("b.txt"), "b").expect("Failed to write file");
        fs::write(temp_dir.path().join("a.txt"), "a").expect("Failed to write file");
        fs::create_dir(temp_dir.path().join("nested")).expect("Failed to create dir");
        fs::write(temp_dir.path().join("nested/c.txt"), "c").expect("Failed to write file");

        let files: Vec<_> = walk_files(temp_dir.path(), false)
            .collect::<Result<_, _>>()
            .expect("Walk failed");
        assert_eq!(names(&files), vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_walk_recursive() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs::write(temp_dir.path().join("a.txt"), "a").expect("Failed to write file");
        fs::create_dir_all(temp_dir.path().join("x/y")).expect("Failed to create dirs");
        fs::write(temp_dir.path().join("x/y/deep.txt"), "d").expect("Failed to write file");

        let files: Vec<_> = walk_files(temp_dir.path(), true)
            .collect::<Result<_, _>>()
            .expect("Walk failed");
        assert_eq!(files.len(), 2);
        assert!(files.contains(&temp_dir.path().join("x/y/deep.txt")));
    }

    #[test]
    fn test_walk_pruned_skips_directories() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs::create_dir_all(temp_dir.path().join("logs")).expect("Failed to create dir");
        fs::write(temp_dir.path().join("logs/plan.jsonl"), "{}").expect("Failed to write file");
        fs::write(temp_dir.path().join("kept.txt"), "k").expect("Failed to write file");

        let files: Vec<_> =
            walk_files_pruned(temp_dir.path(), |entry| entry.file_name() == "logs").collect();
        assert_eq!(names(&files), vec!["kept.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_yields_symlinked_files() {
        use std::os::unix::fs::symlink;

        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let outside = TempDir::new().expect("Failed to create temp directory");
        fs::write(outside.path().join("real.jpg"), "jpg").expect("Failed to write file");
        fs::create_dir(outside.path().join("dir")).expect("Failed to create dir");
        fs::write(outside.path().join("dir/inner.txt"), "i").expect("Failed to write file");
        symlink(outside.path().join("real.jpg"), temp_dir.path().join("link.jpg"))
            .expect("Failed to create symlink");
        symlink(outside.path().join("dir"), temp_dir.path().join("linked_dir"))
            .expect("Failed to create symlink");
        symlink(outside.path().join("gone.txt"), temp_dir.path().join("dangling.txt"))
            .expect("Failed to create symlink");

        let files: Vec<_> = walk_files(temp_dir.path(), true)
            .collect::<Result<_, _>>()
            .expect("Walk failed");
        assert_eq!(names(&files), vec!["link.jpg"]);
    }
}
