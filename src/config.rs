//! Run configuration.
//!
//! A sort run is described by [`SortOptions`], a plain mutable bag of settings
//! assembled from built-in defaults, an optional TOML defaults file and CLI
//! flags. [`SortOptions::validate`] turns it into a [`RunConfig`], which is
//! immutable for the rest of the run.
//!
//! # Configuration File Format
//!
//! ```toml
//! [sort]
//! recursive = true
//! mode = "date"
//! action = "copy"
//! only_ext = ["jpg", "png"]
//! exclude_ext = ["part"]
//! min_size_kb = 4
//! on_conflict = "rename"
//! dedupe = true
//! plan_fsync = false
//! ```

use crate::conflict::ConflictPolicy;
use crate::error::ConfigError;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the per-directory defaults file.
pub const CONFIG_FILE_NAME: &str = ".tidyplan.toml";

/// How files are routed to bucket directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BucketMode {
    /// Lowercased extension, `no_ext` for files without one.
    #[default]
    #[serde(alias = "by-extension")]
    #[value(alias = "by-extension")]
    Ext,
    /// Year-month of the modification time, e.g. `2024-03`.
    #[serde(alias = "by-date")]
    #[value(alias = "by-date")]
    Date,
}

/// Whether accepted files are copied or moved into the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Copy,
    #[default]
    Move,
}

/// Normalizes one extension: trimmed, lowercased, no leading dot.
///
/// Returns `None` for entries that are empty after normalization.
pub fn normalize_ext(raw: &str) -> Option<String> {
    let ext = raw.trim().trim_start_matches('.').to_lowercase();
    (!ext.is_empty()).then_some(ext)
}

/// Parses a comma separated extension list such as `"jpg, .PNG,gif"`.
pub fn parse_ext_list(raw: &str) -> BTreeSet<String> {
    raw.split(',').filter_map(normalize_ext).collect()
}

/// Unvalidated sort settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOptions {
    pub src: PathBuf,
    pub dst: PathBuf,
    pub recursive: bool,
    pub mode: BucketMode,
    pub action: Action,
    pub dry_run: bool,
    pub only_ext: BTreeSet<String>,
    pub exclude_ext: BTreeSet<String>,
    pub min_size_kb: u64,
    pub on_conflict: ConflictPolicy,
    pub dedupe: bool,
    pub plan_out: Option<PathBuf>,
    pub plan_fsync: bool,
}

impl SortOptions {
    /// Creates options with every setting at its default.
    pub fn new(src: impl Into<PathBuf>, dst: impl Into<PathBuf>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            recursive: false,
            mode: BucketMode::default(),
            action: Action::default(),
            dry_run: false,
            only_ext: BTreeSet::new(),
            exclude_ext: BTreeSet::new(),
            min_size_kb: 0,
            on_conflict: ConflictPolicy::default(),
            dedupe: false,
            plan_out: None,
            plan_fsync: false,
        }
    }

    /// Validates the options and freezes them into a [`RunConfig`].
    ///
    /// Checks, in order:
    /// 1. The source exists and is a directory
    /// 2. Source and destination are neither equal nor nested in either direction
    /// 3. The journal is not written inside the source tree
    ///
    /// The destination directory is created for live runs only; a dry run
    /// leaves the filesystem untouched.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first failed check.
    pub fn validate(self) -> Result<RunConfig, ConfigError> {
        if !self.src.exists() {
            return Err(ConfigError::SourceNotFound(self.src));
        }
        if !self.src.is_dir() {
            return Err(ConfigError::SourceNotDirectory(self.src));
        }

        let src = std::path::absolute(&self.src).unwrap_or(self.src);
        let dst = std::path::absolute(&self.dst).unwrap_or(self.dst);
        check_disjoint(&src, &dst)?;

        let plan_out = self
            .plan_out
            .map(|p| std::path::absolute(&p).unwrap_or(p));
        if let Some(plan) = &plan_out
            && resolve_lenient(plan).starts_with(resolve_lenient(&src))
        {
            return Err(ConfigError::JournalInsideSource(plan.clone()));
        }

        if !self.dry_run {
            fs::create_dir_all(&dst).map_err(|e| ConfigError::CreateDestination {
                path: dst.clone(),
                source: e,
            })?;
        }

        Ok(RunConfig {
            src,
            dst,
            recursive: self.recursive,
            mode: self.mode,
            action: self.action,
            dry_run: self.dry_run,
            only_ext: self.only_ext.iter().filter_map(|e| normalize_ext(e)).collect(),
            exclude_ext: self
                .exclude_ext
                .iter()
                .filter_map(|e| normalize_ext(e))
                .collect(),
            min_size_kb: self.min_size_kb,
            on_conflict: self.on_conflict,
            dedupe: self.dedupe,
            plan_out,
            plan_fsync: self.plan_fsync,
        })
    }
}

/// Validated, immutable configuration for one sort run.
///
/// Serializes to the object recorded in the RUN_START journal event.
#[derive(Debug, Clone, Serialize)]
pub struct RunConfig {
    src: PathBuf,
    dst: PathBuf,
    recursive: bool,
    mode: BucketMode,
    action: Action,
    dry_run: bool,
    only_ext: BTreeSet<String>,
    exclude_ext: BTreeSet<String>,
    min_size_kb: u64,
    on_conflict: ConflictPolicy,
    dedupe: bool,
    plan_out: Option<PathBuf>,
    plan_fsync: bool,
}

impl RunConfig {
    pub fn src(&self) -> &Path {
        &self.src
    }

    pub fn dst(&self) -> &Path {
        &self.dst
    }

    pub fn recursive(&self) -> bool {
        self.recursive
    }

    pub fn mode(&self) -> BucketMode {
        self.mode
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn only_ext(&self) -> &BTreeSet<String> {
        &self.only_ext
    }

    pub fn exclude_ext(&self) -> &BTreeSet<String> {
        &self.exclude_ext
    }

    /// Minimum size threshold in bytes; zero disables the size filter.
    pub fn min_size_bytes(&self) -> u64 {
        self.min_size_kb.saturating_mul(1024)
    }

    pub fn on_conflict(&self) -> ConflictPolicy {
        self.on_conflict
    }

    pub fn dedupe(&self) -> bool {
        self.dedupe
    }

    pub fn plan_out(&self) -> Option<&Path> {
        self.plan_out.as_deref()
    }

    pub fn plan_fsync(&self) -> bool {
        self.plan_fsync
    }
}

/// Ensures `src` and `dst` are neither the same directory nor nested.
///
/// Paths are compared after lenient resolution, so a destination that does
/// not exist yet is still compared through its canonical parent.
pub fn check_disjoint(src: &Path, dst: &Path) -> Result<(), ConfigError> {
    let src_resolved = resolve_lenient(src);
    let dst_resolved = resolve_lenient(dst);

    if src_resolved == dst_resolved {
        return Err(ConfigError::SameSourceAndDestination(dst.to_path_buf()));
    }
    if dst_resolved.starts_with(&src_resolved) {
        return Err(ConfigError::DestinationInsideSource {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
        });
    }
    if src_resolved.starts_with(&dst_resolved) {
        return Err(ConfigError::SourceInsideDestination {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
        });
    }
    Ok(())
}

/// Canonicalizes the deepest existing ancestor of `path` and re-appends the
/// components that do not exist yet.
pub fn resolve_lenient(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();

    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return missing
                .iter()
                .rev()
                .fold(canonical, |acc: PathBuf, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

/// Contents of a TOML defaults file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub sort: SortDefaults,
}

/// Default values for sort settings. Unset keys keep the built-in default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SortDefaults {
    pub recursive: Option<bool>,
    pub mode: Option<BucketMode>,
    pub action: Option<Action>,
    pub only_ext: Option<Vec<String>>,
    pub exclude_ext: Option<Vec<String>>,
    pub min_size_kb: Option<u64>,
    pub on_conflict: Option<ConflictPolicy>,
    pub dedupe: Option<bool>,
    pub plan_fsync: Option<bool>,
}

impl SortDefaults {
    /// Writes every value set in this file over `options`.
    pub fn apply(&self, options: &mut SortOptions) {
        if let Some(recursive) = self.recursive {
            options.recursive = recursive;
        }
        if let Some(mode) = self.mode {
            options.mode = mode;
        }
        if let Some(action) = self.action {
            options.action = action;
        }
        if let Some(only) = &self.only_ext {
            options.only_ext = only.iter().filter_map(|e| normalize_ext(e)).collect();
        }
        if let Some(exclude) = &self.exclude_ext {
            options.exclude_ext = exclude.iter().filter_map(|e| normalize_ext(e)).collect();
        }
        if let Some(min_size_kb) = self.min_size_kb {
            options.min_size_kb = min_size_kb;
        }
        if let Some(policy) = self.on_conflict {
            options.on_conflict = policy;
        }
        if let Some(dedupe) = self.dedupe {
            options.dedupe = dedupe;
        }
        if let Some(fsync) = self.plan_fsync {
            options.plan_fsync = fsync;
        }
    }
}

impl ConfigFile {
    /// Load the defaults file, falling back to built-in defaults.
    ///
    /// Lookup order:
    /// 1. `config_path`, if provided (must exist)
    /// 2. `.tidyplan.toml` in the current directory
    /// 3. `~/.config/tidyplan/config.toml`
    /// 4. Built-in defaults
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(CONFIG_FILE_NAME);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("tidyplan")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        Ok(Self::default())
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::FileInvalid {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_ext_list_normalizes() {
        let exts = parse_ext_list(" jpg, .PNG,,gif ,");
        let expected: BTreeSet<String> = ["gif", "jpg", "png"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(exts, expected);
        assert!(parse_ext_list("").is_empty());
    }

    #[test]
    fn test_validate_rejects_missing_source() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let options = SortOptions::new(temp_dir.path().join("missing"), temp_dir.path().join("out"));

        assert!(matches!(
            options.validate(),
            Err(ConfigError::SourceNotFound(_))
        ));
    }

    #[test]
    fn test_validate_rejects_same_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let options = SortOptions::new(temp_dir.path(), temp_dir.path());

        assert!(matches!(
            options.validate(),
            Err(ConfigError::SameSourceAndDestination(_))
        ));
    }

    #[test]
    fn test_validate_rejects_destination_inside_source() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let options = SortOptions::new(temp_dir.path(), temp_dir.path().join("sorted"));

        assert!(matches!(
            options.validate(),
            Err(ConfigError::DestinationInsideSource { .. })
        ));
        // Nothing was created on the way to the error
        assert!(!temp_dir.path().join("sorted").exists());
    }

    #[test]
    fn test_validate_rejects_source_inside_destination() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let src = temp_dir.path().join("inbox");
        fs::create_dir(&src).expect("Failed to create source");
        let options = SortOptions::new(&src, temp_dir.path());

        assert!(matches!(
            options.validate(),
            Err(ConfigError::SourceInsideDestination { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_journal_inside_source() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let src = temp_dir.path().join("inbox");
        fs::create_dir(&src).expect("Failed to create source");
        let mut options = SortOptions::new(&src, temp_dir.path().join("out"));
        options.plan_out = Some(src.join("plan.jsonl"));

        assert!(matches!(
            options.validate(),
            Err(ConfigError::JournalInsideSource(_))
        ));
    }

    #[test]
    fn test_dry_run_does_not_create_destination() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let src = temp_dir.path().join("inbox");
        fs::create_dir(&src).expect("Failed to create source");
        let dst = temp_dir.path().join("out");

        let mut options = SortOptions::new(&src, &dst);
        options.dry_run = true;
        options.validate().expect("Validation failed");
        assert!(!dst.exists());

        let options = SortOptions::new(&src, &dst);
        options.validate().expect("Validation failed");
        assert!(dst.is_dir());
    }

    #[test]
    fn test_min_size_threshold_in_bytes() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let src = temp_dir.path().join("inbox");
        fs::create_dir(&src).expect("Failed to create source");

        let mut options = SortOptions::new(&src, temp_dir.path().join("out"));
        options.min_size_kb = 5;
        let config = options.validate().expect("Validation failed");
        assert_eq!(config.min_size_bytes(), 5 * 1024);
    }

    #[test]
    fn test_defaults_file_overrides_builtin_values() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[sort]
recursive = true
mode = "by-date"
action = "copy"
only_ext = [".JPG", "png"]
on_conflict = "skip"
dedupe = true
"#,
        )
        .expect("Failed to write config");

        let file = ConfigFile::load(Some(&path)).expect("Failed to load config");
        let mut options = SortOptions::new("a", "b");
        file.sort.apply(&mut options);

        assert!(options.recursive);
        assert_eq!(options.mode, BucketMode::Date);
        assert_eq!(options.action, Action::Copy);
        assert_eq!(options.on_conflict, ConflictPolicy::Skip);
        assert!(options.dedupe);
        assert!(options.only_ext.contains("jpg"));
        assert!(options.only_ext.contains("png"));
        // Untouched keys keep defaults
        assert_eq!(options.min_size_kb, 0);
    }

    #[test]
    fn test_unknown_conflict_policy_is_rejected() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[sort]\non_conflict = \"merge\"\n").expect("Failed to write config");

        assert!(matches!(
            ConfigFile::load(Some(&path)),
            Err(ConfigError::FileInvalid { .. })
        ));
    }

    #[test]
    fn test_explicit_missing_config_is_an_error() {
        let result = ConfigFile::load(Some(Path::new("/non/existent/tidyplan.toml")));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }
}
