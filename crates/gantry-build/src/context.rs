use std::path::{Path, PathBuf};

use gantry_core::BuildConfig;
use ignore::WalkBuilder;
use sha2::{Digest, Sha256};
use tempfile::TempDir;

/// Include/exclude path rules for the build context.
///
/// A rule covers a path when the path equals it or lies beneath it
/// (component-wise, so `src` does not cover `src2/`). An empty include list
/// covers the whole tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextRules {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl ContextRules {
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self { include, exclude }
    }

    pub fn from_config(config: &BuildConfig) -> Self {
        Self::new(config.include.clone(), config.exclude.clone())
    }

    /// Whether a file at `relative` belongs in the snapshot.
    pub fn matches(&self, relative: &Path) -> bool {
        let included =
            self.include.is_empty() || self.include.iter().any(|r| covers(r, relative));
        included && !self.exclude.iter().any(|r| covers(r, relative))
    }

    /// Whether the walk needs to descend into directory `relative`.
    fn may_contain(&self, relative: &Path) -> bool {
        if self.exclude.iter().any(|r| covers(r, relative)) {
            return false;
        }
        self.include.is_empty()
            || self
                .include
                .iter()
                .any(|r| covers(r, relative) || rule_path(r).starts_with(relative))
    }
}

fn rule_path(rule: &str) -> &Path {
    Path::new(rule.trim_start_matches("./").trim_end_matches('/'))
}

fn covers(rule: &str, path: &Path) -> bool {
    let rule = rule_path(rule);
    rule.as_os_str().is_empty() || rule == Path::new(".") || path.starts_with(rule)
}

/// Immutable snapshot of the build inputs.
///
/// Files are copied into a private temp directory at collection time; the
/// directory is removed when the context is dropped.
#[derive(Debug)]
pub struct BuildContext {
    staging: TempDir,
    files: Vec<PathBuf>,
    fingerprint: String,
}

impl BuildContext {
    /// Snapshot every file under `root` matched by `rules`.
    pub fn collect(root: &Path, rules: &ContextRules) -> Result<Self, ContextError> {
        std::fs::read_dir(root).map_err(|e| ContextError::RootUnreadable {
            path: root.to_path_buf(),
            source: e,
        })?;

        let staging = tempfile::Builder::new()
            .prefix("gantry-context-")
            .tempdir()
            .map_err(|e| ContextError::Staging { source: e })?;

        let mut selected = Vec::new();
        let walk_root = root.to_path_buf();
        let filter_rules = rules.clone();
        let walker = WalkBuilder::new(root)
            .standard_filters(false)
            .hidden(false)
            .follow_links(false)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                match entry.path().strip_prefix(&walk_root) {
                    Ok(rel) if is_dir && !rel.as_os_str().is_empty() => {
                        filter_rules.may_contain(rel)
                    }
                    _ => true,
                }
            })
            .build();

        for result in walker {
            let entry = result.map_err(|e| ContextError::Walk {
                path: root.to_path_buf(),
                source: e,
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            if rules.matches(relative) {
                selected.push(relative.to_path_buf());
            }
        }
        selected.sort();

        let mut hasher = Sha256::new();
        for relative in &selected {
            let src = root.join(relative);
            let bytes = std::fs::read(&src).map_err(|e| ContextError::ReadFile {
                path: src.clone(),
                source: e,
            })?;

            hasher.update(relative.to_string_lossy().replace('\\', "/").as_bytes());
            hasher.update([0u8]);
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(&bytes);

            let dst = staging.path().join(relative);
            if let Some(parent) = dst.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ContextError::CopyFile {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
            std::fs::write(&dst, &bytes).map_err(|e| ContextError::CopyFile {
                path: dst.clone(),
                source: e,
            })?;
        }

        let fingerprint = hex::encode(hasher.finalize());
        tracing::debug!(
            root = %root.display(),
            files = selected.len(),
            fingerprint = %fingerprint,
            staging = %staging.path().display(),
            "build context collected"
        );

        Ok(Self {
            staging,
            files: selected,
            fingerprint,
        })
    }

    /// Directory holding the snapshot.
    pub fn path(&self) -> &Path {
        self.staging.path()
    }

    /// Snapshot contents, relative and sorted.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn contains(&self, relative: &Path) -> bool {
        self.files.binary_search_by(|f| f.as_path().cmp(relative)).is_ok()
    }

    /// SHA-256 (hex) over the sorted `(path, contents)` pairs.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Remove the snapshot now, reporting cleanup failures.
    pub fn release(self) -> Result<(), ContextError> {
        let path = self.staging.path().to_path_buf();
        self.staging
            .close()
            .map_err(|e| ContextError::Cleanup { path, source: e })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("build context root {path} is not readable")]
    RootUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to walk {path}")]
    Walk { path: PathBuf, source: ignore::Error },
    #[error("failed to create build context staging directory")]
    Staging { source: std::io::Error },
    #[error("failed to read {path}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to copy into build context at {path}")]
    CopyFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to remove build context at {path}")]
    Cleanup {
        path: PathBuf,
        source: std::io::Error,
    },
}
