use anyhow::{Context, Result};
use log::{debug, warn};
use path_clean::PathClean;
use rand::Rng;
use rand::distr::Alphanumeric;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::common::MAX_STAGED_NAME_LENGTH;
use crate::utils::{file_name_string, now_millis};

static UNSAFE_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());

/// Strip anything from a client-supplied name that could escape the staging
/// root or upset the filesystem.
pub fn sanitize_file_name(original: &str) -> String {
    let cleaned = UNSAFE_NAME_CHARS.replace_all(original, "_");
    let trimmed = cleaned.trim_start_matches('.');
    let name: String = trimmed.chars().take(MAX_STAGED_NAME_LENGTH).collect();
    if name.is_empty() {
        return "upload".to_string();
    }
    name
}

/// The directory holding every transient and persisted artifact. All disk
/// paths the pipeline touches are allocated through it.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create staging directory {:?}", root))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reserve a collision-free path for an incoming upload.
    pub fn allocate(&self, original_name: &str) -> PathBuf {
        let unique_id: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        self.root.join(format!(
            "{}-{}-{}",
            now_millis(),
            unique_id,
            sanitize_file_name(original_name)
        ))
    }

    /// Wrap an on-disk file in a guard that removes it unless kept.
    pub fn adopt(&self, path: impl Into<PathBuf>) -> StagedFile {
        StagedFile {
            path: path.into(),
            armed: true,
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        path.clean().starts_with(self.root.clean())
    }

    /// Remove a store-recorded artifact. Paths outside the root are refused.
    pub fn release_recorded(&self, recorded: &str) {
        let path = Path::new(recorded);
        if !self.contains(path) {
            warn!("Refusing to remove {:?}: outside the staging root", path);
            return;
        }
        release_path(path);
    }
}

/// A staged artifact. Dropping it removes the file, so early returns and
/// cancelled requests cannot leak disk space. `keep` hands the path over
/// once the artifact is recorded.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    armed: bool,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        file_name_string(&self.path)
    }

    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }

    pub fn release(mut self) {
        self.armed = false;
        release_path(&self.path);
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.armed {
            release_path(&self.path);
        }
    }
}

fn release_path(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed staged file {:?}", path),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!("Failed to remove staged file {:?}: {}", path, err),
    }
}
