use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::SyncError;

pub const REPLAY_EXTENSION: &str = ".replay";

/// Supplies candidate replay paths for a run.
pub trait ReplaySource {
    fn discover(&self) -> Result<Vec<PathBuf>, SyncError>;
}

/// Replays under a directory (recursively), or a single replay file.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    ending: String,
}

impl DirectorySource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self::with_ending(root, REPLAY_EXTENSION)
    }

    pub fn with_ending<P: AsRef<Path>>(root: P, ending: &str) -> Self {
        Self { root: root.as_ref().to_path_buf(), ending: ending.to_string() }
    }

    fn matches(&self, p: &Path) -> bool {
        p.to_string_lossy().ends_with(&self.ending)
    }
}

impl ReplaySource for DirectorySource {
    fn discover(&self) -> Result<Vec<PathBuf>, SyncError> {
        if self.matches(&self.root) && self.root.is_file() {
            return Ok(vec![self.root.clone()]);
        }
        if !self.root.is_dir() {
            return Err(SyncError::Discovery(format!(
                "replay path does not exist or is not a directory: {}",
                self.root.display()
            )));
        }
        let found: Vec<PathBuf> = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && self.matches(e.path()))
            .map(|e| e.into_path())
            .collect();
        debug!("found {} replays under {}", found.len(), self.root.display());
        Ok(found)
    }
}
