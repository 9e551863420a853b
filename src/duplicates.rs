//! Known duplicates store.
//!
//! A newline-delimited file of replay basenames that were already uploaded
//! (or that the service reported as already existing). Appends are cheap and
//! may repeat; `compact` rewrites the file with one line per basename.

use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::SyncError;

pub const DUPLICATES_FILE_NAME: &str = "known_duplicates.db";

#[derive(Debug, Clone)]
pub struct DuplicateStore {
    path: PathBuf,
}

impl DuplicateStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of every basename in the store. A missing or unreadable file
    /// means nothing is known yet.
    pub fn load_known_duplicates(&self) -> BTreeSet<String> {
        match fs::read_to_string(&self.path) {
            Ok(s) => parse_lines(&s),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("cannot read {}: {}; assuming no known duplicates", self.path.display(), e);
                }
                BTreeSet::new()
            }
        }
    }

    /// Append `basename` as a new line. Returns the bytes written.
    pub fn record_duplicate(&self, basename: &str) -> Result<usize, SyncError> {
        self.ensure_parent()?;
        let line = format!("{}\n", basename.trim());
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.write_error(e))?;
        f.write_all(line.as_bytes()).map_err(|e| self.write_error(e))?;
        debug!("recorded {} in {}", basename, self.path.display());
        Ok(line.len())
    }

    /// Rewrite the store with one line per unique basename, sorted.
    /// Returns the bytes written; a store that does not exist yet writes nothing.
    pub fn compact(&self) -> Result<usize, SyncError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no duplicates to compact, {} does not exist", self.path.display());
                return Ok(0);
            }
            Err(e) => return Err(self.write_error(e)),
        };
        let uniques = parse_lines(&raw);
        let mut text = String::new();
        for u in &uniques {
            text.push_str(u);
            text.push('\n');
        }
        fs::write(&self.path, &text).map_err(|e| self.write_error(e))?;
        debug!(
            "wrote {} unique rows ({} bytes) to {}",
            uniques.len(),
            text.len(),
            self.path.display()
        );
        Ok(text.len())
    }

    fn ensure_parent(&self) -> Result<(), SyncError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| self.write_error(e))?;
        }
        Ok(())
    }

    fn write_error(&self, e: std::io::Error) -> SyncError {
        SyncError::DuplicateStore(self.path.clone(), e.to_string())
    }
}

fn parse_lines(s: &str) -> BTreeSet<String> {
    s.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect()
}
