//! Rotated session logs: `<id>.log`, `<id>.log1` … `<id>.log<max>`, with the
//! last used index kept in `<id>.rotate`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::SyncError;

pub const SESSION_LOG_IDENTIFIER: &str = "session";
pub const DEFAULT_MAX_SESSION_LOGFILES: u32 = 10;

#[derive(Debug, Clone)]
pub struct LogRotator {
    dir: PathBuf,
    max_files: u32,
}

impl LogRotator {
    pub fn new<P: AsRef<Path>>(dir: P, max_files: u32) -> Self {
        Self { dir: dir.as_ref().to_path_buf(), max_files }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn index_file(&self, identifier: &str) -> PathBuf {
        self.dir.join(format!("{}.rotate", identifier))
    }

    fn log_file(&self, identifier: &str, index: u32) -> PathBuf {
        if index == 0 {
            self.dir.join(format!("{}.log", identifier))
        } else {
            self.dir.join(format!("{}.log{}", identifier, index))
        }
    }

    /// Index the next `persist` will write to. Absent index file means 0.
    pub fn next_index(&self, identifier: &str) -> u32 {
        let path = self.index_file(identifier);
        let next = match fs::read_to_string(&path) {
            Ok(s) => match s.trim().parse::<u32>() {
                Ok(last) => last.saturating_add(1),
                Err(e) => {
                    warn!("ignoring unreadable rotation index in {}: {}", path.display(), e);
                    0
                }
            },
            Err(_) => 0,
        };
        if next > self.max_files { 0 } else { next }
    }

    /// Write `text` to the next log file in the ring and advance the index.
    /// Returns the path written.
    pub fn persist(&self, identifier: &str, text: &str) -> Result<PathBuf, SyncError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| SyncError::LogWrite(self.dir.clone(), e.to_string()))?;

        let index = self.next_index(identifier);
        let log_file = self.log_file(identifier, index);
        let mut body = text.trim_end().to_string();
        body.push('\n');
        fs::write(&log_file, &body).map_err(|e| SyncError::LogWrite(log_file.clone(), e.to_string()))?;

        let index_file = self.index_file(identifier);
        fs::write(&index_file, index.to_string())
            .map_err(|e| SyncError::LogWrite(index_file.clone(), e.to_string()))?;

        info!("wrote {} bytes to {}", body.len(), log_file.display());
        Ok(log_file)
    }
}
