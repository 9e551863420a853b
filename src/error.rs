use std::path::{Path, PathBuf};

/// Repository-wide structured errors for the sync pipeline.
///
/// Remote upload failures are not errors: they are reported as
/// `UploadOutcome::Fail` data. Everything here is either local (filesystem,
/// configuration) or a reason to stop the run.
#[derive(Debug, Clone)]
pub enum SyncError {
    /// Replay vanished or became unreadable before it could be streamed.
    LocalFile(PathBuf, String),
    /// Could not append to or rewrite the known duplicates file.
    DuplicateStore(PathBuf, String),
    /// Could not write a rotated session log or its index file.
    LogWrite(PathBuf, String),
    /// Replay discovery failed (e.g. the replay path does not exist).
    Discovery(String),
    /// API token or replay path missing after all overrides were applied.
    MissingCredentials,
    /// `--watch` value that is neither `N` nor `N s|m|h`.
    InvalidWatch(String),
    /// Interrupt observed between uploads or during a wait.
    Interrupted,
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use SyncError::*;
        match self {
            LocalFile(p, msg) => write!(f, "cannot read replay {}: {}", display_path(p), msg),
            DuplicateStore(p, msg) => {
                write!(f, "cannot write known duplicates to {}: {}", display_path(p), msg)
            }
            LogWrite(p, msg) => write!(f, "cannot write session log {}: {}", display_path(p), msg),
            Discovery(msg) => write!(f, "replay discovery failed: {}", msg),
            MissingCredentials => write!(
                f,
                "API_TOKEN or REPLAY_PATH is not set. Did you forget to create an .env file \
                 in the bcsync directory or point to one with --env?"
            ),
            InvalidWatch(s) => write!(
                f,
                "invalid --watch value '{}': give it as '0' (seconds) or '0 <s|m|h>'",
                s
            ),
            Interrupted => write!(f, "interrupted"),
        }
    }
}

impl std::error::Error for SyncError {}

impl SyncError {
    /// Process exit code for this error: 2 for usage problems, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        use SyncError::*;
        match self {
            MissingCredentials | InvalidWatch(_) => 2,
            Interrupted => 0,
            _ => 1,
        }
    }

    /// Whether the session report should be persisted when the run ends with
    /// this error. Usage errors happen before any session evidence exists.
    pub fn persists_session(&self) -> bool {
        !matches!(self, SyncError::MissingCredentials | SyncError::InvalidWatch(_))
    }

    pub(crate) fn local_file(p: &Path, e: impl std::fmt::Display) -> Self {
        SyncError::LocalFile(p.to_path_buf(), e.to_string())
    }
}

fn display_path(p: &Path) -> String {
    let s = p.to_string_lossy().to_string();
    if s.contains('\\') { s.replace('\\', "/") } else { s }
}
