//! A single replay file considered for upload during one run.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::api::{ReplayDetails, Transport, UploadClient, UploadOutcome, Visibility};
use crate::error::SyncError;

/// Outcome of a replay within one run. Leaves `NotAttempted` at most once.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum UploadStatus {
    #[default]
    NotAttempted,
    Success,
    Duplicate,
    Fail,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::NotAttempted => "not-attempted",
            UploadStatus::Success => "success",
            UploadStatus::Duplicate => "duplicate",
            UploadStatus::Fail => "fail",
        }
    }

    /// Whether the service now holds this replay, i.e. it belongs in the store.
    pub fn is_known_remotely(&self) -> bool {
        matches!(self, UploadStatus::Success | UploadStatus::Duplicate)
    }
}

impl From<&UploadOutcome> for UploadStatus {
    fn from(o: &UploadOutcome) -> Self {
        match o {
            UploadOutcome::Success { .. } => UploadStatus::Success,
            UploadOutcome::Duplicate { .. } => UploadStatus::Duplicate,
            UploadOutcome::Fail { .. } => UploadStatus::Fail,
        }
    }
}

/// Per-file artifact for replays that triggered a network call.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ReplayRecord {
    pub basename: String,
    pub result: UploadStatus,
    pub id: String,
    pub url: String,
    pub watch_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ReplayDetails>,
}

#[derive(Serialize, Debug, Clone)]
pub struct Replay {
    path: PathBuf,
    basename: String,
    duplicate: bool,
    visibility: Visibility,
    status: UploadStatus,
    remote_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    upload_response: Option<UploadOutcome>,
}

impl Replay {
    /// `known` is the duplicate store snapshot taken for this run.
    pub fn new<P: AsRef<Path>>(path: P, known: &BTreeSet<String>, visibility: Visibility) -> Self {
        let path = path.as_ref().to_path_buf();
        let basename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let duplicate = known.contains(&basename);
        Self {
            path,
            basename,
            duplicate,
            visibility,
            status: UploadStatus::NotAttempted,
            remote_id: String::new(),
            upload_response: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn basename(&self) -> &str {
        &self.basename
    }

    pub fn is_known_duplicate(&self) -> bool {
        self.duplicate
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn status(&self) -> UploadStatus {
        self.status
    }

    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }

    /// Upload unless this replay is a known duplicate.
    ///
    /// Returns `None` without touching the network for known duplicates and
    /// for replays that were already attempted. `extended` additionally
    /// fetches replay metadata when an id was obtained.
    pub fn upload<T: Transport>(
        &mut self,
        client: &UploadClient<T>,
        extended: bool,
    ) -> Result<Option<ReplayRecord>, SyncError> {
        if self.duplicate {
            debug!("skipping known duplicate: {}", self.basename);
            return Ok(None);
        }
        if self.status != UploadStatus::NotAttempted {
            return Ok(None);
        }

        let outcome = client.submit(&self.path, self.visibility)?;
        self.status = UploadStatus::from(&outcome);
        self.remote_id = outcome.remote_id().unwrap_or_default().to_string();
        self.upload_response = Some(outcome);

        let url = client.endpoints().replay_page(&self.remote_id);
        let details = if extended && !self.remote_id.is_empty() {
            Some(client.get_replay(&self.remote_id))
        } else {
            None
        };
        Ok(Some(ReplayRecord {
            basename: self.basename.clone(),
            result: self.status,
            id: self.remote_id.clone(),
            watch_url: format!("{}#watch", url),
            url,
            details,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basename_is_the_dedup_key() {
        let known: BTreeSet<String> = ["game1.replay".to_string()].into_iter().collect();
        let a = Replay::new("/demos/a/game1.replay", &known, Visibility::Private);
        let b = Replay::new("/other/place/game1.replay", &known, Visibility::Public);
        let c = Replay::new("/demos/game2.replay", &known, Visibility::Private);
        assert!(a.is_known_duplicate());
        assert!(b.is_known_duplicate());
        assert!(!c.is_known_duplicate());
        assert_eq!(c.basename(), "game2.replay");
        assert_eq!(c.status(), UploadStatus::NotAttempted);
        assert!(c.remote_id().is_empty());
    }

    #[test]
    fn snapshot_is_not_reevaluated() {
        let mut known = BTreeSet::new();
        let r = Replay::new("/demos/late.replay", &known, Visibility::Private);
        known.insert("late.replay".to_string());
        assert!(!r.is_known_duplicate());
    }

    #[test]
    fn attributes_serialize_for_check_mode() {
        let r = Replay::new("/demos/x.replay", &BTreeSet::new(), Visibility::Unlisted);
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["basename"], "x.replay");
        assert_eq!(v["duplicate"], false);
        assert_eq!(v["visibility"], "unlisted");
        assert_eq!(v["status"], "not-attempted");
    }
}
