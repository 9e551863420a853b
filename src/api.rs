//! ballchasing.com API client.
//!
//! `UploadClient` owns the status-code-to-outcome mapping. The wire itself is
//! behind the `Transport` trait so tests can script responses; `UreqTransport`
//! is the real implementation.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::SyncError;

pub const WEB_URL: &str = "https://ballchasing.com";

/// Endpoints of the remote service.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Endpoints {
    pub web_url: String,
    pub api_url: String,
    pub upload_url: String,
    pub replay_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::for_web_root(WEB_URL)
    }
}

impl Endpoints {
    pub fn for_web_root(web_url: &str) -> Self {
        let web_url = web_url.trim_end_matches('/').to_string();
        let api_url = format!("{}/api", web_url);
        Self {
            upload_url: format!("{}/v2/upload", api_url),
            replay_url: format!("{}/replays", api_url),
            api_url,
            web_url,
        }
    }

    /// Viewer page of an uploaded replay.
    pub fn replay_page(&self, id: &str) -> String {
        format!("{}/replay/{}", self.web_url, id)
    }
}

/// Upload privacy setting.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Public,
    Unlisted,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Public => "public",
            Visibility::Unlisted => "unlisted",
        }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw response as seen by the client: status plus body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Connection-level failure: no status was received.
#[derive(Debug, Clone)]
pub struct TransportError(pub String);

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for TransportError {}

/// Minimal request/response contract the client needs from HTTP.
/// Non-2xx statuses are responses, not errors.
pub trait Transport {
    fn get(&self, url: &str) -> Result<HttpResponse, TransportError>;
    fn post_file(
        &self,
        url: &str,
        file_name: &str,
        body: &mut dyn Read,
    ) -> Result<HttpResponse, TransportError>;
}

/// `ureq`-backed transport. Every request carries the API token.
pub struct UreqTransport {
    agent: ureq::Agent,
    token: String,
}

impl UreqTransport {
    pub fn new(token: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(15))
            .timeout(Duration::from_secs(120))
            .user_agent(concat!("bcsync/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent, token: token.to_string() }
    }

    fn finish(result: Result<ureq::Response, ureq::Error>) -> Result<HttpResponse, TransportError> {
        match result {
            Ok(resp) | Err(ureq::Error::Status(_, resp)) => {
                let status = resp.status();
                let body = resp.into_string().unwrap_or_default();
                Ok(HttpResponse { status, body })
            }
            Err(ureq::Error::Transport(t)) => Err(TransportError(t.to_string())),
        }
    }
}

impl Transport for UreqTransport {
    fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        Self::finish(self.agent.get(url).set("Authorization", &self.token).call())
    }

    fn post_file(
        &self,
        url: &str,
        file_name: &str,
        body: &mut dyn Read,
    ) -> Result<HttpResponse, TransportError> {
        let boundary = format!(
            "----bcsync{:x}",
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        );
        let head = format!(
            "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n",
            boundary,
            file_name.replace('"', "_")
        );
        let tail = format!("\r\n--{}--\r\n", boundary);
        let multipart = head.as_bytes().chain(body).chain(tail.as_bytes());
        Self::finish(
            self.agent
                .post(url)
                .set("Authorization", &self.token)
                .set("Content-Type", &format!("multipart/form-data; boundary={}", boundary))
                .send(multipart),
        )
    }
}

#[derive(Deserialize)]
struct UploadBody {
    #[serde(default)]
    id: String,
    #[serde(default)]
    location: String,
}

/// Classified result of one upload attempt.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum UploadOutcome {
    /// 201: new upload.
    Success { id: String, location: String },
    /// 409: the service already has this replay and echoes its id.
    Duplicate { id: String, location: String },
    /// Anything else. `status` is `None` when the connection itself failed.
    Fail { status: Option<u16>, body: String },
}

impl UploadOutcome {
    pub fn remote_id(&self) -> Option<&str> {
        match self {
            UploadOutcome::Success { id, .. } | UploadOutcome::Duplicate { id, .. } => Some(id),
            UploadOutcome::Fail { .. } => None,
        }
    }

    /// Map a response to an outcome. 201/409 without an id are failures.
    pub fn classify(resp: HttpResponse) -> Self {
        let parsed = |body: &str| {
            serde_json::from_str::<UploadBody>(body).ok().filter(|b| !b.id.trim().is_empty())
        };
        match resp.status {
            201 => match parsed(&resp.body) {
                Some(b) => UploadOutcome::Success { id: b.id, location: b.location },
                None => UploadOutcome::Fail { status: Some(201), body: resp.body },
            },
            409 => match parsed(&resp.body) {
                Some(b) => UploadOutcome::Duplicate { id: b.id, location: b.location },
                None => UploadOutcome::Fail { status: Some(409), body: resp.body },
            },
            status => UploadOutcome::Fail { status: Some(status), body: resp.body },
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Uploader {
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub profile_url: String,
}

/// Full metadata of a processed replay.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ReplaySummary {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub uploader: Uploader,
    #[serde(default)]
    pub visibility: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub map_code: Option<String>,
    #[serde(default)]
    pub map_name: Option<String>,
    #[serde(default)]
    pub match_type: Option<String>,
    /// Game date, not upload date.
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub overtime: bool,
    #[serde(default)]
    pub overtime_seconds: u64,
}

/// Replay metadata, discriminated by the service's `status` field.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ReplayDetails {
    Ok(ReplaySummary),
    Pending {
        id: String,
        #[serde(default)]
        created: String,
        #[serde(default)]
        link: String,
    },
    Failed {
        id: String,
        #[serde(default)]
        created: String,
        #[serde(default)]
        link: String,
    },
}

impl ReplayDetails {
    fn failed(id: &str) -> Self {
        ReplayDetails::Failed { id: id.to_string(), created: String::new(), link: String::new() }
    }
}

pub struct UploadClient<T: Transport> {
    transport: T,
    endpoints: Endpoints,
}

impl<T: Transport> UploadClient<T> {
    pub fn new(transport: T, endpoints: Endpoints) -> Self {
        Self { transport, endpoints }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Ping the API root. Connection failures count as unhealthy.
    pub fn health_check(&self) -> bool {
        let url = format!("{}/", self.endpoints.api_url);
        match self.transport.get(&url) {
            Ok(resp) if resp.status == 200 => {
                debug!("API health check OK");
                true
            }
            Ok(resp) => {
                warn!("API health check failed: {}", resp.status);
                false
            }
            Err(e) => {
                warn!("API health check failed: {}", e);
                false
            }
        }
    }

    /// Upload the replay at `path`. Exactly one request is sent.
    pub fn submit(&self, path: &Path, visibility: Visibility) -> Result<UploadOutcome, SyncError> {
        let mut file = File::open(path).map_err(|e| SyncError::local_file(path, e))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "replay".to_string());
        let url = format!("{}?visibility={}", self.endpoints.upload_url, visibility);

        let outcome = match self.transport.post_file(&url, &file_name, &mut file) {
            Ok(resp) => UploadOutcome::classify(resp),
            Err(e) => UploadOutcome::Fail { status: None, body: e.0 },
        };
        match &outcome {
            UploadOutcome::Success { id, .. } => info!("Upload successful. Replay ID: {}", id),
            UploadOutcome::Duplicate { id, .. } => info!("Duplicate replay found. Replay ID: {}", id),
            UploadOutcome::Fail { status, body } => {
                warn!("Upload of {} failed ({:?}): {}", file_name, status, body)
            }
        }
        Ok(outcome)
    }

    /// Fetch replay metadata. Non-200 or unparsable bodies yield `Failed`.
    pub fn get_replay(&self, id: &str) -> ReplayDetails {
        let url = format!("{}/{}", self.endpoints.replay_url, id);
        match self.transport.get(&url) {
            Ok(resp) if resp.status == 200 => serde_json::from_str(&resp.body).unwrap_or_else(|e| {
                warn!("cannot parse replay {}: {}", id, e);
                ReplayDetails::failed(id)
            }),
            Ok(resp) => {
                debug!("replay {} lookup returned {}", id, resp.status);
                ReplayDetails::failed(id)
            }
            Err(e) => {
                warn!("replay {} lookup failed: {}", id, e);
                ReplayDetails::failed(id)
            }
        }
    }
}
