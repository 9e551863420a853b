use std::collections::VecDeque;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bcsync::api::{HttpResponse, Transport, TransportError, UploadClient};
use bcsync::config::Config;
use bcsync::discovery::{DirectorySource, ReplaySource};
use bcsync::duplicates::DuplicateStore;
use bcsync::error::SyncError;
use bcsync::presenter::CapturePresenter;
use bcsync::replay::UploadStatus;
use bcsync::run::{HEALTH_RETRY, RunState, Runner, Sleeper};
use bcsync::session::SessionStatistics;
use tempfile::TempDir;

// Scripted HTTP: health checks and uploads pop from queues, every call is logged.
// An empty health queue is healthy; an empty upload queue answers 201 with an
// id derived from the file name.
#[derive(Default)]
struct ScriptedTransport {
    health: Mutex<VecDeque<u16>>,
    uploads: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    replay_body: Mutex<Option<String>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    fn with_health(self, statuses: &[u16]) -> Self {
        self.health.lock().unwrap().extend(statuses.iter().copied());
        self
    }

    fn with_upload(self, status: u16, body: &str) -> Self {
        self.uploads
            .lock()
            .unwrap()
            .push_back(Ok(HttpResponse { status, body: body.to_string() }));
        self
    }

    fn with_connection_failure(self) -> Self {
        self.uploads.lock().unwrap().push_back(Err(TransportError("connection refused".into())));
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn posts(&self) -> Vec<String> {
        self.calls().into_iter().filter(|c| c.starts_with("POST")).collect()
    }
}

impl Transport for ScriptedTransport {
    fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        self.calls.lock().unwrap().push(format!("GET {}", url));
        if url.ends_with("/api/") {
            let status = self.health.lock().unwrap().pop_front().unwrap_or(200);
            return Ok(HttpResponse { status, body: String::new() });
        }
        match self.replay_body.lock().unwrap().clone() {
            Some(body) => Ok(HttpResponse { status: 200, body }),
            None => Ok(HttpResponse { status: 404, body: String::new() }),
        }
    }

    fn post_file(&self, url: &str, file_name: &str, body: &mut dyn Read) -> Result<HttpResponse, TransportError> {
        let mut bytes = Vec::new();
        body.read_to_end(&mut bytes).map_err(|e| TransportError(e.to_string()))?;
        self.calls.lock().unwrap().push(format!("POST {} {} {}", url, file_name, bytes.len()));
        match self.uploads.lock().unwrap().pop_front() {
            Some(scripted) => scripted,
            None => Ok(HttpResponse {
                status: 201,
                body: format!(r#"{{"id":"id-{}","location":"l"}}"#, file_name),
            }),
        }
    }
}

// Records every wait instead of sleeping. `interrupt_on` turns the nth wait
// (1-based) into an interrupt.
#[derive(Default)]
struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
    interrupt_on: Option<usize>,
    flag: AtomicBool,
}

impl RecordingSleeper {
    fn interrupting_on(n: usize) -> Self {
        Self { interrupt_on: Some(n), ..Default::default() }
    }

    fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> Result<(), SyncError> {
        let mut waits = self.waits.lock().unwrap();
        waits.push(duration);
        if self.interrupt_on == Some(waits.len()) {
            self.flag.store(true, Ordering::SeqCst);
        }
        if self.interrupted() { Err(SyncError::Interrupted) } else { Ok(()) }
    }

    fn interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

struct Fixture {
    _tmp: TempDir,
    demos: PathBuf,
    config: Config,
}

impl Fixture {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let demos = tmp.path().join("demos");
        fs::create_dir_all(&demos).unwrap();
        let mut config = Config::with_working_directory(tmp.path().join("work"));
        config.api_token = "token".into();
        config.replay_path = demos.clone();
        Self { _tmp: tmp, demos, config }
    }

    fn replay(&self, rel: &str) -> PathBuf {
        let p = self.demos.join(rel);
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&p, format!("replay bytes of {}", rel)).unwrap();
        p
    }

    fn store(&self) -> DuplicateStore {
        DuplicateStore::new(&self.config.duplicates_file)
    }

    fn stored_lines(&self) -> Vec<String> {
        fs::read_to_string(&self.config.duplicates_file)
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

struct Outcome {
    result: Result<(), SyncError>,
    session: SessionStatistics,
    presenter: CapturePresenter,
    state: RunState,
}

fn run_with(
    config: &Config,
    client: &UploadClient<ScriptedTransport>,
    source: &dyn ReplaySource,
    sleeper: &RecordingSleeper,
) -> Outcome {
    let store = DuplicateStore::new(&config.duplicates_file);
    let mut session = SessionStatistics::new();
    let mut presenter = CapturePresenter::new();
    let mut runner = Runner::new(config, client, &store, source, sleeper);
    let result = runner.run(&mut session, &mut presenter);
    Outcome { result, session, presenter, state: runner.state() }
}

// Cells of the last table row labelled `label`, e.g. ["New uploads", "1"].
fn last_row(presenter: &CapturePresenter, label: &str) -> Vec<String> {
    let text = presenter.text();
    let line = text.lines().filter(|l| l.contains(label)).last().unwrap_or_default();
    line.split('|').map(str::trim).filter(|c| !c.is_empty()).map(str::to_string).collect()
}

fn client(transport: ScriptedTransport, config: &Config) -> UploadClient<ScriptedTransport> {
    UploadClient::new(transport, config.endpoints.clone())
}

#[test]
fn fresh_upload_is_recorded_and_reported() {
    let fx = Fixture::new();
    fx.replay("game1.replay");
    let client = client(
        ScriptedTransport::default().with_upload(201, r#"{"id":"abc123","location":"https://x/abc123"}"#),
        &fx.config,
    );
    let sleeper = RecordingSleeper::default();

    let out = run_with(&fx.config, &client, &DirectorySource::new(&fx.demos), &sleeper);
    out.result.unwrap();

    assert_eq!(out.state, RunState::Terminated);
    assert_eq!(fx.stored_lines(), ["game1.replay"]);
    assert_eq!(out.session.new_uploads, 1);
    assert_eq!(out.session.total_replays, 1);
    assert_eq!(out.session.run_results.len(), 1);
    let record = &out.session.run_results[0].records[0];
    assert_eq!(record.result, UploadStatus::Success);
    assert_eq!(record.id, "abc123");
    assert_eq!(record.url, "https://ballchasing.com/replay/abc123");
    assert!(out.presenter.text().contains("abc123 (new upload)"));
    assert!(sleeper.waits().is_empty());
    // the header shown last carries this tick's totals
    assert_eq!(last_row(&out.presenter, "New uploads"), ["New uploads", "1"]);
    assert_eq!(last_row(&out.presenter, "Total replays"), ["Total replays", "1"]);

    let posts = client.transport().posts();
    assert_eq!(posts.len(), 1);
    assert!(posts[0].starts_with("POST https://ballchasing.com/api/v2/upload?visibility=private game1.replay"));
}

#[test]
fn known_duplicate_never_hits_the_network() {
    let fx = Fixture::new();
    fx.replay("game1.replay");
    fx.store().record_duplicate("game1.replay").unwrap();
    let client = client(ScriptedTransport::default(), &fx.config);

    let out = run_with(&fx.config, &client, &DirectorySource::new(&fx.demos), &RecordingSleeper::default());
    out.result.unwrap();

    assert!(client.transport().posts().is_empty());
    assert_eq!(client.transport().calls(), ["GET https://ballchasing.com/api/"]);
    assert_eq!(out.session.old_duplicates, 1);
    assert_eq!(out.session.total_duplicates, 1);
    assert_eq!(out.session.total_replays, 1);
    assert!(out.session.run_results.is_empty());
}

#[test]
fn remote_conflict_is_stored_as_duplicate() {
    let fx = Fixture::new();
    fx.replay("game2.replay");
    let client = client(
        ScriptedTransport::default().with_upload(409, r#"{"id":"xyz789","location":"l","error":"duplicate replay"}"#),
        &fx.config,
    );

    let out = run_with(&fx.config, &client, &DirectorySource::new(&fx.demos), &RecordingSleeper::default());
    out.result.unwrap();

    assert_eq!(fx.stored_lines(), ["game2.replay"]);
    assert_eq!(out.session.new_duplicates, 1);
    assert_eq!(out.session.new_uploads, 0);
    assert!(out.presenter.text().contains("xyz789 (already uploaded)"));
}

#[test]
fn health_outage_waits_twice_before_any_upload() {
    let fx = Fixture::new();
    fx.replay("game1.replay");
    let client = client(ScriptedTransport::default().with_health(&[503, 503, 200]), &fx.config);
    let sleeper = RecordingSleeper::default();

    let out = run_with(&fx.config, &client, &DirectorySource::new(&fx.demos), &sleeper);
    out.result.unwrap();

    assert_eq!(sleeper.waits(), [HEALTH_RETRY, HEALTH_RETRY]);
    assert_eq!(HEALTH_RETRY, Duration::from_secs(30));
    let calls = client.transport().calls();
    let first_post = calls.iter().position(|c| c.starts_with("POST")).unwrap();
    let health_checks = calls[..first_post].iter().filter(|c| c.ends_with("/api/")).count();
    assert_eq!(health_checks, 3);
    assert_eq!(out.presenter.text().matches("API health check failed.").count(), 2);
}

#[test]
fn interrupt_during_outage_stops_without_uploading() {
    let fx = Fixture::new();
    fx.replay("game1.replay");
    let client = client(ScriptedTransport::default().with_health(&[503, 503, 503]), &fx.config);
    let sleeper = RecordingSleeper::interrupting_on(2);

    let out = run_with(&fx.config, &client, &DirectorySource::new(&fx.demos), &sleeper);

    assert!(matches!(out.result, Err(SyncError::Interrupted)));
    assert_eq!(sleeper.waits().len(), 2);
    assert!(client.transport().posts().is_empty());
}

#[test]
fn same_basename_twice_in_one_tick_is_uploaded_twice() {
    let fx = Fixture::new();
    fx.replay("season1/game.replay");
    fx.replay("season2/game.replay");
    let client = client(ScriptedTransport::default(), &fx.config);

    let out = run_with(&fx.config, &client, &DirectorySource::new(&fx.demos), &RecordingSleeper::default());
    out.result.unwrap();

    assert_eq!(client.transport().posts().len(), 2);
    assert_eq!(out.session.new_uploads, 2);
    // compaction folds the two appends into one line
    assert_eq!(fx.stored_lines(), ["game.replay"]);
}

#[test]
fn failed_upload_is_not_stored_and_retried_next_tick() {
    let mut fx = Fixture::new();
    fx.config.watch = 60;
    fx.replay("game3.replay");
    let client = client(
        ScriptedTransport::default()
            .with_upload(500, "internal error")
            .with_upload(201, r#"{"id":"later","location":"l"}"#),
        &fx.config,
    );
    let sleeper = RecordingSleeper::interrupting_on(2);

    let out = run_with(&fx.config, &client, &DirectorySource::new(&fx.demos), &sleeper);

    assert!(matches!(out.result, Err(SyncError::Interrupted)));
    assert_eq!(sleeper.waits(), [Duration::from_secs(60), Duration::from_secs(60)]);
    assert_eq!(client.transport().posts().len(), 2);
    assert_eq!(out.session.run_results.len(), 2);
    let first = &out.session.run_results[0].records[0];
    assert_eq!(first.result, UploadStatus::Fail);
    assert!(first.id.is_empty());
    assert_eq!(out.session.run_results[1].records[0].id, "later");
    assert_eq!(fx.stored_lines(), ["game3.replay"]);
}

#[test]
fn connection_failure_during_submit_is_a_fail_outcome() {
    let fx = Fixture::new();
    fx.replay("game1.replay");
    let client = client(ScriptedTransport::default().with_connection_failure(), &fx.config);

    let out = run_with(&fx.config, &client, &DirectorySource::new(&fx.demos), &RecordingSleeper::default());
    out.result.unwrap();

    assert!(fx.stored_lines().is_empty());
    assert_eq!(out.session.run_results[0].records[0].result, UploadStatus::Fail);
    assert_eq!(out.session.total_replays, 0);
}

#[test]
fn statistics_are_conserved_across_outcomes() {
    let fx = Fixture::new();
    for name in ["c.replay", "f.replay", "k.replay", "n.replay"] {
        fx.replay(name);
    }
    fx.store().record_duplicate("k.replay").unwrap();
    // discovery order is by file name: c, f, (k skipped), n
    let client = client(
        ScriptedTransport::default()
            .with_upload(409, r#"{"id":"c1","location":"l"}"#)
            .with_upload(500, "boom")
            .with_upload(201, r#"{"id":"n1","location":"l"}"#),
        &fx.config,
    );

    let out = run_with(&fx.config, &client, &DirectorySource::new(&fx.demos), &RecordingSleeper::default());
    out.result.unwrap();

    let s = &out.session;
    assert_eq!((s.old_duplicates, s.new_duplicates, s.new_uploads), (1, 1, 1));
    assert_eq!(s.total_duplicates, s.old_duplicates + s.new_duplicates);
    assert_eq!(s.total_replays, s.total_duplicates + s.new_uploads);
    assert_eq!(s.run_results[0].records.len(), 3);
    assert_eq!(fx.stored_lines(), ["c.replay", "k.replay", "n.replay"]);
}

#[test]
fn check_only_touches_nothing() {
    let mut fx = Fixture::new();
    fx.config.check_only = true;
    fx.config.watch = 60;
    fx.replay("a.replay");
    fx.replay("b.replay");
    let client = client(ScriptedTransport::default(), &fx.config);
    let sleeper = RecordingSleeper::default();

    let out = run_with(&fx.config, &client, &DirectorySource::new(&fx.demos), &sleeper);
    out.result.unwrap();

    assert_eq!(out.state, RunState::Terminated);
    assert!(client.transport().calls().is_empty());
    assert!(sleeper.waits().is_empty());
    assert!(!fx.config.duplicates_file.exists());
    assert_eq!(out.session.total_replays, 0);
    assert!(out.session.run_results.is_empty());
    let text = out.presenter.text();
    assert_eq!(text.matches("---------8<---------").count(), 2);
    assert!(text.contains("\"basename\":\"b.replay\""));
}

// Lists paths as given, including ones that do not exist.
struct FixedSource(Vec<PathBuf>);

impl ReplaySource for FixedSource {
    fn discover(&self) -> Result<Vec<PathBuf>, SyncError> {
        Ok(self.0.clone())
    }
}

#[test]
fn vanished_file_is_reported_and_the_tick_continues() {
    let fx = Fixture::new();
    let gone = fx.demos.join("gone.replay");
    let present = fx.replay("present.replay");
    let client = client(ScriptedTransport::default(), &fx.config);
    let source = FixedSource(vec![gone, present]);

    let out = run_with(&fx.config, &client, &source, &RecordingSleeper::default());
    out.result.unwrap();

    assert_eq!(client.transport().posts().len(), 1);
    assert_eq!(fx.stored_lines(), ["present.replay"]);
    assert!(out.presenter.text().contains("Skipped:"));
    assert!(out.presenter.text().contains("gone.replay"));
}

#[test]
fn extended_results_fetch_metadata_for_uploaded_replays() {
    let mut fx = Fixture::new();
    fx.config.show_extended_results = true;
    fx.config.print_viewer_url = true;
    fx.replay("game1.replay");
    let transport = ScriptedTransport::default().with_upload(201, r#"{"id":"abc123","location":"l"}"#);
    *transport.replay_body.lock().unwrap() = Some(
        r#"{"status":"ok","id":"abc123","title":"Ranked Doubles","map_name":"Mannfield","duration":312}"#.into(),
    );
    let client = client(transport, &fx.config);

    let out = run_with(&fx.config, &client, &DirectorySource::new(&fx.demos), &RecordingSleeper::default());
    out.result.unwrap();

    assert!(client.transport().calls().contains(&"GET https://ballchasing.com/api/replays/abc123".to_string()));
    let text = out.presenter.text();
    assert!(text.contains("Ranked Doubles"));
    assert!(text.contains("Mannfield"));
    assert!(text.contains("05:12"));
    assert!(text.contains("https://ballchasing.com/replay/abc123#watch"));
}

#[test]
fn missing_replay_path_is_a_discovery_error() {
    let fx = Fixture::new();
    let client = client(ScriptedTransport::default(), &fx.config);
    let source = DirectorySource::new(Path::new(&fx.demos).join("nope"));

    let out = run_with(&fx.config, &client, &source, &RecordingSleeper::default());

    assert!(matches!(out.result, Err(SyncError::Discovery(_))));
    assert_eq!(out.result.unwrap_err().exit_code(), 1);
}

#[test]
fn replay_path_vanishing_mid_watch_does_not_end_the_run() {
    let mut fx = Fixture::new();
    fx.config.watch = 60;
    fx.replay("game1.replay");
    let client = client(ScriptedTransport::default(), &fx.config);
    let source = DirectorySource::new(&fx.demos);

    // first tick uploads, then the folder goes away before the second tick
    struct Unmounting<'a> {
        inner: &'a DirectorySource,
        demos: &'a Path,
        calls: Mutex<usize>,
    }
    impl ReplaySource for Unmounting<'_> {
        fn discover(&self) -> Result<Vec<PathBuf>, SyncError> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls == 2 {
                fs::remove_dir_all(self.demos).unwrap();
            }
            self.inner.discover()
        }
    }
    let unmounting = Unmounting { inner: &source, demos: &fx.demos, calls: Mutex::new(0) };
    let sleeper = RecordingSleeper::interrupting_on(2);

    let out = run_with(&fx.config, &client, &unmounting, &sleeper);

    assert!(matches!(out.result, Err(SyncError::Interrupted)));
    assert_eq!(sleeper.waits().len(), 2);
    assert_eq!(client.transport().posts().len(), 1);
    assert_eq!(out.session.new_uploads, 1);
    assert!(out.presenter.text().contains("Skipped:"));
    assert!(out.presenter.text().contains("replay discovery failed"));
}
