//! Run orchestrator.
//!
//! One tick is: health gate, discovery, sequential uploads, report. `Runner::run`
//! repeats ticks on the watch interval until the interval is zero, check-only
//! mode ends the run, or the `Sleeper` observes an interrupt.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Local;
use owo_colors::OwoColorize;
use tracing::{debug, info, warn};

use crate::api::{Transport, UploadClient};
use crate::config::Config;
use crate::discovery::ReplaySource;
use crate::duplicates::DuplicateStore;
use crate::error::SyncError;
use crate::presenter::Presenter;
use crate::replay::{Replay, UploadStatus};
use crate::rotate::LogRotator;
use crate::session::{RunResult, SessionStatistics};
use crate::util::truncate_string;

/// Wait between failed health checks.
pub const HEALTH_RETRY: Duration = Duration::from_secs(30);
const STATUS_LINE_LENGTH: usize = 26;
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Blocking waits plus the interrupt flag they observe.
pub trait Sleeper {
    /// Wait for `duration`. Returns `SyncError::Interrupted` as soon as an
    /// interrupt is seen.
    fn sleep(&self, duration: Duration) -> Result<(), SyncError>;
    fn interrupted(&self) -> bool;
}

/// Real clock, woken early by a flag the Ctrl-C handler sets.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSleeper {
    flag: Arc<AtomicBool>,
}

impl ShutdownSleeper {
    pub fn new(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }

    pub fn flag(&self) -> Arc<AtomicBool> {
        self.flag.clone()
    }
}

impl Sleeper for ShutdownSleeper {
    fn sleep(&self, duration: Duration) -> Result<(), SyncError> {
        let start = Instant::now();
        loop {
            if self.interrupted() {
                return Err(SyncError::Interrupted);
            }
            let elapsed = start.elapsed();
            if elapsed >= duration {
                return Ok(());
            }
            std::thread::sleep(SLEEP_SLICE.min(duration - elapsed));
        }
    }

    fn interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    HealthChecking,
    Discovering,
    Uploading,
    Reporting,
    Terminated,
}

/// What happened in one tick, for callers and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub health_waits: usize,
    pub discovered: usize,
    /// Replays that triggered an upload request.
    pub attempted: usize,
    pub local_failures: usize,
}

pub struct Runner<'a, T: Transport> {
    config: &'a Config,
    client: &'a UploadClient<T>,
    store: &'a DuplicateStore,
    source: &'a dyn ReplaySource,
    sleeper: &'a dyn Sleeper,
    state: RunState,
    completed_ticks: usize,
}

impl<'a, T: Transport> Runner<'a, T> {
    pub fn new(
        config: &'a Config,
        client: &'a UploadClient<T>,
        store: &'a DuplicateStore,
        source: &'a dyn ReplaySource,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self { config, client, store, source, sleeper, state: RunState::Idle, completed_ticks: 0 }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Tick until the run is over. Everything the session learned stays in
    /// `session` even when this returns an error.
    pub fn run<P: Presenter>(
        &mut self,
        session: &mut SessionStatistics,
        presenter: &mut P,
    ) -> Result<(), SyncError> {
        loop {
            let report = self.tick(session, presenter)?;
            debug!("tick finished: {:?}", report);
            if self.state == RunState::Terminated {
                return Ok(());
            }
            if let Some(interval) = self.config.watch_interval() {
                debug!("next sync in {}s", interval.as_secs());
                self.sleeper.sleep(interval)?;
            }
        }
    }

    /// One pass from the health gate to the report.
    pub fn tick<P: Presenter>(
        &mut self,
        session: &mut SessionStatistics,
        presenter: &mut P,
    ) -> Result<TickReport, SyncError> {
        let mut report = TickReport::default();
        self.state = RunState::Idle;
        presenter.clear_lines(0);

        if !self.config.check_only {
            self.state = RunState::HealthChecking;
            report.health_waits = self.wait_for_health(presenter)?;
        }

        self.state = RunState::Discovering;
        // A replay path that disappears after the first tick (an unmounted
        // drive) yields no replays instead of ending a watch run.
        let (paths, unavailable) = match self.source.discover() {
            Ok(paths) => (paths, None),
            Err(e @ SyncError::Discovery(_)) if self.completed_ticks > 0 => {
                warn!("{}; trying again next tick", e);
                (Vec::new(), Some(e))
            }
            Err(e) => return Err(e),
        };
        let known = self.store.load_known_duplicates();
        let mut replays: Vec<Replay> =
            paths.iter().map(|p| Replay::new(p, &known, self.config.visibility)).collect();
        report.discovered = replays.len();
        info!("discovered {} replays, {} known duplicates", replays.len(), known.len());

        if self.config.check_only {
            for replay in &replays {
                print_replay_attributes(replay, presenter);
            }
            self.state = RunState::Terminated;
            return Ok(report);
        }

        presenter.print(&session.render_header(&self.config.replay_path, Local::now()));

        self.state = RunState::Uploading;
        let mut run_result = RunResult::new(Local::now());
        let uploaded = self.upload_all(&mut replays, &mut run_result, &mut report, presenter);

        self.state = RunState::Reporting;
        session.absorb(&replays, run_result);
        uploaded?;

        presenter.clear_lines(0);
        presenter.print(&session.render_header(&self.config.replay_path, Local::now()));
        presenter.print(&session.render_body(self.config.report_options()));
        if let Some(e) = unavailable {
            presenter.print(&format!("{} {}", "Skipped:".yellow(), e));
        }
        let written = self.store.compact()?;
        debug!("wrote {} bytes to duplicates file {}", written, self.store.path().display());

        self.completed_ticks += 1;
        self.state = if self.config.watch == 0 { RunState::Terminated } else { RunState::Idle };
        Ok(report)
    }

    /// Returns how many times it had to wait.
    fn wait_for_health<P: Presenter>(&self, presenter: &mut P) -> Result<usize, SyncError> {
        let mut waits = 0;
        loop {
            if self.sleeper.interrupted() {
                return Err(SyncError::Interrupted);
            }
            if self.client.health_check() {
                return Ok(waits);
            }
            presenter.print(&format!(
                "{} Retrying after {} seconds.",
                "API health check failed.".red(),
                HEALTH_RETRY.as_secs()
            ));
            waits += 1;
            self.sleeper.sleep(HEALTH_RETRY)?;
        }
    }

    fn upload_all<P: Presenter>(
        &self,
        replays: &mut [Replay],
        run_result: &mut RunResult,
        report: &mut TickReport,
        presenter: &mut P,
    ) -> Result<(), SyncError> {
        let verbosity = self.config.verbosity;
        for replay in replays.iter_mut() {
            if self.sleeper.interrupted() {
                return Err(SyncError::Interrupted);
            }
            if !replay.is_known_duplicate() && verbosity == 0 {
                let line = format!("Out: {}", replay.basename());
                presenter.status(&truncate_string(&line, STATUS_LINE_LENGTH, "..."));
            }

            let record = match replay.upload(self.client, self.config.show_extended_results) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e @ SyncError::LocalFile(..)) => {
                    warn!("{}", e);
                    presenter.print(&format!("{} {}", "Skipped:".yellow(), e));
                    report.local_failures += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            report.attempted += 1;

            // Re-uploads of this basename are prevented from the next tick on,
            // not within this one.
            if record.result.is_known_remotely() {
                self.store.record_duplicate(&record.basename)?;
            }
            if verbosity > 0 {
                let line = truncate_string(
                    &format!("In: {} {}", record.result.as_str(), record.basename),
                    STATUS_LINE_LENGTH,
                    "...",
                );
                match record.result {
                    UploadStatus::Fail => presenter.print(&line.red().to_string()),
                    _ => presenter.print(&line.green().to_string()),
                }
            }
            run_result.push(record);
        }
        Ok(())
    }
}

/// Write the session report to the next rotated log. Used when a run ends by
/// interrupt or error.
pub fn persist_session_report(config: &Config, session: &SessionStatistics) -> Result<PathBuf, SyncError> {
    let text = session.render_report(&config.replay_path, Local::now(), config.report_options());
    LogRotator::new(&config.log_dir, config.max_session_logfiles).persist(&config.session_log_identifier, &text)
}

/// Dump one replay between scissor lines.
fn print_replay_attributes<P: Presenter>(replay: &Replay, presenter: &mut P) -> String {
    let attributes = serde_json::to_string(replay).unwrap_or_else(|e| format!("{:?}: {}", replay, e));
    let printed = format!("{:-^20}\n{}\n{:-^20}", "8<", attributes, ">8");
    presenter.print(&printed);
    printed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Visibility;
    use crate::presenter::CapturePresenter;
    use std::collections::BTreeSet;

    #[test]
    fn attributes_are_wrapped_in_scissor_lines() {
        let replay = Replay::new("/demos/x.replay", &BTreeSet::new(), Visibility::Private);
        let mut p = CapturePresenter::new();
        let printed = print_replay_attributes(&replay, &mut p);
        let lines: Vec<&str> = printed.lines().collect();
        assert_eq!(lines[0], "---------8<---------");
        assert_eq!(lines[2], "--------->8---------");
        assert!(lines[1].contains("\"basename\":\"x.replay\""));
    }

    #[test]
    fn shutdown_sleeper_wakes_on_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let sleeper = ShutdownSleeper::new(flag.clone());
        assert!(sleeper.sleep(Duration::from_millis(5)).is_ok());
        flag.store(true, Ordering::SeqCst);
        let started = Instant::now();
        assert!(matches!(sleeper.sleep(Duration::from_secs(60)), Err(SyncError::Interrupted)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
