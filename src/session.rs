//! Session statistics and report rendering.
//!
//! `SessionStatistics` lives for the whole process. Each tick folds its
//! replays and `RunResult` in through `absorb`; the header/body renderers turn
//! the totals and the history into the text shown to the user and written to
//! rotated session logs.

use std::path::Path;

use chrono::{DateTime, Local};
use cli_table::{Cell, CellStruct, ColorChoice, Table};
use serde::Serialize;
use tracing::warn;

use crate::api::ReplayDetails;
use crate::replay::{Replay, ReplayRecord, UploadStatus};
use crate::util::{center_pad_string, display_replay_path, seconds_to_mm_ss};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DIVIDER_PAD_CHAR: char = '.';
const DIVIDER_WS_PAD: usize = 6;

/// Evidence of one tick: only replays that triggered a network call.
#[derive(Serialize, Debug, Clone)]
pub struct RunResult {
    pub timestamp: DateTime<Local>,
    pub records: Vec<ReplayRecord>,
}

impl RunResult {
    pub fn new(timestamp: DateTime<Local>) -> Self {
        Self { timestamp, records: Vec::new() }
    }

    pub fn push(&mut self, record: ReplayRecord) {
        self.records.push(record);
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// What optional rows the body renderer includes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions {
    pub print_viewer_url: bool,
    pub show_extended_results: bool,
}

#[derive(Serialize, Debug, Default, Clone)]
pub struct SessionStatistics {
    /// Total replays on the service that this session knows of.
    pub total_replays: usize,
    pub total_duplicates: usize,
    /// Known duplicates skipped in the latest tick.
    pub old_duplicates: usize,
    pub new_uploads: usize,
    /// Replays the service reported as already existing this session.
    pub new_duplicates: usize,
    pub run_results: Vec<RunResult>,
}

impl SessionStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one tick into the totals.
    pub fn absorb(&mut self, replays: &[Replay], run_result: RunResult) {
        let count = |status: UploadStatus| replays.iter().filter(|r| r.status() == status).count();
        self.new_uploads += count(UploadStatus::Success);
        self.old_duplicates = replays
            .iter()
            .filter(|r| r.is_known_duplicate() && r.status() == UploadStatus::NotAttempted)
            .count();
        self.new_duplicates += count(UploadStatus::Duplicate);

        self.total_duplicates = self.old_duplicates + self.new_duplicates;
        self.total_replays = self.total_duplicates + self.new_uploads;

        if !run_result.is_empty() {
            self.run_results.push(run_result);
        }
    }

    pub fn render_header(&self, replay_path: &Path, now: DateTime<Local>) -> String {
        let rows = vec![
            row("Last synced on", now.format(TIMESTAMP_FORMAT)),
            row("Replay path", display_replay_path(replay_path)),
            row("New uploads", self.new_uploads),
            row("New duplicates", self.new_duplicates),
            row("Total replays", self.total_replays),
        ];
        render_table(rows)
    }

    /// One block per historical run: centered timestamp divider, then a table.
    pub fn render_body(&self, options: ReportOptions) -> String {
        let mut runs = String::new();
        for run in &self.run_results {
            let mut rows: Vec<Vec<CellStruct>> = Vec::new();
            for record in &run.records {
                record_rows(record, options, &mut rows);
            }
            let table = render_table(rows);
            let report_length = table.lines().next().map(|l| l.chars().count()).unwrap_or(0);
            runs.push_str(&center_pad_string(
                &run.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                report_length,
                DIVIDER_WS_PAD,
                DIVIDER_PAD_CHAR,
            ));
            runs.push_str(&table);
            if !table.ends_with('\n') {
                runs.push('\n');
            }
        }
        runs
    }

    /// Header and body together; what gets persisted on abnormal exit.
    pub fn render_report(&self, replay_path: &Path, now: DateTime<Local>, options: ReportOptions) -> String {
        let mut text = self.render_header(replay_path, now);
        if !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&self.render_body(options));
        text
    }
}

fn row(label: &str, value: impl std::fmt::Display) -> Vec<CellStruct> {
    vec![label.cell(), value.to_string().cell()]
}

fn result_suffix(result: UploadStatus) -> &'static str {
    match result {
        UploadStatus::Success => " (new upload)",
        UploadStatus::Duplicate => " (already uploaded)",
        _ => "",
    }
}

fn record_rows(record: &ReplayRecord, options: ReportOptions, rows: &mut Vec<Vec<CellStruct>>) {
    rows.push(row("Filename", &record.basename));
    rows.push(row("Replay ID", format!("{}{}", record.id, result_suffix(record.result))));
    if options.print_viewer_url && !record.id.is_empty() {
        rows.push(row("Watch URL", &record.watch_url));
    }
    if options.show_extended_results
        && let Some(ReplayDetails::Ok(summary)) = &record.details
    {
        rows.push(row("Title", summary.title.as_deref().unwrap_or("Unknown title")));
        rows.push(row("Played on", summary.date.as_deref().unwrap_or("Unknown date")));
        let map = summary
            .map_name
            .as_deref()
            .or(summary.map_code.as_deref())
            .unwrap_or("Unknown map");
        rows.push(row("Map", map));
        let mut duration = seconds_to_mm_ss(summary.duration);
        if summary.overtime {
            duration.push_str(&format!(" (On OT: {})", seconds_to_mm_ss(summary.overtime_seconds)));
        }
        rows.push(row("Duration", duration));
    }
}

fn render_table(rows: Vec<Vec<CellStruct>>) -> String {
    match rows.table().color_choice(ColorChoice::Never).display() {
        Ok(d) => d.to_string(),
        Err(e) => {
            warn!("cannot render report table: {}", e);
            String::new()
        }
    }
}
