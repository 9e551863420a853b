use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::warn;

use crate::api::{Endpoints, Visibility, WEB_URL};
use crate::cli::Cli;
use crate::duplicates::DUPLICATES_FILE_NAME;
use crate::error::SyncError;
use crate::parse::parse_watch;
use crate::rotate::{DEFAULT_MAX_SESSION_LOGFILES, SESSION_LOG_IDENTIFIER};
use crate::session::ReportOptions;

pub const ENV_API_TOKEN: &str = "API_TOKEN";
pub const ENV_REPLAY_PATH: &str = "REPLAY_PATH";
/// Optional override of the service root, e.g. for a local mock.
pub const ENV_WEB_URL: &str = "BALLCHASING_URL";

/// Resolved settings. Read-only once built.
#[derive(Serialize, Debug, Clone)]
pub struct Config {
    pub verbosity: u8,
    #[serde(skip_serializing)]
    pub api_token: String,
    pub replay_path: PathBuf,
    /// Seconds between runs; 0 runs once.
    pub watch: u64,
    pub check_only: bool,
    pub print_viewer_url: bool,
    pub show_extended_results: bool,
    pub visibility: Visibility,
    pub working_directory: PathBuf,
    pub duplicates_file: PathBuf,
    pub log_dir: PathBuf,
    pub session_log_identifier: String,
    pub max_session_logfiles: u32,
    pub endpoints: Endpoints,
}

impl Config {
    /// Settings rooted at `working_directory` with everything else defaulted.
    pub fn with_working_directory<P: AsRef<Path>>(working_directory: P) -> Self {
        let working_directory = working_directory.as_ref().to_path_buf();
        Self {
            verbosity: 0,
            api_token: String::new(),
            replay_path: PathBuf::new(),
            watch: 0,
            check_only: false,
            print_viewer_url: false,
            show_extended_results: false,
            visibility: Visibility::Private,
            duplicates_file: working_directory.join(DUPLICATES_FILE_NAME),
            log_dir: working_directory.join("log"),
            working_directory,
            session_log_identifier: SESSION_LOG_IDENTIFIER.to_string(),
            max_session_logfiles: DEFAULT_MAX_SESSION_LOGFILES,
            endpoints: Endpoints::default(),
        }
    }

    /// Build the configuration. `API_TOKEN` and `REPLAY_PATH` are taken from,
    /// right winning over left: env file -> process environment -> CLI flags.
    pub fn resolve<F>(
        cli: &Cli,
        file_env: &HashMap<String, String>,
        process_env: F,
        working_directory: &Path,
    ) -> Result<Self, SyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |key: &str, flag: &Option<String>| {
            apply_overrides(file_env.get(key).cloned(), [process_env(key), flag.clone()])
                .filter(|v| !v.trim().is_empty())
        };
        let api_token = pick(ENV_API_TOKEN, &cli.token);
        let replay_path = pick(ENV_REPLAY_PATH, &cli.replay_path);
        let (Some(api_token), Some(replay_path)) = (api_token, replay_path) else {
            return Err(SyncError::MissingCredentials);
        };

        let mut cfg = Self::with_working_directory(working_directory);
        cfg.verbosity = cli.verbosity;
        cfg.api_token = api_token.trim().to_string();
        cfg.replay_path = PathBuf::from(replay_path.trim());
        cfg.watch = parse_watch(&cli.watch)?;
        cfg.check_only = cli.check;
        cfg.print_viewer_url = cli.print_viewer_url;
        cfg.show_extended_results = cli.extended;
        cfg.visibility = cli.visibility;
        if let Some(web) = apply_overrides(file_env.get(ENV_WEB_URL).cloned(), [process_env(ENV_WEB_URL)]) {
            cfg.endpoints = Endpoints::for_web_root(web.trim());
        } else {
            cfg.endpoints = Endpoints::for_web_root(WEB_URL);
        }
        Ok(cfg)
    }

    pub fn watch_interval(&self) -> Option<Duration> {
        (self.watch > 0).then(|| Duration::from_secs(self.watch))
    }

    pub fn report_options(&self) -> ReportOptions {
        ReportOptions {
            print_viewer_url: self.print_viewer_url,
            show_extended_results: self.show_extended_results,
        }
    }
}

/// Take `suggested`, replaced in order by every override that is `Some`.
pub fn apply_overrides<T, I>(suggested: Option<T>, overrides: I) -> Option<T>
where
    I: IntoIterator<Item = Option<T>>,
{
    overrides.into_iter().fold(suggested, |acc, o| o.or(acc))
}

/// `KEY=VALUE` pairs of an env file. A missing file is empty; malformed lines
/// are skipped.
pub fn read_env_file(path: &Path) -> HashMap<String, String> {
    let mut env = HashMap::new();
    let iter = match dotenvy::from_path_iter(path) {
        Ok(it) => it,
        Err(_) => return env,
    };
    for item in iter {
        match item {
            Ok((k, v)) => {
                env.insert(k, v);
            }
            Err(e) => warn!("skipping line in {}: {}", path.display(), e),
        }
    }
    env
}

/// `~/.bcsync`, created on first use. Holds the default .env, the known
/// duplicates file and logs.
pub fn ensure_app_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("cannot find user's home dir")?;
    let dir = home.join(".".to_owned() + env!("CARGO_PKG_NAME"));
    if !dir.exists() {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("cannot create {}", dir.display()))?;
    }
    Ok(dir)
}
