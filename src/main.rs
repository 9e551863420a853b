use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use tracing::{debug, error, info, warn};

use bcsync::api::{UploadClient, UreqTransport};
use bcsync::cli::Cli;
use bcsync::config::{Config, ensure_app_dir, read_env_file};
use bcsync::discovery::DirectorySource;
use bcsync::duplicates::DuplicateStore;
use bcsync::error::SyncError;
use bcsync::logging;
use bcsync::presenter::{Presenter, TerminalPresenter};
use bcsync::run::{Runner, ShutdownSleeper, persist_session_report};
use bcsync::session::SessionStatistics;

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red(), e);
            1
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let app_dir = ensure_app_dir()?;
    let env_path = cli.env.clone().unwrap_or_else(|| app_dir.join(".env"));
    let file_env = read_env_file(&env_path);

    let config = match Config::resolve(&cli, &file_env, |k| std::env::var(k).ok(), &app_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(e.exit_code());
        }
    };

    let _guard = logging::init(config.verbosity, &config.log_dir)?;
    info!("bcsync {} starting, replay path {}", env!("CARGO_PKG_VERSION"), config.replay_path.display());

    let sleeper = ShutdownSleeper::default();
    let flag = sleeper.flag();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("cannot install Ctrl-C handler")?;

    let client = UploadClient::new(UreqTransport::new(&config.api_token), config.endpoints.clone());
    let store = DuplicateStore::new(&config.duplicates_file);
    let source = DirectorySource::new(&config.replay_path);
    let mut session = SessionStatistics::new();

    let mut presenter = TerminalPresenter::new();
    presenter.build()?;
    presenter.run(|p| {
        if config.verbosity > 1 {
            let dump = serde_json::to_string(&config)?;
            debug!("config={}", dump);
            p.print(&format!("config={}", dump));
            p.print(&format!("env file={}", env_path.display()));
        }

        let mut runner = Runner::new(&config, &client, &store, &source, &sleeper);
        let outcome = runner.run(&mut session, p);
        let Err(e) = outcome else {
            return Ok(0);
        };

        if e.persists_session() {
            match persist_session_report(&config, &session) {
                Ok(path) => info!("session report saved to {}", path.display()),
                Err(write_err) => {
                    warn!("{}", write_err);
                    p.print(&write_err.to_string());
                }
            }
        }
        if matches!(e, SyncError::Interrupted) {
            info!("interrupted, exiting");
        } else {
            error!("{}", e);
            p.print(&format!("{} {}", "error:".red(), e));
        }
        Ok(e.exit_code())
    })
}
