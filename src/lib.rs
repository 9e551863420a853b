pub mod api;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod parse;
pub mod presenter;
pub mod replay;
pub mod rotate;
pub mod run;
pub mod session;
pub mod util;

pub use api::{UploadClient, UploadOutcome, Visibility};
pub use config::Config;
pub use duplicates::DuplicateStore;
pub use error::SyncError;
pub use run::{Runner, Sleeper};
pub use session::SessionStatistics;
