use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::api::Visibility;

const EXAMPLES: &str = "\
example usage:
    Use .env from the bcsync directory for API_TOKEN and REPLAY_PATH and sync every 15 minutes:
        bcsync -w \"15 m\"
    Use another .env file and just sync a folder of replays once:
        bcsync -e ~/rl/.env
    Pass API_TOKEN and REPLAY_PATH as args, print a link to the 3D replay viewer and sync every hour:
        bcsync -t 12345ABCDE -r ~/rl-demos -p -w \"1 h\"
    Pass API_TOKEN and REPLAY_PATH through env and sync every 2 minutes:
        API_TOKEN=12345ABCDE REPLAY_PATH=~/rl-demos bcsync -w 120";

#[derive(Parser, Debug, Clone)]
#[clap(name = "bcsync", author, version, about = "Upload replays to ballchasing.com.", long_about = None)]
#[clap(after_help = EXAMPLES)]
pub struct Cli {
    #[clap(short = 'c', long = "check", help = "Only print replay info, upload nothing")]
    pub check: bool,
    #[clap(
        short = 'e',
        long = "env",
        value_name = "FILE",
        help = ".env file to read values from. Other arguments override the values from the file"
    )]
    pub env: Option<PathBuf>,
    #[clap(
        short = 'p',
        long = "print-viewer-url",
        help = "Print URL to the ballchasing.com 3D replay viewer in session logs"
    )]
    pub print_viewer_url: bool,
    #[clap(short = 'r', long = "replay-path", value_name = "PATH", help = "Replay file or folder to upload")]
    pub replay_path: Option<String>,
    #[clap(short = 't', long = "token", help = "ballchasing.com API token. Can also be passed as env API_TOKEN")]
    pub token: Option<String>,
    #[clap(short = 'v', long = "verbosity", action = ArgAction::Count, help = "Verbosity (-v, -vv, ..)")]
    pub verbosity: u8,
    #[clap(
        short = 'w',
        long = "watch",
        default_value = "0",
        help = "Sync again every N seconds. Or use '1 s', '1 m', '1 h'. 0 syncs once"
    )]
    pub watch: String,
    #[clap(short = 'x', long = "extended", help = "Fetch replay metadata for each upload and show it in reports")]
    pub extended: bool,
    #[clap(long = "visibility", value_enum, default_value_t = Visibility::Private, help = "Visibility of uploaded replays")]
    pub visibility: Visibility,
}
