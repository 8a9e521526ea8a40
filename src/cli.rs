use clap::Parser;
use std::path::PathBuf;

#[cfg(feature = "ffmpeg")]
const CODEC_BACKEND: &str = "playa-ffmpeg 8.0 (static)";
#[cfg(not(feature = "ffmpeg"))]
const CODEC_BACKEND: &str = "none (headless)";

// Build version with backend info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Codec:  ", CODEC_BACKEND, "\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Kiosk player for time-segmented camera recordings
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Root of the segment storage
    #[arg(value_name = "DATA_PATH")]
    pub data_path: Option<PathBuf>,

    /// Catalog service base URI
    #[arg(value_name = "MASTER_URI")]
    pub master_uri: Option<String>,

    /// Recording day (YYYY-MM-DD), today when omitted
    #[arg(value_name = "DAY")]
    pub day: Option<String>,

    /// Player id (default: suffix of a `playerNN` hostname)
    #[arg(long = "player-id", value_name = "ID")]
    pub player_id: Option<String>,

    /// Control API port
    #[arg(short = 'p', long = "port", value_name = "PORT")]
    pub port: Option<u16>,

    /// Disable the control API
    #[arg(long = "no-api")]
    pub no_api: bool,

    /// Configuration file (overrides SEGPLAY_CONFIG and platform paths)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug logging to file (default: segplay.log in the data dir)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
}

impl Args {
    /// Apply command line overrides on top of a loaded config
    pub fn apply(&self, cfg: &mut crate::config::Config) {
        if let Some(p) = &self.data_path {
            cfg.data_path = p.clone();
        }
        if let Some(uri) = &self.master_uri {
            cfg.master_uri = uri.clone();
        }
        if let Some(day) = &self.day {
            cfg.day = Some(day.clone());
        }
        if let Some(id) = &self.player_id {
            cfg.player_id = Some(id.clone());
        }
        if let Some(port) = self.port {
            cfg.api_port = port;
        }
        if self.no_api {
            cfg.api_enabled = false;
        }
    }
}
