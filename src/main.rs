use segplay::app::App;
use segplay::catalog::{Catalog, CatalogClient};
use segplay::cli::Args;
use segplay::config::{self, Config};
use segplay::core::codec::Codec;
use segplay::core::segment::{SegmentSource, SegmentStore};
use segplay::core::workers::Services;
use segplay::sink::{DisplaySink, NullSink};

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use std::sync::Arc;

#[cfg(feature = "ffmpeg")]
fn codec() -> Result<Arc<dyn Codec>> {
    Ok(Arc::new(segplay::ffmpeg::FfmpegCodec::new()))
}

#[cfg(not(feature = "ffmpeg"))]
fn codec() -> Result<Arc<dyn Codec>> {
    anyhow::bail!("segplay was built without a codec backend (enable the `ffmpeg` feature)")
}

fn init_logging(args: &Args) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt.clone().unwrap_or_else(config::log_path);
        if let Some(dir) = log_path.parent() {
            std::fs::create_dir_all(dir).ok();
        }
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .filter_module("reqwest", log::LevelFilter::Info)
            .filter_module("tiny_http", log::LevelFilter::Info)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging (respects RUST_LOG if set)
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .filter_module("reqwest", log::LevelFilter::Info)
            .filter_module("tiny_http", log::LevelFilter::Info)
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let config_path = config::config_path(args.config.clone());
    let mut cfg = Config::load(&config_path)?;
    args.apply(&mut cfg);

    info!("segplay {} starting", env!("CARGO_PKG_VERSION"));
    debug!("Command-line args: {:?}", args);
    info!("Config path: {}", config_path.display());
    info!("Data path: {}, master: {}", cfg.data_path.display(), cfg.master_uri);

    let catalog: Arc<dyn Catalog> = Arc::new(
        CatalogClient::new(&cfg.master_uri, cfg.timeouts.into()).context("Failed to create catalog client")?,
    );
    let segments: Arc<dyn SegmentSource> = Arc::new(SegmentStore::new(cfg.data_path.clone()));
    let sink: Arc<dyn DisplaySink> = Arc::new(NullSink::new());
    let services = Services {
        catalog,
        codec: codec()?,
        segments,
        sink,
    };

    let mut app = App::new(&cfg, services);
    if cfg.api_enabled {
        app.start_api(cfg.api_port)?;
    }
    app.run()
}
