//! Seeding collector: binary entrypoint.
//!
//! `seeding-collector [collect|analyze|status [video_id]]` (default `collect`).
//! Config comes from `$SEEDING_CONFIG_PATH`, `config/collector.toml`, or defaults.

use std::sync::Arc;

use anyhow::{bail, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use seeding_collector::config::{load_config_default, load_video_urls, CollectorConfig};
use seeding_collector::output::OutputStore;
use seeding_collector::pipeline::Pipeline;
use seeding_collector::report::{dataset_status, find_video, write_analysis};
use seeding_collector::source::http::HttpSource;
use seeding_collector::telemetry::install_exporter_from_env;

/// Compact logs by default; `LOG_FORMAT=json` for structured output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("seeding_collector=info,warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; real env vars win
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = load_config_default()?;
    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        None | Some("collect") => collect(cfg).await,
        Some("analyze") => {
            let store = OutputStore::open(&cfg.output_dir)?;
            let report = write_analysis(&store)?;
            println!("{report}");
            Ok(())
        }
        Some("status") => {
            let store = OutputStore::open(&cfg.output_dir)?;
            match args.next() {
                Some(video_id) => match find_video(&store, &video_id)? {
                    Some(v) => println!("{v}"),
                    None => println!("Video {video_id} has NOT been crawled"),
                },
                None => println!("{}", dataset_status(&store, &cfg.progress_path())?),
            }
            Ok(())
        }
        Some(other) => bail!("unknown command `{other}` (expected collect, analyze or status)"),
    }
}

async fn collect(cfg: CollectorConfig) -> Result<()> {
    if let Err(e) = install_exporter_from_env() {
        tracing::warn!(error = %format!("{e:#}"), "metrics exporter not started");
    }

    let urls = load_video_urls(&cfg.video_urls_path);
    if urls.is_empty() {
        bail!("no video urls in {}", cfg.video_urls_path.display());
    }

    let http = Arc::new(HttpSource::new(&cfg.source)?);
    let mut pipeline = Pipeline::new(cfg, http.clone(), http)?;
    let summary = pipeline.run(&urls).await;
    println!(
        "collected {} videos ({} skipped, {} failed); totals: {} comments, {} users",
        summary.processed_videos,
        summary.skipped,
        summary.failed,
        summary.total_comments,
        summary.total_users
    );
    Ok(())
}
