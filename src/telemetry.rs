use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;

pub const ENV_METRICS_ADDR: &str = "METRICS_ADDR";

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("collector_videos_flushed_total", "Videos fully written to all outputs.");
        describe_counter!(
            "collector_videos_skipped_total",
            "Videos skipped (no id, already processed, outside recency window)."
        );
        describe_counter!(
            "collector_video_errors_total",
            "Videos abandoned because of a fatal per-video error."
        );
        describe_counter!("collector_comments_kept_total", "Comments accepted into a collector.");
        describe_counter!(
            "collector_comments_rejected_total",
            "Comments dropped by the language filter."
        );
        describe_counter!(
            "collector_replies_missing_total",
            "Comments reporting replies that were not inlined in the stream."
        );
        describe_counter!(
            "collector_profile_failures_total",
            "Profile fetches that failed and fell back to defaults."
        );
        describe_counter!(
            "collector_progress_write_failures_total",
            "Progress file updates that could not be persisted."
        );
        describe_counter!("collector_comment_pages_total", "Comment pages fetched over HTTP.");
        describe_gauge!(
            "collector_total_comments",
            "Cumulative comment count from the progress file."
        );
    });
}

/// Install the Prometheus exporter when `METRICS_ADDR` is set.
/// Returns whether an exporter is listening. Must run inside a Tokio runtime.
pub fn install_exporter_from_env() -> Result<bool> {
    let Ok(raw) = std::env::var(ENV_METRICS_ADDR) else {
        return Ok(false);
    };
    let addr: SocketAddr = raw
        .parse()
        .with_context(|| format!("{ENV_METRICS_ADDR}={raw} is not a socket address"))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("prometheus: install exporter")?;
    tracing::info!(%addr, "prometheus exporter listening");
    Ok(true)
}
