//! Prometheus recorder plus the series the pipeline emits.
//!
//! The binary runs one cycle and exits, so there is no scrape endpoint;
//! the rendered snapshot is logged when the run finishes. Stage code emits
//! counters unconditionally; without an installed recorder they are no-ops.

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    /// Install the process-wide recorder. Call once, before the first cycle.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        describe_pipeline_metrics();
        Ok(Self { handle })
    }

    /// Exposition-format snapshot of everything recorded so far.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// One-time registration so the series carry help text.
pub fn describe_pipeline_metrics() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "digest_runs_total",
            "Pipeline cycles, labeled by terminal status."
        );
        describe_counter!(
            "digest_source_errors_total",
            "Source fetches that failed and were skipped."
        );
        describe_counter!(
            "digest_items_collected_total",
            "Fresh items that survived the dedup ledger."
        );
        describe_counter!(
            "digest_items_gated_total",
            "Items dropped by the relevance gate."
        );
        describe_counter!(
            "digest_engine_retries_total",
            "Engine calls that were retried after a failure."
        );
        describe_counter!(
            "digest_engine_fallbacks_total",
            "Items summarized by the local fallback."
        );
        describe_counter!(
            "digest_items_published_total",
            "Items included in a published digest."
        );
        describe_counter!(
            "digest_gateway_posts_total",
            "Raw posts accepted from the gateway after read-time rules."
        );
        describe_histogram!(
            "digest_cycle_seconds",
            "Wall-clock duration of one full cycle."
        );
    });
}
