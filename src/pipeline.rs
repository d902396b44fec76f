//! The collector service: one call to [`Collector::run_cycle`] runs the
//! whole pipeline and accounts for it in the run ledger.
//!
//! Stage order is fixed: settings, channels, collect, rank, summarize,
//! render, publish, mark. Items are marked processed strictly after the
//! publish succeeds, and only the ones the digest actually carried, so a
//! failed send leaves everything eligible for the next run.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{bail, Context, Result};
use chrono::{Duration, Local, Utc};
use metrics::{counter, histogram};
use tracing::{error, info, warn};

use crate::config::{KeywordConfig, RunSettings};
use crate::digest;
use crate::ingest::{self, types::SourceAdapter};
use crate::publish::{self, PublishTransport};
use crate::rank;
use crate::store::{RunCounters, Store};
use crate::summarize::SummaryEngine;

const DEFAULT_FETCH_LIMIT: usize = 100;
const DEFAULT_RUN_DEADLINE: StdDuration = StdDuration::from_secs(300);

/// What the trigger surface gets back. Exit status derives from `success`;
/// the counters mirror the run record.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub success: bool,
    pub sources_processed: u32,
    pub items_collected: u32,
    pub items_published: u32,
    pub error: Option<String>,
}

impl CycleOutcome {
    fn failure(error: String) -> Self {
        Self {
            success: false,
            sources_processed: 0,
            items_collected: 0,
            items_published: 0,
            error: Some(error),
        }
    }
}

pub struct Collector {
    store: Store,
    adapter: Arc<dyn SourceAdapter>,
    engine: SummaryEngine,
    publisher: Arc<dyn PublishTransport>,
    keywords: Arc<KeywordConfig>,
    fetch_limit: usize,
    run_deadline: StdDuration,
}

impl Collector {
    pub fn new(
        store: Store,
        adapter: Arc<dyn SourceAdapter>,
        engine: SummaryEngine,
        publisher: Arc<dyn PublishTransport>,
        keywords: Arc<KeywordConfig>,
    ) -> Self {
        Self {
            store,
            adapter,
            engine,
            publisher,
            keywords,
            fetch_limit: DEFAULT_FETCH_LIMIT,
            run_deadline: DEFAULT_RUN_DEADLINE,
        }
    }

    pub fn with_fetch_limit(mut self, fetch_limit: usize) -> Self {
        self.fetch_limit = fetch_limit.max(1);
        self
    }

    pub fn with_run_deadline(mut self, deadline: StdDuration) -> Self {
        self.run_deadline = deadline;
        self
    }

    /// Run one full cycle. Never returns `Err`: every failure class lands
    /// in the run record and in the returned outcome instead.
    pub async fn run_cycle(&self) -> CycleOutcome {
        crate::metrics::describe_pipeline_metrics();
        let started = std::time::Instant::now();
        let now = Utc::now();
        let window = Duration::from_std(self.run_deadline).unwrap_or_else(|_| Duration::minutes(5));

        // A started record younger than the deadline means another trigger
        // is (or may still be) running; anything older is an abandoned
        // record and does not block.
        match self.store.runs().has_live_run(now, window).await {
            Ok(false) => {}
            Ok(true) => {
                warn!("another run is still in progress; refusing to start");
                counter!("digest_runs_total", "status" => "refused").increment(1);
                return CycleOutcome::failure("another run is in progress".to_string());
            }
            Err(e) => return CycleOutcome::failure(format!("store unreachable: {e}")),
        }

        let run_id = match self.store.runs().start(now).await {
            Ok(id) => id,
            Err(e) => return CycleOutcome::failure(format!("could not create run record: {e}")),
        };
        info!(run_id, "cycle started");

        let outcome = match tokio::time::timeout(self.run_deadline, self.execute()).await {
            Ok(Ok(counters)) => self.finish_completed(run_id, counters).await,
            Ok(Err(e)) => self.finish_failed(run_id, format!("{e:#}")).await,
            Err(_) => {
                let message = format!(
                    "run deadline of {}s exceeded",
                    self.run_deadline.as_secs()
                );
                self.finish_failed(run_id, message).await
            }
        };
        histogram!("digest_cycle_seconds").record(started.elapsed().as_secs_f64());
        outcome
    }

    async fn finish_completed(&self, run_id: i64, counters: RunCounters) -> CycleOutcome {
        let outcome = CycleOutcome {
            success: true,
            sources_processed: counters.sources_processed,
            items_collected: counters.items_collected,
            items_published: counters.items_published,
            error: None,
        };
        match self.store.runs().complete(run_id, &counters).await {
            Ok(true) => {
                counter!("digest_runs_total", "status" => "completed").increment(1);
                info!(
                    run_id,
                    sources = counters.sources_processed,
                    collected = counters.items_collected,
                    published = counters.items_published,
                    "cycle completed"
                );
                outcome
            }
            Ok(false) => {
                error!(run_id, "run record was already terminal at completion");
                CycleOutcome {
                    success: false,
                    error: Some("run record was already terminal".to_string()),
                    ..outcome
                }
            }
            Err(e) => {
                // The digest went out; only the bookkeeping is wrong. The
                // caller still has to know, hence the failed outcome.
                error!(run_id, error = %e, "digest published but the run record update failed");
                CycleOutcome {
                    success: false,
                    error: Some(format!("run bookkeeping failed: {e}")),
                    ..outcome
                }
            }
        }
    }

    async fn finish_failed(&self, run_id: i64, message: String) -> CycleOutcome {
        error!(run_id, error = %message, "cycle failed");
        counter!("digest_runs_total", "status" => "failed").increment(1);
        if let Err(e) = self.store.runs().fail(run_id, &message).await {
            error!(run_id, error = %e, "could not record the failure");
        }
        CycleOutcome::failure(message)
    }

    async fn execute(&self) -> Result<RunCounters> {
        let settings = RunSettings::load(&self.store)
            .await
            .context("loading run settings")?;
        let channels = self
            .store
            .channels()
            .list_active()
            .await
            .context("loading active channels")?;
        if channels.is_empty() {
            bail!("no active sources configured");
        }

        let stats = ingest::collect_new_posts(
            &*self.adapter,
            &self.store,
            &channels,
            settings.lookback_hours,
            self.fetch_limit,
        )
        .await?;
        let mut counters = RunCounters {
            sources_processed: stats.sources_processed,
            items_collected: stats.candidates.len() as u32,
            items_published: 0,
        };

        let ranked = rank::filter_and_rank(stats.candidates, &self.keywords, &settings, Utc::now());
        if ranked.is_empty() {
            info!("nothing new to publish");
            return Ok(counters);
        }

        let summarized = self.engine.process(ranked, &settings).await?;
        if summarized.is_empty() {
            info!("no items passed the relevance gate");
            return Ok(counters);
        }

        let digest = digest::render(&summarized, Local::now().naive_local())?;
        let included = &summarized[..digest.included];

        let report = publish::validate_and_publish(&*self.publisher, &digest, included).await?;
        if !report.warnings.is_empty() {
            info!(
                warnings = report.warnings.len(),
                "digest published with validation warnings"
            );
        }

        // The only place items become ineligible for future runs. Items the
        // re-pack dropped are NOT marked and stay candidates for the next
        // cycle. A failed mark is logged and skipped; worst case the item
        // is summarized twice, which beats losing it.
        for item in included {
            if let Err(e) = self
                .store
                .ledger()
                .mark_processed(
                    item.candidate.channel_id,
                    item.candidate.post.item_id,
                    &item.candidate.post.text,
                    &item.summary,
                )
                .await
            {
                error!(
                    error = %e,
                    channel = %item.candidate.channel_handle,
                    item = item.candidate.post.item_id,
                    "failed to mark item processed"
                );
            }
        }

        counters.items_published = digest.included as u32;
        counter!("digest_items_published_total").increment(digest.included as u64);
        Ok(counters)
    }
}
