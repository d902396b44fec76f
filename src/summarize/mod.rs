//! Relevance gate plus summarization, fanned out under a concurrency cap.
//!
//! Items leave this stage in exactly the order they arrived: every task
//! carries its input index and results are reassembled by it, so the
//! ranking decided upstream survives whatever order the engine answers in.

pub mod adapter;
pub mod postprocess;
pub mod retry;

pub use adapter::{build_engine, AnthropicEngine, DisabledEngine, DynEngine, EngineClient, NEUTRAL_RELEVANCE};
pub use retry::{invoke_with_retry, EngineError, RetryPolicy};

use std::sync::Arc;

use anyhow::{Context, Result};
use metrics::counter;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::{KeywordConfig, RunSettings};
use crate::ingest::types::Candidate;

/// How many engine calls may be in flight at once.
pub const ENGINE_CONCURRENCY: usize = 3;

/// A candidate that passed the gate, with its digest-ready summary.
#[derive(Debug, Clone)]
pub struct SummarizedItem {
    pub candidate: Candidate,
    pub relevance: u8,
    pub summary: String,
    pub quality: u8,
    pub fallback_used: bool,
}

pub struct SummaryEngine {
    client: DynEngine,
    policy: RetryPolicy,
    keywords: Arc<KeywordConfig>,
    concurrency: usize,
}

impl SummaryEngine {
    pub fn new(client: DynEngine, policy: RetryPolicy, keywords: Arc<KeywordConfig>) -> Self {
        Self {
            client,
            policy,
            keywords,
            concurrency: ENGINE_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Gate then summarize every candidate. Gated-out items disappear;
    /// everything else comes back summarized, by the engine or by the
    /// local fallback. Returns `Err` only when a task itself dies.
    pub async fn process(
        &self,
        candidates: Vec<Candidate>,
        settings: &RunSettings,
    ) -> Result<Vec<SummarizedItem>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let total = candidates.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<(usize, Option<SummarizedItem>)> = JoinSet::new();

        for (index, candidate) in candidates.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let client = Arc::clone(&self.client);
            let keywords = Arc::clone(&self.keywords);
            let policy = self.policy;
            let threshold = settings.relevance_threshold;
            let max_length = settings.summary_max_length;

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    // Unreachable: the semaphore is never closed.
                    Err(_) => return (index, None),
                };
                let item =
                    evaluate_one(client, keywords, policy, candidate, threshold, max_length).await;
                (index, item)
            });
        }

        let mut slots: Vec<Option<SummarizedItem>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            let (index, item) = joined.context("summarization task panicked")?;
            slots[index] = item;
        }
        Ok(slots.into_iter().flatten().collect())
    }
}

async fn evaluate_one(
    client: DynEngine,
    keywords: Arc<KeywordConfig>,
    policy: RetryPolicy,
    candidate: Candidate,
    threshold: u8,
    max_length: usize,
) -> Option<SummarizedItem> {
    let label = candidate.label().to_string();
    let text = candidate.post.text.clone();

    // Single evaluation attempt. An erroring engine must not silently drop
    // the whole shortlist, so failures score neutral instead.
    let relevance = match client.score_relevance(&text, &label).await {
        Ok(score) => score.min(10),
        Err(EngineError::Disabled) => NEUTRAL_RELEVANCE,
        Err(e) => {
            warn!(error = %e, channel = %candidate.channel_handle, "relevance call failed, scoring neutral");
            NEUTRAL_RELEVANCE
        }
    };
    if relevance < threshold {
        debug!(channel = %candidate.channel_handle, relevance, threshold, "item gated out");
        counter!("digest_items_gated_total").increment(1);
        return None;
    }

    let (summary, quality, fallback_used) =
        match invoke_with_retry(policy, || client.summarize(&text, &label)).await {
            Ok(raw) => {
                let cleaned = postprocess::filter_meta_commentary(&raw);
                if cleaned.is_empty() {
                    // An all-whitespace reply is as good as no reply.
                    local_fallback(&text)
                } else {
                    let quality = postprocess::summary_quality(&cleaned, &keywords, max_length);
                    (cleaned, quality, false)
                }
            }
            Err(e) => {
                if !matches!(e, EngineError::Disabled) {
                    warn!(error = %e, channel = %candidate.channel_handle, "summarization failed, using local fallback");
                }
                counter!("digest_engine_fallbacks_total").increment(1);
                local_fallback(&text)
            }
        };

    Some(SummarizedItem {
        candidate,
        relevance,
        summary,
        quality,
        fallback_used,
    })
}

fn local_fallback(text: &str) -> (String, u8, bool) {
    (
        postprocess::fallback_summary(text),
        postprocess::FALLBACK_QUALITY,
        true,
    )
}
