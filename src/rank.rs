//! Filtering and prioritization. Pure and deterministic: the same inputs
//! always produce the same ordering.

use chrono::{DateTime, Duration, Utc};

use crate::config::{KeywordConfig, RunSettings};
use crate::ingest::types::Candidate;

/// Narrow the collected candidates to the ranked shortlist.
///
/// Drops stale posts, posts with no topical keyword, and promotional posts.
/// Survivors get their score and come back sorted best-first, capped at
/// `max_news_count`. The sort is stable, so equal scores keep arrival order
/// (channels arrive priority-first).
pub fn filter_and_rank(
    candidates: Vec<Candidate>,
    keywords: &KeywordConfig,
    settings: &RunSettings,
    now: DateTime<Utc>,
) -> Vec<Candidate> {
    let cutoff = now - Duration::hours(settings.lookback_hours);
    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());

    for mut candidate in candidates {
        if candidate.post.published_at < cutoff {
            continue;
        }
        let matches = keywords.keyword_matches(&candidate.post.text);
        if matches == 0 {
            continue;
        }
        if keywords.is_promotional(&candidate.post.text) {
            continue;
        }
        candidate.keyword_relevance = matches;
        candidate.priority_score =
            priority_score(candidate.channel_priority, matches, candidate.post.views);
        kept.push(candidate);
    }

    kept.sort_by(|a, b| {
        b.priority_score
            .partial_cmp(&a.priority_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    kept.truncate(settings.max_news_count);
    kept
}

/// Composite ranking score. Source priority dominates, keyword density
/// second; the engagement term is capped so virality cannot swamp either.
pub fn priority_score(channel_priority: i64, keyword_relevance: u32, views: i64) -> f64 {
    let engagement = views.clamp(0, 1000) as f64 / 100.0;
    (channel_priority * 10) as f64 + (keyword_relevance as f64 * 5.0) + engagement
}
