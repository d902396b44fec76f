//! Collection stage: read every active channel through the source adapter,
//! drop items the ledger already knows, and hand the rest to ranking.
//!
//! One broken source never aborts the stage. Fetch errors are logged,
//! counted, and skipped so the remaining channels still contribute.

pub mod providers;
pub mod types;

use anyhow::Result;
use metrics::counter;
use tracing::{debug, info, warn};

use crate::store::{Channel, Store};
use types::{Candidate, SourceAdapter};

/// What the per-source loop saw. The run record's first two counters come
/// straight from here.
#[derive(Debug, Default)]
pub struct CollectStats {
    pub sources_processed: u32,
    pub sources_failed: u32,
    pub candidates: Vec<Candidate>,
}

pub async fn collect_new_posts(
    adapter: &dyn SourceAdapter,
    store: &Store,
    channels: &[Channel],
    lookback_hours: i64,
    fetch_limit: usize,
) -> Result<CollectStats> {
    let mut stats = CollectStats::default();

    for channel in channels {
        let posts = match adapter
            .fetch_recent(&channel.handle, lookback_hours, fetch_limit)
            .await
        {
            Ok(posts) => posts,
            Err(e) => {
                warn!(error = ?e, channel = %channel.handle, "source fetch failed, skipping");
                counter!("digest_source_errors_total").increment(1);
                stats.sources_failed += 1;
                continue;
            }
        };
        stats.sources_processed += 1;

        let mut fresh = 0usize;
        let mut max_item_id = channel.last_item_id;
        for post in posts {
            max_item_id = max_item_id.max(post.item_id);
            if store.ledger().is_processed(channel.id, post.item_id).await? {
                continue;
            }
            fresh += 1;
            stats.candidates.push(Candidate::new(channel, post));
        }
        // Cursor is diagnostic only; the ledger is what prevents repeats.
        if max_item_id > channel.last_item_id {
            store.channels().advance_cursor(channel.id, max_item_id).await?;
        }
        debug!(channel = %channel.handle, fresh, "channel read");
    }

    counter!("digest_items_collected_total").increment(stats.candidates.len() as u64);
    info!(
        sources = stats.sources_processed,
        failed = stats.sources_failed,
        items = stats.candidates.len(),
        "collection finished"
    );
    Ok(stats)
}
