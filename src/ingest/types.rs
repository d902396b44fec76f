//! Candidate post types and the source-adapter seam.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::store::Channel;

/// One raw post as a source adapter returns it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChannelPost {
    pub item_id: i64,
    pub text: String,
    pub published_at: DateTime<Utc>,
    pub views: i64,
    pub forwards: i64,
    pub media_type: Option<String>,
    /// External URLs found in the text.
    pub links: Vec<String>,
    /// Where the digest entry points back to.
    pub permalink: String,
}

/// A post attached to its channel, enriched stage by stage within one run.
/// Never persisted as such; only the dedup ledger sees it again.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub channel_id: i64,
    pub channel_handle: String,
    pub channel_title: String,
    pub channel_priority: i64,
    pub post: ChannelPost,
    pub keyword_relevance: u32,
    pub priority_score: f64,
}

impl Candidate {
    pub fn new(channel: &Channel, post: ChannelPost) -> Self {
        Self {
            channel_id: channel.id,
            channel_handle: channel.handle.clone(),
            channel_title: channel.title.clone(),
            channel_priority: channel.priority,
            post,
            keyword_relevance: 0,
            priority_score: 0.0,
        }
    }

    /// Display label for digest entries and prompts.
    pub fn label(&self) -> &str {
        if self.channel_title.is_empty() {
            &self.channel_handle
        } else {
            &self.channel_title
        }
    }
}

#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Recent posts for one channel. Implementations enforce the lookback
    /// cutoff and the item cap themselves and fail with an error instead of
    /// panicking; the collector treats any error as "skip this source".
    async fn fetch_recent(
        &self,
        handle: &str,
        lookback_hours: i64,
        max_items: usize,
    ) -> Result<Vec<ChannelPost>>;

    fn name(&self) -> &'static str;
}
