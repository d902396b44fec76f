//! Channel gateway adapter.
//!
//! The gateway exposes recent messages per channel as JSON. The adapter
//! normalizes them into [`ChannelPost`]s and applies the read-time rules:
//! too-short posts are dropped, posts older than the lookback cutoff are
//! dropped, and at most `max_items` survive per channel.

use std::collections::HashMap;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::ingest::types::{ChannelPost, SourceAdapter};

/// Posts shorter than this after normalization carry no summarizable
/// content and are dropped at read time.
pub const MIN_POST_CHARS: usize = 50;

const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(15);

/// Wire shape of one gateway message. Everything but the id is optional;
/// service messages come through with no text at all.
#[derive(Debug, Clone, Deserialize)]
struct WireMessage {
    id: i64,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    views: Option<i64>,
    #[serde(default)]
    forwards: Option<i64>,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    link: Option<String>,
}

pub struct GatewayAdapter {
    mode: Mode,
}

enum Mode {
    /// JSON object keyed by channel handle, values in the wire shape.
    Fixture(String),
    Http {
        base_url: String,
        token: Option<String>,
        client: Client,
    },
}

impl GatewayAdapter {
    pub fn from_url(base_url: &str, token: Option<String>) -> Self {
        Self {
            mode: Mode::Http {
                base_url: base_url.trim_end_matches('/').to_string(),
                token,
                client: Client::new(),
            },
        }
    }

    /// Adapter that serves canned messages instead of calling out. Used by
    /// the preview binary and the pipeline tests.
    pub fn from_fixture(json: &str) -> Self {
        Self {
            mode: Mode::Fixture(json.to_string()),
        }
    }
}

#[async_trait]
impl SourceAdapter for GatewayAdapter {
    async fn fetch_recent(
        &self,
        handle: &str,
        lookback_hours: i64,
        max_items: usize,
    ) -> Result<Vec<ChannelPost>> {
        let cutoff = Utc::now() - Duration::hours(lookback_hours);
        let wire = match &self.mode {
            Mode::Fixture(json) => {
                let mut by_handle: HashMap<String, Vec<WireMessage>> =
                    serde_json::from_str(json).context("parsing gateway fixture")?;
                by_handle.remove(handle).unwrap_or_default()
            }
            Mode::Http {
                base_url,
                token,
                client,
            } => {
                let url = format!("{base_url}/channels/{handle}/messages");
                let mut request = client
                    .get(&url)
                    .timeout(REQUEST_TIMEOUT)
                    .query(&[
                        ("hours", lookback_hours.to_string()),
                        ("limit", max_items.to_string()),
                    ]);
                if let Some(token) = token {
                    request = request.bearer_auth(token);
                }
                let response = request
                    .send()
                    .await
                    .with_context(|| format!("gateway request for {handle}"))?
                    .error_for_status()
                    .with_context(|| format!("gateway status for {handle}"))?;
                let body = response
                    .text()
                    .await
                    .with_context(|| format!("gateway body for {handle}"))?;
                serde_json::from_str(&body).context("parsing gateway response")?
            }
        };

        let posts = to_posts(handle, wire, cutoff, max_items);
        counter!("digest_gateway_posts_total").increment(posts.len() as u64);
        debug!(channel = handle, posts = posts.len(), "gateway read");
        Ok(posts)
    }

    fn name(&self) -> &'static str {
        "gateway"
    }
}

fn to_posts(
    handle: &str,
    wire: Vec<WireMessage>,
    cutoff: DateTime<Utc>,
    max_items: usize,
) -> Vec<ChannelPost> {
    let mut out = Vec::with_capacity(wire.len().min(max_items));
    for msg in wire {
        if out.len() >= max_items {
            break;
        }
        let raw = match msg.text {
            Some(t) => t,
            None => continue,
        };
        let text = normalize_post_text(&raw);
        if text.chars().count() < MIN_POST_CHARS {
            continue;
        }
        let published_at = match msg.date.as_deref().and_then(parse_timestamp) {
            Some(ts) => ts,
            None => continue,
        };
        if published_at < cutoff {
            continue;
        }
        let links = extract_links(&text);
        let permalink = msg
            .link
            .unwrap_or_else(|| format!("https://t.me/{handle}/{}", msg.id));
        out.push(ChannelPost {
            item_id: msg.id,
            text,
            published_at,
            views: msg.views.unwrap_or(0),
            forwards: msg.forwards.unwrap_or(0),
            media_type: msg.media_type,
            links,
            permalink,
        });
    }
    out
}

/// Decode entities, strip markup, collapse whitespace. Sentence punctuation
/// is kept; the local fallback summary splits on it.
pub fn normalize_post_text(raw: &str) -> String {
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"<[^>]+>").unwrap());
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());

    let decoded = html_escape::decode_html_entities(raw);
    let unt = re_tags.replace_all(&decoded, " ");
    re_ws.replace_all(&unt, " ").trim().to_string()
}

fn extract_links(text: &str) -> Vec<String> {
    static RE_URL: OnceCell<Regex> = OnceCell::new();
    let re = RE_URL.get_or_init(|| Regex::new(r"https?://[^\s<>()\[\]]+").unwrap());
    re.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::SecondsFormat;

    fn ts_hours_ago(hours: i64) -> String {
        (Utc::now() - Duration::hours(hours)).to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    fn long_text(prefix: &str) -> String {
        format!("{prefix} and the rest of this post pads it comfortably past the minimum length rule.")
    }

    #[test]
    fn normalize_strips_markup_and_entities() {
        let raw = "EdTech &amp; schools:\n<b>new platform</b>   launched";
        assert_eq!(
            normalize_post_text(raw),
            "EdTech & schools: new platform launched"
        );
    }

    #[test]
    fn link_extraction_finds_bare_urls() {
        let links = extract_links("read https://example.com/a and http://example.org/b.");
        assert_eq!(links.len(), 2);
        assert_eq!(links[0], "https://example.com/a");
    }

    #[tokio::test]
    async fn fixture_applies_read_time_rules() {
        let fixture = format!(
            r#"{{
                "edunews": [
                    {{"id": 11, "text": "{fresh}", "date": "{fresh_ts}", "views": 120}},
                    {{"id": 12, "text": "too short", "date": "{fresh_ts}"}},
                    {{"id": 13, "text": "{stale}", "date": "{stale_ts}"}},
                    {{"id": 14, "date": "{fresh_ts}"}},
                    {{"id": 15, "text": "{fresh2}", "date": "{fresh_ts}", "link": "https://t.me/edunews/15"}}
                ]
            }}"#,
            fresh = long_text("A fresh post about online learning"),
            fresh2 = long_text("Another fresh post about school platforms"),
            stale = long_text("An old post about education"),
            fresh_ts = ts_hours_ago(1),
            stale_ts = ts_hours_ago(30),
        );
        let adapter = GatewayAdapter::from_fixture(&fixture);

        let posts = adapter.fetch_recent("edunews", 12, 100).await.unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].item_id, 11);
        assert_eq!(posts[0].views, 120);
        assert_eq!(posts[0].permalink, "https://t.me/edunews/11");
        assert_eq!(posts[1].permalink, "https://t.me/edunews/15");
    }

    #[tokio::test]
    async fn fixture_caps_items_per_channel() {
        let body = long_text("A post about digital classrooms");
        let ts = ts_hours_ago(1);
        let messages: Vec<String> = (1..=5)
            .map(|id| format!(r#"{{"id": {id}, "text": "{body}", "date": "{ts}"}}"#))
            .collect();
        let fixture = format!(r#"{{"edunews": [{}]}}"#, messages.join(","));
        let adapter = GatewayAdapter::from_fixture(&fixture);

        let posts = adapter.fetch_recent("edunews", 12, 3).await.unwrap();
        assert_eq!(posts.len(), 3);
        assert_eq!(posts[2].item_id, 3);
    }

    #[tokio::test]
    async fn unknown_handle_yields_no_posts() {
        let adapter = GatewayAdapter::from_fixture(r#"{"edunews": []}"#);
        let posts = adapter.fetch_recent("other", 12, 10).await.unwrap();
        assert!(posts.is_empty());
    }
}
