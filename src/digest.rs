//! Digest rendering: pure text assembly under a hard character ceiling.
//!
//! The ceiling is the platform's message limit and is counted in
//! characters, not bytes. When the full digest does not fit, entries are
//! re-packed in rank order until the budget runs out; the caller learns
//! how many made it via [`Digest::included`] and must treat only those as
//! published.

use anyhow::{bail, Result};
use chrono::{NaiveDateTime, Timelike};

use crate::summarize::SummarizedItem;

/// Hard per-message ceiling, in characters.
pub const DIGEST_CHAR_LIMIT: usize = 4096;
/// Headroom left unused when the digest has to be re-packed.
const LENGTH_MARGIN: usize = 64;
const FOOTER: &str = "\n\n⚡";
const OVERFLOW_NOTICE: &str = "Too much news today; nothing fit under the message limit.";

#[derive(Debug, Clone)]
pub struct Digest {
    pub text: String,
    /// How many leading items of the input made it into `text`.
    pub included: usize,
}

pub fn render(items: &[SummarizedItem], now: NaiveDateTime) -> Result<Digest> {
    let header = format!("{}\n\n", title_for(now));
    let entries: Vec<String> = items.iter().map(entry_line).collect();

    let full = assemble(&header, &entries);
    if char_len(&full) <= DIGEST_CHAR_LIMIT {
        return Ok(Digest {
            text: full,
            included: entries.len(),
        });
    }

    // Header and footer are fixed; entries are re-added best-first until
    // the budget runs out.
    let budget =
        DIGEST_CHAR_LIMIT.saturating_sub(char_len(&header) + char_len(FOOTER) + LENGTH_MARGIN);
    let mut used = 0usize;
    let mut included = 0usize;
    for entry in &entries {
        let separator = if included > 0 { 2 } else { 0 };
        let cost = char_len(entry) + separator;
        if used + cost > budget {
            break;
        }
        used += cost;
        included += 1;
    }

    let text = if included == 0 {
        format!("{header}{OVERFLOW_NOTICE}{FOOTER}")
    } else {
        assemble(&header, &entries[..included])
    };

    if char_len(&text) > DIGEST_CHAR_LIMIT {
        bail!("digest still exceeds {DIGEST_CHAR_LIMIT} characters after truncation");
    }
    Ok(Digest { text, included })
}

fn assemble(header: &str, entries: &[String]) -> String {
    format!("{header}{}{FOOTER}", entries.join("\n\n"))
}

fn entry_line(item: &SummarizedItem) -> String {
    format!(
        "• {} [{}]({})",
        item.summary,
        item.candidate.label(),
        item.candidate.post.permalink
    )
}

/// Title band on the local wall clock: morning until 12:29, afternoon
/// until 17:30, evening after.
fn title_for(now: NaiveDateTime) -> String {
    let minutes = now.hour() * 60 + now.minute();
    let band = if minutes <= 749 {
        "Morning digest"
    } else if minutes <= 1050 {
        "Afternoon digest"
    } else {
        "Evening digest"
    };
    format!("{band} for {}", now.format("%-d %B"))
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::{Candidate, ChannelPost};
    use chrono::{NaiveDate, Utc};

    fn item(summary: &str, handle: &str, id: i64) -> SummarizedItem {
        let post = ChannelPost {
            item_id: id,
            text: summary.to_string(),
            published_at: Utc::now(),
            views: 0,
            forwards: 0,
            media_type: None,
            links: Vec::new(),
            permalink: format!("https://t.me/{handle}/{id}"),
        };
        SummarizedItem {
            candidate: Candidate {
                channel_id: 1,
                channel_handle: handle.to_string(),
                channel_title: handle.to_string(),
                channel_priority: 5,
                post,
                keyword_relevance: 1,
                priority_score: 55.0,
            },
            relevance: 7,
            summary: summary.to_string(),
            quality: 8,
            fallback_used: false,
        }
    }

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 9, 1)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn renders_header_entries_and_footer() {
        let items = vec![
            item("Schools pilot a new homework platform.", "edunews", 10),
            item("University exams move online in two regions.", "unidaily", 42),
        ];
        let digest = render(&items, at(9, 0)).unwrap();
        assert_eq!(digest.included, 2);
        assert_eq!(
            digest.text,
            "Morning digest for 1 September\n\n\
             • Schools pilot a new homework platform. [edunews](https://t.me/edunews/10)\n\n\
             • University exams move online in two regions. [unidaily](https://t.me/unidaily/42)\n\n\
             ⚡"
        );
    }

    #[test]
    fn title_band_boundaries() {
        let one = vec![item("A summary line.", "a", 1)];
        for (hour, minute, band) in [
            (0, 0, "Morning digest"),
            (12, 29, "Morning digest"),
            (12, 30, "Afternoon digest"),
            (17, 30, "Afternoon digest"),
            (17, 31, "Evening digest"),
            (23, 59, "Evening digest"),
        ] {
            let digest = render(&one, at(hour, minute)).unwrap();
            assert!(
                digest.text.starts_with(band),
                "{hour:02}:{minute:02} should start with {band}"
            );
        }
    }

    #[test]
    fn oversized_digest_is_repacked_in_rank_order() {
        let long = "An unusually detailed report on one education platform. ".repeat(8);
        let items: Vec<SummarizedItem> = (0..12)
            .map(|i| item(long.trim(), "edunews", i))
            .collect();

        let digest = render(&items, at(9, 0)).unwrap();
        assert!(digest.included < 12);
        assert!(digest.included > 0);
        assert!(digest.text.chars().count() <= DIGEST_CHAR_LIMIT);
        assert!(digest.text.starts_with("Morning digest"));
        assert!(digest.text.ends_with("⚡"));
        // The survivors are the leading (best-ranked) items.
        assert!(digest.text.contains("https://t.me/edunews/0"));
        assert!(!digest.text.contains(&format!("https://t.me/edunews/{}", digest.included)));
    }

    #[test]
    fn notice_replaces_items_when_nothing_fits() {
        let giant = "word ".repeat(1200);
        let items = vec![item(giant.trim(), "edunews", 1)];

        let digest = render(&items, at(19, 0)).unwrap();
        assert_eq!(digest.included, 0);
        assert!(digest.text.contains("nothing fit under the message limit"));
        assert!(digest.text.chars().count() <= DIGEST_CHAR_LIMIT);
    }
}
