//! Preview that renders a digest from canned posts to stdout. No store, no
//! engine, no network: the pipeline's pure stages against fixture data.

use chrono::Local;
use channel_digest::config::KeywordConfig;
use channel_digest::digest;
use channel_digest::ingest::types::{Candidate, ChannelPost};
use channel_digest::summarize::postprocess;
use channel_digest::summarize::SummarizedItem;

fn main() {
    tracing_subscriber::fmt().with_target(false).init();
    let keywords = KeywordConfig::default();

    let posts = [
        (
            "edunews",
            9,
            101,
            "The education ministry opened a free national tutoring platform for schools. \
             Pilot regions report twelve thousand enrolled students in the first week.",
        ),
        (
            "unidaily",
            7,
            2048,
            "Three universities will move entrance exams online this winter. Proctoring \
             runs through the existing learning platform, and paper sittings remain \
             available on request.",
        ),
        (
            "classroomtech",
            5,
            77,
            "A classroom AI assistant now drafts lesson plans from the national curriculum. \
             Teachers review every draft before it reaches students.",
        ),
    ];

    let items: Vec<SummarizedItem> = posts
        .iter()
        .map(|(handle, priority, id, text)| {
            let summary = postprocess::fallback_summary(text);
            let quality = postprocess::summary_quality(&summary, &keywords, 150);
            SummarizedItem {
                candidate: Candidate {
                    channel_id: *id,
                    channel_handle: handle.to_string(),
                    channel_title: handle.to_string(),
                    channel_priority: *priority,
                    post: ChannelPost {
                        item_id: *id,
                        text: text.to_string(),
                        published_at: chrono::Utc::now(),
                        views: 100,
                        forwards: 0,
                        media_type: None,
                        links: Vec::new(),
                        permalink: format!("https://t.me/{handle}/{id}"),
                    },
                    keyword_relevance: keywords.keyword_matches(text),
                    priority_score: 0.0,
                },
                relevance: 7,
                summary,
                quality,
                fallback_used: true,
            }
        })
        .collect();

    match digest::render(&items, Local::now().naive_local()) {
        Ok(rendered) => {
            println!("{}", rendered.text);
            println!(
                "\n-- {} of {} items, {} chars",
                rendered.included,
                items.len(),
                rendered.text.chars().count()
            );
        }
        Err(e) => eprintln!("render failed: {e}"),
    }
}
