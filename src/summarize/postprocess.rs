//! Cleanup of engine output: strip meta-commentary, score summary quality,
//! and build the deterministic local fallback.

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::config::KeywordConfig;

/// Quality assigned to locally built fallback summaries. Low on purpose:
/// it drags the run's average down and trips the validation warning.
pub const FALLBACK_QUALITY: u8 = 2;

/// When a reply has several lines, ones shorter than this are fragments
/// (stray bullets, "Sure!") and get dropped.
const MIN_MEANINGFUL_LINE_CHARS: usize = 20;

/// First standalone 0..=10 integer anywhere in the reply, clamped to 10.
/// Engines answer "7", "7/10" or "Relevance: 7." interchangeably.
pub fn parse_relevance_score(reply: &str) -> Option<u8> {
    static RE_SCORE: OnceCell<Regex> = OnceCell::new();
    let re = RE_SCORE.get_or_init(|| Regex::new(r"\b(10|[0-9])\b").unwrap());
    re.captures(reply)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u8>().ok())
        .map(|v| v.min(10))
}

/// Strip the explanation-shaped lines engines like to prepend and flatten
/// what is left into one line. If filtering would empty the reply, the
/// first raw line wins over returning nothing.
pub fn filter_meta_commentary(raw: &str) -> String {
    static META: OnceCell<Vec<Regex>> = OnceCell::new();
    let meta = META.get_or_init(|| {
        [
            r"(?i)^here(?:'s| is) (?:a |the )?(?:brief |short |concise )?summar",
            r"(?i)^(?:the )?summary\s*:",
            r"(?i)^in (?:summary|short|brief)\b",
            r"(?i)^this (?:post|article|text|message) (?:is about|discusses|describes|covers)",
            r"(?i)^sure\b",
            r"^[-*•>]+\s",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("meta pattern"))
        .collect()
    });

    let lines: Vec<&str> = raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let mut kept: Vec<&str> = lines
        .iter()
        .copied()
        .filter(|line| !meta.iter().any(|re| re.is_match(line)))
        .collect();
    if kept.len() > 1 {
        kept.retain(|l| l.chars().count() >= MIN_MEANINGFUL_LINE_CHARS);
    }

    let chosen = if kept.is_empty() {
        lines.first().copied().unwrap_or("").to_string()
    } else {
        kept.join(" ")
    };
    collapse_ws(&unwrap_quotes(&chosen))
}

/// Heuristic 0..=10 score for a finished summary. Only local signals; the
/// engine is never asked to grade itself.
pub fn summary_quality(summary: &str, keywords: &KeywordConfig, max_length: usize) -> u8 {
    let trimmed = summary.trim();
    if trimmed.is_empty() {
        return 0;
    }

    let mut score: i32 = 10;
    let chars = trimmed.chars().count();
    if chars > max_length {
        score -= 2;
    }
    if chars < 50 {
        score -= 1;
    }

    let lower = trimmed.to_lowercase();
    for phrase in &keywords.filler_phrases {
        if lower.contains(phrase.as_str()) {
            score -= 1;
        }
    }

    let alphabetic = trimmed.chars().filter(|c| c.is_alphabetic()).count();
    if alphabetic * 2 < chars {
        score -= 1;
    }

    if keywords.keyword_matches(trimmed) > 0 {
        score += 1;
    }

    score.clamp(0, 10) as u8
}

/// Deterministic summary used when the engine is unavailable: the first
/// sentence when it is short enough, otherwise a hard prefix with an
/// ellipsis.
pub fn fallback_summary(text: &str) -> String {
    const SENTENCE_LIMIT: usize = 120;
    const PREFIX_CHARS: usize = 100;

    let flat = collapse_ws(text);
    if let Some(sentence) = first_sentence(&flat) {
        if sentence.chars().count() <= SENTENCE_LIMIT {
            return sentence.to_string();
        }
    }
    let prefix: String = flat.chars().take(PREFIX_CHARS).collect();
    format!("{}...", prefix.trim_end())
}

fn first_sentence(text: &str) -> Option<&str> {
    text.char_indices()
        .find(|(_, c)| matches!(c, '.' | '!' | '?'))
        .map(|(i, c)| text[..i + c.len_utf8()].trim())
}

fn unwrap_quotes(text: &str) -> String {
    let trimmed = text.trim();
    let mut chars = trimmed.chars();
    match (chars.next(), trimmed.chars().last()) {
        (Some(first), Some(last))
            if trimmed.chars().count() > 1 && is_quote_pair(first, last) =>
        {
            trimmed[first.len_utf8()..trimmed.len() - last.len_utf8()]
                .trim()
                .to_string()
        }
        _ => trimmed.to_string(),
    }
}

fn is_quote_pair(first: char, last: char) -> bool {
    matches!(
        (first, last),
        ('"', '"') | ('\'', '\'') | ('\u{201C}', '\u{201D}') | ('\u{00AB}', '\u{00BB}')
    )
}

fn collapse_ws(text: &str) -> String {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    re.replace_all(text, " ").trim().to_string()
}
