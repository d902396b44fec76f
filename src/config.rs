//! Process configuration.
//!
//! Three layers, resolved in this order at startup:
//! 1. `AppConfig` from `DIGEST_*` environment variables (secrets, endpoints),
//! 2. `KeywordConfig` from a TOML file with compiled-in defaults,
//! 3. `RunSettings` from the store's settings table, read per run.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::store::Store;

pub const ENV_KEYWORDS_PATH: &str = "DIGEST_KEYWORDS_PATH";
pub const DEFAULT_KEYWORDS_PATH: &str = "config/keywords.toml";

const DEFAULT_RUN_DEADLINE_SECS: u64 = 300;
const DEFAULT_FETCH_LIMIT: usize = 100;

/// Environment-supplied process configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub gateway_url: String,
    pub gateway_token: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub engine_model: String,
    pub engine_url: Option<String>,
    pub bot_token: Option<String>,
    pub target_channel: Option<String>,
    pub run_deadline: Duration,
    pub fetch_limit: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let gateway_url =
            env_opt("DIGEST_GATEWAY_URL").ok_or_else(|| anyhow!("DIGEST_GATEWAY_URL is not set"))?;

        let run_deadline = match env_opt("DIGEST_RUN_DEADLINE_SECS") {
            Some(raw) => Duration::from_secs(
                raw.parse::<u64>()
                    .with_context(|| format!("DIGEST_RUN_DEADLINE_SECS is not a number: {raw}"))?,
            ),
            None => Duration::from_secs(DEFAULT_RUN_DEADLINE_SECS),
        };

        let fetch_limit = match env_opt("DIGEST_FETCH_LIMIT") {
            Some(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("DIGEST_FETCH_LIMIT is not a number: {raw}"))?,
            None => DEFAULT_FETCH_LIMIT,
        };

        Ok(Self {
            database_url: env_opt("DIGEST_DATABASE_URL")
                .unwrap_or_else(|| "sqlite://digest.db".to_string()),
            gateway_url,
            gateway_token: env_opt("DIGEST_GATEWAY_TOKEN"),
            anthropic_api_key: env_opt("ANTHROPIC_API_KEY"),
            engine_model: env_opt("DIGEST_ENGINE_MODEL")
                .unwrap_or_else(|| "claude-3-5-haiku-latest".to_string()),
            engine_url: env_opt("DIGEST_ENGINE_URL"),
            bot_token: env_opt("DIGEST_BOT_TOKEN"),
            target_channel: env_opt("DIGEST_TARGET_CHANNEL"),
            run_deadline,
            fetch_limit,
        })
    }
}

fn env_opt(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

/// Keyword and phrase sets driving the filter stages and the quality
/// heuristic. The matching algorithms live with the data so callers cannot
/// disagree about case handling.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    /// Short topic phrase used in engine prompts, e.g. "education technology".
    pub topic: String,
    /// Domain keywords; an item must contain at least one to survive.
    pub keywords: Vec<String>,
    /// Promotional markers; any match excludes the item.
    pub promo_keywords: Vec<String>,
    /// Generic filler phrases that cost summary quality points.
    pub filler_phrases: Vec<String>,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            topic: "education technology".to_string(),
            keywords: [
                "education",
                "edtech",
                "learning",
                "school",
                "university",
                "student",
                "teacher",
                "course",
                "curriculum",
                "exam",
                "scholarship",
                "tutoring",
                "online learning",
                "classroom",
                "training platform",
                "ai",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            promo_keywords: [
                "promo code",
                "promocode",
                "discount",
                "sale ends",
                "sponsored",
                "advertisement",
                "giveaway",
                "referral link",
                "limited offer",
                "buy now",
                "subscribe now",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            filler_phrases: [
                "this article",
                "the author",
                "in summary",
                "in this post",
                "the text discusses",
                "it is worth noting",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
        .normalized()
    }
}

impl KeywordConfig {
    /// Load from an explicit TOML path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading keyword config from {}", path.display()))?;
        let parsed: KeywordConfig = toml::from_str(&content)
            .with_context(|| format!("parsing keyword config from {}", path.display()))?;
        Ok(parsed.normalized())
    }

    /// Load using env var + fallbacks:
    /// 1) $DIGEST_KEYWORDS_PATH (must exist when set)
    /// 2) config/keywords.toml
    /// 3) compiled-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_KEYWORDS_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_KEYWORDS_PATH} points to a non-existent path"));
        }
        let default_path = PathBuf::from(DEFAULT_KEYWORDS_PATH);
        if default_path.exists() {
            return Self::load_from(&default_path);
        }
        Ok(Self::default())
    }

    /// Number of distinct domain keywords present in the text.
    pub fn keyword_matches(&self, text: &str) -> u32 {
        let lower = text.to_lowercase();
        self.keywords.iter().filter(|kw| lower.contains(kw.as_str())).count() as u32
    }

    pub fn is_promotional(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.promo_keywords.iter().any(|kw| lower.contains(kw.as_str()))
    }

    fn normalized(mut self) -> Self {
        self.topic = self.topic.trim().to_string();
        self.keywords = clean_list(self.keywords);
        self.promo_keywords = clean_list(self.promo_keywords);
        self.filler_phrases = clean_list(self.filler_phrases);
        self
    }
}

/// Trim, lowercase, drop empties, dedup.
fn clean_list(items: Vec<String>) -> Vec<String> {
    use std::collections::BTreeSet;
    let mut set = BTreeSet::new();
    for it in items {
        let t = it.trim().to_lowercase();
        if !t.is_empty() {
            set.insert(t);
        }
    }
    set.into_iter().collect()
}

/// Store-backed thresholds, re-read at the start of every run so edits made
/// through the management surface apply without a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    pub lookback_hours: i64,
    pub max_news_count: usize,
    pub relevance_threshold: u8,
    pub summary_max_length: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            lookback_hours: 12,
            max_news_count: 10,
            relevance_threshold: 5,
            summary_max_length: 150,
        }
    }
}

impl RunSettings {
    pub async fn load(store: &Store) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            lookback_hours: read_setting(store, "lookback_hours", defaults.lookback_hours).await?,
            max_news_count: read_setting(store, "max_news_count", defaults.max_news_count).await?,
            relevance_threshold: {
                let raw: u8 =
                    read_setting(store, "relevance_threshold", defaults.relevance_threshold)
                        .await?;
                raw.min(10)
            },
            summary_max_length: read_setting(store, "summary_max_length", defaults.summary_max_length)
                .await?,
        })
    }
}

/// Unreadable rows fail the run (store trouble); unparseable values fall back
/// to the default with a warning, so a typo in the settings UI cannot stop
/// publishing.
async fn read_setting<T>(store: &Store, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match store.settings().get(key).await? {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(v) => Ok(v),
            Err(e) => {
                tracing::warn!(key, value = %raw, error = %e, "unparseable setting, using default");
                Ok(default)
            }
        },
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_keywords_are_normalized() {
        let cfg = KeywordConfig::default();
        assert!(!cfg.keywords.is_empty());
        assert!(cfg.keywords.iter().all(|k| *k == k.to_lowercase()));
        assert!(cfg.promo_keywords.iter().all(|k| !k.trim().is_empty()));
    }

    #[test]
    fn keyword_matches_counts_distinct_keywords() {
        let cfg = KeywordConfig {
            topic: "t".into(),
            keywords: vec!["school".into(), "exam".into(), "course".into()],
            promo_keywords: vec![],
            filler_phrases: vec![],
        }
        .normalized();

        // "school" twice still counts once; "exam" adds a second match.
        let text = "The school opened a new school building before the exam season.";
        assert_eq!(cfg.keyword_matches(text), 2);
        assert_eq!(cfg.keyword_matches("nothing relevant here"), 0);
    }

    #[test]
    fn promotional_match_is_case_insensitive() {
        let cfg = KeywordConfig::default();
        assert!(cfg.is_promotional("Use our PROMO CODE today"));
        assert!(!cfg.is_promotional("University opens new campus"));
    }

    #[test]
    fn toml_parsing_fills_missing_sections_from_defaults() {
        let parsed: KeywordConfig =
            toml::from_str(r#"keywords = ["Robotics", "  robotics ", ""]"#).unwrap();
        let cfg = parsed.normalized();
        assert_eq!(cfg.keywords, vec!["robotics".to_string()]);
        // serde(default) keeps the compiled-in promo list.
        assert!(!cfg.promo_keywords.is_empty());
    }

    #[tokio::test]
    async fn run_settings_load_with_overrides_and_bad_values() {
        let store = crate::store::Store::open_in_memory().await.unwrap();
        store.settings().set("lookback_hours", "48", None).await.unwrap();
        store.settings().set("max_news_count", "not-a-number", None).await.unwrap();
        store.settings().set("relevance_threshold", "99", None).await.unwrap();

        let settings = RunSettings::load(&store).await.unwrap();
        assert_eq!(settings.lookback_hours, 48);
        assert_eq!(settings.max_news_count, RunSettings::default().max_news_count);
        assert_eq!(settings.relevance_threshold, 10);
        assert_eq!(settings.summary_max_length, 150);
    }
}
