//! Validation and publishing of the rendered digest.
//!
//! Soft checks only warn; the size check blocks. The transport gets one
//! attempt, no retries: a duplicate digest in the channel is worse than a
//! missing one, and the next scheduled run covers the gap.

pub mod telegram;

pub use telegram::TelegramPublisher;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::warn;

use crate::digest::{Digest, DIGEST_CHAR_LIMIT};
use crate::summarize::SummarizedItem;

/// Shorter than this is suspicious but not fatal.
const MIN_DIGEST_CHARS: usize = 50;
/// Average summary quality below this is recorded as a warning.
const QUALITY_WARN_THRESHOLD: f64 = 5.0;

#[async_trait]
pub trait PublishTransport: Send + Sync {
    async fn publish(&self, text: &str) -> Result<()>;

    /// Destination identifier, for logging only.
    fn destination(&self) -> &str;
}

#[derive(Debug, Default)]
pub struct PublishReport {
    pub warnings: Vec<String>,
}

/// Validate the digest, then send it. The caller marks items processed
/// only after this returns `Ok`; an `Err` here must leave the ledger
/// untouched.
pub async fn validate_and_publish(
    transport: &dyn PublishTransport,
    digest: &Digest,
    items: &[SummarizedItem],
) -> Result<PublishReport> {
    let mut report = PublishReport::default();

    let chars = digest.text.chars().count();
    if chars < MIN_DIGEST_CHARS {
        report.warnings.push(format!("digest is suspiciously short ({chars} chars)"));
    }
    if items.is_empty() {
        report.warnings.push("digest carries no items".to_string());
    } else {
        let avg =
            items.iter().map(|i| f64::from(i.quality)).sum::<f64>() / items.len() as f64;
        if avg < QUALITY_WARN_THRESHOLD {
            report.warnings.push(format!("average summary quality {avg:.1} is low"));
        }
    }
    for warning in &report.warnings {
        warn!(destination = transport.destination(), warning = %warning, "digest validation warning");
    }

    if chars > DIGEST_CHAR_LIMIT {
        bail!("digest exceeds the {DIGEST_CHAR_LIMIT} character limit ({chars} chars)");
    }

    transport
        .publish(&digest.text)
        .await
        .context("publish transport failed")?;
    Ok(report)
}
