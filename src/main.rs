//! Trigger surface: run exactly one digest cycle, report it, exit.
//!
//! Scheduling lives outside the process (cron, systemd timers, CI). Exit
//! code 0 means the cycle completed; anything else means the run record
//! says failed and the logs say why.

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use channel_digest::config::{AppConfig, KeywordConfig};
use channel_digest::ingest::providers::GatewayAdapter;
use channel_digest::metrics::Metrics;
use channel_digest::pipeline::Collector;
use channel_digest::publish::TelegramPublisher;
use channel_digest::store::Store;
use channel_digest::summarize::{build_engine, RetryPolicy, SummaryEngine};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("channel_digest=info,warn"));
    let json = std::env::var("DIGEST_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).compact().init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Local dev convenience; in production the environment is already set.
    let _ = dotenvy::dotenv();
    init_tracing();

    // Optional `run` argument so cron lines read naturally.
    if let Some(arg) = std::env::args().nth(1) {
        if arg != "run" {
            eprintln!("usage: channel-digest [run]");
            return ExitCode::from(2);
        }
    }

    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %format!("{e:#}"), "startup failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<bool> {
    let config = AppConfig::from_env()?;
    let keywords = Arc::new(KeywordConfig::load_default()?);

    // A failed recorder install only costs the log snapshot.
    let metrics = match Metrics::init() {
        Ok(m) => Some(m),
        Err(e) => {
            warn!(error = %e, "metrics recorder unavailable");
            None
        }
    };

    let store = Store::connect(&config.database_url).await?;
    store.migrate().await?;

    let bot_token = config
        .bot_token
        .clone()
        .ok_or_else(|| anyhow::anyhow!("DIGEST_BOT_TOKEN is not set"))?;
    let target = resolve_target(&config, &store).await?;

    let adapter = Arc::new(GatewayAdapter::from_url(
        &config.gateway_url,
        config.gateway_token.clone(),
    ));
    let engine_client = build_engine(&config, &keywords.topic);
    let engine = SummaryEngine::new(engine_client, RetryPolicy::default(), Arc::clone(&keywords));
    let publisher = Arc::new(TelegramPublisher::new(bot_token, target));

    let collector = Collector::new(store, adapter, engine, publisher, keywords)
        .with_fetch_limit(config.fetch_limit)
        .with_run_deadline(config.run_deadline);
    let outcome = collector.run_cycle().await;

    info!(
        success = outcome.success,
        sources = outcome.sources_processed,
        collected = outcome.items_collected,
        published = outcome.items_published,
        error = outcome.error.as_deref().unwrap_or(""),
        "cycle finished"
    );
    if let Some(metrics) = metrics {
        tracing::debug!(target: "channel_digest::metrics", "{}", metrics.render());
    }
    Ok(outcome.success)
}

/// The environment wins; the settings table is the fallback so operators
/// can retarget without a redeploy.
async fn resolve_target(config: &AppConfig, store: &Store) -> anyhow::Result<String> {
    if let Some(target) = &config.target_channel {
        return Ok(target.clone());
    }
    if let Some(target) = store.settings().get("target_channel").await? {
        let trimmed = target.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }
    anyhow::bail!("no publish destination: set DIGEST_TARGET_CHANNEL or the target_channel setting")
}
