//! catalyst-bot binary: assembles every component from `Config`, spawns the
//! orchestrator loop and the health server side by side, and shuts both
//! down cleanly on SIGINT.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use catalyst_bot::classifier::{CatalystTaxonomy, Classifier};
use catalyst_bot::config::Config;
use catalyst_bot::enrichment::{EnrichmentPool, EnrichmentPoolConfig};
use catalyst_bot::events_log::EventsLog;
use catalyst_bot::feeds::{FeedSource, RssFeedSource, SecFeedSource, VendorJsonFeedSource};
use catalyst_bot::health::{self, HealthState};
use catalyst_bot::llm::{CostAccumulator, LlmClient};
use catalyst_bot::market_data::{MarketDataClient, MarketDataProvider};
use catalyst_bot::orchestrator::Orchestrator;
use catalyst_bot::sentiment::{SentimentAggregator, SentimentWeights};
use catalyst_bot::seen_store::SeenStore;
use catalyst_bot::ticker_resolver::TickerResolver;
use catalyst_bot::vendor_quote::VendorQuoteProvider;
use catalyst_bot::webhook::WebhookPoster;

#[derive(Parser, Debug)]
#[command(name = "catalyst-bot")]
#[command(about = "Real-time financial news alerting pipeline for sub-$10 catalyst trading")]
struct Args {
    /// Run exactly one cycle and exit, regardless of RUN_ONCE.
    #[arg(long)]
    once: bool,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("catalyst_bot=info")),
        )
        .with_target(true)
        .init();
}

fn build_sources(config: &Config) -> Vec<Box<dyn FeedSource>> {
    let timeout = config.fetch_timeout();
    let mut sources: Vec<Box<dyn FeedSource>> = Vec::new();

    for entry in &config.rss_feed_sources {
        if let Some((name, url)) = entry.split_once('=') {
            sources.push(Box::new(RssFeedSource::new(name, url, 1.0, timeout)));
        }
    }
    if let Some(url) = &config.vendor_json_url {
        sources.push(Box::new(VendorJsonFeedSource::new("vendor_json", url.clone(), 1.0, timeout)));
    }
    if let Some(url) = &config.sec_edgar_url {
        sources.push(Box::new(SecFeedSource::new(url.clone(), 1.5, timeout)));
    }

    sources
}

fn build_market_data_client(config: &Config, http: reqwest::Client) -> MarketDataClient {
    let providers: Vec<(std::sync::Arc<dyn MarketDataProvider>, u32, u32)> = config
        .market_data_vendor_urls
        .iter()
        .enumerate()
        .map(|(idx, url)| {
            let provider: std::sync::Arc<dyn MarketDataProvider> = std::sync::Arc::new(
                VendorQuoteProvider::new(
                    format!("vendor_{idx}"),
                    http.clone(),
                    url.clone(),
                    None,
                    Duration::from_secs(8),
                ),
            );
            (provider, config.market_data_rate_per_min, config.market_data_rate_per_min)
        })
        .collect();

    MarketDataClient::new(providers)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    let mut config = Config::from_env().context("loading configuration")?;
    if args.once {
        config.once = true;
    }
    let config = Arc::new(config);

    info!(
        cycle_seconds_regular = config.cycle_seconds_regular,
        once = config.once,
        "starting catalyst-bot"
    );

    let http = reqwest::Client::builder()
        .timeout(config.fetch_timeout())
        .build()
        .context("building HTTP client")?;

    let sources = build_sources(&config);
    if sources.is_empty() {
        tracing::warn!("no feed sources configured; every cycle will be empty");
    }

    let seen_store = SeenStore::open(&config.seen_store_path, config.seen_ttl_days)
        .context("opening seen-store")?;

    let ticker_resolver = TickerResolver::new(
        Default::default(),
        config.min_relevance,
        config.max_primary,
        config.score_diff_threshold,
    );

    let classifier = Classifier::new(CatalystTaxonomy::default_taxonomy());
    let sentiment = SentimentAggregator::new(SentimentWeights::default());

    let market_data = Arc::new(build_market_data_client(&config, http.clone()));
    let enrichment = EnrichmentPool::new(
        market_data,
        EnrichmentPoolConfig {
            float_workers: config.float_pool_workers,
            rvol_workers: config.rvol_pool_workers,
            vwap_workers: config.vwap_pool_workers,
            // spec.md §4.8: batch price/enrichment shares the single
            // cycle-level deadline (default 10s), not a multiple of the
            // unrelated LLM batch-release timeout.
            per_ticker_timeout: config.cycle_deadline(),
        },
    );

    let webhook_url = config
        .webhook_url
        .clone()
        .context("WEBHOOK_URL is required to post alerts")?;
    let webhook = WebhookPoster::new(
        http.clone(),
        webhook_url,
        config.alerts_jitter_ms,
        config.alerts_key_rate_limit_per_min,
    );
    let admin_webhook = config
        .admin_webhook_url
        .clone()
        .map(|url| WebhookPoster::new(http.clone(), url, 0, 0));

    let events_log = EventsLog::open("./events.log").context("opening events.log")?;
    let health_state = HealthState::new();

    let llm = config.llm_api_key.clone().map(|api_key| {
        let cost = Arc::new(CostAccumulator::new(
            config.cost_warn_usd,
            config.cost_crit_usd,
            config.cost_emergency_usd,
        ));
        cost.clone().spawn_daily_reset();
        LlmClient::new(
            http.clone(),
            api_key,
            cost,
            config.llm_batch_size,
            Duration::from_secs_f64(config.llm_batch_timeout_s),
            config.llm_rate_limit_per_min,
        )
    });
    if llm.is_none() {
        tracing::warn!("no LLM_API_KEY configured; SEC filings will not receive LLM analysis");
    }

    let orchestrator = Orchestrator::new(
        config.clone(),
        sources,
        seen_store,
        ticker_resolver,
        classifier,
        sentiment,
        enrichment,
        webhook,
        admin_webhook,
        events_log,
        health_state.clone(),
        llm,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let health_bind_addr = config.health_bind_addr.clone();
    let health_task = tokio::spawn(async move {
        if let Err(err) = health::serve(&health_bind_addr, health_state).await {
            tracing::error!(error = %err, "health server exited");
        }
    });

    let orchestrator_task = tokio::spawn(async move {
        orchestrator.run(shutdown_rx).await;
    });

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    orchestrator_task.await.context("orchestrator task panicked")?;
    health_task.abort();

    info!("catalyst-bot stopped");
    Ok(())
}
