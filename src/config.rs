//! Typed configuration, loaded once at startup from the environment.
//!
//! Mirrors the teacher's `models::Config::from_env` idiom
//! (`std::env::var(..).unwrap_or_else(|| default).parse().unwrap_or(default)`)
//! but covers the full surface from spec.md §6. Components receive an
//! `Arc<Config>` snapshot at construction time; nothing reads the
//! environment after startup (spec.md §9: "no ambient mutable state").

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // Cycle cadence
    pub cycle_seconds_regular: u64,
    pub market_open_cycle_sec: u64,
    pub extended_hours_cycle_sec: u64,
    pub market_closed_cycle_sec: u64,
    pub heartbeat_interval_min: u64,
    pub alert_consecutive_empty_cycles: u32,

    // Intake
    pub max_article_age_minutes: i64,
    pub max_sec_filing_age_minutes: i64,
    pub allow_otc: bool,
    pub filter_otc_stocks: bool,
    pub ignore_instrument_tickers: bool,

    // Gates
    pub min_score: f64,
    pub min_sent_abs: f64,
    pub price_floor: f64,
    pub price_ceiling: Option<f64>,
    pub categories_allow: Vec<String>,
    pub skip_sources: Vec<String>,
    pub min_avg_volume: f64,
    pub crypto_watchlist: Vec<String>,

    // Multi-ticker
    pub min_relevance: f64,
    pub max_primary: usize,
    pub score_diff_threshold: f64,

    // Alerting
    pub max_alerts_per_cycle: usize,
    pub alerts_jitter_ms: u64,
    pub alerts_key_rate_limit_per_min: u32,
    pub trade_plan_enabled: bool,

    // Enrichment / LLM
    pub enrichment_batch_size: usize,
    pub enrichment_batch_timeout_s: f64,
    pub enrichment_worker_threads: usize,
    pub float_pool_workers: usize,
    pub rvol_pool_workers: usize,
    pub vwap_pool_workers: usize,
    pub llm_batch_size: usize,
    pub llm_batch_timeout_s: f64,
    pub llm_rate_limit_per_min: u32,
    pub cost_warn_usd: f64,
    pub cost_crit_usd: f64,
    pub cost_emergency_usd: f64,

    // Seen-store
    pub seen_ttl_days: i64,
    pub seen_store_path: String,

    // Dedup
    pub fuzzy_similarity_threshold: f64,

    // Networking
    pub fetch_concurrency: usize,
    pub fetch_timeout_s: u64,
    pub cycle_deadline_s: u64,

    // Webhook
    pub webhook_url: Option<String>,
    pub admin_webhook_url: Option<String>,

    // Health server
    pub health_bind_addr: String,

    // Dynamic weights file
    pub dynamic_weights_path: String,
    pub default_category_weight: f64,

    // Feed sources: "name=url" pairs, comma separated
    pub rss_feed_sources: Vec<String>,
    pub vendor_json_url: Option<String>,
    pub sec_edgar_url: Option<String>,

    // Market-data vendors, priority order
    pub market_data_vendor_urls: Vec<String>,
    pub market_data_rate_per_min: u32,

    // LLM
    pub llm_api_key: Option<String>,

    pub once: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cycle_seconds_regular: 30,
            market_open_cycle_sec: 60,
            extended_hours_cycle_sec: 90,
            market_closed_cycle_sec: 180,
            heartbeat_interval_min: 60,
            alert_consecutive_empty_cycles: 5,

            max_article_age_minutes: 30,
            max_sec_filing_age_minutes: 240,
            allow_otc: true,
            filter_otc_stocks: true,
            ignore_instrument_tickers: true,

            min_score: 0.0,
            min_sent_abs: 0.0,
            price_floor: 0.10,
            price_ceiling: None,
            categories_allow: vec!["*".to_string()],
            skip_sources: Vec::new(),
            min_avg_volume: 0.0,
            crypto_watchlist: Vec::new(),

            min_relevance: 40.0,
            max_primary: 2,
            score_diff_threshold: 30.0,

            max_alerts_per_cycle: 40,
            alerts_jitter_ms: 0,
            alerts_key_rate_limit_per_min: 0,
            trade_plan_enabled: false,

            enrichment_batch_size: 10,
            enrichment_batch_timeout_s: 2.0,
            enrichment_worker_threads: 5,
            float_pool_workers: 10,
            rvol_pool_workers: 15,
            vwap_pool_workers: 15,
            llm_batch_size: 5,
            llm_batch_timeout_s: 2.0,
            llm_rate_limit_per_min: 60,
            cost_warn_usd: 5.0,
            cost_crit_usd: 10.0,
            cost_emergency_usd: 20.0,

            seen_ttl_days: 7,
            seen_store_path: "./catalyst_bot_seen.db".to_string(),

            fuzzy_similarity_threshold: 0.80,

            fetch_concurrency: 10,
            fetch_timeout_s: 8,
            cycle_deadline_s: 10,

            webhook_url: None,
            admin_webhook_url: None,

            health_bind_addr: "0.0.0.0:3000".to_string(),

            dynamic_weights_path: "./config/dynamic_weights.json".to_string(),
            default_category_weight: 0.50,

            rss_feed_sources: vec![
                "globenewswire=https://www.globenewswire.com/rss/news".to_string(),
                "prnewswire=https://www.prnewswire.com/rss/news-releases-list.rss".to_string(),
            ],
            vendor_json_url: None,
            sec_edgar_url: Some("https://data.sec.gov/submissions/recent.json".to_string()),

            market_data_vendor_urls: Vec::new(),
            market_data_rate_per_min: 60,

            llm_api_key: None,

            once: false,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
        .unwrap_or(default)
}

fn env_list(key: &str, default: Vec<String>) -> Vec<String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => default,
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let d = Config::default();
        Ok(Self {
            cycle_seconds_regular: env_or("CYCLE_SECONDS_REGULAR", d.cycle_seconds_regular),
            market_open_cycle_sec: env_or("MARKET_OPEN_CYCLE_SEC", d.market_open_cycle_sec),
            extended_hours_cycle_sec: env_or(
                "EXTENDED_HOURS_CYCLE_SEC",
                d.extended_hours_cycle_sec,
            ),
            market_closed_cycle_sec: env_or(
                "MARKET_CLOSED_CYCLE_SEC",
                d.market_closed_cycle_sec,
            ),
            heartbeat_interval_min: env_or("HEARTBEAT_INTERVAL_MIN", d.heartbeat_interval_min),
            alert_consecutive_empty_cycles: env_or(
                "ALERT_CONSECUTIVE_EMPTY_CYCLES",
                d.alert_consecutive_empty_cycles,
            ),

            max_article_age_minutes: env_or("MAX_ARTICLE_AGE_MINUTES", d.max_article_age_minutes),
            max_sec_filing_age_minutes: env_or(
                "MAX_SEC_FILING_AGE_MINUTES",
                d.max_sec_filing_age_minutes,
            ),
            allow_otc: env_bool("ALLOW_OTC", d.allow_otc),
            filter_otc_stocks: env_bool("FILTER_OTC_STOCKS", d.filter_otc_stocks),
            ignore_instrument_tickers: env_bool(
                "IGNORE_INSTRUMENT_TICKERS",
                d.ignore_instrument_tickers,
            ),

            min_score: env_or("MIN_SCORE", d.min_score),
            min_sent_abs: env_or("MIN_SENT_ABS", d.min_sent_abs),
            price_floor: env_or("PRICE_FLOOR", d.price_floor),
            price_ceiling: std::env::var("PRICE_CEILING")
                .ok()
                .and_then(|v| v.parse().ok()),
            categories_allow: env_list("CATEGORIES_ALLOW", d.categories_allow),
            skip_sources: env_list("SKIP_SOURCES", d.skip_sources),
            min_avg_volume: env_or("MIN_AVG_VOLUME", d.min_avg_volume),
            crypto_watchlist: env_list("CRYPTO_WATCHLIST", d.crypto_watchlist),

            min_relevance: env_or("MIN_RELEVANCE", d.min_relevance),
            max_primary: env_or("MAX_PRIMARY", d.max_primary),
            score_diff_threshold: env_or("SCORE_DIFF_THRESHOLD", d.score_diff_threshold),

            max_alerts_per_cycle: env_or("MAX_ALERTS_PER_CYCLE", d.max_alerts_per_cycle),
            alerts_jitter_ms: env_or("ALERTS_JITTER_MS", d.alerts_jitter_ms),
            alerts_key_rate_limit_per_min: env_or(
                "ALERTS_KEY_RATE_LIMIT",
                d.alerts_key_rate_limit_per_min,
            ),
            trade_plan_enabled: env_bool("TRADE_PLAN_ENABLED", d.trade_plan_enabled),

            enrichment_batch_size: env_or("ENRICHMENT_BATCH_SIZE", d.enrichment_batch_size),
            enrichment_batch_timeout_s: env_or(
                "ENRICHMENT_BATCH_TIMEOUT_S",
                d.enrichment_batch_timeout_s,
            ),
            enrichment_worker_threads: env_or(
                "ENRICHMENT_WORKER_THREADS",
                d.enrichment_worker_threads,
            ),
            float_pool_workers: env_or("FLOAT_POOL_WORKERS", d.float_pool_workers),
            rvol_pool_workers: env_or("RVOL_POOL_WORKERS", d.rvol_pool_workers),
            vwap_pool_workers: env_or("VWAP_POOL_WORKERS", d.vwap_pool_workers),
            llm_batch_size: env_or("LLM_BATCH_SIZE", d.llm_batch_size),
            llm_batch_timeout_s: env_or("LLM_BATCH_TIMEOUT_S", d.llm_batch_timeout_s),
            llm_rate_limit_per_min: env_or("LLM_RATE_LIMIT_PER_MIN", d.llm_rate_limit_per_min),
            cost_warn_usd: env_or("COST_WARN", d.cost_warn_usd),
            cost_crit_usd: env_or("COST_CRIT", d.cost_crit_usd),
            cost_emergency_usd: env_or("COST_EMERGENCY", d.cost_emergency_usd),

            seen_ttl_days: env_or("SEEN_TTL_DAYS", d.seen_ttl_days),
            seen_store_path: std::env::var("SEEN_STORE_PATH").unwrap_or(d.seen_store_path),

            fuzzy_similarity_threshold: env_or(
                "FUZZY_SIMILARITY_THRESHOLD",
                d.fuzzy_similarity_threshold,
            ),

            fetch_concurrency: env_or("FETCH_CONCURRENCY", d.fetch_concurrency),
            fetch_timeout_s: env_or("FETCH_TIMEOUT_S", d.fetch_timeout_s),
            cycle_deadline_s: env_or("CYCLE_DEADLINE_S", d.cycle_deadline_s),

            webhook_url: std::env::var("WEBHOOK_URL").ok(),
            admin_webhook_url: std::env::var("ADMIN_WEBHOOK_URL").ok(),

            health_bind_addr: std::env::var("HEALTH_BIND_ADDR").unwrap_or(d.health_bind_addr),

            dynamic_weights_path: std::env::var("DYNAMIC_WEIGHTS_PATH")
                .unwrap_or(d.dynamic_weights_path),
            default_category_weight: env_or(
                "DEFAULT_CATEGORY_WEIGHT",
                d.default_category_weight,
            ),

            rss_feed_sources: env_list("RSS_FEED_SOURCES", d.rss_feed_sources),
            vendor_json_url: std::env::var("VENDOR_JSON_URL").ok(),
            sec_edgar_url: std::env::var("SEC_EDGAR_URL").ok().or(d.sec_edgar_url),

            market_data_vendor_urls: env_list("MARKET_DATA_VENDOR_URLS", d.market_data_vendor_urls),
            market_data_rate_per_min: env_or("MARKET_DATA_RATE_PER_MIN", d.market_data_rate_per_min),

            llm_api_key: std::env::var("LLM_API_KEY").ok(),

            once: env_bool("RUN_ONCE", false),
        })
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_s)
    }

    pub fn cycle_deadline(&self) -> Duration {
        Duration::from_secs(self.cycle_deadline_s)
    }
}
