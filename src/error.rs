//! Error taxonomy for the ingestion/classification/alert pipeline.
//!
//! Components return `anyhow::Result<T>` for internal propagation (the
//! teacher's convention throughout `scrapers/` and `signals/`). `ErrorKind`
//! is the stable, typed surface the orchestrator downcasts to when it needs
//! to attribute a failure to a specific cycle-stats counter.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("config error: {0}")]
    Config(String),

    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("permanent network error ({status}): {0}", status = .1)]
    PermanentNetwork(String, u16),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("data gap: {0}")]
    DataGap(String),

    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimit { retry_after_ms: u64 },

    #[error("cost limit reached: {0}")]
    CostLimit(String),

    #[error("seen-store error: {0}")]
    Store(String),
}

impl ErrorKind {
    /// Best-effort classification of an HTTP status into the taxonomy.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => ErrorKind::RateLimit { retry_after_ms: 0 },
            500..=599 => ErrorKind::TransientNetwork(format!("http {status}")),
            400..=499 => ErrorKind::PermanentNetwork(format!("http {status}"), status),
            _ => ErrorKind::TransientNetwork(format!("http {status}")),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::TransientNetwork(_) | ErrorKind::RateLimit { .. }
        )
    }

    /// The `skipped`/`dropped` reason tag used in structured logs and CycleStats.
    pub fn reason_tag(&self) -> &'static str {
        match self {
            ErrorKind::Config(_) => "config_error",
            ErrorKind::TransientNetwork(_) => "transient_network",
            ErrorKind::PermanentNetwork(_, _) => "permanent_network",
            ErrorKind::Parse(_) => "parse_error",
            ErrorKind::DataGap(_) => "data_gap",
            ErrorKind::RateLimit { .. } => "rate_limited",
            ErrorKind::CostLimit(_) => "cost_limit",
            ErrorKind::Store(_) => "store_error",
        }
    }
}
