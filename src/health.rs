//! Health server: `/health/ping` and `/health/detailed` (spec.md §6).
//!
//! Grounded on the teacher's `edge_receiver::start_metrics_server` shape
//! (a tiny axum router serving a liveness route plus a stats snapshot),
//! swapped here for the orchestrator's last-cycle stats rather than
//! receiver throughput counters.

use std::sync::Arc;

use axum::{routing::get, Json, Router};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

use crate::models::CycleStats;

#[derive(Debug, Clone, Serialize)]
pub struct DetailedHealth {
    pub status: &'static str,
    pub last_cycle: Option<CycleStats>,
    pub consecutive_empty_cycles: u32,
    pub uptime_seconds: u64,
}

/// Shared snapshot the orchestrator updates after every cycle; the health
/// server only ever reads it.
pub struct HealthState {
    pub last_cycle: RwLock<Option<CycleStats>>,
    pub consecutive_empty_cycles: RwLock<u32>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl HealthState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            last_cycle: RwLock::new(None),
            consecutive_empty_cycles: RwLock::new(0),
            started_at: chrono::Utc::now(),
        })
    }

    pub fn record_cycle(&self, stats: CycleStats, consecutive_empty_cycles: u32) {
        *self.last_cycle.write() = Some(stats);
        *self.consecutive_empty_cycles.write() = consecutive_empty_cycles;
    }

    fn snapshot(&self) -> DetailedHealth {
        DetailedHealth {
            status: "ok",
            last_cycle: self.last_cycle.read().clone(),
            consecutive_empty_cycles: *self.consecutive_empty_cycles.read(),
            uptime_seconds: (chrono::Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }
}

pub async fn serve(bind_addr: &str, state: Arc<HealthState>) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/health/ping", get(|| async { "OK" }))
        .route(
            "/health/detailed",
            get({
                let state = state.clone();
                move || {
                    let state = state.clone();
                    async move { Json(state.snapshot()) }
                }
            }),
        );

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(bind_addr, "health server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
