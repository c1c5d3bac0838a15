//! Seen-Store: persisted record of already-alerted fingerprints, with TTL
//! eviction (spec.md §4.4).
//!
//! Generalizes the teacher's `DbSignalStorage`
//! (`signals/db_storage.rs`): `rusqlite` opened with explicit `OpenFlags`,
//! WAL mode verified after schema init, `Arc<Mutex<Connection>>` guarding a
//! single connection (`parking_lot::Mutex`, not `std::sync::Mutex`, for the
//! same reason the teacher uses it — no poisoning, cheaper uncontended
//! lock). Unlike the teacher's append-only signal log, this store's whole
//! purpose is bounded size, so eviction is load-bearing, not optional
//! housekeeping.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use tracing::{error, info, warn};

use crate::models::SeenRecord;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS seen (
    fingerprint TEXT PRIMARY KEY,
    first_seen_at TEXT NOT NULL,
    source TEXT NOT NULL,
    weight INTEGER NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_seen_first_seen_at ON seen(first_seen_at);
"#;

/// How many purge calls between amortized TTL sweeps (spec.md §4.4: "purge
/// should not run on every cycle if the table is large").
const PURGE_EVERY_N_CALLS: u64 = 20;

pub struct SeenStore {
    conn: Arc<Mutex<Connection>>,
    ttl: Duration,
    calls_since_purge: Arc<Mutex<u64>>,
    /// Best-effort dedup for fingerprints whose durable write persistently
    /// failed (spec.md §4.15 `StoreError`: "retry once; on persistent
    /// failure, emit critical log and mark in-memory for the remainder of
    /// the cycle"). Never cleared, so it also survives past the cycle that
    /// produced it — strictly more durable than the spec requires, not less.
    memory_fallback: Arc<Mutex<HashSet<String>>>,
}

impl SeenStore {
    pub fn open(db_path: &str, ttl_days: i64) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = match Connection::open_with_flags(db_path, flags) {
            Ok(conn) => conn,
            Err(err) => {
                // spec.md §4.4: self-heal on corruption by recreating the file
                // rather than crashing the process.
                warn!(error = %err, path = db_path, "seen-store open failed, recreating");
                std::fs::remove_file(db_path).ok();
                Connection::open_with_flags(db_path, flags)
                    .with_context(|| format!("failed to recreate seen-store at {db_path}"))?
            }
        };

        conn.execute_batch(SCHEMA_SQL)
            .context("failed to initialize seen-store schema")?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        if journal_mode.to_lowercase() != "wal" {
            warn!(journal_mode, "seen-store WAL mode not active");
        }

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM seen", [], |row| row.get(0))
            .unwrap_or(0);
        info!(path = db_path, rows = count, "seen-store opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            ttl: Duration::days(ttl_days),
            calls_since_purge: Arc::new(Mutex::new(0)),
            memory_fallback: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory(ttl_days: i64) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            ttl: Duration::days(ttl_days),
            calls_since_purge: Arc::new(Mutex::new(0)),
            memory_fallback: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    pub fn contains(&self, fingerprint: &str) -> Result<bool> {
        if self.memory_fallback.lock().contains(fingerprint) {
            return Ok(true);
        }
        let conn = self.conn.lock();
        let found: Option<String> = conn
            .query_row(
                "SELECT fingerprint FROM seen WHERE fingerprint = ?1",
                params![fingerprint],
                |row| row.get(0),
            )
            .ok();
        Ok(found.is_some())
    }

    fn insert_row(&self, record: &SeenRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO seen (fingerprint, first_seen_at, source, weight) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.fingerprint,
                record.first_seen_at.to_rfc3339(),
                record.source,
                record.weight,
            ],
        )?;
        Ok(())
    }

    /// spec.md §4.15 `StoreError`: retry once on write failure; on
    /// persistent failure, log CRITICAL and fall back to marking the
    /// fingerprint in memory so dedup degrades gracefully instead of
    /// silently re-alerting the same event later in the same cycle.
    pub fn record(&self, record: &SeenRecord) -> Result<()> {
        if let Err(first_err) = self.insert_row(record) {
            warn!(error = %first_err, fingerprint = %record.fingerprint, "seen-store write failed, retrying once");
            if let Err(second_err) = self.insert_row(record) {
                error!(
                    error = %second_err,
                    fingerprint = %record.fingerprint,
                    "seen-store write failed persistently, falling back to in-memory dedup"
                );
                self.memory_fallback.lock().insert(record.fingerprint.clone());
                return Ok(());
            }
        }
        self.maybe_purge()?;
        Ok(())
    }

    fn maybe_purge(&self) -> Result<()> {
        let mut calls = self.calls_since_purge.lock();
        *calls += 1;
        if *calls < PURGE_EVERY_N_CALLS {
            return Ok(());
        }
        *calls = 0;
        drop(calls);
        self.purge_expired(Utc::now())
    }

    /// spec.md §4.4: evict rows older than the configured TTL. Exposed with an
    /// explicit `now` so tests can exercise TTL boundaries deterministically.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<()> {
        let cutoff = (now - self.ttl).to_rfc3339();
        let conn = self.conn.lock();
        let removed = conn.execute("DELETE FROM seen WHERE first_seen_at < ?1", params![cutoff])?;
        if removed > 0 {
            info!(removed, "seen-store purged expired rows");
        }
        Ok(())
    }

    pub fn len(&self) -> Result<i64> {
        let conn = self.conn.lock();
        Ok(conn.query_row("SELECT COUNT(*) FROM seen", [], |row| row.get(0))?)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fp: &str, age_days: i64) -> SeenRecord {
        SeenRecord {
            fingerprint: fp.to_string(),
            first_seen_at: Utc::now() - Duration::days(age_days),
            source: "prnewswire".to_string(),
            weight: 1,
        }
    }

    #[test]
    fn records_and_finds_fingerprint() {
        let store = SeenStore::open_in_memory(7).unwrap();
        assert!(!store.contains("abc").unwrap());
        store.record(&record("abc", 0)).unwrap();
        assert!(store.contains("abc").unwrap());
    }

    #[test]
    fn purge_evicts_rows_past_ttl() {
        let store = SeenStore::open_in_memory(7).unwrap();
        store.record(&record("old", 10)).unwrap();
        store.record(&record("fresh", 1)).unwrap();
        store.purge_expired(Utc::now()).unwrap();
        assert!(!store.contains("old").unwrap());
        assert!(store.contains("fresh").unwrap());
    }

    #[test]
    fn insert_or_replace_is_idempotent() {
        let store = SeenStore::open_in_memory(7).unwrap();
        store.record(&record("abc", 0)).unwrap();
        store.record(&record("abc", 0)).unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn falls_back_to_memory_on_persistent_write_failure() {
        let store = SeenStore::open_in_memory(7).unwrap();
        // Force every durable write to fail.
        store.conn.lock().execute_batch("DROP TABLE seen").unwrap();

        assert!(store.record(&record("abc", 0)).is_ok());
        assert!(store.contains("abc").unwrap());
    }
}
