//! Append-only JSONL event log (spec.md §6: "JSONL log file for structured
//! events (events.log)") — the write side of the outcome-tracking
//! interface external collaborators (price-trajectory tracking, weight
//! feedback loops, backtesting) consume as a read-only stream.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum Event<'a> {
    #[serde(rename = "alert_posted")]
    AlertPosted {
        ticker: &'a str,
        idempotency_key: &'a str,
        catalyst_score: f64,
        cycle_id: u64,
    },
    #[serde(rename = "alert_failed")]
    AlertFailed {
        ticker: &'a str,
        idempotency_key: &'a str,
        status: Option<u16>,
        cycle_id: u64,
    },
    #[serde(rename = "item_rejected")]
    ItemRejected { gate: &'a str, source: &'a str, cycle_id: u64 },
    #[serde(rename = "cycle_completed")]
    CycleCompleted {
        cycle_id: u64,
        fetched: u64,
        alerts_sent: u64,
        duration_ms: u64,
    },
}

pub struct EventsLog {
    file: Mutex<std::fs::File>,
}

impl EventsLog {
    pub fn open(path: &str) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }

    pub fn record(&self, event: &Event) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "failed to serialize event");
                return;
            }
        };
        let mut file = self.file.lock();
        if let Err(err) = writeln!(file, "{line}") {
            warn!(error = %err, "failed to write events.log entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;

    #[test]
    fn records_are_appended_as_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        let log = EventsLog::open(path.to_str().unwrap()).unwrap();

        log.record(&Event::AlertPosted {
            ticker: "ACME",
            idempotency_key: "abc",
            catalyst_score: 7.5,
            cycle_id: 1,
        });
        log.record(&Event::ItemRejected {
            gate: "skipped_low_score",
            source: "prnewswire",
            cycle_id: 1,
        });

        let contents = std::fs::read(&path).unwrap();
        let lines: Vec<_> = contents.lines().map(|l| l.unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("alert_posted"));
        assert!(lines[1].contains("item_rejected"));
    }
}
