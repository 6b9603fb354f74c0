//! Append-only JSONL interaction log.
//!
//! Every inbound message and outbound reply is appended as one JSON line.
//! Opening the log runs a retention sweep that drops entries older than
//! the configured age, so the file stays bounded across long deployments.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::EngineError;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub channel: String,
    pub direction: Direction,
    pub text: String,
}

pub struct InteractionLog {
    path: PathBuf,
    retention: Duration,
}

impl InteractionLog {
    /// Open the log and sweep out entries older than `retention_hours`.
    pub fn open(path: impl Into<PathBuf>, retention_hours: u64) -> Result<Self, EngineError> {
        let log = Self {
            path: path.into(),
            retention: Duration::hours(retention_hours as i64),
        };
        log.sweep()?;
        Ok(log)
    }

    pub fn append(
        &self,
        channel: &str,
        direction: Direction,
        text: &str,
    ) -> Result<(), EngineError> {
        let entry = LogEntry {
            at: Utc::now(),
            channel: channel.to_string(),
            direction,
            text: text.to_string(),
        };
        let line = serde_json::to_string(&entry)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Read back the retained entries, oldest first. Unparseable lines are
    /// skipped.
    pub fn entries(&self) -> Result<Vec<LogEntry>, EngineError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        Ok(raw
            .lines()
            .filter_map(|line| serde_json::from_str::<LogEntry>(line).ok())
            .collect())
    }

    fn sweep(&self) -> Result<(), EngineError> {
        let entries = self.entries()?;
        if entries.is_empty() {
            return Ok(());
        }
        let cutoff = Utc::now() - self.retention;
        let kept: Vec<&LogEntry> = entries.iter().filter(|e| e.at >= cutoff).collect();
        let dropped = entries.len() - kept.len();
        if dropped == 0 {
            return Ok(());
        }

        let mut out = String::new();
        for entry in &kept {
            match serde_json::to_string(entry) {
                Ok(line) => {
                    out.push_str(&line);
                    out.push('\n');
                }
                Err(err) => warn!(%err, "skipping unserializable log entry during sweep"),
            }
        }
        fs::write(&self.path, out)?;
        info!(dropped, kept = kept.len(), "interaction log retention sweep");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appended_entries_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let log = InteractionLog::open(dir.path().join("log.jsonl"), 24).unwrap();

        log.append("ops", Direction::Inbound, "status?").unwrap();
        log.append("ops", Direction::Outbound, "all green").unwrap();

        let entries = log.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].direction, Direction::Inbound);
        assert_eq!(entries[1].text, "all green");
    }

    #[test]
    fn sweep_drops_expired_entries_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");

        let stale = LogEntry {
            at: Utc::now() - Duration::hours(48),
            channel: "ops".to_string(),
            direction: Direction::Inbound,
            text: "old".to_string(),
        };
        let fresh = LogEntry {
            at: Utc::now(),
            channel: "ops".to_string(),
            direction: Direction::Inbound,
            text: "new".to_string(),
        };
        let mut raw = serde_json::to_string(&stale).unwrap();
        raw.push('\n');
        raw.push_str(&serde_json::to_string(&fresh).unwrap());
        raw.push('\n');
        fs::write(&path, raw).unwrap();

        let log = InteractionLog::open(&path, 24).unwrap();
        let entries = log.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text, "new");
    }

    #[test]
    fn corrupt_lines_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        fs::write(&path, "not json at all\n").unwrap();

        let log = InteractionLog::open(&path, 24).unwrap();
        assert!(log.entries().unwrap().is_empty());
    }
}
