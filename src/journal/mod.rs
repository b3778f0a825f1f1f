//! Trade journal
//!
//! Append-only JSONL streams for trades, strategy decisions, oracle reads and
//! errors, plus a single performance snapshot rewritten atomically.

use anyhow::Context;
use chrono::Utc;
use serde_json::{json, Value};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

/// Which JSONL stream an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Trades,
    Strategy,
    Oracle,
    Errors,
}

impl Stream {
    fn file_name(&self) -> &'static str {
        match self {
            Stream::Trades => "trades.jsonl",
            Stream::Strategy => "strategy.jsonl",
            Stream::Oracle => "oracle.jsonl",
            Stream::Errors => "errors.jsonl",
        }
    }
}

/// JSONL journal writer
pub struct Journal {
    log_dir: PathBuf,
    performance_path: PathBuf,
}

impl Journal {
    pub fn new(log_dir: PathBuf, performance_path: PathBuf) -> anyhow::Result<Self> {
        fs::create_dir_all(&log_dir).context("creating log directory")?;
        if let Some(parent) = performance_path.parent() {
            fs::create_dir_all(parent).context("creating performance directory")?;
        }
        Ok(Self {
            log_dir,
            performance_path,
        })
    }

    /// Append one record to a stream, stamped with the write time
    pub fn append(&self, stream: Stream, mut record: Value) -> anyhow::Result<()> {
        if let Value::Object(ref mut map) = record {
            map.insert("ts".to_string(), json!(Utc::now().to_rfc3339()));
        }
        let path = self.log_dir.join(stream.file_name());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        let line = serde_json::to_string(&record).context("serializing journal record")?;
        writeln!(file, "{}", line).with_context(|| format!("appending to {}", path.display()))?;
        Ok(())
    }

    /// Rewrite the performance snapshot atomically: temp file then rename
    pub fn save_performance(&self, mut snapshot: Value) -> anyhow::Result<()> {
        if let Value::Object(ref mut map) = snapshot {
            map.insert("ts".to_string(), json!(Utc::now().to_rfc3339()));
        }
        let tmp = self.performance_path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(&snapshot).context("serializing performance")?;
        fs::write(&tmp, body).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.performance_path)
            .with_context(|| format!("renaming into {}", self.performance_path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn journal(dir: &TempDir) -> Journal {
        Journal::new(
            dir.path().join("logs"),
            dir.path().join("data/performance.json"),
        )
        .unwrap()
    }

    #[test]
    fn test_append_is_jsonl() {
        let dir = TempDir::new().unwrap();
        let j = journal(&dir);

        j.append(Stream::Trades, json!({"trade_id": "T-1", "size_usd": 25.0}))
            .unwrap();
        j.append(Stream::Trades, json!({"trade_id": "T-2", "size_usd": 10.0}))
            .unwrap();

        let body = fs::read_to_string(dir.path().join("logs/trades.jsonl")).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["trade_id"], "T-1");
        assert!(first["ts"].is_string());
    }

    #[test]
    fn test_streams_are_separate_files() {
        let dir = TempDir::new().unwrap();
        let j = journal(&dir);

        j.append(Stream::Strategy, json!({"direction": "up"})).unwrap();
        j.append(Stream::Oracle, json!({"price": 60000.0})).unwrap();
        j.append(Stream::Errors, json!({"error": "boom"})).unwrap();

        assert!(dir.path().join("logs/strategy.jsonl").exists());
        assert!(dir.path().join("logs/oracle.jsonl").exists());
        assert!(dir.path().join("logs/errors.jsonl").exists());
        assert!(!dir.path().join("logs/trades.jsonl").exists());
    }

    #[test]
    fn test_performance_snapshot_overwrites() {
        let dir = TempDir::new().unwrap();
        let j = journal(&dir);

        j.save_performance(json!({"cycle": 1})).unwrap();
        j.save_performance(json!({"cycle": 2})).unwrap();

        let body = fs::read_to_string(dir.path().join("data/performance.json")).unwrap();
        let snapshot: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(snapshot["cycle"], 2);

        // No temp file left behind
        assert!(!dir.path().join("data/performance.json.tmp").exists());
    }
}
