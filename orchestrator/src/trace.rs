//! Trace Logger: append-only JSONL diagnostic stream, one file per run.
//!
//! Grounded on common `tracing`-field-naming conventions (`run_id`,
//! `%`-display values) but implemented with a process-wide
//! `Mutex` guarding open/close-per-append so the file survives a crash
//! mid-write, under `tmp/run_logs/<sanitized_run_id>.jsonl`.

use std::fs::OpenOptions;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One trace line. `fields` carries stage-specific structured context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    /// RFC3339 timestamp with nanosecond precision, UTC.
    pub timestamp: String,
    pub run_id: String,
    pub source: String,
    pub stage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Value>,
}

/// Replaces any byte outside `[A-Za-z0-9._-]` with `_`, so a `run_id` is
/// always a safe filename component.
pub fn sanitize_run_id(run_id: &str) -> String {
    run_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Appends [`TraceEvent`] lines to `tmp/run_logs/<sanitized>.jsonl`, one file
/// per run, guarded by a process-wide mutex. Opens and closes the file on
/// every append rather than holding a handle, so a crash mid-run doesn't
/// corrupt in-flight writes.
pub struct TraceLogger {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl TraceLogger {
    /// `root` is the `tmp/` directory; log files live under `root/run_logs/`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn path_for(&self, run_id: &str) -> PathBuf {
        self.root
            .join("run_logs")
            .join(format!("{}.jsonl", sanitize_run_id(run_id)))
    }

    /// Appends one trace line for `run_id`.
    pub fn append(
        &self,
        run_id: &str,
        source: &str,
        stage: &str,
        fields: Option<Value>,
    ) -> std::io::Result<()> {
        let event = TraceEvent {
            timestamp: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true),
            run_id: run_id.to_string(),
            source: source.to_string(),
            stage: stage.to_string(),
            fields,
        };
        let line = serde_json::to_string(&event)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let path = self.path_for(run_id);
        let _guard = self.write_lock.lock().unwrap();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{line}")
    }

    /// Reads all well-formed trace events for `run_id`; malformed lines are
    /// skipped rather than aborting the read.
    pub fn read(&self, run_id: &str) -> std::io::Result<Vec<TraceEvent>> {
        read_trace_file(&self.path_for(run_id))
    }
}

fn read_trace_file(path: &Path) -> std::io::Result<Vec<TraceEvent>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut events = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(event) = serde_json::from_str::<TraceEvent>(&line) {
            events.push(event);
        }
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_unsafe_chars() {
        assert_eq!(sanitize_run_id("bootstrap/123:run"), "bootstrap_123_run");
        assert_eq!(sanitize_run_id("a.b-c_1"), "a.b-c_1");
    }

    #[test]
    fn append_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let logger = TraceLogger::new(dir.path());
        logger
            .append("run-1", "executor", "started", None)
            .unwrap();
        logger
            .append(
                "run-1",
                "scheduler",
                "chunk_launched",
                Some(serde_json::json!({"chunk": [1, 2]})),
            )
            .unwrap();

        let events = logger.read("run-1").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].stage, "started");
        assert_eq!(events[1].fields.as_ref().unwrap()["chunk"][0], 1);
    }

    #[test]
    fn read_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let logger = TraceLogger::new(dir.path());
        logger.append("run-1", "x", "y", None).unwrap();
        let path = dir.path().join("run_logs").join("run-1.jsonl");
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "not json at all").unwrap();
        logger.append("run-1", "x", "z", None).unwrap();

        let events = logger.read("run-1").unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn read_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let logger = TraceLogger::new(dir.path());
        assert!(logger.read("never-ran").unwrap().is_empty());
    }
}
