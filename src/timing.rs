//! Optional JSONL timing log.
//!
//! When enabled (CLI flag or `VHDL_TIMING_JSONL=<path>`), every pipeline
//! stage and per-file task appends one record:
//! `{phase, kind, file, status, start_ms, duration_ms, end_ms}`.
//! `phase=total` and `phase=scan` appear in every enabled run.

use parking_lot::Mutex;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

/// Environment variable enabling the log.
pub const TIMING_ENV: &str = "VHDL_TIMING_JSONL";

#[derive(Serialize)]
struct TimingRecord<'a> {
    phase: &'a str,
    kind: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    file: &'a str,
    status: &'a str,
    start_ms: i64,
    duration_ms: u64,
    end_ms: i64,
}

/// An in-flight measurement handed back to [`TimingRecorder::finish`].
#[derive(Debug)]
pub struct TimingSpan {
    phase: String,
    kind: &'static str,
    file: String,
    wall_start_ms: i64,
    started: Instant,
}

/// Appends timing records to a JSONL stream. A disabled recorder is a
/// no-op with the same API.
#[derive(Debug, Default)]
pub struct TimingRecorder {
    out: Option<Mutex<BufWriter<File>>>,
}

impl TimingRecorder {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn to_path(path: &Path) -> std::io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            out: Some(Mutex::new(BufWriter::new(file))),
        })
    }

    /// Recorder from `VHDL_TIMING_JSONL`; unset or unwritable means
    /// disabled.
    pub fn from_env() -> Self {
        let Some(path) = std::env::var_os(TIMING_ENV) else {
            return Self::disabled();
        };
        match Self::to_path(Path::new(&path)) {
            Ok(recorder) => recorder,
            Err(e) => {
                tracing::warn!(target: "timing", "cannot open timing log: {e}");
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.out.is_some()
    }

    pub fn start_stage(&self, phase: &str) -> TimingSpan {
        self.start(phase, "stage", "")
    }

    pub fn start_file(&self, phase: &str, file: &str) -> TimingSpan {
        self.start(phase, "file", file)
    }

    fn start(&self, phase: &str, kind: &'static str, file: &str) -> TimingSpan {
        TimingSpan {
            phase: phase.to_string(),
            kind,
            file: file.to_string(),
            wall_start_ms: chrono::Utc::now().timestamp_millis(),
            started: Instant::now(),
        }
    }

    /// Close a span with a status (`ok`, `error`, `cached`, ...).
    pub fn finish(&self, span: TimingSpan, status: &str) {
        let Some(out) = &self.out else {
            return;
        };
        let duration_ms = span.started.elapsed().as_millis() as u64;
        let record = TimingRecord {
            phase: &span.phase,
            kind: span.kind,
            file: &span.file,
            status,
            start_ms: span.wall_start_ms,
            duration_ms,
            end_ms: span.wall_start_ms + duration_ms as i64,
        };
        let mut writer = out.lock();
        if let Ok(json) = serde_json::to_string(&record) {
            let _ = writeln!(writer, "{json}");
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn disabled_recorder_is_a_no_op() {
        let recorder = TimingRecorder::disabled();
        assert!(!recorder.is_enabled());
        let span = recorder.start_stage("total");
        recorder.finish(span, "ok");
    }

    #[test]
    fn records_are_one_json_object_per_line() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("timing.jsonl");
        let recorder = TimingRecorder::to_path(&path).unwrap();

        let total = recorder.start_stage("total");
        let file_span = recorder.start_file("extract", "a.vhd");
        recorder.finish(file_span, "ok");
        recorder.finish(total, "ok");
        drop(recorder);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["phase"], "extract");
        assert_eq!(first["kind"], "file");
        assert_eq!(first["file"], "a.vhd");
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["phase"], "total");
        assert!(second.get("file").is_none());
        assert!(second["end_ms"].as_i64().unwrap() >= second["start_ms"].as_i64().unwrap());
    }
}
