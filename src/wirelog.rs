use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Meta,
    Stdin,
    Stdout,
    Stderr,
}

#[derive(Debug, Serialize)]
struct WireRecord<'a> {
    ts: String,
    dir: Direction,
    line: &'a str,
}

/// JSONL transcript of everything that crossed the child's stdio.
/// A disabled log accepts records and drops them.
pub struct WireLog {
    writer: Option<BufWriter<File>>,
}

impl WireLog {
    pub fn disabled() -> Self {
        Self { writer: None }
    }

    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create wire log dir: {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("failed to open wire log: {}", path.display()))?;

        Ok(Self {
            writer: Some(BufWriter::new(file)),
        })
    }

    pub fn record(&mut self, dir: Direction, line: &str) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        let record = WireRecord {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            dir,
            line,
        };
        serde_json::to_writer(&mut *writer, &record).context("failed to encode wire record")?;
        writer
            .write_all(b"\n")
            .context("failed to append wire record")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush().context("failed to flush wire log")?;
        }
        Ok(())
    }
}

impl Drop for WireLog {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            tracing::warn!("wire log: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn records_are_one_json_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/wire.jsonl");

        let mut log = WireLog::create(&path).unwrap();
        log.record(Direction::Stdin, r#"{"type":"message"}"#).unwrap();
        log.record(Direction::Stderr, "warn: multi\tpart").unwrap();
        drop(log);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["dir"], "stdin");
        assert_eq!(lines[0]["line"], r#"{"type":"message"}"#);
        assert_eq!(lines[1]["dir"], "stderr");
        assert!(lines[1]["ts"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn create_truncates_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wire.jsonl");
        fs::write(&path, "stale\n").unwrap();

        let mut log = WireLog::create(&path).unwrap();
        log.record(Direction::Meta, "exit 0").unwrap();
        drop(log);

        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains("stale"));
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn disabled_log_drops_records() {
        let mut log = WireLog::disabled();
        log.record(Direction::Stdout, "ignored").unwrap();
        log.flush().unwrap();
    }
}
