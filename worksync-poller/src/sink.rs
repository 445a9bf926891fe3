//! Where change events go once a tick produced them.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use worksync_core::ChangeEvent;

use crate::error::{io_err, PollError};

/// Change-ingestion boundary.
#[async_trait]
pub trait ChangeSink: Send + Sync {
    async fn submit(&self, record: ChangeRecord) -> Result<(), PollError>;
}

/// An event tagged with the poller that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub poller: String,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: ChangeEvent,
}

/// Appends one JSON object per line to a file.
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ChangeSink for JsonLinesSink {
    async fn submit(&self, record: ChangeRecord) -> Result<(), PollError> {
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err(parent, e))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| io_err(&self.path, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| io_err(&self.path, e))?;
        file.flush().await.map_err(|e| io_err(&self.path, e))
    }
}

/// Forwards records into an in-process channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<ChangeRecord>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<ChangeRecord>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl ChangeSink for ChannelSink {
    async fn submit(&self, record: ChangeRecord) -> Result<(), PollError> {
        self.tx
            .send(record)
            .await
            .map_err(|_| PollError::ChannelClosed("change sink"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(files: &[&str]) -> ChangeRecord {
        ChangeRecord {
            poller: "x86_64 rsync://mirror".into(),
            at: Utc::now(),
            event: ChangeEvent {
                author: "someone".into(),
                files: files.iter().map(|s| s.to_string()).collect(),
                comments: "----".into(),
                branch: "master".into(),
            },
        }
    }

    #[tokio::test]
    async fn json_lines_sink_appends() {
        let dir = TempDir::new().expect("tempdir");
        let sink = JsonLinesSink::new(dir.path().join("out/changes.jsonl"));
        sink.submit(record(&["srcpkgs/foo/template"]))
            .await
            .expect("first");
        sink.submit(record(&[])).await.expect("second");

        let contents = std::fs::read_to_string(sink.path()).expect("read");
        let lines: Vec<ChangeRecord> = contents
            .lines()
            .map(|l| serde_json::from_str(l).expect("json line"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].event.files, ["srcpkgs/foo/template"]);
        assert!(lines[1].event.files.is_empty());
        assert!(contents.lines().next().unwrap_or_default().contains("\"branch\":\"master\""));
    }

    #[tokio::test]
    async fn channel_sink_reports_closed_receiver() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let err = ChannelSink::new(tx).submit(record(&[])).await.unwrap_err();
        assert!(matches!(err, PollError::ChannelClosed(_)));
    }
}
