//! Session trace persistence
//!
//! Every event of a run is appended to `<dir>/<session_id>.jsonl` as it is
//! emitted, so a trace survives a crash mid-run and can be fetched later by
//! session id.

use crate::events::{EventSink, TraceEvent};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum SessionLogError {
    #[error("invalid session id: {0:?}")]
    InvalidId(String),

    #[error("session not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Directory of per-session trace files
#[derive(Debug, Clone)]
pub struct SessionLog {
    dir: PathBuf,
}

impl SessionLog {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, SessionLogError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        tracing::debug!(dir = %dir.display(), "Session log directory ready");
        Ok(Self { dir })
    }

    fn path_for(&self, session_id: &str) -> Result<PathBuf, SessionLogError> {
        if !is_valid_id(session_id) {
            return Err(SessionLogError::InvalidId(session_id.to_string()));
        }
        Ok(self.dir.join(format!("{session_id}.jsonl")))
    }

    /// Sink appending to this session's file
    pub async fn sink(&self, session_id: &str) -> Result<SessionLogSink, SessionLogError> {
        let path = self.path_for(session_id)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(SessionLogSink {
            session_id: session_id.to_string(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Recorded events of a session, in emission order
    pub async fn read(&self, session_id: &str) -> Result<Vec<TraceEvent>, SessionLogError> {
        let path = self.path_for(session_id)?;
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SessionLogError::NotFound(session_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut events = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<TraceEvent>(line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::warn!(session_id, error = %e, "Skipping unreadable trace line");
                }
            }
        }
        Ok(events)
    }
}

/// Ids come from clients on retrieval; only plain names map to files
fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub struct SessionLogSink {
    session_id: String,
    writer: Mutex<BufWriter<File>>,
}

impl SessionLogSink {
    async fn append(&self, event: &TraceEvent) -> Result<(), std::io::Error> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await
    }
}

#[async_trait]
impl EventSink for SessionLogSink {
    async fn send(&self, event: &TraceEvent) {
        if let Err(e) = self.append(event).await {
            tracing::error!(
                session_id = %self.session_id,
                sequence = event.sequence,
                error = %e,
                "Failed to persist trace event"
            );
        }
    }
}
