use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// A focus session that ran long enough to be kept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedSession {
    pub date: DateTime<Utc>,
    pub duration_secs: f64,
}

impl CompletedSession {
    pub fn new(duration: Duration, date: DateTime<Utc>) -> Self {
        Self {
            date,
            duration_secs: duration.as_secs_f64(),
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs.max(0.0))
    }
}

/// Append-only log of completed sessions
#[async_trait::async_trait]
pub trait SessionHistory: Send + Sync {
    async fn record_completed_session(&self, duration: Duration, timestamp: DateTime<Utc>) -> Result<()>;

    /// All recorded sessions, oldest first
    async fn sessions(&self) -> Result<Vec<CompletedSession>>;
}

/// History kept in memory only
#[derive(Debug, Default)]
pub struct MemorySessionHistory {
    sessions: Mutex<Vec<CompletedSession>>,
}

impl MemorySessionHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SessionHistory for MemorySessionHistory {
    async fn record_completed_session(&self, duration: Duration, timestamp: DateTime<Utc>) -> Result<()> {
        self.sessions
            .lock()
            .await
            .push(CompletedSession::new(duration, timestamp));
        Ok(())
    }

    async fn sessions(&self) -> Result<Vec<CompletedSession>> {
        Ok(self.sessions.lock().await.clone())
    }
}

/// History as JSON lines, one session per line
#[derive(Debug)]
pub struct JsonlSessionHistory {
    path: PathBuf,
    append_lock: Mutex<()>,
}

impl JsonlSessionHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            append_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl SessionHistory for JsonlSessionHistory {
    async fn record_completed_session(&self, duration: Duration, timestamp: DateTime<Utc>) -> Result<()> {
        let session = CompletedSession::new(duration, timestamp);
        let mut line = serde_json::to_string(&session)?;
        line.push('\n');

        let _guard = self.append_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open session history: {:?}", self.path))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        info!("Session recorded: {:.0}s at {}", session.duration_secs, session.date);
        Ok(())
    }

    async fn sessions(&self) -> Result<Vec<CompletedSession>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read session history: {:?}", self.path))
            }
        };

        let mut sessions = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CompletedSession>(line) {
                Ok(session) => sessions.push(session),
                Err(e) => warn!("Skipping malformed history line {}: {}", index + 1, e),
            }
        }
        Ok(sessions)
    }
}
