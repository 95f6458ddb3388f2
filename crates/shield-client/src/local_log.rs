//! Device-local fallback log for messages the shared store did not accept.
//!
//! Append-only. Entries are never rewritten or removed here; the file
//! variant stores one JSON object per line.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use shield_core::{Identity, LocalMessageLog, Message, Result};

fn involves(message: &Message, identity: &Identity) -> bool {
    &message.sender == identity || &message.recipient == identity
}

/// In-memory log.
#[derive(Debug, Default)]
pub struct MemoryMessageLog {
    entries: Mutex<Vec<Message>>,
}

impl MemoryMessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl LocalMessageLog for MemoryMessageLog {
    async fn append(&self, message: &Message) -> Result<()> {
        self.entries.lock().await.push(message.clone());
        Ok(())
    }

    async fn list_involving(&self, identity: &Identity) -> Result<Vec<Message>> {
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .filter(|m| involves(m, identity))
            .cloned()
            .collect())
    }
}

/// JSON-lines log file.
///
/// Appends are serialized through an internal lock so one process never
/// interleaves partial lines.
#[derive(Debug)]
pub struct FileMessageLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileMessageLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LocalMessageLog for FileMessageLog {
    async fn append(&self, message: &Message) -> Result<()> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.sync_data().await?;

        debug!(
            subsystem = "exchange",
            component = "local_log",
            op = "append",
            message_id = %message.id,
            "Message appended to local log"
        );
        Ok(())
    }

    async fn list_involving(&self, identity: &Identity) -> Result<Vec<Message>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut messages = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Message>(line) {
                Ok(message) if involves(&message, identity) => messages.push(message),
                Ok(_) => {}
                Err(e) => warn!(
                    subsystem = "exchange",
                    component = "local_log",
                    line = index + 1,
                    error = %e,
                    "Skipping unreadable local log entry"
                ),
            }
        }
        Ok(messages)
    }
}
