//! JSONL transcript store: appends each finished invocation's message history
//! to a per-session file.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{DrawbridgeError, Result};

/// One finished invocation, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub session_id: String,
    pub input_text: String,
    pub messages: Vec<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// External document store for conversation transcripts.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn append(&self, record: &TranscriptRecord) -> Result<()>;

    async fn load(&self, session_id: &str) -> Result<Vec<TranscriptRecord>>;
}

/// File-based transcript store.
///
/// Layout: `<base>/<hash>.jsonl`, one [`TranscriptRecord`] per line.
pub struct JsonlTranscriptStore {
    base: PathBuf,
}

impl JsonlTranscriptStore {
    pub fn new(base: PathBuf) -> Self {
        Self { base }
    }

    /// Default store location: `~/.drawbridge/transcripts/`
    pub fn default_path() -> PathBuf {
        crate::config::data_dir().join("transcripts")
    }

    fn transcript_path(&self, session_id: &str) -> PathBuf {
        self.base.join(format!("{}.jsonl", hash_key(session_id)))
    }
}

/// Stable filename for an opaque session identifier.
fn hash_key(session_id: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    session_id.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[async_trait]
impl TranscriptStore for JsonlTranscriptStore {
    async fn append(&self, record: &TranscriptRecord) -> Result<()> {
        tokio::fs::create_dir_all(&self.base).await?;
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let path = self.transcript_path(&record.session_id);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        debug!(session_id = %record.session_id, messages = record.messages.len(), "Appended transcript");
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Vec<TranscriptRecord>> {
        let path = self.transcript_path(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let mut records = Vec::new();
        for line in data.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let record: TranscriptRecord = serde_json::from_str(line).map_err(|e| {
                DrawbridgeError::Storage(format!("corrupt transcript line: {e}"))
            })?;
            records.push(record);
        }
        Ok(records)
    }
}
