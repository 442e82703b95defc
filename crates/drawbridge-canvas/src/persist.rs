//! Best-effort canvas snapshot persistence.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, warn};

use drawbridge_core::{DrawableElement, Result};

/// External store for canvas snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the last saved snapshot. A store that was never written yields an empty canvas.
    async fn load(&self) -> Result<Vec<DrawableElement>>;

    async fn save(&self, elements: &[DrawableElement]) -> Result<()>;
}

/// Snapshot store writing the canvas as a JSON array to a single file.
pub struct JsonFileSnapshotStore {
    path: PathBuf,
}

impl JsonFileSnapshotStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl SnapshotStore for JsonFileSnapshotStore {
    async fn load(&self) -> Result<Vec<DrawableElement>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&self.path).await?;
        let raw: Vec<serde_json::Value> = serde_json::from_str(&data)?;
        let total = raw.len();
        let elements = DrawableElement::filter_valid(raw);
        debug!(path = %self.path.display(), loaded = elements.len(), total, "Loaded canvas snapshot");
        Ok(elements)
    }

    async fn save(&self, elements: &[DrawableElement]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let data = serde_json::to_string(elements)?;
        // Atomic write: write to temp then rename
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data.as_bytes()).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Spawn a background task that saves every published snapshot.
///
/// Publishing is non-blocking; if several snapshots arrive while a write is in
/// flight only the latest one is written next. Failures are logged and dropped.
pub fn spawn_persister(
    store: Arc<dyn SnapshotStore>,
    initial: Vec<DrawableElement>,
) -> watch::Sender<Vec<DrawableElement>> {
    let (tx, mut rx) = watch::channel(initial);
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();
            match store.save(&snapshot).await {
                Ok(()) => debug!(elements = snapshot.len(), "Canvas snapshot saved"),
                Err(e) => warn!(%e, "Failed to save canvas snapshot"),
            }
        }
    });
    tx
}
