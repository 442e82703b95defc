//! Gateway shared state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use drawbridge_agent::confirm::policy_for;
use drawbridge_agent::{Agent, Bridge, RemoteAgent};
use drawbridge_canvas::{CanvasStore, JsonFileSnapshotStore, SnapshotStore, spawn_persister};
use drawbridge_core::config::{AgentConfig, Config};
use drawbridge_core::session_store::{JsonlTranscriptStore, TranscriptStore};

use crate::hub::Hub;

/// Shared state accessible from all handlers.
pub struct GatewayState {
    pub config: Arc<Config>,
    pub hub: Arc<Hub>,
    /// `None` when no agent is configured; the stream endpoint then answers 503.
    pub bridge: Option<Arc<Bridge>>,
}

impl GatewayState {
    pub fn new(config: Arc<Config>, hub: Arc<Hub>, bridge: Option<Arc<Bridge>>) -> Self {
        Self { config, hub, bridge }
    }

    /// Wire up the hub, snapshot persistence, transcripts and the remote agent
    /// from config.
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let hub = Arc::new(build_hub(&config).await);

        let agent_config = config.agent();
        let bridge = match RemoteAgent::from_config(&agent_config)? {
            Some(remote) => {
                info!(endpoint = %remote.endpoint(), "Remote agent configured");
                let transcripts = config.transcript_dir().map(|dir| {
                    info!(dir = %dir.display(), "Transcript persistence enabled");
                    Arc::new(JsonlTranscriptStore::new(dir)) as Arc<dyn TranscriptStore>
                });
                Some(Arc::new(build_bridge(
                    Arc::new(remote),
                    &agent_config,
                    hub.clone(),
                    transcripts,
                )))
            }
            None => {
                warn!("No agent endpoint configured, agent streaming disabled");
                None
            }
        };

        Ok(Self::new(Arc::new(config), hub, bridge))
    }
}

/// Build a hub seeded from the configured snapshot, if any.
async fn build_hub(config: &Config) -> Hub {
    let Some(path) = config.snapshot_path() else {
        return Hub::default();
    };

    let store: Arc<dyn SnapshotStore> = Arc::new(JsonFileSnapshotStore::new(path.clone()));
    let initial = match store
        .load()
        .await
        .with_context(|| format!("loading canvas snapshot {}", path.display()))
    {
        Ok(elements) => elements,
        Err(e) => {
            warn!(error = %format!("{e:#}"), "Starting with an empty canvas");
            Vec::new()
        }
    };
    info!(path = %path.display(), elements = initial.len(), "Canvas persistence enabled");

    let persist = spawn_persister(store, initial.clone());
    Hub::new(CanvasStore::with_elements(initial)).with_persister(persist)
}

/// Wrap `agent` in a bridge configured from `agent_config`, drawing onto `hub`.
pub fn build_bridge(
    agent: Arc<dyn Agent>,
    agent_config: &AgentConfig,
    hub: Arc<Hub>,
    transcripts: Option<Arc<dyn TranscriptStore>>,
) -> Bridge {
    let mut bridge = Bridge::new(agent)
        .with_confirm_policy(Arc::from(policy_for(agent_config.confirm)))
        .with_drawing_tools(agent_config.drawing_tools.iter().cloned())
        .with_timeout(Duration::from_secs(agent_config.timeout_secs))
        .with_canvas(hub);
    if let Some(transcripts) = transcripts {
        bridge = bridge.with_transcripts(transcripts);
    }
    bridge
}

#[cfg(test)]
mod tests {
    use super::*;
    use drawbridge_core::config::CanvasConfig;
    use serde_json::json;

    #[tokio::test]
    async fn test_from_default_config_has_no_bridge() {
        let state = GatewayState::from_config(Config::default()).await.unwrap();
        assert!(state.bridge.is_none());
        assert_eq!(state.hub.element_count().await, 0);
    }

    #[tokio::test]
    async fn test_snapshot_seeds_canvas() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("canvas.json");
        std::fs::write(
            &path,
            json!([{"id": "a", "type": "rectangle", "x": 1, "y": 1}]).to_string(),
        )
        .unwrap();
        let config = Config {
            canvas: Some(CanvasConfig {
                snapshot_path: Some(path.to_string_lossy().into_owned()),
            }),
            ..Config::default()
        };
        let state = GatewayState::from_config(config).await.unwrap();
        assert_eq!(state.hub.element_count().await, 1);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("canvas.json");
        std::fs::write(&path, "{not json").unwrap();
        let config = Config {
            canvas: Some(CanvasConfig {
                snapshot_path: Some(path.to_string_lossy().into_owned()),
            }),
            ..Config::default()
        };
        let state = GatewayState::from_config(config).await.unwrap();
        assert_eq!(state.hub.element_count().await, 0);
    }

    #[tokio::test]
    async fn test_endpoint_enables_bridge() {
        let config = Config {
            agent: Some(AgentConfig {
                endpoint: Some("http://127.0.0.1:9/run".into()),
                ..AgentConfig::default()
            }),
            ..Config::default()
        };
        let state = GatewayState::from_config(config).await.unwrap();
        let bridge = state.bridge.unwrap();
        assert!(bridge.is_drawing_tool("draw_on_canvas"));
        assert!(!bridge.is_drawing_tool("search"));
    }
}
