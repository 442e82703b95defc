//! Remote agent: forwards invocations to an HTTP endpoint that streams its
//! tool calls and final history back as SSE.
//!
//! Upstream frames (one JSON object per `data:` line):
//! - `{"type":"tool_call","tool":..,"args":..}`
//! - `{"type":"messages","messages":[..]}`
//! - `{"type":"error","error":".."}`
//!
//! Anything else (progress, keepalives) is ignored.

use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use drawbridge_core::config::AgentConfig;

use crate::sse::parse_sse_stream;
use crate::{Agent, ToolEventHandler};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum UpstreamEvent {
    ToolCall {
        tool: String,
        #[serde(default)]
        args: Value,
    },
    Messages {
        messages: Vec<Value>,
    },
    Error {
        error: String,
    },
    #[serde(other)]
    Other,
}

/// [`Agent`] backed by a remote HTTP service.
pub struct RemoteAgent {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl RemoteAgent {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
        }
    }

    /// Build from config. Returns `None` when no endpoint is configured.
    pub fn from_config(config: &AgentConfig) -> anyhow::Result<Option<Self>> {
        let Some(endpoint) = config.endpoint.clone() else {
            return Ok(None);
        };
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("building agent HTTP client")?;
        Ok(Some(Self {
            client,
            endpoint,
            api_key: config.resolve_api_key(),
        }))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Agent for RemoteAgent {
    async fn invoke(
        &self,
        session_id: &str,
        input_text: &str,
        handler: &mut dyn ToolEventHandler,
    ) -> anyhow::Result<Vec<Value>> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("accept", "text/event-stream")
            .json(&json!({ "sessionId": session_id, "inputText": input_text }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.context("agent request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("agent endpoint returned {status}: {body}");
        }

        let mut events = std::pin::pin!(parse_sse_stream(response.bytes_stream()));
        while let Some(event) = events.next().await {
            let event = event?;
            let upstream: UpstreamEvent = match serde_json::from_str(&event.data) {
                Ok(upstream) => upstream,
                Err(e) => {
                    warn!(%e, "Skipping unparseable agent frame");
                    continue;
                }
            };
            match upstream {
                UpstreamEvent::ToolCall { tool, args } => {
                    let confirmed = handler.on_tool_event(&tool, &args).await;
                    debug!(%tool, confirmed, "Remote tool call");
                }
                UpstreamEvent::Messages { messages } => return Ok(messages),
                UpstreamEvent::Error { error } => bail!("agent reported error: {error}"),
                UpstreamEvent::Other => {}
            }
        }

        bail!("agent stream ended without a final message history")
    }
}
