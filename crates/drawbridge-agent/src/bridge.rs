//! Agent invocation bridge: one invocation in, an ordered event sequence out.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use drawbridge_core::protocol::StreamRequest;
use drawbridge_core::session_store::{TranscriptRecord, TranscriptStore};

use crate::confirm::{AlwaysConfirm, ConfirmPolicy};
use crate::event::StreamEvent;
use crate::{Agent, ToolEventHandler};

/// Receives drawing-type tool output so every canvas viewer sees it.
#[async_trait]
pub trait CanvasSink: Send + Sync {
    async fn apply_tool_output(&self, tool: &str, args: &Value);
}

/// Error returned by [`Bridge::invoke`]. Carries no internal detail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    #[error("Agent invocation failed")]
    Failed,
    #[error("Agent invocation failed")]
    TimedOut,
}

/// Wraps an [`Agent`] and exposes its invocations as stream events.
pub struct Bridge {
    agent: Arc<dyn Agent>,
    confirm: Arc<dyn ConfirmPolicy>,
    drawing_tools: HashSet<String>,
    canvas: Option<Arc<dyn CanvasSink>>,
    transcripts: Option<Arc<dyn TranscriptStore>>,
    timeout: Duration,
}

impl Bridge {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self {
            agent,
            confirm: Arc::new(AlwaysConfirm),
            drawing_tools: HashSet::new(),
            canvas: None,
            transcripts: None,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_confirm_policy(mut self, confirm: Arc<dyn ConfirmPolicy>) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn with_drawing_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.drawing_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_canvas(mut self, canvas: Arc<dyn CanvasSink>) -> Self {
        self.canvas = Some(canvas);
        self
    }

    pub fn with_transcripts(mut self, transcripts: Arc<dyn TranscriptStore>) -> Self {
        self.transcripts = Some(transcripts);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_drawing_tool(&self, tool: &str) -> bool {
        self.drawing_tools.contains(tool)
    }

    /// Invoke the agent once. The underlying error is logged here and replaced
    /// by a generic one; no partial history is returned on failure.
    pub async fn invoke(
        &self,
        session_id: &str,
        input_text: &str,
        handler: &mut dyn ToolEventHandler,
    ) -> Result<Vec<Value>, InvocationError> {
        let call = self.agent.invoke(session_id, input_text, handler);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(messages)) => Ok(messages),
            Ok(Err(e)) => {
                error!(session_id, error = %format!("{e:#}"), "Agent invocation failed");
                Err(InvocationError::Failed)
            }
            Err(_) => {
                error!(session_id, timeout_secs = self.timeout.as_secs(), "Agent invocation timed out");
                Err(InvocationError::TimedOut)
            }
        }
    }

    /// Run one invocation, sending `start`, any `drawing` events, then either
    /// `messages` + `end` or a single `error`.
    ///
    /// If the receiving side goes away, production stops silently.
    pub async fn run(&self, request: &StreamRequest, events: mpsc::Sender<StreamEvent>) {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        info!(%run_id, session_id = %request.session_id, side_effect = request.enable_side_effect, "Agent run started");

        if events.send(StreamEvent::Start).await.is_err() {
            debug!(%run_id, "Client gone before start");
            return;
        }

        let closed = events.clone();
        let mut handler = StreamingHandler {
            bridge: self,
            events: &events,
            side_effect: request.enable_side_effect,
            tool_calls: 0,
        };

        let outcome = tokio::select! {
            result = self.invoke(&request.session_id, &request.input_text, &mut handler) => Some(result),
            _ = closed.closed() => None,
        };
        let tool_calls = handler.tool_calls;

        match outcome {
            None => {
                info!(%run_id, tool_calls, "Client disconnected, abandoning agent run");
            }
            Some(Ok(messages)) => {
                self.persist(request, &messages);
                if events.send(StreamEvent::Messages { messages }).await.is_ok() {
                    let _ = events.send(StreamEvent::End).await;
                }
                info!(
                    %run_id,
                    tool_calls,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Agent run completed"
                );
            }
            Some(Err(e)) => {
                let _ = events
                    .send(StreamEvent::Error {
                        error: e.to_string(),
                    })
                    .await;
                warn!(%run_id, tool_calls, "Agent run ended with error");
            }
        }
    }

    fn persist(&self, request: &StreamRequest, messages: &[Value]) {
        let Some(store) = self.transcripts.clone() else {
            return;
        };
        let record = TranscriptRecord {
            session_id: request.session_id.clone(),
            input_text: request.input_text.clone(),
            messages: messages.to_vec(),
            timestamp: Utc::now(),
        };
        tokio::spawn(async move {
            if let Err(e) = store.append(&record).await {
                warn!(%e, session_id = %record.session_id, "Failed to persist transcript");
            }
        });
    }
}

/// Tool-event handler used by [`Bridge::run`].
struct StreamingHandler<'a> {
    bridge: &'a Bridge,
    events: &'a mpsc::Sender<StreamEvent>,
    side_effect: bool,
    tool_calls: u32,
}

#[async_trait]
impl ToolEventHandler for StreamingHandler<'_> {
    async fn on_tool_event(&mut self, tool: &str, args: &Value) -> bool {
        self.tool_calls += 1;

        if !self.bridge.confirm.confirm(tool, args) {
            info!(tool, "Tool call vetoed");
            return false;
        }

        if !(self.side_effect && self.bridge.is_drawing_tool(tool)) {
            debug!(tool, "Tool call passed through");
            return true;
        }

        let event = StreamEvent::Drawing {
            tool: tool.to_string(),
            args: args.clone(),
        };
        if self.events.send(event).await.is_err() {
            return false;
        }
        if let Some(canvas) = &self.bridge.canvas {
            canvas.apply_tool_output(tool, args).await;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::AlwaysDeny;
    use serde_json::json;
    use std::sync::Mutex;

    /// Agent replaying a fixed list of tool calls, recording the decisions.
    struct ScriptedAgent {
        calls: Vec<(String, Value)>,
        fail: bool,
        decisions: Mutex<Vec<bool>>,
    }

    impl ScriptedAgent {
        fn new(calls: Vec<(&str, Value)>) -> Self {
            Self {
                calls: calls.into_iter().map(|(t, a)| (t.to_string(), a)).collect(),
                fail: false,
                decisions: Mutex::new(Vec::new()),
            }
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }
    }

    #[async_trait]
    impl Agent for ScriptedAgent {
        async fn invoke(
            &self,
            _session_id: &str,
            input_text: &str,
            handler: &mut dyn ToolEventHandler,
        ) -> anyhow::Result<Vec<Value>> {
            for (tool, args) in &self.calls {
                let confirmed = handler.on_tool_event(tool, args).await;
                self.decisions.lock().unwrap().push(confirmed);
            }
            if self.fail {
                anyhow::bail!("database password is hunter2");
            }
            Ok(vec![
                json!({"role": "user", "content": input_text}),
                json!({"role": "assistant", "content": "done"}),
            ])
        }
    }

    struct RecordingCanvas(Mutex<Vec<String>>);

    #[async_trait]
    impl CanvasSink for RecordingCanvas {
        async fn apply_tool_output(&self, tool: &str, _args: &Value) {
            self.0.lock().unwrap().push(tool.to_string());
        }
    }

    fn request(side_effect: bool) -> StreamRequest {
        StreamRequest {
            session_id: "s1".into(),
            input_text: "draw a house".into(),
            enable_side_effect: side_effect,
        }
    }

    async fn collect(bridge: &Bridge, req: &StreamRequest) -> Vec<StreamEvent> {
        let (tx, mut rx) = mpsc::channel(16);
        bridge.run(req, tx).await;
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_run_orders_events() {
        let agent = Arc::new(ScriptedAgent::new(vec![
            ("draw_on_canvas", json!({"elements": [1]})),
            ("search", json!({"q": "house"})),
            ("draw_on_canvas", json!({"elements": [2]})),
        ]));
        let bridge = Bridge::new(agent).with_drawing_tools(["draw_on_canvas"]);

        let events = collect(&bridge, &request(true)).await;
        assert_eq!(events.len(), 5);
        assert_eq!(events[0], StreamEvent::Start);
        assert!(matches!(&events[1], StreamEvent::Drawing { args, .. } if args["elements"][0] == 1));
        assert!(matches!(&events[2], StreamEvent::Drawing { args, .. } if args["elements"][0] == 2));
        assert!(matches!(&events[3], StreamEvent::Messages { messages } if messages.len() == 2));
        assert_eq!(events[4], StreamEvent::End);
    }

    #[tokio::test]
    async fn test_no_drawing_events_without_side_effect() {
        let agent = Arc::new(ScriptedAgent::new(vec![("draw_on_canvas", json!({}))]));
        let canvas = Arc::new(RecordingCanvas(Mutex::new(Vec::new())));
        let bridge = Bridge::new(agent)
            .with_drawing_tools(["draw_on_canvas"])
            .with_canvas(canvas.clone());

        let events = collect(&bridge, &request(false)).await;
        assert_eq!(events.len(), 3);
        assert!(matches!(events[1], StreamEvent::Messages { .. }));
        assert!(canvas.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drawing_forwarded_to_canvas() {
        let agent = Arc::new(ScriptedAgent::new(vec![("draw_on_canvas", json!({}))]));
        let canvas = Arc::new(RecordingCanvas(Mutex::new(Vec::new())));
        let bridge = Bridge::new(agent)
            .with_drawing_tools(["draw_on_canvas"])
            .with_canvas(canvas.clone());

        collect(&bridge, &request(true)).await;
        assert_eq!(*canvas.0.lock().unwrap(), vec!["draw_on_canvas"]);
    }

    #[tokio::test]
    async fn test_failure_is_generic() {
        let agent = Arc::new(ScriptedAgent::new(vec![("draw_on_canvas", json!({}))]).failing());
        let bridge = Bridge::new(agent).with_drawing_tools(["draw_on_canvas"]);

        let events = collect(&bridge, &request(true)).await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], StreamEvent::Start);
        assert!(matches!(events[1], StreamEvent::Drawing { .. }));
        assert_eq!(events[2], StreamEvent::generic_error());
        let StreamEvent::Error { error } = &events[2] else { unreachable!() };
        assert!(!error.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_deny_policy_vetoes_calls() {
        let agent = Arc::new(ScriptedAgent::new(vec![
            ("draw_on_canvas", json!({})),
            ("search", json!({})),
        ]));
        let bridge = Bridge::new(agent.clone())
            .with_drawing_tools(["draw_on_canvas"])
            .with_confirm_policy(Arc::new(AlwaysDeny));

        let events = collect(&bridge, &request(true)).await;
        assert_eq!(*agent.decisions.lock().unwrap(), vec![false, false]);
        assert!(!events.iter().any(|e| matches!(e, StreamEvent::Drawing { .. })));
        assert_eq!(events.last(), Some(&StreamEvent::End));
    }

    #[tokio::test]
    async fn test_invoke_hides_error_detail() {
        let agent = Arc::new(ScriptedAgent::new(vec![]).failing());
        let bridge = Bridge::new(agent);
        struct Noop;
        #[async_trait]
        impl ToolEventHandler for Noop {
            async fn on_tool_event(&mut self, _tool: &str, _args: &Value) -> bool {
                true
            }
        }
        let err = bridge.invoke("s", "hi", &mut Noop).await.unwrap_err();
        assert_eq!(err, InvocationError::Failed);
        assert_eq!(err.to_string(), "Agent invocation failed");
    }

    #[tokio::test]
    async fn test_timeout() {
        struct SlowAgent;
        #[async_trait]
        impl Agent for SlowAgent {
            async fn invoke(
                &self,
                _session_id: &str,
                _input_text: &str,
                _handler: &mut dyn ToolEventHandler,
            ) -> anyhow::Result<Vec<Value>> {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(vec![])
            }
        }
        let bridge = Bridge::new(Arc::new(SlowAgent)).with_timeout(Duration::from_millis(20));
        let events = collect(&bridge, &request(false)).await;
        assert_eq!(events, vec![StreamEvent::Start, StreamEvent::generic_error()]);
    }

    #[tokio::test]
    async fn test_transcript_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(drawbridge_core::session_store::JsonlTranscriptStore::new(
            dir.path().to_path_buf(),
        ));
        let agent = Arc::new(ScriptedAgent::new(vec![]));
        let bridge = Bridge::new(agent).with_transcripts(store.clone());
        collect(&bridge, &request(false)).await;

        let mut records = Vec::new();
        for _ in 0..50 {
            records = store.load("s1").await.unwrap();
            if !records.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].messages.len(), 2);
    }
}
