//! Synchronization hub: owns the connection registry and the canvas store,
//! applies mutations and fans them out to peers.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use drawbridge_agent::CanvasSink;
use drawbridge_canvas::CanvasStore;
use drawbridge_core::DrawableElement;
use drawbridge_core::protocol::{CanvasFrame, InboundFrame, MessageKind};

use crate::registry::{ConnectionRegistry, Outbound};

/// Where a mutation came from. Peer mutations are not echoed to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin<'a> {
    Peer(&'a str),
    Admin,
}

/// A canvas mutation with its raw (unvalidated) elements.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Replace(Vec<Value>),
    Append(Vec<Value>),
    Clear,
}

impl Mutation {
    fn label(&self) -> &'static str {
        match self {
            Self::Replace(_) => "replace",
            Self::Append(_) => "append",
            Self::Clear => "clear",
        }
    }
}

/// Result of an applied mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    /// Elements in the canvas after the mutation.
    pub elements_count: usize,
    /// Peers the resulting frame was delivered to.
    pub delivered: usize,
}

struct HubInner {
    registry: ConnectionRegistry,
    canvas: CanvasStore,
}

/// Shared canvas hub.
///
/// One lock covers registry and store, so a mutation and all of its sends are
/// issued before the next mutation is applied.
pub struct Hub {
    inner: Mutex<HubInner>,
    persist: Option<watch::Sender<Vec<DrawableElement>>>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(CanvasStore::new())
    }
}

impl Hub {
    pub fn new(canvas: CanvasStore) -> Self {
        Self {
            inner: Mutex::new(HubInner {
                registry: ConnectionRegistry::new(),
                canvas,
            }),
            persist: None,
        }
    }

    /// Publish every post-mutation snapshot to `persist`.
    pub fn with_persister(mut self, persist: watch::Sender<Vec<DrawableElement>>) -> Self {
        self.persist = Some(persist);
        self
    }

    /// Register a new peer. It receives `sync` (when the canvas is non-empty)
    /// followed by `connect` before any broadcast can reach it.
    pub async fn connect(&self, outbound: Outbound) -> String {
        let mut inner = self.inner.lock().await;
        let id = inner.registry.register(outbound);

        if !inner.canvas.is_empty() {
            let sync = CanvasFrame::sync(inner.canvas.snapshot());
            if let Some(text) = encode(&sync) {
                inner.registry.send_to(&id, &text);
            }
        }
        if let Some(text) = encode(&CanvasFrame::connect(&id)) {
            inner.registry.send_to(&id, &text);
        }

        #[cfg(feature = "metrics")]
        crate::metrics::record_ws_connect();

        info!(conn_id = %id, clients = inner.registry.count(), "Canvas peer connected");
        announce_evictions(&mut inner);
        id
    }

    /// Unregister a peer and tell the others. Unknown ids are ignored.
    pub async fn disconnect(&self, id: &str) {
        let mut inner = self.inner.lock().await;
        if !inner.registry.unregister(id) {
            return;
        }

        #[cfg(feature = "metrics")]
        crate::metrics::record_ws_disconnect();

        if let Some(text) = encode(&CanvasFrame::disconnect(id)) {
            inner.registry.broadcast_except(id, &text);
        }
        info!(conn_id = %id, clients = inner.registry.count(), "Canvas peer disconnected");
        announce_evictions(&mut inner);
    }

    /// Handle one raw text frame from `sender`.
    pub async fn handle_message(&self, sender: &str, text: &str) {
        let frame: InboundFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(conn_id = %sender, %e, "Dropping unparseable canvas frame");
                return;
            }
        };

        let kind = match frame.kind.parse::<MessageKind>() {
            Ok(kind) => kind,
            Err(other) => {
                warn!(conn_id = %sender, kind = %other, "Dropping canvas frame of unknown type");
                return;
            }
        };

        let mutation = match (kind, frame.elements) {
            (MessageKind::Drawing, Some(elements)) => Mutation::Replace(elements),
            (MessageKind::Update, Some(elements)) => Mutation::Append(elements),
            (MessageKind::Clear, _) => Mutation::Clear,
            (MessageKind::Drawing | MessageKind::Update, None) => {
                warn!(conn_id = %sender, %kind, "Dropping canvas frame without elements");
                return;
            }
            (other, _) => {
                debug!(conn_id = %sender, kind = %other, "Ignoring server-only frame from peer");
                return;
            }
        };

        self.apply(Origin::Peer(sender), mutation, frame.message).await;
    }

    /// Apply `mutation` and broadcast the resulting frame.
    pub async fn apply(&self, origin: Origin<'_>, mutation: Mutation, message: Option<String>) -> Applied {
        let mut inner = self.inner.lock().await;
        let label = mutation.label();

        let frame = match mutation {
            Mutation::Replace(elements) => {
                let stored = inner.canvas.replace_all(elements).to_vec();
                CanvasFrame::drawing(stored, message)
            }
            Mutation::Append(elements) => {
                let appended = inner.canvas.append(elements).to_vec();
                CanvasFrame::update(appended, message)
            }
            Mutation::Clear => {
                inner.canvas.clear();
                CanvasFrame::clear()
            }
        };
        let elements_count = inner.canvas.len();

        if let Some(persist) = &self.persist {
            persist.send_replace(inner.canvas.snapshot());
        }

        let delivered = match encode(&frame) {
            Some(text) => match origin {
                Origin::Peer(sender) => inner.registry.broadcast_except(sender, &text),
                Origin::Admin => inner.registry.broadcast_all(&text),
            },
            None => 0,
        };

        #[cfg(feature = "metrics")]
        crate::metrics::record_broadcast(frame.kind.as_str(), delivered);

        debug!(
            ?origin,
            mutation = label,
            elements_count,
            delivered,
            revision = inner.canvas.revision(),
            "Canvas mutation applied"
        );
        announce_evictions(&mut inner);
        Applied {
            elements_count,
            delivered,
        }
    }

    pub async fn snapshot(&self) -> Vec<DrawableElement> {
        self.inner.lock().await.canvas.snapshot()
    }

    pub async fn client_count(&self) -> usize {
        self.inner.lock().await.registry.count()
    }

    pub async fn element_count(&self) -> usize {
        self.inner.lock().await.canvas.len()
    }
}

/// Tell the remaining peers about connections dropped by failed sends. The
/// notices can fail too, so drain until nothing new is evicted.
fn announce_evictions(inner: &mut HubInner) {
    loop {
        let evicted = inner.registry.take_evicted();
        if evicted.is_empty() {
            return;
        }
        for id in evicted {
            #[cfg(feature = "metrics")]
            crate::metrics::record_ws_disconnect();

            info!(conn_id = %id, clients = inner.registry.count(), "Canvas peer evicted");
            if let Some(text) = encode(&CanvasFrame::disconnect(&id)) {
                inner.registry.broadcast_all(&text);
            }
        }
    }
}

fn encode<T: Serialize>(frame: &T) -> Option<String> {
    match serde_json::to_string(frame) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(%e, "Failed to serialize canvas frame");
            None
        }
    }
}

/// Agent drawing output lands on the canvas as an administrative mutation.
///
/// `args` may be an element array, or an object with `elements`, an optional
/// `mode: "replace"` and `message`; `action: "clear"` clears the canvas.
#[async_trait]
impl CanvasSink for Hub {
    async fn apply_tool_output(&self, tool: &str, args: &Value) {
        if args.get("action").and_then(Value::as_str) == Some("clear") {
            self.apply(Origin::Admin, Mutation::Clear, None).await;
            return;
        }

        let elements = match args {
            Value::Array(items) => items.clone(),
            _ => match args.get("elements").and_then(Value::as_array) {
                Some(items) => items.clone(),
                None => {
                    debug!(tool, "Tool output carries no elements");
                    return;
                }
            },
        };
        let message = args.get("message").and_then(Value::as_str).map(String::from);
        let mutation = if args.get("mode").and_then(Value::as_str) == Some("replace") {
            Mutation::Replace(elements)
        } else {
            Mutation::Append(elements)
        };
        self.apply(Origin::Admin, mutation, message).await;
    }
}
