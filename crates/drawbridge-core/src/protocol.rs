//! Drawbridge wire protocol.
//!
//! The canvas channel carries JSON objects tagged by `type`. Inbound frames are
//! parsed leniently (unknown kinds and malformed elements must not tear down
//! the connection), outbound frames are built from validated elements only.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::types::DrawableElement;

/// Canvas frame kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Drawing,
    Clear,
    Update,
    Sync,
    Connect,
    Disconnect,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drawing => "drawing",
            Self::Clear => "clear",
            Self::Update => "update",
            Self::Sync => "sync",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drawing" => Ok(Self::Drawing),
            "clear" => Ok(Self::Clear),
            "update" => Ok(Self::Update),
            "sync" => Ok(Self::Sync),
            "connect" => Ok(Self::Connect),
            "disconnect" => Ok(Self::Disconnect),
            other => Err(other.to_string()),
        }
    }
}

/// A frame as received from a peer, before any validation.
///
/// Peers also send `clientId` and `timestamp`; the hub assigns both itself, so
/// they are not read and any JSON shape is accepted for them.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub elements: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A frame sent to canvas peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasFrame {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elements: Option<Vec<DrawableElement>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl CanvasFrame {
    fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            elements: None,
            message: None,
            client_id: None,
            timestamp: Some(now_millis()),
        }
    }

    /// Full-state replay sent to a joining peer.
    pub fn sync(elements: Vec<DrawableElement>) -> Self {
        Self {
            elements: Some(elements),
            message: Some("Canvas synchronized".into()),
            ..Self::new(MessageKind::Sync)
        }
    }

    /// Acknowledgment carrying the identifier the hub assigned.
    pub fn connect(client_id: &str) -> Self {
        Self {
            client_id: Some(client_id.to_string()),
            message: Some("Connected to canvas".into()),
            ..Self::new(MessageKind::Connect)
        }
    }

    /// Presence notice for a peer that left.
    pub fn disconnect(client_id: &str) -> Self {
        Self {
            client_id: Some(client_id.to_string()),
            message: Some("Client disconnected".into()),
            ..Self::new(MessageKind::Disconnect)
        }
    }

    pub fn drawing(elements: Vec<DrawableElement>, message: Option<String>) -> Self {
        Self {
            elements: Some(elements),
            message,
            ..Self::new(MessageKind::Drawing)
        }
    }

    pub fn update(elements: Vec<DrawableElement>, message: Option<String>) -> Self {
        Self {
            elements: Some(elements),
            message,
            ..Self::new(MessageKind::Update)
        }
    }

    pub fn clear() -> Self {
        Self {
            message: Some("Canvas cleared".into()),
            ..Self::new(MessageKind::Clear)
        }
    }
}

/// Actions accepted by the HTTP control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Broadcast,
    Add,
    Clear,
    GetState,
}

impl FromStr for ControlAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "broadcast" => Ok(Self::Broadcast),
            "add" => Ok(Self::Add),
            "clear" => Ok(Self::Clear),
            "get_state" => Ok(Self::GetState),
            other => Err(other.to_string()),
        }
    }
}

/// Body of `POST /api/canvas`.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlRequest {
    pub action: String,
    #[serde(default)]
    pub elements: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of `GET /api/canvas`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasStatus {
    pub status: String,
    pub clients: usize,
    pub elements_count: usize,
    pub endpoint: String,
}

/// Body of `POST /api/agent/stream`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRequest {
    pub session_id: String,
    pub input_text: String,
    #[serde(default)]
    pub enable_side_effect: bool,
}

impl StreamRequest {
    /// Check required fields before any streaming work begins.
    pub fn validate(&self) -> Result<(), String> {
        if self.session_id.trim().is_empty() {
            return Err("sessionId is required".into());
        }
        if self.input_text.trim().is_empty() {
            return Err("inputText is required".into());
        }
        Ok(())
    }
}

/// Current time as epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
