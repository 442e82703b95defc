//! Agent invocation bridge.
//!
//! The agent itself is opaque: anything implementing [`Agent`] that reports
//! each tool call through a [`ToolEventHandler`] and finally returns the
//! message history. The [`Bridge`] turns one invocation into an ordered
//! sequence of [`StreamEvent`]s, and [`transport`] frames that sequence onto a
//! one-way text stream.

use async_trait::async_trait;
use serde_json::Value;

pub mod bridge;
pub mod confirm;
pub mod event;
pub mod remote;
pub mod sse;
pub mod transport;

pub use bridge::{Bridge, CanvasSink, InvocationError};
pub use confirm::{AlwaysConfirm, AlwaysDeny, ConfirmPolicy};
pub use event::{FrameEncoder, StreamEvent};
pub use remote::RemoteAgent;

/// Receives tool calls while an invocation is running.
#[async_trait]
pub trait ToolEventHandler: Send {
    /// Called once per tool call, in delivery order, before the agent
    /// proceeds. Returning `false` vetoes the pending action.
    async fn on_tool_event(&mut self, tool: &str, args: &Value) -> bool;
}

/// An agent that can be invoked for one conversational turn.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Run one invocation and return the full ordered message history it produced.
    async fn invoke(
        &self,
        session_id: &str,
        input_text: &str,
        handler: &mut dyn ToolEventHandler,
    ) -> anyhow::Result<Vec<Value>>;
}
