//! Tool-call confirmation policies.

use serde_json::Value;

use drawbridge_core::config::ConfirmMode;

/// Decides whether a pending tool call may proceed.
pub trait ConfirmPolicy: Send + Sync {
    fn confirm(&self, tool: &str, args: &Value) -> bool;
}

/// Allow every tool call.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysConfirm;

impl ConfirmPolicy for AlwaysConfirm {
    fn confirm(&self, _tool: &str, _args: &Value) -> bool {
        true
    }
}

/// Veto every tool call.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysDeny;

impl ConfirmPolicy for AlwaysDeny {
    fn confirm(&self, tool: &str, _args: &Value) -> bool {
        tracing::debug!(tool, "Tool call denied by policy");
        false
    }
}

/// Build the policy selected in config.
pub fn policy_for(mode: ConfirmMode) -> Box<dyn ConfirmPolicy> {
    match mode {
        ConfirmMode::Always => Box::new(AlwaysConfirm),
        ConfirmMode::Never => Box::new(AlwaysDeny),
    }
}
