//! Reconnecting canvas client.
//!
//! The client owns an explicit connection state machine:
//!
//! ```text
//! Disconnected ──► Connecting ──► Connected
//!      ▲               │              │
//!      └───────────────┴──────────────┘
//! ```
//!
//! After any drop it waits a fixed delay and tries again, until the policy's
//! attempt cap (if any) is reached. The hub never initiates reconnects.

use std::fmt;
use std::time::Duration;

use anyhow::bail;
use futures::StreamExt;
use tokio::sync::watch;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use drawbridge_core::protocol::CanvasFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
}

impl ClientState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: ClientState) -> bool {
        matches!(
            (self, next),
            (Self::Disconnected, Self::Connecting)
                | (Self::Connecting, Self::Connected)
                | (Self::Connecting, Self::Disconnected)
                | (Self::Connected, Self::Disconnected)
        )
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        })
    }
}

/// Fixed-delay retry policy with an optional attempt cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
    /// Consecutive failed attempts allowed before giving up. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(3),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `failures`, or `None` once the cap is reached.
    pub fn next_delay(&self, failures: u32) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if failures >= max => None,
            _ => Some(self.delay),
        }
    }
}

/// A canvas peer that keeps a connection to the hub alive.
pub struct CanvasClient {
    url: String,
    policy: ReconnectPolicy,
    state: watch::Sender<ClientState>,
}

impl CanvasClient {
    pub fn new(url: impl Into<String>, policy: ReconnectPolicy) -> Self {
        let (state, _) = watch::channel(ClientState::Disconnected);
        Self {
            url: url.into(),
            policy,
            state,
        }
    }

    pub fn state(&self) -> ClientState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ClientState> {
        self.state.subscribe()
    }

    /// Connect and deliver every canvas frame to `on_frame` until `cancel`
    /// fires (returns `Ok`) or the retry policy is exhausted (returns `Err`).
    pub async fn run<F>(&self, mut on_frame: F, cancel: CancellationToken) -> anyhow::Result<()>
    where
        F: FnMut(CanvasFrame),
    {
        let mut failures = 0u32;
        loop {
            self.transition(ClientState::Connecting);
            let connected = tokio::select! {
                result = connect_async(self.url.as_str()) => result,
                _ = cancel.cancelled() => {
                    self.transition(ClientState::Disconnected);
                    return Ok(());
                }
            };

            match connected {
                Ok((mut ws, _)) => {
                    failures = 0;
                    self.transition(ClientState::Connected);
                    info!(url = %self.url, "Connected to canvas");

                    loop {
                        let msg = tokio::select! {
                            msg = ws.next() => msg,
                            _ = cancel.cancelled() => {
                                self.transition(ClientState::Disconnected);
                                return Ok(());
                            }
                        };
                        match msg {
                            Some(Ok(Message::Text(text))) => match serde_json::from_str::<CanvasFrame>(text.as_str()) {
                                Ok(frame) => on_frame(frame),
                                Err(e) => warn!(%e, "Ignoring unrecognized canvas frame"),
                            },
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Canvas connection closed by server");
                                break;
                            }
                            Some(Err(e)) => {
                                warn!(%e, "Canvas connection error");
                                break;
                            }
                            Some(Ok(_)) => {}
                        }
                    }
                }
                Err(e) => {
                    failures += 1;
                    warn!(url = %self.url, %e, failures, "Canvas connection attempt failed");
                }
            }

            self.transition(ClientState::Disconnected);
            let Some(delay) = self.policy.next_delay(failures) else {
                bail!("giving up on {} after {failures} failed attempts", self.url);
            };
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Ok(()),
            }
        }
    }

    fn transition(&self, next: ClientState) {
        let current = self.state();
        if current == next {
            return;
        }
        debug_assert!(current.can_transition_to(next), "illegal transition {current} -> {next}");
        debug!(from = %current, to = %next, "Canvas client state");
        self.state.send_replace(next);
    }
}
