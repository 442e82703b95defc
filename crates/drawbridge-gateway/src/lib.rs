//! Drawbridge gateway.
//!
//! Two listeners share one [`Hub`]: the canvas WebSocket listener, where
//! peers exchange drawing frames, and the HTTP listener carrying the canvas
//! control API, the agent event stream and `/health`.

pub mod client;
pub mod connection;
pub mod control;
pub mod hub;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod registry;
pub mod server;
pub mod state;
pub mod stream;

pub use client::{CanvasClient, ClientState, ReconnectPolicy};
pub use hub::{Hub, Mutation, Origin};
pub use registry::ConnectionRegistry;
pub use server::{BoundGateway, http_router, start_gateway, ws_router};
pub use state::{GatewayState, build_bridge};
