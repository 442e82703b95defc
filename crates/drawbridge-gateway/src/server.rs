//! Axum-based HTTP and WebSocket listeners.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::connection::handle_canvas_socket;
use crate::control::{canvas_control, canvas_status};
use crate::hub::Hub;
use crate::state::GatewayState;
use crate::stream::agent_stream;

/// Router for the control surface, the agent stream and health checks.
pub fn http_router(state: Arc<GatewayState>) -> Router {
    let cors = state.config.cors_enabled();

    let app = Router::new()
        .route("/api/canvas", get(canvas_status).post(canvas_control))
        .route("/api/agent/stream", post(agent_stream))
        .route("/health", get(health_handler));

    #[cfg(feature = "metrics")]
    let app = match crate::metrics::install_prometheus_recorder() {
        Ok(handle) => app.route("/metrics", get(move || async move { handle.render() })),
        Err(e) => {
            warn!(%e, "Metrics recorder unavailable");
            app
        }
    };

    let mut app = app.with_state(state).layer(TraceLayer::new_for_http());
    if cors {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

/// Router for the canvas WebSocket listener.
pub fn ws_router(hub: Arc<Hub>) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .with_state(hub)
        .layer(TraceLayer::new_for_http())
}

async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<Arc<Hub>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_canvas_socket(hub, socket))
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "clients": state.hub.client_count().await,
    }))
}

/// Both listeners, bound but not yet serving.
pub struct BoundGateway {
    http: TcpListener,
    ws: TcpListener,
}

impl BoundGateway {
    /// Bind the HTTP and WebSocket listeners. Port 0 picks an ephemeral port.
    pub async fn bind(bind_addr: &str, http_port: u16, ws_port: u16) -> anyhow::Result<Self> {
        let http = TcpListener::bind(format!("{bind_addr}:{http_port}"))
            .await
            .with_context(|| format!("binding HTTP listener on {bind_addr}:{http_port}"))?;
        let ws = TcpListener::bind(format!("{bind_addr}:{ws_port}"))
            .await
            .with_context(|| format!("binding canvas listener on {bind_addr}:{ws_port}"))?;
        Ok(Self { http, ws })
    }

    pub fn http_addr(&self) -> std::io::Result<SocketAddr> {
        self.http.local_addr()
    }

    pub fn ws_addr(&self) -> std::io::Result<SocketAddr> {
        self.ws.local_addr()
    }

    /// Serve until `cancel` fires or either listener fails.
    pub async fn serve(self, state: Arc<GatewayState>, cancel: CancellationToken) -> anyhow::Result<()> {
        if let (Ok(http), Ok(ws)) = (self.http_addr(), self.ws_addr()) {
            info!(%http, %ws, "Gateway listening");
        }

        let http = axum::serve(self.http, http_router(state.clone()))
            .with_graceful_shutdown(cancel.clone().cancelled_owned());
        let ws = axum::serve(self.ws, ws_router(state.hub.clone()))
            .with_graceful_shutdown(cancel.cancelled_owned());

        tokio::try_join!(
            async { http.await.context("HTTP listener failed") },
            async { ws.await.context("canvas listener failed") },
        )?;
        info!("Gateway stopped");
        Ok(())
    }
}

/// Bind both listeners from config and serve until CTRL+C.
pub async fn start_gateway(state: Arc<GatewayState>, http_port: u16, ws_port: u16) -> anyhow::Result<()> {
    let bind_addr = state.config.bind_addr();
    let gateway = BoundGateway::bind(&bind_addr, http_port, ws_port).await?;

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    gateway.serve(state, cancel).await
}

async fn shutdown_signal(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received");
            cancel.cancel();
        }
        Err(e) => warn!(%e, "Failed to install CTRL+C handler"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use drawbridge_core::config::Config;
    use serde_json::Value;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health() {
        let state = Arc::new(GatewayState::new(
            Arc::new(Config::default()),
            Arc::new(Hub::default()),
            None,
        ));
        let response = http_router(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["clients"], 0);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_bind_conflict_is_an_error() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let result = BoundGateway::bind("127.0.0.1", port, 0).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_serve_stops_on_cancel() {
        let state = Arc::new(GatewayState::new(
            Arc::new(Config::default()),
            Arc::new(Hub::default()),
            None,
        ));
        let gateway = BoundGateway::bind("127.0.0.1", 0, 0).await.unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(gateway.serve(state, cancel.clone()));
        cancel.cancel();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
