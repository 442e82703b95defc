//! HTTP control surface for the canvas (`/api/canvas`).

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use tracing::{debug, warn};

use drawbridge_core::protocol::{CanvasStatus, ControlAction, ControlRequest};

use crate::hub::{Mutation, Origin};
use crate::state::GatewayState;

/// Error response rendered as `{success: false, error}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[cfg(feature = "metrics")]
        crate::metrics::record_error(if self.status.is_client_error() { "client" } else { "server" });

        let body = Json(json!({ "success": false, "error": self.message }));
        (self.status, body).into_response()
    }
}

/// `GET /api/canvas`
pub async fn canvas_status(State(state): State<Arc<GatewayState>>) -> Json<CanvasStatus> {
    Json(CanvasStatus {
        status: "running".into(),
        clients: state.hub.client_count().await,
        elements_count: state.hub.element_count().await,
        endpoint: state.config.public_ws_url(),
    })
}

/// `POST /api/canvas`
pub async fn canvas_control(
    State(state): State<Arc<GatewayState>>,
    body: Result<Json<ControlRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = body.map_err(|e| {
        warn!(error = %e.body_text(), "Rejected canvas control request");
        ApiError::bad_request(format!("Invalid request body: {}", e.body_text()))
    })?;

    let action = request
        .action
        .parse::<ControlAction>()
        .map_err(|other| ApiError::bad_request(format!("Unknown action: {other}")))?;
    debug!(?action, "Canvas control request");

    let hub = &state.hub;
    let response = match action {
        ControlAction::Broadcast => {
            let elements = require_elements(request.elements, "broadcast")?;
            let applied = hub
                .apply(Origin::Admin, Mutation::Replace(elements), request.message)
                .await;
            json!({
                "success": true,
                "elementsCount": applied.elements_count,
                "clients": applied.delivered,
            })
        }
        ControlAction::Add => {
            let elements = require_elements(request.elements, "add")?;
            let applied = hub
                .apply(Origin::Admin, Mutation::Append(elements), request.message)
                .await;
            json!({ "success": true, "elementsCount": applied.elements_count })
        }
        ControlAction::Clear => {
            hub.apply(Origin::Admin, Mutation::Clear, None).await;
            json!({ "success": true, "elementsCount": 0 })
        }
        ControlAction::GetState => {
            let elements = hub.snapshot().await;
            json!({
                "success": true,
                "elementsCount": elements.len(),
                "elements": elements,
            })
        }
    };
    Ok(Json(response))
}

fn require_elements(elements: Option<Vec<Value>>, action: &str) -> Result<Vec<Value>, ApiError> {
    elements.ok_or_else(|| ApiError::bad_request(format!("'elements' is required for action '{action}'")))
}
