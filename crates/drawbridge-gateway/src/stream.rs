//! Agent streaming endpoint (`/api/agent/stream`).

use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};

use drawbridge_agent::transport::stream_invocation;
use drawbridge_core::protocol::StreamRequest;

use crate::control::ApiError;
use crate::state::GatewayState;

/// `POST /api/agent/stream`
///
/// Validation happens before the response starts; after that every outcome is
/// reported in-band and the status is always 200.
pub async fn agent_stream(
    State(state): State<Arc<GatewayState>>,
    body: Result<Json<StreamRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body.map_err(|e| {
        warn!(error = %e.body_text(), "Rejected agent stream request");
        ApiError::bad_request(format!("Invalid request body: {}", e.body_text()))
    })?;
    request.validate().map_err(ApiError::bad_request)?;

    let Some(bridge) = state.bridge.clone() else {
        return Err(ApiError::unavailable("No agent is configured"));
    };

    info!(session_id = %request.session_id, "Agent stream opened");

    #[cfg(feature = "metrics")]
    let stream = {
        use futures::StreamExt;
        crate::metrics::record_stream_start();
        let guard = crate::metrics::StreamGuard;
        stream_invocation(bridge, request).map(move |frame| {
            let _ = &guard;
            frame
        })
    };
    #[cfg(not(feature = "metrics"))]
    let stream = stream_invocation(bridge, request);

    let response = (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(stream),
    )
        .into_response();
    Ok(response)
}
