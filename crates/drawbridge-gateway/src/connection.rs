//! Canvas WebSocket connection lifecycle: register, read loop, cleanup.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::hub::Hub;

/// Drive one canvas peer from upgrade to close.
///
/// Frames queued by the hub are written by a dedicated task, so a slow socket
/// never holds the hub lock.
pub async fn handle_canvas_socket(hub: Arc<Hub>, ws: WebSocket) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    // sync/connect are queued before the writer starts, so they go out first
    let conn_id = hub.connect(out_tx).await;

    let writer_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                debug!(conn_id = %writer_id, "Canvas socket no longer writable");
                break;
            }
        }
    });

    while let Some(msg_result) = ws_rx.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                hub.handle_message(&conn_id, text.as_str()).await;
            }
            Ok(Message::Binary(_)) => {
                debug!(conn_id = %conn_id, "Ignoring binary canvas frame");
            }
            Ok(Message::Close(_)) => {
                debug!(conn_id = %conn_id, "Peer requested close");
                break;
            }
            Err(e) => {
                error!(conn_id = %conn_id, %e, "Canvas socket error");
                break;
            }
            _ => {}
        }
    }

    send_task.abort();
    hub.disconnect(&conn_id).await;
    info!(conn_id = %conn_id, "Canvas socket closed");
}
