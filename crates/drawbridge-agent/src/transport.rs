//! Stream transport adapter: frames a bridge run onto a one-way byte stream.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use drawbridge_core::protocol::StreamRequest;

use crate::bridge::Bridge;
use crate::event::{FrameEncoder, StreamEvent};

/// Start `request` on `bridge` and return the framed output.
///
/// The channel holds a single event, so the producer only advances once the
/// previous frame has been taken by the sink. Dropping the returned stream
/// (peer disconnected) aborts the producer.
pub fn stream_invocation(
    bridge: Arc<Bridge>,
    request: StreamRequest,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    let (tx, rx) = mpsc::channel(1);
    let producer = tokio::spawn(async move { bridge.run(&request, tx).await });
    frame_events(rx, Some(producer))
}

/// Encode events from `rx` until a terminal event.
///
/// If the producer disappears without sending one (error or panic), a
/// generic `error` frame is emitted so the stream always ends well-formed.
pub fn frame_events(
    rx: mpsc::Receiver<StreamEvent>,
    producer: Option<JoinHandle<()>>,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    let state = FrameState {
        rx,
        encoder: FrameEncoder::new(),
        finished: false,
        _producer: AbortOnDrop(producer),
    };

    futures::stream::unfold(state, |mut state| async move {
        if state.finished {
            debug!(frames = state.encoder.frames(), "Event stream closed");
            return None;
        }
        let event = match state.rx.recv().await {
            Some(event) => event,
            None => {
                warn!("Event producer ended without a terminal event");
                StreamEvent::generic_error()
            }
        };
        if event.is_terminal() {
            state.finished = true;
        }
        let frame = state.encoder.encode(&event);
        Some((Ok(frame), state))
    })
}

struct FrameState {
    rx: mpsc::Receiver<StreamEvent>,
    encoder: FrameEncoder,
    finished: bool,
    _producer: AbortOnDrop,
}

struct AbortOnDrop(Option<JoinHandle<()>>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}
