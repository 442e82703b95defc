//! SSE (Server-Sent Events) line parser for upstream agent responses.
//!
//! Converts any byte-chunk stream into a `Stream<Item = SseEvent>`.

use std::fmt::Display;
use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};

/// A parsed SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

/// Parse a byte stream as SSE events.
pub fn parse_sse_stream<S, E>(byte_stream: S) -> impl Stream<Item = anyhow::Result<SseEvent>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + 'static,
{
    let byte_stream: Pin<Box<dyn Stream<Item = Result<Bytes, String>> + Send>> =
        Box::pin(byte_stream.map(|chunk| chunk.map_err(|e| e.to_string())));

    futures::stream::unfold(
        SseState {
            byte_stream,
            buffer: Vec::new(),
            current_event: None,
            current_data: Vec::new(),
            current_id: None,
            done: false,
        },
        |mut state| async move {
            if state.done {
                return None;
            }
            loop {
                // Decode whole lines only: a chunk may end inside a multi-byte character.
                if let Some(newline_pos) = state.buffer.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = state.buffer.drain(..=newline_pos).collect();
                    let line = decode_line(&raw[..newline_pos]);

                    if line.is_empty() {
                        // Blank line dispatches the pending event
                        if let Some(event) = state.take_event() {
                            return Some((Ok(event), state));
                        }
                        continue;
                    }

                    if line.starts_with(':') {
                        continue;
                    }

                    if let Some(value) = line.strip_prefix("event:") {
                        state.current_event = Some(value.trim_start().to_string());
                    } else if let Some(value) = line.strip_prefix("data:") {
                        state.current_data.push(value.trim_start().to_string());
                    } else if let Some(value) = line.strip_prefix("id:") {
                        state.current_id = Some(value.trim_start().to_string());
                    }
                    continue;
                }

                match state.byte_stream.next().await {
                    Some(Ok(chunk)) => {
                        state.buffer.extend_from_slice(&chunk);
                    }
                    Some(Err(e)) => {
                        state.done = true;
                        return Some((Err(anyhow::anyhow!("SSE stream error: {e}")), state));
                    }
                    None => {
                        state.done = true;
                        // Flush a trailing line without newline, then any pending event
                        if !state.buffer.is_empty() {
                            let rest = decode_line(&std::mem::take(&mut state.buffer));
                            if let Some(value) = rest.strip_prefix("data:") {
                                state.current_data.push(value.trim_start().to_string());
                            }
                        }
                        return state.take_event().map(|event| (Ok(event), state));
                    }
                }
            }
        },
    )
}

fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim_end_matches('\r').to_string()
}

struct SseState {
    byte_stream: Pin<Box<dyn Stream<Item = Result<Bytes, String>> + Send>>,
    buffer: Vec<u8>,
    current_event: Option<String>,
    current_data: Vec<String>,
    current_id: Option<String>,
    done: bool,
}

impl SseState {
    fn take_event(&mut self) -> Option<SseEvent> {
        if self.current_data.is_empty() {
            return None;
        }
        let event = SseEvent {
            event: self.current_event.take(),
            data: self.current_data.join("\n"),
            id: self.current_id.take(),
        };
        self.current_data.clear();
        Some(event)
    }
}
