//! Server-Sent Events decoding
//!
//! Turns a chunked response body into typed events. Frames are split on blank
//! lines; only `data:` fields matter to this protocol.

use super::TransportError;
use async_stream::stream;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;

/// Incremental frame decoder
///
/// Bytes are buffered until a full frame is available, so multi-byte UTF-8
/// sequences split across network chunks decode intact.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    /// Bytes of `buf` already searched for a frame boundary
    scanned: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed body bytes; returns the data payload of every completed frame.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend(bytes.iter().copied().filter(|b| *b != b'\r'));

        let mut payloads = Vec::new();
        while let Some(end) = self.next_boundary() {
            let frame: Vec<u8> = self.buf.drain(..end).collect();
            self.scanned = 0;
            if let Some(data) = frame_data(&frame) {
                payloads.push(data);
            }
        }
        self.scanned = self.buf.len();
        payloads
    }

    /// End of the first complete frame, searching only bytes not yet seen.
    /// Steps back one byte so a `\n\n` split across pushes is still found.
    fn next_boundary(&self) -> Option<usize> {
        let start = self.scanned.saturating_sub(1);
        self.buf
            .get(start..)?
            .windows(2)
            .position(|w| w == b"\n\n")
            .map(|pos| start + pos + 2)
    }

    #[cfg(test)]
    fn scanned(&self) -> usize {
        self.scanned
    }

    /// Flush a trailing frame the server did not terminate.
    pub fn finish(&mut self) -> Option<String> {
        let frame = std::mem::take(&mut self.buf);
        self.scanned = 0;
        frame_data(&frame)
    }
}

fn frame_data(frame: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(frame);
    let mut data: Option<String> = None;
    for line in text.lines() {
        let Some(value) = line.strip_prefix("data:") else {
            continue; // comments, event:, id:, retry:
        };
        let value = value.strip_prefix(' ').unwrap_or(value);
        match data.as_mut() {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(value);
            }
            None => data = Some(value.to_string()),
        }
    }
    data.filter(|d| !d.trim().is_empty())
}

/// Decode a streaming response into typed events.
///
/// Undecodable payloads and body read failures are yielded as `Err` items;
/// the consumer decides whether to stop.
pub fn events<T>(response: reqwest::Response) -> impl Stream<Item = Result<T, TransportError>> + Send
where
    T: DeserializeOwned + Send + 'static,
{
    let mut body = response.bytes_stream();
    stream! {
        let mut decoder = SseDecoder::new();
        while let Some(next) = body.next().await {
            let bytes = match next {
                Ok(bytes) => bytes,
                Err(e) => {
                    yield Err(TransportError::network(format!("stream interrupted: {e}")));
                    return;
                }
            };
            for payload in decoder.push(&bytes) {
                tracing::trace!(data = %payload, "SSE frame");
                yield serde_json::from_str::<T>(&payload).map_err(|e| {
                    TransportError::decode(format!("bad event payload ({e}): {payload}"))
                });
            }
        }
        if let Some(payload) = decoder.finish() {
            yield serde_json::from_str::<T>(&payload).map_err(|e| {
                TransportError::decode(format!("bad event payload ({e}): {payload}"))
            });
        }
    }
}
