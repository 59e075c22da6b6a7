//! Line-delimited `data: <json>` frame decoding.
//!
//! Bytes arrive in arbitrary chunks. Only complete lines are parsed; the trailing partial line is
//! carried over to the next chunk and dropped if the stream ends first. Lines without the prefix
//! and payloads that are not JSON objects are discarded (the backend interleaves heartbeats).

use crate::json::{self, Object};
use futures_util::stream::{self, BoxStream, StreamExt};
use pplxpipe_core::{ByteStream, Result};
use std::collections::VecDeque;

pub const DATA_PREFIX: &str = "data: ";

/// One decoded protocol frame.
pub type Frame = Object;

/// Parse one complete line. Returns `None` for anything that is not a prefixed JSON object.
pub fn parse_line(line: &str) -> Option<Frame> {
    let payload = line.trim().strip_prefix(DATA_PREFIX)?;
    let frame = json::parse_object(payload);
    if frame.is_none() {
        tracing::debug!(len = payload.len(), "discarding non-object data line");
    }
    frame
}

#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns the frames completed by it, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(chunk);
        let Some(last_nl) = self.buf.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let rest = self.buf.split_off(last_nl + 1);
        let complete = std::mem::replace(&mut self.buf, rest);

        // Splitting on the raw byte is UTF-8 safe: `\n` never occurs inside a multi-byte sequence.
        complete
            .split(|b| *b == b'\n')
            .filter_map(|line| parse_line(&String::from_utf8_lossy(line)))
            .collect()
    }

    /// Bytes of the buffered (not yet newline-terminated) segment.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

struct DecodeState {
    bytes: ByteStream,
    decoder: FrameDecoder,
    ready: VecDeque<Frame>,
    done: bool,
}

/// Lazily decode a byte stream into frames.
///
/// Bytes are only pulled when the consumer asks for the next frame. A transport error is yielded
/// once and ends the sequence; a clean end of stream drops any unterminated tail.
pub fn decode_frames(bytes: ByteStream) -> BoxStream<'static, Result<Frame>> {
    let st = DecodeState {
        bytes,
        decoder: FrameDecoder::new(),
        ready: VecDeque::new(),
        done: false,
    };
    stream::unfold(st, |mut st| async move {
        loop {
            if let Some(frame) = st.ready.pop_front() {
                return Some((Ok(frame), st));
            }
            if st.done {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    let frames = st.decoder.push(&chunk);
                    tracing::debug!(chunk_len = chunk.len(), frames = frames.len(), "decoded chunk");
                    st.ready.extend(frames);
                }
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(e), st));
                }
                None => {
                    st.done = true;
                    if st.decoder.pending() > 0 {
                        tracing::debug!(
                            pending = st.decoder.pending(),
                            "stream ended mid-line; dropping partial frame"
                        );
                    }
                }
            }
        }
    })
    .boxed()
}
