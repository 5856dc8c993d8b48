//! Incremental decoding of the blank-line-delimited event wire format.
//!
//! Frames are blocks of `field: value` lines terminated by a blank line.
//! Recognized fields: `event` (type tag), `data` (payload line, may repeat),
//! `ts` (server timestamp). Comment lines start with `:`; unknown fields are
//! ignored. A frame with neither `event` nor `data` is dropped.
//!
//! Chunks arrive with arbitrary byte boundaries, so the decoder buffers raw
//! bytes and only splits at the ASCII frame delimiter. A multi-byte UTF-8
//! sequence straddling a chunk boundary therefore stays intact until its
//! frame is complete, at which point the whole frame is validated at once.

use crate::error::ClientError;

const MAX_BUFFER_BYTES: usize = 4 * 1024 * 1024;

/// One parsed wire frame. Field values are left-trimmed of at most one
/// leading space after the colon; repeated `data` lines are joined with `\n`
/// in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WireFrame {
    pub event: Option<String>,
    pub data: Option<String>,
    pub ts: Option<String>,
}

/// Stateful decoder carrying a rolling byte buffer across chunks.
#[derive(Debug, Default)]
pub(crate) struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of raw bytes to the rolling buffer.
    ///
    /// Fails when the buffer would exceed the size cap, which means the
    /// server is sending an unbounded frame.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), ClientError> {
        self.buffer.extend_from_slice(chunk);
        if self.buffer.len() > MAX_BUFFER_BYTES {
            return Err(ClientError::Protocol(
                "frame buffer exceeded maximum size (4 MiB)".to_owned(),
            ));
        }
        Ok(())
    }

    /// Drain and parse the next complete frame, if the buffer holds one.
    ///
    /// Returns `Ok(None)` when only a partial frame (or nothing) remains
    /// buffered; frames with no recognized fields are skipped internally, so
    /// a returned frame always carries `event` or `data`.
    pub fn next_frame(&mut self) -> Result<Option<WireFrame>, ClientError> {
        while let Some(raw) = drain_next_block(&mut self.buffer) {
            if raw.is_empty() {
                continue;
            }
            let Ok(text) = std::str::from_utf8(&raw) else {
                return Err(ClientError::Protocol(
                    "received invalid UTF-8 on event stream".to_owned(),
                ));
            };
            if let Some(frame) = parse_frame(text) {
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }
}

/// Locate the earliest frame delimiter, `\n\n` or `\r\n\r\n`.
fn find_frame_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n");
    let crlf = buffer.windows(4).position(|w| w == b"\r\n\r\n");
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a <= b { (a, 2) } else { (b, 4) }),
        (Some(a), None) => Some((a, 2)),
        (None, Some(b)) => Some((b, 4)),
        (None, None) => None,
    }
}

fn drain_next_block(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let (pos, delim_len) = find_frame_boundary(buffer)?;
    let block = buffer[..pos].to_vec();
    buffer.drain(..pos + delim_len);
    Some(block)
}

/// Parse one delimited block into a frame; `None` when it carries neither
/// `event` nor `data`.
fn parse_frame(block: &str) -> Option<WireFrame> {
    let mut event: Option<String> = None;
    let mut data_lines: Vec<&str> = Vec::new();
    let mut ts: Option<String> = None;

    for line in block.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, rest)) => (field, rest.strip_prefix(' ').unwrap_or(rest)),
            // A line with no colon is a field with an empty value.
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value.to_owned()),
            "data" => data_lines.push(value),
            "ts" => ts = Some(value.to_owned()),
            _ => {}
        }
    }

    let data = if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    };
    if event.is_none() && data.is_none() {
        return None;
    }
    Some(WireFrame { event, data, ts })
}
