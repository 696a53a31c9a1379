//! Line-level server-sent-event handling for the Responses API.

use serde::Deserialize;
use serde_json::Value;

/// Re-splits a byte stream into lines across chunk boundaries.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completed, without terminators.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        // Only the new bytes can hold a terminator.
        let mut scan = self.buf.len();
        self.buf.extend_from_slice(chunk);
        let mut start = 0;
        let mut out = Vec::new();

        while let Some(off) = self.buf[scan..].iter().position(|&b| b == b'\n') {
            let end = scan + off;
            let mut line = &self.buf[start..end];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            if let Some(s) = decode(line.to_vec()) {
                out.push(s);
            }
            start = end + 1;
            scan = start;
        }

        self.buf.drain(..start);
        out
    }

    /// The unterminated tail left when the body ends, if any.
    pub fn finish(&mut self) -> Option<String> {
        let mut line = std::mem::take(&mut self.buf);
        if line.ends_with(b"\r") {
            line.pop();
        }
        if line.is_empty() {
            return None;
        }
        decode(line)
    }
}

fn decode(line: Vec<u8>) -> Option<String> {
    match String::from_utf8(line) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::debug!(error = %e, "skipping SSE line that is not valid UTF-8");
            None
        }
    }
}

/// What a single SSE line means to the stream loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    /// Blank, non-data, malformed, or an event type we do not act on.
    Skip,
    /// `[DONE]` sentinel or a completion event.
    Done,
    TextDelta(String),
    Failed(String),
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    response: Option<Value>,
}

pub fn classify(line: &str) -> SseLine {
    let Some(rest) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let payload = rest.strip_prefix(' ').unwrap_or(rest).trim();
    if payload.is_empty() {
        return SseLine::Skip;
    }
    if payload == "[DONE]" {
        return SseLine::Done;
    }

    let ev: RawEvent = match serde_json::from_str(payload) {
        Ok(ev) => ev,
        Err(e) => {
            tracing::debug!(error = %e, "skipping malformed SSE payload");
            return SseLine::Skip;
        }
    };

    match ev.kind.as_str() {
        "response.output_text.delta" => SseLine::TextDelta(ev.delta.unwrap_or_default()),
        "response.completed" => SseLine::Done,
        "error" => SseLine::Failed(ev.message.unwrap_or_else(|| "stream error".to_string())),
        "response.failed" => {
            let msg = ev
                .response
                .as_ref()
                .and_then(|r| r.pointer("/error/message"))
                .and_then(Value::as_str)
                .unwrap_or("response failed");
            SseLine::Failed(msg.to_string())
        }
        other => {
            tracing::trace!(event = other, "ignoring SSE event");
            SseLine::Skip
        }
    }
}
