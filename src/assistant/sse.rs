//! Incremental decoder for the upstream `text/event-stream` body.
//!
//! Network chunks do not line up with events: a single `data:` line can be
//! split across chunks, sometimes in the middle of a UTF-8 sequence. The
//! decoder buffers raw bytes and only decodes complete lines.

use serde_json::Value;

#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning the `data` payloads of every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            self.process_line(&String::from_utf8_lossy(&line), &mut events);
        }
        events
    }

    /// Flush whatever is pending once the upstream body ends.
    pub fn finish(&mut self) -> Vec<String> {
        let mut events = Vec::new();
        if !self.buf.is_empty() {
            let line = std::mem::take(&mut self.buf);
            let line = String::from_utf8_lossy(&line);
            self.process_line(line.trim_end_matches('\r'), &mut events);
        }
        self.dispatch(&mut events);
        events
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<String>) {
        if line.is_empty() {
            self.dispatch(events);
        } else if let Some(value) = line.strip_prefix("data:") {
            self.data
                .push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
        // `event:`, `id:`, `retry:` and `:` comments carry nothing we use
    }

    fn dispatch(&mut self, events: &mut Vec<String>) {
        if !self.data.is_empty() {
            events.push(self.data.join("\n"));
            self.data.clear();
        }
    }
}

/// Text carried by a `content_block_delta` payload.
pub fn delta_text(payload: &str) -> Option<String> {
    let json: Value = serde_json::from_str(payload).ok()?;
    if json["type"] != "content_block_delta" {
        return None;
    }
    json["delta"]["text"].as_str().map(str::to_string)
}

/// Message of an upstream `error` payload.
pub fn stream_error(payload: &str) -> Option<String> {
    let json: Value = serde_json::from_str(payload).ok()?;
    if json["type"] != "error" {
        return None;
    }
    Some(
        json["error"]["message"]
            .as_str()
            .unwrap_or("unknown upstream error")
            .to_string(),
    )
}
