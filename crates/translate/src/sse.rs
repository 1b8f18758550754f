//! SSE framing (spec.md §4.5.4, §9): parse complete `"data: ..."` records
//! out of an SSE byte/text stream, tolerant of records split across reads.

use serde_json::Value;

use crate::error::Result;

/// Parse every complete `data: <json>` line out of a full SSE blob (used by
/// the non-streaming path, which already has the whole body in hand).
pub fn parse_sse_events(body: &str) -> Result<Vec<Value>> {
    let mut buf = LineBuffer::default();
    buf.push_str(body);
    let mut events = buf.drain_events()?;
    events.extend(buf.finish()?);
    Ok(events)
}

/// Incremental SSE line buffer: feed it arbitrary byte chunks as they
/// arrive off the wire and drain whatever complete `data:` lines have
/// accumulated so far. Tolerant of a line (or the blank-line record
/// terminator) being split across two reads.
#[derive(Default)]
pub struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    pub fn push_str(&mut self, chunk: &str) {
        self.pending.push_str(chunk);
    }

    pub fn push_bytes(&mut self, chunk: &[u8]) {
        self.pending.push_str(&String::from_utf8_lossy(chunk));
    }

    /// Drain every complete line currently buffered (i.e. followed by a
    /// `\n`), parsing `data: ...` lines as JSON and discarding anything
    /// else (blank lines, `event:`/`id:`/comment lines). A `data:` line
    /// that isn't valid JSON surfaces as [`crate::error::Error::Json`]
    /// rather than being dropped.
    pub fn drain_events(&mut self) -> Result<Vec<Value>> {
        let mut events = Vec::new();
        loop {
            let Some(pos) = self.pending.find('\n') else { break };
            let line: String = self.pending.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(payload) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) {
                let payload = payload.trim_start();
                if payload == "[DONE]" {
                    continue;
                }
                events.push(serde_json::from_str(payload)?);
            }
        }
        Ok(events)
    }

    /// Flush any trailing content with no terminating newline (end of
    /// stream). Only meaningful once the upstream has closed its
    /// connection.
    pub fn finish(&mut self) -> Result<Vec<Value>> {
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }
        self.pending.push('\n');
        self.drain_events()
    }
}
