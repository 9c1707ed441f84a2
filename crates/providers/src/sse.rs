//! Minimal SSE line reassembly.
//!
//! Provider byte streams arrive in arbitrary chunks; this buffer turns
//! them back into complete lines and classifies the ones SSE cares
//! about. Both backends share it.

/// One meaningful SSE line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    /// An `event: <name>` line
    Event(String),
    /// A `data: <payload>` line
    Data(String),
}

/// Accumulates raw bytes and yields complete SSE lines.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes and drain every complete line they finish.
    ///
    /// Blank lines and `:` comments are dropped. A trailing partial line
    /// stays buffered as raw bytes until the next push completes it, so
    /// a multi-byte glyph split across network chunks is reassembled
    /// intact; only lines that are genuinely invalid UTF-8 degrade
    /// through a lossy conversion.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseLine> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let line = String::from_utf8_lossy(&self.buffer[..line_end])
                .trim_end_matches('\r')
                .to_string();
            self.buffer.drain(..=line_end);

            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            if let Some(event) = line.strip_prefix("event: ") {
                lines.push(SseLine::Event(event.trim().to_string()));
            } else if let Some(data) = line.strip_prefix("data: ") {
                lines.push(SseLine::Data(data.trim().to_string()));
            } else if let Some(data) = line.strip_prefix("data:") {
                // Some servers omit the space after the colon
                lines.push(SseLine::Data(data.trim().to_string()));
            }
        }
        lines
    }
}
