//! Incremental decoding of `text/event-stream` bodies.

use std::borrow::Cow;

/// Buffers raw body chunks and yields complete SSE blocks.
///
/// Bytes are buffered undecoded so multi-byte characters split across
/// chunks survive. CR bytes are dropped, which folds CRLF line endings.
#[derive(Debug, Default)]
pub(crate) struct ChunkProcessor {
    pending: Vec<u8>,
}

impl ChunkProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) {
        self.pending.extend(chunk.iter().copied().filter(|b| *b != b'\r'));
    }

    /// Next complete block (text before a blank line), skipping empty ones.
    pub fn next_block(&mut self) -> Option<String> {
        loop {
            let pos = self.pending.windows(2).position(|w| w == b"\n\n")?;
            let block: Vec<u8> = self.pending.drain(..pos + 2).take(pos).collect();
            let block = String::from_utf8_lossy(&block).into_owned();
            if !block.trim().is_empty() {
                return Some(block);
            }
        }
    }

    pub fn has_remaining(&self) -> bool {
        self.pending.iter().any(|b| !b.is_ascii_whitespace())
    }

    pub fn take_remaining(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&rest).into_owned()
    }
}

/// Splits a block into its `event:` name and joined `data:` payload.
pub(crate) fn parse_sse_block(block: &str) -> (Option<&str>, Cow<'_, str>) {
    let mut event_name: Option<&str> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in block.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            event_name = Some(rest.trim());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    let data = if data_lines.len() == 1 {
        Cow::Borrowed(data_lines[0])
    } else {
        Cow::Owned(data_lines.join("\n"))
    };

    (event_name, data)
}
