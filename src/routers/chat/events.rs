//! SSE frames sent to the browser.

use bytes::Bytes;

pub const DONE_MARKER: &str = "[DONE]";

fn push_data_lines(frame: &mut String, text: &str) {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    for line in normalized.split('\n') {
        frame.push_str("data: ");
        frame.push_str(line);
        frame.push('\n');
    }
}

/// `data: <text>` event. Multi-line text becomes one `data:` line per line,
/// which SSE clients join back with `\n`.
pub fn data_event(text: &str) -> Bytes {
    let mut frame = String::with_capacity(text.len() + 8);
    push_data_lines(&mut frame, text);
    frame.push('\n');
    Bytes::from(frame)
}

pub fn done_event() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}

pub fn error_event(message: &str) -> Bytes {
    let mut frame = String::with_capacity(message.len() + 24);
    frame.push_str("event: error\n");
    push_data_lines(&mut frame, message);
    frame.push('\n');
    Bytes::from(frame)
}
