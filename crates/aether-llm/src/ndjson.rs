//! Framing and field extraction for newline-delimited JSON responses.
//!
//! The streaming chat endpoint sends one JSON object per line, each
//! carrying an incremental `message.content` fragment. Lines may be
//! split across network reads, so callers feed raw bytes into a
//! [`LineBuffer`] and pull out whole lines.

use serde::Deserialize;

#[derive(Deserialize)]
struct ChatLine {
    message: Option<LineMessage>,
}

#[derive(Deserialize)]
struct LineMessage {
    #[serde(default)]
    content: String,
}

/// Extract the content fragment from one NDJSON line. Blank lines,
/// unparseable lines, and lines without content yield `None`.
pub fn content_of_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let parsed: ChatLine = serde_json::from_str(line).ok()?;
    let content = parsed.message?.content;
    if content.is_empty() {
        None
    } else {
        Some(content)
    }
}

/// Reassembles whole lines from arbitrarily-split byte reads.
#[derive(Default)]
pub struct LineBuffer {
    buffer: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a network read and drain every complete line it closed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            lines.push(line.trim_end_matches('\n').to_string());
        }
        lines
    }

    /// Take whatever remains after the stream ends, if anything.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_content_fragment() {
        let line = r#"{"model":"llama3.2","message":{"role":"assistant","content":"Hello"},"done":false}"#;
        assert_eq!(content_of_line(line), Some("Hello".to_string()));
    }

    #[test]
    fn final_done_line_has_no_content() {
        let line = r#"{"model":"llama3.2","message":{"role":"assistant","content":""},"done":true}"#;
        assert_eq!(content_of_line(line), None);
    }

    #[test]
    fn garbage_lines_are_skipped() {
        assert_eq!(content_of_line(""), None);
        assert_eq!(content_of_line("   "), None);
        assert_eq!(content_of_line("not json"), None);
        assert_eq!(content_of_line(r#"{"no_message":true}"#), None);
    }

    #[test]
    fn whole_lines_pass_through() {
        let mut buf = LineBuffer::new();
        let lines = buf.push(b"{\"a\":1}\n{\"b\":2}\n");
        assert_eq!(lines, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
        assert!(buf.finish().is_none());
    }

    #[test]
    fn split_lines_reassemble() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"{\"message\":{\"content\":").is_empty());
        let lines = buf.push(b"\"Hi\"}}\n");
        assert_eq!(lines, vec![r#"{"message":{"content":"Hi"}}"#]);
    }

    #[test]
    fn trailing_line_without_newline_survives() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"{\"x\":1}").is_empty());
        assert_eq!(buf.finish(), Some(r#"{"x":1}"#.to_string()));
        assert!(buf.finish().is_none());
    }
}
