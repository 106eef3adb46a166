use serde::Deserialize;
use snafu::ResultExt;

use crate::backend::CHAT_ENDPOINT;
use crate::error::{ClientResult, DecodePayloadSnafu};

/// Event-stream field marker that precedes every JSON payload.
pub const FRAME_PREFIX: &str = "data:";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatPayload {
    pub text: String,
}

/// One decoded frame of the chat event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub raw: String,
    pub payload: ChatPayload,
}

impl StreamEvent {
    /// Parses one line of the event stream.
    ///
    /// Blank lines, lines of other event-stream fields (`event:`, `id:`, comments)
    /// and prefix-only lines carry no content and yield `Ok(None)`.
    pub fn parse(line: &str) -> ClientResult<Option<Self>> {
        let Some(body) = line.strip_prefix(FRAME_PREFIX) else {
            return Ok(None);
        };
        if body.trim().is_empty() {
            return Ok(None);
        }

        let payload = serde_json::from_str::<ChatPayload>(body).context(DecodePayloadSnafu {
            stage: "parse-chat-frame",
            endpoint: CHAT_ENDPOINT,
        })?;

        Ok(Some(Self {
            raw: line.to_string(),
            payload,
        }))
    }

    pub fn content(&self) -> &str {
        &self.payload.text
    }
}

/// Reassembles newline-delimited lines from arbitrarily split body chunks.
///
/// Bytes are held until a full line is available so multi-byte characters split
/// across chunks decode intact.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(position) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line = self.pending.drain(..=position).collect::<Vec<_>>();
            lines.push(decode_line(&line[..position]));
        }
        lines
    }

    /// Returns the trailing line when the body did not end with a newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        Some(decode_line(&line))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;

    #[test]
    fn payload_line_parses_text_field() {
        let event = StreamEvent::parse(r#"data:{"text":"Hi"}"#)
            .expect("valid frame")
            .expect("content frame");
        assert_eq!(event.content(), "Hi");
        assert_eq!(event.raw, r#"data:{"text":"Hi"}"#);
    }

    #[test]
    fn space_after_prefix_is_tolerated() {
        let event = StreamEvent::parse(r#"data: {"text":"x","extra":1}"#)
            .expect("valid frame")
            .expect("content frame");
        assert_eq!(event.content(), "x");
    }

    #[test]
    fn non_content_lines_are_skipped() {
        for line in ["", "data:", "data:   ", "event:message", ":keep-alive", "id:7"] {
            assert_eq!(StreamEvent::parse(line).expect("skippable"), None, "{line:?}");
        }
    }

    #[test]
    fn malformed_payload_is_a_decode_error() {
        let error = StreamEvent::parse("data:{not json").expect_err("decode error");
        assert!(matches!(error, ClientError::DecodePayload { .. }));

        let error = StreamEvent::parse(r#"data:{"content":"no text field"}"#)
            .expect_err("missing text field");
        assert!(matches!(error, ClientError::DecodePayload { .. }));
    }

    #[test]
    fn line_buffer_reassembles_split_chunks() {
        let mut buffer = LineBuffer::new();
        let encoded = "data:{\"text\":\"caf\u{e9}\"}\r\n\ndata:{\"t".as_bytes();
        let split_inside_char = encoded
            .iter()
            .position(|byte| *byte == 0xC3)
            .expect("multi-byte lead")
            + 1;

        let mut lines = buffer.push(&encoded[..split_inside_char]);
        assert!(lines.is_empty());
        lines.extend(buffer.push(&encoded[split_inside_char..]));

        assert_eq!(lines, vec!["data:{\"text\":\"caf\u{e9}\"}".to_string(), String::new()]);
        assert_eq!(buffer.finish().as_deref(), Some("data:{\"t"));
        assert_eq!(buffer.finish(), None);
    }
}
