//! Display-compatibility rules applied to every chat fragment.
//!
//! The leading newline and the Latin-1 repair both compensate for upstream
//! formatting quirks. They are kept here, apart from the stream control flow, so
//! they can be revisited if the backend's output changes.

use std::borrow::Cow;

/// Glyph shown in place of the `<think>` / `</think>` reasoning tags.
pub const THINK_MARKER: &str = "\u{1F914}";

const THINK_OPEN_TAG: &str = "<think>";
const THINK_CLOSE_TAG: &str = "</think>";
const PREFORMATTED_MARKER: &str = "<pre style";

/// Maps one raw fragment to the text appended to the response.
///
/// `awaiting_first` is cleared once the leading newline has been emitted. A
/// fragment opening a `<pre style` block does not consume it.
pub fn normalize_fragment(content: &str, awaiting_first: &mut bool) -> String {
    let mut appended = String::new();

    if *awaiting_first && !content.starts_with(PREFORMATTED_MARKER) {
        *awaiting_first = false;
        appended.push('\n');
    }

    if content.is_empty() {
        appended.push('\n');
    } else if content.starts_with(THINK_OPEN_TAG) {
        appended.push_str(THINK_MARKER);
        appended.push('\n');
    } else if content.starts_with(THINK_CLOSE_TAG) {
        appended.push('\n');
        appended.push_str(THINK_MARKER);
        appended.push('\n');
    } else {
        appended.push_str(&repair_misencoded_utf8(content));
    }

    appended
}

/// Undoes UTF-8 text that was decoded as Latin-1 before being re-serialized.
///
/// Every character is narrowed back to its Latin-1 byte and the bytes are decoded
/// as UTF-8. When a character does not fit in one byte, or the bytes are not
/// valid UTF-8, the fragment is returned unchanged. This only matches one known
/// upstream mis-encoding and becomes a no-op for correctly encoded text.
pub fn repair_misencoded_utf8(fragment: &str) -> Cow<'_, str> {
    if fragment.is_ascii() {
        return Cow::Borrowed(fragment);
    }

    let latin1_bytes = fragment
        .chars()
        .map(|ch| u8::try_from(ch).ok())
        .collect::<Option<Vec<u8>>>();

    match latin1_bytes.map(String::from_utf8) {
        Some(Ok(repaired)) => Cow::Owned(repaired),
        _ => Cow::Borrowed(fragment),
    }
}

/// Growing response text for one chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatResponseAccumulator {
    text: String,
    awaiting_first: bool,
}

impl Default for ChatResponseAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatResponseAccumulator {
    pub fn new() -> Self {
        Self {
            text: String::new(),
            awaiting_first: true,
        }
    }

    /// Appends one fragment and returns the snapshot after it.
    pub fn push(&mut self, content: &str) -> &str {
        let appended = normalize_fragment(content, &mut self.awaiting_first);
        self.text.push_str(&appended);
        &self.text
    }

    pub fn snapshot(&self) -> &str {
        &self.text
    }
}
