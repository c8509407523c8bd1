//! Open-document state and position arithmetic.
//!
//! Documents sync with full content replaces. Each update recomputes
//! the line-start offsets table, which gives O(log n) conversions
//! between editor positions (0-based line/character) and byte offsets.
//! Out-of-range inputs clamp to the document boundaries in both
//! directions.

use std::collections::HashMap;

/// One open document.
#[derive(Debug, Clone)]
pub struct Document {
    pub content: String,
    pub version: i32,
    /// Byte offset of the start of each line; always begins with 0.
    line_starts: Vec<usize>,
}

impl Document {
    pub fn new(content: impl Into<String>, version: i32) -> Self {
        let content = content.into();
        let line_starts = compute_line_starts(&content);
        Self {
            content,
            version,
            line_starts,
        }
    }

    pub fn update(&mut self, content: impl Into<String>, version: i32) {
        self.content = content.into();
        self.version = version;
        self.line_starts = compute_line_starts(&self.content);
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// The text of a line, without its terminator. Out-of-range lines
    /// are empty.
    pub fn line_text(&self, line: u32) -> &str {
        let line = line as usize;
        let Some(&start) = self.line_starts.get(line) else {
            return "";
        };
        let end = self
            .line_starts
            .get(line + 1)
            .map(|next| next - 1)
            .unwrap_or(self.content.len());
        &self.content[start..end.max(start)]
    }

    /// Converts a 0-based editor position to a byte offset, clamping
    /// line and character to the document.
    pub fn position_to_offset(&self, line: u32, character: u32) -> usize {
        let line = (line as usize).min(self.line_starts.len() - 1);
        let start = self.line_starts[line];
        let line_len = self
            .line_starts
            .get(line + 1)
            .map(|next| next - 1 - start)
            .unwrap_or(self.content.len() - start);
        let mut offset = start + (character as usize).min(line_len);
        // Never split a UTF-8 sequence.
        while offset > start && !self.content.is_char_boundary(offset) {
            offset -= 1;
        }
        offset
    }

    /// Converts a byte offset to a 0-based editor position, clamping
    /// to the document end.
    pub fn offset_to_position(&self, offset: usize) -> (u32, u32) {
        let offset = offset.min(self.content.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(insertion) => insertion - 1,
        };
        (line as u32, (offset - self.line_starts[line]) as u32)
    }

    /// The ASCII-identifier word covering `offset`, if any.
    pub fn word_at(&self, offset: usize) -> Option<&str> {
        let bytes = self.content.as_bytes();
        let offset = offset.min(bytes.len());
        let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';

        let mut start = offset;
        while start > 0 && is_word(bytes[start - 1]) {
            start -= 1;
        }
        let mut end = offset;
        while end < bytes.len() && is_word(bytes[end]) {
            end += 1;
        }
        (start < end).then(|| &self.content[start..end])
    }

    /// Everything before the cursor, for completion context detection.
    pub fn text_before(&self, line: u32, character: u32) -> &str {
        &self.content[..self.position_to_offset(line, character)]
    }
}

fn compute_line_starts(content: &str) -> Vec<usize> {
    let mut starts = vec![0];
    for (idx, byte) in content.bytes().enumerate() {
        if byte == b'\n' {
            starts.push(idx + 1);
        }
    }
    starts
}

/// The URI-keyed document map.
#[derive(Debug, Default)]
pub struct DocumentStore {
    docs: HashMap<String, Document>,
}

impl DocumentStore {
    pub fn open(&mut self, uri: &str, content: impl Into<String>, version: i32) {
        self.docs.insert(uri.to_string(), Document::new(content, version));
    }

    pub fn update(&mut self, uri: &str, content: impl Into<String>, version: i32) {
        match self.docs.get_mut(uri) {
            Some(doc) => doc.update(content, version),
            None => self.open(uri, content, version),
        }
    }

    pub fn close(&mut self, uri: &str) {
        self.docs.remove(uri);
    }

    pub fn get(&self, uri: &str) -> Option<&Document> {
        self.docs.get(uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "SELECT id\nFROM users\n";

    #[test]
    fn line_starts_and_text() {
        let doc = Document::new(TEXT, 1);
        assert_eq!(doc.line_count(), 3);
        assert_eq!(doc.line_text(0), "SELECT id");
        assert_eq!(doc.line_text(1), "FROM users");
        assert_eq!(doc.line_text(2), "");
        assert_eq!(doc.line_text(99), "");
    }

    #[test]
    fn position_offset_round_trip() {
        let doc = Document::new(TEXT, 1);
        for (line, character) in [(0u32, 0u32), (0, 6), (0, 9), (1, 0), (1, 10)] {
            let offset = doc.position_to_offset(line, character);
            assert_eq!(doc.offset_to_position(offset), (line, character));
        }
    }

    #[test]
    fn out_of_range_positions_clamp() {
        let doc = Document::new(TEXT, 1);
        // Past end of line clamps to line end.
        assert_eq!(doc.position_to_offset(0, 99), 9);
        // Past last line clamps into the final line.
        assert_eq!(doc.position_to_offset(99, 99), TEXT.len());
        // Offsets past the end clamp to the last position.
        assert_eq!(doc.offset_to_position(9999), (2, 0));
    }

    #[test]
    fn word_extraction_is_ascii_identifier_based() {
        let doc = Document::new("SELECT user_id, 'text' FROM t", 1);
        assert_eq!(doc.word_at(8), Some("user_id"));
        assert_eq!(doc.word_at(7), Some("user_id"));
        // Offset inside the quoted string: quote bytes are not word
        // characters.
        assert_eq!(doc.word_at(17), Some("text"));
        assert_eq!(doc.word_at(15), None);
    }

    #[test]
    fn update_recomputes_line_starts() {
        let mut doc = Document::new("a", 1);
        doc.update("first\nsecond", 2);
        assert_eq!(doc.version, 2);
        assert_eq!(doc.position_to_offset(1, 0), 6);
    }

    #[test]
    fn multibyte_content_never_splits_chars() {
        let doc = Document::new("héllo\nwörld", 1);
        let offset = doc.position_to_offset(0, 2);
        assert!(doc.content.is_char_boundary(offset));
    }

    #[test]
    fn store_open_update_close() {
        let mut store = DocumentStore::default();
        store.open("file:///a.sql", "SELECT 1", 1);
        store.update("file:///a.sql", "SELECT 2", 2);
        assert_eq!(store.get("file:///a.sql").unwrap().version, 2);
        store.close("file:///a.sql");
        assert!(store.get("file:///a.sql").is_none());
    }
}
