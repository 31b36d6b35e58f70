//! Text buffer abstraction for editor storage.
//!
//! The engine only ever reads a buffer: a given revision is treated as
//! immutable while decorations are derived from it. Mutation happens through
//! the host, which applies [`TextEdit`]s and bumps the revision.

use smol_str::{SmolStr, ToSmolStr};
use std::ops::Range;

use crate::types::TextEdit;

/// A text buffer that supports offset and line conversion.
///
/// All offsets are in Unicode scalar values (chars), not bytes or UTF-16.
/// Hosts that count UTF-16 code units convert at the boundary with
/// [`char_to_utf16`](TextBuffer::char_to_utf16) / [`utf16_to_char`](TextBuffer::utf16_to_char).
pub trait TextBuffer {
    /// Total length in bytes (UTF-8).
    fn len_bytes(&self) -> usize;

    /// Total length in chars (Unicode scalar values).
    fn len_chars(&self) -> usize;

    /// Check if empty.
    fn is_empty(&self) -> bool {
        self.len_chars() == 0
    }

    /// Number of lines. An empty buffer has one line.
    fn len_lines(&self) -> usize;

    /// Monotonic revision, bumped by every edit.
    fn revision(&self) -> u64;

    /// Get a slice as SmolStr. Returns None if range is invalid.
    ///
    /// SmolStr is used for efficiency: strings ≤23 bytes are stored inline
    /// (no heap allocation), longer strings are Arc'd (cheap to clone).
    fn slice(&self, char_range: Range<usize>) -> Option<SmolStr>;

    /// Get character at offset. Returns None if out of bounds.
    fn char_at(&self, char_offset: usize) -> Option<char>;

    /// Convert entire buffer to String.
    fn to_string(&self) -> String;

    /// Convert char offset to byte offset.
    fn char_to_byte(&self, char_offset: usize) -> usize;

    /// Convert byte offset to char offset.
    fn byte_to_char(&self, byte_offset: usize) -> usize;

    /// Zero-based line index containing `char_offset` (clamped to the buffer).
    fn char_to_line(&self, char_offset: usize) -> usize;

    /// Char offset of the start of zero-based `line` (clamped to the buffer).
    fn line_to_char(&self, line: usize) -> usize;

    /// Convert a char offset to a UTF-16 code unit offset.
    fn char_to_utf16(&self, char_offset: usize) -> usize;

    /// Convert a UTF-16 code unit offset to a char offset.
    fn utf16_to_char(&self, utf16_offset: usize) -> usize;

    /// One-based line number containing `char_offset`.
    fn line_number(&self, char_offset: usize) -> usize {
        self.char_to_line(char_offset) + 1
    }

    /// Char range of zero-based `line`, excluding its line terminator.
    fn line_range(&self, line: usize) -> Range<usize> {
        let start = self.line_to_char(line);
        let mut end = if line + 1 < self.len_lines() {
            self.line_to_char(line + 1)
        } else {
            self.len_chars()
        };
        if end > start && self.char_at(end - 1) == Some('\n') {
            end -= 1;
            if end > start && self.char_at(end - 1) == Some('\r') {
                end -= 1;
            }
        }
        start..end
    }
}

/// Ropey-backed text buffer.
///
/// Provides O(log n) editing operations and offset conversions.
#[derive(Clone, Default)]
pub struct EditorRope {
    rope: ropey::Rope,
    revision: u64,
}

impl EditorRope {
    /// Create a new empty rope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from string.
    pub fn from_str(s: &str) -> Self {
        Self {
            rope: ropey::Rope::from_str(s),
            revision: 0,
        }
    }

    /// Get a reference to the underlying rope (for advanced operations).
    pub fn rope(&self) -> &ropey::Rope {
        &self.rope
    }

    /// Insert text at char offset.
    pub fn insert(&mut self, char_offset: usize, text: &str) {
        let at = char_offset.min(self.rope.len_chars());
        self.rope.insert(at, text);
        self.revision += 1;
    }

    /// Delete char range.
    pub fn delete(&mut self, char_range: Range<usize>) {
        let len = self.rope.len_chars();
        let range = char_range.start.min(len)..char_range.end.min(len);
        if range.start < range.end {
            self.rope.remove(range);
        }
        self.revision += 1;
    }

    /// Apply a host edit as a single revision.
    pub fn apply(&mut self, edit: &TextEdit) {
        let len = self.rope.len_chars();
        let start = edit.range.start.min(len);
        let end = edit.range.end.clamp(start, len);
        if start < end {
            self.rope.remove(start..end);
        }
        self.rope.insert(start, &edit.insert);
        self.revision += 1;
    }
}

impl TextBuffer for EditorRope {
    fn len_bytes(&self) -> usize {
        self.rope.len_bytes()
    }

    fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    fn len_lines(&self) -> usize {
        self.rope.len_lines()
    }

    fn revision(&self) -> u64 {
        self.revision
    }

    fn slice(&self, char_range: Range<usize>) -> Option<SmolStr> {
        if char_range.start > char_range.end || char_range.end > self.len_chars() {
            return None;
        }
        Some(self.rope.slice(char_range).to_smolstr())
    }

    fn char_at(&self, char_offset: usize) -> Option<char> {
        if char_offset >= self.len_chars() {
            return None;
        }
        Some(self.rope.char(char_offset))
    }

    fn to_string(&self) -> String {
        self.rope.to_string()
    }

    fn char_to_byte(&self, char_offset: usize) -> usize {
        self.rope.char_to_byte(char_offset.min(self.rope.len_chars()))
    }

    fn byte_to_char(&self, byte_offset: usize) -> usize {
        self.rope.byte_to_char(byte_offset.min(self.rope.len_bytes()))
    }

    fn char_to_line(&self, char_offset: usize) -> usize {
        self.rope.char_to_line(char_offset.min(self.rope.len_chars()))
    }

    fn line_to_char(&self, line: usize) -> usize {
        self.rope.line_to_char(line.min(self.rope.len_lines()))
    }

    fn char_to_utf16(&self, char_offset: usize) -> usize {
        self.rope
            .char_to_utf16_cu(char_offset.min(self.rope.len_chars()))
    }

    fn utf16_to_char(&self, utf16_offset: usize) -> usize {
        self.rope
            .utf16_cu_to_char(utf16_offset.min(self.rope.len_utf16_cu()))
    }
}

impl From<&str> for EditorRope {
    fn from(s: &str) -> Self {
        Self::from_str(s)
    }
}

impl From<String> for EditorRope {
    fn from(s: String) -> Self {
        Self::from_str(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let mut rope = EditorRope::from_str("hello world");
        assert_eq!(rope.len_chars(), 11);
        assert_eq!(rope.revision(), 0);

        rope.insert(5, " beautiful");
        assert_eq!(rope.to_string(), "hello beautiful world");

        rope.delete(5..15);
        assert_eq!(rope.to_string(), "hello world");
        assert_eq!(rope.revision(), 2);
    }

    #[test]
    fn test_apply_edit() {
        let mut rope = EditorRope::from_str("- [ ] task");
        rope.apply(&TextEdit::replace(2..5, "[x]"));
        assert_eq!(rope.to_string(), "- [x] task");
        assert_eq!(rope.revision(), 1);
    }

    #[test]
    fn test_slice() {
        let rope = EditorRope::from_str("hello world");
        assert_eq!(rope.slice(0..5).as_deref(), Some("hello"));
        assert_eq!(rope.slice(6..11).as_deref(), Some("world"));
        assert_eq!(rope.slice(0..100), None);
    }

    #[test]
    fn test_offset_conversion() {
        // "hello 🌍" - emoji is 4 bytes, 1 char, 2 UTF-16 code units
        let rope = EditorRope::from_str("hello 🌍!");
        assert_eq!(rope.len_chars(), 8);
        assert_eq!(rope.len_bytes(), 11);

        assert_eq!(rope.char_to_byte(7), 10);
        assert_eq!(rope.byte_to_char(10), 7);
        assert_eq!(rope.char_to_utf16(7), 8);
        assert_eq!(rope.utf16_to_char(8), 7);
    }

    #[test]
    fn test_lines() {
        let rope = EditorRope::from_str("# Title\n\nbody\r\nlast");
        assert_eq!(rope.len_lines(), 4);
        assert_eq!(rope.line_number(0), 1);
        assert_eq!(rope.line_number(9), 3);
        assert_eq!(rope.line_range(0), 0..7);
        assert_eq!(rope.line_range(1), 8..8);
        assert_eq!(rope.line_range(2), 9..13);
        assert_eq!(rope.line_range(3), 15..19);
        // past the end clamps rather than panicking
        assert_eq!(rope.char_to_line(500), 3);
    }
}
