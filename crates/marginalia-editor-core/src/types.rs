//! Core editor types: selections and text edits.
//!
//! These types are framework-agnostic; all offsets are char offsets into a
//! [`TextBuffer`](crate::TextBuffer).

use std::ops::Range;

use smol_str::SmolStr;

/// Text selection with anchor and head positions.
///
/// The anchor is where the selection started, the head is where the cursor is now.
/// They may be in any order - use `start()` and `end()` for ordered bounds.
#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub struct Selection {
    /// Where selection started
    pub anchor: usize,
    /// Where cursor is now
    pub head: usize,
}

impl Selection {
    /// Create a new selection.
    pub fn new(anchor: usize, head: usize) -> Self {
        Self { anchor, head }
    }

    /// Create a collapsed selection (cursor position).
    pub fn collapsed(offset: usize) -> Self {
        Self {
            anchor: offset,
            head: offset,
        }
    }

    /// Get the start (lower bound) of the selection.
    pub fn start(&self) -> usize {
        self.anchor.min(self.head)
    }

    /// Get the end (upper bound) of the selection.
    pub fn end(&self) -> usize {
        self.anchor.max(self.head)
    }

    /// Check if the selection is collapsed (empty, cursor only).
    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.head
    }

    /// Check if an offset is within the selection.
    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start() && offset < self.end()
    }

    /// Get the selection length.
    pub fn len(&self) -> usize {
        self.end() - self.start()
    }

    /// Check if empty (same as is_collapsed).
    pub fn is_empty(&self) -> bool {
        self.is_collapsed()
    }

    /// Convert to a Range<usize> (ordered).
    pub fn to_range(&self) -> Range<usize> {
        self.start()..self.end()
    }
}

/// A single replacement in the document.
///
/// This is the only shape in which the engine asks the host to mutate text:
/// checkbox toggles, widget edit commits and bracket auto-pairing all produce one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextEdit {
    /// Char range being replaced. Empty for a pure insertion.
    pub range: Range<usize>,
    /// Replacement text.
    pub insert: SmolStr,
}

impl TextEdit {
    pub fn replace(range: Range<usize>, insert: impl Into<SmolStr>) -> Self {
        Self {
            range,
            insert: insert.into(),
        }
    }

    pub fn insert(offset: usize, insert: impl Into<SmolStr>) -> Self {
        Self::replace(offset..offset, insert)
    }

    /// Net change in document length (in chars) once applied.
    pub fn char_delta(&self) -> isize {
        self.insert.chars().count() as isize - self.range.len() as isize
    }
}
