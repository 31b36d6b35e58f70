//! Editing mode and the active-line set.
//!
//! The mode decides how much raw markdown is revealed. In live preview the
//! reveal is driven by the selection: any line a selection range touches is
//! "active" and shows its raw syntax, everything else renders.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::InvalidModeError;
use crate::text::TextBuffer;
use crate::types::Selection;

/// Editing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// All raw syntax visible, no widgets.
    Source,
    /// Raw syntax visible on active lines only.
    #[default]
    LivePreview,
    /// All raw syntax hidden, every widget active.
    Reading,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Source => "source",
            Mode::LivePreview => "live-preview",
            Mode::Reading => "reading",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = InvalidModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "source" => Ok(Mode::Source),
            "live-preview" | "live_preview" | "livepreview" | "live" => Ok(Mode::LivePreview),
            "reading" | "read" => Ok(Mode::Reading),
            _ => Err(InvalidModeError {
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<u8> for Mode {
    type Error = InvalidModeError;

    /// Numeric mode ids as persisted by older settings stores.
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Mode::Source),
            1 => Ok(Mode::LivePreview),
            2 => Ok(Mode::Reading),
            other => Err(InvalidModeError {
                value: other.to_string(),
            }),
        }
    }
}

/// Current mode plus the one-based line numbers touched by the selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeState {
    mode: Mode,
    active_lines: BTreeSet<usize>,
}

impl ModeState {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            active_lines: BTreeSet::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Replace the mode. Returns whether it actually changed.
    pub fn set_mode(&mut self, mode: Mode) -> bool {
        let changed = self.mode != mode;
        self.mode = mode;
        changed
    }

    pub fn active_lines(&self) -> &BTreeSet<usize> {
        &self.active_lines
    }

    /// Recompute the active lines as the union of every selection's line span.
    pub fn on_selection_or_doc_change<T: TextBuffer>(&mut self, selections: &[Selection], doc: &T) {
        self.active_lines.clear();
        let len = doc.len_chars();
        for sel in selections {
            let first = doc.line_number(sel.start().min(len));
            let last = doc.line_number(sel.end().min(len));
            self.active_lines.extend(first..=last);
        }
    }

    /// Replace the active set directly, for hosts that track lines themselves.
    pub fn set_active_lines(&mut self, lines: impl IntoIterator<Item = usize>) {
        self.active_lines = lines.into_iter().collect();
    }

    pub fn is_active(&self, line: usize) -> bool {
        self.active_lines.contains(&line)
    }

    /// Whether raw syntax starting on `line` is revealed.
    pub fn reveals_line(&self, line: usize) -> bool {
        match self.mode {
            Mode::Source => true,
            Mode::Reading => false,
            Mode::LivePreview => self.is_active(line),
        }
    }

    /// Whether a block spanning `lines` (half-open, one-based) is revealed.
    pub fn reveals_lines(&self, lines: Range<usize>) -> bool {
        match self.mode {
            Mode::Source => true,
            Mode::Reading => false,
            Mode::LivePreview => self.active_lines.range(lines).next().is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::EditorRope;

    #[test]
    fn test_parse_modes() {
        assert_eq!("source".parse::<Mode>(), Ok(Mode::Source));
        assert_eq!("Live-Preview".parse::<Mode>(), Ok(Mode::LivePreview));
        assert_eq!("reading".parse::<Mode>(), Ok(Mode::Reading));
        let err = "wysiwyg".parse::<Mode>().unwrap_err();
        assert_eq!(err.value, "wysiwyg");
        assert!(Mode::try_from(7u8).is_err());
        assert_eq!(Mode::try_from(2u8), Ok(Mode::Reading));
    }

    #[test]
    fn test_set_mode_reports_change() {
        let mut state = ModeState::default();
        assert_eq!(state.mode(), Mode::LivePreview);
        assert!(state.set_mode(Mode::Reading));
        assert!(!state.set_mode(Mode::Reading));
    }

    #[test]
    fn test_active_lines_union_of_selections() {
        let doc = EditorRope::from_str("one\ntwo\nthree\nfour\nfive");
        let mut state = ModeState::new(Mode::LivePreview);

        // caret on line 1, selection spanning lines 3..4
        let selections = [Selection::collapsed(1), Selection::new(17, 9)];
        state.on_selection_or_doc_change(&selections, &doc);
        assert_eq!(
            state.active_lines().iter().copied().collect::<Vec<_>>(),
            vec![1, 3, 4]
        );

        // offsets past the end clamp to the last line
        state.on_selection_or_doc_change(&[Selection::collapsed(999)], &doc);
        assert_eq!(state.active_lines().iter().copied().collect::<Vec<_>>(), vec![5]);
    }

    #[test]
    fn test_reveal_policy() {
        let mut state = ModeState::new(Mode::LivePreview);
        state.set_active_lines([3]);
        assert!(state.reveals_line(3));
        assert!(!state.reveals_line(4));
        assert!(state.reveals_lines(1..4));
        assert!(!state.reveals_lines(4..9));

        state.set_mode(Mode::Source);
        assert!(state.reveals_line(4));
        state.set_mode(Mode::Reading);
        assert!(!state.reveals_line(3));
    }
}
