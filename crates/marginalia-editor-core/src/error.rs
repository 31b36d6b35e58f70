//! Error types for the decoration engine.
//!
//! Every failure is scoped to the call or widget that produced it. Nothing in
//! here aborts a decoration pass: builders and widgets catch these and fall
//! back to plain-text presentation.

use std::ops::Range;

use miette::Diagnostic;
use thiserror::Error;

/// A mode name that does not correspond to any [`Mode`](crate::Mode).
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
#[error("invalid editor mode: {value:?}")]
#[diagnostic(
    code(marginalia::mode::invalid),
    help("expected one of `source`, `live-preview` or `reading`")
)]
pub struct InvalidModeError {
    pub value: String,
}

/// The diagram engine rejected the source text.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
#[error("diagram syntax error: {message}")]
#[diagnostic(code(marginalia::diagram::syntax))]
pub struct DiagramSyntaxError {
    pub message: String,
}

impl DiagramSyntaxError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// First non-empty line of the engine message, shown inline in the widget.
    pub fn first_line(&self) -> &str {
        self.message
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("unknown diagram error")
    }
}

/// Offsets produced by a syntax tree that no longer matches the document.
///
/// Internal only: the builder clamps or drops the affected decoration and logs it.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
#[error("syntax tree offsets {range:?} exceed document length {doc_len}")]
#[diagnostic(code(marginalia::tree::stale))]
pub struct StaleTreeOffsetError {
    pub range: Range<usize>,
    pub doc_len: usize,
}

/// Raw table text that cannot be turned into a rectangular grid.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TableSerializationMismatch {
    #[error("table has no header row")]
    #[diagnostic(code(marginalia::table::empty))]
    Empty,

    #[error("table has no separator row")]
    #[diagnostic(
        code(marginalia::table::separator),
        help("the second line must look like `| --- | :---: |`")
    )]
    MissingSeparator,

    #[error("separator row has {separator} columns but header has {header}")]
    #[diagnostic(code(marginalia::table::columns))]
    ColumnCount { header: usize, separator: usize },
}

/// Main error type for engine operations.
#[derive(Error, Debug, Diagnostic)]
#[non_exhaustive]
pub enum EngineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    InvalidMode(#[from] InvalidModeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Diagram(#[from] DiagramSyntaxError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    StaleTree(#[from] StaleTreeOffsetError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Table(#[from] TableSerializationMismatch),

    /// A widget edit was committed after the document changed under it.
    #[error("source range {range:?} changed since the edit was opened")]
    #[diagnostic(
        code(marginalia::edit::conflict),
        help("reopen the editor to pick up the current source")
    )]
    EditConflict { range: Range<usize> },

    /// The handle does not refer to a mounted widget.
    #[error("no mounted widget for handle {0}")]
    #[diagnostic(code(marginalia::widget::unmounted))]
    Unmounted(usize),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
