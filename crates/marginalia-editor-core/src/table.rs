//! Pipe-table text to structured grid and back.
//!
//! Parsing normalizes every body row to the header's column count, so a
//! parsed model always serializes and re-parses to itself.
//!
//! A table inside a blockquote starts after the first line's `>` markers, so
//! only its later lines carry them. They are stripped on parse and written
//! back on serialize.

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;
use smol_str::SmolStr;
use unicode_width::UnicodeWidthStr;

use crate::error::TableSerializationMismatch;

static SEPARATOR_CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^:?-+:?$").expect("separator regex is valid"));

/// Column alignment from the separator row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Alignment {
    #[default]
    None,
    Left,
    Center,
    Right,
}

impl Alignment {
    fn from_separator(cell: &str) -> Self {
        match (cell.starts_with(':'), cell.len() > 1 && cell.ends_with(':')) {
            (true, true) => Alignment::Center,
            (true, false) => Alignment::Left,
            (false, true) => Alignment::Right,
            (false, false) => Alignment::None,
        }
    }

    fn separator(self, width: usize) -> String {
        let width = width.max(3);
        match self {
            Alignment::None => "-".repeat(width),
            Alignment::Left => format!(":{}", "-".repeat(width - 1)),
            Alignment::Right => format!("{}:", "-".repeat(width - 1)),
            Alignment::Center => format!(":{}:", "-".repeat(width - 2)),
        }
    }
}

/// A rectangular table: every row has `headers.len()` cells.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableModel {
    pub headers: Vec<SmolStr>,
    pub alignments: Vec<Alignment>,
    pub rows: Vec<Vec<SmolStr>>,
    /// Blockquote nesting of every line after the first.
    pub quote_depth: usize,
}

impl TableModel {
    /// Parse the raw text of a pipe table.
    pub fn parse(raw: &str) -> Result<Self, TableSerializationMismatch> {
        let lines: Vec<&str> = raw.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        // the separator row can never start with `>` on its own
        let quote_depth = lines.get(1).map_or(0, |l| strip_quote(l).0);
        let mut lines = lines
            .into_iter()
            .map(|l| if quote_depth > 0 { strip_quote(l).1 } else { l })
            .filter(|l| !l.is_empty());

        let headers = lines
            .next()
            .map(split_row)
            .ok_or(TableSerializationMismatch::Empty)?;

        let separator = lines
            .next()
            .map(split_row)
            .filter(|cells| !cells.is_empty() && cells.iter().all(|c| SEPARATOR_CELL.is_match(c)))
            .ok_or(TableSerializationMismatch::MissingSeparator)?;
        if separator.len() != headers.len() {
            return Err(TableSerializationMismatch::ColumnCount {
                header: headers.len(),
                separator: separator.len(),
            });
        }
        let alignments = separator.iter().map(|c| Alignment::from_separator(c)).collect();

        let columns = headers.len();
        let rows = lines
            .map(|line| {
                let mut cells = split_row(line);
                cells.resize(columns, SmolStr::default());
                cells
            })
            .collect();

        Ok(Self {
            headers,
            alignments,
            rows,
            quote_depth,
        })
    }

    pub fn columns(&self) -> usize {
        self.headers.len()
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column).map(SmolStr::as_str)
    }

    /// Overwrite one body cell. Returns false when out of range.
    pub fn set_cell(&mut self, row: usize, column: usize, value: impl Into<SmolStr>) -> bool {
        match self.rows.get_mut(row).and_then(|r| r.get_mut(column)) {
            Some(cell) => {
                *cell = value.into();
                true
            }
            None => false,
        }
    }

    /// Append an empty body row.
    pub fn push_row(&mut self) {
        self.rows.push(vec![SmolStr::default(); self.columns()]);
    }

    /// Render back to markdown, columns padded to equal display width.
    ///
    /// No trailing newline: the result replaces a table's source range as-is.
    pub fn serialize(&self) -> String {
        let columns = self.columns();
        let escaped_headers: Vec<String> = self.headers.iter().map(|c| escape_cell(c)).collect();
        let escaped_rows: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| {
                (0..columns)
                    .map(|i| row.get(i).map(|c| escape_cell(c)).unwrap_or_default())
                    .collect()
            })
            .collect();

        let widths: Vec<usize> = (0..columns)
            .map(|i| {
                escaped_rows
                    .iter()
                    .map(|r| r[i].width())
                    .chain(std::iter::once(escaped_headers[i].width()))
                    .max()
                    .unwrap_or(0)
                    .max(3)
            })
            .collect();
        let alignment = |i: usize| self.alignments.get(i).copied().unwrap_or_default();

        let mut out = String::new();
        self.write_row(&mut out, &escaped_headers, &widths, alignment);
        out.push('\n');
        out.push('|');
        for (i, width) in widths.iter().enumerate() {
            let _ = write!(out, " {} |", alignment(i).separator(*width));
        }
        for row in &escaped_rows {
            out.push('\n');
            self.write_row(&mut out, row, &widths, alignment);
        }
        if self.quote_depth > 0 {
            let prefix = format!("\n{}", "> ".repeat(self.quote_depth));
            out = out.replace('\n', &prefix);
        }
        out
    }

    fn write_row(
        &self,
        out: &mut String,
        cells: &[String],
        widths: &[usize],
        alignment: impl Fn(usize) -> Alignment,
    ) {
        out.push('|');
        for (i, (cell, width)) in cells.iter().zip(widths).enumerate() {
            let pad = width.saturating_sub(cell.width());
            let (left, right) = match alignment(i) {
                Alignment::Right => (pad, 0),
                Alignment::Center => (pad / 2, pad - pad / 2),
                Alignment::None | Alignment::Left => (0, pad),
            };
            let _ = write!(out, " {}{}{} |", " ".repeat(left), cell, " ".repeat(right));
        }
    }
}

/// Count and strip leading blockquote markers.
fn strip_quote(line: &str) -> (usize, &str) {
    let mut rest = line.trim_start();
    let mut depth = 0;
    while let Some(after) = rest.strip_prefix('>') {
        depth += 1;
        rest = after.trim_start();
    }
    (depth, rest)
}

/// Split a row on unescaped pipes, dropping the empty boundary cells.
pub fn split_row(line: &str) -> Vec<SmolStr> {
    let line = line.trim();
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for ch in line.chars() {
        match ch {
            '|' if !escaped => cells.push(SmolStr::new(std::mem::take(&mut current).trim())),
            _ => {
                escaped = ch == '\\' && !escaped;
                current.push(ch);
                continue;
            }
        }
        escaped = false;
    }
    cells.push(SmolStr::new(current.trim()));

    if line.starts_with('|') && cells.first().is_some_and(|c| c.is_empty()) {
        cells.remove(0);
    }
    if ends_with_unescaped_pipe(line) && cells.last().is_some_and(|c| c.is_empty()) {
        cells.pop();
    }
    cells
}

fn ends_with_unescaped_pipe(line: &str) -> bool {
    let Some(body) = line.strip_suffix('|') else {
        return false;
    };
    body.chars().rev().take_while(|&c| c == '\\').count() % 2 == 0
}

fn escape_cell(cell: &str) -> String {
    let mut out = String::with_capacity(cell.len());
    let mut escaped = false;
    for ch in cell.chars() {
        if ch == '|' && !escaped {
            out.push('\\');
        }
        escaped = ch == '\\' && !escaped;
        out.push(ch);
    }
    out
}
