//! Markdown syntax marker detection.
//!
//! The parser reports the extent of each construct; these helpers find the
//! marker characters inside that extent (`#`, `**`, `` ` ``, `](url)`, fence
//! lines, `[ ]`) so they can be hidden or revealed on their own. All ranges
//! are byte ranges relative to the slice passed in.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use smol_str::SmolStr;

/// Opening (and optional closing) marker of a heading.
///
/// ATX headings hide `## ` plus an optional closing `##` run; setext headings
/// hide their underline.
pub fn heading_markers(text: &str) -> (Option<Range<usize>>, Option<Range<usize>>) {
    let indent = leading_spaces(text);
    let rest = &text[indent..];
    if rest.starts_with('#') {
        let hashes = rest.bytes().take_while(|&b| b == b'#').count();
        let after = indent + hashes;
        let spaces = text[after..]
            .bytes()
            .take_while(|&b| b == b' ' || b == b'\t')
            .count();
        let open = 0..after + spaces;

        let body_end = text.trim_end().len();
        let trailing = text[..body_end]
            .bytes()
            .rev()
            .take_while(|&b| b == b'#')
            .count();
        let close_start = body_end - trailing;
        let close = (trailing > 0
            && close_start > open.end
            && text[..close_start].ends_with([' ', '\t']))
        .then(|| {
            let ws = text[..close_start]
                .bytes()
                .rev()
                .take_while(|&b| b == b' ' || b == b'\t')
                .count();
            close_start - ws..body_end
        });
        return (Some(open), close);
    }

    // Setext: the underline is the last line.
    let trimmed = text.trim_end();
    if let Some(nl) = trimmed.rfind('\n') {
        let underline = trimmed[nl + 1..].trim();
        if !underline.is_empty() && underline.bytes().all(|b| b == b'=' || b == b'-') {
            return (None, Some(nl + 1..trimmed.len()));
        }
    }
    (None, None)
}

/// Length of the delimiter run wrapping an emphasis-like span.
pub fn delimiter_len(text: &str, wanted: usize) -> usize {
    let Some(first) = text.bytes().next() else {
        return 0;
    };
    let run = text.bytes().take_while(|&b| b == first).count();
    let tail = text.bytes().rev().take_while(|&b| b == first).count();
    let len = run.min(tail).min(wanted);
    if len * 2 > text.len() { 0 } else { len }
}

/// Strikethrough accepts both `~x~` and `~~x~~`.
pub fn strikethrough_len(text: &str) -> usize {
    delimiter_len(text, 2)
}

/// Opening `[` / `<` and closing `](dest)` / `][ref]` / `]` / `>` of a link.
pub fn link_markers(text: &str) -> Option<(Range<usize>, Range<usize>)> {
    if text.starts_with('<') && text.ends_with('>') && text.len() >= 2 {
        return Some((0..1, text.len() - 1..text.len()));
    }
    if !text.starts_with('[') {
        return None;
    }
    let label_end = matching_bracket(text)?;
    Some((0..1, label_end..text.len()))
}

/// Index of the `]` closing the label that starts at byte 0.
fn matching_bracket(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'[' => depth += 1,
            b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Backtick runs around an inline code span.
pub fn code_span_markers(text: &str) -> Option<(Range<usize>, Range<usize>)> {
    let open = text.bytes().take_while(|&b| b == b'`').count();
    let close = text.bytes().rev().take_while(|&b| b == b'`').count();
    if open == 0 || open != close || open * 2 > text.len() {
        return None;
    }
    Some((0..open, text.len() - close..text.len()))
}

/// Opening and closing fence lines of a fenced code block.
///
/// Line ranges exclude the line terminator. The closing fence is absent for
/// blocks left open at the end of the document.
pub fn fence_lines(text: &str) -> (Range<usize>, Option<Range<usize>>) {
    let first_end = text.find('\n').unwrap_or(text.len());
    let open = 0..first_end - usize::from(text[..first_end].ends_with('\r'));

    let opening = text[..first_end].trim_start();
    let Some(fence_char) = opening.bytes().next().filter(|b| *b == b'`' || *b == b'~') else {
        return (open, None);
    };
    let fence_len = opening.bytes().take_while(|&b| b == fence_char).count();

    let trimmed = text.trim_end_matches(['\n', '\r']);
    let Some(nl) = trimmed.rfind('\n') else {
        return (open, None);
    };
    if nl < first_end {
        return (open, None);
    }
    let last = trimmed[nl + 1..].trim();
    let run = last.bytes().take_while(|&b| b == fence_char).count();
    if run >= fence_len && run == last.len() {
        (open, Some(nl + 1..trimmed.len()))
    } else {
        (open, None)
    }
}

/// Info string of a fenced code block, lowercased first word.
pub fn fence_language(info: &str) -> Option<SmolStr> {
    info.split_whitespace()
        .next()
        .map(|lang| SmolStr::new(lang.trim_start_matches('{').trim_end_matches('}').to_lowercase()))
        .filter(|lang| !lang.is_empty())
}

/// `[ ]` / `[x]` marker of a task list item, with its checked state.
pub fn task_marker(item: &str) -> Option<(Range<usize>, bool)> {
    let bytes = item.as_bytes();
    let mut i = leading_spaces(item);
    match bytes.get(i)? {
        b'-' | b'*' | b'+' => i += 1,
        b'0'..=b'9' => {
            i += item[i..].bytes().take_while(u8::is_ascii_digit).count();
            if !matches!(bytes.get(i)?, b'.' | b')') {
                return None;
            }
            i += 1;
        }
        _ => return None,
    }
    let ws = item[i..].bytes().take_while(|&b| b == b' ' || b == b'\t').count();
    if ws == 0 {
        return None;
    }
    i += ws;
    let marker = bytes.get(i..i + 3)?;
    let checked = match marker {
        b"[ ]" => false,
        b"[x]" | b"[X]" => true,
        _ => return None,
    };
    match bytes.get(i + 3) {
        None | Some(b' ' | b'\t' | b'\n' | b'\r') => Some((i..i + 3, checked)),
        _ => None,
    }
}

static ADMONITION_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}:{3,}\s*([A-Za-z][\w-]*)[ \t]*(.*?)\s*$").expect("valid admonition regex")
});

static ADMONITION_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}:{3,}\s*$").expect("valid admonition regex"));

/// A `:::kind Title` … `:::` region found by a line scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmonitionSpan {
    /// Whole region, opening line start to closing line end.
    pub range: Range<usize>,
    pub open_line: Range<usize>,
    pub close_line: Option<Range<usize>>,
    pub kind: SmolStr,
    pub title: SmolStr,
}

/// Find admonition regions, ignoring `:::` lines inside fenced code.
///
/// An unterminated admonition runs to the end of the document.
pub fn find_admonitions(source: &str) -> Vec<AdmonitionSpan> {
    let mut spans = Vec::new();
    let mut open: Option<(Range<usize>, SmolStr, SmolStr)> = None;
    let mut fence: Option<(u8, usize)> = None;
    let mut offset = 0;

    for raw_line in source.split_inclusive('\n') {
        let line_start = offset;
        offset += raw_line.len();
        let line = raw_line.trim_end_matches(['\n', '\r']);
        let line_range = line_start..line_start + line.len();

        let trimmed = line.trim_start();
        if let Some(ch) = trimmed.bytes().next().filter(|b| *b == b'`' || *b == b'~') {
            let run = trimmed.bytes().take_while(|&b| b == ch).count();
            if run >= 3 {
                fence = match fence {
                    None => Some((ch, run)),
                    Some((c, n)) if c == ch && run >= n && trimmed.len() == run => None,
                    other => other,
                };
                continue;
            }
        }
        if fence.is_some() {
            continue;
        }

        match &open {
            None => {
                if let Some(caps) = ADMONITION_OPEN.captures(line) {
                    open = Some((
                        line_range,
                        SmolStr::new(caps[1].to_lowercase()),
                        SmolStr::new(&caps[2]),
                    ));
                }
            }
            Some(_) => {
                if ADMONITION_CLOSE.is_match(line) {
                    if let Some((open_line, kind, title)) = open.take() {
                        spans.push(AdmonitionSpan {
                            range: open_line.start..line_range.end,
                            open_line,
                            close_line: Some(line_range),
                            kind,
                            title,
                        });
                    }
                }
            }
        }
    }

    if let Some((open_line, kind, title)) = open {
        spans.push(AdmonitionSpan {
            range: open_line.start..source.trim_end().len().max(open_line.end),
            open_line,
            close_line: None,
            kind,
            title,
        });
    }
    spans
}

fn leading_spaces(text: &str) -> usize {
    text.bytes().take(3).take_while(|&b| b == b' ').count()
}
