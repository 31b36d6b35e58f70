//! The decoration pass.
//!
//! Walks the syntax tree over the visible ranges and turns every construct
//! into marks, hides and widget replacements according to the editing mode
//! and the active lines:
//!
//! | construct | source | rendered | revealed (live preview) |
//! |---|---|---|---|
//! | heading / emphasis / link / code marks | shown | hidden | shown |
//! | image, horizontal rule, admonition | raw | block widget | raw |
//! | table | raw | block widget | raw + row marks |
//! | diagram fence | raw | block widget | raw |
//! | other fenced code | raw + mark | header widget, fences hidden | raw + mark |
//! | task marker | raw | checkbox | raw |
//!
//! Content styling (heading size, strong, code...) is applied in every mode
//! so text metrics stay the same when a line is revealed.

use std::collections::HashSet;
use std::ops::Range;

use marginalia_common::perf::TimingGuard;
use smol_str::SmolStr;

use crate::context::EditorContext;
use crate::decoration::{Decoration, DecorationSet, FinishStats, MarkStyle};
use crate::mode::Mode;
use crate::table::TableModel;
use crate::text::TextBuffer;
use crate::tree::{NodeId, NodeKind, SyntaxTree};
use crate::widget::{Widget, WidgetSpec};
use crate::wikilink::{self, TitleIndex};

/// Build the decoration set for `visible` (the whole document when empty).
pub fn build<T: TextBuffer, I: TitleIndex>(
    doc: &T,
    tree: &SyntaxTree,
    ctx: &EditorContext,
    index: &I,
    visible: &[Range<usize>],
) -> (DecorationSet, FinishStats) {
    let _timing = TimingGuard::new("decoration build");
    let len = doc.len_chars();

    if tree.is_stale(doc) {
        tracing::debug!(
            target: "marginalia::build",
            tree_len = tree.source_len(),
            tree_revision = tree.revision(),
            doc_len = len,
            doc_revision = doc.revision(),
            "building from a stale tree"
        );
    }

    let ranges: Vec<Range<usize>> = if visible.is_empty() {
        vec![0..len]
    } else {
        visible
            .iter()
            .map(|r| r.start.min(len)..r.end.min(len).max(r.start.min(len)))
            .collect()
    };

    let mut builder = DecorationBuilder {
        doc,
        tree,
        ctx,
        out: Vec::new(),
        covered: Vec::new(),
        visited: vec![false; tree.len()],
    };
    let mut nodes = 0usize;
    for range in &ranges {
        for id in tree.walk(range.clone()) {
            if std::mem::replace(&mut builder.visited[id.index()], true) {
                continue;
            }
            nodes += 1;
            builder.visit(id);
        }
    }
    builder.wikilinks(&ranges, index);

    let raw = builder.out.len();
    let (set, stats) = DecorationSet::finish(builder.out, len);
    tracing::debug!(
        target: "marginalia::build",
        mode = ctx.mode.mode().as_str(),
        ranges = ranges.len(),
        nodes,
        raw,
        decorations = set.len(),
        "built decorations"
    );
    (set, stats)
}

struct DecorationBuilder<'a, T: TextBuffer> {
    doc: &'a T,
    tree: &'a SyntaxTree,
    ctx: &'a EditorContext,
    out: Vec<Decoration>,
    /// Ranges already replaced by a block widget or hidden by a fold.
    covered: Vec<Range<usize>>,
    visited: Vec<bool>,
}

impl<T: TextBuffer> DecorationBuilder<'_, T> {
    fn mode(&self) -> Mode {
        self.ctx.mode.mode()
    }

    fn line(&self, offset: usize) -> usize {
        self.doc.line_number(offset)
    }

    /// Inline constructs reveal when their first line is active.
    fn reveals_inline(&self, range: &Range<usize>) -> bool {
        self.ctx.mode.reveals_line(self.line(range.start))
    }

    /// Blocks reveal when any of their lines is active.
    fn reveals_block(&self, range: &Range<usize>) -> bool {
        let first = self.line(range.start);
        let last = self.line(range.end.saturating_sub(1).max(range.start));
        self.ctx.mode.reveals_lines(first..last + 1)
    }

    fn is_covered(&self, range: &Range<usize>) -> bool {
        self.covered
            .iter()
            .any(|c| c.start <= range.start && range.end <= c.end)
    }

    fn text(&self, range: Range<usize>) -> SmolStr {
        self.doc.slice(range).unwrap_or_default()
    }

    fn children_where(&self, id: NodeId, pred: impl Fn(&NodeKind) -> bool) -> Vec<Range<usize>> {
        self.tree
            .children(id)
            .filter(|&c| pred(self.tree.kind(c)))
            .map(|c| self.tree.range(c))
            .collect()
    }

    fn replace(&mut self, widget: Widget, range: Range<usize>) {
        let block = widget.is_block();
        let spec = WidgetSpec::new(widget, range.clone(), self.mode());
        if tracing::enabled!(target: "marginalia::build", tracing::Level::TRACE) {
            tracing::trace!(
                target: "marginalia::build",
                kind = spec.kind().as_str(),
                ?range,
                "widget"
            );
        }
        self.out.push(Decoration::replace(spec));
        if block && !range.is_empty() {
            self.covered.push(range);
        }
    }

    fn visit(&mut self, id: NodeId) {
        let range = self.tree.range(id);
        if self.is_covered(&range) {
            return;
        }
        match self.tree.kind(id).clone() {
            NodeKind::Heading { level } => self.heading(id, range, level),
            NodeKind::Emphasis => {
                self.delimited(id, range, MarkStyle::Emphasis, |k| *k == NodeKind::EmphasisMark)
            }
            NodeKind::Strong => {
                self.delimited(id, range, MarkStyle::Strong, |k| *k == NodeKind::EmphasisMark)
            }
            NodeKind::Strikethrough => self.delimited(id, range, MarkStyle::Strikethrough, |k| {
                *k == NodeKind::EmphasisMark
            }),
            NodeKind::Link { .. } => {
                self.delimited(id, range, MarkStyle::Link, |k| *k == NodeKind::LinkMark)
            }
            NodeKind::InlineCode => {
                self.delimited(id, range, MarkStyle::InlineCode, |k| *k == NodeKind::CodeMark)
            }
            NodeKind::Image { url, title, alt } => {
                if !self.reveals_inline(&range) {
                    self.replace(Widget::Image { url, alt, title }, range);
                }
            }
            NodeKind::HorizontalRule => {
                if !self.reveals_inline(&range) {
                    self.replace(Widget::HorizontalRule, range);
                }
            }
            NodeKind::TaskMarker { checked } => {
                if !self.reveals_inline(&range) {
                    self.replace(Widget::Checkbox { checked }, range);
                }
            }
            NodeKind::Table { .. } => self.table(id, range),
            NodeKind::CodeBlock { language, fenced } => self.code_block(id, range, language, fenced),
            NodeKind::Admonition { kind, title } => {
                if !self.reveals_block(&range) {
                    let fences = self.children_where(id, |k| *k == NodeKind::AdmonitionFence);
                    let body = self.text(inner_range(&range, &fences));
                    self.replace(Widget::Admonition { kind, title, body }, range);
                }
            }
            _ => {}
        }
    }

    /// Constructs with a marker run on each side: mark the content in every
    /// mode, hide the markers unless revealed.
    fn delimited(
        &mut self,
        id: NodeId,
        range: Range<usize>,
        style: MarkStyle,
        is_marker: impl Fn(&NodeKind) -> bool,
    ) {
        let markers = self.children_where(id, is_marker);
        if markers.is_empty() || self.reveals_inline(&range) {
            self.out.push(Decoration::mark(range, style));
            return;
        }
        let content_start = markers[0].end;
        let content_end = match markers.len() {
            1 => range.end,
            _ => markers[markers.len() - 1].start,
        };
        if content_start < content_end {
            self.out.push(Decoration::mark(content_start..content_end, style));
        }
        for marker in markers {
            self.out.push(Decoration::hide(marker));
        }
    }

    fn heading(&mut self, id: NodeId, range: Range<usize>, level: u8) {
        let markers = self.children_where(id, |k| *k == NodeKind::HeadingMark);
        let revealed = self.reveals_inline(&range);
        if revealed || markers.is_empty() {
            self.out.push(Decoration::mark(range.clone(), MarkStyle::Heading(level)));
        } else {
            // an ATX opening run starts the heading; anything else closes it
            let (open, close): (Vec<_>, Vec<_>) =
                markers.iter().cloned().partition(|m| m.start == range.start);
            let start = open.first().map_or(range.start, |m| m.end);
            let end = close.first().map_or(range.end, |m| m.start);
            if start < end {
                self.out.push(Decoration::mark(start..end, MarkStyle::Heading(level)));
            }
            for marker in markers {
                self.out.push(Decoration::hide(marker));
            }
        }

        if self.mode() == Mode::Source {
            return;
        }
        let folded = self.ctx.is_folded(range.start);
        self.replace(Widget::HeadingFold { level, folded }, range.start..range.start);
        if folded {
            if let Some(body) = self.tree.heading_section(id) {
                self.out.push(Decoration::hide(body.clone()));
                self.covered.push(body);
            }
        }
    }

    fn table(&mut self, id: NodeId, range: Range<usize>) {
        let raw = self.text(range.clone());
        let model = match TableModel::parse(&raw) {
            Ok(model) => model,
            Err(err) => {
                tracing::trace!(target: "marginalia::build", ?range, %err, "table left as text");
                return;
            }
        };
        if !self.reveals_block(&range) {
            self.replace(Widget::Table { model }, range);
            return;
        }
        if self.mode() != Mode::LivePreview {
            return;
        }
        let mut body_rows = 0usize;
        let rows: Vec<(NodeKind, Range<usize>)> = self
            .tree
            .children(id)
            .map(|c| (self.tree.kind(c).clone(), self.tree.range(c)))
            .collect();
        for (kind, row) in rows {
            let style = match kind {
                NodeKind::TableHead => MarkStyle::TableHeader,
                NodeKind::TableDelimiter => MarkStyle::TableDelimiter,
                NodeKind::TableRow => {
                    body_rows += 1;
                    MarkStyle::TableRow {
                        odd: body_rows % 2 == 1,
                    }
                }
                _ => continue,
            };
            self.out.push(Decoration::mark(row, style));
        }
    }

    fn code_block(&mut self, id: NodeId, range: Range<usize>, language: Option<SmolStr>, fenced: bool) {
        let revealed = self.reveals_block(&range);
        let fences = self.children_where(id, |k| *k == NodeKind::CodeFence);

        if let Some(lang) = language.as_ref().filter(|l| fenced && self.ctx.config.is_diagram_language(l)) {
            if revealed {
                self.out.push(Decoration::mark(range, MarkStyle::CodeBlock));
            } else {
                let source = self.text(inner_range(&range, &fences));
                let widget = Widget::Diagram {
                    language: lang.clone(),
                    source,
                    theme: self.ctx.theme,
                };
                self.replace(widget, range);
            }
            return;
        }

        if revealed || fences.is_empty() {
            self.out.push(Decoration::mark(range, MarkStyle::CodeBlock));
            return;
        }

        let body = inner_range(&range, &fences);
        let line_count = if body.is_empty() {
            0
        } else {
            self.line(body.end) - self.line(body.start) + 1
        };
        self.replace(Widget::CodeBlockHeader { language, line_count }, range.start..range.start);

        // hide each fence line together with the line break next to it
        let open = &fences[0];
        let open_hide = open.start..(open.end + 1).min(range.end);
        self.out.push(Decoration::hide(open_hide.clone()));
        if let Some(close) = fences.get(1) {
            let start = close.start.saturating_sub(1).max(open_hide.end);
            self.out.push(Decoration::hide(start..close.end));
        }
        if !body.is_empty() {
            self.out.push(Decoration::mark(body, MarkStyle::CodeBlock));
        }
    }

    fn wikilinks<I: TitleIndex>(&mut self, ranges: &[Range<usize>], index: &I) {
        let mut seen = HashSet::new();
        for range in ranges {
            for link in wikilink::scan(self.doc, self.tree, range.clone()) {
                if !seen.insert(link.range.start) || self.is_covered(&link.range) {
                    continue;
                }
                let revealed = self.reveals_inline(&link.range);
                let active = revealed && self.mode() == Mode::LivePreview;
                let resolved = wikilink::resolve(&link.title, index).is_resolved();
                wikilink::decorate(&link, resolved, revealed, active, &mut self.out);
            }
        }
    }
}

/// Text between the first and last fence lines of a block (exclusive of the
/// line breaks next to them).
fn inner_range(range: &Range<usize>, fences: &[Range<usize>]) -> Range<usize> {
    let start = fences
        .first()
        .map_or(range.start, |f| (f.end + 1).min(range.end));
    let end = match fences {
        [_, .., last] => last.start.saturating_sub(1),
        _ => range.end,
    };
    start..end.max(start)
}
