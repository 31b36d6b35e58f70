//! Decorations and the finishing pass that makes a set legal.
//!
//! A pass collects decorations in whatever order the tree walk produces them;
//! [`DecorationSet::finish`] clamps, sorts and de-overlaps them so that
//! consumers can rely on:
//!
//! - `from <= to <= doc_len` for every decoration,
//! - no two replacing decorations (`Hide`, `Replace`) overlap,
//! - no `Mark` starts strictly inside a replacing range.

use std::cmp::Reverse;
use std::ops::Range;

use crate::error::StaleTreeOffsetError;
use crate::widget::WidgetSpec;

/// Styling applied by a `Mark`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkStyle {
    Heading(u8),
    Strong,
    Emphasis,
    Strikethrough,
    InlineCode,
    Link,
    CodeBlock,
    TableHeader,
    TableDelimiter,
    TableRow { odd: bool },
    WikiLink { resolved: bool, active: bool },
}

impl MarkStyle {
    /// Class name hosts attach to the styled span.
    pub fn class(&self) -> &'static str {
        match self {
            MarkStyle::Heading(1) => "md-heading md-h1",
            MarkStyle::Heading(2) => "md-heading md-h2",
            MarkStyle::Heading(3) => "md-heading md-h3",
            MarkStyle::Heading(4) => "md-heading md-h4",
            MarkStyle::Heading(5) => "md-heading md-h5",
            MarkStyle::Heading(_) => "md-heading md-h6",
            MarkStyle::Strong => "md-strong",
            MarkStyle::Emphasis => "md-emphasis",
            MarkStyle::Strikethrough => "md-strikethrough",
            MarkStyle::InlineCode => "md-inline-code",
            MarkStyle::Link => "md-link",
            MarkStyle::CodeBlock => "md-code-block",
            MarkStyle::TableHeader => "md-table-header",
            MarkStyle::TableDelimiter => "md-table-delimiter",
            MarkStyle::TableRow { odd: true } => "md-table-row md-table-row-odd",
            MarkStyle::TableRow { odd: false } => "md-table-row md-table-row-even",
            MarkStyle::WikiLink {
                resolved: true,
                active: false,
            } => "md-wikilink",
            MarkStyle::WikiLink {
                resolved: false,
                active: false,
            } => "md-wikilink md-wikilink-unresolved",
            MarkStyle::WikiLink {
                resolved: true,
                active: true,
            } => "md-wikilink md-wikilink-active",
            MarkStyle::WikiLink {
                resolved: false,
                active: true,
            } => "md-wikilink md-wikilink-unresolved md-wikilink-active",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecorationKind {
    Mark(MarkStyle),
    /// Collapse the range to nothing.
    Hide,
    /// Draw a widget in place of the range. Zero-width replaces insert it.
    Replace(WidgetSpec),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decoration {
    pub from: usize,
    pub to: usize,
    pub kind: DecorationKind,
}

impl Decoration {
    pub fn mark(range: Range<usize>, style: MarkStyle) -> Self {
        Self {
            from: range.start,
            to: range.end,
            kind: DecorationKind::Mark(style),
        }
    }

    pub fn hide(range: Range<usize>) -> Self {
        Self {
            from: range.start,
            to: range.end,
            kind: DecorationKind::Hide,
        }
    }

    /// Replace the widget's source range with the widget.
    pub fn replace(spec: WidgetSpec) -> Self {
        Self {
            from: spec.source_range.start,
            to: spec.source_range.end,
            kind: DecorationKind::Replace(spec),
        }
    }

    pub fn range(&self) -> Range<usize> {
        self.from..self.to
    }

    pub fn is_replacing(&self) -> bool {
        !matches!(self.kind, DecorationKind::Mark(_))
    }

    pub fn widget(&self) -> Option<&WidgetSpec> {
        match &self.kind {
            DecorationKind::Replace(spec) => Some(spec),
            _ => None,
        }
    }

    /// Sort rank at equal `from`: block replace, inline replace, hide, mark.
    fn priority(&self) -> u8 {
        match &self.kind {
            DecorationKind::Replace(spec) if spec.is_block() => 0,
            DecorationKind::Replace(_) => 1,
            DecorationKind::Hide => 2,
            DecorationKind::Mark(_) => 3,
        }
    }

    fn is_degenerate(&self) -> bool {
        self.from > self.to || (self.from == self.to && !matches!(self.kind, DecorationKind::Replace(_)))
    }
}

/// Counters from one finishing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinishStats {
    pub clamped: usize,
    pub degenerate: usize,
    pub overlapping: usize,
    pub clipped: usize,
}

/// A sorted, legal decoration list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecorationSet {
    items: Vec<Decoration>,
}

impl DecorationSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Clamp, sort and de-overlap a raw collection.
    pub fn finish(raw: Vec<Decoration>, doc_len: usize) -> (Self, FinishStats) {
        let mut stats = FinishStats::default();

        let mut items: Vec<Decoration> = raw
            .into_iter()
            .filter_map(|mut d| {
                if d.to > doc_len || d.from > doc_len {
                    stats.clamped += 1;
                    if tracing::enabled!(target: "marginalia::build", tracing::Level::TRACE) {
                        let err = StaleTreeOffsetError {
                            range: d.range(),
                            doc_len,
                        };
                        tracing::trace!(target: "marginalia::build", %err, "clamping decoration");
                    }
                    d.from = d.from.min(doc_len);
                    d.to = d.to.min(doc_len);
                    if let DecorationKind::Replace(spec) = &mut d.kind {
                        spec.source_range = d.from..d.to;
                    }
                }
                if d.is_degenerate() {
                    stats.degenerate += 1;
                    return None;
                }
                Some(d)
            })
            .collect();

        items.sort_by_key(|d| (d.from, d.priority(), Reverse(d.to - d.from)));

        let (replacing, marks): (Vec<_>, Vec<_>) =
            items.into_iter().partition(Decoration::is_replacing);

        let mut out: Vec<Decoration> = Vec::with_capacity(replacing.len() + marks.len());
        let mut replacing_end = 0usize;
        for d in replacing {
            if d.from < replacing_end {
                stats.overlapping += 1;
                tracing::trace!(
                    target: "marginalia::build",
                    from = d.from,
                    to = d.to,
                    replacing_end,
                    "dropping overlapping replacement"
                );
                continue;
            }
            replacing_end = d.to;
            out.push(d);
        }

        // sorted and disjoint, so ends are sorted too
        let spans: Vec<Range<usize>> = out
            .iter()
            .map(Decoration::range)
            .filter(|r| !r.is_empty())
            .collect();
        for mut d in marks {
            let mut i = spans.partition_point(|r| r.end <= d.from);
            let mut clipped = false;
            while let Some(r) = spans.get(i) {
                if r.start > d.from {
                    break;
                }
                d.from = r.end;
                clipped = true;
                i += 1;
            }
            if d.from >= d.to {
                stats.overlapping += 1;
                tracing::trace!(
                    target: "marginalia::build",
                    to = d.to,
                    "dropping mark inside replacement"
                );
                continue;
            }
            if clipped {
                stats.clipped += 1;
            }
            out.push(d);
        }

        out.sort_by_key(|d| (d.from, d.priority(), Reverse(d.to - d.from)));

        if stats != FinishStats::default() {
            tracing::debug!(
                target: "marginalia::build",
                clamped = stats.clamped,
                degenerate = stats.degenerate,
                overlapping = stats.overlapping,
                clipped = stats.clipped,
                "adjusted decorations"
            );
        }
        (Self { items: out }, stats)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Decoration> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Decoration] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn widgets(&self) -> impl Iterator<Item = &WidgetSpec> {
        self.items.iter().filter_map(Decoration::widget)
    }

    pub fn into_vec(self) -> Vec<Decoration> {
        self.items
    }
}

impl<'a> IntoIterator for &'a DecorationSet {
    type Item = &'a Decoration;
    type IntoIter = std::slice::Iter<'a, Decoration>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::Mode;
    use crate::widget::Widget;

    fn block_widget(range: Range<usize>) -> Decoration {
        Decoration::replace(WidgetSpec::new(Widget::HorizontalRule, range, Mode::Reading))
    }

    fn checkbox(range: Range<usize>) -> Decoration {
        Decoration::replace(WidgetSpec::new(
            Widget::Checkbox { checked: false },
            range,
            Mode::Reading,
        ))
    }

    fn ranges(set: &DecorationSet) -> Vec<(Range<usize>, u8)> {
        set.iter().map(|d| (d.range(), d.priority())).collect()
    }

    #[test]
    fn test_sorted_by_start_then_priority() {
        let raw = vec![
            Decoration::mark(0..9, MarkStyle::Heading(1)),
            Decoration::hide(0..2),
            block_widget(20..23),
            Decoration::mark(12..14, MarkStyle::Strong),
        ];
        let (set, stats) = DecorationSet::finish(raw, 30);
        assert_eq!(stats.clipped, 1);
        assert_eq!(ranges(&set), vec![(0..2, 2), (2..9, 3), (12..14, 3), (20..23, 0)]);
    }

    #[test]
    fn test_overlapping_replacements_dropped() {
        let raw = vec![
            block_widget(0..10),
            Decoration::hide(3..5),
            checkbox(8..11),
            Decoration::hide(10..12),
        ];
        let (set, stats) = DecorationSet::finish(raw, 20);
        assert_eq!(stats.overlapping, 2);
        assert_eq!(ranges(&set), vec![(0..10, 0), (10..12, 2)]);
    }

    #[test]
    fn test_mark_inside_replacement_dropped_or_clipped() {
        let raw = vec![
            block_widget(0..10),
            Decoration::mark(2..4, MarkStyle::Emphasis),
            Decoration::mark(5..15, MarkStyle::Link),
            Decoration::mark(0..12, MarkStyle::CodeBlock),
        ];
        let (set, stats) = DecorationSet::finish(raw, 20);
        assert_eq!((stats.overlapping, stats.clipped), (1, 2));
        assert_eq!(ranges(&set), vec![(0..10, 0), (10..15, 3), (10..12, 3)]);
    }

    #[test]
    fn test_clamp_and_degenerate() {
        let raw = vec![
            Decoration::mark(5..50, MarkStyle::Strong),
            Decoration::hide(40..45),
            Decoration::hide(3..3),
            checkbox(4..4),
        ];
        let (set, stats) = DecorationSet::finish(raw, 10);
        assert_eq!(stats.clamped, 2);
        assert_eq!(stats.degenerate, 2);
        assert_eq!(ranges(&set), vec![(4..4, 1), (5..10, 3)]);
        assert!(set.iter().all(|d| d.from <= d.to && d.to <= 10));
    }

    #[test]
    fn test_zero_width_widget_before_hide() {
        let fold = Decoration::replace(WidgetSpec::new(
            Widget::HeadingFold {
                level: 1,
                folded: false,
            },
            0..0,
            Mode::Reading,
        ));
        let (set, stats) = DecorationSet::finish(vec![Decoration::hide(0..2), fold], 9);
        assert_eq!(stats, FinishStats::default());
        assert_eq!(ranges(&set), vec![(0..0, 1), (0..2, 2)]);
    }

    #[test]
    fn test_wikilink_classes() {
        assert_eq!(
            MarkStyle::WikiLink {
                resolved: false,
                active: false
            }
            .class(),
            "md-wikilink md-wikilink-unresolved"
        );
        assert_eq!(MarkStyle::Heading(9).class(), "md-heading md-h6");
    }
}
