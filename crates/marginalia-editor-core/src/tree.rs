//! Arena-backed markdown syntax tree.
//!
//! Nodes carry a kind and a char range into the document they were built
//! from, and link to parent, children and siblings by [`NodeId`]. Any parser
//! can feed a tree through [`TreeBuilder`]; [`SyntaxTree::parse`] drives it
//! from pulldown-cmark's offset iterator and adds the marker leaves
//! (`#`, `**`, fences, `[ ]`) the decoration pass hides and reveals.

use std::ops::Range;

use pulldown_cmark::{CodeBlockKind, Event, LinkType, Options, Parser, Tag};
use smol_str::SmolStr;

use crate::syntax;
use crate::text::TextBuffer;

/// Index of a node in its tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Classification of a syntax node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Paragraph,
    Heading { level: u8 },
    /// `#` run (or setext underline) of a heading.
    HeadingMark,
    BlockQuote,
    List { ordered: bool },
    ListItem,
    /// `[ ]` or `[x]` at the start of a list item.
    TaskMarker { checked: bool },
    CodeBlock { language: Option<SmolStr>, fenced: bool },
    /// Opening or closing fence line of a code block.
    CodeFence,
    Table { columns: usize },
    TableHead,
    /// `| --- | :-: |` row under the table head.
    TableDelimiter,
    TableRow,
    HorizontalRule,
    Emphasis,
    Strong,
    Strikethrough,
    /// Delimiter run of emphasis, strong or strikethrough.
    EmphasisMark,
    Link { autolink: bool },
    /// `[`, `](dest)`, `<` or `>` of a link.
    LinkMark,
    Image { url: SmolStr, title: SmolStr, alt: SmolStr },
    InlineCode,
    /// Backtick run of an inline code span.
    CodeMark,
    Html,
    Admonition { kind: SmolStr, title: SmolStr },
    /// `:::kind` or closing `:::` line.
    AdmonitionFence,
}

impl NodeKind {
    /// Whether text inside this node is literal (no wikilinks, no markup).
    pub fn is_code(&self) -> bool {
        matches!(
            self,
            NodeKind::CodeBlock { .. } | NodeKind::InlineCode | NodeKind::Html
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxNode {
    pub kind: NodeKind,
    /// Char range in the source document.
    pub range: Range<usize>,
    parent: Option<NodeId>,
    first_child: Option<NodeId>,
    last_child: Option<NodeId>,
    next_sibling: Option<NodeId>,
    prev_sibling: Option<NodeId>,
}

impl SyntaxNode {
    fn new(kind: NodeKind, range: Range<usize>, parent: Option<NodeId>) -> Self {
        Self {
            kind,
            range,
            parent,
            first_child: None,
            last_child: None,
            next_sibling: None,
            prev_sibling: None,
        }
    }
}

/// A parsed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxTree {
    nodes: Vec<SyntaxNode>,
    /// Char length of the document this tree was built from.
    source_len: usize,
    /// Revision of the document this tree was built from.
    revision: u64,
}

impl SyntaxTree {
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &SyntaxNode {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    pub fn range(&self, id: NodeId) -> Range<usize> {
        self.node(id).range.clone()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).first_child
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).next_sibling
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).prev_sibling
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.first_child(id), |&c| self.next_sibling(c))
    }

    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), |&p| self.parent(p))
    }

    /// Number of nodes, including the document root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn source_len(&self) -> usize {
        self.source_len
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether the tree was built from a different revision of `doc`.
    pub fn is_stale<T: TextBuffer>(&self, doc: &T) -> bool {
        self.revision != doc.revision() || self.source_len != doc.len_chars()
    }

    /// Nodes intersecting `range`, in document (pre-)order, root excluded.
    ///
    /// Touching counts as intersecting so zero-width nodes at the edges of a
    /// visible range are not lost.
    pub fn walk(&self, range: Range<usize>) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(self.root()).collect();
        stack.reverse();
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            if node.range.start > range.end || node.range.end < range.start {
                continue;
            }
            out.push(id);
            let first = stack.len();
            stack.extend(self.children(id));
            stack[first..].reverse();
        }
        out
    }

    /// Innermost node containing `offset` (the root if nothing deeper does).
    pub fn innermost_at(&self, offset: usize) -> NodeId {
        let mut current = self.root();
        'descend: loop {
            for child in self.children(current) {
                let r = &self.node(child).range;
                if r.start <= offset && offset < r.end {
                    current = child;
                    continue 'descend;
                }
            }
            return current;
        }
    }

    /// Whether `offset` sits inside literal code (inline or block) or raw HTML.
    pub fn is_code_at(&self, offset: usize) -> bool {
        let id = self.innermost_at(offset);
        std::iter::once(id)
            .chain(self.ancestors(id))
            .any(|n| self.kind(n).is_code())
    }

    /// Body of the section a heading introduces: from the end of the heading
    /// line up to the next sibling heading of the same or higher rank.
    pub fn heading_section(&self, heading: NodeId) -> Option<Range<usize>> {
        let NodeKind::Heading { level } = *self.kind(heading) else {
            return None;
        };
        let start = self.node(heading).range.end;
        let mut end = start;
        let mut sibling = self.next_sibling(heading);
        while let Some(id) = sibling {
            if let NodeKind::Heading { level: other } = *self.kind(id) {
                if other <= level {
                    break;
                }
            }
            end = end.max(self.node(id).range.end);
            sibling = self.next_sibling(id);
        }
        (end > start).then_some(start..end)
    }

    /// Parse `doc` as CommonMark with the GFM extensions the editor renders.
    pub fn parse<T: TextBuffer>(doc: &T) -> Self {
        let source = doc.to_string();
        let lowering = Lowering::new(&source, doc);
        lowering.run()
    }
}

/// Incremental construction of a [`SyntaxTree`].
///
/// `open` and `close` bracket container nodes, `leaf` appends a childless
/// node. Children must be appended in document order. Parents grow to cover
/// any child that ends past them.
#[derive(Debug)]
pub struct TreeBuilder {
    nodes: Vec<SyntaxNode>,
    stack: Vec<NodeId>,
    source_len: usize,
    revision: u64,
}

impl TreeBuilder {
    pub fn new(source_len: usize, revision: u64) -> Self {
        Self {
            nodes: vec![SyntaxNode::new(NodeKind::Document, 0..source_len, None)],
            stack: vec![NodeId(0)],
            source_len,
            revision,
        }
    }

    fn push(&mut self, kind: NodeKind, range: Range<usize>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let parent = self.stack.last().copied().unwrap_or(NodeId(0));
        let mut node = SyntaxNode::new(kind, range.clone(), Some(parent));

        match self.nodes[parent.index()].last_child {
            Some(prev) => {
                node.prev_sibling = Some(prev);
                self.nodes[prev.index()].next_sibling = Some(id);
            }
            None => self.nodes[parent.index()].first_child = Some(id),
        }
        self.nodes[parent.index()].last_child = Some(id);
        self.nodes.push(node);

        for &open in &self.stack {
            let open = &mut self.nodes[open.index()].range;
            open.end = open.end.max(range.end);
        }
        id
    }

    pub fn open(&mut self, kind: NodeKind, range: Range<usize>) -> NodeId {
        let id = self.push(kind, range);
        self.stack.push(id);
        id
    }

    pub fn leaf(&mut self, kind: NodeKind, range: Range<usize>) -> NodeId {
        self.push(kind, range)
    }

    /// Close the innermost open node. The root is never closed.
    pub fn close(&mut self) -> Option<NodeId> {
        if self.stack.len() > 1 { self.stack.pop() } else { None }
    }

    pub fn depth(&self) -> usize {
        self.stack.len() - 1
    }

    pub fn current(&self) -> NodeId {
        self.stack.last().copied().unwrap_or(NodeId(0))
    }

    pub fn kind_mut(&mut self, id: NodeId) -> Option<&mut NodeKind> {
        self.nodes.get_mut(id.index()).map(|n| &mut n.kind)
    }

    pub fn finish(self) -> SyntaxTree {
        SyntaxTree {
            nodes: self.nodes,
            source_len: self.source_len,
            revision: self.revision,
        }
    }
}

fn markdown_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_FOOTNOTES
}

/// Per-tag bookkeeping while lowering pulldown-cmark events.
#[derive(Debug, Default)]
struct Frame {
    opened: bool,
    closing: Option<(NodeKind, Range<usize>)>,
    image: Option<NodeId>,
    table_head: bool,
}

struct Lowering<'a, T: TextBuffer> {
    source: &'a str,
    doc: &'a T,
    builder: TreeBuilder,
    frames: Vec<Frame>,
    admonitions: std::vec::IntoIter<syntax::AdmonitionSpan>,
    open_admonition: Option<syntax::AdmonitionSpan>,
    table_lines: Vec<Range<usize>>,
    next_table_line: usize,
    alt: String,
}

impl<'a, T: TextBuffer> Lowering<'a, T> {
    fn new(source: &'a str, doc: &'a T) -> Self {
        Self {
            source,
            doc,
            builder: TreeBuilder::new(doc.len_chars(), doc.revision()),
            frames: Vec::new(),
            admonitions: syntax::find_admonitions(source).into_iter(),
            open_admonition: None,
            table_lines: Vec::new(),
            next_table_line: 0,
            alt: String::new(),
        }
    }

    fn chars(&self, bytes: Range<usize>) -> Range<usize> {
        self.doc.byte_to_char(bytes.start)..self.doc.byte_to_char(bytes.end)
    }

    /// Block ranges from the parser include the trailing line break.
    fn trim_block(&self, bytes: Range<usize>) -> Range<usize> {
        let text = &self.source[bytes.clone()];
        bytes.start..bytes.start + text.trim_end_matches(['\n', '\r']).len()
    }

    fn rel(&self, base: usize, rel: Range<usize>) -> Range<usize> {
        self.chars(base + rel.start..base + rel.end)
    }

    fn run(mut self) -> SyntaxTree {
        let source = self.source;
        for (event, range) in Parser::new_ext(source, markdown_options()).into_offset_iter() {
            match event {
                Event::Start(tag) => {
                    if self.frames.is_empty() {
                        self.sync_admonitions(range.start);
                    }
                    let frame = self.start(tag, range);
                    self.frames.push(frame);
                }
                Event::End(_) => self.end(),
                Event::Text(text) => {
                    if self.frames.iter().any(|f| f.image.is_some()) {
                        self.alt.push_str(&text);
                    }
                }
                Event::Code(_) => {
                    let chars = self.chars(range.clone());
                    self.builder.open(NodeKind::InlineCode, chars);
                    if let Some((open, close)) = syntax::code_span_markers(&source[range.clone()]) {
                        let open = self.rel(range.start, open);
                        let close = self.rel(range.start, close);
                        self.builder.leaf(NodeKind::CodeMark, open);
                        self.builder.leaf(NodeKind::CodeMark, close);
                    }
                    self.builder.close();
                }
                Event::Rule => {
                    if self.frames.is_empty() {
                        self.sync_admonitions(range.start);
                    }
                    let chars = self.chars(self.trim_block(range));
                    self.builder.leaf(NodeKind::HorizontalRule, chars);
                }
                _ => {}
            }
        }
        self.close_admonition();
        self.builder.finish()
    }

    /// Open or close admonition containers around top-level blocks.
    fn sync_admonitions(&mut self, block_start: usize) {
        if let Some(open) = &self.open_admonition {
            if block_start >= open.range.end {
                self.close_admonition();
            }
        }
        if self.open_admonition.is_some() {
            return;
        }
        let next = self.admonitions.as_slice().first().map(|a| a.range.start);
        if next.is_some_and(|start| start <= block_start) {
            if let Some(span) = self.admonitions.next() {
                let range = self.chars(span.range.clone());
                self.builder.open(
                    NodeKind::Admonition {
                        kind: span.kind.clone(),
                        title: span.title.clone(),
                    },
                    range,
                );
                let open_line = self.chars(span.open_line.clone());
                self.builder.leaf(NodeKind::AdmonitionFence, open_line);
                // a region nested in a list item ends before the next top-level block
                let ended = span.range.end <= block_start;
                self.open_admonition = Some(span);
                if ended {
                    self.close_admonition();
                }
            }
        }
    }

    fn close_admonition(&mut self) {
        if let Some(span) = self.open_admonition.take() {
            if let Some(close) = span.close_line {
                let close = self.chars(close);
                self.builder.leaf(NodeKind::AdmonitionFence, close);
            }
            self.builder.close();
        }
    }

    fn start(&mut self, tag: Tag<'_>, range: Range<usize>) -> Frame {
        let mut frame = Frame::default();
        match tag {
            Tag::Paragraph => {
                let chars = self.chars(self.trim_block(range));
                self.builder.open(NodeKind::Paragraph, chars);
                frame.opened = true;
            }
            Tag::Heading { level, .. } => {
                let block = self.trim_block(range);
                let chars = self.chars(block.clone());
                self.builder.open(NodeKind::Heading { level: level as u8 }, chars);
                frame.opened = true;
                let (open, close) = syntax::heading_markers(&self.source[block.clone()]);
                if let Some(open) = open {
                    let open = self.rel(block.start, open);
                    self.builder.leaf(NodeKind::HeadingMark, open);
                }
                frame.closing = close.map(|c| (NodeKind::HeadingMark, self.rel(block.start, c)));
            }
            Tag::BlockQuote(..) => {
                let chars = self.chars(self.trim_block(range));
                self.builder.open(NodeKind::BlockQuote, chars);
                frame.opened = true;
            }
            Tag::CodeBlock(kind) => {
                let block = self.trim_block(range);
                let chars = self.chars(block.clone());
                match kind {
                    CodeBlockKind::Fenced(info) => {
                        self.builder.open(
                            NodeKind::CodeBlock {
                                language: syntax::fence_language(&info),
                                fenced: true,
                            },
                            chars,
                        );
                        let (open, close) = syntax::fence_lines(&self.source[block.clone()]);
                        let open = self.rel(block.start, open);
                        self.builder.leaf(NodeKind::CodeFence, open);
                        frame.closing = close.map(|c| (NodeKind::CodeFence, self.rel(block.start, c)));
                    }
                    CodeBlockKind::Indented => {
                        self.builder.open(
                            NodeKind::CodeBlock {
                                language: None,
                                fenced: false,
                            },
                            chars,
                        );
                    }
                }
                frame.opened = true;
            }
            Tag::HtmlBlock => {
                let chars = self.chars(self.trim_block(range));
                self.builder.open(NodeKind::Html, chars);
                frame.opened = true;
            }
            Tag::List(start) => {
                let chars = self.chars(self.trim_block(range));
                self.builder.open(
                    NodeKind::List {
                        ordered: start.is_some(),
                    },
                    chars,
                );
                frame.opened = true;
            }
            Tag::Item => {
                let block = self.trim_block(range);
                let chars = self.chars(block.clone());
                self.builder.open(NodeKind::ListItem, chars);
                frame.opened = true;
                if let Some((marker, checked)) = syntax::task_marker(&self.source[block.clone()]) {
                    let marker = self.rel(block.start, marker);
                    self.builder.leaf(NodeKind::TaskMarker { checked }, marker);
                }
            }
            Tag::Table(alignments) => {
                let block = self.trim_block(range);
                self.table_lines = line_ranges(&self.source[block.clone()], block.start);
                self.next_table_line = 0;
                let chars = self.chars(block);
                self.builder.open(
                    NodeKind::Table {
                        columns: alignments.len(),
                    },
                    chars,
                );
                frame.opened = true;
            }
            Tag::TableHead | Tag::TableRow => {
                let is_head = matches!(tag, Tag::TableHead);
                if let Some(line) = self.table_lines.get(self.next_table_line).cloned() {
                    let chars = self.chars(line);
                    let kind = if is_head {
                        NodeKind::TableHead
                    } else {
                        NodeKind::TableRow
                    };
                    self.builder.open(kind, chars);
                    frame.opened = true;
                    frame.table_head = is_head;
                }
                // the delimiter row sits between the head and the first body row
                self.next_table_line += if is_head { 2 } else { 1 };
            }
            Tag::Emphasis | Tag::Strong | Tag::Strikethrough => {
                let (kind, len) = match tag {
                    Tag::Emphasis => (NodeKind::Emphasis, syntax::delimiter_len(&self.source[range.clone()], 1)),
                    Tag::Strong => (NodeKind::Strong, syntax::delimiter_len(&self.source[range.clone()], 2)),
                    _ => (NodeKind::Strikethrough, syntax::strikethrough_len(&self.source[range.clone()])),
                };
                let chars = self.chars(range.clone());
                self.builder.open(kind, chars);
                frame.opened = true;
                if len > 0 {
                    let open = self.chars(range.start..range.start + len);
                    self.builder.leaf(NodeKind::EmphasisMark, open);
                    frame.closing = Some((NodeKind::EmphasisMark, self.chars(range.end - len..range.end)));
                }
            }
            Tag::Link { link_type, .. } => {
                let autolink = matches!(link_type, LinkType::Autolink | LinkType::Email);
                let chars = self.chars(range.clone());
                self.builder.open(NodeKind::Link { autolink }, chars);
                frame.opened = true;
                if let Some((open, close)) = syntax::link_markers(&self.source[range.clone()]) {
                    let open = self.rel(range.start, open);
                    self.builder.leaf(NodeKind::LinkMark, open);
                    frame.closing = Some((NodeKind::LinkMark, self.rel(range.start, close)));
                }
            }
            Tag::Image { dest_url, title, .. } => {
                let chars = self.chars(range);
                let id = self.builder.open(
                    NodeKind::Image {
                        url: SmolStr::new(&*dest_url),
                        title: SmolStr::new(&*title),
                        alt: SmolStr::default(),
                    },
                    chars,
                );
                frame.opened = true;
                frame.image = Some(id);
                self.alt.clear();
            }
            _ => {}
        }
        frame
    }

    fn end(&mut self) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        if let Some((kind, range)) = frame.closing {
            self.builder.leaf(kind, range);
        }
        if let Some(image) = frame.image {
            let alt = SmolStr::new(std::mem::take(&mut self.alt));
            if let Some(NodeKind::Image { alt: slot, .. }) = self.builder.kind_mut(image) {
                *slot = alt;
            }
        }
        if frame.opened {
            self.builder.close();
        }
        if frame.table_head {
            if let Some(line) = self.table_lines.get(1).cloned() {
                let chars = self.chars(line);
                self.builder.leaf(NodeKind::TableDelimiter, chars);
            }
        }
    }
}

/// Absolute byte ranges of each line in `text`, excluding terminators.
fn line_ranges(text: &str, base: usize) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut offset = base;
    for line in text.split_inclusive('\n') {
        let content = line.trim_end_matches(['\n', '\r']);
        out.push(offset..offset + content.len());
        offset += line.len();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::EditorRope;

    fn parse(source: &str) -> (EditorRope, SyntaxTree) {
        let doc = EditorRope::from_str(source);
        let tree = SyntaxTree::parse(&doc);
        (doc, tree)
    }

    fn find(tree: &SyntaxTree, pred: impl Fn(&NodeKind) -> bool) -> Vec<NodeId> {
        tree.walk(0..tree.source_len())
            .into_iter()
            .filter(|&id| pred(tree.kind(id)))
            .collect()
    }

    #[test]
    fn test_heading_and_marker() {
        let (_, tree) = parse("# Heading\n\ntext");
        let headings = find(&tree, |k| matches!(k, NodeKind::Heading { level: 1 }));
        assert_eq!(headings.len(), 1);
        assert_eq!(tree.range(headings[0]), 0..9);
        let mark = tree.first_child(headings[0]).unwrap();
        assert_eq!(tree.kind(mark), &NodeKind::HeadingMark);
        assert_eq!(tree.range(mark), 0..2);
        assert_eq!(tree.parent(mark), Some(headings[0]));
    }

    #[test]
    fn test_emphasis_markers_are_children_in_order() {
        let (_, tree) = parse("a **bold** b");
        let strong = find(&tree, |k| *k == NodeKind::Strong)[0];
        assert_eq!(tree.range(strong), 2..10);
        let marks: Vec<_> = tree.children(strong).map(|c| tree.range(c)).collect();
        assert_eq!(marks, vec![2..4, 8..10]);
    }

    #[test]
    fn test_char_offsets_for_multibyte_text() {
        let (_, tree) = parse("é **b**");
        let strong = find(&tree, |k| *k == NodeKind::Strong)[0];
        assert_eq!(tree.range(strong), 2..7);
    }

    #[test]
    fn test_table_rows() {
        let source = "| A | B | C |\n| - | - | - |\n| 1 | 2 | 3 |\n| 4 | 5 | 6 |\n";
        let (_, tree) = parse(source);
        let table = find(&tree, |k| matches!(k, NodeKind::Table { columns: 3 }))[0];
        assert_eq!(tree.range(table), 0..55);
        let kinds: Vec<_> = tree.children(table).map(|c| tree.kind(c).clone()).collect();
        assert_eq!(
            kinds,
            vec![
                NodeKind::TableHead,
                NodeKind::TableDelimiter,
                NodeKind::TableRow,
                NodeKind::TableRow
            ]
        );
        let rows: Vec<_> = tree.children(table).map(|c| tree.range(c)).collect();
        assert_eq!(rows, vec![0..13, 14..27, 28..41, 42..55]);
    }

    #[test]
    fn test_fenced_code_language_and_fences() {
        let (_, tree) = parse("```mermaid\ngraph TD\n```\n");
        let code = find(&tree, |k| matches!(k, NodeKind::CodeBlock { .. }))[0];
        assert_eq!(
            tree.kind(code),
            &NodeKind::CodeBlock {
                language: Some(SmolStr::new("mermaid")),
                fenced: true
            }
        );
        let fences: Vec<_> = tree.children(code).map(|c| tree.range(c)).collect();
        assert_eq!(fences, vec![0..10, 20..23]);
        assert!(tree.is_code_at(12));
        assert!(!tree.is_code_at(30));
    }

    #[test]
    fn test_task_marker_and_image() {
        let (_, tree) = parse("- [x] done\n\n![alt text](pic.png \"t\")");
        let task = find(&tree, |k| matches!(k, NodeKind::TaskMarker { .. }))[0];
        assert_eq!(tree.kind(task), &NodeKind::TaskMarker { checked: true });
        assert_eq!(tree.range(task), 2..5);

        let image = find(&tree, |k| matches!(k, NodeKind::Image { .. }))[0];
        let NodeKind::Image { url, title, alt } = tree.kind(image) else {
            unreachable!()
        };
        assert_eq!((url.as_str(), title.as_str(), alt.as_str()), ("pic.png", "t", "alt text"));
    }

    #[test]
    fn test_admonition_contains_blocks() {
        let source = "before\n\n:::note Heads up\ninside\n:::\n\nafter";
        let (_, tree) = parse(source);
        let adm = find(&tree, |k| matches!(k, NodeKind::Admonition { .. }))[0];
        assert_eq!(tree.range(adm), 8..35);
        assert_eq!(tree.parent(adm), Some(tree.root()));
        let kinds: Vec<_> = tree.children(adm).map(|c| tree.kind(c).clone()).collect();
        assert_eq!(kinds.first(), Some(&NodeKind::AdmonitionFence));
        assert_eq!(kinds.last(), Some(&NodeKind::AdmonitionFence));
        assert!(kinds.contains(&NodeKind::Paragraph));
        // the trailing paragraph is a sibling, not a child
        let after = tree.next_sibling(adm).unwrap();
        assert_eq!(tree.kind(after), &NodeKind::Paragraph);
        assert_eq!(tree.range(after), 37..42);
    }

    #[test]
    fn test_walk_prunes_outside_range() {
        let (_, tree) = parse("# One\n\npara one\n\n# Two\n\npara two");
        let ids = tree.walk(17..25);
        assert!(ids.iter().all(|&id| {
            let r = tree.range(id);
            r.start <= 25 && r.end >= 17
        }));
        assert!(ids.iter().any(|&id| matches!(tree.kind(id), NodeKind::Heading { .. })));
    }

    #[test]
    fn test_heading_section() {
        let (_, tree) = parse("# A\n\nbody\n\n## Sub\n\nmore\n\n# B\n\ntail");
        let headings = find(&tree, |k| matches!(k, NodeKind::Heading { .. }));
        assert_eq!(tree.heading_section(headings[0]), Some(3..23));
        assert_eq!(tree.heading_section(headings[1]), Some(17..23));
        assert_eq!(tree.heading_section(headings[2]), Some(28..34));
    }

    #[test]
    fn test_staleness() {
        let (mut doc, tree) = parse("text");
        assert!(!tree.is_stale(&doc));
        doc.insert(4, "!");
        assert!(tree.is_stale(&doc));
    }
}
