//! `[[Title]]` links between notes.
//!
//! Links are found with a line-bounded regex scan (the markdown parser has no
//! notion of them), skipped inside code, resolved against a host-supplied
//! [`TitleIndex`] and decorated according to the reveal policy.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use smol_str::{SmolStr, ToSmolStr};

use crate::decoration::{Decoration, MarkStyle};
use crate::host::{EditorHost, EntryStore};
use crate::text::TextBuffer;
use crate::tree::SyntaxTree;
use crate::types::TextEdit;

static WIKILINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\[\]\n]+?)\]\]").expect("wikilink regex is valid"));

/// One `[[target#fragment|alias]]` occurrence. Ranges are char offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiLink {
    pub title: SmolStr,
    pub fragment: Option<SmolStr>,
    pub alias: Option<SmolStr>,
    /// Whole `[[...]]` span.
    pub range: Range<usize>,
    /// `title#fragment`, without brackets or alias.
    pub target_range: Range<usize>,
    pub alias_range: Option<Range<usize>>,
}

impl WikiLink {
    pub fn open_bracket(&self) -> Range<usize> {
        self.range.start..self.range.start + 2
    }

    pub fn close_bracket(&self) -> Range<usize> {
        self.range.end - 2..self.range.end
    }

    /// The text left visible when the link renders.
    pub fn display_range(&self) -> Range<usize> {
        self.alias_range.clone().unwrap_or_else(|| self.target_range.clone())
    }

    fn from_inner(inner: &str, start: usize) -> Self {
        let (target, alias) = match inner.split_once('|') {
            Some((target, alias)) => (target, Some(alias)),
            None => (inner, None),
        };
        let (title, fragment) = match target.split_once('#') {
            Some((title, fragment)) => (title, Some(fragment)),
            None => (target, None),
        };
        let inner_start = start + 2;
        let target_len = target.chars().count();
        let alias_range = alias.map(|a| {
            let alias_start = inner_start + target_len + 1;
            alias_start..alias_start + a.chars().count()
        });
        let inner_len = inner.chars().count();
        Self {
            title: title.trim().to_smolstr(),
            fragment: fragment.map(|f| f.trim().to_smolstr()),
            alias: alias.map(|a| a.trim().to_smolstr()),
            range: start..inner_start + inner_len + 2,
            target_range: inner_start..inner_start + target_len,
            alias_range,
        }
    }
}

/// Normalized note title -> note id.
pub trait TitleIndex {
    fn lookup(&self, normalized: &str) -> Option<SmolStr>;
}

/// Unit type implementation - nothing resolves.
impl TitleIndex for () {
    fn lookup(&self, _normalized: &str) -> Option<SmolStr> {
        None
    }
}

impl<T: TitleIndex> TitleIndex for &T {
    fn lookup(&self, normalized: &str) -> Option<SmolStr> {
        (*self).lookup(normalized)
    }
}

impl<T: TitleIndex> TitleIndex for Option<T> {
    fn lookup(&self, normalized: &str) -> Option<SmolStr> {
        self.as_ref().and_then(|i| i.lookup(normalized))
    }
}

/// In-memory title index, refreshed from `(title, id)` pairs.
#[derive(Debug, Clone, Default)]
pub struct TitleMap {
    entries: HashMap<SmolStr, SmolStr>,
}

impl TitleMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, title: &str, id: impl Into<SmolStr>) {
        self.entries.insert(normalize_title(title), id.into());
    }

    /// Replace all entries.
    pub fn refresh<I, T, D>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (T, D)>,
        T: AsRef<str>,
        D: Into<SmolStr>,
    {
        self.entries.clear();
        for (title, id) in pairs {
            self.insert(title.as_ref(), id);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TitleIndex for TitleMap {
    fn lookup(&self, normalized: &str) -> Option<SmolStr> {
        self.entries.get(normalized).cloned()
    }
}

impl<T: AsRef<str>, D: Into<SmolStr>> FromIterator<(T, D)> for TitleMap {
    fn from_iter<I: IntoIterator<Item = (T, D)>>(iter: I) -> Self {
        let mut map = TitleMap::new();
        map.refresh(iter);
        map
    }
}

/// Lowercased title without surrounding whitespace, alias, fragment or `.md`.
pub fn normalize_title(title: &str) -> SmolStr {
    let target = title.split('|').next().unwrap_or(title);
    let target = target.split('#').next().unwrap_or(target).trim();
    let lower = target.to_lowercase();
    let stripped = lower.strip_suffix(".md").unwrap_or(&lower).trim_end();
    SmolStr::new(stripped)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(SmolStr),
    Unresolved,
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }
}

pub fn resolve<I: TitleIndex>(title: &str, index: &I) -> Resolution {
    match index.lookup(&normalize_title(title)) {
        Some(id) => Resolution::Resolved(id),
        None => Resolution::Unresolved,
    }
}

/// Links whose opening bracket lies in `range`, widened to whole lines.
pub fn scan<T: TextBuffer>(doc: &T, tree: &SyntaxTree, range: Range<usize>) -> Vec<WikiLink> {
    let len = doc.len_chars();
    let first = doc.char_to_line(range.start.min(len));
    let last = doc.char_to_line(range.end.min(len));
    let start = doc.line_to_char(first);
    let end = doc.line_range(last).end;
    let Some(text) = doc.slice(start..end) else {
        return Vec::new();
    };

    let mut links = Vec::new();
    // char offset of the previous match, for incremental byte->char counting
    let mut cursor = (0usize, start);
    for caps in WIKILINK.captures_iter(&text) {
        let Some(whole) = caps.get(0) else { continue };
        let Some(inner) = caps.get(1) else { continue };
        let from = cursor.1 + text[cursor.0..whole.start()].chars().count();
        cursor = (whole.start(), from);
        if tree.is_code_at(from) {
            continue;
        }
        links.push(WikiLink::from_inner(inner.as_str(), from));
    }
    links
}

/// Decorations for one link.
///
/// Revealed links show their brackets under a single mark; rendered links
/// hide the brackets (and the target, when an alias is shown) and mark the
/// visible text.
pub fn decorate(link: &WikiLink, resolved: bool, revealed: bool, active: bool, out: &mut Vec<Decoration>) {
    let style = MarkStyle::WikiLink { resolved, active };
    if revealed {
        out.push(Decoration::mark(link.range.clone(), style));
        return;
    }
    out.push(Decoration::hide(link.open_bracket()));
    if let Some(alias) = &link.alias_range {
        out.push(Decoration::hide(link.target_range.start..alias.start));
    }
    out.push(Decoration::mark(link.display_range(), style));
    out.push(Decoration::hide(link.close_bracket()));
}

/// Route a click on `link` to the host.
pub fn click<I: TitleIndex, H: EditorHost>(link: &WikiLink, index: &I, host: &mut H) -> Resolution {
    let resolution = resolve(&link.title, index);
    match resolution {
        Resolution::Resolved(_) => host.request_open(&link.title),
        Resolution::Unresolved => host.request_create(&link.title),
    }
    resolution
}

/// Closing brackets to insert after the user typed `[` at `offset - 1`.
pub fn auto_pair<T: TextBuffer>(doc: &T, offset: usize) -> Option<TextEdit> {
    if offset < 2 || doc.char_at(offset - 1) != Some('[') || doc.char_at(offset - 2) != Some('[') {
        return None;
    }
    // a third bracket or an already-closed pair is left alone
    if offset >= 3 && doc.char_at(offset - 3) == Some('[') {
        return None;
    }
    if doc.char_at(offset) == Some(']') {
        return None;
    }
    Some(TextEdit::insert(offset, "]]"))
}

/// Hover card contents for a resolved link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPreview {
    pub id: SmolStr,
    pub title: SmolStr,
    pub excerpt: String,
}

pub fn preview<I: TitleIndex, S: EntryStore>(
    link: &WikiLink,
    index: &I,
    store: &S,
    max_chars: usize,
) -> Option<EntryPreview> {
    let entry = match resolve(&link.title, index) {
        Resolution::Resolved(id) => store.get_entry_by_id(&id),
        Resolution::Unresolved => store.find_entry_by_title(&link.title),
    }?;
    let excerpt = match &link.fragment {
        Some(fragment) => section_text(&entry.body, fragment),
        None => entry.body.as_str(),
    };
    Some(EntryPreview {
        id: entry.id.clone(),
        title: entry.title.clone(),
        excerpt: excerpt.chars().take(max_chars).collect(),
    })
}

/// Body text under the heading named `fragment`, or the whole body.
fn section_text<'a>(body: &'a str, fragment: &str) -> &'a str {
    let mut offset = 0;
    for line in body.split_inclusive('\n') {
        let trimmed = line.trim_start_matches('#');
        if trimmed.len() != line.len() && trimmed.trim().eq_ignore_ascii_case(fragment) {
            return body[offset + line.len()..].trim_start();
        }
        offset += line.len();
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Entry, HostEvent};
    use crate::text::EditorRope;

    fn index() -> TitleMap {
        [("Todo List", "id-1"), ("Projects/Garden", "id-2")].into_iter().collect()
    }

    fn links(source: &str) -> Vec<WikiLink> {
        let doc = EditorRope::from_str(source);
        let tree = SyntaxTree::parse(&doc);
        scan(&doc, &tree, 0..doc.len_chars())
    }

    #[test]
    fn test_resolution() {
        let index = index();
        assert_eq!(resolve("Todo List", &index), Resolution::Resolved("id-1".into()));
        assert_eq!(resolve("todo list.md", &index), Resolution::Resolved("id-1".into()));
        assert_eq!(resolve("  TODO LIST#Groceries", &index), Resolution::Resolved("id-1".into()));
        assert_eq!(resolve("missing", &index), Resolution::Unresolved);
        assert_eq!(resolve("Todo List", &()), Resolution::Unresolved);
    }

    #[test]
    fn test_scan_plain_link() {
        let found = links("Some text [[Todo List]] more text");
        assert_eq!(found.len(), 1);
        let link = &found[0];
        assert_eq!(link.title, "Todo List");
        assert_eq!(link.range, 10..23);
        assert_eq!(link.open_bracket(), 10..12);
        assert_eq!(link.close_bracket(), 21..23);
        assert_eq!(link.display_range(), 12..21);
    }

    #[test]
    fn test_scan_alias_and_fragment() {
        let found = links("ünï [[Garden#Beds|my beds]]");
        let link = &found[0];
        assert_eq!(link.title, "Garden");
        assert_eq!(link.fragment.as_deref(), Some("Beds"));
        assert_eq!(link.alias.as_deref(), Some("my beds"));
        assert_eq!(link.range, 4..27);
        assert_eq!(link.target_range, 6..17);
        assert_eq!(link.alias_range, Some(18..25));
    }

    #[test]
    fn test_scan_skips_code() {
        let found = links("`[[not a link]]` and\n\n```\n[[nor this]]\n```\n\n[[but this]]");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "but this");
    }

    #[test]
    fn test_decorate_rendered_with_alias() {
        let link = &links("[[Garden|beds]]")[0];
        let mut out = Vec::new();
        decorate(link, false, false, false, &mut out);
        let ranges: Vec<_> = out.iter().map(Decoration::range).collect();
        assert_eq!(ranges, vec![0..2, 2..9, 9..13, 13..15]);
    }

    #[test]
    fn test_click_routes_to_host() {
        let index = index();
        let mut host: Vec<HostEvent> = Vec::new();
        let found = links("[[todo list]] and [[Nowhere]]");
        click(&found[0], &index, &mut host);
        click(&found[1], &index, &mut host);
        assert_eq!(
            host,
            vec![
                HostEvent::Open("todo list".into()),
                HostEvent::Create("Nowhere".into())
            ]
        );
    }

    #[test]
    fn test_auto_pair() {
        let doc = EditorRope::from_str("see [[");
        assert_eq!(auto_pair(&doc, 6), Some(TextEdit::insert(6, "]]")));
        assert_eq!(auto_pair(&doc, 5), None);

        let closed = EditorRope::from_str("[[]]");
        assert_eq!(auto_pair(&closed, 2), None);
    }

    struct Notes;

    impl EntryStore for Notes {
        fn get_entry_by_id(&self, id: &str) -> Option<Entry> {
            (id == "id-1").then(|| Entry {
                id: "id-1".into(),
                title: "Todo List".into(),
                body: "intro\n## Groceries\nmilk\neggs\n".into(),
            })
        }

        fn find_entry_by_title(&self, _title: &str) -> Option<Entry> {
            None
        }
    }

    #[test]
    fn test_preview_follows_fragment() {
        let index = index();
        let link = &links("[[Todo List#groceries]]")[0];
        let card = preview(link, &index, &Notes, 8).unwrap();
        assert_eq!(card.title, "Todo List");
        assert_eq!(card.excerpt, "milk\negg");

        let missing = &links("[[Elsewhere]]")[0];
        assert_eq!(preview(missing, &index, &Notes, 8), None);
    }
}
