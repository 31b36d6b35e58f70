//! Widget variants and their reuse contract.
//!
//! A widget is plain data: its kind, its properties, and (in a
//! [`WidgetSpec`]) the source range and mode it was built for. Behaviour that
//! differs per kind (whether two property sets are interchangeable, whether a
//! mounted instance can be patched in place) is looked up in a static table
//! indexed by [`WidgetKind`] rather than dispatched through trait objects.

use std::fmt;
use std::ops::Range;

use smol_str::SmolStr;

use crate::diagram::{DiagramKey, ThemeVariant};
use crate::mode::Mode;
use crate::table::TableModel;

/// Stable identity of a mounted widget instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WidgetHandle(u32);

impl WidgetHandle {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for WidgetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WidgetKind {
    HeadingFold = 0,
    Checkbox = 1,
    Table = 2,
    Image = 3,
    HorizontalRule = 4,
    Diagram = 5,
    Admonition = 6,
    CodeBlockHeader = 7,
}

impl WidgetKind {
    pub const ALL: [WidgetKind; 8] = [
        WidgetKind::HeadingFold,
        WidgetKind::Checkbox,
        WidgetKind::Table,
        WidgetKind::Image,
        WidgetKind::HorizontalRule,
        WidgetKind::Diagram,
        WidgetKind::Admonition,
        WidgetKind::CodeBlockHeader,
    ];

    pub fn as_str(self) -> &'static str {
        BEHAVIOURS[self as usize].name
    }
}

/// A widget's kind and constructor properties.
#[derive(Debug, Clone, PartialEq)]
pub enum Widget {
    HeadingFold { level: u8, folded: bool },
    Checkbox { checked: bool },
    Table { model: TableModel },
    /// `url` is the raw markdown destination; hosts resolve it at mount time.
    Image { url: SmolStr, alt: SmolStr, title: SmolStr },
    HorizontalRule,
    Diagram {
        language: SmolStr,
        source: SmolStr,
        theme: ThemeVariant,
    },
    Admonition { kind: SmolStr, title: SmolStr, body: SmolStr },
    CodeBlockHeader { language: Option<SmolStr>, line_count: usize },
}

impl Widget {
    pub fn kind(&self) -> WidgetKind {
        match self {
            Widget::HeadingFold { .. } => WidgetKind::HeadingFold,
            Widget::Checkbox { .. } => WidgetKind::Checkbox,
            Widget::Table { .. } => WidgetKind::Table,
            Widget::Image { .. } => WidgetKind::Image,
            Widget::HorizontalRule => WidgetKind::HorizontalRule,
            Widget::Diagram { .. } => WidgetKind::Diagram,
            Widget::Admonition { .. } => WidgetKind::Admonition,
            Widget::CodeBlockHeader { .. } => WidgetKind::CodeBlockHeader,
        }
    }

    /// Whether the widget replaces whole lines rather than sitting inline.
    pub fn is_block(&self) -> bool {
        BEHAVIOURS[self.kind() as usize].block
    }

    /// Whether the widget offers a raw-source edit affordance.
    pub fn is_editable(&self) -> bool {
        matches!(self, Widget::Table { .. } | Widget::Diagram { .. })
    }

    pub fn diagram_key(&self) -> Option<DiagramKey> {
        match self {
            Widget::Diagram { source, theme, .. } => Some(DiagramKey::new(source.clone(), *theme)),
            _ => None,
        }
    }

    /// Whether `other` can be shown by an instance built for `self` unchanged.
    pub fn same_props(&self, other: &Widget) -> bool {
        self.kind() == other.kind() && (BEHAVIOURS[self.kind() as usize].same_props)(self, other)
    }

    /// Whether an instance built for `self` can be patched to show `other`.
    /// `false` means unmount and remount.
    pub fn can_patch(&self, other: &Widget) -> bool {
        self.kind() == other.kind() && (BEHAVIOURS[self.kind() as usize].can_patch)(self, other)
    }
}

/// Per-kind behaviour row.
struct Behaviour {
    name: &'static str,
    block: bool,
    same_props: fn(&Widget, &Widget) -> bool,
    can_patch: fn(&Widget, &Widget) -> bool,
}

fn eq_props(a: &Widget, b: &Widget) -> bool {
    a == b
}

fn always(_: &Widget, _: &Widget) -> bool {
    true
}

fn image_patch(a: &Widget, b: &Widget) -> bool {
    match (a, b) {
        (Widget::Image { url: old, .. }, Widget::Image { url: new, .. }) => old == new,
        _ => false,
    }
}

fn admonition_patch(a: &Widget, b: &Widget) -> bool {
    match (a, b) {
        (Widget::Admonition { kind: old, .. }, Widget::Admonition { kind: new, .. }) => old == new,
        _ => false,
    }
}

static BEHAVIOURS: [Behaviour; 8] = [
    Behaviour {
        name: "heading-fold",
        block: false,
        same_props: eq_props,
        can_patch: always,
    },
    Behaviour {
        name: "checkbox",
        block: false,
        same_props: eq_props,
        can_patch: always,
    },
    Behaviour {
        name: "table",
        block: true,
        same_props: eq_props,
        can_patch: always,
    },
    Behaviour {
        name: "image",
        block: true,
        same_props: eq_props,
        can_patch: image_patch,
    },
    Behaviour {
        name: "horizontal-rule",
        block: true,
        same_props: always,
        can_patch: always,
    },
    // a diagram patch re-keys its render slot, keeping the height lock
    Behaviour {
        name: "diagram",
        block: true,
        same_props: eq_props,
        can_patch: always,
    },
    Behaviour {
        name: "admonition",
        block: true,
        same_props: eq_props,
        can_patch: admonition_patch,
    },
    Behaviour {
        name: "code-block-header",
        block: false,
        same_props: eq_props,
        can_patch: always,
    },
];

/// A widget as placed by one decoration pass.
///
/// Two specs are equal when kind, source range, mode and properties all
/// match; an equal spec never touches the mounted instance.
#[derive(Debug, Clone)]
pub struct WidgetSpec {
    pub widget: Widget,
    pub source_range: Range<usize>,
    pub mode: Mode,
}

impl WidgetSpec {
    pub fn new(widget: Widget, source_range: Range<usize>, mode: Mode) -> Self {
        Self {
            widget,
            source_range,
            mode,
        }
    }

    pub fn kind(&self) -> WidgetKind {
        self.widget.kind()
    }

    pub fn is_block(&self) -> bool {
        self.widget.is_block()
    }
}

impl PartialEq for WidgetSpec {
    fn eq(&self, other: &Self) -> bool {
        self.source_range == other.source_range
            && self.mode == other.mode
            && self.widget.same_props(&other.widget)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(url: &str, alt: &str) -> Widget {
        Widget::Image {
            url: url.into(),
            alt: alt.into(),
            title: SmolStr::default(),
        }
    }

    #[test]
    fn test_behaviour_table_matches_kinds() {
        for kind in WidgetKind::ALL {
            assert_eq!(BEHAVIOURS[kind as usize].name, kind.as_str());
        }
        assert_eq!(WidgetKind::Diagram.as_str(), "diagram");
    }

    #[test]
    fn test_spec_equality_covers_identity_fields() {
        let a = WidgetSpec::new(Widget::Checkbox { checked: false }, 2..5, Mode::Reading);
        assert_eq!(a, a.clone());

        let moved = WidgetSpec::new(Widget::Checkbox { checked: false }, 3..6, Mode::Reading);
        let other_mode = WidgetSpec::new(Widget::Checkbox { checked: false }, 2..5, Mode::LivePreview);
        let other_props = WidgetSpec::new(Widget::Checkbox { checked: true }, 2..5, Mode::Reading);
        assert_ne!(a, moved);
        assert_ne!(a, other_mode);
        assert_ne!(a, other_props);
    }

    #[test]
    fn test_image_url_change_needs_remount() {
        let old = image("a.png", "alt");
        assert!(old.can_patch(&image("a.png", "new alt")));
        assert!(!old.can_patch(&image("b.png", "alt")));
        assert!(!old.can_patch(&Widget::HorizontalRule));
    }

    #[test]
    fn test_block_flags() {
        assert!(Widget::HorizontalRule.is_block());
        assert!(!Widget::Checkbox { checked: true }.is_block());
        assert!(
            !Widget::HeadingFold {
                level: 1,
                folded: false
            }
            .is_block()
        );
        assert!(
            Widget::Diagram {
                language: "mermaid".into(),
                source: "A".into(),
                theme: ThemeVariant::Dark,
            }
            .is_editable()
        );
    }
}
