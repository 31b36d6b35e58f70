//! The driver hosts talk to.
//!
//! [`DecorationEngine`] owns an [`EditorContext`], the current decoration
//! set and the widget arena. Each refresh runs build, compares against the
//! previous set and reconciles widgets. Anything that would change the
//! document goes out through the host's [`EditorHost::apply_edit`]; the host
//! applies it, reparses, and calls back in with [`DecorationEngine::note_edit`]
//! and [`DecorationEngine::on_selection_or_doc_change`].

use std::ops::Range;

use crate::builder;
use crate::config::EngineConfig;
use crate::context::EditorContext;
use crate::decoration::{DecorationSet, FinishStats};
use crate::diagram::{RenderOutcome, ThemeVariant};
use crate::error::Result;
use crate::host::{EditorHost, EntryStore, ImageResolver};
use crate::mode::Mode;
use crate::registry::{Activation, EditSession, MountContext, ReconcileReport, WidgetArena};
use crate::table::TableModel;
use crate::text::TextBuffer;
use crate::tree::SyntaxTree;
use crate::types::{Selection, TextEdit};
use crate::widget::WidgetHandle;
use crate::wikilink::{self, EntryPreview, Resolution, TitleIndex, WikiLink};

/// Result of one [`DecorationEngine::refresh`].
#[derive(Debug)]
pub struct Refresh {
    /// Whether the decoration set differs from the previous one.
    pub changed: bool,
    pub stats: FinishStats,
    pub widgets: ReconcileReport,
}

#[derive(Debug)]
pub struct DecorationEngine {
    ctx: EditorContext,
    decorations: DecorationSet,
    widgets: WidgetArena,
    stale: bool,
}

impl Default for DecorationEngine {
    fn default() -> Self {
        Self::with_context(EditorContext::default())
    }
}

impl DecorationEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_context(EditorContext::new(config))
    }

    pub fn with_context(ctx: EditorContext) -> Self {
        Self {
            ctx,
            decorations: DecorationSet::empty(),
            widgets: WidgetArena::new(),
            stale: true,
        }
    }

    pub fn context(&self) -> &EditorContext {
        &self.ctx
    }

    pub fn mode(&self) -> Mode {
        self.ctx.mode.mode()
    }

    pub fn decorations(&self) -> &DecorationSet {
        &self.decorations
    }

    pub fn widgets(&self) -> &WidgetArena {
        &self.widgets
    }

    /// Whether something changed since the last refresh that the current
    /// decorations do not reflect.
    pub fn needs_refresh(&self) -> bool {
        self.stale
    }

    /// Switch modes. Always forces a full recompute and notifies the host,
    /// even when the mode is unchanged.
    pub fn set_mode<H: EditorHost>(&mut self, mode: Mode, host: &mut H) {
        let changed = self.ctx.mode.set_mode(mode);
        tracing::debug!(target: "marginalia::build", mode = mode.as_str(), changed, "set mode");
        self.stale = true;
        host.mode_changed(mode);
    }

    /// [`set_mode`](Self::set_mode) from a user-supplied string.
    pub fn set_mode_str<H: EditorHost>(&mut self, mode: &str, host: &mut H) -> Result<()> {
        let mode = mode.parse::<Mode>()?;
        self.set_mode(mode, host);
        Ok(())
    }

    pub fn set_theme(&mut self, theme: ThemeVariant) {
        if self.ctx.theme != theme {
            self.ctx.theme = theme;
            self.stale = true;
        }
    }

    /// Recompute the active lines. Returns whether the decorations need a
    /// refresh as a result.
    pub fn on_selection_or_doc_change<T: TextBuffer>(
        &mut self,
        selections: &[Selection],
        doc: &T,
    ) -> bool {
        let before = self.ctx.mode.active_lines().clone();
        self.ctx.mode.on_selection_or_doc_change(selections, doc);
        // active lines only matter in live preview
        if self.mode() == Mode::LivePreview && *self.ctx.mode.active_lines() != before {
            self.stale = true;
        }
        self.stale
    }

    /// Record an edit the host applied.
    pub fn note_edit(&mut self, edit: &TextEdit) {
        self.ctx.map_edit(edit);
        self.stale = true;
    }

    /// Rebuild decorations for `visible` and reconcile widgets. The returned
    /// render tasks must be driven by the host and their outcomes passed to
    /// [`complete_diagram`](Self::complete_diagram).
    pub fn refresh<T: TextBuffer, I: TitleIndex, R: ImageResolver>(
        &mut self,
        doc: &T,
        tree: &SyntaxTree,
        visible: &[Range<usize>],
        index: &I,
        images: &R,
    ) -> Refresh {
        let (set, stats) = builder::build(doc, tree, &self.ctx, index, visible);
        let changed = set != self.decorations;
        let specs: Vec<_> = set.widgets().cloned().collect();
        let cx = MountContext {
            diagrams: &self.ctx.diagrams,
            debounce: self.ctx.config.diagram_debounce(),
            images,
        };
        let widgets = self.widgets.reconcile(&specs, &cx);
        self.decorations = set;
        self.stale = false;
        Refresh {
            changed,
            stats,
            widgets,
        }
    }

    /// Handle a click or key activation on a widget.
    ///
    /// Checkbox toggles go to the host as edits, fold toggles update the
    /// context, and tables and diagrams return the raw-source session to show.
    pub fn activate<T: TextBuffer, H: EditorHost>(
        &mut self,
        handle: WidgetHandle,
        doc: &T,
        host: &mut H,
    ) -> Result<Option<EditSession>> {
        match self.widgets.activate(handle, doc)? {
            Activation::Edit(edit) => {
                host.apply_edit(edit);
                Ok(None)
            }
            Activation::ToggleFold(start) => {
                let folded = self.ctx.toggle_fold(start);
                tracing::debug!(target: "marginalia::widgets", start, folded, "toggled fold");
                self.stale = true;
                Ok(None)
            }
            Activation::OpenEditor(session) => Ok(Some(session)),
            Activation::Nothing => Ok(None),
        }
    }

    /// Write back a raw-source edit session.
    pub fn commit_edit<T: TextBuffer, H: EditorHost>(
        &self,
        session: &EditSession,
        raw: &str,
        doc: &T,
        host: &mut H,
    ) -> Result<()> {
        let edit = self.widgets.commit_edit(session, raw, doc)?;
        host.apply_edit(edit);
        Ok(())
    }

    /// Write back a structured table edit.
    pub fn commit_table<T: TextBuffer, H: EditorHost>(
        &self,
        session: &EditSession,
        model: &TableModel,
        doc: &T,
        host: &mut H,
    ) -> Result<()> {
        let edit = self.widgets.commit_table(session, model, doc)?;
        host.apply_edit(edit);
        Ok(())
    }

    /// Route a finished diagram render. Returns whether a widget changed.
    pub fn complete_diagram(&mut self, outcome: RenderOutcome) -> bool {
        self.widgets.complete_diagram(outcome, &self.ctx.diagrams)
    }

    /// The wikilink under `offset`, if any.
    pub fn wikilink_at<T: TextBuffer>(
        &self,
        doc: &T,
        tree: &SyntaxTree,
        offset: usize,
    ) -> Option<WikiLink> {
        wikilink::scan(doc, tree, offset..offset)
            .into_iter()
            .find(|link| link.range.start <= offset && offset < link.range.end)
    }

    /// Follow the wikilink under `offset` through the host.
    pub fn click_wikilink<T: TextBuffer, I: TitleIndex, H: EditorHost>(
        &self,
        doc: &T,
        tree: &SyntaxTree,
        offset: usize,
        index: &I,
        host: &mut H,
    ) -> Option<Resolution> {
        let link = self.wikilink_at(doc, tree, offset)?;
        Some(wikilink::click(&link, index, host))
    }

    /// Hover card for the wikilink under `offset`.
    pub fn preview<T: TextBuffer, I: TitleIndex, S: EntryStore>(
        &self,
        doc: &T,
        tree: &SyntaxTree,
        offset: usize,
        index: &I,
        store: &S,
    ) -> Option<EntryPreview> {
        let link = self.wikilink_at(doc, tree, offset)?;
        wikilink::preview(&link, index, store, self.ctx.config.preview_chars)
    }

    /// Called after the host inserted typed text ending at `offset`. Returns
    /// whether an auto-pair edit was sent.
    pub fn on_text_input<T: TextBuffer, H: EditorHost>(
        &self,
        doc: &T,
        offset: usize,
        host: &mut H,
    ) -> bool {
        match wikilink::auto_pair(doc, offset) {
            Some(edit) => {
                host.apply_edit(edit);
                true
            }
            None => false,
        }
    }
}
