//! Mounted widget instances and their reconciliation against a new pass.
//!
//! The arena is keyed by [`WidgetHandle`] and indexed by source range. After
//! every decoration pass [`WidgetArena::reconcile`] walks the new widget specs
//! and, for each, either keeps the existing instance (equal spec), patches it
//! in place, or mounts a fresh one. Instances nobody claimed are unmounted.

use std::collections::{BTreeMap, HashSet};
use std::ops::Range;

use n0_future::time::Duration;
use smol_str::SmolStr;

use crate::diagram::{DiagramCache, DiagramSlot, DiagramState, RenderOutcome, RenderTask};
use crate::error::{EngineError, Result};
use crate::host::ImageResolver;
use crate::table::TableModel;
use crate::text::TextBuffer;
use crate::types::TextEdit;
use crate::widget::{Widget, WidgetHandle, WidgetSpec};

/// A live widget instance.
#[derive(Debug)]
pub struct MountedWidget {
    handle: WidgetHandle,
    spec: WidgetSpec,
    image_src: Option<String>,
    diagram: Option<DiagramSlot>,
}

impl MountedWidget {
    pub fn handle(&self) -> WidgetHandle {
        self.handle
    }

    pub fn spec(&self) -> &WidgetSpec {
        &self.spec
    }

    pub fn widget(&self) -> &Widget {
        &self.spec.widget
    }

    pub fn source_range(&self) -> Range<usize> {
        self.spec.source_range.clone()
    }

    /// Displayable image URL, resolved through the host at mount time.
    pub fn image_src(&self) -> Option<&str> {
        self.image_src.as_deref()
    }

    pub fn diagram_state(&self) -> Option<&DiagramState> {
        self.diagram.as_ref().map(DiagramSlot::state)
    }
}

/// Shared inputs for mounting and patching.
pub struct MountContext<'a, R: ImageResolver> {
    pub diagrams: &'a DiagramCache,
    pub debounce: Duration,
    pub images: &'a R,
}

/// What one reconciliation did.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Kept as-is.
    pub reused: usize,
    /// Patched in place, including instances that followed a moved range.
    pub updated: usize,
    pub mounted: Vec<WidgetHandle>,
    pub unmounted: Vec<WidgetHandle>,
    /// Diagram renders the host has to drive.
    pub tasks: Vec<RenderTask>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.updated == 0 && self.mounted.is_empty() && self.unmounted.is_empty()
    }
}

/// What activating a widget asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// Apply this edit through the host.
    Edit(TextEdit),
    /// Flip the fold state of the heading starting at this offset.
    ToggleFold(usize),
    /// Show the raw-source editor for a table or diagram.
    OpenEditor(EditSession),
    Nothing,
}

/// An open raw-source edit of a table or diagram widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    pub handle: WidgetHandle,
    pub range: Range<usize>,
    /// Source text when the session was opened.
    pub original: SmolStr,
}

#[derive(Debug, Default)]
pub struct WidgetArena {
    widgets: BTreeMap<WidgetHandle, MountedWidget>,
    by_range: BTreeMap<(usize, usize), Vec<WidgetHandle>>,
    next_handle: u32,
}

impl WidgetArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    pub fn get(&self, handle: WidgetHandle) -> Option<&MountedWidget> {
        self.widgets.get(&handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MountedWidget> {
        self.widgets.values()
    }

    /// Widgets whose source range is exactly `range`.
    pub fn at_range(&self, range: Range<usize>) -> impl Iterator<Item = &MountedWidget> {
        self.by_range
            .get(&(range.start, range.end))
            .into_iter()
            .flatten()
            .filter_map(|h| self.widgets.get(h))
    }

    /// The widget covering `offset`, preferring the narrowest.
    pub fn at_offset(&self, offset: usize) -> Option<&MountedWidget> {
        self.by_range
            .range(..=(offset, usize::MAX))
            .rev()
            .flat_map(|(_, handles)| handles.iter())
            .filter_map(|h| self.widgets.get(h))
            .filter(|w| {
                let r = &w.spec.source_range;
                r.start <= offset && (offset < r.end || (r.is_empty() && offset == r.start))
            })
            .min_by_key(|w| w.spec.source_range.len())
    }

    /// Match `specs` against the mounted instances.
    pub fn reconcile<R: ImageResolver>(
        &mut self,
        specs: &[WidgetSpec],
        cx: &MountContext<'_, R>,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut claimed: HashSet<WidgetHandle> = HashSet::new();
        let mut pending: Vec<&WidgetSpec> = Vec::new();

        // exact range, same kind
        for spec in specs {
            let found = self
                .by_range
                .get(&(spec.source_range.start, spec.source_range.end))
                .and_then(|handles| {
                    handles.iter().copied().find(|h| {
                        !claimed.contains(h)
                            && self.widgets.get(h).is_some_and(|w| w.spec.kind() == spec.kind())
                    })
                });
            match found {
                Some(handle) => {
                    claimed.insert(handle);
                    self.apply(handle, spec, cx, &mut report);
                }
                None => pending.push(spec),
            }
        }

        // moved ranges: the nearest unclaimed instance with identical
        // properties follows
        let mut fresh = Vec::new();
        for spec in pending {
            let drifted = self
                .widgets
                .values()
                .filter(|w| {
                    !claimed.contains(&w.handle)
                        && w.spec.mode == spec.mode
                        && w.spec.widget.same_props(&spec.widget)
                })
                .min_by_key(|w| w.spec.source_range.start.abs_diff(spec.source_range.start))
                .map(|w| w.handle);
            match drifted {
                Some(handle) => {
                    claimed.insert(handle);
                    if let Some(w) = self.widgets.get_mut(&handle) {
                        tracing::trace!(
                            target: "marginalia::widgets",
                            %handle,
                            from = ?w.spec.source_range,
                            to = ?spec.source_range,
                            "widget followed its source"
                        );
                        w.spec.source_range = spec.source_range.clone();
                    }
                    report.updated += 1;
                }
                None => fresh.push(spec),
            }
        }

        let stale: Vec<WidgetHandle> = self
            .widgets
            .keys()
            .copied()
            .filter(|h| !claimed.contains(h))
            .collect();
        for handle in stale {
            self.unmount(handle);
            report.unmounted.push(handle);
        }
        for spec in fresh {
            let handle = self.mount(spec, cx, &mut report.tasks);
            report.mounted.push(handle);
        }

        self.reindex();
        if !report.is_noop() {
            tracing::debug!(
                target: "marginalia::widgets",
                reused = report.reused,
                updated = report.updated,
                mounted = report.mounted.len(),
                unmounted = report.unmounted.len(),
                renders = report.tasks.len(),
                "reconciled widgets"
            );
        }
        report
    }

    /// Reuse, patch or replace the instance at `handle` for `spec`.
    fn apply<R: ImageResolver>(
        &mut self,
        handle: WidgetHandle,
        spec: &WidgetSpec,
        cx: &MountContext<'_, R>,
        report: &mut ReconcileReport,
    ) {
        let Some(w) = self.widgets.get_mut(&handle) else {
            return;
        };
        if w.spec == *spec {
            report.reused += 1;
            return;
        }
        if !w.spec.widget.can_patch(&spec.widget) {
            // keep the handle, rebuild the instance
            tracing::trace!(target: "marginalia::widgets", %handle, "remounting widget");
            if let Some(slot) = &w.diagram {
                slot.cancel();
            }
            let rebuilt = Self::build(handle, spec, cx, &mut report.tasks);
            *w = rebuilt;
            report.updated += 1;
            return;
        }

        if let (Some(slot), Some(key)) = (w.diagram.as_mut(), spec.widget.diagram_key()) {
            if let Some(task) = slot.rekey(key, cx.diagrams, cx.debounce, handle) {
                report.tasks.push(task);
            }
        }
        if let Widget::Image { url, .. } = &spec.widget {
            w.image_src = Some(resolve_image(cx.images, url));
        }
        w.spec = spec.clone();
        report.updated += 1;
    }

    fn build<R: ImageResolver>(
        handle: WidgetHandle,
        spec: &WidgetSpec,
        cx: &MountContext<'_, R>,
        tasks: &mut Vec<RenderTask>,
    ) -> MountedWidget {
        let image_src = match &spec.widget {
            Widget::Image { url, .. } => Some(resolve_image(cx.images, url)),
            _ => None,
        };
        let diagram = spec.widget.diagram_key().map(|key| {
            let mut slot = DiagramSlot::new(key);
            if let Some(task) = slot.begin(cx.diagrams, cx.debounce, handle) {
                tasks.push(task);
            }
            slot
        });
        MountedWidget {
            handle,
            spec: spec.clone(),
            image_src,
            diagram,
        }
    }

    fn mount<R: ImageResolver>(
        &mut self,
        spec: &WidgetSpec,
        cx: &MountContext<'_, R>,
        tasks: &mut Vec<RenderTask>,
    ) -> WidgetHandle {
        let handle = WidgetHandle::from_raw(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);
        let widget = Self::build(handle, spec, cx, tasks);
        tracing::trace!(
            target: "marginalia::widgets",
            %handle,
            kind = spec.kind().as_str(),
            range = ?spec.source_range,
            "mounted widget"
        );
        self.widgets.insert(handle, widget);
        handle
    }

    fn unmount(&mut self, handle: WidgetHandle) {
        if let Some(w) = self.widgets.remove(&handle) {
            if let Some(slot) = &w.diagram {
                slot.cancel();
            }
            tracing::trace!(
                target: "marginalia::widgets",
                %handle,
                kind = w.spec.kind().as_str(),
                "unmounted widget"
            );
        }
    }

    /// Unmount everything.
    pub fn clear(&mut self) {
        let handles: Vec<_> = self.widgets.keys().copied().collect();
        for handle in handles {
            self.unmount(handle);
        }
        self.by_range.clear();
    }

    fn reindex(&mut self) {
        self.by_range.clear();
        for w in self.widgets.values() {
            let r = &w.spec.source_range;
            self.by_range.entry((r.start, r.end)).or_default().push(w.handle);
        }
    }

    fn mounted(&self, handle: WidgetHandle) -> Result<&MountedWidget> {
        self.widgets
            .get(&handle)
            .ok_or(EngineError::Unmounted(handle.raw() as usize))
    }

    /// Respond to a click or key activation on a widget.
    pub fn activate<T: TextBuffer>(&self, handle: WidgetHandle, doc: &T) -> Result<Activation> {
        let w = self.mounted(handle)?;
        Ok(match &w.spec.widget {
            Widget::Checkbox { checked } => {
                let marker = if *checked { "[ ]" } else { "[x]" };
                Activation::Edit(TextEdit::replace(w.source_range(), marker))
            }
            Widget::HeadingFold { .. } => Activation::ToggleFold(w.spec.source_range.start),
            Widget::Table { .. } | Widget::Diagram { .. } => {
                Activation::OpenEditor(self.open_edit(handle, doc)?)
            }
            _ => Activation::Nothing,
        })
    }

    /// Open the raw-source editor of a table or diagram widget.
    pub fn open_edit<T: TextBuffer>(&self, handle: WidgetHandle, doc: &T) -> Result<EditSession> {
        let w = self.mounted(handle)?;
        let range = w.source_range();
        if !w.spec.widget.is_editable() {
            return Err(EngineError::EditConflict { range });
        }
        let original = doc
            .slice(range.clone())
            .ok_or_else(|| EngineError::EditConflict {
                range: range.clone(),
            })?;
        Ok(EditSession {
            handle,
            range,
            original,
        })
    }

    /// Finish an edit session with new raw source. Produces one replacement
    /// of the whole source range, or a conflict if the document changed.
    pub fn commit_edit<T: TextBuffer>(
        &self,
        session: &EditSession,
        raw: &str,
        doc: &T,
    ) -> Result<TextEdit> {
        let current = doc.slice(session.range.clone());
        if current.as_ref() != Some(&session.original) {
            tracing::debug!(
                target: "marginalia::widgets",
                handle = %session.handle,
                range = ?session.range,
                "edit conflict"
            );
            return Err(EngineError::EditConflict {
                range: session.range.clone(),
            });
        }
        Ok(TextEdit::replace(session.range.clone(), raw))
    }

    /// Commit a structured table edit.
    pub fn commit_table<T: TextBuffer>(
        &self,
        session: &EditSession,
        model: &TableModel,
        doc: &T,
    ) -> Result<TextEdit> {
        self.commit_edit(session, &model.serialize(), doc)
    }

    /// Route a finished render to its widget, then hand the result to every
    /// other widget still waiting on the same key. Successes are cached even
    /// when the widget is gone. Returns whether any widget changed state.
    pub fn complete_diagram(&mut self, outcome: RenderOutcome, cache: &DiagramCache) -> bool {
        let handle = outcome.handle;
        let key = outcome.key.clone();
        let shared = outcome.result.clone();
        let mut changed = match self.widgets.get_mut(&handle).and_then(|w| w.diagram.as_mut()) {
            Some(slot) => slot.complete(outcome, cache),
            None => {
                if let Some(Ok(rendered)) = outcome.result {
                    cache.insert(outcome.key, rendered);
                }
                false
            }
        };
        let Some(result) = shared else {
            return changed;
        };
        for w in self.widgets.values_mut().filter(|w| w.handle != handle) {
            let Some(slot) = w.diagram.as_mut() else {
                continue;
            };
            if slot.adopt(&key, &result) {
                tracing::trace!(target: "marginalia::diagram", handle = %w.handle, "adopted shared render");
                changed = true;
            }
        }
        changed
    }
}

fn resolve_image<R: ImageResolver>(images: &R, url: &str) -> String {
    images
        .resolve_image_url(url)
        .unwrap_or_else(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::ThemeVariant;
    use crate::diagram::tests::CountingRenderer;
    use crate::mode::Mode;
    use crate::text::EditorRope;

    fn cx<'a>(cache: &'a DiagramCache) -> MountContext<'a, ()> {
        MountContext {
            diagrams: cache,
            debounce: Duration::from_millis(100),
            images: &(),
        }
    }

    fn checkbox(checked: bool, range: Range<usize>, mode: Mode) -> WidgetSpec {
        WidgetSpec::new(Widget::Checkbox { checked }, range, mode)
    }

    fn diagram(source: &str, range: Range<usize>) -> WidgetSpec {
        WidgetSpec::new(
            Widget::Diagram {
                language: "mermaid".into(),
                source: source.into(),
                theme: ThemeVariant::Light,
            },
            range,
            Mode::Reading,
        )
    }

    #[test]
    fn test_equal_specs_are_reused() {
        let cache = DiagramCache::new();
        let mut arena = WidgetArena::new();
        let specs = vec![checkbox(false, 2..5, Mode::Reading)];

        let first = arena.reconcile(&specs, &cx(&cache));
        assert_eq!(first.mounted.len(), 1);

        let second = arena.reconcile(&specs, &cx(&cache));
        assert_eq!(second.reused, 1);
        assert!(second.is_noop());
        assert_eq!(arena.at_range(2..5).next().map(|w| w.handle()), Some(first.mounted[0]));
    }

    #[test]
    fn test_mode_change_patches_in_place() {
        let cache = DiagramCache::new();
        let mut arena = WidgetArena::new();
        let mounted = arena.reconcile(&[checkbox(false, 2..5, Mode::Reading)], &cx(&cache)).mounted;

        let report = arena.reconcile(&[checkbox(false, 2..5, Mode::LivePreview)], &cx(&cache));
        assert_eq!(report.updated, 1);
        assert!(report.mounted.is_empty());
        assert_eq!(arena.get(mounted[0]).map(|w| w.spec().mode), Some(Mode::LivePreview));
    }

    #[test]
    fn test_widget_follows_drift() {
        let cache = DiagramCache::new();
        let mut arena = WidgetArena::new();
        let mounted = arena
            .reconcile(&[checkbox(true, 2..5, Mode::Reading), checkbox(false, 20..23, Mode::Reading)], &cx(&cache))
            .mounted;

        // text inserted before both checkboxes
        let report = arena.reconcile(
            &[checkbox(true, 6..9, Mode::Reading), checkbox(false, 24..27, Mode::Reading)],
            &cx(&cache),
        );
        assert_eq!(report.updated, 2);
        assert!(report.mounted.is_empty() && report.unmounted.is_empty());
        assert_eq!(arena.get(mounted[0]).map(|w| w.source_range()), Some(6..9));
        assert_eq!(arena.at_offset(25).map(|w| w.handle()), Some(mounted[1]));

        // three identical items, ten chars per line; the first line is
        // deleted and a seven char heading takes its place
        let mut arena = WidgetArena::new();
        let items = arena
            .reconcile(
                &[
                    checkbox(false, 2..5, Mode::Reading),
                    checkbox(false, 12..15, Mode::Reading),
                    checkbox(false, 22..25, Mode::Reading),
                ],
                &cx(&cache),
            )
            .mounted;
        let report = arena.reconcile(
            &[checkbox(false, 9..12, Mode::Reading), checkbox(false, 19..22, Mode::Reading)],
            &cx(&cache),
        );
        assert_eq!(report.updated, 2);
        assert_eq!(report.unmounted, vec![items[0]]);
        assert_eq!(arena.get(items[1]).map(|w| w.source_range()), Some(9..12));
        assert_eq!(arena.get(items[2]).map(|w| w.source_range()), Some(19..22));
    }

    #[test]
    fn test_unclaimed_widgets_unmount() {
        let cache = DiagramCache::new();
        let mut arena = WidgetArena::new();
        arena.reconcile(&[checkbox(true, 2..5, Mode::Reading)], &cx(&cache));
        let report = arena.reconcile(&[], &cx(&cache));
        assert_eq!(report.unmounted.len(), 1);
        assert!(arena.is_empty());
    }

    #[test]
    fn test_checkbox_activation_toggles_marker() {
        let cache = DiagramCache::new();
        let doc = EditorRope::from_str("- [ ] a\n  - [x] b");
        let mut arena = WidgetArena::new();
        let handles = arena
            .reconcile(&[checkbox(false, 2..5, Mode::Reading), checkbox(true, 12..15, Mode::Reading)], &cx(&cache))
            .mounted;
        assert_eq!(
            arena.activate(handles[0], &doc).unwrap(),
            Activation::Edit(TextEdit::replace(2..5, "[x]"))
        );
        assert_eq!(
            arena.activate(handles[1], &doc).unwrap(),
            Activation::Edit(TextEdit::replace(12..15, "[ ]"))
        );
        assert!(matches!(
            arena.activate(WidgetHandle::from_raw(99), &doc),
            Err(EngineError::Unmounted(99))
        ));
    }

    #[test]
    fn test_edit_session_detects_conflicts() {
        let cache = DiagramCache::new();
        let mut arena = WidgetArena::new();
        let mut doc = EditorRope::from_str("intro\n| a |\n|---|\n| 1 |\nend");
        let model = TableModel::parse("| a |\n|---|\n| 1 |").unwrap();
        let spec = WidgetSpec::new(Widget::Table { model: model.clone() }, 6..23, Mode::Reading);
        let handle = arena.reconcile(&[spec], &cx(&cache)).mounted[0];

        let Activation::OpenEditor(session) = arena.activate(handle, &doc).unwrap() else {
            panic!("table activation should open the editor");
        };
        assert_eq!(session.original, "| a |\n|---|\n| 1 |");

        let mut edited = model.clone();
        edited.set_cell(0, 0, "42");
        let edit = arena.commit_table(&session, &edited, &doc).unwrap();
        assert_eq!(edit.range, 6..23);
        assert_eq!(edit.insert, "| a   |\n| --- |\n| 42  |");

        doc.insert(8, "b");
        assert!(matches!(
            arena.commit_edit(&session, "| x |", &doc),
            Err(EngineError::EditConflict { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_diagram_mount_schedules_render_and_completes() {
        let cache = DiagramCache::new();
        let renderer = CountingRenderer::default();
        let mut arena = WidgetArena::new();

        let mut report = arena.reconcile(&[diagram("graph TD", 0..20)], &cx(&cache));
        let handle = report.mounted[0];
        let task = report.tasks.pop().unwrap();
        assert_eq!(arena.get(handle).and_then(|w| w.diagram_state()).map(|s| s.name()), Some("rendering"));

        let outcome = task.run(&renderer).await;
        assert!(arena.complete_diagram(outcome, &cache));
        assert_eq!(arena.get(handle).and_then(|w| w.diagram_state()).map(|s| s.name()), Some("rendered"));

        // an identical diagram elsewhere is rendered straight from cache
        let report = arena.reconcile(&[diagram("graph TD", 0..20), diagram("graph TD", 40..60)], &cx(&cache));
        assert!(report.tasks.is_empty());
        assert_eq!(renderer.calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_diagrams_share_a_render() {
        let cache = DiagramCache::new();
        let renderer = CountingRenderer::default();
        let mut arena = WidgetArena::new();

        let report = arena.reconcile(&[diagram("graph TD", 0..20), diagram("graph TD", 40..60)], &cx(&cache));
        assert_eq!(report.tasks.len(), 2);
        let mut outcomes = Vec::new();
        for task in report.tasks {
            outcomes.push(task.run(&renderer).await);
        }
        assert_eq!(renderer.calls.get(), 1);

        // the first result reaches both widgets
        let mut outcomes = outcomes.into_iter();
        assert!(arena.complete_diagram(outcomes.next().unwrap(), &cache));
        for handle in &report.mounted {
            assert_eq!(
                arena.get(*handle).and_then(|w| w.diagram_state()).map(|s| s.name()),
                Some("rendered")
            );
        }
        assert!(!arena.complete_diagram(outcomes.next().unwrap(), &cache));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_cancels_pending_render() {
        let cache = DiagramCache::new();
        let renderer = CountingRenderer::default();
        let mut arena = WidgetArena::new();

        let mut report = arena.reconcile(&[diagram("A-->B", 0..20)], &cx(&cache));
        let task = report.tasks.pop().unwrap();
        // the block was deleted before the debounce elapsed, but the task
        // already captured its generation; unmounting cancels it
        arena.reconcile(&[], &cx(&cache));
        let outcome = task.run(&renderer).await;
        assert!(outcome.is_superseded());
        assert!(!arena.complete_diagram(outcome, &cache));
        assert_eq!(renderer.calls.get(), 0);
        assert!(cache.is_empty());
    }
}
