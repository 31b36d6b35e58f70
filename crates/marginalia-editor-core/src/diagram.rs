//! Async diagram rendering with debounce, staleness checks and a shared cache.
//!
//! Rendering never happens on the decoration path. A diagram widget owns a
//! [`DiagramSlot`]; when its key has no cached render the slot hands out a
//! [`RenderTask`] that the host drives (typically with `spawn_local`). The
//! task sleeps for the debounce window, bails out if a newer task superseded
//! it, then awaits the [`DiagramRenderer`]. The [`RenderOutcome`] goes back
//! through the engine, which checks the widget is still mounted and still
//! wants the same key before applying it.
//!
//! A key is rendered at most once at a time per cache. A task that finds its
//! key already in flight, from another widget or another editor sharing the
//! cache, waits for that render's result instead of calling the renderer.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use n0_future::time::Duration;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::DiagramSyntaxError;
use crate::widget::WidgetHandle;

/// Light or dark rendering of a diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThemeVariant {
    #[default]
    Light,
    Dark,
}

impl ThemeVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThemeVariant::Light => "light",
            ThemeVariant::Dark => "dark",
        }
    }
}

/// Cache identity of a render. Independent of where the diagram sits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiagramKey {
    pub source: SmolStr,
    pub theme: ThemeVariant,
}

impl DiagramKey {
    pub fn new(source: impl Into<SmolStr>, theme: ThemeVariant) -> Self {
        Self {
            source: source.into(),
            theme,
        }
    }
}

/// Output of a successful render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDiagram {
    pub svg: Arc<str>,
    pub width: f64,
    pub height: f64,
}

/// External diagram engine.
pub trait DiagramRenderer {
    fn render(
        &self,
        source: &str,
        theme: ThemeVariant,
    ) -> impl Future<Output = Result<RenderedDiagram, DiagramSyntaxError>>;
}

impl<T: DiagramRenderer> DiagramRenderer for &T {
    fn render(
        &self,
        source: &str,
        theme: ThemeVariant,
    ) -> impl Future<Output = Result<RenderedDiagram, DiagramSyntaxError>> {
        (*self).render(source, theme)
    }
}

/// What the renderer answered for one key.
pub type RenderResult = Result<RenderedDiagram, DiagramSyntaxError>;

/// Successful renders keyed by `(source, theme)`.
///
/// Shared by every widget of an editor context. Append-only: an entry, once
/// written, is never replaced or evicted. Also tracks the keys currently on
/// the renderer so concurrent requests for one key share a single call.
#[derive(Debug, Clone, Default)]
pub struct DiagramCache {
    entries: Rc<RefCell<HashMap<DiagramKey, RenderedDiagram>>>,
    in_flight: Rc<RefCell<HashMap<DiagramKey, Rc<RefCell<Flight>>>>>,
}

impl DiagramCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &DiagramKey) -> Option<RenderedDiagram> {
        self.entries.borrow().get(key).cloned()
    }

    pub fn contains(&self, key: &DiagramKey) -> bool {
        self.entries.borrow().contains_key(key)
    }

    /// Store a render unless the key is already present.
    pub fn insert(&self, key: DiagramKey, rendered: RenderedDiagram) {
        self.entries.borrow_mut().entry(key).or_insert(rendered);
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Whether some task is awaiting the renderer for `key`.
    pub fn is_rendering(&self, key: &DiagramKey) -> bool {
        self.in_flight.borrow().contains_key(key)
    }

    /// Become the renderer of `key`, or join the render already running.
    fn claim(&self, key: &DiagramKey) -> Claim {
        let mut in_flight = self.in_flight.borrow_mut();
        if let Some(flight) = in_flight.get(key) {
            return Claim::Follow(Landing(Rc::clone(flight)));
        }
        let flight = Rc::new(RefCell::new(Flight::default()));
        in_flight.insert(key.clone(), Rc::clone(&flight));
        Claim::Lead(FlightGuard {
            cache: self.clone(),
            key: key.clone(),
            flight,
            settled: false,
        })
    }
}

/// One render in progress. `landed` is `Some(None)` when the leading task
/// was dropped before the renderer answered.
#[derive(Debug, Default)]
struct Flight {
    landed: Option<Option<RenderResult>>,
    waiters: Vec<Waker>,
}

enum Claim {
    Lead(FlightGuard),
    Follow(Landing),
}

/// Held by the task that calls the renderer. Settles the flight on drop so
/// followers never wait on an abandoned render.
struct FlightGuard {
    cache: DiagramCache,
    key: DiagramKey,
    flight: Rc<RefCell<Flight>>,
    settled: bool,
}

impl FlightGuard {
    fn land(mut self, result: &RenderResult) {
        if let Ok(rendered) = result {
            self.cache.insert(self.key.clone(), rendered.clone());
        }
        self.settle(Some(result.clone()));
    }

    fn settle(&mut self, landed: Option<RenderResult>) {
        self.settled = true;
        self.cache.in_flight.borrow_mut().remove(&self.key);
        let waiters = {
            let mut flight = self.flight.borrow_mut();
            flight.landed = Some(landed);
            std::mem::take(&mut flight.waiters)
        };
        for waker in waiters {
            waker.wake();
        }
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if !self.settled {
            tracing::trace!(target: "marginalia::diagram", "render abandoned");
            self.settle(None);
        }
    }
}

/// Resolves with the leading task's result, or `None` if it was abandoned.
struct Landing(Rc<RefCell<Flight>>);

impl Future for Landing {
    type Output = Option<RenderResult>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut flight = self.0.borrow_mut();
        if let Some(landed) = &flight.landed {
            return Poll::Ready(landed.clone());
        }
        if !flight.waiters.iter().any(|w| w.will_wake(cx.waker())) {
            flight.waiters.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

/// Render state of one diagram widget.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DiagramState {
    #[default]
    Uninitialized,
    /// Waiting on a render. `height_lock` is the last rendered height, kept so
    /// the widget does not collapse while the new render is in flight.
    Rendering { height_lock: Option<f64> },
    Rendered(RenderedDiagram),
    /// Shown as a fenced error block with the engine's first error line.
    Failed { message: SmolStr },
}

impl DiagramState {
    pub fn name(&self) -> &'static str {
        match self {
            DiagramState::Uninitialized => "uninitialized",
            DiagramState::Rendering { .. } => "rendering",
            DiagramState::Rendered(_) => "rendered",
            DiagramState::Failed { .. } => "failed",
        }
    }

    /// Height the widget should reserve.
    pub fn height(&self) -> Option<f64> {
        match self {
            DiagramState::Rendering { height_lock } => *height_lock,
            DiagramState::Rendered(r) => Some(r.height),
            _ => None,
        }
    }
}

/// Per-widget render state plus the generation counter its tasks check.
#[derive(Debug)]
pub struct DiagramSlot {
    key: DiagramKey,
    state: DiagramState,
    generation: Rc<Cell<u64>>,
}

impl DiagramSlot {
    pub fn new(key: DiagramKey) -> Self {
        Self {
            key,
            state: DiagramState::Uninitialized,
            generation: Rc::new(Cell::new(0)),
        }
    }

    pub fn key(&self) -> &DiagramKey {
        &self.key
    }

    pub fn state(&self) -> &DiagramState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// Move out of `Uninitialized`: straight to `Rendered` on a cache hit,
    /// otherwise to `Rendering` with a task for the host to drive.
    pub fn begin(
        &mut self,
        cache: &DiagramCache,
        debounce: Duration,
        handle: WidgetHandle,
    ) -> Option<RenderTask> {
        if let Some(rendered) = cache.get(&self.key) {
            tracing::trace!(target: "marginalia::diagram", ?handle, "cache hit");
            self.state = DiagramState::Rendered(rendered);
            return None;
        }

        let height_lock = self.state.height();
        self.state = DiagramState::Rendering { height_lock };
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        tracing::debug!(
            target: "marginalia::diagram",
            ?handle,
            generation,
            theme = self.key.theme.as_str(),
            "scheduling render"
        );
        Some(RenderTask {
            handle,
            key: self.key.clone(),
            generation,
            current: Rc::clone(&self.generation),
            debounce,
            cache: cache.clone(),
        })
    }

    /// Point the slot at a new key. Returns a task when a render is needed.
    pub fn rekey(
        &mut self,
        key: DiagramKey,
        cache: &DiagramCache,
        debounce: Duration,
        handle: WidgetHandle,
    ) -> Option<RenderTask> {
        if key == self.key && !matches!(self.state, DiagramState::Uninitialized) {
            return None;
        }
        self.key = key;
        self.begin(cache, debounce, handle)
    }

    /// Invalidate any in-flight task without scheduling a new one.
    pub fn cancel(&self) {
        self.generation.set(self.generation.get() + 1);
    }

    /// Take a render produced for another widget with the same key. Only a
    /// slot still waiting on that key changes; its own task is superseded.
    pub fn adopt(&mut self, key: &DiagramKey, result: &RenderResult) -> bool {
        if *key != self.key || !matches!(self.state, DiagramState::Rendering { .. }) {
            return false;
        }
        self.cancel();
        self.state = match result {
            Ok(rendered) => DiagramState::Rendered(rendered.clone()),
            Err(err) => DiagramState::Failed {
                message: SmolStr::new(err.first_line()),
            },
        };
        true
    }

    /// Apply a finished render. Successes are cached regardless of whether
    /// this slot still wants them; the slot only changes state when the key
    /// and generation still match. Returns whether the state changed.
    pub fn complete(&mut self, outcome: RenderOutcome, cache: &DiagramCache) -> bool {
        let Some(result) = outcome.result else {
            return false;
        };
        let current = outcome.key == self.key && outcome.generation == self.generation.get();
        match result {
            Ok(rendered) => {
                cache.insert(outcome.key, rendered.clone());
                if current {
                    self.state = DiagramState::Rendered(rendered);
                }
            }
            Err(err) => {
                tracing::debug!(
                    target: "marginalia::diagram",
                    handle = ?outcome.handle,
                    error = %err,
                    current,
                    "render failed"
                );
                if current {
                    self.state = DiagramState::Failed {
                        message: SmolStr::new(err.first_line()),
                    };
                }
            }
        }
        current
    }
}

/// A pending render, handed to the host to drive.
#[derive(Debug)]
pub struct RenderTask {
    handle: WidgetHandle,
    key: DiagramKey,
    generation: u64,
    current: Rc<Cell<u64>>,
    debounce: Duration,
    cache: DiagramCache,
}

impl RenderTask {
    pub fn handle(&self) -> WidgetHandle {
        self.handle
    }

    pub fn key(&self) -> &DiagramKey {
        &self.key
    }

    /// Whether a newer task has been issued for the same slot.
    pub fn is_superseded(&self) -> bool {
        self.current.get() != self.generation
    }

    /// Debounce, then render unless superseded in the meantime. A key that
    /// was cached or started rendering elsewhere during the debounce is not
    /// sent to the renderer again.
    pub async fn run<R: DiagramRenderer>(self, renderer: R) -> RenderOutcome {
        n0_future::time::sleep(self.debounce).await;
        if self.is_superseded() {
            tracing::trace!(
                target: "marginalia::diagram",
                handle = ?self.handle,
                generation = self.generation,
                "superseded during debounce"
            );
            return self.finish(None);
        }
        loop {
            if let Some(rendered) = self.cache.get(&self.key) {
                tracing::trace!(target: "marginalia::diagram", handle = ?self.handle, "cached during debounce");
                return self.finish(Some(Ok(rendered)));
            }
            match self.cache.claim(&self.key) {
                Claim::Lead(guard) => {
                    let result = renderer.render(&self.key.source, self.key.theme).await;
                    guard.land(&result);
                    return self.finish(Some(result));
                }
                Claim::Follow(landing) => {
                    tracing::trace!(target: "marginalia::diagram", handle = ?self.handle, "joining render in flight");
                    if let Some(result) = landing.await {
                        return self.finish(Some(result));
                    }
                }
            }
        }
    }

    fn finish(self, result: Option<RenderResult>) -> RenderOutcome {
        RenderOutcome {
            handle: self.handle,
            key: self.key,
            generation: self.generation,
            result,
        }
    }
}

/// What a [`RenderTask`] produced. `result` is `None` when it was superseded
/// before reaching the renderer.
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub handle: WidgetHandle,
    pub key: DiagramKey,
    pub generation: u64,
    pub result: Option<RenderResult>,
}

impl RenderOutcome {
    pub fn is_superseded(&self) -> bool {
        self.result.is_none()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Renders `source` as a fake svg and counts calls. Sources containing
    /// `error` fail.
    #[derive(Debug, Default, Clone)]
    pub(crate) struct CountingRenderer {
        pub calls: Rc<Cell<usize>>,
        /// Time spent "rendering", so concurrent tasks overlap.
        pub latency: Duration,
    }

    impl DiagramRenderer for CountingRenderer {
        async fn render(
            &self,
            source: &str,
            theme: ThemeVariant,
        ) -> Result<RenderedDiagram, DiagramSyntaxError> {
            self.calls.set(self.calls.get() + 1);
            if !self.latency.is_zero() {
                n0_future::time::sleep(self.latency).await;
            }
            if source.contains("error") {
                return Err(DiagramSyntaxError::new(format!(
                    "Parse error on line 1:\n{source}"
                )));
            }
            Ok(RenderedDiagram {
                svg: Arc::from(format!("<svg data-theme=\"{}\">{source}</svg>", theme.as_str())),
                width: 100.0,
                height: 40.0 + source.lines().count() as f64,
            })
        }
    }

    const DEBOUNCE: Duration = Duration::from_millis(100);

    fn handle() -> WidgetHandle {
        WidgetHandle::from_raw(1)
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_then_cache_hit() {
        let cache = DiagramCache::new();
        let renderer = CountingRenderer::default();
        let key = DiagramKey::new("graph TD; A-->B", ThemeVariant::Light);

        let mut first = DiagramSlot::new(key.clone());
        let task = first.begin(&cache, DEBOUNCE, handle()).unwrap();
        assert_eq!(first.state().name(), "rendering");
        let outcome = task.run(&renderer).await;
        assert!(first.complete(outcome, &cache));
        assert_eq!(first.state().name(), "rendered");
        assert_eq!(renderer.calls.get(), 1);

        let mut second = DiagramSlot::new(key);
        assert!(second.begin(&cache, DEBOUNCE, handle()).is_none());
        assert_eq!(second.state(), first.state());
        assert_eq!(renderer.calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_task_skips_renderer() {
        let cache = DiagramCache::new();
        let renderer = CountingRenderer::default();
        let mut slot = DiagramSlot::new(DiagramKey::new("A", ThemeVariant::Light));

        let stale = slot.begin(&cache, DEBOUNCE, handle()).unwrap();
        let fresh = slot
            .rekey(DiagramKey::new("A-->B", ThemeVariant::Light), &cache, DEBOUNCE, handle())
            .unwrap();
        assert!(stale.is_superseded());

        let stale = stale.run(&renderer).await;
        assert!(stale.is_superseded());
        assert!(!slot.complete(stale, &cache));
        assert_eq!(renderer.calls.get(), 0);

        let fresh = fresh.run(&renderer).await;
        assert!(slot.complete(fresh, &cache));
        assert_eq!(renderer.calls.get(), 1);
        assert_eq!(slot.state().height(), Some(41.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_not_cached() {
        let cache = DiagramCache::new();
        let renderer = CountingRenderer::default();
        let key = DiagramKey::new("syntax error here", ThemeVariant::Dark);
        let mut slot = DiagramSlot::new(key.clone());

        let outcome = slot.begin(&cache, DEBOUNCE, handle()).unwrap().run(&renderer).await;
        assert!(slot.complete(outcome, &cache));
        assert_eq!(
            slot.state(),
            &DiagramState::Failed {
                message: "Parse error on line 1:".into()
            }
        );
        assert!(cache.is_empty());

        // a fresh widget with the same key renders again
        let mut again = DiagramSlot::new(key);
        assert!(again.begin(&cache, DEBOUNCE, handle()).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_success_is_cached_but_not_applied() {
        let cache = DiagramCache::new();
        let renderer = CountingRenderer::default();
        let mut slot = DiagramSlot::new(DiagramKey::new("A", ThemeVariant::Light));

        let task = slot.begin(&cache, DEBOUNCE, handle()).unwrap();
        let old_key = task.key().clone();
        let outcome = task.run(&renderer).await;
        // source edited after the renderer was called
        slot.cancel();
        assert!(!slot.complete(outcome, &cache));
        assert_eq!(slot.state().name(), "rendering");
        assert!(cache.contains(&old_key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_tasks_share_one_render() {
        let cache = DiagramCache::new();
        let renderer = CountingRenderer {
            latency: Duration::from_millis(500),
            ..Default::default()
        };
        let key = DiagramKey::new("graph TD; A-->B", ThemeVariant::Light);
        let mut first = DiagramSlot::new(key.clone());
        let mut second = DiagramSlot::new(key.clone());
        let a = first.begin(&cache, DEBOUNCE, WidgetHandle::from_raw(1)).unwrap();
        let b = second.begin(&cache, DEBOUNCE, WidgetHandle::from_raw(2)).unwrap();

        let (a, b) = tokio::join!(a.run(&renderer), b.run(&renderer));
        assert_eq!(renderer.calls.get(), 1);
        assert!(!cache.is_rendering(&key));
        assert!(first.complete(a, &cache));
        assert!(second.complete(b, &cache));
        assert_eq!(first.state(), second.state());
        assert_eq!(first.state().name(), "rendered");
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_failure_is_shared_but_not_cached() {
        let cache = DiagramCache::new();
        let renderer = CountingRenderer {
            latency: Duration::from_millis(500),
            ..Default::default()
        };
        let key = DiagramKey::new("error", ThemeVariant::Dark);
        let mut first = DiagramSlot::new(key.clone());
        let mut second = DiagramSlot::new(key);
        let a = first.begin(&cache, DEBOUNCE, WidgetHandle::from_raw(1)).unwrap();
        let b = second.begin(&cache, DEBOUNCE, WidgetHandle::from_raw(2)).unwrap();

        let (a, b) = tokio::join!(a.run(&renderer), b.run(&renderer));
        assert_eq!(renderer.calls.get(), 1);
        assert!(first.complete(a, &cache));
        assert!(second.complete(b, &cache));
        assert_eq!(second.state().name(), "failed");
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_follower_renders_when_leader_is_dropped() {
        let cache = DiagramCache::new();
        let renderer = CountingRenderer {
            latency: Duration::from_millis(500),
            ..Default::default()
        };
        let key = DiagramKey::new("A-->B", ThemeVariant::Light);
        let mut first = DiagramSlot::new(key.clone());
        let mut second = DiagramSlot::new(key.clone());
        let a = first.begin(&cache, DEBOUNCE, WidgetHandle::from_raw(1)).unwrap();
        // joins the first render at 200ms, after it has started
        let b = second
            .begin(&cache, DEBOUNCE * 2, WidgetHandle::from_raw(2))
            .unwrap();

        // the host gives up on the first render halfway through
        let leader = tokio::time::timeout(Duration::from_millis(300), a.run(&renderer));
        let (gave_up, b) = tokio::join!(leader, b.run(&renderer));
        assert!(gave_up.is_err());
        assert_eq!(renderer.calls.get(), 2);
        assert!(second.complete(b, &cache));
        assert_eq!(second.state().name(), "rendered");
        assert!(cache.contains(&key));
    }

    #[test]
    fn test_adopt_only_touches_waiting_slots() {
        let cache = DiagramCache::new();
        let key = DiagramKey::new("A", ThemeVariant::Light);
        let rendered = RenderedDiagram {
            svg: Arc::from("<svg/>"),
            width: 10.0,
            height: 20.0,
        };
        let mut waiting = DiagramSlot::new(key.clone());
        let task = waiting.begin(&cache, DEBOUNCE, handle()).unwrap();
        let mut other = DiagramSlot::new(DiagramKey::new("B", ThemeVariant::Light));
        other.begin(&cache, DEBOUNCE, handle());

        assert!(waiting.adopt(&key, &Ok(rendered.clone())));
        assert!(task.is_superseded());
        assert_eq!(waiting.state(), &DiagramState::Rendered(rendered.clone()));
        assert!(!other.adopt(&key, &Ok(rendered.clone())));
        // already rendered
        assert!(!waiting.adopt(&key, &Ok(rendered)));
    }

    #[test]
    fn test_height_lock_keeps_previous_height() {
        let cache = DiagramCache::new();
        let rendered = RenderedDiagram {
            svg: Arc::from("<svg/>"),
            width: 10.0,
            height: 77.0,
        };
        cache.insert(DiagramKey::new("A", ThemeVariant::Light), rendered);

        let mut slot = DiagramSlot::new(DiagramKey::new("A", ThemeVariant::Light));
        assert!(slot.begin(&cache, DEBOUNCE, handle()).is_none());
        let task = slot.rekey(DiagramKey::new("A", ThemeVariant::Dark), &cache, DEBOUNCE, handle());
        assert!(task.is_some());
        assert_eq!(
            slot.state(),
            &DiagramState::Rendering {
                height_lock: Some(77.0)
            }
        );
    }
}
