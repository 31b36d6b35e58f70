//! Per-editor state shared by the builder, the widgets and the engine.

use std::collections::BTreeSet;

use crate::config::EngineConfig;
use crate::diagram::{DiagramCache, ThemeVariant};
use crate::mode::ModeState;
use crate::types::TextEdit;

/// Everything a decoration pass reads besides the document and tree.
///
/// One context per open editor. Nothing in here is global, so any number of
/// editors can coexist; they only share a [`DiagramCache`] if handed the same
/// one.
#[derive(Debug, Clone, Default)]
pub struct EditorContext {
    pub mode: ModeState,
    pub config: EngineConfig,
    pub theme: ThemeVariant,
    pub diagrams: DiagramCache,
    /// Start offsets of folded headings.
    folds: BTreeSet<usize>,
}

impl EditorContext {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            mode: ModeState::new(config.default_mode),
            theme: config.theme,
            config,
            diagrams: DiagramCache::new(),
            folds: BTreeSet::new(),
        }
    }

    /// Use an existing cache, e.g. one shared between editors.
    pub fn with_diagram_cache(mut self, cache: DiagramCache) -> Self {
        self.diagrams = cache;
        self
    }

    pub fn is_folded(&self, heading_start: usize) -> bool {
        self.folds.contains(&heading_start)
    }

    /// Flip a heading's fold state. Returns whether it is now folded.
    pub fn toggle_fold(&mut self, heading_start: usize) -> bool {
        if self.folds.remove(&heading_start) {
            false
        } else {
            self.folds.insert(heading_start);
            true
        }
    }

    pub fn folds(&self) -> impl Iterator<Item = usize> + '_ {
        self.folds.iter().copied()
    }

    /// Shift fold anchors across an applied edit. Anchors inside the
    /// replaced range are dropped.
    pub fn map_edit(&mut self, edit: &TextEdit) {
        let delta = edit.char_delta();
        self.folds = self
            .folds
            .iter()
            .filter_map(|&start| {
                if start < edit.range.start {
                    Some(start)
                } else if start >= edit.range.end {
                    usize::try_from(start as isize + delta).ok()
                } else {
                    None
                }
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::Mode;

    #[test]
    fn test_new_takes_config_defaults() {
        let config = EngineConfig {
            default_mode: Mode::Reading,
            theme: ThemeVariant::Dark,
            ..Default::default()
        };
        let ctx = EditorContext::new(config);
        assert_eq!(ctx.mode.mode(), Mode::Reading);
        assert_eq!(ctx.theme, ThemeVariant::Dark);
    }

    #[test]
    fn test_folds_follow_edits() {
        let mut ctx = EditorContext::default();
        assert!(ctx.toggle_fold(10));
        assert!(ctx.toggle_fold(40));
        ctx.map_edit(&TextEdit::insert(0, "abc"));
        assert_eq!(ctx.folds().collect::<Vec<_>>(), vec![13, 43]);

        // deleting the first heading's line drops its fold
        ctx.map_edit(&TextEdit::replace(12..20, ""));
        assert_eq!(ctx.folds().collect::<Vec<_>>(), vec![35]);

        assert!(!ctx.toggle_fold(35));
        assert_eq!(ctx.folds().count(), 0);
    }
}
