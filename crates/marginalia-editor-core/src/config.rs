//! Engine settings.

use n0_future::time::Duration;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::diagram::ThemeVariant;
use crate::mode::Mode;

/// Settings an editor context starts from. Every field has a default, so a
/// config file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngineConfig {
    pub default_mode: Mode,
    pub theme: ThemeVariant,
    /// Fence languages rendered as diagrams.
    pub diagram_languages: Vec<SmolStr>,
    pub diagram_debounce_ms: u64,
    /// Length of wikilink hover excerpts, in chars.
    pub preview_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_mode: Mode::LivePreview,
            theme: ThemeVariant::Light,
            diagram_languages: vec![SmolStr::new_static("mermaid")],
            diagram_debounce_ms: 100,
            preview_chars: 280,
        }
    }
}

impl EngineConfig {
    pub fn diagram_debounce(&self) -> Duration {
        Duration::from_millis(self.diagram_debounce_ms)
    }

    pub fn is_diagram_language(&self, language: &str) -> bool {
        self.diagram_languages
            .iter()
            .any(|l| l.eq_ignore_ascii_case(language))
    }
}
