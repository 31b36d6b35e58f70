//! marginalia-editor-core: the live-preview decoration engine.
//!
//! This crate provides:
//! - `TextBuffer` trait for text storage abstraction, `EditorRope` ropey-backed implementation
//! - `SyntaxTree` - arena tree over the document, built with `TreeBuilder` or parsed with pulldown-cmark
//! - `ModeState` - source / live preview / reading plus the lines the cursor reveals
//! - `build` - decorations (marks, hides, widget replacements) for the visible ranges
//! - `WidgetArena` - widget identity, reconciliation and activation
//! - `TableModel`, diagram render pipeline, wikilink resolution
//! - `DecorationEngine` - the driver hosts call into, generic over `EditorHost`

pub mod builder;
pub mod config;
pub mod context;
pub mod decoration;
pub mod diagram;
pub mod engine;
pub mod error;
pub mod host;
pub mod mode;
pub mod registry;
pub mod syntax;
pub mod table;
pub mod text;
pub mod tree;
pub mod types;
pub mod widget;
pub mod wikilink;

pub use builder::build;
pub use config::EngineConfig;
pub use context::EditorContext;
pub use decoration::{Decoration, DecorationKind, DecorationSet, FinishStats, MarkStyle};
pub use diagram::{
    DiagramCache, DiagramKey, DiagramRenderer, DiagramSlot, DiagramState, RenderOutcome,
    RenderResult, RenderTask, RenderedDiagram, ThemeVariant,
};
pub use engine::{DecorationEngine, Refresh};
pub use error::{
    DiagramSyntaxError, EngineError, InvalidModeError, Result, StaleTreeOffsetError,
    TableSerializationMismatch,
};
pub use host::{EditorHost, Entry, EntryStore, HostEvent, ImageResolver};
pub use mode::{Mode, ModeState};
pub use registry::{Activation, EditSession, MountedWidget, ReconcileReport, WidgetArena};
pub use smol_str::SmolStr;
pub use table::{Alignment, TableModel};
pub use text::{EditorRope, TextBuffer};
pub use tree::{NodeId, NodeKind, SyntaxTree, TreeBuilder};
pub use types::{Selection, TextEdit};
pub use widget::{Widget, WidgetHandle, WidgetKind, WidgetSpec};
pub use wikilink::{EntryPreview, Resolution, TitleIndex, TitleMap, WikiLink};
