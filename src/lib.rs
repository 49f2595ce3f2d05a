//! # Punchlist
//!
//! A page-native inspection report engine.
//!
//! Structured walkthrough data (locations, issues, photos) lays out
//! INTO pages, never onto an infinite canvas that gets sliced after the
//! fact: every placement decision is made with the page boundary as a
//! hard constraint. The same layout pass that positions a checkbox or a
//! photo tile registers it as a hit region, so toggling marks needs no
//! second geometry source. Free-hand annotations captured over the
//! rendered pages, and marks toggled through the hit regions, burn back
//! into the final PDF byte-stream.
//!
//! ## Architecture
//!
//! ```text
//! Input (JSON/API)
//!       ↓
//!   [model]     - content tree: project, locations, issues, photos
//!       ↓
//!   [layout]    - page-aware layout engine → pages + hit regions
//!       ↓
//!   [render]    - preview PNGs per page / final PDF bytes
//!       ↑
//!   [annotate]  - gesture capture → stroke log → compositor overlays
//! ```
//!
//! The [`raster`] module is a sibling tool, not a pipeline stage: a
//! single-image annotation editor with vector tools, pinch-zoom/pan, and
//! bounded undo/redo.
//!
//! Mark state and stroke logs are plain serializable values owned by the
//! host application; the engine consumes them per generation and never
//! stores them.

pub mod annotate;
pub mod error;
pub mod layout;
pub mod model;
pub mod photo;
pub mod preview;
pub mod raster;
pub mod regions;
pub mod render;

pub use annotate::{
    AnnotationCapture, CaptureGeometry, GestureEvent, GesturePhase, PointerKind, SnapshotLayout,
    Stroke, StrokeKind, StrokeLog,
};
pub use error::Error;
pub use layout::{LayoutEngine, LayoutResult};
pub use model::{DocKind, InspectionContent};
pub use regions::{toggle_mark, HitRegion, HitRegionRegistry, MarkState};
pub use render::{AnnotationInput, DocumentRenderer, GeneratedDocument};

/// Generate a document from content, marks, and optional annotations.
///
/// This is the primary entry point for hosts that don't need a
/// long-lived renderer (and therefore no save listeners).
pub fn generate(
    content: &InspectionContent,
    kind: DocKind,
    marks: &MarkState,
    annotations: Option<AnnotationInput<'_>>,
) -> Result<GeneratedDocument, Error> {
    DocumentRenderer::new().generate(content, kind, marks, annotations)
}

/// Generate from content described as JSON.
pub fn generate_json(json: &str, kind: DocKind) -> Result<GeneratedDocument, Error> {
    let content: InspectionContent = serde_json::from_str(json)?;
    generate(&content, kind, &MarkState::new(), None)
}
