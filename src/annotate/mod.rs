//! # Annotation
//!
//! Free-hand annotation over rendered pages: a pointer/gesture state
//! machine producing an ordered stroke log ([`capture`]), and the
//! compositor that burns that log (or a flattened raster snapshot of the
//! annotation surface) back into the final document ([`compose`]).

pub mod capture;
pub mod compose;

pub use capture::{
    AnnotationCapture, CaptureEffect, CapturePoint, GestureEvent, GesturePhase, PointerKind,
    Stroke, StrokeKind, StrokeLog,
};
pub use compose::{CaptureGeometry, OverlaySegment, PageOverlay, SnapshotLayout};
