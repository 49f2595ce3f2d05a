//! # Document Renderer
//!
//! The two output modes over one layout:
//!
//! - **preview**: pages rasterized independently to PNG ([`svg`], driven
//!   asynchronously by [`crate::preview`]), marks burned in so toggles
//!   show immediately, and
//! - **final**: the PDF byte-stream ([`pdf`]) with mark effects and
//!   annotation overlays composited, handed to any registered save
//!   listeners along with a generated filename.
//!
//! Save listeners are best-effort observers keyed by session id. A
//! listener that panics is caught and logged; it never invalidates the
//! artifact or the generation.

pub mod pdf;
pub mod svg;

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::annotate::{
    compose::{overlays_from_snapshot, overlays_from_strokes},
    CaptureGeometry, PageOverlay, SnapshotLayout, StrokeLog,
};
use crate::error::Error;
use crate::layout::{LayoutEngine, LayoutResult};
use crate::model::{DocKind, InspectionContent};
use crate::regions::MarkState;
use pdf::{PdfMetadata, PdfWriter};

/// The product of one generation: the output byte-stream plus the
/// filename derived from the project name, timestamp, and document kind.
#[derive(Debug, Clone)]
pub struct GeneratedDocument {
    pub bytes: Vec<u8>,
    pub filename: String,
}

/// Captured annotations to burn into the final output, if any.
#[derive(Debug, Clone, Copy)]
pub enum AnnotationInput<'a> {
    /// Replay the stroke log into per-page vector overlays.
    Strokes {
        log: &'a StrokeLog,
        geometry: CaptureGeometry,
    },
    /// Slice a flattened raster snapshot of the annotation surface.
    Snapshot {
        image: &'a [u8],
        layout: SnapshotLayout,
    },
}

/// Strip path-hostile characters from a project name for use in a
/// filename. Whitespace collapses to single underscores.
pub fn sanitize_filename_part(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_sep = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch);
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    let trimmed = out.trim_end_matches('_').to_string();
    if trimmed.is_empty() {
        "document".to_string()
    } else {
        trimmed
    }
}

/// Build the output filename: sanitized project name, timestamp, kind.
pub fn document_filename(project_name: &str, kind: DocKind, at: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}.pdf",
        sanitize_filename_part(project_name),
        kind.file_suffix(),
        at.format("%Y%m%d_%H%M%S")
    )
}

/// A registered save callback: receives the output bytes and filename.
pub type SaveListener = Box<dyn Fn(&[u8], &str) + Send + Sync>;

/// Save listeners keyed by session id, so concurrent editing sessions on
/// different documents never interfere.
#[derive(Default)]
pub struct SaveListenerRegistry {
    listeners: Mutex<BTreeMap<String, SaveListener>>,
}

impl SaveListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for a session. Registering the same session id
    /// again replaces the previous listener.
    pub fn register(&self, session_id: &str, listener: SaveListener) {
        self.listeners
            .lock()
            .expect("save listener registry poisoned")
            .insert(session_id.to_string(), listener);
    }

    /// Remove a session's listener. Unregistering an unknown id is a
    /// no-op.
    pub fn unregister(&self, session_id: &str) {
        self.listeners
            .lock()
            .expect("save listener registry poisoned")
            .remove(session_id);
    }

    pub fn len(&self) -> usize {
        self.listeners
            .lock()
            .expect("save listener registry poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every listener best-effort. Panics are caught and logged;
    /// the artifact is already produced and stays valid.
    pub fn notify(&self, bytes: &[u8], filename: &str) {
        let listeners = self
            .listeners
            .lock()
            .expect("save listener registry poisoned");
        for (session_id, listener) in listeners.iter() {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener(bytes, filename))) {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(%session_id, %message, "save listener failed");
            }
        }
    }
}

/// The renderer: owns the layout engine, PDF writer, and listener
/// registry for one host application.
#[derive(Default)]
pub struct DocumentRenderer {
    layout_engine: LayoutEngine,
    writer: PdfWriter,
    listeners: SaveListenerRegistry,
}

impl DocumentRenderer {
    pub fn new() -> Self {
        Self {
            layout_engine: LayoutEngine::new(),
            writer: PdfWriter::new(),
            listeners: SaveListenerRegistry::new(),
        }
    }

    pub fn listeners(&self) -> &SaveListenerRegistry {
        &self.listeners
    }

    /// Lay out the content. Exposed for the preview driver and hit
    /// testing; `generate` runs the same pass internally.
    pub fn layout(&self, content: &InspectionContent, kind: DocKind) -> LayoutResult {
        self.layout_engine.layout(content, kind)
    }

    /// Generate the final document, burning in marks and annotations,
    /// and notify save listeners. The filename is stamped with the
    /// current UTC time.
    pub fn generate(
        &self,
        content: &InspectionContent,
        kind: DocKind,
        marks: &MarkState,
        annotations: Option<AnnotationInput<'_>>,
    ) -> Result<GeneratedDocument, Error> {
        self.generate_at(content, kind, marks, annotations, Utc::now())
    }

    /// As [`generate`](Self::generate) with an explicit timestamp for the
    /// filename. The output bytes do not depend on the timestamp.
    pub fn generate_at(
        &self,
        content: &InspectionContent,
        kind: DocKind,
        marks: &MarkState,
        annotations: Option<AnnotationInput<'_>>,
        at: DateTime<Utc>,
    ) -> Result<GeneratedDocument, Error> {
        let LayoutResult { pages, regions } = self.layout_engine.layout(content, kind);

        // Only marks whose region still exists participate; stale ids
        // from a previous content revision are ignored.
        let mut marks = marks.clone();
        regions.retain_known(&mut marks);

        let overlays: Vec<PageOverlay> = match annotations {
            None => Vec::new(),
            Some(AnnotationInput::Strokes { log, geometry }) => {
                overlays_from_strokes(log, pages.len(), &geometry)
            }
            Some(AnnotationInput::Snapshot { image, layout }) => {
                overlays_from_snapshot(image, pages.len(), &layout)?
            }
        };

        let metadata = PdfMetadata {
            title: Some(format!("{} - {}", kind.title(), content.project_name)),
            author: None,
        };
        let bytes = self
            .writer
            .write(&pages, &regions, &marks, &overlays, &metadata)?;
        let filename = document_filename(&content.project_name, kind, at);

        info!(
            pages = pages.len(),
            bytes = bytes.len(),
            %filename,
            "document generated"
        );
        self.listeners.notify(&bytes, &filename);

        Ok(GeneratedDocument { bytes, filename })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn content() -> InspectionContent {
        InspectionContent {
            project_name: "Lot 7 / Phase 2".to_string(),
            fields: vec![],
            locations: vec![],
            logo: None,
        }
    }

    #[test]
    fn filename_is_sanitized_and_stamped() {
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        let name = document_filename("Lot 7 / Phase 2", DocKind::Report, at);
        assert_eq!(name, "Lot_7_Phase_2_report_20260314_092653.pdf");
    }

    #[test]
    fn empty_project_name_falls_back() {
        assert_eq!(sanitize_filename_part("  ///  "), "document");
    }

    #[test]
    fn listener_registration_is_idempotent() {
        let registry = SaveListenerRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let count = count.clone();
            registry.register(
                "session-1",
                Box::new(move |_, _| {
                    count.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        registry.notify(b"bytes", "file.pdf");
        assert_eq!(count.load(Ordering::SeqCst), 1, "only one listener per id");
        registry.unregister("session-1");
        registry.unregister("session-1");
        assert!(registry.is_empty());
    }

    #[test]
    fn panicking_listener_does_not_poison_generation() {
        let renderer = DocumentRenderer::new();
        renderer
            .listeners()
            .register("bad", Box::new(|_, _| panic!("listener exploded")));
        let seen = Arc::new(AtomicUsize::new(0));
        {
            let seen = seen.clone();
            renderer.listeners().register(
                "good",
                Box::new(move |bytes, _| {
                    assert!(!bytes.is_empty());
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }

        let doc = renderer
            .generate(&content(), DocKind::SignOff, &MarkState::new(), None)
            .unwrap();
        assert!(doc.bytes.starts_with(b"%PDF-1.7"));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn generation_bytes_are_timestamp_independent() {
        let renderer = DocumentRenderer::new();
        let a = renderer
            .generate_at(
                &content(),
                DocKind::Report,
                &MarkState::new(),
                None,
                Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            )
            .unwrap();
        let b = renderer
            .generate_at(
                &content(),
                DocKind::Report,
                &MarkState::new(),
                None,
                Utc.with_ymd_and_hms(2026, 6, 30, 12, 0, 0).unwrap(),
            )
            .unwrap();
        assert_eq!(a.bytes, b.bytes);
        assert_ne!(a.filename, b.filename);
    }
}
