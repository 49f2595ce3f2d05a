//! # Document Compositor
//!
//! Converts captured annotations into page-aligned overlays merged into
//! the final output. Two sources:
//!
//! - the **stroke log**, mapped segment-by-segment from scroll-space
//!   pixels into per-page document coordinates and drawn as vector
//!   strokes; segments that straddle a page boundary are dropped, and
//! - a **raster snapshot** of the whole scrollable annotation surface,
//!   sliced into one crop per page and composited over the page as an
//!   image.
//!
//! Both paths are deterministic: the same document and the same input
//! produce byte-identical output.

use tracing::debug;

use crate::error::Error;
use crate::layout::PAGE_WIDTH;
use crate::photo::{LoadedPhoto, PhotoPixels};

use super::capture::{StrokeKind, StrokeLog};

/// Ink overlay stroke width in document points.
pub const INK_OVERLAY_WIDTH: f64 = 1.2;
/// Erase overlay stroke width in document points. Erase burns in as a
/// wide fully-opaque clearing stroke.
pub const ERASE_OVERLAY_WIDTH: f64 = 10.0;

/// How the capture surface mapped onto the rendered pages, in
/// capture-surface pixels.
#[derive(Debug, Clone, Copy)]
pub struct CaptureGeometry {
    /// Width of the scroll container the pages were rendered into.
    pub container_width: f64,
    /// Height of one rendered page.
    pub page_height: f64,
    /// Vertical gap between consecutive pages.
    pub page_gap: f64,
}

impl CaptureGeometry {
    fn stride(&self) -> f64 {
        self.page_height + self.page_gap
    }
}

/// How to slice a flattened snapshot of the annotation surface, in CSS
/// pixels; `device_pixel_ratio` converts to snapshot pixels.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotLayout {
    pub page_height: f64,
    pub page_gap: f64,
    pub device_pixel_ratio: f64,
    /// Horizontal crop applied on each side to exclude margin chrome
    /// around the page content.
    pub content_offset: f64,
}

/// One burned-in stroke segment in document coordinates of its page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlaySegment {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub width: f64,
    pub erase: bool,
}

/// The annotation overlay for one page.
#[derive(Debug, Clone)]
pub enum PageOverlay {
    /// Nothing to burn in on this page.
    None,
    /// Vector stroke segments from the stroke log.
    Vector(Vec<OverlaySegment>),
    /// A raster slice of the annotation surface, drawn over the full
    /// page width.
    Raster(LoadedPhoto),
}

impl PageOverlay {
    pub fn is_none(&self) -> bool {
        matches!(self, PageOverlay::None)
    }
}

/// Map the stroke log into per-page vector overlays.
///
/// Each segment's endpoints are assigned a page via
/// `floor(y / (page_height + gap))`; segments whose endpoints land on
/// different pages cannot cross the boundary and are dropped. Coordinates
/// scale uniformly by page-width / container-width.
pub fn overlays_from_strokes(
    log: &StrokeLog,
    page_count: usize,
    geometry: &CaptureGeometry,
) -> Vec<PageOverlay> {
    let mut per_page: Vec<Vec<OverlaySegment>> = vec![Vec::new(); page_count];
    if geometry.container_width <= 0.0 || geometry.page_height <= 0.0 {
        return per_page.into_iter().map(|_| PageOverlay::None).collect();
    }

    let scale = PAGE_WIDTH / geometry.container_width;
    let stride = geometry.stride();
    let mut dropped = 0usize;

    for stroke in log.iter() {
        let (width, erase) = match stroke.kind {
            StrokeKind::Ink => (INK_OVERLAY_WIDTH, false),
            StrokeKind::Erase => (ERASE_OVERLAY_WIDTH, true),
        };
        for pair in stroke.points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let page_a = (a.y / stride).floor();
            let page_b = (b.y / stride).floor();
            if page_a != page_b {
                dropped += 1;
                continue;
            }
            if page_a < 0.0 || page_a as usize >= page_count {
                dropped += 1;
                continue;
            }
            let page = page_a as usize;
            let local = page_a * stride;
            per_page[page].push(OverlaySegment {
                x1: a.x * scale,
                y1: (a.y - local) * scale,
                x2: b.x * scale,
                y2: (b.y - local) * scale,
                width,
                erase,
            });
        }
    }

    if dropped > 0 {
        debug!(dropped, "dropped stroke segments straddling page boundaries");
    }

    per_page
        .into_iter()
        .map(|segments| {
            if segments.is_empty() {
                PageOverlay::None
            } else {
                PageOverlay::Vector(segments)
            }
        })
        .collect()
}

/// Slice a flattened snapshot of the annotation surface into one raster
/// overlay per page.
///
/// A snapshot that fails to decode is fatal for the compositing attempt:
/// there is no sensible partial output.
pub fn overlays_from_snapshot(
    snapshot: &[u8],
    page_count: usize,
    layout: &SnapshotLayout,
) -> Result<Vec<PageOverlay>, Error> {
    let dynamic = image::load_from_memory(snapshot)
        .map_err(|e| Error::ImageDecode(format!("annotation snapshot: {e}")))?;
    let rgba = dynamic.to_rgba8();
    let (snap_w, snap_h) = (rgba.width(), rgba.height());

    let dpr = layout.device_pixel_ratio.max(1.0);
    let page_h_dev = layout.page_height * dpr;
    let stride_dev = (layout.page_height + layout.page_gap) * dpr;
    let offset_dev = layout.content_offset * dpr;

    if page_h_dev < 1.0 {
        return Err(Error::Render("snapshot page height is zero".to_string()));
    }

    let crop_x = offset_dev.round().max(0.0) as u32;
    let crop_w = (snap_w as f64 - 2.0 * offset_dev).round().max(0.0) as u32;
    if crop_w == 0 || crop_x >= snap_w {
        return Err(Error::Render(
            "content crop offset leaves no snapshot width".to_string(),
        ));
    }
    let crop_w = crop_w.min(snap_w - crop_x);

    let mut overlays = Vec::with_capacity(page_count);
    for page in 0..page_count {
        let y0 = (page as f64 * stride_dev).round() as i64;
        let y1 = (page as f64 * stride_dev + page_h_dev).round() as i64;
        let y0 = y0.clamp(0, snap_h as i64) as u32;
        let y1 = y1.clamp(0, snap_h as i64) as u32;
        if y1 <= y0 {
            overlays.push(PageOverlay::None);
            continue;
        }

        let slice = image::imageops::crop_imm(&rgba, crop_x, y0, crop_w, y1 - y0).to_image();
        let n = (slice.width() * slice.height()) as usize;
        let mut rgb = Vec::with_capacity(n * 3);
        let mut alpha = Vec::with_capacity(n);
        let mut has_alpha = false;
        for pixel in slice.pixels() {
            rgb.extend_from_slice(&pixel.0[..3]);
            alpha.push(pixel[3]);
            if pixel[3] != 255 {
                has_alpha = true;
            }
        }
        overlays.push(PageOverlay::Raster(LoadedPhoto {
            pixels: PhotoPixels::Decoded {
                rgb,
                alpha: if has_alpha { Some(alpha) } else { None },
            },
            width_px: slice.width(),
            height_px: slice.height(),
        }));
    }
    Ok(overlays)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::capture::{CapturePoint, Stroke};

    fn geometry() -> CaptureGeometry {
        CaptureGeometry {
            container_width: 800.0,
            page_height: 1000.0,
            page_gap: 20.0,
        }
    }

    fn ink(points: Vec<(f64, f64)>) -> Stroke {
        Stroke {
            kind: StrokeKind::Ink,
            points: points
                .into_iter()
                .map(|(x, y)| CapturePoint::new(x, y))
                .collect(),
        }
    }

    #[test]
    fn segments_map_to_their_page_with_local_y() {
        let mut log = StrokeLog::new();
        // Entirely on page 1 (y in 1020..2040).
        log.push(ink(vec![(100.0, 1100.0), (200.0, 1200.0)]));
        let overlays = overlays_from_strokes(&log, 3, &geometry());

        assert!(overlays[0].is_none());
        assert!(overlays[2].is_none());
        let PageOverlay::Vector(segments) = &overlays[1] else {
            panic!("expected vector overlay on page 1");
        };
        assert_eq!(segments.len(), 1);
        let scale = PAGE_WIDTH / 800.0;
        assert!((segments[0].x1 - 100.0 * scale).abs() < 1e-9);
        assert!((segments[0].y1 - (1100.0 - 1020.0) * scale).abs() < 1e-9);
    }

    #[test]
    fn boundary_straddling_segments_are_dropped() {
        let mut log = StrokeLog::new();
        // First segment inside page 0, second crosses into page 1.
        log.push(ink(vec![(0.0, 900.0), (0.0, 1000.0), (0.0, 1100.0)]));
        let overlays = overlays_from_strokes(&log, 2, &geometry());
        let PageOverlay::Vector(segments) = &overlays[0] else {
            panic!("expected vector overlay on page 0");
        };
        assert_eq!(segments.len(), 1, "crossing segment must be dropped");
        assert!(overlays[1].is_none());
    }

    #[test]
    fn erase_strokes_burn_wide() {
        let mut log = StrokeLog::new();
        log.push(Stroke {
            kind: StrokeKind::Erase,
            points: vec![CapturePoint::new(0.0, 10.0), CapturePoint::new(50.0, 10.0)],
        });
        let overlays = overlays_from_strokes(&log, 1, &geometry());
        let PageOverlay::Vector(segments) = &overlays[0] else {
            panic!()
        };
        assert!(segments[0].erase);
        assert!((segments[0].width - ERASE_OVERLAY_WIDTH).abs() < 1e-9);
    }

    #[test]
    fn x_positions_are_preserved_proportionally() {
        // A point at screen x on an 800px surface must land within 1% of
        // (x/800) * page width.
        let mut log = StrokeLog::new();
        log.push(ink(vec![(640.0, 10.0), (640.0, 100.0)]));
        let overlays = overlays_from_strokes(&log, 1, &geometry());
        let PageOverlay::Vector(segments) = &overlays[0] else {
            panic!()
        };
        let expected = 640.0 / 800.0 * PAGE_WIDTH;
        assert!((segments[0].x1 - expected).abs() / expected < 0.01);
    }

    #[test]
    fn mapping_is_deterministic() {
        let mut log = StrokeLog::new();
        log.push(ink(vec![(10.0, 10.0), (700.0, 900.0), (300.0, 1500.0)]));
        let a = overlays_from_strokes(&log, 2, &geometry());
        let b = overlays_from_strokes(&log, 2, &geometry());
        for (oa, ob) in a.iter().zip(b.iter()) {
            match (oa, ob) {
                (PageOverlay::Vector(sa), PageOverlay::Vector(sb)) => assert_eq!(sa, sb),
                (PageOverlay::None, PageOverlay::None) => {}
                _ => panic!("overlay shapes differ between runs"),
            }
        }
    }

    #[test]
    fn snapshot_slices_per_page() {
        // 100 wide, two "pages" of 40px with a 10px gap, 10px chrome on
        // each side.
        let png = crate::photo::test_png_bytes(100, 90, [10, 20, 30, 255]);
        let layout = SnapshotLayout {
            page_height: 40.0,
            page_gap: 10.0,
            device_pixel_ratio: 1.0,
            content_offset: 10.0,
        };
        let overlays = overlays_from_snapshot(&png, 2, &layout).unwrap();
        assert_eq!(overlays.len(), 2);
        for overlay in &overlays {
            let PageOverlay::Raster(photo) = overlay else {
                panic!("expected raster overlay");
            };
            assert_eq!(photo.width_px, 80);
            assert_eq!(photo.height_px, 40);
        }
    }

    #[test]
    fn undecodable_snapshot_is_fatal() {
        let layout = SnapshotLayout {
            page_height: 40.0,
            page_gap: 0.0,
            device_pixel_ratio: 1.0,
            content_offset: 0.0,
        };
        let err = overlays_from_snapshot(&[1, 2, 3, 4], 1, &layout);
        assert!(matches!(err, Err(Error::ImageDecode(_))));
    }
}
