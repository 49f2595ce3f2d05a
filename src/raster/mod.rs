//! # Raster Annotation Editor
//!
//! A single-image markup tool, independent of the document subsystem:
//! vector tools (pen, arrow, circle, text) drawn into a full-resolution
//! pixel buffer, pinch-zoom/pan over it, and bounded undo/redo.
//!
//! The view transform only changes how the image is displayed; every
//! edit passes through its inverse before touching the buffer, so
//! strokes stay crisp at any zoom. Arrow and circle previews redraw from
//! a snapshot taken at pointer-down, which is what keeps a moving
//! preview from leaving trails behind it.

pub mod history;

use tiny_skia::{
    Color as SkColor, IntSize, LineCap, Paint, PathBuilder, Pixmap, Rect as SkRect,
    Stroke as SkStroke, Transform,
};

use crate::error::Error;
use crate::render::svg::rasterize_svg;
use history::SnapshotHistory;

/// Default bound on the snapshot history ring.
pub const DEFAULT_HISTORY_CAPACITY: usize = 15;

/// Zoom clamp range.
pub const MIN_ZOOM: f32 = 0.5;
pub const MAX_ZOOM: f32 = 8.0;

/// The active drawing tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RasterTool {
    #[default]
    Pen,
    Arrow,
    Circle,
    Text,
}

/// Zoom + pan mapping between screen space and buffer space:
/// `screen = buffer * zoom + pan`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    pub zoom: f32,
    pub pan_x: f32,
    pub pan_y: f32,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            pan_x: 0.0,
            pan_y: 0.0,
        }
    }
}

impl ViewTransform {
    pub fn is_identity(&self) -> bool {
        self.zoom == 1.0 && self.pan_x == 0.0 && self.pan_y == 0.0
    }

    /// Map a screen point into buffer coordinates (the inverse view
    /// transform).
    pub fn to_buffer(&self, screen_x: f32, screen_y: f32) -> (f32, f32) {
        (
            (screen_x - self.pan_x) / self.zoom,
            (screen_y - self.pan_y) / self.zoom,
        )
    }

    /// Map a buffer point onto the screen.
    pub fn to_screen(&self, buffer_x: f32, buffer_y: f32) -> (f32, f32) {
        (
            buffer_x * self.zoom + self.pan_x,
            buffer_y * self.zoom + self.pan_y,
        )
    }
}

struct DragState {
    start: (f32, f32),
    last: (f32, f32),
    /// Buffer contents at pointer-down; arrow/circle previews restore
    /// this before each redraw.
    pre_stroke: Pixmap,
    moved: bool,
}

#[derive(Debug, Clone, Copy)]
struct PinchState {
    start_distance: f32,
    start_zoom: f32,
    last_centroid: (f32, f32),
}

/// One image-editing session. Created per image, discarded on
/// save/cancel; loading a new image resets history, zoom, and pan.
pub struct RasterSession {
    buffer: Pixmap,
    history: SnapshotHistory,
    tool: RasterTool,
    view: ViewTransform,
    stroke_color: SkColor,
    stroke_width: f32,
    font_size: f32,
    drag: Option<DragState>,
    pinch: Option<PinchState>,
    text_anchor: Option<(f32, f32)>,
}

impl RasterSession {
    /// Decode an image into a fresh session.
    pub fn open(image_bytes: &[u8]) -> Result<Self, Error> {
        Self::with_capacity(image_bytes, DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_capacity(image_bytes: &[u8], history_capacity: usize) -> Result<Self, Error> {
        let buffer = decode_to_pixmap(image_bytes)?;
        let history = SnapshotHistory::new(history_capacity, buffer.clone());
        Ok(Self {
            buffer,
            history,
            tool: RasterTool::default(),
            view: ViewTransform::default(),
            stroke_color: SkColor::from_rgba8(214, 40, 40, 255),
            stroke_width: 3.0,
            font_size: 24.0,
            drag: None,
            pinch: None,
            text_anchor: None,
        })
    }

    /// Swap in a new image. History, zoom, and pan all reset; nothing
    /// leaks from the previous image.
    pub fn load(&mut self, image_bytes: &[u8]) -> Result<(), Error> {
        let buffer = decode_to_pixmap(image_bytes)?;
        self.history.reset(buffer.clone());
        self.buffer = buffer;
        self.view = ViewTransform::default();
        self.drag = None;
        self.pinch = None;
        self.text_anchor = None;
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn tool(&self) -> RasterTool {
        self.tool
    }

    pub fn set_tool(&mut self, tool: RasterTool) {
        self.tool = tool;
        self.text_anchor = None;
    }

    pub fn set_stroke_color(&mut self, r: u8, g: u8, b: u8) {
        self.stroke_color = SkColor::from_rgba8(r, g, b, 255);
    }

    pub fn set_stroke_width(&mut self, width: f32) {
        self.stroke_width = width.max(0.5);
    }

    pub fn set_font_size(&mut self, size: f32) {
        self.font_size = size.max(6.0);
    }

    pub fn view(&self) -> ViewTransform {
        self.view
    }

    pub fn history(&self) -> &SnapshotHistory {
        &self.history
    }

    /// Read access to the current pixels (for display).
    pub fn pixels(&self) -> &Pixmap {
        &self.buffer
    }

    // ── Single-pointer drawing ───────────────────────────────────

    /// Begin a stroke at a screen position.
    pub fn pointer_down(&mut self, screen_x: f32, screen_y: f32) {
        let point = self.view.to_buffer(screen_x, screen_y);
        match self.tool {
            RasterTool::Text => {
                // Click places the insertion point; commit_text draws.
                self.text_anchor = Some(point);
            }
            _ => {
                self.drag = Some(DragState {
                    start: point,
                    last: point,
                    pre_stroke: self.buffer.clone(),
                    moved: false,
                });
            }
        }
    }

    /// Extend the stroke in progress.
    pub fn pointer_move(&mut self, screen_x: f32, screen_y: f32) {
        let point = self.view.to_buffer(screen_x, screen_y);
        let Some(drag) = self.drag.as_mut() else {
            return;
        };
        drag.moved = true;

        match self.tool {
            RasterTool::Pen => {
                // Pen strokes segment-by-segment for live feedback.
                let from = drag.last;
                drag.last = point;
                stroke_segment(
                    &mut self.buffer,
                    from,
                    point,
                    self.stroke_color,
                    self.stroke_width,
                );
            }
            RasterTool::Arrow => {
                self.buffer = drag.pre_stroke.clone();
                let start = drag.start;
                drag.last = point;
                draw_arrow(
                    &mut self.buffer,
                    start,
                    point,
                    self.stroke_color,
                    self.stroke_width,
                );
            }
            RasterTool::Circle => {
                self.buffer = drag.pre_stroke.clone();
                let start = drag.start;
                drag.last = point;
                draw_ellipse(
                    &mut self.buffer,
                    start,
                    point,
                    self.stroke_color,
                    self.stroke_width,
                );
            }
            RasterTool::Text => {}
        }
    }

    /// Finish the stroke and commit a history snapshot.
    pub fn pointer_up(&mut self) {
        if let Some(drag) = self.drag.take() {
            if drag.moved {
                self.history.commit(self.buffer.clone());
            }
        }
    }

    /// Draw committed text at the insertion point: an outline stroke
    /// first, then the fill, so it reads over any background.
    pub fn commit_text(&mut self, text: &str) -> Result<(), Error> {
        let Some((x, y)) = self.text_anchor.take() else {
            return Ok(());
        };
        if text.trim().is_empty() {
            return Ok(());
        }

        let (w, h) = (self.buffer.width(), self.buffer.height());
        let fill = self.stroke_color;
        let svg = format!(
            concat!(
                r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
                r##"<text x="{x:.1}" y="{y:.1}" font-family="Helvetica, Arial, sans-serif" font-size="{size}" fill="none" stroke="#ffffff" stroke-width="3">{text}</text>"##,
                r#"<text x="{x:.1}" y="{y:.1}" font-family="Helvetica, Arial, sans-serif" font-size="{size}" fill="rgb({r},{g},{b})">{text}</text>"#,
                "</svg>"
            ),
            w = w,
            h = h,
            x = x,
            y = y,
            size = self.font_size,
            text = escape_xml(text),
            r = (fill.red() * 255.0).round() as u8,
            g = (fill.green() * 255.0).round() as u8,
            b = (fill.blue() * 255.0).round() as u8,
        );
        let overlay = rasterize_svg(&svg, 1.0)?;
        self.buffer.draw_pixmap(
            0,
            0,
            overlay.as_ref(),
            &tiny_skia::PixmapPaint::default(),
            Transform::identity(),
            None,
        );
        self.history.commit(self.buffer.clone());
        Ok(())
    }

    // ── Two-finger view gestures ─────────────────────────────────

    /// Two fingers down: start a pinch.
    pub fn pinch_start(&mut self, a: (f32, f32), b: (f32, f32)) {
        // A pinch never draws; cancel any stroke preview in flight.
        if let Some(drag) = self.drag.take() {
            if drag.moved && self.tool == RasterTool::Pen {
                // Pen ink already on the buffer stays; commit it.
                self.history.commit(self.buffer.clone());
            } else {
                self.buffer = drag.pre_stroke;
            }
        }
        self.pinch = Some(PinchState {
            start_distance: distance(a, b).max(1.0),
            start_zoom: self.view.zoom,
            last_centroid: midpoint(a, b),
        });
    }

    /// Finger movement: distance ratio drives zoom, centroid delta
    /// drives pan.
    pub fn pinch_move(&mut self, a: (f32, f32), b: (f32, f32)) {
        let Some(pinch) = self.pinch.as_mut() else {
            return;
        };
        let ratio = distance(a, b).max(1.0) / pinch.start_distance;
        self.view.zoom = (pinch.start_zoom * ratio).clamp(MIN_ZOOM, MAX_ZOOM);

        let centroid = midpoint(a, b);
        self.view.pan_x += centroid.0 - pinch.last_centroid.0;
        self.view.pan_y += centroid.1 - pinch.last_centroid.1;
        pinch.last_centroid = centroid;
    }

    pub fn pinch_end(&mut self) {
        self.pinch = None;
    }

    /// Double-tap resets the view to identity.
    pub fn double_tap(&mut self) {
        self.view = ViewTransform::default();
    }

    // ── History ──────────────────────────────────────────────────

    /// Restore the previous snapshot. Returns whether anything changed.
    pub fn undo(&mut self) -> bool {
        if let Some(snapshot) = self.history.undo() {
            self.buffer = snapshot.clone();
            true
        } else {
            false
        }
    }

    /// Restore the next snapshot. Returns whether anything changed.
    pub fn redo(&mut self) -> bool {
        if let Some(snapshot) = self.history.redo() {
            self.buffer = snapshot.clone();
            true
        } else {
            false
        }
    }

    /// Encode the current buffer as PNG for saving.
    pub fn export_png(&self) -> Result<Vec<u8>, Error> {
        self.buffer
            .encode_png()
            .map_err(|e| Error::Render(format!("PNG encode failed: {e}")))
    }
}

fn decode_to_pixmap(image_bytes: &[u8]) -> Result<Pixmap, Error> {
    let dynamic = image::load_from_memory(image_bytes)
        .map_err(|e| Error::ImageDecode(format!("editor image: {e}")))?;
    let rgba = dynamic.to_rgba8();
    let size = IntSize::from_wh(rgba.width(), rgba.height())
        .ok_or_else(|| Error::ImageDecode("zero-sized editor image".to_string()))?;
    Pixmap::from_vec(rgba.into_raw(), size)
        .ok_or_else(|| Error::Surface("could not build editor surface".to_string()))
}

fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

fn midpoint(a: (f32, f32), b: (f32, f32)) -> (f32, f32) {
    ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0)
}

fn stroke_paint(color: SkColor) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(color);
    paint.anti_alias = true;
    paint
}

fn stroke_segment(buffer: &mut Pixmap, from: (f32, f32), to: (f32, f32), color: SkColor, width: f32) {
    let mut pb = PathBuilder::new();
    pb.move_to(from.0, from.1);
    pb.line_to(to.0, to.1);
    let Some(path) = pb.finish() else { return };
    let stroke = SkStroke {
        width,
        line_cap: LineCap::Round,
        ..SkStroke::default()
    };
    buffer.stroke_path(&path, &stroke_paint(color), &stroke, Transform::identity(), None);
}

/// A straight shaft plus two barbs computed from the direction angle.
fn draw_arrow(buffer: &mut Pixmap, from: (f32, f32), to: (f32, f32), color: SkColor, width: f32) {
    let mut pb = PathBuilder::new();
    pb.move_to(from.0, from.1);
    pb.line_to(to.0, to.1);

    let angle = (to.1 - from.1).atan2(to.0 - from.0);
    let barb = (width * 4.0).max(12.0);
    let spread = std::f32::consts::FRAC_PI_6;
    for side in [-1.0f32, 1.0] {
        let theta = angle + std::f32::consts::PI - side * spread;
        pb.move_to(to.0, to.1);
        pb.line_to(to.0 + barb * theta.cos(), to.1 + barb * theta.sin());
    }

    let Some(path) = pb.finish() else { return };
    let stroke = SkStroke {
        width,
        line_cap: LineCap::Round,
        ..SkStroke::default()
    };
    buffer.stroke_path(&path, &stroke_paint(color), &stroke, Transform::identity(), None);
}

/// Ellipse inscribed in the drag bounding box.
fn draw_ellipse(buffer: &mut Pixmap, a: (f32, f32), b: (f32, f32), color: SkColor, width: f32) {
    let (left, right) = (a.0.min(b.0), a.0.max(b.0));
    let (top, bottom) = (a.1.min(b.1), a.1.max(b.1));
    let Some(rect) = SkRect::from_ltrb(left, top, right.max(left + 1.0), bottom.max(top + 1.0))
    else {
        return;
    };
    let Some(path) = PathBuilder::from_oval(rect) else {
        return;
    };
    let stroke = SkStroke {
        width,
        ..SkStroke::default()
    };
    buffer.stroke_path(&path, &stroke_paint(color), &stroke, Transform::identity(), None);
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
