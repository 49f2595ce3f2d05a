//! # Annotation Capture
//!
//! An explicit finite-state machine over pointer events. At any instant
//! the surface is doing exactly one of: nothing, inking, erasing, or
//! panning. Entering panning always finalizes the in-progress stroke, so
//! a second finger never discards drawn ink.
//!
//! Strokes accumulate in capture-surface pixel space and the log is
//! append-only: re-rendering at a new size replays the whole log onto a
//! fresh transparent surface instead of scaling a stale rasterization.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tiny_skia::{
    BlendMode, Color as SkColor, LineCap, Paint, PathBuilder, Pixmap, Stroke as SkStroke,
    Transform,
};

use crate::error::Error;

/// Ink stroke width on the live overlay, in capture pixels.
pub const INK_WIDTH: f32 = 2.0;
/// Erase stroke width on the live overlay, in capture pixels.
pub const ERASE_WIDTH: f32 = 16.0;

/// Points closer than this to the previous point are dropped, keeping
/// stroke logs compact without visibly changing the path.
const MIN_POINT_DISTANCE: f64 = 2.0;

/// A point on the capture surface, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapturePoint {
    pub x: f64,
    pub y: f64,
}

impl CapturePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn distance(&self, other: &CapturePoint) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Whether a stroke lays ink down or lifts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StrokeKind {
    Ink,
    Erase,
}

/// One committed stroke: the points of a single continuous
/// pointer-down-to-up interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stroke {
    pub kind: StrokeKind,
    pub points: Vec<CapturePoint>,
}

/// The append-only stroke log. Strokes are never mutated in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrokeLog {
    strokes: Vec<Stroke>,
}

impl StrokeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stroke: Stroke) {
        self.strokes.push(stroke);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stroke> {
        self.strokes.iter()
    }

    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    /// Replay the whole log onto a fresh transparent overlay of the given
    /// size, scaling every point by `scale`. Erase strokes clear the
    /// overlay's own ink so the page underneath shows through.
    pub fn replay(&self, width: u32, height: u32, scale: f32) -> Result<Pixmap, Error> {
        let mut pixmap = Pixmap::new(width, height)
            .ok_or_else(|| Error::Surface(format!("empty overlay surface {width}x{height}")))?;

        for stroke in &self.strokes {
            if stroke.points.len() < 2 {
                continue;
            }
            let mut pb = PathBuilder::new();
            pb.move_to(
                (stroke.points[0].x as f32) * scale,
                (stroke.points[0].y as f32) * scale,
            );
            for p in &stroke.points[1..] {
                pb.line_to((p.x as f32) * scale, (p.y as f32) * scale);
            }
            let Some(path) = pb.finish() else { continue };

            let mut paint = Paint::default();
            paint.anti_alias = true;
            let sk_stroke = match stroke.kind {
                StrokeKind::Ink => {
                    paint.set_color(SkColor::from_rgba8(33, 33, 38, 255));
                    SkStroke {
                        width: INK_WIDTH * scale,
                        line_cap: LineCap::Round,
                        ..SkStroke::default()
                    }
                }
                StrokeKind::Erase => {
                    paint.set_color(SkColor::WHITE);
                    paint.blend_mode = BlendMode::Clear;
                    SkStroke {
                        width: ERASE_WIDTH * scale,
                        line_cap: LineCap::Round,
                        ..SkStroke::default()
                    }
                }
            };
            pixmap.stroke_path(&path, &paint, &sk_stroke, Transform::identity(), None);
        }
        Ok(pixmap)
    }
}

/// What produced a pointer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Pen,
    Mouse,
    Touch,
}

/// Events fed into the capture state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureEvent {
    PointerDown {
        id: u64,
        kind: PointerKind,
        x: f64,
        y: f64,
    },
    PointerMove {
        id: u64,
        x: f64,
        y: f64,
    },
    PointerUp {
        id: u64,
    },
    Wheel {
        delta: f64,
    },
}

/// The mutually exclusive capture phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GesturePhase {
    #[default]
    Idle,
    Inking,
    Erasing,
    Panning,
}

/// Side effects the host applies after each event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureEffect {
    /// Translate the container scroll position.
    Scroll { dx: f64, dy: f64 },
    /// A stroke was committed to the log.
    StrokeCommitted,
}

#[derive(Debug, Clone, Copy)]
struct ActivePointer {
    kind: PointerKind,
    x: f64,
    y: f64,
}

/// The capture surface state machine. Owns the stroke log for the
/// session; the host takes it (or a clone) when compositing.
#[derive(Debug, Default)]
pub struct AnnotationCapture {
    phase: GesturePhase,
    pointers: BTreeMap<u64, ActivePointer>,
    current: Option<Stroke>,
    drawing_pointer: Option<u64>,
    pan_centroid: Option<(f64, f64)>,
    log: StrokeLog,
}

impl AnnotationCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the log from persisted strokes (the host loads them alongside
    /// mark state).
    pub fn with_log(log: StrokeLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn phase(&self) -> GesturePhase {
        self.phase
    }

    pub fn log(&self) -> &StrokeLog {
        &self.log
    }

    pub fn into_log(self) -> StrokeLog {
        self.log
    }

    /// Feed one event through the machine, returning the effects the host
    /// should apply.
    pub fn handle(&mut self, event: GestureEvent) -> Vec<CaptureEffect> {
        match event {
            GestureEvent::PointerDown { id, kind, x, y } => self.pointer_down(id, kind, x, y),
            GestureEvent::PointerMove { id, x, y } => self.pointer_move(id, x, y),
            GestureEvent::PointerUp { id } => self.pointer_up(id),
            // Wheel always scrolls, whatever the phase; stroke state is
            // untouched.
            GestureEvent::Wheel { delta } => vec![CaptureEffect::Scroll { dx: 0.0, dy: delta }],
        }
    }

    fn touch_count(&self) -> usize {
        self.pointers
            .values()
            .filter(|p| p.kind == PointerKind::Touch)
            .count()
    }

    fn touch_centroid(&self) -> Option<(f64, f64)> {
        let touches: Vec<&ActivePointer> = self
            .pointers
            .values()
            .filter(|p| p.kind == PointerKind::Touch)
            .collect();
        if touches.is_empty() {
            return None;
        }
        let n = touches.len() as f64;
        Some((
            touches.iter().map(|p| p.x).sum::<f64>() / n,
            touches.iter().map(|p| p.y).sum::<f64>() / n,
        ))
    }

    fn pointer_down(&mut self, id: u64, kind: PointerKind, x: f64, y: f64) -> Vec<CaptureEffect> {
        let mut effects = Vec::new();
        self.pointers.insert(id, ActivePointer { kind, x, y });

        match kind {
            PointerKind::Touch => {
                if self.touch_count() >= 2 {
                    // Second finger: finalize whatever was being drawn,
                    // then pan. Nothing drawn so far is lost.
                    if self.commit_current(&mut effects) {
                        self.drawing_pointer = None;
                    }
                    self.phase = GesturePhase::Panning;
                    self.pan_centroid = self.touch_centroid();
                } else if matches!(
                    self.phase(),
                    GesturePhase::Idle | GesturePhase::Inking | GesturePhase::Erasing
                ) {
                    // First touch starts an erase stroke, ending any pen
                    // or mouse stroke in flight.
                    self.commit_current(&mut effects);
                    self.current = Some(Stroke {
                        kind: StrokeKind::Erase,
                        points: vec![CapturePoint::new(x, y)],
                    });
                    self.drawing_pointer = Some(id);
                    self.phase = GesturePhase::Erasing;
                }
            }
            PointerKind::Pen | PointerKind::Mouse => {
                if self.phase() == GesturePhase::Idle && self.pointers.len() == 1 {
                    self.current = Some(Stroke {
                        kind: StrokeKind::Ink,
                        points: vec![CapturePoint::new(x, y)],
                    });
                    self.drawing_pointer = Some(id);
                    self.phase = GesturePhase::Inking;
                }
                // A second drawing pointer while one is active is
                // ignored: deliberately undefined in the legacy surface.
            }
        }
        effects
    }

    fn pointer_move(&mut self, id: u64, x: f64, y: f64) -> Vec<CaptureEffect> {
        let mut effects = Vec::new();
        let Some(pointer) = self.pointers.get_mut(&id) else {
            // Unknown pointer: nothing to update.
            return effects;
        };
        pointer.x = x;
        pointer.y = y;

        match self.phase() {
            GesturePhase::Inking | GesturePhase::Erasing => {
                if self.drawing_pointer == Some(id) {
                    if let Some(stroke) = &mut self.current {
                        let point = CapturePoint::new(x, y);
                        let far_enough = stroke
                            .points
                            .last()
                            .map(|last| last.distance(&point) > MIN_POINT_DISTANCE)
                            .unwrap_or(true);
                        if far_enough {
                            stroke.points.push(point);
                        }
                    }
                }
            }
            GesturePhase::Panning => {
                if let (Some((ox, oy)), Some((nx, ny))) =
                    (self.pan_centroid, self.touch_centroid())
                {
                    let (dx, dy) = (nx - ox, ny - oy);
                    if dx != 0.0 || dy != 0.0 {
                        effects.push(CaptureEffect::Scroll { dx, dy });
                    }
                    self.pan_centroid = Some((nx, ny));
                }
            }
            GesturePhase::Idle => {}
        }
        effects
    }

    fn pointer_up(&mut self, id: u64) -> Vec<CaptureEffect> {
        let mut effects = Vec::new();
        // Unknown ids are cleared defensively; state is re-evaluated
        // below either way.
        self.pointers.remove(&id);

        match self.phase() {
            GesturePhase::Inking | GesturePhase::Erasing => {
                if self.drawing_pointer == Some(id) {
                    self.commit_current(&mut effects);
                    self.drawing_pointer = None;
                    self.phase = GesturePhase::Idle;
                }
            }
            GesturePhase::Panning => {
                if self.touch_count() < 2 {
                    // Panning never emits a stroke.
                    self.phase = GesturePhase::Idle;
                    self.pan_centroid = None;
                }
            }
            GesturePhase::Idle => {}
        }
        effects
    }

    /// Commit the in-progress stroke to the log. Single-point strokes
    /// drew nothing and are dropped. Returns whether a stroke existed.
    fn commit_current(&mut self, effects: &mut Vec<CaptureEffect>) -> bool {
        match self.current.take() {
            Some(stroke) => {
                if stroke.points.len() >= 2 {
                    self.log.push(stroke);
                    effects.push(CaptureEffect::StrokeCommitted);
                }
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn down(id: u64, kind: PointerKind, x: f64, y: f64) -> GestureEvent {
        GestureEvent::PointerDown { id, kind, x, y }
    }

    fn mv(id: u64, x: f64, y: f64) -> GestureEvent {
        GestureEvent::PointerMove { id, x, y }
    }

    fn up(id: u64) -> GestureEvent {
        GestureEvent::PointerUp { id }
    }

    #[test]
    fn pen_stroke_commits_on_release() {
        let mut cap = AnnotationCapture::new();
        cap.handle(down(1, PointerKind::Pen, 10.0, 10.0));
        assert_eq!(cap.phase(), GesturePhase::Inking);
        cap.handle(mv(1, 30.0, 30.0));
        cap.handle(mv(1, 60.0, 60.0));
        let effects = cap.handle(up(1));
        assert!(effects.contains(&CaptureEffect::StrokeCommitted));
        assert_eq!(cap.phase(), GesturePhase::Idle);
        assert_eq!(cap.log().len(), 1);
        assert_eq!(cap.log().iter().next().unwrap().kind, StrokeKind::Ink);
    }

    #[test]
    fn first_touch_erases() {
        let mut cap = AnnotationCapture::new();
        cap.handle(down(5, PointerKind::Touch, 0.0, 0.0));
        assert_eq!(cap.phase(), GesturePhase::Erasing);
        cap.handle(mv(5, 25.0, 25.0));
        cap.handle(up(5));
        assert_eq!(cap.log().iter().next().unwrap().kind, StrokeKind::Erase);
    }

    #[test]
    fn second_touch_commits_stroke_and_pans() {
        let mut cap = AnnotationCapture::new();
        cap.handle(down(1, PointerKind::Touch, 0.0, 0.0));
        cap.handle(mv(1, 40.0, 40.0));
        // Second finger lands mid-stroke: the erase stroke commits, the
        // machine pans, and no further points accumulate.
        let effects = cap.handle(down(2, PointerKind::Touch, 100.0, 100.0));
        assert!(effects.contains(&CaptureEffect::StrokeCommitted));
        assert_eq!(cap.phase(), GesturePhase::Panning);
        assert_eq!(cap.log().len(), 1);
        let committed_points = cap.log().iter().next().unwrap().points.len();

        let scroll = cap.handle(mv(1, 10.0, 20.0));
        assert!(matches!(scroll[0], CaptureEffect::Scroll { .. }));
        assert_eq!(cap.log().iter().next().unwrap().points.len(), committed_points);
    }

    #[test]
    fn pan_centroid_delta_becomes_scroll() {
        let mut cap = AnnotationCapture::new();
        cap.handle(down(1, PointerKind::Touch, 0.0, 0.0));
        cap.handle(down(2, PointerKind::Touch, 100.0, 0.0));
        // Move one finger by (20, 10): centroid moves by (10, 5).
        let effects = cap.handle(mv(1, 20.0, 10.0));
        assert_eq!(effects, vec![CaptureEffect::Scroll { dx: 10.0, dy: 5.0 }]);
    }

    #[test]
    fn panning_ends_below_two_touches_without_a_stroke() {
        let mut cap = AnnotationCapture::new();
        cap.handle(down(1, PointerKind::Touch, 0.0, 0.0));
        cap.handle(down(2, PointerKind::Touch, 50.0, 50.0));
        let before = cap.log().len();
        cap.handle(up(2));
        assert_eq!(cap.phase(), GesturePhase::Idle);
        assert_eq!(cap.log().len(), before);
    }

    #[test]
    fn wheel_scrolls_in_any_phase() {
        let mut cap = AnnotationCapture::new();
        assert_eq!(
            cap.handle(GestureEvent::Wheel { delta: 12.0 }),
            vec![CaptureEffect::Scroll { dx: 0.0, dy: 12.0 }]
        );
        cap.handle(down(1, PointerKind::Pen, 0.0, 0.0));
        cap.handle(mv(1, 10.0, 10.0));
        assert_eq!(
            cap.handle(GestureEvent::Wheel { delta: -4.0 }),
            vec![CaptureEffect::Scroll { dx: 0.0, dy: -4.0 }]
        );
        // The stroke is still in flight and commits normally.
        let effects = cap.handle(up(1));
        assert!(effects.contains(&CaptureEffect::StrokeCommitted));
    }

    #[test]
    fn unknown_pointer_up_is_harmless() {
        let mut cap = AnnotationCapture::new();
        cap.handle(up(99));
        assert_eq!(cap.phase(), GesturePhase::Idle);
        cap.handle(down(1, PointerKind::Pen, 0.0, 0.0));
        cap.handle(up(99));
        assert_eq!(cap.phase(), GesturePhase::Inking);
    }

    #[test]
    fn second_drawing_pointer_is_ignored() {
        let mut cap = AnnotationCapture::new();
        cap.handle(down(1, PointerKind::Pen, 0.0, 0.0));
        cap.handle(down(2, PointerKind::Mouse, 50.0, 50.0));
        assert_eq!(cap.phase(), GesturePhase::Inking);
        cap.handle(mv(1, 30.0, 30.0));
        cap.handle(up(1));
        assert_eq!(cap.log().len(), 1);
    }

    #[test]
    fn nearby_points_are_coalesced() {
        let mut cap = AnnotationCapture::new();
        cap.handle(down(1, PointerKind::Pen, 0.0, 0.0));
        cap.handle(mv(1, 0.5, 0.5));
        cap.handle(mv(1, 1.0, 1.0));
        cap.handle(mv(1, 50.0, 50.0));
        cap.handle(up(1));
        let stroke = cap.log().iter().next().unwrap();
        assert_eq!(stroke.points.len(), 2);
    }

    #[test]
    fn replay_produces_a_surface_of_the_requested_size() {
        let mut log = StrokeLog::new();
        log.push(Stroke {
            kind: StrokeKind::Ink,
            points: vec![CapturePoint::new(5.0, 5.0), CapturePoint::new(90.0, 90.0)],
        });
        let pixmap = log.replay(100, 100, 1.0).unwrap();
        assert_eq!((pixmap.width(), pixmap.height()), (100, 100));
        // Something was drawn.
        assert!(pixmap.data().iter().any(|&b| b != 0));
    }

    #[test]
    fn log_round_trips_through_json() {
        let mut log = StrokeLog::new();
        log.push(Stroke {
            kind: StrokeKind::Erase,
            points: vec![CapturePoint::new(1.0, 2.0), CapturePoint::new(3.0, 4.0)],
        });
        let json = serde_json::to_string(&log).unwrap();
        let back: StrokeLog = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back.iter().next().unwrap().kind, StrokeKind::Erase);
    }
}
