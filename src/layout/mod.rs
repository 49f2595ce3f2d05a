//! # Page-Aware Layout Engine
//!
//! The heart of the crate. Content never gets laid out on an infinite
//! canvas and sliced afterwards; every placement decision is made with the
//! page boundary as a hard constraint:
//!
//! 1. Open a page with known content bounds and a vertical cursor
//! 2. Before placing a block, ask: "does this fit?"
//! 3. If it fits: place it, advance the cursor
//! 4. If not: start a new page and place it there
//!
//! The one refinement is the issue row. Its description and checkbox are
//! atomic, never split across a page break, but the trailing photo
//! grid flows row-by-row, each row of up to four tiles checked against the
//! remaining space before it is placed.
//!
//! Layout is a pure function of the content: same input, same pages, same
//! hit regions. Marks and strokes are burned in later by the renderer and
//! compositor; they never feed back into layout.

pub mod metrics;

use tracing::warn;

use crate::model::{ordered_locations, DocKind, InspectionContent, Issue};
use crate::photo::{load_photo, LoadedPhoto};
use crate::regions::{
    checkbox_region_id, photo_region_id, HitRegion, HitRegionRegistry, Rect, RegionKind,
};
use metrics::FontMetrics;

/// Page size in points (A4 portrait).
pub const PAGE_WIDTH: f64 = 595.28;
pub const PAGE_HEIGHT: f64 = 841.89;

/// Outer page margin.
pub const MARGIN: f64 = 40.0;

/// Height reserved for the header band (title + logo) and footer band
/// (page number) on every page.
pub const HEADER_BAND: f64 = 48.0;
pub const FOOTER_BAND: f64 = 24.0;

/// Horizontal content bounds.
pub const CONTENT_X: f64 = MARGIN;
pub const CONTENT_WIDTH: f64 = PAGE_WIDTH - MARGIN * 2.0;

const BODY_FONT: f64 = 10.0;
const BODY_LINE: f64 = 14.0;
const SECTION_FONT: f64 = 13.0;
const SECTION_BLOCK: f64 = 26.0;
const CARD_FONT: f64 = 10.0;
const CARD_LINE: f64 = 15.0;
const CARD_PADDING: f64 = 12.0;

/// Checkbox glyph box and the column it occupies left of the description.
pub const CHECKBOX_SIZE: f64 = 12.0;
const CHECKBOX_COLUMN: f64 = 24.0;

/// Photo grid: fixed tiles, four per row.
pub const PHOTOS_PER_ROW: usize = 4;
pub const PHOTO_TILE: f64 = 118.0;
const PHOTO_GAP: f64 = 8.0;
const CAPTION_HEIGHT: f64 = 12.0;
const CAPTION_FONT: f64 = 8.0;

const ISSUE_GAP: f64 = 10.0;

/// An RGB color, components in 0..=1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Color {
    pub const fn rgb(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const INK: Color = Color::rgb(0.13, 0.13, 0.15);
    pub const RULE: Color = Color::rgb(0.75, 0.75, 0.78);
    pub const CARD_BG: Color = Color::rgb(0.955, 0.955, 0.965);
    pub const MUTED: Color = Color::rgb(0.45, 0.45, 0.5);
}

/// One positioned line of text. `y` is the top of the line box; the
/// drawing backends place the baseline at `y + font_size`.
#[derive(Debug, Clone)]
pub struct TextLine {
    pub x: f64,
    pub y: f64,
    pub text: String,
    pub width: f64,
}

/// What to draw for an element.
#[derive(Debug, Clone)]
pub enum DrawCommand {
    /// A rectangle: optional fill, optional stroke.
    Rect {
        fill: Option<Color>,
        stroke: Option<Color>,
        stroke_width: f64,
        corner_radius: f64,
    },
    /// One or more lines of text in a single face/size.
    Text {
        lines: Vec<TextLine>,
        font_size: f64,
        bold: bool,
        color: Color,
    },
    /// A straight line from the element origin to (x2, y2).
    Line {
        x2: f64,
        y2: f64,
        width: f64,
        color: Color,
    },
    /// A decoded photo, aspect-fit inside the element rect.
    Photo { photo: LoadedPhoto },
    /// Grey placeholder tile for a photo that failed to decode.
    PhotoPlaceholder,
}

/// A positioned element on a page. Coordinates are top-left origin in
/// document points.
#[derive(Debug, Clone)]
pub struct LayoutElement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub draw: DrawCommand,
}

/// A fully laid-out page.
#[derive(Debug, Clone)]
pub struct LayoutPage {
    pub width: f64,
    pub height: f64,
    pub elements: Vec<LayoutElement>,
}

/// The output of one layout pass: pages plus the hit-region registry that
/// falls out of placing checkboxes and photo tiles.
#[derive(Debug, Clone)]
pub struct LayoutResult {
    pub pages: Vec<LayoutPage>,
    pub regions: HitRegionRegistry,
}

/// Tracks where we are on the current page during layout.
struct PageCursor {
    y: f64,
    elements: Vec<LayoutElement>,
}

impl PageCursor {
    fn new() -> Self {
        Self {
            y: MARGIN + HEADER_BAND,
            elements: Vec::new(),
        }
    }

    fn bound(&self) -> f64 {
        PAGE_HEIGHT - MARGIN - FOOTER_BAND
    }

    fn fits(&self, block_height: f64) -> bool {
        self.y + block_height <= self.bound()
    }

    fn finalize(self) -> LayoutPage {
        LayoutPage {
            width: PAGE_WIDTH,
            height: PAGE_HEIGHT,
            elements: self.elements,
        }
    }
}

/// The main layout engine.
pub struct LayoutEngine {
    metrics: FontMetrics,
}

impl Default for LayoutEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutEngine {
    pub fn new() -> Self {
        Self {
            metrics: FontMetrics::new(),
        }
    }

    /// Lay the content out into pages. Pure and deterministic; the hit
    /// regions are a byproduct of checkbox and photo placement.
    ///
    /// A document always has at least one page: a project with no
    /// findings still produces a titled sheet.
    pub fn layout(&self, content: &InspectionContent, kind: DocKind) -> LayoutResult {
        let mut pages: Vec<LayoutPage> = Vec::new();
        let mut regions = HitRegionRegistry::new();
        let mut cursor = PageCursor::new();

        self.place_project_card(content, &mut cursor);

        for location in ordered_locations(content) {
            self.place_section_header(&location.name, &mut cursor, &mut pages);
            for issue in &location.issues {
                self.place_issue(issue, &mut cursor, &mut pages, &mut regions);
            }
        }

        pages.push(cursor.finalize());
        self.inject_page_chrome(&mut pages, content, kind);

        LayoutResult { pages, regions }
    }

    /// The summary card: label/value fields, sized to the longest line
    /// plus padding, centered horizontally.
    fn place_project_card(&self, content: &InspectionContent, cursor: &mut PageCursor) {
        let mut card_lines: Vec<String> = Vec::new();
        card_lines.push(content.project_name.clone());
        for field in &content.fields {
            card_lines.push(format!("{}: {}", field.label, field.value));
        }
        if card_lines.len() == 1 && content.project_name.is_empty() {
            return;
        }

        let max_text = CONTENT_WIDTH - CARD_PADDING * 2.0;
        let mut wrapped: Vec<String> = Vec::new();
        for line in &card_lines {
            wrapped.extend(self.metrics.wrap(line, CARD_FONT, false, max_text));
        }

        let longest = wrapped
            .iter()
            .map(|l| self.metrics.measure(l, CARD_FONT, false))
            .fold(0.0, f64::max);
        let card_width = (longest + CARD_PADDING * 2.0).min(CONTENT_WIDTH);
        let card_height = wrapped.len() as f64 * CARD_LINE + CARD_PADDING * 2.0;
        let card_x = CONTENT_X + (CONTENT_WIDTH - card_width) / 2.0;
        let card_y = cursor.y;

        cursor.elements.push(LayoutElement {
            x: card_x,
            y: card_y,
            width: card_width,
            height: card_height,
            draw: DrawCommand::Rect {
                fill: Some(Color::CARD_BG),
                stroke: Some(Color::RULE),
                stroke_width: 0.75,
                corner_radius: 4.0,
            },
        });

        let lines: Vec<TextLine> = wrapped
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let width = self.metrics.measure(&text, CARD_FONT, false);
                TextLine {
                    x: card_x + CARD_PADDING,
                    y: card_y + CARD_PADDING + i as f64 * CARD_LINE,
                    text,
                    width,
                }
            })
            .collect();
        cursor.elements.push(LayoutElement {
            x: card_x + CARD_PADDING,
            y: card_y + CARD_PADDING,
            width: card_width - CARD_PADDING * 2.0,
            height: card_height - CARD_PADDING * 2.0,
            draw: DrawCommand::Text {
                lines,
                font_size: CARD_FONT,
                bold: false,
                color: Color::INK,
            },
        });

        cursor.y = card_y + card_height + ISSUE_GAP * 1.5;
    }

    /// A location heading: bold text over a hairline rule. Kept with at
    /// least one body line of the following issue so a heading never sits
    /// orphaned at a page bottom.
    fn place_section_header(
        &self,
        name: &str,
        cursor: &mut PageCursor,
        pages: &mut Vec<LayoutPage>,
    ) {
        if !cursor.fits(SECTION_BLOCK + BODY_LINE) {
            let full = std::mem::replace(cursor, PageCursor::new());
            pages.push(full.finalize());
        }

        let y = cursor.y;
        let width = self.metrics.measure(name, SECTION_FONT, true);
        cursor.elements.push(LayoutElement {
            x: CONTENT_X,
            y,
            width: CONTENT_WIDTH,
            height: SECTION_FONT + 4.0,
            draw: DrawCommand::Text {
                lines: vec![TextLine {
                    x: CONTENT_X,
                    y,
                    text: name.to_string(),
                    width,
                }],
                font_size: SECTION_FONT,
                bold: true,
                color: Color::BLACK,
            },
        });
        let rule_y = y + SECTION_FONT + 6.0;
        cursor.elements.push(LayoutElement {
            x: CONTENT_X,
            y: rule_y,
            width: CONTENT_WIDTH,
            height: 0.75,
            draw: DrawCommand::Line {
                x2: CONTENT_X + CONTENT_WIDTH,
                y2: rule_y,
                width: 0.75,
                color: Color::RULE,
            },
        });
        cursor.y = y + SECTION_BLOCK;
    }

    /// One issue: checkbox + wrapped description as an atomic block, then
    /// the photo grid flowing row-by-row.
    fn place_issue(
        &self,
        issue: &Issue,
        cursor: &mut PageCursor,
        pages: &mut Vec<LayoutPage>,
        regions: &mut HitRegionRegistry,
    ) {
        let text_x = CONTENT_X + CHECKBOX_COLUMN;
        let text_width = CONTENT_WIDTH - CHECKBOX_COLUMN;
        let desc_lines = self.metrics.wrap(&issue.description, BODY_FONT, false, text_width);
        let desc_height = (desc_lines.len() as f64 * BODY_LINE).max(CHECKBOX_SIZE + 2.0);

        if !cursor.fits(desc_height) {
            let full = std::mem::replace(cursor, PageCursor::new());
            pages.push(full.finalize());
        }

        let top = cursor.y;
        let page = pages.len();

        // Checkbox glyph box, first line height centered against it.
        let box_rect = Rect::new(CONTENT_X + 2.0, top + 1.0, CHECKBOX_SIZE, CHECKBOX_SIZE);
        cursor.elements.push(LayoutElement {
            x: box_rect.x,
            y: box_rect.y,
            width: box_rect.width,
            height: box_rect.height,
            draw: DrawCommand::Rect {
                fill: None,
                stroke: Some(Color::INK),
                stroke_width: 1.0,
                corner_radius: 2.0,
            },
        });

        let mut line_rects = Vec::with_capacity(desc_lines.len());
        let lines: Vec<TextLine> = desc_lines
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let width = self.metrics.measure(&text, BODY_FONT, false);
                let y = top + i as f64 * BODY_LINE;
                line_rects.push(Rect::new(text_x, y, width, BODY_LINE));
                TextLine { x: text_x, y, text, width }
            })
            .collect();
        cursor.elements.push(LayoutElement {
            x: text_x,
            y: top,
            width: text_width,
            height: desc_height,
            draw: DrawCommand::Text {
                lines,
                font_size: BODY_FONT,
                bold: false,
                color: Color::INK,
            },
        });

        regions.insert(HitRegion {
            id: checkbox_region_id(issue.id),
            page,
            rect: box_rect,
            kind: RegionKind::Checkbox,
            line_rects,
        });

        cursor.y = top + desc_height + 4.0;

        self.place_photo_grid(issue, cursor, pages, regions);
        cursor.y += ISSUE_GAP;
    }

    /// The photo grid: rows of up to four fixed-size tiles. Each row is
    /// checked against the remaining space before it is placed, so the
    /// grid may continue on a following page while the description stays
    /// where it was.
    fn place_photo_grid(
        &self,
        issue: &Issue,
        cursor: &mut PageCursor,
        pages: &mut Vec<LayoutPage>,
        regions: &mut HitRegionRegistry,
    ) {
        let grid_x = CONTENT_X + CHECKBOX_COLUMN;

        for (row_index, row) in issue.photos.chunks(PHOTOS_PER_ROW).enumerate() {
            let has_caption = row.iter().any(|p| p.caption.is_some());
            let row_height = PHOTO_TILE + if has_caption { CAPTION_HEIGHT } else { 0.0 };

            if !cursor.fits(row_height) {
                let full = std::mem::replace(cursor, PageCursor::new());
                pages.push(full.finalize());
            }

            let row_y = cursor.y;
            let page = pages.len();

            for (col, photo) in row.iter().enumerate() {
                let photo_index = row_index * PHOTOS_PER_ROW + col;
                let tile_x = grid_x + col as f64 * (PHOTO_TILE + PHOTO_GAP);
                let tile = Rect::new(tile_x, row_y, PHOTO_TILE, PHOTO_TILE);

                match load_photo(&photo.src) {
                    Ok(loaded) => {
                        let (w, h) = (loaded.width_px as f64, loaded.height_px as f64);
                        let scale = (PHOTO_TILE / w).min(PHOTO_TILE / h);
                        let (dw, dh) = (w * scale, h * scale);
                        cursor.elements.push(LayoutElement {
                            x: tile_x + (PHOTO_TILE - dw) / 2.0,
                            y: row_y + (PHOTO_TILE - dh) / 2.0,
                            width: dw,
                            height: dh,
                            draw: DrawCommand::Photo { photo: loaded },
                        });
                    }
                    Err(err) => {
                        warn!(src = %photo.src, %err, "skipping undecodable photo");
                        cursor.elements.push(LayoutElement {
                            x: tile_x,
                            y: row_y,
                            width: PHOTO_TILE,
                            height: PHOTO_TILE,
                            draw: DrawCommand::PhotoPlaceholder,
                        });
                    }
                }

                if let Some(caption) = &photo.caption {
                    let caption_width = self.metrics.measure(caption, CAPTION_FONT, false);
                    let cx = tile_x + (PHOTO_TILE - caption_width.min(PHOTO_TILE)) / 2.0;
                    cursor.elements.push(LayoutElement {
                        x: cx,
                        y: row_y + PHOTO_TILE + 2.0,
                        width: caption_width.min(PHOTO_TILE),
                        height: CAPTION_HEIGHT,
                        draw: DrawCommand::Text {
                            lines: vec![TextLine {
                                x: cx,
                                y: row_y + PHOTO_TILE + 2.0,
                                text: caption.clone(),
                                width: caption_width,
                            }],
                            font_size: CAPTION_FONT,
                            bold: false,
                            color: Color::MUTED,
                        },
                    });
                }

                // The whole tile is clickable, placeholder or not.
                regions.insert(HitRegion {
                    id: photo_region_id(issue.id, photo_index),
                    page,
                    rect: tile,
                    kind: RegionKind::Photo,
                    line_rects: vec![],
                });
            }

            cursor.y = row_y + row_height + PHOTO_GAP;
        }
    }

    /// Add the header band (title + optional logo) and footer band (page
    /// number) to every finished page. Runs after layout because the
    /// footer needs the final page count.
    fn inject_page_chrome(
        &self,
        pages: &mut [LayoutPage],
        content: &InspectionContent,
        kind: DocKind,
    ) {
        let total = pages.len();
        let logo = content.logo.as_deref().and_then(|src| match load_photo(src) {
            Ok(l) => Some(l),
            Err(err) => {
                warn!(%err, "branding logo failed to decode; header renders without it");
                None
            }
        });

        for (index, page) in pages.iter_mut().enumerate() {
            let title = format!("{} - {}", kind.title(), content.project_name);
            let title_width = self.metrics.measure(&title, SECTION_FONT, true);
            page.elements.push(LayoutElement {
                x: CONTENT_X,
                y: MARGIN,
                width: title_width,
                height: SECTION_FONT + 4.0,
                draw: DrawCommand::Text {
                    lines: vec![TextLine {
                        x: CONTENT_X,
                        y: MARGIN,
                        text: title,
                        width: title_width,
                    }],
                    font_size: SECTION_FONT,
                    bold: true,
                    color: Color::BLACK,
                },
            });

            if let Some(logo) = &logo {
                let max_h = HEADER_BAND - 16.0;
                let (w, h) = (logo.width_px as f64, logo.height_px as f64);
                let scale = (max_h / h).min(120.0 / w);
                let (dw, dh) = (w * scale, h * scale);
                page.elements.push(LayoutElement {
                    x: CONTENT_X + CONTENT_WIDTH - dw,
                    y: MARGIN,
                    width: dw,
                    height: dh,
                    draw: DrawCommand::Photo { photo: logo.clone() },
                });
            }

            let rule_y = MARGIN + HEADER_BAND - 10.0;
            page.elements.push(LayoutElement {
                x: CONTENT_X,
                y: rule_y,
                width: CONTENT_WIDTH,
                height: 0.75,
                draw: DrawCommand::Line {
                    x2: CONTENT_X + CONTENT_WIDTH,
                    y2: rule_y,
                    width: 0.75,
                    color: Color::RULE,
                },
            });

            let footer = format!("Page {} of {}", index + 1, total);
            let footer_width = self.metrics.measure(&footer, CAPTION_FONT, false);
            let footer_x = CONTENT_X + (CONTENT_WIDTH - footer_width) / 2.0;
            let footer_y = PAGE_HEIGHT - MARGIN - CAPTION_FONT - 2.0;
            page.elements.push(LayoutElement {
                x: footer_x,
                y: footer_y,
                width: footer_width,
                height: CAPTION_HEIGHT,
                draw: DrawCommand::Text {
                    lines: vec![TextLine {
                        x: footer_x,
                        y: footer_y,
                        text: footer,
                        width: footer_width,
                    }],
                    font_size: CAPTION_FONT,
                    bold: false,
                    color: Color::MUTED,
                },
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LabeledField, Location, Photo};

    fn issue(id: u64, description: &str, photo_count: usize) -> Issue {
        Issue {
            id,
            description: description.to_string(),
            photos: (0..photo_count)
                .map(|i| Photo {
                    src: format!("not-an-image-{i}"),
                    caption: None,
                })
                .collect(),
        }
    }

    fn content_with(locations: Vec<Location>) -> InspectionContent {
        InspectionContent {
            project_name: "Lot 12".to_string(),
            fields: vec![LabeledField {
                label: "Owner".to_string(),
                value: "Smith".to_string(),
            }],
            locations,
            logo: None,
        }
    }

    fn layout(content: &InspectionContent) -> LayoutResult {
        LayoutEngine::new().layout(content, DocKind::Report)
    }

    #[test]
    fn empty_content_still_produces_a_page() {
        let result = layout(&content_with(vec![]));
        assert_eq!(result.pages.len(), 1);
        assert!(result.regions.is_empty());
    }

    #[test]
    fn five_photos_split_four_then_one() {
        let content = content_with(vec![Location {
            id: 1,
            name: "Kitchen".to_string(),
            issues: vec![issue(10, "Scratched floor", 5)],
        }]);
        let result = layout(&content);

        let tiles: Vec<&HitRegion> = result
            .regions
            .iter()
            .filter(|r| r.kind == RegionKind::Photo)
            .collect();
        assert_eq!(tiles.len(), 5);

        // First four share a row y, the fifth sits below at the same x
        // as the first.
        let first_row_y = tiles[0].rect.y;
        for t in &tiles[..4] {
            assert!((t.rect.y - first_row_y).abs() < 0.001);
            assert!((t.rect.width - PHOTO_TILE).abs() < 0.001);
        }
        assert!(tiles[4].rect.y > first_row_y);
        assert!((tiles[4].rect.x - tiles[0].rect.x).abs() < 0.001);
    }

    #[test]
    fn issue_description_never_splits_across_pages() {
        // Enough issues to overflow several pages; every checkbox region's
        // line rects must share that region's page.
        let issues: Vec<Issue> = (0..60)
            .map(|i| issue(i, "A fairly long description that wraps onto multiple lines when measured against the content width of the page, repeated to add height.", 0))
            .collect();
        let content = content_with(vec![Location {
            id: 1,
            name: "Everywhere".to_string(),
            issues,
        }]);
        let result = layout(&content);
        assert!(result.pages.len() > 1, "should paginate");

        for region in result.regions.iter() {
            if region.kind != RegionKind::Checkbox {
                continue;
            }
            let bound = PAGE_HEIGHT - MARGIN - FOOTER_BAND;
            for rect in &region.line_rects {
                assert!(
                    rect.y + rect.height <= bound + 0.001,
                    "description line leaked past the page bound"
                );
            }
            // All lines belong to one page: they were placed with the
            // checkbox, above the bound, after a single fit check.
            assert!(region.rect.y >= MARGIN);
        }
    }

    #[test]
    fn photo_rows_flow_to_next_page_when_needed() {
        // One issue with many photos: rows must wrap pages, tiles keep
        // their size everywhere.
        let content = content_with(vec![Location {
            id: 1,
            name: "Exterior".to_string(),
            issues: vec![issue(1, "Siding damage all around", 30)],
        }]);
        let result = layout(&content);
        assert!(result.pages.len() > 1);

        let pages_used: std::collections::BTreeSet<usize> = result
            .regions
            .iter()
            .filter(|r| r.kind == RegionKind::Photo)
            .map(|r| r.page)
            .collect();
        assert!(pages_used.len() > 1, "photo rows should span pages");
        for r in result.regions.iter().filter(|r| r.kind == RegionKind::Photo) {
            assert!((r.rect.width - PHOTO_TILE).abs() < 0.001);
            assert!((r.rect.height - PHOTO_TILE).abs() < 0.001);
        }
    }

    #[test]
    fn region_ids_are_stable_across_regenerations() {
        let content = content_with(vec![Location {
            id: 1,
            name: "Kitchen".to_string(),
            issues: vec![issue(42, "Chipped tile", 2)],
        }]);
        let first = layout(&content);
        let second = layout(&content);
        let ids_a: Vec<&str> = first.regions.iter().map(|r| r.id.as_str()).collect();
        let ids_b: Vec<&str> = second.regions.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
        assert!(ids_a.contains(&"issue-42"));
        assert!(ids_a.contains(&"issue-42-photo-1"));
    }

    #[test]
    fn chrome_lands_on_every_page() {
        let issues: Vec<Issue> = (0..80).map(|i| issue(i, "short issue text", 0)).collect();
        let content = content_with(vec![Location {
            id: 1,
            name: "All".to_string(),
            issues,
        }]);
        let result = layout(&content);
        let total = result.pages.len();
        assert!(total > 1);
        for (i, page) in result.pages.iter().enumerate() {
            let footer = format!("Page {} of {}", i + 1, total);
            let found = page.elements.iter().any(|el| match &el.draw {
                DrawCommand::Text { lines, .. } => lines.iter().any(|l| l.text == footer),
                _ => false,
            });
            assert!(found, "page {i} missing footer");
        }
    }
}
