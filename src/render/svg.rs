//! # Page Preview Rasterization
//!
//! Each laid-out page is composed as an SVG document (text, rules,
//! cards, embedded photos as data URIs, plus mark-state effects) and
//! rasterized with resvg onto a tiny-skia pixmap. Pages are independent,
//! which is what lets the preview driver rasterize them in any order.

use tiny_skia::Pixmap;
use tracing::warn;
use usvg::{fontdb, Options, Tree};

use crate::error::Error;
use crate::layout::{Color, DrawCommand, LayoutPage};
use crate::regions::{is_marked, HitRegionRegistry, MarkState, RegionKind};

fn svg_color(c: Color) -> String {
    format!(
        "rgb({},{},{})",
        (c.r * 255.0).round() as u8,
        (c.g * 255.0).round() as u8,
        (c.b * 255.0).round() as u8
    )
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Compose one page as an SVG document, marks burned in.
pub fn page_to_svg(page: &LayoutPage, regions: &HitRegionRegistry, marks: &MarkState, page_index: usize) -> String {
    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = page.width,
        h = page.height
    ));
    svg.push_str(&format!(
        r##"<rect x="0" y="0" width="{}" height="{}" fill="#ffffff"/>"##,
        page.width, page.height
    ));

    for element in &page.elements {
        match &element.draw {
            DrawCommand::Rect {
                fill,
                stroke,
                stroke_width,
                corner_radius,
            } => {
                let fill_attr = fill
                    .map(|c| svg_color(c))
                    .unwrap_or_else(|| "none".to_string());
                let stroke_attr = match stroke {
                    Some(c) => format!(
                        r#" stroke="{}" stroke-width="{}""#,
                        svg_color(*c),
                        stroke_width
                    ),
                    None => String::new(),
                };
                svg.push_str(&format!(
                    r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" rx="{:.2}" fill="{}"{}/>"#,
                    element.x,
                    element.y,
                    element.width,
                    element.height,
                    corner_radius,
                    fill_attr,
                    stroke_attr
                ));
            }

            DrawCommand::Text {
                lines,
                font_size,
                bold,
                color,
            } => {
                let weight = if *bold { " font-weight=\"bold\"" } else { "" };
                for line in lines {
                    svg.push_str(&format!(
                        r#"<text x="{:.2}" y="{:.2}" font-family="Helvetica, Arial, sans-serif" font-size="{}"{} fill="{}">{}</text>"#,
                        line.x,
                        line.y + font_size,
                        font_size,
                        weight,
                        svg_color(*color),
                        escape_xml(&line.text)
                    ));
                }
            }

            DrawCommand::Line {
                x2,
                y2,
                width,
                color,
            } => {
                svg.push_str(&format!(
                    r#"<line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" stroke="{}" stroke-width="{}"/>"#,
                    element.x,
                    element.y,
                    x2,
                    y2,
                    svg_color(*color),
                    width
                ));
            }

            DrawCommand::Photo { photo } => match photo.data_uri() {
                Ok(uri) => {
                    svg.push_str(&format!(
                        r#"<image href="{uri}" xlink:href="{uri}" x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" preserveAspectRatio="none"/>"#,
                        element.x, element.y, element.width, element.height
                    ));
                }
                Err(err) => {
                    warn!(%err, "photo could not be embedded in preview; drawing placeholder");
                    svg.push_str(&format!(
                        r##"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="#e5e5e5"/>"##,
                        element.x, element.y, element.width, element.height
                    ));
                }
            },

            DrawCommand::PhotoPlaceholder => {
                svg.push_str(&format!(
                    r##"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="#e5e5e5"/>"##,
                    element.x, element.y, element.width, element.height
                ));
            }
        }
    }

    write_mark_effects(&mut svg, regions, marks, page_index);
    svg.push_str("</svg>");
    svg
}

/// Check glyphs, strikethroughs, and photo crosses for the current marks.
fn write_mark_effects(
    svg: &mut String,
    regions: &HitRegionRegistry,
    marks: &MarkState,
    page_index: usize,
) {
    for region in regions.on_page(page_index) {
        if !is_marked(region, marks) {
            continue;
        }
        let r = region.rect;
        match region.kind {
            RegionKind::Checkbox => {
                svg.push_str(&format!(
                    r##"<polyline points="{:.2},{:.2} {:.2},{:.2} {:.2},{:.2}" fill="none" stroke="#1a7333" stroke-width="1.4" stroke-linecap="round"/>"##,
                    r.x + r.width * 0.2,
                    r.y + r.height * 0.55,
                    r.x + r.width * 0.45,
                    r.y + r.height * 0.8,
                    r.x + r.width * 0.85,
                    r.y + r.height * 0.2,
                ));
                for line in &region.line_rects {
                    let y = line.y + line.height * 0.55;
                    svg.push_str(&format!(
                        r##"<line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" stroke="#212126" stroke-width="0.9"/>"##,
                        line.x,
                        y,
                        line.x + line.width,
                        y
                    ));
                }
            }
            RegionKind::Photo => {
                svg.push_str(&format!(
                    r##"<line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" stroke="#bf1f1f" stroke-width="2"/><line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" stroke="#bf1f1f" stroke-width="2"/>"##,
                    r.x,
                    r.y,
                    r.x + r.width,
                    r.y + r.height,
                    r.x + r.width,
                    r.y,
                    r.x,
                    r.y + r.height,
                ));
            }
        }
    }
}

/// Rasterize an SVG document at the given scale.
pub fn rasterize_svg(svg: &str, scale: f32) -> Result<Pixmap, Error> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    let options = Options {
        fontdb: std::sync::Arc::new(db),
        ..Options::default()
    };
    let tree = Tree::from_str(svg, &options)
        .map_err(|e| Error::Surface(format!("SVG parse failed: {e}")))?;
    let size = tree.size();
    let width = (size.width() * scale).ceil() as u32;
    let height = (size.height() * scale).ceil() as u32;
    let mut pixmap = Pixmap::new(width.max(1), height.max(1))
        .ok_or_else(|| Error::Surface(format!("empty raster surface {width}x{height}")))?;
    resvg::render(
        &tree,
        tiny_skia::Transform::from_scale(scale, scale),
        &mut pixmap.as_mut(),
    );
    Ok(pixmap)
}

/// Rasterize one page to PNG bytes for the preview.
pub fn render_page_png(
    page: &LayoutPage,
    regions: &HitRegionRegistry,
    marks: &MarkState,
    page_index: usize,
    scale: f32,
) -> Result<Vec<u8>, Error> {
    let svg = page_to_svg(page, regions, marks, page_index);
    let pixmap = rasterize_svg(&svg, scale)?;
    pixmap
        .encode_png()
        .map_err(|e| Error::Render(format!("PNG encode failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{LayoutElement, TextLine, PAGE_HEIGHT, PAGE_WIDTH};

    fn text_page() -> LayoutPage {
        LayoutPage {
            width: PAGE_WIDTH,
            height: PAGE_HEIGHT,
            elements: vec![LayoutElement {
                x: 40.0,
                y: 40.0,
                width: 200.0,
                height: 14.0,
                draw: DrawCommand::Text {
                    lines: vec![TextLine {
                        x: 40.0,
                        y: 40.0,
                        text: "Hello <World> & \"Friends\"".to_string(),
                        width: 150.0,
                    }],
                    font_size: 10.0,
                    bold: false,
                    color: Color::BLACK,
                },
            }],
        }
    }

    #[test]
    fn svg_escapes_markup_characters() {
        let svg = page_to_svg(
            &text_page(),
            &HitRegionRegistry::new(),
            &MarkState::new(),
            0,
        );
        assert!(svg.contains("Hello &lt;World&gt; &amp; &quot;Friends&quot;"));
        assert!(!svg.contains("<World>"));
    }

    #[test]
    fn rasterizes_to_scaled_pixmap() {
        let svg = page_to_svg(
            &text_page(),
            &HitRegionRegistry::new(),
            &MarkState::new(),
            0,
        );
        let pixmap = rasterize_svg(&svg, 2.0).unwrap();
        assert_eq!(pixmap.width(), (PAGE_WIDTH * 2.0).ceil() as u32);
        assert_eq!(pixmap.height(), (PAGE_HEIGHT * 2.0).ceil() as u32);
    }

    #[test]
    fn page_png_is_encodable() {
        let png = render_page_png(
            &text_page(),
            &HitRegionRegistry::new(),
            &MarkState::new(),
            0,
            1.0,
        )
        .unwrap();
        assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));
    }
}
