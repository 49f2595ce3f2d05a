//! # PDF Serializer
//!
//! Writes laid-out pages, burned-in marks, and annotation overlays as a
//! valid PDF 1.7 byte stream. A from-scratch writer: the subset of the
//! PDF spec a report needs (pages, FlateDecode content streams, image
//! XObjects, the standard Helvetica faces) is small enough to own, and
//! owning it keeps the output byte-for-byte reproducible.
//!
//! ```text
//! %PDF-1.7            <- header
//! 1 0 obj ... endobj  <- objects (catalog, pages, fonts, streams, images)
//! ...
//! xref                <- byte offsets of each object
//! trailer             <- points at the catalog
//! %%EOF
//! ```
//!
//! No creation dates or ids are emitted: composing the same document with
//! the same annotations twice yields identical bytes.

use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;
use std::io::Write as IoWrite;

use miniz_oxide::deflate::compress_to_vec_zlib;

use crate::annotate::{OverlaySegment, PageOverlay};
use crate::error::Error;
use crate::layout::{Color, DrawCommand, LayoutElement, LayoutPage, TextLine};
use crate::photo::{LoadedPhoto, PhotoPixels};
use crate::regions::{is_marked, HitRegionRegistry, MarkState, RegionKind};

/// Document metadata embedded in the PDF Info dictionary.
#[derive(Debug, Clone, Default)]
pub struct PdfMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
}

const CHECK_COLOR: Color = Color::rgb(0.1, 0.45, 0.2);
const CROSS_COLOR: Color = Color::rgb(0.75, 0.12, 0.12);
const INK_COLOR: Color = Color::rgb(0.13, 0.13, 0.15);

pub struct PdfWriter;

struct PdfObject {
    data: Vec<u8>,
}

/// Tracks allocated PDF objects during writing.
struct PdfBuilder {
    objects: Vec<PdfObject>,
    /// XObject ids for page-content images, in encounter order; content
    /// streams reference them as /Im0, /Im1, ...
    image_objects: Vec<usize>,
    /// (page index, photo sequence within page) -> index into
    /// `image_objects`.
    image_index_map: BTreeMap<(usize, usize), usize>,
    /// Per-page overlay image XObject id, referenced as /Ov<page>.
    overlay_objects: BTreeMap<usize, usize>,
}

impl PdfWriter {
    pub fn new() -> Self {
        Self
    }

    /// Serialize pages plus mark burn-in and annotation overlays.
    ///
    /// `overlays` may be shorter than `pages`; missing entries mean no
    /// overlay for that page.
    pub fn write(
        &self,
        pages: &[LayoutPage],
        regions: &HitRegionRegistry,
        marks: &MarkState,
        overlays: &[PageOverlay],
        metadata: &PdfMetadata,
    ) -> Result<Vec<u8>, Error> {
        let mut builder = PdfBuilder {
            objects: Vec::new(),
            image_objects: Vec::new(),
            image_index_map: BTreeMap::new(),
            overlay_objects: BTreeMap::new(),
        };

        // Object ids: 0 placeholder (PDF objects are 1-indexed),
        // 1 catalog, 2 page tree, 3 Helvetica, 4 Helvetica-Bold.
        for _ in 0..3 {
            builder.objects.push(PdfObject { data: vec![] });
        }
        builder.objects.push(PdfObject {
            data: b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
                .to_vec(),
        });
        builder.objects.push(PdfObject {
            data: b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>"
                .to_vec(),
        });

        self.register_images(&mut builder, pages);
        self.register_overlays(&mut builder, overlays);

        let mut page_obj_ids: Vec<usize> = Vec::new();
        let no_overlay = PageOverlay::None;
        for (page_idx, page) in pages.iter().enumerate() {
            let overlay = overlays.get(page_idx).unwrap_or(&no_overlay);
            let content =
                self.build_content_stream(page, page_idx, &builder, regions, marks, overlay);
            let compressed = compress_to_vec_zlib(content.as_bytes(), 6);

            let content_obj_id = builder.objects.len();
            let mut content_data: Vec<u8> = Vec::new();
            let _ = write!(
                content_data,
                "<< /Length {} /Filter /FlateDecode >>\nstream\n",
                compressed.len()
            );
            content_data.extend_from_slice(&compressed);
            content_data.extend_from_slice(b"\nendstream");
            builder.objects.push(PdfObject { data: content_data });

            let page_obj_id = builder.objects.len();
            let xobjects = self.xobject_resources(page_idx, &builder);
            let resources = if xobjects.is_empty() {
                "/Font << /F0 3 0 R /F1 4 0 R >>".to_string()
            } else {
                format!("/Font << /F0 3 0 R /F1 4 0 R >> /XObject << {xobjects} >>")
            };
            let page_dict = format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {:.2} {:.2}] \
                 /Contents {} 0 R /Resources << {} >> >>",
                page.width, page.height, content_obj_id, resources
            );
            builder.objects.push(PdfObject {
                data: page_dict.into_bytes(),
            });
            page_obj_ids.push(page_obj_id);
        }

        builder.objects[1].data = b"<< /Type /Catalog /Pages 2 0 R >>".to_vec();
        let kids: String = page_obj_ids
            .iter()
            .map(|id| format!("{id} 0 R"))
            .collect::<Vec<_>>()
            .join(" ");
        builder.objects[2].data = format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids,
            page_obj_ids.len()
        )
        .into_bytes();

        let info_obj_id = if metadata.title.is_some() || metadata.author.is_some() {
            let id = builder.objects.len();
            let mut info = String::from("<< ");
            if let Some(title) = &metadata.title {
                let _ = write!(info, "/Title ({}) ", escape_pdf_string(title));
            }
            if let Some(author) = &metadata.author {
                let _ = write!(info, "/Author ({}) ", escape_pdf_string(author));
            }
            let _ = write!(info, "/Producer (punchlist) >>");
            builder.objects.push(PdfObject {
                data: info.into_bytes(),
            });
            Some(id)
        } else {
            None
        };

        Ok(self.serialize(&builder, info_obj_id))
    }

    /// Build the content stream for one page: layout elements, then mark
    /// burn-in, then the annotation overlay on top.
    fn build_content_stream(
        &self,
        page: &LayoutPage,
        page_idx: usize,
        builder: &PdfBuilder,
        regions: &HitRegionRegistry,
        marks: &MarkState,
        overlay: &PageOverlay,
    ) -> String {
        let mut stream = String::new();
        let h = page.height;
        let mut photo_seq = 0usize;

        for element in &page.elements {
            self.write_element(&mut stream, element, h, page_idx, &mut photo_seq, builder);
        }

        self.write_mark_effects(&mut stream, page_idx, h, regions, marks);

        match overlay {
            PageOverlay::None => {}
            PageOverlay::Vector(segments) => {
                self.write_overlay_segments(&mut stream, segments, h);
            }
            PageOverlay::Raster(_) => {
                if builder.overlay_objects.contains_key(&page_idx) {
                    let _ = write!(
                        stream,
                        "q\n{:.2} 0 0 {:.2} 0 0 cm\n/Ov{} Do\nQ\n",
                        page.width, page.height, page_idx
                    );
                }
            }
        }

        stream
    }

    fn write_element(
        &self,
        stream: &mut String,
        element: &LayoutElement,
        page_height: f64,
        page_idx: usize,
        photo_seq: &mut usize,
        builder: &PdfBuilder,
    ) {
        match &element.draw {
            DrawCommand::Rect {
                fill,
                stroke,
                stroke_width,
                corner_radius,
            } => {
                let x = element.x;
                let y = page_height - element.y - element.height;
                let (w, h) = (element.width, element.height);
                if let Some(c) = fill {
                    let _ = write!(stream, "q\n{:.3} {:.3} {:.3} rg\n", c.r, c.g, c.b);
                    write_rect_path(stream, x, y, w, h, *corner_radius);
                    let _ = write!(stream, "f\nQ\n");
                }
                if let Some(c) = stroke {
                    let _ = write!(
                        stream,
                        "q\n{:.3} {:.3} {:.3} RG\n{:.2} w\n",
                        c.r, c.g, c.b, stroke_width
                    );
                    write_rect_path(stream, x, y, w, h, *corner_radius);
                    let _ = write!(stream, "S\nQ\n");
                }
            }

            DrawCommand::Text {
                lines,
                font_size,
                bold,
                color,
            } => {
                self.write_text(stream, lines, *font_size, *bold, *color, page_height);
            }

            DrawCommand::Line {
                x2,
                y2,
                width,
                color,
            } => {
                let _ = write!(
                    stream,
                    "q\n{:.3} {:.3} {:.3} RG\n{:.2} w\n{:.2} {:.2} m\n{:.2} {:.2} l\nS\nQ\n",
                    color.r,
                    color.g,
                    color.b,
                    width,
                    element.x,
                    page_height - element.y,
                    x2,
                    page_height - y2,
                );
            }

            DrawCommand::Photo { .. } => {
                let seq = *photo_seq;
                *photo_seq += 1;
                let x = element.x;
                let y = page_height - element.y - element.height;
                if let Some(&img_idx) = builder.image_index_map.get(&(page_idx, seq)) {
                    let _ = write!(
                        stream,
                        "q\n{:.4} 0 0 {:.4} {:.2} {:.2} cm\n/Im{} Do\nQ\n",
                        element.width, element.height, x, y, img_idx
                    );
                } else {
                    // No registered XObject: draw the grey placeholder.
                    let _ = write!(
                        stream,
                        "q\n0.9 0.9 0.9 rg\n{:.2} {:.2} {:.2} {:.2} re\nf\nQ\n",
                        x, y, element.width, element.height
                    );
                }
            }

            DrawCommand::PhotoPlaceholder => {
                let x = element.x;
                let y = page_height - element.y - element.height;
                let _ = write!(
                    stream,
                    "q\n0.9 0.9 0.9 rg\n{:.2} {:.2} {:.2} {:.2} re\nf\nQ\n",
                    x, y, element.width, element.height
                );
            }
        }
    }

    fn write_text(
        &self,
        stream: &mut String,
        lines: &[TextLine],
        font_size: f64,
        bold: bool,
        color: Color,
        page_height: f64,
    ) {
        let font = if bold { "F1" } else { "F0" };
        let _ = write!(
            stream,
            "BT\n{:.3} {:.3} {:.3} rg\n/{} {:.1} Tf\n",
            color.r, color.g, color.b, font, font_size
        );
        for line in lines {
            // Line `y` is the top of the line box; the baseline sits one
            // em below it.
            let baseline = page_height - line.y - font_size;
            let _ = write!(
                stream,
                "1 0 0 1 {:.2} {:.2} Tm\n({}) Tj\n",
                line.x,
                baseline,
                encode_pdf_text(&line.text)
            );
        }
        let _ = write!(stream, "ET\n");
    }

    /// Draw mark-state effects: a check glyph plus description
    /// strikethrough for checked checkboxes, an X over crossed photos.
    fn write_mark_effects(
        &self,
        stream: &mut String,
        page_idx: usize,
        page_height: f64,
        regions: &HitRegionRegistry,
        marks: &MarkState,
    ) {
        for region in regions.on_page(page_idx) {
            if !is_marked(region, marks) {
                continue;
            }
            let r = region.rect;
            match region.kind {
                RegionKind::Checkbox => {
                    let c = CHECK_COLOR;
                    let (x0, y0) = (r.x + r.width * 0.2, page_height - (r.y + r.height * 0.55));
                    let (x1, y1) = (r.x + r.width * 0.45, page_height - (r.y + r.height * 0.8));
                    let (x2, y2) = (r.x + r.width * 0.85, page_height - (r.y + r.height * 0.2));
                    let _ = write!(
                        stream,
                        "q\n{:.3} {:.3} {:.3} RG\n1.4 w\n1 J\n{:.2} {:.2} m\n{:.2} {:.2} l\n{:.2} {:.2} l\nS\nQ\n",
                        c.r, c.g, c.b, x0, y0, x1, y1, x2, y2
                    );
                    // Strike through exactly the recorded description
                    // line rects.
                    for line in &region.line_rects {
                        let y = page_height - (line.y + line.height * 0.55);
                        let _ = write!(
                            stream,
                            "q\n{:.3} {:.3} {:.3} RG\n0.9 w\n{:.2} {:.2} m\n{:.2} {:.2} l\nS\nQ\n",
                            INK_COLOR.r,
                            INK_COLOR.g,
                            INK_COLOR.b,
                            line.x,
                            y,
                            line.x + line.width,
                            y
                        );
                    }
                }
                RegionKind::Photo => {
                    let c = CROSS_COLOR;
                    let top = page_height - r.y;
                    let bottom = page_height - (r.y + r.height);
                    let _ = write!(
                        stream,
                        "q\n{:.3} {:.3} {:.3} RG\n2.0 w\n1 J\n{:.2} {:.2} m\n{:.2} {:.2} l\n{:.2} {:.2} m\n{:.2} {:.2} l\nS\nQ\n",
                        c.r, c.g, c.b,
                        r.x, top,
                        r.x + r.width, bottom,
                        r.x + r.width, top,
                        r.x, bottom
                    );
                }
            }
        }
    }

    /// Burn vector annotation segments over the page content.
    fn write_overlay_segments(
        &self,
        stream: &mut String,
        segments: &[OverlaySegment],
        page_height: f64,
    ) {
        for seg in segments {
            let (r, g, b) = if seg.erase {
                (1.0, 1.0, 1.0)
            } else {
                (INK_COLOR.r, INK_COLOR.g, INK_COLOR.b)
            };
            let _ = write!(
                stream,
                "q\n{:.3} {:.3} {:.3} RG\n{:.2} w\n1 J\n{:.2} {:.2} m\n{:.2} {:.2} l\nS\nQ\n",
                r,
                g,
                b,
                seg.width,
                seg.x1,
                page_height - seg.y1,
                seg.x2,
                page_height - seg.y2
            );
        }
    }

    /// Walk all pages and create XObjects for every placed photo.
    fn register_images(&self, builder: &mut PdfBuilder, pages: &[LayoutPage]) {
        for (page_idx, page) in pages.iter().enumerate() {
            let mut seq = 0usize;
            for element in &page.elements {
                if let DrawCommand::Photo { photo } = &element.draw {
                    let img_idx = builder.image_objects.len();
                    let obj_id = write_image_xobject(builder, photo);
                    builder.image_objects.push(obj_id);
                    builder.image_index_map.insert((page_idx, seq), img_idx);
                    seq += 1;
                }
            }
        }
    }

    /// Create XObjects for raster page overlays.
    fn register_overlays(&self, builder: &mut PdfBuilder, overlays: &[PageOverlay]) {
        for (page_idx, overlay) in overlays.iter().enumerate() {
            if let PageOverlay::Raster(photo) = overlay {
                let obj_id = write_image_xobject(builder, photo);
                builder.overlay_objects.insert(page_idx, obj_id);
            }
        }
    }

    /// /XObject resource entries for one page.
    fn xobject_resources(&self, page_idx: usize, builder: &PdfBuilder) -> String {
        let mut entries: Vec<String> = builder
            .image_index_map
            .iter()
            .filter(|((pidx, _), _)| *pidx == page_idx)
            .map(|(_, &img_idx)| format!("/Im{} {} 0 R", img_idx, builder.image_objects[img_idx]))
            .collect();
        if let Some(obj_id) = builder.overlay_objects.get(&page_idx) {
            entries.push(format!("/Ov{page_idx} {obj_id} 0 R"));
        }
        entries.join(" ")
    }

    /// Serialize all objects into the final byte stream.
    fn serialize(&self, builder: &PdfBuilder, info_obj_id: Option<usize>) -> Vec<u8> {
        let mut output: Vec<u8> = Vec::new();
        let mut offsets: Vec<usize> = vec![0; builder.objects.len()];

        output.extend_from_slice(b"%PDF-1.7\n");
        output.extend_from_slice(b"%\xe2\xe3\xcf\xd3\n");

        for (i, obj) in builder.objects.iter().enumerate().skip(1) {
            offsets[i] = output.len();
            let _ = write!(output, "{i} 0 obj\n");
            output.extend_from_slice(&obj.data);
            output.extend_from_slice(b"\nendobj\n\n");
        }

        let xref_offset = output.len();
        let _ = write!(output, "xref\n0 {}\n", builder.objects.len());
        let _ = write!(output, "0000000000 65535 f \n");
        for offset in offsets.iter().skip(1) {
            let _ = write!(output, "{offset:010} 00000 n \n");
        }

        let _ = write!(
            output,
            "trailer\n<< /Size {} /Root 1 0 R",
            builder.objects.len()
        );
        if let Some(info_id) = info_obj_id {
            let _ = write!(output, " /Info {info_id} 0 R");
        }
        let _ = write!(output, " >>\nstartxref\n{xref_offset}\n%%EOF\n");

        output
    }
}

impl Default for PdfWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Emit a rectangle path, rounded when `radius > 0`.
fn write_rect_path(stream: &mut String, x: f64, y: f64, w: f64, h: f64, radius: f64) {
    if radius <= 0.0 {
        let _ = write!(stream, "{x:.2} {y:.2} {w:.2} {h:.2} re\n");
        return;
    }
    let r = radius.min(w / 2.0).min(h / 2.0);
    let k = 0.5522847498 * r;
    let _ = write!(stream, "{:.2} {:.2} m\n", x + r, y);
    let _ = write!(stream, "{:.2} {:.2} l\n", x + w - r, y);
    let _ = write!(
        stream,
        "{:.2} {:.2} {:.2} {:.2} {:.2} {:.2} c\n",
        x + w - r + k,
        y,
        x + w,
        y + r - k,
        x + w,
        y + r
    );
    let _ = write!(stream, "{:.2} {:.2} l\n", x + w, y + h - r);
    let _ = write!(
        stream,
        "{:.2} {:.2} {:.2} {:.2} {:.2} {:.2} c\n",
        x + w,
        y + h - r + k,
        x + w - r + k,
        y + h,
        x + w - r,
        y + h
    );
    let _ = write!(stream, "{:.2} {:.2} l\n", x + r, y + h);
    let _ = write!(
        stream,
        "{:.2} {:.2} {:.2} {:.2} {:.2} {:.2} c\n",
        x + r - k,
        y + h,
        x,
        y + h - r + k,
        x,
        y + h - r
    );
    let _ = write!(stream, "{:.2} {:.2} l\n", x, y + r);
    let _ = write!(
        stream,
        "{:.2} {:.2} {:.2} {:.2} {:.2} {:.2} c\n",
        x,
        y + r - k,
        x + r - k,
        y,
        x + r,
        y
    );
    let _ = write!(stream, "h\n");
}

/// Write one image as one or two XObjects (SMask for alpha). Returns the
/// main XObject id.
fn write_image_xobject(builder: &mut PdfBuilder, image: &LoadedPhoto) -> usize {
    match &image.pixels {
        PhotoPixels::Jpeg { data, grayscale } => {
            let color_space = if *grayscale { "/DeviceGray" } else { "/DeviceRGB" };
            let obj_id = builder.objects.len();
            let mut obj: Vec<u8> = Vec::new();
            let _ = write!(
                obj,
                "<< /Type /XObject /Subtype /Image /Width {} /Height {} \
                 /ColorSpace {} /BitsPerComponent 8 /Filter /DCTDecode /Length {} >>\nstream\n",
                image.width_px,
                image.height_px,
                color_space,
                data.len()
            );
            obj.extend_from_slice(data);
            obj.extend_from_slice(b"\nendstream");
            builder.objects.push(PdfObject { data: obj });
            obj_id
        }
        PhotoPixels::Decoded { rgb, alpha } => {
            let smask_id = alpha.as_ref().map(|alpha_data| {
                let compressed = compress_to_vec_zlib(alpha_data, 6);
                let smask_obj_id = builder.objects.len();
                let mut obj: Vec<u8> = Vec::new();
                let _ = write!(
                    obj,
                    "<< /Type /XObject /Subtype /Image /Width {} /Height {} \
                     /ColorSpace /DeviceGray /BitsPerComponent 8 /Filter /FlateDecode /Length {} >>\nstream\n",
                    image.width_px,
                    image.height_px,
                    compressed.len()
                );
                obj.extend_from_slice(&compressed);
                obj.extend_from_slice(b"\nendstream");
                builder.objects.push(PdfObject { data: obj });
                smask_obj_id
            });

            let compressed = compress_to_vec_zlib(rgb, 6);
            let obj_id = builder.objects.len();
            let smask_ref = smask_id
                .map(|id| format!(" /SMask {id} 0 R"))
                .unwrap_or_default();
            let mut obj: Vec<u8> = Vec::new();
            let _ = write!(
                obj,
                "<< /Type /XObject /Subtype /Image /Width {} /Height {} \
                 /ColorSpace /DeviceRGB /BitsPerComponent 8 /Filter /FlateDecode /Length {}{} >>\nstream\n",
                image.width_px,
                image.height_px,
                compressed.len(),
                smask_ref
            );
            obj.extend_from_slice(&compressed);
            obj.extend_from_slice(b"\nendstream");
            builder.objects.push(PdfObject { data: obj });
            obj_id
        }
    }
}

/// Escape special characters in a PDF literal string.
fn escape_pdf_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

/// Encode text for a `Tj` operator under WinAnsiEncoding: ASCII passes
/// through escaped, the common Windows-1252 extras map to their byte, and
/// anything else degrades to '?'.
fn encode_pdf_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            ' '..='~' => out.push(ch),
            _ => match winansi_byte(ch) {
                Some(b) => {
                    let _ = write!(out, "\\{b:03o}");
                }
                None => out.push('?'),
            },
        }
    }
    out
}

/// Map a non-ASCII codepoint to its WinAnsiEncoding byte, if any.
fn winansi_byte(ch: char) -> Option<u8> {
    let cp = ch as u32;
    if (0xA0..=0xFF).contains(&cp) {
        return Some(cp as u8);
    }
    match cp {
        0x20AC => Some(0x80), // euro
        0x2018 => Some(0x91), // left single quote
        0x2019 => Some(0x92), // right single quote
        0x201C => Some(0x93), // left double quote
        0x201D => Some(0x94), // right double quote
        0x2022 => Some(0x95), // bullet
        0x2013 => Some(0x96), // en dash
        0x2014 => Some(0x97), // em dash
        0x2026 => Some(0x85), // ellipsis
        0x2122 => Some(0x99), // trade mark
        _ => None,
    }
}
