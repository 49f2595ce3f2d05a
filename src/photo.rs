//! # Photo and Logo Loading
//!
//! Resolves photo/logo sources (data URIs, raw base64, file paths) to
//! decoded pixels for PDF embedding and to data URIs for SVG previews.
//! JPEG bytes pass through untouched (the PDF DCTDecode filter takes them
//! natively); PNGs decode to RGB plus a separate alpha channel for SMask
//! transparency.
//!
//! Decode failures here are non-fatal to generation: callers log and fall
//! back to a placeholder tile.

use std::io::Cursor;

/// A loaded photo ready for embedding.
#[derive(Debug, Clone)]
pub struct LoadedPhoto {
    pub pixels: PhotoPixels,
    pub width_px: u32,
    pub height_px: u32,
}

/// Pixel data in a form the PDF serializer consumes directly.
#[derive(Debug, Clone)]
pub enum PhotoPixels {
    /// Raw JPEG bytes, embedded with DCTDecode.
    Jpeg { data: Vec<u8>, grayscale: bool },
    /// Decoded RGB pixels plus optional alpha channel.
    Decoded {
        /// width * height * 3 bytes.
        rgb: Vec<u8>,
        /// width * height bytes. None when fully opaque.
        alpha: Option<Vec<u8>>,
    },
}

impl LoadedPhoto {
    /// Encode as a `data:` URI for embedding in preview SVG. JPEG sources
    /// reuse their original bytes; decoded pixels re-encode as PNG.
    pub fn data_uri(&self) -> Result<String, String> {
        use base64::Engine;
        let std_b64 = &base64::engine::general_purpose::STANDARD;
        match &self.pixels {
            PhotoPixels::Jpeg { data, .. } => {
                Ok(format!("data:image/jpeg;base64,{}", std_b64.encode(data)))
            }
            PhotoPixels::Decoded { rgb, alpha } => {
                let n = (self.width_px * self.height_px) as usize;
                let mut rgba = Vec::with_capacity(n * 4);
                for i in 0..n {
                    rgba.extend_from_slice(&rgb[i * 3..i * 3 + 3]);
                    rgba.push(alpha.as_ref().map(|a| a[i]).unwrap_or(255));
                }
                let mut buf = Vec::new();
                let encoder = image::codecs::png::PngEncoder::new(&mut buf);
                image::ImageEncoder::write_image(
                    encoder,
                    &rgba,
                    self.width_px,
                    self.height_px,
                    image::ColorType::Rgba8,
                )
                .map_err(|e| format!("PNG re-encode failed: {e}"))?;
                Ok(format!("data:image/png;base64,{}", std_b64.encode(&buf)))
            }
        }
    }
}

/// Load a photo from a source string.
///
/// Supported forms:
/// - `data:image/...;base64,...` (data URI)
/// - file path (absolute, `./`, `../`), read from disk
/// - raw base64-encoded image data
pub fn load_photo(src: &str) -> Result<LoadedPhoto, String> {
    let raw = read_source_bytes(src)?;
    decode_photo_bytes(&raw)
}

/// Resolve the source string to raw image bytes.
fn read_source_bytes(src: &str) -> Result<Vec<u8>, String> {
    if src.starts_with("data:image/") {
        let comma = src
            .find(',')
            .ok_or_else(|| "invalid data URI: missing comma".to_string())?;
        return base64_decode(&src[comma + 1..]);
    }

    // Only explicit path prefixes read from disk; base64 contains '/' too.
    if src.starts_with('/') || src.starts_with("./") || src.starts_with("../") {
        return std::fs::read(src).map_err(|e| format!("failed to read photo file '{src}': {e}"));
    }

    base64_decode(src)
}

fn base64_decode(input: &str) -> Result<Vec<u8>, String> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(input)
        .map_err(|e| format!("base64 decode error: {e}"))
}

/// Detect the format from magic bytes and decode accordingly.
pub fn decode_photo_bytes(data: &[u8]) -> Result<LoadedPhoto, String> {
    if data.len() < 4 {
        return Err("image data too short".to_string());
    }
    if is_jpeg(data) {
        decode_jpeg(data)
    } else if is_png(data) {
        decode_png(data)
    } else {
        Err("unsupported image format (expected JPEG or PNG)".to_string())
    }
}

fn is_jpeg(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0xFF && data[1] == 0xD8
}

fn is_png(data: &[u8]) -> bool {
    data.len() >= 4 && data[0] == 0x89 && data[1] == 0x50 && data[2] == 0x4E && data[3] == 0x47
}

/// JPEG: read dimensions without decoding pixels; the raw bytes pass
/// through to the PDF.
fn decode_jpeg(data: &[u8]) -> Result<LoadedPhoto, String> {
    let reader = image::io::Reader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| format!("JPEG format detection error: {e}"))?;
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| format!("failed to read JPEG dimensions: {e}"))?;

    Ok(LoadedPhoto {
        pixels: PhotoPixels::Jpeg {
            data: data.to_vec(),
            grayscale: jpeg_is_grayscale(data),
        },
        width_px: width,
        height_px: height,
    })
}

/// Scan JPEG markers for the SOF segment and read the component count.
fn jpeg_is_grayscale(data: &[u8]) -> bool {
    let mut i = 2; // skip SOI (FF D8)
    while i + 1 < data.len() {
        if data[i] != 0xFF {
            break;
        }
        let marker = data[i + 1];
        let is_sof = matches!(marker, 0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF);
        if is_sof {
            if i + 9 < data.len() {
                return data[i + 9] == 1;
            }
            break;
        }
        if i + 3 < data.len() {
            let seg_len = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
            i += 2 + seg_len;
        } else {
            break;
        }
    }
    false
}

/// PNG: decode to RGBA, split into RGB + alpha.
fn decode_png(data: &[u8]) -> Result<LoadedPhoto, String> {
    let reader = image::io::Reader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| format!("PNG format detection error: {e}"))?;
    let img = reader
        .decode()
        .map_err(|e| format!("failed to decode PNG: {e}"))?;

    let rgba = img.to_rgba8();
    let (width, height) = (rgba.width(), rgba.height());
    let n = (width * height) as usize;
    let mut rgb = Vec::with_capacity(n * 3);
    let mut alpha = Vec::with_capacity(n);
    let mut has_transparency = false;

    for pixel in rgba.pixels() {
        rgb.extend_from_slice(&pixel.0[..3]);
        let a = pixel[3];
        alpha.push(a);
        if a != 255 {
            has_transparency = true;
        }
    }

    Ok(LoadedPhoto {
        pixels: PhotoPixels::Decoded {
            rgb,
            alpha: if has_transparency { Some(alpha) } else { None },
        },
        width_px: width,
        height_px: height,
    })
}

#[cfg(test)]
pub(crate) fn test_png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut buf = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut buf);
    image::ImageEncoder::write_image(encoder, img.as_raw(), width, height, image::ColorType::Rgba8)
        .unwrap();
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_byte_sniffing() {
        assert!(is_jpeg(&[0xFF, 0xD8, 0xFF, 0xE0]));
        assert!(!is_jpeg(&[0x89, 0x50, 0x4E, 0x47]));
        assert!(is_png(&[0x89, 0x50, 0x4E, 0x47]));
        assert!(!is_png(&[0xFF, 0xD8, 0xFF, 0xE0]));
    }

    #[test]
    fn truncated_data_uri_is_an_error() {
        assert!(load_photo("data:image/png;base64").is_err());
    }

    #[test]
    fn undecodable_bytes_are_an_error() {
        assert!(decode_photo_bytes(&[0x00, 0x01, 0x02, 0x03, 0x04]).is_err());
    }

    #[test]
    fn opaque_png_drops_alpha_channel() {
        let buf = test_png_bytes(1, 1, [255, 0, 0, 255]);
        let loaded = decode_photo_bytes(&buf).unwrap();
        assert_eq!((loaded.width_px, loaded.height_px), (1, 1));
        match &loaded.pixels {
            PhotoPixels::Decoded { rgb, alpha } => {
                assert_eq!(rgb, &[255, 0, 0]);
                assert!(alpha.is_none());
            }
            _ => panic!("PNG should decode to Decoded"),
        }
    }

    #[test]
    fn translucent_png_keeps_alpha_channel() {
        let buf = test_png_bytes(1, 1, [255, 0, 0, 128]);
        let loaded = decode_photo_bytes(&buf).unwrap();
        match &loaded.pixels {
            PhotoPixels::Decoded { alpha, .. } => {
                assert_eq!(alpha.as_ref().unwrap(), &[128]);
            }
            _ => panic!("PNG should decode to Decoded"),
        }
    }

    #[test]
    fn jpeg_passes_through() {
        let img = image::RgbImage::from_fn(2, 2, |_, _| image::Rgb([0, 128, 255]));
        let mut buf = Vec::new();
        let encoder = image::codecs::jpeg::JpegEncoder::new(&mut buf);
        image::ImageEncoder::write_image(encoder, img.as_raw(), 2, 2, image::ColorType::Rgb8)
            .unwrap();

        let loaded = decode_photo_bytes(&buf).unwrap();
        match &loaded.pixels {
            PhotoPixels::Jpeg { data, grayscale } => {
                assert!(data.starts_with(&[0xFF, 0xD8]));
                assert!(!grayscale);
            }
            _ => panic!("JPEG should stay as Jpeg"),
        }
    }

    #[test]
    fn data_uri_round_trip() {
        use base64::Engine;
        let buf = test_png_bytes(1, 1, [0, 255, 0, 255]);
        let b64 = base64::engine::general_purpose::STANDARD.encode(&buf);
        let loaded = load_photo(&format!("data:image/png;base64,{b64}")).unwrap();
        assert_eq!((loaded.width_px, loaded.height_px), (1, 1));
        assert!(loaded.data_uri().unwrap().starts_with("data:image/png;base64,"));
    }
}
