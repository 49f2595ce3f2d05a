//! Text measurement against the standard Helvetica metrics.
//!
//! The engine draws with the 14 standard PDF fonts, so no font files are
//! parsed or embedded; the AFM advance widths below (units per 1000 em)
//! are all layout needs for wrapping and card sizing.

/// Advance widths for Helvetica, ASCII 0x20..=0x7E, in 1/1000 em.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, //  !"#$%&'()*+,-./
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 0-9:;<=>?
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // @A-O
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // P-Z[\]^_
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // `a-o
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // p-z{|}~
];

/// Advance widths for Helvetica-Bold, ASCII 0x20..=0x7E, in 1/1000 em.
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

/// Text measurement over the built-in Helvetica metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct FontMetrics;

impl FontMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Advance width of a single character in points. Characters outside
    /// the ASCII printable range measure as a space.
    pub fn char_width(&self, ch: char, font_size: f64, bold: bool) -> f64 {
        let table = if bold {
            &HELVETICA_BOLD_WIDTHS
        } else {
            &HELVETICA_WIDTHS
        };
        let cp = ch as u32;
        let units = if (0x20..=0x7E).contains(&cp) {
            table[(cp - 0x20) as usize]
        } else {
            table[0]
        };
        units as f64 / 1000.0 * font_size
    }

    /// Width of a string in points.
    pub fn measure(&self, text: &str, font_size: f64, bold: bool) -> f64 {
        text.chars()
            .map(|ch| self.char_width(ch, font_size, bold))
            .sum()
    }

    /// Greedy word wrap into lines that fit `max_width` points.
    ///
    /// A single word wider than the line is hard-broken character by
    /// character rather than overflowing.
    pub fn wrap(&self, text: &str, font_size: f64, bold: bool, max_width: f64) -> Vec<String> {
        let mut lines: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut current_width = 0.0;
        let space_width = self.char_width(' ', font_size, bold);

        for word in text.split_whitespace() {
            let word_width = self.measure(word, font_size, bold);
            let needed = if current.is_empty() {
                word_width
            } else {
                space_width + word_width
            };

            if current_width + needed <= max_width {
                if !current.is_empty() {
                    current.push(' ');
                    current_width += space_width;
                }
                current.push_str(word);
                current_width += word_width;
                continue;
            }

            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_width = 0.0;
            }

            if word_width <= max_width {
                current.push_str(word);
                current_width = word_width;
            } else {
                // Oversized word: break at character granularity.
                for ch in word.chars() {
                    let cw = self.char_width(ch, font_size, bold);
                    if current_width + cw > max_width && !current.is_empty() {
                        lines.push(std::mem::take(&mut current));
                        current_width = 0.0;
                    }
                    current.push(ch);
                    current_width += cw;
                }
            }
        }

        if !current.is_empty() {
            lines.push(current);
        }
        if lines.is_empty() {
            lines.push(String::new());
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn space_width_matches_afm() {
        let m = FontMetrics::new();
        assert!((m.char_width(' ', 12.0, false) - 3.336).abs() < 0.001);
    }

    #[test]
    fn bold_is_wider() {
        let m = FontMetrics::new();
        assert!(m.char_width('a', 12.0, true) > m.char_width('a', 12.0, false));
    }

    #[test]
    fn wrap_respects_width() {
        let m = FontMetrics::new();
        let lines = m.wrap("the quick brown fox jumps over the lazy dog", 12.0, false, 100.0);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(m.measure(line, 12.0, false) <= 100.0 + 0.01, "line too wide: {line}");
        }
    }

    #[test]
    fn wrap_hard_breaks_oversized_words() {
        let m = FontMetrics::new();
        let lines = m.wrap("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", 12.0, false, 40.0);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(m.measure(line, 12.0, false) <= 40.0 + 0.01);
        }
    }

    #[test]
    fn empty_text_yields_one_empty_line() {
        let m = FontMetrics::new();
        assert_eq!(m.wrap("", 12.0, false, 100.0), vec![String::new()]);
    }
}
