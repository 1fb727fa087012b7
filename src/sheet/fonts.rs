//! Metrics for the standard PDF fonts used for captions.
//!
//! Widths are the Adobe core font metrics in 1/1000 em for the printable
//! ASCII range. Text is encoded as WinAnsi; anything outside it becomes `?`.

/// Standard Type 1 fonts every PDF reader provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardFont {
    Helvetica,
    TimesRoman,
    Courier,
}

impl StandardFont {
    /// Map a font family name (or common alias) onto a standard font.
    ///
    /// ```rust
    /// use contact_sheet::sheet::StandardFont;
    ///
    /// assert_eq!(StandardFont::from_family("Arial"), Some(StandardFont::Helvetica));
    /// assert_eq!(StandardFont::from_family("times new roman"), Some(StandardFont::TimesRoman));
    /// assert_eq!(StandardFont::from_family("Comic Sans"), None);
    /// ```
    pub fn from_family(family: &str) -> Option<Self> {
        match family.trim().to_lowercase().as_str() {
            "helvetica" | "arial" | "sans" | "sans-serif" => Some(Self::Helvetica),
            "times" | "times-roman" | "times roman" | "times new roman" | "serif" => {
                Some(Self::TimesRoman)
            }
            "courier" | "courier new" | "monospace" => Some(Self::Courier),
            _ => None,
        }
    }

    /// Resolve a family name, falling back to Helvetica with a warning.
    pub fn resolve(family: &str) -> Self {
        Self::from_family(family).unwrap_or_else(|| {
            log::warn!("Font '{family}' is not a standard PDF font, using Helvetica");
            Self::Helvetica
        })
    }

    /// PostScript name for the font dictionary.
    pub fn base_font(self) -> &'static str {
        match self {
            Self::Helvetica => "Helvetica",
            Self::TimesRoman => "Times-Roman",
            Self::Courier => "Courier",
        }
    }

    /// Advance width of one WinAnsi byte, in 1/1000 em.
    fn glyph_width(self, byte: u8) -> u16 {
        let ascii = |table: &[u16; 95], default: u16| match byte {
            32..=126 => table[(byte - 32) as usize],
            _ => default,
        };
        match self {
            Self::Helvetica => ascii(&HELVETICA_WIDTHS, 556),
            Self::TimesRoman => ascii(&TIMES_ROMAN_WIDTHS, 500),
            Self::Courier => 600,
        }
    }

    /// Width of `text` at `size` points, as it will be drawn.
    pub fn text_width(self, text: &str, size: f64) -> f64 {
        let units: u32 = encode_win_ansi(text)
            .into_iter()
            .map(|b| u32::from(self.glyph_width(b)))
            .sum();
        f64::from(units) * size / 1000.0
    }
}

/// Encode text for a WinAnsiEncoding simple font.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{20}'..='\u{7e}' | '\u{a0}'..='\u{ff}' => c as u8,
            '€' => 0x80,
            '‚' => 0x82,
            '„' => 0x84,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '™' => 0x99,
            _ => b'?',
        })
        .collect()
}

#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 0..?
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // @..O
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // P.._
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // `..o
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,      // p..~
];

#[rustfmt::skip]
const TIMES_ROMAN_WIDTHS: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278, // ' '../
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444, // 0..?
    921, 722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722, // @..O
    556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611, 333, 278, 333, 469, 500, // P.._
    333, 444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, 500, 500, // `..o
    500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541,      // p..~
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_aliases() {
        assert_eq!(StandardFont::from_family("Helvetica"), Some(StandardFont::Helvetica));
        assert_eq!(StandardFont::from_family(" ARIAL "), Some(StandardFont::Helvetica));
        assert_eq!(StandardFont::from_family("Times"), Some(StandardFont::TimesRoman));
        assert_eq!(StandardFont::from_family("Courier New"), Some(StandardFont::Courier));
        assert_eq!(StandardFont::resolve("Papyrus"), StandardFont::Helvetica);
    }

    #[test]
    fn base_font_names() {
        assert_eq!(StandardFont::TimesRoman.base_font(), "Times-Roman");
        assert_eq!(StandardFont::Courier.base_font(), "Courier");
    }

    #[test]
    fn helvetica_widths() {
        // "Hi" = 722 + 222
        assert!((StandardFont::Helvetica.text_width("Hi", 10.0) - 9.44).abs() < 1e-9);
        assert_eq!(StandardFont::Helvetica.text_width("", 12.0), 0.0);
        // Spot-check table alignment at the end of each row
        assert_eq!(StandardFont::Helvetica.glyph_width(b'/'), 278);
        assert_eq!(StandardFont::Helvetica.glyph_width(b'?'), 556);
        assert_eq!(StandardFont::Helvetica.glyph_width(b'O'), 778);
        assert_eq!(StandardFont::Helvetica.glyph_width(b'_'), 556);
        assert_eq!(StandardFont::Helvetica.glyph_width(b'o'), 556);
        assert_eq!(StandardFont::Helvetica.glyph_width(b'~'), 584);
    }

    #[test]
    fn times_and_courier_widths() {
        assert_eq!(StandardFont::TimesRoman.glyph_width(b'W'), 944);
        assert_eq!(StandardFont::TimesRoman.glyph_width(b'~'), 541);
        assert!((StandardFont::Courier.text_width("abc", 10.0) - 18.0).abs() < 1e-9);
    }

    #[test]
    fn width_scales_with_size() {
        let f = StandardFont::TimesRoman;
        let w = f.text_width("Basement", 6.0);
        assert!((f.text_width("Basement", 12.0) - 2.0 * w).abs() < 1e-9);
    }

    #[test]
    fn win_ansi_encoding() {
        assert_eq!(encode_win_ansi("Café"), b"Caf\xe9".to_vec());
        assert_eq!(encode_win_ansi("“ok” – €"), vec![0x93, b'o', b'k', 0x94, b' ', 0x96, b' ', 0x80]);
        assert_eq!(encode_win_ansi("屋根"), b"??".to_vec());
    }
}
