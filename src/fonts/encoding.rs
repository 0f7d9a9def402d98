//! Simple-font encodings and base-14 metrics.
//!
//! A simple font maps 8-bit codes to glyph names through a base encoding
//! plus /Differences. The tables here cover StandardEncoding and
//! WinAnsiEncoding (MacRoman shares the ASCII range and falls back to
//! Standard above it, which is the part anything actually exercises).
//!
//! Built-in advance widths for the standard 14 fonts let non-embedded
//! Helvetica/Times/Courier text lay out correctly; their outline programs
//! are not bundled, so rasterizing them is a soft failure.

/// The ASCII range shared by Standard/WinAnsi/MacRoman, codes 32..=126.
const ASCII_NAMES: [&str; 95] = [
    "space", "exclam", "quotedbl", "numbersign", "dollar", "percent", "ampersand", "quotesingle",
    "parenleft", "parenright", "asterisk", "plus", "comma", "hyphen", "period", "slash", "zero",
    "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "colon", "semicolon",
    "less", "equal", "greater", "question", "at", "A", "B", "C", "D", "E", "F", "G", "H", "I",
    "J", "K", "L", "M", "N", "O", "P", "Q", "R", "S", "T", "U", "V", "W", "X", "Y", "Z",
    "bracketleft", "backslash", "bracketright", "asciicircum", "underscore", "grave", "a", "b",
    "c", "d", "e", "f", "g", "h", "i", "j", "k", "l", "m", "n", "o", "p", "q", "r", "s", "t",
    "u", "v", "w", "x", "y", "z", "braceleft", "bar", "braceright", "asciitilde",
];

/// WinAnsi upper range, codes 128..=255 (empty string = undefined).
const WINANSI_HIGH: [&str; 128] = [
    "Euro", "", "quotesinglbase", "florin", "quotedblbase", "ellipsis", "dagger", "daggerdbl",
    "circumflex", "perthousand", "Scaron", "guilsinglleft", "OE", "", "Zcaron", "", "",
    "quoteleft", "quoteright", "quotedblleft", "quotedblright", "bullet", "endash", "emdash",
    "tilde", "trademark", "scaron", "guilsinglright", "oe", "", "zcaron", "Ydieresis", "space",
    "exclamdown", "cent", "sterling", "currency", "yen", "brokenbar", "section", "dieresis",
    "copyright", "ordfeminine", "guillemotleft", "logicalnot", "hyphen", "registered", "macron",
    "degree", "plusminus", "twosuperior", "threesuperior", "acute", "mu", "paragraph",
    "periodcentered", "cedilla", "onesuperior", "ordmasculine", "guillemotright", "onequarter",
    "onehalf", "threequarters", "questiondown", "Agrave", "Aacute", "Acircumflex", "Atilde",
    "Adieresis", "Aring", "AE", "Ccedilla", "Egrave", "Eacute", "Ecircumflex", "Edieresis",
    "Igrave", "Iacute", "Icircumflex", "Idieresis", "Eth", "Ntilde", "Ograve", "Oacute",
    "Ocircumflex", "Otilde", "Odieresis", "multiply", "Oslash", "Ugrave", "Uacute",
    "Ucircumflex", "Udieresis", "Yacute", "Thorn", "germandbls", "agrave", "aacute",
    "acircumflex", "atilde", "adieresis", "aring", "ae", "ccedilla", "egrave", "eacute",
    "ecircumflex", "edieresis", "igrave", "iacute", "icircumflex", "idieresis", "eth", "ntilde",
    "ograve", "oacute", "ocircumflex", "otilde", "odieresis", "divide", "oslash", "ugrave",
    "uacute", "ucircumflex", "udieresis", "yacute", "thorn", "ydieresis",
];

/// Glyph name for `code` under the named base encoding, or `None`.
pub fn base_encoding_name(encoding: &str, code: u8) -> Option<&'static str> {
    let name = match code {
        32..=126 => ASCII_NAMES[code as usize - 32],
        128..=255 if encoding == "WinAnsiEncoding" => WINANSI_HIGH[code as usize - 128],
        // Standard/MacRoman high ranges differ, but the overlap that
        // matters (quotes, dashes, bullets) comes through /Differences in
        // practice; treat the rest as undefined.
        _ => "",
    };
    // Standard encoding spells two ASCII slots differently
    let name = if encoding == "StandardEncoding" {
        match code {
            39 => "quoteright",
            96 => "quoteleft",
            _ => name,
        }
    } else {
        name
    };
    if name.is_empty() { None } else { Some(name) }
}

/// Map a glyph name to its Unicode scalar, Adobe-glyph-list style.
///
/// Covers single-letter names, `uniXXXX`/`uXXXX[XX]` forms, and the named
/// Latin set the encoding tables above produce.
pub fn glyph_name_to_unicode(name: &str) -> Option<char> {
    if name.is_empty() {
        return None;
    }
    // Single-character names map to themselves
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Some(c);
    }
    // uniXXXX and uXXXX / uXXXXXX hex forms
    if let Some(hex) = name.strip_prefix("uni") {
        if hex.len() == 4 {
            if let Ok(v) = u32::from_str_radix(hex, 16) {
                return char::from_u32(v);
            }
        }
    }
    if let Some(hex) = name.strip_prefix('u') {
        if (4..=6).contains(&hex.len()) {
            if let Ok(v) = u32::from_str_radix(hex, 16) {
                return char::from_u32(v);
            }
        }
    }
    NAME_TO_UNICODE.get(name).copied()
}

static NAME_TO_UNICODE: phf::Map<&'static str, char> = phf::phf_map! {
    "space" => ' ', "exclam" => '!', "quotedbl" => '"', "numbersign" => '#',
    "dollar" => '$', "percent" => '%', "ampersand" => '&', "quotesingle" => '\'',
    "parenleft" => '(', "parenright" => ')', "asterisk" => '*', "plus" => '+',
    "comma" => ',', "hyphen" => '-', "period" => '.', "slash" => '/',
    "zero" => '0', "one" => '1', "two" => '2', "three" => '3', "four" => '4',
    "five" => '5', "six" => '6', "seven" => '7', "eight" => '8', "nine" => '9',
    "colon" => ':', "semicolon" => ';', "less" => '<', "equal" => '=',
    "greater" => '>', "question" => '?', "at" => '@', "bracketleft" => '[',
    "backslash" => '\\', "bracketright" => ']', "asciicircum" => '^',
    "underscore" => '_', "grave" => '`', "braceleft" => '{', "bar" => '|',
    "braceright" => '}', "asciitilde" => '~', "quoteleft" => '\u{2018}',
    "quoteright" => '\u{2019}', "quotedblleft" => '\u{201C}',
    "quotedblright" => '\u{201D}', "quotesinglbase" => '\u{201A}',
    "quotedblbase" => '\u{201E}', "endash" => '\u{2013}', "emdash" => '\u{2014}',
    "bullet" => '\u{2022}', "ellipsis" => '\u{2026}', "dagger" => '\u{2020}',
    "daggerdbl" => '\u{2021}', "perthousand" => '\u{2030}', "Euro" => '\u{20AC}',
    "trademark" => '\u{2122}', "florin" => '\u{192}', "circumflex" => '\u{2C6}',
    "tilde" => '\u{2DC}', "Scaron" => '\u{160}', "scaron" => '\u{161}',
    "Zcaron" => '\u{17D}', "zcaron" => '\u{17E}', "OE" => '\u{152}',
    "oe" => '\u{153}', "Ydieresis" => '\u{178}', "ydieresis" => '\u{FF}',
    "guilsinglleft" => '\u{2039}', "guilsinglright" => '\u{203A}',
    "guillemotleft" => '\u{AB}', "guillemotright" => '\u{BB}',
    "exclamdown" => '\u{A1}', "cent" => '\u{A2}', "sterling" => '\u{A3}',
    "currency" => '\u{A4}', "yen" => '\u{A5}', "brokenbar" => '\u{A6}',
    "section" => '\u{A7}', "dieresis" => '\u{A8}', "copyright" => '\u{A9}',
    "ordfeminine" => '\u{AA}', "logicalnot" => '\u{AC}', "registered" => '\u{AE}',
    "macron" => '\u{AF}', "degree" => '\u{B0}', "plusminus" => '\u{B1}',
    "acute" => '\u{B4}', "mu" => '\u{B5}', "paragraph" => '\u{B6}',
    "periodcentered" => '\u{B7}', "cedilla" => '\u{B8}', "ordmasculine" => '\u{BA}',
    "onequarter" => '\u{BC}', "onehalf" => '\u{BD}', "threequarters" => '\u{BE}',
    "questiondown" => '\u{BF}', "multiply" => '\u{D7}', "divide" => '\u{F7}',
    "germandbls" => '\u{DF}', "AE" => '\u{C6}', "ae" => '\u{E6}',
    "Oslash" => '\u{D8}', "oslash" => '\u{F8}', "Eth" => '\u{D0}',
    "eth" => '\u{F0}', "Thorn" => '\u{DE}', "thorn" => '\u{FE}',
    "nbspace" => '\u{A0}', "minus" => '\u{2212}', "fraction" => '\u{2044}',
    "fi" => '\u{FB01}', "fl" => '\u{FB02}',
};

// ============================================================================
// Base-14 metrics
// ============================================================================

/// Helvetica advance widths for codes 32..=126, 1000 units/em.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, 556, 556,
    556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, 1015, 667, 667, 722,
    722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778, 722, 667, 611, 722,
    667, 944, 667, 667, 611, 278, 278, 278, 469, 556, 333, 556, 556, 500, 556, 556, 278, 556,
    556, 222, 222, 500, 222, 833, 556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500,
    500, 334, 260, 334, 584,
];

/// Times-Roman advance widths for codes 32..=126, 1000 units/em.
const TIMES_WIDTHS: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278, 500, 500,
    500, 500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444, 921, 722, 667, 667,
    722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722, 556, 722, 667, 556, 611, 722,
    722, 944, 722, 722, 611, 333, 278, 333, 469, 500, 333, 444, 500, 444, 500, 444, 333, 500,
    500, 278, 278, 500, 278, 778, 500, 500, 500, 500, 333, 389, 278, 500, 500, 722, 500, 500,
    444, 480, 200, 480, 541,
];

/// The standard-14 family a /BaseFont name resolves to, if any.
fn base14_family(base_font: &str) -> Option<&'static str> {
    // Strip a subset prefix like "ABCDEF+"
    let name = match base_font.as_bytes().get(6) {
        Some(b'+') if base_font.len() > 7 => &base_font[7..],
        _ => base_font,
    };
    let lower = name.to_ascii_lowercase();
    if lower.starts_with("helvetica") || lower.starts_with("arial") {
        Some("Helvetica")
    } else if lower.starts_with("times") || lower.starts_with("timesnewroman") {
        Some("Times")
    } else if lower.starts_with("courier") {
        Some("Courier")
    } else if lower.starts_with("symbol") {
        Some("Symbol")
    } else if lower.starts_with("zapf") {
        Some("ZapfDingbats")
    } else {
        None
    }
}

/// Built-in advance width (1000 units/em) for `code` in a base-14 font.
pub fn base14_width(base_font: &str, code: u8) -> Option<f32> {
    let family = base14_family(base_font)?;
    let width = match family {
        "Courier" => 600,
        "Helvetica" if (32..=126).contains(&code) => HELVETICA_WIDTHS[code as usize - 32],
        "Times" if (32..=126).contains(&code) => TIMES_WIDTHS[code as usize - 32],
        _ => 500,
    };
    Some(width as f32)
}

/// Whether the /BaseFont names a standard-14 font.
pub fn is_base14(base_font: &str) -> bool {
    base14_family(base_font).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_encoding_names() {
        assert_eq!(base_encoding_name("WinAnsiEncoding", b'A'), Some("A"));
        assert_eq!(base_encoding_name("WinAnsiEncoding", b' '), Some("space"));
        assert_eq!(base_encoding_name("StandardEncoding", b'\''), Some("quoteright"));
        assert_eq!(base_encoding_name("WinAnsiEncoding", b'\''), Some("quotesingle"));
        assert_eq!(base_encoding_name("WinAnsiEncoding", 0x80), Some("Euro"));
        assert_eq!(base_encoding_name("WinAnsiEncoding", 0x81), None);
    }

    #[test]
    fn test_glyph_name_to_unicode() {
        assert_eq!(glyph_name_to_unicode("A"), Some('A'));
        assert_eq!(glyph_name_to_unicode("space"), Some(' '));
        assert_eq!(glyph_name_to_unicode("uni20AC"), Some('\u{20AC}'));
        assert_eq!(glyph_name_to_unicode("u1F600"), Some('\u{1F600}'));
        assert_eq!(glyph_name_to_unicode("emdash"), Some('\u{2014}'));
        assert_eq!(glyph_name_to_unicode("totallymadeup"), None);
    }

    #[test]
    fn test_base14_widths() {
        assert_eq!(base14_width("Helvetica", b'H'), Some(722.0));
        assert_eq!(base14_width("Helvetica", b'i'), Some(222.0));
        assert_eq!(base14_width("Helvetica-Bold", b'H'), Some(722.0));
        assert_eq!(base14_width("ABCDEF+Helvetica", b'H'), Some(722.0));
        assert_eq!(base14_width("Courier", b'W'), Some(600.0));
        assert_eq!(base14_width("Times-Roman", b'H'), Some(722.0));
        assert_eq!(base14_width("SomeEmbeddedFont", b'H'), None);
    }

    #[test]
    fn test_is_base14() {
        assert!(is_base14("Helvetica"));
        assert!(is_base14("Arial-BoldMT"));
        assert!(!is_base14("DejaVuSans"));
    }
}
