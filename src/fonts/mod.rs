//! Font resources: loading, text decoding, metrics, and glyph outlines.
//!
//! Four variants keyed by /Subtype: simple Type 1 and TrueType fonts
//! (8-bit encodings), Type 3 (charproc glyphs), and CID-keyed Type 0
//! composite fonts (multi-byte CMap encodings). Embedded TrueType/OpenType
//! programs are parsed with ttf-parser for outlines and cmap lookups;
//! non-embedded standard-14 fonts fall back to built-in metrics and render
//! as soft failures.

pub mod cmap;
pub mod encoding;
pub mod type3;

use crate::document::Document;
use crate::error::{Error, Result};
use crate::object::{Dict, DictExt, Object};
use crate::raster::path::Path;
use cmap::CMap;
use std::sync::Arc;
use type3::Type3Font;

/// A glyph decoded from a text string.
#[derive(Debug, Clone)]
pub struct DecodedGlyph {
    /// Raw character code
    pub code: u32,
    /// CID (equals code for simple fonts)
    pub cid: u32,
    /// Glyph index in the font program (0 when unresolvable)
    pub gid: u16,
    /// Advance width in 1/1000 text space units
    pub width: f32,
    /// Text-extraction mapping, when known
    pub unicode: Option<String>,
    /// Bytes this glyph consumed from the string
    pub consumed: u8,
}

/// A simple (8-bit) Type 1 or TrueType font.
#[derive(Debug)]
pub struct SimpleFont {
    /// code -> glyph name, from base encoding + /Differences
    pub names: Vec<Option<String>>,
    /// /FirstChar
    pub first_char: u32,
    /// /Widths, indexed from first_char
    pub widths: Vec<f32>,
    /// /MissingWidth from the descriptor
    pub missing_width: f32,
    /// Symbolic flag from the descriptor
    pub symbolic: bool,
}

/// A CID-keyed composite font.
#[derive(Debug)]
pub struct CidFont {
    /// The /Encoding CMap (code -> CID)
    pub encoding: Arc<CMap>,
    /// None = identity; otherwise the /CIDToGIDMap table
    pub cid_to_gid: Option<Vec<u16>>,
    /// /DW default width
    pub default_width: f32,
    /// /W ranges: (first CID, last CID, width)
    pub widths: Vec<(u32, u32, f32)>,
}

/// Font variant payload.
pub enum FontKind {
    /// Simple 8-bit font
    Simple(SimpleFont),
    /// CID composite font
    Cid(CidFont),
    /// Type 3 charproc font
    Type3(Type3Font),
}

/// A loaded font resource.
pub struct Font {
    /// Resource name the content stream used
    pub name: String,
    /// /BaseFont
    pub base_font: String,
    /// Variant payload
    pub kind: FontKind,
    /// /ToUnicode CMap, when present
    pub to_unicode: Option<Arc<CMap>>,
    /// Embedded font program (TrueType/OpenType/CFF bytes)
    pub program: Option<Vec<u8>>,
}

impl std::fmt::Debug for Font {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Font")
            .field("name", &self.name)
            .field("base_font", &self.base_font)
            .field("embedded", &self.program.is_some())
            .finish()
    }
}

impl Font {
    /// Load a font from its resource dictionary.
    pub fn load(doc: &mut Document, dict: &Dict, name: &str) -> Result<Font> {
        let subtype = dict.get_name("Subtype").unwrap_or("Type1").to_string();
        let base_font = dict.get_name("BaseFont").unwrap_or(name).to_string();

        let to_unicode = match dict.get("ToUnicode") {
            Some(obj) => {
                let obj = obj.clone();
                match load_cmap_obj(doc, &obj) {
                    Ok(cmap) => Some(cmap),
                    Err(e) => {
                        log::warn!("font {base_font}: unusable ToUnicode: {e}");
                        None
                    },
                }
            },
            None => None,
        };

        let kind = match subtype.as_str() {
            "Type3" => FontKind::Type3(Type3Font::load(doc, dict)?),
            "Type0" => FontKind::Cid(load_cid_font(doc, dict)?),
            // Type1, MMType1, TrueType
            _ => FontKind::Simple(load_simple_font(doc, dict)?),
        };

        let program = match &kind {
            FontKind::Type3(_) => None,
            FontKind::Cid(_) => {
                let descendant = descendant_dict(doc, dict)?;
                load_font_program(doc, descendant.as_ref())?
            }
            FontKind::Simple(_) => load_font_program(doc, Some(dict))?,
        };

        if program.is_none() && !matches!(kind, FontKind::Type3(_)) {
            if encoding::is_base14(&base_font) {
                log::debug!("font {base_font}: using built-in standard-font metrics");
            } else {
                log::warn!("font {base_font}: no embedded program, glyphs will not render");
            }
        }

        Ok(Font {
            name: name.to_string(),
            base_font,
            kind,
            to_unicode,
            program,
        })
    }

    /// Writing mode: 0 horizontal, 1 vertical.
    pub fn wmode(&self) -> u8 {
        match &self.kind {
            FontKind::Cid(cid) => cid.encoding.wmode,
            _ => 0,
        }
    }

    /// Whether glyph outlines can be rasterized from an embedded program.
    pub fn is_embedded(&self) -> bool {
        self.program.is_some()
    }

    /// Decode a text string into positioned glyph records.
    pub fn decode_text(&self, bytes: &[u8]) -> Vec<DecodedGlyph> {
        match &self.kind {
            FontKind::Simple(simple) => self.decode_simple(simple, bytes),
            FontKind::Type3(t3) => self.decode_type3(t3, bytes),
            FontKind::Cid(cid) => self.decode_cid(cid, bytes),
        }
    }

    fn decode_simple(&self, simple: &SimpleFont, bytes: &[u8]) -> Vec<DecodedGlyph> {
        let face_data = self.program.as_deref();
        let face = face_data.and_then(|d| ttf_parser::Face::parse(d, 0).ok());

        bytes
            .iter()
            .map(|&code| {
                let name = simple.names.get(code as usize).and_then(Option::as_deref);
                let unicode = self
                    .to_unicode
                    .as_ref()
                    .and_then(|tu| tu.to_unicode(code as u32))
                    .or_else(|| {
                        name.and_then(encoding::glyph_name_to_unicode)
                            .map(String::from)
                    });
                let gid = resolve_simple_gid(face.as_ref(), simple, code, name, unicode.as_deref());
                let width = self.simple_width(simple, code, face.as_ref(), gid);
                DecodedGlyph {
                    code: code as u32,
                    cid: code as u32,
                    gid,
                    width,
                    unicode,
                    consumed: 1,
                }
            })
            .collect()
    }

    fn simple_width(
        &self,
        simple: &SimpleFont,
        code: u8,
        face: Option<&ttf_parser::Face<'_>>,
        gid: u16,
    ) -> f32 {
        let index = code as i64 - simple.first_char as i64;
        if index >= 0 {
            if let Some(&w) = simple.widths.get(index as usize) {
                if w > 0.0 {
                    return w;
                }
            }
        }
        if let Some(w) = encoding::base14_width(&self.base_font, code) {
            return w;
        }
        if let Some(face) = face {
            if let Some(adv) = face.glyph_hor_advance(ttf_parser::GlyphId(gid)) {
                return adv as f32 * 1000.0 / face.units_per_em() as f32;
            }
        }
        if simple.missing_width > 0.0 {
            simple.missing_width
        } else {
            500.0
        }
    }

    fn decode_type3(&self, t3: &Type3Font, bytes: &[u8]) -> Vec<DecodedGlyph> {
        bytes
            .iter()
            .map(|&code| {
                let unicode = self
                    .to_unicode
                    .as_ref()
                    .and_then(|tu| tu.to_unicode(code as u32))
                    .or_else(|| {
                        t3.encoding
                            .get(code as usize)
                            .and_then(Option::as_deref)
                            .and_then(encoding::glyph_name_to_unicode)
                            .map(String::from)
                    });
                // Type3 widths live in glyph space; map through the font
                // matrix into the per-mille convention of other fonts
                let width = t3
                    .advance_for_code(code)
                    .map_or(0.0, |w| w * t3.font_matrix.a * 1000.0);
                DecodedGlyph {
                    code: code as u32,
                    cid: code as u32,
                    gid: code as u16,
                    width,
                    unicode,
                    consumed: 1,
                }
            })
            .collect()
    }

    fn decode_cid(&self, cid_font: &CidFont, bytes: &[u8]) -> Vec<DecodedGlyph> {
        let face_data = self.program.as_deref();
        let face = face_data.and_then(|d| ttf_parser::Face::parse(d, 0).ok());

        cid_font
            .encoding
            .decode(bytes)
            .into_iter()
            .map(|(code, consumed)| {
                let cid = cid_font.encoding.lookup(code).unwrap_or(0);
                let gid = match &cid_font.cid_to_gid {
                    None => cid as u16,
                    Some(table) => table.get(cid as usize).copied().unwrap_or(0),
                };
                let width = cid_width(cid_font, cid).unwrap_or_else(|| {
                    face.as_ref()
                        .and_then(|f| f.glyph_hor_advance(ttf_parser::GlyphId(gid)))
                        .map_or(cid_font.default_width, |adv| {
                            adv as f32 * 1000.0
                                / face.as_ref().map_or(1000, |f| f.units_per_em()) as f32
                        })
                });
                let unicode = self
                    .to_unicode
                    .as_ref()
                    .and_then(|tu| tu.to_unicode(code));
                DecodedGlyph {
                    code,
                    cid,
                    gid,
                    width,
                    unicode,
                    consumed,
                }
            })
            .collect()
    }

    /// Extract a glyph outline from the embedded program.
    ///
    /// Returns the path in font units plus units-per-em; callers compose
    /// `scale(1/upem)` into the glyph transform.
    pub fn glyph_path(&self, gid: u16) -> Option<(Path, f32)> {
        let data = self.program.as_deref()?;
        let face = ttf_parser::Face::parse(data, 0).ok()?;
        let mut builder = OutlineCollector { path: Path::new() };
        face.outline_glyph(ttf_parser::GlyphId(gid), &mut builder)?;
        Some((builder.path, face.units_per_em() as f32))
    }
}

struct OutlineCollector {
    path: Path,
}

impl ttf_parser::OutlineBuilder for OutlineCollector {
    fn move_to(&mut self, x: f32, y: f32) {
        self.path.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.path.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        // Quadratic to cubic elevation
        let from = self.path.current_point().unwrap_or_default();
        let c1x = from.x + 2.0 / 3.0 * (x1 - from.x);
        let c1y = from.y + 2.0 / 3.0 * (y1 - from.y);
        let c2x = x + 2.0 / 3.0 * (x1 - x);
        let c2y = y + 2.0 / 3.0 * (y1 - y);
        self.path.curve_to(c1x, c1y, c2x, c2y, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.path.curve_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.path.close();
    }
}

/// Resolve a simple-font code to a glyph index.
fn resolve_simple_gid(
    face: Option<&ttf_parser::Face<'_>>,
    simple: &SimpleFont,
    code: u8,
    name: Option<&str>,
    unicode: Option<&str>,
) -> u16 {
    let Some(face) = face else {
        return code as u16;
    };
    // Non-symbolic: go through the Unicode cmap via the glyph name
    if !simple.symbolic {
        if let Some(c) = name
            .and_then(encoding::glyph_name_to_unicode)
            .or_else(|| unicode.and_then(|u| u.chars().next()))
        {
            if let Some(gid) = face.glyph_index(c) {
                return gid.0;
            }
        }
    }
    // Symbolic fallback: (3,0) cmaps live at 0xF000 + code, then raw code
    for candidate in [0xF000 + code as u32, code as u32] {
        if let Some(c) = char::from_u32(candidate) {
            if let Some(gid) = face.glyph_index(c) {
                return gid.0;
            }
        }
    }
    code as u16
}

fn cid_width(font: &CidFont, cid: u32) -> Option<f32> {
    font.widths
        .iter()
        .find(|&&(first, last, _)| cid >= first && cid <= last)
        .map(|&(_, _, w)| w)
}

fn load_cmap_obj(doc: &mut Document, obj: &Object) -> Result<Arc<CMap>> {
    let re = obj.as_ref();
    if let Some(re) = re {
        if let Some(crate::document::Resource::CMap(cmap)) = doc.store.get(re) {
            return Ok(cmap);
        }
    }
    let cmap = match doc.resolve(obj)? {
        Object::Name(n) => CMap::predefined(n.as_str())?,
        Object::Stream(stream) => {
            let bytes = doc.decode_stream(&stream, re)?;
            CMap::parse(&bytes)?
        },
        other => {
            return Err(Error::syntax(format!(
                "CMap must be a name or stream, found {}",
                other.type_name()
            )));
        },
    };
    let cmap = Arc::new(cmap);
    if let Some(re) = re {
        doc.store
            .put(re, crate::document::Resource::CMap(cmap.clone()));
    }
    Ok(cmap)
}

fn load_simple_font(doc: &mut Document, dict: &Dict) -> Result<SimpleFont> {
    let descriptor = match doc.resolve_key(dict, "FontDescriptor")? {
        Object::Dict(d) => Some(d),
        _ => None,
    };
    let flags = descriptor
        .as_ref()
        .and_then(|d| d.get_int("Flags"))
        .unwrap_or(0);
    let symbolic = flags & 4 != 0 && flags & 32 == 0;

    // Base encoding, then /Differences on top
    let mut base = if symbolic { "" } else { "StandardEncoding" }.to_string();
    let mut names: Vec<Option<String>> = vec![None; 256];
    let mut differences: Vec<Object> = Vec::new();

    match doc.resolve_key(dict, "Encoding")? {
        Object::Name(n) => base = n.as_str().to_string(),
        Object::Dict(enc) => {
            if let Some(b) = enc.get_name("BaseEncoding") {
                base = b.to_string();
            }
            if let Some(diffs) = enc.get_array("Differences") {
                differences = diffs.to_vec();
            }
        },
        _ => {},
    }

    if !base.is_empty() {
        for code in 0..=255u8 {
            names[code as usize] =
                encoding::base_encoding_name(&base, code).map(str::to_string);
        }
    }
    let mut code = 0usize;
    for item in &differences {
        match item {
            Object::Int(n) => code = (*n).clamp(0, 255) as usize,
            Object::Name(n) => {
                if code < 256 {
                    names[code] = Some(n.as_str().to_string());
                    code += 1;
                }
            },
            _ => {},
        }
    }

    let first_char = doc.resolve_key(dict, "FirstChar")?.as_int().unwrap_or(0).max(0) as u32;
    let widths = match doc.resolve_key(dict, "Widths")? {
        Object::Array(arr) => arr
            .iter()
            .map(|o| o.as_number().unwrap_or(0.0) as f32)
            .collect(),
        _ => Vec::new(),
    };
    let missing_width = descriptor
        .as_ref()
        .and_then(|d| d.get_number("MissingWidth"))
        .unwrap_or(0.0) as f32;

    Ok(SimpleFont {
        names,
        first_char,
        widths,
        missing_width,
        symbolic,
    })
}

fn descendant_dict(doc: &mut Document, dict: &Dict) -> Result<Option<Dict>> {
    let descendants = doc.resolve_key(dict, "DescendantFonts")?;
    let Some(arr) = descendants.as_array() else {
        return Ok(None);
    };
    let Some(first) = arr.first() else {
        return Ok(None);
    };
    Ok(match doc.resolve(first)? {
        Object::Dict(d) => Some(d),
        _ => None,
    })
}

fn load_cid_font(doc: &mut Document, dict: &Dict) -> Result<CidFont> {
    let encoding = match dict.get("Encoding") {
        Some(obj) => {
            let obj = obj.clone();
            match load_cmap_obj(doc, &obj) {
                Ok(cmap) => cmap,
                Err(e) => {
                    log::warn!("CID font encoding unusable ({e}), using Identity-H");
                    Arc::new(CMap::identity(0))
                },
            }
        },
        None => Arc::new(CMap::identity(0)),
    };

    let descendant = descendant_dict(doc, dict)?
        .ok_or_else(|| Error::syntax("Type0 font without descendant"))?;

    let cid_to_gid = match doc.resolve_key(&descendant, "CIDToGIDMap")? {
        Object::Stream(stream) => {
            let bytes = doc.decode_stream(&stream, None)?;
            Some(
                bytes
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect(),
            )
        },
        // /Identity or absent
        _ => None,
    };

    let default_width = doc
        .resolve_key(&descendant, "DW")?
        .as_number()
        .unwrap_or(1000.0) as f32;

    let widths = match doc.resolve_key(&descendant, "W")? {
        Object::Array(arr) => parse_cid_widths(doc, &arr)?,
        _ => Vec::new(),
    };

    Ok(CidFont {
        encoding,
        cid_to_gid,
        default_width,
        widths,
    })
}

/// Parse the /W array: `c [w1 w2 ...]` or `cfirst clast w` runs.
fn parse_cid_widths(doc: &mut Document, arr: &[Object]) -> Result<Vec<(u32, u32, f32)>> {
    let mut out = Vec::new();
    let mut i = 0usize;
    while i < arr.len() {
        let first = doc.resolve(&arr[i])?.as_number().unwrap_or(0.0) as u32;
        i += 1;
        if i >= arr.len() {
            break;
        }
        match doc.resolve(&arr[i])? {
            Object::Array(ws) => {
                for (k, w) in ws.iter().enumerate() {
                    let w = w.as_number().unwrap_or(0.0) as f32;
                    let cid = first + k as u32;
                    out.push((cid, cid, w));
                }
                i += 1;
            },
            last_obj => {
                let last = last_obj.as_number().unwrap_or(first as f64) as u32;
                if i + 1 < arr.len() {
                    let w = doc.resolve(&arr[i + 1])?.as_number().unwrap_or(0.0) as f32;
                    out.push((first, last.max(first), w));
                }
                i += 2;
            },
        }
    }
    Ok(out)
}

fn load_font_program(doc: &mut Document, dict: Option<&Dict>) -> Result<Option<Vec<u8>>> {
    let Some(dict) = dict else {
        return Ok(None);
    };
    let descriptor = match doc.resolve_key(dict, "FontDescriptor")? {
        Object::Dict(d) => d,
        _ => return Ok(None),
    };
    for key in ["FontFile2", "FontFile3", "FontFile"] {
        if let Some(obj) = descriptor.get(key) {
            let re = obj.as_ref();
            match doc.resolve(obj)? {
                Object::Stream(stream) => match doc.decode_stream(&stream, re) {
                    Ok(bytes) => {
                        if key == "FontFile" {
                            // Bare Type 1 programs are not parseable by the
                            // TrueType/CFF path; degrade to metrics-only
                            log::warn!("Type 1 font program not rasterizable, metrics only");
                            return Ok(None);
                        }
                        return Ok(Some(bytes));
                    },
                    Err(e) => log::warn!("unreadable /{key}: {e}"),
                },
                _ => {},
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::Name;
    use bytes::Bytes;

    fn doc() -> Document {
        let pdf = crate::document::test_pdf("0 0 100 100", "");
        Document::from_bytes(Bytes::from(pdf)).unwrap()
    }

    fn helvetica_dict() -> Dict {
        let mut dict = Dict::new();
        dict.insert(Name::new("Type"), Object::Name("Font".into()));
        dict.insert(Name::new("Subtype"), Object::Name("Type1".into()));
        dict.insert(Name::new("BaseFont"), Object::Name("Helvetica".into()));
        dict
    }

    #[test]
    fn test_load_base14_helvetica() {
        let mut doc = doc();
        let font = Font::load(&mut doc, &helvetica_dict(), "F1").unwrap();
        assert_eq!(font.base_font, "Helvetica");
        assert!(!font.is_embedded());

        let glyphs = font.decode_text(b"Hi");
        assert_eq!(glyphs.len(), 2);
        assert_eq!(glyphs[0].width, 722.0); // H
        assert_eq!(glyphs[1].width, 222.0); // i
        assert_eq!(glyphs[0].unicode.as_deref(), Some("H"));
        assert_eq!(glyphs[1].unicode.as_deref(), Some("i"));
    }

    #[test]
    fn test_widths_array_overrides_builtin() {
        let mut doc = doc();
        let mut dict = helvetica_dict();
        dict.insert(Name::new("FirstChar"), Object::Int(72)); // 'H'
        dict.insert(Name::new("Widths"), Object::Array(vec![Object::Int(999)]));
        let font = Font::load(&mut doc, &dict, "F1").unwrap();
        let glyphs = font.decode_text(b"H");
        assert_eq!(glyphs[0].width, 999.0);
    }

    #[test]
    fn test_differences_override_encoding() {
        let mut doc = doc();
        let mut enc = Dict::new();
        enc.insert(
            Name::new("Differences"),
            Object::Array(vec![Object::Int(72), Object::Name("space".into())]),
        );
        let mut dict = helvetica_dict();
        dict.insert(Name::new("Encoding"), Object::Dict(enc));
        let font = Font::load(&mut doc, &dict, "F1").unwrap();
        let glyphs = font.decode_text(b"H");
        // Code 72 now names /space
        assert_eq!(glyphs[0].unicode.as_deref(), Some(" "));
    }

    #[test]
    fn test_cid_identity_font() {
        let mut doc = doc();
        let mut descendant = Dict::new();
        descendant.insert(Name::new("Subtype"), Object::Name("CIDFontType2".into()));
        descendant.insert(Name::new("DW"), Object::Int(800));
        descendant.insert(
            Name::new("W"),
            Object::Array(vec![
                Object::Int(10),
                Object::Array(vec![Object::Int(450), Object::Int(460)]),
            ]),
        );
        let mut dict = Dict::new();
        dict.insert(Name::new("Subtype"), Object::Name("Type0".into()));
        dict.insert(Name::new("BaseFont"), Object::Name("Embedded".into()));
        dict.insert(Name::new("Encoding"), Object::Name("Identity-H".into()));
        dict.insert(
            Name::new("DescendantFonts"),
            Object::Array(vec![Object::Dict(descendant)]),
        );

        let font = Font::load(&mut doc, &dict, "F2").unwrap();
        let glyphs = font.decode_text(&[0x00, 0x0A, 0x00, 0x0B, 0x00, 0x63]);
        assert_eq!(glyphs.len(), 3);
        assert_eq!(glyphs[0].cid, 10);
        assert_eq!(glyphs[0].width, 450.0);
        assert_eq!(glyphs[1].width, 460.0);
        assert_eq!(glyphs[2].width, 800.0); // default
        assert_eq!(glyphs[0].consumed, 2);
    }

    #[test]
    fn test_cid_width_ranges() {
        let font = CidFont {
            encoding: Arc::new(CMap::identity(0)),
            cid_to_gid: None,
            default_width: 1000.0,
            widths: vec![(5, 9, 300.0)],
        };
        assert_eq!(cid_width(&font, 7), Some(300.0));
        assert_eq!(cid_width(&font, 10), None);
    }
}
