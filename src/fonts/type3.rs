//! Type 3 fonts: glyphs defined by PDF content streams.
//!
//! Each glyph is a charproc the interpreter replays through the device,
//! transformed by the font matrix. Widths come from /Widths; a glyph's
//! `d0`/`d1` operator can override at execution time. Bounding boxes are
//! derived on demand by running the charproc through the bbox device, and
//! cached.

use crate::document::Document;
use crate::error::Result;
use crate::geometry::{Matrix, Rect};
use crate::object::{Dict, DictExt, Object};
use std::collections::HashMap;
use std::sync::Mutex;

/// A Type 3 font: charprocs plus the glyph-space transform.
#[derive(Debug)]
pub struct Type3Font {
    /// Maps glyph space to text space
    pub font_matrix: Matrix,
    /// Decoded charproc content streams by glyph name
    pub char_procs: HashMap<String, Vec<u8>>,
    /// code -> glyph name (from /Encoding /Differences)
    pub encoding: Vec<Option<String>>,
    /// Resources for charproc execution (falls back to the page's)
    pub resources: Dict,
    /// /FontBBox, possibly degenerate (all zero is legal)
    pub font_bbox: Rect,
    /// /FirstChar for the widths table
    pub first_char: u32,
    /// /Widths in glyph space, indexed from first_char
    pub widths: Vec<f32>,
    /// Per-glyph bbox cache filled by bounds-only runs
    bbox_cache: Mutex<HashMap<String, Rect>>,
}

impl Type3Font {
    /// Load a Type 3 font from its dictionary.
    pub fn load(doc: &mut Document, dict: &Dict) -> Result<Type3Font> {
        let matrix_vals = doc.resolve_key(dict, "FontMatrix")?;
        let font_matrix = match matrix_vals.as_array() {
            Some([a, b, c, d, e, f]) => Matrix::new(
                a.as_number().unwrap_or(0.001) as f32,
                b.as_number().unwrap_or(0.0) as f32,
                c.as_number().unwrap_or(0.0) as f32,
                d.as_number().unwrap_or(0.001) as f32,
                e.as_number().unwrap_or(0.0) as f32,
                f.as_number().unwrap_or(0.0) as f32,
            ),
            _ => Matrix::new(0.001, 0.0, 0.0, 0.001, 0.0, 0.0),
        };

        let font_bbox = match doc.resolve_key(dict, "FontBBox")?.as_array() {
            Some([a, b, c, d]) => Rect::new(
                a.as_number().unwrap_or(0.0) as f32,
                b.as_number().unwrap_or(0.0) as f32,
                c.as_number().unwrap_or(0.0) as f32,
                d.as_number().unwrap_or(0.0) as f32,
            ),
            _ => Rect::new(0.0, 0.0, 0.0, 0.0),
        };

        let mut char_procs = HashMap::new();
        if let Object::Dict(procs) = doc.resolve_key(dict, "CharProcs")? {
            for (name, proc_obj) in &procs {
                let Some(re) = proc_obj.as_ref() else {
                    continue;
                };
                match doc.open_stream(re) {
                    Ok(bytes) => {
                        char_procs.insert(name.as_str().to_string(), bytes);
                    },
                    Err(e) => log::warn!("unreadable charproc /{name}: {e}"),
                }
            }
        }

        let mut encoding = vec![None; 256];
        if let Object::Dict(enc) = doc.resolve_key(dict, "Encoding")? {
            if let Some(diffs) = enc.get_array("Differences") {
                let mut code = 0usize;
                for item in diffs {
                    match item {
                        Object::Int(n) => code = (*n).clamp(0, 255) as usize,
                        Object::Name(n) => {
                            if code < 256 {
                                encoding[code] = Some(n.as_str().to_string());
                                code += 1;
                            }
                        },
                        _ => {},
                    }
                }
            }
        }

        let resources = match doc.resolve_key(dict, "Resources")? {
            Object::Dict(res) => res,
            _ => Dict::new(),
        };

        let first_char = doc.resolve_key(dict, "FirstChar")?.as_int().unwrap_or(0).max(0) as u32;
        let widths = match doc.resolve_key(dict, "Widths")? {
            Object::Array(arr) => arr
                .iter()
                .map(|o| o.as_number().unwrap_or(0.0) as f32)
                .collect(),
            _ => Vec::new(),
        };

        Ok(Type3Font {
            font_matrix,
            char_procs,
            encoding,
            resources,
            font_bbox,
            first_char,
            widths,
            bbox_cache: Mutex::new(HashMap::new()),
        })
    }

    /// Glyph-space advance for a code from /Widths, if declared.
    pub fn advance_for_code(&self, code: u8) -> Option<f32> {
        let index = code as i64 - self.first_char as i64;
        if index < 0 {
            return None;
        }
        self.widths.get(index as usize).copied()
    }

    /// The charproc for a character code, via the encoding.
    pub fn proc_for_code(&self, code: u8) -> Option<(&str, &[u8])> {
        let name = self.encoding.get(code as usize)?.as_deref()?;
        let stream = self.char_procs.get(name)?;
        Some((name, stream))
    }

    /// Cached glyph bbox, computed by the caller on miss via a bounds-only
    /// device run and stored with [`Type3Font::store_bbox`].
    pub fn cached_bbox(&self, name: &str) -> Option<Rect> {
        self.bbox_cache.lock().ok()?.get(name).copied()
    }

    /// Install a derived glyph bbox.
    pub fn store_bbox(&self, name: &str, bbox: Rect) {
        if let Ok(mut cache) = self.bbox_cache.lock() {
            cache.insert(name.to_string(), bbox);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_differences_order() {
        // Simulate what load() builds from /Differences [65 /square /circle]
        let mut font = Type3Font {
            font_matrix: Matrix::new(0.001, 0.0, 0.0, 0.001, 0.0, 0.0),
            char_procs: HashMap::new(),
            encoding: vec![None; 256],
            resources: Dict::new(),
            font_bbox: Rect::new(0.0, 0.0, 0.0, 0.0),
            first_char: 0,
            widths: Vec::new(),
            bbox_cache: Mutex::new(HashMap::new()),
        };
        font.encoding[65] = Some("square".into());
        font.encoding[66] = Some("circle".into());
        font.char_procs.insert("square".into(), b"0 0 10 10 re f".to_vec());

        let (name, stream) = font.proc_for_code(65).unwrap();
        assert_eq!(name, "square");
        assert!(!stream.is_empty());
        // Encoded but no charproc
        assert!(font.proc_for_code(66).is_none());
        // Unencoded
        assert!(font.proc_for_code(67).is_none());
    }

    #[test]
    fn test_bbox_cache() {
        let font = Type3Font {
            font_matrix: Matrix::IDENTITY,
            char_procs: HashMap::new(),
            encoding: vec![None; 256],
            resources: Dict::new(),
            font_bbox: Rect::new(0.0, 0.0, 0.0, 0.0),
            first_char: 0,
            widths: Vec::new(),
            bbox_cache: Mutex::new(HashMap::new()),
        };
        assert!(font.cached_bbox("g").is_none());
        font.store_bbox("g", Rect::new(0.0, 0.0, 5.0, 5.0));
        assert_eq!(font.cached_bbox("g"), Some(Rect::new(0.0, 0.0, 5.0, 5.0)));
    }
}
