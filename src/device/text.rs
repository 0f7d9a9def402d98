//! Text-extraction device.
//!
//! Collects positioned glyphs with their Unicode decoding (via ToUnicode
//! CMaps or encoding glyph names) into spans. Invisible text (render mode
//! 3) is collected too, which is how OCR'd scan layers surface.

use super::{Device, DeviceCaps, Paint, TextSpan};
use crate::error::Result;
use crate::geometry::{Matrix, Point};
use crate::raster::path::StrokeState;

/// One extracted character.
#[derive(Debug, Clone)]
pub struct ExtractedChar {
    /// Unicode text (may be multiple scalar values for ligatures)
    pub text: String,
    /// Baseline origin in device space
    pub origin: Point,
    /// Font size in device units
    pub size: f32,
}

/// A run of characters sharing a font.
#[derive(Debug, Clone)]
pub struct ExtractedSpan {
    /// /BaseFont of the run
    pub font_name: String,
    /// Writing mode
    pub wmode: u8,
    /// The characters
    pub chars: Vec<ExtractedChar>,
}

/// Device that records text content instead of drawing it.
#[derive(Debug, Default)]
pub struct TextDevice {
    /// Extracted spans in drawing order
    pub spans: Vec<ExtractedSpan>,
}

impl TextDevice {
    /// A fresh text device.
    pub fn new() -> Self {
        Self::default()
    }

    /// All extracted text concatenated in drawing order.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for span in &self.spans {
            for ch in &span.chars {
                out.push_str(&ch.text);
            }
        }
        out
    }

    fn record(&mut self, span: &TextSpan, ctm: &Matrix) {
        let mut chars = Vec::with_capacity(span.items.len());
        for item in &span.items {
            let trm = item.trm.concat(ctm);
            let origin = trm.transform_point(Point::new(0.0, 0.0));
            // Device-space size: vertical extent of the glyph transform
            let size = (trm.b * trm.b + trm.d * trm.d).sqrt();
            let text = match &item.unicode {
                Some(u) if !u.is_empty() => u.clone(),
                // No mapping: U+FFFD keeps positions aligned
                _ => "\u{FFFD}".to_string(),
            };
            chars.push(ExtractedChar { text, origin, size });
        }
        self.spans.push(ExtractedSpan {
            font_name: span.font.base_font.clone(),
            wmode: span.wmode,
            chars,
        });
    }
}

impl Device for TextDevice {
    fn caps(&self) -> DeviceCaps {
        DeviceCaps::WANTS_TEXT
    }

    fn fill_text(&mut self, span: &TextSpan, ctm: &Matrix, _paint: &Paint) -> Result<()> {
        self.record(span, ctm);
        Ok(())
    }

    fn stroke_text(
        &mut self,
        span: &TextSpan,
        _stroke: &StrokeState,
        ctm: &Matrix,
        _paint: &Paint,
    ) -> Result<()> {
        self.record(span, ctm);
        Ok(())
    }

    fn clip_text(&mut self, span: &TextSpan, ctm: &Matrix) -> Result<()> {
        self.record(span, ctm);
        Ok(())
    }

    fn ignore_text(&mut self, span: &TextSpan, ctm: &Matrix) -> Result<()> {
        self.record(span, ctm);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::TextItem;
    use crate::fonts::{Font, FontKind, SimpleFont};
    use std::sync::Arc;

    fn test_font() -> Arc<Font> {
        Arc::new(Font {
            name: "F1".into(),
            base_font: "Helvetica".into(),
            kind: FontKind::Simple(SimpleFont {
                names: vec![None; 256],
                first_char: 0,
                widths: Vec::new(),
                missing_width: 0.0,
                symbolic: false,
            }),
            to_unicode: None,
            program: None,
        })
    }

    #[test]
    fn test_records_unicode_and_position() {
        let mut dev = TextDevice::new();
        let span = TextSpan {
            font: test_font(),
            wmode: 0,
            items: vec![TextItem {
                gid: 1,
                cid: 72,
                unicode: Some("H".into()),
                trm: Matrix::new(12.0, 0.0, 0.0, 12.0, 10.0, 20.0),
            }],
        };
        dev.fill_text(&span, &Matrix::IDENTITY, &Paint::black()).unwrap();
        assert_eq!(dev.text(), "H");
        let ch = &dev.spans[0].chars[0];
        assert_eq!(ch.origin, Point::new(10.0, 20.0));
        assert!((ch.size - 12.0).abs() < 1e-4);
        assert_eq!(dev.spans[0].font_name, "Helvetica");
    }

    #[test]
    fn test_invisible_text_still_extracted() {
        let mut dev = TextDevice::new();
        let span = TextSpan {
            font: test_font(),
            wmode: 0,
            items: vec![TextItem {
                gid: 0,
                cid: 0,
                unicode: Some("x".into()),
                trm: Matrix::IDENTITY,
            }],
        };
        dev.ignore_text(&span, &Matrix::IDENTITY).unwrap();
        assert_eq!(dev.text(), "x");
    }

    #[test]
    fn test_missing_unicode_becomes_replacement() {
        let mut dev = TextDevice::new();
        let span = TextSpan {
            font: test_font(),
            wmode: 0,
            items: vec![TextItem {
                gid: 5,
                cid: 5,
                unicode: None,
                trm: Matrix::IDENTITY,
            }],
        };
        dev.fill_text(&span, &Matrix::IDENTITY, &Paint::black()).unwrap();
        assert_eq!(dev.text(), "\u{FFFD}");
    }
}
