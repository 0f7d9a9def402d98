//! Content-stream operators.
//!
//! The typed operator set the content parser produces and processors
//! consume. Every variant retains its operands, so an operator sequence
//! can be serialized back out (the buffer processor) as well as executed
//! (the run processor).

use crate::names::Name;
use crate::object::{Dict, Object};
use crate::parser::write_object;

/// One content-stream operator with its operands.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    // Graphics state
    /// q
    Save,
    /// Q
    Restore,
    /// cm
    Concat([f32; 6]),
    /// w
    LineWidth(f32),
    /// J
    LineCap(i64),
    /// j
    LineJoin(i64),
    /// M
    MiterLimit(f32),
    /// d
    Dash(Vec<f32>, f32),
    /// ri
    RenderingIntent(Name),
    /// i
    Flatness(f32),
    /// gs
    ExtGState(Name),

    // Path construction
    /// m
    MoveTo(f32, f32),
    /// l
    LineTo(f32, f32),
    /// c
    CurveTo(f32, f32, f32, f32, f32, f32),
    /// v
    CurveToV(f32, f32, f32, f32),
    /// y
    CurveToY(f32, f32, f32, f32),
    /// h
    ClosePath,
    /// re
    Rect(f32, f32, f32, f32),

    // Path painting
    /// S
    Stroke,
    /// s
    CloseStroke,
    /// f or F
    Fill,
    /// f*
    FillEvenOdd,
    /// B
    FillStroke,
    /// B*
    FillStrokeEvenOdd,
    /// b
    CloseFillStroke,
    /// b*
    CloseFillStrokeEvenOdd,
    /// n
    EndPath,

    // Clipping
    /// W
    Clip,
    /// W*
    ClipEvenOdd,

    // Text objects
    /// BT
    BeginText,
    /// ET
    EndText,

    // Text state
    /// Tc
    CharSpacing(f32),
    /// Tw
    WordSpacing(f32),
    /// Tz
    HorizScale(f32),
    /// TL
    Leading(f32),
    /// Tf
    SetFont(Name, f32),
    /// Tr
    RenderMode(i64),
    /// Ts
    Rise(f32),

    // Text positioning
    /// Td
    TextMove(f32, f32),
    /// TD
    TextMoveSetLeading(f32, f32),
    /// Tm
    TextMatrix([f32; 6]),
    /// T*
    NextLine,

    // Text showing
    /// Tj
    ShowText(Vec<u8>),
    /// TJ: strings and kerning adjustments in thousandths
    ShowTextAdjusted(Vec<TextElement>),
    /// '
    NextLineShow(Vec<u8>),
    /// "
    NextLineShowSpaced(f32, f32, Vec<u8>),

    // Type 3 glyph metrics
    /// d0
    GlyphWidth(f32, f32),
    /// d1
    GlyphWidthBBox(f32, f32, f32, f32, f32, f32),

    // Color
    /// CS
    StrokeColorSpace(Name),
    /// cs
    FillColorSpace(Name),
    /// SC
    StrokeColor(Vec<f32>),
    /// SCN
    StrokeColorN(Vec<f32>, Option<Name>),
    /// sc
    FillColor(Vec<f32>),
    /// scn
    FillColorN(Vec<f32>, Option<Name>),
    /// G
    StrokeGray(f32),
    /// g
    FillGray(f32),
    /// RG
    StrokeRgb(f32, f32, f32),
    /// rg
    FillRgb(f32, f32, f32),
    /// K
    StrokeCmyk(f32, f32, f32, f32),
    /// k
    FillCmyk(f32, f32, f32, f32),

    // Shading
    /// sh
    ShFill(Name),

    // XObjects and inline images
    /// Do
    XObject(Name),
    /// BI ... ID ... EI
    InlineImage(Dict, Vec<u8>),

    // Marked content
    /// MP
    MarkPoint(Name),
    /// DP
    MarkPointProps(Name, Object),
    /// BMC
    BeginMarked(Name),
    /// BDC
    BeginMarkedProps(Name, Object),
    /// EMC
    EndMarked,

    // Compatibility
    /// BX
    BeginCompat,
    /// EX
    EndCompat,

    /// Operator outside the known set (dropped inside BX..EX)
    Unknown(String, Vec<Object>),
}

/// A TJ array element: glyphs or a kerning adjustment.
#[derive(Debug, Clone, PartialEq)]
pub enum TextElement {
    /// A string of character codes
    Text(Vec<u8>),
    /// A displacement in thousandths of the font size (subtracted)
    Adjust(f32),
}

fn write_nums(out: &mut Vec<u8>, nums: &[f32]) {
    for n in nums {
        write_object(&Object::Real(*n as f64), out);
        out.push(b' ');
    }
}

fn write_name(out: &mut Vec<u8>, name: &Name) {
    write_object(&Object::Name(name.clone()), out);
    out.push(b' ');
}

fn write_string(out: &mut Vec<u8>, s: &[u8]) {
    write_object(&Object::String(s.to_vec()), out);
    out.push(b' ');
}

impl Op {
    /// Serialize the operator (operands then keyword) back to content
    /// stream syntax, followed by a newline.
    pub fn write(&self, out: &mut Vec<u8>) {
        match self {
            Op::Save => out.extend_from_slice(b"q"),
            Op::Restore => out.extend_from_slice(b"Q"),
            Op::Concat(m) => {
                write_nums(out, m);
                out.extend_from_slice(b"cm");
            },
            Op::LineWidth(w) => {
                write_nums(out, &[*w]);
                out.extend_from_slice(b"w");
            },
            Op::LineCap(c) => {
                out.extend_from_slice(format!("{c} J").as_bytes());
            },
            Op::LineJoin(j) => {
                out.extend_from_slice(format!("{j} j").as_bytes());
            },
            Op::MiterLimit(m) => {
                write_nums(out, &[*m]);
                out.extend_from_slice(b"M");
            },
            Op::Dash(dashes, phase) => {
                out.push(b'[');
                write_nums(out, dashes);
                out.push(b']');
                out.push(b' ');
                write_nums(out, &[*phase]);
                out.extend_from_slice(b"d");
            },
            Op::RenderingIntent(n) => {
                write_name(out, n);
                out.extend_from_slice(b"ri");
            },
            Op::Flatness(f) => {
                write_nums(out, &[*f]);
                out.extend_from_slice(b"i");
            },
            Op::ExtGState(n) => {
                write_name(out, n);
                out.extend_from_slice(b"gs");
            },
            Op::MoveTo(x, y) => {
                write_nums(out, &[*x, *y]);
                out.extend_from_slice(b"m");
            },
            Op::LineTo(x, y) => {
                write_nums(out, &[*x, *y]);
                out.extend_from_slice(b"l");
            },
            Op::CurveTo(a, b, c, d, e, f) => {
                write_nums(out, &[*a, *b, *c, *d, *e, *f]);
                out.extend_from_slice(b"c");
            },
            Op::CurveToV(a, b, c, d) => {
                write_nums(out, &[*a, *b, *c, *d]);
                out.extend_from_slice(b"v");
            },
            Op::CurveToY(a, b, c, d) => {
                write_nums(out, &[*a, *b, *c, *d]);
                out.extend_from_slice(b"y");
            },
            Op::ClosePath => out.extend_from_slice(b"h"),
            Op::Rect(x, y, w, h) => {
                write_nums(out, &[*x, *y, *w, *h]);
                out.extend_from_slice(b"re");
            },
            Op::Stroke => out.extend_from_slice(b"S"),
            Op::CloseStroke => out.extend_from_slice(b"s"),
            Op::Fill => out.extend_from_slice(b"f"),
            Op::FillEvenOdd => out.extend_from_slice(b"f*"),
            Op::FillStroke => out.extend_from_slice(b"B"),
            Op::FillStrokeEvenOdd => out.extend_from_slice(b"B*"),
            Op::CloseFillStroke => out.extend_from_slice(b"b"),
            Op::CloseFillStrokeEvenOdd => out.extend_from_slice(b"b*"),
            Op::EndPath => out.extend_from_slice(b"n"),
            Op::Clip => out.extend_from_slice(b"W"),
            Op::ClipEvenOdd => out.extend_from_slice(b"W*"),
            Op::BeginText => out.extend_from_slice(b"BT"),
            Op::EndText => out.extend_from_slice(b"ET"),
            Op::CharSpacing(v) => {
                write_nums(out, &[*v]);
                out.extend_from_slice(b"Tc");
            },
            Op::WordSpacing(v) => {
                write_nums(out, &[*v]);
                out.extend_from_slice(b"Tw");
            },
            Op::HorizScale(v) => {
                write_nums(out, &[*v]);
                out.extend_from_slice(b"Tz");
            },
            Op::Leading(v) => {
                write_nums(out, &[*v]);
                out.extend_from_slice(b"TL");
            },
            Op::SetFont(n, size) => {
                write_name(out, n);
                write_nums(out, &[*size]);
                out.extend_from_slice(b"Tf");
            },
            Op::RenderMode(m) => {
                out.extend_from_slice(format!("{m} Tr").as_bytes());
            },
            Op::Rise(v) => {
                write_nums(out, &[*v]);
                out.extend_from_slice(b"Ts");
            },
            Op::TextMove(x, y) => {
                write_nums(out, &[*x, *y]);
                out.extend_from_slice(b"Td");
            },
            Op::TextMoveSetLeading(x, y) => {
                write_nums(out, &[*x, *y]);
                out.extend_from_slice(b"TD");
            },
            Op::TextMatrix(m) => {
                write_nums(out, m);
                out.extend_from_slice(b"Tm");
            },
            Op::NextLine => out.extend_from_slice(b"T*"),
            Op::ShowText(s) => {
                write_string(out, s);
                out.extend_from_slice(b"Tj");
            },
            Op::ShowTextAdjusted(elements) => {
                out.push(b'[');
                for el in elements {
                    match el {
                        TextElement::Text(s) => write_string(out, s),
                        TextElement::Adjust(a) => write_nums(out, &[*a]),
                    }
                }
                out.extend_from_slice(b"] TJ");
            },
            Op::NextLineShow(s) => {
                write_string(out, s);
                out.push(b'\'');
            },
            Op::NextLineShowSpaced(aw, ac, s) => {
                write_nums(out, &[*aw, *ac]);
                write_string(out, s);
                out.push(b'"');
            },
            Op::GlyphWidth(wx, wy) => {
                write_nums(out, &[*wx, *wy]);
                out.extend_from_slice(b"d0");
            },
            Op::GlyphWidthBBox(wx, wy, a, b, c, d) => {
                write_nums(out, &[*wx, *wy, *a, *b, *c, *d]);
                out.extend_from_slice(b"d1");
            },
            Op::StrokeColorSpace(n) => {
                write_name(out, n);
                out.extend_from_slice(b"CS");
            },
            Op::FillColorSpace(n) => {
                write_name(out, n);
                out.extend_from_slice(b"cs");
            },
            Op::StrokeColor(c) => {
                write_nums(out, c);
                out.extend_from_slice(b"SC");
            },
            Op::StrokeColorN(c, name) => {
                write_nums(out, c);
                if let Some(n) = name {
                    write_name(out, n);
                }
                out.extend_from_slice(b"SCN");
            },
            Op::FillColor(c) => {
                write_nums(out, c);
                out.extend_from_slice(b"sc");
            },
            Op::FillColorN(c, name) => {
                write_nums(out, c);
                if let Some(n) = name {
                    write_name(out, n);
                }
                out.extend_from_slice(b"scn");
            },
            Op::StrokeGray(g) => {
                write_nums(out, &[*g]);
                out.extend_from_slice(b"G");
            },
            Op::FillGray(g) => {
                write_nums(out, &[*g]);
                out.extend_from_slice(b"g");
            },
            Op::StrokeRgb(r, g, b) => {
                write_nums(out, &[*r, *g, *b]);
                out.extend_from_slice(b"RG");
            },
            Op::FillRgb(r, g, b) => {
                write_nums(out, &[*r, *g, *b]);
                out.extend_from_slice(b"rg");
            },
            Op::StrokeCmyk(c, m, y, k) => {
                write_nums(out, &[*c, *m, *y, *k]);
                out.extend_from_slice(b"K");
            },
            Op::FillCmyk(c, m, y, k) => {
                write_nums(out, &[*c, *m, *y, *k]);
                out.extend_from_slice(b"k");
            },
            Op::ShFill(n) => {
                write_name(out, n);
                out.extend_from_slice(b"sh");
            },
            Op::XObject(n) => {
                write_name(out, n);
                out.extend_from_slice(b"Do");
            },
            Op::InlineImage(dict, data) => {
                out.extend_from_slice(b"BI ");
                for (key, value) in dict {
                    write_object(&Object::Name(key.clone()), out);
                    out.push(b' ');
                    write_object(value, out);
                    out.push(b' ');
                }
                out.extend_from_slice(b"ID\n");
                out.extend_from_slice(data);
                out.extend_from_slice(b"\nEI");
            },
            Op::MarkPoint(n) => {
                write_name(out, n);
                out.extend_from_slice(b"MP");
            },
            Op::MarkPointProps(n, props) => {
                write_name(out, n);
                write_object(props, out);
                out.extend_from_slice(b" DP");
            },
            Op::BeginMarked(n) => {
                write_name(out, n);
                out.extend_from_slice(b"BMC");
            },
            Op::BeginMarkedProps(n, props) => {
                write_name(out, n);
                write_object(props, out);
                out.extend_from_slice(b" BDC");
            },
            Op::EndMarked => out.extend_from_slice(b"EMC"),
            Op::BeginCompat => out.extend_from_slice(b"BX"),
            Op::EndCompat => out.extend_from_slice(b"EX"),
            Op::Unknown(keyword, operands) => {
                for operand in operands {
                    write_object(operand, out);
                    out.push(b' ');
                }
                out.extend_from_slice(keyword.as_bytes());
            },
        }
        out.push(b'\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written(op: Op) -> String {
        let mut out = Vec::new();
        op.write(&mut out);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_write_simple_ops() {
        assert_eq!(written(Op::Save), "q\n");
        assert_eq!(written(Op::FillEvenOdd), "f*\n");
        assert_eq!(written(Op::Rect(0.0, 0.0, 100.0, 50.0)), "0 0 100 50 re\n");
    }

    #[test]
    fn test_write_text_ops() {
        assert_eq!(written(Op::SetFont(Name::new("F1"), 12.0)), "/F1 12 Tf\n");
        assert_eq!(written(Op::ShowText(b"Hi".to_vec())), "(Hi) Tj\n");
        let tj = Op::ShowTextAdjusted(vec![
            TextElement::Text(b"A".to_vec()),
            TextElement::Adjust(-120.0),
            TextElement::Text(b"V".to_vec()),
        ]);
        assert_eq!(written(tj), "[(A) -120 (V) ] TJ\n");
    }

    #[test]
    fn test_write_dash() {
        assert_eq!(written(Op::Dash(vec![2.0, 1.0], 0.5)), "[2 1 ] 0.5 d\n");
    }
}
