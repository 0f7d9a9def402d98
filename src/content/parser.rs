//! Content-stream parser: tokens to operators.
//!
//! Operands accumulate on a bounded stack until an operator keyword
//! arrives; the keyword plus operands become one [`Op`]. The stack holds
//! at most 32 numeric slots plus one composite (array/dictionary/string)
//! slot, matching the format's limits; overflow is a range error that
//! clears the stack and resumes at the next operator.
//!
//! Inline images (`BI ... ID ... EI`) are handled here: the
//! mini-dictionary is parsed, the single whitespace after `ID` is
//! consumed, and the data runs to the `EI` sentinel preceded by
//! whitespace.

use super::operators::{Op, TextElement};
use crate::error::{Error, Result};
use crate::lexer::{self, Token, token};
use crate::names::Name;
use crate::object::{Dict, Object};

/// Most numeric operands any operator takes.
const MAX_STACK: usize = 32;

/// Streaming parser over content-stream bytes.
pub struct ContentParser<'a> {
    input: &'a [u8],
    stack: Vec<Object>,
    composites: usize,
}

impl<'a> ContentParser<'a> {
    /// Parse `input`, which must already be fully decoded.
    pub fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            stack: Vec::new(),
            composites: 0,
        }
    }

    /// The next operator, `Ok(None)` at end of stream.
    ///
    /// On a syntax error the operand stack is cleared and the input
    /// advanced to the next whitespace, so the caller can log and call
    /// again (the lenient policy).
    pub fn next_op(&mut self) -> Result<Option<Op>> {
        loop {
            let before = self.input;
            let (rest, tok) = match token(self.input) {
                Ok(v) => v,
                Err(_) => {
                    if lexer::skip_ws(self.input).is_empty() {
                        return Ok(None);
                    }
                    self.recover();
                    return Err(Error::syntax("unlexable byte in content stream"));
                },
            };
            self.input = rest;

            match tok {
                Token::Integer(n) => self.push(Object::Int(n))?,
                Token::Real(r) => self.push(Object::Real(r))?,
                Token::Name(n) => self.push(Object::Name(n))?,
                Token::True => self.push(Object::Bool(true))?,
                Token::False => self.push(Object::Bool(false))?,
                Token::Null => self.push(Object::Null)?,
                Token::LiteralString(_) | Token::HexString(_) | Token::ArrayStart
                | Token::DictStart => {
                    // Re-parse composites with the object grammar
                    let (obj, rest) = match crate::parser::parse_object(before) {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            self.recover();
                            return Err(e);
                        },
                    };
                    self.input = rest;
                    self.push_composite(obj)?;
                },
                Token::ArrayEnd | Token::DictEnd => {
                    self.recover();
                    return Err(Error::syntax("unbalanced array or dictionary close"));
                },
                Token::R | Token::ObjStart | Token::ObjEnd | Token::StreamStart
                | Token::StreamEnd => {
                    // Object-level keywords have no place in content
                    self.stack.clear();
                    self.composites = 0;
                    return Err(Error::syntax("object keyword inside content stream"));
                },
                Token::Keyword(kw) => {
                    if kw == b"BI" {
                        let op = self.parse_inline_image()?;
                        self.clear();
                        return Ok(Some(op));
                    }
                    let keyword = String::from_utf8_lossy(kw).into_owned();
                    let op = self.build_op(&keyword);
                    // The stack empties whether the operator parsed or not
                    self.clear();
                    return Ok(Some(op?));
                },
            }
        }
    }

    /// Advance past the current junk to the next whitespace boundary.
    fn recover(&mut self) {
        self.stack.clear();
        self.composites = 0;
        while let Some((&b, rest)) = self.input.split_first() {
            self.input = rest;
            if lexer::is_whitespace(b) {
                break;
            }
        }
    }

    fn clear(&mut self) {
        self.stack.clear();
        self.composites = 0;
    }

    fn push(&mut self, obj: Object) -> Result<()> {
        if self.stack.len() - self.composites >= MAX_STACK {
            self.clear();
            return Err(Error::range("operand stack overflow"));
        }
        self.stack.push(obj);
        Ok(())
    }

    fn push_composite(&mut self, obj: Object) -> Result<()> {
        if self.composites >= 1 {
            self.clear();
            return Err(Error::range("more than one composite operand"));
        }
        self.composites += 1;
        self.stack.push(obj);
        Ok(())
    }

    // Operand accessors, indexed from the bottom of this operator's run
    fn num(&self, i: usize) -> f32 {
        self.stack
            .get(i)
            .and_then(Object::as_number)
            .unwrap_or(0.0) as f32
    }

    fn int(&self, i: usize) -> i64 {
        self.stack.get(i).and_then(Object::as_int).unwrap_or(0)
    }

    fn name(&self, i: usize) -> Name {
        match self.stack.get(i) {
            Some(Object::Name(n)) => n.clone(),
            _ => Name::new(""),
        }
    }

    fn string(&self, i: usize) -> Vec<u8> {
        self.stack
            .get(i)
            .and_then(Object::as_string)
            .map(<[u8]>::to_vec)
            .unwrap_or_default()
    }

    fn nums(&self) -> Vec<f32> {
        self.stack
            .iter()
            .filter_map(|o| o.as_number().map(|v| v as f32))
            .collect()
    }

    fn matrix6(&self) -> [f32; 6] {
        [
            self.num(0),
            self.num(1),
            self.num(2),
            self.num(3),
            self.num(4),
            self.num(5),
        ]
    }

    fn need(&self, count: usize, keyword: &str) -> Result<()> {
        if self.stack.len() < count {
            return Err(Error::range(format!(
                "operator {keyword} needs {count} operands, has {}",
                self.stack.len()
            )));
        }
        Ok(())
    }

    fn build_op(&mut self, keyword: &str) -> Result<Op> {
        let op = match keyword {
            "q" => Op::Save,
            "Q" => Op::Restore,
            "cm" => {
                self.need(6, keyword)?;
                Op::Concat(self.matrix6())
            },
            "w" => {
                self.need(1, keyword)?;
                Op::LineWidth(self.num(0))
            },
            "J" => {
                self.need(1, keyword)?;
                Op::LineCap(self.int(0))
            },
            "j" => {
                self.need(1, keyword)?;
                Op::LineJoin(self.int(0))
            },
            "M" => {
                self.need(1, keyword)?;
                Op::MiterLimit(self.num(0))
            },
            "d" => {
                self.need(2, keyword)?;
                let dashes = match self.stack.first() {
                    Some(Object::Array(arr)) => arr
                        .iter()
                        .filter_map(|o| o.as_number().map(|v| v as f32))
                        .collect(),
                    _ => Vec::new(),
                };
                Op::Dash(dashes, self.num(1))
            },
            "ri" => {
                self.need(1, keyword)?;
                Op::RenderingIntent(self.name(0))
            },
            "i" => {
                self.need(1, keyword)?;
                Op::Flatness(self.num(0))
            },
            "gs" => {
                self.need(1, keyword)?;
                Op::ExtGState(self.name(0))
            },
            "m" => {
                self.need(2, keyword)?;
                Op::MoveTo(self.num(0), self.num(1))
            },
            "l" => {
                self.need(2, keyword)?;
                Op::LineTo(self.num(0), self.num(1))
            },
            "c" => {
                self.need(6, keyword)?;
                Op::CurveTo(
                    self.num(0),
                    self.num(1),
                    self.num(2),
                    self.num(3),
                    self.num(4),
                    self.num(5),
                )
            },
            "v" => {
                self.need(4, keyword)?;
                Op::CurveToV(self.num(0), self.num(1), self.num(2), self.num(3))
            },
            "y" => {
                self.need(4, keyword)?;
                Op::CurveToY(self.num(0), self.num(1), self.num(2), self.num(3))
            },
            "h" => Op::ClosePath,
            "re" => {
                self.need(4, keyword)?;
                Op::Rect(self.num(0), self.num(1), self.num(2), self.num(3))
            },
            "S" => Op::Stroke,
            "s" => Op::CloseStroke,
            "f" | "F" => Op::Fill,
            "f*" => Op::FillEvenOdd,
            "B" => Op::FillStroke,
            "B*" => Op::FillStrokeEvenOdd,
            "b" => Op::CloseFillStroke,
            "b*" => Op::CloseFillStrokeEvenOdd,
            "n" => Op::EndPath,
            "W" => Op::Clip,
            "W*" => Op::ClipEvenOdd,
            "BT" => Op::BeginText,
            "ET" => Op::EndText,
            "Tc" => {
                self.need(1, keyword)?;
                Op::CharSpacing(self.num(0))
            },
            "Tw" => {
                self.need(1, keyword)?;
                Op::WordSpacing(self.num(0))
            },
            "Tz" => {
                self.need(1, keyword)?;
                Op::HorizScale(self.num(0))
            },
            "TL" => {
                self.need(1, keyword)?;
                Op::Leading(self.num(0))
            },
            "Tf" => {
                self.need(2, keyword)?;
                Op::SetFont(self.name(0), self.num(1))
            },
            "Tr" => {
                self.need(1, keyword)?;
                Op::RenderMode(self.int(0))
            },
            "Ts" => {
                self.need(1, keyword)?;
                Op::Rise(self.num(0))
            },
            "Td" => {
                self.need(2, keyword)?;
                Op::TextMove(self.num(0), self.num(1))
            },
            "TD" => {
                self.need(2, keyword)?;
                Op::TextMoveSetLeading(self.num(0), self.num(1))
            },
            "Tm" => {
                self.need(6, keyword)?;
                Op::TextMatrix(self.matrix6())
            },
            "T*" => Op::NextLine,
            "Tj" => {
                self.need(1, keyword)?;
                Op::ShowText(self.string(0))
            },
            "TJ" => {
                self.need(1, keyword)?;
                let elements = match self.stack.first() {
                    Some(Object::Array(arr)) => arr
                        .iter()
                        .filter_map(|o| match o {
                            Object::String(s) => Some(TextElement::Text(s.clone())),
                            Object::Int(n) => Some(TextElement::Adjust(*n as f32)),
                            Object::Real(r) => Some(TextElement::Adjust(*r as f32)),
                            _ => None,
                        })
                        .collect(),
                    _ => Vec::new(),
                };
                Op::ShowTextAdjusted(elements)
            },
            "'" => {
                self.need(1, keyword)?;
                Op::NextLineShow(self.string(0))
            },
            "\"" => {
                self.need(3, keyword)?;
                Op::NextLineShowSpaced(self.num(0), self.num(1), self.string(2))
            },
            "d0" => {
                self.need(2, keyword)?;
                Op::GlyphWidth(self.num(0), self.num(1))
            },
            "d1" => {
                self.need(6, keyword)?;
                Op::GlyphWidthBBox(
                    self.num(0),
                    self.num(1),
                    self.num(2),
                    self.num(3),
                    self.num(4),
                    self.num(5),
                )
            },
            "CS" => {
                self.need(1, keyword)?;
                Op::StrokeColorSpace(self.name(0))
            },
            "cs" => {
                self.need(1, keyword)?;
                Op::FillColorSpace(self.name(0))
            },
            "SC" => Op::StrokeColor(self.nums()),
            "sc" => Op::FillColor(self.nums()),
            "SCN" | "scn" => {
                let trailing_name = match self.stack.last() {
                    Some(Object::Name(n)) => Some(n.clone()),
                    _ => None,
                };
                if keyword == "SCN" {
                    Op::StrokeColorN(self.nums(), trailing_name)
                } else {
                    Op::FillColorN(self.nums(), trailing_name)
                }
            },
            "G" => {
                self.need(1, keyword)?;
                Op::StrokeGray(self.num(0))
            },
            "g" => {
                self.need(1, keyword)?;
                Op::FillGray(self.num(0))
            },
            "RG" => {
                self.need(3, keyword)?;
                Op::StrokeRgb(self.num(0), self.num(1), self.num(2))
            },
            "rg" => {
                self.need(3, keyword)?;
                Op::FillRgb(self.num(0), self.num(1), self.num(2))
            },
            "K" => {
                self.need(4, keyword)?;
                Op::StrokeCmyk(self.num(0), self.num(1), self.num(2), self.num(3))
            },
            "k" => {
                self.need(4, keyword)?;
                Op::FillCmyk(self.num(0), self.num(1), self.num(2), self.num(3))
            },
            "sh" => {
                self.need(1, keyword)?;
                Op::ShFill(self.name(0))
            },
            "Do" => {
                self.need(1, keyword)?;
                Op::XObject(self.name(0))
            },
            "MP" => {
                self.need(1, keyword)?;
                Op::MarkPoint(self.name(0))
            },
            "DP" => {
                self.need(2, keyword)?;
                Op::MarkPointProps(self.name(0), self.stack[1].clone())
            },
            "BMC" => {
                self.need(1, keyword)?;
                Op::BeginMarked(self.name(0))
            },
            "BDC" => {
                self.need(2, keyword)?;
                Op::BeginMarkedProps(self.name(0), self.stack[1].clone())
            },
            "EMC" => Op::EndMarked,
            "BX" => Op::BeginCompat,
            "EX" => Op::EndCompat,
            other => Op::Unknown(other.to_string(), self.stack.clone()),
        };
        Ok(op)
    }

    /// Parse a `BI ... ID <data> EI` inline image; the `BI` keyword has
    /// been consumed.
    fn parse_inline_image(&mut self) -> Result<Op> {
        let mut dict = Dict::new();
        loop {
            let (rest, tok) =
                token(self.input).map_err(|_| Error::syntax("unterminated inline image"))?;
            self.input = rest;
            match tok {
                Token::Keyword(b"ID") => break,
                Token::Name(key) => {
                    let (value, rest) = crate::parser::parse_object(self.input)?;
                    self.input = rest;
                    dict.insert(key, value);
                },
                other => {
                    return Err(Error::syntax(format!(
                        "expected name key in inline image, found {other:?}"
                    )));
                },
            }
        }

        // One whitespace byte separates ID from the data (CRLF counts as one)
        match self.input.first() {
            Some(b'\r') => {
                self.input = &self.input[1..];
                if self.input.first() == Some(&b'\n') {
                    self.input = &self.input[1..];
                }
            },
            Some(&b) if lexer::is_whitespace(b) => self.input = &self.input[1..],
            _ => {},
        }

        // Data runs to the EI sentinel preceded by whitespace/EOL
        let data_end = find_ei(self.input)
            .ok_or_else(|| Error::syntax("inline image without EI sentinel"))?;
        let mut data = &self.input[..data_end];
        // Trim the EOL before EI
        if data.last() == Some(&b'\n') {
            data = &data[..data.len() - 1];
        }
        if data.last() == Some(&b'\r') {
            data = &data[..data.len() - 1];
        }
        let op = Op::InlineImage(dict, data.to_vec());
        self.input = &self.input[data_end + 2..];
        Ok(op)
    }
}

/// Find the offset of the `EI` sentinel: preceded by whitespace and
/// followed by whitespace or end of input.
fn find_ei(data: &[u8]) -> Option<usize> {
    let mut i = 0usize;
    while i + 2 <= data.len() {
        if data[i] == b'E' && data[i + 1] == b'I' {
            let before_ok = i == 0 || lexer::is_whitespace(data[i - 1]);
            let after_ok = data
                .get(i + 2)
                .is_none_or(|&b| lexer::is_whitespace(b) || lexer::is_delimiter(b));
            if before_ok && after_ok {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_ops(input: &[u8]) -> Vec<Op> {
        let mut parser = ContentParser::new(input);
        let mut out = Vec::new();
        loop {
            match parser.next_op() {
                Ok(Some(op)) => out.push(op),
                Ok(None) => break,
                Err(e) => panic!("parse error: {e}"),
            }
        }
        out
    }

    #[test]
    fn test_simple_fill_sequence() {
        let ops = all_ops(b"1 0 0 rg 0 0 100 100 re f");
        assert_eq!(
            ops,
            vec![
                Op::FillRgb(1.0, 0.0, 0.0),
                Op::Rect(0.0, 0.0, 100.0, 100.0),
                Op::Fill,
            ]
        );
    }

    #[test]
    fn test_text_object() {
        let ops = all_ops(b"BT /F1 12 Tf 10 10 Td (Hi) Tj ET");
        assert_eq!(ops.len(), 5);
        assert_eq!(ops[1], Op::SetFont(Name::new("F1"), 12.0));
        assert_eq!(ops[3], Op::ShowText(b"Hi".to_vec()));
    }

    #[test]
    fn test_tj_array() {
        let ops = all_ops(b"[(A) -120 (V)] TJ");
        let Op::ShowTextAdjusted(elements) = &ops[0] else {
            panic!("expected TJ");
        };
        assert_eq!(elements.len(), 3);
        assert_eq!(elements[1], TextElement::Adjust(-120.0));
    }

    #[test]
    fn test_unknown_operator_preserved() {
        let ops = all_ops(b"1 2 xyz");
        assert_eq!(
            ops[0],
            Op::Unknown("xyz".into(), vec![Object::Int(1), Object::Int(2)])
        );
    }

    #[test]
    fn test_operand_stack_overflow() {
        let mut input = Vec::new();
        for i in 0..40 {
            input.extend_from_slice(format!("{i} ").as_bytes());
        }
        input.extend_from_slice(b"f");
        let mut parser = ContentParser::new(&input);
        assert!(matches!(parser.next_op(), Err(Error::Range(_))));
        // Parser recovers and continues
        assert!(parser.next_op().is_ok());
    }

    #[test]
    fn test_missing_operands_is_range_error() {
        let mut parser = ContentParser::new(b"1 0 cm");
        assert!(matches!(parser.next_op(), Err(Error::Range(_))));
    }

    #[test]
    fn test_inline_image() {
        let input = b"BI /W 2 /H 2 /BPC 8 /CS /G ID\n\x10\x20\x30\x40\nEI Q";
        let ops = all_ops(input);
        let Op::InlineImage(dict, data) = &ops[0] else {
            panic!("expected inline image, got {:?}", ops[0]);
        };
        assert_eq!(dict.get("W").and_then(Object::as_int), Some(2));
        assert_eq!(data, &vec![0x10, 0x20, 0x30, 0x40]);
        assert_eq!(ops[1], Op::Restore);
    }

    #[test]
    fn test_dash_pattern() {
        let ops = all_ops(b"[2 1] 0 d");
        assert_eq!(ops[0], Op::Dash(vec![2.0, 1.0], 0.0));
    }

    #[test]
    fn test_scn_with_pattern_name() {
        let ops = all_ops(b"/P0 scn");
        assert_eq!(ops[0], Op::FillColorN(Vec::new(), Some(Name::new("P0"))));
    }

    #[test]
    fn test_error_recovery_skips_junk() {
        let mut parser = ContentParser::new(b")junk( 1 0 0 rg");
        assert!(parser.next_op().is_err());
        let op = parser.next_op().unwrap();
        assert_eq!(op, Some(Op::FillRgb(1.0, 0.0, 0.0)));
    }
}
