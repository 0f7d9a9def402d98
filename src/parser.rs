//! PDF object parser.
//!
//! Recursive descent over lexer tokens, producing [`Object`] values. The
//! notable grammar rules live here: the `N N R` tri-token pattern becomes an
//! indirect reference (with backtracking when the pattern does not
//! complete), and a dictionary directly followed by the `stream` keyword
//! switches to stream mode, where /Length governs the payload slice and a
//! forward scan for `endstream` repairs wrong or unresolvable lengths.

use crate::error::{Error, Result};
use crate::lexer::{self, Token, token};
use crate::object::{Dict, ObjRef, Object, Stream};
use bytes::Bytes;

/// Decode escape sequences in PDF literal strings.
///
/// Handles the single-character escapes, 1-3 digit octal escapes, line
/// continuations (backslash before EOL), and normalization of unescaped
/// CR / CRLF line endings to LF.
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        match raw[i] {
            b'\\' if i + 1 < raw.len() => match raw[i + 1] {
                b'n' => {
                    result.push(b'\n');
                    i += 2;
                },
                b'r' => {
                    result.push(b'\r');
                    i += 2;
                },
                b't' => {
                    result.push(b'\t');
                    i += 2;
                },
                b'b' => {
                    result.push(8);
                    i += 2;
                },
                b'f' => {
                    result.push(12);
                    i += 2;
                },
                b'(' => {
                    result.push(b'(');
                    i += 2;
                },
                b')' => {
                    result.push(b')');
                    i += 2;
                },
                b'\\' => {
                    result.push(b'\\');
                    i += 2;
                },
                // Line continuation: backslash-EOL is dropped entirely
                b'\n' => {
                    i += 2;
                },
                b'\r' => {
                    i += 2;
                    if i < raw.len() && raw[i] == b'\n' {
                        i += 1;
                    }
                },
                c if (b'0'..b'8').contains(&c) => {
                    let mut value = 0u32;
                    let mut len = 0;
                    while len < 3 {
                        match raw.get(i + 1 + len) {
                            Some(&d) if (b'0'..b'8').contains(&d) => {
                                value = value * 8 + (d - b'0') as u32;
                                len += 1;
                            },
                            _ => break,
                        }
                    }
                    result.push((value & 0xFF) as u8);
                    i += 1 + len;
                },
                // Unknown escape: the backslash is dropped, the byte kept
                other => {
                    result.push(other);
                    i += 2;
                },
            },
            // Unescaped EOL inside a string is recorded as LF
            b'\r' => {
                result.push(b'\n');
                i += 1;
                if i < raw.len() && raw[i] == b'\n' {
                    i += 1;
                }
            },
            c => {
                result.push(c);
                i += 1;
            },
        }
    }

    result
}

/// Decode a hex string body: whitespace skipped, odd trailing nibble padded
/// with zero.
pub fn decode_hex_string(raw: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(raw.len() / 2);
    let mut hi: Option<u8> = None;
    for &c in raw {
        let digit = match c {
            b'0'..=b'9' => c - b'0',
            b'a'..=b'f' => c - b'a' + 10,
            b'A'..=b'F' => c - b'A' + 10,
            _ => continue,
        };
        match hi.take() {
            Some(h) => result.push((h << 4) | digit),
            None => hi = Some(digit),
        }
    }
    if let Some(h) = hi {
        result.push(h << 4);
    }
    result
}

/// Parse one object from `input`, returning it and the remaining bytes.
///
/// Handles nesting (arrays, dictionaries) and the `N N R` reference
/// pattern. Keywords that are not part of the object grammar end the parse
/// with a syntax error; the caller decides whether to repair.
pub fn parse_object(input: &[u8]) -> Result<(Object, &[u8])> {
    let (rest, tok) = token(input).map_err(|_| Error::syntax("expected object"))?;
    parse_object_from_token(tok, rest)
}

fn parse_object_from_token<'a>(tok: Token<'a>, rest: &'a [u8]) -> Result<(Object, &'a [u8])> {
    match tok {
        Token::Null => Ok((Object::Null, rest)),
        Token::True => Ok((Object::Bool(true), rest)),
        Token::False => Ok((Object::Bool(false), rest)),
        Token::Real(r) => Ok((Object::Real(r), rest)),
        Token::Name(n) => Ok((Object::Name(n), rest)),
        Token::LiteralString(s) => Ok((Object::String(decode_literal_string_escapes(s)), rest)),
        Token::HexString(s) => Ok((Object::String(decode_hex_string(s)), rest)),
        Token::Integer(n) => parse_maybe_reference(n, rest),
        Token::ArrayStart => parse_array_body(rest),
        Token::DictStart => {
            let (dict, rest) = parse_dict_body(rest)?;
            Ok((Object::Dict(dict), rest))
        },
        other => Err(Error::syntax(format!("unexpected token {other:?}"))),
    }
}

/// After an integer, look ahead for `G R` to form an indirect reference.
/// On any mismatch the lookahead is discarded and the bare integer stands.
fn parse_maybe_reference(num: i64, rest: &[u8]) -> Result<(Object, &[u8])> {
    if (0..=u32::MAX as i64).contains(&num) {
        if let Ok((rest2, Token::Integer(gen))) = token(rest) {
            if (0..=u16::MAX as i64).contains(&gen) {
                if let Ok((rest3, Token::R)) = token(rest2) {
                    return Ok((Object::Ref(ObjRef::new(num as u32, gen as u16)), rest3));
                }
            }
        }
    }
    Ok((Object::Int(num), rest))
}

fn parse_array_body(mut input: &[u8]) -> Result<(Object, &[u8])> {
    let mut items = Vec::new();
    loop {
        let (rest, tok) = token(input).map_err(|_| Error::syntax("unterminated array"))?;
        if tok == Token::ArrayEnd {
            return Ok((Object::Array(items), rest));
        }
        let (obj, rest) = parse_object_from_token(tok, rest)?;
        items.push(obj);
        input = rest;
    }
}

/// Parse dictionary entries up to `>>`. Duplicate keys resolve last-wins.
fn parse_dict_body(mut input: &[u8]) -> Result<(Dict, &[u8])> {
    let mut dict = Dict::new();
    loop {
        let (rest, tok) = token(input).map_err(|_| Error::syntax("unterminated dictionary"))?;
        match tok {
            Token::DictEnd => return Ok((dict, rest)),
            Token::Name(key) => {
                let (value, rest) = parse_object(rest)?;
                dict.insert(key, value);
                input = rest;
            },
            other => {
                return Err(Error::syntax(format!(
                    "expected name key in dictionary, found {other:?}"
                )));
            },
        }
    }
}

/// A parsed indirect object: its reference plus its body.
#[derive(Debug, Clone)]
pub struct IndirectObject {
    /// The `N G` identity from the `obj` header
    pub re: ObjRef,
    /// The object body (a [`Object::Stream`] when a stream followed)
    pub object: Object,
}

/// Find the first occurrence of `needle` in `haystack`.
pub(crate) fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Parse an indirect object (`N G obj ... endobj`) at `offset` in `data`.
///
/// When the body is a stream, `resolve_length` is consulted for an indirect
/// /Length. A missing, unresolvable, or wrong length falls back to scanning
/// for the `endstream` token. The payload is a zero-copy slice of `data`.
pub fn parse_indirect_at(
    data: &Bytes,
    offset: usize,
    resolve_length: &mut dyn FnMut(ObjRef) -> Option<i64>,
) -> Result<IndirectObject> {
    if offset >= data.len() {
        return Err(Error::range(format!("object offset {offset} beyond end of file")));
    }
    let input = &data[offset..];

    let (rest, t1) = token(input).map_err(|_| Error::syntax("expected object number"))?;
    let num = match t1 {
        Token::Integer(n) if (0..=u32::MAX as i64).contains(&n) => n as u32,
        other => return Err(Error::syntax(format!("expected object number, found {other:?}"))),
    };
    let (rest, t2) = token(rest).map_err(|_| Error::syntax("expected generation"))?;
    let gen = match t2 {
        Token::Integer(g) if (0..=u16::MAX as i64).contains(&g) => g as u16,
        other => return Err(Error::syntax(format!("expected generation, found {other:?}"))),
    };
    let (rest, t3) = token(rest).map_err(|_| Error::syntax("expected 'obj'"))?;
    if t3 != Token::ObjStart {
        return Err(Error::syntax(format!("expected 'obj', found {t3:?}")));
    }

    let re = ObjRef::new(num, gen);
    let (body, rest) = parse_object(rest)?;

    // Peek for `stream` after a dictionary body
    if let Object::Dict(dict) = &body {
        if let Ok((after_kw, Token::StreamStart)) = token(rest) {
            let stream = read_stream_payload(data, dict.clone(), after_kw, re, resolve_length)?;
            return Ok(IndirectObject {
                re,
                object: Object::Stream(stream),
            });
        }
    }

    // `endobj` should follow; tolerate its absence with a warning
    match token(rest) {
        Ok((_, Token::ObjEnd)) => {},
        _ => log::warn!("object {re}: missing endobj"),
    }

    Ok(IndirectObject { re, object: body })
}

/// Slice the stream payload following a `stream` keyword.
///
/// `after_kw` points just past the keyword. The payload begins after a
/// single EOL marker (CRLF or LF; a bare CR is tolerated).
fn read_stream_payload(
    data: &Bytes,
    dict: Dict,
    after_kw: &[u8],
    re: ObjRef,
    resolve_length: &mut dyn FnMut(ObjRef) -> Option<i64>,
) -> Result<Stream> {
    // Offset of `after_kw` within `data`
    let base = data.as_ptr() as usize;
    let mut start = after_kw.as_ptr() as usize - base;

    match data.get(start) {
        Some(b'\r') => {
            start += 1;
            if data.get(start) == Some(&b'\n') {
                start += 1;
            }
        },
        Some(b'\n') => start += 1,
        _ => {},
    }

    let declared = match dict.get("Length") {
        Some(Object::Int(n)) if *n >= 0 => Some(*n as usize),
        Some(Object::Ref(r)) => resolve_length(*r).filter(|n| *n >= 0).map(|n| n as usize),
        _ => None,
    };

    if let Some(len) = declared {
        if start + len <= data.len() {
            let tail = &data[start + len..];
            if next_is_endstream(tail) {
                return Ok(Stream {
                    dict,
                    data: data.slice(start..start + len),
                });
            }
            log::warn!("object {re}: /Length {len} does not land on endstream, scanning");
        } else {
            log::warn!("object {re}: /Length {len} beyond end of file, scanning");
        }
    } else {
        log::warn!("object {re}: missing or unresolvable /Length, scanning for endstream");
    }

    // Fallback: payload extends to the nearest `endstream` token
    let end = find_subsequence(&data[start..], b"endstream")
        .ok_or_else(|| Error::syntax(format!("object {re}: no endstream found")))?;
    let mut payload_end = start + end;
    // Trim the EOL that separates payload from the keyword
    if payload_end > start && data[payload_end - 1] == b'\n' {
        payload_end -= 1;
    }
    if payload_end > start && data[payload_end - 1] == b'\r' {
        payload_end -= 1;
    }
    Ok(Stream {
        dict,
        data: data.slice(start..payload_end),
    })
}

fn next_is_endstream(tail: &[u8]) -> bool {
    matches!(token(tail), Ok((_, Token::StreamEnd)))
}

/// Serialize a simple object back to its token form.
///
/// Streams are written as their dictionary followed by the raw payload.
/// Used by the buffer processor and by tests of the re-lex law.
pub fn write_object(obj: &Object, out: &mut Vec<u8>) {
    match obj {
        Object::Null => out.extend_from_slice(b"null"),
        Object::Bool(true) => out.extend_from_slice(b"true"),
        Object::Bool(false) => out.extend_from_slice(b"false"),
        Object::Int(n) => out.extend_from_slice(n.to_string().as_bytes()),
        Object::Real(r) => {
            // Trim trailing zeros the way content streams are written
            let mut s = format!("{r:.6}");
            while s.ends_with('0') {
                s.pop();
            }
            if s.ends_with('.') {
                s.pop();
            }
            out.extend_from_slice(s.as_bytes());
        },
        Object::Name(n) => {
            out.push(b'/');
            for &b in n.as_str().as_bytes() {
                if lexer::is_whitespace(b) || lexer::is_delimiter(b) || b == b'#' || !(33..=126).contains(&b) {
                    out.extend_from_slice(format!("#{b:02X}").as_bytes());
                } else {
                    out.push(b);
                }
            }
        },
        Object::String(s) => {
            out.push(b'(');
            for &b in s {
                match b {
                    b'(' | b')' | b'\\' => {
                        out.push(b'\\');
                        out.push(b);
                    },
                    b'\n' => out.extend_from_slice(b"\\n"),
                    b'\r' => out.extend_from_slice(b"\\r"),
                    _ => out.push(b),
                }
            }
            out.push(b')');
        },
        Object::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_object(item, out);
            }
            out.push(b']');
        },
        Object::Dict(dict) => {
            out.extend_from_slice(b"<<");
            for (key, value) in dict {
                write_object(&Object::Name(key.clone()), out);
                out.push(b' ');
                write_object(value, out);
                out.push(b' ');
            }
            out.extend_from_slice(b">>");
        },
        Object::Stream(s) => {
            write_object(&Object::Dict(s.dict.clone()), out);
            out.extend_from_slice(b"\nstream\n");
            out.extend_from_slice(&s.data);
            out.extend_from_slice(b"\nendstream");
        },
        Object::Ref(r) => out.extend_from_slice(format!("{} {} R", r.num, r.gen).as_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::DictExt;

    fn parse(input: &[u8]) -> Object {
        parse_object(input).unwrap().0
    }

    #[test]
    fn test_parse_primitives() {
        assert_eq!(parse(b"null"), Object::Null);
        assert_eq!(parse(b"true"), Object::Bool(true));
        assert_eq!(parse(b"42"), Object::Int(42));
        assert_eq!(parse(b"-1.5"), Object::Real(-1.5));
        assert_eq!(parse(b"/Name"), Object::Name("Name".into()));
    }

    #[test]
    fn test_parse_reference_vs_integers() {
        assert_eq!(parse(b"10 0 R"), Object::Ref(ObjRef::new(10, 0)));
        // Without the trailing R the integers stand alone
        let (first, rest) = parse_object(b"10 0 /Next").unwrap();
        assert_eq!(first, Object::Int(10));
        let (second, _) = parse_object(rest).unwrap();
        assert_eq!(second, Object::Int(0));
    }

    #[test]
    fn test_parse_array_with_references() {
        let obj = parse(b"[1 2 0 R 3]");
        let arr = obj.as_array().unwrap();
        assert_eq!(arr.len(), 3);
        assert_eq!(arr[0], Object::Int(1));
        assert_eq!(arr[1], Object::Ref(ObjRef::new(2, 0)));
        assert_eq!(arr[2], Object::Int(3));
    }

    #[test]
    fn test_parse_nested_dict() {
        let obj = parse(b"<< /A << /B [1 2] >> /C (str) >>");
        let dict = obj.as_dict().unwrap();
        let inner = dict.get_dict("A").unwrap();
        assert_eq!(inner.get_array("B").unwrap().len(), 2);
        assert_eq!(dict.get("C").unwrap().as_string(), Some(&b"str"[..]));
    }

    #[test]
    fn test_string_escape_decoding() {
        assert_eq!(decode_literal_string_escapes(b"a\\nb"), b"a\nb");
        assert_eq!(decode_literal_string_escapes(b"\\247x"), b"\xa7x");
        assert_eq!(decode_literal_string_escapes(b"a\\\nb"), b"ab"); // continuation
        assert_eq!(decode_literal_string_escapes(b"a\r\nb"), b"a\nb"); // EOL normalization
        assert_eq!(decode_literal_string_escapes(b"\\q"), b"q"); // unknown escape
    }

    #[test]
    fn test_hex_decoding_odd_nibble() {
        assert_eq!(decode_hex_string(b"48 65 6C6C 6F"), b"Hello");
        assert_eq!(decode_hex_string(b"901FA"), vec![0x90, 0x1F, 0xA0]);
    }

    #[test]
    fn test_indirect_object_plain() {
        let data = Bytes::from_static(b"12 0 obj << /Type /Page >> endobj");
        let ind = parse_indirect_at(&data, 0, &mut |_| None).unwrap();
        assert_eq!(ind.re, ObjRef::new(12, 0));
        assert_eq!(ind.object.as_dict().unwrap().get_name("Type"), Some("Page"));
    }

    #[test]
    fn test_stream_with_direct_length() {
        let data = Bytes::from_static(b"5 0 obj << /Length 5 >> stream\nhello\nendstream endobj");
        let ind = parse_indirect_at(&data, 0, &mut |_| None).unwrap();
        let stream = ind.object.as_stream().unwrap();
        assert_eq!(&stream.data[..], b"hello");
    }

    #[test]
    fn test_stream_with_indirect_length() {
        let data =
            Bytes::from_static(b"5 0 obj << /Length 9 0 R >> stream\nhello full\nendstream endobj");
        let ind = parse_indirect_at(&data, 0, &mut |r| {
            assert_eq!(r, ObjRef::new(9, 0));
            Some(10)
        })
        .unwrap();
        assert_eq!(&ind.object.as_stream().unwrap().data[..], b"hello full");
    }

    #[test]
    fn test_stream_length_too_short_recovers() {
        let data = Bytes::from_static(b"5 0 obj << /Length 2 >> stream\nhello\nendstream endobj");
        let ind = parse_indirect_at(&data, 0, &mut |_| None).unwrap();
        // Recovery extends to the endstream token
        assert_eq!(&ind.object.as_stream().unwrap().data[..], b"hello");
    }

    #[test]
    fn test_stream_missing_length_recovers() {
        let data = Bytes::from_static(b"5 0 obj << >> stream\nabc\nendstream endobj");
        let ind = parse_indirect_at(&data, 0, &mut |_| None).unwrap();
        assert_eq!(&ind.object.as_stream().unwrap().data[..], b"abc");
    }

    #[test]
    fn test_write_then_relex_round_trip() {
        let original = parse(b"<< /A [1 2.5 /N (s\\)tr) true null] /B 3 0 R >>");
        let mut out = Vec::new();
        write_object(&original, &mut out);
        let reparsed = parse(&out);
        assert_eq!(original, reparsed);
    }
}
