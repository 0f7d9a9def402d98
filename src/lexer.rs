//! PDF lexer (tokenizer).
//!
//! Low-level tokenization of PDF byte streams. Recognizes all PDF token
//! types: numbers, strings, names, keywords, and delimiters.
//!
//! Whitespace is space, tab, CR, LF, NUL, and FF; comments (`%` to end of
//! line) count as whitespace. Names decode `#HH` escapes here — the decoded
//! byte form is the name's identity. Literal strings are returned raw;
//! escape decoding happens at the parser level where the surrounding
//! context is known.
//!
//! The lexer tolerates malformed input: when no token matches, the caller
//! receives an error and decides whether to skip a byte and retry (the
//! repair path) or to fail the enclosing parse.

use crate::names::Name;
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{take_till, take_while},
    character::complete::{char, digit1, one_of},
    combinator::{map, opt},
    sequence::{delimited, preceded},
};

/// Token types recognized by the PDF lexer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token<'a> {
    /// Integer number (e.g., 42, -123)
    Integer(i64),

    /// Real (floating-point) number (e.g., 3.14, -2.5, .5, 1e3)
    Real(f64),

    /// Literal string bytes (content of `(...)`), escapes NOT yet decoded
    LiteralString(&'a [u8]),

    /// Hexadecimal string bytes (content of `<...>`), whitespace preserved
    HexString(&'a [u8]),

    /// Name with `#HH` escapes decoded
    Name(Name),

    /// Boolean true keyword
    True,
    /// Boolean false keyword
    False,
    /// Null keyword
    Null,

    /// Array start delimiter `[`
    ArrayStart,
    /// Array end delimiter `]`
    ArrayEnd,
    /// Dictionary start delimiter `<<`
    DictStart,
    /// Dictionary end delimiter `>>`
    DictEnd,

    /// Indirect object start keyword `obj`
    ObjStart,
    /// Indirect object end keyword `endobj`
    ObjEnd,
    /// Stream start keyword `stream`
    StreamStart,
    /// Stream end keyword `endstream`
    StreamEnd,
    /// Reference keyword `R`
    R,

    /// Any other bounded identifier (e.g. `xref`, `trailer`, `startxref`)
    Keyword(&'a [u8]),
}

/// True for the PDF whitespace set (ISO 32000-1, Table 1).
pub fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C)
}

/// True for the PDF delimiter set (ISO 32000-1, Table 2).
pub fn is_delimiter(c: u8) -> bool {
    matches!(c, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

/// True when `c` ends an identifier (whitespace, delimiter, or EOF handled
/// by the caller).
fn is_boundary(c: u8) -> bool {
    is_whitespace(c) || is_delimiter(c)
}

fn lex_err(input: &[u8], kind: nom::error::ErrorKind) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, kind))
}

/// Parse a comment (% to end of line).
fn comment(input: &[u8]) -> IResult<&[u8], ()> {
    let (rest, _) = preceded(char('%'), take_till(|c| c == b'\r' || c == b'\n'))(input)?;
    Ok((rest, ()))
}

/// Skip all whitespace and comments before a token.
pub fn skip_ws(input: &[u8]) -> &[u8] {
    let mut remaining = input;
    loop {
        let (rest, ws) = take_while::<_, _, nom::error::Error<&[u8]>>(is_whitespace)(remaining)
            .unwrap_or((remaining, &[]));
        remaining = rest;
        if let Ok((rest, _)) = comment(remaining) {
            remaining = rest;
            continue;
        }
        if ws.is_empty() {
            break;
        }
    }
    remaining
}

/// Parse an integer or real number.
///
/// PDF numbers: `42`, `-123`, `+17`, `3.14`, `-.002`, `5.`, and the
/// exponent form some generators emit (`1e5`). A `.` or `e` makes the
/// number a real; integers that overflow the 32-bit signed range also
/// become reals.
fn parse_number(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, sign) = opt(one_of("+-"))(input)?;
    let (rest, int_part) = opt(digit1)(rest)?;
    let (rest, frac_part) = opt(preceded(char('.'), opt(digit1)))(rest)?;

    if int_part.is_none() && frac_part.is_none() {
        return Err(lex_err(input, nom::error::ErrorKind::Digit));
    }

    // Optional exponent: e or E, optional sign, digits
    let (rest, exp_part) = opt(preceded(one_of("eE"), nom::sequence::pair(opt(one_of("+-")), digit1)))(rest)?;

    let is_real = frac_part.is_some() || exp_part.is_some();
    let consumed = input.len() - rest.len();
    let text = std::str::from_utf8(&input[..consumed])
        .map_err(|_| lex_err(input, nom::error::ErrorKind::Digit))?;

    if is_real {
        let mut normalized = String::with_capacity(text.len() + 2);
        // f64::parse rejects "5." and ".5" endings in some shapes it
        // actually accepts, but not "-." alone; normalize the bare-dot
        // forms so the standard parser takes them.
        let body = text.trim_start_matches(['+']);
        if body.starts_with('.') || body.starts_with("-.") {
            if let Some(stripped) = body.strip_prefix('-') {
                normalized.push('-');
                normalized.push('0');
                normalized.push_str(stripped);
            } else {
                normalized.push('0');
                normalized.push_str(body);
            }
        } else {
            normalized.push_str(body);
        }
        if normalized.ends_with('.') {
            normalized.push('0');
        }
        let value: f64 = normalized
            .parse()
            .map_err(|_| lex_err(input, nom::error::ErrorKind::Digit))?;
        Ok((rest, Token::Real(value)))
    } else {
        let value: i64 = match text.trim_start_matches('+').parse() {
            Ok(v) => v,
            // Digits beyond i64: degrade to a real rather than fail
            Err(_) => {
                let v: f64 = text
                    .parse()
                    .map_err(|_| lex_err(input, nom::error::ErrorKind::Digit))?;
                return Ok((rest, Token::Real(v)));
            },
        };
        let _ = sign;
        if value > i32::MAX as i64 || value < i32::MIN as i64 {
            // Out of the 32-bit signed range: becomes a real
            Ok((rest, Token::Real(value as f64)))
        } else {
            Ok((rest, Token::Integer(value)))
        }
    }
}

/// Parse a literal string enclosed in parentheses.
///
/// Handles balanced nested parentheses and skips over escape sequences so a
/// `\)` does not close the string. Content is returned raw.
fn parse_literal_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (remaining, _) = char('(')(input)?;
    let mut depth = 1usize;
    let mut pos = 0usize;

    while depth > 0 && pos < remaining.len() {
        match remaining[pos] {
            b'\\' => {
                pos += 2; // escape consumes the next byte whatever it is
            },
            b'(' => {
                depth += 1;
                pos += 1;
            },
            b')' => {
                depth -= 1;
                pos += 1;
            },
            _ => pos += 1,
        }
    }

    if depth != 0 {
        return Err(lex_err(input, nom::error::ErrorKind::Tag));
    }

    let end = pos.min(remaining.len());
    Ok((&remaining[end..], Token::LiteralString(&remaining[..end - 1])))
}

/// Parse a hexadecimal string enclosed in angle brackets.
///
/// Whitespace inside is allowed; an odd trailing nibble is padded with 0 at
/// decode time. Content is returned raw (hex digits + whitespace).
fn parse_hex_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    if input.len() >= 2 && input[0] == b'<' && input[1] == b'<' {
        return Err(lex_err(input, nom::error::ErrorKind::Tag));
    }
    delimited(
        char('<'),
        map(
            take_while(|c: u8| c.is_ascii_hexdigit() || is_whitespace(c)),
            Token::HexString,
        ),
        char('>'),
    )(input)
}

/// Decode `#HH` escape sequences in a raw name body.
///
/// Invalid sequences keep the `#` literal, matching common-reader behavior
/// for malformed files.
pub fn decode_name_escapes(raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'#' {
            let hi = raw.get(i + 1).copied();
            let lo = raw.get(i + 2).copied();
            if let (Some(h), Some(l)) = (hi, lo) {
                let hex = [h, l];
                if let Ok(s) = std::str::from_utf8(&hex) {
                    if let Ok(byte) = u8::from_str_radix(s, 16) {
                        out.push(byte as char);
                        i += 3;
                        continue;
                    }
                }
            }
        }
        out.push(raw[i] as char);
        i += 1;
    }
    out
}

/// Parse a name starting with `/`.
///
/// Names of 128 bytes or more still parse, with a warning — the format caps
/// them at 127 but real files overshoot.
fn parse_name(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    preceded(
        char('/'),
        map(take_while(|c: u8| !is_boundary(c)), |bytes: &[u8]| {
            if bytes.len() >= 128 {
                log::warn!("name exceeds 127 bytes ({} bytes)", bytes.len());
            }
            Token::Name(Name::from(decode_name_escapes(bytes)))
        }),
    )(input)
}

/// Parse a bounded identifier and classify it as a keyword token.
///
/// Unlike a bare `tag`, this requires the identifier to end at a boundary,
/// so `nullable` does not lex as `null` + garbage. Digits are allowed past
/// the first byte (`d0`, `d1`, `Tj`-style operators); numbers never reach
/// here because they lex earlier.
fn parse_keyword(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, word) = take_while(|c: u8| {
        c.is_ascii_alphanumeric() || c == b'\'' || c == b'"' || c == b'*'
    })(input)?;
    if word.is_empty() {
        return Err(lex_err(input, nom::error::ErrorKind::Alpha));
    }
    let token = match word {
        b"true" => Token::True,
        b"false" => Token::False,
        b"null" => Token::Null,
        b"obj" => Token::ObjStart,
        b"endobj" => Token::ObjEnd,
        b"stream" => Token::StreamStart,
        b"endstream" => Token::StreamEnd,
        b"R" => Token::R,
        other => Token::Keyword(other),
    };
    Ok((rest, token))
}

fn parse_delimiter(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    if input.starts_with(b"<<") {
        return Ok((&input[2..], Token::DictStart));
    }
    if input.starts_with(b">>") {
        return Ok((&input[2..], Token::DictEnd));
    }
    match input.first() {
        Some(b'[') => Ok((&input[1..], Token::ArrayStart)),
        Some(b']') => Ok((&input[1..], Token::ArrayEnd)),
        _ => Err(lex_err(input, nom::error::ErrorKind::Tag)),
    }
}

/// Parse a single PDF token.
///
/// Skips whitespace/comments first, then tries each token class. Returns
/// `Err` on EOF or when the next byte starts no valid token — the caller
/// decides whether that is an error or a repair opportunity.
pub fn token(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let input = skip_ws(input);
    if input.is_empty() {
        return Err(lex_err(input, nom::error::ErrorKind::Eof));
    }
    alt((
        parse_delimiter,
        parse_name,
        parse_number,
        parse_literal_string,
        parse_hex_string,
        parse_keyword,
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(input: &[u8]) -> Token<'_> {
        token(input).unwrap().1
    }

    // ========================================================================
    // Numbers
    // ========================================================================

    #[test]
    fn test_integers() {
        assert_eq!(tok(b"42"), Token::Integer(42));
        assert_eq!(tok(b"-123"), Token::Integer(-123));
        assert_eq!(tok(b"+17"), Token::Integer(17));
        assert_eq!(tok(b"0"), Token::Integer(0));
    }

    #[test]
    fn test_reals() {
        assert_eq!(tok(b"-2.5"), Token::Real(-2.5));
        assert_eq!(tok(b".5"), Token::Real(0.5));
        assert_eq!(tok(b"5."), Token::Real(5.0));
        assert_eq!(tok(b"-.002"), Token::Real(-0.002));
    }

    #[test]
    fn test_exponent_is_real() {
        assert_eq!(tok(b"1e3"), Token::Real(1000.0));
        assert_eq!(tok(b"2E-2"), Token::Real(0.02));
    }

    #[test]
    fn test_integer_outside_i32_becomes_real() {
        assert_eq!(tok(b"2147483647"), Token::Integer(2147483647));
        assert_eq!(tok(b"2147483648"), Token::Real(2147483648.0));
        assert_eq!(tok(b"-2147483649"), Token::Real(-2147483649.0));
    }

    // ========================================================================
    // Strings
    // ========================================================================

    #[test]
    fn test_literal_strings() {
        assert_eq!(tok(b"(Hello)"), Token::LiteralString(b"Hello"));
        assert_eq!(tok(b"(a (nested) b)"), Token::LiteralString(b"a (nested) b"));
        assert_eq!(tok(b"()"), Token::LiteralString(b""));
        assert_eq!(tok(b"(esc \\) paren)"), Token::LiteralString(b"esc \\) paren"));
    }

    #[test]
    fn test_hex_strings() {
        assert_eq!(tok(b"<48656C6C6F>"), Token::HexString(b"48656C6C6F"));
        assert_eq!(tok(b"<48 65 6C>"), Token::HexString(b"48 65 6C"));
        assert_eq!(tok(b"<>"), Token::HexString(b""));
    }

    #[test]
    fn test_dict_start_not_hex() {
        assert_eq!(tok(b"<<"), Token::DictStart);
        assert_eq!(tok(b"<AB>"), Token::HexString(b"AB"));
    }

    // ========================================================================
    // Names
    // ========================================================================

    #[test]
    fn test_names() {
        assert_eq!(tok(b"/Type"), Token::Name(Name::new("Type")));
        assert_eq!(tok(b"/A#20B"), Token::Name(Name::new("A B")));
        assert_eq!(tok(b"/A#ZZ"), Token::Name(Name::new("A#ZZ")));
        // Empty name: invalid per the format but accepted leniently
        assert_eq!(token(b"/ ").unwrap().1, Token::Name(Name::new("")));
    }

    #[test]
    fn test_long_name_still_parses() {
        let mut input = vec![b'/'];
        input.extend(std::iter::repeat(b'x').take(200));
        match token(&input).unwrap().1 {
            Token::Name(n) => assert_eq!(n.as_str().len(), 200),
            other => panic!("expected name, got {other:?}"),
        }
    }

    // ========================================================================
    // Keywords and delimiters
    // ========================================================================

    #[test]
    fn test_keywords() {
        assert_eq!(tok(b"true"), Token::True);
        assert_eq!(tok(b"false"), Token::False);
        assert_eq!(tok(b"null"), Token::Null);
        assert_eq!(tok(b"obj"), Token::ObjStart);
        assert_eq!(tok(b"endobj"), Token::ObjEnd);
        assert_eq!(tok(b"stream"), Token::StreamStart);
        assert_eq!(tok(b"endstream"), Token::StreamEnd);
        assert_eq!(tok(b"R"), Token::R);
    }

    #[test]
    fn test_keyword_boundary() {
        // An identifier that merely starts with a reserved word is not it
        assert_eq!(tok(b"nullx"), Token::Keyword(b"nullx"));
        assert_eq!(tok(b"trailer"), Token::Keyword(b"trailer"));
        assert_eq!(tok(b"startxref"), Token::Keyword(b"startxref"));
    }

    #[test]
    fn test_delimiters() {
        assert_eq!(tok(b"["), Token::ArrayStart);
        assert_eq!(tok(b"]"), Token::ArrayEnd);
        assert_eq!(tok(b">>"), Token::DictEnd);
    }

    // ========================================================================
    // Whitespace and comments
    // ========================================================================

    #[test]
    fn test_whitespace_and_comments_skipped() {
        assert_eq!(tok(b"  \r\n\t42"), Token::Integer(42));
        assert_eq!(tok(b"% comment\n42"), Token::Integer(42));
        assert_eq!(tok(b"% one\n  % two\n 42"), Token::Integer(42));
    }

    #[test]
    fn test_eof_is_error() {
        assert!(token(b"").is_err());
        assert!(token(b"   % only a comment").is_err());
    }

    #[test]
    fn test_token_sequence() {
        let input: &[u8] = b"1 0 obj << /Type /Catalog >> endobj";
        let expect = [
            Token::Integer(1),
            Token::Integer(0),
            Token::ObjStart,
            Token::DictStart,
            Token::Name(Name::new("Type")),
            Token::Name(Name::new("Catalog")),
            Token::DictEnd,
            Token::ObjEnd,
        ];
        let mut rest = input;
        for want in expect {
            let (next, got) = token(rest).unwrap();
            assert_eq!(got, want);
            rest = next;
        }
        assert!(token(rest).is_err());
    }
}
