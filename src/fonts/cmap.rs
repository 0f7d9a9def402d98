//! CMap parsing: multi-byte character code maps.
//!
//! CMaps serve two roles: the /Encoding of a CID font (byte sequence to
//! CID) and /ToUnicode (code to Unicode text). Both share the syntax:
//! codespace ranges declaring code lengths, then cidchar/cidrange or
//! bfchar/bfrange sections. The parser is a token-level state machine;
//! lookups binary-search the sorted range list.
//!
//! The predefined Identity-H/V CMaps are built in; other predefined CMaps
//! report as unsupported and callers degrade to identity with a warning.

use crate::error::{Error, Result};
use crate::lexer::{Token, token};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct Codespace {
    /// Code length in bytes
    len: u8,
    low: u32,
    high: u32,
}

/// A parsed CMap.
#[derive(Debug, Clone, Default)]
pub struct CMap {
    /// /CMapName when declared
    pub name: String,
    /// Writing mode: 0 horizontal, 1 vertical
    pub wmode: u8,
    codespaces: Vec<Codespace>,
    singles: Vec<(u32, u32)>,
    ranges: Vec<(u32, u32, u32)>,
    /// Multi-unit targets (ToUnicode bfchar/bfrange with strings)
    strings: HashMap<u32, String>,
}

fn hex_to_u32(bytes: &[u8]) -> (u32, u8) {
    let decoded = crate::parser::decode_hex_string(bytes);
    let mut value = 0u32;
    for &b in decoded.iter().take(4) {
        value = (value << 8) | b as u32;
    }
    (value, decoded.len().min(4) as u8)
}

fn hex_to_string(bytes: &[u8]) -> String {
    // ToUnicode targets are UTF-16BE
    let decoded = crate::parser::decode_hex_string(bytes);
    let units: Vec<u16> = decoded
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

impl CMap {
    /// The identity mapping over 2-byte codes.
    pub fn identity(wmode: u8) -> CMap {
        CMap {
            name: if wmode == 0 { "Identity-H" } else { "Identity-V" }.into(),
            wmode,
            codespaces: vec![Codespace {
                len: 2,
                low: 0,
                high: 0xFFFF,
            }],
            singles: Vec::new(),
            ranges: vec![(0, 0xFFFF, 0)],
            strings: HashMap::new(),
        }
    }

    /// Resolve a predefined CMap by name.
    pub fn predefined(name: &str) -> Result<CMap> {
        match name {
            "Identity-H" => Ok(CMap::identity(0)),
            "Identity-V" => Ok(CMap::identity(1)),
            other => Err(Error::Unsupported(format!("predefined CMap {other}"))),
        }
    }

    /// Parse an embedded CMap stream.
    pub fn parse(data: &[u8]) -> Result<CMap> {
        let mut cmap = CMap::default();
        let mut input: &[u8] = data;
        // Track the previous token for `/CMapName /X def` and `/WMode 1 def`
        let mut pending_name: Option<String> = None;
        let mut pending_int: Option<i64> = None;

        loop {
            let (rest, tok) = match token(input) {
                Ok(v) => v,
                Err(_) => {
                    if input.is_empty() || crate::lexer::skip_ws(input).is_empty() {
                        break;
                    }
                    // Skip a byte the grammar cannot place; CMaps embed
                    // PostScript we deliberately do not interpret
                    input = &input[1..];
                    continue;
                },
            };

            match tok {
                Token::Keyword(b"begincodespacerange") => {
                    input = cmap.parse_codespaces(rest)?;
                    continue;
                },
                Token::Keyword(b"begincidrange") | Token::Keyword(b"beginbfrange") => {
                    let bf = tok == Token::Keyword(b"beginbfrange");
                    input = cmap.parse_ranges(rest, bf)?;
                    continue;
                },
                Token::Keyword(b"begincidchar") | Token::Keyword(b"beginbfchar") => {
                    let bf = tok == Token::Keyword(b"beginbfchar");
                    input = cmap.parse_chars(rest, bf)?;
                    continue;
                },
                Token::Keyword(b"usecmap") => {
                    log::warn!("usecmap in embedded CMap not followed");
                },
                Token::Keyword(b"def") => {
                    if let (Some(name), Some(value)) = (&pending_name, pending_int) {
                        if name == "WMode" {
                            cmap.wmode = (value != 0) as u8;
                        }
                    }
                    pending_name = None;
                    pending_int = None;
                },
                Token::Name(n) => {
                    if pending_name.as_deref() == Some("CMapName") {
                        cmap.name = n.as_str().to_string();
                        pending_name = None;
                    } else {
                        pending_name = Some(n.as_str().to_string());
                    }
                    pending_int = None;
                },
                Token::Integer(v) => pending_int = Some(v),
                _ => {},
            }
            input = rest;
        }

        cmap.singles.sort_by_key(|&(code, _)| code);
        cmap.ranges.sort_by_key(|&(lo, _, _)| lo);
        if cmap.codespaces.is_empty() {
            // Degenerate CMaps still need a code length to split strings
            cmap.codespaces.push(Codespace {
                len: if cmap.ranges.iter().any(|r| r.1 > 0xFF)
                    || cmap.singles.iter().any(|s| s.0 > 0xFF)
                {
                    2
                } else {
                    1
                },
                low: 0,
                high: 0xFFFF,
            });
        }
        Ok(cmap)
    }

    fn parse_codespaces<'a>(&mut self, mut input: &'a [u8]) -> Result<&'a [u8]> {
        loop {
            match token(input) {
                Ok((rest, Token::Keyword(b"endcodespacerange"))) => return Ok(rest),
                Ok((rest, Token::HexString(lo))) => {
                    let (rest2, hi) = match token(rest) {
                        Ok((r, Token::HexString(hi))) => (r, hi),
                        _ => return Err(Error::syntax("codespace range missing high bound")),
                    };
                    let (low, len) = hex_to_u32(lo);
                    let (high, _) = hex_to_u32(hi);
                    self.codespaces.push(Codespace {
                        len: len.max(1),
                        low,
                        high,
                    });
                    input = rest2;
                },
                Ok((rest, _)) => input = rest,
                Err(_) => return Err(Error::syntax("unterminated codespacerange")),
            }
        }
    }

    fn parse_ranges<'a>(&mut self, mut input: &'a [u8], bf: bool) -> Result<&'a [u8]> {
        let end: &[u8] = if bf { b"endbfrange" } else { b"endcidrange" };
        loop {
            match token(input) {
                Ok((rest, Token::Keyword(kw))) if kw == end => return Ok(rest),
                Ok((rest, Token::HexString(lo))) => {
                    let (low, _) = hex_to_u32(lo);
                    let (rest, hi_tok) =
                        token(rest).map_err(|_| Error::syntax("range missing high bound"))?;
                    let Token::HexString(hi) = hi_tok else {
                        return Err(Error::syntax("range high bound must be hex"));
                    };
                    let (high, _) = hex_to_u32(hi);
                    let (rest, dst) =
                        token(rest).map_err(|_| Error::syntax("range missing target"))?;
                    match dst {
                        Token::Integer(cid) => {
                            self.ranges.push((low, high, cid.max(0) as u32));
                        },
                        Token::HexString(h) => {
                            let text = hex_to_string(h);
                            let mut chars = text.chars();
                            match (chars.next(), chars.next()) {
                                (Some(c), None) => {
                                    self.ranges.push((low, high, c as u32));
                                },
                                _ => {
                                    // Multi-unit target applies to the whole
                                    // range with the last unit incremented
                                    for code in low..=high.min(low + 0xFFFF) {
                                        let mut s = text.clone();
                                        if let Some(last) = s.pop() {
                                            let bumped = char::from_u32(
                                                last as u32 + (code - low),
                                            )
                                            .unwrap_or(last);
                                            s.push(bumped);
                                        }
                                        self.strings.insert(code, s);
                                    }
                                },
                            }
                        },
                        Token::ArrayStart => {
                            // [ <dst> <dst> ... ], one per code
                            let mut code = low;
                            let mut rest2 = rest;
                            loop {
                                match token(rest2) {
                                    Ok((r, Token::ArrayEnd)) => {
                                        rest2 = r;
                                        break;
                                    },
                                    Ok((r, Token::HexString(h))) => {
                                        self.strings.insert(code, hex_to_string(h));
                                        code += 1;
                                        rest2 = r;
                                    },
                                    Ok((r, _)) => rest2 = r,
                                    Err(_) => {
                                        return Err(Error::syntax("unterminated bfrange array"));
                                    },
                                }
                            }
                            input = rest2;
                            continue;
                        },
                        other => {
                            return Err(Error::syntax(format!("bad range target {other:?}")));
                        },
                    }
                    input = rest;
                },
                Ok((rest, _)) => input = rest,
                Err(_) => return Err(Error::syntax("unterminated cid/bf range")),
            }
        }
    }

    fn parse_chars<'a>(&mut self, mut input: &'a [u8], bf: bool) -> Result<&'a [u8]> {
        let end: &[u8] = if bf { b"endbfchar" } else { b"endcidchar" };
        loop {
            match token(input) {
                Ok((rest, Token::Keyword(kw))) if kw == end => return Ok(rest),
                Ok((rest, Token::HexString(code))) => {
                    let (code, _) = hex_to_u32(code);
                    let (rest, dst) =
                        token(rest).map_err(|_| Error::syntax("char mapping missing target"))?;
                    match dst {
                        Token::Integer(cid) => self.singles.push((code, cid.max(0) as u32)),
                        Token::HexString(h) => {
                            let text = hex_to_string(h);
                            let mut chars = text.chars();
                            match (chars.next(), chars.next()) {
                                (Some(c), None) => self.singles.push((code, c as u32)),
                                _ => {
                                    self.strings.insert(code, text);
                                },
                            }
                        },
                        other => {
                            return Err(Error::syntax(format!("bad char target {other:?}")));
                        },
                    }
                    input = rest;
                },
                Ok((rest, _)) => input = rest,
                Err(_) => return Err(Error::syntax("unterminated cid/bf char")),
            }
        }
    }

    /// Look up a code: singles first, then ranges (value base + offset).
    pub fn lookup(&self, code: u32) -> Option<u32> {
        if let Ok(at) = self.singles.binary_search_by_key(&code, |&(c, _)| c) {
            return Some(self.singles[at].1);
        }
        let at = self.ranges.partition_point(|&(lo, _, _)| lo <= code);
        if at > 0 {
            let (lo, hi, base) = self.ranges[at - 1];
            if code >= lo && code <= hi {
                return Some(base + (code - lo));
            }
        }
        None
    }

    /// The Unicode text for a code, when this CMap is a ToUnicode map.
    pub fn to_unicode(&self, code: u32) -> Option<String> {
        if let Some(s) = self.strings.get(&code) {
            return Some(s.clone());
        }
        self.lookup(code)
            .and_then(char::from_u32)
            .map(String::from)
    }

    /// Split a string of bytes into character codes per the codespaces.
    ///
    /// Returns (code, consumed-bytes) pairs. Bytes that match no
    /// codespace consume the shortest declared code length.
    pub fn decode(&self, bytes: &[u8]) -> Vec<(u32, u8)> {
        let mut out = Vec::with_capacity(bytes.len());
        let min_len = self.codespaces.iter().map(|c| c.len).min().unwrap_or(1);
        let mut i = 0usize;
        while i < bytes.len() {
            let mut taken = 0u8;
            let mut code = 0u32;
            let mut value = 0u32;
            let mut matched = None;
            for len in 1..=4u8 {
                if i + len as usize > bytes.len() {
                    break;
                }
                value = (value << 8) | bytes[i + len as usize - 1] as u32;
                if self
                    .codespaces
                    .iter()
                    .any(|cs| cs.len == len && value >= cs.low && value <= cs.high)
                {
                    matched = Some((value, len));
                    break;
                }
            }
            if let Some((v, len)) = matched {
                code = v;
                taken = len;
            } else {
                let len = min_len.min((bytes.len() - i) as u8).max(1);
                for k in 0..len {
                    code = (code << 8) | bytes[i + k as usize] as u32;
                }
                taken = len;
            }
            out.push((code, taken));
            i += taken as usize;
        }
        out
    }
}
