//! Cross-reference index.
//!
//! The xref maps object numbers to file locations, enabling random access.
//! Both classic tables (PDF 1.0-1.4) and cross-reference streams (1.5+)
//! are supported, as are hybrid files carrying both (/XRefStm).
//!
//! A document's xref is layered: incremental updates append sections, and
//! later sections override earlier ones. [`Xref`] keeps the ordered section
//! stack (latest first) plus a flat index mapping each object number to its
//! topmost entry.

use crate::decoders;
use crate::error::{Error, Result};
use crate::lexer::{Token, token};
use crate::object::{Dict, DictExt};
use crate::parser::{self, parse_object};
use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use std::collections::HashMap;

/// One cross-reference entry.
///
/// The free list is conceptually preserved: free entries carry the next
/// free object number and the generation a reuse would get. Entries whose
/// declared type is none of free/offset/compressed are rejected at parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefEntry {
    /// Free entry: next free object number, next-reuse generation
    Free {
        /// Next free object number in the free list
        next: u32,
        /// Generation a reuse of this number would get
        gen: u16,
    },
    /// In use at a byte offset
    Offset {
        /// Byte offset of the `N G obj` header
        offset: u64,
        /// Generation number
        gen: u16,
    },
    /// In use inside a compressed object stream
    InStream {
        /// Object number of the holding /ObjStm
        stream_num: u32,
        /// Index of the object within the stream
        index: u32,
    },
}

impl XrefEntry {
    /// Generation this entry answers to (compressed entries are always 0).
    pub fn generation(&self) -> u16 {
        match self {
            XrefEntry::Free { gen, .. } | XrefEntry::Offset { gen, .. } => *gen,
            XrefEntry::InStream { .. } => 0,
        }
    }
}

/// One xref section (a table or stream plus its trailer dictionary).
#[derive(Debug, Clone, Default)]
pub struct XrefSection {
    /// Entries contributed by this section
    pub entries: HashMap<u32, XrefEntry>,
    /// The section's trailer (for streams, the stream dictionary)
    pub trailer: Dict,
}

/// The layered cross-reference index of a document.
#[derive(Debug, Clone, Default)]
pub struct Xref {
    /// Sections, latest first
    pub sections: Vec<XrefSection>,
    /// Flat index: object number to its topmost entry
    index: HashMap<u32, XrefEntry>,
    /// Merged trailer, newest value per key
    trailer: Dict,
}

impl Xref {
    /// Look up the topmost entry for an object number.
    pub fn get(&self, num: u32) -> Option<&XrefEntry> {
        self.index.get(&num)
    }

    /// The merged trailer dictionary.
    pub fn trailer(&self) -> &Dict {
        &self.trailer
    }

    /// Number of distinct object numbers covered.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Largest object number present.
    pub fn max_object_num(&self) -> u32 {
        self.index.keys().copied().max().unwrap_or(0)
    }

    /// Push a section (latest first order) and fold it into the flat index.
    pub fn push_section(&mut self, section: XrefSection) {
        for (&num, &entry) in &section.entries {
            self.index.entry(num).or_insert(entry);
        }
        for (key, value) in &section.trailer {
            if !self.trailer.contains_key(key.as_str()) {
                self.trailer.insert(key.clone(), value.clone());
            }
        }
        self.sections.push(section);
    }

    /// Sanity check: a well-formed xref covers object 0 (the free-list
    /// head) and names a /Root. Failing this sends the caller to repair.
    pub fn looks_valid(&self) -> bool {
        !self.index.is_empty() && self.trailer.contains_key("Root")
    }
}

/// Locate the `startxref` offset by scanning the file tail.
pub fn find_startxref(data: &[u8]) -> Result<u64> {
    let tail_len = data.len().min(2048);
    let tail = &data[data.len() - tail_len..];
    let pos = tail
        .windows(9)
        .rposition(|w| w == b"startxref")
        .ok_or_else(|| Error::syntax("startxref not found"))?;

    let mut rest = &tail[pos + 9..];
    // The next token must be the offset integer
    loop {
        match token(rest) {
            Ok((_, Token::Integer(n))) if n >= 0 => return Ok(n as u64),
            Ok((_, Token::Real(r))) if r >= 0.0 => return Ok(r as u64),
            Ok((next, _)) => rest = next,
            Err(_) => return Err(Error::syntax("no offset after startxref")),
        }
    }
}

/// Read the full xref chain starting from the `startxref` offset.
///
/// Follows /Prev pointers (and /XRefStm in hybrid files), bounded against
/// cyclic chains. Any broken link fails the whole read; the caller falls
/// back to repair.
pub fn read_xref(data: &Bytes) -> Result<Xref> {
    let start = find_startxref(data)?;
    let mut xref = Xref::default();
    let mut visited: Vec<u64> = Vec::new();
    let mut next = Some(start);

    while let Some(offset) = next {
        if visited.contains(&offset) {
            log::warn!("cyclic xref chain at offset {offset}, stopping");
            break;
        }
        if visited.len() >= 256 {
            return Err(Error::range("xref /Prev chain exceeds 256 sections"));
        }
        visited.push(offset);

        let section = read_section(data, offset)?;

        // Hybrid files: the classic table points at a parallel xref stream
        let hybrid = section.trailer.get_int("XRefStm");
        let prev = section.trailer.get_int("Prev");
        xref.push_section(section);

        if let Some(stm_offset) = hybrid {
            match read_section(data, stm_offset as u64) {
                Ok(stm_section) => xref.push_section(stm_section),
                Err(e) => log::warn!("broken /XRefStm at {stm_offset}: {e}"),
            }
        }

        next = prev.and_then(|p| (p >= 0).then_some(p as u64));
    }

    Ok(xref)
}

/// Parse one section at `offset`, auto-detecting table vs stream form.
fn read_section(data: &Bytes, offset: u64) -> Result<XrefSection> {
    let offset = offset as usize;
    if offset >= data.len() {
        return Err(Error::range(format!("xref offset {offset} beyond end of file")));
    }
    let input = &data[offset..];
    match token(input) {
        Ok((rest, Token::Keyword(b"xref"))) => parse_table(rest),
        Ok((_, Token::Integer(_))) => parse_stream_section(data, offset),
        Ok((_, other)) => Err(Error::syntax(format!(
            "expected xref table or stream at {offset}, found {other:?}"
        ))),
        Err(_) => Err(Error::syntax(format!(
            "expected xref table or stream at {offset}"
        ))),
    }
}

fn next_token(input: &[u8]) -> Result<(&[u8], Token<'_>)> {
    token(input).map_err(|_| Error::syntax("unexpected end of xref data"))
}

/// Parse a classic `xref` table followed by its `trailer` dictionary.
fn parse_table(mut input: &[u8]) -> Result<XrefSection> {
    let mut section = XrefSection::default();

    loop {
        match token(input) {
            Ok((rest, Token::Keyword(b"trailer"))) => {
                let (obj, _) = parse_object(rest)?;
                section.trailer = obj.into_dict()?;
                return Ok(section);
            },
            Ok((rest, Token::Integer(start))) => {
                let (rest, count) = match next_token(rest)? {
                    (r, Token::Integer(c)) if c >= 0 => (r, c as u64),
                    (_, other) => {
                        return Err(Error::syntax(format!(
                            "expected subsection count, found {other:?}"
                        )));
                    },
                };
                if start < 0 {
                    return Err(Error::range("negative subsection start"));
                }
                input = parse_subsection(rest, start as u32, count, &mut section)?;
            },
            Ok((_, other)) => {
                return Err(Error::syntax(format!("unexpected {other:?} in xref table")));
            },
            Err(_) => return Err(Error::syntax("unterminated xref table")),
        }
    }
}

/// Parse `count` 20-byte entries of one subsection.
fn parse_subsection<'a>(
    mut input: &'a [u8],
    start: u32,
    count: u64,
    section: &mut XrefSection,
) -> Result<&'a [u8]> {
    for i in 0..count {
        let num = start + i as u32;
        let (rest, offset) = match next_token(input)? {
            (r, Token::Integer(n)) if n >= 0 => (r, n as u64),
            (r, Token::Real(f)) if f >= 0.0 => (r, f as u64), // >10-digit offsets
            (_, other) => {
                return Err(Error::syntax(format!("bad xref entry offset: {other:?}")));
            },
        };
        let (rest, gen) = match next_token(rest)? {
            (r, Token::Integer(g)) if (0..=65535).contains(&g) => (r, g as u16),
            (_, other) => {
                return Err(Error::syntax(format!("bad xref entry generation: {other:?}")));
            },
        };
        let (rest, kind) = next_token(rest)?;
        let entry = match kind {
            Token::Keyword(b"n") => XrefEntry::Offset { offset, gen },
            Token::Keyword(b"f") => XrefEntry::Free {
                next: offset as u32,
                gen,
            },
            other => {
                return Err(Error::syntax(format!("bad xref entry type: {other:?}")));
            },
        };
        section.entries.entry(num).or_insert(entry);
        input = rest;
    }
    Ok(input)
}

/// Parse a cross-reference stream section at `offset`.
///
/// Xref streams are never encrypted, so decoding goes straight through the
/// filter chain. Field widths come from /W; a zero first width defaults
/// the type field to 1 (in use at offset).
fn parse_stream_section(data: &Bytes, offset: usize) -> Result<XrefSection> {
    let ind = parser::parse_indirect_at(data, offset, &mut |_| None)
        .map_err(|e| e.context(format!("xref stream at {offset}")))?;
    let stream = ind.object.into_stream()?;

    if stream.dict.get_name("Type") != Some("XRef") {
        log::warn!("xref stream at {offset} lacks /Type /XRef");
    }

    let chain = decoders::filter_chain(stream.dict.get("Filter"), stream.dict.get("DecodeParms"));
    let decoded = decoders::decode_chain(&stream.data, &chain)?;

    let widths = stream
        .dict
        .get_array("W")
        .ok_or_else(|| Error::syntax("xref stream missing /W"))?;
    let w: Vec<usize> = widths
        .iter()
        .map(|o| o.as_int().unwrap_or(0).clamp(0, 8) as usize)
        .collect();
    if w.len() < 3 {
        return Err(Error::syntax(format!("xref stream /W has {} fields", w.len())));
    }
    let row_len: usize = w.iter().sum();
    if row_len == 0 {
        return Err(Error::syntax("xref stream /W is all zeros"));
    }

    let size = stream.dict.get_int("Size").unwrap_or(0).max(0);
    let ranges: Vec<(u32, u64)> = match stream.dict.get_array("Index") {
        Some(pairs) => pairs
            .chunks(2)
            .filter_map(|pair| match pair {
                [a, b] => Some((a.as_int()? as u32, b.as_int()?.max(0) as u64)),
                _ => None,
            })
            .collect(),
        None => vec![(0, size as u64)],
    };

    let read_field = |row: &[u8], start: usize, len: usize| -> u64 {
        if len == 0 {
            return 0;
        }
        let mut buf = [0u8; 8];
        buf[8 - len..].copy_from_slice(&row[start..start + len]);
        BigEndian::read_u64(&buf)
    };

    let mut section = XrefSection {
        entries: HashMap::new(),
        trailer: stream.dict.clone(),
    };

    let mut rows = decoded.chunks_exact(row_len);
    for (start, count) in ranges {
        for i in 0..count {
            let Some(row) = rows.next() else {
                log::warn!("xref stream shorter than its /Index declares");
                return Ok(section);
            };
            let num = start + i as u32;
            let kind = if w[0] == 0 { 1 } else { read_field(row, 0, w[0]) };
            let f2 = read_field(row, w[0], w[1]);
            let f3 = read_field(row, w[0] + w[1], w[2]);
            let entry = match kind {
                0 => XrefEntry::Free {
                    next: f2 as u32,
                    gen: f3.min(65535) as u16,
                },
                1 => XrefEntry::Offset {
                    offset: f2,
                    gen: f3.min(65535) as u16,
                },
                2 => XrefEntry::InStream {
                    stream_num: f2 as u32,
                    index: f3 as u32,
                },
                other => {
                    // Reject types outside the recognized set
                    return Err(Error::syntax(format!("xref stream entry type {other}")));
                },
            };
            section.entries.entry(num).or_insert(entry);
        }
    }

    Ok(section)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_startxref() {
        let data = b"%PDF-1.4\njunk\nstartxref\n1234\n%%EOF";
        assert_eq!(find_startxref(data).unwrap(), 1234);
    }

    #[test]
    fn test_find_startxref_takes_last() {
        let data = b"startxref\n10\n%%EOF\nstartxref\n99\n%%EOF";
        assert_eq!(find_startxref(data).unwrap(), 99);
    }

    #[test]
    fn test_missing_startxref() {
        assert!(find_startxref(b"%PDF-1.4 nothing here").is_err());
    }

    fn classic_pdf() -> Vec<u8> {
        // Minimal single-section classic file layout
        let mut pdf = Vec::new();
        pdf.extend_from_slice(b"%PDF-1.4\n");
        let obj1 = pdf.len();
        pdf.extend_from_slice(b"1 0 obj << /Type /Catalog >> endobj\n");
        let xref_at = pdf.len();
        pdf.extend_from_slice(b"xref\n0 2\n0000000000 65535 f \n");
        pdf.extend_from_slice(format!("{obj1:010} 00000 n \n").as_bytes());
        pdf.extend_from_slice(b"trailer << /Size 2 /Root 1 0 R >>\n");
        pdf.extend_from_slice(format!("startxref\n{xref_at}\n%%EOF").as_bytes());
        pdf
    }

    #[test]
    fn test_read_classic_table() {
        let data = Bytes::from(classic_pdf());
        let xref = read_xref(&data).unwrap();
        assert!(xref.looks_valid());
        assert_eq!(xref.len(), 2);
        assert!(matches!(xref.get(0), Some(XrefEntry::Free { gen: 65535, .. })));
        let Some(XrefEntry::Offset { offset, gen: 0 }) = xref.get(1) else {
            panic!("entry 1 should be an offset entry");
        };
        assert_eq!(*offset, 9);
        assert_eq!(xref.trailer().get_int("Size"), Some(2));
    }

    #[test]
    fn test_layering_latest_wins() {
        let mut xref = Xref::default();
        let mut newer = XrefSection::default();
        newer.entries.insert(5, XrefEntry::Offset { offset: 100, gen: 0 });
        let mut older = XrefSection::default();
        older.entries.insert(5, XrefEntry::Offset { offset: 50, gen: 0 });
        older.entries.insert(6, XrefEntry::Offset { offset: 60, gen: 0 });
        xref.push_section(newer);
        xref.push_section(older);
        assert!(matches!(xref.get(5), Some(XrefEntry::Offset { offset: 100, .. })));
        assert!(matches!(xref.get(6), Some(XrefEntry::Offset { offset: 60, .. })));
        assert_eq!(xref.sections.len(), 2);
    }

    #[test]
    fn test_xref_stream_section() {
        // Type 1 entries for objects 0..3, W [1 2 1], no filter
        let mut body = Vec::new();
        body.extend_from_slice(&[0, 0, 0, 255]); // 0: free
        body.extend_from_slice(&[1, 0, 20, 0]); // 1: offset 20
        body.extend_from_slice(&[2, 0, 7, 1]); // 2: in stream 7 index 1
        let mut pdf = Vec::new();
        pdf.extend_from_slice(b"%PDF-1.5\n");
        let at = pdf.len();
        pdf.extend_from_slice(
            format!(
                "9 0 obj << /Type /XRef /Size 3 /W [1 2 1] /Root 1 0 R /Length {} >> stream\n",
                body.len()
            )
            .as_bytes(),
        );
        pdf.extend_from_slice(&body);
        pdf.extend_from_slice(b"\nendstream endobj\n");
        pdf.extend_from_slice(format!("startxref\n{at}\n%%EOF").as_bytes());

        let xref = read_xref(&Bytes::from(pdf)).unwrap();
        assert!(matches!(xref.get(0), Some(XrefEntry::Free { .. })));
        assert!(matches!(xref.get(1), Some(XrefEntry::Offset { offset: 20, gen: 0 })));
        assert!(matches!(
            xref.get(2),
            Some(XrefEntry::InStream { stream_num: 7, index: 1 })
        ));
    }
}
