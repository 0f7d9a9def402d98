//! Cross-reference reconstruction for damaged files.
//!
//! When the xref chain is broken, missing, or inconsistent, the file is
//! scanned linearly for `N G obj` headers and a synthetic xref is built
//! from what is found. Later headers for the same object number win, which
//! matches the incremental-update convention of appending newer bodies.
//! The trailer is recovered from the last parseable `trailer` dictionary,
//! or synthesized by locating a /Catalog object.

use crate::error::{Error, Result};
use crate::lexer::{Token, is_delimiter, is_whitespace, token};
use crate::names::Name;
use crate::object::{Dict, DictExt, Object, ObjRef};
use crate::parser::parse_object;
use crate::xref::{Xref, XrefEntry, XrefSection};
use bytes::Bytes;

/// Rebuild the xref by scanning the whole file for object headers.
pub fn repair_xref(data: &Bytes) -> Result<Xref> {
    log::info!("repairing damaged xref by scanning {} bytes", data.len());

    let mut section = XrefSection::default();
    let mut catalog: Option<ObjRef> = None;
    let mut info: Option<ObjRef> = None;
    let mut pos = 0usize;

    while pos < data.len() {
        let Some(found) = find_obj_header(&data[pos..]) else {
            break;
        };
        let at = pos + found.start;
        let body_at = pos + found.body;

        // Later definitions override earlier ones
        section.entries.insert(
            found.re.num,
            XrefEntry::Offset {
                offset: at as u64,
                gen: found.re.gen,
            },
        );

        // Peek at the body: a /Type /Catalog candidate feeds trailer
        // synthesis when no trailer dictionary survives.
        if let Ok((body, _)) = parse_object(&data[body_at..]) {
            if let Some(dict) = body.as_dict() {
                match dict.get_name("Type") {
                    Some("Catalog") => catalog = Some(found.re),
                    Some("Info") => info = Some(found.re),
                    _ => {},
                }
                if info.is_none() && dict.contains_key("Producer") {
                    info = Some(found.re);
                }
            }
        }

        pos = body_at;
    }

    if section.entries.is_empty() {
        return Err(Error::syntax("repair scan found no objects"));
    }
    log::info!("repair scan found {} objects", section.entries.len());

    section.trailer = match find_last_trailer(data) {
        Some(trailer) => trailer,
        None => {
            let root = catalog.ok_or_else(|| {
                Error::syntax("repair failed: no trailer and no /Catalog object found")
            })?;
            log::warn!("no trailer found, synthesizing one around {root}");
            let mut trailer = Dict::new();
            trailer.insert(Name::new("Root"), Object::Ref(root));
            if let Some(info) = info {
                trailer.insert(Name::new("Info"), Object::Ref(info));
            }
            trailer
        },
    };

    // Object 0 heads the free list even in a synthetic table
    section
        .entries
        .entry(0)
        .or_insert(XrefEntry::Free { next: 0, gen: 65535 });

    let size = section.entries.keys().copied().max().unwrap_or(0) + 1;
    section
        .trailer
        .entry(Name::new("Size"))
        .or_insert(Object::Int(size as i64));

    let mut xref = Xref::default();
    xref.push_section(section);
    Ok(xref)
}

struct FoundHeader {
    /// Offset of the first digit of the object number (relative to scan start)
    start: usize,
    /// Offset just past `obj`, where the body begins (relative to scan start)
    body: usize,
    re: ObjRef,
}

/// Find the next `N G obj` header in `data`, returning offsets relative to
/// `data`'s start. The `obj` keyword must be delimited on both sides so
/// `endobj` never matches.
fn find_obj_header(data: &[u8]) -> Option<FoundHeader> {
    let mut i = 0usize;
    while i + 3 <= data.len() {
        let Some(rel) = data[i..].windows(3).position(|w| w == b"obj") else {
            return None;
        };
        let at = i + rel;
        i = at + 3;

        // Must not be the tail of `endobj` and must end at a boundary
        if at > 0 && !is_whitespace(data[at - 1]) {
            continue;
        }
        if let Some(&after) = data.get(at + 3) {
            if !is_whitespace(after) && !is_delimiter(after) {
                continue;
            }
        }

        // Walk backwards over "N G " before the keyword
        let Some((start, re)) = parse_header_numbers(data, at) else {
            continue;
        };
        return Some(FoundHeader {
            start,
            body: at + 3,
            re,
        });
    }
    None
}

/// Parse the `N G` that precedes an `obj` keyword at `at`, scanning back.
fn parse_header_numbers(data: &[u8], at: usize) -> Option<(usize, ObjRef)> {
    let mut end = at;
    // skip whitespace before obj
    while end > 0 && is_whitespace(data[end - 1]) {
        end -= 1;
    }
    let gen_end = end;
    while end > 0 && data[end - 1].is_ascii_digit() {
        end -= 1;
    }
    let gen_start = end;
    if gen_start == gen_end {
        return None;
    }
    while end > 0 && is_whitespace(data[end - 1]) {
        end -= 1;
    }
    let num_end = end;
    while end > 0 && data[end - 1].is_ascii_digit() {
        end -= 1;
    }
    let num_start = end;
    if num_start == num_end {
        return None;
    }
    // The object number must start a line or follow whitespace
    if num_start > 0 && !is_whitespace(data[num_start - 1]) && !is_delimiter(data[num_start - 1]) {
        return None;
    }

    let num: u32 = std::str::from_utf8(&data[num_start..num_end]).ok()?.parse().ok()?;
    let gen: u16 = std::str::from_utf8(&data[gen_start..gen_end]).ok()?.parse().ok()?;
    Some((num_start, ObjRef::new(num, gen)))
}

/// Find the most plausible trailing `trailer` dictionary.
fn find_last_trailer(data: &[u8]) -> Option<Dict> {
    let mut best = None;
    let mut i = 0usize;
    while let Some(rel) = data[i..].windows(7).position(|w| w == b"trailer") {
        let at = i + rel;
        i = at + 7;
        if matches!(token(&data[at + 7..]), Ok((_, Token::DictStart))) {
            if let Ok((obj, _)) = parse_object(&data[at + 7..]) {
                if let Ok(dict) = obj.into_dict() {
                    if dict.contains_key("Root") {
                        best = Some(dict);
                    }
                }
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn damaged_pdf() -> Vec<u8> {
        let mut pdf = Vec::new();
        pdf.extend_from_slice(b"%PDF-1.4\n");
        pdf.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
        pdf.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [] /Count 0 >> endobj\n");
        pdf.extend_from_slice(b"trailer << /Size 3 /Root 1 0 R >>\n");
        pdf.extend_from_slice(b"startxref\n999999\n%%EOF"); // bogus offset
        pdf
    }

    #[test]
    fn test_repair_finds_objects_and_trailer() {
        let xref = repair_xref(&Bytes::from(damaged_pdf())).unwrap();
        assert!(xref.looks_valid());
        assert!(matches!(xref.get(1), Some(XrefEntry::Offset { gen: 0, .. })));
        assert!(matches!(xref.get(2), Some(XrefEntry::Offset { .. })));
        assert_eq!(xref.trailer().get_int("Size"), Some(3));
    }

    #[test]
    fn test_repair_synthesizes_trailer() {
        let mut pdf = Vec::new();
        pdf.extend_from_slice(b"%PDF-1.4\n");
        pdf.extend_from_slice(b"4 0 obj << /Type /Catalog /Pages 5 0 R >> endobj\n");
        pdf.extend_from_slice(b"5 0 obj << /Type /Pages /Kids [] /Count 0 >> endobj\n");
        let xref = repair_xref(&Bytes::from(pdf)).unwrap();
        assert_eq!(
            xref.trailer().get("Root").and_then(Object::as_ref),
            Some(ObjRef::new(4, 0))
        );
    }

    #[test]
    fn test_later_definition_wins() {
        let mut pdf = Vec::new();
        pdf.extend_from_slice(b"3 0 obj (old) endobj\n");
        let second = pdf.len();
        pdf.extend_from_slice(b"3 0 obj (new) endobj\n");
        pdf.extend_from_slice(b"1 0 obj << /Type /Catalog >> endobj\n");
        let xref = repair_xref(&Bytes::from(pdf)).unwrap();
        let Some(XrefEntry::Offset { offset, .. }) = xref.get(3) else {
            panic!("expected offset entry");
        };
        assert_eq!(*offset, second as u64);
    }

    #[test]
    fn test_endobj_not_mistaken_for_header() {
        let pdf = b"7 0 obj << /Type /Catalog >> endobj\n".to_vec();
        let xref = repair_xref(&Bytes::from(pdf)).unwrap();
        assert_eq!(xref.len(), 2); // object 7 plus the synthetic free head
    }

    #[test]
    fn test_empty_input_fails() {
        assert!(repair_xref(&Bytes::from_static(b"nothing here")).is_err());
    }
}
