//! Object stream parsing (PDF 1.5+).
//!
//! An /ObjStm packs multiple non-stream objects into one compressed
//! stream: /N pairs of `obj_num offset` integers, then the object bodies
//! starting at /First. Loading object k of the stream means decoding the
//! stream once and parsing at its declared offset.

use crate::error::{Error, Result};
use crate::object::{DictExt, Object, Stream};
use crate::parser::parse_object;

/// The parsed directory of an object stream: (object number, byte offset
/// relative to /First) pairs in declaration order.
pub fn objstm_directory(dict_n: i64, header: &[u8]) -> Result<Vec<(u32, usize)>> {
    let mut pairs = Vec::with_capacity(dict_n.max(0) as usize);
    let mut rest = header;
    for _ in 0..dict_n.max(0) {
        let (num, r) = parse_int(rest)?;
        let (off, r) = parse_int(r)?;
        if num < 0 || off < 0 {
            return Err(Error::range("negative object stream directory entry"));
        }
        pairs.push((num as u32, off as usize));
        rest = r;
    }
    Ok(pairs)
}

fn parse_int(input: &[u8]) -> Result<(i64, &[u8])> {
    match crate::lexer::token(input) {
        Ok((rest, crate::lexer::Token::Integer(n))) => Ok((n, rest)),
        Ok((rest, crate::lexer::Token::Real(f))) => Ok((f as i64, rest)),
        _ => Err(Error::syntax("expected integer in object stream directory")),
    }
}

/// Extract object `num` from a decoded object stream.
///
/// `decoded` is the fully defiltered stream content; `stream` supplies /N
/// and /First. The entry's declared index is cross-checked against the
/// directory so a stale xref entry cannot fetch the wrong body.
pub fn load_from_objstm(stream: &Stream, decoded: &[u8], num: u32, index: u32) -> Result<Object> {
    let n = stream.dict.get_int("N").unwrap_or(0);
    let first = stream.dict.get_int("First").unwrap_or(0);
    if first < 0 || first as usize > decoded.len() {
        return Err(Error::range(format!("/First {first} outside object stream")));
    }
    let first = first as usize;

    let directory = objstm_directory(n, &decoded[..first])?;

    // Prefer the xref's declared index; fall back to a directory search
    let entry = directory
        .get(index as usize)
        .filter(|(dir_num, _)| *dir_num == num)
        .or_else(|| directory.iter().find(|(dir_num, _)| *dir_num == num))
        .copied();

    let Some((_, offset)) = entry else {
        return Err(Error::range(format!(
            "object {num} not found in object stream directory"
        )));
    };

    if first + offset > decoded.len() {
        return Err(Error::range(format!("object {num} offset outside object stream")));
    }
    let (object, _) = parse_object(&decoded[first + offset..])?;
    Ok(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::Name;
    use crate::object::Dict;
    use bytes::Bytes;

    fn make_objstm(count: i64, first: i64, content: &[u8]) -> Stream {
        let mut dict = Dict::new();
        dict.insert(Name::new("Type"), Object::Name("ObjStm".into()));
        dict.insert(Name::new("N"), Object::Int(count));
        dict.insert(Name::new("First"), Object::Int(first));
        Stream {
            dict,
            data: Bytes::copy_from_slice(content),
        }
    }

    #[test]
    fn test_directory_parsing() {
        let pairs = objstm_directory(3, b"10 0 11 15 12 28 ").unwrap();
        assert_eq!(pairs, vec![(10, 0), (11, 15), (12, 28)]);
    }

    #[test]
    fn test_load_by_index() {
        let content = b"10 0 11 11\n<< /A 1 >> [1 2 3]";
        let stream = make_objstm(2, 11, content);
        let obj = load_from_objstm(&stream, content, 11, 1).unwrap();
        assert_eq!(obj.as_array().map(<[Object]>::len), Some(3));
    }

    #[test]
    fn test_load_with_stale_index_falls_back() {
        let content = b"10 0 11 11\n<< /A 1 >> [1 2 3]";
        let stream = make_objstm(2, 11, content);
        // Wrong index, correct number: the directory search recovers it
        let obj = load_from_objstm(&stream, content, 10, 5).unwrap();
        assert!(obj.as_dict().is_some());
    }

    #[test]
    fn test_missing_object_errors() {
        let content = b"10 0 5 ";
        let stream = make_objstm(1, 5, content);
        assert!(load_from_objstm(&stream, content, 99, 0).is_err());
    }
}
