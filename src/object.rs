//! PDF object types.
//!
//! The typed value tree produced by the parser. Arrays and dictionaries own
//! their children; dictionaries are ordered maps with last-wins duplicate
//! resolution. Indirect references are plain (number, generation) handles —
//! resolving them is the document's job, and cyclic reference graphs are
//! handled there by marking during traversal, never here.

use crate::error::{Error, Result};
use crate::names::Name;
use bytes::Bytes;
use indexmap::IndexMap;

/// A PDF dictionary: an ordered mapping from name to value.
///
/// `IndexMap::insert` keeps the first occurrence's position and replaces the
/// value, which is exactly the last-wins duplicate rule the grammar requires.
pub type Dict = IndexMap<Name, Object>;

/// Reference to an indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef {
    /// Object number
    pub num: u32,
    /// Generation number
    pub gen: u16,
}

impl ObjRef {
    /// Create a new object reference.
    pub fn new(num: u32, gen: u16) -> Self {
        Self { num, gen }
    }
}

impl std::fmt::Display for ObjRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.num, self.gen)
    }
}

/// A stream object: a dictionary plus its raw (still encoded) payload.
///
/// The payload is a cheap slice of the document's backing buffer. Decoding
/// through the filter chain happens on demand via the document, so holding a
/// `Stream` does not hold decoded data.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    /// Stream dictionary
    pub dict: Dict,
    /// Raw payload bytes, exactly /Length long (or recovered by scanning)
    pub data: Bytes,
}

/// PDF object representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Real (floating-point) value
    Real(f64),
    /// String (arbitrary bytes, escape sequences already decoded)
    String(Vec<u8>),
    /// Name (decoded byte form)
    Name(Name),
    /// Array of objects
    Array(Vec<Object>),
    /// Dictionary
    Dict(Dict),
    /// Stream (dictionary + raw payload)
    Stream(Stream),
    /// Indirect object reference
    Ref(ObjRef),
}

impl Object {
    /// Human-readable type name, without data.
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Bool(_) => "Boolean",
            Object::Int(_) => "Integer",
            Object::Real(_) => "Real",
            Object::String(_) => "String",
            Object::Name(_) => "Name",
            Object::Array(_) => "Array",
            Object::Dict(_) => "Dictionary",
            Object::Stream(_) => "Stream",
            Object::Ref(_) => "Reference",
        }
    }

    /// Try to cast to integer (strict: reals do not coerce).
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Object::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value as f64, coercing integers.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Object::Int(i) => Some(*i as f64),
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to cast to name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(n) => Some(n.as_str()),
            _ => None,
        }
    }

    /// Try to cast to string bytes.
    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to array.
    pub fn as_array(&self) -> Option<&[Object]> {
        match self {
            Object::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Try to cast to dictionary. Works for both dictionaries and streams.
    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Object::Dict(d) => Some(d),
            Object::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    /// Try to cast to stream.
    pub fn as_stream(&self) -> Option<&Stream> {
        match self {
            Object::Stream(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to indirect reference.
    pub fn as_ref(&self) -> Option<ObjRef> {
        match self {
            Object::Ref(r) => Some(*r),
            _ => None,
        }
    }

    /// Check if object is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    /// Cast to dictionary or fail with a typed error.
    pub fn into_dict(self) -> Result<Dict> {
        match self {
            Object::Dict(d) => Ok(d),
            Object::Stream(s) => Ok(s.dict),
            other => Err(Error::syntax(format!(
                "expected Dictionary, found {}",
                other.type_name()
            ))),
        }
    }

    /// Cast to stream or fail with a typed error.
    pub fn into_stream(self) -> Result<Stream> {
        match self {
            Object::Stream(s) => Ok(s),
            other => Err(Error::syntax(format!(
                "expected Stream, found {}",
                other.type_name()
            ))),
        }
    }
}

/// Convenience accessors over dictionaries.
///
/// These do NOT resolve indirect references; use the document's `resolve`
/// when a value may be indirect.
pub trait DictExt {
    /// Integer value for `key`, if present and an integer.
    fn get_int(&self, key: &str) -> Option<i64>;
    /// Numeric value for `key`, coercing integers to f64.
    fn get_number(&self, key: &str) -> Option<f64>;
    /// Name value for `key`.
    fn get_name(&self, key: &str) -> Option<&str>;
    /// Boolean value for `key`.
    fn get_bool(&self, key: &str) -> Option<bool>;
    /// Array value for `key`.
    fn get_array(&self, key: &str) -> Option<&[Object]>;
    /// Dictionary value for `key`.
    fn get_dict(&self, key: &str) -> Option<&Dict>;
}

impl DictExt for Dict {
    fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Object::as_int)
    }

    fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Object::as_number)
    }

    fn get_name(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Object::as_name)
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Object::as_bool)
    }

    fn get_array(&self, key: &str) -> Option<&[Object]> {
        self.get(key).and_then(Object::as_array)
    }

    fn get_dict(&self, key: &str) -> Option<&Dict> {
        self.get(key).and_then(Object::as_dict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_int() {
        let obj = Object::Int(42);
        assert_eq!(obj.as_int(), Some(42));
        assert_eq!(obj.as_number(), Some(42.0));
        assert!(obj.as_name().is_none());
        assert!(!obj.is_null());
    }

    #[test]
    fn test_real_does_not_coerce_to_int() {
        let obj = Object::Real(2.5);
        assert_eq!(obj.as_int(), None);
        assert_eq!(obj.as_number(), Some(2.5));
    }

    #[test]
    fn test_stream_as_dict() {
        let mut dict = Dict::new();
        dict.insert(Name::new("Length"), Object::Int(5));
        let obj = Object::Stream(Stream {
            dict,
            data: Bytes::from_static(b"hello"),
        });
        assert_eq!(obj.as_dict().unwrap().get_int("Length"), Some(5));
    }

    #[test]
    fn test_dict_last_wins_keeps_order() {
        let mut dict = Dict::new();
        dict.insert(Name::new("A"), Object::Int(1));
        dict.insert(Name::new("B"), Object::Int(2));
        dict.insert(Name::new("A"), Object::Int(3));
        assert_eq!(dict.get_int("A"), Some(3));
        let keys: Vec<&str> = dict.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["A", "B"]);
    }

    #[test]
    fn test_objref_display() {
        assert_eq!(format!("{}", ObjRef::new(10, 0)), "10 0 R");
    }

    #[test]
    fn test_into_dict_error_names_found_type() {
        let err = Object::Int(7).into_dict().unwrap_err();
        assert!(format!("{}", err).contains("Integer"));
    }

    #[test]
    fn test_empty_containers_are_legal() {
        assert_eq!(Object::String(Vec::new()).as_string(), Some(&b""[..]));
        assert_eq!(Object::Array(Vec::new()).as_array().map(|a| a.len()), Some(0));
        assert!(Object::Dict(Dict::new()).as_dict().unwrap().is_empty());
    }
}
