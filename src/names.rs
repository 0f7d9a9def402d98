//! Interned PDF name handles.
//!
//! Dictionary lookups dominate object traversal, so the standard names from
//! PDF 32000-1 are interned through a perfect-hash table: constructing a
//! [`Name`] for one of them costs a phf probe and no allocation. Non-standard
//! names fall back to an owned string. Identity is the decoded byte form
//! (after `#HH` expansion, which the lexer performs).

use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

/// The standard names of PDF 32000-1 that appear on hot lookup paths.
static STANDARD_NAMES: phf::Set<&'static str> = phf::phf_set! {
    "AIS", "ASCII85Decode", "ASCIIHexDecode", "Alternate", "Annots",
    "AntiAlias", "Ascent", "Author", "BBox", "BC", "BG", "BM",
    "BaseEncoding", "BaseFont", "BitsPerComponent", "BitsPerSample",
    "BlackIs1", "Bounds", "C0", "C1", "CA", "CCITTFaxDecode", "CF", "CFM",
    "CIDFontType0", "CIDFontType2", "CIDSystemInfo", "CIDToGIDMap",
    "CalGray", "CalRGB", "CapHeight", "Catalog", "CharProcs", "ColorSpace",
    "ColorTransform", "Colors", "Columns", "Contents", "Count", "CreationDate",
    "Creator", "CropBox", "CryptFilter", "D", "DCTDecode", "DamagedRowsBeforeError",
    "Decode", "DecodeParms", "Descent", "DeviceCMYK", "DeviceGray", "DeviceN",
    "DeviceRGB", "Differences", "Domain", "EarlyChange", "Encode",
    "EncodedByteAlign", "Encoding", "Encrypt", "EncryptMetadata", "EndOfBlock",
    "EndOfLine", "ExtGState", "Extend", "F", "Filter", "First", "FirstChar",
    "Flags", "FlateDecode", "Font", "FontDescriptor", "FontFile", "FontFile2",
    "FontFile3", "FontMatrix", "Function", "FunctionType", "Functions", "G",
    "Gamma", "Group", "H", "Height", "ID", "ICCBased", "Identity",
    "Identity-H", "Identity-V", "Image", "ImageMask", "Index", "Indexed",
    "Info", "Intent", "Interpolate", "ItalicAngle", "JBIG2Decode",
    "JBIG2Globals", "JPXDecode", "K", "Kids", "LZWDecode", "Lab", "Last",
    "LastChar", "Length", "Length1", "Limits", "Matrix", "Matte", "MediaBox",
    "Mask", "MissingWidth", "N", "Name", "Names", "None", "Nums", "O", "OC",
    "OCGs", "OCMD", "OCProperties", "OE", "OFF", "ON", "OP", "OPM", "Off",
    "Order", "Ordering", "Outlines", "P", "Pages", "Parent", "Pattern",
    "PatternType", "Perms", "Predictor", "Prev", "Print", "PrintState",
    "Producer", "R", "Range", "Registry", "Resources", "Root", "Rotate",
    "Rows", "RunLengthDecode", "S", "SMask", "Separation", "Shading",
    "ShadingType", "Size", "StemV", "StmF", "StrF", "Subtype", "Supplement",
    "TR", "Title", "ToUnicode", "Transparency", "TrimBox", "Type", "Type0",
    "Type1", "Type1C", "Type3", "TrueType", "U", "UE", "UserUnit", "Usage",
    "V", "VE", "View", "ViewState", "W", "W2", "WhitePoint", "Width",
    "Widths", "WinAnsiEncoding", "MacRomanEncoding", "MacExpertEncoding",
    "StandardEncoding", "XHeight", "XObject", "XRef", "XRefStm", "ObjStm",
    "AESV2", "AESV3", "V2", "Standard", "StdCF", "Crypt", "FontFamily",
    "Form", "PS", "Properties", "Luminosity", "Alpha", "I", "Coords",
    "Background", "AllOn", "AnyOn", "AllOff", "AnyOff", "All", "Event",
    "Category", "BaseState", "Config", "A85", "AHx", "CCF", "DCT", "Fl",
    "LZW", "RL", "BPC", "CS", "DP", "IM", "RGB", "CMYK", "Symbol",
    "ZapfDingbats", "NotDef", "FormType", "PaintType", "TilingType",
    "XStep", "YStep", "Stitching", "Exponential", "Sampled",
};

#[derive(Clone)]
enum Repr {
    Interned(&'static str),
    Owned(Box<str>),
}

/// An interned PDF name.
///
/// Compares, hashes, and borrows as its decoded `str` form, so it can key an
/// `IndexMap` looked up by `&str` without allocating.
#[derive(Clone)]
pub struct Name(Repr);

impl Name {
    /// Intern a name. Standard names resolve to a static handle.
    pub fn new(s: &str) -> Self {
        match STANDARD_NAMES.get_key(s) {
            Some(&interned) => Name(Repr::Interned(interned)),
            None => Name(Repr::Owned(s.into())),
        }
    }

    /// The decoded byte form of the name, without the leading slash.
    pub fn as_str(&self) -> &str {
        match &self.0 {
            Repr::Interned(s) => s,
            Repr::Owned(s) => s,
        }
    }

    /// Whether this name was resolved through the standard-name table.
    pub fn is_standard(&self) -> bool {
        matches!(self.0, Repr::Interned(_))
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Name::new(s)
    }
}

impl From<String> for Name {
    fn from(s: String) -> Self {
        match STANDARD_NAMES.get_key(s.as_str()) {
            Some(&interned) => Name(Repr::Interned(interned)),
            None => Name(Repr::Owned(s.into_boxed_str())),
        }
    }
}

impl Deref for Name {
    type Target = str;
    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl Borrow<str> for Name {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Name {}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for Name {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Must agree with str's Hash so Borrow<str> lookups work.
        self.as_str().hash(state)
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.as_str())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_name_is_interned() {
        let n = Name::new("Type");
        assert!(n.is_standard());
        assert_eq!(n.as_str(), "Type");
    }

    #[test]
    fn test_custom_name_is_owned() {
        let n = Name::new("MyCustomResource7");
        assert!(!n.is_standard());
        assert_eq!(n.as_str(), "MyCustomResource7");
    }

    #[test]
    fn test_equality_across_reprs() {
        assert_eq!(Name::new("Length"), Name::from("Length".to_string()));
        assert_eq!(Name::new("Foo"), Name::new("Foo"));
        assert_ne!(Name::new("Foo"), Name::new("Bar"));
    }

    #[test]
    fn test_hash_agrees_with_str() {
        use std::collections::HashMap;
        let mut map: HashMap<Name, i32> = HashMap::new();
        map.insert(Name::new("Width"), 1);
        map.insert(Name::new("SomethingElse"), 2);
        // Borrow<str> lookup must find both representations
        assert_eq!(map.get("Width"), Some(&1));
        assert_eq!(map.get("SomethingElse"), Some(&2));
    }

    #[test]
    fn test_str_comparison() {
        let n = Name::new("Filter");
        assert!(n == "Filter");
        assert!(n != "Filters");
    }
}
