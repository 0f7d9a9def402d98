//! Stream decoder implementations for PDF filters.
//!
//! A filter is a transform over bytes; a stream's /Filter entry names a
//! chain of them, applied left to right, with optional per-filter
//! parameters from /DecodeParms. Supported here:
//!
//! - FlateDecode (zlib/deflate, with optional PNG/TIFF predictor)
//! - LZWDecode (with EarlyChange and predictor)
//! - ASCIIHexDecode, ASCII85Decode, RunLengthDecode
//! - CCITTFaxDecode (Group 3 1-D, mixed, and Group 4)
//! - DCTDecode and JPXDecode are *terminal image filters*: the chain stops
//!   at them and returns the compressed payload for the image layer, which
//!   owns JPEG/JPEG2000 decoding
//! - JBIG2Decode is recognized but unsupported
//! - Crypt with /Identity passes through (real crypt filters are applied
//!   by the encryption layer before the chain runs)
//!
//! Inline-image abbreviations (AHx, A85, Fl, LZW, RL, CCF, DCT) map to the
//! same decoders.

use crate::error::{Error, Result};
use crate::names::Name;
use crate::object::{Dict, DictExt};

mod ascii85;
mod ascii_hex;
mod ccitt;
mod flate;
mod lzw;
mod predictor;
mod runlength;

pub use ascii85::ascii85_decode;
pub use ascii_hex::ascii_hex_decode;
pub use ccitt::{CcittParams, ccitt_decode};
pub use flate::flate_decode;
pub use lzw::lzw_decode;
pub use predictor::{PredictorParams, apply_predictor};
pub use runlength::run_length_decode;

/// Hard ceiling on decoded output, a guard against decompression bombs.
const MAX_DECODED_SIZE: usize = 256 * 1024 * 1024;

/// One step of a filter chain: the filter name plus its decode parameters.
pub type FilterStep = (Name, Dict);

/// Whether a filter's output is an image codec payload the image layer
/// decodes itself (the filter chain stops there).
pub fn is_image_filter(name: &str) -> bool {
    matches!(name, "DCTDecode" | "DCT" | "JPXDecode" | "JBIG2Decode")
}

/// Build a filter chain from resolved /Filter and /DecodeParms values.
///
/// `filter` is a name or array of names; `parms` a dictionary, an array of
/// dictionaries (aligned with the filter array, nulls allowed), or absent.
pub fn filter_chain(
    filter: Option<&crate::object::Object>,
    parms: Option<&crate::object::Object>,
) -> Vec<FilterStep> {
    use crate::object::Object;

    let names: Vec<Name> = match filter {
        Some(Object::Name(n)) => vec![n.clone()],
        Some(Object::Array(arr)) => arr
            .iter()
            .filter_map(|o| o.as_name().map(Name::new))
            .collect(),
        _ => Vec::new(),
    };

    let parm_at = |i: usize| -> Dict {
        match parms {
            Some(Object::Dict(d)) if i == 0 => d.clone(),
            Some(Object::Array(arr)) => arr
                .get(i)
                .and_then(|o| o.as_dict())
                .cloned()
                .unwrap_or_default(),
            _ => Dict::new(),
        }
    };

    names
        .into_iter()
        .enumerate()
        .map(|(i, n)| (n, parm_at(i)))
        .collect()
}

/// Decode stream data through a filter chain.
///
/// Stops (returning the remaining compressed bytes) when an image codec
/// filter is reached; the caller knows from the chain whether that
/// happened. Errors from any stage propagate with the filter name attached.
pub fn decode_chain(data: &[u8], chain: &[FilterStep]) -> Result<Vec<u8>> {
    let mut current = data.to_vec();
    for (name, parms) in chain {
        if is_image_filter(name) {
            // Image codec payload: the image layer decodes this
            return Ok(current);
        }
        current = decode_filter(&current, name, parms)
            .map_err(|e| e.context(format!("in filter {name}")))?;
        if current.len() > MAX_DECODED_SIZE {
            return Err(Error::range(format!(
                "decoded stream exceeds {MAX_DECODED_SIZE} bytes"
            )));
        }
    }
    Ok(current)
}

/// Decode a single filter stage.
pub fn decode_filter(data: &[u8], name: &str, parms: &Dict) -> Result<Vec<u8>> {
    match name {
        "FlateDecode" | "Fl" => {
            let out = flate_decode(data)?;
            maybe_predict(out, parms)
        },
        "LZWDecode" | "LZW" => {
            let early = parms.get_int("EarlyChange").unwrap_or(1) != 0;
            let out = lzw_decode(data, early)?;
            maybe_predict(out, parms)
        },
        "ASCIIHexDecode" | "AHx" => ascii_hex_decode(data),
        "ASCII85Decode" | "A85" => ascii85_decode(data),
        "RunLengthDecode" | "RL" => run_length_decode(data),
        "CCITTFaxDecode" | "CCF" => ccitt_decode(data, &CcittParams::from_dict(parms)),
        "Crypt" => {
            // Only the identity crypt filter reaches the chain; keyed crypt
            // filters are applied by the encryption layer beforehand.
            match parms.get_name("Name") {
                None | Some("Identity") => Ok(data.to_vec()),
                Some(other) => Err(Error::Unsupported(format!("crypt filter {other}"))),
            }
        },
        "JBIG2Decode" => Err(Error::Unsupported("JBIG2Decode".into())),
        other => Err(Error::Unsupported(format!("filter {other}"))),
    }
}

fn maybe_predict(data: Vec<u8>, parms: &Dict) -> Result<Vec<u8>> {
    let predictor = parms.get_int("Predictor").unwrap_or(1);
    if predictor <= 1 {
        return Ok(data);
    }
    let params = PredictorParams {
        predictor,
        columns: parms.get_int("Columns").unwrap_or(1).max(1) as usize,
        colors: parms.get_int("Colors").unwrap_or(1).max(1) as usize,
        bits_per_component: parms.get_int("BitsPerComponent").unwrap_or(8).max(1) as usize,
    };
    apply_predictor(&data, &params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Object;

    #[test]
    fn test_filter_chain_single_name() {
        let f = Object::Name("FlateDecode".into());
        let chain = filter_chain(Some(&f), None);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].0.as_str(), "FlateDecode");
    }

    #[test]
    fn test_filter_chain_array_with_parms() {
        let f = Object::Array(vec![
            Object::Name("ASCII85Decode".into()),
            Object::Name("FlateDecode".into()),
        ]);
        let mut d = Dict::new();
        d.insert("Predictor".into(), Object::Int(12));
        let p = Object::Array(vec![Object::Null, Object::Dict(d)]);
        let chain = filter_chain(Some(&f), Some(&p));
        assert_eq!(chain.len(), 2);
        assert!(chain[0].1.is_empty());
        assert_eq!(chain[1].1.get_int("Predictor"), Some(12));
    }

    #[test]
    fn test_decode_chain_hex_then_rle() {
        // RunLength: (0x02,"abc") then EOD 0x80, hex-encoded
        let rle = [0x02u8, b'a', b'b', b'c', 0x80];
        let hex: String = rle.iter().map(|b| format!("{b:02X}")).collect();
        let chain = vec![
            (Name::new("ASCIIHexDecode"), Dict::new()),
            (Name::new("RunLengthDecode"), Dict::new()),
        ];
        let out = decode_chain(format!("{hex}>").as_bytes(), &chain).unwrap();
        assert_eq!(out, b"abc");
    }

    #[test]
    fn test_decode_chain_stops_at_image_filter() {
        let chain = vec![(Name::new("DCTDecode"), Dict::new())];
        let jpeg = b"\xFF\xD8\xFF\xE0fake";
        let out = decode_chain(jpeg, &chain).unwrap();
        assert_eq!(out, jpeg);
    }

    #[test]
    fn test_unknown_filter_is_unsupported() {
        let err = decode_filter(b"x", "NoSuchDecode", &Dict::new()).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }
}
