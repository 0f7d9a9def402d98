//! CCITTFaxDecode implementation.
//!
//! Group 3 and Group 4 fax compression for bilevel images. K < 0 selects
//! pure Group 4 (T.6), K = 0 Group 3 one-dimensional, K > 0 the mixed
//! scheme (decoded with the G3 decoder, which handles the per-row mode
//! bits). The fax crate is lenient with the malformed EOFB markers common
//! in scanned PDFs.
//!
//! Output is packed 1 bit per pixel, MSB first. With the default
//! BlackIs1=false, 0 bits are black.

use crate::error::{Error, Result};
use crate::object::{Dict, DictExt};

/// CCITTFaxDecode parameters from /DecodeParms.
#[derive(Debug, Clone)]
pub struct CcittParams {
    /// Coding scheme selector
    pub k: i64,
    /// Samples per row
    pub columns: usize,
    /// Row count, 0 when unspecified
    pub rows: usize,
    /// 1 bits are black when set
    pub black_is_1: bool,
    /// Rows are padded to byte boundaries
    pub encoded_byte_align: bool,
    /// EOL codes are present
    pub end_of_line: bool,
    /// Damaged rows tolerated before a hard error
    pub damaged_rows_before_error: usize,
}

impl CcittParams {
    /// Extract parameters from a /DecodeParms dictionary.
    pub fn from_dict(parms: &Dict) -> Self {
        Self {
            k: parms.get_int("K").unwrap_or(0),
            columns: parms.get_int("Columns").unwrap_or(1728).max(1) as usize,
            rows: parms.get_int("Rows").unwrap_or(0).max(0) as usize,
            black_is_1: parms.get_bool("BlackIs1").unwrap_or(false),
            encoded_byte_align: parms.get_bool("EncodedByteAlign").unwrap_or(false),
            end_of_line: parms.get_bool("EndOfLine").unwrap_or(false),
            damaged_rows_before_error: parms
                .get_int("DamagedRowsBeforeError")
                .unwrap_or(0)
                .max(0) as usize,
        }
    }

    /// Group 4 (T.6) coding.
    pub fn is_group_4(&self) -> bool {
        self.k < 0
    }
}

/// Decode CCITT fax data to packed rows.
pub fn ccitt_decode(data: &[u8], params: &CcittParams) -> Result<Vec<u8>> {
    use fax::decoder;

    if params.encoded_byte_align {
        log::warn!("CCITTFaxDecode: EncodedByteAlign not handled by decoder, output may shear");
    }

    let width = params.columns;
    if width > u16::MAX as usize {
        return Err(Error::range(format!("CCITT Columns {width} too large")));
    }
    let height = if params.rows > 0 && params.rows <= u16::MAX as usize {
        Some(params.rows as u16)
    } else {
        None
    };

    let mut output_rows: Vec<Vec<u8>> = Vec::new();
    let bytes_iter = data.iter().copied();

    let outcome = if params.is_group_4() {
        decoder::decode_g4(bytes_iter, width as u16, height, |transitions: &[u16]| {
            output_rows.push(transitions_to_bytes(transitions, width));
        })
    } else {
        decoder::decode_g3(bytes_iter, |transitions: &[u16]| {
            output_rows.push(transitions_to_bytes(transitions, width));
        })
    };

    if outcome.is_none() && output_rows.len() <= params.damaged_rows_before_error {
        return Err(Error::syntax(format!(
            "CCITT decode failed after {} rows",
            output_rows.len()
        )));
    }
    if outcome.is_none() {
        log::warn!(
            "CCITTFaxDecode: decoder stopped early, keeping {} decoded rows",
            output_rows.len()
        );
    }
    if params.rows > 0 && output_rows.len() > params.rows {
        output_rows.truncate(params.rows);
    }

    let mut out: Vec<u8> = output_rows.into_iter().flatten().collect();
    if !params.black_is_1 {
        // Decoder emits 1 = black; the default polarity is 0 = black
        for byte in &mut out {
            *byte = !*byte;
        }
    }
    Ok(out)
}

/// Convert run-length transition positions to packed pixels (1 = black).
///
/// Transitions mark color changes starting from white: `[3, 5, 8]` is three
/// white pixels, two black, then white to position 8.
fn transitions_to_bytes(transitions: &[u16], width: usize) -> Vec<u8> {
    let mut row = vec![0u8; width.div_ceil(8)];
    let mut is_black = false;
    let mut start = 0usize;

    let mut paint = |from: usize, to: usize, row: &mut [u8]| {
        for px in from..to.min(width) {
            row[px / 8] |= 1 << (7 - px % 8);
        }
    };

    for &t in transitions {
        let t = t as usize;
        if is_black {
            paint(start, t, &mut row);
        }
        is_black = !is_black;
        start = t;
    }
    if is_black && start < width {
        paint(start, width, &mut row);
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_defaults() {
        let p = CcittParams::from_dict(&Dict::new());
        assert_eq!(p.k, 0);
        assert_eq!(p.columns, 1728);
        assert!(!p.black_is_1);
        assert!(!p.is_group_4());
    }

    #[test]
    fn test_transitions_to_bytes() {
        // 8 wide: white 0-2, black 3-4, white 5-7
        let row = transitions_to_bytes(&[3, 5], 8);
        assert_eq!(row, vec![0b0001_1000]);
    }

    #[test]
    fn test_transitions_black_to_edge() {
        let row = transitions_to_bytes(&[4], 8);
        assert_eq!(row, vec![0b0000_1111]);
    }

    #[test]
    fn test_all_white_row() {
        assert_eq!(transitions_to_bytes(&[], 16), vec![0, 0]);
    }
}
