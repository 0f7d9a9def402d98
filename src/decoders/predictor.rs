//! Predictor post-processing for FlateDecode and LZWDecode.
//!
//! Predictor 2 is the TIFF horizontal differencing predictor; 10..=15 are
//! the PNG row predictors, where each row carries a one-byte tag selecting
//! None/Sub/Up/Average/Paeth independently of the declared predictor value.

use crate::error::{Error, Result};

/// Parameters governing predictor reversal.
#[derive(Debug, Clone)]
pub struct PredictorParams {
    /// 1 = none, 2 = TIFF, 10..=15 = PNG
    pub predictor: i64,
    /// Samples per row
    pub columns: usize,
    /// Color components per sample
    pub colors: usize,
    /// Bits per component
    pub bits_per_component: usize,
}

impl PredictorParams {
    /// Bytes of pixel data per row (excluding any PNG tag byte).
    pub fn row_bytes(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component).div_ceil(8)
    }

    /// Bytes a sample advances by for left-neighbor computations (≥ 1).
    pub fn sample_bytes(&self) -> usize {
        ((self.colors * self.bits_per_component) / 8).max(1)
    }
}

/// Reverse the predictor transform over decoded data.
pub fn apply_predictor(data: &[u8], params: &PredictorParams) -> Result<Vec<u8>> {
    match params.predictor {
        1 => Ok(data.to_vec()),
        2 => apply_tiff(data, params),
        10..=15 => apply_png(data, params),
        other => Err(Error::Unsupported(format!("predictor {other}"))),
    }
}

fn apply_tiff(data: &[u8], params: &PredictorParams) -> Result<Vec<u8>> {
    if params.bits_per_component != 8 {
        // Sub-byte TIFF prediction is vanishingly rare; fall through unchanged
        log::warn!(
            "TIFF predictor with {} bits per component not supported, data passed through",
            params.bits_per_component
        );
        return Ok(data.to_vec());
    }
    let row_bytes = params.row_bytes();
    let colors = params.colors;
    let mut out = data.to_vec();
    for row in out.chunks_mut(row_bytes) {
        for i in colors..row.len() {
            row[i] = row[i].wrapping_add(row[i - colors]);
        }
    }
    Ok(out)
}

fn apply_png(data: &[u8], params: &PredictorParams) -> Result<Vec<u8>> {
    let row_bytes = params.row_bytes();
    let stride = row_bytes + 1; // tag byte per row
    let sample = params.sample_bytes();

    if row_bytes == 0 {
        return Ok(Vec::new());
    }
    if data.len() % stride != 0 {
        log::warn!(
            "PNG predictor: {} bytes is not a whole number of {}-byte rows",
            data.len(),
            stride
        );
    }

    let rows = data.len() / stride;
    let mut out = vec![0u8; rows * row_bytes];
    let mut prev_row = vec![0u8; row_bytes];

    for r in 0..rows {
        let tag = data[r * stride];
        let src = &data[r * stride + 1..r * stride + 1 + row_bytes];
        let dst = &mut out[r * row_bytes..(r + 1) * row_bytes];
        dst.copy_from_slice(src);

        match tag {
            0 => {},
            1 => {
                for i in sample..row_bytes {
                    dst[i] = dst[i].wrapping_add(dst[i - sample]);
                }
            },
            2 => {
                for i in 0..row_bytes {
                    dst[i] = dst[i].wrapping_add(prev_row[i]);
                }
            },
            3 => {
                for i in 0..row_bytes {
                    let left = if i >= sample { dst[i - sample] as u16 } else { 0 };
                    let up = prev_row[i] as u16;
                    dst[i] = dst[i].wrapping_add(((left + up) / 2) as u8);
                }
            },
            4 => {
                for i in 0..row_bytes {
                    let a = if i >= sample { dst[i - sample] as i16 } else { 0 };
                    let b = prev_row[i] as i16;
                    let c = if i >= sample { prev_row[i - sample] as i16 } else { 0 };
                    dst[i] = dst[i].wrapping_add(paeth(a, b, c));
                }
            },
            other => {
                return Err(Error::syntax(format!("invalid PNG predictor tag {other}")));
            },
        }
        prev_row.copy_from_slice(dst);
    }
    Ok(out)
}

fn paeth(a: i16, b: i16, c: i16) -> u8 {
    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();
    if pa <= pb && pa <= pc {
        a as u8
    } else if pb <= pc {
        b as u8
    } else {
        c as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(predictor: i64, columns: usize, colors: usize) -> PredictorParams {
        PredictorParams {
            predictor,
            columns,
            colors,
            bits_per_component: 8,
        }
    }

    #[test]
    fn test_png_up_predictor() {
        // Two rows of 3 bytes; second row is all Up-predicted deltas
        let data = [0u8, 10, 20, 30, 2, 1, 1, 1];
        let out = apply_predictor(&data, &params(12, 3, 1)).unwrap();
        assert_eq!(out, vec![10, 20, 30, 11, 21, 31]);
    }

    #[test]
    fn test_png_sub_predictor() {
        let data = [1u8, 5, 3, 3];
        let out = apply_predictor(&data, &params(11, 3, 1)).unwrap();
        assert_eq!(out, vec![5, 8, 11]);
    }

    #[test]
    fn test_png_tag_governs_not_declared_value() {
        // Declared predictor 12 (Up) but row tag says Sub
        let data = [1u8, 5, 3, 3];
        let out = apply_predictor(&data, &params(12, 3, 1)).unwrap();
        assert_eq!(out, vec![5, 8, 11]);
    }

    #[test]
    fn test_tiff_predictor() {
        let data = [10u8, 1, 1, 20, 2, 2];
        let out = apply_predictor(&data, &params(2, 3, 1)).unwrap();
        assert_eq!(out, vec![10, 11, 12, 20, 22, 24]);
    }

    #[test]
    fn test_no_predictor_is_identity() {
        let data = [1u8, 2, 3];
        assert_eq!(apply_predictor(&data, &params(1, 3, 1)).unwrap(), data);
    }
}
