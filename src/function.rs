//! PDF function objects.
//!
//! Functions map m input floats to n output floats and back tint
//! transforms, shading color ramps, and transfer curves. Types 0
//! (sampled), 2 (exponential interpolation), and 3 (stitching) are
//! implemented; type 4 (PostScript calculator) is reported unsupported and
//! callers degrade per the soft-failure policy.

use crate::document::Document;
use crate::error::{Error, Result};
use crate::object::{Dict, DictExt, Object};

/// A parsed, evaluatable PDF function.
#[derive(Debug, Clone)]
pub struct Function {
    domain: Vec<[f32; 2]>,
    range: Option<Vec<[f32; 2]>>,
    kind: FunctionKind,
}

#[derive(Debug, Clone)]
enum FunctionKind {
    /// Type 0: sampled values with linear interpolation
    Sampled {
        size: Vec<usize>,
        bps: u32,
        encode: Vec<[f32; 2]>,
        decode: Vec<[f32; 2]>,
        samples: Vec<u8>,
        n_out: usize,
    },
    /// Type 2: C0 + x^N * (C1 - C0)
    Exponential {
        c0: Vec<f32>,
        c1: Vec<f32>,
        n: f32,
    },
    /// Type 3: piecewise over subfunctions
    Stitching {
        functions: Vec<Function>,
        bounds: Vec<f32>,
        encode: Vec<[f32; 2]>,
    },
}

fn pairs(values: &[Object]) -> Vec<[f32; 2]> {
    values
        .chunks(2)
        .filter_map(|c| match c {
            [a, b] => Some([a.as_number()? as f32, b.as_number()? as f32]),
            _ => None,
        })
        .collect()
}

fn floats(values: &[Object]) -> Vec<f32> {
    values
        .iter()
        .filter_map(|o| o.as_number().map(|v| v as f32))
        .collect()
}

fn lerp(x: f32, x0: f32, x1: f32, y0: f32, y1: f32) -> f32 {
    if (x1 - x0).abs() < 1e-12 {
        y0
    } else {
        y0 + (x - x0) * (y1 - y0) / (x1 - x0)
    }
}

impl Function {
    /// Parse a function from a dictionary or stream object.
    pub fn load(doc: &mut Document, obj: &Object) -> Result<Function> {
        let re = obj.as_ref();
        let obj = doc.resolve(obj)?;
        let dict = obj
            .as_dict()
            .ok_or_else(|| Error::syntax("function is not a dictionary or stream"))?
            .clone();

        let domain = pairs(
            dict.get_array("Domain")
                .ok_or_else(|| Error::syntax("function missing /Domain"))?,
        );
        let range = dict.get_array("Range").map(pairs);

        let kind = match dict.get_int("FunctionType") {
            Some(0) => Self::load_sampled(doc, &obj, re, &dict, range.as_deref())?,
            Some(2) => Self::load_exponential(&dict),
            Some(3) => Self::load_stitching(doc, &dict)?,
            Some(4) => {
                return Err(Error::Unsupported("PostScript calculator function".into()));
            },
            other => {
                return Err(Error::syntax(format!("bad /FunctionType {other:?}")));
            },
        };

        Ok(Function {
            domain,
            range,
            kind,
        })
    }

    fn load_sampled(
        doc: &mut Document,
        obj: &Object,
        re: Option<crate::object::ObjRef>,
        dict: &Dict,
        range: Option<&[[f32; 2]]>,
    ) -> Result<FunctionKind> {
        let stream = obj
            .as_stream()
            .ok_or_else(|| Error::syntax("sampled function must be a stream"))?;
        let samples = doc.decode_stream(stream, re)?;

        let size: Vec<usize> = dict
            .get_array("Size")
            .ok_or_else(|| Error::syntax("sampled function missing /Size"))?
            .iter()
            .filter_map(|o| o.as_int().map(|v| v.max(1) as usize))
            .collect();
        let bps = dict
            .get_int("BitsPerSample")
            .filter(|b| matches!(b, 1 | 2 | 4 | 8 | 12 | 16 | 24 | 32))
            .ok_or_else(|| Error::syntax("bad /BitsPerSample"))? as u32;

        let range = range.ok_or_else(|| Error::syntax("sampled function missing /Range"))?;
        let n_out = range.len();

        let encode = match dict.get_array("Encode") {
            Some(arr) => pairs(arr),
            None => size.iter().map(|&s| [0.0, (s - 1) as f32]).collect(),
        };
        let decode = match dict.get_array("Decode") {
            Some(arr) => pairs(arr),
            None => range.to_vec(),
        };

        Ok(FunctionKind::Sampled {
            size,
            bps,
            encode,
            decode,
            samples,
            n_out,
        })
    }

    fn load_exponential(dict: &Dict) -> FunctionKind {
        let c0 = dict.get_array("C0").map_or_else(|| vec![0.0], floats);
        let c1 = dict.get_array("C1").map_or_else(|| vec![1.0], floats);
        let n = dict.get_number("N").unwrap_or(1.0) as f32;
        FunctionKind::Exponential { c0, c1, n }
    }

    fn load_stitching(doc: &mut Document, dict: &Dict) -> Result<FunctionKind> {
        let fn_objs = dict
            .get_array("Functions")
            .ok_or_else(|| Error::syntax("stitching function missing /Functions"))?
            .to_vec();
        let mut functions = Vec::with_capacity(fn_objs.len());
        for obj in &fn_objs {
            functions.push(Function::load(doc, obj)?);
        }
        let bounds = dict.get_array("Bounds").map_or_else(Vec::new, floats);
        let encode = dict
            .get_array("Encode")
            .map(pairs)
            .unwrap_or_else(|| functions.iter().map(|_| [0.0, 1.0]).collect());
        Ok(FunctionKind::Stitching {
            functions,
            bounds,
            encode,
        })
    }

    /// Number of output components (when declared or derivable).
    pub fn out_len(&self) -> usize {
        match &self.kind {
            FunctionKind::Sampled { n_out, .. } => *n_out,
            FunctionKind::Exponential { c0, .. } => c0.len(),
            FunctionKind::Stitching { functions, .. } => {
                functions.first().map_or(0, Function::out_len)
            },
        }
    }

    /// Evaluate the function at `input`, writing up to `out.len()` values.
    pub fn eval(&self, input: &[f32], out: &mut [f32]) {
        // Clip inputs to the domain
        let mut x = [0.0f32; 8];
        let m = input.len().min(self.domain.len()).min(8);
        for i in 0..m {
            x[i] = input[i].clamp(
                self.domain[i][0].min(self.domain[i][1]),
                self.domain[i][0].max(self.domain[i][1]),
            );
        }

        match &self.kind {
            FunctionKind::Exponential { c0, c1, n } => {
                let t = x[0].powf(*n);
                for (i, slot) in out.iter_mut().enumerate() {
                    let a = c0.get(i).copied().unwrap_or(0.0);
                    let b = c1.get(i).copied().unwrap_or(1.0);
                    *slot = a + t * (b - a);
                }
            },
            FunctionKind::Stitching {
                functions,
                bounds,
                encode,
            } => {
                if functions.is_empty() {
                    return;
                }
                let t = x[0];
                let k = bounds.partition_point(|&b| b <= t).min(functions.len() - 1);
                let lo = if k == 0 { self.domain[0][0] } else { bounds[k - 1] };
                let hi = if k == bounds.len() {
                    self.domain[0][1]
                } else {
                    bounds[k]
                };
                let enc = encode.get(k).copied().unwrap_or([0.0, 1.0]);
                let mapped = lerp(t, lo, hi, enc[0], enc[1]);
                functions[k].eval(&[mapped], out);
            },
            FunctionKind::Sampled {
                size,
                bps,
                encode,
                decode,
                samples,
                n_out,
            } => {
                // Multilinear interpolation is overkill for the tint and
                // shading ramps this serves; nearest-on-axis with linear
                // interpolation over the first input covers them.
                if size.is_empty() {
                    return;
                }
                let n_out = *n_out;
                let enc = encode.first().copied().unwrap_or([0.0, (size[0] - 1) as f32]);
                let e = lerp(x[0], self.domain[0][0], self.domain[0][1], enc[0], enc[1])
                    .clamp(0.0, (size[0] - 1) as f32);
                let i0 = e.floor() as usize;
                let i1 = (i0 + 1).min(size[0] - 1);
                let frac = e - i0 as f32;

                // Index stride for higher input dimensions pins them at
                // their encoded origin (clipped inputs beyond dim 0).
                for j in 0..out.len().min(n_out) {
                    let s0 = read_sample(samples, *bps, i0 * n_out + j);
                    let s1 = read_sample(samples, *bps, i1 * n_out + j);
                    let max = ((1u64 << *bps) - 1) as f32;
                    let raw = (s0 as f32 + frac * (s1 as f32 - s0 as f32)) / max;
                    let dec = decode.get(j).copied().unwrap_or([0.0, 1.0]);
                    out[j] = dec[0] + raw * (dec[1] - dec[0]);
                }
            },
        }

        // Clip outputs to the range
        if let Some(range) = &self.range {
            for (i, slot) in out.iter_mut().enumerate() {
                if let Some(r) = range.get(i) {
                    *slot = slot.clamp(r[0].min(r[1]), r[0].max(r[1]));
                }
            }
        }
    }
}

/// Read the `index`-th `bps`-bit sample from a packed big-endian buffer.
fn read_sample(data: &[u8], bps: u32, index: usize) -> u64 {
    let bit = index as u64 * bps as u64;
    let mut value = 0u64;
    for i in 0..bps as u64 {
        let b = bit + i;
        let byte = (b / 8) as usize;
        if byte >= data.len() {
            return value << (bps as u64 - i);
        }
        let bit_in_byte = 7 - (b % 8);
        value = (value << 1) | ((data[byte] >> bit_in_byte) & 1) as u64;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::Name;

    fn exponential(c0: Vec<f32>, c1: Vec<f32>, n: f32) -> Function {
        Function {
            domain: vec![[0.0, 1.0]],
            range: None,
            kind: FunctionKind::Exponential { c0, c1, n },
        }
    }

    #[test]
    fn test_exponential_endpoints() {
        let f = exponential(vec![0.0, 1.0], vec![1.0, 0.0], 1.0);
        let mut out = [0.0f32; 2];
        f.eval(&[0.0], &mut out);
        assert_eq!(out, [0.0, 1.0]);
        f.eval(&[1.0], &mut out);
        assert_eq!(out, [1.0, 0.0]);
        f.eval(&[0.5], &mut out);
        assert!((out[0] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_domain_clipping() {
        let f = exponential(vec![0.0], vec![1.0], 1.0);
        let mut out = [0.0f32; 1];
        f.eval(&[7.0], &mut out);
        assert_eq!(out[0], 1.0);
        f.eval(&[-3.0], &mut out);
        assert_eq!(out[0], 0.0);
    }

    #[test]
    fn test_stitching_selects_subfunction() {
        let f = Function {
            domain: vec![[0.0, 1.0]],
            range: None,
            kind: FunctionKind::Stitching {
                functions: vec![
                    exponential(vec![0.0], vec![0.0], 1.0), // constant 0
                    exponential(vec![1.0], vec![1.0], 1.0), // constant 1
                ],
                bounds: vec![0.5],
                encode: vec![[0.0, 1.0], [0.0, 1.0]],
            },
        };
        let mut out = [9.0f32; 1];
        f.eval(&[0.2], &mut out);
        assert_eq!(out[0], 0.0);
        f.eval(&[0.8], &mut out);
        assert_eq!(out[0], 1.0);
    }

    #[test]
    fn test_read_sample_8bit() {
        let data = [10u8, 20, 30];
        assert_eq!(read_sample(&data, 8, 0), 10);
        assert_eq!(read_sample(&data, 8, 2), 30);
    }

    #[test]
    fn test_read_sample_4bit() {
        let data = [0xAB, 0xCD];
        assert_eq!(read_sample(&data, 4, 0), 0xA);
        assert_eq!(read_sample(&data, 4, 3), 0xD);
    }

    #[test]
    fn test_type4_unsupported() {
        let pdf = crate::document::test_pdf("0 0 10 10", "");
        let mut doc = Document::from_bytes(bytes::Bytes::from(pdf)).unwrap();
        let mut dict = Dict::new();
        dict.insert(Name::new("FunctionType"), Object::Int(4));
        dict.insert(
            Name::new("Domain"),
            Object::Array(vec![Object::Int(0), Object::Int(1)]),
        );
        let err = Function::load(&mut doc, &Object::Dict(dict)).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }
}
