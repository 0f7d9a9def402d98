//! Colorspace definitions and conversion.
//!
//! Every colorspace knows its component count and how to turn an n-tuple
//! of floats into device RGB, which is what the draw device composites in.
//! Indexed spaces bypass conversion at image-decode time: samples map
//! through the palette first, then through the base space.
//!
//! ICCBased profiles are not interpreted; they fall back to the /N
//! alternate per the soft-failure policy, which is what most readers do
//! absent a CMS.

use crate::document::Document;
use crate::error::{Error, Result, ResultExt};
use crate::function::Function;
use crate::object::{DictExt, Object};

/// A recognized colorspace.
#[derive(Debug, Clone)]
pub enum Colorspace {
    /// Device gray, 1 component
    DeviceGray,
    /// Device RGB, 3 components
    DeviceRGB,
    /// Device CMYK, 4 components
    DeviceCMYK,
    /// Calibrated gray (decoded via gamma, then as device gray)
    CalGray {
        /// Gamma exponent
        gamma: f32,
    },
    /// Calibrated RGB (treated as device RGB with per-channel gamma)
    CalRGB {
        /// Per-channel gamma exponents
        gamma: [f32; 3],
    },
    /// CIE L*a*b*
    Lab {
        /// Reference white point
        white: [f32; 3],
        /// a/b component ranges
        range: [f32; 4],
    },
    /// ICC profile stream; conversion uses the alternate
    ICCBased {
        /// Declared component count
        n: usize,
        /// The /Alternate space (or the device space matching /N)
        alternate: Box<Colorspace>,
    },
    /// Palette lookup over a base space
    Indexed {
        /// Base colorspace the palette entries live in
        base: Box<Colorspace>,
        /// Highest valid index
        hival: u32,
        /// Packed palette: (hival+1) * base.n() bytes
        lookup: Vec<u8>,
    },
    /// Single named colorant with a tint transform
    Separation {
        /// Alternate space the tint transform targets
        alternate: Box<Colorspace>,
        /// Tint transform (None degrades to gray ramp)
        tint: Option<Function>,
    },
    /// Multiple named colorants with a tint transform
    DeviceN {
        /// Number of colorants
        n: usize,
        /// Alternate space the tint transform targets
        alternate: Box<Colorspace>,
        /// Tint transform (None degrades to gray ramp)
        tint: Option<Function>,
    },
    /// Pattern space, optionally with an underlying space for uncolored
    /// patterns
    Pattern {
        /// Base space for pattern cells of uncolored patterns
        base: Option<Box<Colorspace>>,
    },
}

impl Colorspace {
    /// Parse a colorspace from its PDF representation (name or array).
    pub fn load(doc: &mut Document, obj: &Object) -> Result<Colorspace> {
        Self::load_depth(doc, obj, 0)
    }

    fn load_depth(doc: &mut Document, obj: &Object, depth: usize) -> Result<Colorspace> {
        if depth > 8 {
            return Err(Error::range("colorspace nesting deeper than 8"));
        }
        let obj = doc.resolve(obj)?;

        if let Some(name) = obj.as_name() {
            return Self::from_name(name);
        }

        let Some(arr) = obj.as_array() else {
            return Err(Error::syntax(format!(
                "colorspace must be a name or array, found {}",
                obj.type_name()
            )));
        };
        let family = arr
            .first()
            .and_then(Object::as_name)
            .ok_or_else(|| Error::syntax("colorspace array without family name"))?;

        match family {
            "DeviceGray" | "G" => Ok(Colorspace::DeviceGray),
            "DeviceRGB" | "RGB" => Ok(Colorspace::DeviceRGB),
            "DeviceCMYK" | "CMYK" => Ok(Colorspace::DeviceCMYK),
            "CalGray" => {
                let dict = doc.resolve(arr.get(1).unwrap_or(&Object::Null))?;
                let gamma = dict
                    .as_dict()
                    .and_then(|d| d.get_number("Gamma"))
                    .unwrap_or(1.0) as f32;
                Ok(Colorspace::CalGray { gamma })
            },
            "CalRGB" => {
                let dict = doc.resolve(arr.get(1).unwrap_or(&Object::Null))?;
                let gamma = dict
                    .as_dict()
                    .and_then(|d| d.get_array("Gamma"))
                    .map(|g| {
                        let mut out = [1.0f32; 3];
                        for (slot, v) in out.iter_mut().zip(g) {
                            *slot = v.as_number().unwrap_or(1.0) as f32;
                        }
                        out
                    })
                    .unwrap_or([1.0; 3]);
                Ok(Colorspace::CalRGB { gamma })
            },
            "Lab" => {
                let dict = doc.resolve(arr.get(1).unwrap_or(&Object::Null))?;
                let d = dict.as_dict();
                let white = d
                    .and_then(|d| d.get_array("WhitePoint"))
                    .map(|w| {
                        let mut out = [0.9505f32, 1.0, 1.089];
                        for (slot, v) in out.iter_mut().zip(w) {
                            *slot = v.as_number().unwrap_or(1.0) as f32;
                        }
                        out
                    })
                    .unwrap_or([0.9505, 1.0, 1.089]);
                let range = d
                    .and_then(|d| d.get_array("Range"))
                    .map(|r| {
                        let mut out = [-100.0f32, 100.0, -100.0, 100.0];
                        for (slot, v) in out.iter_mut().zip(r) {
                            *slot = v.as_number().unwrap_or(0.0) as f32;
                        }
                        out
                    })
                    .unwrap_or([-100.0, 100.0, -100.0, 100.0]);
                Ok(Colorspace::Lab { white, range })
            },
            "ICCBased" => {
                let stream_obj = doc.resolve(arr.get(1).unwrap_or(&Object::Null))?;
                let dict = stream_obj.as_dict().cloned().unwrap_or_default();
                let n = dict.get_int("N").unwrap_or(3).clamp(1, 4) as usize;
                let alternate = match dict.get("Alternate") {
                    Some(alt) => {
                        let alt = alt.clone();
                        Self::load_depth(doc, &alt, depth + 1).unwrap_or_else(|e| {
                            log::warn!("unusable ICC /Alternate ({e}), using device space");
                            device_space_for(n)
                        })
                    },
                    None => device_space_for(n),
                };
                Ok(Colorspace::ICCBased {
                    n,
                    alternate: Box::new(alternate),
                })
            },
            "Indexed" | "I" => {
                let base_obj = arr.get(1).cloned().unwrap_or(Object::Null);
                let base = Self::load_depth(doc, &base_obj, depth + 1)
                    .context("loading Indexed base")?;
                let hival = doc
                    .resolve(arr.get(2).unwrap_or(&Object::Null))?
                    .as_int()
                    .unwrap_or(0)
                    .clamp(0, 255) as u32;
                let lookup = match doc.resolve(arr.get(3).unwrap_or(&Object::Null))? {
                    Object::String(bytes) => bytes,
                    Object::Stream(s) => doc.decode_stream(&s, None)?,
                    other => {
                        return Err(Error::syntax(format!(
                            "Indexed lookup must be string or stream, found {}",
                            other.type_name()
                        )));
                    },
                };
                Ok(Colorspace::Indexed {
                    base: Box::new(base),
                    hival,
                    lookup,
                })
            },
            "Separation" => {
                let alternate = Self::load_depth(
                    doc,
                    &arr.get(2).cloned().unwrap_or(Object::Name("DeviceGray".into())),
                    depth + 1,
                )?;
                let tint = match arr.get(3) {
                    Some(f) => match Function::load(doc, f) {
                        Ok(f) => Some(f),
                        Err(e) => {
                            log::warn!("separation tint transform unusable: {e}");
                            None
                        },
                    },
                    None => None,
                };
                Ok(Colorspace::Separation {
                    alternate: Box::new(alternate),
                    tint,
                })
            },
            "DeviceN" => {
                let n = doc
                    .resolve(arr.get(1).unwrap_or(&Object::Null))?
                    .as_array()
                    .map_or(1, <[Object]>::len);
                let alternate = Self::load_depth(
                    doc,
                    &arr.get(2).cloned().unwrap_or(Object::Name("DeviceGray".into())),
                    depth + 1,
                )?;
                let tint = match arr.get(3) {
                    Some(f) => match Function::load(doc, f) {
                        Ok(f) => Some(f),
                        Err(e) => {
                            log::warn!("DeviceN tint transform unusable: {e}");
                            None
                        },
                    },
                    None => None,
                };
                Ok(Colorspace::DeviceN {
                    n,
                    alternate: Box::new(alternate),
                    tint,
                })
            },
            "Pattern" => {
                let base = match arr.get(1) {
                    Some(b) => Some(Box::new(Self::load_depth(doc, b, depth + 1)?)),
                    None => None,
                };
                Ok(Colorspace::Pattern { base })
            },
            other => Err(Error::Unsupported(format!("colorspace family {other}"))),
        }
    }

    /// Resolve a bare colorspace name.
    pub fn from_name(name: &str) -> Result<Colorspace> {
        match name {
            "DeviceGray" | "G" | "CalGray" => Ok(Colorspace::DeviceGray),
            "DeviceRGB" | "RGB" | "CalRGB" => Ok(Colorspace::DeviceRGB),
            "DeviceCMYK" | "CMYK" => Ok(Colorspace::DeviceCMYK),
            "Pattern" => Ok(Colorspace::Pattern { base: None }),
            other => Err(Error::Unsupported(format!("colorspace {other}"))),
        }
    }

    /// Number of components a color in this space carries.
    pub fn n(&self) -> usize {
        match self {
            Colorspace::DeviceGray | Colorspace::CalGray { .. } => 1,
            Colorspace::DeviceRGB | Colorspace::CalRGB { .. } | Colorspace::Lab { .. } => 3,
            Colorspace::DeviceCMYK => 4,
            Colorspace::ICCBased { n, .. } => *n,
            Colorspace::Indexed { .. } => 1,
            Colorspace::Separation { .. } => 1,
            Colorspace::DeviceN { n, .. } => *n,
            Colorspace::Pattern { .. } => 1,
        }
    }

    /// Whether this is an indexed (palette) space.
    pub fn is_indexed(&self) -> bool {
        matches!(self, Colorspace::Indexed { .. })
    }

    /// The initial color when this space is selected (black in most
    /// spaces; index 0 for Indexed; 1.0 tints for Separation/DeviceN).
    pub fn initial_color(&self) -> Vec<f32> {
        match self {
            Colorspace::Separation { .. } | Colorspace::DeviceN { .. } => vec![1.0; self.n()],
            Colorspace::DeviceCMYK => vec![0.0, 0.0, 0.0, 1.0],
            _ => vec![0.0; self.n()],
        }
    }

    /// Convert an n-tuple in this space to device RGB in 0..=1.
    pub fn to_rgb(&self, comps: &[f32]) -> [f32; 3] {
        let at = |i: usize| comps.get(i).copied().unwrap_or(0.0);
        match self {
            Colorspace::DeviceGray => [at(0); 3],
            Colorspace::CalGray { gamma } => [at(0).max(0.0).powf(*gamma); 3],
            Colorspace::DeviceRGB => [at(0), at(1), at(2)],
            Colorspace::CalRGB { gamma } => [
                at(0).max(0.0).powf(gamma[0]),
                at(1).max(0.0).powf(gamma[1]),
                at(2).max(0.0).powf(gamma[2]),
            ],
            Colorspace::DeviceCMYK => {
                let k = at(3);
                [
                    (1.0 - (at(0) + k).min(1.0)).max(0.0),
                    (1.0 - (at(1) + k).min(1.0)).max(0.0),
                    (1.0 - (at(2) + k).min(1.0)).max(0.0),
                ]
            },
            Colorspace::Lab { white, range } => lab_to_rgb(
                at(0).clamp(0.0, 100.0),
                at(1).clamp(range[0], range[1]),
                at(2).clamp(range[2], range[3]),
                white,
            ),
            Colorspace::ICCBased { alternate, .. } => alternate.to_rgb(comps),
            Colorspace::Indexed {
                base,
                hival,
                lookup,
            } => {
                let index = (at(0).round().max(0.0) as u32).min(*hival) as usize;
                let n = base.n();
                let mut decoded = vec![0.0f32; n];
                for (i, slot) in decoded.iter_mut().enumerate() {
                    *slot = lookup
                        .get(index * n + i)
                        .map_or(0.0, |&b| b as f32 / 255.0);
                }
                // Lab palette entries are stored scaled into bytes
                if let Colorspace::Lab { range, .. } = base.as_ref() {
                    decoded[0] *= 100.0;
                    if n >= 3 {
                        decoded[1] = range[0] + decoded[1] * (range[1] - range[0]);
                        decoded[2] = range[2] + decoded[2] * (range[3] - range[2]);
                    }
                }
                base.to_rgb(&decoded)
            },
            Colorspace::Separation { alternate, tint } => match tint {
                Some(f) => {
                    let mut alt = [0.0f32; 8];
                    let n = alternate.n().min(8);
                    f.eval(&[at(0)], &mut alt[..n]);
                    alternate.to_rgb(&alt[..n])
                },
                None => [1.0 - at(0); 3],
            },
            Colorspace::DeviceN {
                alternate, tint, ..
            } => match tint {
                Some(f) => {
                    let mut alt = [0.0f32; 8];
                    let n = alternate.n().min(8);
                    f.eval(comps, &mut alt[..n]);
                    alternate.to_rgb(&alt[..n])
                },
                None => [1.0 - at(0); 3],
            },
            Colorspace::Pattern { base } => match base {
                Some(b) => b.to_rgb(comps),
                None => [0.0; 3],
            },
        }
    }
}

fn device_space_for(n: usize) -> Colorspace {
    match n {
        1 => Colorspace::DeviceGray,
        4 => Colorspace::DeviceCMYK,
        _ => Colorspace::DeviceRGB,
    }
}

/// CIE L*a*b* to sRGB-ish device RGB via XYZ.
fn lab_to_rgb(l: f32, a: f32, b: f32, white: &[f32; 3]) -> [f32; 3] {
    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;

    let finv = |t: f32| {
        if t > 6.0 / 29.0 {
            t * t * t
        } else {
            3.0 * (6.0f32 / 29.0).powi(2) * (t - 4.0 / 29.0)
        }
    };

    let x = white[0] * finv(fx);
    let y = white[1] * finv(fy);
    let z = white[2] * finv(fz);

    let r = 3.2406 * x - 1.5372 * y - 0.4986 * z;
    let g = -0.9689 * x + 1.8758 * y + 0.0415 * z;
    let bl = 0.0557 * x - 0.2040 * y + 1.0570 * z;

    let gamma = |c: f32| {
        let c = c.clamp(0.0, 1.0);
        if c <= 0.0031308 {
            12.92 * c
        } else {
            1.055 * c.powf(1.0 / 2.4) - 0.055
        }
    };
    [gamma(r), gamma(g), gamma(bl)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_gray() {
        let cs = Colorspace::DeviceGray;
        assert_eq!(cs.n(), 1);
        assert_eq!(cs.to_rgb(&[0.5]), [0.5, 0.5, 0.5]);
        assert_eq!(cs.initial_color(), vec![0.0]);
    }

    #[test]
    fn test_cmyk_black_generation() {
        let cs = Colorspace::DeviceCMYK;
        assert_eq!(cs.to_rgb(&[0.0, 0.0, 0.0, 1.0]), [0.0, 0.0, 0.0]);
        assert_eq!(cs.to_rgb(&[0.0, 0.0, 0.0, 0.0]), [1.0, 1.0, 1.0]);
        let red = cs.to_rgb(&[0.0, 1.0, 1.0, 0.0]);
        assert_eq!(red, [1.0, 0.0, 0.0]);
        assert_eq!(cs.initial_color(), vec![0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_indexed_palette() {
        let cs = Colorspace::Indexed {
            base: Box::new(Colorspace::DeviceRGB),
            hival: 1,
            lookup: vec![255, 0, 0, 0, 0, 255],
        };
        assert!(cs.is_indexed());
        assert_eq!(cs.n(), 1);
        assert_eq!(cs.to_rgb(&[0.0]), [1.0, 0.0, 0.0]);
        assert_eq!(cs.to_rgb(&[1.0]), [0.0, 0.0, 1.0]);
        // Out-of-range index clamps to hival
        assert_eq!(cs.to_rgb(&[9.0]), [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_separation_without_tint_degrades() {
        let cs = Colorspace::Separation {
            alternate: Box::new(Colorspace::DeviceGray),
            tint: None,
        };
        // Full tint of an unknown colorant renders dark
        assert_eq!(cs.to_rgb(&[1.0]), [0.0, 0.0, 0.0]);
        assert_eq!(cs.initial_color(), vec![1.0]);
    }

    #[test]
    fn test_lab_white_is_white() {
        let rgb = lab_to_rgb(100.0, 0.0, 0.0, &[0.9505, 1.0, 1.089]);
        for c in rgb {
            assert!(c > 0.98, "{rgb:?}");
        }
    }

    #[test]
    fn test_icc_uses_alternate() {
        let cs = Colorspace::ICCBased {
            n: 3,
            alternate: Box::new(Colorspace::DeviceRGB),
        };
        assert_eq!(cs.to_rgb(&[0.2, 0.4, 0.6]), [0.2, 0.4, 0.6]);
    }
}
