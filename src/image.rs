//! Image resources with deferred decoding.
//!
//! An image keeps its compressed bytes plus an explicit decoder recipe
//! (filter chain, parameters, mask recipe) so holding an image does not
//! pin decoded samples or the document. The device asks for a decoded
//! pixmap on demand; masks convert to alpha at that point.

use crate::colorspace::Colorspace;
use crate::decoders::{self, FilterStep};
use crate::document::Document;
use crate::error::{Error, Result, ResultExt};
use crate::geometry::IRect;
use crate::object::{Dict, DictExt, ObjRef, Object, Stream};
use crate::raster::pixmap::Pixmap;
use bytes::Bytes;
use std::sync::Arc;

/// Everything needed to decode an image's payload later.
#[derive(Debug, Clone)]
pub struct DecodeRecipe {
    /// Filter chain up to (and including) any terminal image codec
    pub chain: Vec<FilterStep>,
    /// The terminal image codec name, if the chain ends in one
    pub codec: Option<String>,
}

/// An image XObject or inline image, compressed, with its recipe.
pub struct Image {
    /// Pixel width
    pub width: u32,
    /// Pixel height
    pub height: u32,
    /// Bits per component (1, 2, 4, 8, 16)
    pub bpc: u8,
    /// Colorspace (None for stencil masks)
    pub colorspace: Option<Colorspace>,
    /// /Decode array, when it differs from the default
    pub decode: Option<Vec<f32>>,
    /// Soft mask image (/SMask), one recursion level deep
    pub smask: Option<Arc<Image>>,
    /// Color-key mask ranges (/Mask as an array), in component pairs
    pub color_key: Option<Vec<u32>>,
    /// Whether this is a stencil mask (/ImageMask true)
    pub image_mask: bool,
    /// /Interpolate flag
    pub interpolate: bool,
    /// Compressed payload (already decrypted)
    pub data: Bytes,
    /// The decoder recipe
    pub recipe: DecodeRecipe,
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bpc", &self.bpc)
            .field("image_mask", &self.image_mask)
            .field("codec", &self.recipe.codec)
            .finish()
    }
}

impl Image {
    /// Load an image from a stream object. `depth` caps soft-mask
    /// recursion: nested soft masks are refused with a warning.
    pub fn load(doc: &mut Document, stream: &Stream, re: Option<ObjRef>, depth: u8) -> Result<Image> {
        let dict = &stream.dict;
        let width = require_dim(doc, dict, "Width")?;
        let height = require_dim(doc, dict, "Height")?;
        let image_mask = dict.get_bool("ImageMask").unwrap_or(false)
            || dict.get_bool("IM").unwrap_or(false);

        let bpc = if image_mask {
            1
        } else {
            doc.resolve_key(dict, "BitsPerComponent")?
                .as_int()
                .or_else(|| dict.get_int("BPC"))
                .unwrap_or(8)
                .clamp(1, 16) as u8
        };

        let colorspace = if image_mask {
            None
        } else {
            let cs_obj = dict
                .get("ColorSpace")
                .or_else(|| dict.get("CS"))
                .cloned();
            match cs_obj {
                Some(obj) => Some(Colorspace::load(doc, &obj).context("image colorspace")?),
                None => None,
            }
        };

        let decode = match dict.get_array("Decode").or_else(|| dict.get_array("D")) {
            Some(arr) => Some(
                arr.iter()
                    .map(|o| o.as_number().unwrap_or(0.0) as f32)
                    .collect(),
            ),
            None => None,
        };

        // /SMask wins over /Mask when both are present
        let smask_obj = doc.resolve_key(dict, "SMask")?;
        let mask_obj = doc.resolve_key(dict, "Mask")?;
        let mut smask = None;
        let mut color_key = None;
        if let Object::Stream(smask_stream) = smask_obj {
            if depth >= 1 {
                log::warn!("nested soft mask refused");
            } else {
                match Image::load(doc, &smask_stream, dict.get("SMask").and_then(Object::as_ref), depth + 1)
                {
                    Ok(img) => smask = Some(Arc::new(img)),
                    Err(e) => log::warn!("unusable /SMask: {e}"),
                }
            }
        } else {
            match mask_obj {
                Object::Array(ranges) => {
                    color_key = Some(
                        ranges
                            .iter()
                            .filter_map(|o| o.as_int().map(|v| v.max(0) as u32))
                            .collect(),
                    );
                },
                Object::Stream(mask_stream) => {
                    // Explicit stencil mask: load as a 1-bit mask image and
                    // treat it as an inverted soft mask at decode time
                    if depth >= 1 {
                        log::warn!("nested mask refused");
                    } else {
                        match Image::load(
                            doc,
                            &mask_stream,
                            dict.get("Mask").and_then(Object::as_ref),
                            depth + 1,
                        ) {
                            Ok(img) => smask = Some(Arc::new(img)),
                            Err(e) => log::warn!("unusable /Mask: {e}"),
                        }
                    }
                },
                _ => {},
            }
        }

        let interpolate = dict.get_bool("Interpolate").unwrap_or(false)
            || dict.get_bool("I").unwrap_or(false);

        // Decrypt now so the recipe is self-contained
        let filter = dict.get("Filter").or_else(|| dict.get("F")).cloned();
        let parms = dict
            .get("DecodeParms")
            .or_else(|| dict.get("DP"))
            .cloned();
        let chain = decoders::filter_chain(filter.as_ref(), parms.as_ref());
        let codec = chain
            .iter()
            .find(|(n, _)| decoders::is_image_filter(n))
            .map(|(n, _)| n.as_str().to_string());

        // Run decryption only (no filters) by decoding with an empty chain
        let data = match re {
            Some(_) => {
                let mut plain = Stream {
                    dict: dict.clone(),
                    data: stream.data.clone(),
                };
                plain.dict.shift_remove("Filter");
                plain.dict.shift_remove("F");
                Bytes::from(doc.decode_stream(&plain, re)?)
            },
            None => stream.data.clone(),
        };

        Ok(Image {
            width,
            height,
            bpc,
            colorspace,
            decode,
            smask,
            color_key,
            image_mask,
            interpolate,
            data,
            recipe: DecodeRecipe { chain, codec },
        })
    }

    /// Decode to a premultiplied RGBA pixmap (or an alpha mask for
    /// stencils). This is the deferred step the device triggers.
    pub fn to_pixmap(&self) -> Result<Pixmap> {
        let defiltered = decoders::decode_chain(&self.data, &self.recipe.chain)?;

        let (samples, n, bpc, jpeg_gray): (Vec<u8>, usize, u8, bool) =
            match self.recipe.codec.as_deref() {
                Some("DCTDecode") | Some("DCT") => {
                    let img = image::load_from_memory_with_format(
                        &defiltered,
                        image::ImageFormat::Jpeg,
                    )
                    .map_err(|e| Error::syntax(format!("JPEG decode failed: {e}")))?;
                    let gray = matches!(&img, image::DynamicImage::ImageLuma8(_));
                    if gray {
                        (img.to_luma8().into_raw(), 1, 8, true)
                    } else {
                        (img.to_rgb8().into_raw(), 3, 8, false)
                    }
                },
                Some(other) => {
                    return Err(Error::Unsupported(format!("image codec {other}")));
                },
                None => {
                    let n = if self.image_mask {
                        1
                    } else {
                        self.colorspace.as_ref().map_or(1, Colorspace::n)
                    };
                    (defiltered, n, self.bpc, false)
                },
            };

        if self.image_mask {
            return self.decode_stencil(&samples);
        }

        let colorspace = match (&self.colorspace, jpeg_gray, n) {
            (Some(cs), false, _) => cs.clone(),
            (_, true, _) => Colorspace::DeviceGray,
            (None, _, 3) => Colorspace::DeviceRGB,
            (None, _, 1) => Colorspace::DeviceGray,
            (None, _, 4) => Colorspace::DeviceCMYK,
            (None, ..) => Colorspace::DeviceRGB,
        };

        let mut out = Pixmap::new(0, 0, self.width, self.height, 4, true);
        let max = ((1u32 << bpc.min(16)) - 1) as f32;
        let row_bits = self.width as usize * n * bpc as usize;
        let row_bytes = row_bits.div_ceil(8);

        let mut comps = vec![0.0f32; n];
        for y in 0..self.height as usize {
            let row = samples.get(y * row_bytes..).unwrap_or(&[]);
            for x in 0..self.width as usize {
                for (c, comp) in comps.iter_mut().enumerate() {
                    let index = (x * n) + c;
                    let raw = read_packed(row, bpc, index) as f32;
                    let decode_pair = self.decode.as_ref().and_then(|d| {
                        Some((*d.get(c * 2)?, *d.get(c * 2 + 1)?))
                    });
                    *comp = if colorspace.is_indexed() {
                        // Indexed samples are palette indices; a Decode
                        // array remaps within index space
                        match decode_pair {
                            Some((lo, hi)) => lo + raw / max * (hi - lo),
                            None => raw,
                        }
                    } else {
                        match decode_pair {
                            Some((lo, hi)) => lo + raw / max * (hi - lo),
                            None => raw / max,
                        }
                    };
                }
                let rgb = colorspace.to_rgb(&comps);

                // Color-key masking: transparent when all components fall
                // inside the declared ranges
                let mut alpha = 255u8;
                if let Some(key) = &self.color_key {
                    let mut inside = true;
                    for (c, _) in comps.iter().enumerate() {
                        let raw = read_packed(row, bpc, x * n + c);
                        let lo = key.get(c * 2).copied().unwrap_or(0);
                        let hi = key.get(c * 2 + 1).copied().unwrap_or(0);
                        if raw < lo || raw > hi {
                            inside = false;
                            break;
                        }
                    }
                    if inside {
                        alpha = 0;
                    }
                }

                let at = (y * self.width as usize + x) * 4;
                let a = alpha as u32;
                out.samples[at] = ((rgb[0].clamp(0.0, 1.0) * 255.0) as u32 * a / 255) as u8;
                out.samples[at + 1] = ((rgb[1].clamp(0.0, 1.0) * 255.0) as u32 * a / 255) as u8;
                out.samples[at + 2] = ((rgb[2].clamp(0.0, 1.0) * 255.0) as u32 * a / 255) as u8;
                out.samples[at + 3] = alpha;
            }
        }

        if let Some(smask) = &self.smask {
            if let Err(e) = apply_soft_mask(&mut out, smask) {
                log::warn!("soft mask application failed: {e}");
            }
        }

        Ok(out)
    }

    /// Decode a stencil mask into a coverage pixmap. Default /Decode
    /// [0 1] marks 0-bits as painted.
    fn decode_stencil(&self, samples: &[u8]) -> Result<Pixmap> {
        let mut out = Pixmap::mask(IRect::new(0, 0, self.width as i32, self.height as i32));
        let row_bytes = (self.width as usize).div_ceil(8);
        let invert = self
            .decode
            .as_ref()
            .is_some_and(|d| d.first().copied().unwrap_or(0.0) > 0.5);
        for y in 0..self.height as usize {
            let row = samples.get(y * row_bytes..(y + 1) * row_bytes).unwrap_or(&[]);
            for x in 0..self.width as usize {
                let bit = row
                    .get(x / 8)
                    .map_or(0, |&b| (b >> (7 - x % 8)) & 1);
                let painted = (bit == 0) != invert;
                out.samples[y * self.width as usize + x] = if painted { 255 } else { 0 };
            }
        }
        Ok(out)
    }
}

/// Multiply image alpha by a decoded soft-mask image (luminosity source).
fn apply_soft_mask(target: &mut Pixmap, smask: &Image) -> Result<()> {
    let mask_pm = smask.to_pixmap()?;
    for y in 0..target.h as usize {
        for x in 0..target.w as usize {
            // Nearest-neighbor into the mask's grid
            let mx = (x * mask_pm.w as usize) / target.w.max(1) as usize;
            let my = (y * mask_pm.h as usize) / target.h.max(1) as usize;
            let m_at = (my.min(mask_pm.h as usize - 1) * mask_pm.w as usize
                + mx.min(mask_pm.w as usize - 1))
                * mask_pm.n as usize;
            // Luminosity of the mask sample (gray or first channel)
            let m = mask_pm.samples.get(m_at).copied().unwrap_or(255);
            let at = (y * target.w as usize + x) * 4;
            for c in 0..4 {
                let v = target.samples[at + c] as u32 * m as u32 / 255;
                target.samples[at + c] = v as u8;
            }
        }
    }
    Ok(())
}

fn require_dim(doc: &mut Document, dict: &Dict, key: &str) -> Result<u32> {
    let abbrev = match key {
        "Width" => "W",
        "Height" => "H",
        other => other,
    };
    let value = doc
        .resolve_key(dict, key)?
        .as_int()
        .or_else(|| dict.get_int(abbrev))
        .ok_or_else(|| Error::syntax(format!("image missing /{key}")))?;
    if value <= 0 || value > 1 << 16 {
        return Err(Error::range(format!("image /{key} {value} out of range")));
    }
    Ok(value as u32)
}

/// Read the `index`-th packed sample of `bpc` bits from a row-aligned
/// buffer.
fn read_packed(row: &[u8], bpc: u8, index: usize) -> u32 {
    match bpc {
        8 => row.get(index).copied().unwrap_or(0) as u32,
        16 => {
            let at = index * 2;
            let hi = row.get(at).copied().unwrap_or(0) as u32;
            let lo = row.get(at + 1).copied().unwrap_or(0) as u32;
            (hi << 8) | lo
        },
        1 | 2 | 4 => {
            let bits = bpc as usize;
            let bit_at = index * bits;
            let byte = row.get(bit_at / 8).copied().unwrap_or(0);
            let shift = 8 - bits - (bit_at % 8);
            ((byte >> shift) as u32) & ((1 << bits) - 1)
        },
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::Name;

    fn gray_image(width: u32, height: u32, samples: &[u8]) -> Image {
        Image {
            width,
            height,
            bpc: 8,
            colorspace: Some(Colorspace::DeviceGray),
            decode: None,
            smask: None,
            color_key: None,
            image_mask: false,
            interpolate: false,
            data: Bytes::copy_from_slice(samples),
            recipe: DecodeRecipe {
                chain: Vec::new(),
                codec: None,
            },
        }
    }

    #[test]
    fn test_gray_decode() {
        let img = gray_image(2, 1, &[0, 255]);
        let pm = img.to_pixmap().unwrap();
        assert_eq!(pm.pixel(0, 0), Some(&[0u8, 0, 0, 255][..]));
        assert_eq!(pm.pixel(1, 0), Some(&[255u8, 255, 255, 255][..]));
        assert!(pm.premultiplied_ok());
    }

    #[test]
    fn test_decode_array_inverts() {
        let mut img = gray_image(1, 1, &[0]);
        img.decode = Some(vec![1.0, 0.0]);
        let pm = img.to_pixmap().unwrap();
        assert_eq!(pm.pixel(0, 0), Some(&[255u8, 255, 255, 255][..]));
    }

    #[test]
    fn test_stencil_mask_bits() {
        let mut img = gray_image(8, 1, &[0b1010_1010]);
        img.image_mask = true;
        img.bpc = 1;
        img.colorspace = None;
        let pm = img.to_pixmap().unwrap();
        // Default decode: 0-bits paint
        assert_eq!(pm.samples[0], 0); // bit 1 -> not painted
        assert_eq!(pm.samples[1], 255); // bit 0 -> painted
    }

    #[test]
    fn test_color_key_mask() {
        let mut img = gray_image(2, 1, &[10, 200]);
        img.color_key = Some(vec![0, 50]);
        let pm = img.to_pixmap().unwrap();
        assert_eq!(pm.pixel(0, 0).unwrap()[3], 0); // inside key range
        assert_eq!(pm.pixel(1, 0).unwrap()[3], 255);
        assert!(pm.premultiplied_ok());
    }

    #[test]
    fn test_indexed_image_decodes_through_palette() {
        let mut img = gray_image(2, 1, &[0, 1]);
        img.colorspace = Some(Colorspace::Indexed {
            base: Box::new(Colorspace::DeviceRGB),
            hival: 1,
            lookup: vec![255, 0, 0, 0, 255, 0],
        });
        let pm = img.to_pixmap().unwrap();
        assert_eq!(pm.pixel(0, 0), Some(&[255u8, 0, 0, 255][..]));
        assert_eq!(pm.pixel(1, 0), Some(&[0u8, 255, 0, 255][..]));
    }

    #[test]
    fn test_smask_multiplies_alpha() {
        let mut img = gray_image(1, 1, &[255]);
        img.smask = Some(Arc::new(gray_image(1, 1, &[128])));
        let pm = img.to_pixmap().unwrap();
        let px = pm.pixel(0, 0).unwrap();
        assert_eq!(px[3], 128);
        assert!(pm.premultiplied_ok());
    }

    #[test]
    fn test_4bpc_packing() {
        let mut img = gray_image(2, 1, &[0xF0]);
        img.bpc = 4;
        let pm = img.to_pixmap().unwrap();
        assert_eq!(pm.pixel(0, 0).unwrap()[0], 255);
        assert_eq!(pm.pixel(1, 0).unwrap()[0], 0);
    }

    #[test]
    fn test_unsupported_codec_reports() {
        let mut img = gray_image(1, 1, &[0]);
        img.recipe.codec = Some("JPXDecode".into());
        img.recipe.chain = vec![(Name::new("JPXDecode"), Dict::new())];
        assert!(matches!(img.to_pixmap(), Err(Error::Unsupported(_))));
    }
}
