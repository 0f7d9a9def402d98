//! Shading resources: axial and radial gradients.
//!
//! Types 2 (axial) and 3 (radial) cover the vast majority of `sh`
//! operators and shading patterns; the mesh types warn and skip per the
//! soft-failure policy. The draw device rasterizes a shading by
//! evaluating the parametric color per pixel within the clip.

use crate::colorspace::Colorspace;
use crate::document::Document;
use crate::error::{Error, Result, ResultExt};
use crate::function::Function;
use crate::geometry::{Point, Rect};
use crate::object::{Dict, DictExt, Object};

/// A parsed shading.
#[derive(Debug, Clone)]
pub struct Shading {
    /// Geometry variant
    pub kind: ShadingKind,
    /// Color space of the function output
    pub colorspace: Colorspace,
    /// Color functions (one n-out function or n one-out functions)
    pub functions: Vec<Function>,
    /// Extend beyond t=0 / t=1
    pub extend: (bool, bool),
    /// Optional clip box in shading target space
    pub bbox: Option<Rect>,
    /// Parameter range [t0, t1]
    pub domain: (f32, f32),
    /// Background color, used outside the geometry when not extended
    pub background: Option<[f32; 3]>,
}

/// Shading geometry.
#[derive(Debug, Clone)]
pub enum ShadingKind {
    /// Type 2: gradient along the axis from `start` to `end`
    Axial {
        /// Axis start
        start: Point,
        /// Axis end
        end: Point,
    },
    /// Type 3: gradient between two circles
    Radial {
        /// Start circle center and radius
        start: (Point, f32),
        /// End circle center and radius
        end: (Point, f32),
    },
}

impl Shading {
    /// Parse a shading dictionary (or stream dictionary).
    pub fn load(doc: &mut Document, obj: &Object) -> Result<Shading> {
        let resolved = doc.resolve(obj)?;
        let dict = resolved
            .as_dict()
            .ok_or_else(|| Error::syntax("shading must be a dictionary"))?
            .clone();

        let shading_type = dict.get_int("ShadingType").unwrap_or(0);
        let kind = match shading_type {
            2 => {
                let coords = coords(doc, &dict, 4)?;
                ShadingKind::Axial {
                    start: Point::new(coords[0], coords[1]),
                    end: Point::new(coords[2], coords[3]),
                }
            },
            3 => {
                let coords = coords(doc, &dict, 6)?;
                ShadingKind::Radial {
                    start: (Point::new(coords[0], coords[1]), coords[2].max(0.0)),
                    end: (Point::new(coords[3], coords[4]), coords[5].max(0.0)),
                }
            },
            other => {
                return Err(Error::Unsupported(format!("shading type {other}")));
            },
        };

        let colorspace = match dict.get("ColorSpace") {
            Some(cs) => {
                let cs = cs.clone();
                Colorspace::load(doc, &cs).context("shading colorspace")?
            },
            None => Colorspace::DeviceRGB,
        };

        let functions = match dict.get("Function") {
            Some(Object::Array(fns)) => {
                let fns = fns.clone();
                let mut out = Vec::with_capacity(fns.len());
                for f in &fns {
                    out.push(Function::load(doc, f)?);
                }
                out
            },
            Some(f) => {
                let f = f.clone();
                vec![Function::load(doc, &f)?]
            },
            None => Vec::new(),
        };

        let extend = match dict.get_array("Extend") {
            Some([a, b]) => (
                a.as_bool().unwrap_or(false),
                b.as_bool().unwrap_or(false),
            ),
            _ => (false, false),
        };

        let domain = match dict.get_array("Domain") {
            Some([t0, t1]) => (
                t0.as_number().unwrap_or(0.0) as f32,
                t1.as_number().unwrap_or(1.0) as f32,
            ),
            _ => (0.0, 1.0),
        };

        let bbox = dict.get_array("BBox").and_then(|arr| match arr {
            [a, b, c, d] => Some(Rect::new(
                a.as_number()? as f32,
                b.as_number()? as f32,
                c.as_number()? as f32,
                d.as_number()? as f32,
            )),
            _ => None,
        });

        let background = dict.get_array("Background").map(|arr| {
            let comps: Vec<f32> = arr
                .iter()
                .filter_map(|o| o.as_number().map(|v| v as f32))
                .collect();
            colorspace.to_rgb(&comps)
        });

        Ok(Shading {
            kind,
            colorspace,
            functions,
            extend,
            bbox,
            domain,
            background,
        })
    }

    /// Color at parametric position `s` in [0, 1].
    pub fn color_at(&self, s: f32) -> [f32; 3] {
        let t = self.domain.0 + s.clamp(0.0, 1.0) * (self.domain.1 - self.domain.0);
        let mut comps = [0.0f32; 8];
        let n = self.colorspace.n().min(8);
        match self.functions.len() {
            0 => {},
            1 => self.functions[0].eval(&[t], &mut comps[..n]),
            _ => {
                for (i, f) in self.functions.iter().take(n).enumerate() {
                    let mut one = [0.0f32];
                    f.eval(&[t], &mut one);
                    comps[i] = one[0];
                }
            },
        }
        self.colorspace.to_rgb(&comps[..n])
    }

    /// Parametric position of a point in shading space, or `None` when
    /// the point is outside the (un-extended) geometry.
    pub fn param_at(&self, p: Point) -> Option<f32> {
        match &self.kind {
            ShadingKind::Axial { start, end } => {
                let dx = end.x - start.x;
                let dy = end.y - start.y;
                let len_sq = dx * dx + dy * dy;
                if len_sq < 1e-12 {
                    return Some(0.0);
                }
                let s = ((p.x - start.x) * dx + (p.y - start.y) * dy) / len_sq;
                self.clip_param(s)
            },
            ShadingKind::Radial { start, end } => {
                // Walk the circle family: center and radius interpolate
                // with s. Solve |p - c(s)| = r(s) for the largest s.
                let cdx = end.0.x - start.0.x;
                let cdy = end.0.y - start.0.y;
                let dr = end.1 - start.1;
                let pdx = p.x - start.0.x;
                let pdy = p.y - start.0.y;

                let a = cdx * cdx + cdy * cdy - dr * dr;
                let b = -2.0 * (pdx * cdx + pdy * cdy + start.1 * dr);
                let c = pdx * pdx + pdy * pdy - start.1 * start.1;

                let s = if a.abs() < 1e-9 {
                    if b.abs() < 1e-9 {
                        return None;
                    }
                    -c / b
                } else {
                    let disc = b * b - 4.0 * a * c;
                    if disc < 0.0 {
                        return None;
                    }
                    let sqrt = disc.sqrt();
                    let s1 = (-b + sqrt) / (2.0 * a);
                    let s2 = (-b - sqrt) / (2.0 * a);
                    let valid = |s: f32| start.1 + s * dr >= 0.0;
                    if valid(s1.max(s2)) {
                        s1.max(s2)
                    } else if valid(s1.min(s2)) {
                        s1.min(s2)
                    } else {
                        return None;
                    }
                };
                self.clip_param(s)
            },
        }
    }

    fn clip_param(&self, s: f32) -> Option<f32> {
        if s < 0.0 {
            if self.extend.0 { Some(0.0) } else { None }
        } else if s > 1.0 {
            if self.extend.1 { Some(1.0) } else { None }
        } else {
            Some(s)
        }
    }
}

fn coords(doc: &mut Document, dict: &Dict, want: usize) -> Result<Vec<f32>> {
    let arr = doc.resolve_key(dict, "Coords")?;
    let values: Vec<f32> = arr
        .as_array()
        .unwrap_or(&[])
        .iter()
        .filter_map(|o| o.as_number().map(|v| v as f32))
        .collect();
    if values.len() < want {
        return Err(Error::syntax(format!(
            "shading /Coords has {} of {want} values",
            values.len()
        )));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axial() -> Shading {
        Shading {
            kind: ShadingKind::Axial {
                start: Point::new(0.0, 0.0),
                end: Point::new(10.0, 0.0),
            },
            colorspace: Colorspace::DeviceRGB,
            functions: Vec::new(),
            extend: (false, false),
            bbox: None,
            domain: (0.0, 1.0),
            background: None,
        }
    }

    #[test]
    fn test_axial_param() {
        let sh = axial();
        assert_eq!(sh.param_at(Point::new(5.0, 3.0)), Some(0.5));
        assert_eq!(sh.param_at(Point::new(0.0, 0.0)), Some(0.0));
        // Beyond the axis without extend
        assert_eq!(sh.param_at(Point::new(15.0, 0.0)), None);
        assert_eq!(sh.param_at(Point::new(-1.0, 0.0)), None);
    }

    #[test]
    fn test_axial_extend_clamps() {
        let mut sh = axial();
        sh.extend = (true, true);
        assert_eq!(sh.param_at(Point::new(15.0, 0.0)), Some(1.0));
        assert_eq!(sh.param_at(Point::new(-5.0, 0.0)), Some(0.0));
    }

    #[test]
    fn test_radial_param_inside() {
        let sh = Shading {
            kind: ShadingKind::Radial {
                start: (Point::new(0.0, 0.0), 0.0),
                end: (Point::new(0.0, 0.0), 10.0),
            },
            ..axial()
        };
        let mid = sh.param_at(Point::new(5.0, 0.0)).unwrap();
        assert!((mid - 0.5).abs() < 1e-4);
        let edge = sh.param_at(Point::new(0.0, 10.0)).unwrap();
        assert!((edge - 1.0).abs() < 1e-4);
        assert_eq!(sh.param_at(Point::new(20.0, 0.0)), None);
    }
}
