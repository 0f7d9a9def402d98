//! Affine image painter.
//!
//! Resamples a source pixmap along an affine transform in 16.16
//! fixed-point, compositing premultiplied source-over into the
//! destination. Nearest-neighbor sampling serves rectilinear
//! non-upscaling transforms; bilinear everything else, except images
//! flagged non-interpolate at more than 2x magnification. Axis-aligned
//! transforms are grid-fitted to pixel boundaries so repeated renders are
//! idempotent.

use super::blend::{BlendMode, pixel_over};
use super::pixmap::Pixmap;
use crate::geometry::{IRect, Matrix, Point};

const FIX: i64 = 1 << 16;

/// Paint `src` (RGBA or mask) into `dst` along `ctm`, which maps the unit
/// square onto the image's destination parallelogram.
///
/// `clip_mask`, when present, is a full-destination coverage mask aligned
/// with `dst`. `alpha` is the constant alpha 0..=255.
pub fn paint_image(
    dst: &mut Pixmap,
    clip: IRect,
    clip_mask: Option<&[u8]>,
    src: &Pixmap,
    ctm: &Matrix,
    alpha: u8,
    interpolate: bool,
    mode: BlendMode,
) {
    if src.w == 0 || src.h == 0 {
        return;
    }
    let ctm = grid_fit(ctm);

    let bounds = ctm
        .transform_rect(crate::geometry::Rect::new(0.0, 0.0, 1.0, 1.0))
        .round_out()
        .intersect(clip)
        .intersect(dst.bounds());
    if bounds.is_empty() {
        return;
    }

    let Some(inv) = ctm.invert() else {
        return;
    };

    // Upscale factor decides the sampling mode
    let scale_x = (ctm.a * ctm.a + ctm.b * ctm.b).sqrt() / src.w as f32;
    let scale_y = (ctm.c * ctm.c + ctm.d * ctm.d).sqrt() / src.h as f32;
    let magnifying = scale_x > 1.0 || scale_y > 1.0;
    let bilinear = if ctm.is_rectilinear() && !magnifying {
        false
    } else {
        interpolate || scale_x.max(scale_y) <= 2.0
    };

    // Fixed-point steps of source-space (u,v) per destination x/y
    let w = src.w as i64;
    let h = src.h as i64;
    let du_dx = (inv.a * w as f32 * FIX as f32) as i64;
    let dv_dx = (inv.b * h as f32 * FIX as f32) as i64;
    let du_dy = (inv.c * w as f32 * FIX as f32) as i64;
    let dv_dy = (inv.d * h as f32 * FIX as f32) as i64;

    // (u,v) at the center of the top-left destination pixel
    let origin = inv.transform_point(Point::new(bounds.x0 as f32 + 0.5, bounds.y0 as f32 + 0.5));
    let mut row_u = (origin.x * w as f32 * FIX as f32) as i64;
    let mut row_v = (origin.y * h as f32 * FIX as f32) as i64;

    let dst_bounds = dst.bounds();
    let dst_w = dst.w as usize;
    let dst_n = dst.n as usize;

    for y in bounds.y0..bounds.y1 {
        let mut u = row_u;
        let mut v = row_v;
        let dst_row = (y - dst_bounds.y0) as usize;

        for x in bounds.x0..bounds.x1 {
            let sample = if bilinear {
                sample_bilinear(src, u - FIX / 2, v - FIX / 2)
            } else {
                sample_nearest(src, u, v)
            };
            if let Some(rgba) = sample {
                let cov = match clip_mask {
                    Some(mask) => {
                        mask[dst_row * dst_w + (x - dst_bounds.x0) as usize]
                    },
                    None => 255,
                };
                if cov != 0 && rgba[3] != 0 {
                    let at = (dst_row * dst_w + (x - dst_bounds.x0) as usize) * dst_n;
                    pixel_over(&mut dst.samples[at..at + dst_n], rgba, cov, alpha, mode);
                }
            }
            u += du_dx;
            v += dv_dx;
        }
        row_u += du_dy;
        row_v += dv_dy;
    }
}

/// Snap near-axis-aligned transforms to pixel boundaries.
fn grid_fit(ctm: &Matrix) -> Matrix {
    let mut m = *ctm;
    if m.b.abs() < 1e-4 && m.c.abs() < 1e-4 {
        let x0 = m.e;
        let y0 = m.f;
        let x1 = m.e + m.a;
        let y1 = m.f + m.d;
        let fx0 = x0.round();
        let fy0 = y0.round();
        let fx1 = x1.round();
        let fy1 = y1.round();
        if (fx0 - x0).abs() < 0.25 && (fy0 - y0).abs() < 0.25 {
            m.e = fx0;
            m.f = fy0;
            m.a = fx1 - fx0;
            m.d = fy1 - fy0;
            m.b = 0.0;
            m.c = 0.0;
        }
    }
    m
}

/// Fetch a pixel as premultiplied RGBA (masks expand to white-with-alpha).
#[inline]
fn fetch(src: &Pixmap, sx: i64, sy: i64) -> Option<[u8; 4]> {
    if sx < 0 || sy < 0 || sx >= src.w as i64 || sy >= src.h as i64 {
        return None;
    }
    let n = src.n as usize;
    let at = (sy as usize * src.w as usize + sx as usize) * n;
    let px = &src.samples[at..at + n];
    Some(match (n, src.alpha) {
        (4, true) => [px[0], px[1], px[2], px[3]],
        (3, false) => [px[0], px[1], px[2], 255],
        (2, true) => [px[0], px[0], px[0], px[1]],
        (1, true) => [px[0], px[0], px[0], px[0]],
        (1, false) => [px[0], px[0], px[0], 255],
        _ => {
            let a = if src.alpha { px[n - 1] } else { 255 };
            [px[0], px[0], px[0], a]
        },
    })
}

#[inline]
fn sample_nearest(src: &Pixmap, u: i64, v: i64) -> Option<[u8; 4]> {
    fetch(src, u >> 16, v >> 16)
}

#[inline]
fn sample_bilinear(src: &Pixmap, u: i64, v: i64) -> Option<[u8; 4]> {
    let x0 = u >> 16;
    let y0 = v >> 16;
    let fu = (u & 0xFFFF) as u32;
    let fv = (v & 0xFFFF) as u32;

    let clamp_fetch = |x: i64, y: i64| {
        fetch(
            src,
            x.clamp(0, src.w as i64 - 1),
            y.clamp(0, src.h as i64 - 1),
        )
        .unwrap_or([0, 0, 0, 0])
    };
    // Entirely outside: no contribution
    if x0 < -1 || y0 < -1 || x0 >= src.w as i64 || y0 >= src.h as i64 {
        return None;
    }

    let p00 = clamp_fetch(x0, y0);
    let p10 = clamp_fetch(x0 + 1, y0);
    let p01 = clamp_fetch(x0, y0 + 1);
    let p11 = clamp_fetch(x0 + 1, y0 + 1);

    let mut out = [0u8; 4];
    for i in 0..4 {
        let top = (p00[i] as u64) * (0x10000 - fu) as u64 + (p10[i] as u64) * fu as u64;
        let bottom = (p01[i] as u64) * (0x10000 - fu) as u64 + (p11[i] as u64) * fu as u64;
        let value = (top * (0x10000 - fv) as u64 + bottom * fv as u64) >> 32;
        out[i] = value.min(255) as u8;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;

    fn solid_src(w: u32, h: u32, rgba: [u8; 4]) -> Pixmap {
        let mut pm = Pixmap::new(0, 0, w, h, 4, true);
        for px in pm.samples.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
        pm
    }

    #[test]
    fn test_unit_square_maps_to_rect() {
        let mut dst = Pixmap::rgba(IRect::new(0, 0, 8, 8));
        let src = solid_src(2, 2, [0, 255, 0, 255]);
        // Paint into the 4x4 block at (2,2)
        let ctm = Matrix::scale(4.0, 4.0).concat(&Matrix::translate(2.0, 2.0));
        let bounds = dst.bounds();
        paint_image(
            &mut dst,
            bounds,
            None,
            &src,
            &ctm,
            255,
            false,
            BlendMode::Normal,
        );
        assert_eq!(dst.pixel(3, 3), Some(&[0u8, 255, 0, 255][..]));
        assert_eq!(dst.pixel(1, 1), Some(&[0u8, 0, 0, 0][..]));
        assert_eq!(dst.pixel(6, 6), Some(&[0u8, 0, 0, 0][..]));
        assert!(dst.premultiplied_ok());
    }

    #[test]
    fn test_grid_fit_makes_repeat_renders_identical() {
        let src = solid_src(4, 4, [255, 0, 0, 255]);
        let ctm = Matrix::scale(4.02, 3.98).concat(&Matrix::translate(1.01, 0.98));
        let mut first = Pixmap::rgba(IRect::new(0, 0, 8, 8));
        let first_bounds = first.bounds();
        paint_image(&mut first, first_bounds, None, &src, &ctm, 255, false, BlendMode::Normal);
        let mut second = Pixmap::rgba(IRect::new(0, 0, 8, 8));
        let second_bounds = second.bounds();
        paint_image(&mut second, second_bounds, None, &src, &ctm, 255, false, BlendMode::Normal);
        assert_eq!(first.samples, second.samples);
    }

    #[test]
    fn test_clip_mask_gates_painting() {
        let mut dst = Pixmap::rgba(IRect::new(0, 0, 4, 4));
        let src = solid_src(1, 1, [255, 255, 255, 255]);
        let ctm = Matrix::scale(4.0, 4.0);
        let mut mask = vec![0u8; 16];
        mask[5] = 255; // only pixel (1,1)
        let bounds = dst.bounds();
        paint_image(
            &mut dst,
            bounds,
            Some(&mask),
            &src,
            &ctm,
            255,
            false,
            BlendMode::Normal,
        );
        assert_eq!(dst.pixel(1, 1), Some(&[255u8, 255, 255, 255][..]));
        assert_eq!(dst.pixel(2, 2), Some(&[0u8, 0, 0, 0][..]));
    }

    #[test]
    fn test_constant_alpha_scales_source() {
        let mut dst = Pixmap::rgba(IRect::new(0, 0, 2, 2));
        let src = solid_src(1, 1, [255, 255, 255, 255]);
        let ctm = Matrix::scale(2.0, 2.0);
        let bounds = dst.bounds();
        paint_image(&mut dst, bounds, None, &src, &ctm, 128, false, BlendMode::Normal);
        let px = dst.pixel(0, 0).unwrap();
        assert!((120..=135).contains(&px[0]), "{px:?}");
        assert!(dst.premultiplied_ok());
    }

    #[test]
    fn test_rotation_uses_bilinear_and_stays_in_bounds() {
        let mut dst = Pixmap::rgba(IRect::new(0, 0, 12, 12));
        let src = solid_src(4, 4, [0, 0, 255, 255]);
        let ctm = Matrix::scale(6.0, 6.0)
            .concat(&Matrix::rotate(30.0))
            .concat(&Matrix::translate(5.0, 2.0));
        let bounds = dst.bounds();
        paint_image(&mut dst, bounds, None, &src, &ctm, 255, true, BlendMode::Normal);
        assert!(dst.premultiplied_ok());
        // Something was painted
        assert!(dst.samples.chunks_exact(4).any(|px| px[3] != 0));
    }

    #[test]
    fn test_transform_rect_helper_agrees() {
        // Guard: the bounds we paint match the transformed unit square
        let ctm = Matrix::scale(4.0, 4.0).concat(&Matrix::translate(2.0, 2.0));
        let r = ctm.transform_rect(Rect::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(r, Rect::new(2.0, 2.0, 6.0, 6.0));
    }
}
