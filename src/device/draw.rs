//! The draw device: rasterizes device calls into a pixmap.
//!
//! Fills and strokes flatten to segments and scan-convert with the
//! GEL/AEL rasterizer; images resample through the affine painter; glyphs
//! rasterize through the glyph cache. Clips are coverage masks ANDed into
//! a stack; transparency groups and soft masks are page-sized layers
//! composited on pop.

use super::{Device, DeviceCaps, Paint, TextSpan};
use crate::error::{Error, Result};
use crate::geometry::{IRect, Matrix, Point, Rect};
use crate::image::Image;
use crate::raster::blend::{BlendMode, pixel_over, span_solid_over};
use crate::raster::flatten::{self, FlatPath};
use crate::raster::glyph_cache::{CachedGlyph, GlyphCache, GlyphKey};
use crate::raster::path::{Path, StrokeState};
use crate::raster::pixmap::Pixmap;
use crate::raster::scan;
use crate::shade::Shading;
use std::sync::{Arc, Mutex};

/// Flatness tolerance in device pixels.
const FLATNESS: f32 = 0.25;

enum LayerKind {
    Base,
    Group { blend: BlendMode, alpha: f32 },
    Mask { luminosity: bool },
}

struct Layer {
    pixmap: Pixmap,
    kind: LayerKind,
}

struct ClipEntry {
    prev_scissor: IRect,
    prev_mask: Option<Vec<u8>>,
}

/// Software rasterizer implementing [`Device`].
pub struct DrawDevice {
    layers: Vec<Layer>,
    clip_stack: Vec<ClipEntry>,
    scissor: IRect,
    /// Accumulated coverage mask over the full page, when any clip is soft
    mask: Option<Vec<u8>>,
    glyph_cache: Arc<Mutex<GlyphCache>>,
    aa_level: u8,
}

impl DrawDevice {
    /// Create a draw device over a fresh transparent RGBA pixmap covering
    /// `bounds`.
    pub fn new(bounds: IRect, aa_level: u8) -> Self {
        Self::with_glyph_cache(bounds, aa_level, Arc::new(Mutex::new(GlyphCache::default())))
    }

    /// Create with a shared glyph cache (reused across page renders).
    pub fn with_glyph_cache(
        bounds: IRect,
        aa_level: u8,
        glyph_cache: Arc<Mutex<GlyphCache>>,
    ) -> Self {
        Self {
            layers: vec![Layer {
                pixmap: Pixmap::rgba(bounds),
                kind: LayerKind::Base,
            }],
            clip_stack: Vec::new(),
            scissor: bounds,
            mask: None,
            glyph_cache,
            aa_level,
        }
    }

    /// Clear the target to opaque white (the conventional page backdrop).
    pub fn clear_white(&mut self) {
        self.layers[0].pixmap.clear_with(0xFF);
    }

    /// Finish and take the rendered pixmap.
    pub fn into_pixmap(mut self) -> Pixmap {
        while self.layers.len() > 1 {
            // Unbalanced layers at close: composite groups, drop masks
            match self.layers.last() {
                Some(Layer {
                    kind: LayerKind::Group { .. },
                    ..
                }) => {
                    let _ = self.end_group();
                },
                _ => {
                    log::warn!("dropping unbalanced mask layer at close");
                    self.layers.pop();
                },
            }
        }
        self.layers.pop().expect("base layer").pixmap
    }

    fn bounds(&self) -> IRect {
        self.layers[0].pixmap.bounds()
    }

    fn page_w(&self) -> usize {
        self.layers[0].pixmap.w as usize
    }

    /// Blend a coverage row into the top layer.
    fn paint_row(&mut self, y: i32, x0: i32, coverage: &[u8], paint: &Paint) {
        let bounds = self.bounds();
        let w = self.page_w();
        let color = paint.rgba8();
        let alpha = paint.alpha8();
        let blend = paint.blend;

        // Split borrows: clip mask is read-only while the layer is written
        let mask = self.mask.take();
        {
            let layer = self.layers.last_mut().expect("layer");
            let row = (y - bounds.y0) as usize;
            let n = layer.pixmap.n as usize;
            match &mask {
                None => {
                    // Unclipped rows take the solid span painter
                    let start = row * w + (x0 - bounds.x0) as usize;
                    let span = &mut layer.pixmap.samples
                        [start * n..(start + coverage.len()) * n];
                    span_solid_over(span, color, coverage, alpha, blend);
                },
                Some(m) => {
                    for (i, &cov) in coverage.iter().enumerate() {
                        if cov == 0 {
                            continue;
                        }
                        let x = (x0 + i as i32 - bounds.x0) as usize;
                        let page_index = row * w + x;
                        let clip = m[page_index];
                        if clip == 0 {
                            continue;
                        }
                        let cov = (cov as u32 * clip as u32 / 255) as u8;
                        let at = page_index * n;
                        pixel_over(
                            &mut layer.pixmap.samples[at..at + n],
                            color,
                            cov,
                            alpha,
                            blend,
                        );
                    }
                },
            }
        }
        self.mask = mask;
    }

    /// Scan-convert segments and paint them.
    fn fill_segments(&mut self, segments: &[(Point, Point)], even_odd: bool, paint: &Paint) {
        let clip = self.scissor;
        let aa = self.aa_level;
        // Collect rows first: the span callback cannot borrow self twice
        let mut rows: Vec<(i32, i32, Vec<u8>)> = Vec::new();
        scan::fill_segments(segments, clip, even_odd, aa, &mut |y, x0, cov| {
            rows.push((y, x0, cov.to_vec()));
        });
        for (y, x0, cov) in rows {
            self.paint_row(y, x0, &cov, paint);
        }
    }

    /// Rasterize segments into a page-sized coverage buffer.
    fn rasterize_coverage(&self, segments: &[(Point, Point)], even_odd: bool) -> Vec<u8> {
        let bounds = self.bounds();
        let w = self.page_w();
        let mut out = vec![0u8; w * bounds.height().max(0) as usize];
        scan::fill_segments(segments, self.scissor, even_odd, self.aa_level, &mut |y, x0, cov| {
            let row = (y - bounds.y0) as usize;
            for (i, &c) in cov.iter().enumerate() {
                let x = (x0 + i as i32 - bounds.x0) as usize;
                out[row * w + x] = c;
            }
        });
        out
    }

    /// Push a clip whose coverage is `coverage` (page-sized), bounded by
    /// `bbox`.
    fn push_clip_coverage(&mut self, coverage: Vec<u8>, bbox: IRect) {
        let entry = ClipEntry {
            prev_scissor: self.scissor,
            prev_mask: self.mask.clone(),
        };
        let combined = match &self.mask {
            Some(old) => old
                .iter()
                .zip(&coverage)
                .map(|(&a, &b)| (a as u32 * b as u32 / 255) as u8)
                .collect(),
            None => coverage,
        };
        self.mask = Some(combined);
        self.scissor = self.scissor.intersect(bbox);
        self.clip_stack.push(entry);
    }

    fn flatten_for(&self, path: &Path, ctm: &Matrix) -> FlatPath {
        flatten::flatten(&path.transform(ctm), FLATNESS)
    }

    /// Device-space stroke geometry for a path.
    fn stroke_segments(
        &self,
        path: &Path,
        stroke: &StrokeState,
        ctm: &Matrix,
    ) -> Vec<(Point, Point)> {
        let flat = self.flatten_for(path, ctm);
        let expansion = ctm.expansion().max(1e-6);
        let flat = if stroke.dashes.is_empty() {
            flat
        } else {
            let dashes: Vec<f32> = stroke.dashes.iter().map(|d| d * expansion).collect();
            flatten::dash(&flat, &dashes, stroke.dash_phase * expansion)
        };
        let width = (stroke.line_width * expansion).max(0.8);
        flatten::stroke_outline(&flat, stroke, width)
    }

    /// Render (or fetch) a glyph mask for one text item.
    fn glyph_mask(
        &mut self,
        span: &TextSpan,
        gid: u16,
        trm: &Matrix,
        stroke: Option<&StrokeState>,
    ) -> Option<(CachedGlyph, i32, i32)> {
        let origin_x = trm.e.floor();
        let origin_y = trm.f.floor();
        let font_id = Arc::as_ptr(&span.font) as usize;
        let fingerprint = stroke.map_or(0, StrokeState::fingerprint);
        let key = GlyphKey::new(font_id, gid, self.aa_level, fingerprint, trm);

        if let Ok(mut cache) = self.glyph_cache.lock() {
            if let Some(hit) = cache.get(&key) {
                return Some((hit, origin_x as i32, origin_y as i32));
            }
        }

        let (outline, upem) = span.font.glyph_path(gid)?;
        // Glyph space -> device: font units scale, then the glyph trm with
        // only the fractional translation kept (the cache key quantizes it)
        let local = Matrix::new(trm.a, trm.b, trm.c, trm.d, trm.e - origin_x, trm.f - origin_y);
        let to_device = Matrix::scale(1.0 / upem, 1.0 / upem).concat(&local);
        let device_path = outline.transform(&to_device);

        let bbox = device_path.bounds().round_out();
        if bbox.is_empty() || bbox.width() > 4096 || bbox.height() > 4096 {
            return None;
        }

        let flat = flatten::flatten(&device_path, FLATNESS);
        let segments = match stroke {
            Some(stroke) => {
                let width = (stroke.line_width * 1.0).max(0.8);
                flatten::stroke_outline(&flat, stroke, width)
            },
            None => flat.fill_segments(),
        };

        let grow = IRect::new(bbox.x0 - 2, bbox.y0 - 2, bbox.x1 + 2, bbox.y1 + 2);
        let mut mask = Pixmap::mask(grow);
        let mask_w = mask.w as usize;
        scan::fill_segments(&segments, grow, false, self.aa_level, &mut |y, x0, cov| {
            let row = (y - grow.y0) as usize;
            for (i, &c) in cov.iter().enumerate() {
                let x = (x0 + i as i32 - grow.x0) as usize;
                mask.samples[row * mask_w + x] = c;
            }
        });

        let glyph = CachedGlyph {
            left: grow.x0,
            top: grow.y0,
            mask: Arc::new(mask),
        };
        if let Ok(mut cache) = self.glyph_cache.lock() {
            cache.put(key, glyph.clone());
        }
        Some((glyph, origin_x as i32, origin_y as i32))
    }

    /// Composite a glyph mask with the paint color.
    fn paint_glyph(&mut self, glyph: &CachedGlyph, dx: i32, dy: i32, paint: &Paint) {
        let bounds = self.bounds();
        let w = self.page_w();
        let color = paint.rgba8();
        let alpha = paint.alpha8();
        let blend = paint.blend;
        let scissor = self.scissor;

        let mask = self.mask.take();
        {
            let layer = self.layers.last_mut().expect("layer");
            let n = layer.pixmap.n as usize;
            for my in 0..glyph.mask.h as i32 {
                let py = glyph.top + dy + my;
                if py < scissor.y0 || py >= scissor.y1 {
                    continue;
                }
                for mx in 0..glyph.mask.w as i32 {
                    let px = glyph.left + dx + mx;
                    if px < scissor.x0 || px >= scissor.x1 {
                        continue;
                    }
                    let cov =
                        glyph.mask.samples[(my as u32 * glyph.mask.w + mx as u32) as usize];
                    if cov == 0 {
                        continue;
                    }
                    let page_index =
                        (py - bounds.y0) as usize * w + (px - bounds.x0) as usize;
                    let clip = mask.as_ref().map_or(255, |m| m[page_index]);
                    if clip == 0 {
                        continue;
                    }
                    let cov = (cov as u32 * clip as u32 / 255) as u8;
                    let at = page_index * n;
                    pixel_over(&mut layer.pixmap.samples[at..at + n], color, cov, alpha, blend);
                }
            }
        }
        self.mask = mask;
    }

    fn draw_text(
        &mut self,
        span: &TextSpan,
        ctm: &Matrix,
        paint: &Paint,
        stroke: Option<&StrokeState>,
    ) -> Result<()> {
        let mut missing = 0usize;
        for item in &span.items {
            let trm = item.trm.concat(ctm);
            match self.glyph_mask(span, item.gid, &trm, stroke) {
                Some((glyph, dx, dy)) => self.paint_glyph(&glyph, dx, dy, paint),
                None => missing += 1,
            }
        }
        if missing > 0 {
            log::warn!(
                "{} of {} glyphs not rasterizable in font {}",
                missing,
                span.items.len(),
                span.font.base_font
            );
        }
        Ok(())
    }

    /// Sample a stencil/image mask along the inverse transform, calling
    /// `apply(page_index, coverage)`.
    fn sample_mask(
        &self,
        mask_pm: &Pixmap,
        ctm: &Matrix,
        mut apply: impl FnMut(usize, u8),
    ) {
        let flip = Matrix::new(1.0, 0.0, 0.0, -1.0, 0.0, 1.0).concat(ctm);
        let Some(inv) = flip.invert() else { return };
        let bounds = self.bounds();
        let w = self.page_w();
        let area = flip
            .transform_rect(Rect::new(0.0, 0.0, 1.0, 1.0))
            .round_out()
            .intersect(self.scissor);
        for py in area.y0..area.y1 {
            for px in area.x0..area.x1 {
                let p = inv.transform_point(Point::new(px as f32 + 0.5, py as f32 + 0.5));
                if !(0.0..1.0).contains(&p.x) || !(0.0..1.0).contains(&p.y) {
                    continue;
                }
                let sx = ((p.x * mask_pm.w as f32) as u32).min(mask_pm.w - 1);
                let sy = ((p.y * mask_pm.h as f32) as u32).min(mask_pm.h - 1);
                let cov = mask_pm.samples[(sy * mask_pm.w + sx) as usize];
                if cov == 0 {
                    continue;
                }
                let page_index = (py - bounds.y0) as usize * w + (px - bounds.x0) as usize;
                apply(page_index, cov);
            }
        }
    }
}

impl Device for DrawDevice {
    fn caps(&self) -> DeviceCaps {
        DeviceCaps::TRANSPARENCY | DeviceCaps::CLIPPING
    }

    fn fill_path(&mut self, path: &Path, even_odd: bool, ctm: &Matrix, paint: &Paint) -> Result<()> {
        let segments = self.flatten_for(path, ctm).fill_segments();
        self.fill_segments(&segments, even_odd, paint);
        Ok(())
    }

    fn stroke_path(
        &mut self,
        path: &Path,
        stroke: &StrokeState,
        ctm: &Matrix,
        paint: &Paint,
    ) -> Result<()> {
        let segments = self.stroke_segments(path, stroke, ctm);
        self.fill_segments(&segments, false, paint);
        Ok(())
    }

    fn clip_path(&mut self, path: &Path, even_odd: bool, ctm: &Matrix) -> Result<()> {
        let segments = self.flatten_for(path, ctm).fill_segments();
        let coverage = self.rasterize_coverage(&segments, even_odd);
        let bbox = path
            .transform(ctm)
            .bounds()
            .round_out()
            .intersect(self.scissor);
        self.push_clip_coverage(coverage, bbox);
        Ok(())
    }

    fn clip_stroke_path(&mut self, path: &Path, stroke: &StrokeState, ctm: &Matrix) -> Result<()> {
        let segments = self.stroke_segments(path, stroke, ctm);
        let coverage = self.rasterize_coverage(&segments, false);
        self.push_clip_coverage(coverage, self.scissor);
        Ok(())
    }

    fn fill_text(&mut self, span: &TextSpan, ctm: &Matrix, paint: &Paint) -> Result<()> {
        self.draw_text(span, ctm, paint, None)
    }

    fn stroke_text(
        &mut self,
        span: &TextSpan,
        stroke: &StrokeState,
        ctm: &Matrix,
        paint: &Paint,
    ) -> Result<()> {
        self.draw_text(span, ctm, paint, Some(stroke))
    }

    fn clip_text(&mut self, span: &TextSpan, ctm: &Matrix) -> Result<()> {
        let bounds = self.bounds();
        let w = self.page_w();
        let mut coverage = vec![0u8; w * bounds.height().max(0) as usize];
        for item in &span.items {
            let trm = item.trm.concat(ctm);
            if let Some((glyph, dx, dy)) = self.glyph_mask(span, item.gid, &trm, None) {
                for my in 0..glyph.mask.h as i32 {
                    let py = glyph.top + dy + my;
                    if py < bounds.y0 || py >= bounds.y1 {
                        continue;
                    }
                    for mx in 0..glyph.mask.w as i32 {
                        let px = glyph.left + dx + mx;
                        if px < bounds.x0 || px >= bounds.x1 {
                            continue;
                        }
                        let cov =
                            glyph.mask.samples[(my as u32 * glyph.mask.w + mx as u32) as usize];
                        let at = (py - bounds.y0) as usize * w + (px - bounds.x0) as usize;
                        coverage[at] = coverage[at].max(cov);
                    }
                }
            }
        }
        self.push_clip_coverage(coverage, self.scissor);
        Ok(())
    }

    fn fill_shade(&mut self, shade: &Shading, ctm: &Matrix, alpha: f32) -> Result<()> {
        let Some(inv) = ctm.invert() else {
            return Ok(());
        };
        let area = match shade.bbox {
            Some(bbox) => ctm.transform_rect(bbox).round_out().intersect(self.scissor),
            None => self.scissor,
        };
        let bounds = self.bounds();
        let w = self.page_w();
        let alpha8 = (alpha.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;

        let mask = self.mask.take();
        {
            let layer = self.layers.last_mut().expect("layer");
            let n = layer.pixmap.n as usize;
            for py in area.y0..area.y1 {
                for px in area.x0..area.x1 {
                    let p = inv.transform_point(Point::new(px as f32 + 0.5, py as f32 + 0.5));
                    let rgb = match shade.param_at(p) {
                        Some(s) => shade.color_at(s),
                        None => match shade.background {
                            Some(bg) => bg,
                            None => continue,
                        },
                    };
                    let page_index = (py - bounds.y0) as usize * w + (px - bounds.x0) as usize;
                    let clip = mask.as_ref().map_or(255, |m| m[page_index]);
                    if clip == 0 {
                        continue;
                    }
                    let color = [
                        (rgb[0].clamp(0.0, 1.0) * 255.0 + 0.5) as u8,
                        (rgb[1].clamp(0.0, 1.0) * 255.0 + 0.5) as u8,
                        (rgb[2].clamp(0.0, 1.0) * 255.0 + 0.5) as u8,
                        255,
                    ];
                    let at = page_index * n;
                    pixel_over(
                        &mut layer.pixmap.samples[at..at + n],
                        color,
                        clip,
                        alpha8,
                        BlendMode::Normal,
                    );
                }
            }
        }
        self.mask = mask;
        Ok(())
    }

    fn fill_image(&mut self, image: &Image, ctm: &Matrix, alpha: f32) -> Result<()> {
        let decoded = match image.to_pixmap() {
            Ok(pm) => pm,
            Err(e) if matches!(e.root_cause(), Error::Unsupported(_)) => {
                log::warn!("image not drawn: {e}");
                return Ok(());
            },
            Err(e) => return Err(e),
        };
        // Image space has row 0 at the top of the unit square
        let flip = Matrix::new(1.0, 0.0, 0.0, -1.0, 0.0, 1.0).concat(ctm);
        let alpha8 = (alpha.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;

        let mask = self.mask.take();
        let scissor = self.scissor;
        {
            let layer = self.layers.last_mut().expect("layer");
            crate::raster::affine::paint_image(
                &mut layer.pixmap,
                scissor,
                mask.as_deref(),
                &decoded,
                &flip,
                alpha8,
                image.interpolate,
                BlendMode::Normal,
            );
        }
        self.mask = mask;
        Ok(())
    }

    fn fill_image_mask(&mut self, image: &Image, ctm: &Matrix, paint: &Paint) -> Result<()> {
        let stencil = match image.to_pixmap() {
            Ok(pm) => pm,
            Err(e) => {
                log::warn!("image mask not drawn: {e}");
                return Ok(());
            },
        };
        let color = paint.rgba8();
        let alpha = paint.alpha8();
        let blend = paint.blend;

        let mask = self.mask.take();
        // Collect target pixels first; sample_mask borrows self immutably
        let mut hits: Vec<(usize, u8)> = Vec::new();
        self.sample_mask(&stencil, ctm, |page_index, cov| {
            hits.push((page_index, cov));
        });
        {
            let layer = self.layers.last_mut().expect("layer");
            let n = layer.pixmap.n as usize;
            for (page_index, cov) in hits {
                let clip = mask.as_ref().map_or(255, |m| m[page_index]);
                if clip == 0 {
                    continue;
                }
                let cov = (cov as u32 * clip as u32 / 255) as u8;
                let at = page_index * n;
                pixel_over(&mut layer.pixmap.samples[at..at + n], color, cov, alpha, blend);
            }
        }
        self.mask = mask;
        Ok(())
    }

    fn clip_image_mask(&mut self, image: &Image, ctm: &Matrix) -> Result<()> {
        let stencil = match image.to_pixmap() {
            Ok(pm) => pm,
            Err(e) => {
                log::warn!("image mask clip unavailable ({e}), clipping to its box");
                let bbox = ctm
                    .transform_rect(Rect::new(0.0, 0.0, 1.0, 1.0))
                    .round_out()
                    .intersect(self.scissor);
                let coverage =
                    vec![255u8; self.page_w() * self.bounds().height().max(0) as usize];
                self.push_clip_coverage(coverage, bbox);
                return Ok(());
            },
        };
        let bounds = self.bounds();
        let w = self.page_w();
        let mut coverage = vec![0u8; w * bounds.height().max(0) as usize];
        self.sample_mask(&stencil, ctm, |page_index, cov| {
            coverage[page_index] = cov;
        });
        let bbox = ctm
            .transform_rect(Rect::new(0.0, 0.0, 1.0, 1.0))
            .round_out()
            .intersect(self.scissor);
        self.push_clip_coverage(coverage, bbox);
        Ok(())
    }

    fn pop_clip(&mut self) -> Result<()> {
        match self.clip_stack.pop() {
            Some(entry) => {
                self.scissor = entry.prev_scissor;
                self.mask = entry.prev_mask;
            },
            None => log::warn!("pop_clip on empty clip stack"),
        }
        Ok(())
    }

    fn begin_mask(&mut self, _bbox: Rect, luminosity: bool, backdrop: [f32; 3]) -> Result<()> {
        let mut pixmap = Pixmap::rgba(self.bounds());
        if luminosity {
            // Luminosity masks start from the backdrop color
            let bg = [
                (backdrop[0].clamp(0.0, 1.0) * 255.0) as u8,
                (backdrop[1].clamp(0.0, 1.0) * 255.0) as u8,
                (backdrop[2].clamp(0.0, 1.0) * 255.0) as u8,
                255,
            ];
            for px in pixmap.samples.chunks_exact_mut(4) {
                px.copy_from_slice(&bg);
            }
        }
        self.layers.push(Layer {
            pixmap,
            kind: LayerKind::Mask { luminosity },
        });
        Ok(())
    }

    fn end_mask(&mut self) -> Result<()> {
        let Some(layer) = self.layers.pop() else {
            return Err(Error::range("end_mask without begin_mask"));
        };
        let LayerKind::Mask { luminosity } = layer.kind else {
            self.layers.push(layer);
            return Err(Error::range("end_mask closes a non-mask layer"));
        };
        let coverage: Vec<u8> = layer
            .pixmap
            .samples
            .chunks_exact(4)
            .map(|px| {
                if luminosity {
                    // Un-premultiplied luminosity over black backdrop
                    ((px[0] as u32 * 77 + px[1] as u32 * 151 + px[2] as u32 * 28) >> 8) as u8
                } else {
                    px[3]
                }
            })
            .collect();
        self.push_clip_coverage(coverage, self.scissor);
        Ok(())
    }

    fn begin_group(
        &mut self,
        _bbox: Rect,
        isolated: bool,
        knockout: bool,
        blend: BlendMode,
        alpha: f32,
    ) -> Result<()> {
        if knockout {
            log::debug!("knockout group composited as non-knockout");
        }
        let pixmap = if isolated {
            Pixmap::rgba(self.bounds())
        } else {
            // Non-isolated groups start from the backdrop; the composite
            // step at end_group uses plain over, which keeps this correct
            // only for Normal blending of the common case
            self.layers.last().expect("layer").pixmap.clone()
        };
        self.layers.push(Layer {
            pixmap,
            kind: LayerKind::Group { blend, alpha },
        });
        Ok(())
    }

    fn end_group(&mut self) -> Result<()> {
        if self.layers.len() < 2 {
            return Err(Error::range("end_group without begin_group"));
        }
        let layer = self.layers.pop().expect("checked");
        let LayerKind::Group { blend, alpha } = layer.kind else {
            self.layers.push(layer);
            return Err(Error::range("end_group closes a non-group layer"));
        };
        let alpha8 = (alpha.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
        let target = &mut self.layers.last_mut().expect("layer").pixmap;
        for (dst, src) in target
            .samples
            .chunks_exact_mut(4)
            .zip(layer.pixmap.samples.chunks_exact(4))
        {
            if src[3] != 0 {
                pixel_over(dst, [src[0], src[1], src[2], src[3]], 255, alpha8, blend);
            }
        }
        Ok(())
    }
}
