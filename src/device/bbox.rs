//! Bounding-box device: accumulates the rectangle everything draws into.
//!
//! Used for Type 3 glyph bounds derivation and by callers that want the
//! ink extent of a page without rasterizing it.

use super::{Device, Paint, TextSpan};
use crate::error::Result;
use crate::geometry::{Matrix, Rect};
use crate::image::Image;
use crate::raster::path::{Path, StrokeState};
use crate::shade::Shading;

/// Accumulates the union of everything drawn.
#[derive(Debug, Default)]
pub struct BboxDevice {
    /// The accumulated bounds (empty when nothing drew)
    pub bounds: Rect,
    /// Clip nesting: bounds are not extended while a zero-area clip rules
    clip_stack: Vec<Rect>,
}

impl BboxDevice {
    /// A fresh device with empty bounds.
    pub fn new() -> Self {
        Self {
            bounds: Rect::EMPTY,
            clip_stack: Vec::new(),
        }
    }

    fn add(&mut self, r: Rect) {
        let r = match self.clip_stack.last() {
            Some(clip) => r.intersect(*clip),
            None => r,
        };
        if !r.is_empty() {
            self.bounds = self.bounds.union(r);
        }
    }
}

impl Device for BboxDevice {
    fn fill_path(&mut self, path: &Path, _even_odd: bool, ctm: &Matrix, _paint: &Paint) -> Result<()> {
        self.add(ctm.transform_rect(path.bounds()));
        Ok(())
    }

    fn stroke_path(
        &mut self,
        path: &Path,
        stroke: &StrokeState,
        ctm: &Matrix,
        _paint: &Paint,
    ) -> Result<()> {
        let mut r = path.bounds();
        let pad = stroke.line_width * 0.5;
        r.x0 -= pad;
        r.y0 -= pad;
        r.x1 += pad;
        r.y1 += pad;
        self.add(ctm.transform_rect(r));
        Ok(())
    }

    fn clip_path(&mut self, path: &Path, _even_odd: bool, ctm: &Matrix) -> Result<()> {
        let r = ctm.transform_rect(path.bounds());
        let r = match self.clip_stack.last() {
            Some(outer) => r.intersect(*outer),
            None => r,
        };
        self.clip_stack.push(r);
        Ok(())
    }

    fn clip_stroke_path(&mut self, path: &Path, _stroke: &StrokeState, ctm: &Matrix) -> Result<()> {
        self.clip_path(path, false, ctm)
    }

    fn fill_text(&mut self, span: &TextSpan, ctm: &Matrix, _paint: &Paint) -> Result<()> {
        for item in &span.items {
            // Approximate each glyph with its em box
            let trm = item.trm.concat(ctm);
            self.add(trm.transform_rect(Rect::new(0.0, -0.2, 1.0, 1.0)));
        }
        Ok(())
    }

    fn stroke_text(
        &mut self,
        span: &TextSpan,
        _stroke: &StrokeState,
        ctm: &Matrix,
        paint: &Paint,
    ) -> Result<()> {
        self.fill_text(span, ctm, paint)
    }

    fn clip_text(&mut self, span: &TextSpan, ctm: &Matrix) -> Result<()> {
        let mut r = Rect::EMPTY;
        for item in &span.items {
            let trm = item.trm.concat(ctm);
            r = r.union(trm.transform_rect(Rect::new(0.0, -0.2, 1.0, 1.0)));
        }
        let r = match self.clip_stack.last() {
            Some(outer) => r.intersect(*outer),
            None => r,
        };
        self.clip_stack.push(r);
        Ok(())
    }

    fn fill_shade(&mut self, shade: &Shading, ctm: &Matrix, _alpha: f32) -> Result<()> {
        let r = shade.bbox.unwrap_or(Rect::new(-1e6, -1e6, 1e6, 1e6));
        self.add(ctm.transform_rect(r));
        Ok(())
    }

    fn fill_image(&mut self, _image: &Image, ctm: &Matrix, _alpha: f32) -> Result<()> {
        self.add(ctm.transform_rect(Rect::new(0.0, 0.0, 1.0, 1.0)));
        Ok(())
    }

    fn fill_image_mask(&mut self, _image: &Image, ctm: &Matrix, _paint: &Paint) -> Result<()> {
        self.add(ctm.transform_rect(Rect::new(0.0, 0.0, 1.0, 1.0)));
        Ok(())
    }

    fn clip_image_mask(&mut self, _image: &Image, ctm: &Matrix) -> Result<()> {
        let r = ctm.transform_rect(Rect::new(0.0, 0.0, 1.0, 1.0));
        let r = match self.clip_stack.last() {
            Some(outer) => r.intersect(*outer),
            None => r,
        };
        self.clip_stack.push(r);
        Ok(())
    }

    fn pop_clip(&mut self) -> Result<()> {
        self.clip_stack.pop();
        Ok(())
    }
}
