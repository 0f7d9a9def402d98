//! Display-list device: records device calls for later replay.
//!
//! Serializes the call sequence into a value list that can be replayed
//! into any other device. Used for Type 3 glyph replay and anywhere a
//! content stream should be interpreted once and drawn many times.

use super::{Device, Paint, TextSpan};
use crate::error::Result;
use crate::geometry::{Matrix, Rect};
use crate::image::Image;
use crate::raster::blend::BlendMode;
use crate::raster::path::{Path, StrokeState};
use crate::shade::Shading;
use std::sync::Arc;

/// One recorded device call.
#[derive(Debug, Clone)]
pub enum ListItem {
    /// fill_path
    FillPath(Path, bool, Matrix, Paint),
    /// stroke_path
    StrokePath(Path, StrokeState, Matrix, Paint),
    /// clip_path
    ClipPath(Path, bool, Matrix),
    /// clip_stroke_path
    ClipStrokePath(Path, StrokeState, Matrix),
    /// fill_text
    FillText(TextSpan, Matrix, Paint),
    /// stroke_text
    StrokeText(TextSpan, StrokeState, Matrix, Paint),
    /// clip_text
    ClipText(TextSpan, Matrix),
    /// ignore_text
    IgnoreText(TextSpan, Matrix),
    /// fill_shade
    FillShade(Arc<Shading>, Matrix, f32),
    /// fill_image
    FillImage(Arc<Image>, Matrix, f32),
    /// fill_image_mask
    FillImageMask(Arc<Image>, Matrix, Paint),
    /// clip_image_mask
    ClipImageMask(Arc<Image>, Matrix),
    /// pop_clip
    PopClip,
    /// begin_mask
    BeginMask(Rect, bool, [f32; 3]),
    /// end_mask
    EndMask,
    /// begin_group
    BeginGroup(Rect, bool, bool, BlendMode, f32),
    /// end_group
    EndGroup,
    /// begin_tile
    BeginTile(Rect, Rect, f32, f32, Matrix),
    /// end_tile
    EndTile,
}

/// A recorded display list.
#[derive(Debug, Default)]
pub struct DisplayList {
    /// The calls in order
    pub items: Vec<ListItem>,
}

impl DisplayList {
    /// Replay every recorded call into `device`.
    pub fn replay(&self, device: &mut dyn Device) -> Result<()> {
        for item in &self.items {
            match item {
                ListItem::FillPath(path, eo, ctm, paint) => {
                    device.fill_path(path, *eo, ctm, paint)?;
                },
                ListItem::StrokePath(path, stroke, ctm, paint) => {
                    device.stroke_path(path, stroke, ctm, paint)?;
                },
                ListItem::ClipPath(path, eo, ctm) => device.clip_path(path, *eo, ctm)?,
                ListItem::ClipStrokePath(path, stroke, ctm) => {
                    device.clip_stroke_path(path, stroke, ctm)?;
                },
                ListItem::FillText(span, ctm, paint) => device.fill_text(span, ctm, paint)?,
                ListItem::StrokeText(span, stroke, ctm, paint) => {
                    device.stroke_text(span, stroke, ctm, paint)?;
                },
                ListItem::ClipText(span, ctm) => device.clip_text(span, ctm)?,
                ListItem::IgnoreText(span, ctm) => device.ignore_text(span, ctm)?,
                ListItem::FillShade(shade, ctm, alpha) => device.fill_shade(shade, ctm, *alpha)?,
                ListItem::FillImage(image, ctm, alpha) => device.fill_image(image, ctm, *alpha)?,
                ListItem::FillImageMask(image, ctm, paint) => {
                    device.fill_image_mask(image, ctm, paint)?;
                },
                ListItem::ClipImageMask(image, ctm) => device.clip_image_mask(image, ctm)?,
                ListItem::PopClip => device.pop_clip()?,
                ListItem::BeginMask(bbox, lum, bc) => device.begin_mask(*bbox, *lum, *bc)?,
                ListItem::EndMask => device.end_mask()?,
                ListItem::BeginGroup(bbox, iso, ko, blend, alpha) => {
                    device.begin_group(*bbox, *iso, *ko, *blend, *alpha)?;
                },
                ListItem::EndGroup => device.end_group()?,
                ListItem::BeginTile(area, view, xs, ys, ctm) => {
                    device.begin_tile(*area, *view, *xs, *ys, ctm)?;
                },
                ListItem::EndTile => device.end_tile()?,
            }
        }
        Ok(())
    }
}

/// Device that records into a [`DisplayList`].
#[derive(Debug, Default)]
pub struct ListDevice {
    /// The list under construction
    pub list: DisplayList,
}

impl ListDevice {
    /// A fresh recording device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the finished list.
    pub fn into_list(self) -> DisplayList {
        self.list
    }
}

impl Device for ListDevice {
    fn caps(&self) -> super::DeviceCaps {
        super::DeviceCaps::TRANSPARENCY | super::DeviceCaps::CLIPPING | super::DeviceCaps::WANTS_TEXT
    }

    fn fill_path(&mut self, path: &Path, even_odd: bool, ctm: &Matrix, paint: &Paint) -> Result<()> {
        self.list
            .items
            .push(ListItem::FillPath(path.clone(), even_odd, *ctm, *paint));
        Ok(())
    }

    fn stroke_path(
        &mut self,
        path: &Path,
        stroke: &StrokeState,
        ctm: &Matrix,
        paint: &Paint,
    ) -> Result<()> {
        self.list.items.push(ListItem::StrokePath(
            path.clone(),
            stroke.clone(),
            *ctm,
            *paint,
        ));
        Ok(())
    }

    fn clip_path(&mut self, path: &Path, even_odd: bool, ctm: &Matrix) -> Result<()> {
        self.list
            .items
            .push(ListItem::ClipPath(path.clone(), even_odd, *ctm));
        Ok(())
    }

    fn clip_stroke_path(&mut self, path: &Path, stroke: &StrokeState, ctm: &Matrix) -> Result<()> {
        self.list
            .items
            .push(ListItem::ClipStrokePath(path.clone(), stroke.clone(), *ctm));
        Ok(())
    }

    fn fill_text(&mut self, span: &TextSpan, ctm: &Matrix, paint: &Paint) -> Result<()> {
        self.list
            .items
            .push(ListItem::FillText(span.clone(), *ctm, *paint));
        Ok(())
    }

    fn stroke_text(
        &mut self,
        span: &TextSpan,
        stroke: &StrokeState,
        ctm: &Matrix,
        paint: &Paint,
    ) -> Result<()> {
        self.list.items.push(ListItem::StrokeText(
            span.clone(),
            stroke.clone(),
            *ctm,
            *paint,
        ));
        Ok(())
    }

    fn clip_text(&mut self, span: &TextSpan, ctm: &Matrix) -> Result<()> {
        self.list.items.push(ListItem::ClipText(span.clone(), *ctm));
        Ok(())
    }

    fn ignore_text(&mut self, span: &TextSpan, ctm: &Matrix) -> Result<()> {
        self.list.items.push(ListItem::IgnoreText(span.clone(), *ctm));
        Ok(())
    }

    fn fill_shade(&mut self, shade: &Shading, ctm: &Matrix, alpha: f32) -> Result<()> {
        self.list
            .items
            .push(ListItem::FillShade(Arc::new(shade.clone()), *ctm, alpha));
        Ok(())
    }

    fn fill_image(&mut self, image: &Image, ctm: &Matrix, alpha: f32) -> Result<()> {
        self.list
            .items
            .push(ListItem::FillImage(clone_image(image), *ctm, alpha));
        Ok(())
    }

    fn fill_image_mask(&mut self, image: &Image, ctm: &Matrix, paint: &Paint) -> Result<()> {
        self.list
            .items
            .push(ListItem::FillImageMask(clone_image(image), *ctm, *paint));
        Ok(())
    }

    fn clip_image_mask(&mut self, image: &Image, ctm: &Matrix) -> Result<()> {
        self.list
            .items
            .push(ListItem::ClipImageMask(clone_image(image), *ctm));
        Ok(())
    }

    fn pop_clip(&mut self) -> Result<()> {
        self.list.items.push(ListItem::PopClip);
        Ok(())
    }

    fn begin_mask(&mut self, bbox: Rect, luminosity: bool, backdrop: [f32; 3]) -> Result<()> {
        self.list
            .items
            .push(ListItem::BeginMask(bbox, luminosity, backdrop));
        Ok(())
    }

    fn end_mask(&mut self) -> Result<()> {
        self.list.items.push(ListItem::EndMask);
        Ok(())
    }

    fn begin_group(
        &mut self,
        bbox: Rect,
        isolated: bool,
        knockout: bool,
        blend: BlendMode,
        alpha: f32,
    ) -> Result<()> {
        self.list
            .items
            .push(ListItem::BeginGroup(bbox, isolated, knockout, blend, alpha));
        Ok(())
    }

    fn end_group(&mut self) -> Result<()> {
        self.list.items.push(ListItem::EndGroup);
        Ok(())
    }

    fn begin_tile(
        &mut self,
        area: Rect,
        view: Rect,
        xstep: f32,
        ystep: f32,
        ctm: &Matrix,
    ) -> Result<i32> {
        self.list
            .items
            .push(ListItem::BeginTile(area, view, xstep, ystep, *ctm));
        Ok(0)
    }

    fn end_tile(&mut self) -> Result<()> {
        self.list.items.push(ListItem::EndTile);
        Ok(())
    }
}

/// Images arrive by reference; the list needs shared ownership.
fn clone_image(image: &Image) -> Arc<Image> {
    Arc::new(Image {
        width: image.width,
        height: image.height,
        bpc: image.bpc,
        colorspace: image.colorspace.clone(),
        decode: image.decode.clone(),
        smask: image.smask.clone(),
        color_key: image.color_key.clone(),
        image_mask: image.image_mask,
        interpolate: image.interpolate,
        data: image.data.clone(),
        recipe: image.recipe.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_replay_paths() {
        let mut recorder = ListDevice::new();
        let mut p = Path::new();
        p.rect(0.0, 0.0, 5.0, 5.0);
        recorder
            .fill_path(&p, true, &Matrix::IDENTITY, &Paint::black())
            .unwrap();
        recorder.pop_clip().unwrap();
        let list = recorder.into_list();
        assert_eq!(list.items.len(), 2);

        // Replay into a bbox device and check the same drawing happened
        let mut bbox = crate::device::bbox::BboxDevice::new();
        list.replay(&mut bbox).unwrap();
        assert_eq!(bbox.bounds, Rect::new(0.0, 0.0, 5.0, 5.0));
    }

    #[test]
    fn test_replay_preserves_order() {
        let mut recorder = ListDevice::new();
        recorder
            .begin_group(Rect::new(0.0, 0.0, 1.0, 1.0), true, false, BlendMode::Normal, 1.0)
            .unwrap();
        recorder.end_group().unwrap();
        let list = recorder.into_list();
        assert!(matches!(list.items[0], ListItem::BeginGroup(..)));
        assert!(matches!(list.items[1], ListItem::EndGroup));
    }
}
