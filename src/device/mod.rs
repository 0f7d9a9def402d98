//! Device abstraction: the callback surface the interpreter drives.
//!
//! Concrete devices rasterize (draw), record (list), extract text (text),
//! or accumulate bounds (bbox). A device advertises capability flags; the
//! interpreter consults them to decide, for instance, whether transparency
//! groups need flattening.

pub mod bbox;
pub mod draw;
pub mod list;
pub mod text;

use crate::error::Result;
use crate::fonts::Font;
use crate::geometry::{Matrix, Rect};
use crate::image::Image;
use crate::raster::blend::BlendMode;
use crate::raster::path::{Path, StrokeState};
use crate::shade::Shading;
use bitflags::bitflags;
use std::sync::Arc;

bitflags! {
    /// Capabilities a device advertises to the interpreter.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceCaps: u32 {
        /// Groups and soft masks are composited natively
        const TRANSPARENCY = 1 << 0;
        /// Clip calls are honored (vector devices)
        const CLIPPING = 1 << 1;
        /// Wants text calls even in invisible render modes
        const WANTS_TEXT = 1 << 2;
    }
}

/// Resolved paint parameters for a fill or stroke call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Paint {
    /// Device RGB color in 0..=1
    pub rgb: [f32; 3],
    /// Constant alpha in 0..=1
    pub alpha: f32,
    /// Blend mode from the graphics state
    pub blend: BlendMode,
}

impl Paint {
    /// Opaque black with normal blending.
    pub fn black() -> Self {
        Paint {
            rgb: [0.0, 0.0, 0.0],
            alpha: 1.0,
            blend: BlendMode::Normal,
        }
    }

    /// The color as premultiplied RGBA bytes (before coverage).
    pub fn rgba8(&self) -> [u8; 4] {
        [
            (self.rgb[0].clamp(0.0, 1.0) * 255.0 + 0.5) as u8,
            (self.rgb[1].clamp(0.0, 1.0) * 255.0 + 0.5) as u8,
            (self.rgb[2].clamp(0.0, 1.0) * 255.0 + 0.5) as u8,
            255,
        ]
    }

    /// Constant alpha as a byte.
    pub fn alpha8(&self) -> u8 {
        (self.alpha.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
    }
}

/// One positioned glyph within a text span.
#[derive(Debug, Clone)]
pub struct TextItem {
    /// Glyph index in the font program
    pub gid: u16,
    /// CID / character code
    pub cid: u32,
    /// Unicode mapping for extraction, when known
    pub unicode: Option<String>,
    /// Glyph-space to user-space transform (font size, Tm, rise applied;
    /// the CTM is passed separately)
    pub trm: Matrix,
}

/// A run of glyphs sharing one font and writing mode.
#[derive(Debug, Clone)]
pub struct TextSpan {
    /// The font resource
    pub font: Arc<Font>,
    /// Writing mode: 0 horizontal, 1 vertical
    pub wmode: u8,
    /// The glyphs
    pub items: Vec<TextItem>,
}

/// The device interface the interpreter calls.
///
/// Every method has a no-op default so special-purpose devices implement
/// only what they observe.
#[allow(unused_variables)]
pub trait Device {
    /// Capability flags.
    fn caps(&self) -> DeviceCaps {
        DeviceCaps::empty()
    }

    /// Fill a path.
    fn fill_path(&mut self, path: &Path, even_odd: bool, ctm: &Matrix, paint: &Paint) -> Result<()> {
        Ok(())
    }

    /// Stroke a path.
    fn stroke_path(
        &mut self,
        path: &Path,
        stroke: &StrokeState,
        ctm: &Matrix,
        paint: &Paint,
    ) -> Result<()> {
        Ok(())
    }

    /// Intersect the clip with a filled path.
    fn clip_path(&mut self, path: &Path, even_odd: bool, ctm: &Matrix) -> Result<()> {
        Ok(())
    }

    /// Intersect the clip with a stroked path.
    fn clip_stroke_path(&mut self, path: &Path, stroke: &StrokeState, ctm: &Matrix) -> Result<()> {
        Ok(())
    }

    /// Fill glyphs.
    fn fill_text(&mut self, span: &TextSpan, ctm: &Matrix, paint: &Paint) -> Result<()> {
        Ok(())
    }

    /// Stroke glyph outlines.
    fn stroke_text(
        &mut self,
        span: &TextSpan,
        stroke: &StrokeState,
        ctm: &Matrix,
        paint: &Paint,
    ) -> Result<()> {
        Ok(())
    }

    /// Accumulate glyphs into the clip.
    fn clip_text(&mut self, span: &TextSpan, ctm: &Matrix) -> Result<()> {
        Ok(())
    }

    /// Invisible text (render mode 3): devices that extract still observe.
    fn ignore_text(&mut self, span: &TextSpan, ctm: &Matrix) -> Result<()> {
        Ok(())
    }

    /// Paint a shading.
    fn fill_shade(&mut self, shade: &Shading, ctm: &Matrix, alpha: f32) -> Result<()> {
        Ok(())
    }

    /// Paint an image; `ctm` maps the unit square to the image placement.
    fn fill_image(&mut self, image: &Image, ctm: &Matrix, alpha: f32) -> Result<()> {
        Ok(())
    }

    /// Paint a stencil mask with the given paint.
    fn fill_image_mask(&mut self, image: &Image, ctm: &Matrix, paint: &Paint) -> Result<()> {
        Ok(())
    }

    /// Intersect the clip with a stencil mask.
    fn clip_image_mask(&mut self, image: &Image, ctm: &Matrix) -> Result<()> {
        Ok(())
    }

    /// Pop one clip entry (matches any clip_* or an end_mask).
    fn pop_clip(&mut self) -> Result<()> {
        Ok(())
    }

    /// Begin rendering a soft-mask group; until end_mask, drawing defines
    /// the mask.
    fn begin_mask(&mut self, bbox: Rect, luminosity: bool, backdrop: [f32; 3]) -> Result<()> {
        Ok(())
    }

    /// Finish the soft-mask group and start clipping through it.
    fn end_mask(&mut self) -> Result<()> {
        Ok(())
    }

    /// Begin a transparency group.
    fn begin_group(
        &mut self,
        bbox: Rect,
        isolated: bool,
        knockout: bool,
        blend: BlendMode,
        alpha: f32,
    ) -> Result<()> {
        Ok(())
    }

    /// Composite the current group onto its backdrop.
    fn end_group(&mut self) -> Result<()> {
        Ok(())
    }

    /// Begin a tiling-pattern cell. Returning 0 asks the interpreter to
    /// replay the cell per tile; non-zero means the device cached it.
    fn begin_tile(
        &mut self,
        area: Rect,
        view: Rect,
        xstep: f32,
        ystep: f32,
        ctm: &Matrix,
    ) -> Result<i32> {
        Ok(0)
    }

    /// End a tiling-pattern cell.
    fn end_tile(&mut self) -> Result<()> {
        Ok(())
    }

    /// Flush and finish; called once after the last operator.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullDevice;
    impl Device for NullDevice {}

    #[test]
    fn test_default_device_is_inert() {
        let mut dev = NullDevice;
        let path = Path::new();
        assert!(dev
            .fill_path(&path, false, &Matrix::IDENTITY, &Paint::black())
            .is_ok());
        assert!(dev.pop_clip().is_ok());
        assert_eq!(dev.begin_tile(Rect::EMPTY, Rect::EMPTY, 1.0, 1.0, &Matrix::IDENTITY).unwrap(), 0);
        assert!(dev.caps().is_empty());
    }

    #[test]
    fn test_paint_conversion() {
        let paint = Paint {
            rgb: [1.0, 0.0, 0.5],
            alpha: 0.5,
            blend: BlendMode::Normal,
        };
        assert_eq!(paint.rgba8(), [255, 0, 128, 255]);
        assert_eq!(paint.alpha8(), 128);
    }
}
