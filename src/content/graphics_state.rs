//! Graphics state: everything `q` saves and `Q` restores.

use crate::colorspace::Colorspace;
use crate::fonts::Font;
use crate::geometry::Matrix;
use crate::raster::blend::BlendMode;
use crate::raster::path::StrokeState;
use crate::shade::Shading;
use std::sync::Arc;

/// A loaded pattern resource, referenced by `scn`.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// PatternType 1: a content-stream cell tiled over the fill area
    Tiling {
        /// Decoded cell content
        content: Arc<Vec<u8>>,
        /// Cell resources
        resources: crate::object::Dict,
        /// Cell bounding box in pattern space
        bbox: crate::geometry::Rect,
        /// Horizontal tile step
        xstep: f32,
        /// Vertical tile step
        ystep: f32,
        /// Pattern space to default user space
        matrix: Matrix,
        /// 1 = colored, 2 = uncolored (painted with the current color)
        paint_type: i64,
    },
    /// PatternType 2: a shading
    Shading {
        /// The shading
        shading: Arc<Shading>,
        /// Pattern space to default user space
        matrix: Matrix,
    },
}

/// One color binding: colorspace, components, optional pattern.
#[derive(Debug, Clone)]
pub struct ColorState {
    /// The active colorspace
    pub colorspace: Arc<Colorspace>,
    /// Component values
    pub comps: Vec<f32>,
    /// Active pattern when the colorspace is Pattern
    pub pattern: Option<Pattern>,
}

impl ColorState {
    /// Device gray black, the initial color.
    pub fn black() -> Self {
        Self {
            colorspace: Arc::new(Colorspace::DeviceGray),
            comps: vec![0.0],
            pattern: None,
        }
    }

    /// Resolve to device RGB.
    pub fn rgb(&self) -> [f32; 3] {
        self.colorspace.to_rgb(&self.comps)
    }
}

/// The text-state sub-record of the graphics state.
#[derive(Debug, Clone)]
pub struct TextState {
    /// Current font, once Tf ran
    pub font: Option<Arc<Font>>,
    /// Font size
    pub size: f32,
    /// Tc
    pub char_spacing: f32,
    /// Tw
    pub word_spacing: f32,
    /// Tz as a fraction (100% = 1.0)
    pub hscale: f32,
    /// TL
    pub leading: f32,
    /// Tr
    pub render_mode: i64,
    /// Ts
    pub rise: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font: None,
            size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            hscale: 1.0,
            leading: 0.0,
            render_mode: 0,
            rise: 0.0,
        }
    }
}

/// The full graphics state.
#[derive(Debug, Clone)]
pub struct GraphicsState {
    /// Current transformation matrix
    pub ctm: Matrix,
    /// Stroke color binding
    pub stroke_color: ColorState,
    /// Fill color binding
    pub fill_color: ColorState,
    /// Stroking alpha (CA)
    pub alpha_stroke: f32,
    /// Non-stroking alpha (ca)
    pub alpha_fill: f32,
    /// Blend mode (BM)
    pub blend: BlendMode,
    /// Stroke parameters
    pub stroke: StrokeState,
    /// Rendering intent name
    pub intent: String,
    /// Flatness tolerance
    pub flatness: f32,
    /// Text state sub-record
    pub text: TextState,
    /// Device clip entries owned by this state level (popped on restore)
    pub clip_depth: usize,
}

impl GraphicsState {
    /// The initial state for a content stream under `ctm`.
    pub fn new(ctm: Matrix) -> Self {
        Self {
            ctm,
            stroke_color: ColorState::black(),
            fill_color: ColorState::black(),
            alpha_stroke: 1.0,
            alpha_fill: 1.0,
            blend: BlendMode::Normal,
            stroke: StrokeState::default(),
            intent: "RelativeColorimetric".into(),
            flatness: 1.0,
            text: TextState::default(),
            clip_depth: 0,
        }
    }
}
