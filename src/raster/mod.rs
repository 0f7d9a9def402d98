//! Software rasterization: pixmaps, path flattening, scan conversion,
//! affine image painting, Porter-Duff compositing, and the glyph cache.

pub mod affine;
pub mod blend;
pub mod flatten;
pub mod glyph_cache;
pub mod path;
pub mod pixmap;
pub mod scan;

pub use blend::BlendMode;
pub use glyph_cache::GlyphCache;
pub use path::{Path, PathElement, StrokeState};
pub use pixmap::Pixmap;
