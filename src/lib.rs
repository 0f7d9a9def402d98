//! # pdf_raster
//!
//! A rasterizing PDF core: the object/xref layer (lexing, parsing, stream
//! filters, encryption, repair of damaged files), a content-stream
//! interpreter driving an abstract device interface, and a software draw
//! device (scan-converting rasterizer, affine image painter, Porter-Duff
//! compositor, glyph cache).
//!
//! ## Quick start
//!
//! ```no_run
//! use pdf_raster::{Document, RenderOptions, render_page};
//!
//! # fn main() -> pdf_raster::Result<()> {
//! let mut doc = Document::open("file.pdf")?;
//! let pixmap = render_page(&mut doc, 0, &RenderOptions::default())?;
//! println!("{}x{} pixels", pixmap.w, pixmap.h);
//! # Ok(())
//! # }
//! ```
//!
//! Text extraction goes through the same interpreter with the text device;
//! see [`extract_page_text`].

#![warn(missing_docs)]

pub mod colorspace;
pub mod content;
pub mod cookie;
pub mod decoders;
pub mod device;
pub mod document;
pub mod encryption;
pub mod error;
pub mod fonts;
pub mod function;
pub mod geometry;
pub mod image;
pub mod lexer;
pub mod names;
pub mod object;
pub mod objstm;
pub mod parser;
pub mod raster;
pub mod repair;
pub mod shade;
pub mod xref;

pub use cookie::Cookie;
pub use document::{Document, Page, RenderOptions};
pub use error::{Error, Result};
pub use geometry::{Matrix, Point, Rect};
pub use raster::pixmap::Pixmap;

use content::RunProcessor;
use device::draw::DrawDevice;
use device::text::{ExtractedSpan, TextDevice};

/// Render a page to an RGBA pixmap over a white backdrop.
///
/// This is the standard composition of the core: page construction, the
/// page-to-device transform, the run processor, and the draw device. The
/// resource store is aged after the render so repeated calls share fonts
/// and images without unbounded growth.
pub fn render_page(doc: &mut Document, page_index: usize, options: &RenderOptions<'_>) -> Result<Pixmap> {
    let page = doc.page(page_index)?;
    let (ctm, bounds) = page.transform(options.dpi);

    let mut device = DrawDevice::new(bounds, options.aa_level);
    device.clear_white();

    {
        let mut processor = RunProcessor::new(
            doc,
            &mut device,
            page.resources.clone(),
            ctm,
            options.event,
            options.cookie,
        );
        processor.run(&page.contents)?;
    }

    doc.age_store();
    Ok(device.into_pixmap())
}

/// Run a page through the text device, returning positioned spans.
pub fn extract_page_text(
    doc: &mut Document,
    page_index: usize,
    options: &RenderOptions<'_>,
) -> Result<Vec<ExtractedSpan>> {
    let page = doc.page(page_index)?;
    let (ctm, _) = page.transform(options.dpi);

    let mut device = TextDevice::new();
    {
        let mut processor = RunProcessor::new(
            doc,
            &mut device,
            page.resources.clone(),
            ctm,
            options.event,
            options.cookie,
        );
        processor.run(&page.contents)?;
    }
    doc.age_store();
    Ok(device.spans)
}
