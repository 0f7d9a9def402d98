//! The run processor: executes operator streams against a device.
//!
//! Maintains the graphics-state stack, the text object state, and
//! resource lookups; resolves colors, fonts, images, patterns, and
//! shadings; and drives the device callbacks. Per-operator errors are
//! caught by `process_stream` under the lenient policy; abort and I/O
//! errors propagate.

use super::graphics_state::{ColorState, GraphicsState, Pattern};
use super::operators::{Op, TextElement};
use super::optional_content::OptionalContent;
use super::processor::{Processor, process_stream};
use crate::colorspace::Colorspace;
use crate::cookie::Cookie;
use crate::device::{Device, DeviceCaps, Paint, TextItem, TextSpan};
use crate::document::{Document, Resource};
use crate::error::{Error, Result, ResultExt};
use crate::fonts::{Font, FontKind};
use crate::geometry::{Matrix, Point, Rect};
use crate::image::Image;
use crate::object::{Dict, DictExt, ObjRef, Object, Stream};
use crate::raster::blend::BlendMode;
use crate::raster::path::{LineCap, LineJoin, Path};
use crate::shade::Shading;
use bytes::Bytes;
use std::sync::Arc;

/// Maximum nesting of form XObjects, patterns, and Type 3 glyphs.
const MAX_NESTING: usize = 16;

/// Most pattern cells replayed for one fill.
const MAX_TILES: i64 = 4096;

/// Executes content streams against a device.
pub struct RunProcessor<'a> {
    doc: &'a mut Document,
    device: &'a mut dyn Device,
    cookie: Option<&'a Cookie>,
    oc: OptionalContent,
    event: String,
    strict: bool,

    /// CTM at the start of the page content (patterns anchor here)
    base_ctm: Matrix,
    resources: Vec<Dict>,
    gs: GraphicsState,
    gstack: Vec<GraphicsState>,

    path: Path,
    pending_clip: Option<bool>,

    in_text: bool,
    tm: Matrix,
    tlm: Matrix,
    text_clip_spans: Vec<TextSpan>,

    mc_depth: usize,
    hidden_from: Option<usize>,
    bx_depth: usize,
    nesting: usize,

    /// Type 3 glyph metrics captured from d0/d1 during a charproc run
    t3_advance: Option<(f32, f32)>,
}

impl<'a> RunProcessor<'a> {
    /// Build a run processor for one page's content.
    pub fn new(
        doc: &'a mut Document,
        device: &'a mut dyn Device,
        resources: Dict,
        ctm: Matrix,
        event: &str,
        cookie: Option<&'a Cookie>,
    ) -> Self {
        let oc = OptionalContent::load(doc);
        Self {
            doc,
            device,
            cookie,
            oc,
            event: event.to_string(),
            strict: false,
            base_ctm: ctm,
            resources: vec![resources],
            gs: GraphicsState::new(ctm),
            gstack: Vec::new(),
            path: Path::new(),
            pending_clip: None,
            in_text: false,
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            text_clip_spans: Vec::new(),
            mc_depth: 0,
            hidden_from: None,
            bx_depth: 0,
            nesting: 0,
            t3_advance: None,
        }
    }

    /// Propagate every error instead of the lenient per-operator policy.
    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    /// Execute a decoded content stream, then balance state.
    pub fn run(&mut self, content: &[u8]) -> Result<()> {
        let cookie = self.cookie;
        let strict = self.strict;
        process_stream(content, self, cookie, strict)
    }

    /// Execute a nested stream (form, pattern cell, charproc) without the
    /// final balancing.
    fn run_nested(&mut self, content: &[u8]) -> Result<()> {
        let cookie = self.cookie;
        let strict = self.strict;
        let mut nested = NestedRun { inner: self };
        process_stream(content, &mut nested, cookie, strict)
    }

    fn hidden(&self) -> bool {
        self.hidden_from.is_some()
    }

    fn fill_paint(&self) -> Paint {
        Paint {
            rgb: self.gs.fill_color.rgb(),
            alpha: self.gs.alpha_fill,
            blend: self.gs.blend,
        }
    }

    fn stroke_paint(&self) -> Paint {
        Paint {
            rgb: self.gs.stroke_color.rgb(),
            alpha: self.gs.alpha_stroke,
            blend: self.gs.blend,
        }
    }

    // ========================================================================
    // Resources
    // ========================================================================

    fn resource_entry(&mut self, category: &str, name: &str) -> Result<(Object, Option<ObjRef>)> {
        let top = self.resources.last().cloned().unwrap_or_default();
        let cat_obj = top.get(category).cloned().unwrap_or(Object::Null);
        let category_dict = match self.doc.resolve(&cat_obj)? {
            Object::Dict(d) => d,
            _ => {
                return Err(Error::ResourceMissing(format!("/{category} dictionary")));
            },
        };
        let entry = category_dict
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ResourceMissing(format!("/{category}/{name}")))?;
        let re = entry.as_ref();
        Ok((entry, re))
    }

    fn load_font(&mut self, name: &str) -> Result<Arc<Font>> {
        let (obj, re) = self.resource_entry("Font", name)?;
        if let Some(re) = re {
            if let Some(Resource::Font(font)) = self.doc.store.get(re) {
                return Ok(font);
            }
        }
        let dict = self.doc.resolve(&obj)?.into_dict()?;
        let font = Arc::new(Font::load(self.doc, &dict, name).context(format!("font /{name}"))?);
        if let Some(re) = re {
            self.doc.store.put(re, Resource::Font(font.clone()));
        }
        Ok(font)
    }

    fn load_colorspace(&mut self, name: &str) -> Result<Arc<Colorspace>> {
        if let Ok(cs) = Colorspace::from_name(name) {
            return Ok(Arc::new(cs));
        }
        let (obj, re) = self.resource_entry("ColorSpace", name)?;
        if let Some(re) = re {
            if let Some(Resource::Colorspace(cs)) = self.doc.store.get(re) {
                return Ok(cs);
            }
        }
        let cs = Arc::new(Colorspace::load(self.doc, &obj).context(format!("colorspace /{name}"))?);
        if let Some(re) = re {
            self.doc.store.put(re, Resource::Colorspace(cs.clone()));
        }
        Ok(cs)
    }

    fn load_image(&mut self, obj: &Object, re: Option<ObjRef>) -> Result<Arc<Image>> {
        if let Some(re) = re {
            if let Some(Resource::Image(image)) = self.doc.store.get(re) {
                return Ok(image);
            }
        }
        let stream = self.doc.resolve(obj)?.into_stream()?;
        let image = Arc::new(Image::load(self.doc, &stream, re, 0)?);
        if let Some(re) = re {
            self.doc.store.put(re, Resource::Image(image.clone()));
        }
        Ok(image)
    }

    fn load_pattern(&mut self, name: &str) -> Result<Pattern> {
        let (obj, _) = self.resource_entry("Pattern", name)?;
        let resolved = self.doc.resolve(&obj)?;
        let dict = resolved
            .as_dict()
            .ok_or_else(|| Error::syntax("pattern must be a dictionary or stream"))?
            .clone();

        let matrix = matrix_entry(&dict, "Matrix").unwrap_or(Matrix::IDENTITY);

        match dict.get_int("PatternType") {
            Some(2) => {
                let shading_obj = dict
                    .get("Shading")
                    .cloned()
                    .ok_or_else(|| Error::syntax("shading pattern without /Shading"))?;
                let shading = Shading::load(self.doc, &shading_obj)?;
                Ok(Pattern::Shading {
                    shading: Arc::new(shading),
                    matrix,
                })
            },
            _ => {
                let stream = resolved.into_stream()?;
                let re = obj.as_ref();
                let content = self.doc.decode_stream(&stream, re)?;
                let resources = match self.doc.resolve_key(&dict, "Resources")? {
                    Object::Dict(d) => d,
                    _ => Dict::new(),
                };
                let bbox = rect_entry(&dict, "BBox")
                    .ok_or_else(|| Error::syntax("tiling pattern without /BBox"))?;
                let xstep = dict.get_number("XStep").unwrap_or(bbox.width() as f64) as f32;
                let ystep = dict.get_number("YStep").unwrap_or(bbox.height() as f64) as f32;
                Ok(Pattern::Tiling {
                    content: Arc::new(content),
                    resources,
                    bbox,
                    xstep: if xstep.abs() < 1e-6 { bbox.width().max(1.0) } else { xstep },
                    ystep: if ystep.abs() < 1e-6 { bbox.height().max(1.0) } else { ystep },
                    matrix,
                    paint_type: dict.get_int("PaintType").unwrap_or(1),
                })
            },
        }
    }

    // ========================================================================
    // Graphics state operators
    // ========================================================================

    fn op_save(&mut self) {
        self.gstack.push(self.gs.clone());
        self.gs.clip_depth = 0;
    }

    fn op_restore(&mut self) -> Result<()> {
        match self.gstack.pop() {
            Some(saved) => {
                for _ in 0..self.gs.clip_depth {
                    self.device.pop_clip()?;
                }
                self.gs = saved;
            },
            // Extra Q below the stream's initial depth is ignored
            None => log::debug!("ignoring Q below initial graphics-state depth"),
        }
        Ok(())
    }

    fn op_extgstate(&mut self, name: &str) -> Result<()> {
        let (obj, _) = self.resource_entry("ExtGState", name)?;
        let ext = self.doc.resolve(&obj)?.into_dict()?;

        if let Some(lw) = ext.get_number("LW") {
            self.gs.stroke.line_width = lw as f32;
        }
        if let Some(lc) = ext.get_int("LC") {
            self.gs.stroke.cap = LineCap::from_int(lc);
        }
        if let Some(lj) = ext.get_int("LJ") {
            self.gs.stroke.join = LineJoin::from_int(lj);
        }
        if let Some(ml) = ext.get_number("ML") {
            self.gs.stroke.miter_limit = ml as f32;
        }
        if let Some([dashes, phase]) = ext.get_array("D") {
            if let Some(arr) = dashes.as_array() {
                self.gs.stroke.dashes = arr
                    .iter()
                    .filter_map(|o| o.as_number().map(|v| v as f32))
                    .collect();
            }
            self.gs.stroke.dash_phase = phase.as_number().unwrap_or(0.0) as f32;
        }
        if let Some(ri) = ext.get_name("RI") {
            self.gs.intent = ri.to_string();
        }
        if let Some(fl) = ext.get_number("FL") {
            self.gs.flatness = fl as f32;
        }
        if let Some(ca) = ext.get_number("CA") {
            self.gs.alpha_stroke = ca.clamp(0.0, 1.0) as f32;
        }
        if let Some(ca) = ext.get_number("ca") {
            self.gs.alpha_fill = ca.clamp(0.0, 1.0) as f32;
        }
        // /BM accepts a bare name or an array whose first element counts
        match ext.get("BM") {
            Some(Object::Name(n)) => self.gs.blend = BlendMode::from_name(n.as_str()),
            Some(Object::Array(arr)) => {
                if let Some(n) = arr.first().and_then(Object::as_name) {
                    self.gs.blend = BlendMode::from_name(n);
                }
            },
            _ => {},
        }
        if let Some([font_ref, size]) = ext.get_array("Font") {
            let size = size.as_number().unwrap_or(0.0) as f32;
            if let Some(re) = font_ref.as_ref() {
                let dict = self.doc.load_object(re)?.into_dict()?;
                match Font::load(self.doc, &dict, "ExtGState") {
                    Ok(font) => {
                        self.gs.text.font = Some(Arc::new(font));
                        self.gs.text.size = size;
                    },
                    Err(e) => log::warn!("ExtGState /Font unusable: {e}"),
                }
            }
        }
        match ext.get("SMask") {
            Some(Object::Name(n)) if n.as_str() == "None" => {},
            Some(smask @ (Object::Dict(_) | Object::Ref(_))) => {
                let smask = smask.clone();
                self.apply_soft_mask(&smask)?;
            },
            _ => {},
        }
        Ok(())
    }

    /// Render an ExtGState soft mask: the /G group draws into a mask
    /// layer, which then clips everything until the enclosing restore.
    fn apply_soft_mask(&mut self, smask_obj: &Object) -> Result<()> {
        let smask = self.doc.resolve(smask_obj)?.into_dict()?;
        let luminosity = smask.get_name("S") == Some("Luminosity");

        match smask.get_name("TR") {
            None | Some("Identity") => {},
            Some(other) => log::warn!("soft mask /TR /{other} not applied"),
        }

        let backdrop = match smask.get_array("BC") {
            Some(bc) => {
                let comps: Vec<f32> = bc
                    .iter()
                    .filter_map(|o| o.as_number().map(|v| v as f32))
                    .collect();
                match comps.len() {
                    1 => [comps[0]; 3],
                    3 => [comps[0], comps[1], comps[2]],
                    _ => [0.0; 3],
                }
            },
            None => [0.0; 3],
        };

        let group_obj = smask
            .get("G")
            .cloned()
            .ok_or_else(|| Error::syntax("soft mask without /G"))?;
        let group_re = group_obj.as_ref();
        let group = self.doc.resolve(&group_obj)?.into_stream()?;
        let content = self.doc.decode_stream(&group, group_re)?;

        let matrix = matrix_entry(&group.dict, "Matrix").unwrap_or(Matrix::IDENTITY);
        let bbox = rect_entry(&group.dict, "BBox").unwrap_or(Rect::new(0.0, 0.0, 1.0, 1.0));
        let resources = match self.doc.resolve_key(&group.dict, "Resources")? {
            Object::Dict(d) => d,
            _ => self.resources.last().cloned().unwrap_or_default(),
        };

        let mask_ctm = matrix.concat(&self.gs.ctm);
        self.device
            .begin_mask(mask_ctm.transform_rect(bbox), luminosity, backdrop)?;

        self.nest(|rp| {
            rp.op_save();
            rp.gs.ctm = mask_ctm;
            rp.resources.push(resources);
            let result = rp.run_nested(&content);
            rp.resources.pop();
            let restore = rp.op_restore();
            result.and(restore)
        })?;

        self.device.end_mask()?;
        self.gs.clip_depth += 1;
        Ok(())
    }

    fn nest<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.nesting >= MAX_NESTING {
            return Err(Error::range("form/pattern nesting too deep"));
        }
        self.nesting += 1;
        let result = f(self);
        self.nesting -= 1;
        result
    }

    // ========================================================================
    // Path painting
    // ========================================================================

    fn finish_path(&mut self, fill: Option<bool>, stroke: bool) -> Result<()> {
        let path = std::mem::take(&mut self.path);

        if !self.hidden() {
            if let Some(even_odd) = fill {
                if self.gs.fill_color.pattern.is_some() {
                    self.fill_with_pattern(&path, even_odd, false)?;
                } else {
                    let paint = self.fill_paint();
                    self.device.fill_path(&path, even_odd, &self.gs.ctm, &paint)?;
                }
            }
            if stroke {
                if self.gs.stroke_color.pattern.is_some() {
                    self.fill_with_pattern(&path, false, true)?;
                } else {
                    let paint = self.stroke_paint();
                    self.device
                        .stroke_path(&path, &self.gs.stroke, &self.gs.ctm, &paint)?;
                }
            }
        }

        if let Some(even_odd) = self.pending_clip.take() {
            self.device.clip_path(&path, even_odd, &self.gs.ctm)?;
            self.gs.clip_depth += 1;
        }
        Ok(())
    }

    fn fill_with_pattern(&mut self, path: &Path, even_odd: bool, stroking: bool) -> Result<()> {
        let color_state = if stroking {
            &self.gs.stroke_color
        } else {
            &self.gs.fill_color
        };
        let Some(pattern) = color_state.pattern.clone() else {
            return Ok(());
        };

        match pattern {
            Pattern::Shading { shading, matrix } => {
                self.device.clip_path(path, even_odd, &self.gs.ctm)?;
                let shade_ctm = matrix.concat(&self.base_ctm);
                let alpha = if stroking {
                    self.gs.alpha_stroke
                } else {
                    self.gs.alpha_fill
                };
                self.device.fill_shade(&shading, &shade_ctm, alpha)?;
                self.device.pop_clip()?;
            },
            Pattern::Tiling {
                content,
                resources,
                bbox,
                xstep,
                ystep,
                matrix,
                paint_type,
            } => {
                let pattern_ctm = matrix.concat(&self.base_ctm);
                let Some(inv) = pattern_ctm.invert() else {
                    return Ok(());
                };
                self.device.clip_path(path, even_odd, &self.gs.ctm)?;

                let area_dev = self.gs.ctm.transform_rect(path.bounds());
                let area_pat = inv.transform_rect(area_dev);
                let i0 = ((area_pat.x0 - bbox.x1) / xstep).floor() as i64;
                let i1 = ((area_pat.x1 - bbox.x0) / xstep).ceil() as i64;
                let j0 = ((area_pat.y0 - bbox.y1) / ystep).floor() as i64;
                let j1 = ((area_pat.y1 - bbox.y0) / ystep).ceil() as i64;
                let tiles = (i1 - i0).max(0) * (j1 - j0).max(0);
                if tiles > MAX_TILES {
                    log::warn!("tiling pattern spans {tiles} cells, clamping");
                }

                self.device
                    .begin_tile(area_pat, bbox, xstep, ystep, &pattern_ctm)?;
                let _ = paint_type;
                let mut painted = 0i64;
                'tiles: for j in j0..j1 {
                    for i in i0..i1 {
                        if painted >= MAX_TILES {
                            break 'tiles;
                        }
                        painted += 1;
                        let cell = Matrix::translate(i as f32 * xstep, j as f32 * ystep)
                            .concat(&pattern_ctm);
                        let content = content.clone();
                        let resources = resources.clone();
                        self.nest(|rp| {
                            rp.op_save();
                            rp.gs.ctm = cell;
                            rp.resources.push(resources);
                            let result = rp.run_nested(&content);
                            rp.resources.pop();
                            let restore = rp.op_restore();
                            result.and(restore)
                        })?;
                    }
                }
                self.device.end_tile()?;
                self.device.pop_clip()?;
            },
        }
        Ok(())
    }

    // ========================================================================
    // Text
    // ========================================================================

    fn op_begin_text(&mut self) {
        if self.in_text {
            log::warn!("BT inside a text object");
        }
        self.in_text = true;
        self.tm = Matrix::IDENTITY;
        self.tlm = Matrix::IDENTITY;
    }

    fn op_end_text(&mut self) -> Result<()> {
        if !self.in_text {
            log::warn!("ET outside a text object");
        }
        self.in_text = false;
        let spans = std::mem::take(&mut self.text_clip_spans);
        if !spans.is_empty() {
            if spans.len() > 1 {
                log::warn!("text clip across {} font changes intersects instead of uniting", spans.len());
            }
            for span in spans {
                self.device.clip_text(&span, &self.gs.ctm)?;
                self.gs.clip_depth += 1;
            }
        }
        Ok(())
    }

    fn next_line(&mut self, tx: f32, ty: f32) {
        self.tlm = Matrix::translate(tx, ty).concat(&self.tlm);
        self.tm = self.tlm;
    }

    fn show_text(&mut self, bytes: &[u8]) -> Result<()> {
        let Some(font) = self.gs.text.font.clone() else {
            return Err(Error::ResourceMissing("no font set before text showing".into()));
        };
        if !self.in_text {
            log::warn!("text showing outside BT/ET");
        }

        if matches!(font.kind, FontKind::Type3(_))
            && !self.device.caps().contains(DeviceCaps::WANTS_TEXT)
        {
            return self.show_type3(&font, bytes);
        }

        let ts = self.gs.text.clone();
        let glyphs = font.decode_text(bytes);
        let mut items = Vec::with_capacity(glyphs.len());

        for glyph in &glyphs {
            let param = Matrix::new(
                ts.size * ts.hscale,
                0.0,
                0.0,
                ts.size,
                0.0,
                ts.rise,
            );
            let trm = param.concat(&self.tm);
            items.push(TextItem {
                gid: glyph.gid,
                cid: glyph.cid,
                unicode: glyph.unicode.clone(),
                trm,
            });

            let w0 = glyph.width / 1000.0 * ts.size;
            let word = if glyph.consumed == 1 && glyph.code == 32 {
                ts.word_spacing
            } else {
                0.0
            };
            let advance = (w0 + ts.char_spacing + word) * ts.hscale;
            self.tm = Matrix::translate(advance, 0.0).concat(&self.tm);
        }

        let span = TextSpan {
            font: font.clone(),
            wmode: font.wmode(),
            items,
        };

        if self.hidden() {
            return Ok(());
        }

        // Render modes: 0 fill, 1 stroke, 2 both, 3 invisible; +4 adds clip
        let mode = ts.render_mode.clamp(0, 7);
        let fill_paint = self.fill_paint();
        let stroke_paint = self.stroke_paint();
        match mode & 3 {
            0 => self.device.fill_text(&span, &self.gs.ctm, &fill_paint)?,
            1 => self
                .device
                .stroke_text(&span, &self.gs.stroke, &self.gs.ctm, &stroke_paint)?,
            2 => {
                self.device.fill_text(&span, &self.gs.ctm, &fill_paint)?;
                self.device
                    .stroke_text(&span, &self.gs.stroke, &self.gs.ctm, &stroke_paint)?;
            },
            _ => self.device.ignore_text(&span, &self.gs.ctm)?,
        }
        if mode >= 4 {
            // Merge into the pending clip accumulation, per font
            match self.text_clip_spans.last_mut() {
                Some(last) if Arc::ptr_eq(&last.font, &span.font) => {
                    last.items.extend(span.items);
                },
                _ => self.text_clip_spans.push(span),
            }
        }
        Ok(())
    }

    /// Replay Type 3 charprocs through the device.
    fn show_type3(&mut self, font: &Arc<Font>, bytes: &[u8]) -> Result<()> {
        let FontKind::Type3(_) = &font.kind else {
            return Ok(());
        };
        let ts = self.gs.text.clone();

        for &code in bytes {
            let (proc_bytes, glyph_name, font_matrix, widths_advance, resources) = {
                let FontKind::Type3(t3) = &font.kind else {
                    unreachable!()
                };
                let (glyph_name, proc_bytes) = match t3.proc_for_code(code) {
                    Some((name, stream)) => (Some(name.to_string()), Some(stream.to_vec())),
                    None => (None, None),
                };
                (
                    proc_bytes,
                    glyph_name,
                    t3.font_matrix,
                    t3.advance_for_code(code),
                    t3.resources.clone(),
                )
            };

            let param = Matrix::new(ts.size * ts.hscale, 0.0, 0.0, ts.size, 0.0, ts.rise);
            let trm = param.concat(&self.tm);

            if let Some(content) = proc_bytes {
                let resources = if resources.is_empty() {
                    self.resources.last().cloned().unwrap_or_default()
                } else {
                    resources
                };

                // Glyph bbox from a bounds-only run, cached on the font;
                // blank charprocs then skip the device replay entirely.
                let bbox = self.type3_bbox(font, glyph_name.as_deref(), &content, &resources);

                if !self.hidden() && !bbox.is_empty() {
                    let glyph_ctm = font_matrix.concat(&trm).concat(&self.gs.ctm);
                    self.t3_advance = None;
                    self.nest(|rp| {
                        rp.op_save();
                        rp.gs.ctm = glyph_ctm;
                        rp.resources.push(resources);
                        let result = rp.run_nested(&content);
                        rp.resources.pop();
                        let restore = rp.op_restore();
                        result.and(restore)
                    })?;
                }
            } else {
                log::warn!("Type 3 glyph for code {code} missing");
            }

            // Advance: d0/d1 wins, then /Widths; both are in glyph space
            let w_glyph = self
                .t3_advance
                .take()
                .map(|(wx, _)| wx)
                .or(widths_advance)
                .unwrap_or(0.0);
            let w_text = font_matrix.transform_vector(Point::new(w_glyph, 0.0)).x;
            let word = if code == 32 { ts.word_spacing } else { 0.0 };
            let advance = (w_text * ts.size + ts.char_spacing + word) * ts.hscale;
            self.tm = Matrix::translate(advance, 0.0).concat(&self.tm);
        }
        Ok(())
    }

    /// Glyph-space bounds of a Type 3 charproc, derived through the bbox
    /// device and cached on the font.
    fn type3_bbox(
        &mut self,
        font: &Arc<Font>,
        glyph_name: Option<&str>,
        content: &[u8],
        resources: &Dict,
    ) -> Rect {
        if let (FontKind::Type3(t3), Some(name)) = (&font.kind, glyph_name) {
            if let Some(cached) = t3.cached_bbox(name) {
                return cached;
            }
            // Provisional entry so a charproc that shows its own glyph
            // terminates instead of re-deriving forever
            t3.store_bbox(name, t3.font_bbox);
        }

        let mut bounds_dev = crate::device::bbox::BboxDevice::new();
        {
            let mut rp = RunProcessor::new(
                &mut *self.doc,
                &mut bounds_dev,
                resources.clone(),
                Matrix::IDENTITY,
                &self.event.clone(),
                None,
            );
            if let Err(e) = rp.run(content) {
                log::warn!("Type 3 glyph bounds run failed: {e}");
            }
        }
        let bbox = bounds_dev.bounds;

        if let (FontKind::Type3(t3), Some(name)) = (&font.kind, glyph_name) {
            t3.store_bbox(name, bbox);
        }
        bbox
    }

    fn show_text_adjusted(&mut self, elements: &[TextElement]) -> Result<()> {
        for element in elements {
            match element {
                TextElement::Text(bytes) => self.show_text(bytes)?,
                TextElement::Adjust(amount) => {
                    // Thousandths of the font size, subtracted from the advance
                    let tx =
                        -amount / 1000.0 * self.gs.text.size * self.gs.text.hscale;
                    self.tm = Matrix::translate(tx, 0.0).concat(&self.tm);
                },
            }
        }
        Ok(())
    }

    // ========================================================================
    // XObjects, images, shadings
    // ========================================================================

    fn op_do(&mut self, name: &str) -> Result<()> {
        let (obj, re) = self.resource_entry("XObject", name)?;
        let resolved = self.doc.resolve(&obj)?;
        let stream = resolved.into_stream()?;

        // Per-XObject optional content
        if let Some(oc) = stream.dict.get("OC") {
            let oc = oc.clone();
            let oc_state = self.oc.clone();
            if oc_state.is_hidden(self.doc, &oc, &self.event) {
                return Ok(());
            }
        }

        match stream.dict.get_name("Subtype") {
            Some("Image") => self.draw_image_xobject(&obj, re),
            Some("Form") => self.run_form(&stream, re),
            Some("PS") => {
                log::warn!("PostScript XObject /{name} skipped");
                Ok(())
            },
            other => Err(Error::syntax(format!("XObject /{name} has subtype {other:?}"))),
        }
    }

    fn draw_image_xobject(&mut self, obj: &Object, re: Option<ObjRef>) -> Result<()> {
        let image = self.load_image(obj, re)?;
        if self.hidden() {
            return Ok(());
        }
        if image.image_mask {
            let paint = self.fill_paint();
            self.device.fill_image_mask(&image, &self.gs.ctm, &paint)
        } else {
            self.device
                .fill_image(&image, &self.gs.ctm, self.gs.alpha_fill)
        }
    }

    fn run_form(&mut self, stream: &Stream, re: Option<ObjRef>) -> Result<()> {
        let content = self.doc.decode_stream(stream, re)?;
        let matrix = matrix_entry(&stream.dict, "Matrix").unwrap_or(Matrix::IDENTITY);
        let bbox = rect_entry(&stream.dict, "BBox");
        let resources = match self.doc.resolve_key(&stream.dict, "Resources")? {
            Object::Dict(d) => d,
            _ => self.resources.last().cloned().unwrap_or_default(),
        };

        // Transparency group?
        let group = match self.doc.resolve_key(&stream.dict, "Group")? {
            Object::Dict(g) if g.get_name("S") == Some("Transparency") => Some(g),
            _ => None,
        };

        self.nest(|rp| {
            rp.op_save();
            rp.gs.ctm = matrix.concat(&rp.gs.ctm);

            if let Some(bbox) = bbox {
                let mut clip = Path::new();
                clip.rect(bbox.x0, bbox.y0, bbox.width(), bbox.height());
                rp.device.clip_path(&clip, false, &rp.gs.ctm)?;
                rp.gs.clip_depth += 1;
            }

            let grouped = if let Some(g) = &group {
                let isolated = g.get_bool("I").unwrap_or(false);
                let knockout = g.get_bool("K").unwrap_or(false);
                let area = bbox.unwrap_or(Rect::new(0.0, 0.0, 1.0, 1.0));
                rp.device.begin_group(
                    rp.gs.ctm.transform_rect(area),
                    isolated,
                    knockout,
                    rp.gs.blend,
                    rp.gs.alpha_fill,
                )?;
                true
            } else {
                false
            };

            rp.resources.push(resources);
            let result = rp.run_nested(&content);
            rp.resources.pop();

            if grouped {
                rp.device.end_group()?;
            }
            let restore = rp.op_restore();
            result.and(restore)
        })
    }

    fn op_sh(&mut self, name: &str) -> Result<()> {
        let (obj, _) = self.resource_entry("Shading", name)?;
        let shading = Shading::load(self.doc, &obj).context(format!("shading /{name}"))?;
        if self.hidden() {
            return Ok(());
        }
        self.device
            .fill_shade(&shading, &self.gs.ctm, self.gs.alpha_fill)
    }

    fn op_inline_image(&mut self, dict: &Dict, data: &[u8]) -> Result<()> {
        // Resolve an abbreviated or named colorspace through the resources
        let mut dict = dict.clone();
        let cs_key = if dict.contains_key("ColorSpace") {
            "ColorSpace"
        } else {
            "CS"
        };
        if let Some(cs_name) = dict.get_name(cs_key).map(str::to_string) {
            if Colorspace::from_name(&cs_name).is_err() {
                if let Ok((cs_obj, _)) = self.resource_entry("ColorSpace", &cs_name) {
                    dict.insert(crate::names::Name::new(cs_key), cs_obj);
                }
            }
        }

        let stream = Stream {
            dict,
            data: Bytes::copy_from_slice(data),
        };
        let image = Image::load(self.doc, &stream, None, 0).context("inline image")?;
        if self.hidden() {
            return Ok(());
        }
        if image.image_mask {
            let paint = self.fill_paint();
            self.device.fill_image_mask(&image, &self.gs.ctm, &paint)
        } else {
            self.device
                .fill_image(&image, &self.gs.ctm, self.gs.alpha_fill)
        }
    }

    // ========================================================================
    // Marked content
    // ========================================================================

    fn op_begin_marked(&mut self, props: Option<&Object>) -> Result<()> {
        self.mc_depth += 1;
        let Some(props) = props else {
            return Ok(());
        };

        // Resolve a named properties entry
        let resolved = match props {
            Object::Name(n) => match self.resource_entry("Properties", n.as_str()) {
                Ok((obj, _)) => obj,
                Err(_) => return Ok(()),
            },
            other => other.clone(),
        };

        let oc_state = self.oc.clone();
        if oc_state.is_hidden(self.doc, &resolved, &self.event) && self.hidden_from.is_none() {
            self.hidden_from = Some(self.mc_depth);
        }
        Ok(())
    }

    fn op_end_marked(&mut self) {
        if self.hidden_from == Some(self.mc_depth) {
            self.hidden_from = None;
        }
        self.mc_depth = self.mc_depth.saturating_sub(1);
    }

    /// Balance everything at the end of the outermost stream.
    fn balance(&mut self) -> Result<()> {
        if self.in_text {
            log::warn!("content stream ended inside BT/ET");
            self.op_end_text()?;
        }
        while !self.gstack.is_empty() {
            log::warn!("content stream ended with unbalanced q");
            self.op_restore()?;
        }
        for _ in 0..self.gs.clip_depth {
            self.device.pop_clip()?;
        }
        self.gs.clip_depth = 0;
        self.device.close()
    }

    fn dispatch(&mut self, op: Op) -> Result<()> {
        match op {
            Op::Save => self.op_save(),
            Op::Restore => self.op_restore()?,
            Op::Concat(m) => {
                let m = Matrix::new(m[0], m[1], m[2], m[3], m[4], m[5]);
                self.gs.ctm = m.concat(&self.gs.ctm);
            },
            Op::LineWidth(w) => self.gs.stroke.line_width = w.max(0.0),
            Op::LineCap(c) => self.gs.stroke.cap = LineCap::from_int(c),
            Op::LineJoin(j) => self.gs.stroke.join = LineJoin::from_int(j),
            Op::MiterLimit(m) => self.gs.stroke.miter_limit = m.max(1.0),
            Op::Dash(dashes, phase) => {
                self.gs.stroke.dashes = dashes;
                self.gs.stroke.dash_phase = phase;
            },
            Op::RenderingIntent(n) => self.gs.intent = n.as_str().to_string(),
            Op::Flatness(f) => self.gs.flatness = f.clamp(0.0, 100.0),
            Op::ExtGState(n) => self.op_extgstate(n.as_str())?,

            Op::MoveTo(x, y) => self.path.move_to(x, y),
            Op::LineTo(x, y) => self.path.line_to(x, y),
            Op::CurveTo(a, b, c, d, e, f) => self.path.curve_to(a, b, c, d, e, f),
            Op::CurveToV(a, b, c, d) => self.path.curve_to_v(a, b, c, d),
            Op::CurveToY(a, b, c, d) => self.path.curve_to_y(a, b, c, d),
            Op::ClosePath => self.path.close(),
            Op::Rect(x, y, w, h) => self.path.rect(x, y, w, h),

            Op::Stroke => self.finish_path(None, true)?,
            Op::CloseStroke => {
                self.path.close();
                self.finish_path(None, true)?;
            },
            Op::Fill => self.finish_path(Some(false), false)?,
            Op::FillEvenOdd => self.finish_path(Some(true), false)?,
            Op::FillStroke => self.finish_path(Some(false), true)?,
            Op::FillStrokeEvenOdd => self.finish_path(Some(true), true)?,
            Op::CloseFillStroke => {
                self.path.close();
                self.finish_path(Some(false), true)?;
            },
            Op::CloseFillStrokeEvenOdd => {
                self.path.close();
                self.finish_path(Some(true), true)?;
            },
            Op::EndPath => self.finish_path(None, false)?,
            Op::Clip => self.pending_clip = Some(false),
            Op::ClipEvenOdd => self.pending_clip = Some(true),

            Op::BeginText => self.op_begin_text(),
            Op::EndText => self.op_end_text()?,
            Op::CharSpacing(v) => self.gs.text.char_spacing = v,
            Op::WordSpacing(v) => self.gs.text.word_spacing = v,
            Op::HorizScale(v) => self.gs.text.hscale = v / 100.0,
            Op::Leading(v) => self.gs.text.leading = v,
            Op::SetFont(name, size) => {
                self.gs.text.size = size;
                match self.load_font(name.as_str()) {
                    Ok(font) => self.gs.text.font = Some(font),
                    Err(e) => {
                        self.gs.text.font = None;
                        return Err(e);
                    },
                }
            },
            Op::RenderMode(m) => self.gs.text.render_mode = m,
            Op::Rise(v) => self.gs.text.rise = v,

            Op::TextMove(tx, ty) => self.next_line(tx, ty),
            Op::TextMoveSetLeading(tx, ty) => {
                self.gs.text.leading = -ty;
                self.next_line(tx, ty);
            },
            Op::TextMatrix(m) => {
                self.tm = Matrix::new(m[0], m[1], m[2], m[3], m[4], m[5]);
                self.tlm = self.tm;
            },
            Op::NextLine => {
                let leading = self.gs.text.leading;
                self.next_line(0.0, -leading);
            },
            Op::ShowText(bytes) => self.show_text(&bytes)?,
            Op::ShowTextAdjusted(elements) => self.show_text_adjusted(&elements)?,
            Op::NextLineShow(bytes) => {
                let leading = self.gs.text.leading;
                self.next_line(0.0, -leading);
                self.show_text(&bytes)?;
            },
            Op::NextLineShowSpaced(aw, ac, bytes) => {
                self.gs.text.word_spacing = aw;
                self.gs.text.char_spacing = ac;
                let leading = self.gs.text.leading;
                self.next_line(0.0, -leading);
                self.show_text(&bytes)?;
            },

            Op::GlyphWidth(wx, wy) => self.t3_advance = Some((wx, wy)),
            Op::GlyphWidthBBox(wx, wy, ..) => self.t3_advance = Some((wx, wy)),

            Op::StrokeColorSpace(n) => {
                let cs = self.load_colorspace(n.as_str())?;
                self.gs.stroke_color = ColorState {
                    comps: cs.initial_color(),
                    colorspace: cs,
                    pattern: None,
                };
            },
            Op::FillColorSpace(n) => {
                let cs = self.load_colorspace(n.as_str())?;
                self.gs.fill_color = ColorState {
                    comps: cs.initial_color(),
                    colorspace: cs,
                    pattern: None,
                };
            },
            Op::StrokeColor(comps) => self.gs.stroke_color.comps = comps,
            Op::FillColor(comps) => self.gs.fill_color.comps = comps,
            Op::StrokeColorN(comps, pattern) => {
                if let Some(name) = pattern {
                    self.gs.stroke_color.pattern = Some(self.load_pattern(name.as_str())?);
                } else {
                    self.gs.stroke_color.comps = comps;
                }
            },
            Op::FillColorN(comps, pattern) => {
                if let Some(name) = pattern {
                    self.gs.fill_color.pattern = Some(self.load_pattern(name.as_str())?);
                } else {
                    self.gs.fill_color.comps = comps;
                }
            },
            Op::StrokeGray(g) => {
                self.gs.stroke_color = ColorState {
                    colorspace: Arc::new(Colorspace::DeviceGray),
                    comps: vec![g],
                    pattern: None,
                };
            },
            Op::FillGray(g) => {
                self.gs.fill_color = ColorState {
                    colorspace: Arc::new(Colorspace::DeviceGray),
                    comps: vec![g],
                    pattern: None,
                };
            },
            Op::StrokeRgb(r, g, b) => {
                self.gs.stroke_color = ColorState {
                    colorspace: Arc::new(Colorspace::DeviceRGB),
                    comps: vec![r, g, b],
                    pattern: None,
                };
            },
            Op::FillRgb(r, g, b) => {
                self.gs.fill_color = ColorState {
                    colorspace: Arc::new(Colorspace::DeviceRGB),
                    comps: vec![r, g, b],
                    pattern: None,
                };
            },
            Op::StrokeCmyk(c, m, y, k) => {
                self.gs.stroke_color = ColorState {
                    colorspace: Arc::new(Colorspace::DeviceCMYK),
                    comps: vec![c, m, y, k],
                    pattern: None,
                };
            },
            Op::FillCmyk(c, m, y, k) => {
                self.gs.fill_color = ColorState {
                    colorspace: Arc::new(Colorspace::DeviceCMYK),
                    comps: vec![c, m, y, k],
                    pattern: None,
                };
            },

            Op::ShFill(n) => self.op_sh(n.as_str())?,
            Op::XObject(n) => self.op_do(n.as_str())?,
            Op::InlineImage(dict, data) => self.op_inline_image(&dict, &data)?,

            Op::MarkPoint(_) => {},
            Op::MarkPointProps(_, _) => {},
            Op::BeginMarked(_) => self.op_begin_marked(None)?,
            Op::BeginMarkedProps(_, props) => self.op_begin_marked(Some(&props))?,
            Op::EndMarked => self.op_end_marked(),

            Op::BeginCompat => self.bx_depth += 1,
            Op::EndCompat => self.bx_depth = self.bx_depth.saturating_sub(1),
            Op::Unknown(keyword, _) => {
                if self.bx_depth == 0 {
                    log::warn!("unknown operator {keyword}");
                } // inside BX..EX: silently dropped
            },
        }
        Ok(())
    }
}

impl Processor for RunProcessor<'_> {
    fn process_op(&mut self, op: Op) -> Result<()> {
        self.dispatch(op)
    }

    fn finish(&mut self) -> Result<()> {
        self.balance()
    }
}

/// Nested-stream shim: same dispatch, no terminal balancing.
struct NestedRun<'b, 'a> {
    inner: &'b mut RunProcessor<'a>,
}

impl Processor for NestedRun<'_, '_> {
    fn process_op(&mut self, op: Op) -> Result<()> {
        self.inner.dispatch(op)
    }
}

fn matrix_entry(dict: &Dict, key: &str) -> Option<Matrix> {
    match dict.get_array(key) {
        Some([a, b, c, d, e, f]) => Some(Matrix::new(
            a.as_number()? as f32,
            b.as_number()? as f32,
            c.as_number()? as f32,
            d.as_number()? as f32,
            e.as_number()? as f32,
            f.as_number()? as f32,
        )),
        _ => None,
    }
}

fn rect_entry(dict: &Dict, key: &str) -> Option<Rect> {
    match dict.get_array(key) {
        Some([a, b, c, d]) => Some(Rect::from_corners(
            Point::new(a.as_number()? as f32, b.as_number()? as f32),
            Point::new(c.as_number()? as f32, d.as_number()? as f32),
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::list::{ListDevice, ListItem};

    fn doc() -> Document {
        let pdf = crate::document::test_pdf("0 0 100 100", "");
        Document::from_bytes(Bytes::from(pdf)).unwrap()
    }

    fn run_into_list(content: &[u8]) -> Vec<ListItem> {
        let mut doc = doc();
        let mut device = ListDevice::new();
        let mut rp = RunProcessor::new(
            &mut doc,
            &mut device,
            Dict::new(),
            Matrix::IDENTITY,
            "View",
            None,
        );
        rp.run(content).unwrap();
        device.into_list().items
    }

    #[test]
    fn test_fill_emits_device_call() {
        let items = run_into_list(b"1 0 0 rg 0 0 100 100 re f");
        assert_eq!(items.len(), 1);
        let ListItem::FillPath(path, even_odd, _, paint) = &items[0] else {
            panic!("expected fill, got {:?}", items[0]);
        };
        assert!(!even_odd);
        assert_eq!(paint.rgb, [1.0, 0.0, 0.0]);
        assert_eq!(path.elements.len(), 5);
    }

    #[test]
    fn test_cm_concatenates() {
        let items = run_into_list(b"2 0 0 2 5 5 cm 0 0 10 10 re f");
        let ListItem::FillPath(_, _, ctm, _) = &items[0] else {
            panic!();
        };
        assert_eq!(ctm.a, 2.0);
        assert_eq!(ctm.e, 5.0);
    }

    #[test]
    fn test_cm_inverse_restores_identity() {
        // cm 2 0 0 2 10 0 then its inverse: CTM returns to identity
        let items = run_into_list(b"2 0 0 2 10 0 cm 0.5 0 0 0.5 -5 0 cm 0 0 1 1 re f");
        let ListItem::FillPath(_, _, ctm, _) = &items[0] else {
            panic!();
        };
        assert!(ctm.is_identity(), "{ctm:?}");
    }

    #[test]
    fn test_q_restore_balances() {
        let items = run_into_list(b"q 0 1 0 rg Q 0 0 10 10 re f");
        let ListItem::FillPath(_, _, _, paint) = &items[0] else {
            panic!();
        };
        // Color set inside q..Q does not leak
        assert_eq!(paint.rgb, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_extra_restore_ignored() {
        // Q below the initial depth must not error or unbalance
        let items = run_into_list(b"Q Q 1 0 0 rg 0 0 10 10 re f");
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_clip_applies_after_paint() {
        let items = run_into_list(b"0 0 50 50 re W n 0 0 100 100 re f");
        assert!(matches!(items[0], ListItem::ClipPath(..)));
        assert!(matches!(items[1], ListItem::FillPath(..)));
        // Balancing pops the clip at stream end
        assert!(matches!(items.last(), Some(ListItem::PopClip)));
    }

    #[test]
    fn test_gs_stack_depth_equal_at_end() {
        let mut doc = doc();
        let mut device = ListDevice::new();
        let mut rp = RunProcessor::new(
            &mut doc,
            &mut device,
            Dict::new(),
            Matrix::IDENTITY,
            "View",
            None,
        );
        rp.run(b"q q q 1 0 0 rg").unwrap();
        assert!(rp.gstack.is_empty());
        assert_eq!(rp.gs.clip_depth, 0);
    }

    #[test]
    fn test_unknown_op_inside_bx_silent() {
        let items = run_into_list(b"BX 1 2 frob EX 0 0 10 10 re f");
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_bdc_emc_depth_tracking() {
        // Unmatched EMC is harmless; drawing continues
        let items = run_into_list(b"/Tag BMC EMC EMC 0 0 10 10 re f");
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_text_without_font_is_caught() {
        // Lenient mode logs and continues
        let items = run_into_list(b"BT (Hi) Tj ET 0 0 10 10 re f");
        assert_eq!(items.len(), 1);
    }
}
