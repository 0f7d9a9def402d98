//! PDF document: xref-backed object loading, page tree, resource store.
//!
//! A [`Document`] owns the file bytes, the layered xref (with repair
//! fallback), the object cache, the encryption handler, and the LRU
//! resource store shared across page renders. Loading an object resolves
//! its xref entry: in-use-at-offset entries parse from the file,
//! compressed entries load through their holding object stream, free
//! entries yield null.

use crate::cookie::Cookie;
use crate::decoders;
use crate::encryption::EncryptionHandler;
use crate::error::{Error, Result, ResultExt};
use crate::geometry::{Matrix, Rect};
use crate::object::{Dict, DictExt, ObjRef, Object, Stream};
use crate::objstm;
use crate::parser;
use crate::repair;
use crate::xref::{Xref, XrefEntry, read_xref};
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// Default page size when no /MediaBox is inherited: US Letter in points.
const DEFAULT_MEDIA_BOX: Rect = Rect {
    x0: 0.0,
    y0: 0.0,
    x1: 612.0,
    y1: 792.0,
};

/// Maximum depth for reference-resolution chains and page-tree walks.
const MAX_RESOLVE_DEPTH: usize = 32;

/// An open PDF document.
pub struct Document {
    data: Bytes,
    xref: Xref,
    /// File format version from the header (major, minor)
    pub version: (u8, u8),
    /// Whether the xref had to be rebuilt by scanning
    pub repaired: bool,
    cache: HashMap<u32, Object>,
    objstm_cache: HashMap<u32, Arc<Vec<u8>>>,
    loading: HashSet<u32>,
    crypt: Option<EncryptionHandler>,
    /// Shared font/colorspace/image/cmap store, aged between page renders
    pub store: ResourceStore,
}

impl Document {
    /// Open a document from a file on disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Document> {
        let data = std::fs::read(path)?;
        Document::from_bytes(Bytes::from(data))
    }

    /// Open a document from bytes already in memory.
    ///
    /// Reads the header and xref chain; a broken chain drops to the repair
    /// scan. If the trailer carries /Encrypt, an empty-password
    /// authentication is attempted immediately, which opens the many files
    /// encrypted only for permissions.
    pub fn from_bytes(data: Bytes) -> Result<Document> {
        let version = parse_version(&data)?;

        let (xref, repaired) = match read_xref(&data) {
            Ok(xref) if xref.looks_valid() => (xref, false),
            Ok(_) => {
                log::warn!("xref parsed but incomplete, entering repair");
                (repair::repair_xref(&data)?, true)
            },
            Err(e) => {
                log::warn!("xref chain broken ({e}), entering repair");
                (repair::repair_xref(&data)?, true)
            },
        };

        let mut doc = Document {
            data,
            xref,
            version,
            repaired,
            cache: HashMap::new(),
            objstm_cache: HashMap::new(),
            loading: HashSet::new(),
            crypt: None,
            store: ResourceStore::new(256),
        };

        doc.setup_encryption()?;
        Ok(doc)
    }

    fn setup_encryption(&mut self) -> Result<()> {
        let encrypt_obj = match self.xref.trailer().get("Encrypt").cloned() {
            Some(obj) => self.resolve(&obj)?,
            None => return Ok(()),
        };
        let Some(encrypt) = encrypt_obj.as_dict() else {
            return Err(Error::syntax("/Encrypt is not a dictionary"));
        };

        let file_id = self
            .xref
            .trailer()
            .get_array("ID")
            .and_then(|ids| ids.first())
            .and_then(Object::as_string)
            .map(<[u8]>::to_vec)
            .unwrap_or_default();

        let mut handler = EncryptionHandler::new(encrypt, file_id)?;
        if !handler.authenticate(b"")? {
            log::warn!("document requires a password");
        }
        self.crypt = Some(handler);
        Ok(())
    }

    /// Authenticate with a password. Returns true on success.
    pub fn authenticate(&mut self, password: &str) -> Result<bool> {
        match &mut self.crypt {
            Some(handler) => handler.authenticate(password.as_bytes()),
            None => Ok(true),
        }
    }

    /// Whether the document is encrypted and still locked.
    pub fn needs_password(&self) -> bool {
        self.crypt.as_ref().is_some_and(|c| !c.is_authenticated())
    }

    /// The merged trailer dictionary.
    pub fn trailer(&self) -> &Dict {
        self.xref.trailer()
    }

    /// The layered xref (read-only view).
    pub fn xref(&self) -> &Xref {
        &self.xref
    }

    /// Load the indirect object `re`, consulting the cache.
    ///
    /// A mismatched generation is rejected; free entries load as null.
    pub fn load_object(&mut self, re: ObjRef) -> Result<Object> {
        if let Some(cached) = self.cache.get(&re.num) {
            return Ok(cached.clone());
        }

        let entry = match self.xref.get(re.num) {
            Some(entry) => *entry,
            None => {
                log::warn!("object {re} not in xref, treating as null");
                return Ok(Object::Null);
            },
        };

        if !self.loading.insert(re.num) {
            return Err(Error::range(format!("cyclic load of object {re}")));
        }
        let result = self.load_uncached(re, entry);
        self.loading.remove(&re.num);

        let object = result.context(format!("loading object {re}"))?;
        self.cache.insert(re.num, object.clone());
        Ok(object)
    }

    fn load_uncached(&mut self, re: ObjRef, entry: XrefEntry) -> Result<Object> {
        match entry {
            XrefEntry::Free { .. } => Ok(Object::Null),
            XrefEntry::Offset { offset, gen } => {
                if gen != re.gen {
                    return Err(Error::range(format!(
                        "generation mismatch: wanted {re}, xref has generation {gen}"
                    )));
                }
                let data = self.data.clone();
                let ind = parser::parse_indirect_at(&data, offset as usize, &mut |len_ref| {
                    self.load_object(len_ref).ok().and_then(|o| o.as_int())
                })?;
                if ind.re.num != re.num {
                    return Err(Error::range(format!(
                        "xref points {re} at object {}",
                        ind.re
                    )));
                }
                let mut object = ind.object;
                self.decrypt_loaded(&mut object, re);
                Ok(object)
            },
            XrefEntry::InStream { stream_num, index } => {
                let decoded = self.load_objstm_content(stream_num)?;
                let holder = self.load_object(ObjRef::new(stream_num, 0))?;
                let stream = holder.as_stream().ok_or_else(|| {
                    Error::syntax(format!("object stream {stream_num} is not a stream"))
                })?;
                objstm::load_from_objstm(stream, &decoded, re.num, index)
            },
        }
    }

    /// Decode (decrypting if needed) the content of object stream `num`.
    fn load_objstm_content(&mut self, num: u32) -> Result<Arc<Vec<u8>>> {
        if let Some(content) = self.objstm_cache.get(&num) {
            return Ok(content.clone());
        }
        let re = ObjRef::new(num, 0);
        let holder = self.load_object(re)?;
        let stream = holder
            .as_stream()
            .ok_or_else(|| Error::syntax(format!("object stream {num} is not a stream")))?;
        if stream.dict.get_name("Type") != Some("ObjStm") {
            log::warn!("object stream {num} lacks /Type /ObjStm");
        }
        let decoded = Arc::new(self.decode_stream(stream, Some(re))?);
        self.objstm_cache.insert(num, decoded.clone());
        Ok(decoded)
    }

    /// Recursively decrypt string values of a freshly loaded object.
    ///
    /// Stream payloads are decrypted later, in [`Document::decode_stream`],
    /// so their bytes stay lazily sliced until someone reads them.
    fn decrypt_loaded(&self, object: &mut Object, re: ObjRef) {
        let Some(crypt) = &self.crypt else { return };
        if !crypt.is_authenticated() {
            return;
        }
        decrypt_strings(object, crypt, re);
    }

    /// Resolve an object: follow reference chains to a direct value.
    pub fn resolve(&mut self, obj: &Object) -> Result<Object> {
        let mut current = obj.clone();
        for _ in 0..MAX_RESOLVE_DEPTH {
            match current {
                Object::Ref(re) => current = self.load_object(re)?,
                direct => return Ok(direct),
            }
        }
        Err(Error::range("reference chain exceeds depth limit"))
    }

    /// Resolve a dictionary entry.
    pub fn resolve_key(&mut self, dict: &Dict, key: &str) -> Result<Object> {
        match dict.get(key) {
            Some(obj) => self.resolve(obj),
            None => Ok(Object::Null),
        }
    }

    /// Decode a stream's payload: decrypt, then run the filter chain.
    ///
    /// Image codec filters (DCT/JPX/JBIG2) terminate the chain; the bytes
    /// returned are then the codec payload for the image layer.
    pub fn decode_stream(&mut self, stream: &Stream, re: Option<ObjRef>) -> Result<Vec<u8>> {
        let raw = match (&self.crypt, re) {
            (Some(crypt), Some(re))
                if crypt.is_authenticated() && !is_crypt_exempt(&stream.dict) =>
            {
                crypt.decrypt_stream(&stream.data, re)?
            },
            (Some(crypt), _) if !crypt.is_authenticated() => {
                return Err(Error::Auth("document key not established".into()));
            },
            _ => stream.data.to_vec(),
        };

        let filter = match stream.dict.get("Filter") {
            Some(f @ Object::Ref(_)) => Some(self.resolve(f)?),
            other => other.cloned(),
        };
        let parms = match stream.dict.get("DecodeParms") {
            Some(p @ Object::Ref(_)) => Some(self.resolve(p)?),
            other => other.cloned(),
        };
        let chain = decoders::filter_chain(filter.as_ref(), parms.as_ref());
        decoders::decode_chain(&raw, &chain)
    }

    /// Load and fully decode the stream object `re`.
    pub fn open_stream(&mut self, re: ObjRef) -> Result<Vec<u8>> {
        let object = self.load_object(re)?;
        let stream = object
            .as_stream()
            .ok_or_else(|| Error::syntax(format!("object {re} is not a stream")))?;
        self.decode_stream(stream, Some(re))
    }

    /// The document catalog.
    pub fn catalog(&mut self) -> Result<Dict> {
        let root = self
            .trailer()
            .get("Root")
            .cloned()
            .ok_or_else(|| Error::syntax("trailer has no /Root"))?;
        self.resolve(&root)?.into_dict()
    }

    /// Number of pages in the document.
    pub fn page_count(&mut self) -> Result<usize> {
        Ok(self.page_refs()?.len())
    }

    /// All page leaf references in document order.
    ///
    /// The page tree is walked with a marking set, so the parent/kids
    /// cycles that real files contain terminate.
    pub fn page_refs(&mut self) -> Result<Vec<ObjRef>> {
        let catalog = self.catalog()?;
        let pages = self
            .resolve_key(&catalog, "Pages")
            .context("loading page tree root")?;
        let root_ref = catalog.get("Pages").and_then(Object::as_ref);

        let mut out = Vec::new();
        let mut marks = HashSet::new();
        if let Some(re) = root_ref {
            marks.insert(re.num);
        }
        self.collect_pages(&pages.into_dict()?, &mut out, &mut marks, 0)?;
        Ok(out)
    }

    fn collect_pages(
        &mut self,
        node: &Dict,
        out: &mut Vec<ObjRef>,
        marks: &mut HashSet<u32>,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_RESOLVE_DEPTH {
            return Err(Error::range("page tree deeper than 32 levels"));
        }
        let kids = match node.get("Kids") {
            Some(kids) => self.resolve(kids)?,
            None => {
                // A /Pages node without kids: tolerate as empty
                return Ok(());
            },
        };
        for kid in kids.as_array().unwrap_or(&[]) {
            let Some(kid_ref) = kid.as_ref() else {
                log::warn!("page tree kid is not a reference, skipping");
                continue;
            };
            if !marks.insert(kid_ref.num) {
                log::warn!("cycle in page tree at {kid_ref}, skipping");
                continue;
            }
            let kid_obj = self.load_object(kid_ref)?;
            let Some(kid_dict) = kid_obj.as_dict() else {
                log::warn!("page tree kid {kid_ref} is not a dictionary, skipping");
                continue;
            };
            match kid_dict.get_name("Type") {
                Some("Pages") => {
                    let kid_dict = kid_dict.clone();
                    self.collect_pages(&kid_dict, out, marks, depth + 1)?;
                },
                // Missing /Type on a leaf is common; treat as a page
                _ => out.push(kid_ref),
            }
        }
        Ok(())
    }

    /// Construct the page at `index` (zero-based).
    pub fn page(&mut self, index: usize) -> Result<Page> {
        let refs = self.page_refs()?;
        let re = *refs
            .get(index)
            .ok_or_else(|| Error::range(format!("page index {index} of {}", refs.len())))?;
        self.build_page(re, index)
    }

    fn build_page(&mut self, re: ObjRef, index: usize) -> Result<Page> {
        let mut media_box = None;
        let mut crop_box = None;
        let mut resources = None;
        let mut rotate = None;
        let mut user_unit = 1.0f32;

        // Walk from the leaf up through /Parent collecting inheritable
        // attributes, nearest ancestor first.
        let mut node_ref = Some(re);
        let mut marks = HashSet::new();
        let mut page_dict = None;
        while let Some(current) = node_ref {
            if !marks.insert(current.num) {
                log::warn!("cycle in page ancestry at {current}");
                break;
            }
            let dict = self.load_object(current)?.into_dict()?;
            if media_box.is_none() {
                media_box = self.rect_entry(&dict, "MediaBox")?;
            }
            if crop_box.is_none() {
                crop_box = self.rect_entry(&dict, "CropBox")?;
            }
            if resources.is_none() {
                if let Object::Dict(res) = self.resolve_key(&dict, "Resources")? {
                    resources = Some(res);
                }
            }
            if rotate.is_none() {
                rotate = self.resolve_key(&dict, "Rotate")?.as_int();
            }
            if let Some(uu) = dict.get_number("UserUnit") {
                user_unit = uu as f32;
            }
            let parent = dict.get("Parent").and_then(Object::as_ref);
            if page_dict.is_none() {
                page_dict = Some(dict);
            }
            node_ref = parent;
        }

        let media_box = media_box.unwrap_or(DEFAULT_MEDIA_BOX);
        let crop_box = crop_box
            .map(|c| c.intersect(media_box))
            .filter(|c| !c.is_empty())
            .unwrap_or(media_box);
        let rotate = rotate.map_or(0, |r| r.rem_euclid(360) / 90 * 90) as i32;

        let page_dict = page_dict.unwrap_or_default();
        let contents = self.page_contents(&page_dict)?;

        Ok(Page {
            index,
            re,
            dict: page_dict,
            media_box,
            crop_box,
            rotate,
            user_unit,
            resources: resources.unwrap_or_default(),
            contents,
        })
    }

    fn rect_entry(&mut self, dict: &Dict, key: &str) -> Result<Option<Rect>> {
        let value = self.resolve_key(dict, key)?;
        let Some(arr) = value.as_array() else {
            return Ok(None);
        };
        if arr.len() != 4 {
            log::warn!("/{key} has {} elements, ignoring", arr.len());
            return Ok(None);
        }
        let mut vals = [0.0f32; 4];
        for (slot, obj) in vals.iter_mut().zip(arr) {
            *slot = self.resolve(obj)?.as_number().unwrap_or(0.0) as f32;
        }
        Ok(Some(Rect::from_corners(
            crate::geometry::Point::new(vals[0], vals[1]),
            crate::geometry::Point::new(vals[2], vals[3]),
        )))
    }

    /// Concatenate a page's content streams.
    fn page_contents(&mut self, page: &Dict) -> Result<Vec<u8>> {
        let contents = self.resolve_key(page, "Contents")?;
        let mut out = Vec::new();
        match contents {
            Object::Stream(stream) => {
                let re = page.get("Contents").and_then(Object::as_ref);
                out = self.decode_stream(&stream, re)?;
            },
            Object::Array(parts) => {
                for part in parts {
                    let Some(re) = part.as_ref() else { continue };
                    match self.open_stream(re) {
                        Ok(bytes) => {
                            if !out.is_empty() {
                                out.push(b'\n');
                            }
                            out.extend_from_slice(&bytes);
                        },
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => log::warn!("skipping unreadable content stream {re}: {e}"),
                    }
                }
            },
            Object::Null => {},
            other => {
                log::warn!("/Contents is {}, ignoring", other.type_name());
            },
        }
        Ok(out)
    }

    /// Age the resource store and evict down to budget. Call between page
    /// renders.
    pub fn age_store(&mut self) {
        self.store.age_and_evict();
    }

    /// A shared handle to the raw file bytes.
    pub fn bytes(&self) -> &Bytes {
        &self.data
    }
}

/// True for streams the standard handler never encrypts.
fn is_crypt_exempt(dict: &Dict) -> bool {
    matches!(dict.get_name("Type"), Some("XRef"))
}

fn decrypt_strings(object: &mut Object, crypt: &EncryptionHandler, re: ObjRef) {
    match object {
        Object::String(bytes) => match crypt.decrypt_string(bytes, re) {
            Ok(plain) => *bytes = plain,
            Err(e) => log::warn!("string decryption failed for {re}: {e}"),
        },
        Object::Array(items) => {
            for item in items {
                decrypt_strings(item, crypt, re);
            }
        },
        Object::Dict(dict) => {
            for (_, value) in dict.iter_mut() {
                decrypt_strings(value, crypt, re);
            }
        },
        Object::Stream(stream) => {
            for (_, value) in stream.dict.iter_mut() {
                decrypt_strings(value, crypt, re);
            }
        },
        _ => {},
    }
}

fn parse_version(data: &[u8]) -> Result<(u8, u8)> {
    let head = &data[..data.len().min(1024)];
    let at = parser::find_subsequence(head, b"%PDF-")
        .ok_or_else(|| Error::syntax("missing %PDF- header"))?;
    let rest = &head[at + 5..];
    let major = rest
        .first()
        .filter(|d| u8::is_ascii_digit(d))
        .map(|d| d - b'0')
        .ok_or_else(|| Error::syntax("malformed version in header"))?;
    let minor = match rest.get(1) {
        Some(b'.') => rest
            .get(2)
            .filter(|d| d.is_ascii_digit())
            .map_or(0, |d| d - b'0'),
        _ => 0,
    };
    Ok((major, minor))
}

/// A page constructed from the page tree, with inherited attributes
/// resolved and content streams decoded.
#[derive(Debug, Clone)]
pub struct Page {
    /// Zero-based page index
    pub index: usize,
    /// The page object's reference
    pub re: ObjRef,
    /// The page dictionary itself
    pub dict: Dict,
    /// Media box (inherited; defaults to US Letter)
    pub media_box: Rect,
    /// Crop box intersected with the media box
    pub crop_box: Rect,
    /// Rotation, normalized to 0/90/180/270
    pub rotate: i32,
    /// /UserUnit scale (1.0 = 1/72 inch)
    pub user_unit: f32,
    /// Resource dictionary (inherited when absent on the leaf)
    pub resources: Dict,
    /// Concatenated, decoded content stream bytes
    pub contents: Vec<u8>,
}

impl Page {
    /// Build the page-to-device transform for a target resolution, and the
    /// pixel bounds of the resulting page raster.
    ///
    /// Device space has y growing downward with the origin at the top-left
    /// of the (rotated) crop box.
    pub fn transform(&self, dpi: f32) -> (Matrix, crate::geometry::IRect) {
        let scale = dpi / 72.0 * self.user_unit;
        let m = Matrix::scale(scale, scale)
            .concat(&Matrix::rotate(self.rotate as f32))
            .concat(&Matrix::scale(1.0, -1.0));
        let bbox = m.transform_rect(self.crop_box);
        let m = m.concat(&Matrix::translate(-bbox.x0, -bbox.y0));
        let pixels = Rect::new(0.0, 0.0, bbox.width(), bbox.height()).round_out();
        (m, pixels)
    }
}

// ============================================================================
// Resource store
// ============================================================================

/// A cached, shared resource keyed by the indirect reference that produced
/// it.
#[derive(Clone)]
pub enum Resource {
    /// A loaded font
    Font(Arc<crate::fonts::Font>),
    /// A loaded colorspace
    Colorspace(Arc<crate::colorspace::Colorspace>),
    /// A loaded image (compressed, with its decode recipe)
    Image(Arc<crate::image::Image>),
    /// A parsed CMap
    CMap(Arc<crate::fonts::cmap::CMap>),
}

/// LRU store for fonts, colorspaces, images, and CMaps.
///
/// Entries carry a last-use stamp; [`ResourceStore::age_and_evict`] drops
/// the least recently used entries until the store is back under budget.
pub struct ResourceStore {
    items: HashMap<ObjRef, (Resource, u64)>,
    clock: u64,
    budget: usize,
}

impl ResourceStore {
    /// Create a store holding at most `budget` entries after eviction.
    pub fn new(budget: usize) -> Self {
        Self {
            items: HashMap::new(),
            clock: 0,
            budget,
        }
    }

    /// Look up a resource, refreshing its age.
    pub fn get(&mut self, key: ObjRef) -> Option<Resource> {
        self.clock += 1;
        let clock = self.clock;
        self.items.get_mut(&key).map(|(res, stamp)| {
            *stamp = clock;
            res.clone()
        })
    }

    /// Insert a resource under its defining reference.
    pub fn put(&mut self, key: ObjRef, resource: Resource) {
        self.clock += 1;
        self.items.insert(key, (resource, self.clock));
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Evict least-recently-used entries until at or under budget.
    pub fn age_and_evict(&mut self) {
        while self.items.len() > self.budget {
            let Some((&oldest, _)) = self.items.iter().min_by_key(|(_, (_, stamp))| *stamp) else {
                break;
            };
            self.items.remove(&oldest);
        }
    }
}

/// Per-render options shared by the convenience entry points.
pub struct RenderOptions<'a> {
    /// Target resolution in dots per inch
    pub dpi: f32,
    /// Anti-alias level: 0, 2, 4, or 8 sub-scanlines
    pub aa_level: u8,
    /// Optional-content usage event ("View" or "Print")
    pub event: &'a str,
    /// Cancellation cookie
    pub cookie: Option<&'a Cookie>,
}

impl Default for RenderOptions<'_> {
    fn default() -> Self {
        Self {
            dpi: 72.0,
            aa_level: 8,
            event: "View",
            cookie: None,
        }
    }
}

/// A tiny one-page file with the given page attributes and content,
/// shared by unit tests across the crate.
#[cfg(test)]
pub(crate) fn test_pdf(media_box: &str, content: &str) -> Vec<u8> {
    let mut pdf = Vec::new();
    let mut offsets = vec![0usize; 6];
    pdf.extend_from_slice(b"%PDF-1.4\n");
    offsets[1] = pdf.len();
    pdf.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    offsets[2] = pdf.len();
    pdf.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    offsets[3] = pdf.len();
    pdf.extend_from_slice(
        format!(
            "3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [{media_box}] /Contents 4 0 R >> endobj\n"
        )
        .as_bytes(),
    );
    offsets[4] = pdf.len();
    pdf.extend_from_slice(
        format!("4 0 obj << /Length {} >> stream\n{content}\nendstream endobj\n", content.len())
            .as_bytes(),
    );
    let xref_at = pdf.len();
    pdf.extend_from_slice(b"xref\n0 5\n0000000000 65535 f \n");
    for offset in &offsets[1..5] {
        pdf.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    pdf.extend_from_slice(b"trailer << /Size 5 /Root 1 0 R >>\n");
    pdf.extend_from_slice(format!("startxref\n{xref_at}\n%%EOF").as_bytes());
    pdf
}
