//! Glyph cache: rendered glyph masks keyed by a deterministic quantization
//! of the rendering parameters.
//!
//! Keys are built from the font identity, glyph id, antialias level, an
//! optional stroke fingerprint, and the glyph transform quantized to
//! 1/65536 — never from raw struct bytes, so layout changes cannot alias
//! cache entries. The cache is bounded by sample bytes; eviction drops the
//! least recently used entries until back under budget.

use super::pixmap::Pixmap;
use crate::geometry::Matrix;
use std::collections::HashMap;
use std::sync::Arc;

/// Cache key: everything that affects a rendered glyph mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlyphKey {
    /// Identity of the font (resource-store pointer identity)
    pub font_id: usize,
    /// Glyph id within the font
    pub gid: u16,
    /// Antialias level the mask was rendered at
    pub aa_level: u8,
    /// Stroke fingerprint, 0 for filled glyphs
    pub stroke: u64,
    /// Transform coefficients quantized to 1/65536
    pub qa: i32,
    /// Quantized b coefficient
    pub qb: i32,
    /// Quantized c coefficient
    pub qc: i32,
    /// Quantized d coefficient
    pub qd: i32,
    /// Sub-pixel x offset in 1/4 pixel steps
    pub qx: u8,
    /// Sub-pixel y offset in 1/4 pixel steps
    pub qy: u8,
}

impl GlyphKey {
    /// Build a key from the glyph transform. The translation only
    /// contributes its fractional part, quantized to quarter pixels.
    pub fn new(font_id: usize, gid: u16, aa_level: u8, stroke: u64, trm: &Matrix) -> Self {
        let q = |v: f32| (v * 65536.0).round() as i32;
        let frac = |v: f32| (((v - v.floor()) * 4.0).round() as i32 & 3) as u8;
        Self {
            font_id,
            gid,
            aa_level,
            stroke,
            qa: q(trm.a),
            qb: q(trm.b),
            qc: q(trm.c),
            qd: q(trm.d),
            qx: frac(trm.e),
            qy: frac(trm.f),
        }
    }
}

/// A cached rendered glyph: the mask plus its offset from the glyph
/// origin.
#[derive(Debug, Clone)]
pub struct CachedGlyph {
    /// Coverage mask
    pub mask: Arc<Pixmap>,
    /// Mask x offset relative to the (floored) glyph origin
    pub left: i32,
    /// Mask y offset relative to the (floored) glyph origin
    pub top: i32,
}

/// Bounded LRU cache of rendered glyph masks.
pub struct GlyphCache {
    entries: HashMap<GlyphKey, (CachedGlyph, u64)>,
    clock: u64,
    bytes: usize,
    budget: usize,
}

impl GlyphCache {
    /// Default budget: 1 MiB of mask samples.
    pub const DEFAULT_BUDGET: usize = 1 << 20;

    /// Create a cache bounded to `budget` sample bytes.
    pub fn new(budget: usize) -> Self {
        Self {
            entries: HashMap::new(),
            clock: 0,
            bytes: 0,
            budget,
        }
    }

    /// Look up a glyph, refreshing its age.
    pub fn get(&mut self, key: &GlyphKey) -> Option<CachedGlyph> {
        self.clock += 1;
        let clock = self.clock;
        self.entries.get_mut(key).map(|(glyph, stamp)| {
            *stamp = clock;
            glyph.clone()
        })
    }

    /// Install a rendered glyph, evicting LRU entries past budget.
    pub fn put(&mut self, key: GlyphKey, glyph: CachedGlyph) {
        self.clock += 1;
        let size = glyph.mask.samples.len();
        if let Some((old, _)) = self.entries.insert(key, (glyph, self.clock)) {
            self.bytes -= old.mask.samples.len();
        }
        self.bytes += size;

        while self.bytes > self.budget && self.entries.len() > 1 {
            let Some((&oldest, _)) = self
                .entries
                .iter()
                .min_by_key(|(_, (_, stamp))| *stamp)
            else {
                break;
            };
            if let Some((dropped, _)) = self.entries.remove(&oldest) {
                self.bytes -= dropped.mask.samples.len();
            }
        }
    }

    /// Number of cached glyphs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for GlyphCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BUDGET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::IRect;

    fn glyph(w: u32, h: u32) -> CachedGlyph {
        CachedGlyph {
            mask: Arc::new(Pixmap::mask(IRect::new(0, 0, w as i32, h as i32))),
            left: 0,
            top: 0,
        }
    }

    #[test]
    fn test_key_quantization_stable() {
        let m1 = Matrix::new(12.0, 0.0, 0.0, 12.0, 100.25, 7.5);
        let m2 = Matrix::new(12.0, 0.0, 0.0, 12.0, 350.25, 99.5);
        // Same scale and same sub-pixel phase: same key
        let k1 = GlyphKey::new(1, 40, 8, 0, &m1);
        let k2 = GlyphKey::new(1, 40, 8, 0, &m2);
        assert_eq!(k1, k2);
        // Different scale differs
        let m3 = Matrix::new(13.0, 0.0, 0.0, 12.0, 100.25, 7.5);
        assert_ne!(k1, GlyphKey::new(1, 40, 8, 0, &m3));
    }

    #[test]
    fn test_stroke_fingerprint_separates_entries() {
        let m = Matrix::scale(10.0, 10.0);
        assert_ne!(
            GlyphKey::new(1, 2, 8, 0, &m),
            GlyphKey::new(1, 2, 8, 0xDEAD, &m)
        );
    }

    #[test]
    fn test_hit_and_miss() {
        let mut cache = GlyphCache::default();
        let key = GlyphKey::new(1, 65, 8, 0, &Matrix::scale(12.0, 12.0));
        assert!(cache.get(&key).is_none());
        cache.put(key, glyph(8, 8));
        assert!(cache.get(&key).is_some());
    }

    #[test]
    fn test_eviction_under_budget() {
        let mut cache = GlyphCache::new(1000);
        for gid in 0..50u16 {
            let key = GlyphKey::new(1, gid, 8, 0, &Matrix::scale(12.0, 12.0));
            cache.put(key, glyph(10, 10)); // 100 bytes each
        }
        assert!(cache.bytes <= 1000);
        assert!(cache.len() <= 10);
    }
}
