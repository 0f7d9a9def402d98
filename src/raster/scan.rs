//! Scanline conversion with a global/active edge list.
//!
//! Segments become edges sorted by starting y (the GEL). Per scanline,
//! edges starting there move into the active list (the AEL), which is
//! sorted by current x and walked in winding pairs (non-zero or even-odd)
//! to emit coverage spans. Anti-aliasing comes from vertical
//! supersampling: 0, 2, 4, or 8 sub-scanlines per pixel with fractional
//! horizontal coverage accumulated per crossing.

use crate::geometry::{IRect, Point};

/// Coverage units contributed by one fully covered pixel on one subline.
const UNIT: u32 = 256;

#[derive(Debug, Clone, Copy)]
struct Edge {
    /// Top y (smaller), bottom y
    y0: f32,
    y1: f32,
    /// x at y0 and inverse slope
    x0: f32,
    dxdy: f32,
    /// +1 when the original segment pointed downward, -1 upward
    winding: i32,
}

/// Rasterize `segments` into coverage rows over `clip` pixel bounds.
///
/// `span` receives each non-empty row: (device y, device x of first
/// element, coverage bytes). Coverage 255 means fully inside.
pub fn fill_segments(
    segments: &[(Point, Point)],
    clip: IRect,
    even_odd: bool,
    aa_level: u8,
    span: &mut dyn FnMut(i32, i32, &[u8]),
) {
    if clip.is_empty() || segments.is_empty() {
        return;
    }
    let sublines = match aa_level {
        0 | 1 => 1u32,
        2 => 2,
        4 => 4,
        _ => 8,
    };

    // Build the GEL, dropping horizontals
    let mut gel: Vec<Edge> = segments
        .iter()
        .filter_map(|&(a, b)| {
            if (a.y - b.y).abs() < 1e-9 {
                return None;
            }
            let (top, bottom, winding) = if a.y < b.y { (a, b, 1) } else { (b, a, -1) };
            let dxdy = (bottom.x - top.x) / (bottom.y - top.y);
            Some(Edge {
                y0: top.y,
                y1: bottom.y,
                x0: top.x,
                dxdy,
                winding,
            })
        })
        .collect();
    if gel.is_empty() {
        return;
    }
    gel.sort_by(|a, b| a.y0.total_cmp(&b.y0).then(a.x0.total_cmp(&b.x0)));

    let min_y = gel
        .iter()
        .map(|e| e.y0)
        .fold(f32::MAX, f32::min)
        .floor()
        .max(clip.y0 as f32) as i32;
    let max_y = gel
        .iter()
        .map(|e| e.y1)
        .fold(f32::MIN, f32::max)
        .ceil()
        .min(clip.y1 as f32) as i32;

    let width = clip.width() as usize;
    let mut accumulator = vec![0u32; width];
    let mut row = vec![0u8; width];
    let mut ael: Vec<usize> = Vec::new();
    let mut next_edge = 0usize;
    let mut crossings: Vec<(f32, i32)> = Vec::new();

    for y in min_y..max_y {
        accumulator.fill(0);
        let mut touched = false;

        for s in 0..sublines {
            let sample_y = y as f32 + (s as f32 + 0.5) / sublines as f32;

            // Admit GEL edges whose span reaches this subline
            while next_edge < gel.len() && gel[next_edge].y0 <= sample_y {
                ael.push(next_edge);
                next_edge += 1;
            }
            // Retire finished edges
            ael.retain(|&i| gel[i].y1 > sample_y);
            if ael.is_empty() {
                continue;
            }

            // Current x for each active edge
            crossings.clear();
            for &i in &ael {
                let e = &gel[i];
                if e.y0 <= sample_y {
                    crossings.push((e.x0 + (sample_y - e.y0) * e.dxdy, e.winding));
                }
            }
            crossings.sort_by(|a, b| a.0.total_cmp(&b.0));

            // Walk winding pairs
            let mut winding = 0i32;
            let mut span_start = 0.0f32;
            for &(x, w) in &crossings {
                let was_inside = if even_odd {
                    winding % 2 != 0
                } else {
                    winding != 0
                };
                winding += w;
                let is_inside = if even_odd {
                    winding % 2 != 0
                } else {
                    winding != 0
                };
                if !was_inside && is_inside {
                    span_start = x;
                } else if was_inside && !is_inside {
                    touched |= accumulate(&mut accumulator, clip, span_start, x);
                }
            }
        }

        if !touched {
            continue;
        }
        let full = UNIT * sublines;
        for (dst, &acc) in row.iter_mut().zip(&accumulator) {
            *dst = ((acc.min(full) * 255 + full / 2) / full) as u8;
        }
        // Trim to the dirty extent
        let first = row.iter().position(|&c| c != 0);
        let last = row.iter().rposition(|&c| c != 0);
        if let (Some(first), Some(last)) = (first, last) {
            span(y, clip.x0 + first as i32, &row[first..=last]);
        }
    }
}

/// Add fractional coverage for the span [x0, x1) on one subline.
fn accumulate(accumulator: &mut [u32], clip: IRect, x0: f32, x1: f32) -> bool {
    let left = x0.max(clip.x0 as f32);
    let right = x1.min(clip.x1 as f32);
    if right <= left {
        return false;
    }
    let first = left.floor() as i32;
    let last = (right.ceil() as i32 - 1).max(first);

    for px in first..=last {
        let idx = (px - clip.x0) as usize;
        if idx >= accumulator.len() {
            break;
        }
        let cover_left = left.max(px as f32);
        let cover_right = right.min((px + 1) as f32);
        let frac = (cover_right - cover_left).max(0.0);
        accumulator[idx] += (frac * UNIT as f32 + 0.5) as u32;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect_segments(x0: f32, y0: f32, x1: f32, y1: f32) -> Vec<(Point, Point)> {
        let a = Point::new(x0, y0);
        let b = Point::new(x1, y0);
        let c = Point::new(x1, y1);
        let d = Point::new(x0, y1);
        vec![(a, b), (b, c), (c, d), (d, a)]
    }

    fn render(
        segments: &[(Point, Point)],
        clip: IRect,
        even_odd: bool,
        aa: u8,
    ) -> Vec<Vec<u8>> {
        let mut rows = vec![vec![0u8; clip.width() as usize]; clip.height() as usize];
        fill_segments(segments, clip, even_odd, aa, &mut |y, x, cov| {
            let row = &mut rows[(y - clip.y0) as usize];
            for (i, &c) in cov.iter().enumerate() {
                row[(x - clip.x0) as usize + i] = c;
            }
        });
        rows
    }

    #[test]
    fn test_pixel_aligned_rect_is_fully_covered() {
        let rows = render(
            &rect_segments(0.0, 0.0, 4.0, 4.0),
            IRect::new(0, 0, 4, 4),
            false,
            8,
        );
        for row in &rows {
            assert!(row.iter().all(|&c| c == 255), "{row:?}");
        }
    }

    #[test]
    fn test_half_pixel_coverage() {
        // Rectangle covering the left half of a single pixel column
        let rows = render(
            &rect_segments(0.0, 0.0, 0.5, 1.0),
            IRect::new(0, 0, 1, 1),
            false,
            8,
        );
        let c = rows[0][0];
        assert!((120..=135).contains(&c), "half coverage was {c}");
    }

    #[test]
    fn test_outside_clip_is_dropped() {
        let rows = render(
            &rect_segments(10.0, 10.0, 20.0, 20.0),
            IRect::new(0, 0, 4, 4),
            false,
            8,
        );
        assert!(rows.iter().all(|r| r.iter().all(|&c| c == 0)));
    }

    #[test]
    fn test_even_odd_hole() {
        // Two nested same-direction rectangles: even-odd leaves a hole
        let mut segments = rect_segments(0.0, 0.0, 6.0, 6.0);
        segments.extend(rect_segments(2.0, 2.0, 4.0, 4.0));
        let rows = render(&segments, IRect::new(0, 0, 6, 6), true, 8);
        assert_eq!(rows[3][3], 0);
        assert_eq!(rows[0][0], 255);
        // Non-zero with same winding direction fills solid
        let rows_nz = render(&segments, IRect::new(0, 0, 6, 6), false, 8);
        assert_eq!(rows_nz[3][3], 255);
    }

    #[test]
    fn test_no_aa_still_fills() {
        let rows = render(
            &rect_segments(0.0, 0.0, 3.0, 3.0),
            IRect::new(0, 0, 3, 3),
            false,
            0,
        );
        assert!(rows.iter().all(|r| r.iter().all(|&c| c == 255)));
    }

    #[test]
    fn test_triangle_partial_edges() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(4.0, 0.0);
        let c = Point::new(0.0, 4.0);
        let rows = render(&[(a, b), (b, c), (c, a)], IRect::new(0, 0, 4, 4), false, 8);
        // Corner near the hypotenuse is mostly empty; near the right angle full
        assert_eq!(rows[0][0], 255);
        assert!(rows[3][3] < 32);
    }
}
