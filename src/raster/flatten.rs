//! Path flattening, dash expansion, and stroke outlining.
//!
//! Curves are subdivided until the control polygon deviates from its chord
//! by less than the flatness tolerance (already scaled into device space
//! by the caller). Strokes become fill geometry: a quad per segment plus
//! join and cap polygons, all wound the same way so the non-zero rule
//! unions them.

use super::path::{LineCap, LineJoin, Path, PathElement, StrokeState};
use crate::geometry::Point;

/// A flattened subpath: a polyline and whether it was explicitly closed.
#[derive(Debug, Clone)]
pub struct Subpath {
    /// Polyline vertices
    pub points: Vec<Point>,
    /// Whether the subpath ended with a closepath
    pub closed: bool,
}

/// A fully flattened path.
#[derive(Debug, Clone, Default)]
pub struct FlatPath {
    /// The flattened subpaths
    pub subpaths: Vec<Subpath>,
}

impl FlatPath {
    /// All boundary segments, closing each subpath implicitly (fill rule).
    pub fn fill_segments(&self) -> Vec<(Point, Point)> {
        let mut out = Vec::new();
        for sub in &self.subpaths {
            for pair in sub.points.windows(2) {
                out.push((pair[0], pair[1]));
            }
            if sub.points.len() > 2 {
                let first = sub.points[0];
                let last = sub.points[sub.points.len() - 1];
                if first != last {
                    out.push((last, first));
                }
            }
        }
        out
    }
}

const MAX_CURVE_DEPTH: u32 = 16;

/// Flatten `path` with the given flatness tolerance (device units).
pub fn flatten(path: &Path, flatness: f32) -> FlatPath {
    let tolerance = flatness.max(0.01);
    let mut out = FlatPath::default();
    let mut current: Option<Subpath> = None;
    let mut start = Point::default();

    let finish = |sub: Option<Subpath>, out: &mut FlatPath| {
        if let Some(sub) = sub {
            if sub.points.len() >= 2 {
                out.subpaths.push(sub);
            }
        }
    };

    for element in &path.elements {
        match *element {
            PathElement::MoveTo(p) => {
                finish(current.take(), &mut out);
                start = p;
                current = Some(Subpath {
                    points: vec![p],
                    closed: false,
                });
            },
            PathElement::LineTo(p) => {
                if let Some(sub) = &mut current {
                    sub.points.push(p);
                } else {
                    start = p;
                    current = Some(Subpath {
                        points: vec![p],
                        closed: false,
                    });
                }
            },
            PathElement::CurveTo(c1, c2, p) => {
                if let Some(sub) = &mut current {
                    let from = *sub.points.last().unwrap_or(&p);
                    subdivide_cubic(from, c1, c2, p, tolerance, 0, &mut sub.points);
                }
            },
            PathElement::Close => {
                if let Some(mut sub) = current.take() {
                    if *sub.points.last().unwrap_or(&start) != start {
                        sub.points.push(start);
                    }
                    sub.closed = true;
                    if sub.points.len() >= 2 {
                        out.subpaths.push(sub);
                    }
                    // A new segment after close restarts at the subpath start
                    current = Some(Subpath {
                        points: vec![start],
                        closed: false,
                    });
                }
            },
        }
    }
    finish(current, &mut out);
    out
}

/// Recursive de Casteljau subdivision; appends all points after `from`.
fn subdivide_cubic(
    from: Point,
    c1: Point,
    c2: Point,
    to: Point,
    tolerance: f32,
    depth: u32,
    out: &mut Vec<Point>,
) {
    if depth >= MAX_CURVE_DEPTH || cubic_is_flat(from, c1, c2, to, tolerance) {
        out.push(to);
        return;
    }
    let mid = |a: Point, b: Point| Point::new((a.x + b.x) * 0.5, (a.y + b.y) * 0.5);
    let ab = mid(from, c1);
    let bc = mid(c1, c2);
    let cd = mid(c2, to);
    let abc = mid(ab, bc);
    let bcd = mid(bc, cd);
    let split = mid(abc, bcd);
    subdivide_cubic(from, ab, abc, split, tolerance, depth + 1, out);
    subdivide_cubic(split, bcd, cd, to, tolerance, depth + 1, out);
}

/// Control-point deviation from the chord, compared against tolerance.
fn cubic_is_flat(from: Point, c1: Point, c2: Point, to: Point, tolerance: f32) -> bool {
    let dev = |c: Point| {
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        let len_sq = dx * dx + dy * dy;
        if len_sq < 1e-12 {
            return c.distance(from);
        }
        // Perpendicular distance from c to the chord
        ((c.x - from.x) * dy - (c.y - from.y) * dx).abs() / len_sq.sqrt()
    };
    dev(c1) <= tolerance && dev(c2) <= tolerance
}

/// Materialize a dash pattern into open subpaths.
pub fn dash(flat: &FlatPath, dashes: &[f32], phase: f32) -> FlatPath {
    let total: f32 = dashes.iter().map(|d| d.max(0.0)).sum();
    if dashes.is_empty() || total <= 0.0 {
        return flat.clone();
    }

    let mut out = FlatPath::default();
    for sub in &flat.subpaths {
        let mut index = 0usize;
        let mut remaining = dashes[0].max(0.0);
        let mut on = true;

        // Consume the phase
        let mut phase_left = phase.max(0.0) % total;
        while phase_left > 0.0 {
            if phase_left >= remaining {
                phase_left -= remaining;
                index = (index + 1) % dashes.len();
                remaining = dashes[index].max(0.0);
                on = !on;
            } else {
                remaining -= phase_left;
                phase_left = 0.0;
            }
        }

        let mut active: Vec<Point> = Vec::new();
        if on {
            if let Some(&first) = sub.points.first() {
                active.push(first);
            }
        }

        for pair in sub.points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let mut seg_len = a.distance(b);
            let mut pos = a;
            while seg_len > 0.0 {
                let step = remaining.min(seg_len);
                let t = step / pos.distance(b).max(1e-12);
                let next = Point::new(pos.x + (b.x - pos.x) * t, pos.y + (b.y - pos.y) * t);
                if on {
                    active.push(next);
                }
                seg_len -= step;
                remaining -= step;
                pos = next;
                if remaining <= 1e-6 {
                    if on && active.len() >= 2 {
                        out.subpaths.push(Subpath {
                            points: std::mem::take(&mut active),
                            closed: false,
                        });
                    }
                    active.clear();
                    on = !on;
                    index = (index + 1) % dashes.len();
                    remaining = dashes[index].max(0.0);
                    if remaining <= 0.0 {
                        // Zero-length dash entries alternate instantly
                        on = !on;
                        index = (index + 1) % dashes.len();
                        remaining = dashes[index].max(1e-6);
                    }
                    if on {
                        active.push(pos);
                    }
                }
            }
        }
        if on && active.len() >= 2 {
            out.subpaths.push(Subpath {
                points: active,
                closed: false,
            });
        }
    }
    out
}

/// Expand a flattened (and already dashed) path into stroke fill geometry.
///
/// Returns boundary segments of uniformly wound polygons; fill them with
/// the non-zero rule. `line_width` is in device units.
pub fn stroke_outline(flat: &FlatPath, stroke: &StrokeState, line_width: f32) -> Vec<(Point, Point)> {
    let radius = (line_width * 0.5).max(0.05);
    let mut polys: Vec<Vec<Point>> = Vec::new();

    for sub in &flat.subpaths {
        let points = dedup(&sub.points);
        if points.len() < 2 {
            // Degenerate subpath: a dot, visible with round caps
            if let Some(&p) = points.first() {
                if stroke.cap == LineCap::Round {
                    polys.push(circle_poly(p, radius));
                }
            }
            continue;
        }

        for pair in points.windows(2) {
            polys.push(segment_quad(pair[0], pair[1], radius));
        }

        // Joins at interior vertices
        let join_count = if sub.closed {
            points.len() - 1
        } else {
            points.len().saturating_sub(2)
        };
        for j in 0..join_count {
            let (prev, at, next) = if sub.closed && j == points.len() - 2 {
                (points[j], points[j + 1], points[1])
            } else {
                (points[j], points[j + 1], points[j + 2])
            };
            polys.extend(join_poly(prev, at, next, radius, stroke));
        }

        if !sub.closed {
            polys.extend(cap_poly(points[1], points[0], radius, stroke.cap));
            let n = points.len();
            polys.extend(cap_poly(points[n - 2], points[n - 1], radius, stroke.cap));
        }
    }

    let mut segments = Vec::new();
    for poly in polys {
        let poly = wind_ccw(poly);
        for i in 0..poly.len() {
            segments.push((poly[i], poly[(i + 1) % poly.len()]));
        }
    }
    segments
}

fn dedup(points: &[Point]) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    for &p in points {
        if out.last().map_or(true, |&last| last.distance(p) > 1e-6) {
            out.push(p);
        }
    }
    out
}

fn normal(a: Point, b: Point, radius: f32) -> Point {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len = (dx * dx + dy * dy).sqrt().max(1e-12);
    Point::new(-dy / len * radius, dx / len * radius)
}

fn segment_quad(a: Point, b: Point, radius: f32) -> Vec<Point> {
    let n = normal(a, b, radius);
    vec![
        Point::new(a.x + n.x, a.y + n.y),
        Point::new(b.x + n.x, b.y + n.y),
        Point::new(b.x - n.x, b.y - n.y),
        Point::new(a.x - n.x, a.y - n.y),
    ]
}

fn circle_poly(center: Point, radius: f32) -> Vec<Point> {
    const STEPS: usize = 12;
    (0..STEPS)
        .map(|i| {
            let angle = i as f32 / STEPS as f32 * std::f32::consts::TAU;
            Point::new(
                center.x + radius * angle.cos(),
                center.y + radius * angle.sin(),
            )
        })
        .collect()
}

fn join_poly(prev: Point, at: Point, next: Point, radius: f32, stroke: &StrokeState) -> Vec<Vec<Point>> {
    let n0 = normal(prev, at, radius);
    let n1 = normal(at, next, radius);
    // Degenerate turn: nothing to fill
    if (n0.x - n1.x).abs() < 1e-6 && (n0.y - n1.y).abs() < 1e-6 {
        return Vec::new();
    }

    match stroke.join {
        LineJoin::Round => vec![circle_poly(at, radius)],
        LineJoin::Bevel => vec![bevel(at, n0, n1)],
        LineJoin::Miter => {
            // Outer side is where the turn opens; try the miter point and
            // fall back to bevel past the limit.
            let cos_half = {
                let d0 = Point::new(at.x - prev.x, at.y - prev.y);
                let d1 = Point::new(next.x - at.x, next.y - at.y);
                let l0 = (d0.x * d0.x + d0.y * d0.y).sqrt().max(1e-12);
                let l1 = (d1.x * d1.x + d1.y * d1.y).sqrt().max(1e-12);
                let dot = (d0.x * d1.x + d0.y * d1.y) / (l0 * l1);
                ((1.0 + dot.clamp(-1.0, 1.0)) / 2.0).sqrt()
            };
            let miter_ratio = if cos_half > 1e-6 { 1.0 / cos_half } else { f32::MAX };
            if miter_ratio > stroke.miter_limit {
                return vec![bevel(at, n0, n1)];
            }
            // Miter tip along the angle bisector of the two normals
            let bis = Point::new(n0.x + n1.x, n0.y + n1.y);
            let bis_len = (bis.x * bis.x + bis.y * bis.y).sqrt().max(1e-12);
            let tip_len = radius * miter_ratio;
            let side = if cross(n0, n1) >= 0.0 { 1.0 } else { -1.0 };
            let tip = Point::new(
                at.x + side * bis.x / bis_len * tip_len,
                at.y + side * bis.y / bis_len * tip_len,
            );
            let (o0, o1) = if side >= 0.0 { (n0, n1) } else { (neg(n0), neg(n1)) };
            vec![
                bevel(at, n0, n1),
                vec![
                    at,
                    Point::new(at.x + o0.x, at.y + o0.y),
                    tip,
                    Point::new(at.x + o1.x, at.y + o1.y),
                ],
            ]
        },
    }
}

fn bevel(at: Point, n0: Point, n1: Point) -> Vec<Point> {
    // Both sides; the inner triangle is covered by the segment quads
    vec![
        Point::new(at.x + n0.x, at.y + n0.y),
        Point::new(at.x + n1.x, at.y + n1.y),
        Point::new(at.x - n0.x, at.y - n0.y),
        Point::new(at.x - n1.x, at.y - n1.y),
    ]
}

fn cap_poly(from: Point, end: Point, radius: f32, cap: LineCap) -> Vec<Vec<Point>> {
    match cap {
        LineCap::Butt => Vec::new(),
        LineCap::Round => vec![circle_poly(end, radius)],
        LineCap::Square => {
            let n = normal(from, end, radius);
            // Direction past the endpoint
            let dx = end.x - from.x;
            let dy = end.y - from.y;
            let len = (dx * dx + dy * dy).sqrt().max(1e-12);
            let ext = Point::new(dx / len * radius, dy / len * radius);
            vec![vec![
                Point::new(end.x + n.x, end.y + n.y),
                Point::new(end.x + n.x + ext.x, end.y + n.y + ext.y),
                Point::new(end.x - n.x + ext.x, end.y - n.y + ext.y),
                Point::new(end.x - n.x, end.y - n.y),
            ]]
        },
    }
}

fn cross(a: Point, b: Point) -> f32 {
    a.x * b.y - a.y * b.x
}

fn neg(p: Point) -> Point {
    Point::new(-p.x, -p.y)
}

/// Normalize polygon winding to counterclockwise (positive area).
fn wind_ccw(mut poly: Vec<Point>) -> Vec<Point> {
    let mut area = 0.0f32;
    for i in 0..poly.len() {
        let a = poly[i];
        let b = poly[(i + 1) % poly.len()];
        area += a.x * b.y - b.x * a.y;
    }
    if area < 0.0 {
        poly.reverse();
    }
    poly
}
