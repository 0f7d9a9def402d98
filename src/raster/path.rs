//! Path representation and stroke state.
//!
//! Paths are sequences of moveto/lineto/curveto/closepath commands in user
//! space. The flattener turns them into line segments; the scan converter
//! fills those.

use crate::geometry::{Matrix, Point, Rect};

/// One path construction command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathElement {
    /// Begin a new subpath
    MoveTo(Point),
    /// Straight segment
    LineTo(Point),
    /// Cubic Bezier with two control points
    CurveTo(Point, Point, Point),
    /// Close the current subpath
    Close,
}

/// A path under construction or ready for filling/stroking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Path {
    /// The command list
    pub elements: Vec<PathElement>,
}

impl Path {
    /// An empty path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the path has no commands.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Begin a new subpath at (`x`, `y`).
    pub fn move_to(&mut self, x: f32, y: f32) {
        self.elements.push(PathElement::MoveTo(Point::new(x, y)));
    }

    /// Straight segment to (`x`, `y`).
    pub fn line_to(&mut self, x: f32, y: f32) {
        self.elements.push(PathElement::LineTo(Point::new(x, y)));
    }

    /// Cubic Bezier to (`x3`, `y3`) with control points 1 and 2.
    pub fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x3: f32, y3: f32) {
        self.elements.push(PathElement::CurveTo(
            Point::new(x1, y1),
            Point::new(x2, y2),
            Point::new(x3, y3),
        ));
    }

    /// Cubic with the first control point at the current point (`v`).
    pub fn curve_to_v(&mut self, x2: f32, y2: f32, x3: f32, y3: f32) {
        let current = self.current_point().unwrap_or_default();
        self.curve_to(current.x, current.y, x2, y2, x3, y3);
    }

    /// Cubic with the second control point at the endpoint (`y` operator).
    pub fn curve_to_y(&mut self, x1: f32, y1: f32, x3: f32, y3: f32) {
        self.curve_to(x1, y1, x3, y3, x3, y3);
    }

    /// Close the current subpath.
    pub fn close(&mut self) {
        self.elements.push(PathElement::Close);
    }

    /// Append an axis-aligned rectangle subpath (the `re` operator).
    pub fn rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        self.move_to(x, y);
        self.line_to(x + w, y);
        self.line_to(x + w, y + h);
        self.line_to(x, y + h);
        self.close();
    }

    /// The endpoint of the last command, if any.
    pub fn current_point(&self) -> Option<Point> {
        for element in self.elements.iter().rev() {
            match element {
                PathElement::MoveTo(p) | PathElement::LineTo(p) | PathElement::CurveTo(_, _, p) => {
                    return Some(*p);
                },
                PathElement::Close => continue,
            }
        }
        None
    }

    /// The first point of the current subpath, if any.
    pub fn subpath_start(&self) -> Option<Point> {
        let mut start = None;
        for element in &self.elements {
            if let PathElement::MoveTo(p) = element {
                start = Some(*p);
            }
        }
        start
    }

    /// A copy with every point transformed by `m`.
    pub fn transform(&self, m: &Matrix) -> Path {
        let elements = self
            .elements
            .iter()
            .map(|el| match el {
                PathElement::MoveTo(p) => PathElement::MoveTo(m.transform_point(*p)),
                PathElement::LineTo(p) => PathElement::LineTo(m.transform_point(*p)),
                PathElement::CurveTo(a, b, c) => PathElement::CurveTo(
                    m.transform_point(*a),
                    m.transform_point(*b),
                    m.transform_point(*c),
                ),
                PathElement::Close => PathElement::Close,
            })
            .collect();
        Path { elements }
    }

    /// Control-point bounding box (contains the true bounds).
    pub fn bounds(&self) -> Rect {
        let mut out = Rect::EMPTY;
        for element in &self.elements {
            match element {
                PathElement::MoveTo(p) | PathElement::LineTo(p) => out.include(*p),
                PathElement::CurveTo(a, b, c) => {
                    out.include(*a);
                    out.include(*b);
                    out.include(*c);
                },
                PathElement::Close => {},
            }
        }
        out
    }
}

/// Line cap style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineCap {
    /// Squared off at the endpoint
    #[default]
    Butt,
    /// Semicircle
    Round,
    /// Square projecting half a line width
    Square,
}

impl LineCap {
    /// From the PDF integer encoding.
    pub fn from_int(v: i64) -> Self {
        match v {
            1 => LineCap::Round,
            2 => LineCap::Square,
            _ => LineCap::Butt,
        }
    }
}

/// Line join style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineJoin {
    /// Mitered corner, falling back to bevel past the miter limit
    #[default]
    Miter,
    /// Circular arc
    Round,
    /// Flattened corner
    Bevel,
}

impl LineJoin {
    /// From the PDF integer encoding.
    pub fn from_int(v: i64) -> Self {
        match v {
            1 => LineJoin::Round,
            2 => LineJoin::Bevel,
            _ => LineJoin::Miter,
        }
    }
}

/// Everything that parameterizes stroking a path.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeState {
    /// Line width in user space
    pub line_width: f32,
    /// Cap applied to open subpath ends
    pub cap: LineCap,
    /// Join applied between segments
    pub join: LineJoin,
    /// Miter length limit
    pub miter_limit: f32,
    /// Dash pattern lengths (empty = solid)
    pub dashes: Vec<f32>,
    /// Offset into the dash pattern
    pub dash_phase: f32,
}

impl Default for StrokeState {
    fn default() -> Self {
        Self {
            line_width: 1.0,
            cap: LineCap::Butt,
            join: LineJoin::Miter,
            miter_limit: 10.0,
            dashes: Vec::new(),
            dash_phase: 0.0,
        }
    }
}

impl StrokeState {
    /// Stable fingerprint of the stroke parameters, for glyph-cache keys.
    pub fn fingerprint(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.line_width.to_bits().hash(&mut hasher);
        (self.cap as u8).hash(&mut hasher);
        (self.join as u8).hash(&mut hasher);
        self.miter_limit.to_bits().hash(&mut hasher);
        for d in &self.dashes {
            d.to_bits().hash(&mut hasher);
        }
        self.dash_phase.to_bits().hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_builds_closed_subpath() {
        let mut p = Path::new();
        p.rect(0.0, 0.0, 10.0, 5.0);
        assert_eq!(p.elements.len(), 5);
        assert_eq!(p.elements[0], PathElement::MoveTo(Point::new(0.0, 0.0)));
        assert_eq!(p.elements[4], PathElement::Close);
    }

    #[test]
    fn test_current_point_tracks_last() {
        let mut p = Path::new();
        p.move_to(1.0, 2.0);
        p.line_to(3.0, 4.0);
        assert_eq!(p.current_point(), Some(Point::new(3.0, 4.0)));
    }

    #[test]
    fn test_transform_moves_points() {
        let mut p = Path::new();
        p.move_to(1.0, 1.0);
        p.line_to(2.0, 2.0);
        let moved = p.transform(&Matrix::translate(10.0, 0.0));
        assert_eq!(moved.elements[0], PathElement::MoveTo(Point::new(11.0, 1.0)));
    }

    #[test]
    fn test_bounds() {
        let mut p = Path::new();
        p.move_to(0.0, 0.0);
        p.line_to(10.0, -5.0);
        let b = p.bounds();
        assert_eq!(b, Rect::new(0.0, -5.0, 10.0, 0.0));
    }

    #[test]
    fn test_stroke_fingerprint_distinguishes_width() {
        let a = StrokeState::default();
        let mut b = StrokeState::default();
        b.line_width = 2.0;
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), StrokeState::default().fingerprint());
    }
}
