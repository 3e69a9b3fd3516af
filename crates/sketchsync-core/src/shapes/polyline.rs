//! Freehand polyline shape.

use super::{HIT_TOLERANCE, Point, Rgb, ShapeKind, ShapeTrait, point_to_segment_dist};
use serde::{Deserialize, Serialize};

/// An ordered, append-only run of points joined by straight edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Polyline {
    pub(crate) points: Vec<Point>,
    pub color: Rgb,
}

impl Polyline {
    /// Start a polyline at a single point.
    pub fn new(start: Point, color: Rgb) -> Self {
        Self {
            points: vec![start],
            color,
        }
    }

    /// Build from existing points. Returns `None` for an empty list.
    pub fn from_points(points: Vec<Point>, color: Rgb) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        Some(Self { points, color })
    }

    /// Add a point to the end. Only meaningful while the stroke is being drawn.
    pub fn append_point(&mut self, x: i32, y: i32) {
        self.points.push(Point::new(x, y));
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false; a polyline holds at least its starting point.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl ShapeTrait for Polyline {
    fn kind(&self) -> ShapeKind {
        ShapeKind::Polyline
    }

    fn contains_point(&self, point: Point) -> bool {
        self.points
            .windows(2)
            .any(|w| point_to_segment_dist(point, w[0], w[1]) <= HIT_TOLERANCE)
    }

    fn translate(&mut self, dx: i32, dy: i32) {
        for p in &mut self.points {
            *p = p.translated(dx, dy);
        }
    }

    fn color(&self) -> Rgb {
        self.color
    }

    fn set_color(&mut self, color: Rgb) {
        self.color = color;
    }
}
