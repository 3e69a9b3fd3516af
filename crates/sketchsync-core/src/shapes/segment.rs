//! Line segment shape.

use super::{HIT_TOLERANCE, Point, Rgb, ShapeKind, ShapeTrait, point_to_segment_dist};
use serde::{Deserialize, Serialize};

/// A straight segment. Endpoints keep the order they were drawn in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub start: Point,
    pub end: Point,
    pub color: Rgb,
}

impl Segment {
    pub fn new(start: Point, end: Point, color: Rgb) -> Self {
        Self { start, end, color }
    }

    /// Move the far endpoint (used while the segment is being dragged out).
    pub fn set_end(&mut self, end: Point) {
        self.end = end;
    }
}

impl ShapeTrait for Segment {
    fn kind(&self) -> ShapeKind {
        ShapeKind::Segment
    }

    fn contains_point(&self, point: Point) -> bool {
        point_to_segment_dist(point, self.start, self.end) <= HIT_TOLERANCE
    }

    fn translate(&mut self, dx: i32, dy: i32) {
        self.start = self.start.translated(dx, dy);
        self.end = self.end.translated(dx, dy);
    }

    fn color(&self) -> Rgb {
        self.color
    }

    fn set_color(&mut self, color: Rgb) {
        self.color = color;
    }
}
