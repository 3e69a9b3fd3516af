//! Rectangle shape.

use super::{Point, Rgb, ShapeKind, ShapeTrait};
use serde::{Deserialize, Serialize};

/// An axis-aligned filled rectangle, stored as a normalized corner pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rectangle {
    /// Top-left corner.
    pub(crate) min: Point,
    /// Bottom-right corner.
    pub(crate) max: Point,
    pub color: Rgb,
}

impl Rectangle {
    /// Create a rectangle from two opposite corners given in any order.
    pub fn from_corners(p1: Point, p2: Point, color: Rgb) -> Self {
        let mut rect = Self {
            min: p1,
            max: p1,
            color,
        };
        rect.set_corners(p1, p2);
        rect
    }

    /// Reset both corners, normalizing so that `min <= max` on each axis.
    pub fn set_corners(&mut self, p1: Point, p2: Point) {
        self.min = Point::new(p1.x.min(p2.x), p1.y.min(p2.y));
        self.max = Point::new(p1.x.max(p2.x), p1.y.max(p2.y));
    }

    pub fn min(&self) -> Point {
        self.min
    }

    pub fn max(&self) -> Point {
        self.max
    }
}

impl ShapeTrait for Rectangle {
    fn kind(&self) -> ShapeKind {
        ShapeKind::Rectangle
    }

    fn contains_point(&self, point: Point) -> bool {
        (self.min.x..=self.max.x).contains(&point.x) && (self.min.y..=self.max.y).contains(&point.y)
    }

    fn translate(&mut self, dx: i32, dy: i32) {
        self.min = self.min.translated(dx, dy);
        self.max = self.max.translated(dx, dy);
    }

    fn color(&self) -> Rgb {
        self.color
    }

    fn set_color(&mut self, color: Rgb) {
        self.color = color;
    }
}
