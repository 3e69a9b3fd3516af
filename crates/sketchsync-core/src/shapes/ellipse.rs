//! Ellipse shape.

use super::{Point, Rgb, ShapeKind, ShapeTrait};
use serde::{Deserialize, Serialize};

/// A filled axis-aligned ellipse inscribed in a normalized corner pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ellipse {
    /// Top-left corner of the bounding box.
    pub(crate) min: Point,
    /// Bottom-right corner of the bounding box.
    pub(crate) max: Point,
    pub color: Rgb,
}

impl Ellipse {
    /// Create an ellipse from two opposite bounding-box corners given in any order.
    pub fn from_corners(p1: Point, p2: Point, color: Rgb) -> Self {
        let mut ellipse = Self {
            min: p1,
            max: p1,
            color,
        };
        ellipse.set_corners(p1, p2);
        ellipse
    }

    /// Reset the bounding box, normalizing so that `min <= max` on each axis.
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

impl ShapeTrait for Ellipse {
    fn kind(&self) -> ShapeKind {
        ShapeKind::Ellipse
    }

    fn contains_point(&self, point: Point) -> bool {
        let radius_x = (f64::from(self.max.x) - f64::from(self.min.x)) / 2.0;
        let radius_y = (f64::from(self.max.y) - f64::from(self.min.y)) / 2.0;
        // A flat ellipse has no interior.
        if radius_x <= 0.0 || radius_y <= 0.0 {
            return false;
        }
        let dx = (f64::from(point.x) - (f64::from(self.min.x) + radius_x)) / radius_x;
        let dy = (f64::from(point.y) - (f64::from(self.min.y) + radius_y)) / radius_y;
        dx * dx + dy * dy <= 1.0
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
