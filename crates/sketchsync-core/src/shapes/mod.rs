//! Shape definitions for the shared scene.

mod ellipse;
mod polyline;
mod rectangle;
mod segment;

pub use ellipse::Ellipse;
pub use polyline::Polyline;
pub use rectangle::Rectangle;
pub use segment::Segment;

use kurbo::Point as KurboPoint;
use serde::{Deserialize, Serialize};

/// Unique identifier for shapes. Assigned by the scene store, starting at 1.
pub type ShapeId = u64;

/// Distance within which a stroke-like shape (segment, polyline edge) is hit.
pub const HIT_TOLERANCE: f64 = 3.0;

/// A point on the integer drawing grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Offset by `(dx, dy)`, saturating at the `i32` bounds.
    pub fn translated(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x.saturating_add(dx), self.y.saturating_add(dy))
    }

    pub(crate) fn to_kurbo(self) -> KurboPoint {
        KurboPoint::new(f64::from(self.x), f64::from(self.y))
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self::new(x, y)
    }
}

/// 24-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const RED: Rgb = Rgb::new(255, 0, 0);
    pub const GREEN: Rgb = Rgb::new(0, 255, 0);
    pub const BLUE: Rgb = Rgb::new(0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Unpack from `0xRRGGBB`. Bits above the low 24 (an alpha byte) are ignored.
    pub const fn from_packed(value: u32) -> Self {
        Self {
            r: (value >> 16) as u8,
            g: (value >> 8) as u8,
            b: value as u8,
        }
    }

    /// Pack into `0xRRGGBB`.
    pub const fn packed(self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }
}

/// Wire name of each shape variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Ellipse,
    Rectangle,
    Segment,
    Polyline,
}

impl ShapeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ShapeKind::Ellipse => "ellipse",
            ShapeKind::Rectangle => "rectangle",
            ShapeKind::Segment => "segment",
            ShapeKind::Polyline => "polyline",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ellipse" => Some(ShapeKind::Ellipse),
            "rectangle" => Some(ShapeKind::Rectangle),
            "segment" => Some(ShapeKind::Segment),
            "polyline" => Some(ShapeKind::Polyline),
            _ => None,
        }
    }
}

/// Distance from a point to a line segment (a→b), clamped to the segment.
pub fn point_to_segment_dist(point: Point, a: Point, b: Point) -> f64 {
    let (point, a, b) = (point.to_kurbo(), a.to_kurbo(), b.to_kurbo());
    let seg = b - a;
    let pv = point - a;
    let len_sq = seg.hypot2();
    if len_sq < f64::EPSILON {
        return pv.hypot();
    }
    let t = (pv.dot(seg) / len_sq).clamp(0.0, 1.0);
    let proj = a + seg * t;
    (point - proj).hypot()
}

/// Common trait for all shapes.
pub trait ShapeTrait {
    /// Which variant this is.
    fn kind(&self) -> ShapeKind;

    /// Check if a point hits this shape.
    fn contains_point(&self, point: Point) -> bool;

    /// Offset every coordinate in place.
    fn translate(&mut self, dx: i32, dy: i32);

    fn color(&self) -> Rgb;

    fn set_color(&mut self, color: Rgb);
}

/// Enum wrapper for all shape types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    Ellipse(Ellipse),
    Rectangle(Rectangle),
    Segment(Segment),
    Polyline(Polyline),
}

impl Shape {
    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Ellipse(s) => s.kind(),
            Shape::Rectangle(s) => s.kind(),
            Shape::Segment(s) => s.kind(),
            Shape::Polyline(s) => s.kind(),
        }
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        let point = Point::new(x, y);
        match self {
            Shape::Ellipse(s) => s.contains_point(point),
            Shape::Rectangle(s) => s.contains_point(point),
            Shape::Segment(s) => s.contains_point(point),
            Shape::Polyline(s) => s.contains_point(point),
        }
    }

    pub fn translate(&mut self, dx: i32, dy: i32) {
        match self {
            Shape::Ellipse(s) => s.translate(dx, dy),
            Shape::Rectangle(s) => s.translate(dx, dy),
            Shape::Segment(s) => s.translate(dx, dy),
            Shape::Polyline(s) => s.translate(dx, dy),
        }
    }

    pub fn color(&self) -> Rgb {
        match self {
            Shape::Ellipse(s) => s.color(),
            Shape::Rectangle(s) => s.color(),
            Shape::Segment(s) => s.color(),
            Shape::Polyline(s) => s.color(),
        }
    }

    pub fn set_color(&mut self, color: Rgb) {
        match self {
            Shape::Ellipse(s) => s.set_color(color),
            Shape::Rectangle(s) => s.set_color(color),
            Shape::Segment(s) => s.set_color(color),
            Shape::Polyline(s) => s.set_color(color),
        }
    }

    pub fn with_color(mut self, color: Rgb) -> Self {
        self.set_color(color);
        self
    }

    /// Canonical `add` line for this shape. Pass `None` for the id-less request form.
    pub fn encode(&self, id: Option<ShapeId>) -> String {
        crate::protocol::encode_shape(id, self)
    }
}

impl From<Ellipse> for Shape {
    fn from(s: Ellipse) -> Self {
        Shape::Ellipse(s)
    }
}

impl From<Rectangle> for Shape {
    fn from(s: Rectangle) -> Self {
        Shape::Rectangle(s)
    }
}

impl From<Segment> for Shape {
    fn from(s: Segment) -> Self {
        Shape::Segment(s)
    }
}

impl From<Polyline> for Shape {
    fn from(s: Polyline) -> Self {
        Shape::Polyline(s)
    }
}
