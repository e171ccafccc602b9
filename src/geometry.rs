use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

/// Position or per-frame displacement in pixel space.
pub type Point = na::Vector2<f32>;

/// Axis-aligned rectangle, contains left-top corner and width-height
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    #[serde(rename = "w", alias = "width")]
    pub width: f32,
    #[serde(rename = "h", alias = "height")]
    pub height: f32,
}

impl Rect {
    #[inline]
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline(always)]
    pub fn top_left(&self) -> Point {
        Point::new(self.x, self.y)
    }

    #[inline(always)]
    pub fn bottom_right(&self) -> Point {
        Point::new(self.x + self.width, self.y + self.height)
    }

    #[inline(always)]
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    #[inline(always)]
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Overlapping region of both rectangles; zero-sized when they are disjoint.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let tl = self.top_left().sup(&other.top_left());
        let br = self.bottom_right().inf(&other.bottom_right());

        if br.x < tl.x || br.y < tl.y {
            return Rect::default();
        }

        Rect::new(tl.x, tl.y, br.x - tl.x, br.y - tl.y)
    }

    #[inline]
    pub fn translate(&mut self, offset: Point) {
        self.x += offset.x;
        self.y += offset.y;
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }
}
