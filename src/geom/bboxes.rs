use crate::geom::EPS;
use crate::geom::point::Point;
use serde::{Deserialize, Serialize};

/// Axis-aligned horizontal bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Envelope {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x: min_x.min(max_x),
            min_y: min_y.min(max_y),
            max_x: min_x.max(max_x),
            max_y: min_y.max(max_y),
        }
    }

    /// Envelope holding all points `pts`. Returns None for an empty slice.
    pub fn from_points(pts: &[Point]) -> Option<Self> {
        let first = pts.first()?;
        let mut env = Self::new(first.x, first.y, first.x, first.y);
        for p in &pts[1..] {
            env.expand_to_include(p);
        }
        Some(env)
    }

    pub fn from_segment(a: Point, b: Point) -> Self {
        Self::new(a.x, a.y, b.x, b.y)
    }

    /// Square envelope of half-size `radius` centered on `pt`.
    pub fn around(pt: Point, radius: f64) -> Self {
        Self::new(pt.x - radius, pt.y - radius, pt.x + radius, pt.y + radius)
    }

    pub fn expand_to_include(&mut self, pt: &Point) {
        self.min_x = self.min_x.min(pt.x);
        self.min_y = self.min_y.min(pt.y);
        self.max_x = self.max_x.max(pt.x);
        self.max_y = self.max_y.max(pt.y);
    }

    pub fn merge(&self, other: &Self) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Returns a copy grown by `d` on every side.
    pub fn expanded_by(&self, d: f64) -> Self {
        Self {
            min_x: self.min_x - d,
            min_y: self.min_y - d,
            max_x: self.max_x + d,
            max_y: self.max_y + d,
        }
    }

    /// Checks whether two envelopes overlap (touching counts as overlap).
    pub fn intersects(&self, other: &Self) -> bool {
        !(self.max_x < other.min_x - EPS
            || self.min_x > other.max_x + EPS
            || self.max_y < other.min_y - EPS
            || self.min_y > other.max_y + EPS)
    }

    pub fn contains_xy(&self, x: f64, y: f64) -> bool {
        x >= self.min_x - EPS && x <= self.max_x + EPS && y >= self.min_y - EPS && y <= self.max_y + EPS
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> Point {
        Point::new(
            0.5 * (self.min_x + self.max_x),
            0.5 * (self.min_y + self.max_y),
            0.,
        )
    }

    /// The four corners, counter-clockwise from (min_x, min_y), at elevation `z`.
    pub fn corners(&self, z: f64) -> [Point; 4] {
        [
            Point::new(self.min_x, self.min_y, z),
            Point::new(self.max_x, self.min_y, z),
            Point::new(self.max_x, self.max_y, z),
            Point::new(self.min_x, self.max_y, z),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_points() {
        let pts = vec![
            Point::new(1., 5., 0.),
            Point::new(-2., 3., 10.),
            Point::new(4., -1., 2.),
        ];
        let env = Envelope::from_points(&pts);
        assert_eq!(env, Some(Envelope::new(-2., -1., 4., 5.)));
        assert_eq!(Envelope::from_points(&[]), None);
    }

    #[test]
    fn test_new_orders_corners() {
        let env = Envelope::new(5., 5., 0., 1.);
        assert_eq!(env.min_x, 0.);
        assert_eq!(env.max_y, 5.);
    }

    #[test]
    fn test_intersects() {
        let a = Envelope::new(0., 0., 1., 1.);
        let b = Envelope::new(1., 1., 2., 2.); // touching
        let c = Envelope::new(1.5, 0., 2., 1.);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(a.expanded_by(0.6).intersects(&c));
    }

    #[test]
    fn test_contains_and_center() {
        let env = Envelope::around(Point::new(10., 10., 3.), 2.);
        assert!(env.contains_xy(8., 12.));
        assert!(!env.contains_xy(7.9, 10.));
        assert!(env.center().is_close(&Point::new(10., 10., 0.)));
        assert!((env.width() - 4.).abs() < EPS);
    }
}
