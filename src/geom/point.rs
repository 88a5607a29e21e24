use crate::geom::EPS;
use crate::geom::vector::Vector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Returns true if both points are very close to each other.
    pub fn is_close(&self, other: &Self) -> bool {
        self.is_close_eps(other, EPS)
    }

    /// Same as `is_close()` with a caller-chosen tolerance.
    pub fn is_close_eps(&self, other: &Self, eps: f64) -> bool {
        (self.x - other.x).abs() < eps
            && (self.y - other.y).abs() < eps
            && (self.z - other.z).abs() < eps
    }

    /// Compares only the horizontal coordinates.
    pub fn is_close_2d(&self, other: &Self, eps: f64) -> bool {
        (self.x - other.x).abs() < eps && (self.y - other.y).abs() < eps
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn distance(&self, other: &Self) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2))
            .sqrt()
    }

    /// Horizontal distance, ignoring z.
    pub fn distance_2d(&self, other: &Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Returns a copy with a different elevation.
    pub fn with_z(&self, z: f64) -> Self {
        Self::new(self.x, self.y, z)
    }

    // Creates a new point along the edge pt1->pt2 with some relative distance from pt1.
    pub fn new_between_2_points(pt1: Self, pt2: Self, rel_d: f64) -> Self {
        Self {
            x: pt1.x + (pt2.x - pt1.x) * rel_d,
            y: pt1.y + (pt2.y - pt1.y) * rel_d,
            z: pt1.z + (pt2.z - pt1.z) * rel_d,
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prec = f.precision().unwrap_or(2); // Default 2 decimals
        write!(
            f,
            "Point({:.prec$}, {:.prec$}, {:.prec$})",
            self.x,
            self.y,
            self.z,
            prec = prec
        )
    }
}

impl Add<Vector> for Point {
    type Output = Point;
    fn add(self, other: Vector) -> Self {
        Self {
            x: self.x + other.dx,
            y: self.y + other.dy,
            z: self.z + other.dz,
        }
    }
}

impl Sub for Point {
    type Output = Vector;
    fn sub(self, other: Self) -> Vector {
        Vector::from_points(other, self)
    }
}
