use crate::geom::EPS;
use crate::geom::point::Point;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vector {
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
}

impl Vector {
    pub fn new(dx: f64, dy: f64, dz: f64) -> Self {
        Self { dx, dy, dz }
    }

    pub fn from_points(beg: Point, end: Point) -> Self {
        Self {
            dx: end.x - beg.x,
            dy: end.y - beg.y,
            dz: end.z - beg.z,
        }
    }

    /// Cross product between 2 vectors.
    pub fn cross(self, other: Self) -> Self {
        Self {
            dx: self.dy * other.dz - self.dz * other.dy,
            dy: self.dz * other.dx - self.dx * other.dz,
            dz: self.dx * other.dy - self.dy * other.dx,
        }
    }

    /// Dot product between 2 vectors.
    pub fn dot(self, other: Self) -> f64 {
        self.dx * other.dx + self.dy * other.dy + self.dz * other.dz
    }

    /// z component of the cross product of the horizontal projections.
    pub fn cross_2d(self, other: Self) -> f64 {
        self.dx * other.dy - self.dy * other.dx
    }

    /// Returns the length of the vector.
    pub fn length(&self) -> f64 {
        (self.dx.powi(2) + self.dy.powi(2) + self.dz.powi(2)).sqrt()
    }

    /// Length of the horizontal projection.
    pub fn length_2d(&self) -> f64 {
        self.dx.hypot(self.dy)
    }

    pub fn is_close(&self, other: &Self) -> bool {
        (self.dx - other.dx).abs() < EPS
            && (self.dy - other.dy).abs() < EPS
            && (self.dz - other.dz).abs() < EPS
    }

    /// Normalizes the vector (divides by its length) and returns a copy.
    pub fn normalize(&self) -> Option<Self> {
        let len = self.length();
        if len < EPS {
            None
        } else {
            Some(*self * (1.0 / len))
        }
    }

    /// Horizontal projection rotated by +90 degrees (left normal), unnormalized.
    pub fn perp_2d(&self) -> Self {
        Self::new(-self.dy, self.dx, 0.)
    }

    /// Angle in radians between two vectors, in [0, pi].
    pub fn angle(&self, other: &Self) -> f64 {
        let denom = self.length() * other.length();
        if denom < EPS {
            return 0.;
        }
        (self.dot(*other) / denom).clamp(-1., 1.).acos()
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prec = f.precision().unwrap_or(2); // Default 2 decimals
        write!(
            f,
            "Vector({:.prec$}, {:.prec$}, {:.prec$})",
            self.dx,
            self.dy,
            self.dz,
            prec = prec
        )
    }
}

impl Add for Vector {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            dx: self.dx + other.dx,
            dy: self.dy + other.dy,
            dz: self.dz + other.dz,
        }
    }
}

impl Sub for Vector {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self {
            dx: self.dx - other.dx,
            dy: self.dy - other.dy,
            dz: self.dz - other.dz,
        }
    }
}

impl Mul<f64> for Vector {
    type Output = Self;
    fn mul(self, other: f64) -> Self {
        Self {
            dx: self.dx * other,
            dy: self.dy * other,
            dz: self.dz * other,
        }
    }
}

impl Neg for Vector {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.dx, -self.dy, -self.dz)
    }
}
