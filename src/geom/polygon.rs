//! Planar polygons (building footprints, ground zones).
//!
//! Vertices are stored counter-clockwise without the closing duplicate.
//! Elevations of the vertices are carried along but never used by the
//! planar predicates.

use crate::geom::EPS;
use crate::geom::bboxes::Envelope;
use crate::geom::point::Point;
use crate::geom::segment::{distance_point_to_segment, segments_properly_cross};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reason why a polygon can't be used as an obstacle or a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolygonDefect {
    TooFewVertices,
    ZeroArea,
    SelfIntersecting,
    NonFinite,
}

impl fmt::Display for PolygonDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TooFewVertices => "fewer than 3 distinct vertices",
            Self::ZeroArea => "zero area",
            Self::SelfIntersecting => "self-intersecting outline",
            Self::NonFinite => "non-finite coordinates",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pts: Vec<Point>,
    envelope: Envelope,
}

impl Polygon {
    /// Creates a polygon from its outline.
    ///
    /// Consecutive vertices closer than `eps` are merged, the closing vertex
    /// (if repeated) is dropped and the orientation is made counter-clockwise.
    /// Use `defect()` to check whether the result is usable.
    pub fn new(pts: Vec<Point>, eps: f64) -> Self {
        let mut clean: Vec<Point> = Vec::with_capacity(pts.len());
        for p in pts {
            if let Some(last) = clean.last()
                && last.is_close_2d(&p, eps)
            {
                continue;
            }
            clean.push(p);
        }
        while clean.len() > 1
            && let (Some(&first), Some(&last)) = (clean.first(), clean.last())
            && first.is_close_2d(&last, eps)
        {
            clean.pop();
        }
        if signed_area(&clean) < 0. {
            clean.reverse();
        }
        let envelope = Envelope::from_points(&clean).unwrap_or(Envelope::new(0., 0., 0., 0.));
        Self {
            pts: clean,
            envelope,
        }
    }

    /// Axis-aligned rectangle at elevation 0.
    pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        let env = Envelope::new(min_x, min_y, max_x, max_y);
        Self::new(env.corners(0.).to_vec(), EPS)
    }

    pub fn vertices(&self) -> &[Point] {
        &self.pts
    }

    pub fn len(&self) -> usize {
        self.pts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pts.is_empty()
    }

    pub fn envelope(&self) -> Envelope {
        self.envelope
    }

    /// Iterates over the edges (a, b) in counter-clockwise order, closing edge included.
    pub fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let n = self.pts.len();
        (0..n).map(move |i| (self.pts[i], self.pts[(i + 1) % n]))
    }

    /// Edge `i` as (a, b), the last edge closing the ring.
    pub fn edge(&self, i: usize) -> (Point, Point) {
        let n = self.pts.len();
        (self.pts[i % n], self.pts[(i + 1) % n])
    }

    /// Returns a copy with vertex elevations given by `f`.
    pub fn map_z<F>(&self, f: F) -> Self
    where
        F: Fn(&Point) -> f64,
    {
        Self {
            pts: self.pts.iter().map(|p| p.with_z(f(p))).collect(),
            envelope: self.envelope,
        }
    }

    pub fn area(&self) -> f64 {
        signed_area(&self.pts).abs()
    }

    /// Returns the first problem that makes the polygon unusable, if any.
    pub fn defect(&self, eps: f64) -> Option<PolygonDefect> {
        if self.pts.iter().any(|p| !p.is_finite()) {
            return Some(PolygonDefect::NonFinite);
        }
        if self.pts.len() < 3 {
            return Some(PolygonDefect::TooFewVertices);
        }
        // Lobes of a crossing outline cancel in the shoelace sum
        if self.is_self_intersecting(eps) {
            return Some(PolygonDefect::SelfIntersecting);
        }
        if self.area() < eps {
            return Some(PolygonDefect::ZeroArea);
        }
        None
    }

    /// Checks whether any two non-adjacent edges cross.
    pub fn is_self_intersecting(&self, eps: f64) -> bool {
        let n = self.pts.len();
        if n < 4 {
            return false;
        }
        for i in 0..n {
            let (a, b) = (self.pts[i], self.pts[(i + 1) % n]);
            for j in (i + 2)..n {
                if i == 0 && j == n - 1 {
                    // Adjacent through the closing edge
                    continue;
                }
                let (c, d) = (self.pts[j], self.pts[(j + 1) % n]);
                if segments_properly_cross(a, b, c, d, eps) {
                    return true;
                }
            }
        }
        false
    }

    /// Returns true if the point lies on an edge (within `eps`).
    pub fn is_on_boundary(&self, pt: Point, eps: f64) -> bool {
        self.edges()
            .any(|(a, b)| distance_point_to_segment(pt, a, b) < eps)
    }

    /// Checks if a point lies inside the polygon (crossing number test).
    ///
    /// If `boundary_in` is true, points on the boundary are considered inside.
    pub fn contains(&self, pt: Point, boundary_in: bool, eps: f64) -> bool {
        if !self.envelope.expanded_by(eps).contains_xy(pt.x, pt.y) {
            return false;
        }
        if self.is_on_boundary(pt, eps) {
            return boundary_in;
        }
        let mut inside = false;
        for (a, b) in self.edges() {
            if (a.y > pt.y) != (b.y > pt.y) {
                let x_cross = a.x + (pt.y - a.y) / (b.y - a.y) * (b.x - a.x);
                if pt.x < x_cross {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// Indices of the convex corners (interior angle below 180 degrees).
    pub fn convex_corners(&self, eps: f64) -> Vec<usize> {
        let n = self.pts.len();
        (0..n)
            .filter(|&i| {
                let prev = self.pts[(i + n - 1) % n];
                let next = self.pts[(i + 1) % n];
                crate::geom::segment::orientation(prev, self.pts[i], next) > eps
            })
            .collect()
    }
}

/// Shoelace formula on the horizontal projection.
///
/// Positive for counter-clockwise outlines.
pub fn signed_area(pts: &[Point]) -> f64 {
    let n = pts.len();
    if n < 3 {
        return 0.;
    }
    let mut s = 0.;
    for i in 0..n {
        let a = pts[i];
        let b = pts[(i + 1) % n];
        s += a.x * b.y - b.x * a.y;
    }
    0.5 * s
}
