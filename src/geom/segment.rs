//! Planar segment operations.
//!
//! Obstacles in the scene are vertical extrusions of 2D outlines, so every
//! predicate here works on the horizontal projection (x, y) and ignores z
//! unless stated otherwise.

use crate::geom::EPS;
use crate::geom::point::Point;
use crate::geom::vector::Vector;

/// Result of a planar segment intersection test.
///
/// Parameters are relative positions along each segment (0 at the first end,
/// 1 at the second end).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentIntersection {
    /// Segments cross or touch at a single point.
    Point { t: f64, u: f64 },
    /// Segments are collinear and overlap between `t0` and `t1` on the first one.
    Collinear { t0: f64, t1: f64 },
    /// Segments don't intersect.
    None,
}

/// Signed doubled area of the triangle (a, b, c) in the xy-plane.
///
/// Positive when c lies to the left of a->b.
pub fn orientation(a: Point, b: Point, c: Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Intersection of segments p1->p2 and p3->p4 projected on the xy-plane.
pub fn intersect_2d(p1: Point, p2: Point, p3: Point, p4: Point) -> SegmentIntersection {
    let d1 = Vector::new(p2.x - p1.x, p2.y - p1.y, 0.);
    let d2 = Vector::new(p4.x - p3.x, p4.y - p3.y, 0.);
    let r = Vector::new(p3.x - p1.x, p3.y - p1.y, 0.);

    let len1 = d1.length_2d();
    let len2 = d2.length_2d();
    if len1 < EPS || len2 < EPS {
        return SegmentIntersection::None;
    }

    let denom = d1.cross_2d(d2);
    // Scale-aware parallelism check
    if denom.abs() < EPS * len1 * len2 {
        if r.cross_2d(d1).abs() > EPS * len1 * len1.max(1.) {
            // Parallel, distinct lines
            return SegmentIntersection::None;
        }
        let dd = d1.dot(d1);
        let s0 = r.dot(d1) / dd;
        let s1 = Vector::new(p4.x - p1.x, p4.y - p1.y, 0.).dot(d1) / dd;
        let (lo, hi) = if s0 <= s1 { (s0, s1) } else { (s1, s0) };
        let t0 = lo.max(0.);
        let t1 = hi.min(1.);
        let tol = EPS / len1;
        if t0 > t1 + tol {
            return SegmentIntersection::None;
        }
        if (t1 - t0).abs() <= tol {
            let u = if (s1 - s0).abs() < EPS { 0. } else { (t0 - s0) / (s1 - s0) };
            return SegmentIntersection::Point { t: t0, u };
        }
        return SegmentIntersection::Collinear { t0, t1 };
    }

    let t = r.cross_2d(d2) / denom;
    let u = r.cross_2d(d1) / denom;
    let tol_t = EPS / len1;
    let tol_u = EPS / len2;
    if t < -tol_t || t > 1. + tol_t || u < -tol_u || u > 1. + tol_u {
        return SegmentIntersection::None;
    }
    SegmentIntersection::Point {
        t: t.clamp(0., 1.),
        u: u.clamp(0., 1.),
    }
}

/// Returns true if the segments cross at a point interior to both of them.
pub fn segments_properly_cross(p1: Point, p2: Point, p3: Point, p4: Point, eps: f64) -> bool {
    let d1 = orientation(p1, p2, p3);
    let d2 = orientation(p1, p2, p4);
    let d3 = orientation(p3, p4, p1);
    let d4 = orientation(p3, p4, p2);
    let l1 = p1.distance_2d(&p2).max(EPS);
    let l2 = p3.distance_2d(&p4).max(EPS);
    // Orientations are doubled areas, compare them as heights above the other segment
    ((d1 / l1 > eps && d2 / l1 < -eps) || (d1 / l1 < -eps && d2 / l1 > eps))
        && ((d3 / l2 > eps && d4 / l2 < -eps) || (d3 / l2 < -eps && d4 / l2 > eps))
}

/// Parameter of the orthogonal projection of `pt` on the line a->b (unclamped).
pub fn project_param(pt: Point, a: Point, b: Point) -> f64 {
    let ab = Vector::new(b.x - a.x, b.y - a.y, 0.);
    let ap = Vector::new(pt.x - a.x, pt.y - a.y, 0.);
    let dd = ab.dot(ab);
    if dd < EPS * EPS {
        return 0.;
    }
    ap.dot(ab) / dd
}

/// Closest point to `pt` on the segment a->b (z interpolated along the segment).
pub fn closest_point_on_segment(pt: Point, a: Point, b: Point) -> Point {
    let t = project_param(pt, a, b).clamp(0., 1.);
    Point::new_between_2_points(a, b, t)
}

/// Horizontal distance from `pt` to the segment a->b.
pub fn distance_point_to_segment(pt: Point, a: Point, b: Point) -> f64 {
    closest_point_on_segment(pt, a, b).distance_2d(&pt)
}

/// Mirror image of `pt` across the vertical plane containing a->b.
///
/// The elevation of the point is kept.
pub fn mirror_across_line(pt: Point, a: Point, b: Point) -> Point {
    let t = project_param(pt, a, b);
    let fx = a.x + (b.x - a.x) * t;
    let fy = a.y + (b.y - a.y) * t;
    Point::new(2. * fx - pt.x, 2. * fy - pt.y, pt.z)
}

/// Point at relative position `t` along a->b, all coordinates interpolated.
pub fn point_along(a: Point, b: Point, t: f64) -> Point {
    Point::new_between_2_points(a, b, t)
}
