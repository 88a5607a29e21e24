//! 2D Delaunay triangulation of a growing point set.
//!
//! Points are collected with `insert()` and triangulated in one sweep by
//! `triangulate()` (delaunator, O(n log n)). Callers that keep adding points
//! (constraint recovery, area refinement) re-triangulate between passes.
//! Coordinates are kept local to the scene origin to keep the predicates
//! well conditioned for projected (large) coordinates.

use std::collections::HashSet;

use rstar::RTree;
use rstar::primitives::GeomWithData;

use crate::geom::bboxes::Envelope;
use crate::geom::point::Point;
use crate::geom::segment::orientation;
use crate::index::{IndexBuilder, SpatialIndex};

/// An undirected edge key with sorted vertex indices.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
struct EdgeKey(usize, usize);

impl EdgeKey {
    fn new(a: usize, b: usize) -> Self {
        if a < b { EdgeKey(a, b) } else { EdgeKey(b, a) }
    }
}

/// Outcome of a vertex insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// New vertex with its index.
    Inserted(usize),
    /// An existing vertex already sits at this location.
    Duplicate(usize),
    /// The point can't be triangulated (non-finite coordinates).
    Rejected,
}

pub struct Triangulator {
    origin: (f64, f64),
    /// Local coordinates.
    pts: Vec<Point>,
    lookup: RTree<GeomWithData<[f64; 2], usize>>,
    eps: f64,
    /// Last triangulation, counter-clockwise.
    tris: Vec<[usize; 3]>,
    edges: HashSet<EdgeKey>,
    tri_index: SpatialIndex<usize>,
    /// Points inserted since the last triangulation.
    pending: usize,
}

impl Triangulator {
    /// Creates an empty triangulation for points of `envelope`.
    pub fn new(envelope: &Envelope, eps: f64) -> Self {
        Self {
            origin: (envelope.min_x, envelope.min_y),
            pts: Vec::new(),
            lookup: RTree::new(),
            eps,
            tris: Vec::new(),
            edges: HashSet::new(),
            tri_index: IndexBuilder::new().build(),
            pending: 0,
        }
    }

    fn to_local(&self, p: Point) -> Point {
        Point::new(p.x - self.origin.0, p.y - self.origin.1, p.z)
    }

    fn to_world(&self, p: Point) -> Point {
        Point::new(p.x + self.origin.0, p.y + self.origin.1, p.z)
    }

    pub fn vertex_count(&self) -> usize {
        self.pts.len()
    }

    /// Vertex in world coordinates.
    pub fn vertex(&self, i: usize) -> Point {
        self.to_world(self.pts[i])
    }

    /// Adds a point (world coordinates). Takes effect on the next `triangulate()`.
    pub fn insert(&mut self, p: Point) -> Insertion {
        if !p.is_finite() {
            return Insertion::Rejected;
        }
        let pt = self.to_local(p);
        let existing = self
            .lookup
            .locate_within_distance([pt.x, pt.y], self.eps * self.eps)
            .map(|g| g.data)
            .min();
        if let Some(i) = existing {
            return Insertion::Duplicate(i);
        }
        let i = self.pts.len();
        self.lookup.insert(GeomWithData::new([pt.x, pt.y], i));
        self.pts.push(pt);
        self.pending += 1;
        Insertion::Inserted(i)
    }

    /// True when points were inserted since the last triangulation.
    pub fn is_stale(&self) -> bool {
        self.pending > 0
    }

    /// Rebuilds the triangulation of all inserted points.
    pub fn triangulate(&mut self) {
        let coords: Vec<delaunator::Point> = self
            .pts
            .iter()
            .map(|p| delaunator::Point { x: p.x, y: p.y })
            .collect();
        let triangulation = delaunator::triangulate(&coords);
        self.tris = triangulation
            .triangles
            .chunks_exact(3)
            .map(|c| {
                if orientation(self.pts[c[0]], self.pts[c[1]], self.pts[c[2]]) < 0. {
                    [c[0], c[2], c[1]]
                } else {
                    [c[0], c[1], c[2]]
                }
            })
            .collect();

        self.edges.clear();
        let mut builder = IndexBuilder::new();
        for (ti, t) in self.tris.iter().enumerate() {
            for k in 0..3 {
                self.edges.insert(EdgeKey::new(t[k], t[(k + 1) % 3]));
            }
            let corners = [self.pts[t[0]], self.pts[t[1]], self.pts[t[2]]];
            if let Some(env) = Envelope::from_points(&corners) {
                builder.insert(&env, ti);
            }
        }
        self.tri_index = builder.build();
        self.pending = 0;
    }

    /// Returns true if vertices `a` and `b` are joined by an edge.
    pub fn has_edge(&self, a: usize, b: usize) -> bool {
        self.edges.contains(&EdgeKey::new(a, b))
    }

    pub fn triangle_count(&self) -> usize {
        self.tris.len()
    }

    /// Corners of triangle `i` (world coordinates).
    pub fn triangle(&self, i: usize) -> [Point; 3] {
        let t = self.tris[i];
        [self.vertex(t[0]), self.vertex(t[1]), self.vertex(t[2])]
    }

    /// Elevation interpolated on the last triangulation (world coordinates).
    pub fn interpolate(&self, x: f64, y: f64) -> Option<f64> {
        let p = self.to_local(Point::new(x, y, 0.));
        let mut candidates: Vec<usize> = self
            .tri_index
            .query(&Envelope::new(p.x, p.y, p.x, p.y))
            .copied()
            .collect();
        candidates.sort_unstable();
        candidates.into_iter().find_map(|ti| {
            let t = self.tris[ti];
            let (a, b, c) = (self.pts[t[0]], self.pts[t[1]], self.pts[t[2]]);
            barycentric(p, a, b, c, 1e-9).map(|w| w[0] * a.z + w[1] * b.z + w[2] * c.z)
        })
    }

    /// Final vertices (world coordinates) and triangles.
    ///
    /// Triangulates first if points are pending. The third value is the
    /// number of zero-area triangles that were dropped.
    pub fn finish(mut self) -> (Vec<Point>, Vec<[usize; 3]>, usize) {
        if self.is_stale() {
            self.triangulate();
        }
        let vertices: Vec<Point> = self.pts.iter().map(|p| self.to_world(*p)).collect();
        let mut degenerate = 0;
        let mut triangles = Vec::with_capacity(self.tris.len());
        for t in &self.tris {
            let (a, b, c) = (self.pts[t[0]], self.pts[t[1]], self.pts[t[2]]);
            if orientation(a, b, c).abs() * 0.5 < self.eps * self.eps {
                degenerate += 1;
                continue;
            }
            triangles.push(*t);
        }
        // Deterministic triangle order independent of the sweep
        triangles.sort_unstable();
        (vertices, triangles, degenerate)
    }
}

/// Barycentric weights of `p` in triangle (a, b, c), if inside (with tolerance).
pub fn barycentric(p: Point, a: Point, b: Point, c: Point, tol: f64) -> Option<[f64; 3]> {
    let area = orientation(a, b, c);
    if area.abs() < 1e-18 {
        return None;
    }
    let wa = orientation(b, c, p) / area;
    let wb = orientation(c, a, p) / area;
    let wc = 1. - wa - wb;
    if wa >= -tol && wb >= -tol && wc >= -tol {
        Some([wa, wb, wc])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Envelope {
        Envelope::new(0., 0., 10., 10.)
    }

    fn circumcircle(a: Point, b: Point, c: Point) -> (f64, f64, f64) {
        let d = 2. * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
        let a2 = a.x * a.x + a.y * a.y;
        let b2 = b.x * b.x + b.y * b.y;
        let c2 = c.x * c.x + c.y * c.y;
        let cx = (a2 * (b.y - c.y) + b2 * (c.y - a.y) + c2 * (a.y - b.y)) / d;
        let cy = (a2 * (c.x - b.x) + b2 * (a.x - c.x) + c2 * (b.x - a.x)) / d;
        (cx, cy, (a.x - cx).powi(2) + (a.y - cy).powi(2))
    }

    #[test]
    fn test_square_two_triangles() {
        let mut tri = Triangulator::new(&env(), 1e-7);
        for p in env().corners(0.) {
            assert!(matches!(tri.insert(p), Insertion::Inserted(_)));
        }
        assert!(tri.is_stale());
        tri.triangulate();
        assert!(!tri.is_stale());
        assert_eq!(tri.triangle_count(), 2);
        let (vertices, triangles, degenerate) = tri.finish();
        assert_eq!(vertices.len(), 4);
        assert_eq!(triangles.len(), 2);
        assert_eq!(degenerate, 0);
    }

    #[test]
    fn test_duplicate_detected() {
        let mut tri = Triangulator::new(&env(), 1e-7);
        for p in env().corners(0.) {
            tri.insert(p);
        }
        let res = tri.insert(Point::new(10., 10. + 1e-9, 3.));
        assert_eq!(res, Insertion::Duplicate(2));
        assert_eq!(tri.vertex_count(), 4);
        assert_eq!(tri.insert(Point::new(f64::NAN, 1., 0.)), Insertion::Rejected);
    }

    #[test]
    fn test_collinear_points_have_no_triangle() {
        let mut tri = Triangulator::new(&env(), 1e-7);
        for i in 0..5 {
            tri.insert(Point::new(i as f64 * 2., 1., 0.));
        }
        tri.triangulate();
        assert_eq!(tri.triangle_count(), 0);
    }

    #[test]
    fn test_triangles_ccw_and_delaunay() {
        let mut tri = Triangulator::new(&env(), 1e-7);
        let pts = [
            Point::new(0., 0., 0.),
            Point::new(10., 0., 0.),
            Point::new(10., 10., 0.),
            Point::new(0., 10., 0.),
            Point::new(3., 4., 1.),
            Point::new(7., 2., 2.),
            Point::new(5., 8., 3.),
        ];
        for p in pts {
            tri.insert(p);
        }
        let (vertices, triangles, _) = tri.finish();
        // Euler: a triangulated convex polygon with h hull and i interior points has 2i + h - 2 triangles
        assert_eq!(triangles.len(), 2 * 3 + 4 - 2);
        for t in &triangles {
            let (a, b, c) = (vertices[t[0]], vertices[t[1]], vertices[t[2]]);
            assert!(orientation(a, b, c) > 0., "triangle not ccw: {:?}", t);
            let (cx, cy, r2) = circumcircle(a, b, c);
            for (i, p) in vertices.iter().enumerate() {
                if t.contains(&i) {
                    continue;
                }
                let d2 = (p.x - cx).powi(2) + (p.y - cy).powi(2);
                assert!(d2 >= r2 * (1. - 1e-9), "vertex {} inside circumcircle of {:?}", i, t);
            }
        }
    }

    #[test]
    fn test_interpolate_plane() {
        let mut tri = Triangulator::new(&Envelope::new(500_000., 6_000_000., 500_010., 6_000_010.), 1e-7);
        // z = x' + 2y' in local coordinates
        for p in env().corners(0.) {
            tri.insert(Point::new(p.x + 500_000., p.y + 6_000_000., p.x + 2. * p.y));
        }
        tri.triangulate();
        let z = tri.interpolate(500_002.5, 6_000_004.);
        assert!(z.is_some());
        assert!((z.unwrap_or(0.) - 10.5).abs() < 1e-9);
        assert_eq!(tri.interpolate(500_020., 6_000_004.), None);
    }

    #[test]
    fn test_edges_follow_triangulation() {
        let mut tri = Triangulator::new(&env(), 1e-7);
        for p in env().corners(0.) {
            tri.insert(p);
        }
        tri.triangulate();
        for i in 0..4 {
            assert!(tri.has_edge(i, (i + 1) % 4));
        }
        // Exactly one diagonal of the square
        assert!(tri.has_edge(0, 2) != tri.has_edge(1, 3));
        let centre = tri.insert(Point::new(5., 5., 0.));
        assert_eq!(centre, Insertion::Inserted(4));
        tri.triangulate();
        assert!(!tri.has_edge(0, 2) && !tri.has_edge(1, 3));
        assert_eq!(tri.triangle_count(), 4);
    }

    #[test]
    fn test_barycentric() {
        let a = Point::new(0., 0., 0.);
        let b = Point::new(1., 0., 0.);
        let c = Point::new(0., 1., 0.);
        let w = barycentric(Point::new(0.25, 0.25, 0.), a, b, c, 0.).unwrap();
        assert!((w[0] - 0.5).abs() < 1e-12);
        assert!(barycentric(Point::new(1., 1., 0.), a, b, c, 1e-9).is_none());
    }
}
