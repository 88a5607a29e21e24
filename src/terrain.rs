//! Ground surface triangulated from topography points.
//!
//! The mesh is a Delaunay triangulation of the topographic points made
//! conforming to constraint edges (topographic lines, building footprints,
//! ground zone outlines) by splitting every missing constraint edge at its
//! midpoint. The four corners of the scene extent are always inserted so the
//! mesh covers the whole scene envelope. With a maximum triangle area, larger
//! triangles are split at their centroid before the constraints are recovered.

pub mod delaunay;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::GeometryError;
use crate::geom::bboxes::Envelope;
use crate::geom::point::Point;
use crate::geom::segment::{SegmentIntersection, intersect_2d, orientation, point_along};
use crate::index::{IndexBuilder, SpatialIndex};
use delaunay::{Insertion, Triangulator, barycentric};

/// Maximum number of midpoint splits along one constraint edge.
const MAX_SPLIT_DEPTH: usize = 10;

/// Maximum number of conforming passes.
const MAX_PASSES: usize = 8;

/// Maximum number of area refinement passes.
const MAX_REFINE_PASSES: usize = 16;

/// Constraint edge. When `has_z` is false, the endpoints take the elevation
/// of the unconstrained surface at their location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constraint {
    pub a: Point,
    pub b: Point,
    pub has_z: bool,
}

/// Topography crossing along a line: distance from the line start and the
/// ground point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundSample {
    pub distance: f64,
    pub point: Point,
}

#[derive(Debug)]
pub struct TerrainMesh {
    vertices: Vec<Point>,
    triangles: Vec<[usize; 3]>,
    /// Ground coefficient of each triangle.
    ground: Vec<f64>,
    index: SpatialIndex<usize>,
    skipped_points: usize,
    unresolved_constraints: usize,
}

impl TerrainMesh {
    /// Triangulates the terrain.
    ///
    /// `extent` is the scene envelope to cover, `max_area` caps the area of
    /// the triangles (in square meters) and `ground_at` gives the ground
    /// coefficient for a triangle centroid. Fails when topography points do
    /// not span a surface (fewer than 3 distinct non-collinear points).
    pub fn build<F>(
        topography: &[Point],
        constraints: &[Constraint],
        extent: &Envelope,
        eps: f64,
        max_area: Option<f64>,
        ground_at: F,
    ) -> Result<Self, GeometryError>
    where
        F: Fn(Point) -> f64,
    {
        let mut tri = Triangulator::new(extent, eps);
        let mut skipped_points = 0;

        for p in topography {
            if !p.is_finite() {
                skipped_points += 1;
                continue;
            }
            match tri.insert(*p) {
                Insertion::Inserted(_) => {}
                Insertion::Duplicate(_) | Insertion::Rejected => skipped_points += 1,
            }
        }
        tri.triangulate();
        if tri.triangle_count() == 0 {
            return Err(GeometryError::DegenerateTriangle {
                x: topography.first().map(|p| p.x).unwrap_or(0.),
                y: topography.first().map(|p| p.y).unwrap_or(0.),
            });
        }

        // Corners of the extent take the elevation of the nearest topographic point
        for corner in extent.corners(0.) {
            let z = nearest_elevation(topography, corner);
            if let Insertion::Rejected = tri.insert(corner.with_z(z)) {
                skipped_points += 1;
            }
        }
        tri.triangulate();

        // Constraint endpoints
        let mut segments: Vec<(usize, usize, usize)> = Vec::new();
        for c in constraints {
            let (a, b) = if c.has_z {
                (c.a, c.b)
            } else {
                let za = tri.interpolate(c.a.x, c.a.y).unwrap_or(0.);
                let zb = tri.interpolate(c.b.x, c.b.y).unwrap_or(0.);
                (c.a.with_z(za), c.b.with_z(zb))
            };
            let ia = vertex_of(tri.insert(a));
            let ib = vertex_of(tri.insert(b));
            match (ia, ib) {
                (Some(ia), Some(ib)) if ia != ib => segments.push((ia, ib, 0)),
                _ => skipped_points += 1,
            }
        }

        if let Some(max_area) = max_area {
            let added = refine(&mut tri, max_area);
            debug!("Terrain: {} points added to keep triangles under {} m2", added, max_area);
        }

        let unresolved_constraints = conform(&mut tri, segments);
        if unresolved_constraints > 0 {
            debug!(
                "Terrain: {} constraint edges could not be recovered",
                unresolved_constraints
            );
        }

        let (vertices, triangles, degenerate) = tri.finish();
        if degenerate > 0 {
            warn!("Terrain: skipped {} zero-area triangles", degenerate);
        }

        let mut builder = IndexBuilder::new();
        let mut ground = Vec::with_capacity(triangles.len());
        for (i, t) in triangles.iter().enumerate() {
            let pts = [vertices[t[0]], vertices[t[1]], vertices[t[2]]];
            if let Some(env) = Envelope::from_points(&pts) {
                builder.insert(&env, i);
            }
            let centroid = Point::new(
                (pts[0].x + pts[1].x + pts[2].x) / 3.,
                (pts[0].y + pts[1].y + pts[2].y) / 3.,
                (pts[0].z + pts[1].z + pts[2].z) / 3.,
            );
            ground.push(ground_at(centroid));
        }

        Ok(Self {
            vertices,
            triangles,
            ground,
            index: builder.build(),
            skipped_points,
            unresolved_constraints,
        })
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Ground coefficient attached to a triangle.
    pub fn ground_coefficient(&self, triangle: usize) -> Option<f64> {
        self.ground.get(triangle).copied()
    }

    /// Input points that were duplicates or could not be inserted.
    pub fn skipped_points(&self) -> usize {
        self.skipped_points
    }

    pub fn unresolved_constraints(&self) -> usize {
        self.unresolved_constraints
    }

    /// Index of the triangle holding (x, y), if any.
    ///
    /// Points on a shared edge resolve to the lowest triangle index.
    pub fn locate(&self, x: f64, y: f64) -> Option<usize> {
        let env = Envelope::new(x, y, x, y);
        let mut candidates: Vec<usize> = self.index.query(&env).copied().collect();
        candidates.sort_unstable();
        candidates.into_iter().find(|&i| {
            let [a, b, c] = self.corners(i);
            barycentric(Point::new(x, y, 0.), a, b, c, 1e-9).is_some()
        })
    }

    /// Elevation at (x, y) by barycentric interpolation.
    pub fn elevation(&self, x: f64, y: f64) -> Option<f64> {
        let i = self.locate(x, y)?;
        let [a, b, c] = self.corners(i);
        let w = barycentric(Point::new(x, y, 0.), a, b, c, 1e-9)?;
        Some(w[0] * a.z + w[1] * b.z + w[2] * c.z)
    }

    fn corners(&self, i: usize) -> [Point; 3] {
        let t = self.triangles[i];
        [self.vertices[t[0]], self.vertices[t[1]], self.vertices[t[2]]]
    }

    /// Ground points where the 2D segment a->b crosses triangle edges,
    /// ordered by distance from `a`.
    ///
    /// `chunks` are the envelopes used for the broad phase (the segment may be
    /// split in several pieces to keep candidate sets small).
    pub fn crossings(&self, a: Point, b: Point, chunks: &[Envelope], eps: f64) -> Vec<GroundSample> {
        let length = a.distance_2d(&b);
        if length < eps {
            return Vec::new();
        }
        let mut edges: Vec<(usize, usize)> = Vec::new();
        for ti in self.index.query_many(chunks) {
            let t = self.triangles[ti];
            for k in 0..3 {
                let (u, v) = (t[k], t[(k + 1) % 3]);
                edges.push((u.min(v), u.max(v)));
            }
        }
        edges.sort_unstable();
        edges.dedup();

        let mut samples = Vec::new();
        for (u, v) in edges {
            let (p, q) = (self.vertices[u], self.vertices[v]);
            match intersect_2d(a, b, p, q) {
                SegmentIntersection::Point { t, u } => {
                    let g = point_along(p, q, u);
                    samples.push(GroundSample {
                        distance: t * length,
                        point: Point::new(
                            a.x + (b.x - a.x) * t,
                            a.y + (b.y - a.y) * t,
                            g.z,
                        ),
                    });
                }
                SegmentIntersection::Collinear { t0, t1 } => {
                    for t in [t0, t1] {
                        let pt = point_along(a, b, t);
                        let z = self.elevation(pt.x, pt.y).unwrap_or(pt.z);
                        samples.push(GroundSample {
                            distance: t * length,
                            point: pt.with_z(z),
                        });
                    }
                }
                SegmentIntersection::None => {}
            }
        }
        samples.sort_by(|s1, s2| s1.distance.total_cmp(&s2.distance));
        samples.dedup_by(|s2, s1| (s2.distance - s1.distance).abs() < eps);
        samples
    }
}

/// Removes samples whose elevation is a straight-line interpolation of
/// their kept neighbours within `delta`.
///
/// The first and last samples are always kept.
pub fn drop_redundant(samples: Vec<GroundSample>, delta: f64) -> Vec<GroundSample> {
    if samples.len() < 3 {
        return samples;
    }
    let mut kept: Vec<GroundSample> = Vec::with_capacity(samples.len());
    let n = samples.len();
    for i in 0..n {
        if i == 0 || i == n - 1 {
            kept.push(samples[i]);
            continue;
        }
        let prev = kept[kept.len() - 1];
        let next = samples[i + 1];
        let cur = samples[i];
        let span = next.distance - prev.distance;
        if span.abs() < f64::EPSILON {
            continue;
        }
        let r = (cur.distance - prev.distance) / span;
        let z_line = prev.point.z + (next.point.z - prev.point.z) * r;
        if (cur.point.z - z_line).abs() > delta {
            kept.push(cur);
        }
    }
    kept
}

fn vertex_of(ins: Insertion) -> Option<usize> {
    match ins {
        Insertion::Inserted(i) | Insertion::Duplicate(i) => Some(i),
        Insertion::Rejected => None,
    }
}

fn nearest_elevation(pts: &[Point], target: Point) -> f64 {
    pts.iter()
        .filter(|p| p.is_finite())
        .min_by(|a, b| a.distance_2d(&target).total_cmp(&b.distance_2d(&target)))
        .map(|p| p.z)
        .unwrap_or(0.)
}

/// Splits triangles larger than `max_area` at their centroid.
///
/// Returns the number of added points.
fn refine(tri: &mut Triangulator, max_area: f64) -> usize {
    let mut added = 0;
    for _ in 0..MAX_REFINE_PASSES {
        if tri.is_stale() {
            tri.triangulate();
        }
        let centroids: Vec<Point> = (0..tri.triangle_count())
            .map(|i| tri.triangle(i))
            .filter(|&[a, b, c]| 0.5 * orientation(a, b, c).abs() > max_area)
            .map(|[a, b, c]| {
                Point::new(
                    (a.x + b.x + c.x) / 3.,
                    (a.y + b.y + c.y) / 3.,
                    (a.z + b.z + c.z) / 3.,
                )
            })
            .collect();
        if centroids.is_empty() {
            break;
        }
        for c in centroids {
            if let Insertion::Inserted(_) = tri.insert(c) {
                added += 1;
            }
        }
    }
    if tri.is_stale() {
        tri.triangulate();
    }
    added
}

/// Splits missing constraint edges until they appear in the triangulation.
///
/// Returns the number of constraint pieces that could not be recovered.
fn conform(tri: &mut Triangulator, mut segments: Vec<(usize, usize, usize)>) -> usize {
    for _ in 0..MAX_PASSES {
        if tri.is_stale() {
            tri.triangulate();
        }
        let mut inserted = false;
        let mut next = Vec::with_capacity(segments.len());
        for (a, b, depth) in segments {
            if tri.has_edge(a, b) || depth >= MAX_SPLIT_DEPTH {
                next.push((a, b, depth));
                continue;
            }
            let mid = Point::new_between_2_points(tri.vertex(a), tri.vertex(b), 0.5);
            match vertex_of(tri.insert(mid)) {
                Some(m) if m != a && m != b => {
                    next.push((a, m, depth + 1));
                    next.push((m, b, depth + 1));
                    inserted = true;
                }
                _ => next.push((a, b, MAX_SPLIT_DEPTH)),
            }
        }
        segments = next;
        if !inserted {
            break;
        }
    }
    if tri.is_stale() {
        tri.triangulate();
    }
    segments
        .iter()
        .filter(|(a, b, _)| !tri.has_edge(*a, *b))
        .count()
}
