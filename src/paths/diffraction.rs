//! Diffraction search around and over obstacles.

use std::collections::BTreeSet;

use log::debug;

use crate::compute::cancel::CancelProbe;
use crate::error::{FeatureId, Result};
use crate::geom::hull::{convex_hull, upper_hull};
use crate::geom::point::Point;
use crate::paths::path::{DiffractionEdge, PathPoint, PathPointKind};
use crate::scene::profile::CutProfile;
use crate::scene::{Obstacle, Scene};

/// The hull stops growing past this many obstacles.
const MAX_HULL_OBSTACLES: usize = 64;

/// Diffraction points replacing an obstructed segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Detour {
    /// Diffraction points, end points excluded.
    pub points: Vec<PathPoint>,
    /// 3D length from start to end through the points.
    pub length: f64,
}

impl Detour {
    pub fn order(&self) -> usize {
        self.points.len()
    }

    fn new(start: Point, points: Vec<PathPoint>, end: Point) -> Self {
        let mut length = 0.;
        let mut prev = start;
        for p in points.iter().map(|p| p.position).chain(std::iter::once(end)) {
            length += prev.distance(&p);
            prev = p;
        }
        Self { points, length }
    }
}

/// Candidate hull vertex.
#[derive(Debug, Clone, Copy)]
struct Vertex {
    position: Point,
    feature: Option<FeatureId>,
}

/// Paths around the obstacles blocking a->b, one per side at most.
///
/// The convex hull of the end points and of the corners of the blocking
/// obstacles is split into the two chains joining a and b. Obstacles blocking
/// a chain edge are added and the hull is rebuilt until no edge is blocked.
/// Elevations along a chain grow linearly with the horizontal distance.
pub fn horizontal_detours(
    scene: &Scene,
    a: Point,
    b: Point,
    max_order: usize,
    max_length: f64,
    probe: &CancelProbe,
) -> Result<Vec<Detour>> {
    let eps = scene.config().epsilon;
    if max_order == 0 || a.distance_2d(&b) < eps {
        return Ok(Vec::new());
    }
    let mut obstacles: BTreeSet<Obstacle> = scene.blocking_obstacles(a, b).into_iter().collect();
    if obstacles.is_empty() {
        return Ok(Vec::new());
    }

    let chains = loop {
        probe.tick()?;
        let mut vertices = vec![
            Vertex {
                position: a,
                feature: None,
            },
            Vertex {
                position: b,
                feature: None,
            },
        ];
        for &o in &obstacles {
            let feature = Some(scene.obstacle_id(o));
            vertices.extend(
                scene
                    .obstacle_corners(o)
                    .into_iter()
                    .map(|position| Vertex { position, feature }),
            );
        }
        let positions: Vec<Point> = vertices.iter().map(|v| v.position).collect();
        let hull = convex_hull(&positions, eps);
        let Some(chains) = split_hull(&hull, &vertices, a, b, eps) else {
            debug!("End point inside the obstacle hull, no path around");
            return Ok(Vec::new());
        };

        let mut grew = false;
        for chain in &chains {
            for w in chain.windows(2) {
                probe.tick()?;
                for o in scene.blocking_obstacles(w[0].position, w[1].position) {
                    grew |= obstacles.insert(o);
                }
            }
        }
        if !grew {
            break chains;
        }
        if obstacles.len() > MAX_HULL_OBSTACLES {
            debug!("Too many obstacles around the path, giving up");
            return Ok(Vec::new());
        }
    };

    let mut detours = Vec::new();
    for chain in chains {
        let order = chain.len() - 2;
        if order == 0 || order > max_order {
            continue;
        }
        let mut blocked = false;
        for w in chain.windows(2) {
            probe.tick()?;
            if scene.has_obstruction(w[0].position, w[1].position) {
                blocked = true;
                break;
            }
        }
        if blocked {
            continue;
        }
        let points = chain[1..chain.len() - 1]
            .iter()
            .map(|v| {
                PathPoint::new(
                    v.position,
                    PathPointKind::Diffraction {
                        feature: v.feature,
                        edge: DiffractionEdge::Horizontal,
                    },
                )
            })
            .collect();
        let detour = Detour::new(a, points, b);
        if detour.length <= max_length {
            detours.push(detour);
        }
    }
    Ok(detours)
}

/// Splits a counter-clockwise hull into the chains a->b going each way round,
/// with elevations interpolated between a.z and b.z.
fn split_hull(
    hull: &[Point],
    vertices: &[Vertex],
    a: Point,
    b: Point,
    eps: f64,
) -> Option<[Vec<Vertex>; 2]> {
    let n = hull.len();
    let ia = hull.iter().position(|p| p.is_close_2d(&a, eps))?;
    let ib = hull.iter().position(|p| p.is_close_2d(&b, eps))?;
    if ia == ib {
        return None;
    }
    let lookup = |p: &Point| -> Vertex {
        vertices
            .iter()
            .find(|v| v.position.is_close_2d(p, eps))
            .copied()
            .unwrap_or(Vertex {
                position: *p,
                feature: None,
            })
    };
    let walk = |step: usize| -> Vec<Vertex> {
        let mut chain = vec![lookup(&hull[ia])];
        let mut i = ia;
        while i != ib {
            i = (i + step) % n;
            chain.push(lookup(&hull[i]));
        }
        chain[0].position = a;
        if let Some(last) = chain.last_mut() {
            last.position = b;
        }
        interpolate_z(&mut chain, a.z, b.z);
        chain
    };
    Some([walk(1), walk(n - 1)])
}

fn interpolate_z(chain: &mut [Vertex], z0: f64, z1: f64) {
    let mut cumulative = Vec::with_capacity(chain.len());
    let mut total = 0.;
    cumulative.push(0.);
    for w in chain.windows(2) {
        total += w[0].position.distance_2d(&w[1].position);
        cumulative.push(total);
    }
    if total <= 0. {
        return;
    }
    for (v, d) in chain.iter_mut().zip(cumulative) {
        v.position.z = z0 + (z1 - z0) * d / total;
    }
}

/// Path over the top of everything cut by a->b.
///
/// Builds the upper convex hull of the profile in the vertical plane of the
/// line (distance from a, elevation). Returns None when the hull is the
/// straight line itself, has more than `max_order` vertices or is longer
/// than `max_length`.
pub fn vertical_detour(
    profile: &CutProfile,
    a: Point,
    b: Point,
    max_order: usize,
    max_length: f64,
    eps: f64,
) -> Option<Detour> {
    if max_order == 0 || profile.len() < 3 {
        return None;
    }
    let cut = profile.points();
    let last = cut.len() - 1;
    let pts: Vec<(f64, f64)> = cut
        .iter()
        .enumerate()
        .map(|(i, cp)| {
            let z = if i == 0 {
                a.z
            } else if i == last {
                b.z
            } else {
                cp.position.z
            };
            (cp.distance, z)
        })
        .collect();
    let hull = upper_hull(&pts, eps);
    let inner = &hull[1..hull.len().saturating_sub(1)];
    if inner.is_empty() || inner.len() > max_order {
        return None;
    }
    let points = inner
        .iter()
        .map(|&i| {
            PathPoint::new(
                cut[i].position.with_z(pts[i].1),
                PathPointKind::Diffraction {
                    feature: cut[i].feature_id(),
                    edge: DiffractionEdge::Vertical,
                },
            )
        })
        .collect();
    let detour = Detour::new(a, points, b);
    (detour.length <= max_length).then_some(detour)
}
