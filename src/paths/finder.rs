//! Per-pair path search.

use std::sync::Arc;

use log::{debug, trace};

use crate::compute::cancel::{CancelProbe, CancellationToken};
use crate::error::{GeometryError, PathError, Result};
use crate::geom::point::Point;
use crate::geom::segment::{SegmentIntersection, intersect_2d, point_along};
use crate::paths::diffraction::{Detour, horizontal_detours, vertical_detour};
use crate::paths::mirror::{MirrorCache, MirrorReceiver, MirrorSet};
use crate::paths::path::{Path, PathPoint, PathPointKind, finalize};
use crate::scene::Scene;

/// Paths found for one source/receiver pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairPaths {
    /// Sorted: direct, reflected, reflected-diffracted, diffracted.
    pub paths: Vec<Path>,
    /// Candidates dropped because of bad local geometry.
    pub warnings: Vec<GeometryError>,
}

/// Finds the propagation paths between points of a frozen scene.
///
/// A finder is cheap to build and borrows everything it uses; one per worker
/// is the intended use.
#[derive(Debug, Clone, Copy)]
pub struct PathFinder<'a> {
    scene: &'a Scene,
    cache: Option<&'a MirrorCache>,
    cancel: Option<&'a CancellationToken>,
    cancel_interval: usize,
}

impl<'a> PathFinder<'a> {
    pub fn new(scene: &'a Scene) -> Self {
        Self {
            scene,
            cache: None,
            cancel: None,
            cancel_interval: 64,
        }
    }

    /// Shares mirror receivers between calls with the same receiver id.
    pub fn with_cache(mut self, cache: &'a MirrorCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Checks `token` every `interval` search iterations.
    pub fn with_cancellation(mut self, token: &'a CancellationToken, interval: usize) -> Self {
        self.cancel = Some(token);
        self.cancel_interval = interval;
        self
    }

    pub fn scene(&self) -> &'a Scene {
        self.scene
    }

    /// Paths between two points. Mirror receivers are not cached.
    pub fn find_paths(&self, source: Point, receiver: Point) -> Result<Vec<Path>> {
        self.search(0, source, 0, receiver, None)
            .map(|found| found.paths)
    }

    /// Paths between a source and a receiver identified by the caller.
    ///
    /// Mirror receivers are looked up in the cache by `receiver_id` when a
    /// cache is attached.
    pub fn find_paths_for(
        &self,
        source_id: u64,
        source: Point,
        receiver_id: u64,
        receiver: Point,
    ) -> Result<PairPaths> {
        self.search(source_id, source, receiver_id, receiver, self.cache)
    }

    /// Mirror receivers of `receiver`, from the cache when there is one.
    pub fn mirrors(&self, receiver_id: u64, receiver: Point) -> Arc<MirrorSet> {
        let config = self.scene.config();
        let generate = || {
            MirrorSet::generate(
                self.scene,
                receiver,
                config.max_reflection_order,
                config.search_radius,
            )
        };
        match self.cache {
            Some(cache) => cache.get_or_compute(receiver_id, generate),
            None => Arc::new(generate()),
        }
    }

    fn search(
        &self,
        source_id: u64,
        source: Point,
        receiver_id: u64,
        receiver: Point,
        cache: Option<&MirrorCache>,
    ) -> Result<PairPaths> {
        let config = self.scene.config();
        let probe = CancelProbe::new(self.cancel, self.cancel_interval);
        probe.check()?;

        let failure = |reason: &str| PathError::PairComputation {
            source_id,
            receiver_id,
            reason: reason.to_string(),
        };
        let direct_profile = self
            .scene
            .profile(source, receiver)
            .ok_or_else(|| failure("no cut profile between the end points"))?;
        if source.distance_2d(&receiver) > config.max_propagation_distance {
            trace!("Pair {source_id}/{receiver_id} out of range");
            return Ok(PairPaths::default());
        }
        if source.distance(&receiver) < config.epsilon {
            debug!("Pair {source_id}/{receiver_id}: source and receiver coincide");
            return Ok(PairPaths::default());
        }

        let mut found = PairPaths::default();
        if !self.scene.has_obstruction(source, receiver) {
            found.paths.push(Path::new(
                vec![
                    PathPoint::new(source, PathPointKind::Source),
                    PathPoint::new(receiver, PathPointKind::Receiver),
                ],
                vec![direct_profile],
            ));
        } else {
            let max_length = source.distance(&receiver) * (1. + config.max_length_excess_ratio);
            let detours = self.detours(
                source,
                receiver,
                config.max_diffraction_order,
                max_length,
                &probe,
            )?;
            for detour in detours {
                let mut points = vec![PathPoint::new(source, PathPointKind::Source)];
                points.extend(detour.points);
                points.push(PathPoint::new(receiver, PathPointKind::Receiver));
                if let Some(path) = self.assemble(points, &mut found.warnings) {
                    found.paths.push(path);
                }
            }
        }

        if config.max_reflection_order > 0 {
            let mirrors = match cache {
                Some(_) => self.mirrors(receiver_id, receiver),
                None => Arc::new(MirrorSet::generate(
                    self.scene,
                    receiver,
                    config.max_reflection_order,
                    config.search_radius,
                )),
            };
            for m in mirrors.mirrors() {
                probe.tick()?;
                if source.distance_2d(&m.position) > config.max_propagation_distance {
                    continue;
                }
                let chain = mirrors.chain(m.id);
                let Some(points) = self.unfold(source, receiver, &chain) else {
                    continue;
                };
                let Some(points) = self.clear_legs(points, &probe)? else {
                    continue;
                };
                if let Some(path) = self.assemble(points, &mut found.warnings) {
                    found.paths.push(path);
                }
            }
        }

        found.paths = finalize(found.paths, config.epsilon);
        debug!(
            "Pair {source_id}/{receiver_id}: {} paths, {} warnings",
            found.paths.len(),
            found.warnings.len()
        );
        Ok(found)
    }

    /// Paths over and around the obstacles blocking a->b, shortest first.
    fn detours(
        &self,
        a: Point,
        b: Point,
        max_order: usize,
        max_length: f64,
        probe: &CancelProbe,
    ) -> Result<Vec<Detour>> {
        let config = self.scene.config();
        let mut detours = Vec::new();
        if max_order == 0 {
            return Ok(detours);
        }
        if config.compute_vertical_diffraction
            && let Some(profile) = self.scene.profile(a, b)
            && let Some(detour) =
                vertical_detour(&profile, a, b, max_order, max_length, config.epsilon)
        {
            detours.push(detour);
        }
        if config.compute_horizontal_diffraction {
            detours.extend(horizontal_detours(
                self.scene, a, b, max_order, max_length, probe,
            )?);
        }
        detours.sort_by(|x, y| x.length.total_cmp(&y.length));
        Ok(detours)
    }

    /// Reflection points of the image chain `chain` (deepest image first),
    /// with the source and the receiver at both ends.
    ///
    /// Returns None when a ray misses its wall or hits it outside its
    /// vertical extent.
    fn unfold(
        &self,
        source: Point,
        receiver: Point,
        chain: &[&MirrorReceiver],
    ) -> Option<Vec<PathPoint>> {
        let eps = self.scene.config().epsilon;
        let walls = self.scene.walls();
        let mut hits: Vec<(Point, usize, f64)> = Vec::with_capacity(chain.len());
        let mut from = source;
        for m in chain {
            let wall = &walls[m.wall];
            if !wall.faces(from, eps) {
                return None;
            }
            let tol = (eps / from.distance_2d(&m.position).max(eps)).max(1e-12);
            match intersect_2d(from, m.position, wall.p0, wall.p1) {
                SegmentIntersection::Point { t, u } if t > tol && t < 1. - tol => {
                    from = point_along(from, m.position, t);
                    hits.push((from, m.wall, u));
                }
                _ => return None,
            }
        }

        // The unfolded polyline is straight: z grows with the horizontal distance
        let mut cumulative = Vec::with_capacity(hits.len());
        let mut total = 0.;
        let mut prev = source;
        for &(p, _, _) in &hits {
            total += prev.distance_2d(&p);
            cumulative.push(total);
            prev = p;
        }
        total += prev.distance_2d(&receiver);
        if total <= eps {
            return None;
        }

        let mut points = vec![PathPoint::new(source, PathPointKind::Source)];
        for ((p, wi, u), d) in hits.into_iter().zip(cumulative) {
            let wall = &walls[wi];
            let z = source.z + (receiver.z - source.z) * d / total;
            if z < wall.bottom_at(u) - eps || z > wall.top_at(u) + eps {
                return None;
            }
            points.push(PathPoint::new(
                p.with_z(z),
                PathPointKind::Reflection {
                    wall: wall.id,
                    wall_index: wi,
                },
            ));
        }
        points.push(PathPoint::new(receiver, PathPointKind::Receiver));
        Some(points)
    }

    /// Replaces every obstructed leg of a reflected path by its shortest detour.
    ///
    /// Returns None when a leg cannot be cleared within the diffraction order
    /// left or within the leg's own length limit.
    fn clear_legs(
        &self,
        points: Vec<PathPoint>,
        probe: &CancelProbe,
    ) -> Result<Option<Vec<PathPoint>>> {
        let config = self.scene.config();
        let mut cleared = Vec::with_capacity(points.len());
        let mut order_left = config.max_diffraction_order;
        let mut iter = points.into_iter();
        let Some(mut prev) = iter.next() else {
            return Ok(None);
        };
        cleared.push(prev);
        for next in iter {
            probe.tick()?;
            if self.scene.has_obstruction(prev.position, next.position) {
                let max_length =
                    prev.position.distance(&next.position) * (1. + config.max_length_excess_ratio);
                let detours =
                    self.detours(prev.position, next.position, order_left, max_length, probe)?;
                let Some(best) = detours.into_iter().next() else {
                    return Ok(None);
                };
                order_left -= best.order();
                cleared.extend(best.points);
            }
            cleared.push(next);
            prev = next;
        }
        Ok(Some(cleared))
    }

    /// Builds a path with the profile of every leg.
    fn assemble(&self, points: Vec<PathPoint>, warnings: &mut Vec<GeometryError>) -> Option<Path> {
        let mut profiles = Vec::with_capacity(points.len().saturating_sub(1));
        for w in points.windows(2) {
            match self.scene.profile(w[0].position, w[1].position) {
                Some(profile) => profiles.push(profile),
                None => {
                    let feature_id = w[0].feature_id().or(w[1].feature_id()).unwrap_or(0);
                    warnings.push(GeometryError::NonFinite { feature_id });
                    return None;
                }
            }
        }
        Some(Path::new(points, profiles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathConfig;
    use crate::geom::vector::Vector;
    use crate::paths::path::PathKind;
    use crate::scene::ProfileBuilder;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<Point> {
        vec![
            Point::new(x0, y0, 0.),
            Point::new(x1, y0, 0.),
            Point::new(x1, y1, 0.),
            Point::new(x0, y1, 0.),
        ]
    }

    #[test]
    fn test_free_field_is_one_direct_path() -> anyhow::Result<()> {
        let mut builder = ProfileBuilder::new(PathConfig::new(2, 2, 50., 1.));
        builder.finish()?;
        let finder = PathFinder::new(builder.scene()?);
        let s = Point::new(0., 0., 1.);
        let r = Point::new(100., 0., 1.);
        let paths = finder.find_paths(s, r)?;
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].kind, PathKind::Direct);
        assert!((paths[0].length() - 100.).abs() < 1e-9);
        assert_eq!(paths[0].profiles.len(), 1);
        Ok(())
    }

    #[test]
    fn test_out_of_range_pair() -> anyhow::Result<()> {
        let mut builder = ProfileBuilder::new(
            PathConfig::new(2, 2, 50., 1.).with_max_propagation_distance(50.),
        );
        builder.finish()?;
        let finder = PathFinder::new(builder.scene()?);
        let paths = finder.find_paths(Point::new(0., 0., 1.), Point::new(100., 0., 1.))?;
        assert!(paths.is_empty());
        Ok(())
    }

    #[test]
    fn test_coincident_pair_has_no_paths() -> anyhow::Result<()> {
        let mut builder = ProfileBuilder::new(PathConfig::new(1, 0, 50., 1.));
        builder.add_wall(
            1,
            vec![Point::new(-10., 20., 0.), Point::new(110., 20., 0.)],
            5.,
            vec![0.1],
        )?;
        builder.finish()?;
        let finder = PathFinder::new(builder.scene()?);
        let p = Point::new(50., 0., 1.);
        assert!(finder.find_paths(p, p)?.is_empty());
        let nudged = Point::new(50. + 1e-9, 0., 1.);
        assert!(finder.find_paths(p, nudged)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_non_finite_pair_fails() -> anyhow::Result<()> {
        let mut builder = ProfileBuilder::new(PathConfig::new(2, 2, 50., 1.));
        builder.finish()?;
        let finder = PathFinder::new(builder.scene()?);
        let out = finder.find_paths_for(3, Point::new(f64::NAN, 0., 1.), 4, Point::new(1., 0., 1.));
        assert!(matches!(
            out,
            Err(PathError::PairComputation {
                source_id: 3,
                receiver_id: 4,
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn test_reflection_on_parallel_wall() -> anyhow::Result<()> {
        let mut builder = ProfileBuilder::new(PathConfig::new(1, 0, 50., 1.));
        builder.add_wall(
            1,
            vec![Point::new(-10., 20., 0.), Point::new(110., 20., 0.)],
            5.,
            vec![0.1],
        )?;
        builder.finish()?;
        let finder = PathFinder::new(builder.scene()?);
        let paths = finder.find_paths(Point::new(0., 0., 1.), Point::new(100., 0., 2.))?;
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].kind, PathKind::Direct);
        let refl = &paths[1];
        assert_eq!(refl.kind, PathKind::Reflected);
        let p = refl.points[1].position;
        assert!((p.x - 50.).abs() < 1e-9 && (p.y - 20.).abs() < 1e-9);
        assert!((p.z - 1.5).abs() < 1e-9);

        // Angle of incidence equals angle of reflection
        let n = Vector::new(0., 1., 0.);
        let incoming = Vector::from_points(refl.points[0].position, p);
        let outgoing = Vector::from_points(p, refl.points[2].position);
        assert!((incoming.angle(&n) - (-outgoing).angle(&n)).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_reflection_above_wall_is_dropped() -> anyhow::Result<()> {
        let mut builder = ProfileBuilder::new(PathConfig::new(1, 0, 50., 1.));
        builder.add_wall(
            1,
            vec![Point::new(-10., 20., 0.), Point::new(110., 20., 0.)],
            5.,
            vec![0.1],
        )?;
        builder.finish()?;
        let finder = PathFinder::new(builder.scene()?);
        let paths = finder.find_paths(Point::new(0., 0., 8.), Point::new(100., 0., 8.))?;
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].kind, PathKind::Direct);
        Ok(())
    }

    #[test]
    fn test_building_in_the_way_is_diffracted() -> anyhow::Result<()> {
        let mut builder = ProfileBuilder::new(PathConfig::new(0, 2, 50., 1.));
        builder.add_building(1, square(40., -10., 60., 10.), 10., vec![0.2])?;
        builder.finish()?;
        let finder = PathFinder::new(builder.scene()?);
        let paths = finder.find_paths(Point::new(0., 0., 1.), Point::new(100., 0., 1.))?;
        assert!(paths.iter().all(|p| p.kind == PathKind::Diffracted));
        // Over the roof and around both sides
        assert_eq!(paths.len(), 3);
        assert!(paths.windows(2).all(|w| w[0].length() <= w[1].length()));
        for p in &paths {
            assert_eq!(p.diffraction_order(), 2);
            assert_eq!(p.profiles.len(), 3);
            assert_eq!(p.touched_features(), vec![1]);
        }
        Ok(())
    }

    #[test]
    fn test_diffraction_switches() -> anyhow::Result<()> {
        let config = PathConfig::new(0, 2, 50., 1.).with_vertical_diffraction(false);
        let mut builder = ProfileBuilder::new(config);
        builder.add_building(1, square(40., -10., 60., 10.), 10., vec![0.2])?;
        builder.finish()?;
        let finder = PathFinder::new(builder.scene()?);
        let paths = finder.find_paths(Point::new(0., 0., 1.), Point::new(100., 0., 1.))?;
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| p.points[1..3].iter().all(|pp| matches!(
            pp.kind,
            PathPointKind::Diffraction {
                edge: crate::paths::path::DiffractionEdge::Horizontal,
                ..
            }
        ))));
        Ok(())
    }

    #[test]
    fn test_reflected_leg_around_building() -> anyhow::Result<()> {
        // Wall behind a small building that blocks the way to the receiver
        let mut builder = ProfileBuilder::new(PathConfig::new(1, 2, 100., 1.));
        builder.add_wall(
            1,
            vec![Point::new(-50., 40., 0.), Point::new(150., 40., 0.)],
            20.,
            vec![0.1],
        )?;
        builder.add_building(2, square(70., 15., 80., 25.), 10., vec![0.2])?;
        builder.finish()?;
        let finder = PathFinder::new(builder.scene()?);
        let paths = finder.find_paths(Point::new(0., 0., 1.), Point::new(100., 0., 1.))?;
        assert_eq!(paths[0].kind, PathKind::Direct);
        let rd: Vec<&Path> = paths
            .iter()
            .filter(|p| p.kind == PathKind::ReflectedDiffracted)
            .collect();
        assert!(!rd.is_empty());
        for p in rd {
            assert_eq!(p.reflection_order(), 1);
            assert!(p.diffraction_order() <= 2);
        }
        Ok(())
    }

    #[test]
    fn test_cancelled_before_start() -> anyhow::Result<()> {
        let mut builder = ProfileBuilder::new(PathConfig::new(1, 1, 50., 1.));
        builder.finish()?;
        let token = CancellationToken::new();
        token.cancel();
        let finder = PathFinder::new(builder.scene()?).with_cancellation(&token, 1);
        let out = finder.find_paths(Point::new(0., 0., 1.), Point::new(10., 0., 1.));
        assert!(matches!(out, Err(PathError::Cancelled)));
        Ok(())
    }
}
