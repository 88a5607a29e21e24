//! Scene model.
//!
//! A [`ProfileBuilder`] is fed with buildings, walls, ground zones and
//! topography, then frozen with [`ProfileBuilder::finish`]. Freezing builds
//! the spatial indexes and the terrain mesh and produces a read-only
//! [`Scene`] that answers profile and visibility queries from any thread.

pub mod feature;
pub mod profile;

use std::collections::HashSet;

use log::{debug, info, warn};

use crate::config::PathConfig;
use crate::error::{FeatureId, GeometryError, PathError, Result};
use crate::geom::bboxes::Envelope;
use crate::geom::point::Point;
use crate::geom::polygon::{Polygon, PolygonDefect};
use crate::geom::segment::{
    SegmentIntersection, distance_point_to_segment, intersect_2d, point_along, project_param,
};
use crate::geom::vector::Vector;
use crate::index::{IndexBuilder, SpatialIndex};
use crate::terrain::{Constraint, GroundSample, TerrainMesh, drop_redundant};
use feature::{Building, GroundZone, Wall, WallOwner};
use profile::{CutPoint, CutPointKind, CutProfile};

/// Topography points closer than this to the line joining their neighbours are dropped.
const TOPOGRAPHY_DELTA: f64 = 1e-3;

/// Margin added around the fed features to get the scene extent.
const SCENE_MARGIN: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneState {
    Empty,
    Feeding,
    Frozen,
}

/// Something standing in the way of a line of sight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Obstacle {
    /// Building at this index.
    Building(usize),
    /// Free-standing wall segment at this index.
    Barrier(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum FeatureClass {
    Building,
    Wall,
    Zone,
}

#[derive(Debug, Clone)]
struct WallFeed {
    id: FeatureId,
    pts: Vec<Point>,
    height: f64,
    alphas: Vec<f64>,
}

/// Ground zones and their lookup structures.
#[derive(Debug)]
struct GroundMap {
    /// Explicit zones in feed order, then zones implied by buildings.
    zones: Vec<GroundZone>,
    index: SpatialIndex<usize>,
    /// (zone, edge) pairs of explicit zones.
    edge_index: SpatialIndex<(usize, usize)>,
    default: f64,
    eps: f64,
}

impl GroundMap {
    fn new(zones: Vec<GroundZone>, default: f64, eps: f64) -> Self {
        let mut index = IndexBuilder::new();
        let mut edge_index = IndexBuilder::new();
        for (zi, zone) in zones.iter().enumerate() {
            index.insert(&zone.polygon.envelope(), zi);
            if zone.implicit {
                continue;
            }
            for (ei, (a, b)) in zone.polygon.edges().enumerate() {
                edge_index.insert(&Envelope::from_segment(a, b), (zi, ei));
            }
        }
        Self {
            zones,
            index: index.build(),
            edge_index: edge_index.build(),
            default,
            eps,
        }
    }

    /// G at a location: explicit zones beat building zones, later fed zones
    /// beat earlier ones.
    fn coefficient_at(&self, pt: Point) -> f64 {
        let env = Envelope::new(pt.x, pt.y, pt.x, pt.y);
        let mut best: Option<(bool, usize)> = None;
        for zi in self.index.query_sorted(&env) {
            let zone = &self.zones[zi];
            if !zone.polygon.contains(pt, true, self.eps) {
                continue;
            }
            let rank = (!zone.implicit, zi);
            if best.is_none_or(|b| rank > b) {
                best = Some(rank);
            }
        }
        best.map(|(_, zi)| self.zones[zi].coefficient)
            .unwrap_or(self.default)
    }
}

/// Frozen scene. Immutable, shared read-only by all workers.
#[derive(Debug)]
pub struct Scene {
    config: PathConfig,
    buildings: Vec<Building>,
    walls: Vec<Wall>,
    ground: GroundMap,
    building_index: SpatialIndex<usize>,
    wall_index: SpatialIndex<usize>,
    terrain: Option<TerrainMesh>,
    wide_angle: Vec<Vec<Point>>,
    envelope: Envelope,
}

impl Scene {
    pub fn config(&self) -> &PathConfig {
        &self.config
    }

    pub fn buildings(&self) -> &[Building] {
        &self.buildings
    }

    /// Reflecting wall segments: building façades first, then free-standing walls.
    pub fn walls(&self) -> &[Wall] {
        &self.walls
    }

    pub fn ground_zones(&self) -> &[GroundZone] {
        &self.ground.zones
    }

    pub fn terrain(&self) -> Option<&TerrainMesh> {
        self.terrain.as_ref()
    }

    pub fn envelope(&self) -> Envelope {
        self.envelope
    }

    /// Ground elevation (0 where there is no terrain).
    pub fn z_ground(&self, x: f64, y: f64) -> f64 {
        self.terrain
            .as_ref()
            .and_then(|t| t.elevation(x, y))
            .unwrap_or(0.)
    }

    /// Roof elevation inside a building, ground elevation elsewhere.
    pub fn z_at(&self, x: f64, y: f64) -> f64 {
        let pt = Point::new(x, y, 0.);
        let env = Envelope::new(x, y, x, y);
        self.building_index
            .query_sorted(&env)
            .into_iter()
            .map(|bi| &self.buildings[bi])
            .filter(|b| b.footprint.contains(pt, true, self.config.epsilon))
            .map(|b| b.roof_z)
            .max_by(|a, b| a.total_cmp(b))
            .unwrap_or_else(|| self.z_ground(x, y))
    }

    /// Ground effect coefficient G at a location.
    pub fn ground_coefficient_at(&self, pt: Point) -> f64 {
        self.ground.coefficient_at(pt)
    }

    /// Envelopes of the pieces of a->b used for broad phase queries.
    pub fn chunks(&self, a: Point, b: Point) -> Vec<Envelope> {
        let length = a.distance_2d(&b);
        let n = ((length / self.config.max_line_length).ceil() as usize).max(1);
        (0..n)
            .map(|i| {
                let p = point_along(a, b, i as f64 / n as f64);
                let q = point_along(a, b, (i + 1) as f64 / n as f64);
                Envelope::from_segment(p, q).expanded_by(self.config.epsilon)
            })
            .collect()
    }

    /// Wall segments whose envelope intersects `envelope`.
    pub fn walls_in(&self, envelope: &Envelope) -> Vec<&Wall> {
        self.wall_index
            .query_sorted(envelope)
            .into_iter()
            .map(|wi| &self.walls[wi])
            .collect()
    }

    /// Indices of the walls within `radius` (horizontal distance) of `pt`.
    pub fn walls_near(&self, pt: Point, radius: f64) -> Vec<usize> {
        self.wall_index
            .query_sorted(&Envelope::around(pt, radius))
            .into_iter()
            .filter(|&wi| {
                let w = &self.walls[wi];
                distance_point_to_segment(pt, w.p0, w.p1) <= radius
            })
            .collect()
    }

    /// Ids of the buildings whose footprint is crossed by the 2D segment a->b.
    pub fn buildings_on_path(&self, a: Point, b: Point) -> Vec<FeatureId> {
        let eps = self.config.epsilon;
        self.building_index
            .query_many(&self.chunks(a, b))
            .into_iter()
            .filter(|&bi| {
                let fp = &self.buildings[bi].footprint;
                fp.edges()
                    .any(|(p, q)| !matches!(intersect_2d(a, b, p, q), SegmentIntersection::None))
                    || fp.contains(point_along(a, b, 0.5), true, eps)
            })
            .map(|bi| self.buildings[bi].id)
            .collect()
    }

    /// Diffraction points around the convex corners of a building.
    pub fn wide_angle_points(&self, building: usize) -> &[Point] {
        self.wide_angle
            .get(building)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Feature id of an obstacle.
    pub fn obstacle_id(&self, obstacle: Obstacle) -> FeatureId {
        match obstacle {
            Obstacle::Building(bi) => self.buildings[bi].id,
            Obstacle::Barrier(wi) => self.walls[wi].id,
        }
    }

    /// Candidate diffraction points of an obstacle, slightly outside it.
    pub fn obstacle_corners(&self, obstacle: Obstacle) -> Vec<Point> {
        match obstacle {
            Obstacle::Building(bi) => self.wide_angle_points(bi).to_vec(),
            Obstacle::Barrier(wi) => {
                let w = &self.walls[wi];
                let off = self.config.wide_angle_offset;
                match Vector::new(w.p1.x - w.p0.x, w.p1.y - w.p0.y, 0.).normalize() {
                    Some(dir) => vec![
                        (w.p0 + dir * -off).with_z(w.top0 + off),
                        (w.p1 + dir * off).with_z(w.top1 + off),
                    ],
                    None => Vec::new(),
                }
            }
        }
    }

    /// Vertical profile of the line a->b.
    ///
    /// Returns None if an end point has non-finite coordinates.
    pub fn profile(&self, a: Point, b: Point) -> Option<CutProfile> {
        if !a.is_finite() || !b.is_finite() {
            return None;
        }
        let eps = self.config.epsilon;
        let length = a.distance_2d(&b);
        let source = CutPoint::new(a, CutPointKind::Source, 0., self.z_ground(a.x, a.y));
        let receiver = CutPoint::new(b, CutPointKind::Receiver, length, self.z_ground(b.x, b.y));
        let mut crossings = Vec::new();

        if length > eps {
            let chunks = self.chunks(a, b);

            // Façades and free-standing walls
            for wi in self.wall_index.query_many(&chunks) {
                let wall = &self.walls[wi];
                let hits: Vec<(f64, f64)> = match intersect_2d(a, b, wall.p0, wall.p1) {
                    SegmentIntersection::Point { t, u } => vec![(t, u)],
                    SegmentIntersection::Collinear { t0, t1 } => [t0, t1]
                        .iter()
                        .map(|&t| {
                            let u = project_param(point_along(a, b, t), wall.p0, wall.p1);
                            (t, u.clamp(0., 1.))
                        })
                        .collect(),
                    SegmentIntersection::None => continue,
                };
                for (t, u) in hits {
                    let pos = point_along(a, b, t);
                    let (z, kind) = match wall.owner {
                        WallOwner::Building(bi) => (
                            self.buildings[bi].roof_z,
                            CutPointKind::BuildingCorner { building: wall.id },
                        ),
                        WallOwner::Barrier => (wall.top_at(u), CutPointKind::Wall { wall: wall.id }),
                    };
                    crossings.push(CutPoint::new(
                        pos.with_z(z),
                        kind,
                        t * length,
                        wall.bottom_at(u),
                    ));
                }
            }

            // Ground zone boundaries
            for (zi, ei) in self.ground.edge_index.query_many(&chunks) {
                let zone = &self.ground.zones[zi];
                let (p, q) = zone.polygon.edge(ei);
                if let SegmentIntersection::Point { t, .. } = intersect_2d(a, b, p, q) {
                    let pos = point_along(a, b, t);
                    let zg = self.z_ground(pos.x, pos.y);
                    crossings.push(CutPoint::new(
                        pos.with_z(zg),
                        CutPointKind::GroundEffectChange { zone: zone.id },
                        t * length,
                        zg,
                    ));
                }
            }

            // Terrain
            if let Some(terrain) = &self.terrain {
                let mut samples = vec![GroundSample {
                    distance: 0.,
                    point: a.with_z(source.z_ground),
                }];
                samples.extend(terrain.crossings(a, b, &chunks, eps));
                samples.push(GroundSample {
                    distance: length,
                    point: b.with_z(receiver.z_ground),
                });
                let kept = drop_redundant(samples, TOPOGRAPHY_DELTA);
                let inner = kept.len().saturating_sub(2);
                for s in kept.iter().skip(1).take(inner) {
                    crossings.push(CutPoint::new(
                        s.point,
                        CutPointKind::Topography,
                        s.distance,
                        s.point.z,
                    ));
                }
            }
        }

        Some(CutProfile::assemble(source, receiver, crossings, eps, |p| {
            self.ground_coefficient_at(p)
        }))
    }

    /// Visibility test between two points.
    ///
    /// True if a building, a wall or the terrain blocks the straight segment.
    /// Touching an obstacle at one of the end points does not count.
    pub fn has_obstruction(&self, a: Point, b: Point) -> bool {
        let length = a.distance_2d(&b);
        if length < self.config.epsilon {
            return false;
        }
        let chunks = self.chunks(a, b);
        self.terrain_blocks(a, b, &chunks)
            || self
                .wall_index
                .query_many(&chunks)
                .into_iter()
                .any(|wi| !self.walls[wi].is_facade() && self.barrier_blocks(wi, a, b))
            || self
                .building_index
                .query_many(&chunks)
                .into_iter()
                .any(|bi| self.building_blocks(bi, a, b))
    }

    /// Buildings and walls blocking the segment a->b (terrain excluded).
    pub fn blocking_obstacles(&self, a: Point, b: Point) -> Vec<Obstacle> {
        if a.distance_2d(&b) < self.config.epsilon {
            return Vec::new();
        }
        let chunks = self.chunks(a, b);
        let mut found: Vec<Obstacle> = self
            .building_index
            .query_many(&chunks)
            .into_iter()
            .filter(|&bi| self.building_blocks(bi, a, b))
            .map(Obstacle::Building)
            .collect();
        found.extend(
            self.wall_index
                .query_many(&chunks)
                .into_iter()
                .filter(|&wi| !self.walls[wi].is_facade() && self.barrier_blocks(wi, a, b))
                .map(Obstacle::Barrier),
        );
        found
    }

    /// True if the terrain rises above the segment a->b.
    pub fn terrain_blocks(&self, a: Point, b: Point, chunks: &[Envelope]) -> bool {
        let Some(terrain) = &self.terrain else {
            return false;
        };
        let eps = self.config.epsilon;
        let length = a.distance_2d(&b);
        let tol = (eps / length).max(1e-9);
        terrain.crossings(a, b, chunks, eps).iter().any(|s| {
            let t = s.distance / length;
            t > tol && t < 1. - tol && a.z + (b.z - a.z) * t < s.point.z - eps
        })
    }

    fn barrier_blocks(&self, wi: usize, a: Point, b: Point) -> bool {
        let eps = self.config.epsilon;
        let wall = &self.walls[wi];
        let tol = (eps / a.distance_2d(&b)).max(1e-9);
        match intersect_2d(a, b, wall.p0, wall.p1) {
            SegmentIntersection::Point { t, u } if t > tol && t < 1. - tol => {
                a.z + (b.z - a.z) * t < wall.top_at(u) - eps
            }
            // Grazing along a zero-thickness wall doesn't block
            _ => false,
        }
    }

    fn building_blocks(&self, bi: usize, a: Point, b: Point) -> bool {
        let eps = self.config.epsilon;
        let building = &self.buildings[bi];
        let tol = (eps / a.distance_2d(&b)).max(1e-9);
        let mut ts = vec![0., 1.];
        for (p, q) in building.footprint.edges() {
            match intersect_2d(a, b, p, q) {
                SegmentIntersection::Point { t, .. } => ts.push(t),
                SegmentIntersection::Collinear { t0, t1 } => {
                    ts.push(t0);
                    ts.push(t1);
                }
                SegmentIntersection::None => {}
            }
        }
        ts.sort_by(|x, y| x.total_cmp(y));
        ts.windows(2).any(|w| {
            if w[1] - w[0] <= tol {
                return false;
            }
            let mid = point_along(a, b, 0.5 * (w[0] + w[1]));
            if !building.footprint.contains(mid, false, eps) {
                return false;
            }
            // The line is straight, its lowest point inside is at one of the ends
            let z_low = (a.z + (b.z - a.z) * w[0]).min(a.z + (b.z - a.z) * w[1]);
            z_low < building.roof_z - eps
        })
    }
}

/// Scene under construction.
///
/// Feeding operations are valid until [`finish`](Self::finish); queries are
/// valid only after it.
#[derive(Debug)]
pub struct ProfileBuilder {
    config: PathConfig,
    state: SceneState,
    buildings: Vec<Building>,
    walls: Vec<WallFeed>,
    zones: Vec<GroundZone>,
    topography: Vec<Point>,
    topography_lines: Vec<(Point, Point)>,
    ids: HashSet<(FeatureClass, FeatureId)>,
    skipped: Vec<GeometryError>,
    scene: Option<Scene>,
}

impl ProfileBuilder {
    pub fn new(config: PathConfig) -> Self {
        Self {
            config,
            state: SceneState::Empty,
            buildings: Vec::new(),
            walls: Vec::new(),
            zones: Vec::new(),
            topography: Vec::new(),
            topography_lines: Vec::new(),
            ids: HashSet::new(),
            skipped: Vec::new(),
            scene: None,
        }
    }

    pub fn config(&self) -> &PathConfig {
        &self.config
    }

    pub fn state(&self) -> SceneState {
        self.state
    }

    pub fn is_frozen(&self) -> bool {
        self.state == SceneState::Frozen
    }

    /// Features skipped in lenient mode.
    pub fn skipped(&self) -> &[GeometryError] {
        &self.skipped
    }

    fn start_feeding(&mut self, op: &str) -> Result<()> {
        if self.state == SceneState::Frozen {
            return Err(PathError::InvalidState(format!(
                "{}() called on a frozen scene",
                op
            )));
        }
        self.state = SceneState::Feeding;
        Ok(())
    }

    /// Skips the feature in lenient mode, fails otherwise.
    fn reject(&mut self, err: GeometryError) -> Result<()> {
        if self.config.lenient {
            warn!("Skipping feature: {}", err);
            self.skipped.push(err);
            Ok(())
        } else {
            Err(err.into())
        }
    }

    fn check_alphas(id: FeatureId, alphas: &[f64]) -> Option<GeometryError> {
        alphas
            .iter()
            .find(|a| !(0.0..=1.0).contains(*a))
            .map(|&value| GeometryError::InvalidCoefficient {
                feature_id: id,
                value,
            })
    }

    /// Adds a building from its footprint outline.
    ///
    /// `height` is relative to the ground, `alphas` are absorption
    /// coefficients per frequency band. With `z_buildings` set in the
    /// configuration, a footprint carrying non-zero elevations gives the
    /// absolute roof altitude and `height` is recomputed on `finish()`.
    pub fn add_building(
        &mut self,
        id: FeatureId,
        footprint: Vec<Point>,
        height: f64,
        alphas: Vec<f64>,
    ) -> Result<()> {
        self.start_feeding("add_building")?;
        let eps = self.config.epsilon;
        let polygon = Polygon::new(footprint, eps);
        if let Some(defect) = polygon.defect(eps) {
            return self.reject(footprint_error(id, defect));
        }
        if !height.is_finite() {
            return self.reject(GeometryError::NonFinite { feature_id: id });
        }
        if height <= 0. {
            return self.reject(GeometryError::NonPositiveHeight {
                feature_id: id,
                height,
            });
        }
        if let Some(err) = Self::check_alphas(id, &alphas) {
            return self.reject(err);
        }
        if !self.ids.insert((FeatureClass::Building, id)) {
            return self.reject(GeometryError::DuplicateId { feature_id: id });
        }
        self.buildings.push(Building {
            id,
            footprint: polygon,
            height,
            alphas,
            roof_z: height,
        });
        Ok(())
    }

    /// Adds a free-standing wall (noise barrier) from a polyline.
    ///
    /// Each pair of consecutive vertices becomes one reflecting segment.
    pub fn add_wall(
        &mut self,
        id: FeatureId,
        polyline: Vec<Point>,
        height: f64,
        alphas: Vec<f64>,
    ) -> Result<()> {
        self.start_feeding("add_wall")?;
        let eps = self.config.epsilon;
        if polyline.iter().any(|p| !p.is_finite()) || !height.is_finite() {
            return self.reject(GeometryError::NonFinite { feature_id: id });
        }
        let mut pts: Vec<Point> = Vec::with_capacity(polyline.len());
        for p in polyline {
            if pts.last().is_some_and(|last| last.is_close_2d(&p, eps)) {
                continue;
            }
            pts.push(p);
        }
        if pts.len() < 2 {
            return self.reject(GeometryError::ZeroLengthWall { feature_id: id });
        }
        if height <= 0. {
            return self.reject(GeometryError::NonPositiveHeight {
                feature_id: id,
                height,
            });
        }
        if let Some(err) = Self::check_alphas(id, &alphas) {
            return self.reject(err);
        }
        if !self.ids.insert((FeatureClass::Wall, id)) {
            return self.reject(GeometryError::DuplicateId { feature_id: id });
        }
        self.walls.push(WallFeed {
            id,
            pts,
            height,
            alphas,
        });
        Ok(())
    }

    /// Adds a ground zone with coefficient `g` in [0, 1].
    ///
    /// Where zones overlap, the last one added wins.
    pub fn add_ground_zone(&mut self, id: FeatureId, outline: Vec<Point>, g: f64) -> Result<()> {
        self.start_feeding("add_ground_zone")?;
        let eps = self.config.epsilon;
        let polygon = Polygon::new(outline, eps);
        if let Some(defect) = polygon.defect(eps) {
            return self.reject(footprint_error(id, defect));
        }
        if !(0.0..=1.0).contains(&g) {
            return self.reject(GeometryError::InvalidCoefficient {
                feature_id: id,
                value: g,
            });
        }
        if !self.ids.insert((FeatureClass::Zone, id)) {
            return self.reject(GeometryError::DuplicateId { feature_id: id });
        }
        self.zones.push(GroundZone {
            id,
            polygon,
            coefficient: g,
            implicit: false,
        });
        Ok(())
    }

    /// Adds a rectangular ground zone.
    pub fn add_ground_zone_rect(
        &mut self,
        id: FeatureId,
        min_x: f64,
        max_x: f64,
        min_y: f64,
        max_y: f64,
        g: f64,
    ) -> Result<()> {
        let env = Envelope::new(min_x, min_y, max_x, max_y);
        self.add_ground_zone(id, env.corners(0.).to_vec(), g)
    }

    pub fn add_topography_point(&mut self, pt: Point) -> Result<()> {
        self.start_feeding("add_topography_point")?;
        self.topography.push(pt);
        Ok(())
    }

    /// Adds a topographic line (e.g. a contour segment or a road edge).
    ///
    /// Both end points are topography points and the segment is kept as an
    /// edge of the terrain mesh.
    pub fn add_topography_line(&mut self, p0: Point, p1: Point) -> Result<()> {
        self.start_feeding("add_topography_line")?;
        self.topography_lines.push((p0, p1));
        Ok(())
    }

    /// Freezes the scene: builds the spatial indexes and the terrain.
    pub fn finish(&mut self) -> Result<()> {
        if self.state == SceneState::Frozen {
            return Err(PathError::InvalidState(
                "finish() called on a frozen scene".to_string(),
            ));
        }
        self.config.validate()?;
        let scene = self.freeze()?;
        info!(
            "Scene frozen: {} buildings, {} wall segments, {} ground zones, {} terrain triangles, {} skipped features",
            scene.buildings.len(),
            scene.walls.len(),
            scene.ground.zones.iter().filter(|z| !z.implicit).count(),
            scene.terrain.as_ref().map(|t| t.triangle_count()).unwrap_or(0),
            self.skipped.len()
        );
        self.scene = Some(scene);
        self.state = SceneState::Frozen;
        Ok(())
    }

    fn freeze(&mut self) -> Result<Scene> {
        let eps = self.config.epsilon;
        let mut buildings = std::mem::take(&mut self.buildings);
        let wall_feeds = std::mem::take(&mut self.walls);
        let mut zones = std::mem::take(&mut self.zones);
        let mut topography = std::mem::take(&mut self.topography);
        let lines = std::mem::take(&mut self.topography_lines);

        // Scene extent
        let mut extent: Option<Envelope> = None;
        let mut grow = |env: Envelope| {
            extent = Some(match extent {
                Some(e) => e.merge(&env),
                None => env,
            });
        };
        buildings.iter().for_each(|b| grow(b.footprint.envelope()));
        zones.iter().for_each(|z| grow(z.polygon.envelope()));
        wall_feeds
            .iter()
            .filter_map(|w| Envelope::from_points(&w.pts))
            .for_each(&mut grow);
        topography
            .iter()
            .chain(lines.iter().flat_map(|(a, b)| [a, b]))
            .filter(|p| p.is_finite())
            .for_each(|p| grow(Envelope::new(p.x, p.y, p.x, p.y)));
        let envelope = extent
            .unwrap_or(Envelope::new(0., 0., 0., 0.))
            .expanded_by(SCENE_MARGIN);

        // Hard ground under buildings, below every explicit zone
        let mut constraints: Vec<Constraint> = lines
            .iter()
            .map(|&(a, b)| Constraint { a, b, has_z: true })
            .collect();
        for z in &zones {
            constraints.extend(z.polygon.edges().map(|(a, b)| Constraint {
                a,
                b,
                has_z: false,
            }));
        }
        for b in &buildings {
            constraints.extend(b.footprint.edges().map(|(p, q)| Constraint {
                a: p,
                b: q,
                has_z: false,
            }));
            zones.push(GroundZone {
                id: b.id,
                polygon: b.footprint.clone(),
                coefficient: 0.,
                implicit: true,
            });
        }
        let ground = GroundMap::new(zones, self.config.default_ground_coefficient, eps);

        // Terrain
        topography.extend(lines.iter().flat_map(|&(a, b)| [a, b]));
        let terrain = if topography.len() >= 3 {
            match TerrainMesh::build(
                &topography,
                &constraints,
                &envelope,
                eps,
                self.config.max_triangle_area,
                |c| ground.coefficient_at(c),
            ) {
                Ok(mesh) => {
                    if mesh.skipped_points() > 0 {
                        warn!(
                            "Terrain: skipped {} duplicate or degenerate points",
                            mesh.skipped_points()
                        );
                    }
                    Some(mesh)
                }
                Err(err) if self.config.lenient => {
                    warn!("Ignoring terrain: {}", err);
                    self.skipped.push(err);
                    None
                }
                Err(err) => return Err(err.into()),
            }
        } else {
            if !topography.is_empty() {
                warn!(
                    "Ignoring {} topography points, at least 3 are needed",
                    topography.len()
                );
            }
            None
        };
        let z_ground = |p: &Point| {
            terrain
                .as_ref()
                .and_then(|t| t.elevation(p.x, p.y))
                .unwrap_or(0.)
        };

        // Put features on the ground
        for b in buildings.iter_mut() {
            let altitude = if self.config.z_buildings {
                roof_altitude(&b.footprint)
            } else {
                None
            };
            b.footprint = b.footprint.map_z(z_ground);
            let n = b.footprint.len().max(1) as f64;
            let mean_ground = b.footprint.vertices().iter().map(|p| p.z).sum::<f64>() / n;
            b.roof_z = match altitude {
                Some(z) if z > mean_ground + eps => {
                    b.height = z - mean_ground;
                    z
                }
                Some(z) => {
                    warn!(
                        "Building {}: roof altitude {:.2} is below the ground, using its height",
                        b.id, z
                    );
                    b.height + mean_ground
                }
                None => b.height + mean_ground,
            };
        }

        let mut walls = Vec::new();
        for (bi, b) in buildings.iter().enumerate() {
            for (p0, p1) in b.footprint.edges() {
                walls.push(Wall {
                    id: b.id,
                    p0,
                    p1,
                    top0: b.roof_z,
                    top1: b.roof_z,
                    alphas: b.alphas.clone(),
                    owner: WallOwner::Building(bi),
                });
            }
        }
        for feed in &wall_feeds {
            for w in feed.pts.windows(2) {
                let p0 = w[0].with_z(z_ground(&w[0]));
                let p1 = w[1].with_z(z_ground(&w[1]));
                walls.push(Wall {
                    id: feed.id,
                    p0,
                    p1,
                    top0: p0.z + feed.height,
                    top1: p1.z + feed.height,
                    alphas: feed.alphas.clone(),
                    owner: WallOwner::Barrier,
                });
            }
        }

        let mut building_index = IndexBuilder::new();
        for (bi, b) in buildings.iter().enumerate() {
            building_index.insert(&b.footprint.envelope(), bi);
        }
        let mut wall_index = IndexBuilder::new();
        for (wi, w) in walls.iter().enumerate() {
            wall_index.insert(&w.envelope(), wi);
        }

        let wide_angle = buildings
            .iter()
            .map(|b| wide_angle_corners(b, self.config.wide_angle_offset, eps))
            .collect();
        debug!(
            "Scene extent: ({:.1}, {:.1}) - ({:.1}, {:.1})",
            envelope.min_x, envelope.min_y, envelope.max_x, envelope.max_y
        );

        Ok(Scene {
            config: self.config.clone(),
            buildings,
            walls,
            ground,
            building_index: building_index.build(),
            wall_index: wall_index.build(),
            terrain,
            wide_angle,
            envelope,
        })
    }

    /// The frozen scene.
    pub fn scene(&self) -> Result<&Scene> {
        self.scene.as_ref().ok_or_else(|| {
            PathError::InvalidState("scene is not frozen, call finish() first".to_string())
        })
    }

    /// Vertical profile along source->receiver.
    pub fn get_profile(&self, source: Point, receiver: Point) -> Result<CutProfile> {
        self.scene()?
            .profile(source, receiver)
            .ok_or_else(|| PathError::PairComputation {
                source_id: 0,
                receiver_id: 0,
                reason: "non-finite end point".to_string(),
            })
    }

    pub fn has_obstruction(&self, p1: Point, p2: Point) -> Result<bool> {
        Ok(self.scene()?.has_obstruction(p1, p2))
    }

    pub fn z_ground(&self, x: f64, y: f64) -> Result<f64> {
        Ok(self.scene()?.z_ground(x, y))
    }

    pub fn z_at(&self, x: f64, y: f64) -> Result<f64> {
        Ok(self.scene()?.z_at(x, y))
    }

    pub fn walls_in(&self, envelope: &Envelope) -> Result<Vec<&Wall>> {
        Ok(self.scene()?.walls_in(envelope))
    }

    pub fn buildings_on_path(&self, p1: Point, p2: Point) -> Result<Vec<FeatureId>> {
        Ok(self.scene()?.buildings_on_path(p1, p2))
    }

    /// Diffraction points around the building with id `building_id`.
    pub fn wide_angle_points(&self, building_id: FeatureId) -> Result<Vec<Point>> {
        let scene = self.scene()?;
        Ok(scene
            .buildings
            .iter()
            .position(|b| b.id == building_id)
            .map(|bi| scene.wide_angle_points(bi).to_vec())
            .unwrap_or_default())
    }
}

fn footprint_error(id: FeatureId, defect: PolygonDefect) -> GeometryError {
    match defect {
        PolygonDefect::SelfIntersecting => GeometryError::SelfIntersecting { feature_id: id },
        PolygonDefect::NonFinite => GeometryError::NonFinite { feature_id: id },
        PolygonDefect::TooFewVertices | PolygonDefect::ZeroArea => {
            GeometryError::DegenerateFootprint {
                feature_id: id,
                reason: defect.to_string(),
            }
        }
    }
}

/// Mean footprint elevation, when the footprint carries one.
///
/// A zero elevation on the first vertex means the footprint has none.
fn roof_altitude(footprint: &Polygon) -> Option<f64> {
    let first = footprint.vertices().first()?;
    if !first.z.is_finite() || first.z == 0. {
        return None;
    }
    let n = footprint.len() as f64;
    Some(footprint.vertices().iter().map(|p| p.z).sum::<f64>() / n)
}

/// Convex corners pushed outwards along their bisector and lifted above the roof.
fn wide_angle_corners(building: &Building, offset: f64, eps: f64) -> Vec<Point> {
    let pts = building.footprint.vertices();
    let n = pts.len();
    building
        .footprint
        .convex_corners(eps)
        .into_iter()
        .filter_map(|i| {
            let prev = pts[(i + n - 1) % n];
            let cur = pts[i];
            let next = pts[(i + 1) % n];
            // Outward normals of a counter-clockwise ring point to the right
            let e1 = Vector::new(cur.x - prev.x, cur.y - prev.y, 0.).normalize()?;
            let e2 = Vector::new(next.x - cur.x, next.y - cur.y, 0.).normalize()?;
            let bisector = (-e1.perp_2d() - e2.perp_2d()).normalize()?;
            Some((cur + bisector * offset).with_z(building.roof_z + offset))
        })
        .collect()
}
