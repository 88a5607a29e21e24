//! Propagation paths.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::FeatureId;
use crate::geom::point::Point;
use crate::scene::profile::CutProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathKind {
    Direct,
    Diffracted,
    Reflected,
    ReflectedDiffracted,
}

impl PathKind {
    /// Position of the kind in the output order.
    fn rank(&self) -> u8 {
        match self {
            Self::Direct => 0,
            Self::Reflected => 1,
            Self::ReflectedDiffracted => 2,
            Self::Diffracted => 3,
        }
    }
}

/// Orientation of a diffracting edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiffractionEdge {
    /// Vertical edge (building corner, wall end): sound goes around.
    Horizontal,
    /// Horizontal edge (roof, wall top): sound goes over.
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PathPointKind {
    Source,
    Receiver,
    Reflection {
        wall: FeatureId,
        /// Index of the wall segment in the scene.
        wall_index: usize,
    },
    Diffraction {
        feature: Option<FeatureId>,
        edge: DiffractionEdge,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    pub position: Point,
    pub kind: PathPointKind,
}

impl PathPoint {
    pub fn new(position: Point, kind: PathPointKind) -> Self {
        Self { position, kind }
    }

    pub fn feature_id(&self) -> Option<FeatureId> {
        match self.kind {
            PathPointKind::Reflection { wall, .. } => Some(wall),
            PathPointKind::Diffraction { feature, .. } => feature,
            PathPointKind::Source | PathPointKind::Receiver => None,
        }
    }
}

/// Interaction points from source to receiver and the profile of each leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub kind: PathKind,
    pub points: Vec<PathPoint>,
    /// `profiles[i]` is the profile from `points[i]` to `points[i + 1]`.
    pub profiles: Vec<CutProfile>,
}

impl Path {
    /// Builds a path, classifying it from its interaction points.
    pub fn new(points: Vec<PathPoint>, profiles: Vec<CutProfile>) -> Self {
        let reflections = count_reflections(&points);
        let diffractions = count_diffractions(&points);
        let kind = match (reflections > 0, diffractions > 0) {
            (false, false) => PathKind::Direct,
            (false, true) => PathKind::Diffracted,
            (true, false) => PathKind::Reflected,
            (true, true) => PathKind::ReflectedDiffracted,
        };
        Self {
            kind,
            points,
            profiles,
        }
    }

    /// Total 3D length.
    pub fn length(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| w[0].position.distance(&w[1].position))
            .sum()
    }

    pub fn reflection_order(&self) -> usize {
        count_reflections(&self.points)
    }

    pub fn diffraction_order(&self) -> usize {
        count_diffractions(&self.points)
    }

    pub fn source(&self) -> Option<Point> {
        self.points.first().map(|p| p.position)
    }

    pub fn receiver(&self) -> Option<Point> {
        self.points.last().map(|p| p.position)
    }

    /// Ids of the walls and buildings the path interacts with, in order.
    pub fn touched_features(&self) -> Vec<FeatureId> {
        let mut ids: Vec<FeatureId> = self.points.iter().filter_map(|p| p.feature_id()).collect();
        ids.dedup();
        ids
    }

    /// True if two consecutive points coincide within `eps`.
    pub fn has_duplicate_points(&self, eps: f64) -> bool {
        self.points
            .windows(2)
            .any(|w| w[0].position.is_close_eps(&w[1].position, eps))
    }

    /// Same interaction points within `eps`.
    pub fn is_close(&self, other: &Self, eps: f64) -> bool {
        self.points.len() == other.points.len()
            && self
                .points
                .iter()
                .zip(&other.points)
                .all(|(a, b)| a.position.is_close_eps(&b.position, eps))
    }

    /// Output order: kind, then order within the kind, then length.
    pub fn output_cmp(&self, other: &Self) -> Ordering {
        self.kind
            .rank()
            .cmp(&other.kind.rank())
            .then_with(|| self.primary_order().cmp(&other.primary_order()))
            .then_with(|| self.secondary_order().cmp(&other.secondary_order()))
            .then_with(|| self.length().total_cmp(&other.length()))
    }

    fn primary_order(&self) -> usize {
        match self.kind {
            PathKind::Diffracted => self.diffraction_order(),
            _ => self.reflection_order(),
        }
    }

    fn secondary_order(&self) -> usize {
        match self.kind {
            PathKind::ReflectedDiffracted => self.diffraction_order(),
            _ => 0,
        }
    }
}

fn count_reflections(points: &[PathPoint]) -> usize {
    points
        .iter()
        .filter(|p| matches!(p.kind, PathPointKind::Reflection { .. }))
        .count()
}

fn count_diffractions(points: &[PathPoint]) -> usize {
    points
        .iter()
        .filter(|p| matches!(p.kind, PathPointKind::Diffraction { .. }))
        .count()
}

/// Sorts paths in output order and drops geometric duplicates.
pub fn finalize(mut paths: Vec<Path>, eps: f64) -> Vec<Path> {
    paths.sort_by(|a, b| a.output_cmp(b));
    let mut kept: Vec<Path> = Vec::with_capacity(paths.len());
    for p in paths {
        if !kept.iter().any(|k| k.is_close(&p, eps)) {
            kept.push(p);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pp(x: f64, y: f64, kind: PathPointKind) -> PathPoint {
        PathPoint::new(Point::new(x, y, 1.), kind)
    }

    fn direct() -> Path {
        Path::new(
            vec![
                pp(0., 0., PathPointKind::Source),
                pp(100., 0., PathPointKind::Receiver),
            ],
            vec![],
        )
    }

    fn reflected(y: f64) -> Path {
        Path::new(
            vec![
                pp(0., 0., PathPointKind::Source),
                pp(
                    50.,
                    y,
                    PathPointKind::Reflection {
                        wall: 1,
                        wall_index: 0,
                    },
                ),
                pp(100., 0., PathPointKind::Receiver),
            ],
            vec![],
        )
    }

    fn diffracted() -> Path {
        Path::new(
            vec![
                pp(0., 0., PathPointKind::Source),
                pp(
                    50.,
                    -20.,
                    PathPointKind::Diffraction {
                        feature: Some(4),
                        edge: DiffractionEdge::Horizontal,
                    },
                ),
                pp(100., 0., PathPointKind::Receiver),
            ],
            vec![],
        )
    }

    #[test]
    fn test_classification_and_orders() {
        assert_eq!(direct().kind, PathKind::Direct);
        let r = reflected(10.);
        assert_eq!(r.kind, PathKind::Reflected);
        assert_eq!(r.reflection_order(), 1);
        assert_eq!(r.diffraction_order(), 0);
        assert_eq!(r.touched_features(), vec![1]);
        assert_eq!(diffracted().kind, PathKind::Diffracted);
        assert!((direct().length() - 100.).abs() < 1e-12);
    }

    #[test]
    fn test_finalize_sorts_and_dedups() {
        let paths = vec![
            diffracted(),
            reflected(30.),
            reflected(10.),
            direct(),
            reflected(10. + 1e-12),
        ];
        let out = finalize(paths, 1e-7);
        let kinds: Vec<PathKind> = out.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                PathKind::Direct,
                PathKind::Reflected,
                PathKind::Reflected,
                PathKind::Diffracted
            ]
        );
        // Shorter reflection first
        assert!(out[1].length() < out[2].length());
    }

    #[test]
    fn test_serialize() -> anyhow::Result<()> {
        let json = serde_json::to_string(&reflected(10.))?;
        let back: Path = serde_json::from_str(&json)?;
        assert_eq!(back.kind, PathKind::Reflected);
        Ok(())
    }
}
