//! Vertical profile along a source-receiver line.

use serde::{Deserialize, Serialize};

use crate::error::FeatureId;
use crate::geom::point::Point;

/// What produced a cut point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CutPointKind {
    Source,
    Receiver,
    /// Crossing of a building façade. The point is at roof elevation.
    BuildingCorner { building: FeatureId },
    /// Crossing of a free-standing wall. The point is at the top of the wall.
    Wall { wall: FeatureId },
    /// Crossing of a terrain triangle edge.
    Topography,
    /// Crossing of a ground zone boundary.
    GroundEffectChange { zone: FeatureId },
}

impl CutPointKind {
    /// Rank used to resolve coinciding crossings (higher wins).
    pub fn priority(&self) -> u8 {
        match self {
            Self::Source | Self::Receiver => 5,
            Self::BuildingCorner { .. } => 4,
            Self::Wall { .. } => 3,
            Self::GroundEffectChange { .. } => 2,
            Self::Topography => 1,
        }
    }

    pub fn feature_id(&self) -> Option<FeatureId> {
        match self {
            Self::BuildingCorner { building } => Some(*building),
            Self::Wall { wall } => Some(*wall),
            Self::GroundEffectChange { zone } => Some(*zone),
            Self::Source | Self::Receiver | Self::Topography => None,
        }
    }

    pub fn is_obstacle(&self) -> bool {
        matches!(self, Self::BuildingCorner { .. } | Self::Wall { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CutPoint {
    pub position: Point,
    pub kind: CutPointKind,
    /// Horizontal distance from the source.
    pub distance: f64,
    /// Ground elevation below the point.
    pub z_ground: f64,
    /// G of the ground between this point and the next one.
    pub ground_coefficient: f64,
}

impl CutPoint {
    pub fn new(position: Point, kind: CutPointKind, distance: f64, z_ground: f64) -> Self {
        Self {
            position,
            kind,
            distance,
            z_ground,
            ground_coefficient: 0.,
        }
    }

    pub fn feature_id(&self) -> Option<FeatureId> {
        self.kind.feature_id()
    }
}

/// Stretch of homogeneous ground along a profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundSegment {
    pub start: f64,
    pub end: f64,
    pub coefficient: f64,
}

/// Ordered cut points from source to receiver.
///
/// The first point is the source, the last one the receiver, and distances
/// are strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutProfile {
    points: Vec<CutPoint>,
}

impl CutProfile {
    /// Orders the crossings between `source` and `receiver` and merges
    /// coinciding ones.
    ///
    /// Crossings closer than `eps` (in distance) collapse to the one with the
    /// highest priority. `ground_at` gives G at a location and is used for
    /// the ground between consecutive points.
    pub fn assemble<F>(
        source: CutPoint,
        receiver: CutPoint,
        mut crossings: Vec<CutPoint>,
        eps: f64,
        ground_at: F,
    ) -> Self
    where
        F: Fn(Point) -> f64,
    {
        let total = receiver.distance;
        crossings.retain(|c| c.distance > -eps && c.distance < total + eps);
        crossings.push(source);
        crossings.push(receiver);
        crossings.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(b.kind.priority().cmp(&a.kind.priority()))
        });

        let mut points: Vec<CutPoint> = Vec::with_capacity(crossings.len());
        for c in crossings {
            if let Some(last) = points.last_mut()
                && (c.distance - last.distance).abs() < eps
            {
                if c.kind.priority() > last.kind.priority() {
                    *last = c;
                }
                continue;
            }
            points.push(c);
        }
        // Endpoints always survive
        if let Some(first) = points.first_mut() {
            *first = source;
        }
        if points.len() < 2 {
            points.push(receiver);
        } else if let Some(last) = points.last_mut() {
            *last = receiver;
        }

        let n = points.len();
        for i in 0..n {
            let g = if i + 1 < n {
                ground_at(Point::new_between_2_points(
                    points[i].position,
                    points[i + 1].position,
                    0.5,
                ))
            } else {
                ground_at(points[i].position)
            };
            points[i].ground_coefficient = g;
        }
        Self { points }
    }

    pub fn points(&self) -> &[CutPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn source(&self) -> Option<&CutPoint> {
        self.points.first()
    }

    pub fn receiver(&self) -> Option<&CutPoint> {
        self.points.last()
    }

    /// Horizontal source-receiver distance.
    pub fn length_2d(&self) -> f64 {
        self.receiver().map(|r| r.distance).unwrap_or(0.)
    }

    /// True if no building or wall is crossed.
    pub fn is_free_field(&self) -> bool {
        !self.points.iter().any(|p| p.kind.is_obstacle())
    }

    /// Ids of the buildings and walls crossed, in order.
    pub fn obstacle_ids(&self) -> Vec<FeatureId> {
        let mut ids: Vec<FeatureId> = self
            .points
            .iter()
            .filter(|p| p.kind.is_obstacle())
            .filter_map(|p| p.feature_id())
            .collect();
        ids.dedup();
        ids
    }

    /// Homogeneous ground stretches, adjacent stretches with the same G merged.
    pub fn ground_segments(&self) -> Vec<GroundSegment> {
        let mut segments: Vec<GroundSegment> = Vec::new();
        for w in self.points.windows(2) {
            let g = w[0].ground_coefficient;
            match segments.last_mut() {
                Some(last) if last.coefficient == g => last.end = w[1].distance,
                _ => segments.push(GroundSegment {
                    start: w[0].distance,
                    end: w[1].distance,
                    coefficient: g,
                }),
            }
        }
        segments
    }

    /// Length-weighted mean G.
    pub fn mean_ground_coefficient(&self) -> f64 {
        let total = self.length_2d();
        if total <= 0. {
            return self.points.first().map(|p| p.ground_coefficient).unwrap_or(0.);
        }
        self.ground_segments()
            .iter()
            .map(|s| (s.end - s.start) * s.coefficient)
            .sum::<f64>()
            / total
    }

    /// Geometric equality within `eps`.
    pub fn is_close(&self, other: &Self, eps: f64) -> bool {
        self.points.len() == other.points.len()
            && self.points.iter().zip(&other.points).all(|(a, b)| {
                a.kind == b.kind
                    && a.position.is_close_eps(&b.position, eps)
                    && (a.ground_coefficient - b.ground_coefficient).abs() < eps
            })
    }
}
