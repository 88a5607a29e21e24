//! Scene features: buildings, walls and ground zones.

use serde::{Deserialize, Serialize};

use crate::error::FeatureId;
use crate::geom::bboxes::Envelope;
use crate::geom::point::Point;
use crate::geom::polygon::Polygon;
use crate::geom::segment::orientation;

/// Extruded footprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Building {
    pub id: FeatureId,
    pub footprint: Polygon,
    /// Height above ground.
    pub height: f64,
    /// Absorption coefficient per frequency band, each in [0, 1].
    pub alphas: Vec<f64>,
    /// Absolute roof elevation (height + mean ground elevation under the footprint).
    pub roof_z: f64,
}

/// What a reflecting wall segment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WallOwner {
    /// Façade of the building at this index (one-sided, facing outwards).
    Building(usize),
    /// Free-standing screen (two-sided).
    Barrier,
}

/// Vertical reflecting segment. `p0`/`p1` lie on the ground.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wall {
    pub id: FeatureId,
    pub p0: Point,
    pub p1: Point,
    /// Absolute elevation of the top edge at `p0` and `p1`.
    pub top0: f64,
    pub top1: f64,
    pub alphas: Vec<f64>,
    pub owner: WallOwner,
}

impl Wall {
    pub fn length(&self) -> f64 {
        self.p0.distance_2d(&self.p1)
    }

    pub fn envelope(&self) -> Envelope {
        Envelope::from_segment(self.p0, self.p1)
    }

    /// Top elevation at relative position `u` along the wall.
    pub fn top_at(&self, u: f64) -> f64 {
        self.top0 + (self.top1 - self.top0) * u
    }

    /// Ground elevation at relative position `u` along the wall.
    pub fn bottom_at(&self, u: f64) -> f64 {
        self.p0.z + (self.p1.z - self.p0.z) * u
    }

    pub fn is_facade(&self) -> bool {
        matches!(self.owner, WallOwner::Building(_))
    }

    /// Returns true if `pt` sees the reflecting side of the wall.
    ///
    /// Façades only reflect towards the outside of their (counter-clockwise)
    /// footprint, i.e. to the right of p0->p1. Barriers reflect on both sides.
    pub fn faces(&self, pt: Point, eps: f64) -> bool {
        let side = orientation(self.p0, self.p1, pt) / self.length().max(eps);
        match self.owner {
            WallOwner::Building(_) => side < -eps,
            WallOwner::Barrier => side.abs() > eps,
        }
    }

    /// Mean absorption over the bands.
    pub fn mean_alpha(&self) -> f64 {
        if self.alphas.is_empty() {
            0.
        } else {
            self.alphas.iter().sum::<f64>() / self.alphas.len() as f64
        }
    }
}

/// Polygon with a ground-effect coefficient G.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundZone {
    pub id: FeatureId,
    pub polygon: Polygon,
    pub coefficient: f64,
    /// Hard ground implied by a building footprint.
    pub implicit: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wall(owner: WallOwner) -> Wall {
        Wall {
            id: 1,
            p0: Point::new(0., 0., 0.),
            p1: Point::new(10., 0., 2.),
            top0: 5.,
            top1: 9.,
            alphas: vec![0.1, 0.3],
            owner,
        }
    }

    #[test]
    fn test_top_and_bottom() {
        let w = wall(WallOwner::Barrier);
        assert!((w.top_at(0.5) - 7.).abs() < 1e-12);
        assert!((w.bottom_at(0.5) - 1.).abs() < 1e-12);
        assert!((w.mean_alpha() - 0.2).abs() < 1e-12);
        assert!((w.length() - 10.).abs() < 1e-12);
    }

    #[test]
    fn test_faces() {
        let facade = wall(WallOwner::Building(0));
        assert!(facade.faces(Point::new(5., -3., 0.), 1e-7));
        assert!(!facade.faces(Point::new(5., 3., 0.), 1e-7));
        let barrier = wall(WallOwner::Barrier);
        assert!(barrier.faces(Point::new(5., 3., 0.), 1e-7));
        assert!(barrier.faces(Point::new(5., -3., 0.), 1e-7));
        assert!(!barrier.faces(Point::new(20., 0., 0.), 1e-7));
    }
}
