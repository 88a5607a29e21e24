//! Mirror receivers (image method).
//!
//! The images of a receiver form a forest stored in an arena: every
//! [`MirrorReceiver`] refers to its parent by index. A set is computed once
//! per receiver and shared by all sources through [`MirrorCache`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::FeatureId;
use crate::geom::point::Point;
use crate::geom::segment::{mirror_across_line, point_along, project_param};
use crate::scene::Scene;

/// Virtual receiver: the image of a receiver (or of another image) across a wall.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MirrorReceiver {
    /// Index in the owning [`MirrorSet`].
    pub id: usize,
    pub position: Point,
    /// Index of the reflecting wall in the scene.
    pub wall: usize,
    pub wall_id: FeatureId,
    /// Foot of the perpendicular dropped from the mirrored point on the wall.
    pub foot: Point,
    pub order: usize,
    pub parent: Option<usize>,
}

/// All valid images of one receiver, parents before children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorSet {
    receiver: Point,
    mirrors: Vec<MirrorReceiver>,
}

impl MirrorSet {
    /// Generates the images of `receiver` up to `max_order`.
    ///
    /// Walls are searched within `radius` of the point being mirrored. An
    /// image is kept only if the foot of the perpendicular lies on the wall
    /// and the segment from the foot back to the mirrored point (the receiver,
    /// or the parent's foot) is free. Rejected images are never extended.
    pub fn generate(scene: &Scene, receiver: Point, max_order: usize, radius: f64) -> Self {
        let eps = scene.config().epsilon;
        let walls = scene.walls();
        let mut mirrors: Vec<MirrorReceiver> = Vec::new();
        let mut frontier: Vec<Option<usize>> = vec![None];

        for order in 1..=max_order {
            let mut next = Vec::new();
            for parent in frontier {
                let (origin, anchor, parent_wall) = match parent {
                    None => (receiver, receiver, None),
                    Some(pi) => {
                        let p = &mirrors[pi];
                        (p.position, p.foot, Some(p.wall))
                    }
                };
                for wi in scene.walls_near(origin, radius) {
                    if Some(wi) == parent_wall {
                        continue;
                    }
                    let wall = &walls[wi];
                    if !wall.faces(origin, eps) {
                        continue;
                    }
                    let u = project_param(origin, wall.p0, wall.p1);
                    let tol = eps / wall.length().max(eps);
                    if !(-tol..=1. + tol).contains(&u) {
                        continue;
                    }
                    let foot = point_along(wall.p0, wall.p1, u.clamp(0., 1.)).with_z(receiver.z);
                    if scene.has_obstruction(foot, anchor.with_z(receiver.z)) {
                        continue;
                    }
                    let id = mirrors.len();
                    mirrors.push(MirrorReceiver {
                        id,
                        position: mirror_across_line(origin, wall.p0, wall.p1),
                        wall: wi,
                        wall_id: wall.id,
                        foot,
                        order,
                        parent,
                    });
                    next.push(Some(id));
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        debug!(
            "Mirror receivers of ({}, {}, {}): {}",
            receiver.x,
            receiver.y,
            receiver.z,
            mirrors.len()
        );
        Self { receiver, mirrors }
    }

    pub fn receiver(&self) -> Point {
        self.receiver
    }

    pub fn mirrors(&self) -> &[MirrorReceiver] {
        &self.mirrors
    }

    pub fn len(&self) -> usize {
        self.mirrors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mirrors.is_empty()
    }

    pub fn get(&self, id: usize) -> Option<&MirrorReceiver> {
        self.mirrors.get(id)
    }

    /// Images from `id` back to its order-1 ancestor.
    pub fn chain(&self, id: usize) -> Vec<&MirrorReceiver> {
        let mut chain = Vec::new();
        let mut current = self.mirrors.get(id);
        while let Some(m) = current {
            chain.push(m);
            current = m.parent.and_then(|p| self.mirrors.get(p));
        }
        chain
    }
}

/// Mirror sets keyed by receiver id, computed at most once per key.
///
/// The first caller for a key computes the set; concurrent callers for the
/// same key block until it is ready and share it.
#[derive(Debug, Default)]
pub struct MirrorCache {
    entries: Mutex<HashMap<u64, Arc<OnceLock<Arc<MirrorSet>>>>>,
}

impl MirrorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute<F>(&self, key: u64, compute: F) -> Arc<MirrorSet>
    where
        F: FnOnce() -> MirrorSet,
    {
        let cell = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(entries.entry(key).or_default())
        };
        Arc::clone(cell.get_or_init(|| Arc::new(compute())))
    }

    /// Number of receivers with a computed set.
    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.values().filter(|c| c.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of mirror receivers held.
    pub fn mirror_count(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.values().filter_map(|c| c.get()).map(|s| s.len()).sum()
    }
}
