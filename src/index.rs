//! Broad-phase spatial index over feature envelopes.
//!
//! Items are collected with [`IndexBuilder`] while the scene is being fed and
//! bulk-loaded into an R-tree on freeze. The resulting [`SpatialIndex`] is
//! read-only and can be queried from any number of threads. Queries return
//! candidates only; callers re-test the exact geometry.

use crate::geom::bboxes::Envelope;
use rstar::{AABB, RTree, RTreeObject};

#[derive(Debug, Clone)]
struct IndexEntry<T> {
    env: AABB<[f64; 2]>,
    item: T,
}

impl<T> RTreeObject for IndexEntry<T> {
    type Envelope = AABB<[f64; 2]>;
    #[inline]
    fn envelope(&self) -> Self::Envelope {
        self.env
    }
}

#[inline]
fn make_env(env: &Envelope) -> AABB<[f64; 2]> {
    AABB::from_corners([env.min_x, env.min_y], [env.max_x, env.max_y])
}

/// Write side of the index, only alive during scene feeding.
#[derive(Debug, Clone)]
pub struct IndexBuilder<T> {
    entries: Vec<IndexEntry<T>>,
}

impl<T> Default for IndexBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> IndexBuilder<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn insert(&mut self, envelope: &Envelope, item: T) {
        self.entries.push(IndexEntry {
            env: make_env(envelope),
            item,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Freezes the index. No insertion is possible afterwards.
    pub fn build(self) -> SpatialIndex<T> {
        SpatialIndex {
            tree: RTree::bulk_load(self.entries),
        }
    }
}

/// Read-only R-tree.
#[derive(Debug)]
pub struct SpatialIndex<T> {
    tree: RTree<IndexEntry<T>>,
}

impl<T> SpatialIndex<T> {
    /// Items whose envelope intersects `envelope` (touching included).
    ///
    /// Order of the returned items is not significant.
    pub fn query<'a>(&'a self, envelope: &Envelope) -> impl Iterator<Item = &'a T> + use<'a, T> {
        self.tree
            .locate_in_envelope_intersecting(&make_env(envelope))
            .map(|e| &e.item)
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

impl<T: Copy + Ord> SpatialIndex<T> {
    /// Same as `query()` but sorted and deduplicated.
    pub fn query_sorted(&self, envelope: &Envelope) -> Vec<T> {
        let mut items: Vec<T> = self.query(envelope).copied().collect();
        items.sort_unstable();
        items.dedup();
        items
    }

    /// Union of the candidates of several envelopes, sorted and deduplicated.
    pub fn query_many(&self, envelopes: &[Envelope]) -> Vec<T> {
        let mut items: Vec<T> = envelopes
            .iter()
            .flat_map(|env| self.query(env).copied())
            .collect();
        items.sort_unstable();
        items.dedup();
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> SpatialIndex<usize> {
        let mut builder = IndexBuilder::new();
        builder.insert(&Envelope::new(0., 0., 10., 10.), 0);
        builder.insert(&Envelope::new(20., 0., 30., 10.), 1);
        builder.insert(&Envelope::new(5., 5., 25., 6.), 2);
        // Degenerate (vertical wall seen from above)
        builder.insert(&Envelope::new(40., 0., 40., 10.), 3);
        assert_eq!(builder.len(), 4);
        builder.build()
    }

    #[test]
    fn test_query() {
        let index = sample_index();
        assert_eq!(index.len(), 4);
        assert_eq!(index.query_sorted(&Envelope::new(1., 1., 2., 2.)), vec![0]);
        assert_eq!(
            index.query_sorted(&Envelope::new(8., 4., 22., 7.)),
            vec![0, 1, 2]
        );
        assert_eq!(index.query_sorted(&Envelope::new(39., 5., 41., 5.)), vec![3]);
        assert!(index.query_sorted(&Envelope::new(100., 100., 101., 101.)).is_empty());
    }

    #[test]
    fn test_query_touching() {
        let index = sample_index();
        assert_eq!(index.query_sorted(&Envelope::new(10., 0., 11., 1.)), vec![0]);
    }

    #[test]
    fn test_query_many() {
        let index = sample_index();
        let found = index.query_many(&[
            Envelope::new(1., 1., 2., 2.),
            Envelope::new(2., 2., 3., 3.),
            Envelope::new(28., 1., 29., 2.),
        ]);
        assert_eq!(found, vec![0, 1]);
    }

    #[test]
    fn test_concurrent_reads() {
        let index = sample_index();
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    let found = index.query_sorted(&Envelope::new(0., 0., 50., 50.));
                    assert_eq!(found.len(), 4);
                });
            }
        });
    }
}
