//! Convex hulls used by the diffraction search.

use crate::geom::point::Point;
use crate::geom::segment::orientation;

/// Convex hull of the horizontal projection of `pts` (gift wrapping).
///
/// The hull is returned counter-clockwise, starting from the lowest-leftmost
/// point. Collinear points on hull edges are skipped and duplicates (within
/// `eps`) are ignored. Elevations are carried from the input points.
pub fn convex_hull(pts: &[Point], eps: f64) -> Vec<Point> {
    let mut unique: Vec<Point> = Vec::with_capacity(pts.len());
    for p in pts {
        if !unique.iter().any(|u| u.is_close_2d(p, eps)) {
            unique.push(*p);
        }
    }
    if unique.len() < 3 {
        return unique;
    }

    let start = unique
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)))
        .map(|(i, _)| i)
        .unwrap_or(0);

    let mut hull = Vec::new();
    let mut current = start;
    loop {
        hull.push(unique[current]);
        let mut candidate = (current + 1) % unique.len();
        for i in 0..unique.len() {
            if i == current {
                continue;
            }
            let turn = orientation(unique[current], unique[candidate], unique[i]);
            let farther = unique[current].distance_2d(&unique[i])
                > unique[current].distance_2d(&unique[candidate]);
            // Clockwise of the candidate, or collinear and farther away
            if turn < -eps || (turn.abs() <= eps && farther) {
                candidate = i;
            }
        }
        current = candidate;
        if current == start || hull.len() > unique.len() {
            break;
        }
    }
    hull
}

/// Upper convex hull of points (d, z) sorted by ascending d.
///
/// Used in the vertical cutting plane along a propagation line: `d` is the
/// distance from the source and `z` the elevation. Returns indices into
/// `pts`, first and last included. Points lying on a hull edge (within `eps`)
/// are dropped.
pub fn upper_hull(pts: &[(f64, f64)], eps: f64) -> Vec<usize> {
    let mut hull: Vec<usize> = Vec::with_capacity(pts.len());
    for (i, p) in pts.iter().enumerate() {
        while hull.len() >= 2 {
            let a = pts[hull[hull.len() - 2]];
            let b = pts[hull[hull.len() - 1]];
            let cross = (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0);
            // Left turn (or straight) means b is not on the upper hull
            if cross >= -eps {
                hull.pop();
            } else {
                break;
            }
        }
        hull.push(i);
    }
    hull
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convex_hull_square_with_inner_points() {
        let pts = vec![
            Point::new(0., 0., 0.),
            Point::new(10., 0., 0.),
            Point::new(5., 5., 0.),
            Point::new(10., 10., 0.),
            Point::new(0., 10., 0.),
            Point::new(5., 0., 0.), // collinear on an edge
            Point::new(2., 3., 0.),
        ];
        let hull = convex_hull(&pts, 1e-9);
        assert_eq!(hull.len(), 4, "hull = {:?}", hull);
        assert!(hull[0].is_close(&Point::new(0., 0., 0.)));
        assert!(hull[1].is_close(&Point::new(10., 0., 0.)));
        assert!(hull[2].is_close(&Point::new(10., 10., 0.)));
        assert!(hull[3].is_close(&Point::new(0., 10., 0.)));
    }

    #[test]
    fn test_convex_hull_degenerate() {
        let pts = vec![Point::new(0., 0., 0.), Point::new(0., 0., 0.)];
        assert_eq!(convex_hull(&pts, 1e-9).len(), 1);
    }

    #[test]
    fn test_upper_hull() {
        // Source, two obstacles, receiver
        let pts = vec![(0., 1.), (10., 5.), (12., 4.), (20., 8.), (40., 1.)];
        let hull = upper_hull(&pts, 1e-9);
        assert_eq!(hull, vec![0, 1, 3, 4]);
    }

    #[test]
    fn test_upper_hull_flat() {
        let pts = vec![(0., 1.), (5., 0.), (10., 1.)];
        assert_eq!(upper_hull(&pts, 1e-9), vec![0, 2]);
    }
}
