#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use soundpath::compute::{PairRequest, ReceiverPoint, SourcePoint, pairs_within};
use soundpath::{PathConfig, Point, ProfileBuilder};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<Point> {
    vec![
        Point::new(x0, y0, 0.0),
        Point::new(x1, y0, 0.0),
        Point::new(x1, y1, 0.0),
        Point::new(x0, y1, 0.0),
    ]
}

pub const CELL: f64 = 40.0;

/// City block scene: one random building per `CELL` x `CELL` cell (kept 3 m
/// away from the cell borders), a few free-standing walls along the streets,
/// and a gently sloped terrain.
pub fn random_city(seed: u64, cells: usize, config: PathConfig) -> anyhow::Result<ProfileBuilder> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut builder = ProfileBuilder::new(config);
    let mut id = 1;
    for i in 0..cells {
        for j in 0..cells {
            if rng.gen_bool(0.2) {
                continue;
            }
            let x0 = i as f64 * CELL + rng.gen_range(3.0..10.0);
            let y0 = j as f64 * CELL + rng.gen_range(3.0..10.0);
            let x1 = (x0 + rng.gen_range(8.0..25.0)).min((i + 1) as f64 * CELL - 3.0);
            let y1 = (y0 + rng.gen_range(8.0..25.0)).min((j + 1) as f64 * CELL - 3.0);
            let height = rng.gen_range(4.0..20.0);
            builder.add_building(id, rect(x0, y0, x1, y1), height, vec![0.1, 0.2, 0.3])?;
            id += 1;
        }
    }
    for k in 0..cells {
        let x = k as f64 * CELL + 1.5;
        let y0 = rng.gen_range(0.0..CELL);
        builder.add_wall(
            id,
            vec![Point::new(x, y0, 0.0), Point::new(x, y0 + 15.0, 0.0)],
            rng.gen_range(2.0..4.0),
            vec![0.05],
        )?;
        id += 1;
    }
    let size = cells as f64 * CELL;
    let (lo, hi) = (-10.0, size + 10.0);
    for (x, y) in [(lo, lo), (hi, lo), (hi, hi), (lo, hi)] {
        builder.add_topography_point(Point::new(x, y, 0.02 * x + 0.01 * y))?;
    }
    builder.add_ground_zone_rect(9000, 0.0, size / 2.0, 0.0, size, 1.0)?;
    builder.finish()?;
    Ok(builder)
}

/// Points on the street grid (cell corners), above the local ground.
pub fn street_points(builder: &ProfileBuilder, cells: usize, height: f64) -> anyhow::Result<Vec<Point>> {
    let mut pts = Vec::new();
    for i in 0..=cells {
        for j in 0..=cells {
            let (x, y) = (i as f64 * CELL + 1.0, j as f64 * CELL + 0.5);
            pts.push(Point::new(x, y, builder.z_ground(x, y)? + height));
        }
    }
    Ok(pts)
}

pub fn requests(sources: &[Point], receivers: &[Point], max_distance: f64) -> Vec<PairRequest> {
    let sources: Vec<SourcePoint> = sources
        .iter()
        .enumerate()
        .map(|(i, &position)| SourcePoint {
            id: i as u64,
            position,
        })
        .collect();
    let receivers: Vec<ReceiverPoint> = receivers
        .iter()
        .enumerate()
        .map(|(i, &position)| ReceiverPoint {
            id: 10_000 + i as u64,
            position,
        })
        .collect();
    pairs_within(&sources, &receivers, max_distance)
}
