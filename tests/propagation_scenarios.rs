mod common;

use common::{init_logger, random_city, rect, street_points};
use soundpath::geom::vector::Vector;
use soundpath::paths::mirror::MirrorSet;
use soundpath::paths::path::{DiffractionEdge, PathPointKind};
use soundpath::{Path, PathConfig, PathFinder, PathKind, Point, ProfileBuilder};

const EPS: f64 = 1e-7;

fn assert_close(name: &str, got: f64, expected: f64, tol: f64) {
    assert!(
        (got - expected).abs() <= tol,
        "{name}: got {got}, expected {expected} (tol {tol})"
    );
}

#[test]
fn test_obstruction_free_scene_has_single_direct_path() -> anyhow::Result<()> {
    init_logger();
    let mut builder = ProfileBuilder::new(PathConfig::new(2, 2, 100.0, 1.0));
    // Terrain and ground zones do not obstruct anything
    for (x, y) in [(-50.0, -50.0), (150.0, -50.0), (150.0, 50.0), (-50.0, 50.0)] {
        builder.add_topography_point(Point::new(x, y, 0.0))?;
    }
    builder.add_ground_zone_rect(1, 20.0, 60.0, -30.0, 30.0, 0.7)?;
    builder.finish()?;

    let source = Point::new(0.0, 0.0, 1.0);
    let receiver = Point::new(100.0, 0.0, 1.0);
    let paths = PathFinder::new(builder.scene()?).find_paths(source, receiver)?;
    assert_eq!(paths.len(), 1);
    let direct = &paths[0];
    assert_eq!(direct.kind, PathKind::Direct);
    assert_eq!(direct.points.len(), 2);
    assert!(direct.points[0].position.is_close(&source));
    assert!(direct.points[1].position.is_close(&receiver));
    assert_close("direct length", direct.length(), 100.0, 1e-9);

    // The profile carries the zone boundaries and their coefficients
    let segments = direct.profiles[0].ground_segments();
    assert!(segments.iter().any(|s| (s.coefficient - 0.7).abs() < 1e-12));
    Ok(())
}

#[test]
fn test_profile_is_idempotent() -> anyhow::Result<()> {
    let builder = random_city(11, 3, PathConfig::new(1, 2, 60.0, 1.0))?;
    let a = Point::new(1.0, 0.5, 3.0);
    let b = Point::new(119.0, 101.0, 2.0);
    let first = builder.get_profile(a, b)?;
    for _ in 0..5 {
        let again = builder.get_profile(a, b)?;
        assert_eq!(first, again);
    }
    assert!(first.len() > 2);
    let d: Vec<f64> = first.points().iter().map(|p| p.distance).collect();
    assert!(d.windows(2).all(|w| w[1] > w[0]));
    Ok(())
}

#[test]
fn test_order_one_mirror_is_exact_reflection() -> anyhow::Result<()> {
    let mut builder = ProfileBuilder::new(PathConfig::new(1, 0, 100.0, 1.0));
    let w0 = Point::new(-20.0, 10.0, 0.0);
    let w1 = Point::new(80.0, 60.0, 0.0);
    builder.add_wall(5, vec![w0, w1], 8.0, vec![0.2])?;
    builder.finish()?;
    let receiver = Point::new(40.0, 5.0, 1.5);
    let set = MirrorSet::generate(builder.scene()?, receiver, 1, 100.0);
    assert_eq!(set.len(), 1);
    let image = set.mirrors()[0].position;

    // Equidistant from the wall plane, on the opposite side
    let dir = Vector::from_points(w0, w1);
    let side = |p: Point| dir.cross_2d(Vector::from_points(w0, p)) / dir.length_2d();
    assert_close("distance to wall", side(image), -side(receiver), EPS);
    // The segment joining them is perpendicular to the wall
    assert_close("perpendicular", Vector::from_points(receiver, image).dot(dir), 0.0, EPS);
    assert_close("elevation", image.z, receiver.z, 0.0);
    Ok(())
}

fn assert_specular(path: &Path) {
    for (i, pp) in path.points.iter().enumerate() {
        let PathPointKind::Reflection { .. } = pp.kind else {
            continue;
        };
        let prev = path.points[i - 1].position;
        let next = path.points[i + 1].position;
        let incoming = Vector::from_points(prev, pp.position);
        let outgoing = Vector::from_points(pp.position, next);
        let (li, lo) = (incoming.length(), outgoing.length());
        // Same horizontal and vertical direction cosines except the normal flips
        assert_close("vertical", incoming.dz / li, outgoing.dz / lo, EPS);
        let tangential_in = incoming.dx / li;
        let tangential_out = outgoing.dx / lo;
        assert_close("tangential", tangential_in, tangential_out, EPS);
        assert_close("normal", incoming.dy / li, -outgoing.dy / lo, EPS);
    }
}

#[test]
fn test_reflections_are_specular() -> anyhow::Result<()> {
    init_logger();
    let mut builder = ProfileBuilder::new(PathConfig::new(3, 0, 100.0, 1.0));
    builder.add_wall(
        1,
        vec![Point::new(-100.0, 15.0, 0.0), Point::new(200.0, 15.0, 0.0)],
        10.0,
        vec![0.1],
    )?;
    builder.add_wall(
        2,
        vec![Point::new(200.0, -15.0, 0.0), Point::new(-100.0, -15.0, 0.0)],
        10.0,
        vec![0.1],
    )?;
    builder.finish()?;
    let paths = PathFinder::new(builder.scene()?)
        .find_paths(Point::new(0.0, 2.0, 1.0), Point::new(60.0, -4.0, 3.0))?;
    let reflected: Vec<&Path> = paths.iter().filter(|p| p.kind == PathKind::Reflected).collect();
    // Two walls: two images per order
    assert_eq!(reflected.len(), 6);
    for order in 1..=3 {
        assert_eq!(
            reflected.iter().filter(|p| p.reflection_order() == order).count(),
            2,
            "order {order}"
        );
    }
    for p in reflected {
        assert_specular(p);
        // Consecutive reflections alternate between the walls
        let ids = p.touched_features();
        assert_eq!(ids.len(), p.reflection_order());
    }
    Ok(())
}

#[test]
fn test_orders_and_duplicates_in_random_city() -> anyhow::Result<()> {
    init_logger();
    let config = PathConfig::new(2, 2, 60.0, 0.5);
    let builder = random_city(3, 3, config.clone())?;
    let finder = PathFinder::new(builder.scene()?);
    let pts = street_points(&builder, 3, 1.5)?;
    let mut total = 0;
    for (i, &s) in pts.iter().enumerate().step_by(3) {
        for &r in pts.iter().skip(i + 1).step_by(2) {
            for p in finder.find_paths(s, r)? {
                assert!(p.reflection_order() <= config.max_reflection_order);
                assert!(p.diffraction_order() <= config.max_diffraction_order);
                assert!(!p.has_duplicate_points(EPS), "duplicate points in {:?}", p.points);
                assert_eq!(p.profiles.len(), p.points.len() - 1);
                assert!(p.points.first().is_some_and(|q| q.position.is_close(&s)));
                assert!(p.points.last().is_some_and(|q| q.position.is_close(&r)));
                total += 1;
            }
        }
    }
    assert!(total > 0);
    Ok(())
}

#[test]
fn test_building_across_the_line_is_diffracted() -> anyhow::Result<()> {
    let mut builder = ProfileBuilder::new(PathConfig::new(1, 2, 50.0, 1.0));
    builder.add_building(7, rect(30.0, -20.0, 70.0, 20.0), 12.0, vec![0.3])?;
    builder.finish()?;
    let paths = PathFinder::new(builder.scene()?)
        .find_paths(Point::new(0.0, 0.0, 1.0), Point::new(100.0, 0.0, 1.0))?;
    assert!(paths.iter().all(|p| p.kind != PathKind::Direct));
    let diffracted: Vec<&Path> = paths.iter().filter(|p| p.kind == PathKind::Diffracted).collect();
    assert!(!diffracted.is_empty());
    let around_corner = diffracted.iter().any(|p| {
        p.points.iter().any(|pp| {
            matches!(
                pp.kind,
                PathPointKind::Diffraction {
                    feature: Some(7),
                    edge: DiffractionEdge::Horizontal
                }
            )
        })
    });
    assert!(around_corner);
    // Ordered by length within the same order
    for w in diffracted.windows(2) {
        if w[0].diffraction_order() == w[1].diffraction_order() {
            assert!(w[0].length() <= w[1].length());
        }
    }
    Ok(())
}

#[test]
fn test_parallel_wall_gives_one_reflection() -> anyhow::Result<()> {
    let mut builder = ProfileBuilder::new(PathConfig::new(1, 1, 50.0, 1.0));
    builder.add_wall(
        1,
        vec![Point::new(-20.0, 25.0, 0.0), Point::new(120.0, 25.0, 0.0)],
        6.0,
        vec![0.1],
    )?;
    builder.finish()?;
    let paths = PathFinder::new(builder.scene()?)
        .find_paths(Point::new(0.0, 0.0, 1.0), Point::new(100.0, 0.0, 1.0))?;
    let kinds: Vec<PathKind> = paths.iter().map(|p| p.kind).collect();
    assert_eq!(kinds, vec![PathKind::Direct, PathKind::Reflected]);
    assert_eq!(paths[1].reflection_order(), 1);
    let hit = paths[1].points[1].position;
    assert_close("reflection x", hit.x, 50.0, EPS);
    assert_close("reflection y", hit.y, 25.0, EPS);
    Ok(())
}

#[test]
fn test_terrain_ridge_is_diffracted_over() -> anyhow::Result<()> {
    let mut builder = ProfileBuilder::new(PathConfig::new(0, 3, 50.0, 1.0));
    for (x, y) in [(-10.0, -50.0), (-10.0, 50.0), (110.0, -50.0), (110.0, 50.0)] {
        builder.add_topography_point(Point::new(x, y, 0.0))?;
    }
    builder.add_topography_line(Point::new(50.0, -50.0, 15.0), Point::new(50.0, 50.0, 15.0))?;
    builder.finish()?;
    let paths = PathFinder::new(builder.scene()?)
        .find_paths(Point::new(0.0, 0.0, 3.5), Point::new(100.0, 0.0, 3.5))?;
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].kind, PathKind::Diffracted);
    assert_eq!(paths[0].diffraction_order(), 1);
    let top = paths[0].points[1].position;
    assert_close("ridge x", top.x, 50.0, 1e-6);
    assert_close("ridge z", top.z, 15.0, 1e-6);
    Ok(())
}
