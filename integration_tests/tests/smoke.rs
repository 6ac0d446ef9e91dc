mod common;

use glam::Vec3;
use verdant_core::{build_default_spawner, generate_placements, PlacementVolume};

#[test]
fn builtin_catalog_populates_a_pool() {
    let mut spawner = build_default_spawner();
    let report = spawner.simulate(Some(2));
    assert!(!report.cancelled);
    assert_eq!(report.tiles_completed, report.tiles_requested);
    assert!(report.total_instances > 0, "builtin catalog placed nothing");
    assert!(report.seed_attempts >= report.seed_rejections);
}

#[test]
fn fixture_catalog_runs_the_whole_pipeline() {
    let mut spawner = common::fixture_spawner("meadow_catalog.json", 4_000.0, 2, 5);
    let volume = PlacementVolume::new(Vec3::ZERO, Vec3::new(8_000.0, 4_000.0, 1_500.0));
    let batch = generate_placements(&mut spawner, &volume, 500.0, || false);

    assert!(!batch.report.cancelled);
    assert_eq!(batch.report.tiles_completed, 2);
    assert_eq!(batch.report.total_instances, batch.instances.len());
    assert!(!batch.instances.is_empty(), "meadow catalog placed nothing");
    for inst in &batch.instances {
        assert_eq!(inst.run, batch.run);
        assert_eq!(inst.ray_start.z, 1_500.0);
        assert_eq!(inst.ray_end.z, -10.0);
    }
}
