use glam::Vec3;
use tracing::info;

use verdant_core::{
    generate_placements, load_catalog_from_env, PlacementVolume, Spawner, SpawnerConfig,
};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (catalog, metadata) = load_catalog_from_env();
    let config = SpawnerConfig::default();
    info!(
        species = catalog.len(),
        source = ?metadata.source_path,
        tile_size = config.tile_size,
        tiles = config.num_unique_tiles,
        "Verdant foliage runner ready"
    );

    let mut spawner = Spawner::new(catalog, config);
    let report = spawner.simulate(None);
    info!(
        tiles = report.tiles_completed,
        instances = report.total_instances,
        attempts = report.seed_attempts,
        rejected = report.seed_rejections,
        elapsed_ms = report.duration.as_millis() as u64,
        "tile pool simulated"
    );

    // Demo volume spanning a 3 x 3 tile neighborhood so every stitching
    // case (right, top, corner) shows up in the output.
    let span = spawner.tile_size() * 3.0;
    let volume = PlacementVolume::new(Vec3::ZERO, Vec3::new(span, span, 2_000.0));
    let batch = generate_placements(&mut spawner, &volume, 1_000.0, || false);
    info!(
        run = %batch.run,
        cells = batch.report.tiles_completed,
        instances = batch.instances.len(),
        elapsed_ms = batch.report.duration.as_millis() as u64,
        "placement batch generated"
    );
}
