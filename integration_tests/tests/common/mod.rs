// Not every test binary exercises every helper.
#![allow(dead_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use verdant_core::{Spawner, SpawnerConfig, SpeciesCatalog};

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn load_fixture_catalog(name: &str) -> Result<SpeciesCatalog> {
    let path = fixture_path(name);
    SpeciesCatalog::from_file(&path)
        .with_context(|| format!("failed to load fixture catalog {}", path.display()))
}

pub fn spawner_config(tile_size: f32, tiles: u32, seed: u64) -> SpawnerConfig {
    SpawnerConfig {
        tile_size,
        num_unique_tiles: tiles,
        random_seed: seed,
        worker_threads: 2,
    }
}

pub fn fixture_spawner(catalog_name: &str, tile_size: f32, tiles: u32, seed: u64) -> Spawner {
    let catalog = load_fixture_catalog(catalog_name).expect("fixture catalog loads");
    Spawner::new(catalog, spawner_config(tile_size, tiles, seed))
}
