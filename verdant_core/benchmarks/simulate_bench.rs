use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use verdant_core::{CancelWatch, SimulationParams, Spawner, SpawnerConfig, SpeciesCatalog, Tile};

fn bench_tile(c: &mut Criterion) {
    let mut group = c.benchmark_group("tile");
    let catalog = SpeciesCatalog::builtin();

    for size in [2_500u32, 5_000, 10_000] {
        let params = Arc::new(SimulationParams {
            tile_size: size as f32,
            species: catalog.species().to_vec(),
        });
        group.bench_with_input(BenchmarkId::new("simulate", size), &params, |b, params| {
            b.iter_batched(
                || Tile::new(Arc::clone(params)),
                |mut tile| {
                    tile.simulate(7, None, CancelWatch::never());
                    tile
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_spawner_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawner");
    group.sample_size(10);

    for tiles in [1u32, 4, 16] {
        group.bench_with_input(BenchmarkId::new("pool", tiles), &tiles, |b, &tiles| {
            b.iter_batched(
                || {
                    let config = SpawnerConfig {
                        tile_size: 5_000.0,
                        num_unique_tiles: tiles,
                        random_seed: 42,
                        worker_threads: 0,
                    };
                    Spawner::new(SpeciesCatalog::builtin(), config)
                },
                |mut spawner| {
                    spawner.simulate(None);
                    spawner
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(simulate_benches, bench_tile, bench_spawner_pool);
criterion_main!(simulate_benches);
