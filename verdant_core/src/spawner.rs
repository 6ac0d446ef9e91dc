//! Tile pool generation.
//!
//! A spawner simulates a fixed pool of unique tiles on a worker pool, then
//! hands them out to world cells by coordinate hash. Runs can be cancelled
//! cooperatively: advancing the generation counter tells every in-flight
//! tile to stop, but the dispatcher still drains every future it spawned
//! before discarding the run.

use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{bounded, RecvTimeoutError};
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Deserialize;

use crate::cancel::{GenerationCounter, CANCEL_POLL_INTERVAL};
use crate::metrics::SimulationReport;
use crate::rng::RandomStream;
use crate::species::SpeciesCatalog;
use crate::tile::{SimulationParams, Tile};

const fn default_tile_size() -> f32 {
    10_000.0
}

const fn default_num_unique_tiles() -> u32 {
    10
}

const fn default_random_seed() -> u64 {
    42
}

const fn default_worker_threads() -> usize {
    0
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpawnerConfig {
    /// Edge length of a square tile, in centimeters.
    #[serde(default = "default_tile_size")]
    pub tile_size: f32,
    /// Distinct tiles simulated into the pool; world cells pick from these
    /// by coordinate hash.
    #[serde(default = "default_num_unique_tiles")]
    pub num_unique_tiles: u32,
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,
    /// 0 lets the worker pool size itself to the machine.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            tile_size: default_tile_size(),
            num_unique_tiles: default_num_unique_tiles(),
            random_seed: default_random_seed(),
            worker_threads: default_worker_threads(),
        }
    }
}

pub struct Spawner {
    catalog: SpeciesCatalog,
    config: SpawnerConfig,
    generation: GenerationCounter,
    pool: Arc<ThreadPool>,
    precomputed: Vec<Arc<Tile>>,
    last_params: Option<Arc<SimulationParams>>,
    /// Catalog change counters captured when `precomputed` was last filled.
    clean_counters: Option<Vec<u32>>,
}

impl Spawner {
    pub fn new(catalog: SpeciesCatalog, config: SpawnerConfig) -> Self {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|i| format!("verdant-sim-{i}"))
            .build()
            .expect("failed to build simulation thread pool");
        Self {
            catalog,
            config,
            generation: GenerationCounter::new(),
            pool: Arc::new(pool),
            precomputed: Vec::new(),
            last_params: None,
            clean_counters: None,
        }
    }

    pub fn config(&self) -> &SpawnerConfig {
        &self.config
    }

    pub fn tile_size(&self) -> f32 {
        self.config.tile_size
    }

    pub fn catalog(&self) -> &SpeciesCatalog {
        &self.catalog
    }

    /// Catalog edits made through this show up in [`Spawner::is_dirty`]
    /// until the next simulation run.
    pub fn catalog_mut(&mut self) -> &mut SpeciesCatalog {
        &mut self.catalog
    }

    pub fn generation(&self) -> &GenerationCounter {
        &self.generation
    }

    pub fn tiles(&self) -> &[Arc<Tile>] {
        &self.precomputed
    }

    pub(crate) fn pool(&self) -> &Arc<ThreadPool> {
        &self.pool
    }

    pub(crate) fn shared_params(&self) -> Option<&Arc<SimulationParams>> {
        self.last_params.as_ref()
    }

    /// True when the catalog changed since the pool was last filled, or the
    /// pool was never filled (or the last run was discarded).
    pub fn is_dirty(&self) -> bool {
        match &self.clean_counters {
            None => true,
            Some(snapshot) => snapshot.as_slice() != self.catalog.change_counters(),
        }
    }

    pub fn simulate_if_dirty(&mut self, max_steps: Option<u32>) -> Option<SimulationReport> {
        if self.is_dirty() {
            Some(self.simulate(max_steps))
        } else {
            None
        }
    }

    pub fn simulate(&mut self, max_steps: Option<u32>) -> SimulationReport {
        self.simulate_with_cancel(max_steps, || false)
    }

    /// Simulates the whole tile pool, polling `poll_cancel` while waiting.
    ///
    /// On cancellation every dispatched future is still drained before the
    /// run is discarded; the pool is left empty and the spawner dirty. An
    /// empty catalog or a zero tile count is a valid, empty outcome.
    pub fn simulate_with_cancel(
        &mut self,
        max_steps: Option<u32>,
        mut poll_cancel: impl FnMut() -> bool,
    ) -> SimulationReport {
        let started = Instant::now();
        // The pool and its clean marker are discarded together; only a run
        // that completes re-marks the catalog clean.
        self.precomputed.clear();
        self.clean_counters = None;

        let params = Arc::new(SimulationParams {
            tile_size: self.config.tile_size,
            species: self.catalog.species().to_vec(),
        });
        self.last_params = Some(Arc::clone(&params));

        let mut report = SimulationReport {
            tiles_requested: self.config.num_unique_tiles,
            ..SimulationReport::default()
        };

        if params.species.is_empty() || self.config.num_unique_tiles == 0 {
            self.mark_clean();
            report.duration = started.elapsed();
            tracing::info!(target: "verdant::spawner", "spawner.nothing_to_simulate");
            return report;
        }

        let watch = self.generation.watch();
        let mut seed_stream = RandomStream::new(self.config.random_seed);
        let mut futures = Vec::with_capacity(self.config.num_unique_tiles as usize);
        for _ in 0..self.config.num_unique_tiles {
            let seed = seed_stream.next_u64();
            let (sender, receiver) = bounded::<Tile>(1);
            let task_params = Arc::clone(&params);
            let task_watch = watch.clone();
            self.pool.spawn(move || {
                let mut tile = Tile::new(task_params);
                tile.simulate(seed, max_steps, task_watch);
                let _ = sender.send(tile);
            });
            futures.push(receiver);
        }

        // Wait for every future in submission order. Cancellation never
        // abandons a future: a cancelled run drains them all, then discards.
        let mut cancelled = false;
        if poll_cancel() {
            self.generation.advance();
            cancelled = true;
        }
        let mut finished: Vec<Tile> = Vec::with_capacity(futures.len());
        for receiver in &futures {
            loop {
                match receiver.recv_timeout(CANCEL_POLL_INTERVAL) {
                    Ok(tile) => {
                        finished.push(tile);
                        break;
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        if !cancelled && poll_cancel() {
                            self.generation.advance();
                            cancelled = true;
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        tracing::warn!(target: "verdant::spawner", "spawner.tile_future_lost");
                        break;
                    }
                }
            }
        }

        report.duration = started.elapsed();
        if cancelled || watch.is_cancelled() {
            report.cancelled = true;
            tracing::info!(
                target: "verdant::spawner",
                drained = finished.len(),
                elapsed_ms = report.duration.as_millis() as u64,
                "spawner.cancelled"
            );
            return report;
        }

        for tile in &finished {
            report.total_instances += tile.live_count();
            report.seed_attempts += tile.seed_attempts();
            report.seed_rejections += tile.seed_rejections();
        }
        report.tiles_completed = finished.len() as u32;
        self.precomputed = finished.into_iter().map(Arc::new).collect();
        self.mark_clean();

        tracing::info!(
            target: "verdant::spawner",
            tiles = report.tiles_completed,
            instances = report.total_instances,
            attempts = report.seed_attempts,
            rejected = report.seed_rejections,
            elapsed_ms = report.duration.as_millis() as u64,
            "spawner.simulated"
        );
        report
    }

    /// Deterministic pick from the precomputed pool for a world tile
    /// coordinate. `None` until a simulation run has filled the pool.
    pub fn get_tile(&self, x: i32, y: i32) -> Option<Arc<Tile>> {
        if self.precomputed.is_empty() {
            return None;
        }
        let idx = tile_hash(x, y) as usize % self.precomputed.len();
        Some(Arc::clone(&self.precomputed[idx]))
    }

    fn mark_clean(&mut self) {
        self.clean_counters = Some(self.catalog.change_counters().to_vec());
    }
}

/// Integer mix of a tile coordinate; stable across runs and platforms.
fn tile_hash(x: i32, y: i32) -> u32 {
    let mut n = (x as u32).wrapping_mul(0x6C8E_9CF5) ^ (y as u32).wrapping_mul(0xB529_7A4D);
    n ^= n >> 13;
    n = n.wrapping_mul(0x68E3_1DA4);
    n ^= n >> 11;
    n = n.wrapping_mul(0x1B56_C4E9);
    n ^ (n >> 16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::species::{GrowthCurve, Species, SpeciesId};

    fn sparse_species(name: &str) -> Species {
        Species {
            name: name.into(),
            seed_density: 0.05,
            average_spread_distance: 300.0,
            spread_variance: 0.0,
            seeds_per_step: 1,
            num_steps: 1,
            grows_in_shade: false,
            max_initial_age: 1.0,
            max_age: 10.0,
            overlap_priority: 0.0,
            collision_radius: 0.0,
            shade_radius: 0.0,
            min_scale: 1.0,
            max_scale: 2.0,
            growth_curve: GrowthCurve::default(),
            max_initial_seed_offset: 0.0,
        }
    }

    fn small_spawner(tiles: u32) -> Spawner {
        let catalog = SpeciesCatalog::new(vec![sparse_species("filler")]).unwrap();
        let config = SpawnerConfig {
            tile_size: 2_000.0,
            num_unique_tiles: tiles,
            random_seed: 7,
            worker_threads: 2,
        };
        Spawner::new(catalog, config)
    }

    #[test]
    fn hash_pick_is_stable_per_coordinate() {
        let mut spawner = small_spawner(3);
        assert!(spawner.get_tile(0, 0).is_none(), "no pool before simulation");
        spawner.simulate(None);

        let first = spawner.get_tile(12, -7).unwrap();
        let second = spawner.get_tile(12, -7).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        // Different coordinates spread across the pool deterministically.
        let other = spawner.get_tile(13, -7).unwrap();
        let again = spawner.get_tile(13, -7).unwrap();
        assert!(Arc::ptr_eq(&other, &again));
    }

    #[test]
    fn empty_catalog_is_a_valid_empty_run() {
        let catalog = SpeciesCatalog::new(Vec::new()).unwrap();
        let mut spawner = Spawner::new(catalog, SpawnerConfig::default());
        let report = spawner.simulate(None);
        assert!(!report.cancelled);
        assert_eq!(report.tiles_completed, 0);
        assert_eq!(report.total_instances, 0);
        assert!(spawner.get_tile(0, 0).is_none());
        assert!(!spawner.is_dirty(), "empty run still counts as up to date");
    }

    #[test]
    fn catalog_edits_mark_the_pool_dirty() {
        let mut spawner = small_spawner(2);
        assert!(spawner.is_dirty(), "fresh spawner has no pool yet");
        spawner.simulate(None);
        assert!(!spawner.is_dirty());

        spawner
            .catalog_mut()
            .get_mut(SpeciesId(0))
            .unwrap()
            .seed_density = 0.1;
        assert!(spawner.is_dirty());
        assert!(spawner.simulate_if_dirty(None).is_some());
        assert!(spawner.simulate_if_dirty(None).is_none());
    }

    #[test]
    fn cancel_at_dispatch_discards_everything() {
        let mut spawner = small_spawner(4);
        let report = spawner.simulate_with_cancel(None, || true);
        assert!(report.cancelled);
        assert_eq!(report.tiles_requested, 4);
        assert_eq!(report.tiles_completed, 0);
        assert!(spawner.tiles().is_empty());
        assert!(spawner.is_dirty(), "a discarded run leaves the spawner dirty");

        // The next generation is free to run to completion.
        let report = spawner.simulate(None);
        assert!(!report.cancelled);
        assert_eq!(report.tiles_completed, 4);
    }

    #[test]
    fn cancelled_rerun_dirties_a_clean_spawner() {
        let mut spawner = small_spawner(2);
        spawner.simulate(None);
        assert!(!spawner.is_dirty());

        // The catalog is unchanged, but the discarded pool still has to
        // register as stale.
        let report = spawner.simulate_with_cancel(None, || true);
        assert!(report.cancelled);
        assert!(spawner.tiles().is_empty());
        assert!(spawner.is_dirty(), "discarding a re-run must dirty an up-to-date spawner");

        let report = spawner.simulate_if_dirty(None).expect("discarded pool needs redoing");
        assert!(!report.cancelled);
        assert_eq!(report.tiles_completed, 2);
        assert!(!spawner.is_dirty());
    }

    #[test]
    fn tile_pool_is_deterministic_across_runs() {
        let mut first = small_spawner(3);
        let mut second = small_spawner(3);
        first.simulate(None);
        second.simulate(None);
        assert_eq!(first.tiles().len(), second.tiles().len());
        for (a, b) in first.tiles().iter().zip(second.tiles()) {
            assert_eq!(a.instances_to_array(), b.instances_to_array());
        }
    }
}
