//! World placement over a volume.
//!
//! A placement run tiles a world-space volume with cells of the spawner's
//! tile size, builds one composite tile per cell by stitching the cell's
//! precomputed tile with the overlap bands of its right, top and top-right
//! neighbors, and converts the survivors into vertical probe rays. Instances
//! whose centre lands outside a cell's core box enter the composite as
//! blockers: they fight for space so both sides of a seam agree on the
//! winners, but only the cell that owns the centre exports it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{bounded, RecvTimeoutError};
use glam::{Vec2, Vec3};
use serde::Serialize;

use crate::cancel::CANCEL_POLL_INTERVAL;
use crate::metrics::SimulationReport;
use crate::spawner::Spawner;
use crate::species::SpeciesId;
use crate::tile::{SimulationParams, Tile};

/// Probe rays end this far below the volume floor.
const RAY_BOTTOM_PADDING: f32 = 10.0;

static NEXT_RUN: AtomicU64 = AtomicU64::new(1);

/// Process-unique id correlating every instance of one placement run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PlacementRunId(pub u64);

impl PlacementRunId {
    pub fn next() -> Self {
        PlacementRunId(NEXT_RUN.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PlacementRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run{}", self.0)
    }
}

/// World-space axis-aligned box to fill with foliage. `z` is up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementVolume {
    pub min: Vec3,
    pub max: Vec3,
}

impl PlacementVolume {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        debug_assert!(
            min.x <= max.x && min.y <= max.y && min.z <= max.z,
            "inverted placement volume"
        );
        Self { min, max }
    }

    pub fn half_height(&self) -> f32 {
        (self.max.z - self.min.z) * 0.5
    }
}

/// Grid of world cells covering a volume. Cell `(0, 0)` sits at world tile
/// coordinate `(bottom_left_x, bottom_left_y)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileLayout {
    pub bottom_left_x: i32,
    pub bottom_left_y: i32,
    pub num_tiles_x: u32,
    pub num_tiles_y: u32,
    pub half_height: f32,
}

impl TileLayout {
    pub fn cell_count(&self) -> u32 {
        self.num_tiles_x * self.num_tiles_y
    }
}

/// Snaps a volume to the tile grid. A volume smaller than one tile still
/// claims a full cell.
pub fn compute_tile_layout(volume: &PlacementVolume, tile_size: f32) -> TileLayout {
    debug_assert!(tile_size > 0.0, "tile size must be positive");
    let bottom_left_x = (volume.min.x / tile_size).floor() as i32;
    let bottom_left_y = (volume.min.y / tile_size).floor() as i32;
    let num_tiles_x = ((volume.max.x / tile_size).ceil() as i32 - bottom_left_x).max(1) as u32;
    let num_tiles_y = ((volume.max.y / tile_size).ceil() as i32 - bottom_left_y).max(1) as u32;
    TileLayout {
        bottom_left_x,
        bottom_left_y,
        num_tiles_x,
        num_tiles_y,
        half_height: volume.half_height(),
    }
}

/// One placement request: a vertical probe ray through the volume plus the
/// appearance data the eventual instantiation needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesiredInstance {
    pub ray_start: Vec3,
    pub ray_end: Vec3,
    /// Yaw about the vertical axis, radians.
    pub rotation: f32,
    pub scale: f32,
    pub age: f32,
    pub species: SpeciesId,
    /// Scaled footprint radius, for downstream spacing checks.
    pub max_radius: f32,
    pub run: PlacementRunId,
}

/// Output of one placement run. A cancelled run carries no instances.
#[derive(Debug, Clone)]
pub struct PlacementBatch {
    pub run: PlacementRunId,
    pub instances: Vec<DesiredInstance>,
    pub report: SimulationReport,
}

impl PlacementBatch {
    fn empty(run: PlacementRunId, report: SimulationReport) -> Self {
        Self {
            run,
            instances: Vec::new(),
            report,
        }
    }
}

/// Stitching work for one world cell, shipped whole to a worker.
struct CellJob {
    params: Arc<SimulationParams>,
    own: Arc<Tile>,
    right: Option<Arc<Tile>>,
    top: Option<Arc<Tile>>,
    top_right: Option<Arc<Tile>>,
    overlap: f32,
    /// World position of the cell's bottom-left corner.
    origin: Vec2,
    volume_top: f32,
    half_height: f32,
    run: PlacementRunId,
}

impl CellJob {
    /// Builds the composite tile and converts its exports to world space.
    ///
    /// Band boxes are in each source tile's local frame: the cell keeps its
    /// own tile up to `size + overlap` so spill past the far edges guards the
    /// seam, and pulls the facing band of each neighbor shifted by one tile.
    /// Only instances whose shifted centre lands inside the half-open core
    /// box `[0, size)²` survive as exports; the rest fight as blockers.
    fn build(self) -> Vec<DesiredInstance> {
        let size = self.params.tile_size;
        let v = self.overlap;
        let core_min = Vec2::ZERO;
        let core_max = Vec2::splat(size);

        let mut composite = Tile::new(Arc::clone(&self.params));
        let own = self.own.instances_in_box(Vec2::ZERO, Vec2::splat(size + v));
        composite.add_instances(&own, Vec2::ZERO, core_min, core_max);
        if let Some(right) = &self.right {
            let band = right.instances_in_box(Vec2::new(-v, 0.0), Vec2::new(v, size + v));
            composite.add_instances(&band, Vec2::new(size, 0.0), core_min, core_max);
        }
        if let Some(top) = &self.top {
            let band = top.instances_in_box(Vec2::new(0.0, -v), Vec2::new(size + v, v));
            composite.add_instances(&band, Vec2::new(0.0, size), core_min, core_max);
        }
        if let Some(corner) = &self.top_right {
            let band = corner.instances_in_box(Vec2::splat(-v), Vec2::splat(v));
            composite.add_instances(&band, Vec2::splat(size), core_min, core_max);
        }

        let ray_top = self.volume_top;
        let ray_bottom = ray_top - (self.half_height * 2.0 + RAY_BOTTOM_PADDING);
        composite
            .instances_to_array()
            .into_iter()
            .map(|inst| {
                let world = self.origin + inst.location;
                let species = self.params.species(inst.species);
                DesiredInstance {
                    ray_start: Vec3::new(world.x, world.y, ray_top),
                    ray_end: Vec3::new(world.x, world.y, ray_bottom),
                    rotation: inst.rotation,
                    scale: inst.scale,
                    age: inst.age,
                    species: inst.species,
                    max_radius: inst.max_radius(species),
                    run: self.run,
                }
            })
            .collect()
    }
}

/// Generates placement rays for every cell a volume touches.
///
/// Resimulates the tile pool first when the catalog changed, under the same
/// `poll_cancel` as the stitching wait. Cells are stitched in parallel on
/// the spawner's worker pool and collected in grid order, so output order is
/// deterministic for a given catalog, config and volume. A cancelled run
/// drains every dispatched future, then returns an empty batch. Cancelling
/// the stitching wait leaves a completed pool untouched; a cancel during
/// the rebuild leaves the pool empty and the spawner dirty.
pub fn generate_placements(
    spawner: &mut Spawner,
    volume: &PlacementVolume,
    tile_overlap: f32,
    mut poll_cancel: impl FnMut() -> bool,
) -> PlacementBatch {
    let started = Instant::now();
    let run = PlacementRunId::next();

    let tile_size = spawner.tile_size();
    let layout = compute_tile_layout(volume, tile_size);
    let mut report = SimulationReport {
        tiles_requested: layout.cell_count(),
        ..SimulationReport::default()
    };

    // A stale pool rebuilds under the same poll as the stitching wait.
    if spawner.is_dirty() {
        let rebuild = spawner.simulate_with_cancel(None, &mut poll_cancel);
        if rebuild.cancelled {
            report.cancelled = true;
            report.duration = started.elapsed();
            tracing::info!(target: "verdant::placement", %run, "placement.cancelled");
            return PlacementBatch::empty(run, report);
        }
    }

    let params = match spawner.shared_params() {
        Some(params) if !spawner.tiles().is_empty() => Arc::clone(params),
        _ => {
            report.duration = started.elapsed();
            tracing::info!(target: "verdant::placement", %run, "placement.empty_pool");
            return PlacementBatch::empty(run, report);
        }
    };

    let volume_top = volume.max.z;
    let mut futures = Vec::with_capacity(layout.cell_count() as usize);
    for x in 0..layout.num_tiles_x as i32 {
        for y in 0..layout.num_tiles_y as i32 {
            let grid_x = layout.bottom_left_x + x;
            let grid_y = layout.bottom_left_y + y;
            let Some(own) = spawner.get_tile(grid_x, grid_y) else {
                continue;
            };
            let right = (x + 1 < layout.num_tiles_x as i32)
                .then(|| spawner.get_tile(grid_x + 1, grid_y))
                .flatten();
            let top = (y + 1 < layout.num_tiles_y as i32)
                .then(|| spawner.get_tile(grid_x, grid_y + 1))
                .flatten();
            let top_right = (right.is_some() && top.is_some())
                .then(|| spawner.get_tile(grid_x + 1, grid_y + 1))
                .flatten();

            let job = CellJob {
                params: Arc::clone(&params),
                own,
                right,
                top,
                top_right,
                overlap: tile_overlap,
                origin: Vec2::new(grid_x as f32 * tile_size, grid_y as f32 * tile_size),
                volume_top,
                half_height: layout.half_height,
                run,
            };
            let (sender, receiver) = bounded::<Vec<DesiredInstance>>(1);
            spawner.pool().spawn(move || {
                let _ = sender.send(job.build());
            });
            futures.push(receiver);
        }
    }

    // Wait for every future in grid order. Cancellation never abandons a
    // future: a cancelled run drains them all, then discards. Unlike a
    // spawner run the generation counter stays put, so the completed pool
    // tiles remain valid.
    let mut cancelled = poll_cancel();
    let mut instances = Vec::new();
    let mut completed = 0u32;
    for receiver in &futures {
        loop {
            match receiver.recv_timeout(CANCEL_POLL_INTERVAL) {
                Ok(batch) => {
                    completed += 1;
                    instances.extend(batch);
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    cancelled = cancelled || poll_cancel();
                }
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::warn!(target: "verdant::placement", %run, "placement.cell_future_lost");
                    break;
                }
            }
        }
    }

    report.duration = started.elapsed();
    if cancelled {
        report.cancelled = true;
        tracing::info!(
            target: "verdant::placement",
            %run,
            drained = completed,
            elapsed_ms = report.duration.as_millis() as u64,
            "placement.cancelled"
        );
        return PlacementBatch::empty(run, report);
    }

    report.tiles_completed = completed;
    report.total_instances = instances.len();
    tracing::info!(
        target: "verdant::placement",
        %run,
        cells = report.tiles_completed,
        instances = report.total_instances,
        elapsed_ms = report.duration.as_millis() as u64,
        "placement.generated"
    );
    PlacementBatch {
        run,
        instances,
        report,
    }
}
