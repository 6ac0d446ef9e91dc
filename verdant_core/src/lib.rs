//! Procedural foliage simulation for the Verdant headless toolchain.
//!
//! A [`Spawner`] grows a pool of unique foliage tiles from a species catalog,
//! each tile a deterministic function of its seed. [`generate_placements`]
//! then covers a world volume with those tiles, stitches the seams so
//! neighboring cells agree on every border fight, and emits probe rays for
//! the instances that survived.

mod broadphase;
mod cancel;
mod instance;
pub mod metrics;
mod placement;
mod rng;
mod spawner;
mod species;
mod tile;

pub use broadphase::{Broadphase, BroadphaseEntry, Overlap};
pub use cancel::{CancelWatch, GenerationCounter};
pub use instance::{domination, Instance, InstanceId, OverlapKind};
pub use metrics::SimulationReport;
pub use placement::{
    compute_tile_layout, generate_placements, DesiredInstance, PlacementBatch, PlacementRunId,
    PlacementVolume, TileLayout,
};
pub use rng::RandomStream;
pub use spawner::{Spawner, SpawnerConfig};
pub use species::{
    load_catalog_from_env, CatalogError, CatalogMetadata, CurveKey, GrowthCurve, Species,
    SpeciesCatalog, SpeciesId, BUILTIN_SPECIES_CATALOG, ENV_CATALOG_PATH,
};
pub use tile::{SimulationParams, Tile};

/// Construct a spawner over the built-in species catalog with default
/// settings. Handy for demos and benchmarks; real callers load a catalog
/// through [`load_catalog_from_env`] or [`SpeciesCatalog::from_file`].
pub fn build_default_spawner() -> Spawner {
    Spawner::new(SpeciesCatalog::builtin(), SpawnerConfig::default())
}
