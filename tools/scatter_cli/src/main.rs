use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use glam::Vec3;
use serde_json::json;
use tracing::info;

use verdant_core::{generate_placements, PlacementVolume, Spawner, SpawnerConfig, SpeciesCatalog};

#[derive(Parser, Debug)]
#[command(author, version, about = "Scatter foliage placements over a world volume", long_about = None)]
struct Args {
    /// Species catalog JSON file (defaults to the built-in catalog)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Edge length of a simulation tile, in centimeters
    #[arg(long, default_value_t = 10_000.0)]
    tile_size: f32,

    /// Unique tiles precomputed into the pool
    #[arg(long, default_value_t = 10)]
    tiles: u32,

    /// Master random seed for the tile pool
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Cap on simulation steps per pass
    #[arg(long)]
    max_steps: Option<u32>,

    /// Worker threads; 0 sizes the pool to the machine
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Bottom corner of the placement volume (x,y,z)
    #[arg(long, default_value = "0,0,0", value_parser = parse_vec3)]
    volume_min: Vec3,

    /// Top corner of the placement volume (x,y,z)
    #[arg(long, default_value = "30000,30000,2000", value_parser = parse_vec3)]
    volume_max: Vec3,

    /// Seam band copied between neighboring tiles
    #[arg(long, default_value_t = 1_000.0)]
    overlap: f32,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,

    /// Write output to this file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    anyhow::ensure!(args.tile_size > 0.0, "tile size must be positive");
    anyhow::ensure!(
        args.volume_min.x <= args.volume_max.x
            && args.volume_min.y <= args.volume_max.y
            && args.volume_min.z <= args.volume_max.z,
        "volume min must not exceed volume max on any axis"
    );

    let catalog = match &args.catalog {
        Some(path) => SpeciesCatalog::from_file(path)
            .with_context(|| format!("failed to load catalog {}", path.display()))?,
        None => SpeciesCatalog::builtin(),
    };

    let config = SpawnerConfig {
        tile_size: args.tile_size,
        num_unique_tiles: args.tiles,
        random_seed: args.seed,
        worker_threads: args.threads,
    };
    let mut spawner = Spawner::new(catalog, config);
    let pool = spawner.simulate(args.max_steps);
    info!(
        tiles = pool.tiles_completed,
        instances = pool.total_instances,
        attempts = pool.seed_attempts,
        rejected = pool.seed_rejections,
        "tile pool simulated"
    );

    let volume = PlacementVolume::new(args.volume_min, args.volume_max);
    let batch = generate_placements(&mut spawner, &volume, args.overlap, || false);
    let document = json!({
        "run": batch.run,
        "tile_size": args.tile_size,
        "overlap": args.overlap,
        "volume": { "min": volume.min, "max": volume.max },
        "cells": batch.report.tiles_completed,
        "count": batch.instances.len(),
        "instances": batch.instances,
    });

    let rendered = if args.pretty {
        serde_json::to_string_pretty(&document)?
    } else {
        serde_json::to_string(&document)?
    };
    match &args.output {
        Some(path) => fs::write(path, rendered)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{rendered}"),
    }
    info!(count = batch.instances.len(), "scatter complete");
    Ok(())
}

/// Parses a `x,y,z` triple into a vector; whitespace around components is
/// tolerated.
fn parse_vec3(raw: &str) -> Result<Vec3> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    anyhow::ensure!(parts.len() == 3, "expected x,y,z but got '{raw}'");
    let mut out = [0.0f32; 3];
    for (slot, part) in out.iter_mut().zip(&parts) {
        *slot = part
            .parse::<f32>()
            .with_context(|| format!("invalid coordinate '{part}' in '{raw}'"))?;
    }
    Ok(Vec3::from_array(out))
}
