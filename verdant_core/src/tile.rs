//! Single-tile growth simulation.
//!
//! A tile seeds instances at step zero, then alternates ageing and spreading
//! sweeps until every species has run out of growth steps. Overlap fights are
//! settled the moment a candidate enters the spatial index, so the index only
//! ever holds live instances. Simulation runs twice per tile: first for
//! species that need open sky, then for shade growers over the survivors.

use std::sync::Arc;

use glam::Vec2;

use crate::broadphase::{Broadphase, BroadphaseEntry};
use crate::cancel::CancelWatch;
use crate::instance::{domination, Instance, InstanceId};
use crate::rng::RandomStream;
use crate::species::{Species, SpeciesId};

/// Gaussian spread deviations clamp to the 90% band.
const MAX_SPREAD_DEVIATION: f32 = 1.64;

/// Parameters frozen for the duration of one simulation run and shared
/// read-only across every tile task of that run.
#[derive(Debug, Clone)]
pub struct SimulationParams {
    pub tile_size: f32,
    pub species: Vec<Species>,
}

impl SimulationParams {
    pub fn species(&self, id: SpeciesId) -> &Species {
        &self.species[id.0 as usize]
    }
}

/// One simulated tile. Instances live in an arena indexed by [`InstanceId`];
/// slots are never reused, dead instances simply stay behind with `alive`
/// cleared.
#[derive(Debug, Clone)]
pub struct Tile {
    params: Arc<SimulationParams>,
    stream: RandomStream,
    instances: Vec<Instance>,
    broadphase: Broadphase,
    pending_removal: Vec<InstanceId>,
    simulation_step: u32,
    shade_pass: bool,
    cancel: CancelWatch,
    seed_attempts: u64,
    seed_rejections: u64,
}

impl Tile {
    pub fn new(params: Arc<SimulationParams>) -> Self {
        let broadphase = Broadphase::sized_for(params.tile_size);
        Self {
            params,
            stream: RandomStream::new(0),
            instances: Vec::new(),
            broadphase,
            pending_removal: Vec::new(),
            simulation_step: 0,
            shade_pass: false,
            cancel: CancelWatch::never(),
            seed_attempts: 0,
            seed_rejections: 0,
        }
    }

    pub fn params(&self) -> &Arc<SimulationParams> {
        &self.params
    }

    pub fn simulation_step(&self) -> u32 {
        self.simulation_step
    }

    pub fn seed_attempts(&self) -> u64 {
        self.seed_attempts
    }

    pub fn seed_rejections(&self) -> u64 {
        self.seed_rejections
    }

    pub fn live_count(&self) -> usize {
        self.instances.iter().filter(|inst| inst.alive).count()
    }

    pub fn index_len(&self) -> usize {
        self.broadphase.len()
    }

    pub fn index_contains(&self, id: InstanceId) -> bool {
        self.instances
            .get(id.0 as usize)
            .is_some_and(|inst| self.broadphase.contains(id, inst.location))
    }

    pub fn instance(&self, id: InstanceId) -> Option<&Instance> {
        self.instances.get(id.0 as usize)
    }

    /// Drops all instances and resets per-run state. Parameters are kept.
    pub fn init_simulation(&mut self, seed: u64) {
        self.stream = RandomStream::new(seed);
        self.instances.clear();
        self.broadphase.clear();
        self.pending_removal.clear();
        self.simulation_step = 0;
        self.shade_pass = false;
        self.seed_attempts = 0;
        self.seed_rejections = 0;
    }

    /// Full two-pass run: open-sky species first, shade growers over the
    /// survivors. A stale watch makes the remaining work a no-op.
    pub fn simulate(&mut self, seed: u64, max_steps: Option<u32>, cancel: CancelWatch) {
        self.cancel = cancel;
        self.init_simulation(seed);
        self.run_pass(max_steps, false);
        self.run_pass(max_steps, true);
        tracing::debug!(
            target: "verdant::tile",
            seed,
            live = self.live_count(),
            attempts = self.seed_attempts,
            rejected = self.seed_rejections,
            cancelled = self.cancelled(),
            "tile.simulated"
        );
    }

    /// Runs one simulation pass. The step budget is one seeding step plus the
    /// largest `num_steps` among species in this pass, clamped to `max_steps`.
    pub fn run_pass(&mut self, max_steps: Option<u32>, shade_pass: bool) {
        self.shade_pass = shade_pass;
        self.simulation_step = 0;
        let mut budget = 0u32;
        for species in &self.params.species {
            if species.grows_in_shade == shade_pass {
                budget = budget.max(species.num_steps.saturating_add(1));
            }
        }
        if let Some(cap) = max_steps {
            budget = budget.min(cap);
        }
        for _ in 0..budget {
            if self.cancelled() {
                return;
            }
            self.step_simulation();
        }
    }

    /// Step zero seeds; every later step ages then spreads. Pending removals
    /// flush before the step counter advances.
    pub fn step_simulation(&mut self) {
        if self.cancelled() {
            return;
        }
        if self.simulation_step == 0 {
            self.add_random_seeds();
        } else {
            self.age_seeds();
            self.spread_seeds();
        }
        self.flush_pending_removals();
        self.simulation_step += 1;
    }

    /// Places one candidate and settles its overlaps. The candidate enters
    /// the arena and index first; if any pairing dominates it, it is unwound
    /// before returning. Otherwise every dominated partner is marked for
    /// removal and the new id is returned.
    pub fn new_seed(
        &mut self,
        location: Vec2,
        scale: f32,
        species_id: SpeciesId,
        age: f32,
        blocker: bool,
    ) -> Option<InstanceId> {
        let params = Arc::clone(&self.params);
        let species = params.species(species_id);
        let id = InstanceId(self.instances.len() as u32);
        // Rotation draws from a forked stream so per-instance randomness
        // costs the tile stream exactly one draw.
        let rotation = self.stream.fork().angle();
        let instance = Instance {
            id,
            location,
            rotation,
            scale,
            age,
            species: species_id,
            alive: true,
            blocker,
        };
        let entry = BroadphaseEntry {
            id,
            location,
            collision_radius: instance.collision_radius(species),
            shade_radius: instance.shade_radius(species),
        };
        self.instances.push(instance);
        self.broadphase.insert(entry);
        if self.handle_overlaps(id) {
            Some(id)
        } else {
            None
        }
    }

    /// Resolves every overlap of a freshly indexed candidate. Returns false
    /// when the candidate itself loses. Verdicts are applied in ascending
    /// partner id so the outcome never depends on index scan order.
    fn handle_overlaps(&mut self, candidate: InstanceId) -> bool {
        let params = Arc::clone(&self.params);
        let probe = self.entry_for(candidate);
        let mut overlaps = self.broadphase.overlaps(&probe);
        overlaps.sort_unstable_by_key(|overlap| overlap.partner);

        for overlap in &overlaps {
            let a = &self.instances[candidate.0 as usize];
            let b = &self.instances[overlap.partner.0 as usize];
            if domination(a, b, overlap.kind, &params.species) == Some(candidate) {
                self.mark_pending_removal(candidate);
                return false;
            }
        }
        for overlap in &overlaps {
            let a = &self.instances[candidate.0 as usize];
            let b = &self.instances[overlap.partner.0 as usize];
            if let Some(loser) = domination(a, b, overlap.kind, &params.species) {
                debug_assert_ne!(loser, candidate, "survivor lost its own pairing");
                self.mark_pending_removal(loser);
            }
        }
        true
    }

    /// Kills an instance and drops its index entry. Calling this again for
    /// the same instance is a no-op.
    pub fn mark_pending_removal(&mut self, id: InstanceId) {
        let location = {
            let Some(instance) = self.instances.get_mut(id.0 as usize) else {
                return;
            };
            if !instance.alive {
                return;
            }
            instance.alive = false;
            instance.location
        };
        self.broadphase.remove(id, location);
        self.pending_removal.push(id);
    }

    /// Closes out the current sweep's removal list. Index entries already
    /// left the grid when their instance was marked.
    pub fn flush_pending_removals(&mut self) {
        self.pending_removal.clear();
    }

    fn add_random_seeds(&mut self) {
        let params = Arc::clone(&self.params);
        // Survivors of earlier passes act as shade casters for biased
        // placement of shade growers.
        let casters = self.live_ids();
        let mut remaining: Vec<(SpeciesId, u32)> = params
            .species
            .iter()
            .enumerate()
            .filter(|(_, species)| species.grows_in_shade == self.shade_pass)
            .map(|(idx, species)| {
                (
                    SpeciesId(idx as u16),
                    species.initial_seed_count(params.tile_size),
                )
            })
            .filter(|(_, count)| *count > 0)
            .collect();

        // Species take turns so no single one floods the tile first.
        let mut species_left = remaining.len();
        let mut cursor = 0usize;
        while species_left > 0 {
            if self.cancelled() {
                return;
            }
            let slot = cursor % remaining.len();
            cursor += 1;
            let (species_id, count) = &mut remaining[slot];
            if *count == 0 {
                continue;
            }
            *count -= 1;
            let species_id = *species_id;
            if *count == 0 {
                species_left -= 1;
            }

            let species = params.species(species_id);
            let age = species.init_age(&mut self.stream);
            let scale = species.scale_for_age(age);
            let location = if species.grows_in_shade && !casters.is_empty() {
                let pick = (self.stream.frand_range(0.0, casters.len() as f32) as usize)
                    .min(casters.len() - 1);
                let (caster_location, caster_shade) = {
                    let caster = &self.instances[casters[pick].0 as usize];
                    let caster_species = params.species(caster.species);
                    (caster.location, caster.shade_radius(caster_species))
                };
                let reach = caster_shade + self.stream.frand() * species.max_initial_seed_offset;
                let angle = self.stream.angle();
                caster_location + Vec2::new(angle.cos(), angle.sin()) * reach
            } else {
                Vec2::new(
                    self.stream.frand_range(0.0, params.tile_size),
                    self.stream.frand_range(0.0, params.tile_size),
                )
            };

            self.seed_attempts += 1;
            if self.new_seed(location, scale, species_id, age, false).is_none() {
                self.seed_rejections += 1;
            }
        }
    }

    /// Replaces each still-growing instance with an older, larger copy at
    /// the same spot. The copy fights its own overlaps like any other seed.
    fn age_seeds(&mut self) {
        let params = Arc::clone(&self.params);
        for id in self.live_ids() {
            if self.cancelled() {
                return;
            }
            let (alive, species_id, age, location) = {
                let inst = &self.instances[id.0 as usize];
                (inst.alive, inst.species, inst.age, inst.location)
            };
            // May have died earlier in this sweep.
            if !alive {
                continue;
            }
            let species = params.species(species_id);
            if species.grows_in_shade != self.shade_pass {
                continue;
            }
            if self.simulation_step > species.num_steps {
                continue;
            }
            let new_age = species.age_by_steps(age, 1);
            let new_scale = species.scale_for_age(new_age);
            self.mark_pending_removal(id);
            self.new_seed(location, new_scale, species_id, new_age, false);
        }
        self.flush_pending_removals();
    }

    /// Scatters new seeds around every instance still in its growth window.
    /// Attempts closer than the mutual clearance are rejected before any
    /// index work.
    fn spread_seeds(&mut self) {
        let params = Arc::clone(&self.params);
        for id in self.live_ids() {
            if self.cancelled() {
                return;
            }
            let (alive, species_id, parent_age, parent_location) = {
                let inst = &self.instances[id.0 as usize];
                (inst.alive, inst.species, inst.age, inst.location)
            };
            if !alive {
                continue;
            }
            let species = params.species(species_id);
            if species.grows_in_shade != self.shade_pass {
                continue;
            }
            if self.simulation_step > species.num_steps {
                continue;
            }
            for _ in 0..species.seeds_per_step {
                let new_age = species.init_age(&mut self.stream);
                let new_scale = species.scale_for_age(new_age);
                let min_distance = self.seed_min_distance(species, parent_age, new_age);
                let offset = Self::seed_offset(species, &mut self.stream);
                self.seed_attempts += 1;
                if offset.length_squared() >= min_distance * min_distance {
                    if self
                        .new_seed(parent_location + offset, new_scale, species_id, new_age, false)
                        .is_none()
                    {
                        self.seed_rejections += 1;
                    }
                } else {
                    self.seed_rejections += 1;
                }
            }
        }
    }

    /// Clearance between a parent and a prospective child: the sum of both
    /// footprints grown to the end of the species' remaining steps.
    fn seed_min_distance(&self, species: &Species, parent_age: f32, new_age: f32) -> f32 {
        let steps_left = species.num_steps.saturating_sub(self.simulation_step);
        let parent_final = species.scale_for_age(species.age_by_steps(parent_age, steps_left));
        let child_final = species.scale_for_age(species.age_by_steps(new_age, steps_left));
        species.max_radius() * (parent_final + child_final)
    }

    fn seed_offset(species: &Species, stream: &mut RandomStream) -> Vec2 {
        let deviation = stream
            .gaussian()
            .clamp(-MAX_SPREAD_DEVIATION, MAX_SPREAD_DEVIATION);
        let distance = species.average_spread_distance + deviation * species.spread_variance;
        let angle = stream.angle();
        Vec2::new(angle.cos(), angle.sin()) * distance
    }

    /// Flat copy of the live, non-blocker instances in insertion order. A
    /// cancelled tile reports nothing.
    pub fn instances_to_array(&self) -> Vec<Instance> {
        if self.cancelled() {
            return Vec::new();
        }
        self.instances
            .iter()
            .filter(|inst| inst.alive && !inst.blocker)
            .cloned()
            .collect()
    }

    /// Live instances whose footprint touches the box, in id order.
    pub fn instances_in_box(&self, min: Vec2, max: Vec2) -> Vec<Instance> {
        let mut ids = self.broadphase.entries_in_box(min, max);
        ids.sort_unstable();
        ids.into_iter()
            .map(|id| self.instances[id.0 as usize].clone())
            .collect()
    }

    /// Re-seeds a batch copied out of another tile, shifted by `offset` into
    /// this tile's frame. An instance becomes a blocker when its shifted
    /// centre falls outside the half-open core box; blockers take part in
    /// overlap fights but are never exported.
    pub fn add_instances(
        &mut self,
        batch: &[Instance],
        offset: Vec2,
        core_min: Vec2,
        core_max: Vec2,
    ) {
        let mut ordered: Vec<&Instance> = batch.iter().collect();
        ordered.sort_by(|a, b| {
            a.location
                .x
                .total_cmp(&b.location.x)
                .then(a.location.y.total_cmp(&b.location.y))
                .then(a.id.cmp(&b.id))
        });
        for source in ordered {
            let location = source.location + offset;
            let outside_core = location.x < core_min.x
                || location.x >= core_max.x
                || location.y < core_min.y
                || location.y >= core_max.y;
            self.new_seed(
                location,
                source.scale,
                source.species,
                source.age,
                source.blocker || outside_core,
            );
        }
        self.flush_pending_removals();
    }

    pub fn clear(&mut self) {
        self.instances.clear();
        self.broadphase.clear();
        self.pending_removal.clear();
        self.simulation_step = 0;
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Ids of live, non-blocker instances at this moment.
    fn live_ids(&self) -> Vec<InstanceId> {
        self.instances
            .iter()
            .filter(|inst| inst.alive && !inst.blocker)
            .map(|inst| inst.id)
            .collect()
    }

    fn entry_for(&self, id: InstanceId) -> BroadphaseEntry {
        let instance = &self.instances[id.0 as usize];
        let species = self.params.species(instance.species);
        BroadphaseEntry {
            id,
            location: instance.location,
            collision_radius: instance.collision_radius(species),
            shade_radius: instance.shade_radius(species),
        }
    }
}
