use std::f32::consts::TAU;

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Deterministic random stream backing every simulation draw.
///
/// All randomness flows through one ChaCha8 stream so a tile's output is a
/// pure function of its seed. `fork` splits off an independent child stream
/// while consuming exactly one draw from the parent, which keeps sibling
/// sequences stable no matter how many draws the child makes.
#[derive(Debug, Clone)]
pub struct RandomStream {
    rng: ChaCha8Rng,
}

impl RandomStream {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Child stream seeded from the parent's next draw.
    pub fn fork(&mut self) -> RandomStream {
        RandomStream::new(self.rng.next_u64())
    }

    pub fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    /// Uniform f32 in [0, 1).
    pub fn frand(&mut self) -> f32 {
        self.rng.gen::<f32>()
    }

    /// Uniform f32 in [min, max).
    pub fn frand_range(&mut self, min: f32, max: f32) -> f32 {
        min + (max - min) * self.frand()
    }

    /// Uniform angle in [0, TAU).
    pub fn angle(&mut self) -> f32 {
        self.frand_range(0.0, TAU)
    }

    /// Standard normal draw via Box-Muller.
    pub fn gaussian(&mut self) -> f32 {
        let r1 = self.frand().max(f32::EPSILON);
        let r2 = self.frand();
        (-2.0 * r1.ln()).sqrt() * (TAU * r2).cos()
    }
}
