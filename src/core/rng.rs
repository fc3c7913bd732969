use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

/// Seed for trial `trial` of a run seeded with `base_seed`.
///
/// Each trial gets its own stream, so results do not depend on which worker
/// ran which trial.
pub fn derive_seed(base_seed: u64, trial: u32) -> u64 {
    splitmix64(base_seed ^ ((trial as u64).rotate_left(32)))
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// A seed drawn from the OS-seeded thread generator.
pub fn fresh_seed() -> u64 {
    rand::random()
}

pub struct TrialRng {
    inner: StdRng,
}

impl TrialRng {
    pub fn for_trial(base_seed: u64, trial: u32) -> Self {
        Self {
            inner: StdRng::seed_from_u64(derive_seed(base_seed, trial)),
        }
    }

    pub fn fill(&mut self, dist: &Normal<f64>, buffer: &mut [f64]) {
        for value in buffer.iter_mut() {
            *value = dist.sample(&mut self.inner);
        }
    }
}
