//! Normal (Gaussian) sampler capability consumed by the RMHC localizer.

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};

/// An opaque, clone-able stateful Gaussian sampler.
///
/// Implementations must be deterministic given their seed and draw
/// sequence, and cloning must yield a sampler whose future draws are
/// identical to the original's — this is what lets the RMHC localizer
/// reproduce a search exactly from a given seed.
pub trait NormalSampler: Clone {
    /// Draw one value from `N(mu, sigma^2)`.
    fn draw(&mut self, mu: f64, sigma: f64) -> f64;
}

/// Concrete [`NormalSampler`] backed by `rand`'s `StdRng` and a standard
/// normal distribution from `rand_distr`.
///
/// This is one valid implementation of the capability; the reference
/// implementation's ziggurat algorithm is an optimization, not a
/// semantic requirement (see §4.6 of the design notes).
#[derive(Debug, Clone)]
pub struct Rand8Sampler {
    rng: StdRng,
}

impl Rand8Sampler {
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }
}

impl NormalSampler for Rand8Sampler {
    fn draw(&mut self, mu: f64, sigma: f64) -> f64 {
        let z: f64 = StandardNormal.sample(&mut self.rng);
        mu + sigma * z
    }
}

// Also usable directly with any `Rng` implementation the caller already owns.
impl<R: Rng + Clone> NormalSampler for R {
    fn draw(&mut self, mu: f64, sigma: f64) -> f64 {
        let z: f64 = StandardNormal.sample(self);
        mu + sigma * z
    }
}
