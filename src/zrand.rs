use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};

/// Random number source for the `random` opcode. Gameplay uses the
/// thread generator; a story can switch to a seeded generator for
/// reproducible runs.
pub struct ZRand {
    rng: Box<dyn RngCore>,
}

impl ZRand {
    pub fn new_uniform() -> ZRand {
        ZRand {
            rng: Box::new(rand::thread_rng()),
        }
    }

    pub fn new_predictable(seed: u64) -> ZRand {
        ZRand {
            rng: Box::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Uniform roll in [1, range]. `range` must be at least 1.
    pub fn roll(&mut self, range: u16) -> u16 {
        self.rng.gen_range(1..=range.max(1))
    }
}
